//! CLI commands

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use ehr_console_core::reports::{
    DEFAULT_TOP_SERVICES, DateCount, Reports, ServiceCount, ServiceResultCount, TrendPoint,
};
use ehr_console_core::{
    AppRoute, AuthenticationStatus, EhrFilter, ElectronicHealthRecord, GuardDecision, JalaliDate,
    PatientType, ReceptionLookup, RouteGuard,
};
use ehr_console_http::{
    Credentials, FileStorage, SessionConfig, SessionEvent, SessionManager, UserCreateRequest,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config;

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session tokens
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "EHR_CONSOLE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Clear the stored session
    Logout,

    /// Show the authentication status of the stored session
    Status,

    /// Show the signed-in account
    Me,

    /// Create an account
    Register {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "EHR_CONSOLE_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(short, long)]
        email: Option<String>,
    },

    /// Look up a patient's electronic health record
    Ehr {
        /// Patient national number
        national_number: String,

        #[command(flatten)]
        filter: FilterArgs,

        /// Print raw records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the mobile number registered for a patient
    Contact { national_number: String },

    /// Print the laboratory report of one reception
    Lab {
        national_number: String,
        reception_id: String,
    },

    /// Print the imaging report of one reception
    Xray {
        national_number: String,
        reception_id: String,
    },

    /// Aggregate reports over a record set
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Show what the console does when `path` is opened
    Route {
        path: String,

        /// Value of the `next` query parameter
        #[arg(long)]
        next: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Activity over a date range, across all patients
    Periodical {
        #[command(flatten)]
        filter: FilterArgs,

        /// Restrict to one patient
        #[arg(long, default_value = "")]
        national_number: String,

        #[arg(long, default_value_t = DEFAULT_TOP_SERVICES)]
        top: usize,
    },

    /// Services and results of one patient
    Patient {
        national_number: String,

        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value_t = DEFAULT_TOP_SERVICES)]
        top: usize,

        /// Also show the trend of this service
        #[arg(long)]
        service: Option<String>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct FilterArgs {
    /// First day, `yyyy/MM/dd` (Jalali)
    #[arg(long)]
    from: JalaliDate,

    /// Last day, `yyyy/MM/dd` (Jalali)
    #[arg(long)]
    to: JalaliDate,

    /// Patient type code
    #[arg(long, default_value = "2")]
    patient_type: PatientType,
}

impl FilterArgs {
    fn into_filter(self, national_number: String) -> Result<EhrFilter> {
        if self.from > self.to {
            bail!("--from {} is after --to {}", self.from, self.to);
        }
        Ok(EhrFilter {
            national_number,
            from_date: self.from,
            to_date: self.to,
            patient_type: self.patient_type,
        })
    }
}

/// Everything a command needs
pub struct Context {
    pub data_dir: PathBuf,
    pub config: SessionConfig,
    pub session: SessionManager,
}

impl Context {
    pub fn load(data_dir: PathBuf, config_file: Option<&Path>, overrides: &[String]) -> Result<Self> {
        let config = config::load_session_config(&data_dir, config_file)?;
        let config = config::apply_overrides(config, overrides)?;
        let session_file = config::session_file(&data_dir);
        let storage = FileStorage::open(&session_file)
            .with_context(|| format!("Failed to open session file {}", session_file.display()))?;
        let session = SessionManager::new(&config, Arc::new(storage))?;

        Ok(Self {
            data_dir,
            config,
            session,
        })
    }

    /// Resolve the stored session and refuse unless it is authenticated
    async fn authorize(&self) -> Result<()> {
        let status = self.session.initialize().await?;
        match RouteGuard.decide(AppRoute::Console.path(), status, None) {
            GuardDecision::Render => Ok(()),
            GuardDecision::ShowLoading => bail!("Session status could not be determined"),
            GuardDecision::Redirect { .. } => {
                bail!("Not signed in; run `ehr-console login` first")
            }
        }
    }
}

fn spawn_event_logger(session: &SessionManager) {
    let mut events = session.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::ConnectivityLost => warn!("Connection to the server was lost"),
                SessionEvent::Refreshed => info!("Session refreshed"),
                SessionEvent::LoggedOut { reason } => warn!(%reason, "Signed out"),
            }
        }
    });
}

impl Commands {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Status => "status",
            Self::Me => "me",
            Self::Register { .. } => "register",
            Self::Ehr { .. } => "ehr",
            Self::Contact { .. } => "contact",
            Self::Lab { .. } => "lab",
            Self::Xray { .. } => "xray",
            Self::Report { .. } => "report",
            Self::Route { .. } => "route",
        }
    }

    pub async fn execute(self, ctx: Context) -> Result<()> {
        spawn_event_logger(&ctx.session);

        match self {
            Self::Login { username, password } => {
                let credentials = Credentials { username, password };
                ctx.session
                    .login(&credentials)
                    .await
                    .context("Login failed")?;
                println!("Signed in as {}", credentials.username);
                Ok(())
            }
            Self::Logout => {
                if ctx.session.unauthenticate_user() {
                    println!("Signed out");
                } else {
                    println!("Not signed in");
                }
                Ok(())
            }
            Self::Status => {
                let status = ctx.session.initialize().await?;
                println!("status:      {status}");
                println!("backend:     {}", ctx.config.backend_url());
                println!("records:     {}", ctx.config.records_url);
                println!(
                    "session:     {}",
                    config::session_file(&ctx.data_dir).display()
                );
                Ok(())
            }
            Self::Me => {
                ctx.authorize().await?;
                let user = ctx.session.me().await?;
                println!("{} (id {})", user.username, user.id);
                if !user.email.is_empty() {
                    println!("{}", user.email);
                }
                Ok(())
            }
            Self::Register {
                username,
                password,
                email,
            } => {
                let user = ctx
                    .session
                    .user_create(&UserCreateRequest {
                        email,
                        username,
                        password,
                    })
                    .await
                    .context("Registration failed")?;
                println!("Created account {} (id {})", user.username, user.id);
                Ok(())
            }
            Self::Ehr {
                national_number,
                filter,
                json,
            } => {
                ctx.authorize().await?;
                let filter = filter.into_filter(national_number)?;
                let records = ctx.session.ehr_by_national_number(&filter).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&records)?);
                } else {
                    print_records(&records);
                }
                Ok(())
            }
            Self::Contact { national_number } => {
                ctx.authorize().await?;
                let contacts = ctx
                    .session
                    .mobile_number_by_national_number(&national_number)
                    .await?;
                if contacts.is_empty() {
                    println!("No mobile number registered");
                }
                for contact in contacts {
                    println!(
                        "{} {}\t{}",
                        contact.first_name, contact.last_name, contact.mobile_number
                    );
                }
                Ok(())
            }
            Self::Lab {
                national_number,
                reception_id,
            } => {
                ctx.authorize().await?;
                let lookup = ReceptionLookup {
                    national_number,
                    reception_id,
                };
                println!(
                    "{}",
                    ctx.session
                        .mobile_laboratory_by_national_number(&lookup)
                        .await?
                );
                Ok(())
            }
            Self::Xray {
                national_number,
                reception_id,
            } => {
                ctx.authorize().await?;
                let lookup = ReceptionLookup {
                    national_number,
                    reception_id,
                };
                println!(
                    "{}",
                    ctx.session.mobile_xray_by_national_number(&lookup).await?
                );
                Ok(())
            }
            Self::Report { command } => command.execute(ctx).await,
            Self::Route { path, next } => {
                let status = match ctx.session.initialize().await {
                    Ok(status) => status,
                    Err(e) => {
                        warn!(error = %e, "Could not resolve session status");
                        AuthenticationStatus::Loading
                    }
                };
                match RouteGuard.decide(&path, status, next.as_deref()) {
                    GuardDecision::Render => println!("render {path}"),
                    GuardDecision::ShowLoading => println!("loading"),
                    GuardDecision::Redirect { to, after } => {
                        println!("redirect to {to} after {}s", after.as_secs());
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct PeriodicalReport {
    record_counts: Vec<DateCount>,
    patient_counts: Vec<DateCount>,
    mixed_result_services: Vec<ServiceResultCount>,
    fully_abnormal_services: Vec<ServiceResultCount>,
    top_services: Vec<ServiceCount>,
}

#[derive(Debug, Serialize)]
struct PatientReport {
    patient: Option<String>,
    top_services: Vec<ServiceCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trend: Option<Vec<TrendPoint>>,
}

impl ReportCommands {
    async fn execute(self, ctx: Context) -> Result<()> {
        ctx.authorize().await?;

        match self {
            Self::Periodical {
                filter,
                national_number,
                top,
            } => {
                let filter = filter.into_filter(national_number)?;
                let records = ctx.session.ehr_by_national_number(&filter).await?;
                let reports = Reports::new(&records)?;
                let report = PeriodicalReport {
                    record_counts: reports.record_counts_by_date(),
                    patient_counts: reports.patient_counts_by_date(),
                    mixed_result_services: reports.mixed_result_services(),
                    fully_abnormal_services: reports.fully_abnormal_services(),
                    top_services: reports.top_services(top),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Self::Patient {
                national_number,
                filter,
                top,
                service,
            } => {
                let filter = filter.into_filter(national_number)?;
                let records = ctx.session.ehr_by_national_number(&filter).await?;
                let reports = Reports::new(&records)?;
                let report = PatientReport {
                    patient: records.first().map(ElectronicHealthRecord::patient_full_name),
                    top_services: reports.top_services(top),
                    trend: service.map(|name| reports.service_trend(&name)),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Ok(())
    }
}

fn print_records(records: &[ElectronicHealthRecord]) {
    if records.is_empty() {
        println!("No records found");
        return;
    }
    for record in records {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            record.date,
            record.patient_full_name(),
            record.service_name,
            record.answer.as_deref().unwrap_or("-"),
            record.normal_range.as_deref().unwrap_or("-"),
            record.physician_name,
        );
    }
    println!("{} records", records.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(from: &str, to: &str) -> FilterArgs {
        FilterArgs {
            from: from.parse().unwrap(),
            to: to.parse().unwrap(),
            patient_type: PatientType::Laboratory,
        }
    }

    #[test]
    fn test_filter_rejects_reversed_range() {
        assert!(args("1402/05/01", "1402/01/01").into_filter("1".into()).is_err());

        let filter = args("1402/01/01", "1402/05/01")
            .into_filter("0012345678".into())
            .unwrap();
        assert_eq!(filter.national_number, "0012345678");
    }

    #[test]
    fn test_command_names() {
        assert_eq!(Commands::Logout.name(), "logout");
        assert_eq!(
            Commands::Route {
                path: "/console".into(),
                next: None
            }
            .name(),
            "route"
        );
    }
}
