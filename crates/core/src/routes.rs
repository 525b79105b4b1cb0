//! Application routes and the guards that gate them on authentication status

use crate::status::AuthenticationStatus;
use std::time::Duration;

/// How long guards show their notice before redirecting
pub const REDIRECT_DELAY: Duration = Duration::from_secs(3);

/// Locale prefixes that may precede any route
pub const LOCALES: [&str; 2] = ["fa", "en"];

/// Top-level application routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRoute {
    Authentication,
    Console,
    Loading,
}

impl AppRoute {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Authentication => "/authentication",
            Self::Console => "/console",
            Self::Loading => "/loading",
        }
    }
}

/// Routes that require authentication
pub const PROTECTED_ROUTES: [AppRoute; 1] = [AppRoute::Console];

/// Routes that redirect authenticated users away
pub const AUTH_FLOW_ROUTES: [AppRoute; 1] = [AppRoute::Authentication];

/// Routes that never require authentication
pub const PUBLIC_ROUTES: [AppRoute; 1] = [AppRoute::Loading];

/// Remove a leading `/fa` or `/en` segment
pub fn strip_locale(pathname: &str) -> &str {
    for locale in LOCALES {
        if let Some(rest) = pathname
            .strip_prefix('/')
            .and_then(|p| p.strip_prefix(locale))
        {
            if rest.is_empty() {
                return "/";
            }
            if rest.starts_with('/') {
                return rest;
            }
        }
    }
    pathname
}

fn matches_any(routes: &[AppRoute], pathname: &str) -> bool {
    let pathname = strip_locale(pathname);
    routes.iter().any(|route| pathname.starts_with(route.path()))
}

pub fn is_protected_route(pathname: &str) -> bool {
    matches_any(&PROTECTED_ROUTES, pathname)
}

pub fn is_auth_flow_route(pathname: &str) -> bool {
    matches_any(&AUTH_FLOW_ROUTES, pathname)
}

pub fn is_public_route(pathname: &str) -> bool {
    matches_any(&PUBLIC_ROUTES, pathname)
}

/// Login URL carrying the page to return to in `next`
pub fn auth_redirect_url(next_path: &str) -> String {
    let next: String = url::form_urlencoded::byte_serialize(next_path.as_bytes()).collect();
    format!("{}?next={next}", AppRoute::Authentication.path())
}

/// What a guard wants the front-end to do with the requested page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Show the page
    Render,
    /// Status is still being determined
    ShowLoading,
    /// Show a notice, then navigate to `to` after `after`
    Redirect { to: String, after: Duration },
}

/// Decides access to routes from the current [`AuthenticationStatus`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteGuard;

impl RouteGuard {
    /// `next` is the `next` query parameter of the current URL, if any
    pub fn decide(
        self,
        pathname: &str,
        status: AuthenticationStatus,
        next: Option<&str>,
    ) -> GuardDecision {
        if is_protected_route(pathname) {
            return match status {
                AuthenticationStatus::Loading => GuardDecision::ShowLoading,
                AuthenticationStatus::Unauthenticated => GuardDecision::Redirect {
                    to: auth_redirect_url(pathname),
                    after: REDIRECT_DELAY,
                },
                AuthenticationStatus::Authenticated => GuardDecision::Render,
            };
        }

        if is_auth_flow_route(pathname) {
            return match status {
                AuthenticationStatus::Loading => GuardDecision::ShowLoading,
                AuthenticationStatus::Authenticated => GuardDecision::Redirect {
                    to: next
                        .filter(|n| !n.is_empty())
                        .unwrap_or(AppRoute::Console.path())
                        .to_string(),
                    after: REDIRECT_DELAY,
                },
                AuthenticationStatus::Unauthenticated => GuardDecision::Render,
            };
        }

        GuardDecision::Render
    }
}
