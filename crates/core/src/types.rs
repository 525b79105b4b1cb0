//! Electronic health record domain types

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single service line of a patient's electronic health record, as returned
/// by the hospital information system. Field names on the wire are the HIS
/// column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectronicHealthRecord {
    #[serde(rename = "PatientType")]
    pub patient_type: String,
    #[serde(rename = "كد مكان")]
    pub place_code: i64,
    #[serde(rename = "مكان")]
    pub place: String,
    #[serde(rename = "كد استعلام")]
    pub inquiry_code: i64,
    #[serde(rename = "شماره پرونده")]
    pub file_number: String,
    #[serde(rename = "كد پذيرش")]
    pub reception_code: String,
    #[serde(rename = "كد بيمار")]
    pub patient_code: i64,
    /// Jalali date, `yyyy/MM/dd`
    #[serde(rename = "تاريخ")]
    pub date: String,
    #[serde(rename = "نام بيمار")]
    pub patient_first_name: String,
    #[serde(rename = "نام خانوادگي بيمار")]
    pub patient_last_name: String,
    #[serde(rename = "كدملي")]
    pub national_number: String,
    #[serde(rename = "سن")]
    pub age: i64,
    #[serde(rename = "نوع سن")]
    pub age_unit: String,
    #[serde(rename = "كد خدمت")]
    pub service_code: String,
    #[serde(rename = "نام خدمت")]
    pub service_name: String,
    #[serde(rename = "جواب", default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(rename = "نرمال رنج", default, skip_serializing_if = "Option::is_none")]
    pub normal_range: Option<String>,
    #[serde(rename = "كد ملي خدمت")]
    pub service_national_code: String,
    #[serde(rename = "كد پزشك معالج")]
    pub physician_code: String,
    #[serde(rename = "نام پزشك معالج")]
    pub physician_name: String,
    #[serde(rename = "نظام پزشكي معالج")]
    pub physician_license: String,
    #[serde(rename = "ReceptionServiceID")]
    pub reception_service_id: i64,
}

impl ElectronicHealthRecord {
    /// Patient's full name as shown in record tables
    pub fn patient_full_name(&self) -> String {
        format!("{} {}", self.patient_first_name, self.patient_last_name)
    }
}

/// Contact details returned by the mobile-number lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MobileContact {
    pub mobile_number: String,
    pub first_name: String,
    pub last_name: String,
}

/// Patient categories understood by the records service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PatientType {
    Inpatient,
    Laboratory,
    Imaging,
    Pathology,
    Clinic,
    Emergency,
    Prescriptions,
    Paraclinic,
}

impl PatientType {
    pub const ALL: [Self; 8] = [
        Self::Inpatient,
        Self::Laboratory,
        Self::Imaging,
        Self::Pathology,
        Self::Clinic,
        Self::Emergency,
        Self::Prescriptions,
        Self::Paraclinic,
    ];

    /// Code sent as the `patientType` query parameter
    pub const fn code(self) -> &'static str {
        match self {
            Self::Inpatient => "1",
            Self::Laboratory => "2",
            Self::Imaging => "3",
            Self::Pathology => "4",
            Self::Clinic => "5",
            Self::Emergency => "6",
            Self::Prescriptions => "7",
            Self::Paraclinic => "25",
        }
    }

    /// Label used by the HIS
    pub const fn label(self) -> &'static str {
        match self {
            Self::Inpatient => "اطلاعات بستري",
            Self::Laboratory => "آزمايشگاه",
            Self::Imaging => "تصويربرداري",
            Self::Pathology => "پاتولوژي",
            Self::Clinic => "درمانگاه",
            Self::Emergency => "اورژانس",
            Self::Prescriptions => "نسخ دارو و تجهيزات",
            Self::Paraclinic => "بيماران ژاراكلينيك",
        }
    }
}

impl FromStr for PatientType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == s.trim())
            .ok_or_else(|| CoreError::UnknownPatientType {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for PatientType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PatientType> for String {
    fn from(value: PatientType) -> Self {
        value.code().to_string()
    }
}

impl fmt::Display for PatientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Calendar date in the Jalali (Solar Hijri) calendar.
///
/// Only used for ordering and formatting; no conversion to Gregorian is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JalaliDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl JalaliDate {
    pub fn new(year: u16, month: u8, day: u8) -> CoreResult<Self> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(CoreError::invalid_date(format!("{year}/{month}/{day}")));
        }
        Ok(Self { year, month, day })
    }
}

impl FromStr for JalaliDate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::invalid_date(s);
        let mut parts = s.trim().split('/');
        let (Some(year), Some(month), Some(day), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        let day = day.parse().map_err(|_| invalid())?;
        Self::new(year, month, day).map_err(|_| invalid())
    }
}

impl fmt::Display for JalaliDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

/// Filter for the EHR lookup table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EhrFilter {
    pub national_number: String,
    pub from_date: JalaliDate,
    pub to_date: JalaliDate,
    pub patient_type: PatientType,
}

impl EhrFilter {
    /// Query parameters in the order the records service expects them
    pub fn query_params(&self) -> Vec<(String, String)> {
        vec![
            ("nationalNumber".into(), self.national_number.clone()),
            ("fromDate".into(), self.from_date.to_string()),
            ("toDate".into(), self.to_date.to_string()),
            ("patientType".into(), self.patient_type.code().into()),
        ]
    }
}

/// Identifies one reception of a patient, used by the laboratory and imaging
/// report lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceptionLookup {
    pub national_number: String,
    pub reception_id: String,
}

impl ReceptionLookup {
    pub fn query_params(&self) -> Vec<(String, String)> {
        vec![
            ("nationalNumber".into(), self.national_number.clone()),
            ("receptionID".into(), self.reception_id.clone()),
        ]
    }
}
