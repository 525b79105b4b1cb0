//! Hospital information system record lookups
//!
//! Each lookup is a query keyed by its identifier followed by its
//! parameters, so a replay after refresh targets exactly the same data.

use ehr_console_core::{EhrFilter, ReceptionLookup};

use super::{ApiCall, Service};

pub const EHR_BY_NATIONAL_NUMBER_PATH: &str = "/EHRByNationalNumber";
pub const MOBILE_NUMBER_BY_NATIONAL_NUMBER_PATH: &str = "/EHRGetMobileNumberByNationalNumber";
pub const MOBILE_LABORATORY_BY_NATIONAL_NUMBER_PATH: &str = "/PDDMobileLaboratoryByNationalNumber";
pub const MOBILE_XRAY_BY_NATIONAL_NUMBER_PATH: &str = "/PDDMobileXRayByNationalNumber";

pub const EHR_BY_NATIONAL_NUMBER_KEY: &str = "ehr_by_national_number";
pub const MOBILE_NUMBER_BY_NATIONAL_NUMBER_KEY: &str = "pdd_mobile_number_by_national_number";
pub const MOBILE_LABORATORY_BY_NATIONAL_NUMBER_KEY: &str = "pdd_mobile_laboratory_by_national_number";
pub const MOBILE_XRAY_BY_NATIONAL_NUMBER_KEY: &str = "pdd_mobile_xray_by_national_number";

/// Patient type sent with the mobile number lookup
const MOBILE_NUMBER_PATIENT_TYPE: &str = "1";

fn keyed_query(identifier: &str, path: &str, params: Vec<(String, String)>) -> ApiCall {
    let key = std::iter::once(identifier.to_string()).chain(params.iter().map(|(_, value)| value.clone()));
    ApiCall::query(key, Service::Records, path).params(params)
}

pub fn ehr_by_national_number(filter: &EhrFilter) -> ApiCall {
    keyed_query(EHR_BY_NATIONAL_NUMBER_KEY, EHR_BY_NATIONAL_NUMBER_PATH, filter.query_params())
}

pub fn mobile_number_by_national_number(national_number: &str) -> ApiCall {
    keyed_query(
        MOBILE_NUMBER_BY_NATIONAL_NUMBER_KEY,
        MOBILE_NUMBER_BY_NATIONAL_NUMBER_PATH,
        vec![
            ("nationalNumber".to_string(), national_number.to_string()),
            ("patientType".to_string(), MOBILE_NUMBER_PATIENT_TYPE.to_string()),
        ],
    )
}

pub fn mobile_laboratory_by_national_number(lookup: &ReceptionLookup) -> ApiCall {
    keyed_query(
        MOBILE_LABORATORY_BY_NATIONAL_NUMBER_KEY,
        MOBILE_LABORATORY_BY_NATIONAL_NUMBER_PATH,
        lookup.query_params(),
    )
}

pub fn mobile_xray_by_national_number(lookup: &ReceptionLookup) -> ApiCall {
    keyed_query(
        MOBILE_XRAY_BY_NATIONAL_NUMBER_KEY,
        MOBILE_XRAY_BY_NATIONAL_NUMBER_PATH,
        lookup.query_params(),
    )
}
