//! Typed calls routed through the session interceptor

use ehr_console_core::types::MobileContact;
use ehr_console_core::{EhrFilter, ElectronicHealthRecord, ReceptionLookup};

use super::SessionManager;
use crate::client::{ClientError, auth, records};
use crate::types::{User, UserCreateRequest};

impl SessionManager {
    /// The signed-in account
    pub async fn me(&self) -> Result<User, ClientError> {
        self.execute_as(auth::me()).await
    }

    pub async fn user_create(&self, payload: &UserCreateRequest) -> Result<User, ClientError> {
        self.execute_as(auth::user_create(payload)?).await
    }

    pub async fn ehr_by_national_number(
        &self,
        filter: &EhrFilter,
    ) -> Result<Vec<ElectronicHealthRecord>, ClientError> {
        self.execute_as(records::ehr_by_national_number(filter)).await
    }

    pub async fn mobile_number_by_national_number(
        &self,
        national_number: &str,
    ) -> Result<Vec<MobileContact>, ClientError> {
        self.execute_as(records::mobile_number_by_national_number(national_number))
            .await
    }

    /// Laboratory report of one reception, as rendered by the HIS
    pub async fn mobile_laboratory_by_national_number(
        &self,
        lookup: &ReceptionLookup,
    ) -> Result<String, ClientError> {
        self.execute_as(records::mobile_laboratory_by_national_number(lookup))
            .await
    }

    /// Imaging report of one reception, as rendered by the HIS
    pub async fn mobile_xray_by_national_number(
        &self,
        lookup: &ReceptionLookup,
    ) -> Result<String, ClientError> {
        self.execute_as(records::mobile_xray_by_national_number(lookup))
            .await
    }
}
