//! Voter roll search and maintenance.

use reqwest::Method;
use serde_json::{json, Value};

use super::users::path_segment;
use super::{ApiClient, ApiError, RequestOptions};
use crate::models::user::AccountStatus;
use crate::models::{ListResponse, VoterRecord};

#[derive(Clone)]
pub struct VoterService {
    api: ApiClient,
}

impl VoterService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// List voter records, filtered by arbitrary query parameters
    pub async fn list_voters(&self, query: &[(&str, &str)]) -> Result<Vec<VoterRecord>, ApiError> {
        let options = query
            .iter()
            .fold(RequestOptions::new(), |opts, (k, v)| opts.query(*k, *v));
        let response: ListResponse<VoterRecord> = self
            .api
            .request(Method::GET, "/voter-data", None, options)
            .await?;
        Ok(response.into_vec())
    }

    pub async fn get_voter(&self, id: &str) -> Result<VoterRecord, ApiError> {
        self.api
            .get(&format!("/voter-data/{}", path_segment(id)?))
            .await
    }

    /// Full record for one EPIC number
    pub async fn voter_details(&self, epic_no: &str) -> Result<VoterRecord, ApiError> {
        self.api
            .get(&format!("/voter-data/details/{}", path_segment(epic_no)?))
            .await
    }

    /// Search by one or more EPIC numbers (comma or whitespace separated).
    /// No match is an empty list, not an error.
    ///
    /// The search is a read, so it carries an idempotency key and may be
    /// retried like a GET.
    pub async fn search(&self, epic_numbers: &str) -> Result<Vec<VoterRecord>, ApiError> {
        if epic_numbers.trim().is_empty() {
            return Err(ApiError::Validation(
                "Enter at least one EPIC number".to_string(),
            ));
        }

        let body = json!({ "epicNumbers": epic_numbers.trim() });
        let result: Result<Option<Vec<VoterRecord>>, ApiError> = self
            .api
            .request(
                Method::POST,
                "/voter-data/search",
                Some(body),
                RequestOptions::new().idempotent(),
            )
            .await;

        match result {
            Ok(records) => Ok(records.unwrap_or_default()),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn update_voter_status(
        &self,
        id: &str,
        status: AccountStatus,
    ) -> Result<Value, ApiError> {
        self.api
            .patch(
                &format!("/voters/{}/status", path_segment(id)?),
                &json!({ "status": status }),
            )
            .await
    }

    pub async fn delete_voter(&self, id: &str) -> Result<(), ApiError> {
        let _: Value = self
            .api
            .delete(&format!("/voter-data/{}", path_segment(id)?))
            .await?;
        Ok(())
    }

    pub async fn enable_voter(&self, epic_no: &str) -> Result<Value, ApiError> {
        self.toggle_voter("enable", epic_no).await
    }

    pub async fn disable_voter(&self, epic_no: &str) -> Result<Value, ApiError> {
        self.toggle_voter("disable", epic_no).await
    }

    async fn toggle_voter(&self, action: &str, epic_no: &str) -> Result<Value, ApiError> {
        let epic_no = path_segment(epic_no)?;
        self.api
            .post(
                &format!("/voter-data/{}/{}", action, epic_no),
                &json!({ "epic_no": epic_no }),
            )
            .await
    }
}
