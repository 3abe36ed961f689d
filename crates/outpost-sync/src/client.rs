//! # Authority Client
//!
//! Thin HTTP wrapper around the two authority endpoints.
//!
//! ```text
//! GET  {base}/state?after=R   200 {"revision", "enabled_fobs"} | 204
//! POST {base}/events          newline-delimited Event JSON  ──► 204
//! ```
//!
//! Every request carries `Authorization: Bearer <token>` and a short
//! timeout; anything but the expected status is an error and the caller
//! retries on its next tick.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use outpost_core::{Revision, StateSnapshot};

use crate::error::{SyncError, SyncResult};

/// Answer to a state pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateResponse {
    Changed(StateSnapshot),
    Unchanged,
}

/// HTTP client for one authority.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl AuthorityClient {
    /// Creates a client for `base_url` (a trailing path is preserved).
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        Ok(AuthorityClient {
            http,
            base,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Asks whether the state changed since `after`.
    pub async fn get_state(&self, after: Revision) -> SyncResult<StateResponse> {
        let url = self.base.join("state")?;

        let response = self
            .http
            .get(url)
            .query(&[("after", after)])
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                debug!(after, "Authority state unchanged");
                Ok(StateResponse::Unchanged)
            }
            StatusCode::OK => {
                let snapshot: StateSnapshot = response.json().await?;
                Ok(StateResponse::Changed(snapshot))
            }
            status => Err(SyncError::UnexpectedStatus(status.as_u16())),
        }
    }

    /// Submits an already-encoded batch of events.
    pub async fn post_events(&self, body: Vec<u8>) -> SyncResult<()> {
        let url = self.base.join("events")?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            status => Err(SyncError::UnexpectedStatus(status.as_u16())),
        }
    }
}
