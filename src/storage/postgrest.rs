// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote gateway over a PostgREST (Supabase) table.
//!
//! The table holds one row per user:
//!
//! ```text
//! user_id | settings (jsonb) | progress (jsonb) | updated_at
//! ```
//!
//! Reads select both columns for `user_id`; writes are an upsert on the
//! `user_id` conflict target, so both columns are always written together.

use std::time::Duration;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::{ConfigError, SyncEngineConfig};
use crate::metrics::{self, LatencyTimer};
use crate::record::{Record, UserData, UserId};
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{RemoteError, RemoteGateway};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct UpsertRow<'a> {
    user_id: &'a str,
    settings: &'a Record,
    progress: &'a Record,
    updated_at: String,
}

pub struct PostgrestGateway {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
    /// Session JWT; the anon key is used as bearer until one is set
    access_token: RwLock<Option<String>>,
    retry: RetryConfig,
}

impl PostgrestGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, table: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
            access_token: RwLock::new(None),
            retry: RetryConfig::query(),
        }
    }

    pub fn from_config(config: &SyncEngineConfig) -> Result<Self, ConfigError> {
        let url = config.remote_url.clone().ok_or_else(|| ConfigError::InvalidValue {
            key: "remote_url".into(),
            value: "<unset>".into(),
        })?;
        let key = config.remote_api_key.clone().ok_or_else(|| ConfigError::InvalidValue {
            key: "remote_api_key".into(),
            value: "<unset>".into(),
        })?;
        Url::parse(&url).map_err(|_| ConfigError::InvalidValue {
            key: "remote_url".into(),
            value: url.clone(),
        })?;
        Ok(Self::new(url, key, config.remote_table.clone()))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Bearer token of the signed-in session.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    fn bearer(&self) -> String {
        let token = self.access_token.read().clone().unwrap_or_else(|| self.api_key.clone());
        format!("Bearer {}", token)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn select_url(&self, user: &UserId) -> Result<Url, RemoteError> {
        Url::parse_with_params(
            &self.table_url(),
            &[("user_id", format!("eq.{}", user)), ("select", "settings,progress".to_string())],
        )
        .map_err(|e| RemoteError::Network(format!("invalid url: {}", e)))
    }

    fn upsert_url(&self) -> Result<Url, RemoteError> {
        Url::parse_with_params(&self.table_url(), &[("on_conflict", "user_id")])
            .map_err(|e| RemoteError::Network(format!("invalid url: {}", e)))
    }

    async fn fetch_once(&self, url: &Url) -> Result<UserData, RemoteError> {
        let response = self
            .client
            .get(url.clone())
            .header("apikey", &self.api_key)
            .header("Authorization", self.bearer())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let rows: Vec<UserData> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        // No row yet is an empty pair, not an error
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn upsert_once(&self, url: &Url, row: &UpsertRow<'_>) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(url.clone())
            .header("apikey", &self.api_key)
            .header("Authorization", self.bearer())
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for PostgrestGateway {
    #[instrument(skip(self, user), fields(user = %user))]
    async fn fetch(&self, user: &UserId) -> Result<UserData, RemoteError> {
        let url = self.select_url(user)?;
        let _timer = LatencyTimer::new("fetch");
        let result = retry("fetch", &self.retry, RemoteError::is_transient, || self.fetch_once(&url)).await;
        metrics::record_remote_call("fetch", result.is_ok());
        if result.is_ok() {
            debug!("Fetched remote row");
        }
        result
    }

    #[instrument(skip(self, user, settings, progress), fields(user = %user))]
    async fn upsert(&self, user: &UserId, settings: &Record, progress: &Record) -> Result<(), RemoteError> {
        let url = self.upsert_url()?;
        let row = UpsertRow {
            user_id: user.as_str(),
            settings,
            progress,
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let _timer = LatencyTimer::new("upsert");
        let result = retry("upsert", &self.retry, RemoteError::is_transient, || self.upsert_once(&url, &row)).await;
        metrics::record_remote_call("upsert", result.is_ok());
        result
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Network(e.to_string())
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_else(|_| status.to_string());
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(body),
        _ => RemoteError::Server { status: status.as_u16(), body },
    }
}
