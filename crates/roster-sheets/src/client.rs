//! [`SheetsClient`] reads cell ranges through the Sheets v4 REST API.

use std::{path::PathBuf, time::Duration};

use reqwest::{StatusCode, Url};
use roster_core::{SourceError, source::TabularProvider};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{Error, Result, ServiceAccount, ServiceAccountKey};

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_base_url() -> String { "https://sheets.googleapis.com".to_owned() }
fn default_timeout_secs() -> u64 { 30 }

/// Connection settings, deserialised from the `[sheets]` config table.
#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
  /// Path to a service-account JSON key.
  pub credentials_path: Option<PathBuf>,
  /// API key; only works for publicly readable sheets.
  pub api_key:          Option<String>,
  #[serde(default = "default_base_url")]
  pub base_url:         String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs:     u64,
}

impl Default for SheetsConfig {
  fn default() -> Self {
    Self {
      credentials_path: None,
      api_key:          None,
      base_url:         default_base_url(),
      timeout_secs:     default_timeout_secs(),
    }
  }
}

/// How requests are authenticated.
#[derive(Debug)]
pub enum Credentials {
  ServiceAccount(ServiceAccount),
  ApiKey(String),
  Anonymous,
}

// ─── Wire types ──────────────────────────────────────────────────────────────

/// Body of `GET /v4/spreadsheets/{id}/values/{range}`.
#[derive(Debug, Deserialize)]
struct ValueRange {
  /// Absent when the range holds no data.
  #[serde(default)]
  values: Vec<Vec<Value>>,
}

impl ValueRange {
  fn into_rows(self) -> Vec<Vec<String>> {
    self
      .values
      .into_iter()
      .map(|row| row.into_iter().map(cell_to_string).collect())
      .collect()
  }
}

fn cell_to_string(cell: Value) -> String {
  match cell {
    Value::String(s) => s,
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Read-only Google Sheets client.
#[derive(Debug)]
pub struct SheetsClient {
  http:        reqwest::Client,
  base_url:    Url,
  credentials: Credentials,
}

impl SheetsClient {
  /// Build a client from config. A credentials file takes precedence over an
  /// API key.
  pub fn new(config: &SheetsConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    let credentials = match (&config.credentials_path, &config.api_key) {
      (Some(path), _) => {
        let key = ServiceAccountKey::from_file(path)?;
        Credentials::ServiceAccount(ServiceAccount::new(key, http.clone())?)
      }
      (None, Some(key)) if !key.is_empty() => Credentials::ApiKey(key.clone()),
      _ => Credentials::Anonymous,
    };

    Self::with_credentials(http, &config.base_url, credentials)
  }

  pub fn with_credentials(
    http: reqwest::Client,
    base_url: &str,
    credentials: Credentials,
  ) -> Result<Self> {
    let base_url = Url::parse(base_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    if base_url.cannot_be_a_base() {
      return Err(Error::InvalidUrl(format!("{base_url} cannot be a base url")));
    }
    Ok(Self {
      http,
      base_url,
      credentials,
    })
  }

  pub fn credentials(&self) -> &Credentials { &self.credentials }

  fn values_url(&self, dataset_id: &str, range: &str) -> Result<Url> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|()| Error::InvalidUrl(self.base_url.to_string()))?
      .pop_if_empty()
      .extend(["v4", "spreadsheets", dataset_id, "values", range]);
    Ok(url)
  }

  /// `GET /v4/spreadsheets/{dataset_id}/values/{range}` as rows of strings.
  pub async fn get_values(&self, dataset_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
    let url = self.values_url(dataset_id, range)?;
    let mut req = self
      .http
      .get(url)
      .query(&[("majorDimension", "ROWS"), ("valueRenderOption", "FORMATTED_VALUE")]);

    match &self.credentials {
      Credentials::ServiceAccount(account) => {
        req = req.bearer_auth(account.access_token().await?);
      }
      Credentials::ApiKey(key) => req = req.query(&[("key", key.as_str())]),
      Credentials::Anonymous => {}
    }

    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.text().await?;

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
      return Err(Error::Unauthorized {
        status: status.as_u16(),
        body,
      });
    }
    if !status.is_success() {
      return Err(Error::Status {
        status: status.as_u16(),
        body,
      });
    }

    let rows = serde_json::from_str::<ValueRange>(&body)?.into_rows();
    debug!(dataset_id, range, rows = rows.len(), "fetched sheet values");
    Ok(rows)
  }
}

impl TabularProvider for SheetsClient {
  async fn read_range(
    &self,
    dataset_id: &str,
    range: &str,
  ) -> Result<Vec<Vec<String>>, SourceError> {
    self.get_values(dataset_id, range).await.map_err(|e| {
      warn!(dataset_id, range, error = %e, "sheet read failed");
      SourceError::from(e)
    })
  }
}
