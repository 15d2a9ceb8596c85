//! Server wiring for Roster.
//!
//! Loads a [`ServerConfig`], connects the Google Sheets provider to the
//! cached resolver and builds the HTTP application around it.

use std::path::Path;

use anyhow::Context as _;
use axum::Router;
use roster_core::{
  cache::CachedRepository, config::EngineConfig, resolve::PersonResolver, source::TableSource,
};
use roster_sheets::{SheetsClient, SheetsConfig};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::info;

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "0.0.0.0".to_owned() }
fn default_port() -> u16 { 8080 }

/// Runtime server configuration, deserialised from `roster.toml` and
/// `ROSTER__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:   String,
  #[serde(default = "default_port")]
  pub port:   u16,
  pub engine: EngineConfig,
  #[serde(default)]
  pub sheets: SheetsConfig,
}

/// Environment source; nested keys use `__`, e.g. `ROSTER__ENGINE__DATASET_ID`.
fn environment() -> config::Environment {
  config::Environment::with_prefix("ROSTER")
    .prefix_separator("__")
    .separator("__")
    .try_parsing(true)
}

impl ServerConfig {
  /// Layer the optional TOML file at `path` under the process environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_sources(config::File::from(path).required(false), environment())
  }

  fn from_sources<F>(file: F, env: config::Environment) -> anyhow::Result<Self>
  where
    F: config::Source + Send + Sync + 'static,
  {
    let settings = config::Config::builder()
      .add_source(file)
      .add_source(env)
      .build()
      .context("failed to read configuration")?;

    let cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")?;
    cfg.engine.validate().context("invalid [engine] configuration")?;
    Ok(cfg)
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Application ──────────────────────────────────────────────────────────────

pub type SheetsResolver = PersonResolver<TableSource<SheetsClient>>;

/// Build the resolver over the configured sheet. No sheet I/O happens until
/// the first request.
pub fn resolver(cfg: &ServerConfig) -> anyhow::Result<SheetsResolver> {
  let client = SheetsClient::new(&cfg.sheets).context("failed to build Sheets client")?;
  let source = TableSource::new(client, &cfg.engine.dataset_id, &cfg.engine.range);
  let repository = CachedRepository::new(source, cfg.engine.cache_ttl());
  let resolver = PersonResolver::new(repository, &cfg.engine)?;

  info!(
    dataset_id = %cfg.engine.dataset_id,
    range = %cfg.engine.range,
    ttl_ms = cfg.engine.cache_ttl_ms,
    "person resolver ready"
  );
  Ok(resolver)
}

/// The HTTP application with request tracing.
pub fn app(resolver: SheetsResolver) -> Router {
  roster_api::router(resolver).layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use config::{File, FileFormat};
  use tower::ServiceExt as _;

  use super::*;

  fn load(toml: &str, env: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
    let vars: HashMap<String, String> = env
      .iter()
      .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
      .collect();
    ServerConfig::from_sources(
      File::from_str(toml, FileFormat::Toml),
      environment().source(Some(vars)),
    )
  }

  #[test]
  fn minimal_file_takes_defaults() {
    let cfg = load("[engine]\ndataset_id = \"sheet-1\"\n", &[]).unwrap();
    assert_eq!(cfg.address(), "0.0.0.0:8080");
    assert_eq!(cfg.engine.range, "People!A2:K");
    assert_eq!(cfg.engine.cache_ttl_ms, 60_000);
    assert_eq!(cfg.sheets.base_url, "https://sheets.googleapis.com");
    assert!(cfg.sheets.credentials_path.is_none());
  }

  #[test]
  fn full_file_is_read() {
    let cfg = load(
      r#"
        host = "127.0.0.1"
        port = 9000

        [engine]
        dataset_id = "sheet-1"
        range = "Kişiler!A2:K"
        cache_ttl_ms = 5000
        default_country_code = "49"
        match_threshold = 0.9
        default_locale = "de-DE"

        [sheets]
        credentials_path = "/etc/roster/key.json"
        timeout_secs = 5
      "#,
      &[],
    )
    .unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:9000");
    assert_eq!(cfg.engine.range, "Kişiler!A2:K");
    assert_eq!(cfg.engine.default_country_code, "49");
    assert_eq!(cfg.engine.match_threshold, 0.9);
    assert_eq!(
      cfg.sheets.credentials_path.as_deref(),
      Some(Path::new("/etc/roster/key.json"))
    );
    assert_eq!(cfg.sheets.timeout_secs, 5);
  }

  #[test]
  fn environment_overrides_file() {
    let cfg = load(
      "port = 9000\n[engine]\ndataset_id = \"from-file\"\n",
      &[
        ("ROSTER__PORT", "9100"),
        ("ROSTER__ENGINE__DATASET_ID", "from-env"),
        ("ROSTER__ENGINE__CACHE_TTL_MS", "1500"),
        ("ROSTER__SHEETS__API_KEY", "public-key"),
      ],
    )
    .unwrap();
    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.engine.dataset_id, "from-env");
    assert_eq!(cfg.engine.cache_ttl_ms, 1500);
    assert_eq!(cfg.sheets.api_key.as_deref(), Some("public-key"));
  }

  #[test]
  fn missing_dataset_is_an_error() {
    assert!(load("port = 9000\n", &[]).is_err());
  }

  #[test]
  fn invalid_engine_values_are_rejected() {
    let err = load(
      "[engine]\ndataset_id = \"sheet-1\"\nmatch_threshold = 0.0\n",
      &[],
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("invalid [engine] configuration"));
  }

  #[tokio::test]
  async fn app_serves_health_without_touching_the_sheet() {
    let cfg = load("[engine]\ndataset_id = \"sheet-1\"\n", &[]).unwrap();
    let resp = app(resolver(&cfg).unwrap())
      .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }
}
