//! Handlers for `GET /health` and `GET /api/v1/snapshot`.

use std::sync::Arc;

use axum::{Json, extract::State};
use roster_core::{cache::CacheStatus, resolve::PersonResolver, source::DataSource};
use serde_json::{Value, json};

/// `GET /health`
pub async fn health() -> Json<Value> {
  Json(json!({
    "status":  "healthy",
    "service": "roster",
    "version": env!("CARGO_PKG_VERSION"),
  }))
}

/// `GET /api/v1/snapshot`
///
/// Reports cache state only; never triggers a refresh.
pub async fn snapshot<S>(State(resolver): State<Arc<PersonResolver<S>>>) -> Json<CacheStatus>
where
  S: DataSource + 'static,
{
  Json(resolver.repository().status())
}
