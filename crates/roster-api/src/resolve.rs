//! Handler for `POST /api/v1/resolve`.

use std::sync::Arc;

use axum::{Json, extract::State};
use roster_core::{
  person::PersonRecord,
  resolve::{Hint, MatchedVia, PersonResolver, ResolutionResult},
  source::DataSource,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
  /// The chat message to resolve.
  pub message: String,
  /// What the caller already knows about the sender.
  #[serde(default)]
  pub user:    Option<Hint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStatus {
  Found,
  NotFound,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
  pub request_id:  String,
  pub status:      ResolveStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub person:      Option<PersonRecord>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub matched_via: Option<MatchedVia>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub score:       Option<f64>,
  pub locale_used: String,
}

/// Short id for correlating a request with its log lines.
fn request_id() -> String {
  let mut id = Uuid::new_v4().simple().to_string();
  id.truncate(8);
  id
}

/// `POST /api/v1/resolve`
#[tracing::instrument(skip_all, fields(request_id))]
pub async fn handler<S>(
  State(resolver): State<Arc<PersonResolver<S>>>,
  Json(body): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError>
where
  S: DataSource + 'static,
{
  let request_id = request_id();
  tracing::Span::current().record("request_id", request_id.as_str());

  if body.message.trim().is_empty() {
    return Err(ApiError::BadRequest("message must not be empty".into()));
  }
  let hint = body.user.unwrap_or_default();

  let result = resolver.resolve(&body.message, &hint).await?;
  let locale_used = result
    .locale_for(&hint, resolver.default_locale())
    .to_owned();

  let response = match result {
    ResolutionResult::Found {
      person,
      matched_via,
      score,
    } => {
      info!(person_id = %person.id, ?matched_via, score, "resolved");
      ResolveResponse {
        request_id,
        status: ResolveStatus::Found,
        person: Some(person),
        matched_via: Some(matched_via),
        score: Some(score),
        locale_used,
      }
    }
    ResolutionResult::NotFound => {
      info!("no person matched");
      ResolveResponse {
        request_id,
        status: ResolveStatus::NotFound,
        person: None,
        matched_via: None,
        score: None,
        locale_used,
      }
    }
  };
  Ok(Json(response))
}
