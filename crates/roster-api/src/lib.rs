//! JSON HTTP API for Roster.
//!
//! Exposes an axum [`Router`] backed by any [`PersonResolver`]. Logging
//! layers, TLS and listener setup are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = roster_api::router(resolver).layer(TraceLayer::new_for_http());
//! ```

pub mod error;
pub mod resolve;
pub mod status;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use roster_core::{resolve::PersonResolver, source::DataSource};

pub use error::ApiError;

/// Build the full router: `/health` plus the versioned `/api/v1` routes.
pub fn router<S>(resolver: PersonResolver<S>) -> Router<()>
where
  S: DataSource + 'static,
{
  Router::new()
    .route("/health", get(status::health))
    .nest("/api/v1", api_router(Arc::new(resolver)))
}

/// The `/api/v1` routes alone, for nesting under another prefix.
pub fn api_router<S>(resolver: Arc<PersonResolver<S>>) -> Router<()>
where
  S: DataSource + 'static,
{
  Router::new()
    .route("/resolve", post(resolve::handler::<S>))
    .route("/snapshot", get(status::snapshot::<S>))
    .with_state(resolver)
}
