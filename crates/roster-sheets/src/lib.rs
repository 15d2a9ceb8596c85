//! Google Sheets backend for the Roster person table.
//!
//! [`SheetsClient`] implements [`roster_core::source::TabularProvider`] on top
//! of the Sheets v4 `values.get` endpoint. Requests are authenticated with a
//! service-account key (OAuth2 JWT bearer flow) or, for public sheets, an API
//! key.

mod auth;
mod client;

pub mod error;

pub use auth::{ServiceAccount, ServiceAccountKey};
pub use client::{Credentials, SheetsClient, SheetsConfig};
pub use error::{Error, Result};
