//! Person resolution engine for Roster.
//!
//! Turns a free-text chat message plus optional user hints (phone, name) into
//! a single best-matching [`PersonRecord`](person::PersonRecord), drawn from a
//! periodically refreshed, TTL-cached snapshot of an external table.
//!
//! The crate has no HTTP dependencies. The tabular provider
//! is a trait ([`source::TabularProvider`]); concrete backends live elsewhere
//! (e.g. `roster-sheets`).

// Native `async fn` in traits; the `Send` bounds live on the trait
// declarations.
#![allow(async_fn_in_trait)]

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fuzzy;
pub mod person;
pub mod phone;
pub mod resolve;
pub mod source;

pub use error::{Error, NormalizationError, Result, SourceError};

#[cfg(test)]
mod tests;
