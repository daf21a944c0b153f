//! # atrio-core
//!
//! Shared kernel for the Atrio customer-data platform.
//!
//! This crate provides the building blocks every Atrio component relies on:
//!
//! - **Typed identifiers**: strongly-typed ids for profiles, sessions,
//!   events and event sources
//! - **Errors**: the base error taxonomy shared across components
//! - **TTL caching**: an explicit process-wide cache with per-entry
//!   expiry, used for compiled validators and source records
//! - **Bulk outcomes**: value objects describing storage write results
//! - **Observability**: logging bootstrap and span constructors
//!
//! Domain logic lives in the component crates (currently `atrio-track`);
//! nothing here knows about pipelines or storage engines.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod bulk;
pub mod cache;
pub mod error;
pub mod id;
pub mod observability;

pub use bulk::BulkInsertResult;
pub use cache::{CacheItem, TtlCache};
pub use error::{Error, Result};
pub use id::{EventId, ProfileId, SessionId, SourceId};
