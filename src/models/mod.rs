// src/models/mod.rs

//! Domain models for the scraper.
//!
//! Configuration, per-source definitions and the loosely-typed records the
//! source adapters produce.

mod config;
mod record;
mod source;

// Re-export all public types
pub use config::{
    Committer, Config, LoggingConfig, NotifierConfig, PollConfig, StoreBackend, StoreConfig,
};
pub use record::{Record, field, field_text, records_of, snapshots_equal, value_text};
pub use source::{FetchMethod, SourceKind, SourceSpec};
