//! The fetch → diff → summarize → persist pipeline.
//!
//! - `identity`: record identity from alias lists
//! - `diff`: added/removed/changed partition of two snapshots
//! - `format`: change messages
//! - `cycle`: one document, one pass
//! - `runner`: every document, forever

pub mod cycle;
pub mod diff;
pub mod format;
pub mod identity;
pub mod runner;

pub use cycle::{DocumentState, ScrapeCycle};
pub use diff::{ChangeSet, DiffCalculator, calculate_diff};
pub use format::{Message, MessageFormatter, Noun, RecordDisplay, Verb};
pub use identity::{IdentityKey, IdentityResolver};
pub use runner::{PassReport, Runner};
