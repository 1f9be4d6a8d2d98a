// src/lib.rs

//! Disaster data poller library.
//!
//! Polls public disaster-relief data sources, diffs every fresh snapshot
//! against the stored one, versions changes with a readable message and
//! notifies an operator channel.

pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
