//! # noteflow-core
//!
//! Core types, traits, and abstractions for noteflow.
//!
//! This crate provides the foundational data structures, the error
//! taxonomy, the change-notification wire contract, and the trait
//! definitions that the other noteflow crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, ProviderError, ProviderErrorCode, Result};
pub use events::{
    NoteCreatedPayload, Notification, SummaryCompletedPayload, SummaryFailedPayload,
    CHANNEL_NOTE_CREATED, CHANNEL_SUMMARY_COMPLETED, CHANNEL_SUMMARY_FAILED,
};
pub use models::*;
pub use traits::*;
