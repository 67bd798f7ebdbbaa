//! Shared types for the taleweave narrative engine: the error taxonomy,
//! the typed story record, mutable session state, LLM wire envelopes,
//! the engine event sink, and gateway configuration.

pub mod config;
pub mod error;
pub mod events;
pub mod state;
pub mod story;
pub mod trace;
pub mod wire;

pub use error::{Error, Result};
