//! Bounded, compressible memory of prior interactions.
//!
//! A ring of recent `(player input, director response)` pairs plus a
//! capped set of significant memories distilled from them by the cheap
//! model. Extraction and compaction run as fire-and-forget tasks that
//! never block a game turn.

pub mod compaction;
pub mod extraction;
pub mod relevance;
pub mod store;
pub mod types;

pub use store::{MemoryConfig, MemoryContext, MemoryStats, MemoryStore};
pub use types::{Importance, Interaction, MemorySnapshot, SignificantMemory};
