//! imdex-stats - Completion statistics for collection snapshots
//!
//! This crate provides the read-side aggregation over tracker state:
//!
//! - **Per-flag progress**: how many entries have one flag set
//! - **Alpha dex progress**: the alpha flag over alpha-capable entries
//! - **Overall progress**: obtainable forms, two base forms per entry
//!   plus two conditional forms for alpha-capable entries
//!
//! Everything here is a pure function over an immutable snapshot; the
//! tracker is never consulted or mutated, so figures can be recomputed
//! freely on every render.

pub mod progress;

pub use progress::*;
