//! Execution contexts for the Gleaner harvest engine.
//!
//! An execution context is an isolated, closable browser tab used to load
//! one listing or profile page and read its structure. The
//! [`ExecutionContexts`] trait is the seam the harvest engine depends on;
//! [`BrowserEngine`] implements it over Chromium and
//! `testing::ScriptedContexts` (behind the `testing` feature) implements it
//! in memory.

pub mod contexts;
pub mod engine;
pub mod error;
pub mod fingerprint;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use contexts::{ContextHandle, ExecutionContexts, Extraction, ExtractionOutput};
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
