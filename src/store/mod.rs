//! Places translations are read from and written back to.
//!
//! - `xcstrings`: Xcode string catalogs
//! - `metadata`: fastlane `metadata/<lang>/<field>.txt` trees
//! - `release_notes`: release notes typed in by the user, written as metadata

pub mod metadata;
pub mod release_notes;
pub mod xcstrings;

use crate::job::{Job, Update};
use anyhow::Result;

pub use metadata::{ExceededField, MetadataDir};
pub use xcstrings::{StringCatalog, UnitState};

/// A persistent source of translation jobs.
pub trait TranslationStore {
    /// Label used in logs and diagnostics.
    fn name(&self) -> String;

    /// Keys that have source text in one of `sources` and still need `target`.
    fn pending_job(&self, sources: &[String], target: &str) -> Result<Job>;

    /// Apply a batch of translated slots; returns how many were written.
    fn apply(&mut self, updates: &[Update]) -> Result<usize>;

    /// Persist everything applied so far.
    fn flush(&self) -> Result<()>;
}
