//! Error types for the MARCout export engine.
//!
//! This module provides the [`MarcoutError`] type for every stage of the
//! pipeline — DSL parsing, workset resolution, per-record evaluation, and
//! ISO 2709 codec work — plus the [`Result`] convenience type.

use thiserror::Error;

/// Error type for all MARCout operations.
///
/// Variants correspond to the four error kinds described in the export
/// engine's error handling design: DSL parse errors and workset-consistency
/// errors are always fatal for the whole request; evaluation failures are
/// recovered locally (see [`crate::populate::EvalDiagnostic`]); codec errors
/// are fatal for the record being encoded or decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarcoutError {
    /// The export-definition text could not be parsed into an Engine.
    #[error("DSL parse error: {0}")]
    DslParse(String),

    /// The unified request was missing a key, named an unknown
    /// serialization, or its `collection_info` keys did not match the DSL's
    /// `KNOWN PARAMETERS` set.
    #[error("workset error: {0}")]
    Workset(String),

    /// An extractor or field expression failed to evaluate and had no
    /// `::DEFAULT` fallback.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Malformed ISO 2709 binary data, or a leader that is not exactly 24
    /// bytes.
    #[error("codec error: {0}")]
    Codec(String),
}

/// Convenience type alias for [`std::result::Result`] with [`MarcoutError`].
pub type Result<T> = std::result::Result<T, MarcoutError>;
