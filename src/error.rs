//! Structured error types for vgrid.
//!
//! One taxonomy for every engine entry point; hosts match on variants
//! rather than parsing strings.

/// All errors that can occur in vgrid engines and data sources.
///
/// Every variant except [`VgridError::Aborted`] is a contract violation on
/// the caller's side; `Aborted` is the expected outcome of cancelling a
/// fetch and is safe to ignore.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VgridError {
    /// Invalid geometry parameters for a scale computation.
    #[error("Invalid geometry: {0}")]
    Configuration(String),

    /// A ranges list is not in canonical form (sorted, disjoint, separated).
    #[error("Invalid ranges: {0}")]
    InvalidRanges(String),

    /// A single range is malformed (empty or inverted).
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// A row index is out of the accepted domain.
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// A sort column does not exist or is not sortable.
    #[error("Invalid column: {0}")]
    InvalidColumn(String),

    /// An orderBy list is malformed.
    #[error("Invalid orderBy: {0}")]
    InvalidOrderBy(String),

    /// A fetch was cancelled through its abort signal.
    #[error("Aborted")]
    Aborted,

    /// Engine state and data disagree (malformed permutation, row count
    /// changed mid-operation, rendered window over the hard cap).
    #[error("Data consistency: {0}")]
    DataConsistency(String),

    /// Failure reported by the backing row data source.
    #[error("Data source: {0}")]
    Source(String),
}

impl VgridError {
    /// True for the recoverable cancellation outcome.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VgridError>;

impl From<String> for VgridError {
    fn from(s: String) -> Self {
        Self::Source(s)
    }
}

impl From<&str> for VgridError {
    fn from(s: &str) -> Self {
        Self::Source(s.to_string())
    }
}

#[cfg(target_arch = "wasm32")]
impl From<VgridError> for wasm_bindgen::JsValue {
    fn from(e: VgridError) -> Self {
        wasm_bindgen::JsValue::from_str(&e.to_string())
    }
}
