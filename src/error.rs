//! Error type shared by the registry, the pools and their bookkeeping.

use thiserror::Error;

/// Every failure the allocator can report.
///
/// Running out of room inside a pool is *not* an error: [`Pool::allocate`]
/// returns `Ok(None)` for that. `AllocationFailure` is reserved for the
/// bookkeeping storage (buffer, segment table, gap index, registry slots).
///
/// [`Pool::allocate`]: crate::Pool::allocate
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  // --- Lifecycle ---
  #[error("registry is already initialized")]
  AlreadyInitialized,

  #[error("registry is already torn down")]
  AlreadyTornDown,

  #[error("registry is not initialized")]
  NotInitialized,

  #[error("{open} pool(s) still open")]
  PoolsStillOpen { open: usize },

  #[error("pool is not empty: {allocations} allocation(s), {gaps} gap(s), {bytes} byte(s) in use")]
  PoolNotEmpty {
    allocations: usize,
    gaps: usize,
    bytes: usize,
  },

  #[error("no open pool with id {id}")]
  UnknownPool { id: u32 },

  #[error("invalid pool capacity: {capacity}")]
  InvalidCapacity { capacity: usize },

  // --- Resources ---
  #[error("could not grow {what} to {requested} entries")]
  AllocationFailure { what: &'static str, requested: usize },

  // --- Handles ---
  #[error("allocation handle is not live in this pool")]
  InvalidHandle,

  #[error("segment has no gap index entry")]
  NotFound,

  // --- Configuration / internal ---
  #[error("invalid configuration: {reason}")]
  InvalidConfig { reason: String },

  #[error("pool bookkeeping corrupted: {details}")]
  Corrupted { details: String },
}

impl PoolError {
  /// Stable code for categorization.
  pub fn code(&self) -> &'static str {
    match self {
      Self::AlreadyInitialized => "POOL:LIFECYCLE:ALREADY_INITIALIZED",
      Self::AlreadyTornDown => "POOL:LIFECYCLE:ALREADY_TORN_DOWN",
      Self::NotInitialized => "POOL:LIFECYCLE:NOT_INITIALIZED",
      Self::PoolsStillOpen { .. } => "POOL:LIFECYCLE:POOLS_STILL_OPEN",
      Self::PoolNotEmpty { .. } => "POOL:LIFECYCLE:NOT_EMPTY",
      Self::UnknownPool { .. } => "POOL:LIFECYCLE:UNKNOWN_POOL",
      Self::InvalidCapacity { .. } => "POOL:LIFECYCLE:CAPACITY",
      Self::AllocationFailure { .. } => "POOL:RESOURCE:ALLOCATION_FAILURE",
      Self::InvalidHandle => "POOL:HANDLE:INVALID",
      Self::NotFound => "POOL:HANDLE:NOT_FOUND",
      Self::InvalidConfig { .. } => "POOL:CONFIG:INVALID",
      Self::Corrupted { .. } => "POOL:SYSTEM:CORRUPTED",
    }
  }

  /// Only bookkeeping exhaustion may go away on its own.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::AllocationFailure { .. })
  }

  pub(crate) fn allocation_failure(
    what: &'static str,
    requested: usize,
  ) -> Self {
    tracing::warn!(what, requested, "bookkeeping growth failed");
    Self::AllocationFailure { what, requested }
  }

  pub(crate) fn invalid_config(
    reason: impl Into<String>,
  ) -> Self {
    Self::InvalidConfig {
      reason: reason.into(),
    }
  }

  pub(crate) fn corrupted(
    details: impl Into<String>,
  ) -> Self {
    Self::Corrupted {
      details: details.into(),
    }
  }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_codes_are_distinct() {
    let errors = [
      PoolError::AlreadyInitialized,
      PoolError::AlreadyTornDown,
      PoolError::NotInitialized,
      PoolError::PoolsStillOpen { open: 1 },
      PoolError::PoolNotEmpty {
        allocations: 1,
        gaps: 2,
        bytes: 3,
      },
      PoolError::UnknownPool { id: 0 },
      PoolError::InvalidCapacity { capacity: 0 },
      PoolError::AllocationFailure {
        what: "gap index",
        requested: 80,
      },
      PoolError::InvalidHandle,
      PoolError::NotFound,
      PoolError::invalid_config("x"),
      PoolError::corrupted("y"),
    ];

    let mut codes: Vec<_> = errors.iter().map(PoolError::code).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), errors.len());
  }

  #[test]
  fn test_retryable() {
    assert!(
      PoolError::AllocationFailure {
        what: "segment table",
        requested: 80
      }
      .is_retryable()
    );
    assert!(!PoolError::InvalidHandle.is_retryable());
    assert!(!PoolError::PoolsStillOpen { open: 2 }.is_retryable());
  }

  #[test]
  fn test_messages() {
    let err = PoolError::PoolNotEmpty {
      allocations: 2,
      gaps: 3,
      bytes: 300,
    };
    assert_eq!(
      err.to_string(),
      "pool is not empty: 2 allocation(s), 3 gap(s), 300 byte(s) in use"
    );
    assert_eq!(
      PoolError::UnknownPool { id: 7 }.to_string(),
      "no open pool with id 7"
    );
  }
}
