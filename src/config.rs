//! Registry and pool configuration.

use crate::{error::Result, growth::GrowthPolicy};

/// Registry slots reserved by `init`.
pub const REGISTRY_INITIAL_CAPACITY: usize = 20;
/// Segment slots reserved when a pool opens.
pub const SEGMENT_TABLE_INITIAL_CAPACITY: usize = 40;
/// Gap entries reserved when a pool opens.
pub const GAP_INDEX_INITIAL_CAPACITY: usize = 40;

/// Per-pool bookkeeping and debugging knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
  /// Growth of the segment table.
  pub segment_table: GrowthPolicy,
  /// Growth of the gap index.
  pub gap_index: GrowthPolicy,
  /// Byte written over a range when it is allocated (for debugging)
  pub alloc_pattern: Option<u8>,
  /// Byte written over a range when it is released (for debugging)
  pub release_pattern: Option<u8>,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      segment_table: GrowthPolicy::new(SEGMENT_TABLE_INITIAL_CAPACITY),
      gap_index: GrowthPolicy::new(GAP_INDEX_INITIAL_CAPACITY),
      alloc_pattern: if cfg!(debug_assertions) {
        Some(0xBB)
      } else {
        None
      },
      release_pattern: if cfg!(debug_assertions) {
        Some(0xDD)
      } else {
        None
      },
    }
  }
}

impl PoolConfig {
  /// No fill patterns.
  #[must_use]
  pub fn production() -> Self {
    Self {
      alloc_pattern: None,
      release_pattern: None,
      ..Self::default()
    }
  }

  /// Fill patterns on, so stale reads stand out.
  #[must_use]
  pub fn debug() -> Self {
    Self {
      alloc_pattern: Some(0xBB),
      release_pattern: Some(0xDD),
      ..Self::default()
    }
  }

  #[must_use]
  pub fn with_segment_table(
    mut self,
    policy: GrowthPolicy,
  ) -> Self {
    self.segment_table = policy;
    self
  }

  #[must_use]
  pub fn with_gap_index(
    mut self,
    policy: GrowthPolicy,
  ) -> Self {
    self.gap_index = policy;
    self
  }

  #[must_use]
  pub fn with_alloc_pattern(
    mut self,
    pattern: Option<u8>,
  ) -> Self {
    self.alloc_pattern = pattern;
    self
  }

  #[must_use]
  pub fn with_release_pattern(
    mut self,
    pattern: Option<u8>,
  ) -> Self {
    self.release_pattern = pattern;
    self
  }

  pub fn validate(
    &self,
  ) -> Result<()> {
    self.segment_table.validate()?;
    self.gap_index.validate()
  }
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
  /// Growth of the pool slot array.
  pub store: GrowthPolicy,
  /// Configuration used by `open_pool`.
  pub pool: PoolConfig,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      store: GrowthPolicy::new(REGISTRY_INITIAL_CAPACITY),
      pool: PoolConfig::default(),
    }
  }
}

impl RegistryConfig {
  pub fn validate(
    &self,
  ) -> Result<()> {
    self.store.validate()?;
    self.pool.validate()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = RegistryConfig::default();
    assert_eq!(config.store.initial_capacity, 20);
    assert_eq!(config.pool.segment_table.initial_capacity, 40);
    assert_eq!(config.pool.gap_index.initial_capacity, 40);
    assert_eq!(config.pool.gap_index.load_factor, 0.75);
    assert_eq!(config.pool.gap_index.expand_factor, 2);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_presets() {
    let production = PoolConfig::production();
    assert_eq!(production.alloc_pattern, None);
    assert_eq!(production.release_pattern, None);

    let debug = PoolConfig::debug();
    assert_eq!(debug.alloc_pattern, Some(0xBB));
    assert_eq!(debug.release_pattern, Some(0xDD));
  }

  #[test]
  fn test_builder_and_validation() {
    let config = PoolConfig::production()
      .with_gap_index(GrowthPolicy::new(2).with_max_capacity(3))
      .with_alloc_pattern(Some(0x11));
    assert_eq!(config.gap_index.max_capacity, Some(3));
    assert_eq!(config.alloc_pattern, Some(0x11));
    assert!(config.validate().is_ok());

    let broken = PoolConfig::default().with_segment_table(GrowthPolicy::new(0));
    assert!(broken.validate().is_err());
  }
}
