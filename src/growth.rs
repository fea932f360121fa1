//! Fill-factor growth shared by every growable bookkeeping array.

use crate::error::{PoolError, Result};

/// Load factor at which a structure expands.
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Multiplier applied to the capacity on expansion.
pub const DEFAULT_EXPAND_FACTOR: usize = 2;

/// How a bookkeeping array grows.
///
/// ```text
///   occupied / capacity > load_factor  ==>  capacity *= expand_factor
///
///   ┌────────────────────────────┬──────────┐
///   │ 0 .. 30 occupied           │   free   │   capacity 40
///   └────────────────────────────┴──────────┘
///                                ▲
///                                └── the 31st entry triggers 40 -> 80
/// ```
///
/// `max_capacity` caps the number of entries. Growth past it is reported as
/// an allocation failure, exactly like the system allocator refusing memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthPolicy {
  /// Capacity reserved up front.
  pub initial_capacity: usize,
  /// Occupancy ratio that triggers expansion.
  pub load_factor: f32,
  /// Capacity multiplier on expansion.
  pub expand_factor: usize,
  /// Hard limit on entries.
  pub max_capacity: Option<usize>,
}

impl GrowthPolicy {
  pub const fn new(
    initial_capacity: usize,
  ) -> Self {
    Self {
      initial_capacity,
      load_factor: DEFAULT_LOAD_FACTOR,
      expand_factor: DEFAULT_EXPAND_FACTOR,
      max_capacity: None,
    }
  }

  #[must_use]
  pub const fn with_max_capacity(
    mut self,
    max_capacity: usize,
  ) -> Self {
    self.max_capacity = Some(max_capacity);
    self
  }

  pub fn validate(
    &self,
  ) -> Result<()> {
    if self.initial_capacity == 0 {
      return Err(PoolError::invalid_config("initial capacity must be non-zero"));
    }
    if !(self.load_factor > 0.0 && self.load_factor <= 1.0) {
      return Err(PoolError::invalid_config(format!(
        "load factor {} is outside (0, 1]",
        self.load_factor
      )));
    }
    if self.expand_factor < 2 {
      return Err(PoolError::invalid_config(format!(
        "expand factor {} must be at least 2",
        self.expand_factor
      )));
    }
    if self.max_capacity == Some(0) {
      return Err(PoolError::invalid_config("max capacity must be non-zero"));
    }
    Ok(())
  }

  fn exceeds_load(
    &self,
    occupied: usize,
    capacity: usize,
  ) -> bool {
    occupied as f64 > capacity as f64 * f64::from(self.load_factor)
  }

  /// Capacity needed to hold `occupied` entries, or `None` when the current
  /// one suffices.
  fn target_capacity(
    &self,
    occupied: usize,
    capacity: usize,
  ) -> Option<usize> {
    if !self.exceeds_load(occupied, capacity) {
      return None;
    }

    let mut target = capacity.max(1);
    while self.exceeds_load(occupied, target) {
      target = target.checked_mul(self.expand_factor)?;
    }
    Some(target)
  }

  /// Allocates an empty array with the initial capacity.
  pub(crate) fn allocate<T>(
    &self,
    what: &'static str,
  ) -> Result<Vec<T>> {
    let initial = match self.max_capacity {
      Some(max) => self.initial_capacity.min(max),
      None => self.initial_capacity,
    };

    let mut buf = Vec::new();
    buf
      .try_reserve_exact(initial)
      .map_err(|_| PoolError::allocation_failure(what, initial))?;
    Ok(buf)
  }

  /// Makes room for `additional` more entries.
  ///
  /// On failure `buf` is left untouched.
  pub(crate) fn reserve<T>(
    &self,
    buf: &mut Vec<T>,
    additional: usize,
    what: &'static str,
  ) -> Result<()> {
    let occupied = buf
      .len()
      .checked_add(additional)
      .ok_or_else(|| PoolError::allocation_failure(what, usize::MAX))?;

    if let Some(max) = self.max_capacity {
      if occupied > max {
        return Err(PoolError::allocation_failure(what, occupied));
      }
    }

    let Some(mut target) = self.target_capacity(occupied, buf.capacity()) else {
      return Ok(());
    };
    if let Some(max) = self.max_capacity {
      target = target.min(max);
    }
    let target = target.max(occupied);

    buf
      .try_reserve_exact(target - buf.len())
      .map_err(|_| PoolError::allocation_failure(what, target))
  }
}
