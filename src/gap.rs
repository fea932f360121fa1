//! Searchable record of a pool's free segments.

use crate::{
  error::{PoolError, Result},
  growth::GrowthPolicy,
  segment::SegmentId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GapEntry {
  pub size: usize,
  pub offset: usize,
  pub segment: SegmentId,
}

impl GapEntry {
  /// Index order: larger gaps first, lower offsets first among equals.
  fn precedes(
    &self,
    other: &GapEntry,
  ) -> bool {
    self.size > other.size || (self.size == other.size && self.offset < other.offset)
  }
}

/// Free segments sorted by descending size, then ascending offset.
///
/// ```text
///   [ 600 @ 400 | 200 @ 100 | 200 @ 900 | 50 @ 0 ]
///     ◄── larger                    smaller ──►
/// ```
///
/// Offsets are unique within a pool, so the order is total and an insert
/// never reorders existing entries.
pub(crate) struct GapIndex {
  entries: Vec<GapEntry>,
  policy: GrowthPolicy,
}

impl GapIndex {
  pub fn new(
    policy: GrowthPolicy,
  ) -> Result<Self> {
    Ok(Self {
      entries: policy.allocate("gap index")?,
      policy,
    })
  }

  pub fn len(
    &self,
  ) -> usize {
    self.entries.len()
  }

  pub fn is_empty(
    &self,
  ) -> bool {
    self.entries.is_empty()
  }

  pub fn entries(
    &self,
  ) -> &[GapEntry] {
    &self.entries
  }

  /// Guarantees room for `additional` adds without further allocation.
  pub fn reserve(
    &mut self,
    additional: usize,
  ) -> Result<()> {
    self.policy.reserve(&mut self.entries, additional, "gap index")
  }

  pub fn add(
    &mut self,
    size: usize,
    offset: usize,
    segment: SegmentId,
  ) -> Result<()> {
    self.reserve(1)?;
    self.add_reserved(size, offset, segment);
    Ok(())
  }

  /// Adds without consulting the growth policy. Callers either reserved
  /// room or removed an entry in the same operation.
  pub fn add_reserved(
    &mut self,
    size: usize,
    offset: usize,
    segment: SegmentId,
  ) {
    debug_assert!(self.entries.len() < self.entries.capacity(), "gap index not reserved");

    let entry = GapEntry {
      size,
      offset,
      segment,
    };
    let position = self.entries.partition_point(|e| e.precedes(&entry));
    self.entries.insert(position, entry);
  }

  pub fn remove(
    &mut self,
    segment: SegmentId,
  ) -> Result<GapEntry> {
    let position = self
      .entries
      .iter()
      .position(|e| e.segment == segment)
      .ok_or(PoolError::NotFound)?;

    Ok(self.entries.remove(position))
  }

  /// Smallest gap of at least `size` bytes, lowest offset on ties.
  pub fn best_fit(
    &self,
    size: usize,
  ) -> Option<GapEntry> {
    // Entries holding `size` or more form a prefix.
    let fits = self.entries.partition_point(|e| e.size >= size);
    let tightest = self.entries[..fits].last()?.size;
    let first = self.entries.partition_point(|e| e.size > tightest);
    Some(self.entries[first])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn id(
    index: u32,
  ) -> SegmentId {
    SegmentId::new(index, 0)
  }

  fn order(
    index: &GapIndex,
  ) -> Vec<(usize, usize)> {
    index.entries().iter().map(|e| (e.size, e.offset)).collect()
  }

  #[test]
  fn test_add_keeps_order() {
    let mut index = GapIndex::new(GrowthPolicy::new(4)).unwrap();
    index.add(200, 900, id(0)).unwrap();
    index.add(50, 0, id(1)).unwrap();
    index.add(600, 400, id(2)).unwrap();
    index.add(200, 100, id(3)).unwrap();

    assert_eq!(order(&index), vec![(600, 400), (200, 100), (200, 900), (50, 0)]);
  }

  #[test]
  fn test_remove_preserves_remaining_order() {
    let mut index = GapIndex::new(GrowthPolicy::new(4)).unwrap();
    index.add(30, 0, id(0)).unwrap();
    index.add(20, 40, id(1)).unwrap();
    index.add(10, 70, id(2)).unwrap();

    let removed = index.remove(id(1)).unwrap();
    assert_eq!(removed.size, 20);
    assert_eq!(order(&index), vec![(30, 0), (10, 70)]);
    assert_eq!(index.len(), 2);
  }

  #[test]
  fn test_remove_unknown_segment() {
    let mut index = GapIndex::new(GrowthPolicy::new(4)).unwrap();
    index.add(30, 0, id(0)).unwrap();

    assert_eq!(index.remove(id(5)), Err(PoolError::NotFound));
    assert_eq!(index.remove(SegmentId::new(0, 1)), Err(PoolError::NotFound));
    assert_eq!(index.len(), 1);
  }

  #[test]
  fn test_best_fit() {
    let mut index = GapIndex::new(GrowthPolicy::new(8)).unwrap();
    index.add(300, 0, id(0)).unwrap();
    index.add(50, 500, id(1)).unwrap();
    index.add(400, 900, id(2)).unwrap();
    index.add(120, 1400, id(3)).unwrap();
    index.add(120, 1600, id(4)).unwrap();

    assert_eq!(index.best_fit(60).unwrap().offset, 1400);
    assert_eq!(index.best_fit(120).unwrap().offset, 1400);
    assert_eq!(index.best_fit(121).unwrap().offset, 0);
    assert_eq!(index.best_fit(350).unwrap().offset, 900);
    assert_eq!(index.best_fit(1).unwrap().offset, 500);
    assert!(index.best_fit(401).is_none());
  }

  #[test]
  fn test_best_fit_on_empty_index() {
    let index = GapIndex::new(GrowthPolicy::new(4)).unwrap();
    assert!(index.best_fit(1).is_none());
  }

  #[test]
  fn test_failed_growth_leaves_index_intact() {
    let mut index = GapIndex::new(GrowthPolicy::new(2).with_max_capacity(2)).unwrap();
    index.add(10, 0, id(0)).unwrap();
    index.add(20, 10, id(1)).unwrap();

    assert!(matches!(
      index.add(5, 30, id(2)),
      Err(PoolError::AllocationFailure { what: "gap index", .. })
    ));
    assert_eq!(order(&index), vec![(20, 10), (10, 0)]);
  }
}
