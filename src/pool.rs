use std::{fmt, str::FromStr};

use tracing::{debug, trace};

use crate::{
  buffer::Buffer,
  config::PoolConfig,
  error::{PoolError, Result},
  gap::GapIndex,
  registry::PoolId,
  segment::{SegmentId, SegmentTable},
};

/// How a pool picks the free segment for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Policy {
  /// First sufficient free segment in address order.
  #[default]
  FirstFit,
  /// Smallest sufficient free segment, lowest offset on ties.
  BestFit,
}

impl fmt::Display for Policy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::FirstFit => f.write_str("first-fit"),
      Self::BestFit => f.write_str("best-fit"),
    }
  }
}

impl FromStr for Policy {
  type Err = PoolError;

  fn from_str(
    s: &str,
  ) -> Result<Self> {
    match s {
      "first-fit" | "first_fit" | "FIRST_FIT" => Ok(Self::FirstFit),
      "best-fit" | "best_fit" | "BEST_FIT" => Ok(Self::BestFit),
      other => Err(PoolError::invalid_config(format!("unknown policy '{other}'"))),
    }
  }
}

/// A live allocation inside a pool.
///
/// Handles are plain values: copying one does not duplicate the allocation,
/// and a handle outliving its release is rejected by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
  pool: PoolId,
  segment: SegmentId,
  offset: usize,
  size: usize,
}

impl Allocation {
  pub fn pool(
    &self,
  ) -> PoolId {
    self.pool
  }

  /// Byte offset of the allocation inside the pool's buffer.
  pub fn offset(
    &self,
  ) -> usize {
    self.offset
  }

  pub fn size(
    &self,
  ) -> usize {
    self.size
  }
}

/// One entry of an inspection snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
  pub offset: usize,
  pub size: usize,
  pub allocated: bool,
}

impl fmt::Display for SegmentInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "{:>10} {:>10}  {}",
      self.offset,
      self.size,
      if self.allocated { "ALLOC" } else { "gap" }
    )
  }
}

/// Pool-level counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
  pub capacity: usize,
  pub bytes_allocated: usize,
  pub allocations: usize,
  pub gaps: usize,
  /// Segments in the chain.
  pub segments: usize,
  /// Segment table slots, live or vacant.
  pub slots: usize,
  pub policy: Policy,
}

impl fmt::Display for PoolStats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "{}: {}/{} bytes in {} allocation(s), {} gap(s), {} segment(s) over {} slot(s)",
      self.policy,
      self.bytes_allocated,
      self.capacity,
      self.allocations,
      self.gaps,
      self.segments,
      self.slots
    )
  }
}

/// One backing buffer and its bookkeeping.
///
/// ```text
///   buffer:  ┌────────┬──────────────┬───────────────────────────┐
///            │ A 100  │    gap 200   │          A 700            │
///            └────────┴──────────────┴───────────────────────────┘
///   table:   chain of segments partitioning [0, capacity)
///   gaps:    [ 200 @ 100 ]
/// ```
pub struct Pool {
  id: PoolId,
  policy: Policy,
  config: PoolConfig,
  buffer: Buffer,
  table: SegmentTable,
  gaps: GapIndex,
  bytes_allocated: usize,
  allocations: usize,
}

impl Pool {
  pub(crate) fn open(
    id: PoolId,
    capacity: usize,
    policy: Policy,
    config: PoolConfig,
  ) -> Result<Self> {
    if capacity == 0 {
      return Err(PoolError::InvalidCapacity { capacity });
    }
    config.validate()?;

    // Each step owns what it allocated, so an early return releases it.
    let buffer = Buffer::zeroed(capacity)?;
    let table = SegmentTable::new(capacity, config.segment_table)?;
    let mut gaps = GapIndex::new(config.gap_index)?;
    gaps.add(capacity, 0, table.id(SegmentTable::HEAD))?;

    debug!(pool = %id, capacity, %policy, "pool opened");

    Ok(Self {
      id,
      policy,
      config,
      buffer,
      table,
      gaps,
      bytes_allocated: 0,
      allocations: 0,
    })
  }

  pub fn id(
    &self,
  ) -> PoolId {
    self.id
  }

  pub fn policy(
    &self,
  ) -> Policy {
    self.policy
  }

  pub fn capacity(
    &self,
  ) -> usize {
    self.buffer.len()
  }

  pub fn stats(
    &self,
  ) -> PoolStats {
    PoolStats {
      capacity: self.capacity(),
      bytes_allocated: self.bytes_allocated,
      allocations: self.allocations,
      gaps: self.gaps.len(),
      segments: self.table.live(),
      slots: self.table.slots(),
      policy: self.policy,
    }
  }

  /// True when the pool is back to a single free segment.
  pub fn is_pristine(
    &self,
  ) -> bool {
    self.allocations == 0 && self.gaps.len() == 1 && self.bytes_allocated == 0
  }

  /// Carves `size` bytes out of the pool.
  ///
  /// Returns `Ok(None)` when no free segment can hold `size` bytes (or
  /// `size` is zero). An error means bookkeeping storage could not grow;
  /// the pool is then unchanged.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<Allocation>> {
    if size == 0 || self.gaps.is_empty() {
      return Ok(None);
    }

    let found = match self.policy {
      Policy::FirstFit => self.first_fit(size),
      Policy::BestFit => self.best_fit(size),
    };
    let Some(index) = found else {
      trace!(pool = %self.id, size, "no gap large enough");
      return Ok(None);
    };

    let (offset, available) = {
      let segment = self.table.get(index);
      debug_assert!(segment.in_use && !segment.allocated && segment.size >= size);
      (segment.offset, segment.size)
    };
    let id = self.table.id(index);

    if available > size {
      self.table.reserve_slot()?;
    }
    self.gaps.remove(id)?;

    // Nothing below can fail.
    if available > size {
      let remainder = self.table.split(index, size);
      let rest = self.table.get(remainder);
      self
        .gaps
        .add_reserved(rest.size, rest.offset, self.table.id(remainder));
    }
    self.table.get_mut(index).allocated = true;

    self.allocations += 1;
    self.bytes_allocated += size;
    if let Some(pattern) = self.config.alloc_pattern {
      self.buffer.fill(offset, size, pattern);
    }

    trace!(pool = %self.id, size, offset, "allocated");
    self.debug_check();

    Ok(Some(Allocation {
      pool: self.id,
      segment: id,
      offset,
      size,
    }))
  }

  fn first_fit(
    &self,
    size: usize,
  ) -> Option<u32> {
    self
      .table
      .chain()
      .find(|(_, segment)| !segment.allocated && segment.size >= size)
      .map(|(index, _)| index)
  }

  fn best_fit(
    &self,
    size: usize,
  ) -> Option<u32> {
    self.gaps.best_fit(size).map(|entry| entry.segment.index())
  }

  /// Returns an allocation to the pool, merging it with free neighbors.
  pub fn release(
    &mut self,
    allocation: Allocation,
  ) -> Result<()> {
    let index = self.resolve(allocation)?;

    let (offset, size, prev, next) = {
      let segment = self.table.get(index);
      (segment.offset, segment.size, segment.prev, segment.next)
    };
    let next_free = next.filter(|&next| !self.table.get(next).allocated);
    let prev_free = prev.filter(|&prev| !self.table.get(prev).allocated);

    // Without a merge the gap index gains an entry.
    if next_free.is_none() && prev_free.is_none() {
      self.gaps.reserve(1)?;
    }

    self.table.get_mut(index).allocated = false;
    self.table.invalidate(index);
    self.allocations -= 1;
    self.bytes_allocated -= size;
    if let Some(pattern) = self.config.release_pattern {
      self.buffer.fill(offset, size, pattern);
    }

    let mut survivor = index;
    if let Some(next) = next_free {
      self.forget_gap(next);
      self.table.merge(index, next);
      trace!(pool = %self.id, offset, "merged with next gap");
    }
    if let Some(prev) = prev_free {
      self.forget_gap(prev);
      self.table.merge(prev, index);
      survivor = prev;
      trace!(pool = %self.id, offset, "merged into previous gap");
    }

    let merged = self.table.get(survivor);
    self
      .gaps
      .add_reserved(merged.size, merged.offset, self.table.id(survivor));

    trace!(pool = %self.id, size, offset, "released");
    self.debug_check();
    Ok(())
  }

  fn forget_gap(
    &mut self,
    index: u32,
  ) {
    let removed = self.gaps.remove(self.table.id(index));
    debug_assert!(removed.is_ok(), "free segment missing from gap index");
  }

  /// Maps a handle to its slot, rejecting anything not live in this pool.
  fn resolve(
    &self,
    allocation: Allocation,
  ) -> Result<u32> {
    if allocation.pool != self.id {
      return Err(PoolError::InvalidHandle);
    }

    self
      .table
      .resolve(allocation.segment)
      .filter(|segment| {
        segment.allocated && segment.offset == allocation.offset && segment.size == allocation.size
      })
      .ok_or(PoolError::InvalidHandle)?;

    Ok(allocation.segment.index())
  }

  /// The bytes behind a live allocation.
  pub fn bytes(
    &self,
    allocation: Allocation,
  ) -> Result<&[u8]> {
    let index = self.resolve(allocation)?;
    let segment = self.table.get(index);
    Ok(self.buffer.range(segment.offset, segment.size))
  }

  pub fn bytes_mut(
    &mut self,
    allocation: Allocation,
  ) -> Result<&mut [u8]> {
    let index = self.resolve(allocation)?;
    let (offset, size) = {
      let segment = self.table.get(index);
      (segment.offset, segment.size)
    };
    Ok(self.buffer.range_mut(offset, size))
  }

  /// Segments in address order.
  pub fn segments(
    &self,
  ) -> impl Iterator<Item = SegmentInfo> + '_ {
    self.table.chain().map(|(_, segment)| SegmentInfo {
      offset: segment.offset,
      size: segment.size,
      allocated: segment.allocated,
    })
  }

  /// Snapshot of every segment, in address order.
  pub fn inspect(
    &self,
  ) -> Vec<SegmentInfo> {
    self.segments().collect()
  }

  fn debug_check(
    &self,
  ) {
    debug_assert_eq!(
      self.gaps.len() + self.allocations,
      self.table.live(),
      "every segment is either a gap or an allocation"
    );
  }

  /// Audits the whole pool: the chain must partition the buffer, counters
  /// must match the segments, and the gap index must hold exactly the free
  /// segments in order.
  pub fn validate(
    &self,
  ) -> Result<()> {
    let mut expected_offset = 0;
    let mut prev = None;
    let mut bytes = 0;
    let mut allocations = 0;
    let mut free = 0;
    let mut walked = 0;

    for (index, segment) in self.table.chain() {
      walked += 1;
      if walked > self.table.slots() {
        return Err(PoolError::corrupted("segment chain has a cycle"));
      }
      if !segment.in_use {
        return Err(PoolError::corrupted(format!("slot {index} is chained but not in use")));
      }
      if segment.offset != expected_offset {
        return Err(PoolError::corrupted(format!(
          "segment at slot {index} starts at {} instead of {expected_offset}",
          segment.offset
        )));
      }
      if segment.size == 0 {
        return Err(PoolError::corrupted(format!("segment at slot {index} is empty")));
      }
      if segment.prev != prev {
        return Err(PoolError::corrupted(format!("slot {index} has a broken prev link")));
      }

      let id = self.table.id(index);
      let entries = self
        .gaps
        .entries()
        .iter()
        .filter(|entry| entry.segment == id)
        .count();
      if segment.allocated {
        allocations += 1;
        bytes += segment.size;
        if entries != 0 {
          return Err(PoolError::corrupted(format!("allocated slot {index} is in the gap index")));
        }
      } else {
        free += 1;
        if entries != 1 {
          return Err(PoolError::corrupted(format!(
            "free slot {index} has {entries} gap index entries"
          )));
        }
      }

      expected_offset = segment.end();
      prev = Some(index);
    }

    if expected_offset != self.capacity() {
      return Err(PoolError::corrupted(format!(
        "segments cover {expected_offset} of {} bytes",
        self.capacity()
      )));
    }
    if walked != self.table.live() {
      return Err(PoolError::corrupted(format!(
        "chain holds {walked} segments, table counts {}",
        self.table.live()
      )));
    }
    if allocations != self.allocations || bytes != self.bytes_allocated {
      return Err(PoolError::corrupted(format!(
        "counters say {} allocation(s) / {} bytes, segments say {allocations} / {bytes}",
        self.allocations, self.bytes_allocated
      )));
    }
    if free != self.gaps.len() {
      return Err(PoolError::corrupted(format!(
        "{free} free segment(s) but {} gap index entries",
        self.gaps.len()
      )));
    }

    for pair in self.gaps.entries().windows(2) {
      let (a, b) = (pair[0], pair[1]);
      if a.size < b.size || (a.size == b.size && a.offset >= b.offset) {
        return Err(PoolError::corrupted("gap index out of order"));
      }
    }
    for entry in self.gaps.entries() {
      match self.table.resolve(entry.segment) {
        Some(segment) if segment.size == entry.size && segment.offset == entry.offset => {}
        _ => return Err(PoolError::corrupted("gap index entry does not match its segment")),
      }
    }

    Ok(())
  }
}

impl fmt::Debug for Pool {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Pool")
      .field("id", &self.id)
      .field("stats", &self.stats())
      .finish()
  }
}
