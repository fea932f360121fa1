//! Segment records and the address-ordered chain over a pool's buffer.
//!
//! ```text
//!   slots:   [0: 0..100 A] [1: 300..1000 F] [2: 100..300 F] [3: unused]
//!   chain:    0 ──► 2 ──► 1
//!   vacant:   [3]
//! ```
//!
//! Storage reuse (the vacant stack) and logical order (the prev/next links)
//! are independent: a slot's position in `slots` says nothing about where
//! its segment sits in the buffer.

use crate::{
  error::{PoolError, Result},
  growth::GrowthPolicy,
};

/// Stable identity of a segment: slot index plus the slot's generation.
///
/// A slot's generation advances whenever the segment it held stops being
/// addressable, so a stale id never matches a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId {
  index: u32,
  generation: u32,
}

impl SegmentId {
  #[cfg(test)]
  pub(crate) const fn new(
    index: u32,
    generation: u32,
  ) -> Self {
    Self { index, generation }
  }

  pub(crate) fn index(
    self,
  ) -> u32 {
    self.index
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
  pub offset: usize,
  pub size: usize,
  pub allocated: bool,
  pub in_use: bool,
  pub generation: u32,
  pub prev: Option<u32>,
  pub next: Option<u32>,
}

impl Segment {
  fn vacant() -> Self {
    Self {
      offset: 0,
      size: 0,
      allocated: false,
      in_use: false,
      generation: 0,
      prev: None,
      next: None,
    }
  }

  pub fn end(
    &self,
  ) -> usize {
    self.offset + self.size
  }

  fn invalidate(
    &mut self,
  ) {
    self.generation = self.generation.wrapping_add(1);
  }
}

pub(crate) struct SegmentTable {
  slots: Vec<Segment>,
  vacant: Vec<u32>,
  live: usize,
  policy: GrowthPolicy,
}

impl SegmentTable {
  /// The head segment never moves: merges always keep the lower address.
  pub const HEAD: u32 = 0;

  /// Creates a table holding a single free segment covering `capacity` bytes.
  pub fn new(
    capacity: usize,
    policy: GrowthPolicy,
  ) -> Result<Self> {
    let mut slots = policy.allocate("segment table")?;
    let mut vacant = Vec::new();
    vacant
      .try_reserve_exact(slots.capacity())
      .map_err(|_| PoolError::allocation_failure("vacant slot stack", slots.capacity()))?;

    slots.push(Segment {
      size: capacity,
      in_use: true,
      ..Segment::vacant()
    });

    Ok(Self {
      slots,
      vacant,
      live: 1,
      policy,
    })
  }

  pub fn get(
    &self,
    index: u32,
  ) -> &Segment {
    &self.slots[index as usize]
  }

  pub fn get_mut(
    &mut self,
    index: u32,
  ) -> &mut Segment {
    &mut self.slots[index as usize]
  }

  pub fn id(
    &self,
    index: u32,
  ) -> SegmentId {
    SegmentId {
      index,
      generation: self.get(index).generation,
    }
  }

  /// Looks up a live segment by id; stale or vacant ids resolve to `None`.
  pub fn resolve(
    &self,
    id: SegmentId,
  ) -> Option<&Segment> {
    self
      .slots
      .get(id.index as usize)
      .filter(|segment| segment.in_use && segment.generation == id.generation)
  }

  /// Number of segments currently in the chain.
  pub fn live(
    &self,
  ) -> usize {
    self.live
  }

  /// Number of slots ever created, live or vacant.
  pub fn slots(
    &self,
  ) -> usize {
    self.slots.len()
  }

  /// Guarantees that the next [`split`](Self::split) will not allocate.
  pub fn reserve_slot(
    &mut self,
  ) -> Result<()> {
    if !self.vacant.is_empty() {
      return Ok(());
    }

    slot_index(self.slots.len())?;
    self.policy.reserve(&mut self.slots, 1, "segment table")?;

    // Every slot may end up vacant at once; keep the stack able to hold them.
    let needed = self.slots.capacity().saturating_sub(self.vacant.len());
    self
      .vacant
      .try_reserve_exact(needed)
      .map_err(|_| PoolError::allocation_failure("vacant slot stack", self.slots.capacity()))
  }

  /// Shrinks segment `index` to `size` bytes and chains a new free segment
  /// holding the remainder right after it. Returns the remainder's index.
  ///
  /// Callers must have called [`reserve_slot`](Self::reserve_slot).
  pub fn split(
    &mut self,
    index: u32,
    size: usize,
  ) -> u32 {
    let (offset, old_size, next) = {
      let segment = self.get(index);
      debug_assert!(size < segment.size, "split must leave a remainder");
      (segment.offset, segment.size, segment.next)
    };

    let remainder = Segment {
      offset: offset + size,
      size: old_size - size,
      allocated: false,
      in_use: true,
      generation: 0,
      prev: Some(index),
      next,
    };

    let slot = match self.vacant.pop() {
      Some(slot) => {
        let generation = self.get(slot).generation;
        *self.get_mut(slot) = Segment {
          generation,
          ..remainder
        };
        slot
      }
      None => {
        debug_assert!(self.slots.len() < self.slots.capacity(), "slot not reserved");
        // `reserve_slot` checked that this index fits.
        let slot = self.slots.len() as u32;
        self.slots.push(remainder);
        slot
      }
    };

    if let Some(next) = next {
      self.get_mut(next).prev = Some(slot);
    }
    let segment = self.get_mut(index);
    segment.size = size;
    segment.next = Some(slot);

    self.live += 1;
    slot
  }

  /// Folds `absorbed`, the segment right after `survivor`, into `survivor`
  /// and retires the absorbed slot.
  pub fn merge(
    &mut self,
    survivor: u32,
    absorbed: u32,
  ) {
    debug_assert_eq!(self.get(survivor).next, Some(absorbed), "merge of non-adjacent segments");
    let (size, next) = {
      let victim = self.get(absorbed);
      (victim.size, victim.next)
    };

    let segment = self.get_mut(survivor);
    segment.size += size;
    segment.next = next;
    if let Some(next) = next {
      self.get_mut(next).prev = Some(survivor);
    }

    let victim = self.get_mut(absorbed);
    victim.in_use = false;
    victim.allocated = false;
    victim.prev = None;
    victim.next = None;
    victim.invalidate();

    self.vacant.push(absorbed);
    self.live -= 1;
  }

  /// Advances the generation of `index`, orphaning ids handed out for it.
  pub fn invalidate(
    &mut self,
    index: u32,
  ) -> SegmentId {
    self.get_mut(index).invalidate();
    self.id(index)
  }

  /// Walks the chain from the head in address order.
  pub fn chain(
    &self,
  ) -> Chain<'_> {
    Chain {
      table: self,
      cursor: Some(Self::HEAD),
    }
  }
}

pub(crate) struct Chain<'a> {
  table: &'a SegmentTable,
  cursor: Option<u32>,
}

impl<'a> Iterator for Chain<'a> {
  type Item = (u32, &'a Segment);

  fn next(
    &mut self,
  ) -> Option<Self::Item> {
    let index = self.cursor?;
    let segment = self.table.get(index);
    self.cursor = segment.next;
    Some((index, segment))
  }
}

/// Index the slot pushed at position `len` will carry.
fn slot_index(
  len: usize,
) -> Result<u32> {
  u32::try_from(len).map_err(|_| PoolError::allocation_failure("segment table", len + 1))
}
