//! Registry of open pools.
//!
//! The registry is an explicit context: create one, `init` it, open pools
//! through it, close them, `teardown`. Independent registries share nothing.

use std::{
  fmt,
  sync::atomic::{AtomicU64, Ordering},
};

use tracing::{debug, warn};

use crate::{
  config::{PoolConfig, RegistryConfig},
  error::{PoolError, Result},
  pool::{Allocation, Policy, Pool, SegmentInfo},
};

/// Source of registry generations. Every `init` draws a fresh one.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identifies a pool: the registry generation that opened it plus its slot.
///
/// Slots are never reused within a generation and generations are never
/// reused within a process, so the id of a closed pool stays dead, including
/// across `teardown` and re-`init` and across independent registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId {
  generation: u64,
  slot: u32,
}

impl PoolId {
  pub(crate) const fn new(
    generation: u64,
    slot: u32,
  ) -> Self {
    Self { generation, slot }
  }

  /// Position of the pool in its registry.
  pub fn slot(
    self,
  ) -> u32 {
    self.slot
  }
}

impl fmt::Display for PoolId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "pool#{}.{}", self.generation, self.slot)
  }
}

/// Owns every open pool and gates the allocator's lifecycle.
#[derive(Debug, Default)]
pub struct Registry {
  config: RegistryConfig,
  /// Drawn from `NEXT_GENERATION` by each `init`; stamped into every `PoolId`.
  generation: u64,
  /// `None` until `init`, and again after `teardown`.
  store: Option<Vec<Option<Pool>>>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(
    config: RegistryConfig,
  ) -> Self {
    Self {
      config,
      generation: 0,
      store: None,
    }
  }

  pub fn config(
    &self,
  ) -> &RegistryConfig {
    &self.config
  }

  pub fn is_initialized(
    &self,
  ) -> bool {
    self.store.is_some()
  }

  pub fn init(
    &mut self,
  ) -> Result<()> {
    if self.store.is_some() {
      warn!("registry init called twice");
      return Err(PoolError::AlreadyInitialized);
    }
    self.config.validate()?;

    self.store = Some(self.config.store.allocate("pool registry")?);
    self.generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    debug!(
      generation = self.generation,
      capacity = self.config.store.initial_capacity,
      "registry initialized"
    );
    Ok(())
  }

  pub fn teardown(
    &mut self,
  ) -> Result<()> {
    let Some(store) = &self.store else {
      warn!("registry teardown called twice");
      return Err(PoolError::AlreadyTornDown);
    };

    let open = store.iter().flatten().count();
    if open > 0 {
      warn!(open, "registry teardown refused");
      return Err(PoolError::PoolsStillOpen { open });
    }

    self.store = None;
    debug!("registry torn down");
    Ok(())
  }

  /// Number of pools currently open.
  pub fn open_pools(
    &self,
  ) -> usize {
    self
      .store
      .as_ref()
      .map_or(0, |store| store.iter().flatten().count())
  }

  /// Opens a pool with the registry's default pool configuration.
  pub fn open_pool(
    &mut self,
    capacity: usize,
    policy: Policy,
  ) -> Result<PoolId> {
    let config = self.config.pool.clone();
    self.open_pool_with_config(capacity, policy, config)
  }

  pub fn open_pool_with_config(
    &mut self,
    capacity: usize,
    policy: Policy,
    config: PoolConfig,
  ) -> Result<PoolId> {
    let store = self.store.as_mut().ok_or(PoolError::NotInitialized)?;

    // Make room first so a registry failure cannot strand a built pool.
    self.config.store.reserve(store, 1, "pool registry")?;
    let slot = u32::try_from(store.len())
      .map_err(|_| PoolError::allocation_failure("pool registry", store.len() + 1))?;

    let id = PoolId::new(self.generation, slot);
    let pool = Pool::open(id, capacity, policy, config)?;
    store.push(Some(pool));
    Ok(id)
  }

  pub fn close_pool(
    &mut self,
    id: PoolId,
  ) -> Result<()> {
    let pool = self.pool(id)?;
    if !pool.is_pristine() {
      let stats = pool.stats();
      warn!(pool = %id, allocations = stats.allocations, gaps = stats.gaps, "close refused");
      return Err(PoolError::PoolNotEmpty {
        allocations: stats.allocations,
        gaps: stats.gaps,
        bytes: stats.bytes_allocated,
      });
    }

    if let Some(slot) = self.slot_mut(id)? {
      *slot = None;
    }
    debug!(pool = %id, "pool closed");
    Ok(())
  }

  fn slot_mut(
    &mut self,
    id: PoolId,
  ) -> Result<Option<&mut Option<Pool>>> {
    let store = self.store.as_mut().ok_or(PoolError::NotInitialized)?;
    if id.generation != self.generation {
      return Ok(None);
    }
    Ok(store.get_mut(id.slot as usize))
  }

  pub fn pool(
    &self,
    id: PoolId,
  ) -> Result<&Pool> {
    let store = self.store.as_ref().ok_or(PoolError::NotInitialized)?;
    store
      .get(id.slot as usize)
      .filter(|_| id.generation == self.generation)
      .and_then(Option::as_ref)
      .ok_or(PoolError::UnknownPool { id: id.slot })
  }

  pub fn pool_mut(
    &mut self,
    id: PoolId,
  ) -> Result<&mut Pool> {
    self
      .slot_mut(id)?
      .and_then(Option::as_mut)
      .ok_or(PoolError::UnknownPool { id: id.slot })
  }

  pub fn allocate(
    &mut self,
    id: PoolId,
    size: usize,
  ) -> Result<Option<Allocation>> {
    self.pool_mut(id)?.allocate(size)
  }

  pub fn release(
    &mut self,
    id: PoolId,
    allocation: Allocation,
  ) -> Result<()> {
    self.pool_mut(id)?.release(allocation)
  }

  pub fn inspect(
    &self,
    id: PoolId,
  ) -> Result<Vec<SegmentInfo>> {
    Ok(self.pool(id)?.inspect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::growth::GrowthPolicy;

  fn registry() -> Registry {
    let mut registry = Registry::with_config(RegistryConfig {
      pool: PoolConfig::production(),
      ..RegistryConfig::default()
    });
    registry.init().unwrap();
    registry
  }

  #[test]
  fn test_init_and_teardown_are_gated() {
    let mut registry = Registry::new();
    assert!(!registry.is_initialized());
    assert_eq!(registry.teardown(), Err(PoolError::AlreadyTornDown));

    registry.init().unwrap();
    assert_eq!(registry.init(), Err(PoolError::AlreadyInitialized));

    registry.teardown().unwrap();
    assert_eq!(registry.teardown(), Err(PoolError::AlreadyTornDown));

    // A torn-down registry can start over.
    registry.init().unwrap();
    registry.teardown().unwrap();
  }

  #[test]
  fn test_open_requires_init() {
    let mut registry = Registry::new();
    assert_eq!(
      registry.open_pool(100, Policy::FirstFit),
      Err(PoolError::NotInitialized)
    );
  }

  #[test]
  fn test_teardown_refused_while_pools_open() {
    let mut registry = registry();
    let a = registry.open_pool(100, Policy::FirstFit).unwrap();
    let b = registry.open_pool(100, Policy::BestFit).unwrap();
    assert_eq!(registry.open_pools(), 2);

    assert_eq!(registry.teardown(), Err(PoolError::PoolsStillOpen { open: 2 }));

    registry.close_pool(a).unwrap();
    assert_eq!(registry.teardown(), Err(PoolError::PoolsStillOpen { open: 1 }));

    registry.close_pool(b).unwrap();
    registry.teardown().unwrap();
  }

  #[test]
  fn test_close_requires_pristine_pool() {
    let mut registry = registry();
    let id = registry.open_pool(100, Policy::FirstFit).unwrap();
    let a = registry.allocate(id, 40).unwrap().unwrap();

    assert_eq!(
      registry.close_pool(id),
      Err(PoolError::PoolNotEmpty {
        allocations: 1,
        gaps: 1,
        bytes: 40
      })
    );

    registry.release(id, a).unwrap();
    registry.close_pool(id).unwrap();
    registry.teardown().unwrap();
  }

  #[test]
  fn test_closed_ids_stay_dead() {
    let mut registry = registry();
    let first = registry.open_pool(10, Policy::FirstFit).unwrap();
    registry.close_pool(first).unwrap();

    let second = registry.open_pool(10, Policy::FirstFit).unwrap();
    assert_ne!(first, second);
    assert_eq!(
      registry.pool(first).unwrap_err(),
      PoolError::UnknownPool { id: first.slot() }
    );
    assert_eq!(
      registry.close_pool(first),
      Err(PoolError::UnknownPool { id: first.slot() })
    );
    assert!(registry.allocate(first, 1).is_err());

    registry.close_pool(second).unwrap();
    registry.teardown().unwrap();
  }

  #[test]
  fn test_store_grows_past_initial_capacity() {
    let mut registry = registry();
    let ids: Vec<_> = (0..50)
      .map(|_| registry.open_pool(8, Policy::BestFit).unwrap())
      .collect();
    assert_eq!(registry.open_pools(), 50);

    for id in ids {
      registry.close_pool(id).unwrap();
    }
    registry.teardown().unwrap();
  }

  #[test]
  fn test_store_limit_is_an_allocation_failure() {
    let mut registry = Registry::with_config(RegistryConfig {
      store: GrowthPolicy::new(2).with_max_capacity(2),
      ..RegistryConfig::default()
    });
    registry.init().unwrap();

    let a = registry.open_pool(8, Policy::FirstFit).unwrap();
    let b = registry.open_pool(8, Policy::FirstFit).unwrap();
    assert!(matches!(
      registry.open_pool(8, Policy::FirstFit),
      Err(PoolError::AllocationFailure { what: "pool registry", .. })
    ));
    assert_eq!(registry.open_pools(), 2);

    // Closed slots are not recycled.
    registry.close_pool(a).unwrap();
    assert!(registry.open_pool(8, Policy::FirstFit).is_err());

    registry.close_pool(b).unwrap();
    registry.teardown().unwrap();
  }

  #[test]
  fn test_failed_open_leaves_registry_unchanged() {
    let mut registry = registry();
    assert_eq!(
      registry.open_pool(0, Policy::FirstFit),
      Err(PoolError::InvalidCapacity { capacity: 0 })
    );
    assert!(matches!(
      registry.open_pool(isize::MAX as usize, Policy::FirstFit),
      Err(PoolError::AllocationFailure { what: "pool buffer", .. })
    ));
    assert_eq!(registry.open_pools(), 0);
    registry.teardown().unwrap();
  }

  #[test]
  fn test_invalid_config_rejected_at_init() {
    let mut registry = Registry::with_config(RegistryConfig {
      store: GrowthPolicy::new(0),
      ..RegistryConfig::default()
    });
    assert!(matches!(registry.init(), Err(PoolError::InvalidConfig { .. })));
    assert!(!registry.is_initialized());
  }

  #[test]
  fn test_ids_do_not_survive_reinit() {
    let mut registry = registry();
    let before = registry.open_pool(10, Policy::FirstFit).unwrap();
    registry.close_pool(before).unwrap();
    registry.teardown().unwrap();

    registry.init().unwrap();
    let after = registry.open_pool(10, Policy::FirstFit).unwrap();
    assert_eq!(before.slot(), after.slot());
    assert_ne!(before, after);
    assert_eq!(
      registry.pool(before).unwrap_err(),
      PoolError::UnknownPool { id: before.slot() }
    );
    assert!(registry.allocate(before, 1).is_err());

    registry.close_pool(after).unwrap();
    registry.teardown().unwrap();
  }

  #[test]
  fn test_ids_are_scoped_to_their_registry() {
    let mut one = registry();
    let mut two = registry();
    let a = one.open_pool(10, Policy::FirstFit).unwrap();
    let b = two.open_pool(10, Policy::FirstFit).unwrap();

    assert_eq!(a.slot(), b.slot());
    assert_ne!(a, b);
    assert_eq!(two.pool(a).unwrap_err(), PoolError::UnknownPool { id: a.slot() });
    assert_eq!(two.close_pool(a), Err(PoolError::UnknownPool { id: a.slot() }));

    one.close_pool(a).unwrap();
    two.close_pool(b).unwrap();
  }
}
