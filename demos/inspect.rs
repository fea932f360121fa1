use std::{env, io::Read};

use segpool::{Policy, PoolId, Registry};

/// Waits until the user presses ENTER when `--step` was given.
/// Useful to follow how each call reshapes the pool.
fn block_until_enter_pressed(
  step: bool,
) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

/// Prints the pool's segments in address order, followed by its counters.
fn print_pool(
  registry: &Registry,
  pool: PoolId,
  label: &str,
) -> segpool::Result<()> {
  println!("\n[{label}]");
  println!("{:>10} {:>10}  state", "offset", "size");
  for segment in registry.inspect(pool)? {
    println!("{segment}");
  }
  println!("{}", registry.pool(pool)?.stats());
  Ok(())
}

fn main() -> segpool::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .init();

  let mut policy = Policy::FirstFit;
  let mut step = false;
  for arg in env::args().skip(1) {
    match arg.as_str() {
      "--step" => step = true,
      other => policy = other.parse()?,
    }
  }

  let mut registry = Registry::new();
  registry.init()?;

  // --------------------------------------------------------------------
  // 1) Open a 1000-byte pool: one gap covering everything.
  // --------------------------------------------------------------------
  let pool = registry.open_pool(1000, policy)?;
  print_pool(&registry, pool, &format!("1: open ({policy})"))?;
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 2) Allocate 100, 200 and 100 bytes back to back.
  // --------------------------------------------------------------------
  let mut handles = Vec::new();
  for size in [100, 200, 100] {
    if let Some(allocation) = registry.allocate(pool, size)? {
      println!("allocated {size} bytes at offset {}", allocation.offset());
      handles.push(allocation);
    }
  }
  print_pool(&registry, pool, "2: three allocations")?;
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 3) Release the 200-byte allocation. Its neighbors are allocated, so
  //    it becomes a separate gap.
  // --------------------------------------------------------------------
  let middle = handles.remove(1);
  registry.release(pool, middle)?;
  print_pool(&registry, pool, "3: release the middle")?;
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 4) Ask for 150 bytes. Both policies choose the gap at offset 100
  //    here: it comes first and it is also the tightest fit.
  // --------------------------------------------------------------------
  if let Some(allocation) = registry.allocate(pool, 150)? {
    println!("150 bytes placed at offset {}", allocation.offset());
    registry
      .pool_mut(pool)?
      .bytes_mut(allocation)?
      .fill(0xAB);
    handles.push(allocation);
  }
  print_pool(&registry, pool, "4: allocate 150")?;
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 5) Ask for more than any gap holds: no handle, nothing changes.
  // --------------------------------------------------------------------
  let refused = registry.allocate(pool, 900)?;
  println!("900 bytes: {}", if refused.is_some() { "placed" } else { "no gap large enough" });
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 6) Release everything; coalescing folds the pool back to one gap.
  // --------------------------------------------------------------------
  for allocation in handles.drain(..) {
    registry.release(pool, allocation)?;
  }
  print_pool(&registry, pool, "6: everything released")?;

  registry.close_pool(pool)?;
  registry.teardown()?;
  println!("\n[7] End of example. Pool closed and registry torn down.");
  Ok(())
}
