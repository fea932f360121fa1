use std::{ptr::NonNull, slice};

use libc::{c_void, calloc, free};

use crate::error::{PoolError, Result};

/// A pool's backing store: `len` zeroed bytes from the C allocator.
///
/// The region is released with `free(3)` when the buffer is dropped.
pub(crate) struct Buffer {
  ptr: NonNull<u8>,
  len: usize,
}

impl Buffer {
  pub(crate) fn zeroed(
    len: usize,
  ) -> Result<Self> {
    // Slices over the region must not exceed isize::MAX bytes.
    if len == 0 || len > isize::MAX as usize {
      return Err(PoolError::allocation_failure("pool buffer", len));
    }

    let address = unsafe { calloc(len, 1) } as *mut u8;

    match NonNull::new(address) {
      Some(ptr) => Ok(Self { ptr, len }),
      None => Err(PoolError::allocation_failure("pool buffer", len)),
    }
  }

  pub(crate) fn len(
    &self,
  ) -> usize {
    self.len
  }

  pub(crate) fn range(
    &self,
    offset: usize,
    size: usize,
  ) -> &[u8] {
    assert!(offset + size <= self.len, "range outside pool buffer");
    unsafe { slice::from_raw_parts(self.ptr.as_ptr().add(offset), size) }
  }

  pub(crate) fn range_mut(
    &mut self,
    offset: usize,
    size: usize,
  ) -> &mut [u8] {
    assert!(offset + size <= self.len, "range outside pool buffer");
    unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), size) }
  }

  pub(crate) fn fill(
    &mut self,
    offset: usize,
    size: usize,
    byte: u8,
  ) {
    self.range_mut(offset, size).fill(byte);
  }
}

impl Drop for Buffer {
  fn drop(
    &mut self,
  ) {
    unsafe { free(self.ptr.as_ptr() as *mut c_void) };
  }
}

// The region is owned exclusively; nothing else holds `ptr`.
unsafe impl Send for Buffer {}
