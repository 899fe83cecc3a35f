//! Aligned byte buffers for candidate workspaces and transformed kernels.

pub use convcheck_common::{BUFFER_ALIGNMENT, SCRATCH_POISON};
use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::ptr::NonNull;

/// Fixed-size, 64-byte aligned, zero-initialized byte buffer.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: AlignedBuffer uniquely owns its allocation.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocate `len` zeroed bytes.
    ///
    /// Aborts through [`handle_alloc_error`] if the allocator fails.
    pub fn zeroed(len: usize) -> Self {
        if len == 0 {
            return Self { ptr: NonNull::dangling(), len: 0 };
        }
        let layout = Self::layout(len);
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else { handle_alloc_error(layout) };
        Self { ptr, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn fill(&mut self, byte: u8) {
        self.as_mut_slice().fill(byte);
    }

    /// Overwrite the whole buffer with [`SCRATCH_POISON`].
    pub fn poison(&mut self) {
        self.fill(SCRATCH_POISON);
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: ptr is valid for len initialized bytes and uniquely owned.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Workspace argument for a candidate call: `None` for a zero-sized buffer.
    pub fn workspace(&mut self) -> Option<&mut [u8]> {
        if self.is_empty() { None } else { Some(self.as_mut_slice()) }
    }

    fn layout(len: usize) -> Layout {
        // BUFFER_ALIGNMENT is a power of two; only sizes near isize::MAX can fail.
        match Layout::from_size_align(len, BUFFER_ALIGNMENT) {
            Ok(layout) => layout,
            Err(_) => handle_alloc_error(Layout::new::<u8>()),
        }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: allocated in `zeroed` with the same layout.
            unsafe { dealloc(self.ptr.as_ptr(), Self::layout(self.len)) };
        }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_aligned_and_zeroed() {
        for len in [1usize, 63, 64, 65, 4096, 10_000] {
            let buffer = AlignedBuffer::zeroed(len);
            assert_eq!(buffer.len(), len);
            assert_eq!(buffer.as_slice().as_ptr() as usize % BUFFER_ALIGNMENT, 0);
            assert!(buffer.as_slice().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn poison_overwrites_every_byte() {
        let mut buffer = AlignedBuffer::zeroed(130);
        buffer.as_mut_slice()[7] = 1;
        buffer.poison();
        assert!(buffer.as_slice().iter().all(|&b| b == SCRATCH_POISON));
    }

    #[test]
    fn empty_buffer_has_no_workspace() {
        let mut buffer = AlignedBuffer::zeroed(0);
        assert!(buffer.is_empty());
        assert!(buffer.workspace().is_none());
        buffer.poison();
        assert!(buffer.as_slice().is_empty());
    }

    #[test]
    fn non_empty_buffer_exposes_full_workspace() {
        let mut buffer = AlignedBuffer::zeroed(96);
        assert_eq!(buffer.workspace().map(|w| w.len()), Some(96));
    }
}
