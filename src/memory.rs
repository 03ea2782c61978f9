/// Simulated device memory.
/// Two tiers back a dispatch:
///   - CellBuf: global buffers visible to every group
///   - ScratchTile: per-group scratch that never escapes its group
/// The split mirrors the device-memory versus on-chip shared-memory
/// distinction the kernels are written against.

use std::cell::UnsafeCell;

use crate::backend::Access;

/// Fixed-length array of `f32` cells that worker threads read and write
/// concurrently without locking.
///
/// Sharing discipline, upheld by the kernels the device runs: between two
/// barriers a cell has either any number of readers or exactly one writer,
/// and the group barrier publishes writes to the next phase's readers.
/// A kernel that breaks the discipline has a data race, exactly as it
/// would on real hardware.
pub struct CellBuf {
    cells: Box<[UnsafeCell<f32>]>,
    access: Access,
}

// Safety: cells hold plain `f32`s and cross-thread use follows the
// one-writer-per-cell-per-phase discipline above, with `Barrier` providing
// the ordering edge between phases.
unsafe impl Sync for CellBuf {}

impl CellBuf {
    pub fn zeroed(len: usize, access: Access) -> CellBuf {
        CellBuf {
            cells: (0..len).map(|_| UnsafeCell::new(0.0)).collect(),
            access,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn access(&self) -> Access {
        self.access
    }

    #[inline]
    pub fn get(&self, idx: usize) -> f32 {
        unsafe { *self.cells[idx].get() }
    }

    #[inline]
    pub fn set(&self, idx: usize, value: f32) {
        unsafe { *self.cells[idx].get() = value }
    }

    /// Host-side bulk upload. Must not run while a dispatch is using the
    /// buffer.
    pub fn fill_from(&self, src: &[f32]) {
        assert_eq!(
            src.len(),
            self.len(),
            "upload of {} elements into a {}-element buffer",
            src.len(),
            self.len()
        );
        for (idx, value) in src.iter().enumerate() {
            self.set(idx, *value);
        }
    }

    /// Host-side bulk download, the read mirror of `fill_from`.
    pub fn copy_into(&self, dst: &mut [f32]) {
        assert_eq!(
            dst.len(),
            self.len(),
            "download of {} elements from a {}-element buffer",
            dst.len(),
            self.len()
        );
        for (idx, slot) in dst.iter_mut().enumerate() {
            *slot = self.get(idx);
        }
    }
}

/// Per-group scratch memory, allocated fresh for each group of a dispatch
/// and dropped when the group finishes. Contents start undefined as far as
/// kernels are concerned; the simulation zeroes them.
pub struct ScratchTile {
    cells: Box<[UnsafeCell<f32>]>,
}

// Safety: same cell discipline as `CellBuf`, and a tile is only ever
// shared between the workers of one group.
unsafe impl Sync for ScratchTile {}

impl ScratchTile {
    pub fn new(len: usize) -> ScratchTile {
        ScratchTile { cells: (0..len).map(|_| UnsafeCell::new(0.0)).collect() }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> f32 {
        unsafe { *self.cells[idx].get() }
    }

    #[inline]
    pub fn set(&self, idx: usize, value: f32) {
        unsafe { *self.cells[idx].get() = value }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.len()).map(|idx| self.get(idx)).collect()
    }
}
