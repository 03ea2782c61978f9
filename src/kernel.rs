/// Kernel-side logic of the tiled multiply.
/// A routine here is what every worker of a dispatch executes, identified
/// by its global/local coordinates — mirroring the OpenCL work-item model.
/// The simulated device resolves portable entry names to these native
/// routines at kernel-creation time.

use std::sync::{Arc, Barrier};

use crate::backend::ArgKind;
use crate::memory::{CellBuf, ScratchTile};

// ---------- worker context ----------

/// A kernel argument as one group of workers sees it after binding.
pub enum GroupArg {
    Global(Arc<CellBuf>),
    Scratch(ScratchTile),
    Uint(u32),
}

/// Per-worker view of one dispatch: coordinates within the launch plus the
/// group-shared argument bindings and barrier.
pub struct WorkerCtx<'a> {
    pub global_id: usize,
    pub local_id: usize,
    pub local_size: usize,
    args: &'a [GroupArg],
    barrier: &'a Barrier,
}

impl<'a> WorkerCtx<'a> {
    pub fn new(
        global_id: usize,
        local_id: usize,
        local_size: usize,
        args: &'a [GroupArg],
        barrier: &'a Barrier,
    ) -> WorkerCtx<'a> {
        WorkerCtx { global_id, local_id, local_size, args, barrier }
    }

    /// Global buffer bound at `index`. The device validates bindings
    /// against the kernel signature before dispatch, so a miss here is a
    /// routine/signature bug, not a user error.
    pub fn global(&self, index: usize) -> &CellBuf {
        match &self.args[index] {
            GroupArg::Global(buf) => buf,
            _ => panic!("kernel argument {index} is not a global buffer"),
        }
    }

    /// Group scratch tile bound at `index`.
    pub fn scratch(&self, index: usize) -> &ScratchTile {
        match &self.args[index] {
            GroupArg::Scratch(tile) => tile,
            _ => panic!("kernel argument {index} is not a scratch tile"),
        }
    }

    /// Scalar bound at `index`.
    pub fn uint(&self, index: usize) -> u32 {
        match &self.args[index] {
            GroupArg::Uint(value) => *value,
            _ => panic!("kernel argument {index} is not a scalar"),
        }
    }

    /// Rendezvous with every other worker of the group. Writes made before
    /// the barrier are visible to all of them after it.
    pub fn barrier(&self) {
        self.barrier.wait();
    }
}

// ---------- native routines ----------

/// The function every worker of a dispatch runs.
pub type KernelRoutine = fn(&WorkerCtx<'_>);

/// An entry point the simulated device can execute, with the positional
/// signature it expects.
pub struct BuiltinKernel {
    pub entry: &'static str,
    pub routine: KernelRoutine,
    pub signature: &'static [ArgKind],
}

pub const ENTRY_TILE_MUL_ROW: &str = "tile_mul_row";
pub const ENTRY_TILE_MUL_ROW_COL: &str = "tile_mul_row_col";

pub const BUILTIN_KERNELS: &[BuiltinKernel] = &[
    BuiltinKernel {
        entry: ENTRY_TILE_MUL_ROW,
        routine: tile_mul_row,
        signature: &[
            ArgKind::Buffer,
            ArgKind::Buffer,
            ArgKind::Buffer,
            ArgKind::Scratch,
            ArgKind::Uint,
        ],
    },
    BuiltinKernel {
        entry: ENTRY_TILE_MUL_ROW_COL,
        routine: tile_mul_row_col,
        signature: &[
            ArgKind::Buffer,
            ArgKind::Buffer,
            ArgKind::Buffer,
            ArgKind::Scratch,
            ArgKind::Scratch,
            ArgKind::Uint,
        ],
    },
];

pub fn builtin(entry: &str) -> Option<&'static BuiltinKernel> {
    BUILTIN_KERNELS.iter().find(|k| k.entry == entry)
}

// ---------- tile staging ----------

/// Cooperative strided copy: worker `il` of `nl` copies source elements
/// `il, il + nl, il + 2*nl, ...` into the tile, so the group covers every
/// index exactly once. A barrier must follow before anyone reads the tile.
pub fn stage_strided(
    tile: &ScratchTile,
    src: &CellBuf,
    src_offset: usize,
    len: usize,
    il: usize,
    nl: usize,
) {
    let mut k = il;
    while k < len {
        tile.set(k, src.get(src_offset + k));
        k += nl;
    }
}

// ---------- multiply kernels ----------

/// Core kernel: one worker per output column. Row `i` of A is staged into
/// the shared tile once per row iteration and every worker of the group
/// dots it against its own column of B.
/// Args: 0 = A, 1 = B, 2 = C, 3 = row tile (n floats), 4 = n.
pub fn tile_mul_row(ctx: &WorkerCtx<'_>) {
    let a = ctx.global(0);
    let b = ctx.global(1);
    let c = ctx.global(2);
    let a_tile = ctx.scratch(3);
    let n = ctx.uint(4) as usize;

    let j = ctx.global_id;
    let il = ctx.local_id;
    let nl = ctx.local_size;

    for i in 0..n {
        stage_strided(a_tile, a, i * n, n, il, nl);
        ctx.barrier();

        let mut sum = 0.0f32;
        for k in 0..n {
            sum += a_tile.get(k) * b.get(k * n + j);
        }
        c.set(i * n + j, sum);
        // The tile is restaged next iteration; nobody may still be reading it.
        ctx.barrier();
    }
}

/// Enhanced kernel: additionally keeps the group's column block of B in a
/// second tile, laid out `b_tile[k * nl + il]`, so each element of B is
/// loaded from global memory once per group instead of once per row.
/// Args: 0 = A, 1 = B, 2 = C, 3 = row tile (n floats),
///       4 = column tile (n * nl floats), 5 = n.
pub fn tile_mul_row_col(ctx: &WorkerCtx<'_>) {
    let a = ctx.global(0);
    let b = ctx.global(1);
    let c = ctx.global(2);
    let a_tile = ctx.scratch(3);
    let b_tile = ctx.scratch(4);
    let n = ctx.uint(5) as usize;

    let j = ctx.global_id;
    let il = ctx.local_id;
    let nl = ctx.local_size;

    // Each worker stages its own column of the block before the row loop.
    for k in 0..n {
        b_tile.set(k * nl + il, b.get(k * n + j));
    }
    ctx.barrier();

    for i in 0..n {
        stage_strided(a_tile, a, i * n, n, il, nl);
        ctx.barrier();

        let mut sum = 0.0f32;
        for k in 0..n {
            sum += a_tile.get(k) * b_tile.get(k * nl + il);
        }
        c.set(i * n + j, sum);
        ctx.barrier();
    }
}
