/// The compute backend contract.
/// One trait method per host-side call the driving logic needs, from device
/// enumeration through profiling readback. Concrete backends decide what a
/// device, buffer, or program physically is; the driver only ever holds the
/// opaque handles defined here.

use std::fmt;

use crate::error::Result;
use crate::launch::LaunchGeometry;

// ---------- handles ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub usize);

// ---------- device description ----------

/// Broad capability class a device advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Accelerator,
    Cpu,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Accelerator => write!(f, "accelerator"),
            DeviceClass::Cpu => write!(f, "cpu"),
        }
    }
}

/// What enumeration reports per device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub vendor: String,
    pub class: DeviceClass,
    /// Parallel compute units; raw material for the group sizing hint.
    pub compute_units: usize,
}

// ---------- dispatch arguments ----------

/// Host access intent declared when a device buffer is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// A positionally bound kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    /// Global device buffer.
    Buffer(BufferId),
    /// Group-local scratch allocation of `len` floats. Contents are
    /// undefined at kernel start and discarded when the group finishes.
    Scratch { len: usize },
    /// 32-bit scalar, e.g. the problem size.
    Uint(u32),
}

/// Argument kind expected at each position of a kernel signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Buffer,
    Scratch,
    Uint,
}

impl Arg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::Buffer(_) => ArgKind::Buffer,
            Arg::Scratch { .. } => ArgKind::Scratch,
            Arg::Uint(_) => ArgKind::Uint,
        }
    }
}

// ---------- profiling ----------

/// Device-clock timestamps around one kernel execution, in nanoseconds.
/// The window covers execution only; transfers sit outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSample {
    pub start_ns: u64,
    pub end_ns: u64,
}

impl TimingSample {
    pub fn elapsed_ms(&self) -> f64 {
        self.end_ns.saturating_sub(self.start_ns) as f64 / 1_000_000.0
    }
}

// ---------- the contract ----------

pub trait ComputeBackend {
    /// Enumerate devices. An empty list is not an error at this level; the
    /// caller decides whether it can proceed.
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Largest worker group the device can run in one dispatch.
    fn max_group_size(&self, device: DeviceId) -> Result<usize>;

    fn create_buffer(&self, device: DeviceId, len: usize, access: Access) -> Result<BufferId>;

    /// Releases are infallible and must balance successful creates.
    /// Releasing an already-released handle is a no-op.
    fn release_buffer(&self, buffer: BufferId);

    fn write_buffer(&self, buffer: BufferId, data: &[f32]) -> Result<()>;

    fn read_buffer(&self, buffer: BufferId, out: &mut [f32]) -> Result<()>;

    /// Build a program for a device from portable kernel source.
    fn build_program(&self, device: DeviceId, source: &str) -> Result<ProgramId>;

    /// Resolve one entry point of a built program.
    fn create_kernel(&self, program: ProgramId, entry: &str) -> Result<KernelId>;

    /// Bind an argument at a signature position. Bindings persist across
    /// dispatches until rebound.
    fn set_arg(&self, kernel: KernelId, index: usize, arg: Arg) -> Result<()>;

    /// Submit one dispatch. Completion is observed via `finish`.
    fn enqueue_kernel(&self, kernel: KernelId, geometry: &LaunchGeometry) -> Result<EventId>;

    /// Block until every submitted command has completed.
    fn finish(&self) -> Result<()>;

    /// Profiling timestamps of a completed dispatch.
    fn event_timing(&self, event: EventId) -> Result<TimingSample>;
}
