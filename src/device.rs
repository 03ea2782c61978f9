/// In-process simulated accelerator.
/// Implements the `ComputeBackend` contract with real concurrency: each
/// worker group runs as OS threads meeting at a `std::sync::Barrier`,
/// independent groups run in parallel, and device memory is the cell model
/// from `memory`. Handles and status codes keep the OpenCL shape the host
/// driver expects, so swapping in a hardware backend changes nothing above
/// the trait.

use std::sync::{Arc, Barrier, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use rayon::prelude::*;

use crate::backend::{
    Access, Arg, ArgKind, BufferId, ComputeBackend, DeviceClass, DeviceId, DeviceInfo, EventId,
    KernelId, ProgramId, TimingSample,
};
use crate::error::{DeviceError, Result, status};
use crate::kernel::{GroupArg, KernelRoutine, WorkerCtx, builtin};
use crate::launch::LaunchGeometry;
use crate::memory::{CellBuf, ScratchTile};

pub const DEFAULT_MAX_GROUP_SIZE: usize = 256;

// ---------- device catalog ----------

/// One simulated device as enumeration will report it.
#[derive(Debug, Clone)]
pub struct SimDeviceSpec {
    pub name: String,
    pub vendor: String,
    pub class: DeviceClass,
    pub compute_units: usize,
    pub max_group_size: usize,
}

impl SimDeviceSpec {
    /// Accelerator-class device with the default group capacity.
    pub fn accelerator(name: &str, vendor: &str, compute_units: usize) -> SimDeviceSpec {
        SimDeviceSpec {
            name: name.to_string(),
            vendor: vendor.to_string(),
            class: DeviceClass::Accelerator,
            compute_units,
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
        }
    }

    /// Host-class device, reported but skipped by accelerator-only
    /// selection policies.
    pub fn cpu(name: &str, vendor: &str, compute_units: usize) -> SimDeviceSpec {
        SimDeviceSpec {
            name: name.to_string(),
            vendor: vendor.to_string(),
            class: DeviceClass::Cpu,
            compute_units,
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
        }
    }

    fn host_default() -> SimDeviceSpec {
        let units = thread::available_parallelism().map(|p| p.get()).unwrap_or(4);
        SimDeviceSpec::accelerator("SimCL Reference Accelerator", "SimCL", units)
    }
}

// ---------- backend state ----------

struct Program {
    device: DeviceId,
    source: String,
}

struct KernelState {
    device: DeviceId,
    entry: &'static str,
    routine: KernelRoutine,
    signature: &'static [ArgKind],
    args: Vec<Option<Arg>>,
}

struct State {
    devices: Vec<SimDeviceSpec>,
    buffers: Vec<Option<Arc<CellBuf>>>,
    programs: Vec<Program>,
    kernels: Vec<KernelState>,
    events: Vec<TimingSample>,
}

/// The simulated backend. Bookkeeping sits behind one mutex; dispatch
/// execution itself runs outside it so groups can use the full host.
pub struct SimBackend {
    state: Mutex<State>,
    /// Device clock origin for profiling timestamps.
    epoch: Instant,
}

impl SimBackend {
    /// Backend with a single accelerator sized from the host's available
    /// parallelism.
    pub fn new() -> SimBackend {
        SimBackend::with_devices(vec![SimDeviceSpec::host_default()])
    }

    /// Backend exposing an explicit device catalog, in enumeration order.
    pub fn with_devices(devices: Vec<SimDeviceSpec>) -> SimBackend {
        SimBackend {
            state: Mutex::new(State {
                devices,
                buffers: Vec::new(),
                programs: Vec::new(),
                kernels: Vec::new(),
                events: Vec::new(),
            }),
            epoch: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn device_clock_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

impl Default for SimBackend {
    fn default() -> SimBackend {
        SimBackend::new()
    }
}

// ---------- dispatch execution ----------

/// Kernel argument with handles resolved, ready to materialize per group.
enum ResolvedArg {
    Global(Arc<CellBuf>),
    Scratch(usize),
    Uint(u32),
}

/// Execute every group of a dispatch. Groups are independent and run under
/// rayon; within a group, workers are scoped threads sharing fresh scratch
/// tiles and one barrier.
fn run_dispatch(routine: KernelRoutine, args: &[ResolvedArg], geometry: LaunchGeometry) {
    let nl = geometry.group;
    (0..geometry.num_groups()).into_par_iter().for_each(|group| {
        let group_args: Vec<GroupArg> = args
            .iter()
            .map(|arg| match arg {
                ResolvedArg::Global(buf) => GroupArg::Global(Arc::clone(buf)),
                ResolvedArg::Scratch(len) => GroupArg::Scratch(ScratchTile::new(*len)),
                ResolvedArg::Uint(value) => GroupArg::Uint(*value),
            })
            .collect();
        let barrier = Barrier::new(nl);
        let base = group * nl;

        if nl == 1 {
            // Single-worker groups never contend; skip the thread spawn.
            let ctx = WorkerCtx::new(base, 0, 1, &group_args, &barrier);
            routine(&ctx);
            return;
        }

        thread::scope(|scope| {
            for il in 0..nl {
                let group_args = &group_args;
                let barrier = &barrier;
                scope.spawn(move || {
                    let ctx = WorkerCtx::new(base + il, il, nl, group_args, barrier);
                    routine(&ctx);
                });
            }
        });
    });
}

// ---------- the contract ----------

impl ComputeBackend for SimBackend {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        let state = self.lock();
        Ok(state
            .devices
            .iter()
            .enumerate()
            .map(|(idx, spec)| DeviceInfo {
                id: DeviceId(idx),
                name: spec.name.clone(),
                vendor: spec.vendor.clone(),
                class: spec.class,
                compute_units: spec.compute_units,
            })
            .collect())
    }

    fn max_group_size(&self, device: DeviceId) -> Result<usize> {
        let state = self.lock();
        let spec = state.devices.get(device.0).ok_or(DeviceError::DeviceQuery {
            query: "max work-group size",
            status: status::INVALID_DEVICE,
        })?;
        Ok(spec.max_group_size)
    }

    fn create_buffer(&self, device: DeviceId, len: usize, access: Access) -> Result<BufferId> {
        let mut state = self.lock();
        if device.0 >= state.devices.len() {
            return Err(DeviceError::ResourceAcquisition {
                resource: "buffer",
                status: status::INVALID_DEVICE,
            });
        }
        if len == 0 {
            return Err(DeviceError::ResourceAcquisition {
                resource: "buffer",
                status: status::INVALID_BUFFER_SIZE,
            });
        }
        state.buffers.push(Some(Arc::new(CellBuf::zeroed(len, access))));
        Ok(BufferId(state.buffers.len() - 1))
    }

    fn release_buffer(&self, buffer: BufferId) {
        let mut state = self.lock();
        if let Some(slot) = state.buffers.get_mut(buffer.0) {
            *slot = None;
        }
    }

    fn write_buffer(&self, buffer: BufferId, data: &[f32]) -> Result<()> {
        let buf = {
            let state = self.lock();
            state
                .buffers
                .get(buffer.0)
                .and_then(|slot| slot.as_ref())
                .map(Arc::clone)
                .ok_or(DeviceError::Dispatch {
                    detail: "write to a released buffer".to_string(),
                    status: status::INVALID_MEM_OBJECT,
                })?
        };
        if data.len() != buf.len() {
            return Err(DeviceError::Dispatch {
                detail: format!("write of {} elements to a {}-element buffer", data.len(), buf.len()),
                status: status::INVALID_VALUE,
            });
        }
        buf.fill_from(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferId, out: &mut [f32]) -> Result<()> {
        let buf = {
            let state = self.lock();
            state
                .buffers
                .get(buffer.0)
                .and_then(|slot| slot.as_ref())
                .map(Arc::clone)
                .ok_or(DeviceError::Dispatch {
                    detail: "read from a released buffer".to_string(),
                    status: status::INVALID_MEM_OBJECT,
                })?
        };
        if out.len() != buf.len() {
            return Err(DeviceError::Dispatch {
                detail: format!("read of {} elements from a {}-element buffer", out.len(), buf.len()),
                status: status::INVALID_VALUE,
            });
        }
        buf.copy_into(out);
        Ok(())
    }

    fn build_program(&self, device: DeviceId, source: &str) -> Result<ProgramId> {
        let mut state = self.lock();
        if device.0 >= state.devices.len() {
            return Err(DeviceError::Build {
                detail: "unknown device".to_string(),
                status: status::INVALID_DEVICE,
            });
        }
        if !source.contains("__kernel") {
            return Err(DeviceError::Build {
                detail: "source declares no __kernel entry".to_string(),
                status: status::BUILD_PROGRAM_FAILURE,
            });
        }
        state.programs.push(Program { device, source: source.to_string() });
        Ok(ProgramId(state.programs.len() - 1))
    }

    fn create_kernel(&self, program: ProgramId, entry: &str) -> Result<KernelId> {
        let mut state = self.lock();
        let prog = state.programs.get(program.0).ok_or(DeviceError::Build {
            detail: "invalid program handle".to_string(),
            status: status::INVALID_PROGRAM,
        })?;
        let declaration = format!("__kernel void {entry}(");
        if !prog.source.contains(&declaration) {
            return Err(DeviceError::Build {
                detail: format!("entry '{entry}' is not declared in the program source"),
                status: status::INVALID_KERNEL_NAME,
            });
        }
        let native = builtin(entry).ok_or_else(|| DeviceError::Build {
            detail: format!("no native routine for entry '{entry}'"),
            status: status::INVALID_KERNEL_NAME,
        })?;
        let device = prog.device;
        state.kernels.push(KernelState {
            device,
            entry: native.entry,
            routine: native.routine,
            signature: native.signature,
            args: vec![None; native.signature.len()],
        });
        Ok(KernelId(state.kernels.len() - 1))
    }

    fn set_arg(&self, kernel: KernelId, index: usize, arg: Arg) -> Result<()> {
        let mut state = self.lock();
        let k = state.kernels.get_mut(kernel.0).ok_or(DeviceError::Dispatch {
            detail: "invalid kernel handle".to_string(),
            status: status::INVALID_KERNEL,
        })?;
        if index >= k.signature.len() {
            return Err(DeviceError::Dispatch {
                detail: format!(
                    "argument index {index} out of range for a {}-argument kernel",
                    k.signature.len()
                ),
                status: status::INVALID_ARG_INDEX,
            });
        }
        if arg.kind() != k.signature[index] {
            return Err(DeviceError::Dispatch {
                detail: format!("argument {index} expects {:?}", k.signature[index]),
                status: status::INVALID_ARG_VALUE,
            });
        }
        if let Arg::Scratch { len: 0 } = arg {
            return Err(DeviceError::Dispatch {
                detail: format!("argument {index} is a zero-length scratch allocation"),
                status: status::INVALID_ARG_SIZE,
            });
        }
        k.args[index] = Some(arg);
        Ok(())
    }

    fn enqueue_kernel(&self, kernel: KernelId, geometry: &LaunchGeometry) -> Result<EventId> {
        let (entry, routine, resolved) = {
            let state = self.lock();
            let k = state.kernels.get(kernel.0).ok_or(DeviceError::Dispatch {
                detail: "invalid kernel handle".to_string(),
                status: status::INVALID_KERNEL,
            })?;
            if geometry.global == 0 || geometry.group == 0 {
                return Err(DeviceError::Dispatch {
                    detail: format!("degenerate launch geometry ({geometry})"),
                    status: status::INVALID_WORK_GROUP_SIZE,
                });
            }
            if geometry.global % geometry.group != 0 {
                return Err(DeviceError::Dispatch {
                    detail: format!("group size does not divide global size ({geometry})"),
                    status: status::INVALID_WORK_GROUP_SIZE,
                });
            }
            let max_group = state.devices[k.device.0].max_group_size;
            if geometry.group > max_group {
                return Err(DeviceError::Dispatch {
                    detail: format!("group size {} exceeds device limit {max_group}", geometry.group),
                    status: status::INVALID_WORK_GROUP_SIZE,
                });
            }

            let mut resolved = Vec::with_capacity(k.args.len());
            for (index, slot) in k.args.iter().enumerate() {
                let arg = (*slot).ok_or_else(|| DeviceError::Dispatch {
                    detail: format!("argument {index} is unbound"),
                    status: status::INVALID_KERNEL_ARGS,
                })?;
                resolved.push(match arg {
                    Arg::Buffer(id) => {
                        let buf = state
                            .buffers
                            .get(id.0)
                            .and_then(|slot| slot.as_ref())
                            .ok_or_else(|| DeviceError::Dispatch {
                                detail: format!("argument {index} references a released buffer"),
                                status: status::INVALID_MEM_OBJECT,
                            })?;
                        ResolvedArg::Global(Arc::clone(buf))
                    }
                    Arg::Scratch { len } => ResolvedArg::Scratch(len),
                    Arg::Uint(value) => ResolvedArg::Uint(value),
                });
            }
            (k.entry, k.routine, resolved)
        };

        log::debug!("dispatching '{entry}': {geometry}, {} groups", geometry.num_groups());
        let start_ns = self.device_clock_ns();
        run_dispatch(routine, &resolved, *geometry);
        let end_ns = self.device_clock_ns();

        let mut state = self.lock();
        state.events.push(TimingSample { start_ns, end_ns });
        Ok(EventId(state.events.len() - 1))
    }

    fn finish(&self) -> Result<()> {
        // Dispatches execute eagerly inside enqueue; once it returns there
        // is nothing left in flight.
        Ok(())
    }

    fn event_timing(&self, event: EventId) -> Result<TimingSample> {
        let state = self.lock();
        state
            .events
            .get(event.0)
            .copied()
            .ok_or(DeviceError::DeviceQuery {
                query: "event profiling info",
                status: status::PROFILING_INFO_NOT_AVAILABLE,
            })
    }
}
