use std::cell::{Cell, RefCell};

use tilemul::backend::{
    Access, Arg, BufferId, ComputeBackend, DeviceClass, DeviceId, DeviceInfo, EventId, KernelId,
    ProgramId, TimingSample,
};
use tilemul::error::{DeviceError, Result, status};
use tilemul::launch::LaunchGeometry;
use tilemul::matrix::Matrix;
use tilemul::orchestrator::Orchestrator;
use tilemul::serial;
use tilemul::validate;

/// Which backend call fails. Counted variants fail on the n-th call of
/// that kind, so every acquisition step can be broken individually.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FailPoint {
    None,
    NoDevices,
    Enumerate,
    MaxGroupSize,
    Build,
    CreateKernel,
    CreateBuffer(usize),
    WriteBuffer(usize),
    SetArg(usize),
    Enqueue,
    Finish,
    ReadBuffer,
    EventTiming,
}

/// Host-memory backend that performs the multiply itself and injects one
/// failure at a chosen call. Buffer creates and releases are counted so
/// tests can assert the driver never leaks on any exit path.
struct FakeBackend {
    fail: FailPoint,
    created: Cell<usize>,
    released: Cell<usize>,
    create_calls: Cell<usize>,
    write_calls: Cell<usize>,
    set_arg_calls: Cell<usize>,
    buffers: RefCell<Vec<Option<Vec<f32>>>>,
    args: RefCell<Vec<Option<Arg>>>,
}

impl FakeBackend {
    fn new(fail: FailPoint) -> FakeBackend {
        FakeBackend {
            fail,
            created: Cell::new(0),
            released: Cell::new(0),
            create_calls: Cell::new(0),
            write_calls: Cell::new(0),
            set_arg_calls: Cell::new(0),
            buffers: RefCell::new(Vec::new()),
            args: RefCell::new(Vec::new()),
        }
    }

    fn counts(&self) -> (usize, usize) {
        (self.created.get(), self.released.get())
    }
}

impl ComputeBackend for FakeBackend {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        match self.fail {
            FailPoint::Enumerate => Err(DeviceError::RuntimeUnavailable {
                status: status::DEVICE_NOT_AVAILABLE,
            }),
            FailPoint::NoDevices => Ok(Vec::new()),
            _ => Ok(vec![DeviceInfo {
                id: DeviceId(0),
                name: "Fake Accelerator".to_string(),
                vendor: "NVIDIA".to_string(),
                class: DeviceClass::Accelerator,
                compute_units: 4,
            }]),
        }
    }

    fn max_group_size(&self, _device: DeviceId) -> Result<usize> {
        if self.fail == FailPoint::MaxGroupSize {
            return Err(DeviceError::DeviceQuery {
                query: "max work-group size",
                status: status::INVALID_DEVICE,
            });
        }
        Ok(64)
    }

    fn create_buffer(&self, _device: DeviceId, len: usize, _access: Access) -> Result<BufferId> {
        let call = self.create_calls.get() + 1;
        self.create_calls.set(call);
        if self.fail == FailPoint::CreateBuffer(call) {
            return Err(DeviceError::ResourceAcquisition {
                resource: "buffer",
                status: status::OUT_OF_RESOURCES,
            });
        }
        self.created.set(self.created.get() + 1);
        let mut buffers = self.buffers.borrow_mut();
        buffers.push(Some(vec![0.0; len]));
        Ok(BufferId(buffers.len() - 1))
    }

    fn release_buffer(&self, buffer: BufferId) {
        let mut buffers = self.buffers.borrow_mut();
        if let Some(slot) = buffers.get_mut(buffer.0) {
            if slot.take().is_some() {
                self.released.set(self.released.get() + 1);
            }
        }
    }

    fn write_buffer(&self, buffer: BufferId, data: &[f32]) -> Result<()> {
        let call = self.write_calls.get() + 1;
        self.write_calls.set(call);
        if self.fail == FailPoint::WriteBuffer(call) {
            return Err(DeviceError::Dispatch {
                detail: "injected upload failure".to_string(),
                status: status::INVALID_MEM_OBJECT,
            });
        }
        let mut buffers = self.buffers.borrow_mut();
        let slot = buffers[buffer.0].as_mut().expect("write to a live buffer");
        assert_eq!(slot.len(), data.len());
        slot.copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferId, out: &mut [f32]) -> Result<()> {
        if self.fail == FailPoint::ReadBuffer {
            return Err(DeviceError::Dispatch {
                detail: "injected download failure".to_string(),
                status: status::INVALID_MEM_OBJECT,
            });
        }
        let buffers = self.buffers.borrow();
        let slot = buffers[buffer.0].as_ref().expect("read from a live buffer");
        assert_eq!(slot.len(), out.len());
        out.copy_from_slice(slot);
        Ok(())
    }

    fn build_program(&self, _device: DeviceId, source: &str) -> Result<ProgramId> {
        if self.fail == FailPoint::Build {
            return Err(DeviceError::Build {
                detail: "injected build failure".to_string(),
                status: status::BUILD_PROGRAM_FAILURE,
            });
        }
        assert!(source.contains("__kernel"), "driver must send real kernel source");
        Ok(ProgramId(0))
    }

    fn create_kernel(&self, _program: ProgramId, entry: &str) -> Result<KernelId> {
        if self.fail == FailPoint::CreateKernel {
            return Err(DeviceError::Build {
                detail: format!("injected failure resolving '{entry}'"),
                status: status::INVALID_KERNEL_NAME,
            });
        }
        assert_eq!(entry, "tile_mul_row");
        *self.args.borrow_mut() = vec![None; 5];
        Ok(KernelId(0))
    }

    fn set_arg(&self, _kernel: KernelId, index: usize, arg: Arg) -> Result<()> {
        let call = self.set_arg_calls.get() + 1;
        self.set_arg_calls.set(call);
        if self.fail == FailPoint::SetArg(call) {
            return Err(DeviceError::Dispatch {
                detail: format!("injected binding failure at {index}"),
                status: status::INVALID_ARG_VALUE,
            });
        }
        self.args.borrow_mut()[index] = Some(arg);
        Ok(())
    }

    fn enqueue_kernel(&self, _kernel: KernelId, geometry: &LaunchGeometry) -> Result<EventId> {
        if self.fail == FailPoint::Enqueue {
            return Err(DeviceError::Dispatch {
                detail: "injected launch failure".to_string(),
                status: status::OUT_OF_RESOURCES,
            });
        }
        assert_eq!(geometry.global % geometry.group, 0);

        let args = self.args.borrow();
        let buffer_at = |index: usize| match args[index] {
            Some(Arg::Buffer(id)) => id,
            other => panic!("argument {index} should be a buffer, got {other:?}"),
        };
        let (a_id, b_id, c_id) = (buffer_at(0), buffer_at(1), buffer_at(2));
        assert!(matches!(args[3], Some(Arg::Scratch { len }) if len > 0));
        let n = match args[4] {
            Some(Arg::Uint(v)) => v as usize,
            other => panic!("argument 4 should be the problem size, got {other:?}"),
        };
        drop(args);

        let (a_data, b_data) = {
            let buffers = self.buffers.borrow();
            (
                buffers[a_id.0].clone().expect("live A operand"),
                buffers[b_id.0].clone().expect("live B operand"),
            )
        };
        let product = serial::multiply(&Matrix::from_vec(n, a_data), &Matrix::from_vec(n, b_data));
        self.buffers.borrow_mut()[c_id.0] = Some(product.as_slice().to_vec());
        Ok(EventId(0))
    }

    fn finish(&self) -> Result<()> {
        if self.fail == FailPoint::Finish {
            return Err(DeviceError::Dispatch {
                detail: "injected wait failure".to_string(),
                status: status::OUT_OF_RESOURCES,
            });
        }
        Ok(())
    }

    fn event_timing(&self, _event: EventId) -> Result<TimingSample> {
        if self.fail == FailPoint::EventTiming {
            return Err(DeviceError::DeviceQuery {
                query: "event profiling info",
                status: status::PROFILING_INFO_NOT_AVAILABLE,
            });
        }
        Ok(TimingSample { start_ns: 1_000_000, end_ns: 2_500_000 })
    }
}

fn attempt(fail: FailPoint) -> (Result<Matrix>, usize, usize) {
    let backend = FakeBackend::new(fail);
    let a = Matrix::random(4, 42);
    let b = Matrix::random(4, 123);
    let outcome = Orchestrator::new(&backend).multiply(&a, &b).map(|run| run.c);
    let (created, released) = backend.counts();
    (outcome, created, released)
}

#[test]
fn happy_path_multiplies_and_balances_buffers() {
    let backend = FakeBackend::new(FailPoint::None);
    let a = Matrix::random(4, 42);
    let b = Matrix::random(4, 123);
    let run = Orchestrator::new(&backend).multiply(&a, &b).expect("fake multiply");

    assert!(validate::compare_exact(&run.c, &serial::multiply(&a, &b)));
    assert_eq!(run.entry, "tile_mul_row");
    assert_eq!(run.device.name, "Fake Accelerator");
    // gcd(4 columns, 4 compute units) fills one group.
    assert_eq!(run.geometry.group, 4);
    assert!((run.timing.elapsed_ms() - 1.5).abs() < 1e-9);

    let (created, released) = backend.counts();
    assert_eq!(created, 3);
    assert_eq!(released, 3);
}

#[test]
fn empty_enumeration_is_runtime_unavailable() {
    let (outcome, created, released) = attempt(FailPoint::NoDevices);
    let err = outcome.unwrap_err();
    assert!(matches!(err, DeviceError::RuntimeUnavailable { .. }));
    assert_eq!(err.exit_code(), 2);
    assert_eq!((created, released), (0, 0));
}

#[test]
fn enumeration_failure_propagates() {
    let (outcome, created, released) = attempt(FailPoint::Enumerate);
    let err = outcome.unwrap_err();
    assert!(matches!(err, DeviceError::RuntimeUnavailable { .. }));
    assert_eq!(err.status(), status::DEVICE_NOT_AVAILABLE);
    assert_eq!((created, released), (0, 0));
}

#[test]
fn capability_query_failure_propagates() {
    let (outcome, created, released) = attempt(FailPoint::MaxGroupSize);
    let err = outcome.unwrap_err();
    assert!(matches!(err, DeviceError::DeviceQuery { .. }));
    assert_eq!(err.exit_code(), 3);
    assert_eq!((created, released), (0, 0));
}

#[test]
fn build_failures_happen_before_any_buffer_exists() {
    for fail in [FailPoint::Build, FailPoint::CreateKernel] {
        let (outcome, created, released) = attempt(fail);
        let err = outcome.unwrap_err();
        assert!(matches!(err, DeviceError::Build { .. }), "{fail:?}");
        assert_eq!(err.exit_code(), 5, "{fail:?}");
        assert_eq!((created, released), (0, 0), "{fail:?}");
    }
}

#[test]
fn buffer_create_failure_releases_the_buffers_before_it() {
    for nth in 1..=3 {
        let (outcome, created, released) = attempt(FailPoint::CreateBuffer(nth));
        let err = outcome.unwrap_err();
        assert!(matches!(err, DeviceError::ResourceAcquisition { .. }), "nth={nth}");
        assert_eq!(err.exit_code(), 4, "nth={nth}");
        assert_eq!(created, nth - 1, "nth={nth}");
        assert_eq!(released, created, "nth={nth}");
    }
}

#[test]
fn transfer_failures_release_every_buffer() {
    for fail in [FailPoint::WriteBuffer(1), FailPoint::WriteBuffer(2), FailPoint::ReadBuffer] {
        let (outcome, created, released) = attempt(fail);
        assert!(matches!(outcome.unwrap_err(), DeviceError::Dispatch { .. }), "{fail:?}");
        assert_eq!((created, released), (3, 3), "{fail:?}");
    }
}

#[test]
fn binding_failures_release_every_buffer() {
    for nth in 1..=5 {
        let (outcome, created, released) = attempt(FailPoint::SetArg(nth));
        let err = outcome.unwrap_err();
        assert!(matches!(err, DeviceError::Dispatch { .. }), "nth={nth}");
        assert_eq!(err.exit_code(), 6, "nth={nth}");
        assert_eq!((created, released), (3, 3), "nth={nth}");
    }
}

#[test]
fn late_dispatch_failures_release_every_buffer() {
    for fail in [FailPoint::Enqueue, FailPoint::Finish, FailPoint::EventTiming] {
        let (outcome, created, released) = attempt(fail);
        assert!(outcome.is_err(), "{fail:?}");
        assert_eq!((created, released), (3, 3), "{fail:?}");
    }
}
