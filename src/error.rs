//! Error types shared by the compute backend and the host-side driver.

use thiserror::Error;

/// Status codes reported alongside failures, following the OpenCL numbering
/// so logs read the same against a real runtime or the simulated one.
pub mod status {
    pub const DEVICE_NOT_FOUND: i32 = -1;
    pub const DEVICE_NOT_AVAILABLE: i32 = -2;
    pub const OUT_OF_RESOURCES: i32 = -5;
    pub const PROFILING_INFO_NOT_AVAILABLE: i32 = -7;
    pub const BUILD_PROGRAM_FAILURE: i32 = -11;
    pub const INVALID_VALUE: i32 = -30;
    pub const INVALID_DEVICE: i32 = -33;
    pub const INVALID_MEM_OBJECT: i32 = -38;
    pub const INVALID_PROGRAM: i32 = -44;
    pub const INVALID_KERNEL_NAME: i32 = -46;
    pub const INVALID_KERNEL: i32 = -48;
    pub const INVALID_ARG_INDEX: i32 = -49;
    pub const INVALID_ARG_VALUE: i32 = -50;
    pub const INVALID_ARG_SIZE: i32 = -51;
    pub const INVALID_KERNEL_ARGS: i32 = -52;
    pub const INVALID_WORK_GROUP_SIZE: i32 = -54;
    pub const INVALID_EVENT: i32 = -58;
    pub const INVALID_BUFFER_SIZE: i32 = -61;
}

/// Failure classes a multiply run can hit, from runtime discovery through
/// kernel dispatch. Each carries the backend status code that triggered it.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No compute runtime, or the runtime enumerates no usable device.
    #[error("no usable compute device (status {status})")]
    RuntimeUnavailable { status: i32 },

    /// A device capability query failed after the device was found.
    #[error("device query failed: {query} (status {status})")]
    DeviceQuery { query: &'static str, status: i32 },

    /// Creating a context, queue, buffer, or similar device object failed.
    #[error("resource acquisition failed: {resource} (status {status})")]
    ResourceAcquisition { resource: &'static str, status: i32 },

    /// Program build or kernel entry resolution failed.
    #[error("program build failed: {detail} (status {status})")]
    Build { detail: String, status: i32 },

    /// Argument binding, transfer, or launch submission failed.
    #[error("dispatch failed: {detail} (status {status})")]
    Dispatch { detail: String, status: i32 },
}

impl DeviceError {
    /// The backend status code carried by this failure.
    pub fn status(&self) -> i32 {
        match self {
            DeviceError::RuntimeUnavailable { status } => *status,
            DeviceError::DeviceQuery { status, .. } => *status,
            DeviceError::ResourceAcquisition { status, .. } => *status,
            DeviceError::Build { status, .. } => *status,
            DeviceError::Dispatch { status, .. } => *status,
        }
    }

    /// Process exit code for this failure class. Zero and one are reserved
    /// for the success and result-mismatch outcomes.
    pub fn exit_code(&self) -> u8 {
        match self {
            DeviceError::RuntimeUnavailable { .. } => 2,
            DeviceError::DeviceQuery { .. } => 3,
            DeviceError::ResourceAcquisition { .. } => 4,
            DeviceError::Build { .. } => 5,
            DeviceError::Dispatch { .. } => 6,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
