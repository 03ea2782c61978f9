/// Host-side driving logic: device selection, buffer movement, kernel
/// dispatch, and timing capture — everything between two host matrices and
/// the backend that multiplies them. Works against any `ComputeBackend`.

use std::fmt;

use crate::backend::{
    Access, Arg, BufferId, ComputeBackend, DeviceClass, DeviceId, DeviceInfo, TimingSample,
};
use crate::error::{DeviceError, Result, status};
use crate::kernel::{ENTRY_TILE_MUL_ROW, ENTRY_TILE_MUL_ROW_COL};
use crate::launch::LaunchGeometry;
use crate::matrix::Matrix;

/// Portable kernel program, embedded so the binary carries its own device
/// code and hands it to whichever backend it drives.
const TILE_MUL_SOURCE: &str = include_str!("tile_mul.cl");

// ---------- device selection ----------

/// Ordered device preference, applied to whatever enumeration reports.
/// Only accelerator-class devices are considered; among them the earliest
/// vendor-list match wins, with compute-unit count breaking ties, so a
/// fixed catalog always selects deterministically.
#[derive(Debug, Clone)]
pub struct DevicePolicy {
    /// Vendor names to prefer, most preferred first, matched as substrings
    /// of the reported vendor or device name.
    pub preferred_vendors: Vec<String>,
}

impl Default for DevicePolicy {
    fn default() -> DevicePolicy {
        DevicePolicy { preferred_vendors: vec!["NVIDIA".to_string()] }
    }
}

impl DevicePolicy {
    pub fn prefer(vendors: &[&str]) -> DevicePolicy {
        DevicePolicy {
            preferred_vendors: vendors.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Pick the device the policy likes best, or `None` if enumeration
    /// holds no accelerator at all.
    pub fn select<'d>(&self, devices: &'d [DeviceInfo]) -> Option<&'d DeviceInfo> {
        let mut best: Option<(&DeviceInfo, usize)> = None;
        for device in devices.iter().filter(|d| d.class == DeviceClass::Accelerator) {
            let rank = self
                .preferred_vendors
                .iter()
                .position(|v| device.vendor.contains(v.as_str()) || device.name.contains(v.as_str()))
                .unwrap_or(self.preferred_vendors.len());
            let better = match best {
                None => true,
                Some((incumbent, incumbent_rank)) => {
                    rank < incumbent_rank
                        || (rank == incumbent_rank && device.compute_units > incumbent.compute_units)
                }
            };
            if better {
                best = Some((device, rank));
            }
        }
        best.map(|(device, _)| device)
    }
}

// ---------- kernel variants ----------

/// Which multiply kernel to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelVariant {
    /// Stage each row of A in group scratch; read B from global memory.
    #[default]
    RowStaged,
    /// Additionally stage the group's column block of B once up front.
    RowColStaged,
}

impl KernelVariant {
    pub fn entry(self) -> &'static str {
        match self {
            KernelVariant::RowStaged => ENTRY_TILE_MUL_ROW,
            KernelVariant::RowColStaged => ENTRY_TILE_MUL_ROW_COL,
        }
    }

    /// Scratch allocations this entry expects after the three buffers, in
    /// binding order.
    fn scratch_lens(self, n: usize, group: usize) -> Vec<usize> {
        match self {
            KernelVariant::RowStaged => vec![n],
            KernelVariant::RowColStaged => vec![n, n * group],
        }
    }
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelVariant::RowStaged => write!(f, "row-staged"),
            KernelVariant::RowColStaged => write!(f, "row+column-staged"),
        }
    }
}

// ---------- buffer guard ----------

/// Releases its device buffer when dropped, so every exit path out of a
/// multiply, early errors included, returns the buffer to the backend.
struct ScopedBuffer<'a> {
    backend: &'a dyn ComputeBackend,
    id: BufferId,
}

impl<'a> ScopedBuffer<'a> {
    fn create(
        backend: &'a dyn ComputeBackend,
        device: DeviceId,
        len: usize,
        access: Access,
    ) -> Result<ScopedBuffer<'a>> {
        let id = backend.create_buffer(device, len, access)?;
        Ok(ScopedBuffer { backend, id })
    }

    fn id(&self) -> BufferId {
        self.id
    }
}

impl Drop for ScopedBuffer<'_> {
    fn drop(&mut self) {
        self.backend.release_buffer(self.id);
    }
}

// ---------- the driver ----------

/// Outcome of one accelerated multiply.
#[derive(Debug)]
pub struct DeviceRun {
    pub c: Matrix,
    pub timing: TimingSample,
    pub geometry: LaunchGeometry,
    pub device: DeviceInfo,
    /// Kernel entry point that was dispatched.
    pub entry: &'static str,
}

pub struct Orchestrator<'a> {
    backend: &'a dyn ComputeBackend,
    policy: DevicePolicy,
    variant: KernelVariant,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a dyn ComputeBackend) -> Orchestrator<'a> {
        Orchestrator {
            backend,
            policy: DevicePolicy::default(),
            variant: KernelVariant::default(),
        }
    }

    pub fn with_policy(mut self, policy: DevicePolicy) -> Orchestrator<'a> {
        self.policy = policy;
        self
    }

    pub fn with_variant(mut self, variant: KernelVariant) -> Orchestrator<'a> {
        self.variant = variant;
        self
    }

    /// C = A * B on the policy-selected device.
    ///
    /// Runs the full host sequence: select a device, derive the launch
    /// geometry from its capabilities, build the program, bind buffers and
    /// scratch, dispatch, wait, and read back the product together with the
    /// device-side execution time.
    pub fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<DeviceRun> {
        let n = a.n();
        assert_eq!(n, b.n(), "operand dimensions differ: {} vs {}", a.n(), b.n());
        assert!(n > 0, "empty operands");

        let devices = self.backend.enumerate_devices()?;
        let device = self
            .policy
            .select(&devices)
            .cloned()
            .ok_or(DeviceError::RuntimeUnavailable { status: status::DEVICE_NOT_FOUND })?;
        log::info!(
            "selected device '{}' ({}, {} compute units)",
            device.name,
            device.vendor,
            device.compute_units
        );

        let max_group = self.backend.max_group_size(device.id)?;
        let hint = device.compute_units.min(max_group);
        let geometry = LaunchGeometry::for_columns(n, hint);
        log::debug!("{} kernel, {geometry}", self.variant);

        let program = self.backend.build_program(device.id, TILE_MUL_SOURCE)?;
        let kernel = self.backend.create_kernel(program, self.variant.entry())?;

        let a_buf = ScopedBuffer::create(self.backend, device.id, n * n, Access::ReadOnly)?;
        let b_buf = ScopedBuffer::create(self.backend, device.id, n * n, Access::ReadOnly)?;
        let c_buf = ScopedBuffer::create(self.backend, device.id, n * n, Access::ReadWrite)?;

        self.backend.write_buffer(a_buf.id(), a.as_slice())?;
        self.backend.write_buffer(b_buf.id(), b.as_slice())?;

        self.backend.set_arg(kernel, 0, Arg::Buffer(a_buf.id()))?;
        self.backend.set_arg(kernel, 1, Arg::Buffer(b_buf.id()))?;
        self.backend.set_arg(kernel, 2, Arg::Buffer(c_buf.id()))?;
        let mut index = 3;
        for len in self.variant.scratch_lens(n, geometry.group) {
            self.backend.set_arg(kernel, index, Arg::Scratch { len })?;
            index += 1;
        }
        self.backend.set_arg(kernel, index, Arg::Uint(n as u32))?;

        let event = self.backend.enqueue_kernel(kernel, &geometry)?;
        self.backend.finish()?;

        let mut c = Matrix::zeros(n);
        self.backend.read_buffer(c_buf.id(), c.as_mut_slice())?;
        let timing = self.backend.event_timing(event)?;

        Ok(DeviceRun {
            c,
            timing,
            geometry,
            device,
            entry: self.variant.entry(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::DeviceId;

    use super::*;

    fn info(id: usize, name: &str, vendor: &str, class: DeviceClass, units: usize) -> DeviceInfo {
        DeviceInfo {
            id: DeviceId(id),
            name: name.to_string(),
            vendor: vendor.to_string(),
            class,
            compute_units: units,
        }
    }

    #[test]
    fn policy_skips_non_accelerators() {
        let policy = DevicePolicy::default();
        assert!(policy.select(&[]).is_none());
        let devices = [info(0, "Host CPU", "ACME", DeviceClass::Cpu, 64)];
        assert!(policy.select(&devices).is_none());
    }

    #[test]
    fn policy_prefers_listed_vendor_over_capability() {
        let policy = DevicePolicy::default();
        let devices = [
            info(0, "Big Iron", "ACME", DeviceClass::Accelerator, 128),
            info(1, "GeForce Device", "NVIDIA Corporation", DeviceClass::Accelerator, 16),
        ];
        assert_eq!(policy.select(&devices).unwrap().id, DeviceId(1));
    }

    #[test]
    fn policy_matches_device_name_as_fallback_for_vendor() {
        let policy = DevicePolicy::default();
        let devices = [
            info(0, "Big Iron", "ACME", DeviceClass::Accelerator, 128),
            info(1, "NVIDIA A10", "", DeviceClass::Accelerator, 16),
        ];
        assert_eq!(policy.select(&devices).unwrap().id, DeviceId(1));
    }

    #[test]
    fn policy_breaks_ties_on_compute_units() {
        let policy = DevicePolicy::default();
        let devices = [
            info(0, "Small", "ACME", DeviceClass::Accelerator, 4),
            info(1, "Large", "ACME", DeviceClass::Accelerator, 32),
            info(2, "Medium", "ACME", DeviceClass::Accelerator, 16),
        ];
        // Nothing matches the preference list; capability decides.
        assert_eq!(policy.select(&devices).unwrap().id, DeviceId(1));
    }

    #[test]
    fn policy_respects_preference_order() {
        let policy = DevicePolicy::prefer(&["AMD", "NVIDIA"]);
        let devices = [
            info(0, "GeForce", "NVIDIA", DeviceClass::Accelerator, 128),
            info(1, "Radeon", "AMD", DeviceClass::Accelerator, 8),
        ];
        assert_eq!(policy.select(&devices).unwrap().id, DeviceId(1));
    }

    #[test]
    fn variants_map_to_entries_and_scratch() {
        assert_eq!(KernelVariant::RowStaged.entry(), ENTRY_TILE_MUL_ROW);
        assert_eq!(KernelVariant::RowColStaged.entry(), ENTRY_TILE_MUL_ROW_COL);
        assert_eq!(KernelVariant::RowStaged.scratch_lens(6, 2), vec![6]);
        assert_eq!(KernelVariant::RowColStaged.scratch_lens(6, 2), vec![6, 12]);
        assert_eq!(KernelVariant::default(), KernelVariant::RowStaged);
    }
}
