/// Run report snapshot.
///
/// The binary writes one JSON snapshot per multiply run so results can be
/// inspected or scraped after the process exits. Writes are atomic (write
/// to .tmp then rename) to avoid torn reads by a concurrent consumer.
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_PATH: &str = "/tmp/tilemul_run.json";

/// Everything one run decided and measured.
#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct RunSnapshot {
    /// Problem size; operands are n x n
    pub n: usize,
    /// Seed the operands were generated from
    pub seed: u64,
    /// Selected device name
    pub device: String,
    /// Selected device vendor
    pub vendor: String,
    /// Kernel entry point dispatched
    pub kernel: String,
    /// Workers launched, one per output column
    pub global: usize,
    /// Workers per cooperating group
    pub group: usize,
    /// Serial reference time in milliseconds
    pub serial_ms: f64,
    /// Device execution time in milliseconds, kernel window only
    pub device_ms: f64,
    /// Comparison verdict: "equal" or "not equal"
    pub verdict: String,
    /// Unix timestamp in ms when this snapshot was written
    pub timestamp_ms: u64,
}

/// Atomically write a snapshot to `path`. Reporting is best effort; a full
/// disk must not turn a finished multiply into a failure.
pub fn write_snapshot(path: &str, snapshot: &RunSnapshot) {
    if let Ok(json) = serde_json::to_string(snapshot) {
        let tmp = format!("{path}.tmp");
        if std::fs::write(&tmp, &json).is_ok() {
            let _ = std::fs::rename(&tmp, path);
        }
    }
}

/// Read back the latest snapshot. Returns None if the file doesn't exist
/// or can't be parsed (e.g. no run has finished yet).
pub fn read_snapshot(path: &str) -> Option<RunSnapshot> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

/// Returns current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("tilemul_{tag}_{}.json", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let path = temp_path("roundtrip");
        let snapshot = RunSnapshot {
            n: 6,
            seed: 42,
            device: "Sim A".to_string(),
            vendor: "NVIDIA".to_string(),
            kernel: "tile_mul_row".to_string(),
            global: 6,
            group: 2,
            serial_ms: 0.4,
            device_ms: 0.1,
            verdict: "equal".to_string(),
            timestamp_ms: now_ms(),
        };
        write_snapshot(&path, &snapshot);
        let back = read_snapshot(&path).unwrap();
        assert_eq!(back.n, 6);
        assert_eq!(back.group, 2);
        assert_eq!(back.verdict, "equal");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_snapshot_reads_as_none() {
        let path = temp_path("missing");
        let _ = std::fs::remove_file(&path);
        assert!(read_snapshot(&path).is_none());
    }

    #[test]
    fn timestamps_advance() {
        assert!(now_ms() > 0);
    }
}
