use std::process::ExitCode;

use tilemul::device::SimBackend;
use tilemul::matrix::Matrix;
use tilemul::orchestrator::Orchestrator;
use tilemul::report::{self, RunSnapshot};
use tilemul::serial;
use tilemul::validate;

const DEFAULT_N: usize = 256;
const DEFAULT_SEED: u64 = 42;

fn parse_args() -> Option<(usize, u64)> {
    let mut args = std::env::args().skip(1);
    let n = match args.next() {
        None => DEFAULT_N,
        Some(raw) => match raw.parse() {
            Ok(n) if n > 0 => n,
            _ => return None,
        },
    };
    let seed = match args.next() {
        None => DEFAULT_SEED,
        Some(raw) => match raw.parse() {
            Ok(seed) => seed,
            Err(_) => return None,
        },
    };
    if args.next().is_some() {
        return None;
    }
    Some((n, seed))
}

fn main() -> ExitCode {
    env_logger::init();

    let Some((n, seed)) = parse_args() else {
        eprintln!("usage: tilemul [n] [seed]   (n >= 1)");
        return ExitCode::from(64);
    };

    log::info!("multiplying {n}x{n} matrices (seed {seed})");
    let a = Matrix::random(n, seed);
    let b = Matrix::random(n, seed + 1);
    if n <= 8 {
        log::debug!("matrix A:\n{a}");
        log::debug!("matrix B:\n{b}");
    }

    let (c_serial, serial_elapsed) = serial::multiply_timed(&a, &b);
    let serial_ms = serial_elapsed.as_secs_f64() * 1000.0;
    println!("Serial time: {serial_ms:.1} ms");

    let backend = SimBackend::new();
    let run = match Orchestrator::new(&backend).multiply(&a, &b) {
        Ok(run) => run,
        Err(err) => {
            eprintln!("device multiply failed: {err}");
            return ExitCode::from(err.exit_code());
        }
    };

    let device_ms = run.timing.elapsed_ms();
    println!(
        "Device time: {device_ms:.1} ms ({}, {})",
        run.device.name, run.geometry
    );

    let mismatch = validate::first_mismatch(&run.c, &c_serial, validate::DEFAULT_EPS);
    if let Some(m) = mismatch {
        log::warn!(
            "first mismatch at ({}, {}): device {} vs serial {}",
            m.row,
            m.col,
            m.got,
            m.want
        );
    }
    let equal = mismatch.is_none();
    println!("Matrices are {}", validate::verdict(equal));

    report::write_snapshot(
        report::SNAPSHOT_PATH,
        &RunSnapshot {
            n,
            seed,
            device: run.device.name.clone(),
            vendor: run.device.vendor.clone(),
            kernel: run.entry.to_string(),
            global: run.geometry.global,
            group: run.geometry.group,
            serial_ms,
            device_ms,
            verdict: validate::verdict(equal).to_string(),
            timestamp_ms: report::now_ms(),
        },
    );

    if equal { ExitCode::SUCCESS } else { ExitCode::from(1) }
}
