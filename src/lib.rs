pub mod backend;
pub mod device;
pub mod error;
pub mod kernel;
pub mod launch;
pub mod matrix;
pub mod memory;
pub mod orchestrator;
pub mod report;
pub mod serial;
pub mod validate;
