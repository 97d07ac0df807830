pub mod parallel;
pub mod worker;

pub use parallel::{ParallelScanner, ScanRun};
pub use worker::ScanWorker;
