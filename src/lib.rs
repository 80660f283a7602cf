//! gcbench Library
//!
//! This library hosts the reusable components of the `gcbench` executable.
//! Right now that includes:
//!   - the garbage-collector benchmark harness (`bench`)
//!
//! Executables:
//!   - `gcbench`: run the configuration x workload matrix, render reports,
//!     inspect single runs, validate the environment
//!
//! Shared code lives under `gcbench::<module>`.

pub mod bench;
