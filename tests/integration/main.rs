//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters or the simulated I2C bus.  All tests run on the
//! host (x86_64) with no real hardware required.

mod executor_tests;
mod mock_hw;
mod service_tests;
