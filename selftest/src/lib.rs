/*!

Provides utilities for testing the harness and the test suites without a live cluster. We call
this testing modality `selftest` to distinguish it from the cluster tests themselves.

!*/

pub mod machine;

pub use machine::{Reply, ScriptedMachine};

/// Sends `log` output of the code under test to the test harness's captured output. Safe to call
/// from every test.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
