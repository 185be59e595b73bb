/*!

The cluster test suites: rkt container runtime tests, TLS trust store checks, and the coretest
groups of native functions that run on the machines themselves. Call [`register_all`] once at
startup to add every suite to a [`TestRegistry`].

The `clustertest-native` binary built from this crate is the machine-side runner of the native
functions. It must be installed on the machines under test as
[`NATIVE_RUNNER`](test_harness::constants::NATIVE_RUNNER).

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub mod coretest;
mod error;
pub mod etcd;
pub mod rkt;
mod tls;

pub use error::{Error, Result};
pub use etcd::EtcdHealth;
use test_harness::error::RegistryError;
use test_harness::TestRegistry;

/// Registers every suite of this crate.
pub fn register_all(registry: &mut TestRegistry) -> std::result::Result<(), RegistryError> {
    coretest::register(registry)?;
    rkt::register(registry)?;
    tls::register(registry)?;
    Ok(())
}
