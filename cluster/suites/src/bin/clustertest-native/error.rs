use snafu::Snafu;
use test_harness::error::{NativeError, RegistryError};

/// The crate-wide result type.
pub(crate) type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum Error {
    #[snafu(display("{}", source))]
    Native { source: NativeError },

    #[snafu(display("Unable to register the test suites: {}", source))]
    Registry { source: RegistryError },
}
