/*!

This library provides the plain data types shared by the cluster test harness: the capability
flags and filters that decide which tests apply to a run, the opaque provisioning payload carried
by each test, and the reports that a dispatch produces.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use error::{Error, Result};
pub use filter::{Applicability, Filter, Flag};
pub use report::{DispatchReport, Failure, FailureKind, Outcome, TestReport};
pub use user_data::{ProvisioningHint, UserData, UserDataKind};

pub mod constants;
mod error;
mod filter;
mod report;
mod user_data;
