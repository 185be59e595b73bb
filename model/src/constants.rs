/// Helper macro to avoid retyping the prefix of our environment variables when creating further
/// string constants from it. When given no parameters, this returns the bare prefix. When given a
/// string literal parameter it appends the parameter to the prefix.
macro_rules! clustertest_env {
    () => {
        "CLUSTERTEST_"
    };
    ($s:literal) => {
        concat!(clustertest_env!(), $s)
    };
}

// Environment variables
pub const ENV_PREFIX: &str = clustertest_env!();
pub const ENV_DISTRO: &str = clustertest_env!("DISTRO");
pub const ENV_PLATFORM: &str = clustertest_env!("PLATFORM");
pub const ENV_INTERNET_ACCESS: &str = clustertest_env!("INTERNET_ACCESS");
pub const ENV_HEALTH_CHECK_ATTEMPTS: &str = clustertest_env!("HEALTH_CHECK_ATTEMPTS");
pub const ENV_HEALTH_CHECK_DELAY_SECS: &str = clustertest_env!("HEALTH_CHECK_DELAY_SECS");
pub const ENV_TEST_TIMEOUT_SECS: &str = clustertest_env!("TEST_TIMEOUT_SECS");
pub const ENV_NAME_PATTERN: &str = clustertest_env!("NAME_PATTERN");

// Defaults
pub const DEFAULT_DISTRO: &str = "cl";
pub const DEFAULT_PLATFORM: &str = "qemu";
pub const DEFAULT_HEALTH_CHECK_ATTEMPTS: u32 = 60;
pub const DEFAULT_HEALTH_CHECK_DELAY_SECS: u64 = 3;

/// The binary, relative to the remote user's home directory, that runs native functions on a
/// machine. It is invoked as `<NATIVE_RUNNER> run <test-name> <function-name>`.
pub const NATIVE_RUNNER: &str = "./clustertest-native";

/// Separator between the names of a test and its nested subtests, e.g. `rkt.base/cli`.
pub const SUBTEST_SEPARATOR: char = '/';
