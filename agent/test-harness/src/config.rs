/*!

The harness is configured through environment variables with the `CLUSTERTEST_` prefix. Every
setting has a default, so an empty environment yields a usable configuration.

```text
CLUSTERTEST_DISTRO=cl
CLUSTERTEST_PLATFORM=qemu
CLUSTERTEST_INTERNET_ACCESS=true
CLUSTERTEST_HEALTH_CHECK_ATTEMPTS=60
CLUSTERTEST_HEALTH_CHECK_DELAY_SECS=3
CLUSTERTEST_TEST_TIMEOUT_SECS=1200
CLUSTERTEST_NAME_PATTERN=rkt.*
```

!*/

use crate::error::{self, ConfigError};
use crate::RetryPolicy;
use model::constants::{
    DEFAULT_DISTRO, DEFAULT_HEALTH_CHECK_ATTEMPTS, DEFAULT_HEALTH_CHECK_DELAY_SECS,
    DEFAULT_PLATFORM, ENV_PREFIX,
};
use model::{Filter, Flag};
use serde::Deserialize;
use snafu::ResultExt;
use std::time::Duration;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct HarnessConfig {
    /// The distro the machines under test are running.
    #[serde(default = "default_distro")]
    pub distro: String,

    /// The platform the machines were provisioned on.
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Whether the machines can reach the internet. Enables tests flagged
    /// [`Flag::RequiresInternetAccess`].
    #[serde(default)]
    pub internet_access: bool,

    /// How many times the cluster health precondition polls before giving up.
    #[serde(default = "default_health_check_attempts")]
    pub health_check_attempts: u32,

    /// Seconds between cluster health polls.
    #[serde(default = "default_health_check_delay_secs")]
    pub health_check_delay_secs: u64,

    /// A time limit for tests that do not set their own.
    #[serde(default)]
    pub test_timeout_secs: Option<u64>,

    /// A glob restricting which tests run, e.g. `rkt.*`.
    #[serde(default)]
    pub name_pattern: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            distro: default_distro(),
            platform: default_platform(),
            internet_access: false,
            health_check_attempts: DEFAULT_HEALTH_CHECK_ATTEMPTS,
            health_check_delay_secs: DEFAULT_HEALTH_CHECK_DELAY_SECS,
            test_timeout_secs: None,
            name_pattern: None,
        }
    }
}

impl HarnessConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(ENV_PREFIX)
            .from_env::<Self>()
            .context(error::EnvSnafu)?)
    }

    /// Reads the configuration from the given `(name, value)` pairs instead of the process
    /// environment.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX)
            .from_iter::<_, Self>(vars)
            .context(error::EnvSnafu)?)
    }

    /// The filter that selects the tests for this configuration.
    pub fn filter(&self) -> Result<Filter, ConfigError> {
        let mut filter = Filter::new(&self.distro).with_platform(&self.platform);
        if self.internet_access {
            filter = filter.with_flag(Flag::RequiresInternetAccess);
        }
        if let Some(pattern) = &self.name_pattern {
            filter = filter
                .with_name_glob(pattern)
                .context(error::NamePatternSnafu)?;
        }
        Ok(filter)
    }

    pub fn health_check_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.health_check_attempts,
            Duration::from_secs(self.health_check_delay_secs),
        )
    }

    pub fn test_timeout(&self) -> Option<Duration> {
        self.test_timeout_secs.map(Duration::from_secs)
    }
}

fn default_distro() -> String {
    DEFAULT_DISTRO.to_string()
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

fn default_health_check_attempts() -> u32 {
    DEFAULT_HEALTH_CHECK_ATTEMPTS
}

fn default_health_check_delay_secs() -> u64 {
    DEFAULT_HEALTH_CHECK_DELAY_SECS
}

#[cfg(test)]
mod test {
    use super::*;
    use model::constants::{
        ENV_DISTRO, ENV_HEALTH_CHECK_ATTEMPTS, ENV_HEALTH_CHECK_DELAY_SECS, ENV_INTERNET_ACCESS,
        ENV_NAME_PATTERN, ENV_PLATFORM, ENV_TEST_TIMEOUT_SECS,
    };

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = HarnessConfig::from_vars(vars(&[("UNRELATED", "1")])).unwrap();
        assert_eq!(config, HarnessConfig::default());
        let policy = config.health_check_policy();
        assert_eq!(policy.max_attempts(), 60);
        assert_eq!(policy.delay(), Duration::from_secs(3));
        assert_eq!(config.test_timeout(), None);

        let filter = config.filter().unwrap();
        assert_eq!(filter.distro(), "cl");
        assert_eq!(filter.platform(), Some("qemu"));
        assert!(!filter.is_enabled(Flag::RequiresInternetAccess));
    }

    #[test]
    fn overrides() {
        let config = HarnessConfig::from_vars(vars(&[
            (ENV_DISTRO, "rhcos"),
            (ENV_INTERNET_ACCESS, "true"),
            (ENV_HEALTH_CHECK_ATTEMPTS, "5"),
            (ENV_TEST_TIMEOUT_SECS, "90"),
            (ENV_NAME_PATTERN, "coreos.*"),
        ]))
        .unwrap();
        assert_eq!(config.health_check_policy().max_attempts(), 5);
        assert_eq!(config.test_timeout(), Some(Duration::from_secs(90)));

        let filter = config.filter().unwrap();
        assert_eq!(filter.distro(), "rhcos");
        assert!(filter.is_enabled(Flag::RequiresInternetAccess));
        assert!(filter.matches_name("coreos.tls.fetch-urls"));
        assert!(!filter.matches_name("rkt.base"));
    }

    #[test]
    fn huge_health_check_policy() {
        let config = HarnessConfig::from_vars(vars(&[
            (ENV_PLATFORM, "aws"),
            (ENV_HEALTH_CHECK_ATTEMPTS, "4294967295"),
            (ENV_HEALTH_CHECK_DELAY_SECS, "18446744073709551615"),
        ]))
        .unwrap();
        assert_eq!(config.filter().unwrap().platform(), Some("aws"));
        assert_eq!(config.health_check_policy().max_wait(), Duration::MAX);
    }

    #[test]
    fn malformed_values() {
        assert!(
            HarnessConfig::from_vars(vars(&[(ENV_HEALTH_CHECK_ATTEMPTS, "many")]))
                .is_err()
        );
    }
}
