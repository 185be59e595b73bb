use crate::error::{self, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::BTreeSet;

/// A capability that a test requires from the environment it runs in. A test is only selected
/// when every one of its flags is enabled in the [`Filter`] of the run.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum Flag {
    /// The test reaches hosts outside of the cluster, e.g. fetches URLs or container images.
    RequiresInternetAccess,
}

serde_plain::derive_fromstr_from_deserialize!(Flag, |e| -> crate::Error {
    crate::error::OpaqueError::SerdePlain { source: e }.into()
});
serde_plain::derive_display_from_serialize!(Flag);

/// Describes the run that tests are being selected for: which distro and platform the machines
/// are running, which capability flags are enabled, and optionally a glob restricting test names.
#[derive(Debug, Clone)]
pub struct Filter {
    distro: String,
    platform: Option<String>,
    enabled_flags: BTreeSet<Flag>,
    name_pattern: Option<Regex>,
}

impl Filter {
    /// Creates a filter for `distro` with no flags enabled, no platform and no name restriction.
    pub fn new<S>(distro: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            distro: distro.into(),
            platform: None,
            enabled_flags: BTreeSet::new(),
            name_pattern: None,
        }
    }

    /// Sets the platform. Without a platform, the platform lists of a test are not consulted.
    pub fn with_platform<S>(mut self, platform: S) -> Self
    where
        S: Into<String>,
    {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.enabled_flags.insert(flag);
        self
    }

    pub fn with_flags<I>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = Flag>,
    {
        self.enabled_flags.extend(flags);
        self
    }

    /// Restricts the filter to test names matching `glob`, where `*` matches any run of
    /// characters and `?` matches a single character.
    pub fn with_name_glob(mut self, glob: &str) -> Result<Self> {
        let pattern = glob_to_regex(glob);
        let regex = Regex::new(&pattern).context(error::NamePatternSnafu { pattern: glob })?;
        self.name_pattern = Some(regex);
        Ok(self)
    }

    pub fn distro(&self) -> &str {
        &self.distro
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn enabled_flags(&self) -> &BTreeSet<Flag> {
        &self.enabled_flags
    }

    pub fn is_enabled(&self, flag: Flag) -> bool {
        self.enabled_flags.contains(&flag)
    }

    /// Returns `true` if there is no name restriction or `name` matches it.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_pattern
            .as_ref()
            .map(|regex| regex.is_match(name))
            .unwrap_or(true)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    pattern.push('$');
    pattern
}

/// The applicability metadata of a test: the capability flags it needs and the distros and
/// platforms it may run on. Empty inclusion sets mean "all". When a value appears in both an
/// inclusion and an exclusion set, the exclusion wins.
#[derive(Serialize, Deserialize, Debug, Default, Eq, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Applicability {
    pub flags: BTreeSet<Flag>,
    pub distros: BTreeSet<String>,
    pub exclude_distros: BTreeSet<String>,
    pub platforms: BTreeSet<String>,
    pub exclude_platforms: BTreeSet<String>,
}

impl Applicability {
    /// Whether a test with this metadata should run under `filter`.
    pub fn matches(&self, filter: &Filter) -> bool {
        let distro = filter.distro();
        if !self.distros.is_empty() && !self.distros.contains(distro) {
            return false;
        }
        if self.exclude_distros.contains(distro) {
            return false;
        }
        if let Some(platform) = filter.platform() {
            if !self.platforms.is_empty() && !self.platforms.contains(platform) {
                return false;
            }
            if self.exclude_platforms.contains(platform) {
                return false;
            }
        }
        self.flags.is_subset(filter.enabled_flags())
    }

    /// Distros that are both included and excluded. These never match.
    pub fn conflicting_distros(&self) -> Vec<&str> {
        self.distros
            .intersection(&self.exclude_distros)
            .map(String::as_str)
            .collect()
    }
}
