use serde::{Deserialize, Serialize};

/// The format of a [`UserData`] payload.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum UserDataKind {
    Ignition,
    CloudConfig,
    Script,
}

serde_plain::derive_display_from_serialize!(UserDataKind);

/// The initial machine configuration a test asks the provisioning layer to boot its machines with.
/// The harness never interprets the contents; it only carries them along with the test.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone)]
pub struct UserData {
    pub kind: UserDataKind,
    pub contents: String,
}

impl UserData {
    pub fn ignition<S>(contents: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind: UserDataKind::Ignition,
            contents: contents.into(),
        }
    }

    pub fn cloud_config<S>(contents: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind: UserDataKind::CloudConfig,
            contents: contents.into(),
        }
    }

    pub fn script<S>(contents: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind: UserDataKind::Script,
            contents: contents.into(),
        }
    }
}

/// Adjustments a test asks of the provisioning layer beyond its [`UserData`]. These do not take
/// part in test selection.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum ProvisioningHint {
    /// Do not inject the harness SSH key into the user data.
    NoSshKeyInUserData,
    /// Do not inject the harness SSH key through platform metadata.
    NoSshKeyInMetadata,
    /// Do not fail the machine if it boots into an emergency shell.
    NoEmergencyShellCheck,
}

serde_plain::derive_display_from_serialize!(ProvisioningHint);
