use crate::{BoxError, CommandOutput, Machine};
use async_trait::async_trait;
use openssh::Session;
use std::fmt::{Debug, Formatter};

/// A [`Machine`] reached over an established [`openssh::Session`]. Opening the session (keys,
/// known hosts, user) is left to the provisioning layer.
pub struct SshMachine {
    id: String,
    session: Session,
}

impl SshMachine {
    pub fn new<S>(id: S, session: Session) -> Self
    where
        S: Into<String>,
    {
        Self {
            id: id.into(),
            session,
        }
    }
}

impl Debug for SshMachine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshMachine").field("id", &self.id).finish()
    }
}

#[async_trait]
impl Machine for SshMachine {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, BoxError> {
        let output = self.session.shell(command).output().await?;
        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status.code(),
        })
    }
}
