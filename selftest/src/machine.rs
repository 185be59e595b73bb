use async_trait::async_trait;
use log::trace;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use test_harness::{BoxError, CommandOutput, Machine, MachineHandle};

/// What a [`ScriptedMachine`] answers to a command.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Reply {
    /// The command ran and exited with `status`.
    Exit {
        stdout: String,
        stderr: String,
        status: i32,
    },
    /// The command could not be delivered to the machine.
    Unreachable(String),
}

impl Reply {
    pub fn success<S>(stdout: S) -> Self
    where
        S: Into<String>,
    {
        Reply::Exit {
            stdout: stdout.into(),
            stderr: String::new(),
            status: 0,
        }
    }

    pub fn failure<S>(status: i32, stderr: S) -> Self
    where
        S: Into<String>,
    {
        Reply::Exit {
            stdout: String::new(),
            stderr: stderr.into(),
            status,
        }
    }

    pub fn unreachable<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Reply::Unreachable(message.into())
    }
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    /// Replies still to be given, in order. The last one is repeated forever.
    replies: VecDeque<Reply>,
}

impl Rule {
    fn next(&mut self) -> Reply {
        if self.replies.len() > 1 {
            self.replies.pop_front().unwrap_or_else(|| Reply::success(""))
        } else {
            self.replies
                .front()
                .cloned()
                .unwrap_or_else(|| Reply::success(""))
        }
    }
}

/// A [`Machine`] that answers commands from a script instead of running them. A command gets the
/// reply of the first rule whose pattern it contains; commands that match no rule succeed with
/// empty output. Every command is recorded so tests can check what was run.
#[derive(Debug)]
pub struct ScriptedMachine {
    id: String,
    rules: Mutex<Vec<Rule>>,
    fallback: Reply,
    history: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedMachine {
    pub fn new<S>(id: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            id: id.into(),
            rules: Mutex::new(Vec::new()),
            fallback: Reply::success(""),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Answers every command containing `pattern` with `reply`.
    pub fn on<S>(self, pattern: S, reply: Reply) -> Self
    where
        S: Into<String>,
    {
        self.on_sequence(pattern, vec![reply])
    }

    /// Answers commands containing `pattern` with `replies` in order, repeating the last reply
    /// once the others are used up.
    pub fn on_sequence<S>(self, pattern: S, replies: Vec<Reply>) -> Self
    where
        S: Into<String>,
    {
        lock(&self.rules).push(Rule {
            pattern: pattern.into(),
            replies: replies.into(),
        });
        self
    }

    /// The reply for commands that match no rule.
    pub fn otherwise(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    /// Wraps the machine for use in a cluster while keeping a handle for inspection.
    pub fn into_handles(self) -> (Arc<ScriptedMachine>, MachineHandle) {
        let machine = Arc::new(self);
        let handle: MachineHandle = machine.clone();
        (machine, handle)
    }

    /// Every command run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    /// How many commands run so far contain `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        lock(&self.history)
            .iter()
            .filter(|command| command.contains(pattern))
            .count()
    }

    fn reply_for(&self, command: &str) -> Reply {
        let mut rules = lock(&self.rules);
        match rules
            .iter_mut()
            .find(|rule| command.contains(rule.pattern.as_str()))
        {
            Some(rule) => rule.next(),
            None => self.fallback.clone(),
        }
    }
}

#[async_trait]
impl Machine for ScriptedMachine {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, BoxError> {
        lock(&self.history).push(command.to_string());
        let reply = self.reply_for(command);
        trace!("{}: '{}' -> {:?}", self.id, command, reply);
        match reply {
            Reply::Exit {
                stdout,
                stderr,
                status,
            } => Ok(CommandOutput {
                stdout: stdout.into_bytes(),
                stderr: stderr.into_bytes(),
                status: Some(status),
            }),
            Reply::Unreachable(message) => Err(message.into()),
        }
    }
}
