use std::fmt;

use super::Reply;

/// One protocol command: a verb followed by its arguments, all sent as bulk
/// strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            args: vec![name.into()],
        }
    }

    pub fn arg(mut self, arg: impl fmt::Display) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.args[0]
    }

    pub fn args(&self) -> &[String] {
        &self.args[1..]
    }

    /// Pair this command with the reply it must produce in a batch.
    pub fn expect(self, expect: Expect) -> Expectation {
        Expectation {
            command: self,
            expect,
        }
    }

    pub fn expect_ok(self) -> Expectation {
        self.expect(Expect::Ok)
    }

    pub fn to_redis(&self) -> redis::Cmd {
        let mut cmd = redis::cmd(self.name());
        for arg in self.args() {
            cmd.arg(arg);
        }
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// What a batched command must reply with.
#[derive(Debug, Clone, PartialEq)]
pub enum Expect {
    /// The `OK` status reply.
    Ok,
    /// A simple or bulk string with exactly this text.
    Text(String),
    Integer(i64),
    /// An error reply whose message contains this text.
    Error(String),
    /// Any reply that is not an error.
    Any,
}

impl Expect {
    pub fn matches(&self, reply: &Reply) -> bool {
        match self {
            Expect::Ok => reply.is_ok(),
            Expect::Text(text) => !reply.is_error() && reply.as_text().as_deref() == Some(text),
            Expect::Integer(n) => matches!(reply, Reply::Integer(v) if v == n),
            Expect::Error(msg) => matches!(reply, Reply::Error(e) if e.contains(msg.as_str())),
            Expect::Any => !reply.is_error(),
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Ok => write!(f, "OK"),
            Expect::Text(text) => write!(f, "{}", text),
            Expect::Integer(n) => write!(f, "{}", n),
            Expect::Error(msg) => write!(f, "error containing '{}'", msg),
            Expect::Any => write!(f, "any non-error reply"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    pub command: Command,
    pub expect: Expect,
}
