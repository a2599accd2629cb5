//! Message parsing and serialization.
//!
//! Wire format: `[@tags ][:prefix ]COMMAND[ params...][ :trailing]`.
//! Tags are accepted and discarded; the client never requests capabilities
//! that would make them meaningful.

use std::fmt;
use std::str::FromStr;

use crate::command::Command;
use crate::error::MessageParseError;
use crate::prefix::Prefix;

/// A single IRC protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Where the message came from, if the server said.
    pub prefix: Option<Prefix>,
    /// The command and its parameters.
    pub command: Command,
}

impl Message {
    /// Attach a prefix.
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Nickname of the sender, if the prefix names a user.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    pub fn join(channel: &str) -> Self {
        Command::JOIN(channel.to_string(), None).into()
    }

    pub fn part(channel: &str, reason: &str) -> Self {
        Command::PART(channel.to_string(), Some(reason.to_string())).into()
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Command::PRIVMSG(target.to_string(), text.to_string()).into()
    }

    pub fn quit(reason: &str) -> Self {
        Command::QUIT(Some(reason.to_string())).into()
    }
}

/// Returns true if `param` can go on the wire as a non-final parameter.
///
/// [`Message`]'s `Display` writes every parameter but the last one as is, so
/// targets and channel names must pass this before being sent.
pub fn is_middle_param(param: &str) -> bool {
    !param.is_empty()
        && !param.starts_with(':')
        && !param.contains([' ', '\r', '\n', '\0'])
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message {
            prefix: None,
            command,
        }
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s.trim_end_matches(['\r', '\n']);
        if rest.trim().is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        if rest.starts_with('@') {
            rest = match rest.split_once(' ') {
                Some((_, after)) => after.trim_start_matches(' '),
                None => return Err(MessageParseError::MissingCommand(s.to_string())),
            };
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (raw_prefix, after) = match stripped.split_once(' ') {
                Some(parts) => parts,
                None => return Err(MessageParseError::MissingCommand(s.to_string())),
            };
            rest = after.trim_start_matches(' ');
            Some(Prefix::new_from_str(raw_prefix))
        } else {
            None
        };

        let (name, mut params_str) = match rest.split_once(' ') {
            Some((name, after)) => (name, Some(after)),
            None => (rest, None),
        };
        if name.is_empty() {
            return Err(MessageParseError::MissingCommand(s.to_string()));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MessageParseError::InvalidCommand(name.to_string()));
        }

        let mut params = Vec::new();
        while let Some(p) = params_str {
            let p = p.trim_start_matches(' ');
            if p.is_empty() {
                break;
            }
            if let Some(trailing) = p.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match p.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    params_str = Some(after);
                }
                None => {
                    params.push(p.to_string());
                    params_str = None;
                }
            }
        }

        Ok(Message {
            prefix,
            command: Command::new(name, params),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command.name())?;

        let params = self.command.params();
        if let Some((last, middle)) = params.split_last() {
            for param in middle {
                write!(f, " {param}")?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}
