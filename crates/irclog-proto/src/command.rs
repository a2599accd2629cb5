//! IRC commands understood by the client.
//!
//! Only the commands a logging client sends or records get typed variants.
//! Numerics land in [`Command::Response`] and everything else in
//! [`Command::Raw`], so no line is ever rejected for being unfamiliar.

/// A typed IRC command with its parameters.
#[allow(non_camel_case_types)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `NICK nickname`
    NICK(String),
    /// `USER username mode :realname`
    USER(String, String, String),
    /// `PING server [server2]`
    PING(String, Option<String>),
    /// `PONG server [server2]`
    PONG(String, Option<String>),
    /// `JOIN channels [keys]`
    JOIN(String, Option<String>),
    /// `PART channel [:reason]`
    PART(String, Option<String>),
    /// `QUIT [:reason]`
    QUIT(Option<String>),
    /// `PRIVMSG target :text`
    PRIVMSG(String, String),
    /// `NOTICE target :text`
    NOTICE(String, String),
    /// `TOPIC channel [:topic]`
    TOPIC(String, Option<String>),
    /// `KICK channel user [:reason]`
    KICK(String, String, Option<String>),
    /// `ERROR :message`
    ERROR(String),
    /// Three-digit numeric reply.
    Response(u16, Vec<String>),
    /// Any other command, or a known one with too few or too many
    /// parameters.
    Raw(String, Vec<String>),
}

impl Command {
    /// Build a command from its name and parameters.
    pub fn new(name: &str, params: Vec<String>) -> Command {
        if name.len() == 3
            && let Ok(code) = name.parse::<u16>()
        {
            return Command::Response(code, params);
        }

        let upper = name.to_ascii_uppercase();
        let arity = match upper.as_str() {
            "NICK" | "ERROR" => Some((1, 1)),
            "JOIN" | "PING" | "PONG" | "PART" | "TOPIC" => Some((1, 2)),
            "PRIVMSG" | "NOTICE" => Some((2, 2)),
            "KICK" => Some((2, 3)),
            "USER" => Some((4, 4)),
            "QUIT" => Some((0, 1)),
            _ => None,
        };
        // Anything a typed variant cannot hold stays raw so it re-serializes intact.
        let fits = arity.is_some_and(|(min, max)| (min..=max).contains(&params.len()));
        if !fits {
            return Command::Raw(upper, params);
        }

        let mut params = params.into_iter();
        let mut next = || params.next();
        match upper.as_str() {
            "NICK" => Command::NICK(next().unwrap_or_default()),
            "JOIN" => {
                let chans = next().unwrap_or_default();
                Command::JOIN(chans, next())
            }
            "PING" => {
                let a = next().unwrap_or_default();
                Command::PING(a, next())
            }
            "PONG" => {
                let a = next().unwrap_or_default();
                Command::PONG(a, next())
            }
            "ERROR" => Command::ERROR(next().unwrap_or_default()),
            "PART" => {
                let chan = next().unwrap_or_default();
                Command::PART(chan, next())
            }
            "TOPIC" => {
                let chan = next().unwrap_or_default();
                Command::TOPIC(chan, next())
            }
            "QUIT" => Command::QUIT(next()),
            "PRIVMSG" => {
                let target = next().unwrap_or_default();
                Command::PRIVMSG(target, next().unwrap_or_default())
            }
            "NOTICE" => {
                let target = next().unwrap_or_default();
                Command::NOTICE(target, next().unwrap_or_default())
            }
            "KICK" => {
                let chan = next().unwrap_or_default();
                let who = next().unwrap_or_default();
                Command::KICK(chan, who, next())
            }
            "USER" => {
                let user = next().unwrap_or_default();
                let mode = next().unwrap_or_default();
                let _unused = next();
                Command::USER(user, mode, next().unwrap_or_default())
            }
            _ => Command::Raw(upper, params.collect()),
        }
    }

    /// The command name as it appears on the wire.
    pub fn name(&self) -> String {
        match self {
            Command::NICK(..) => "NICK".into(),
            Command::USER(..) => "USER".into(),
            Command::PING(..) => "PING".into(),
            Command::PONG(..) => "PONG".into(),
            Command::JOIN(..) => "JOIN".into(),
            Command::PART(..) => "PART".into(),
            Command::QUIT(..) => "QUIT".into(),
            Command::PRIVMSG(..) => "PRIVMSG".into(),
            Command::NOTICE(..) => "NOTICE".into(),
            Command::TOPIC(..) => "TOPIC".into(),
            Command::KICK(..) => "KICK".into(),
            Command::ERROR(..) => "ERROR".into(),
            Command::Response(code, _) => format!("{code:03}"),
            Command::Raw(name, _) => name.clone(),
        }
    }

    /// The parameters in wire order.
    pub fn params(&self) -> Vec<&str> {
        fn push_opt<'a>(v: &mut Vec<&'a str>, opt: &'a Option<String>) {
            if let Some(s) = opt {
                v.push(s);
            }
        }

        let mut v: Vec<&str> = Vec::new();
        match self {
            Command::NICK(a) | Command::ERROR(a) => v.push(a),
            Command::USER(user, mode, real) => {
                v.push(user);
                v.push(mode);
                v.push("*");
                v.push(real);
            }
            Command::JOIN(a, b)
            | Command::PING(a, b)
            | Command::PONG(a, b)
            | Command::PART(a, b)
            | Command::TOPIC(a, b) => {
                v.push(a);
                push_opt(&mut v, b);
            }
            Command::QUIT(reason) => push_opt(&mut v, reason),
            Command::PRIVMSG(a, b) | Command::NOTICE(a, b) => {
                v.push(a);
                v.push(b);
            }
            Command::KICK(chan, who, reason) => {
                v.push(chan);
                v.push(who);
                push_opt(&mut v, reason);
            }
            Command::Response(_, params) | Command::Raw(_, params) => {
                v.extend(params.iter().map(String::as_str));
            }
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_kick_with_and_without_reason() {
        assert_eq!(
            Command::new("KICK", s(&["#c", "bob", "bye"])),
            Command::KICK("#c".into(), "bob".into(), Some("bye".into()))
        );
        assert_eq!(
            Command::new("kick", s(&["#c", "bob"])),
            Command::KICK("#c".into(), "bob".into(), None)
        );
    }

    #[test]
    fn test_short_privmsg_is_raw() {
        assert_eq!(
            Command::new("PRIVMSG", s(&["#c"])),
            Command::Raw("PRIVMSG".into(), s(&["#c"]))
        );
    }

    #[test]
    fn test_numeric() {
        assert_eq!(
            Command::new("001", s(&["me", "Welcome"])),
            Command::Response(1, s(&["me", "Welcome"]))
        );
        assert_eq!(Command::Response(1, vec![]).name(), "001");
    }

    #[test]
    fn test_join_keeps_key() {
        assert_eq!(
            Command::new("JOIN", s(&["#secret", "hunter2"])),
            Command::JOIN("#secret".into(), Some("hunter2".into()))
        );
        assert_eq!(
            Command::JOIN("#secret".into(), Some("hunter2".into())).params(),
            vec!["#secret", "hunter2"]
        );
    }

    #[test]
    fn test_extra_params_stay_raw() {
        assert_eq!(
            Command::new("NICK", s(&["bot", "extra"])),
            Command::Raw("NICK".into(), s(&["bot", "extra"]))
        );
        assert_eq!(
            Command::new("privmsg", s(&["a", "b", "c"])),
            Command::Raw("PRIVMSG".into(), s(&["a", "b", "c"]))
        );
    }

    #[test]
    fn test_user_params_include_unused_field() {
        let cmd = Command::USER("bot".into(), "0".into(), "Logger".into());
        assert_eq!(cmd.params(), vec!["bot", "0", "*", "Logger"]);
    }
}
