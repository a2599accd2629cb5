//! Protocol event to [`LogRecord`] translation.

use crate::model::{LogKind, LogRecord, NetworkId};
use crate::transport::InboundEvent;
use chrono::{DateTime, Utc};
use irclog_proto::{Command, Prefix, is_channel_name};

/// Turn one inbound event into at most one record.
///
/// Returns `None` for events that are not logged: unsupported commands,
/// notices not addressed to a channel and topic queries without a topic.
pub fn translate(
    network_id: NetworkId,
    event: &InboundEvent,
    timestamp: DateTime<Utc>,
) -> Option<LogRecord> {
    let (kind, channel, target, payload) = match &event.message.command {
        Command::PRIVMSG(to, text) => (LogKind::Message, to.clone(), None, Some(text.clone())),
        Command::NOTICE(to, text) => {
            if !is_channel_name(to) {
                return None;
            }
            (LogKind::Notice, to.clone(), None, Some(text.clone()))
        }
        Command::JOIN(channel, _) => (LogKind::Join, channel.clone(), None, None),
        Command::PART(channel, reason) => (
            LogKind::Part,
            channel.clone(),
            None,
            Some(reason.clone().unwrap_or_default()),
        ),
        Command::TOPIC(channel, Some(topic)) => {
            (LogKind::Topic, channel.clone(), None, Some(topic.clone()))
        }
        Command::KICK(channel, who, reason) => (
            LogKind::Kick,
            channel.clone(),
            Some(who.clone()),
            Some(reason.clone().unwrap_or_default()),
        ),
        Command::QUIT(reason) => (
            LogKind::Quit,
            String::new(),
            None,
            Some(reason.clone().unwrap_or_default()),
        ),
        _ => return None,
    };

    let (nick, ident, host) = match &event.message.prefix {
        Some(Prefix::Nickname(nick, user, host)) => (nick.clone(), user.clone(), host.clone()),
        Some(Prefix::ServerName(name)) => (name.clone(), String::new(), name.clone()),
        None => Default::default(),
    };

    Some(LogRecord {
        network_id,
        channel,
        kind,
        timestamp,
        nick,
        ident,
        host,
        target,
        payload,
    })
}
