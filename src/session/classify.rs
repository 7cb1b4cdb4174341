//! Turning parsed server lines into [`Event`]s.

use slircbot_proto::{Ctcp, CtcpKind, Message, is_channel_name};

use crate::flags::Client;
use crate::registry::Event;

/// End of MOTD.
pub const RPL_ENDOFMOTD: u16 = 376;
/// MOTD file is missing.
pub const ERR_NOMOTD: u16 = 422;
/// Nickname is already in use.
pub const ERR_NICKNAMEINUSE: u16 = 433;

/// Classify one line into the events it produces, in dispatch order:
/// `DataIn` first, then `Numeric` for numerics, then the specific event.
///
/// CTCP requests other than ACTION produce no chat event.
pub fn classify(msg: &Message, raw: &str) -> Vec<Event> {
    let mut events = vec![Event::DataIn {
        line: raw.to_string(),
    }];

    if let Some(code) = msg.numeric() {
        events.push(Event::Numeric {
            code,
            params: msg.params.clone(),
        });
        match code {
            RPL_ENDOFMOTD | ERR_NOMOTD => events.push(Event::ServerReady),
            ERR_NICKNAMEINUSE => events.push(Event::NickInUse {
                nick: msg.param(1).unwrap_or_default().to_string(),
            }),
            _ => {}
        }
        return events;
    }

    events.extend(specific(msg));
    events
}

fn client(msg: &Message) -> Option<Client> {
    msg.prefix.as_ref().and_then(Client::from_prefix)
}

fn owned(param: Option<&str>) -> Option<String> {
    param.map(str::to_string)
}

fn specific(msg: &Message) -> Option<Event> {
    match msg.command.as_str() {
        "PRIVMSG" => {
            let client = client(msg)?;
            let target = msg.param(0)?;
            let text = msg.param(1).unwrap_or_default();
            let channel = is_channel_name(target).then(|| target.to_string());

            match Ctcp::parse(text) {
                Some(Ctcp {
                    kind: CtcpKind::Action,
                    params,
                }) => {
                    let text = params.unwrap_or_default().to_string();
                    Some(match channel {
                        Some(channel) => Event::ChannelAction {
                            channel,
                            client,
                            text,
                        },
                        None => Event::PrivateAction { client, text },
                    })
                }
                Some(_) => None,
                None => {
                    let text = text.to_string();
                    Some(match channel {
                        Some(channel) => Event::ChannelMessage {
                            channel,
                            client,
                            text,
                        },
                        None => Event::PrivateMessage { client, text },
                    })
                }
            }
        }
        "NOTICE" => {
            let target = msg.param(0)?;
            let text = msg.param(1).unwrap_or_default().to_string();
            let client = client(msg);
            Some(if is_channel_name(target) {
                Event::ChannelNotice {
                    channel: target.to_string(),
                    client,
                    text,
                }
            } else {
                Event::PrivateNotice { client, text }
            })
        }
        "JOIN" => Some(Event::ChannelJoin {
            channel: msg.param(0)?.to_string(),
            client: client(msg)?,
        }),
        "PART" => Some(Event::ChannelPart {
            channel: msg.param(0)?.to_string(),
            client: client(msg)?,
            reason: owned(msg.param(1)),
        }),
        "KICK" => Some(Event::ChannelKick {
            channel: msg.param(0)?.to_string(),
            client: client(msg)?,
            target: msg.param(1)?.to_string(),
            reason: owned(msg.param(2)),
        }),
        "TOPIC" => Some(Event::ChannelTopic {
            channel: msg.param(0)?.to_string(),
            client: client(msg),
            topic: msg.param(1).unwrap_or_default().to_string(),
        }),
        "NICK" => Some(Event::NickChanged {
            client: client(msg)?,
            new_nick: msg.param(0)?.to_string(),
        }),
        "QUIT" => Some(Event::Quit {
            client: client(msg)?,
            reason: owned(msg.param(0)),
        }),
        _ => None,
    }
}
