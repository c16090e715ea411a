//! The Protocol State Machine (component F): the bulk of the engine.
//! Reacts to dispatched messages by mutating the [`Registry`], tracking the
//! local user and MOTD buffer, applying modes, and emitting [`Event`]s.
//!
//! A single owner of mutable connection state, dispatched into via the
//! table-driven [`Dispatcher`] required by SPEC_FULL.md §4.E rather than a
//! fixed enum match.

use std::collections::HashMap;

use irc_common::{CaseMapping, ChannelName};
use irc_proto::{IrcMessage, Prefix};

use crate::dispatch::Dispatcher;
use crate::entities::{Channel, ChannelType, ChannelUser, LocalUser, Target, TargetMask, User};
use crate::events::{ChannelListEntry, Event};
use crate::mode::apply_modes;
use crate::registry::Registry;
use crate::{Error, ServerInfo};

/// `Initial → Connecting → Connected → Registered → Disconnected`, plus the
/// terminal `Disposed` once the session object itself is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Initial,
    Connecting,
    Connected,
    Registered,
    Disconnected,
    Disposed,
}

type Handler = fn(&mut StateMachine, &IrcMessage, &mut Vec<IrcMessage>, &mut Vec<Event>) -> Result<(), Error>;

pub struct StateMachine {
    pub registry: Registry,
    pub local: LocalUser,
    pub lifecycle: Lifecycle,
    pub isupport: crate::entities::IsupportMap,

    nicks: Vec<String>,
    nick_idx: usize,
    pass: Option<String>,
    username: String,
    realname: String,

    motd_buf: Vec<String>,
    whois_acc: HashMap<String, User>,
    whowas_acc: HashMap<String, User>,
    list_acc: Vec<ChannelListEntry>,

    dispatcher: Dispatcher<Handler>,
}

impl StateMachine {
    pub fn new(server_info: &ServerInfo) -> StateMachine {
        let mut local = LocalUser::default();
        local.user = User::new(
            server_info
                .nicks
                .first()
                .cloned()
                .unwrap_or_else(|| "user".to_owned()),
        );

        StateMachine {
            registry: Registry::new(),
            local,
            lifecycle: Lifecycle::Initial,
            isupport: Default::default(),
            nicks: server_info.nicks.clone(),
            nick_idx: 0,
            pass: server_info.pass.clone(),
            username: server_info.hostname.clone(),
            realname: server_info.realname.clone(),
            motd_buf: Vec::new(),
            whois_acc: HashMap::new(),
            whowas_acc: HashMap::new(),
            list_acc: Vec::new(),
            dispatcher: build_dispatcher(),
        }
    }

    pub fn current_nick(&self) -> &str {
        &self.local.user.nick
    }

    /// Build PASS/NICK/USER per SPEC_FULL.md §4.F registration lifecycle.
    pub fn introduce(&mut self) -> Vec<IrcMessage> {
        self.lifecycle = Lifecycle::Connected;
        let mut out = Vec::new();
        if let Some(pass) = &self.pass {
            out.push(IrcMessage::new("PASS", vec![pass.clone()]));
        }
        out.push(IrcMessage::new("NICK", vec![self.current_nick().to_owned()]));
        // w|i user-mode bitfield: neither requested at introduction time.
        out.push(IrcMessage::new(
            "USER",
            vec![
                self.username.clone(),
                "0".to_owned(),
                "*".to_owned(),
                self.realname.clone(),
            ],
        ));
        out
    }

    fn next_nick(&mut self) -> String {
        self.nick_idx += 1;
        if self.nick_idx >= self.nicks.len() {
            let extra = self.nick_idx - self.nicks.len() + 1;
            let mut nick = self.nicks.last().cloned().unwrap_or_else(|| "user".to_owned());
            for _ in 0..extra {
                nick.push('_');
            }
            nick
        } else {
            self.nicks[self.nick_idx].clone()
        }
    }

    /// Dispatch one inbound message, returning messages to send and events
    /// to emit. Unknown commands are logged and ignored (non-fatal).
    pub fn handle_message(&mut self, msg: &IrcMessage) -> Result<(Vec<IrcMessage>, Vec<Event>), Error> {
        if let Some(Prefix::Server(host)) = &msg.prefix {
            self.registry.get_server(host);
        }
        let mut out = Vec::new();
        let mut events = Vec::new();
        match self.dispatcher.lookup(&msg.command) {
            Some(handler) => handler(self, msg, &mut out, &mut events)?,
            None => log::debug!("no handler registered for command {:?}", msg.command),
        }
        Ok((out, events))
    }
}

fn build_dispatcher() -> Dispatcher<Handler> {
    let mut d = Dispatcher::new();
    d.register("001", h_welcome);
    d.register("005", h_isupport);
    d.register("375", h_motd_start);
    d.register("372", h_motd_line);
    d.register("376", h_motd_end);
    d.register("383", h_youreservice);
    d.register("PING", h_ping);
    d.register("PONG", h_pong);
    d.register("NICK", h_nick);
    d.register("QUIT", h_quit);
    d.register("JOIN", h_join);
    d.register("PART", h_part);
    d.register("KICK", h_kick);
    d.register("TOPIC", h_topic);
    d.register("INVITE", h_invite);
    d.register("MODE", h_mode);
    d.register("PRIVMSG", h_privmsg);
    d.register("NOTICE", h_notice);
    d.register("311", h_whois_user);
    d.register("312", h_whois_server);
    d.register("313", h_whois_operator);
    d.register("317", h_whois_idle);
    d.register("318", h_whois_end);
    d.register("314", h_whowas_user);
    d.register("369", h_whowas_end);
    d.register("352", h_who_reply);
    d.register("315", h_who_end);
    d.register("322", h_list_row);
    d.register("323", h_list_end);
    d.register("353", h_names_row);
    d.register("366", h_names_end);
    d.register("433", h_nick_in_use);
    d.register("400-599", h_numeric_error);
    d
}

fn prefix_nick<'a>(msg: &'a IrcMessage) -> Option<&'a str> {
    msg.prefix.as_ref().and_then(Prefix::nick)
}

fn h_welcome(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    // The trailing parameter ends with "nick[!user@host]"; the last
    // whitespace-delimited token carries the confirmed identity.
    if let Some(text) = msg.params.last() {
        if let Some(token) = text.split_whitespace().last() {
            let prefix = Prefix::parse(token);
            if let Prefix::User { nick, user, host } = prefix {
                sm.local.user.nick = nick;
                sm.local.user.username = user;
                sm.local.user.hostname = host;
            }
        }
    }
    sm.local.nick_accepted = true;
    sm.lifecycle = Lifecycle::Registered;
    events.push(Event::Registered);
    Ok(())
}

fn h_youreservice(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    if let Some(nick) = msg.params.first() {
        sm.local.user.nick = nick.clone();
    }
    sm.local.nick_accepted = true;
    sm.lifecycle = Lifecycle::Registered;
    events.push(Event::Registered);
    Ok(())
}

fn h_isupport(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    if let Some(first) = msg.params.get(1) {
        if first.starts_with("Try server") {
            // "Try server <address>, port <port>" bounce notice.
            let mut address = String::new();
            let mut port = 0u16;
            for tok in first.split([' ', ',']) {
                if let Ok(p) = tok.parse::<u16>() {
                    port = p;
                } else if tok.contains('.') && address.is_empty() {
                    address = tok.to_owned();
                }
            }
            events.push(Event::ServerBounce { address, port });
            return Ok(());
        }
    }
    // Params: [nick, key=value or key, ..., trailing "are supported..."].
    for param in msg.params.iter().skip(1) {
        if param.starts_with(':') || param.contains(' ') {
            continue;
        }
        match param.split_once('=') {
            Some((key, value)) => {
                sm.isupport.set(key, Some(value.to_owned()))?;
                if key.eq_ignore_ascii_case("CASEMAPPING") {
                    apply_casemapping(sm, value);
                }
            }
            None => sm.isupport.set(param, None)?,
        }
    }
    events.push(Event::ServerSupportedFeaturesReceived);
    Ok(())
}

fn h_motd_start(
    sm: &mut StateMachine,
    _msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    _events: &mut Vec<Event>,
) -> Result<(), Error> {
    sm.motd_buf.clear();
    Ok(())
}

fn h_motd_line(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    _events: &mut Vec<Event>,
) -> Result<(), Error> {
    if let Some(line) = msg.params.last() {
        sm.motd_buf.push(line.clone());
    }
    Ok(())
}

fn h_motd_end(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    if let Some(line) = msg.params.last() {
        sm.motd_buf.push(line.clone());
    }
    events.push(Event::MotdReceived(sm.motd_buf.join("\n")));
    Ok(())
}

fn h_ping(
    _sm: &mut StateMachine,
    msg: &IrcMessage,
    out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    out.push(IrcMessage::new("PONG", msg.params.clone()));
    let token = msg.params.first().cloned().unwrap_or_default();
    events.push(Event::PingReceived(token));
    Ok(())
}

fn h_pong(
    _sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    events.push(Event::PongReceived(msg.params.first().cloned().unwrap_or_default()));
    Ok(())
}

fn h_nick(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    let old = prefix_nick(msg).unwrap_or_default().to_owned();
    let new = msg.params.first().cloned().unwrap_or_default();
    if sm.registry.casemapping().eq(&old, sm.current_nick()) {
        sm.local.user.nick = new.clone();
    } else {
        sm.registry.rename_user(&old, &new);
    }
    events.push(Event::NickChanged { old, new });
    Ok(())
}

fn h_quit(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    let nick = prefix_nick(msg).unwrap_or_default().to_owned();
    sm.registry.remove_user(&nick);
    events.push(Event::Quit {
        nick,
        comment: msg.params.first().cloned(),
    });
    Ok(())
}

fn h_join(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    let nick = prefix_nick(msg).unwrap_or_default().to_owned();
    let casemapping = sm.registry.casemapping();
    let is_local = casemapping.eq(&nick, sm.current_nick());
    let chan_list = msg.params.first().cloned().unwrap_or_default();
    for chan_name in chan_list.split(',') {
        let Ok(chan) = ChannelName::parse(chan_name) else { continue };
        let channel = sm.registry.get_channel(&chan);
        if channel.member_index(|s| casemapping.fold(s), &nick).is_none() {
            channel.members.push(ChannelUser::new(&nick));
        }
        if !is_local {
            sm.registry.get_user_by_nick(&nick);
        }
        events.push(Event::Joined {
            channel: chan.into_string(),
            nick: nick.clone(),
        });
    }
    Ok(())
}

fn h_part(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    let nick = prefix_nick(msg).unwrap_or_default().to_owned();
    let casemapping = sm.registry.casemapping();
    let is_local = casemapping.eq(&nick, sm.current_nick());
    let chan_list = msg.params.first().cloned().unwrap_or_default();
    let comment = msg.params.get(1).cloned();
    for chan_name in chan_list.split(',') {
        if is_local {
            sm.registry.remove_channel(chan_name);
        } else if let Some(channel) = sm.registry.find_channel_mut(chan_name) {
            if let Some(idx) = channel.member_index(|s| casemapping.fold(s), &nick) {
                channel.members.remove(idx);
            }
        }
        events.push(Event::Parted {
            channel: chan_name.to_owned(),
            nick: nick.clone(),
            comment: comment.clone(),
        });
    }
    Ok(())
}

fn h_kick(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    let by = prefix_nick(msg).unwrap_or_default().to_owned();
    let chans: Vec<&str> = msg.params.first().map(|s| s.split(',').collect()).unwrap_or_default();
    let nicks: Vec<&str> = msg.params.get(1).map(|s| s.split(',').collect()).unwrap_or_default();
    let comment = msg.params.get(2).cloned();
    let casemapping = sm.registry.casemapping();

    for (chan_name, kicked_nick) in chans.iter().zip(nicks.iter()) {
        let is_local = casemapping.eq(kicked_nick, sm.current_nick());
        if is_local {
            sm.registry.remove_channel(chan_name);
            events.push(Event::Kicked {
                channel: (*chan_name).to_owned(),
                nick: (*kicked_nick).to_owned(),
                by: by.clone(),
                comment: comment.clone(),
            });
            // Local user removed from the channel entirely; stop processing
            // further kicks that referenced this channel.
            continue;
        }
        if let Some(channel) = sm.registry.find_channel_mut(chan_name) {
            if let Some(idx) = channel.member_index(|s| casemapping.fold(s), kicked_nick) {
                channel.members.remove(idx);
            }
        }
        events.push(Event::Kicked {
            channel: (*chan_name).to_owned(),
            nick: (*kicked_nick).to_owned(),
            by: by.clone(),
            comment: comment.clone(),
        });
    }
    Ok(())
}

fn h_topic(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    let by = prefix_nick(msg).map(str::to_owned);
    let chan_name = msg.params.first().cloned().unwrap_or_default();
    let topic = msg.params.get(1).cloned();
    if let Ok(chan) = ChannelName::parse(&chan_name) {
        sm.registry.get_channel(&chan).topic = topic.clone();
    }
    events.push(Event::TopicChanged {
        channel: chan_name,
        topic,
        by,
    });
    Ok(())
}

fn h_invite(
    _sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    let by = prefix_nick(msg).map(str::to_owned);
    let nick = msg.params.first().cloned().unwrap_or_default();
    let channel = msg.params.get(1).cloned().unwrap_or_default();
    events.push(Event::Invited { channel, nick, by });
    Ok(())
}

fn h_mode(
    sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    let target = msg.params.first().cloned().unwrap_or_default();
    let mode_string = msg.params.get(1).cloned().unwrap_or_default();
    let params = &msg.params[2.min(msg.params.len())..];

    if let Ok(chan) = ChannelName::parse(&target) {
        let parameterized: std::collections::HashSet<char> = sm.isupport.channel_user_modes.iter().copied().collect();
        let casemapping = sm.registry.casemapping();
        let channel = sm.registry.get_channel(&chan);
        let mut chan_modes = std::mem::take(&mut channel.modes);
        let members = &mut channel.members;
        apply_modes(&mut chan_modes, &mode_string, params, &parameterized, |add, m, nick| {
            if let Some(member) = members.iter_mut().find(|mem| casemapping.eq(&mem.nick, nick)) {
                if add {
                    member.modes.insert(m);
                } else {
                    member.modes.remove(&m);
                }
            }
        })?;
        sm.registry.get_channel(&chan).modes = chan_modes;
        events.push(Event::ChannelModeChanged { channel: chan.into_string() });
        Ok(())
    } else if sm.registry.casemapping().eq(&target, sm.current_nick()) {
        let empty = std::collections::HashSet::new();
        apply_modes(&mut sm.local.modes, &mode_string, params, &empty, |_, _, _| {})?;
        events.push(Event::UserModeChanged);
        Ok(())
    } else {
        Err(Error::ProtocolViolation(format!(
            "MODE target {target:?} is neither a channel nor the local nick"
        )))
    }
}

fn h_privmsg(sm: &mut StateMachine, msg: &IrcMessage, out: &mut Vec<IrcMessage>, events: &mut Vec<Event>) -> Result<(), Error> {
    route_message(sm, msg, out, events, false)
}

fn h_notice(sm: &mut StateMachine, msg: &IrcMessage, out: &mut Vec<IrcMessage>, events: &mut Vec<Event>) -> Result<(), Error> {
    route_message(sm, msg, out, events, true)
}

fn route_message(
    _sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
    is_notice: bool,
) -> Result<(), Error> {
    let from = prefix_nick(msg).map(str::to_owned);
    let targets = msg.params.first().cloned().unwrap_or_default();
    let text = msg.params.get(1).cloned().unwrap_or_default();
    for token in targets.split(',') {
        let target = Target::classify(token);
        let target_name = match target {
            Target::Channel(c) => c.into_string(),
            Target::NickUser(n) => n,
            Target::Server(s) => s,
            Target::Mask(TargetMask { mask }) => mask,
        };
        events.push(Event::MessageReceived {
            target: target_name,
            from: from.clone(),
            text: text.clone(),
            is_notice,
        });
    }
    Ok(())
}

fn h_whois_user(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, _events: &mut Vec<Event>) -> Result<(), Error> {
    let nick = msg.params.get(1).cloned().unwrap_or_default();
    let entry = sm.whois_acc.entry(nick.clone()).or_insert_with(|| User::new(&nick));
    entry.username = msg.params.get(2).cloned();
    entry.hostname = msg.params.get(3).cloned();
    entry.realname = msg.params.get(5).cloned();
    Ok(())
}

fn h_whois_server(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, _events: &mut Vec<Event>) -> Result<(), Error> {
    let nick = msg.params.get(1).cloned().unwrap_or_default();
    let entry = sm.whois_acc.entry(nick.clone()).or_insert_with(|| User::new(&nick));
    entry.server = msg.params.get(2).cloned();
    entry.server_info = msg.params.get(3).cloned();
    Ok(())
}

fn h_whois_operator(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, _events: &mut Vec<Event>) -> Result<(), Error> {
    let nick = msg.params.get(1).cloned().unwrap_or_default();
    sm.whois_acc.entry(nick.clone()).or_insert_with(|| User::new(&nick)).is_operator = true;
    Ok(())
}

fn h_whois_idle(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, _events: &mut Vec<Event>) -> Result<(), Error> {
    let nick = msg.params.get(1).cloned().unwrap_or_default();
    if let Some(secs) = msg.params.get(2).and_then(|s| s.parse::<u64>().ok()) {
        sm.whois_acc
            .entry(nick.clone())
            .or_insert_with(|| User::new(&nick))
            .idle = Some(std::time::Duration::from_secs(secs));
    }
    Ok(())
}

fn h_whois_end(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, events: &mut Vec<Event>) -> Result<(), Error> {
    let nick = msg.params.get(1).cloned().unwrap_or_default();
    if let Some(user) = sm.whois_acc.remove(&nick) {
        events.push(Event::WhoIsReplyReceived(Box::new(user)));
    }
    Ok(())
}

fn h_whowas_user(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, _events: &mut Vec<Event>) -> Result<(), Error> {
    let nick = msg.params.get(1).cloned().unwrap_or_default();
    let entry = sm.whowas_acc.entry(nick.clone()).or_insert_with(|| User::new(&nick));
    entry.username = msg.params.get(2).cloned();
    entry.hostname = msg.params.get(3).cloned();
    entry.realname = msg.params.get(5).cloned();
    entry.is_online = false;
    Ok(())
}

fn h_whowas_end(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, events: &mut Vec<Event>) -> Result<(), Error> {
    let nick = msg.params.get(1).cloned().unwrap_or_default();
    if let Some(user) = sm.whowas_acc.remove(&nick) {
        events.push(Event::WhoWasReplyReceived(Box::new(user)));
    }
    Ok(())
}

fn h_who_reply(_sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, events: &mut Vec<Event>) -> Result<(), Error> {
    events.push(Event::WhoReplyReceived(msg.params.join(" ")));
    Ok(())
}

fn h_who_end(_sm: &mut StateMachine, _msg: &IrcMessage, _out: &mut Vec<IrcMessage>, _events: &mut Vec<Event>) -> Result<(), Error> {
    Ok(())
}

fn h_list_row(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, _events: &mut Vec<Event>) -> Result<(), Error> {
    let channel = msg.params.get(1).cloned().unwrap_or_default();
    let visible_users = msg.params.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
    let topic = msg.params.get(3).cloned().unwrap_or_default();
    sm.list_acc.push(ChannelListEntry { channel, visible_users, topic });
    Ok(())
}

fn h_list_end(sm: &mut StateMachine, _msg: &IrcMessage, _out: &mut Vec<IrcMessage>, events: &mut Vec<Event>) -> Result<(), Error> {
    events.push(Event::ChannelListReceived(std::mem::take(&mut sm.list_acc)));
    Ok(())
}

fn h_names_row(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, _events: &mut Vec<Event>) -> Result<(), Error> {
    let kind = msg.params.get(1).and_then(|s| s.chars().next()).map(ChannelType::from_namreply_char).unwrap_or_default();
    let chan_name = msg.params.get(2).cloned().unwrap_or_default();
    let Ok(chan) = ChannelName::parse(&chan_name) else { return Ok(()) };
    let names = msg.params.get(3).cloned().unwrap_or_default();
    let isupport = &sm.isupport;
    let casemapping = sm.registry.casemapping();
    let channel: &mut Channel = sm.registry.get_channel(&chan);
    channel.kind = kind;
    for token in names.split_whitespace() {
        let (modes, nick) = isupport.strip_prefix_chars(token);
        if channel.member_index(|s| casemapping.fold(s), nick).is_none() {
            let mut member = ChannelUser::new(nick);
            member.modes.extend(modes);
            channel.members.push(member);
        }
    }
    Ok(())
}

fn h_names_end(sm: &mut StateMachine, msg: &IrcMessage, _out: &mut Vec<IrcMessage>, events: &mut Vec<Event>) -> Result<(), Error> {
    let chan_name = msg.params.get(1).cloned().unwrap_or_default();
    let kind = sm.registry.find_channel(&chan_name).map(|c| c.kind).unwrap_or_default();
    events.push(Event::UsersListReceived { channel: chan_name, kind });
    Ok(())
}

fn h_nick_in_use(
    sm: &mut StateMachine,
    _msg: &IrcMessage,
    out: &mut Vec<IrcMessage>,
    _events: &mut Vec<Event>,
) -> Result<(), Error> {
    if !sm.local.nick_accepted {
        let nick = sm.next_nick();
        sm.local.user.nick = nick.clone();
        out.push(IrcMessage::new("NICK", vec![nick]));
    }
    Ok(())
}

fn h_numeric_error(
    _sm: &mut StateMachine,
    msg: &IrcMessage,
    _out: &mut Vec<IrcMessage>,
    events: &mut Vec<Event>,
) -> Result<(), Error> {
    let code: u16 = msg.command.parse().unwrap_or(0);
    let message = msg.params.last().cloned().unwrap_or_default();
    let params = if msg.params.is_empty() {
        Vec::new()
    } else {
        msg.params[..msg.params.len() - 1].to_vec()
    };
    events.push(Event::ProtocolError { code, params, message });
    Ok(())
}

// Re-exported for the casemapping open question: switching folding on
// `CASEMAPPING` ISUPPORT does not touch display casing already stored.
pub fn apply_casemapping(sm: &mut StateMachine, value: &str) {
    sm.registry.set_casemapping(CaseMapping::parse(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sm() -> StateMachine {
        StateMachine::new(&ServerInfo {
            addr: "irc.example.org".into(),
            port: 6667,
            tls: false,
            pass: None,
            hostname: "alice".into(),
            realname: "Alice A".into(),
            nicks: vec!["alice".into()],
            auto_join: vec![],
            nickserv_ident: None,
        })
    }

    #[test]
    fn welcome_completes_registration() {
        let mut sm = sm();
        let msg = IrcMessage::parse(":srv 001 alice :Welcome alice!alice@host").unwrap();
        let (_, events) = sm.handle_message(&msg).unwrap();
        assert_eq!(sm.lifecycle, Lifecycle::Registered);
        assert_eq!(sm.local.user.hostname.as_deref(), Some("host"));
        assert!(matches!(events[0], Event::Registered));
    }

    #[test]
    fn isupport_prefix_populates_channel_user_modes() {
        let mut sm = sm();
        let msg = IrcMessage::parse(":srv 005 alice PREFIX=(ov)@+ NETWORK=Ex :are supported").unwrap();
        sm.handle_message(&msg).unwrap();
        assert_eq!(sm.isupport.channel_user_modes, vec!['o', 'v']);
        assert_eq!(sm.isupport.prefix_to_mode.get(&'@'), Some(&'o'));
    }

    #[test]
    fn isupport_prefix_mismatched_lengths_is_a_violation() {
        let mut sm = sm();
        let msg = IrcMessage::parse(":srv 005 alice PREFIX=(ov)@ :are supported").unwrap();
        assert!(sm.handle_message(&msg).is_err());
    }

    #[test]
    fn join_then_part_removes_channel_for_local_user() {
        let mut sm = sm();
        sm.handle_message(&IrcMessage::parse(":alice!a@h JOIN :#a").unwrap()).unwrap();
        assert!(sm.registry.find_channel("#a").is_some());
        sm.handle_message(&IrcMessage::parse(":alice!a@h PART #a").unwrap()).unwrap();
        assert!(sm.registry.find_channel("#a").is_none());
    }

    #[test]
    fn quit_purges_user_everywhere() {
        let mut sm = sm();
        sm.handle_message(&IrcMessage::parse(":bob!b@h JOIN :#room").unwrap()).unwrap();
        sm.handle_message(&IrcMessage::parse(":bob!b@h QUIT :bye").unwrap()).unwrap();
        assert!(sm.registry.find_user_by_nick("bob").is_none());
        assert!(sm.registry.find_channel("#room").unwrap().members.is_empty());
    }

    #[test]
    fn ping_enqueues_pong_and_fires_event() {
        let mut sm = sm();
        let (out, events) = sm.handle_message(&IrcMessage::parse(":srv PING :srv").unwrap()).unwrap();
        assert_eq!(out[0].command, "PONG");
        assert_eq!(out[0].params, vec!["srv".to_string()]);
        assert!(matches!(&events[0], Event::PingReceived(s) if s == "srv"));
    }

    #[test]
    fn numeric_error_range_fires_protocol_error() {
        let mut sm = sm();
        let (_, events) = sm
            .handle_message(&IrcMessage::parse(":srv 421 alice FOO :Unknown command").unwrap())
            .unwrap();
        assert!(matches!(&events[0], Event::ProtocolError { code: 421, .. }));
    }

    #[test]
    fn privmsg_to_multiple_targets_fires_once_each() {
        let mut sm = sm();
        let (_, events) = sm
            .handle_message(&IrcMessage::parse(":bob!b@h PRIVMSG #room,alice :hi").unwrap())
            .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn names_then_end_reports_channel_type_and_members() {
        let mut sm = sm();
        sm.handle_message(&IrcMessage::parse(":srv 005 alice PREFIX=(ov)@+ :are supported").unwrap())
            .unwrap();
        sm.handle_message(&IrcMessage::parse(":srv 353 alice = #room :@alice +bob").unwrap())
            .unwrap();
        let (_, events) = sm
            .handle_message(&IrcMessage::parse(":srv 366 alice #room :End of NAMES").unwrap())
            .unwrap();
        let chan = sm.registry.find_channel("#room").unwrap();
        assert_eq!(chan.members.len(), 2);
        assert!(matches!(&events[0], Event::UsersListReceived { kind: ChannelType::Public, .. }));
    }
}
