//! The data model (SPEC_FULL.md §3): servers, users, channels and channel
//! membership as owned by the [`crate::registry::Registry`].

use std::collections::HashMap;
use std::time::Duration;

use irc_common::ChannelName;

/// A server, keyed case-insensitively by host name. Created on first
/// reference from a message prefix; never removed during a session.
#[derive(Debug, Clone)]
pub struct Server {
    pub host: String,
}

/// A remote user. Created on first sight by nickname or username.
#[derive(Debug, Clone, Default)]
pub struct User {
    pub nick: String,
    pub username: Option<String>,
    pub realname: Option<String>,
    pub hostname: Option<String>,
    pub server: Option<String>,
    pub server_info: Option<String>,
    pub hop_count: Option<u32>,
    pub is_online: bool,
    pub is_operator: bool,
    pub is_away: bool,
    pub away_message: Option<String>,
    pub idle: Option<Duration>,
}

impl User {
    pub fn new(nick: impl Into<String>) -> User {
        User {
            nick: nick.into(),
            is_online: true,
            ..Default::default()
        }
    }
}

/// The session's own identity: a [`User`] plus capabilities only the local
/// user has (a mode set, and the fact it is the origin of sent messages).
#[derive(Debug, Clone, Default)]
pub struct LocalUser {
    pub user: User,
    pub modes: std::collections::HashSet<char>,
    pub nick_accepted: bool,
}

/// Channel visibility, conveyed by a single character in `353 RPL_NAMREPLY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelType {
    #[default]
    Unspecified,
    Public,
    Private,
    Secret,
}

impl ChannelType {
    pub fn from_namreply_char(c: char) -> ChannelType {
        match c {
            '=' => ChannelType::Public,
            '*' => ChannelType::Private,
            '@' => ChannelType::Secret,
            _ => ChannelType::Unspecified,
        }
    }
}

/// A channel, created on first reference and removed once the local user
/// leaves it.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: ChannelName,
    pub kind: ChannelType,
    pub modes: std::collections::HashSet<char>,
    pub topic: Option<String>,
    /// Membership in join order; the fold key used for lookups is applied
    /// by the registry, not stored here.
    pub members: Vec<ChannelUser>,
}

impl Channel {
    pub fn new(name: ChannelName) -> Channel {
        Channel {
            name,
            kind: ChannelType::Unspecified,
            modes: Default::default(),
            topic: None,
            members: Vec::new(),
        }
    }

    pub fn member_index(&self, fold: impl Fn(&str) -> String, nick: &str) -> Option<usize> {
        let key = fold(nick);
        self.members.iter().position(|m| fold(&m.nick) == key)
    }
}

/// A (Channel, User) pairing with the per-channel modes held by that user
/// (typically a subset of `{o, v}`).
#[derive(Debug, Clone)]
pub struct ChannelUser {
    pub nick: String,
    pub modes: std::collections::HashSet<char>,
}

impl ChannelUser {
    pub fn new(nick: impl Into<String>) -> ChannelUser {
        ChannelUser {
            nick: nick.into(),
            modes: Default::default(),
        }
    }
}

/// Parsed `005 RPL_ISUPPORT`: most keys are retained verbatim; `PREFIX` is
/// additionally decoded into the channel-user mode/prefix-char pairing.
#[derive(Debug, Clone, Default)]
pub struct IsupportMap {
    raw: HashMap<String, Option<String>>,
    pub channel_user_modes: Vec<char>,
    pub prefix_to_mode: HashMap<char, char>,
}

impl IsupportMap {
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.raw
            .get(&key.to_ascii_uppercase())
            .map(|v| v.as_deref())
    }

    pub fn set(&mut self, key: &str, value: Option<String>) -> Result<(), crate::error::Error> {
        if key.eq_ignore_ascii_case("PREFIX") {
            if let Some(v) = &value {
                self.parse_prefix(v)?;
            }
        }
        self.raw.insert(key.to_ascii_uppercase(), value);
        Ok(())
    }

    fn parse_prefix(&mut self, value: &str) -> Result<(), crate::error::Error> {
        let value = value
            .strip_prefix('(')
            .ok_or_else(|| crate::error::Error::ProtocolViolation(format!("malformed PREFIX value {value:?}")))?;
        let (modes, prefixes) = value
            .split_once(')')
            .ok_or_else(|| crate::error::Error::ProtocolViolation(format!("malformed PREFIX value {value:?}")))?;
        if modes.chars().count() != prefixes.chars().count() {
            return Err(crate::error::Error::ProtocolViolation(format!(
                "PREFIX mode/prefix length mismatch: {modes:?} vs {prefixes:?}"
            )));
        }
        self.channel_user_modes = modes.chars().collect();
        self.prefix_to_mode = prefixes.chars().zip(modes.chars()).collect();
        Ok(())
    }

    /// Strip any leading prefix characters recognised by `PREFIX` (used by
    /// NAMES parsing), returning the mode characters stripped and the bare
    /// nick.
    pub fn strip_prefix_chars<'a>(&self, token: &'a str) -> (Vec<char>, &'a str) {
        let mut modes = Vec::new();
        let mut rest = token;
        while let Some(c) = rest.chars().next() {
            if let Some(&mode) = self.prefix_to_mode.get(&c) {
                modes.push(mode);
                rest = &rest[c.len_utf8()..];
            } else {
                break;
            }
        }
        (modes, rest)
    }
}

/// A broadcast recipient of the form `$mask` (server mask) or `#mask` (host
/// mask), distinct from an ordinary channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMask {
    pub mask: String,
}

impl TargetMask {
    /// Strip exactly the leading `$` or `#` sigil and keep the remainder
    /// verbatim; the tail is never re-inspected for further sigils (see the
    /// casemapping/TargetMask open question resolved in SPEC_FULL.md §9).
    pub fn parse(raw: &str) -> Option<TargetMask> {
        raw.strip_prefix('$')
            .or_else(|| raw.strip_prefix('#'))
            .map(|mask| TargetMask { mask: mask.to_owned() })
    }
}

/// A classified message target or source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Channel(ChannelName),
    NickUser(String),
    Server(String),
    Mask(TargetMask),
}

impl Target {
    /// Classify a single (already comma-split) target token.
    pub fn classify(token: &str) -> Target {
        if let Ok(chan) = ChannelName::parse(token) {
            return Target::Channel(chan);
        }
        if let Some(mask) = TargetMask::parse(token) {
            return Target::Mask(mask);
        }
        Target::NickUser(token.to_owned())
    }
}
