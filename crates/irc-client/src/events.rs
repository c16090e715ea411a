//! The event surface (SPEC_FULL.md §6): values emitted by the session for
//! subscribers. These carry cloned snapshots, never borrows into the
//! registry, so a subscriber can never observe a half-mutated entity and
//! the protocol task never blocks waiting on one (SPEC_FULL.md §3, §5).

use crate::entities::{ChannelType, User};

#[derive(Debug, Clone)]
pub struct ChannelListEntry {
    pub channel: String,
    pub visible_users: u32,
    pub topic: String,
}

#[derive(Debug, Clone)]
pub enum Event {
    Connecting,
    Connected,
    ConnectFailed(String),
    Disconnected,
    Error(String),

    RawMessageSent(String),
    RawMessageReceived(String),

    ProtocolError { code: u16, params: Vec<String>, message: String },
    ErrorMessageReceived(String),

    Registered,
    ClientInfoReceived,
    ServerBounce { address: String, port: u16 },
    ServerSupportedFeaturesReceived,

    PingReceived(String),
    PongReceived(String),

    /// Reported once per TLS handshake, after the configured
    /// `CertValidator` has had a chance to override the connector's
    /// accept/reject decision (SPEC_FULL.md §4.C, §6).
    ValidateSslCertificate {
        der: Vec<u8>,
        chain: Vec<Vec<u8>>,
        policy_errors: u32,
        is_valid: bool,
    },

    MotdReceived(String),
    NetworkInformationReceived,
    ServerVersionInfoReceived(String),
    ServerTimeReceived { server: String, time: String },

    WhoReplyReceived(String),
    WhoIsReplyReceived(Box<User>),
    WhoWasReplyReceived(Box<User>),
    ChannelListReceived(Vec<ChannelListEntry>),

    NickChanged { old: String, new: String },
    Joined { channel: String, nick: String },
    Parted { channel: String, nick: String, comment: Option<String> },
    Kicked { channel: String, nick: String, by: String, comment: Option<String> },
    Quit { nick: String, comment: Option<String> },
    TopicChanged { channel: String, topic: Option<String>, by: Option<String> },
    Invited { channel: String, nick: String, by: Option<String> },
    ChannelModeChanged { channel: String },
    UserModeChanged,
    UsersListReceived { channel: String, kind: ChannelType },

    MessageReceived { target: String, from: Option<String>, text: String, is_notice: bool },
}
