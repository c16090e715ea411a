//! The Client Session (component G): owns the transport, the paced write
//! loop, the read loop, the send queue, and exposes the public command
//! surface plus an event subscription channel.
//!
//! Splits into a cheaply-`Clone`able handle (`Session`) and a background
//! task doing the actual I/O, connected by an `mpsc` channel pair for
//! commands in and events out, with protocol state owned by the
//! dispatch-table-driven [`StateMachine`].

mod dispatch;
mod entities;
mod error;
mod events;
mod flood;
mod mode;
mod registry;
mod state;
mod transport;

pub use entities::{Channel, ChannelType, ChannelUser, IsupportMap, LocalUser, Target, TargetMask, User};
pub use error::{Error, InvalidArgument, TransportError};
pub use events::{ChannelListEntry, Event};
pub use flood::{FloodPreventer, NoFloodPreventer, StdFloodPreventer, MIN_SEND_GAP};
pub use irc_proto::IrcMessage;
pub use registry::Registry;
pub use state::{Lifecycle, StateMachine};
pub use transport::{CertValidator, DefaultCertValidator, Endpoint, PeerCertificate, Transport};

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use irc_common::ChannelName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::LocalSet;

/// Caller-supplied connection parameters. Deliberately a plain struct, not
/// a config-file format: SPEC_FULL.md §1 excludes a config loader but still
/// needs an in-memory parameter block.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub addr: String,
    pub port: u16,
    pub tls: bool,
    pub pass: Option<String>,
    pub hostname: String,
    pub realname: String,
    /// Nicks to try, in order, on `ERR_NICKNAMEINUSE`.
    pub nicks: Vec<String>,
    pub auto_join: Vec<String>,
    pub nickserv_ident: Option<String>,
}

enum Cmd {
    Send(IrcMessage),
    Quit { comment: Option<String>, timeout: Duration },
    Disconnect,
}

/// A cheaply-`Clone`able handle to a running session. The actual I/O lives
/// in a background task spawned on the caller's [`LocalSet`] (the state
/// machine is `Rc<RefCell<..>>`-based and therefore `!Send`, matching the
/// single-protocol-task model in SPEC_FULL.md §5).
#[derive(Clone)]
pub struct Session {
    cmd_tx: mpsc::Sender<Cmd>,
    state: Rc<RefCell<StateMachine>>,
}

impl Session {
    /// Connect to `server_info` and spawn the read/write loops on `local`.
    /// The caller drives `local` (e.g. via `local.run_until(..)`). `cert_validator`
    /// is consulted on every TLS handshake and may override the connector's
    /// own accept/reject decision (SPEC_FULL.md §4.C); pass
    /// [`DefaultCertValidator`] to just keep that decision.
    pub fn connect(
        server_info: ServerInfo,
        cert_validator: Rc<dyn CertValidator>,
        local: &LocalSet,
    ) -> (Session, mpsc::Receiver<Event>) {
        let (ev_tx, ev_rx) = mpsc::channel::<Event>(256);
        let (cmd_tx, cmd_rx) = mpsc::channel::<Cmd>(256);

        let state = Rc::new(RefCell::new(StateMachine::new(&server_info)));
        let state_for_task = state.clone();

        local.spawn_local(run_session(server_info, cert_validator, state_for_task, cmd_rx, ev_tx));

        (Session { cmd_tx, state }, ev_rx)
    }

    pub fn current_nick(&self) -> String {
        self.state.borrow().current_nick().to_owned()
    }

    pub fn is_registered(&self) -> bool {
        self.state.borrow().lifecycle == Lifecycle::Registered
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.borrow().lifecycle
    }

    /// Read-only access to the entity registry, e.g. for listing a
    /// channel's current members.
    pub fn with_registry<T>(&self, f: impl FnOnce(&Registry) -> T) -> T {
        f(&self.state.borrow().registry)
    }

    fn send(&self, msg: IrcMessage) -> Result<(), Error> {
        self.cmd_tx.try_send(Cmd::Send(msg)).map_err(|_| Error::Disposed)
    }

    /// Send a message without further validation; the caller is
    /// responsible for building a well-formed [`IrcMessage`].
    pub fn send_raw(&self, msg: IrcMessage) -> Result<(), Error> {
        self.send(msg)
    }

    pub fn disconnect(&self) -> Result<(), Error> {
        self.cmd_tx.try_send(Cmd::Disconnect).map_err(|_| Error::Disposed)
    }

    /// Send QUIT and ask the background task to wait up to `timeout` for
    /// the server to close the connection before forcing a disconnect.
    pub fn quit(&self, timeout: Duration, comment: Option<String>) -> Result<(), Error> {
        self.cmd_tx
            .try_send(Cmd::Quit { comment, timeout })
            .map_err(|_| Error::Disposed)
    }

    //
    // High-level command wrappers (SPEC_FULL.md §4.G). Each builds an
    // `IrcMessage` and enqueues it; wrappers whose arguments have a
    // documented grammar validate them first.
    //

    pub fn nick(&self, new_nick: &str) -> Result<(), Error> {
        require_nonempty(new_nick)?;
        self.send(IrcMessage::new("NICK", vec![new_nick.to_owned()]))
    }

    pub fn user_mode(&self, modes: &str) -> Result<(), Error> {
        if modes.is_empty() {
            return Err(InvalidArgument::EmptyModeString.into());
        }
        let nick = self.current_nick();
        self.send(IrcMessage::new("MODE", vec![nick, modes.to_owned()]))
    }

    pub fn join(&self, channels: &[&str]) -> Result<(), Error> {
        for c in channels {
            validate_channel(c)?;
        }
        self.send(IrcMessage::new("JOIN", vec![channels.join(",")]))
    }

    pub fn part(&self, channel: &str, comment: Option<&str>) -> Result<(), Error> {
        validate_channel(channel)?;
        let mut params = vec![channel.to_owned()];
        params.extend(comment.map(str::to_owned));
        self.send(IrcMessage::new("PART", params))
    }

    pub fn channel_mode(&self, channel: &str, modes: &str, args: &[&str]) -> Result<(), Error> {
        validate_channel(channel)?;
        let mut params = vec![channel.to_owned(), modes.to_owned()];
        params.extend(args.iter().map(|s| s.to_string()));
        self.send(IrcMessage::new("MODE", params))
    }

    pub fn topic(&self, channel: &str, new_topic: Option<&str>) -> Result<(), Error> {
        validate_channel(channel)?;
        let mut params = vec![channel.to_owned()];
        params.extend(new_topic.map(str::to_owned));
        self.send(IrcMessage::new("TOPIC", params))
    }

    pub fn names(&self, channel: &str) -> Result<(), Error> {
        validate_channel(channel)?;
        self.send(IrcMessage::new("NAMES", vec![channel.to_owned()]))
    }

    pub fn list(&self, channels: Option<&[&str]>) -> Result<(), Error> {
        let params = match channels {
            Some(chans) => vec![chans.join(",")],
            None => vec![],
        };
        self.send(IrcMessage::new("LIST", params))
    }

    pub fn invite(&self, nick: &str, channel: &str) -> Result<(), Error> {
        validate_channel(channel)?;
        self.send(IrcMessage::new("INVITE", vec![nick.to_owned(), channel.to_owned()]))
    }

    pub fn kick(&self, channel: &str, nick: &str, comment: Option<&str>) -> Result<(), Error> {
        validate_channel(channel)?;
        let mut params = vec![channel.to_owned(), nick.to_owned()];
        params.extend(comment.map(str::to_owned));
        self.send(IrcMessage::new("KICK", params))
    }

    pub fn privmsg(&self, target: &str, text: &str) -> Result<(), Error> {
        validate_target(target)?;
        self.send(IrcMessage::new("PRIVMSG", vec![target.to_owned(), text.to_owned()]))
    }

    pub fn notice(&self, target: &str, text: &str) -> Result<(), Error> {
        validate_target(target)?;
        self.send(IrcMessage::new("NOTICE", vec![target.to_owned(), text.to_owned()]))
    }

    pub fn motd(&self, target: Option<&str>) -> Result<(), Error> {
        self.send(IrcMessage::new("MOTD", target.map(str::to_owned).into_iter().collect()))
    }

    pub fn lusers(&self) -> Result<(), Error> {
        self.send(IrcMessage::new("LUSERS", vec![]))
    }

    pub fn version(&self, target: Option<&str>) -> Result<(), Error> {
        self.send(IrcMessage::new("VERSION", target.map(str::to_owned).into_iter().collect()))
    }

    pub fn stats(&self, query: &str, target: Option<&str>) -> Result<(), Error> {
        let mut params = vec![query.to_owned()];
        params.extend(target.map(str::to_owned));
        self.send(IrcMessage::new("STATS", params))
    }

    pub fn links(&self, remote: Option<&str>, mask: Option<&str>) -> Result<(), Error> {
        let mut params = Vec::new();
        params.extend(remote.map(str::to_owned));
        params.extend(mask.map(str::to_owned));
        self.send(IrcMessage::new("LINKS", params))
    }

    pub fn time(&self, target: Option<&str>) -> Result<(), Error> {
        self.send(IrcMessage::new("TIME", target.map(str::to_owned).into_iter().collect()))
    }

    pub fn connect_cmd(&self, target_server: &str, port: u16, remote: Option<&str>) -> Result<(), Error> {
        let mut params = vec![target_server.to_owned(), port.to_string()];
        params.extend(remote.map(str::to_owned));
        self.send(IrcMessage::new("CONNECT", params))
    }

    pub fn trace(&self, target: Option<&str>) -> Result<(), Error> {
        self.send(IrcMessage::new("TRACE", target.map(str::to_owned).into_iter().collect()))
    }

    pub fn admin(&self, target: Option<&str>) -> Result<(), Error> {
        self.send(IrcMessage::new("ADMIN", target.map(str::to_owned).into_iter().collect()))
    }

    pub fn info(&self, target: Option<&str>) -> Result<(), Error> {
        self.send(IrcMessage::new("INFO", target.map(str::to_owned).into_iter().collect()))
    }

    pub fn servlist(&self, mask: Option<&str>, kind: Option<&str>) -> Result<(), Error> {
        let mut params = Vec::new();
        params.extend(mask.map(str::to_owned));
        params.extend(kind.map(str::to_owned));
        self.send(IrcMessage::new("SERVLIST", params))
    }

    pub fn squery(&self, service: &str, text: &str) -> Result<(), Error> {
        self.send(IrcMessage::new("SQUERY", vec![service.to_owned(), text.to_owned()]))
    }

    pub fn who(&self, mask: Option<&str>, operators_only: bool) -> Result<(), Error> {
        let mut params = Vec::new();
        params.extend(mask.map(str::to_owned));
        if operators_only {
            params.push("o".to_owned());
        }
        self.send(IrcMessage::new("WHO", params))
    }

    pub fn whois(&self, nick: &str) -> Result<(), Error> {
        require_nonempty(nick)?;
        self.send(IrcMessage::new("WHOIS", vec![nick.to_owned()]))
    }

    pub fn whowas(&self, nick: &str, count: Option<i64>) -> Result<(), Error> {
        require_nonempty(nick)?;
        let mut params = vec![nick.to_owned()];
        if let Some(count) = count {
            params.push(count.to_string());
        }
        self.send(IrcMessage::new("WHOWAS", params))
    }

    pub fn kill(&self, nick: &str, comment: &str) -> Result<(), Error> {
        self.send(IrcMessage::new("KILL", vec![nick.to_owned(), comment.to_owned()]))
    }

    pub fn ping(&self, token: &str) -> Result<(), Error> {
        self.send(IrcMessage::new("PING", vec![token.to_owned()]))
    }

    pub fn pong(&self, token: &str) -> Result<(), Error> {
        self.send(IrcMessage::new("PONG", vec![token.to_owned()]))
    }

    pub fn away(&self, msg: Option<&str>) -> Result<(), Error> {
        self.send(IrcMessage::new("AWAY", msg.map(str::to_owned).into_iter().collect()))
    }

    pub fn rehash(&self) -> Result<(), Error> {
        self.send(IrcMessage::new("REHASH", vec![]))
    }

    pub fn die(&self) -> Result<(), Error> {
        self.send(IrcMessage::new("DIE", vec![]))
    }

    pub fn restart(&self) -> Result<(), Error> {
        self.send(IrcMessage::new("RESTART", vec![]))
    }

    pub fn users(&self, target: Option<&str>) -> Result<(), Error> {
        self.send(IrcMessage::new("USERS", target.map(str::to_owned).into_iter().collect()))
    }

    pub fn wallops(&self, text: &str) -> Result<(), Error> {
        self.send(IrcMessage::new("WALLOPS", vec![text.to_owned()]))
    }

    pub fn userhost(&self, nicks: &[&str]) -> Result<(), Error> {
        self.send(IrcMessage::new("USERHOST", nicks.iter().map(|s| s.to_string()).collect()))
    }

    pub fn ison(&self, nicks: &[&str]) -> Result<(), Error> {
        self.send(IrcMessage::new("ISON", nicks.iter().map(|s| s.to_string()).collect()))
    }
}

fn require_nonempty(s: &str) -> Result<(), Error> {
    if s.is_empty() {
        Err(InvalidArgument::EmptyNick.into())
    } else {
        Ok(())
    }
}

fn validate_channel(name: &str) -> Result<(), Error> {
    ChannelName::parse(name)
        .map(|_| ())
        .map_err(|e| InvalidArgument::BadChannelName(name.to_owned(), e).into())
}

fn validate_target(target: &str) -> Result<(), Error> {
    if target.contains(',') {
        return Err(InvalidArgument::TargetHasComma(target.to_owned()).into());
    }
    Ok(())
}

/// The background task: resolves, connects, introduces the local user,
/// then runs the read loop and paced write loop concurrently until
/// disconnected.
async fn run_session(
    server_info: ServerInfo,
    cert_validator: Rc<dyn CertValidator>,
    state: Rc<RefCell<StateMachine>>,
    mut cmd_rx: mpsc::Receiver<Cmd>,
    ev_tx: mpsc::Sender<Event>,
) {
    let _ = ev_tx.send(Event::Connecting).await;

    let endpoint = Endpoint::new(server_info.addr.clone(), server_info.port, server_info.tls);
    let transport = match Transport::connect(&endpoint, cert_validator.as_ref(), &ev_tx).await {
        Ok(t) => t,
        Err(err) => {
            let _ = ev_tx.send(Event::ConnectFailed(err.to_string())).await;
            return;
        }
    };
    let _ = ev_tx.send(Event::Connected).await;

    let (mut read_half, mut write_half) = tokio::io::split(transport);

    let (line_tx, mut line_rx) = mpsc::channel::<IrcMessage>(256);

    for msg in state.borrow_mut().introduce() {
        let _ = line_tx.send(msg).await;
    }

    if !server_info.auto_join.is_empty() {
        let chans: Vec<&str> = server_info.auto_join.iter().map(String::as_str).collect();
        let _ = line_tx
            .send(IrcMessage::new("JOIN", vec![chans.join(",")]))
            .await;
    }

    let write_ev_tx = ev_tx.clone();
    let write_loop = async move {
        let mut flood = StdFloodPreventer::default();
        loop {
            let Some(msg) = line_rx.recv().await else { break };
            let delay = flood.get_send_delay().max(MIN_SEND_GAP);
            tokio::time::sleep(delay).await;
            match msg.serialize() {
                Ok(line) => {
                    if let Err(err) = write_half.write_all(line.as_bytes()).await {
                        log::warn!("write error: {err}");
                        break;
                    }
                    flood.handle_message_sent();
                    let _ = write_ev_tx.send(Event::RawMessageSent(line)).await;
                }
                Err(err) => log::warn!("refusing to send invalid message: {err}"),
            }
        }
    };
    tokio::task::spawn_local(write_loop);

    let mut decoder = irc_proto::LineDecoder::new();
    let mut read_buf = [0u8; 4096];
    let mut quit_deadline: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(Cmd::Disconnect) => break,
                    Some(Cmd::Send(msg)) => {
                        let _ = line_tx.send(msg).await;
                    }
                    Some(Cmd::Quit { comment, timeout }) => {
                        let _ = line_tx.send(IrcMessage::new("QUIT", comment.into_iter().collect())).await;
                        quit_deadline = Some(tokio::time::Instant::now() + timeout);
                    }
                }
            }
            bytes = read_half.read(&mut read_buf) => {
                match bytes {
                    Ok(0) => {
                        let _ = ev_tx.send(Event::Disconnected).await;
                        break;
                    }
                    Ok(n) => {
                        decoder.feed(&read_buf[..n]);
                        while let Some(line) = decoder.next_line() {
                            let _ = ev_tx.send(Event::RawMessageReceived(line.clone())).await;
                            match irc_proto::IrcMessage::parse(&line) {
                                Ok(msg) => {
                                    let result = state.borrow_mut().handle_message(&msg);
                                    match result {
                                        Ok((out, events)) => {
                                            for m in out {
                                                let _ = line_tx.send(m).await;
                                            }
                                            for e in events {
                                                let _ = ev_tx.send(e).await;
                                            }
                                        }
                                        Err(err) => {
                                            let _ = ev_tx.send(Event::Error(err.to_string())).await;
                                        }
                                    }
                                }
                                Err(err) => log::debug!("discarding unparsable line {line:?}: {err}"),
                            }
                        }
                    }
                    Err(err) => {
                        let terr = transport::classify_io_error(err);
                        if !transport::is_clean_disconnect(&terr) {
                            let _ = ev_tx.send(Event::Error(terr.to_string())).await;
                        }
                        let _ = ev_tx.send(Event::Disconnected).await;
                        break;
                    }
                }
            }
            _ = async {
                match quit_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            } => {
                let _ = ev_tx.send(Event::Disconnected).await;
                break;
            }
        }
    }

    state.borrow_mut().lifecycle = Lifecycle::Disconnected;
}
