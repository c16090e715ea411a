//! The optional `:prefix` that opens an IRC line.

use std::fmt;

/// Source of a message, as carried by the leading `:prefix` token.
///
/// The grammar (RFC 2812 §2.3.1) is `servername / ( nickname [ [ "!" user ] "@" host ] )`,
/// which is ambiguous on its own: a bare token with no `!` or `@` could be
/// either a server name or a nick-only prefix (this happens for, e.g., the
/// source of a `NICK` line before the dispatcher has a user table to check
/// against). We resolve the ambiguity heuristically, the same way the
/// client's registry does when it later looks the name up: a bare token
/// containing a `.` is a server name, anything else is a nick with no
/// user/host known yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    Server(String),
    User {
        nick: String,
        user: Option<String>,
        host: Option<String>,
    },
}

impl Prefix {
    /// Parse the contents of a prefix token (without the leading `:`).
    pub fn parse(raw: &str) -> Prefix {
        if let Some(bang) = raw.find('!') {
            let nick = raw[..bang].to_owned();
            let rest = &raw[bang + 1..];
            return match rest.find('@') {
                Some(at) => Prefix::User {
                    nick,
                    user: Some(rest[..at].to_owned()),
                    host: Some(rest[at + 1..].to_owned()),
                },
                None => Prefix::User {
                    nick,
                    user: Some(rest.to_owned()),
                    host: None,
                },
            };
        }
        if let Some(at) = raw.find('@') {
            return Prefix::User {
                nick: raw[..at].to_owned(),
                user: None,
                host: Some(raw[at + 1..].to_owned()),
            };
        }
        if raw.contains('.') {
            Prefix::Server(raw.to_owned())
        } else {
            Prefix::User {
                nick: raw.to_owned(),
                user: None,
                host: None,
            }
        }
    }

    /// The nickname carried by this prefix, if it names a user rather than
    /// a server.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::Server(_) => None,
            Prefix::User { nick, .. } => Some(nick),
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(name) => f.write_str(name),
            Prefix::User { nick, user, host } => {
                f.write_str(nick)?;
                if let Some(user) = user {
                    write!(f, "!{user}")?;
                }
                if let Some(host) = host {
                    write!(f, "@{host}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nick_user_host() {
        assert_eq!(
            Prefix::parse("nick!user@host.example"),
            Prefix::User {
                nick: "nick".into(),
                user: Some("user".into()),
                host: Some("host.example".into()),
            }
        );
    }

    #[test]
    fn parses_server_name() {
        assert_eq!(
            Prefix::parse("irc.example.net"),
            Prefix::Server("irc.example.net".into())
        );
    }

    #[test]
    fn bare_nick_is_ambiguous_toward_user() {
        assert_eq!(
            Prefix::parse("oldnick"),
            Prefix::User {
                nick: "oldnick".into(),
                user: None,
                host: None,
            }
        );
    }

    #[test]
    fn round_trips_through_display() {
        let p = Prefix::parse("nick!user@host");
        assert_eq!(p.to_string(), "nick!user@host");
    }
}
