//! Shared, allocation-light name types used by both the wire codec (`irc-proto`)
//! and the client (`irc-client`).
//!
//! IRC compares nicknames and channel names case-insensitively, but *how*
//! case is folded is itself a server-advertised parameter (`CASEMAPPING` in
//! `005 RPL_ISUPPORT`). This crate centralizes that folding rule plus the
//! small validated string type (`ChannelName`) whose grammar is fixed by
//! the protocol regardless of casemapping.

use std::fmt;

/// Case-folding rule advertised by a server's `CASEMAPPING` ISUPPORT token.
///
/// Absent an explicit `CASEMAPPING`, a client should default to `Ascii`
/// (see the casemapping open question resolved in SPEC_FULL.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMapping {
    /// Plain ASCII case folding: `A-Z` maps to `a-z`, nothing else changes.
    #[default]
    Ascii,
    /// RFC 1459 folding: ASCII folding plus `{}|^` are the lowercase forms
    /// of `[]\~`.
    Rfc1459,
    /// Like `Rfc1459` but without folding `~` to `^`.
    StrictRfc1459,
}

impl CaseMapping {
    /// Parse the value of a `CASEMAPPING` ISUPPORT token. Unknown values
    /// fall back to `Ascii` rather than failing; an unrecognised casemapping
    /// name is not a protocol violation worth disconnecting over.
    pub fn parse(value: &str) -> CaseMapping {
        match value {
            "rfc1459" => CaseMapping::Rfc1459,
            "strict-rfc1459" => CaseMapping::StrictRfc1459,
            _ => CaseMapping::Ascii,
        }
    }

    fn fold_char(self, c: char) -> char {
        match self {
            CaseMapping::Ascii => c.to_ascii_lowercase(),
            CaseMapping::Rfc1459 => match c {
                '[' => '{',
                ']' => '}',
                '\\' => '|',
                '~' => '^',
                _ => c.to_ascii_lowercase(),
            },
            CaseMapping::StrictRfc1459 => match c {
                '[' => '{',
                ']' => '}',
                '\\' => '|',
                _ => c.to_ascii_lowercase(),
            },
        }
    }

    /// Fold `s` into its case-insensitive comparison key under this mapping.
    pub fn fold(self, s: &str) -> String {
        s.chars().map(|c| self.fold_char(c)).collect()
    }

    /// Compare two strings for equality under this mapping.
    pub fn eq(self, a: &str, b: &str) -> bool {
        if a.is_ascii() && b.is_ascii() && a.len() != b.len() {
            return false;
        }
        a.chars()
            .map(|c| self.fold_char(c))
            .eq(b.chars().map(|c| self.fold_char(c)))
    }
}

/// Error returned when a candidate channel name violates the grammar in
/// SPEC_FULL.md §3.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelNameError {
    #[error("channel name is empty")]
    Empty,
    #[error("channel name does not start with one of '#+!&'")]
    BadSigil,
    #[error("channel name is longer than 50 characters")]
    TooLong,
    #[error("channel name contains a forbidden character")]
    ForbiddenChar,
}

const CHANNEL_SIGILS: [char; 4] = ['#', '+', '!', '&'];
const CHANNEL_MAX_LEN: usize = 50;

/// A validated IRC channel name, e.g. `#rust`.
///
/// Construction enforces the grammar from SPEC_FULL.md §3: one of the four
/// channel-type sigils, a length cap, and a set of forbidden bytes. Equality
/// here is ordinary `String` equality (exact casing); case-insensitive
/// comparison for registry lookups goes through `CaseMapping`, since the
/// fold rule is a connection-scoped, server-advertised setting and not a
/// property of the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn parse(name: &str) -> Result<ChannelName, ChannelNameError> {
        if name.is_empty() {
            return Err(ChannelNameError::Empty);
        }
        if !CHANNEL_SIGILS.contains(&name.chars().next().unwrap()) {
            return Err(ChannelNameError::BadSigil);
        }
        if name.chars().count() > CHANNEL_MAX_LEN {
            return Err(ChannelNameError::TooLong);
        }
        if name
            .chars()
            .any(|c| matches!(c, ' ' | ',' | ':' | '\0' | '\x07' | '\r' | '\n'))
        {
            return Err(ChannelNameError::ForbiddenChar);
        }
        Ok(ChannelName(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_fold_is_plain_lowercase() {
        assert!(CaseMapping::Ascii.eq("Alice", "alice"));
        assert!(!CaseMapping::Ascii.eq("Ali[ce]", "ali{ce}"));
    }

    #[test]
    fn rfc1459_folds_brackets_and_tilde() {
        assert!(CaseMapping::Rfc1459.eq("Ali[ce]~", "ali{ce}^"));
        assert!(!CaseMapping::StrictRfc1459.eq("Ali~ce", "ali^ce"));
    }

    #[test]
    fn casemapping_parse_defaults_to_ascii() {
        assert_eq!(CaseMapping::parse("ascii"), CaseMapping::Ascii);
        assert_eq!(CaseMapping::parse("bogus"), CaseMapping::Ascii);
        assert_eq!(CaseMapping::parse("strict-rfc1459"), CaseMapping::StrictRfc1459);
    }

    #[test]
    fn channel_name_validates_sigil_and_length() {
        assert!(ChannelName::parse("#rust").is_ok());
        assert!(ChannelName::parse("&local").is_ok());
        assert_eq!(ChannelName::parse(""), Err(ChannelNameError::Empty));
        assert_eq!(ChannelName::parse("rust"), Err(ChannelNameError::BadSigil));
        assert_eq!(
            ChannelName::parse("#a b"),
            Err(ChannelNameError::ForbiddenChar)
        );
        let long = format!("#{}", "a".repeat(60));
        assert_eq!(ChannelName::parse(&long), Err(ChannelNameError::TooLong));
    }
}
