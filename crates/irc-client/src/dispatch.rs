//! The Command Dispatcher (component E): maps a parsed command to a
//! handler, by table lookup rather than runtime reflection.
//!
//! A registration key is either a literal command/numeric, or an inclusive
//! numeric range `"lo-hi"` (e.g. `"400-599"`, reserved by the state machine
//! for generic protocol errors). Exact matches win over ranges so a
//! specific numeric handler (e.g. `"433"`) can be registered alongside a
//! broad range that would otherwise also cover it.

use std::collections::HashMap;
use std::ops::RangeInclusive;

/// `H` is typically a small `fn` pointer or enum tag; the dispatcher itself
/// is agnostic to what a handler actually does.
pub struct Dispatcher<H> {
    exact: HashMap<String, H>,
    ranges: Vec<(RangeInclusive<u16>, H)>,
}

impl<H: Clone> Dispatcher<H> {
    pub fn new() -> Dispatcher<H> {
        Dispatcher {
            exact: HashMap::new(),
            ranges: Vec::new(),
        }
    }

    /// Register `handler` under a literal command (`"PRIVMSG"`, `"001"`) or
    /// an inclusive numeric range (`"400-599"`).
    pub fn register(&mut self, key: &str, handler: H) {
        if let Some((lo, hi)) = key.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.parse::<u16>(), hi.parse::<u16>()) {
                self.ranges.push((lo..=hi, handler));
                return;
            }
        }
        self.exact.insert(key.to_ascii_uppercase(), handler);
    }

    /// Look up the handler for `command`: an exact match on the literal
    /// string, falling back to numeric-range matches for 3-digit commands.
    pub fn lookup(&self, command: &str) -> Option<H> {
        if let Some(h) = self.exact.get(&command.to_ascii_uppercase()) {
            return Some(h.clone());
        }
        let numeric: u16 = command.parse().ok()?;
        self.ranges
            .iter()
            .find(|(range, _)| range.contains(&numeric))
            .map(|(_, h)| h.clone())
    }
}

impl<H: Clone> Default for Dispatcher<H> {
    fn default() -> Self {
        Dispatcher::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_overlapping_range() {
        let mut d: Dispatcher<&'static str> = Dispatcher::new();
        d.register("400-599", "generic-error");
        d.register("433", "nick-in-use");
        assert_eq!(d.lookup("433"), Some("nick-in-use"));
        assert_eq!(d.lookup("401"), Some("generic-error"));
    }

    #[test]
    fn numeric_range_is_inclusive_and_bounded() {
        let mut d: Dispatcher<&'static str> = Dispatcher::new();
        d.register("400-599", "generic-error");
        assert_eq!(d.lookup("400"), Some("generic-error"));
        assert_eq!(d.lookup("599"), Some("generic-error"));
        assert_eq!(d.lookup("399"), None);
        assert_eq!(d.lookup("600"), None);
    }

    #[test]
    fn unknown_command_is_a_miss() {
        let d: Dispatcher<&'static str> = Dispatcher::new();
        assert_eq!(d.lookup("FROB"), None);
    }
}
