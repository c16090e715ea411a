//! The Entity Registry (component D): lookup-or-create tables for servers,
//! users and channels, case-folded per the connection's `CASEMAPPING`.

use std::collections::HashMap;

use irc_common::{CaseMapping, ChannelName};

use crate::entities::{Channel, Server, User};

/// Owns every `Server`/`User`/`Channel` for the session's lifetime. All
/// mutating access happens on the single protocol task (SPEC_FULL.md §5);
/// this type is not `Sync` and makes no attempt to be.
#[derive(Default)]
pub struct Registry {
    casemapping: CaseMapping,
    servers: HashMap<String, Server>,
    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Switch the folding rule used by future lookups. Existing entities
    /// keep their stored (display) casing; only the comparison key used for
    /// subsequent `get_*` calls changes, per the casemapping open question
    /// resolved in SPEC_FULL.md §9.
    pub fn set_casemapping(&mut self, casemapping: CaseMapping) {
        self.casemapping = casemapping;
    }

    pub fn casemapping(&self) -> CaseMapping {
        self.casemapping
    }

    fn fold(&self, s: &str) -> String {
        self.casemapping.fold(s)
    }

    pub fn get_server(&mut self, host: &str) -> &mut Server {
        let key = self.fold(host);
        self.servers
            .entry(key)
            .or_insert_with(|| Server { host: host.to_owned() })
    }

    pub fn get_user_by_nick(&mut self, nick: &str) -> &mut User {
        let key = self.fold(nick);
        self.users.entry(key).or_insert_with(|| User::new(nick))
    }

    pub fn find_user_by_nick(&self, nick: &str) -> Option<&User> {
        self.users.get(&self.fold(nick))
    }

    pub fn get_user_by_username(&self, username: &str) -> Option<&User> {
        let key = self.fold(username);
        self.users
            .values()
            .find(|u| u.username.as_deref().map(|u| self.fold(u)) == Some(key.clone()))
    }

    /// Rename a user in place (NICK), preserving its table slot identity
    /// conceptually: callers observe the same handle by new name afterward.
    pub fn rename_user(&mut self, old_nick: &str, new_nick: &str) {
        let old_key = self.fold(old_nick);
        if let Some(mut user) = self.users.remove(&old_key) {
            user.nick = new_nick.to_owned();
            self.users.insert(self.fold(new_nick), user);
        }
        for chan in self.channels.values_mut() {
            for member in &mut chan.members {
                if self.casemapping.eq(&member.nick, old_nick) {
                    member.nick = new_nick.to_owned();
                }
            }
        }
    }

    pub fn remove_user(&mut self, nick: &str) -> Option<User> {
        let removed = self.users.remove(&self.fold(nick));
        for chan in self.channels.values_mut() {
            if let Some(idx) = chan.member_index(|s| self.casemapping.fold(s), nick) {
                chan.members.remove(idx);
            }
        }
        removed
    }

    pub fn get_channel(&mut self, name: &ChannelName) -> &mut Channel {
        let key = self.fold(name.as_str());
        self.channels
            .entry(key)
            .or_insert_with(|| Channel::new(name.clone()))
    }

    pub fn find_channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&self.fold(name))
    }

    pub fn find_channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        let key = self.fold(name);
        self.channels.get_mut(&key)
    }

    pub fn remove_channel(&mut self, name: &str) -> Option<Channel> {
        self.channels.remove(&self.fold(name))
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_idempotent_and_case_insensitive() {
        let mut reg = Registry::new();
        let h1 = reg.get_user_by_nick("Alice") as *const User;
        let h2 = reg.get_user_by_nick("alice") as *const User;
        assert_eq!(h1, h2);
        assert_eq!(reg.user_count(), 1);
    }

    #[test]
    fn quit_purges_user_from_every_channel() {
        let mut reg = Registry::new();
        let chan = ChannelName::parse("#room").unwrap();
        reg.get_channel(&chan)
            .members
            .push(crate::entities::ChannelUser::new("nick"));
        reg.get_user_by_nick("nick");
        reg.remove_user("nick");
        assert!(reg.find_user_by_nick("nick").is_none());
        assert!(reg.find_channel("#room").unwrap().members.is_empty());
    }

    #[test]
    fn join_then_part_removes_the_channel() {
        let mut reg = Registry::new();
        let chan = ChannelName::parse("#a").unwrap();
        reg.get_channel(&chan);
        assert!(reg.find_channel("#a").is_some());
        reg.remove_channel("#a");
        assert!(reg.find_channel("#a").is_none());
    }
}
