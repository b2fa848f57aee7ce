//! uid/gid <-> name translation.
//!
//! Snapshots store owner and group by name so they survive a move to a host
//! where the same accounts carry different numeric ids. Everything that needs
//! a translation goes through [`NameResolver`]: [`SystemNames`] asks the host
//! user/group database, [`StaticNames`] is an in-memory table for tests.

use crate::error::LookupError;
use nix::unistd::{Gid, Group, Uid, User};
use std::collections::HashMap;
use std::path::PathBuf;

pub trait NameResolver {
    fn user_name(&self, uid: u32) -> Result<String, LookupError>;
    fn group_name(&self, gid: u32) -> Result<String, LookupError>;
    fn uid_of(&self, name: &str) -> Result<u32, LookupError>;
    fn gid_of(&self, name: &str) -> Result<u32, LookupError>;
}

/// Resolver backed by the host's passwd/group database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNames;

impl NameResolver for SystemNames {
    fn user_name(&self, uid: u32) -> Result<String, LookupError> {
        User::from_uid(Uid::from_raw(uid))
            .map_err(|e| LookupError::Database(e.to_string()))?
            .map(|user| user.name)
            .ok_or(LookupError::UnknownUid(uid))
    }

    fn group_name(&self, gid: u32) -> Result<String, LookupError> {
        Group::from_gid(Gid::from_raw(gid))
            .map_err(|e| LookupError::Database(e.to_string()))?
            .map(|group| group.name)
            .ok_or(LookupError::UnknownGid(gid))
    }

    fn uid_of(&self, name: &str) -> Result<u32, LookupError> {
        User::from_name(name)
            .map_err(|e| LookupError::Database(e.to_string()))?
            .map(|user| user.uid.as_raw())
            .ok_or_else(|| LookupError::UnknownUser(name.to_string()))
    }

    fn gid_of(&self, name: &str) -> Result<u32, LookupError> {
        Group::from_name(name)
            .map_err(|e| LookupError::Database(e.to_string()))?
            .map(|group| group.gid.as_raw())
            .ok_or_else(|| LookupError::UnknownGroup(name.to_string()))
    }
}

/// Fixed in-memory name table.
#[derive(Debug, Default, Clone)]
pub struct StaticNames {
    users: HashMap<u32, String>,
    groups: HashMap<u32, String>,
}

impl StaticNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, uid: u32, name: &str) -> Self {
        self.users.insert(uid, name.to_string());
        self
    }

    pub fn with_group(mut self, gid: u32, name: &str) -> Self {
        self.groups.insert(gid, name.to_string());
        self
    }
}

impl NameResolver for StaticNames {
    fn user_name(&self, uid: u32) -> Result<String, LookupError> {
        self.users.get(&uid).cloned().ok_or(LookupError::UnknownUid(uid))
    }

    fn group_name(&self, gid: u32) -> Result<String, LookupError> {
        self.groups.get(&gid).cloned().ok_or(LookupError::UnknownGid(gid))
    }

    fn uid_of(&self, name: &str) -> Result<u32, LookupError> {
        self.users
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| LookupError::UnknownUser(name.to_string()))
    }

    fn gid_of(&self, name: &str) -> Result<u32, LookupError> {
        self.groups
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| LookupError::UnknownGroup(name.to_string()))
    }
}

/// Real uid and gid of the running process.
pub fn current_ids() -> (u32, u32) {
    (nix::unistd::getuid().as_raw(), nix::unistd::getgid().as_raw())
}

/// `$HOME`, or the passwd entry of the invoking user when it is unset.
pub fn home_dir() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
        return Some(PathBuf::from(home));
    }
    User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|user| user.dir)
}
