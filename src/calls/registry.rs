//! Per-friend call bookkeeping.

use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use super::state::CallSession;
use crate::network::FriendNumber;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} is already in a call")]
    AlreadyInCall(FriendNumber),

    #[error("allocation failed")]
    Malloc,
}

/// Owns at most one [`CallSession`] per friend.
///
/// A session that reached END or ERROR stays as a tombstone until
/// [`reap`](Self::reap) runs; a tombstone never blocks a new call.
#[derive(Debug, Default)]
pub struct CallRegistry {
    sessions: HashMap<FriendNumber, CallSession>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, friend: FriendNumber) -> Option<&CallSession> {
        self.sessions.get(&friend)
    }

    pub fn get_mut(&mut self, friend: FriendNumber) -> Option<&mut CallSession> {
        self.sessions.get_mut(&friend)
    }

    /// The friend's session if it is not terminal.
    pub fn active(&self, friend: FriendNumber) -> Option<&CallSession> {
        self.get(friend).filter(|s| !s.state.is_terminal())
    }

    pub fn active_mut(&mut self, friend: FriendNumber) -> Option<&mut CallSession> {
        self.get_mut(friend).filter(|s| !s.state.is_terminal())
    }

    pub fn is_in_call(&self, friend: FriendNumber) -> bool {
        self.active(friend).is_some()
    }

    /// Test-and-set insert of a new session.
    pub fn create(&mut self, session: CallSession) -> Result<&mut CallSession, RegistryError> {
        let friend = session.friend_number;
        if self.is_in_call(friend) {
            return Err(RegistryError::AlreadyInCall(friend));
        }
        self.sessions
            .try_reserve(1)
            .map_err(|_| RegistryError::Malloc)?;
        if let Some(old) = self.sessions.remove(&friend) {
            debug!("Replacing {:?} tombstone for {}", old.state, friend);
        }
        Ok(self.sessions.entry(friend).or_insert(session))
    }

    /// Idempotent.
    pub fn remove(&mut self, friend: FriendNumber) -> Option<CallSession> {
        self.sessions.remove(&friend)
    }

    /// Drop every terminal session, returning the affected friends.
    pub fn reap(&mut self) -> Vec<FriendNumber> {
        let mut reaped: Vec<FriendNumber> = self
            .sessions
            .values()
            .filter(|s| s.state.is_terminal())
            .map(|s| s.friend_number)
            .collect();
        reaped.sort();
        for friend in &reaped {
            self.sessions.remove(friend);
        }
        reaped
    }

    pub fn drain(&mut self) -> Vec<CallSession> {
        self.sessions.drain().map(|(_, s)| s).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallSession> {
        self.sessions.values()
    }

    /// Friends with a session, in ascending order.
    pub fn friends(&self) -> Vec<FriendNumber> {
        let mut friends: Vec<_> = self.sessions.keys().copied().collect();
        friends.sort();
        friends
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
