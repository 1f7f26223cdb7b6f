//! In-memory [`PeerNetwork`] for tests and the demo binary.
//!
//! Two instances linked with [`LoopbackNetwork::connect`] deliver signals and
//! media into each other's inbox. A friend without a linked peer swallows
//! whatever is sent to it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::debug;

use crate::calls::media::MediaPayload;
use crate::calls::{MediaKind, SignalMessage};
use crate::network::{ConnectionStatus, FriendNumber, Inbound, NetworkError, PeerNetwork};

#[derive(Debug, Clone)]
struct LoopbackLink {
    status: ConnectionStatus,
    /// The other side and the number it knows us by.
    remote: Option<(Weak<LoopbackNetwork>, FriendNumber)>,
}

#[derive(Debug, Default)]
pub struct LoopbackNetwork {
    friends: Mutex<HashMap<FriendNumber, LoopbackLink>>,
    inbox: Mutex<VecDeque<Inbound>>,
    unstable: Mutex<HashSet<(FriendNumber, MediaKind)>>,
    open_media: Mutex<HashSet<FriendNumber>>,
    media_failure: AtomicBool,
    attached: AtomicBool,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Befriend `a` and `b`. `a` knows `b` as `b_number`, `b` knows `a` as `a_number`.
    pub fn connect(a: &Arc<Self>, b_number: FriendNumber, b: &Arc<Self>, a_number: FriendNumber) {
        a.friends().insert(
            b_number,
            LoopbackLink {
                status: ConnectionStatus::Udp,
                remote: Some((Arc::downgrade(b), a_number)),
            },
        );
        b.friends().insert(
            a_number,
            LoopbackLink {
                status: ConnectionStatus::Udp,
                remote: Some((Arc::downgrade(a), b_number)),
            },
        );
    }

    /// Add a friend with no peer behind it.
    pub fn add_friend(&self, friend: FriendNumber, status: ConnectionStatus) {
        self.friends().insert(
            friend,
            LoopbackLink {
                status,
                remote: None,
            },
        );
    }

    pub fn set_connection_status(&self, friend: FriendNumber, status: ConnectionStatus) {
        if let Some(link) = self.friends().get_mut(&friend) {
            link.status = status;
        }
    }

    pub fn remove_friend(&self, friend: FriendNumber) {
        self.friends().remove(&friend);
    }

    pub fn set_link_stable(&self, friend: FriendNumber, kind: MediaKind, stable: bool) {
        let mut unstable = self.unstable.lock().expect("Mutex should not be poisoned");
        if stable {
            unstable.remove(&(friend, kind));
        } else {
            unstable.insert((friend, kind));
        }
    }

    /// Make every `send_media` fail with [`NetworkError::Rejected`].
    pub fn set_media_failure(&self, fail: bool) {
        self.media_failure.store(fail, Ordering::SeqCst);
    }

    /// Queue an inbound item as if a peer had sent it.
    pub fn inject(&self, item: Inbound) {
        self.inbox
            .lock()
            .expect("Mutex should not be poisoned")
            .push_back(item);
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbox.lock().expect("Mutex should not be poisoned").len()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Whether codecs opened by an answer are still held for `friend`.
    pub fn has_open_media(&self, friend: FriendNumber) -> bool {
        self.open_media
            .lock()
            .expect("Mutex should not be poisoned")
            .contains(&friend)
    }

    fn friends(&self) -> std::sync::MutexGuard<'_, HashMap<FriendNumber, LoopbackLink>> {
        self.friends.lock().expect("Mutex should not be poisoned")
    }

    /// Resolve where a push to `friend` goes, enforcing connectivity.
    fn route(
        &self,
        friend: FriendNumber,
    ) -> Result<Option<(Arc<LoopbackNetwork>, FriendNumber)>, NetworkError> {
        let friends = self.friends();
        let link = friends
            .get(&friend)
            .ok_or(NetworkError::UnknownFriend(friend))?;
        if !link.status.is_connected() {
            return Err(NetworkError::NotConnected(friend));
        }
        Ok(link
            .remote
            .as_ref()
            .and_then(|(peer, as_seen)| peer.upgrade().map(|p| (p, *as_seen))))
    }
}

impl PeerNetwork for LoopbackNetwork {
    fn friend_exists(&self, friend: FriendNumber) -> bool {
        self.friends().contains_key(&friend)
    }

    fn friend_connection_status(&self, friend: FriendNumber) -> ConnectionStatus {
        self.friends()
            .get(&friend)
            .map(|link| link.status)
            .unwrap_or_default()
    }

    fn send_signal(
        &self,
        friend: FriendNumber,
        message: &SignalMessage,
    ) -> Result<(), NetworkError> {
        if let Some((peer, as_seen)) = self.route(friend)? {
            debug!("loopback signal {} -> {}", message.signaling_type(), friend);
            peer.inject(Inbound::Signal {
                friend: as_seen,
                message: message.clone(),
            });
        }
        Ok(())
    }

    fn send_media(&self, friend: FriendNumber, payload: MediaPayload) -> Result<(), NetworkError> {
        if self.media_failure.load(Ordering::SeqCst) {
            return Err(NetworkError::Rejected("media failure injected".to_string()));
        }
        if let Some((peer, as_seen)) = self.route(friend)? {
            peer.inject(Inbound::Media {
                friend: as_seen,
                payload,
            });
        }
        Ok(())
    }

    fn poll_inbound(&self) -> Option<Inbound> {
        self.inbox
            .lock()
            .expect("Mutex should not be poisoned")
            .pop_front()
    }

    fn is_link_stable(&self, friend: FriendNumber, kind: MediaKind, _bit_rate: u32) -> bool {
        !self
            .unstable
            .lock()
            .expect("Mutex should not be poisoned")
            .contains(&(friend, kind))
    }

    fn open_media(
        &self,
        friend: FriendNumber,
        _audio_bit_rate: u32,
        _video_bit_rate: u32,
    ) -> Result<(), NetworkError> {
        self.open_media
            .lock()
            .expect("Mutex should not be poisoned")
            .insert(friend);
        Ok(())
    }

    fn close_media(&self, friend: FriendNumber) {
        self.open_media
            .lock()
            .expect("Mutex should not be poisoned")
            .remove(&friend);
    }

    fn attach_av(&self) -> bool {
        !self.attached.swap(true, Ordering::SeqCst)
    }

    fn detach_av(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::CallControl;

    #[test]
    fn test_connected_pair_delivers_signals() {
        let alice = LoopbackNetwork::new();
        let bob = LoopbackNetwork::new();
        LoopbackNetwork::connect(&alice, FriendNumber(1), &bob, FriendNumber(7));

        alice
            .send_signal(FriendNumber(1), &SignalMessage::Control(CallControl::Pause))
            .unwrap();
        assert_eq!(alice.pending_inbound(), 0);

        match bob.poll_inbound() {
            Some(Inbound::Signal { friend, message }) => {
                assert_eq!(friend, FriendNumber(7));
                assert_eq!(message, SignalMessage::Control(CallControl::Pause));
            }
            other => panic!("unexpected inbound: {:?}", other),
        }
        assert!(bob.poll_inbound().is_none());
    }

    #[test]
    fn test_send_errors() {
        let network = LoopbackNetwork::new();
        network.add_friend(FriendNumber(1), ConnectionStatus::None);

        assert_eq!(
            network.send_signal(FriendNumber(2), &SignalMessage::hang_up()),
            Err(NetworkError::UnknownFriend(FriendNumber(2)))
        );
        assert_eq!(
            network.send_signal(FriendNumber(1), &SignalMessage::hang_up()),
            Err(NetworkError::NotConnected(FriendNumber(1)))
        );

        network.set_connection_status(FriendNumber(1), ConnectionStatus::Tcp);
        assert!(network
            .send_signal(FriendNumber(1), &SignalMessage::hang_up())
            .is_ok());
    }

    #[test]
    fn test_attach_once() {
        let network = LoopbackNetwork::new();
        assert!(network.attach_av());
        assert!(!network.attach_av());
        network.detach_av();
        assert!(network.attach_av());
    }
}
