//! Who is in the room and how we reach them.
//!
//! Profiles (by subject) and peer connections (by address) are two flat maps
//! with no pointers between them. Every mutation goes through a named method
//! that edits the current snapshot inside `send_modify`, so it always works on
//! the latest state and readers only ever see whole transitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    ids::{PeerAddress, SubjectId},
    session::SessionUser,
};

use super::transport::{ChannelId, ChannelKind, MediaStream};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub subject_id: SubjectId,
    pub peer_address: PeerAddress,
    pub name: String,
    pub email: String,
    pub image: String,
    #[serde(skip)]
    pub camera_stream: Option<MediaStream>,
    #[serde(skip)]
    pub screen_stream: Option<MediaStream>,
}

impl Profile {
    pub fn new(user: &SessionUser, peer_address: PeerAddress) -> Self {
        Self {
            subject_id: user.id.clone(),
            peer_address,
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            camera_stream: None,
            screen_stream: None,
        }
    }

    /// What we know of someone before their handshake arrives.
    pub fn partial(subject_id: SubjectId, peer_address: PeerAddress) -> Self {
        Self {
            subject_id,
            peer_address,
            name: String::new(),
            email: String::new(),
            image: String::new(),
            camera_stream: None,
            screen_stream: None,
        }
    }

    fn stream_mut(&mut self, kind: ChannelKind) -> Option<&mut Option<MediaStream>> {
        match kind {
            ChannelKind::Data => None,
            ChannelKind::Camera => Some(&mut self.camera_stream),
            ChannelKind::Screen => Some(&mut self.screen_stream),
        }
    }
}

/// Live channel handles for one remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnection {
    pub subject_id: SubjectId,
    pub data: Option<ChannelId>,
    pub camera: Option<ChannelId>,
    pub screen: Option<ChannelId>,
}

impl PeerConnection {
    fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            data: None,
            camera: None,
            screen: None,
        }
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<ChannelId> {
        match kind {
            ChannelKind::Data => self.data,
            ChannelKind::Camera => self.camera,
            ChannelKind::Screen => self.screen,
        }
    }

    fn is_empty(&self) -> bool {
        self.data.is_none() && self.camera.is_none() && self.screen.is_none()
    }

    fn slot(&mut self, kind: ChannelKind) -> &mut Option<ChannelId> {
        match kind {
            ChannelKind::Data => &mut self.data,
            ChannelKind::Camera => &mut self.camera,
            ChannelKind::Screen => &mut self.screen,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub local: Option<Profile>,
    pub profiles: HashMap<SubjectId, Profile>,
    pub peers: HashMap<PeerAddress, PeerConnection>,
}

impl SessionView {
    pub fn profile_at(&self, peer: &PeerAddress) -> Option<&Profile> {
        let subject = &self.peers.get(peer)?.subject_id;
        self.profiles.get(subject)
    }

    /// Removes the peer and, if it still belongs to that address, its profile.
    fn cascade_remove(&mut self, peer: &PeerAddress) -> Option<PeerConnection> {
        let removed = self.peers.remove(peer)?;
        if self
            .profiles
            .get(&removed.subject_id)
            .is_some_and(|profile| &profile.peer_address == peer)
        {
            self.profiles.remove(&removed.subject_id);
        }
        Some(removed)
    }
}

pub struct LocalSession {
    tx: watch::Sender<SessionView>,
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSession {
    pub fn new() -> Self {
        Self { tx: watch::channel(SessionView::default()).0 }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.tx.subscribe()
    }

    pub fn view(&self) -> watch::Ref<'_, SessionView> {
        self.tx.borrow()
    }

    /// Room entry: forget any previous room and start from just ourselves.
    pub fn init(&self, local: Profile) {
        self.tx.send_replace(SessionView {
            local: Some(local),
            ..SessionView::default()
        });
    }

    pub fn teardown(&self) {
        self.tx.send_replace(SessionView::default());
    }

    pub fn set_local_stream(&self, kind: ChannelKind, stream: Option<MediaStream>) {
        self.tx.send_modify(|view| {
            if let Some(slot) = view.local.as_mut().and_then(|local| local.stream_mut(kind)) {
                *slot = stream;
            }
        });
    }

    /// First contact over `channel`: records the attempt and a partial profile if none exists.
    pub fn track(&self, peer: &PeerAddress, subject: &SubjectId, kind: ChannelKind, channel: ChannelId) {
        self.tx.send_modify(|view| {
            let connection = view
                .peers
                .entry(peer.clone())
                .or_insert_with(|| PeerConnection::new(subject.clone()));
            connection.subject_id = subject.clone();
            *connection.slot(kind) = Some(channel);

            view.profiles
                .entry(subject.clone())
                .or_insert_with(|| Profile::partial(subject.clone(), peer.clone()));
        });
    }

    /// Handshake received: binds subject, address and data channel, keeping known streams.
    pub fn bind(&self, mut profile: Profile, peer: &PeerAddress, channel: ChannelId) {
        self.tx.send_modify(|view| {
            profile.peer_address = peer.clone();
            let subject = profile.subject_id.clone();

            if let Some(known) = view.profiles.get(&subject).filter(|known| &known.peer_address == peer) {
                profile.camera_stream = known.camera_stream.clone();
                profile.screen_stream = known.screen_stream.clone();
            }
            view.profiles.insert(subject.clone(), profile);

            let connection = view
                .peers
                .entry(peer.clone())
                .or_insert_with(|| PeerConnection::new(subject.clone()));
            connection.subject_id = subject;
            connection.data = Some(channel);
        });
    }

    pub fn attach_stream(&self, peer: &PeerAddress, kind: ChannelKind, stream: MediaStream) {
        self.tx.send_modify(|view| {
            let Some(subject) = view.peers.get(peer).map(|connection| connection.subject_id.clone()) else {
                return;
            };
            if let Some(slot) = view.profiles.get_mut(&subject).and_then(|profile| profile.stream_mut(kind)) {
                *slot = Some(stream);
            }
        });
    }

    /// `channel` of `kind` to `peer` is gone. A data channel takes the whole peer
    /// with it; a media channel only takes its own stream, unless it was the last
    /// channel left. Returns whether the peer was removed.
    pub fn release(&self, peer: &PeerAddress, kind: ChannelKind, channel: ChannelId) -> bool {
        let mut removed = false;
        self.tx.send_if_modified(|view| {
            let Some(connection) = view.peers.get_mut(peer) else {
                return false;
            };
            if connection.channel(kind) != Some(channel) {
                return false;
            }

            *connection.slot(kind) = None;
            if kind == ChannelKind::Data || connection.is_empty() {
                removed = view.cascade_remove(peer).is_some();
                return true;
            }

            let subject = connection.subject_id.clone();
            if let Some(profile) = view.profiles.get_mut(&subject).filter(|profile| &profile.peer_address == peer) {
                if let Some(slot) = profile.stream_mut(kind) {
                    *slot = None;
                }
            }
            true
        });
        removed
    }

    pub fn remove_peer(&self, peer: &PeerAddress) -> Option<PeerConnection> {
        let mut removed = None;
        self.tx.send_if_modified(|view| {
            removed = view.cascade_remove(peer);
            removed.is_some()
        });
        removed
    }
}
