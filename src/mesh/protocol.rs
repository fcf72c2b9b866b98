//! Mesh formation and the room-level operations built on it.
//!
//! The joiner dials everyone already in the room; existing members only ever
//! accept. Every channel gets its own [`Connection`] and transport events are
//! routed to the one they belong to.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::{
    chat::{Author, Chats, Counterpart, Message, MessageData},
    client::Rendezvous,
    code::RoomCode,
    ids::{PeerAddress, SubjectId},
    now_millis,
};

use super::{
    connection::{Action, ChannelEvent, ConnState, Connection, Role},
    state::{LocalSession, Profile},
    transport::{ChannelId, ChannelKind, ConnectMeta, MediaDevices, MediaStream, Transport, TransportEvent},
    wire::Payload,
    MeshError,
};

pub struct Mesh<T, R> {
    transport: T,
    rendezvous: R,
    local: Profile,
    room: Option<RoomCode>,
    connections: HashMap<ChannelId, Connection>,
    session: LocalSession,
    chats: Chats,
    camera: Option<MediaStream>,
    screen: Option<MediaStream>,
}

impl<T: Transport, R: Rendezvous> Mesh<T, R> {
    /// `local` is our own profile, with the address the transport gave us.
    pub fn new(transport: T, rendezvous: R, mut local: Profile) -> Self {
        local.camera_stream = None;
        local.screen_stream = None;
        Self {
            transport,
            rendezvous,
            local,
            room: None,
            connections: HashMap::new(),
            session: LocalSession::new(),
            chats: Chats::new(),
            camera: None,
            screen: None,
        }
    }

    pub fn session(&self) -> &LocalSession {
        &self.session
    }

    pub fn chats(&self) -> &Chats {
        &self.chats
    }

    pub fn local(&self) -> &Profile {
        &self.local
    }

    pub fn room(&self) -> Option<&RoomCode> {
        self.room.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn rendezvous(&self) -> &R {
        &self.rendezvous
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// In a room with no connection attempt still pending.
    pub fn is_ready(&self) -> bool {
        self.room.is_some()
            && self
                .connections
                .values()
                .all(|connection| !matches!(connection.state(), ConnState::Init | ConnState::Opening))
    }

    /// Joins `code` and dials every participant already there. Returns how many
    /// remote participants were dialed.
    pub async fn enter(&mut self, code: RoomCode, devices: &mut impl MediaDevices) -> Result<usize, MeshError> {
        if let Some(room) = &self.room {
            return Err(MeshError::AlreadyJoined(room.clone()));
        }

        let participants = self
            .rendezvous
            .join(&code, &self.local.peer_address)
            .await?
            .ok_or(MeshError::RoomNotFound)?;

        self.session.init(self.local.clone());
        self.chats.reset();
        self.room = Some(code.clone());

        match devices.camera().await {
            Ok(stream) => {
                self.session.set_local_stream(ChannelKind::Camera, Some(stream.clone()));
                self.camera = Some(stream);
            }
            Err(err) => tracing::warn!(%err, "no camera, continuing with chat only"),
        }

        let remote: Vec<(SubjectId, PeerAddress)> = participants
            .into_iter()
            .filter(|(subject, peer)| subject != &self.local.subject_id && peer != &self.local.peer_address)
            .collect();

        tracing::info!(%code, remote = remote.len(), "entered room");
        for (subject, peer) in &remote {
            self.dial(peer, subject);
        }
        Ok(remote.len())
    }

    fn meta(&self, kind: ChannelKind) -> ConnectMeta {
        ConnectMeta {
            kind,
            subject_id: self.local.subject_id.clone(),
            peer_address: self.local.peer_address.clone(),
        }
    }

    fn dial(&mut self, peer: &PeerAddress, subject: &SubjectId) {
        let meta = self.meta(ChannelKind::Data);
        match self.transport.connect(peer, meta) {
            Ok(channel) => self.register(Connection::new(channel, peer.clone(), subject.clone(), ChannelKind::Data, Role::Opener)),
            Err(err) => {
                tracing::warn!(%peer, %err, "could not open data channel");
                return;
            }
        }

        if let Some(camera) = self.camera.clone() {
            self.call(peer, subject, ChannelKind::Camera, &camera);
        }
    }

    fn call(&mut self, peer: &PeerAddress, subject: &SubjectId, kind: ChannelKind, stream: &MediaStream) {
        let meta = self.meta(kind);
        match self.transport.call(peer, stream, meta) {
            Ok(channel) => self.register(Connection::new(channel, peer.clone(), subject.clone(), kind, Role::Opener)),
            Err(err) => tracing::warn!(%peer, ?kind, %err, "could not place media call"),
        }
    }

    fn register(&mut self, mut connection: Connection) {
        connection.step(ChannelEvent::Start);
        self.session
            .track(&connection.peer, &connection.subject, connection.kind, connection.channel);
        self.connections.insert(connection.channel, connection);
    }

    /// Feeds one transport event into the mesh.
    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Incoming { channel, from, meta } => self.accept(channel, from, meta),
            TransportEvent::Open(channel) => self.dispatch(channel, ChannelEvent::Open),
            TransportEvent::Data(channel, bytes) => match Payload::decode(&bytes) {
                Ok(payload) => self.dispatch(channel, ChannelEvent::Data(payload)),
                Err(err) => tracing::warn!(channel = channel.0, %err, "dropping undecodable payload"),
            },
            TransportEvent::Stream(channel, stream) => self.dispatch(channel, ChannelEvent::Stream(stream)),
            TransportEvent::Close(channel) => self.dispatch(channel, ChannelEvent::Close),
            TransportEvent::Error(channel, reason) => self.dispatch(channel, ChannelEvent::Error(reason)),
        }
    }

    /// Handles transport events until the sender side is dropped.
    pub async fn run(&mut self, events: &mut mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
    }

    fn accept(&mut self, channel: ChannelId, from: PeerAddress, meta: ConnectMeta) {
        if self.room.is_none() {
            tracing::debug!(channel = channel.0, %from, "refusing connection outside a room");
            self.transport.close(channel);
            return;
        }

        let kind = meta.kind;
        self.register(Connection::new(channel, from, meta.subject_id, kind, Role::Incoming));

        let reply = match kind {
            ChannelKind::Data => return,
            ChannelKind::Camera => self.camera.clone(),
            // screens are one-way
            ChannelKind::Screen => None,
        };
        if let Err(err) = self.transport.answer(channel, reply.as_ref()) {
            self.dispatch(channel, ChannelEvent::Error(err.to_string()));
        }
    }

    fn dispatch(&mut self, channel: ChannelId, event: ChannelEvent) {
        let Some(connection) = self.connections.get_mut(&channel) else {
            tracing::debug!(channel = channel.0, ?event, "event for unknown channel");
            return;
        };
        let actions = connection.step(event);
        let (peer, subject, kind) = (connection.peer.clone(), connection.subject.clone(), connection.kind);

        for action in actions {
            match action {
                Action::SendHandshake => {
                    let sent = Payload::ConnInit(self.local.clone())
                        .encode()
                        .and_then(|bytes| self.transport.send(channel, bytes).map_err(MeshError::from));
                    if let Err(err) = sent {
                        self.dispatch(channel, ChannelEvent::Error(err.to_string()));
                        return;
                    }
                }
                Action::Bind(profile) => self.session.bind(profile, &peer, channel),
                Action::Deliver(data) => self.receive(&subject, data),
                Action::AttachStream(stream) => self.session.attach_stream(&peer, kind, stream),
                Action::Cleanup => self.cleanup(channel, &peer, kind),
            }
        }
    }

    fn cleanup(&mut self, channel: ChannelId, peer: &PeerAddress, kind: ChannelKind) {
        self.connections.remove(&channel);
        self.transport.close(channel);
        if self.session.release(peer, kind, channel) {
            let orphans: Vec<ChannelId> = self
                .connections
                .values()
                .filter(|connection| &connection.peer == peer)
                .map(|connection| connection.channel)
                .collect();
            for orphan in orphans {
                self.connections.remove(&orphan);
                self.transport.close(orphan);
            }
            tracing::info!(%peer, "peer left the mesh");
        }
    }

    fn receive(&mut self, subject: &SubjectId, data: MessageData) {
        let MessageData { from, mut message } = data;
        match from {
            Counterpart::Group => {
                message.author = Author::Subject(subject.clone());
                self.chats.add_message(Counterpart::Group, message);
            }
            Counterpart::Subject(_) => {
                message.author = Author::User;
                self.chats.add_message(Counterpart::Subject(subject.clone()), message);
            }
        }
    }

    fn open_data(&self) -> impl Iterator<Item = &Connection> {
        self.connections
            .values()
            .filter(|connection| connection.kind == ChannelKind::Data && connection.is_open())
    }

    fn message(content: &str, author: Author) -> Result<Message, MeshError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MeshError::EmptyMessage);
        }
        Ok(Message {
            timestamp: now_millis(),
            content: content.to_owned(),
            author,
        })
    }

    /// Sends to every open peer and echoes once locally. Returns how many peers got it.
    pub fn send_group(&mut self, content: &str) -> Result<usize, MeshError> {
        if self.room.is_none() {
            return Err(MeshError::NotJoined);
        }
        let message = Self::message(content, Author::Subject(self.local.subject_id.clone()))?;
        let bytes = Payload::Msg(MessageData {
            from: Counterpart::Group,
            message: message.clone(),
        })
        .encode()?;

        let targets: Vec<ChannelId> = self.open_data().map(|connection| connection.channel).collect();
        let mut delivered = 0;
        for channel in targets {
            match self.transport.send(channel, bytes.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => self.dispatch(channel, ChannelEvent::Error(err.to_string())),
            }
        }

        self.chats.add_message(
            Counterpart::Group,
            Message {
                author: Author::Local,
                ..message
            },
        );
        Ok(delivered)
    }

    pub fn send_private(&mut self, to: &SubjectId, content: &str) -> Result<(), MeshError> {
        if self.room.is_none() {
            return Err(MeshError::NotJoined);
        }
        let message = Self::message(content, Author::User)?;
        let Some(channel) = self
            .open_data()
            .find(|connection| &connection.subject == to)
            .map(|connection| connection.channel)
        else {
            return Err(MeshError::NotConnected(to.clone()));
        };

        let counterpart = Counterpart::Subject(to.clone());
        self.chats.add_chat(counterpart.clone());

        let bytes = Payload::Msg(MessageData {
            from: Counterpart::Subject(self.local.subject_id.clone()),
            message: message.clone(),
        })
        .encode()?;
        if let Err(err) = self.transport.send(channel, bytes) {
            self.dispatch(channel, ChannelEvent::Error(err.to_string()));
            return Err(err.into());
        }

        self.chats.add_message(
            counterpart,
            Message {
                author: Author::Local,
                ..message
            },
        );
        Ok(())
    }

    /// Captures the screen and calls every connected peer with it. Returns how
    /// many calls were placed.
    pub async fn share_screen(&mut self, devices: &mut impl MediaDevices) -> Result<usize, MeshError> {
        if self.room.is_none() {
            return Err(MeshError::NotJoined);
        }
        let stream = devices.screen().await?;
        self.stop_screen();

        let targets: Vec<(PeerAddress, SubjectId)> = self
            .open_data()
            .map(|connection| (connection.peer.clone(), connection.subject.clone()))
            .collect();
        self.session.set_local_stream(ChannelKind::Screen, Some(stream.clone()));
        self.screen = Some(stream.clone());

        let before = self.connections.len();
        for (peer, subject) in &targets {
            self.call(peer, subject, ChannelKind::Screen, &stream);
        }
        Ok(self.connections.len() - before)
    }

    pub fn stop_screen(&mut self) {
        if self.screen.take().is_none() {
            return;
        }
        self.session.set_local_stream(ChannelKind::Screen, None);

        let ours: Vec<(ChannelId, PeerAddress)> = self
            .connections
            .values()
            .filter(|connection| connection.kind == ChannelKind::Screen && connection.role == Role::Opener)
            .map(|connection| (connection.channel, connection.peer.clone()))
            .collect();
        for (channel, peer) in ours {
            self.connections.remove(&channel);
            self.transport.close(channel);
            self.session.release(&peer, ChannelKind::Screen, channel);
        }
    }

    /// Closes every channel, then leaves the rendezvous record. A second call does nothing.
    pub async fn leave(&mut self) -> Result<(), MeshError> {
        let Some(code) = self.room.take() else {
            return Ok(());
        };

        let mut channels: Vec<ChannelId> = self.connections.keys().copied().collect();
        channels.sort();
        for channel in channels {
            self.transport.close(channel);
        }
        self.connections.clear();
        self.session.teardown();
        self.camera = None;
        self.screen = None;

        tracing::info!(%code, "left room");
        self.rendezvous.leave(&code).await
    }
}
