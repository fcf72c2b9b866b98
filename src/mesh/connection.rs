//! Lifecycle of one channel to one remote peer.
//!
//! A [`Connection`] never touches the transport or the session itself. It
//! consumes [`ChannelEvent`]s and answers with the [`Action`]s the mesh should
//! carry out, so the whole `INIT → OPENING → OPEN → CLOSED | ERROR` contract can
//! be exercised without a transport.

use crate::{
    chat::MessageData,
    ids::{PeerAddress, SubjectId},
};

use super::{
    state::Profile,
    transport::{ChannelId, ChannelKind, MediaStream},
    wire::Payload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Init,
    Opening,
    Open,
    Closed,
    /// Terminal like `Closed`; kept apart for diagnostics.
    Error,
}

impl ConnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::Closed | ConnState::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// We dialed: the joiner side.
    Opener,
    /// The remote dialed us.
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The attempt was handed to the transport.
    Start,
    Open,
    Data(Payload),
    Stream(MediaStream),
    Close,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send our own profile over this channel.
    SendHandshake,
    Bind(Profile),
    Deliver(MessageData),
    AttachStream(MediaStream),
    /// Drop this channel from the session.
    Cleanup,
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub channel: ChannelId,
    pub peer: PeerAddress,
    /// Who we expect at `peer`, from the participant list or the connect metadata.
    pub subject: SubjectId,
    pub kind: ChannelKind,
    pub role: Role,
    state: ConnState,
    handshake_sent: bool,
}

impl Connection {
    pub fn new(channel: ChannelId, peer: PeerAddress, subject: SubjectId, kind: ChannelKind, role: Role) -> Self {
        Self {
            channel,
            peer,
            subject,
            kind,
            role,
            state: ConnState::Init,
            handshake_sent: false,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnState::Open
    }

    /// Applies one event. Events that make no sense in the current state are
    /// logged and dropped without changing anything.
    pub fn step(&mut self, event: ChannelEvent) -> Vec<Action> {
        use ConnState::*;

        match (self.state, event) {
            (Init, ChannelEvent::Start) => {
                self.state = Opening;
                vec![]
            }
            (Opening, ChannelEvent::Open) => {
                self.state = Open;
                tracing::debug!(channel = self.channel.0, peer = %self.peer, kind = ?self.kind, "channel open");
                if self.kind == ChannelKind::Data && self.role == Role::Opener {
                    self.handshake()
                } else {
                    vec![]
                }
            }
            (Open, ChannelEvent::Data(payload)) if self.kind == ChannelKind::Data => self.receive(payload),
            (Opening, ChannelEvent::Stream(stream)) if self.kind.is_media() => {
                self.state = Open;
                vec![Action::AttachStream(stream)]
            }
            (Open, ChannelEvent::Stream(stream)) if self.kind.is_media() => vec![Action::AttachStream(stream)],
            (Opening | Open, ChannelEvent::Close) => {
                self.state = Closed;
                tracing::debug!(channel = self.channel.0, peer = %self.peer, kind = ?self.kind, "channel closed");
                vec![Action::Cleanup]
            }
            (Opening | Open, ChannelEvent::Error(reason)) => {
                self.state = Error;
                tracing::warn!(channel = self.channel.0, peer = %self.peer, kind = ?self.kind, %reason, "channel failed");
                vec![Action::Cleanup]
            }
            (state, event) => {
                tracing::warn!(channel = self.channel.0, ?state, ?event, "ignored channel event");
                vec![]
            }
        }
    }

    fn handshake(&mut self) -> Vec<Action> {
        if self.handshake_sent {
            return vec![];
        }
        self.handshake_sent = true;
        vec![Action::SendHandshake]
    }

    fn receive(&mut self, payload: Payload) -> Vec<Action> {
        match payload {
            Payload::ConnInit(profile) if profile.subject_id != self.subject => {
                tracing::warn!(
                    channel = self.channel.0,
                    expected = %self.subject,
                    got = %profile.subject_id,
                    "handshake from unexpected subject"
                );
                vec![]
            }
            Payload::ConnInit(profile) => {
                let mut actions = vec![Action::Bind(profile)];
                if self.role == Role::Incoming {
                    actions.extend(self.handshake());
                }
                actions
            }
            Payload::Msg(message) => vec![Action::Deliver(message)],
        }
    }
}
