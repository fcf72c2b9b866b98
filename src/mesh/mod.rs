//! Client side of a room: a full mesh of direct connections, one data channel
//! plus camera (and optionally screen) channels per remote participant.

pub mod connection;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod wire;

use crate::{code::RoomCode, ids::SubjectId};

pub use connection::{Action, ChannelEvent, ConnState, Connection, Role};
pub use protocol::Mesh;
pub use state::{LocalSession, PeerConnection, Profile, SessionView};
pub use transport::{
    ChannelId, ChannelKind, ConnectMeta, MediaDevices, MediaStream, Transport, TransportError, TransportEvent,
};
pub use wire::Payload;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("room does not exist or has expired")]
    RoomNotFound,
    #[error("already in room {0}")]
    AlreadyJoined(RoomCode),
    #[error("not in a room")]
    NotJoined,
    #[error("no open data channel to {0}")]
    NotConnected(SubjectId),
    #[error("message is empty")]
    EmptyMessage,
    #[error("rendezvous: {0}")]
    Rendezvous(String),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("media device: {0}")]
    Device(String),
    #[error("payload: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<reqwest::Error> for MeshError {
    fn from(err: reqwest::Error) -> Self {
        MeshError::Rendezvous(err.to_string())
    }
}
