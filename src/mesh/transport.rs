//! The point-to-point transport the mesh is built on, seen only through its interface.

use serde::{Deserialize, Serialize};

use crate::ids::{PeerAddress, SubjectId};

use super::MeshError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Reliable ordered channel carrying handshakes and chat.
    #[serde(rename = "D")]
    Data,
    #[serde(rename = "C")]
    Camera,
    #[serde(rename = "S")]
    Screen,
}

impl ChannelKind {
    pub fn is_media(self) -> bool {
        !matches!(self, ChannelKind::Data)
    }
}

/// Transport handle of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

/// Opaque handle to a local or remote audio/video stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaStream(pub String);

/// Metadata an opener attaches to a connection attempt, delivered with it to the other side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectMeta {
    pub kind: ChannelKind,
    pub subject_id: SubjectId,
    pub peer_address: PeerAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Outbound half of the transport. Results of these calls arrive later as [`TransportEvent`]s.
pub trait Transport {
    /// Starts a reliable ordered data channel to `to`.
    fn connect(&mut self, to: &PeerAddress, meta: ConnectMeta) -> Result<ChannelId, TransportError>;

    /// Starts a media channel to `to`, sending `stream`.
    fn call(
        &mut self,
        to: &PeerAddress,
        stream: &MediaStream,
        meta: ConnectMeta,
    ) -> Result<ChannelId, TransportError>;

    /// Accepts an incoming media channel, optionally sending a stream back.
    fn answer(&mut self, channel: ChannelId, stream: Option<&MediaStream>) -> Result<(), TransportError>;

    fn send(&mut self, channel: ChannelId, data: Vec<u8>) -> Result<(), TransportError>;

    /// Must tolerate channels that are already closed.
    fn close(&mut self, channel: ChannelId);
}

/// Everything the transport reports back. Per channel: `Open`, any number of
/// `Data`/`Stream`, then exactly one of `Close` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Incoming {
        channel: ChannelId,
        from: PeerAddress,
        meta: ConnectMeta,
    },
    Open(ChannelId),
    Data(ChannelId, Vec<u8>),
    Stream(ChannelId, MediaStream),
    Close(ChannelId),
    Error(ChannelId, String),
}

/// Local capture devices. Acquisition can take a while (permission prompts) and can fail.
#[allow(async_fn_in_trait)]
pub trait MediaDevices {
    async fn camera(&mut self) -> Result<MediaStream, MeshError>;

    async fn screen(&mut self) -> Result<MediaStream, MeshError>;
}
