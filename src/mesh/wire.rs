//! JSON payloads exchanged over data channels.

use serde::{Deserialize, Serialize};

use crate::chat::MessageData;

use super::{state::Profile, MeshError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    /// Handshake: the sender's profile, sent once per data channel and direction.
    #[serde(rename = "CONN_INIT_DATA")]
    ConnInit(Profile),
    #[serde(rename = "MSG")]
    Msg(MessageData),
}

impl Payload {
    pub fn encode(&self) -> Result<Vec<u8>, MeshError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Payload, MeshError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        chat::{Author, Counterpart, Message},
        ids::{PeerAddress, SubjectId},
    };

    #[test]
    fn message_payload_shape() {
        let payload = Payload::Msg(MessageData {
            from: Counterpart::Group,
            message: Message {
                timestamp: 42,
                content: "hello".to_owned(),
                author: Author::Subject(SubjectId::new("google", 1)),
            },
        });
        let value: serde_json::Value = serde_json::from_slice(&payload.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "MSG",
                "data": {
                    "from": "#group",
                    "message": { "timestamp": 42, "content": "hello", "author": "google:1" }
                }
            })
        );
    }

    #[test]
    fn handshake_decodes() {
        let raw = json!({
            "type": "CONN_INIT_DATA",
            "data": {
                "subjectId": "github:7",
                "peerAddress": "peer-7",
                "name": "Grace",
                "email": "grace@example.com",
                "image": ""
            }
        });
        let Payload::ConnInit(profile) = Payload::decode(raw.to_string().as_bytes()).unwrap() else {
            panic!("expected a handshake");
        };
        assert_eq!(profile.subject_id, SubjectId::new("github", 7));
        assert_eq!(profile.peer_address, PeerAddress::new("peer-7"));
        assert_eq!(profile.camera_stream, None);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Payload::decode(br#"{"type":"PING","data":null}"#).is_err());
        assert!(Payload::decode(b"not json").is_err());
    }
}
