//! Client/server messages
//!
//! Client messages are small and frequent, so they use the compact binary
//! move codec behind a one-byte tag. Server messages are JSON.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::codec::{self, CodecError, Reader};
use crate::sim::actor::{ActorKind, RespawnInfo};
use crate::sim::hitbox::HitboxId;
use crate::sim::prediction::{MoveAck, MoveInput};
use crate::sim::state::{EntityId, MatchEvent};

/// Errors that can occur while decoding a message
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("move codec: {0}")]
    Codec(#[from] CodecError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty message")]
    Empty,

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Messages sent by clients
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Move { entity: EntityId, input: MoveInput },
    /// Echo of a server ping
    Pong { sent_at: f32 },
}

mod tag {
    pub const MOVE: u8 = 1;
    pub const PONG: u8 = 2;
}

impl ClientMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ClientMessage::Move { entity, input } => {
                let mut out = Vec::with_capacity(5 + codec::encoded_len(input));
                out.push(tag::MOVE);
                out.extend_from_slice(&entity.0.to_le_bytes());
                codec::encode_move_into(input, &mut out);
                out
            }
            ClientMessage::Pong { sent_at } => {
                let mut out = Vec::with_capacity(5);
                out.push(tag::PONG);
                out.extend_from_slice(&sent_at.to_le_bytes());
                out
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, body) = data.split_first().ok_or(ProtocolError::Empty)?;
        match tag {
            tag::MOVE => {
                let mut r = Reader::new(body);
                let entity = r.u32().map_err(|_| truncated(body))?;
                let input = codec::decode_move(r.rest())?;
                Ok(ClientMessage::Move {
                    entity: EntityId(entity),
                    input,
                })
            }
            tag::PONG => {
                let mut r = Reader::new(body);
                let sent_at = r.f32("sent_at").map_err(|err| match err {
                    CodecError::Truncated { .. } => truncated(body),
                    other => other.into(),
                })?;
                if !r.rest().is_empty() {
                    return Err(CodecError::TrailingBytes(r.rest().len()).into());
                }
                Ok(ClientMessage::Pong { sent_at })
            }
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

/// Message body shorter than its leading 4-byte field
fn truncated(body: &[u8]) -> ProtocolError {
    ProtocolError::Truncated {
        expected: 4,
        actual: body.len(),
    }
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// `owned` is true only for the pawn of the receiving client
    Spawn {
        entity: EntityId,
        kind: ActorKind,
        position: Vec3,
        owned: bool,
    },
    Despawn {
        entity: EntityId,
    },
    HitboxAssigned {
        entity: EntityId,
        id: HitboxId,
    },
    Health {
        entity: EntityId,
        current: f32,
        max: f32,
        alive: bool,
    },
    Respawn {
        entity: EntityId,
        info: RespawnInfo,
    },
    Transform {
        entity: EntityId,
        position: Vec3,
        velocity: Vec3,
    },
    MoveAck {
        entity: EntityId,
        ack: MoveAck,
    },
    Match {
        event: MatchEvent,
    },
    Ping {
        sent_at: f32,
    },
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::hitbox::CollisionOutcome;
    use crate::sim::prediction::PendingBounce;

    #[test]
    fn test_move_message() {
        let msg = ClientMessage::Move {
            entity: EntityId(4),
            input: MoveInput {
                timestamp: 3.5,
                dt: 1.0 / 60.0,
                axis: 1.0,
                jump: false,
                bounce: Some(PendingBounce {
                    this_id: HitboxId(1),
                    other_id: HitboxId(2),
                    outcome: CollisionOutcome {
                        bounced_this: true,
                        ..Default::default()
                    },
                }),
            },
        };
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 1 + 4 + codec::MOVE_MAX_LEN);
        assert_eq!(ClientMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_pong_message() {
        let msg = ClientMessage::Pong { sent_at: 12.25 };
        assert_eq!(ClientMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_client_decode_errors() {
        assert!(matches!(ClientMessage::decode(&[]), Err(ProtocolError::Empty)));
        assert!(matches!(ClientMessage::decode(&[9, 0, 0]), Err(ProtocolError::UnknownTag(9))));
        assert!(matches!(
            ClientMessage::decode(&[tag::MOVE, 1, 0]),
            Err(ProtocolError::Truncated { .. })
        ));
        assert!(matches!(
            ClientMessage::decode(&[tag::MOVE, 1, 0, 0, 0, 0]),
            Err(ProtocolError::Codec(CodecError::Truncated { .. }))
        ));
        assert!(matches!(
            ClientMessage::decode(&[tag::PONG, 0, 0, 0, 0, 0]),
            Err(ProtocolError::Codec(CodecError::TrailingBytes(1)))
        ));
        assert!(matches!(
            ClientMessage::decode(&[tag::PONG, 0, 0]),
            Err(ProtocolError::Truncated { expected: 4, actual: 2 })
        ));
        let mut nan_pong = vec![tag::PONG];
        nan_pong.extend_from_slice(&f32::NAN.to_le_bytes());
        assert!(matches!(
            ClientMessage::decode(&nan_pong),
            Err(ProtocolError::Codec(CodecError::NonFinite("sent_at")))
        ));
    }

    #[test]
    fn test_server_message_json() {
        let msg = ServerMessage::Respawn {
            entity: EntityId(2),
            info: RespawnInfo {
                respawning: true,
                respawn_time: 4.0,
                location: Vec3::new(10.0, 0.0, 0.0),
            },
        };
        let bytes = msg.encode().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"type\":\"Respawn\""));
        assert_eq!(ServerMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_server_decode_rejects_garbage() {
        assert!(matches!(
            ServerMessage::decode(b"{\"type\":\"Nope\"}"),
            Err(ProtocolError::Json(_))
        ));
    }
}
