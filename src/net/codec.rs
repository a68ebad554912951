//! Compact binary codec for client moves
//!
//! Layout (little endian):
//!
//! | bytes | field |
//! |---|---|
//! | 1 | flags |
//! | 4 | timestamp (`f32`) |
//! | 4 | dt (`f32`) |
//! | 4 | walk axis (`f32`) |
//! | 0/4 | this hitbox id (`i32`), if flagged |
//! | 0/4 | other hitbox id (`i32`), if flagged |
//!
//! Only [`HitboxId::INVALID`] is left out; every other id, negative or not,
//! is written so decoding gives back the same value. Missing ids decode as
//! [`HitboxId::INVALID`].

use thiserror::Error;

use crate::sim::hitbox::{CollisionOutcome, HitboxId};
use crate::sim::prediction::{MoveInput, PendingBounce};

/// Bit flags of the first byte
pub mod flags {
    pub const HAS_BOUNCE: u8 = 1 << 0;
    pub const THIS_ID: u8 = 1 << 1;
    pub const OTHER_ID: u8 = 1 << 2;
    pub const BOUNCED_THIS: u8 = 1 << 3;
    pub const BOUNCED_OTHER: u8 = 1 << 4;
    pub const DAMAGED_THIS: u8 = 1 << 5;
    pub const DAMAGED_OTHER: u8 = 1 << 6;
    pub const JUMP: u8 = 1 << 7;

    /// Flags only meaningful together with `HAS_BOUNCE`
    pub const BOUNCE_ONLY: u8 =
        THIS_ID | OTHER_ID | BOUNCED_THIS | BOUNCED_OTHER | DAMAGED_THIS | DAMAGED_OTHER;
}

/// Fixed part of a move payload
pub const MOVE_HEADER_LEN: usize = 13;
/// Largest move payload (both ids present)
pub const MOVE_MAX_LEN: usize = MOVE_HEADER_LEN + 8;

/// Errors that can occur while decoding a move
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("move payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("move payload has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("bounce fields set without a bounce (flags {0:#010b})")]
    BounceFieldsWithoutBounce(u8),

    #[error("non-finite {0} in move payload")]
    NonFinite(&'static str),
}

/// Whether an id needs its own field on the wire
fn has_id(id: HitboxId) -> bool {
    id != HitboxId::INVALID
}

/// Encoded size of a move
pub fn encoded_len(input: &MoveInput) -> usize {
    let mut len = MOVE_HEADER_LEN;
    if let Some(b) = &input.bounce {
        if has_id(b.this_id) {
            len += 4;
        }
        if has_id(b.other_id) {
            len += 4;
        }
    }
    len
}

fn pack_flags(input: &MoveInput) -> u8 {
    let mut bits = 0;
    if input.jump {
        bits |= flags::JUMP;
    }
    if let Some(b) = &input.bounce {
        bits |= flags::HAS_BOUNCE;
        if has_id(b.this_id) {
            bits |= flags::THIS_ID;
        }
        if has_id(b.other_id) {
            bits |= flags::OTHER_ID;
        }
        let o = b.outcome;
        if o.bounced_this {
            bits |= flags::BOUNCED_THIS;
        }
        if o.bounced_other {
            bits |= flags::BOUNCED_OTHER;
        }
        if o.damaged_this {
            bits |= flags::DAMAGED_THIS;
        }
        if o.damaged_other {
            bits |= flags::DAMAGED_OTHER;
        }
    }
    bits
}

/// Append the encoded move to `out`
pub fn encode_move_into(input: &MoveInput, out: &mut Vec<u8>) {
    out.reserve(encoded_len(input));
    out.push(pack_flags(input));
    out.extend_from_slice(&input.timestamp.to_le_bytes());
    out.extend_from_slice(&input.dt.to_le_bytes());
    out.extend_from_slice(&input.axis.to_le_bytes());
    if let Some(b) = &input.bounce {
        if has_id(b.this_id) {
            out.extend_from_slice(&b.this_id.0.to_le_bytes());
        }
        if has_id(b.other_id) {
            out.extend_from_slice(&b.other_id.0.to_le_bytes());
        }
    }
}

pub fn encode_move(input: &MoveInput) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(input));
    encode_move_into(input, &mut out);
    out
}

/// Little-endian reader over a byte slice, shared with message framing
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Next four bytes
    fn take4(&mut self) -> Result<[u8; 4], CodecError> {
        let end = self.pos + 4;
        let bytes: [u8; 4] = self
            .data
            .get(self.pos..end)
            .and_then(|b| b.try_into().ok())
            .ok_or(CodecError::Truncated {
                expected: end,
                actual: self.data.len(),
            })?;
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take4()?))
    }

    pub(crate) fn f32(&mut self, name: &'static str) -> Result<f32, CodecError> {
        let v = f32::from_le_bytes(self.take4()?);
        if !v.is_finite() {
            return Err(CodecError::NonFinite(name));
        }
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take4()?))
    }

    /// Bytes not yet read
    pub(crate) fn rest(&self) -> &'a [u8] {
        let data = self.data;
        &data[self.pos.min(data.len())..]
    }
}

/// Decode a move. The payload must be exactly one move.
pub fn decode_move(data: &[u8]) -> Result<MoveInput, CodecError> {
    let Some(&bits) = data.first() else {
        return Err(CodecError::Truncated {
            expected: MOVE_HEADER_LEN,
            actual: 0,
        });
    };
    let has_bounce = bits & flags::HAS_BOUNCE != 0;
    if !has_bounce && bits & flags::BOUNCE_ONLY != 0 {
        return Err(CodecError::BounceFieldsWithoutBounce(bits));
    }

    let mut expected = MOVE_HEADER_LEN;
    if bits & flags::THIS_ID != 0 {
        expected += 4;
    }
    if bits & flags::OTHER_ID != 0 {
        expected += 4;
    }
    if data.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    if data.len() > expected {
        return Err(CodecError::TrailingBytes(data.len() - expected));
    }

    let mut r = Reader::new(&data[1..]);
    let timestamp = r.f32("timestamp")?;
    let dt = r.f32("dt")?;
    let axis = r.f32("axis")?;

    let bounce = if has_bounce {
        let this_id = if bits & flags::THIS_ID != 0 {
            HitboxId(r.i32()?)
        } else {
            HitboxId::INVALID
        };
        let other_id = if bits & flags::OTHER_ID != 0 {
            HitboxId(r.i32()?)
        } else {
            HitboxId::INVALID
        };
        Some(PendingBounce {
            this_id,
            other_id,
            outcome: CollisionOutcome {
                bounced_this: bits & flags::BOUNCED_THIS != 0,
                bounced_other: bits & flags::BOUNCED_OTHER != 0,
                damaged_this: bits & flags::DAMAGED_THIS != 0,
                damaged_other: bits & flags::DAMAGED_OTHER != 0,
            },
        })
    } else {
        None
    };

    Ok(MoveInput {
        timestamp,
        dt,
        axis,
        jump: bits & flags::JUMP != 0,
        bounce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stomp() -> MoveInput {
        MoveInput {
            timestamp: 1.25,
            dt: 1.0 / 60.0,
            axis: -0.5,
            jump: true,
            bounce: Some(PendingBounce {
                this_id: HitboxId(3),
                other_id: HitboxId(7),
                outcome: CollisionOutcome {
                    bounced_this: true,
                    damaged_other: true,
                    ..Default::default()
                },
            }),
        }
    }

    #[test]
    fn test_plain_move_is_header_only() {
        let mv = MoveInput {
            timestamp: 0.5,
            dt: 0.016,
            axis: 1.0,
            ..Default::default()
        };
        let bytes = encode_move(&mv);
        assert_eq!(bytes.len(), MOVE_HEADER_LEN);
        assert_eq!(bytes[0], 0);
        assert_eq!(decode_move(&bytes), Ok(mv));
    }

    #[test]
    fn test_bounce_layout() {
        let bytes = encode_move(&stomp());
        assert_eq!(bytes.len(), MOVE_MAX_LEN);
        assert_eq!(
            bytes[0],
            flags::HAS_BOUNCE
                | flags::THIS_ID
                | flags::OTHER_ID
                | flags::BOUNCED_THIS
                | flags::DAMAGED_OTHER
                | flags::JUMP
        );
        assert_eq!(&bytes[13..17], &3i32.to_le_bytes());
        assert_eq!(&bytes[17..21], &7i32.to_le_bytes());
    }

    #[test]
    fn test_invalid_ids_are_omitted() {
        let mut mv = stomp();
        if let Some(b) = mv.bounce.as_mut() {
            b.this_id = HitboxId::INVALID;
        }
        let bytes = encode_move(&mv);
        assert_eq!(bytes.len(), MOVE_HEADER_LEN + 4);
        assert_eq!(bytes[0] & flags::THIS_ID, 0);
        assert_eq!(decode_move(&bytes), Ok(mv));
    }

    #[test]
    fn test_negative_ids_survive_round_trip() {
        let mut mv = stomp();
        if let Some(b) = mv.bounce.as_mut() {
            b.this_id = HitboxId(-7);
            b.other_id = HitboxId(i32::MIN);
        }
        let bytes = encode_move(&mv);
        assert_eq!(bytes.len(), MOVE_MAX_LEN);
        assert_eq!(decode_move(&bytes), Ok(mv));
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut r = Reader::new(&[1, 0, 0, 0, 9]);
        assert_eq!(r.u32(), Ok(1));
        assert_eq!(r.rest(), &[9]);
        assert_eq!(
            r.u32(),
            Err(CodecError::Truncated {
                expected: 8,
                actual: 5
            })
        );
    }

    #[test]
    fn test_rejects_truncated() {
        let bytes = encode_move(&stomp());
        for cut in 0..bytes.len() {
            assert!(matches!(
                decode_move(&bytes[..cut]),
                Err(CodecError::Truncated { .. })
            ));
        }
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode_move(&MoveInput::default());
        bytes.push(0);
        assert_eq!(decode_move(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_rejects_ids_without_bounce() {
        let mut bytes = encode_move(&MoveInput::default());
        bytes[0] = flags::THIS_ID;
        bytes.extend_from_slice(&1i32.to_le_bytes());
        assert_eq!(
            decode_move(&bytes),
            Err(CodecError::BounceFieldsWithoutBounce(flags::THIS_ID))
        );
    }

    #[test]
    fn test_rejects_nan() {
        let mut bytes = encode_move(&MoveInput::default());
        bytes[5..9].copy_from_slice(&f32::NAN.to_le_bytes());
        assert_eq!(decode_move(&bytes), Err(CodecError::NonFinite("dt")));
    }

    proptest! {
        #[test]
        fn test_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..32)) {
            let _ = decode_move(&data);
        }

        #[test]
        fn test_encoded_len_matches(
            this in any::<i32>(),
            other in any::<i32>(),
            bits in any::<u8>(),
            with_bounce in any::<bool>(),
        ) {
            let mv = MoveInput {
                timestamp: 2.0,
                dt: 0.01,
                axis: 0.0,
                jump: bits & 1 != 0,
                bounce: with_bounce.then_some(PendingBounce {
                    this_id: HitboxId(this),
                    other_id: HitboxId(other),
                    outcome: CollisionOutcome {
                        bounced_this: bits & 2 != 0,
                        bounced_other: bits & 4 != 0,
                        damaged_this: bits & 8 != 0,
                        damaged_other: bits & 16 != 0,
                    },
                }),
            };
            let bytes = encode_move(&mv);
            prop_assert_eq!(bytes.len(), encoded_len(&mv));
            prop_assert!(bytes.len() >= MOVE_HEADER_LEN && bytes.len() <= MOVE_MAX_LEN);
            let decoded = decode_move(&bytes);
            prop_assert_eq!(decoded, Ok(mv));
        }
    }
}
