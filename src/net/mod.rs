//! Networking: wire formats, an in-process transport and session glue
//!
//! The simulation never touches bytes; sessions translate between
//! [`crate::sim::WorldState`] calls and messages on a [`link::Connection`].

pub mod codec;
pub mod link;
pub mod protocol;
pub mod session;

pub use codec::{CodecError, decode_move, encode_move};
pub use link::{Connection, LinkRx, LinkTx, latency_link, link_pair};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use session::{ClientSession, ServerSession};
