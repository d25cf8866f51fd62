//! Wire protocol for Warroom.
//!
//! This crate defines the bytes that travel between the authoritative
//! server and each client replica:
//!
//! - **Codec** ([`ByteWriter`], [`ByteReader`], [`WireEncode`],
//!   [`WireDecode`]): a compact little-endian binary encoding. Every
//!   multi-byte integer is little-endian, strings are a `u16` byte length
//!   followed by UTF-8.
//! - **Types** ([`ServerMessage`], [`ClientMessage`], [`Handshake`], …):
//!   the typed messages and their one-byte headers.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and everything
//! above it. It knows nothing about entities or players; entity payloads
//! are carried as opaque byte strings and interpreted by `warroom-world`.
//!
//! ```text
//! Transport (frames) → Protocol (ServerMessage / ClientMessage) → World / Session
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{ByteReader, ByteWriter, WireDecode, WireEncode};
pub use error::ProtocolError;
pub use types::{
    header, state_header, ClientMessage, CorrelationToken, DenialCode,
    Handshake, KindCapacity, PlayerSlot, ServerMessage, SlotRequest,
};
