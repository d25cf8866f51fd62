//! Core protocol types for Warroom's wire format.
//!
//! Every message starts with a one-byte header from [`header`]. The single
//! exception is the [`Handshake`]: it is the first message an unapproved
//! peer sends, and the server reads it without a header because nothing
//! else is legal at that point.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ByteReader, ByteWriter, ProtocolError, WireDecode, WireEncode};

// ---------------------------------------------------------------------------
// Header tables
// ---------------------------------------------------------------------------

/// Top-level message headers.
pub mod header {
    /// Server → client: registry-targeted traffic (see [`super::state_header`]).
    pub const GAME_STATE: u8 = 2;
    /// Server → client: handshake accepted, carries the assigned slot.
    pub const CONNECTION_APPROVED: u8 = 4;
    /// Server → client: handshake refused, carries a denial code.
    pub const CONNECTION_DENIED: u8 = 5;
    /// Client → server: an action envelope.
    pub const ACTION_ROUTING: u8 = 6;
    /// Client → server: flow-control acknowledgment during resync.
    pub const MESSAGES_HANDLED: u8 = 7;
    /// Server → client: the match has started.
    pub const START_GAME: u8 = 8;
    /// Server → client: outcome of an action, keyed by correlation token.
    pub const ACTION_REPLY: u8 = 9;
    /// Server → client: content-hash check.
    pub const SYNC_CHECK: u8 = 10;
    /// Client → server: content-hash answer.
    pub const SYNC_CHECK_REPLY: u8 = 11;
}

/// Sub-headers that follow [`header::GAME_STATE`].
pub mod state_header {
    pub const INIT_RESYNC: u8 = 0;
    pub const AMEND_ENTITIES_MAP: u8 = 1;
    pub const ENTITY_UPDATE: u8 = 2;
    pub const END_RESYNC: u8 = 4;
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player slot on the server. Slot `n` plays faction `n`.
///
/// Newtype over `u8` so a slot is never confused with an entity id or a
/// kind id, which are small integers too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerSlot(pub u8);

impl PlayerSlot {
    /// The slot as a signed wire value, used wherever "no slot" is `-1`.
    pub fn as_i32(self) -> i32 {
        i32::from(self.0)
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// Which slot a connecting peer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotRequest {
    /// Any free slot (`0xFF` on the wire).
    Any,
    /// This slot specifically.
    Slot(PlayerSlot),
}

impl SlotRequest {
    const ANY: u8 = 0xFF;

    fn to_byte(self) -> u8 {
        match self {
            Self::Any => Self::ANY,
            Self::Slot(slot) => slot.0,
        }
    }

    fn from_byte(b: u8) -> Self {
        if b == Self::ANY {
            Self::Any
        } else {
            Self::Slot(PlayerSlot(b))
        }
    }
}

/// Caller-chosen identifier matching an action reply to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(pub i32);

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

/// Why the server refused a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DenialCode {
    WrongPassword = 1,
    /// Reserved: every slot is occupied. Sent as [`Self::SlotUnavailable`]
    /// by current servers, still decoded for older peers.
    NoSlots = 2,
    SlotUnavailable = 3,
    /// The peer's entity/action schema does not match ours.
    TypeMismatch = 4,
}

impl TryFrom<u8> for DenialCode {
    type Error = ProtocolError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            1 => Ok(Self::WrongPassword),
            2 => Ok(Self::NoSlots),
            3 => Ok(Self::SlotUnavailable),
            4 => Ok(Self::TypeMismatch),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown denial code {other}"
            ))),
        }
    }
}

impl fmt::Display for DenialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WrongPassword => "wrong password",
            Self::NoSlots => "no player slots",
            Self::SlotUnavailable => "slot unavailable",
            Self::TypeMismatch => "type identity mismatch",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// The first message of an unapproved peer.
///
/// Wire layout (no header byte): `type_hash: i32, secret_hash: i32,
/// desired_slot: u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// Combined hash of the peer's entity and action kind tables.
    pub type_hash: i32,
    /// Hash of the shared secret (password).
    pub secret_hash: i32,
    pub desired_slot: SlotRequest,
}

impl WireEncode for Handshake {
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        w.write_i32(self.type_hash);
        w.write_i32(self.secret_hash);
        w.write_u8(self.desired_slot.to_byte());
        Ok(())
    }
}

impl WireDecode for Handshake {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            type_hash: r.read_i32()?,
            secret_hash: r.read_i32()?,
            desired_slot: SlotRequest::from_byte(r.read_u8()?),
        })
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// One `AmendEntitiesMap` record of a resync announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindCapacity {
    pub kind_id: u8,
    pub capacity: i32,
}

/// Every message the server sends after (or in answer to) the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Approved { slot: PlayerSlot },
    Denied(DenialCode),
    StartGame,
    /// `InitResync`, one `AmendEntitiesMap` per kind, then `EndResync`
    /// followed by the registry's structural hash. Sent as one message.
    ResyncAnnouncement {
        capacities: Vec<KindCapacity>,
        structural_hash: i32,
    },
    /// The closing `EndResync`: every entity has been pushed.
    ResyncComplete,
    /// A registry-targeted update. The bytes start at the entity kind id
    /// and are interpreted by the replication channel.
    EntityUpdate(Vec<u8>),
    ActionReply {
        token: CorrelationToken,
        outcome: Result<(), String>,
    },
    SyncCheck,
}

impl ServerMessage {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approved { .. } => "approved",
            Self::Denied(_) => "denied",
            Self::StartGame => "start_game",
            Self::ResyncAnnouncement { .. } => "resync_announcement",
            Self::ResyncComplete => "resync_complete",
            Self::EntityUpdate(_) => "entity_update",
            Self::ActionReply { .. } => "action_reply",
            Self::SyncCheck => "sync_check",
        }
    }

    /// Whether this message counts toward resync flow control.
    ///
    /// Clients acknowledge every handled `GAME_STATE` message with
    /// `MessagesHandled`, so the server can gate resync batches.
    pub fn is_state_traffic(&self) -> bool {
        matches!(
            self,
            Self::ResyncAnnouncement { .. } | Self::ResyncComplete | Self::EntityUpdate(_)
        )
    }
}

impl WireEncode for ServerMessage {
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        match self {
            Self::Approved { slot } => {
                w.write_u8(header::CONNECTION_APPROVED);
                w.write_i32(slot.as_i32());
            }
            Self::Denied(code) => {
                w.write_u8(header::CONNECTION_DENIED);
                w.write_u8(*code as u8);
            }
            Self::StartGame => w.write_u8(header::START_GAME),
            Self::ResyncAnnouncement {
                capacities,
                structural_hash,
            } => {
                w.write_u8(header::GAME_STATE);
                w.write_u8(state_header::INIT_RESYNC);
                for entry in capacities {
                    w.write_u8(state_header::AMEND_ENTITIES_MAP);
                    w.write_u8(entry.kind_id);
                    w.write_i32(entry.capacity);
                }
                w.write_u8(state_header::END_RESYNC);
                w.write_i32(*structural_hash);
            }
            Self::ResyncComplete => {
                w.write_u8(header::GAME_STATE);
                w.write_u8(state_header::END_RESYNC);
            }
            Self::EntityUpdate(bytes) => {
                w.write_u8(header::GAME_STATE);
                w.write_u8(state_header::ENTITY_UPDATE);
                w.write_bytes(bytes);
            }
            Self::ActionReply { token, outcome } => {
                w.write_u8(header::ACTION_REPLY);
                w.write_i32(token.0);
                match outcome {
                    Ok(()) => w.write_bool(true),
                    Err(reason) => {
                        w.write_bool(false);
                        w.write_string(reason)?;
                    }
                }
            }
            Self::SyncCheck => w.write_u8(header::SYNC_CHECK),
        }
        Ok(())
    }
}

impl WireDecode for ServerMessage {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let h = r.read_u8()?;
        match h {
            header::CONNECTION_APPROVED => {
                let raw = r.read_i32()?;
                let slot = u8::try_from(raw).map_err(|_| {
                    ProtocolError::InvalidMessage(format!("assigned slot {raw} out of range"))
                })?;
                Ok(Self::Approved {
                    slot: PlayerSlot(slot),
                })
            }
            header::CONNECTION_DENIED => Ok(Self::Denied(DenialCode::try_from(r.read_u8()?)?)),
            header::START_GAME => Ok(Self::StartGame),
            header::GAME_STATE => decode_state(r),
            header::ACTION_REPLY => {
                let token = CorrelationToken(r.read_i32()?);
                let outcome = if r.read_bool()? {
                    Ok(())
                } else {
                    Err(r.read_string()?)
                };
                Ok(Self::ActionReply { token, outcome })
            }
            header::SYNC_CHECK => Ok(Self::SyncCheck),
            other => Err(ProtocolError::UnknownHeader {
                context: "server message",
                header: other,
            }),
        }
    }
}

fn decode_state(r: &mut ByteReader<'_>) -> Result<ServerMessage, ProtocolError> {
    match r.read_u8()? {
        state_header::INIT_RESYNC => {
            let mut capacities = Vec::new();
            loop {
                match r.read_u8()? {
                    state_header::AMEND_ENTITIES_MAP => capacities.push(KindCapacity {
                        kind_id: r.read_u8()?,
                        capacity: r.read_i32()?,
                    }),
                    state_header::END_RESYNC => {
                        return Ok(ServerMessage::ResyncAnnouncement {
                            capacities,
                            structural_hash: r.read_i32()?,
                        });
                    }
                    other => {
                        return Err(ProtocolError::UnknownHeader {
                            context: "resync announcement",
                            header: other,
                        });
                    }
                }
            }
        }
        state_header::END_RESYNC => Ok(ServerMessage::ResyncComplete),
        state_header::ENTITY_UPDATE => Ok(ServerMessage::EntityUpdate(r.read_rest().to_vec())),
        other => Err(ProtocolError::UnknownHeader {
            context: "state",
            header: other,
        }),
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Every message an approved client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// An action envelope. `payload` is the action's own encoding.
    Action {
        kind_id: u8,
        token: CorrelationToken,
        payload: Vec<u8>,
    },
    /// Number of state messages handled since the last acknowledgment.
    MessagesHandled { count: i32 },
    SyncCheckReply { content_hash: i32 },
}

impl WireEncode for ClientMessage {
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        match self {
            Self::Action {
                kind_id,
                token,
                payload,
            } => {
                w.write_u8(header::ACTION_ROUTING);
                w.write_u8(*kind_id);
                w.write_i32(token.0);
                w.write_bytes(payload);
            }
            Self::MessagesHandled { count } => {
                w.write_u8(header::MESSAGES_HANDLED);
                w.write_i32(*count);
            }
            Self::SyncCheckReply { content_hash } => {
                w.write_u8(header::SYNC_CHECK_REPLY);
                w.write_i32(*content_hash);
            }
        }
        Ok(())
    }
}

impl WireDecode for ClientMessage {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        match r.read_u8()? {
            header::ACTION_ROUTING => Ok(Self::Action {
                kind_id: r.read_u8()?,
                token: CorrelationToken(r.read_i32()?),
                payload: r.read_rest().to_vec(),
            }),
            header::MESSAGES_HANDLED => Ok(Self::MessagesHandled {
                count: r.read_i32()?,
            }),
            header::SYNC_CHECK_REPLY => Ok(Self::SyncCheckReply {
                content_hash: r.read_i32()?,
            }),
            other => Err(ProtocolError::UnknownHeader {
                context: "client message",
                header: other,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
