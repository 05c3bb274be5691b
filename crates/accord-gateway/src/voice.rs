//! Voice gateway payload codec.
//!
//! The voice gateway shares the `{op, d}` envelope with the main gateway
//! but has its own opcodes. Op 5 (`Speaking`) is used in both directions
//! with different shapes; inbound frames are told apart by probing for
//! `user_id`, which only the server-sent variant carries. Heartbeats
//! carry a nonce that the server echoes in op 6.

use serde::{Deserialize, Serialize};

use crate::protocol::{DecodeError, GatewayPayload};

/// Voice gateway opcodes.
pub mod opcode {
    /// Begin a voice session (send only).
    pub const IDENTIFY: u8 = 0;
    /// Select the UDP protocol (send only).
    pub const SELECT_PROTOCOL: u8 = 1;
    /// Handshake complete (receive only).
    pub const READY: u8 = 2;
    /// Keep the connection alive (send only).
    pub const HEARTBEAT: u8 = 3;
    /// Encryption mode and key (receive only).
    pub const SESSION_DESCRIPTION: u8 = 4;
    /// Speaking state (bidirectional).
    pub const SPEAKING: u8 = 5;
    /// Heartbeat acknowledged (receive only).
    pub const HEARTBEAT_ACK: u8 = 6;
    /// Resume a voice session (send only).
    pub const RESUME: u8 = 7;
    /// Heartbeat interval (receive only).
    pub const HELLO: u8 = 8;
    /// Resume complete (receive only).
    pub const RESUMED: u8 = 9;
    /// Users connected to the call (receive only).
    pub const CLIENTS_CONNECT: u8 = 11;
    /// A user connected, with SSRCs (receive only).
    pub const CLIENT_CONNECT: u8 = 12;
    /// A user disconnected (receive only).
    pub const CLIENT_DISCONNECT: u8 = 13;
}

/// Voice `Ready` data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceReady {
    /// Our SSRC.
    pub ssrc: u32,
    /// UDP server address.
    pub ip: String,
    /// UDP server port.
    pub port: u16,
    /// Supported encryption modes.
    pub modes: Vec<String>,
}

/// Voice `Hello` data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceHello {
    /// Heartbeat interval in milliseconds (may be fractional).
    pub heartbeat_interval: f64,
}

/// Session description data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Selected encryption mode.
    pub mode: String,
    /// Secret key for the mode.
    pub secret_key: Vec<u8>,
}

/// Client-shaped speaking payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaking {
    /// Speaking flags (1 microphone, 2 soundshare, 4 priority).
    pub speaking: u32,
    /// Delay in milliseconds (0 for bots).
    #[serde(default)]
    pub delay: u32,
    /// Our SSRC.
    pub ssrc: u32,
}

/// Server-sent speaking notification for another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpeaking {
    /// Speaking user.
    pub user_id: String,
    /// Their SSRC.
    pub ssrc: u32,
    /// Speaking flags.
    pub speaking: u32,
}

/// A decoded inbound voice frame.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    /// `op=2`.
    Ready(VoiceReady),
    /// `op=4`.
    SessionDescription(SessionDescription),
    /// `op=5` without `user_id`.
    Speaking(Speaking),
    /// `op=5` with `user_id`.
    UserSpeaking(UserSpeaking),
    /// `op=6` with the echoed nonce.
    HeartbeatAck {
        /// Nonce from the heartbeat being acknowledged.
        nonce: u64,
    },
    /// `op=8`.
    Hello(VoiceHello),
    /// `op=9`.
    Resumed,
    /// `op=11`.
    ClientsConnect {
        /// Users now in the call.
        user_ids: Vec<String>,
    },
    /// `op=12`.
    ClientConnect {
        /// Connected user.
        user_id: String,
        /// Their audio SSRC.
        audio_ssrc: u32,
    },
    /// `op=13`.
    ClientDisconnect {
        /// Disconnected user.
        user_id: String,
    },
}

#[derive(Deserialize)]
struct ClientsConnect {
    user_ids: Vec<String>,
}

#[derive(Deserialize)]
struct ClientConnect {
    user_id: String,
    #[serde(default)]
    audio_ssrc: u32,
}

#[derive(Deserialize)]
struct ClientDisconnect {
    user_id: String,
}

fn data<T: serde::de::DeserializeOwned>(op: u8, d: Option<serde_json::Value>) -> Result<T, DecodeError> {
    let d = d.ok_or(DecodeError::MissingField { op, field: "d" })?;
    serde_json::from_value(d).map_err(|e| DecodeError::InvalidData {
        op,
        reason: e.to_string(),
    })
}

/// Read the nonce from a heartbeat ack: a bare integer, or `{"t": n}`.
fn ack_nonce(op: u8, d: Option<&serde_json::Value>) -> Result<u64, DecodeError> {
    let d = d.ok_or(DecodeError::MissingField { op, field: "d" })?;
    d.as_u64()
        .or_else(|| d.get("t").and_then(serde_json::Value::as_u64))
        .ok_or_else(|| DecodeError::InvalidData {
            op,
            reason: format!("expected nonce, got {d}"),
        })
}

impl TryFrom<GatewayPayload> for VoiceEvent {
    type Error = DecodeError;

    fn try_from(payload: GatewayPayload) -> Result<Self, Self::Error> {
        let op = payload.op;
        match op {
            opcode::READY => Ok(Self::Ready(data(op, payload.d)?)),
            opcode::SESSION_DESCRIPTION => Ok(Self::SessionDescription(data(op, payload.d)?)),
            opcode::SPEAKING => {
                let has_user = payload
                    .d
                    .as_ref()
                    .is_some_and(|d| d.get("user_id").is_some());
                if has_user {
                    Ok(Self::UserSpeaking(data(op, payload.d)?))
                } else {
                    Ok(Self::Speaking(data(op, payload.d)?))
                }
            },
            opcode::HEARTBEAT_ACK => Ok(Self::HeartbeatAck {
                nonce: ack_nonce(op, payload.d.as_ref())?,
            }),
            opcode::HELLO => Ok(Self::Hello(data(op, payload.d)?)),
            opcode::RESUMED => Ok(Self::Resumed),
            opcode::CLIENTS_CONNECT => {
                let ClientsConnect { user_ids } = data(op, payload.d)?;
                Ok(Self::ClientsConnect { user_ids })
            },
            opcode::CLIENT_CONNECT => {
                let ClientConnect {
                    user_id,
                    audio_ssrc,
                } = data(op, payload.d)?;
                Ok(Self::ClientConnect {
                    user_id,
                    audio_ssrc,
                })
            },
            opcode::CLIENT_DISCONNECT => {
                let ClientDisconnect { user_id } = data(op, payload.d)?;
                Ok(Self::ClientDisconnect { user_id })
            },
            opcode::IDENTIFY | opcode::SELECT_PROTOCOL | opcode::HEARTBEAT | opcode::RESUME => {
                Err(DecodeError::UnexpectedOpcode(op))
            },
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

/// Decode one inbound voice frame.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the envelope is malformed, the opcode is
/// unknown or client-only, or `d` does not match the opcode.
pub fn decode_voice(bytes: &[u8]) -> Result<VoiceEvent, DecodeError> {
    GatewayPayload::from_slice(bytes)?.try_into()
}

/// Voice identify data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceIdentify {
    /// Guild ID.
    pub server_id: String,
    /// Bot user ID.
    pub user_id: String,
    /// Session ID from the main gateway's voice state update.
    pub session_id: String,
    /// Token from the voice server update.
    pub token: String,
}

/// Protocol selection data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectProtocol {
    /// Always `udp`.
    pub protocol: String,
    /// Discovered external address and chosen mode.
    pub data: SelectProtocolData,
}

/// External address discovered via IP discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectProtocolData {
    /// External IP.
    pub address: String,
    /// External port.
    pub port: u16,
    /// Encryption mode.
    pub mode: String,
}

/// Voice resume data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceResume {
    /// Guild ID.
    pub server_id: String,
    /// Voice session ID.
    pub session_id: String,
    /// Voice token.
    pub token: String,
}

/// An outbound voice frame.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceCommand {
    /// `op=0`.
    Identify(VoiceIdentify),
    /// `op=1`.
    SelectProtocol(SelectProtocol),
    /// `op=3` with a nonce the server echoes back.
    Heartbeat {
        /// Nonce.
        nonce: u64,
    },
    /// `op=5`.
    Speaking(Speaking),
    /// `op=7`.
    Resume(VoiceResume),
}

impl VoiceCommand {
    /// The opcode this command is sent with.
    #[must_use]
    pub fn op(&self) -> u8 {
        match self {
            Self::Identify(_) => opcode::IDENTIFY,
            Self::SelectProtocol(_) => opcode::SELECT_PROTOCOL,
            Self::Heartbeat { .. } => opcode::HEARTBEAT,
            Self::Speaking(_) => opcode::SPEAKING,
            Self::Resume(_) => opcode::RESUME,
        }
    }

    /// Encode as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the data fails to serialize.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let d = match self {
            Self::Identify(identify) => serde_json::to_value(identify)?,
            Self::SelectProtocol(select) => serde_json::to_value(select)?,
            Self::Heartbeat { nonce } => serde_json::Value::from(*nonce),
            Self::Speaking(speaking) => serde_json::to_value(speaking)?,
            Self::Resume(resume) => serde_json::to_value(resume)?,
        };
        serde_json::to_string(&GatewayPayload {
            op: self.op(),
            d: Some(d),
            s: None,
            t: None,
        })
    }
}
