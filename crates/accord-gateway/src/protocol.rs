//! Discord Gateway protocol types, opcodes and the payload codec.
//!
//! Every frame is an envelope `{op, d, s, t}`. Inbound frames decode into
//! the closed [`GatewayEvent`] enum, dispatching on `op` and, for
//! dispatches, on `t`. Outbound frames are built from [`GatewayCommand`].
//! Dispatch payloads other than `READY` and `RESUMED` stay opaque
//! `serde_json::Value`s.

use serde::{Deserialize, Serialize};

use crate::intents::Intents;

// ── Opcodes ──────────────────────────────────────────────────

/// Discord Gateway opcodes.
pub mod opcode {
    /// Event dispatch (receive only).
    pub const DISPATCH: u8 = 0;
    /// Heartbeat (bidirectional).
    pub const HEARTBEAT: u8 = 1;
    /// Identify (send only).
    pub const IDENTIFY: u8 = 2;
    /// Presence update (send only).
    pub const PRESENCE_UPDATE: u8 = 3;
    /// Voice state update (send only).
    pub const VOICE_STATE_UPDATE: u8 = 4;
    /// Resume (send only).
    pub const RESUME: u8 = 6;
    /// Server requests reconnect (receive only).
    pub const RECONNECT: u8 = 7;
    /// Request guild members (send only).
    pub const REQUEST_GUILD_MEMBERS: u8 = 8;
    /// Invalid session (receive only).
    pub const INVALID_SESSION: u8 = 9;
    /// Hello, carries the heartbeat interval (receive only).
    pub const HELLO: u8 = 10;
    /// Heartbeat ACK (receive only).
    pub const HEARTBEAT_ACK: u8 = 11;
}

// ── Errors ───────────────────────────────────────────────────

/// Errors decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not a JSON envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Opcode not defined by the protocol.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// Opcode the server never sends.
    #[error("opcode {0} is not sent by the server")]
    UnexpectedOpcode(u8),

    /// A required envelope field is absent.
    #[error("opcode {op} is missing field `{field}`")]
    MissingField {
        /// Opcode of the frame.
        op: u8,
        /// Name of the missing field.
        field: &'static str,
    },

    /// `d` does not have the shape the opcode requires.
    #[error("invalid data for opcode {op}: {reason}")]
    InvalidData {
        /// Opcode of the frame.
        op: u8,
        /// What was wrong.
        reason: String,
    },
}

impl DecodeError {
    fn invalid(op: u8, err: &serde_json::Error) -> Self {
        Self::InvalidData {
            op,
            reason: err.to_string(),
        }
    }
}

// ── Wire Types ───────────────────────────────────────────────

/// Raw payload envelope as sent over the `WebSocket`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Opcode.
    pub op: u8,
    /// Event data (opcode-dependent). Serialized as `null` when absent.
    #[serde(default)]
    pub d: Option<serde_json::Value>,
    /// Sequence number (dispatch only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event name (dispatch only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    /// Parse an envelope without interpreting `d`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if the bytes are not an envelope.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn data<T: serde::de::DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let data = self.d.clone().ok_or(DecodeError::MissingField {
            op: self.op,
            field: "d",
        })?;
        serde_json::from_value(data).map_err(|e| DecodeError::invalid(self.op, &e))
    }
}

/// Hello payload (`op=10`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

/// Ready event data (`t="READY"`).
///
/// Fields the shard does not use are kept in `extra` so the event can be
/// handed downstream intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ready {
    /// Session ID for resuming.
    pub session_id: String,
    /// Preferred resume gateway URL.
    pub resume_gateway_url: String,
    /// The bot user object.
    pub user: ReadyUser,
    /// Shard pair this session serves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// User object from the READY event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyUser {
    /// The bot's user ID.
    pub id: String,
    /// Everything else.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Response from `GET /gateway/bot`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayBotResponse {
    /// Gateway `WebSocket` URL.
    pub url: String,
    /// Recommended shard count.
    #[serde(default)]
    pub shards: Option<u32>,
}

// ── Inbound Events ───────────────────────────────────────────

/// A decoded inbound gateway frame.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// `op=0`: a named event with a sequence number.
    Dispatch {
        /// Sequence number.
        sequence: u64,
        /// The event.
        event: DispatchEvent,
    },
    /// `op=1`: the server asks for an immediate heartbeat.
    Heartbeat,
    /// `op=7`: reconnect and resume.
    Reconnect,
    /// `op=9`: the session is invalid.
    InvalidSession {
        /// Whether the session may be resumed.
        resumable: bool,
    },
    /// `op=10`: first frame after connecting.
    Hello(Hello),
    /// `op=11`: heartbeat acknowledged.
    HeartbeatAck,
}

/// The payload of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// `READY`: a new session was established.
    Ready(Box<Ready>),
    /// `RESUMED`: a resume completed.
    Resumed,
    /// Any other event, left opaque.
    Other {
        /// Event name.
        name: String,
        /// Event data.
        data: serde_json::Value,
    },
}

impl DispatchEvent {
    /// The event name as sent in `t`.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(_) => "READY",
            Self::Resumed => "RESUMED",
            Self::Other { name, .. } => name,
        }
    }

    /// Split into name and raw data.
    #[must_use]
    pub fn into_parts(self) -> (String, serde_json::Value) {
        match self {
            Self::Ready(ready) => (
                "READY".to_owned(),
                serde_json::to_value(*ready).unwrap_or(serde_json::Value::Null),
            ),
            Self::Resumed => ("RESUMED".to_owned(), serde_json::Value::Null),
            Self::Other { name, data } => (name, data),
        }
    }
}

impl TryFrom<GatewayPayload> for GatewayEvent {
    type Error = DecodeError;

    fn try_from(payload: GatewayPayload) -> Result<Self, Self::Error> {
        match payload.op {
            opcode::DISPATCH => {
                let sequence = payload.s.ok_or(DecodeError::MissingField {
                    op: payload.op,
                    field: "s",
                })?;
                let name = payload.t.clone().ok_or(DecodeError::MissingField {
                    op: payload.op,
                    field: "t",
                })?;
                let event = match name.as_str() {
                    "READY" => DispatchEvent::Ready(Box::new(payload.data()?)),
                    "RESUMED" => DispatchEvent::Resumed,
                    _ => DispatchEvent::Other {
                        name,
                        data: payload.d.unwrap_or(serde_json::Value::Null),
                    },
                };
                Ok(Self::Dispatch { sequence, event })
            },
            opcode::HEARTBEAT => Ok(Self::Heartbeat),
            opcode::RECONNECT => Ok(Self::Reconnect),
            opcode::INVALID_SESSION => {
                let resumable = match payload.d {
                    Some(serde_json::Value::Bool(b)) => b,
                    None | Some(serde_json::Value::Null) => false,
                    Some(other) => {
                        return Err(DecodeError::InvalidData {
                            op: payload.op,
                            reason: format!("expected boolean, got {other}"),
                        });
                    },
                };
                Ok(Self::InvalidSession { resumable })
            },
            opcode::HELLO => Ok(Self::Hello(payload.data()?)),
            opcode::HEARTBEAT_ACK => Ok(Self::HeartbeatAck),
            opcode::IDENTIFY
            | opcode::PRESENCE_UPDATE
            | opcode::VOICE_STATE_UPDATE
            | opcode::RESUME
            | opcode::REQUEST_GUILD_MEMBERS => Err(DecodeError::UnexpectedOpcode(payload.op)),
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

/// Decode one inbound frame.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the envelope is malformed, the opcode is
/// unknown or client-only, or `d` does not match the opcode.
pub fn decode(bytes: &[u8]) -> Result<GatewayEvent, DecodeError> {
    GatewayPayload::from_slice(bytes)?.try_into()
}

// ── Outbound Commands ────────────────────────────────────────

/// Client properties sent in Identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    /// Operating system.
    pub os: String,
    /// Library name.
    pub browser: String,
    /// Library name.
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            browser: "accord".to_owned(),
            device: "accord".to_owned(),
        }
    }
}

/// Identify payload (`op=2`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identify {
    /// Bot token.
    pub token: String,
    /// Requested intents.
    pub intents: Intents,
    /// Client properties.
    pub properties: ConnectionProperties,
    /// `[shard_id, shard_count]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
    /// Member count above which offline members are not sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u8>,
    /// Initial presence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceUpdate>,
}

/// Resume payload (`op=6`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resume {
    /// Bot token.
    pub token: String,
    /// Session to resume.
    pub session_id: String,
    /// Last sequence number received.
    pub seq: u64,
}

/// An activity in a presence update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity name.
    pub name: String,
    /// Activity type (0 playing, 1 streaming, 2 listening, 3 watching,
    /// 4 custom, 5 competing).
    #[serde(rename = "type")]
    pub kind: u8,
    /// Stream URL (streaming only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Presence update payload (`op=3`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// Unix time in milliseconds since idle, or `None`.
    pub since: Option<u64>,
    /// Activities.
    pub activities: Vec<Activity>,
    /// `online`, `dnd`, `idle`, `invisible` or `offline`.
    pub status: String,
    /// Whether the client is AFK.
    pub afk: bool,
}

/// Voice state update payload (`op=4`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    /// Guild ID.
    pub guild_id: String,
    /// Channel to join, `None` to leave. Serialized as `null`.
    pub channel_id: Option<String>,
    /// Self-mute.
    pub self_mute: bool,
    /// Self-deafen.
    pub self_deaf: bool,
}

/// Request guild members payload (`op=8`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestGuildMembers {
    /// Guild ID.
    pub guild_id: String,
    /// Username prefix, `""` for all members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Maximum members to return, 0 for no limit.
    pub limit: u32,
    /// Include presences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presences: Option<bool>,
    /// Specific users to fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,
    /// Nonce echoed in the chunk events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// An outbound gateway frame.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCommand {
    /// `op=1` with the last sequence number.
    Heartbeat {
        /// Last sequence number, `None` before the first dispatch.
        sequence: Option<u64>,
    },
    /// `op=2`.
    Identify(Box<Identify>),
    /// `op=6`.
    Resume(Resume),
    /// `op=3`.
    PresenceUpdate(PresenceUpdate),
    /// `op=4`.
    VoiceStateUpdate(VoiceStateUpdate),
    /// `op=8`.
    RequestGuildMembers(RequestGuildMembers),
}

impl GatewayCommand {
    /// The opcode this command is sent with.
    #[must_use]
    pub fn op(&self) -> u8 {
        match self {
            Self::Heartbeat { .. } => opcode::HEARTBEAT,
            Self::Identify(_) => opcode::IDENTIFY,
            Self::Resume(_) => opcode::RESUME,
            Self::PresenceUpdate(_) => opcode::PRESENCE_UPDATE,
            Self::VoiceStateUpdate(_) => opcode::VOICE_STATE_UPDATE,
            Self::RequestGuildMembers(_) => opcode::REQUEST_GUILD_MEMBERS,
        }
    }

    /// Whether the shard manages this command itself.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat { .. } | Self::Identify(_) | Self::Resume(_)
        )
    }

    /// Build the wire envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the data fails to serialize.
    pub fn to_payload(&self) -> Result<GatewayPayload, serde_json::Error> {
        let d = match self {
            Self::Heartbeat { sequence } => sequence.map(serde_json::Value::from),
            Self::Identify(identify) => Some(serde_json::to_value(identify)?),
            Self::Resume(resume) => Some(serde_json::to_value(resume)?),
            Self::PresenceUpdate(presence) => Some(serde_json::to_value(presence)?),
            Self::VoiceStateUpdate(voice) => Some(serde_json::to_value(voice)?),
            Self::RequestGuildMembers(request) => Some(serde_json::to_value(request)?),
        };
        Ok(GatewayPayload {
            op: self.op(),
            d,
            s: None,
            t: None,
        })
    }

    /// Encode as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the data fails to serialize.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_payload()?)
    }
}

// ── Resume URL validation ────────────────────────────────────

/// Allowed resume gateway URL domains.
const ALLOWED_RESUME_DOMAINS: &[&str] = &["discord.gg"];

/// Validate that a resume gateway URL is a `wss://` URL on an allowed
/// domain.
#[must_use]
pub fn is_valid_resume_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("wss://") else {
        return false;
    };
    let host = rest
        .split(['/', '?'])
        .next()
        .and_then(|authority| authority.split(':').next())
        .unwrap_or_default();
    ALLOWED_RESUME_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// Append the protocol query (`v=10`, JSON encoding) unless one is set.
#[must_use]
pub fn with_gateway_query(url: &str) -> String {
    if url.contains('?') {
        return url.to_owned();
    }
    format!("{}/?v=10&encoding=json", url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Envelope ──

    #[test]
    fn envelope_minimal() {
        let payload =
            GatewayPayload::from_slice(br#"{"op":10,"d":{"heartbeat_interval":41250}}"#).unwrap();
        assert_eq!(payload.op, opcode::HELLO);
        assert!(payload.s.is_none());
        assert!(payload.t.is_none());
    }

    #[test]
    fn envelope_serializes_null_data_but_skips_s_and_t() {
        let json = GatewayCommand::Heartbeat { sequence: None }.encode().unwrap();
        assert_eq!(json, r#"{"op":1,"d":null}"#);
    }

    // ── Decode ──

    #[test]
    fn decode_hello() {
        let event = decode(br#"{"op":10,"d":{"heartbeat_interval":45000}}"#).unwrap();
        assert_eq!(
            event,
            GatewayEvent::Hello(Hello {
                heartbeat_interval: 45000
            })
        );
    }

    #[test]
    fn decode_ready_keeps_extra_fields() {
        let event = decode(
            br#"{"op":0,"s":1,"t":"READY","d":{
                "v":10,
                "session_id":"abc",
                "resume_gateway_url":"wss://gateway-us-east1-b.discord.gg",
                "user":{"id":"42","username":"bot"},
                "guilds":[],
                "shard":[0,1]
            }}"#,
        )
        .unwrap();
        let GatewayEvent::Dispatch { sequence, event } = event else {
            panic!("expected dispatch");
        };
        assert_eq!(sequence, 1);
        let DispatchEvent::Ready(ready) = &event else {
            panic!("expected READY");
        };
        assert_eq!(ready.session_id, "abc");
        assert_eq!(ready.user.id, "42");
        assert_eq!(ready.shard, Some([0, 1]));

        let (name, data) = event.into_parts();
        assert_eq!(name, "READY");
        assert_eq!(data["v"], 10);
        assert_eq!(data["user"]["username"], "bot");
    }

    #[test]
    fn decode_other_dispatch_is_opaque() {
        let event =
            decode(br#"{"op":0,"s":7,"t":"MESSAGE_CREATE","d":{"content":"hi"}}"#).unwrap();
        let GatewayEvent::Dispatch { sequence, event } = event else {
            panic!("expected dispatch");
        };
        assert_eq!(sequence, 7);
        assert_eq!(event.name(), "MESSAGE_CREATE");
        let (_, data) = event.into_parts();
        assert_eq!(data["content"], "hi");
    }

    #[test]
    fn decode_resumed() {
        let event = decode(br#"{"op":0,"s":11,"t":"RESUMED","d":{}}"#).unwrap();
        assert_eq!(
            event,
            GatewayEvent::Dispatch {
                sequence: 11,
                event: DispatchEvent::Resumed
            }
        );
    }

    #[test]
    fn decode_control_opcodes() {
        assert_eq!(decode(br#"{"op":1,"d":null}"#).unwrap(), GatewayEvent::Heartbeat);
        assert_eq!(decode(br#"{"op":7,"d":null}"#).unwrap(), GatewayEvent::Reconnect);
        assert_eq!(decode(br#"{"op":11}"#).unwrap(), GatewayEvent::HeartbeatAck);
        assert_eq!(
            decode(br#"{"op":9,"d":true}"#).unwrap(),
            GatewayEvent::InvalidSession { resumable: true }
        );
        assert_eq!(
            decode(br#"{"op":9,"d":false}"#).unwrap(),
            GatewayEvent::InvalidSession { resumable: false }
        );
    }

    #[test]
    fn decode_errors() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(br#"{"op":42}"#),
            Err(DecodeError::UnknownOpcode(42))
        ));
        assert!(matches!(
            decode(br#"{"op":2,"d":{}}"#),
            Err(DecodeError::UnexpectedOpcode(2))
        ));
        assert!(matches!(
            decode(br#"{"op":10,"d":{"heartbeat_interval":"soon"}}"#),
            Err(DecodeError::InvalidData { op: 10, .. })
        ));
        assert!(matches!(
            decode(br#"{"op":10}"#),
            Err(DecodeError::MissingField { op: 10, field: "d" })
        ));
        assert!(matches!(
            decode(br#"{"op":0,"t":"MESSAGE_CREATE","d":{}}"#),
            Err(DecodeError::MissingField { field: "s", .. })
        ));
        assert!(matches!(
            decode(br#"{"op":9,"d":"yes"}"#),
            Err(DecodeError::InvalidData { op: 9, .. })
        ));
        assert!(matches!(
            decode(br#"{"op":0,"s":1,"t":"READY","d":{"session_id":"x"}}"#),
            Err(DecodeError::InvalidData { op: 0, .. })
        ));
    }

    // ── Encode ──

    #[test]
    fn encode_identify() {
        let command = GatewayCommand::Identify(Box::new(Identify {
            token: "Bot testtoken".into(),
            intents: Intents::from_bits(37377),
            properties: ConnectionProperties::default(),
            shard: Some([1, 4]),
            large_threshold: Some(100),
            presence: None,
        }));
        let payload = command.to_payload().unwrap();
        assert_eq!(payload.op, opcode::IDENTIFY);
        let d = payload.d.unwrap();
        assert_eq!(d["token"], "Bot testtoken");
        assert_eq!(d["intents"], 37377);
        assert_eq!(d["shard"], serde_json::json!([1, 4]));
        assert_eq!(d["properties"]["browser"], "accord");
        assert!(d.get("presence").is_none());
    }

    #[test]
    fn encode_resume() {
        let command = GatewayCommand::Resume(Resume {
            token: "tok".into(),
            session_id: "sess-123".into(),
            seq: 42,
        });
        let json: serde_json::Value = serde_json::from_str(&command.encode().unwrap()).unwrap();
        assert_eq!(json["op"], 6);
        assert_eq!(json["d"]["session_id"], "sess-123");
        assert_eq!(json["d"]["seq"], 42);
    }

    #[test]
    fn encode_heartbeat_with_sequence() {
        let json = GatewayCommand::Heartbeat { sequence: Some(99) }
            .encode()
            .unwrap();
        assert_eq!(json, r#"{"op":1,"d":99}"#);
    }

    #[test]
    fn encode_voice_state_leave_sends_null_channel() {
        let command = GatewayCommand::VoiceStateUpdate(VoiceStateUpdate {
            guild_id: "1".into(),
            channel_id: None,
            self_mute: false,
            self_deaf: true,
        });
        let payload = command.to_payload().unwrap();
        assert_eq!(payload.op, opcode::VOICE_STATE_UPDATE);
        let d = payload.d.unwrap();
        assert!(d["channel_id"].is_null());
        assert!(d.as_object().unwrap().contains_key("channel_id"));
    }

    #[test]
    fn encode_presence_and_member_request() {
        let presence = GatewayCommand::PresenceUpdate(PresenceUpdate {
            since: None,
            activities: vec![Activity {
                name: "tests".into(),
                kind: 0,
                url: None,
            }],
            status: "online".into(),
            afk: false,
        });
        let d = presence.to_payload().unwrap().d.unwrap();
        assert_eq!(d["activities"][0]["type"], 0);
        assert!(d["since"].is_null());

        let request = GatewayCommand::RequestGuildMembers(RequestGuildMembers {
            guild_id: "9".into(),
            query: Some(String::new()),
            limit: 0,
            presences: None,
            user_ids: None,
            nonce: Some("n1".into()),
        });
        let payload = request.to_payload().unwrap();
        assert_eq!(payload.op, opcode::REQUEST_GUILD_MEMBERS);
        assert_eq!(payload.d.unwrap()["nonce"], "n1");
        assert!(!request.is_lifecycle());
        assert!(GatewayCommand::Heartbeat { sequence: None }.is_lifecycle());
    }

    // ── URLs ──

    #[test]
    fn valid_resume_urls() {
        assert!(is_valid_resume_url(
            "wss://gateway.discord.gg/?v=10&encoding=json"
        ));
        assert!(is_valid_resume_url("wss://gateway-us-east1-b.discord.gg"));
        assert!(is_valid_resume_url("wss://gateway.discord.gg:443"));
    }

    #[test]
    fn invalid_resume_urls() {
        assert!(!is_valid_resume_url("ws://gateway.discord.gg"));
        assert!(!is_valid_resume_url("wss://evil.example.com"));
        assert!(!is_valid_resume_url("wss://notdiscord.gg/gateway"));
        assert!(!is_valid_resume_url(""));
        assert!(!is_valid_resume_url("https://gateway.discord.gg"));
        assert!(!is_valid_resume_url("wss://cdn.discord.media/gateway"));
    }

    #[test]
    fn gateway_query_is_appended_once() {
        assert_eq!(
            with_gateway_query("wss://gateway.discord.gg"),
            "wss://gateway.discord.gg/?v=10&encoding=json"
        );
        assert_eq!(
            with_gateway_query("wss://gateway.discord.gg/"),
            "wss://gateway.discord.gg/?v=10&encoding=json"
        );
        assert_eq!(
            with_gateway_query("wss://x.discord.gg/?v=9"),
            "wss://x.discord.gg/?v=9"
        );
    }

    #[test]
    fn gateway_bot_response_deserializes() {
        let json = serde_json::json!({
            "url": "wss://gateway.discord.gg",
            "shards": 1,
            "session_start_limit": {"total": 1000, "remaining": 999, "reset_after": 14_400_000, "max_concurrency": 1}
        });
        let resp: GatewayBotResponse = serde_json::from_value(json).unwrap();
        assert_eq!(resp.url, "wss://gateway.discord.gg");
        assert_eq!(resp.shards, Some(1));
    }
}
