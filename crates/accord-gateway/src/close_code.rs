//! Close-code tables for the gateway and voice gateway.
//!
//! Each code maps to the action a client takes after receiving it:
//! resume the session, start a new one, or stop.

/// What to do after the socket closes with a given code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Reconnect and resume the existing session.
    Resume,
    /// Reconnect with a fresh Identify.
    Reidentify,
    /// Do not reconnect.
    Fatal,
}

/// Gateway close codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum GatewayCloseCode {
    /// Unknown error.
    UnknownError = 4000,
    /// Invalid opcode or payload for an opcode.
    UnknownOpcode = 4001,
    /// Invalid payload.
    DecodeError = 4002,
    /// Payload sent before identifying.
    NotAuthenticated = 4003,
    /// Invalid token.
    AuthenticationFailed = 4004,
    /// Identify sent twice.
    AlreadyAuthenticated = 4005,
    /// Invalid sequence on resume.
    InvalidSeq = 4007,
    /// Sending too fast.
    RateLimited = 4008,
    /// Session timed out.
    SessionTimedOut = 4009,
    /// Invalid shard pair.
    InvalidShard = 4010,
    /// Too many guilds, sharding required.
    ShardingRequired = 4011,
    /// Invalid API version.
    InvalidApiVersion = 4012,
    /// Invalid intents bitmask.
    InvalidIntents = 4013,
    /// Privileged intent not enabled.
    DisallowedIntents = 4014,
}

impl GatewayCloseCode {
    /// Look up a close code.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4007 => Self::InvalidSeq,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimedOut,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            4013 => Self::InvalidIntents,
            4014 => Self::DisallowedIntents,
            _ => return None,
        })
    }

    /// The numeric code.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// The action this code calls for.
    #[must_use]
    pub fn action(self) -> CloseAction {
        match self {
            Self::AuthenticationFailed
            | Self::InvalidShard
            | Self::ShardingRequired
            | Self::InvalidApiVersion
            | Self::InvalidIntents
            | Self::DisallowedIntents => CloseAction::Fatal,
            Self::NotAuthenticated | Self::InvalidSeq => CloseAction::Reidentify,
            Self::UnknownError
            | Self::UnknownOpcode
            | Self::DecodeError
            | Self::AlreadyAuthenticated
            | Self::RateLimited
            | Self::SessionTimedOut => CloseAction::Resume,
        }
    }
}

/// Voice gateway close codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum VoiceCloseCode {
    /// Invalid opcode.
    UnknownOpcode = 4001,
    /// Invalid payload.
    FailedToDecode = 4002,
    /// Payload sent before identifying.
    NotAuthenticated = 4003,
    /// Invalid token.
    AuthenticationFailed = 4004,
    /// Identify sent twice.
    AlreadyAuthenticated = 4005,
    /// Session is no longer valid.
    SessionNoLongerValid = 4006,
    /// Session timed out.
    SessionTimeout = 4009,
    /// Voice server not found.
    ServerNotFound = 4011,
    /// Unknown protocol in Select Protocol.
    UnknownProtocol = 4012,
    /// Kicked, channel deleted, or call ended.
    Disconnected = 4014,
    /// Voice server crashed.
    VoiceServerCrashed = 4015,
    /// Unknown encryption mode.
    UnknownEncryptionMode = 4016,
}

impl VoiceCloseCode {
    /// Look up a voice close code.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            4001 => Self::UnknownOpcode,
            4002 => Self::FailedToDecode,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4006 => Self::SessionNoLongerValid,
            4009 => Self::SessionTimeout,
            4011 => Self::ServerNotFound,
            4012 => Self::UnknownProtocol,
            4014 => Self::Disconnected,
            4015 => Self::VoiceServerCrashed,
            4016 => Self::UnknownEncryptionMode,
            _ => return None,
        })
    }

    /// The numeric code.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// The action this code calls for.
    #[must_use]
    pub fn action(self) -> CloseAction {
        match self {
            Self::AuthenticationFailed
            | Self::ServerNotFound
            | Self::UnknownProtocol
            | Self::Disconnected
            | Self::UnknownEncryptionMode => CloseAction::Fatal,
            Self::NotAuthenticated | Self::SessionNoLongerValid => CloseAction::Reidentify,
            Self::UnknownOpcode
            | Self::FailedToDecode
            | Self::AlreadyAuthenticated
            | Self::SessionTimeout
            | Self::VoiceServerCrashed => CloseAction::Resume,
        }
    }
}

/// Classify any gateway close code, including non-Discord ones.
///
/// A normal close (1000/1001) ends the session server-side, so the
/// client must identify again. Any other unlisted code is treated as a
/// network blip.
#[must_use]
pub fn classify(code: u16) -> CloseAction {
    match GatewayCloseCode::from_code(code) {
        Some(known) => known.action(),
        None if matches!(code, 1000 | 1001) => CloseAction::Reidentify,
        None => CloseAction::Resume,
    }
}

/// Classify a voice gateway close code.
#[must_use]
pub fn classify_voice(code: u16) -> CloseAction {
    match VoiceCloseCode::from_code(code) {
        Some(known) => known.action(),
        None if matches!(code, 1000 | 1001) => CloseAction::Reidentify,
        None => CloseAction::Resume,
    }
}
