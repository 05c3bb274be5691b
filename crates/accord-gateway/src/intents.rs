//! Gateway intent flags.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bitmask of gateway intents sent in Identify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intents(u32);

impl Intents {
    /// Guild create/update/delete, roles, channels, threads.
    pub const GUILDS: Self = Self(1 << 0);
    /// Member add/update/remove (privileged).
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    /// Bans and audit log entries.
    pub const GUILD_MODERATION: Self = Self(1 << 2);
    /// Emoji and sticker updates.
    pub const GUILD_EXPRESSIONS: Self = Self(1 << 3);
    /// Integration updates.
    pub const GUILD_INTEGRATIONS: Self = Self(1 << 4);
    /// Webhook updates.
    pub const GUILD_WEBHOOKS: Self = Self(1 << 5);
    /// Invite create/delete.
    pub const GUILD_INVITES: Self = Self(1 << 6);
    /// Voice state updates.
    pub const GUILD_VOICE_STATES: Self = Self(1 << 7);
    /// Presence updates (privileged).
    pub const GUILD_PRESENCES: Self = Self(1 << 8);
    /// Guild message events.
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    /// Guild message reactions.
    pub const GUILD_MESSAGE_REACTIONS: Self = Self(1 << 10);
    /// Guild typing start.
    pub const GUILD_MESSAGE_TYPING: Self = Self(1 << 11);
    /// Direct message events.
    pub const DIRECT_MESSAGES: Self = Self(1 << 12);
    /// Direct message reactions.
    pub const DIRECT_MESSAGE_REACTIONS: Self = Self(1 << 13);
    /// Direct message typing start.
    pub const DIRECT_MESSAGE_TYPING: Self = Self(1 << 14);
    /// Message content in message events (privileged).
    pub const MESSAGE_CONTENT: Self = Self(1 << 15);
    /// Scheduled event updates.
    pub const GUILD_SCHEDULED_EVENTS: Self = Self(1 << 16);
    /// Auto moderation rule updates.
    pub const AUTO_MODERATION_CONFIGURATION: Self = Self(1 << 20);
    /// Auto moderation actions.
    pub const AUTO_MODERATION_EXECUTION: Self = Self(1 << 21);

    /// `GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES`.
    ///
    /// No privileged intents: those must be enabled in the developer
    /// portal or Discord closes the connection with 4014.
    pub const DEFAULT: Self = Self(Self::GUILDS.0 | Self::GUILD_MESSAGES.0 | Self::DIRECT_MESSAGES.0);

    const PRIVILEGED: u32 = Self::GUILD_MEMBERS.0 | Self::GUILD_PRESENCES.0 | Self::MESSAGE_CONTENT.0;

    /// Wrap a raw bitmask.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any privileged intent is requested.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        self.0 & Self::PRIVILEGED != 0
    }
}

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<u32> for Intents {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}
