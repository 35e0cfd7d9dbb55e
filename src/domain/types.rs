//! Shared domain enumerations aligned with the board's persisted integer codes.

use serde::{Deserialize, Serialize};

/// Moderation state of a topic as stored in `topic_visibility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TopicVisibility {
    Unapproved = 0,
    Approved = 1,
    Deleted = 2,
    Reapprove = 3,
}

impl TopicVisibility {
    pub const fn code(self) -> i16 {
        self as i16
    }
}

/// Account kind as stored in `user_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Normal,
    Inactive,
    Ignore,
    Founder,
}

impl UserType {
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(UserType::Normal),
            1 => Some(UserType::Inactive),
            2 => Some(UserType::Ignore),
            3 => Some(UserType::Founder),
            _ => None,
        }
    }

    /// Registered accounts are active members; bots and the anonymous account are `Ignore`.
    pub fn is_registered(self) -> bool {
        matches!(self, UserType::Normal | UserType::Founder)
    }
}
