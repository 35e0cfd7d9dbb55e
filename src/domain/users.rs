//! Board members as seen by a single request.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::UserType;

/// A user row as persisted by the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub user_type: i16,
    pub ip: String,
    /// Registration time in unix seconds.
    pub registered_at: i64,
    pub posts: i64,
    /// Special rank id, `0` when the rank follows the post count.
    pub rank_id: i64,
    pub timezone: String,
    pub date_format: String,
}

/// The resolved identity of the current visitor together with the profile
/// fields the statistics block displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub is_registered: bool,
    pub ip: String,
    pub registered_at: i64,
    pub posts: i64,
    pub rank_id: i64,
    pub timezone: Tz,
    pub date_format: String,
}

impl SessionUser {
    /// An anonymous visitor. Only the IP is known.
    pub fn guest(ip: impl Into<String>, timezone: Tz, date_format: impl Into<String>) -> Self {
        Self {
            id: 0,
            is_registered: false,
            ip: ip.into(),
            registered_at: 0,
            posts: 0,
            rank_id: 0,
            timezone,
            date_format: date_format.into(),
        }
    }

    /// Build a session from a stored row, falling back to board defaults for
    /// an empty or unknown timezone and an empty date format.
    pub fn from_record(record: UserRecord, default_timezone: Tz, default_date_format: &str) -> Self {
        let is_registered = UserType::from_code(record.user_type)
            .map(UserType::is_registered)
            .unwrap_or(false);

        let timezone = match record.timezone.trim() {
            "" => default_timezone,
            name => name.parse::<Tz>().unwrap_or_else(|err| {
                warn!(
                    user_id = record.id,
                    timezone = name,
                    error = %err,
                    "Unknown user timezone; using board default"
                );
                default_timezone
            }),
        };

        let date_format = if record.date_format.trim().is_empty() {
            default_date_format.to_string()
        } else {
            record.date_format
        };

        Self {
            id: record.id,
            is_registered,
            ip: record.ip,
            registered_at: record.registered_at,
            posts: record.posts,
            rank_id: record.rank_id,
            timezone,
            date_format,
        }
    }
}
