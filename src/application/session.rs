//! The view of the current visitor that the statistics block reads from.

use chrono_tz::Tz;

use crate::domain::users::SessionUser;

/// Identity and profile accessors supplied by the host's session layer.
pub trait UserSession: Send + Sync {
    fn is_authenticated(&self) -> bool;
    fn user_id(&self) -> i64;
    fn ip(&self) -> &str;
    /// Registration time in unix seconds.
    fn registered_at(&self) -> i64;
    fn posts(&self) -> i64;
    fn rank_id(&self) -> i64;
    fn timezone(&self) -> Tz;
    fn date_format(&self) -> &str;
}

impl UserSession for SessionUser {
    fn is_authenticated(&self) -> bool {
        self.is_registered
    }

    fn user_id(&self) -> i64 {
        self.id
    }

    fn ip(&self) -> &str {
        &self.ip
    }

    fn registered_at(&self) -> i64 {
        self.registered_at
    }

    fn posts(&self) -> i64 {
        self.posts
    }

    fn rank_id(&self) -> i64 {
        self.rank_id
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }

    fn date_format(&self) -> &str {
        &self.date_format
    }
}
