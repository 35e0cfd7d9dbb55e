//! Forum ranks and the rule that assigns one to a member.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRecord {
    pub id: i64,
    pub title: String,
    /// Minimum post count for a post-count rank; ignored for special ranks.
    pub min_posts: i64,
    pub special: bool,
}

/// Resolve the rank title shown for a member.
///
/// A non-zero `rank_id` selects that special rank. Otherwise the member gets
/// the post-count rank with the highest threshold not above `posts`.
pub fn resolve_rank_title(ranks: &[RankRecord], rank_id: i64, posts: i64) -> Option<&str> {
    if rank_id != 0 {
        return ranks
            .iter()
            .find(|rank| rank.special && rank.id == rank_id)
            .map(|rank| rank.title.as_str());
    }

    ranks
        .iter()
        .filter(|rank| !rank.special && rank.min_posts <= posts)
        .max_by_key(|rank| rank.min_posts)
        .map(|rank| rank.title.as_str())
}
