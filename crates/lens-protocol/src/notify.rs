//! Phone notification records and server-ranked summaries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A notification captured on the phone and forwarded to the cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub app: String,
    pub title: String,
    pub body: String,
    pub priority: i32,
    pub received_at_ms: i64,
}

/// One summary line from the server's `notification_data` ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNotification {
    pub summary: String,
    #[serde(default)]
    pub rank: Option<i64>,
}

/// Sort summaries by ascending rank.
///
/// Entries without a rank compare equal to everything, so the stable sort
/// leaves them in arrival order relative to their neighbors.
pub fn sort_by_rank(entries: &mut [RankedNotification]) {
    entries.sort_by(|a, b| match (a.rank, b.rank) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::{RankedNotification, sort_by_rank};

    fn ranked(summary: &str, rank: Option<i64>) -> RankedNotification {
        RankedNotification {
            summary: summary.to_owned(),
            rank,
        }
    }

    #[test]
    fn sorts_ranked_entries_ascending() {
        let mut entries = vec![ranked("b", Some(2)), ranked("a", Some(1)), ranked("c", Some(3))];
        sort_by_rank(&mut entries);
        let order: Vec<_> = entries.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn unranked_entries_keep_arrival_order() {
        let mut entries = vec![
            ranked("first", None),
            ranked("second", Some(1)),
            ranked("third", None),
        ];
        sort_by_rank(&mut entries);
        let order: Vec<_> = entries.iter().map(|e| e.summary.as_str()).collect();
        // Unranked entries compare equal to neighbors; stable sort keeps them put.
        assert_eq!(order, ["first", "second", "third"]);
    }
}
