use serde::{Deserialize, Serialize};

use crate::types::EventId;

/// Reserved storage key for the site-wide roll-up subject.
pub const GLOBAL_KEY: &str = "global";

/// The entity an aggregate record is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubjectKey {
    /// Site-wide roll-up across all users.
    Global,
    /// A single user, by source user id.
    User(String),
}

impl SubjectKey {
    pub fn user(id: impl Into<String>) -> Self {
        SubjectKey::User(id.into())
    }

    /// Flat string form used as the primary key in durable stores.
    pub fn as_key(&self) -> &str {
        match self {
            SubjectKey::Global => GLOBAL_KEY,
            SubjectKey::User(id) => id,
        }
    }

    /// Inverse of [`as_key`](Self::as_key).
    pub fn from_key(key: &str) -> Self {
        if key == GLOBAL_KEY {
            SubjectKey::Global
        } else {
            SubjectKey::User(key.to_string())
        }
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Per-subject accumulated statistics.
///
/// Created on the first event for a subject, mutated by fold thereafter,
/// never deleted. `updated_at` is the offset of the last event folded in
/// and is monotonically non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub subject: SubjectKey,

    // Case-opening side.
    pub cases_opened: u64,
    pub total_spent: f64,
    pub total_drop_value: f64,
    pub best_drop_value: f64,
    pub best_drop_name: Option<String>,

    // Trading side.
    pub trades_sent: u64,
    pub trades_received: u64,
    pub sent_value: f64,
    pub received_value: f64,

    /// Offset of the last event folded into this record.
    pub updated_at: EventId,
}

impl UserStats {
    /// A zeroed record for a subject that has not seen any events.
    pub fn new(subject: SubjectKey) -> Self {
        Self {
            subject,
            cases_opened: 0,
            total_spent: 0.0,
            total_drop_value: 0.0,
            best_drop_value: 0.0,
            best_drop_name: None,
            trades_sent: 0,
            trades_received: 0,
            sent_value: 0.0,
            received_value: 0.0,
            updated_at: 0,
        }
    }

    /// Net unboxing result: drop value received minus box cost paid.
    pub fn net_drop_profit(&self) -> f64 {
        self.total_drop_value - self.total_spent
    }

    /// Apply one update's contribution. Offset bookkeeping is the
    /// caller's job (see the aggregation cache).
    pub fn apply(&mut self, update: &StatsUpdate) {
        match update {
            StatsUpdate::CaseOpened {
                spend,
                drop_value,
                drop_name,
            } => {
                self.cases_opened += 1;
                self.total_spent += spend;
                self.total_drop_value += drop_value;
                if *drop_value > self.best_drop_value {
                    self.best_drop_value = *drop_value;
                    self.best_drop_name = Some(drop_name.clone());
                }
            }
            StatsUpdate::TradeSent { value } => {
                self.trades_sent += 1;
                self.sent_value += value;
            }
            StatsUpdate::TradeReceived { value } => {
                self.trades_received += 1;
                self.received_value += value;
            }
        }
    }
}

/// One event's typed contribution to a single subject's record.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsUpdate {
    /// The subject opened a box: `spend` is the box price, `drop_value`
    /// the dropped item's price.
    CaseOpened {
        spend: f64,
        drop_value: f64,
        drop_name: String,
    },
    /// The subject sent a trade worth `value`.
    TradeSent { value: f64 },
    /// The subject received a trade worth `value`.
    TradeReceived { value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_key_roundtrip() {
        assert_eq!(SubjectKey::from_key("global"), SubjectKey::Global);
        assert_eq!(SubjectKey::from_key("u42"), SubjectKey::user("u42"));
        assert_eq!(SubjectKey::user("u42").as_key(), "u42");
        assert_eq!(SubjectKey::Global.as_key(), GLOBAL_KEY);
    }

    #[test]
    fn test_case_update_tracks_best_drop() {
        let mut stats = UserStats::new(SubjectKey::user("u1"));
        stats.apply(&StatsUpdate::CaseOpened {
            spend: 2.5,
            drop_value: 10.0,
            drop_name: "rifle".into(),
        });
        stats.apply(&StatsUpdate::CaseOpened {
            spend: 2.5,
            drop_value: 4.0,
            drop_name: "pistol".into(),
        });

        assert_eq!(stats.cases_opened, 2);
        assert_eq!(stats.total_spent, 5.0);
        assert_eq!(stats.total_drop_value, 14.0);
        assert_eq!(stats.best_drop_value, 10.0);
        assert_eq!(stats.best_drop_name.as_deref(), Some("rifle"));
        assert_eq!(stats.net_drop_profit(), 9.0);
    }

    #[test]
    fn test_trade_updates_are_one_sided() {
        let mut stats = UserStats::new(SubjectKey::user("u1"));
        stats.apply(&StatsUpdate::TradeSent { value: 7.0 });
        stats.apply(&StatsUpdate::TradeReceived { value: 3.0 });

        assert_eq!(stats.trades_sent, 1);
        assert_eq!(stats.trades_received, 1);
        assert_eq!(stats.sent_value, 7.0);
        assert_eq!(stats.received_value, 3.0);
        // Trades never touch the case-opening side.
        assert_eq!(stats.cases_opened, 0);
    }
}
