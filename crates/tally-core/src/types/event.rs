use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event offset - strictly monotonic u64 assigned by the log.
///
/// Offsets start at 1; offset 0 is the "nothing folded yet" checkpoint.
pub type EventId = u64;

/// A single immutable entry from the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Source-assigned identifier. Events with an empty id are considered
    /// malformed and dropped at live ingestion.
    pub id: String,

    /// Log-assigned sequence number. The ordering authority for all
    /// aggregation state; wall-clock time is informational only.
    pub offset: EventId,

    /// When the log recorded the event.
    pub recorded_at: DateTime<Utc>,

    /// Typed payload.
    pub kind: EventKind,
}

/// Event payloads, one variant per event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// A user opened a box and received an item drop.
    CaseOpened {
        /// The opener.
        user_id: String,
        /// Display name at the time of the event.
        user_name: String,
        /// Avatar URL, if the source had one.
        user_avatar: Option<String>,
        /// The box that was opened.
        box_id: String,
        /// The item that dropped.
        item: ItemDrop,
    },
    /// A trade offer completed between up to two users.
    ///
    /// Either side may be absent (bot-mediated or partially recorded
    /// trades); a missing side simply produces no stats contribution.
    TradeOffer {
        sender: Option<TradeParty>,
        recipient: Option<TradeParty>,
        /// Total value of the traded items.
        value: Option<f64>,
    },
}

/// The item received from a case opening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDrop {
    pub name: String,
    pub price: Option<f64>,
    pub rarity: Option<String>,
    pub image: Option<String>,
}

/// One side of a trade offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeParty {
    pub user_id: String,
    pub user_name: String,
}

impl Event {
    /// Whether the payload carries a usable price.
    ///
    /// Events failing this check are filtered before classification and
    /// never contribute to any aggregate.
    pub fn has_usable_price(&self) -> bool {
        match &self.kind {
            EventKind::CaseOpened { item, .. } => item.price.is_some(),
            EventKind::TradeOffer { value, .. } => value.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case_event(price: Option<f64>) -> Event {
        Event {
            id: "e1".into(),
            offset: 1,
            recorded_at: Utc::now(),
            kind: EventKind::CaseOpened {
                user_id: "u1".into(),
                user_name: "alice".into(),
                user_avatar: None,
                box_id: "b1".into(),
                item: ItemDrop {
                    name: "knife".into(),
                    price,
                    rarity: None,
                    image: None,
                },
            },
        }
    }

    #[test]
    fn test_price_filter() {
        assert!(case_event(Some(12.5)).has_usable_price());
        assert!(!case_event(None).has_usable_price());
    }

    #[test]
    fn test_event_kind_roundtrip() {
        let event = case_event(Some(3.0));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.offset, 1);
        assert!(matches!(back.kind, EventKind::CaseOpened { .. }));
    }

    #[test]
    fn test_trade_sides_optional() {
        let json = r#"{"type":"TradeOffer","sender":null,"recipient":{"user_id":"u2","user_name":"bob"},"value":4.2}"#;
        let kind: EventKind = serde_json::from_str(json).unwrap();
        match kind {
            EventKind::TradeOffer {
                sender, recipient, ..
            } => {
                assert!(sender.is_none());
                assert_eq!(recipient.unwrap().user_id, "u2");
            }
            _ => panic!("expected trade"),
        }
    }
}
