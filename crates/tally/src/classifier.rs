//! Event classification: raw events to cache updates and side writes.

use tally_core::types::{
    BoxInfo, Event, EventKind, ItemRecord, ProfilePatch, StatsUpdate, SubjectKey,
};

/// One cache update targeted at one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOp {
    pub subject: SubjectKey,
    pub update: StatsUpdate,
}

/// Denormalized side-table writes produced alongside the cache ops.
/// Eventually consistent, last-write-wins, outside the aggregation
/// invariants.
#[derive(Debug, Clone, PartialEq)]
pub enum SideWrite {
    Profile { user_id: String, patch: ProfilePatch },
    Item(ItemRecord),
}

/// Everything one event asks the pipeline to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub cache_ops: Vec<CacheOp>,
    pub side_writes: Vec<SideWrite>,
}

/// Pure mapping from an event to cache ops and side writes. No I/O:
/// box reference data is resolved by the caller and passed in.
///
/// Emits at most one cache op per subject per event, which is what the
/// cache's per-offset fold guard assumes.
pub struct EventClassifier {
    include_global: bool,
}

impl EventClassifier {
    pub fn new(include_global: bool) -> Self {
        Self { include_global }
    }

    pub fn classify(&self, event: &Event, box_info: Option<&BoxInfo>) -> Classification {
        match &event.kind {
            EventKind::CaseOpened {
                user_id,
                user_name,
                user_avatar,
                item,
                ..
            } => {
                let update = StatsUpdate::CaseOpened {
                    spend: box_info.map(|b| b.price).unwrap_or(0.0),
                    drop_value: item.price.unwrap_or(0.0),
                    drop_name: item.name.clone(),
                };

                let mut cache_ops = vec![CacheOp {
                    subject: SubjectKey::user(user_id.clone()),
                    update: update.clone(),
                }];
                if self.include_global {
                    cache_ops.push(CacheOp {
                        subject: SubjectKey::Global,
                        update,
                    });
                }

                let side_writes = vec![
                    SideWrite::Profile {
                        user_id: user_id.clone(),
                        patch: ProfilePatch::named(user_name.clone())
                            .with_avatar(user_avatar.clone()),
                    },
                    SideWrite::Item(ItemRecord {
                        id: item.name.clone(),
                        name: item.name.clone(),
                        price: item.price.unwrap_or(0.0),
                        rarity: item.rarity.clone(),
                        image: item.image.clone(),
                    }),
                ];

                Classification {
                    cache_ops,
                    side_writes,
                }
            }
            EventKind::TradeOffer {
                sender,
                recipient,
                value,
            } => {
                let value = value.unwrap_or(0.0);
                let mut classification = Classification::default();

                if let Some(sender) = sender {
                    classification.cache_ops.push(CacheOp {
                        subject: SubjectKey::user(sender.user_id.clone()),
                        update: StatsUpdate::TradeSent { value },
                    });
                    classification.side_writes.push(SideWrite::Profile {
                        user_id: sender.user_id.clone(),
                        patch: ProfilePatch::named(sender.user_name.clone()),
                    });
                }

                if let Some(recipient) = recipient {
                    // Self-trades fold once: the sent op already claimed
                    // this subject's slot for the event.
                    let self_trade = sender
                        .as_ref()
                        .is_some_and(|s| s.user_id == recipient.user_id);
                    if !self_trade {
                        classification.cache_ops.push(CacheOp {
                            subject: SubjectKey::user(recipient.user_id.clone()),
                            update: StatsUpdate::TradeReceived { value },
                        });
                        classification.side_writes.push(SideWrite::Profile {
                            user_id: recipient.user_id.clone(),
                            patch: ProfilePatch::named(recipient.user_name.clone()),
                        });
                    }
                }

                // The global subject tracks site-wide unboxing activity
                // only; trades move value between users without adding
                // to it.
                classification
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_core::types::{ItemDrop, TradeParty};

    fn case_event() -> Event {
        Event {
            id: "e1".into(),
            offset: 1,
            recorded_at: Utc::now(),
            kind: EventKind::CaseOpened {
                user_id: "u1".into(),
                user_name: "alice".into(),
                user_avatar: Some("a.png".into()),
                box_id: "b1".into(),
                item: ItemDrop {
                    name: "knife".into(),
                    price: Some(40.0),
                    rarity: Some("covert".into()),
                    image: None,
                },
            },
        }
    }

    fn trade_event(sender: Option<&str>, recipient: Option<&str>) -> Event {
        let party = |id: &str| TradeParty {
            user_id: id.into(),
            user_name: format!("name-{id}"),
        };
        Event {
            id: "t1".into(),
            offset: 2,
            recorded_at: Utc::now(),
            kind: EventKind::TradeOffer {
                sender: sender.map(party),
                recipient: recipient.map(party),
                value: Some(12.0),
            },
        }
    }

    #[test]
    fn test_case_event_classification() {
        let classifier = EventClassifier::new(false);
        let box_info = BoxInfo {
            id: "b1".into(),
            name: "Chroma".into(),
            price: 2.5,
        };

        let result = classifier.classify(&case_event(), Some(&box_info));

        assert_eq!(result.cache_ops.len(), 1);
        assert_eq!(result.cache_ops[0].subject, SubjectKey::user("u1"));
        assert_eq!(
            result.cache_ops[0].update,
            StatsUpdate::CaseOpened {
                spend: 2.5,
                drop_value: 40.0,
                drop_name: "knife".into(),
            }
        );
        // Profile merge for the opener + full item record for the drop.
        assert_eq!(result.side_writes.len(), 2);
    }

    #[test]
    fn test_case_event_without_box_info_spends_zero() {
        let classifier = EventClassifier::new(false);
        let result = classifier.classify(&case_event(), None);
        match &result.cache_ops[0].update {
            StatsUpdate::CaseOpened { spend, .. } => assert_eq!(*spend, 0.0),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn test_global_rollup_adds_second_op() {
        let classifier = EventClassifier::new(true);
        let result = classifier.classify(&case_event(), None);
        assert_eq!(result.cache_ops.len(), 2);
        assert_eq!(result.cache_ops[1].subject, SubjectKey::Global);
    }

    #[test]
    fn test_two_sided_trade_updates_both_subjects() {
        let classifier = EventClassifier::new(false);
        let result = classifier.classify(&trade_event(Some("s"), Some("r")), None);

        assert_eq!(result.cache_ops.len(), 2);
        assert_eq!(result.cache_ops[0].subject, SubjectKey::user("s"));
        assert_eq!(
            result.cache_ops[0].update,
            StatsUpdate::TradeSent { value: 12.0 }
        );
        assert_eq!(result.cache_ops[1].subject, SubjectKey::user("r"));
        assert_eq!(
            result.cache_ops[1].update,
            StatsUpdate::TradeReceived { value: 12.0 }
        );
    }

    #[test]
    fn test_one_sided_trade_updates_one_subject() {
        let classifier = EventClassifier::new(false);

        let sender_only = classifier.classify(&trade_event(Some("s"), None), None);
        assert_eq!(sender_only.cache_ops.len(), 1);
        assert_eq!(sender_only.cache_ops[0].subject, SubjectKey::user("s"));

        let recipient_only = classifier.classify(&trade_event(None, Some("r")), None);
        assert_eq!(recipient_only.cache_ops.len(), 1);
        assert_eq!(
            recipient_only.cache_ops[0].update,
            StatsUpdate::TradeReceived { value: 12.0 }
        );

        let neither = classifier.classify(&trade_event(None, None), None);
        assert!(neither.cache_ops.is_empty());
        assert!(neither.side_writes.is_empty());
    }

    #[test]
    fn test_self_trade_folds_once() {
        let classifier = EventClassifier::new(false);
        let result = classifier.classify(&trade_event(Some("s"), Some("s")), None);
        assert_eq!(result.cache_ops.len(), 1);
        assert_eq!(
            result.cache_ops[0].update,
            StatsUpdate::TradeSent { value: 12.0 }
        );
    }
}
