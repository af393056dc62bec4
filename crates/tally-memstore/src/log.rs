use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use tally_core::error::Result;
use tally_core::traits::{EventCursor, EventLog, LiveEvents};
use tally_core::types::{Event, EventId, EventKind};

/// In-memory append-only event log.
///
/// Offsets are assigned on append, starting at 1. Live subscribers get
/// every event appended after their subscription; historical reads take
/// a snapshot of the requested range at call time.
pub struct MemoryEventLog {
    inner: Mutex<LogInner>,
}

struct LogInner {
    events: Vec<Event>,
    next_offset: EventId,
    subscribers: Vec<UnboundedSender<Event>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                events: Vec::new(),
                next_offset: 1,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Append a payload with an auto-assigned offset and id.
    pub fn append(&self, kind: EventKind) -> Event {
        let mut inner = self.inner.lock();
        let offset = inner.next_offset;
        let event = Event {
            id: format!("evt-{offset}"),
            offset,
            recorded_at: Utc::now(),
            kind,
        };
        inner.push(event.clone());
        event
    }

    /// Append a payload at an explicit offset.
    ///
    /// Offsets must be strictly increasing across calls; tests use this
    /// to lay out specific checkpoint arithmetic.
    pub fn append_at(&self, offset: EventId, kind: EventKind) -> Event {
        let mut inner = self.inner.lock();
        assert!(
            offset >= inner.next_offset,
            "offset {offset} would break log ordering (next is {})",
            inner.next_offset
        );
        let event = Event {
            id: format!("evt-{offset}"),
            offset,
            recorded_at: Utc::now(),
            kind,
        };
        inner.push(event.clone());
        event
    }

    /// Append a fully-formed event, id and all. Lets tests inject
    /// malformed entries (e.g. an empty id) into the live feed.
    pub fn publish_raw(&self, event: Event) {
        let mut inner = self.inner.lock();
        assert!(
            event.offset >= inner.next_offset,
            "offset {} would break log ordering (next is {})",
            event.offset,
            inner.next_offset
        );
        inner.push(event);
    }

    /// Number of events in the log.
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogInner {
    fn push(&mut self, event: Event) {
        self.next_offset = event.offset + 1;
        // Fan out to live subscribers, pruning the hung-up ones.
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
        self.events.push(event);
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn head(&self) -> Result<EventId> {
        let inner = self.inner.lock();
        Ok(inner.events.last().map(|e| e.offset).unwrap_or(0))
    }

    async fn stream_from(&self, after: EventId, up_to: EventId) -> Result<Box<dyn EventCursor>> {
        let events: Vec<Event> = {
            let inner = self.inner.lock();
            inner
                .events
                .iter()
                .filter(|e| e.offset > after && e.offset <= up_to)
                .cloned()
                .collect()
        };
        Ok(Box::new(VecEventCursor { events, pos: 0 }))
    }

    async fn changes(&self) -> Result<LiveEvents> {
        let (tx, live) = LiveEvents::channel();
        self.inner.lock().subscribers.push(tx);
        Ok(live)
    }
}

struct VecEventCursor {
    events: Vec<Event>,
    pos: usize,
}

#[async_trait]
impl EventCursor for VecEventCursor {
    async fn next(&mut self) -> Result<Option<Event>> {
        let event = self.events.get(self.pos).cloned();
        if event.is_some() {
            self.pos += 1;
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::types::ItemDrop;

    fn case_kind(user: &str) -> EventKind {
        EventKind::CaseOpened {
            user_id: user.into(),
            user_name: user.into(),
            user_avatar: None,
            box_id: "b1".into(),
            item: ItemDrop {
                name: "item".into(),
                price: Some(1.0),
                rarity: None,
                image: None,
            },
        }
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_offsets() {
        let log = MemoryEventLog::new();
        assert_eq!(log.head().await.unwrap(), 0);

        let e1 = log.append(case_kind("u1"));
        let e2 = log.append(case_kind("u2"));
        assert_eq!(e1.offset, 1);
        assert_eq!(e2.offset, 2);
        assert_eq!(log.head().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stream_from_is_bounded_and_strictly_after() {
        let log = MemoryEventLog::new();
        for _ in 0..5 {
            log.append(case_kind("u1"));
        }

        let mut cursor = log.stream_from(2, 4).await.unwrap();
        let mut offsets = Vec::new();
        while let Some(event) = cursor.next().await.unwrap() {
            offsets.push(event.offset);
        }
        assert_eq!(offsets, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_changes_sees_only_later_appends() {
        let log = MemoryEventLog::new();
        log.append(case_kind("before"));

        let mut live = log.changes().await.unwrap();
        let e = log.append(case_kind("after"));

        let got = live.recv().await.unwrap();
        assert_eq!(got.offset, e.offset);
        assert_eq!(live.backlog(), 0);
    }

    #[tokio::test]
    async fn test_append_at_gaps() {
        let log = MemoryEventLog::new();
        log.append_at(9, case_kind("u1"));
        log.append_at(11, case_kind("u1"));
        assert_eq!(log.head().await.unwrap(), 11);

        let mut cursor = log.stream_from(9, 11).await.unwrap();
        let first = cursor.next().await.unwrap().unwrap();
        assert_eq!(first.offset, 11);
        assert!(cursor.next().await.unwrap().is_none());
    }
}
