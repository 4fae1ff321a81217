use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rovelink_frame::MessageId;
use serde::Serialize;

/// Maximum number of outstanding send timestamps.
pub const SENT_TIME_TABLE_CAP: usize = 500;

/// Send timestamps of acknowledgeable messages, oldest first.
#[derive(Debug, Clone)]
pub struct SentTimeTable {
    entries: VecDeque<(MessageId, Instant)>,
    capacity: usize,
}

impl Default for SentTimeTable {
    fn default() -> Self {
        Self::with_capacity(SENT_TIME_TABLE_CAP)
    }
}

impl SentTimeTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `id` as sent at `at`. Returns the id evicted to make room, if any.
    pub fn insert(&mut self, id: MessageId, at: Instant) -> Option<MessageId> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front().map(|(old, _)| old)
        } else {
            None
        };
        self.entries.push_back((id, at));
        evicted
    }

    /// Remove `id` and return its send time.
    pub fn take(&mut self, id: MessageId) -> Option<Instant> {
        let pos = self.entries.iter().position(|(entry, _)| *entry == id)?;
        self.entries.remove(pos).map(|(_, at)| at)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// One round-trip measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QosSample {
    pub rtt: Duration,
    /// Normal messages sent over the channel's lifetime.
    pub messages_up: u64,
    /// Normal messages received over the channel's lifetime.
    pub messages_down: u64,
}

/// Round-trip sampling for both directions of a channel.
///
/// Outbound Normal messages are all recorded so any of them can be
/// acknowledged. Inbound, at most one message per interval is picked for an
/// acknowledgement.
#[derive(Debug, Clone)]
pub struct QosSampler {
    interval: Duration,
    sent: SentTimeTable,
    last_ack: Option<Instant>,
    messages_up: u64,
    messages_down: u64,
}

impl QosSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            sent: SentTimeTable::default(),
            last_ack: None,
            messages_up: 0,
            messages_down: 0,
        }
    }

    /// Account for an outbound Normal message.
    pub fn record_sent(&mut self, id: MessageId, now: Instant) {
        self.messages_up += 1;
        if let Some(evicted) = self.sent.insert(id, now) {
            tracing::trace!(evicted, "sent-time table full, evicted oldest entry");
        }
    }

    /// Account for an inbound Normal message. Returns the id to acknowledge
    /// when this message is picked as the interval's sample.
    pub fn record_received(&mut self, id: MessageId, now: Instant) -> Option<MessageId> {
        self.messages_down += 1;
        let due = self
            .last_ack
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_ack = Some(now);
            Some(id)
        } else {
            None
        }
    }

    /// Resolve an acknowledgement from the peer.
    pub fn acknowledge(&mut self, id: MessageId, now: Instant) -> Option<QosSample> {
        let sent_at = self.sent.take(id)?;
        Some(QosSample {
            rtt: now.saturating_duration_since(sent_at),
            messages_up: self.messages_up,
            messages_down: self.messages_down,
        })
    }

    /// Forget per-connection state. Counters are cumulative and survive.
    pub fn reset(&mut self) {
        self.sent.clear();
        self.last_ack = None;
    }

    pub fn messages_up(&self) -> u64 {
        self.messages_up
    }

    pub fn messages_down(&self) -> u64 {
        self.messages_down
    }

    pub fn outstanding(&self) -> usize {
        self.sent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn table_evicts_exactly_the_oldest() {
        let start = Instant::now();
        let mut table = SentTimeTable::default();
        for id in 1..=SENT_TIME_TABLE_CAP as u32 {
            assert_eq!(table.insert(id, start), None);
        }
        assert_eq!(table.len(), 500);

        assert_eq!(table.insert(501, start), Some(1));
        assert_eq!(table.len(), 500);
        assert!(!table.contains(1));
        assert!(table.contains(2));
        assert!(table.contains(501));
    }

    #[test]
    fn table_never_exceeds_capacity() {
        let start = Instant::now();
        let mut table = SentTimeTable::with_capacity(8);
        for id in 0..100 {
            table.insert(id, start);
            assert!(table.len() <= 8);
        }
        assert!(table.contains(99));
        assert!(!table.contains(91));
    }

    #[test]
    fn take_removes_entry() {
        let start = Instant::now();
        let mut table = SentTimeTable::default();
        table.insert(10, start);
        table.insert(11, start + ms(5));

        assert_eq!(table.take(11), Some(start + ms(5)));
        assert_eq!(table.take(11), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rtt_from_acknowledgement() {
        let t = Instant::now();
        let mut sampler = QosSampler::new(ms(1000));
        sampler.record_sent(1, t);
        sampler.record_received(1, t + ms(10));

        let sample = sampler.acknowledge(1, t + ms(40)).unwrap();
        assert_eq!(sample.rtt, ms(40));
        assert_eq!(sample.messages_up, 1);
        assert_eq!(sample.messages_down, 1);
        assert_eq!(sampler.outstanding(), 0);
    }

    #[test]
    fn counters_grow_between_samples() {
        let t = Instant::now();
        let mut sampler = QosSampler::new(ms(1000));
        sampler.record_sent(1, t);
        let first = sampler.acknowledge(1, t + ms(40)).unwrap();

        sampler.record_sent(2, t + ms(1000));
        sampler.record_received(7, t + ms(1010));
        let second = sampler.acknowledge(2, t + ms(1040)).unwrap();

        assert_eq!(second.messages_up - first.messages_up, 1);
        assert_eq!(second.messages_down - first.messages_down, 1);
    }

    #[test]
    fn unknown_or_evicted_ack_yields_nothing() {
        let t = Instant::now();
        let mut sampler = QosSampler::new(ms(1000));
        assert!(sampler.acknowledge(99, t).is_none());
    }

    #[test]
    fn at_most_one_ack_per_interval() {
        let t = Instant::now();
        let mut sampler = QosSampler::new(ms(1000));

        assert_eq!(sampler.record_received(1, t), Some(1));
        assert_eq!(sampler.record_received(2, t + ms(500)), None);
        assert_eq!(sampler.record_received(3, t + ms(999)), None);
        assert_eq!(sampler.record_received(4, t + ms(1000)), Some(4));
        assert_eq!(sampler.messages_down(), 4);
    }

    #[test]
    fn reset_keeps_counters() {
        let t = Instant::now();
        let mut sampler = QosSampler::new(ms(1000));
        sampler.record_sent(1, t);
        sampler.record_received(1, t);
        sampler.reset();

        assert_eq!(sampler.outstanding(), 0);
        assert_eq!(sampler.messages_up(), 1);
        assert_eq!(sampler.record_received(2, t + ms(1)), Some(2));
    }
}
