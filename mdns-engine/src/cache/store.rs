use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::dns::{Record, ANY};

use super::CacheEvent;

/// Fractions of the TTL (in per mille) at which a refresh query is due
const REFRESH_POINTS: [u64; 4] = [500, 850, 900, 950];

struct Entry {
    record: Record,
    /// Ascending; the last one is the expiry
    triggers: VecDeque<Instant>,
}

impl Entry {
    fn new(record: Record, now: Instant, jitter: Duration) -> Self {
        let lifetime = u64::from(record.ttl) * 1000;
        let mut triggers: VecDeque<Instant> = REFRESH_POINTS
            .iter()
            .map(|point| now + Duration::from_millis(lifetime * point / 1000) + jitter)
            .collect();
        triggers.push_back(now + Duration::from_millis(lifetime));
        Self { record, triggers }
    }
}

/// Records with their refresh and expiry schedule.
///
/// The store does no timing of its own: the owner asks for the next trigger,
/// sleeps until then and calls [`RecordStore::expire`].
#[derive(Default)]
pub struct RecordStore {
    entries: Vec<Entry>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, refresh or withdraw a record. Returns the notifications caused
    /// by records leaving the store.
    pub fn add_record(&mut self, record: Record, now: Instant, jitter: Duration) -> Vec<CacheEvent> {
        let mut events = Vec::new();

        if record.ttl == 0 {
            self.entries.retain(|entry| {
                let matches = entry.record == record || (record.flush_cache && entry.record.same_rrset(&record));
                if matches {
                    events.push(CacheEvent::RecordExpired(entry.record.clone()));
                }
                !matches
            });
            return events;
        }

        if record.flush_cache {
            self.entries.retain(|entry| {
                let flushed = entry.record.same_rrset(&record) && entry.record != record;
                if flushed {
                    events.push(CacheEvent::RecordExpired(entry.record.clone()));
                }
                !flushed
            });
        }

        let entry = Entry::new(record, now, jitter);
        match self.entries.iter_mut().find(|existing| existing.record == entry.record) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        events
    }

    pub fn lookup_record(&self, name: Option<&str>, rtype: u16) -> Option<Record> {
        self.matching(name, rtype).next().cloned()
    }

    pub fn lookup_records(&self, name: Option<&str>, rtype: u16) -> Vec<Record> {
        self.matching(name, rtype).cloned().collect()
    }

    fn matching<'a>(&'a self, name: Option<&'a str>, rtype: u16) -> impl Iterator<Item = &'a Record> + 'a {
        self.entries
            .iter()
            .map(|entry| &entry.record)
            .filter(move |record| name.map_or(true, |name| record.name == name))
            .filter(move |record| rtype == ANY || record.rtype == rtype)
    }

    /// The earliest pending trigger, if any record is stored
    pub fn next_trigger(&self) -> Option<Instant> {
        self.entries.iter().filter_map(|entry| entry.triggers.front()).min().copied()
    }

    /// Consume every trigger that has passed at `now`.
    ///
    /// A record whose refresh points passed yields one `ShouldQuery`, however
    /// many of them elapsed; a record whose expiry passed is dropped and yields
    /// `RecordExpired` instead.
    pub fn expire(&mut self, now: Instant) -> Vec<CacheEvent> {
        let mut events = Vec::new();
        self.entries.retain_mut(|entry| {
            let mut elapsed = false;
            while entry.triggers.front().is_some_and(|&trigger| trigger <= now) {
                entry.triggers.pop_front();
                elapsed = true;
            }
            if entry.triggers.is_empty() {
                events.push(CacheEvent::RecordExpired(entry.record.clone()));
                return false;
            }
            if elapsed {
                events.push(CacheEvent::ShouldQuery(entry.record.clone()));
            }
            true
        });
        events
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
