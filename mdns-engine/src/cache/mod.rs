mod store;

pub use store::RecordStore;

use std::fmt;

use crate::dns::Record;

/// Notifications emitted by the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A refresh point of the record's lifetime has passed
    ShouldQuery(Record),
    /// The record was removed, by TTL expiry, a goodbye or a cache flush
    RecordExpired(Record),
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEvent::ShouldQuery(record) => write!(f, "refresh {}", record),
            CacheEvent::RecordExpired(record) => write!(f, "expired {}", record),
        }
    }
}
