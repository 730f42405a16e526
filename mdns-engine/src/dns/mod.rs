pub mod bitmap;
pub mod message;
pub mod query;
pub mod record;
pub mod wire;

pub use bitmap::Bitmap;
pub use message::Message;
pub use query::Query;
pub use record::Record;

/// IPv4 address record
pub const A: u16 = 1;
/// Pointer to another name
pub const PTR: u16 = 12;
/// Arbitrary key/value metadata
pub const TXT: u16 = 16;
/// IPv6 address record
pub const AAAA: u16 = 28;
/// Service location
pub const SRV: u16 = 33;
/// Types present for a name
pub const NSEC: u16 = 47;
/// Wildcard matching every type (queries and cache lookups only)
pub const ANY: u16 = 255;

/// Human-readable record type, for diagnostics.
pub fn type_name(rtype: u16) -> &'static str {
    match rtype {
        A => "A",
        AAAA => "AAAA",
        ANY => "ANY",
        NSEC => "NSEC",
        PTR => "PTR",
        SRV => "SRV",
        TXT => "TXT",
        _ => "?",
    }
}
