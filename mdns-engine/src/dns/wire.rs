//! Encoding and decoding of DNS packets.
//!
//! See https://datatracker.ietf.org/doc/html/rfc1035#section-4 for the layout
//! and https://datatracker.ietf.org/doc/html/rfc6762#section-18 for the mDNS
//! reuse of the class and flag bits.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::WireError;

use super::bitmap::Bitmap;
use super::message::Message;
use super::query::Query;
use super::record::Record;
use super::{type_name, A, AAAA, NSEC, PTR, SRV, TXT};

pub const HEADER_LENGTH: usize = 12;
pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_LABEL_LENGTH: usize = 63;

const POINTER_MASK: u8 = 0xc0;
const MAX_POINTER_OFFSET: usize = 0x3fff;

const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_AUTHORITATIVE: u16 = 0x0400;

const CLASS_IN: u16 = 0x0001;
/// Top bit of the class: cache-flush on records, unicast-response on queries
const CLASS_TOP_BIT: u16 = 0x8000;

/// Names already written to a packet (without the trailing dot) and their offsets
pub type NameMap = HashMap<String, u16>;

fn read_slice<'a>(packet: &'a [u8], offset: &mut usize, length: usize) -> Result<&'a [u8], WireError> {
    let end = offset
        .checked_add(length)
        .filter(|&end| end <= packet.len())
        .ok_or(WireError::Truncated {
            offset: *offset,
            needed: length,
        })?;
    let slice = &packet[*offset..end];
    *offset = end;
    Ok(slice)
}

fn read_array<const N: usize>(packet: &[u8], offset: &mut usize) -> Result<[u8; N], WireError> {
    let mut array = [0u8; N];
    array.copy_from_slice(read_slice(packet, offset, N)?);
    Ok(array)
}

fn read_u8(packet: &[u8], offset: &mut usize) -> Result<u8, WireError> {
    Ok(read_array::<1>(packet, offset)?[0])
}

fn read_u16(packet: &[u8], offset: &mut usize) -> Result<u16, WireError> {
    read_array(packet, offset).map(u16::from_be_bytes)
}

fn read_u32(packet: &[u8], offset: &mut usize) -> Result<u32, WireError> {
    read_array(packet, offset).map(u32::from_be_bytes)
}

/// Read a possibly compressed name starting at `offset`.
///
/// On success `offset` points just past the name as it appears at its
/// original position (after the first pointer, if any). Every pointer must
/// target an offset strictly below the previous jump origin, which rules out
/// loops; the expanded name is capped at [`MAX_NAME_LENGTH`].
pub fn parse_name(packet: &[u8], offset: &mut usize) -> Result<String, WireError> {
    let mut name = String::new();
    let mut cursor = *offset;
    let mut limit = *offset;
    let mut resume = None;

    loop {
        let length = read_u8(packet, &mut cursor)?;
        if length == 0 {
            break;
        }
        match length & POINTER_MASK {
            0x00 => {
                let label = read_slice(packet, &mut cursor, length as usize)?;
                let label = std::str::from_utf8(label).map_err(|_| WireError::InvalidUtf8)?;
                name.push_str(label);
                name.push('.');
                if name.len() > MAX_NAME_LENGTH {
                    return Err(WireError::NameTooLong);
                }
            }
            POINTER_MASK => {
                let low = read_u8(packet, &mut cursor)?;
                let pointer = (((length & !POINTER_MASK) as usize) << 8) | low as usize;
                if pointer >= limit {
                    return Err(WireError::BadPointer {
                        pointer,
                        offset: cursor - 2,
                    });
                }
                limit = pointer;
                resume.get_or_insert(cursor);
                cursor = pointer;
            }
            _ => return Err(WireError::BadLabel(length)),
        }
    }

    *offset = resume.unwrap_or(cursor);
    Ok(name)
}

/// Append `name` to `packet`, reusing the longest suffix already present in
/// `name_map` as a compression pointer and remembering every new suffix.
pub fn write_name(packet: &mut Vec<u8>, name: &str, name_map: &mut NameMap) -> Result<(), WireError> {
    let mut fragment = name.strip_suffix('.').unwrap_or(name);
    while !fragment.is_empty() {
        if let Some(&offset) = name_map.get(fragment) {
            packet.extend_from_slice(&(offset | 0xc000).to_be_bytes());
            return Ok(());
        }
        let (label, rest) = fragment.split_once('.').unwrap_or((fragment, ""));
        if label.is_empty() {
            return Err(WireError::EmptyLabel(name.to_string()));
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(WireError::LabelTooLong(label.len()));
        }
        if packet.len() <= MAX_POINTER_OFFSET {
            name_map.insert(fragment.to_string(), packet.len() as u16);
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
        fragment = rest;
    }
    packet.push(0);
    Ok(())
}

/// Read one resource record. Unknown types keep only their header fields.
pub fn parse_record(packet: &[u8], offset: &mut usize) -> Result<Record, WireError> {
    let name = parse_name(packet, offset)?;
    let rtype = read_u16(packet, offset)?;
    let class = read_u16(packet, offset)?;
    let ttl = read_u32(packet, offset)?;
    let data_length = read_u16(packet, offset)? as usize;

    let start = *offset;
    let end = start + data_length;
    if end > packet.len() {
        return Err(WireError::Truncated {
            offset: start,
            needed: data_length,
        });
    }

    let mut record = Record {
        name,
        rtype,
        flush_cache: class & CLASS_TOP_BIT != 0,
        ttl,
        ..Record::default()
    };

    match rtype {
        A => {
            let octets: [u8; 4] = read_array(packet, offset)?;
            record.address = Some(IpAddr::V4(Ipv4Addr::from(octets)));
        }
        AAAA => {
            let octets: [u8; 16] = read_array(packet, offset)?;
            record.address = Some(IpAddr::V6(Ipv6Addr::from(octets)));
        }
        NSEC => {
            record.next_domain_name = parse_name(packet, offset)?;
            let window = read_u8(packet, offset)?;
            if window != 0 {
                return Err(WireError::UnsupportedWindow(window));
            }
            let length = read_u8(packet, offset)? as usize;
            record.bitmap = Bitmap::new(read_slice(packet, offset, length)?)?;
        }
        PTR => {
            record.target = parse_name(packet, offset)?;
        }
        SRV => {
            record.priority = read_u16(packet, offset)?;
            record.weight = read_u16(packet, offset)?;
            record.port = read_u16(packet, offset)?;
            record.target = parse_name(packet, offset)?;
        }
        TXT => {
            while *offset < end {
                let length = read_u8(packet, offset)? as usize;
                if length == 0 {
                    break;
                }
                let entry = read_slice(packet, offset, length)?;
                let (key, value) = match entry.iter().position(|&b| b == b'=') {
                    Some(split) => (&entry[..split], Some(entry[split + 1..].to_vec())),
                    None => (entry, None),
                };
                if key.is_empty() {
                    continue;
                }
                let key = String::from_utf8(key.to_vec()).map_err(|_| WireError::InvalidUtf8)?;
                // RFC 6763 section 6.4: only the first occurrence of a key counts
                record.attributes.entry(key).or_insert(value);
            }
        }
        _ => {}
    }

    if *offset > end {
        return Err(WireError::RdataOverrun(data_length));
    }
    *offset = end;
    Ok(record)
}

/// Append one resource record, back-filling RDLENGTH once the data is written.
pub fn write_record(packet: &mut Vec<u8>, record: &Record, name_map: &mut NameMap) -> Result<(), WireError> {
    write_name(packet, &record.name, name_map)?;
    packet.extend_from_slice(&record.rtype.to_be_bytes());
    let class = if record.flush_cache { CLASS_TOP_BIT | CLASS_IN } else { CLASS_IN };
    packet.extend_from_slice(&class.to_be_bytes());
    packet.extend_from_slice(&record.ttl.to_be_bytes());

    let length_at = packet.len();
    packet.extend_from_slice(&[0, 0]);

    match record.rtype {
        A => match record.address {
            Some(IpAddr::V4(address)) => packet.extend_from_slice(&address.octets()),
            _ => return Err(address_mismatch(record)),
        },
        AAAA => match record.address {
            Some(IpAddr::V6(address)) => packet.extend_from_slice(&address.octets()),
            _ => return Err(address_mismatch(record)),
        },
        NSEC => {
            write_name(packet, &record.next_domain_name, name_map)?;
            packet.push(0);
            packet.push(record.bitmap.len() as u8);
            packet.extend_from_slice(record.bitmap.data());
        }
        PTR => {
            write_name(packet, &record.target, name_map)?;
        }
        SRV => {
            packet.extend_from_slice(&record.priority.to_be_bytes());
            packet.extend_from_slice(&record.weight.to_be_bytes());
            packet.extend_from_slice(&record.port.to_be_bytes());
            write_name(packet, &record.target, name_map)?;
        }
        TXT => {
            if record.attributes.is_empty() {
                packet.push(0);
            }
            for (key, value) in &record.attributes {
                if key.is_empty() || key.contains('=') {
                    return Err(WireError::InvalidTxtKey(key.clone()));
                }
                let mut entry = key.as_bytes().to_vec();
                if let Some(value) = value {
                    entry.push(b'=');
                    entry.extend_from_slice(value);
                }
                if entry.len() > u8::MAX as usize {
                    return Err(WireError::TxtEntryTooLong(entry.len()));
                }
                packet.push(entry.len() as u8);
                packet.extend_from_slice(&entry);
            }
        }
        _ => {}
    }

    let data_length = packet.len() - length_at - 2;
    let data_length = u16::try_from(data_length).map_err(|_| WireError::RdataOverrun(data_length))?;
    packet[length_at..length_at + 2].copy_from_slice(&data_length.to_be_bytes());
    Ok(())
}

fn address_mismatch(record: &Record) -> WireError {
    WireError::AddressMismatch {
        name: record.name.clone(),
        rtype: type_name(record.rtype),
    }
}

/// Decode a complete packet. No partial message is produced on failure.
pub fn from_packet(packet: &[u8]) -> Result<Message, WireError> {
    let mut offset = 0;
    let transaction_id = read_u16(packet, &mut offset)?;
    let flags = read_u16(packet, &mut offset)?;
    let question_count = read_u16(packet, &mut offset)?;
    let answer_count = read_u16(packet, &mut offset)?;
    let authority_count = read_u16(packet, &mut offset)?;
    let additional_count = read_u16(packet, &mut offset)?;

    // Counts are under the sender's control, so nothing is pre-allocated from them
    let mut message = Message {
        transaction_id,
        is_response: flags & FLAG_RESPONSE != 0,
        ..Message::default()
    };

    for _ in 0..question_count {
        let name = parse_name(packet, &mut offset)?;
        let rtype = read_u16(packet, &mut offset)?;
        let class = read_u16(packet, &mut offset)?;
        message.queries.push(Query {
            name,
            rtype,
            unicast_response: class & CLASS_TOP_BIT != 0,
        });
    }

    let record_count = answer_count as usize + authority_count as usize + additional_count as usize;
    for _ in 0..record_count {
        message.records.push(parse_record(packet, &mut offset)?);
    }

    Ok(message)
}

/// Encode a message. Every record is written to the answer section.
pub fn to_packet(message: &Message) -> Result<Vec<u8>, WireError> {
    let question_count =
        u16::try_from(message.queries.len()).map_err(|_| WireError::TooManyEntries(message.queries.len()))?;
    let record_count =
        u16::try_from(message.records.len()).map_err(|_| WireError::TooManyEntries(message.records.len()))?;
    let flags = if message.is_response { FLAG_RESPONSE | FLAG_AUTHORITATIVE } else { 0 };

    let mut packet = Vec::with_capacity(512);
    packet.extend_from_slice(&message.transaction_id.to_be_bytes());
    packet.extend_from_slice(&flags.to_be_bytes());
    packet.extend_from_slice(&question_count.to_be_bytes());
    packet.extend_from_slice(&record_count.to_be_bytes());
    packet.extend_from_slice(&[0, 0, 0, 0]);

    let mut name_map = NameMap::new();
    for query in &message.queries {
        write_name(&mut packet, &query.name, &mut name_map)?;
        packet.extend_from_slice(&query.rtype.to_be_bytes());
        let class = if query.unicast_response { CLASS_TOP_BIT | CLASS_IN } else { CLASS_IN };
        packet.extend_from_slice(&class.to_be_bytes());
    }
    for record in &message.records {
        write_record(&mut packet, record, &mut name_map)?;
    }

    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::ANY;
    use shared::types::Attributes;

    const NAME_SIMPLE: &[u8] = b"\x04_tcp\x05local\x00";
    const NAME_POINTER: &[u8] = b"\x04_tcp\x05local\x00\x04test\xc0\x00";
    const NAME_CORRUPT: &[u8] = b"\x0312";

    const RECORD_A: &[u8] = b"\x04test\x00\x00\x01\x80\x01\x00\x00\x0e\x10\x00\x04\x7f\x00\x00\x01";
    const RECORD_AAAA: &[u8] = b"\x04test\x00\x00\x1c\x00\x01\x00\x00\x0e\x10\x00\x10\
        \x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x01";
    const RECORD_PTR: &[u8] = b"\x04test\x00\x00\x0c\x00\x01\x00\x00\x0e\x10\x00\x07\x05test2\x00";
    const RECORD_SRV: &[u8] =
        b"\x04test\x00\x00\x21\x00\x01\x00\x00\x0e\x10\x00\x0d\x00\x01\x00\x02\x00\x03\x05test2\x00";
    const RECORD_TXT: &[u8] = b"\x04test\x00\x00\x10\x00\x01\x00\x00\x0e\x10\x00\x06\x03a=a\x01b";

    fn attributes() -> Attributes {
        Attributes::from([("a".to_string(), Some(b"a".to_vec())), ("b".to_string(), None)])
    }

    fn parse_one(packet: &[u8]) -> Record {
        let mut offset = 0;
        let record = parse_record(packet, &mut offset).unwrap();
        assert_eq!(offset, packet.len());
        record
    }

    fn write_one(record: &Record) -> Vec<u8> {
        let mut packet = Vec::new();
        write_record(&mut packet, record, &mut NameMap::new()).unwrap();
        packet
    }

    #[test]
    fn test_parse_name_simple() {
        let mut offset = 0;
        assert_eq!(parse_name(NAME_SIMPLE, &mut offset).unwrap(), "_tcp.local.");
        assert_eq!(offset, 12);
    }

    #[test]
    fn test_parse_name_pointer() {
        let mut offset = 12;
        assert_eq!(parse_name(NAME_POINTER, &mut offset).unwrap(), "test._tcp.local.");
        assert_eq!(offset, 19);
    }

    #[test]
    fn test_parse_name_corrupt() {
        let mut offset = 0;
        assert!(matches!(
            parse_name(NAME_CORRUPT, &mut offset),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_parse_name_rejects_pointer_loop() {
        // A pointer to itself, then two pointers bouncing between each other
        let packet = b"\xc0\x00";
        assert!(matches!(parse_name(packet, &mut 0), Err(WireError::BadPointer { .. })));

        let packet = b"\x01a\xc0\x05\x01b\xc0\x00";
        let mut offset = 4;
        assert!(matches!(parse_name(packet, &mut offset), Err(WireError::BadPointer { .. })));
    }

    #[test]
    fn test_parse_name_rejects_forward_pointer() {
        let packet = b"\xc0\x02\x01a\x00";
        assert_eq!(
            parse_name(packet, &mut 0),
            Err(WireError::BadPointer { pointer: 2, offset: 0 })
        );
    }

    #[test]
    fn test_parse_name_rejects_reserved_label_type() {
        assert_eq!(parse_name(b"\x41a\x00", &mut 0), Err(WireError::BadLabel(0x41)));
    }

    #[test]
    fn test_write_name_simple() {
        let mut packet = Vec::new();
        write_name(&mut packet, "_tcp.local.", &mut NameMap::new()).unwrap();
        assert_eq!(packet, NAME_SIMPLE);
    }

    #[test]
    fn test_write_name_pointer() {
        let mut packet = NAME_SIMPLE.to_vec();
        let mut name_map = NameMap::from([("_tcp.local".to_string(), 0)]);
        write_name(&mut packet, "test._tcp.local.", &mut name_map).unwrap();
        assert_eq!(packet, NAME_POINTER);
        assert_eq!(name_map.get("test._tcp.local"), Some(&12));
    }

    #[test]
    fn test_write_name_rejects_bad_labels() {
        let long = format!("{}.local.", "x".repeat(64));
        assert_eq!(
            write_name(&mut Vec::new(), &long, &mut NameMap::new()),
            Err(WireError::LabelTooLong(64))
        );
        assert!(matches!(
            write_name(&mut Vec::new(), "a..local.", &mut NameMap::new()),
            Err(WireError::EmptyLabel(_))
        ));
    }

    #[test]
    fn test_parse_record_a() {
        let record = parse_one(RECORD_A);
        assert_eq!(record.name, "test.");
        assert_eq!(record.rtype, A);
        assert!(record.flush_cache);
        assert_eq!(record.ttl, 3600);
        assert_eq!(record.address, Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_parse_record_aaaa() {
        let record = parse_one(RECORD_AAAA);
        assert_eq!(record.rtype, AAAA);
        assert!(!record.flush_cache);
        assert_eq!(record.address, Some("::1".parse().unwrap()));
    }

    #[test]
    fn test_parse_record_ptr() {
        let record = parse_one(RECORD_PTR);
        assert_eq!(record.rtype, PTR);
        assert_eq!(record.target, "test2.");
    }

    #[test]
    fn test_parse_record_srv() {
        let record = parse_one(RECORD_SRV);
        assert_eq!(record.rtype, SRV);
        assert_eq!((record.priority, record.weight, record.port), (1, 2, 3));
        assert_eq!(record.target, "test2.");
    }

    #[test]
    fn test_parse_record_txt() {
        let record = parse_one(RECORD_TXT);
        assert_eq!(record.rtype, TXT);
        assert_eq!(record.attributes, attributes());
    }

    #[test]
    fn test_parse_record_txt_first_key_wins() {
        let packet = b"\x04test\x00\x00\x10\x00\x01\x00\x00\x0e\x10\x00\x0b\x03a=1\x03a=2\x02=x";
        let record = parse_one(packet);
        assert_eq!(
            record.attributes,
            Attributes::from([("a".to_string(), Some(b"1".to_vec()))])
        );
    }

    #[test]
    fn test_parse_record_unknown_type_is_skipped() {
        // HINFO (13) with two character strings
        let packet = b"\x04test\x00\x00\x0d\x00\x01\x00\x00\x00\x78\x00\x04\x01x\x01y";
        let record = parse_one(packet);
        assert_eq!(record.name, "test.");
        assert_eq!(record.rtype, 13);
        assert_eq!(record.ttl, 120);
    }

    #[test]
    fn test_parse_record_rejects_overrun() {
        // A record claiming two bytes of data but carrying an IPv4 address
        let packet = b"\x04test\x00\x00\x01\x00\x01\x00\x00\x0e\x10\x00\x02\x7f\x00\x00\x01";
        assert_eq!(parse_record(packet, &mut 0), Err(WireError::RdataOverrun(2)));
    }

    #[test]
    fn test_write_record_a() {
        let record = Record {
            flush_cache: true,
            address: Some("127.0.0.1".parse().unwrap()),
            ..Record::new("test.", A)
        };
        assert_eq!(write_one(&record), RECORD_A);
    }

    #[test]
    fn test_write_record_aaaa() {
        let record = Record {
            address: Some("::1".parse().unwrap()),
            ..Record::new("test.", AAAA)
        };
        assert_eq!(write_one(&record), RECORD_AAAA);
    }

    #[test]
    fn test_write_record_ptr() {
        let record = Record {
            target: "test2.".to_string(),
            ..Record::new("test.", PTR)
        };
        assert_eq!(write_one(&record), RECORD_PTR);
    }

    #[test]
    fn test_write_record_srv() {
        let record = Record {
            priority: 1,
            weight: 2,
            port: 3,
            target: "test2.".to_string(),
            ..Record::new("test.", SRV)
        };
        assert_eq!(write_one(&record), RECORD_SRV);
    }

    #[test]
    fn test_write_record_txt() {
        let record = Record {
            attributes: attributes(),
            ..Record::new("test.", TXT)
        };
        assert_eq!(write_one(&record), RECORD_TXT);
    }

    #[test]
    fn test_nsec_record() {
        let record = Record {
            next_domain_name: "host.local.".to_string(),
            bitmap: Bitmap::from_types(&[A, AAAA]),
            ttl: 120,
            ..Record::new("host.local.", NSEC)
        };
        let packet = write_one(&record);
        let parsed = parse_one(&packet);
        assert_eq!(parsed, record);
        assert!(parsed.bitmap.contains(AAAA));
    }

    #[test]
    fn test_message_roundtrip() {
        let mut message = Message::response();
        message.transaction_id = 7;
        message.add_query(Query::new("_http._tcp.local.", PTR));
        message.add_query(Query {
            unicast_response: true,
            ..Query::new("nas.local.", ANY)
        });
        message.add_record(Record {
            target: "My Service._http._tcp.local.".to_string(),
            ..Record::new("_http._tcp.local.", PTR)
        });
        message.add_record(Record {
            flush_cache: true,
            ttl: 120,
            port: 8080,
            target: "nas.local.".to_string(),
            ..Record::new("My Service._http._tcp.local.", SRV)
        });
        message.add_record(Record {
            attributes: attributes(),
            ..Record::new("My Service._http._tcp.local.", TXT)
        });
        message.add_record(Record {
            address: Some("192.168.1.10".parse().unwrap()),
            ..Record::new("nas.local.", A)
        });
        message.add_record(Record {
            address: Some("fe80::1".parse().unwrap()),
            ..Record::new("nas.local.", AAAA)
        });

        let packet = to_packet(&message).unwrap();
        let decoded = from_packet(&packet).unwrap();
        assert_eq!(decoded, message);
        for (decoded, original) in decoded.records.iter().zip(&message.records) {
            assert_eq!(decoded.ttl, original.ttl);
            assert_eq!(decoded.flush_cache, original.flush_cache);
        }
    }

    fn encode_one(record: Record) -> Result<Vec<u8>, WireError> {
        let mut message = Message::response();
        message.add_record(record);
        to_packet(&message)
    }

    #[test]
    fn test_address_records_need_an_address_of_their_family() {
        let result = encode_one(Record::new("h.local.", A));
        assert_eq!(
            result,
            Err(WireError::AddressMismatch {
                name: "h.local.".to_string(),
                rtype: "A",
            })
        );

        let result = encode_one(Record {
            address: Some("10.0.0.1".parse().unwrap()),
            ..Record::new("h.local.", AAAA)
        });
        assert!(matches!(result, Err(WireError::AddressMismatch { rtype: "AAAA", .. })));

        let result = encode_one(Record {
            address: Some("fe80::1".parse().unwrap()),
            ..Record::new("h.local.", A)
        });
        assert!(matches!(result, Err(WireError::AddressMismatch { rtype: "A", .. })));
    }

    #[test]
    fn test_txt_keys_that_cannot_be_decoded_are_rejected() {
        for key in ["a=b", ""] {
            let result = encode_one(Record {
                attributes: Attributes::from([(key.to_string(), Some(b"c".to_vec()))]),
                ..Record::new("test._tcp.local.", TXT)
            });
            assert_eq!(result, Err(WireError::InvalidTxtKey(key.to_string())));
        }
    }

    #[test]
    fn test_encoded_records_decode_to_themselves() {
        let records = [
            Record {
                address: Some("0.0.0.0".parse().unwrap()),
                ..Record::new("h.local.", A)
            },
            Record {
                address: Some("::ffff:10.0.0.1".parse().unwrap()),
                ..Record::new("h.local.", AAAA)
            },
            Record {
                attributes: Attributes::from([("path".to_string(), Some(b"/a=b".to_vec()))]),
                ..Record::new("test._tcp.local.", TXT)
            },
        ];
        for record in records {
            let packet = encode_one(record.clone()).unwrap();
            assert_eq!(from_packet(&packet).unwrap().records, vec![record]);
        }
    }

    #[test]
    fn test_compression_shrinks_repeated_names() {
        let mut message = Message::new();
        message.add_query(Query::new("My Service._http._tcp.local.", SRV));
        message.add_query(Query::new("My Service._http._tcp.local.", TXT));
        let packet = to_packet(&message).unwrap();
        // Second question is a two byte pointer plus type and class
        let first_name_length = "My Service._http._tcp.local.".len() + 1;
        assert_eq!(packet.len(), HEADER_LENGTH + first_name_length + 4 + 2 + 4);
        assert_eq!(from_packet(&packet).unwrap(), message);
    }

    #[test]
    fn test_query_encoding() {
        let mut message = Message::new();
        message.add_query(Query::new("My Service._http._tcp.local.", PTR));
        let decoded = from_packet(&to_packet(&message).unwrap()).unwrap();
        assert_eq!(decoded.queries[0].name, "My Service._http._tcp.local.");
        assert_eq!(decoded.queries[0].rtype, PTR);
        assert!(!decoded.is_response);
    }

    #[test]
    fn test_from_packet_rejects_bad_counts() {
        let mut message = Message::new();
        message.add_query(Query::new("test.local.", A));
        let mut packet = to_packet(&message).unwrap();
        // Claim a second question that is not there
        packet[5] = 2;
        assert!(matches!(from_packet(&packet), Err(WireError::Truncated { .. })));
        assert!(from_packet(&packet[..HEADER_LENGTH - 1]).is_err());
    }

    #[test]
    fn test_from_packet_reads_all_sections() {
        let mut message = Message::response();
        message.add_record(Record {
            address: Some("10.0.0.1".parse().unwrap()),
            ..Record::new("a.local.", A)
        });
        message.add_record(Record {
            address: Some("10.0.0.2".parse().unwrap()),
            ..Record::new("b.local.", A)
        });
        let mut packet = to_packet(&message).unwrap();
        // Move the second record into the additional section
        packet[7] = 1;
        packet[11] = 1;
        assert_eq!(from_packet(&packet).unwrap().records.len(), 2);
    }
}
