//! Outgoing probe construction.
//!
//! A probe is either an ICMP echo request or a bare UDP datagram. Both
//! carry a fixed-layout record identifying the probe, so that whatever a
//! router quotes back inside an ICMP error can be matched against the
//! probe that triggered it:
//!
//!  |       0       |       1       |       2       |       3       |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |        Sequence Number        |              TTL              |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                      Send Time (seconds)                      |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                    Send Time (microseconds)                   |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! In an echo probe the record sits at offset 0 of the 56 byte data
//! section, the rest of which is `0xA5` filler; a UDP probe is the record
//! and nothing else.

use std::process::id;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::icmp::{EchoRequest, HEADER_SIZE};

/// Bytes of optional data carried by an echo probe.
pub const ICMP_DATA_LEN: usize = 56;
/// Wire size of a [`ProbeRecord`].
pub const RECORD_SIZE: usize = 12;
/// Filler byte for the data section not covered by the record.
pub const FILLER: u8 = 0xA5;

/// Base destination port for UDP probes; the per-probe port is
/// `BASE_DST_PORT + seq`. High enough that nothing should listen there.
pub const BASE_DST_PORT: u16 = 32768 + 666;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    IcmpEcho,
    Udp,
}

/// ICMP identifier / UDP source-port token unique to this process.
pub fn process_ident() -> u16 {
    id() as u16
}

/// Local source port the UDP send socket binds to. Forced above the
/// reserved range so the bind never needs privileges.
pub fn local_source_port() -> u16 {
    (id() as u16 & 0x7fff) | 0x8000
}

/// Identity of one outstanding probe, as written into its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRecord {
    pub seq: u16,
    pub ttl: u16,
    pub sent_secs: u32,
    pub sent_micros: u32,
}

impl ProbeRecord {
    pub fn new(seq: u16, ttl: u16) -> ProbeRecord {
        // wall-clock send time; RTT itself is measured with a monotonic
        // timer by the walker, this is wire-format identification only
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        ProbeRecord {
            seq,
            ttl,
            sent_secs: since_epoch.as_secs() as u32,
            sent_micros: since_epoch.subsec_micros(),
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) {
        buffer[0..2].clone_from_slice(&self.seq.to_be_bytes());
        buffer[2..4].clone_from_slice(&self.ttl.to_be_bytes());
        buffer[4..8].clone_from_slice(&self.sent_secs.to_be_bytes());
        buffer[8..12].clone_from_slice(&self.sent_micros.to_be_bytes());
    }

    pub fn decode(buffer: &[u8]) -> Option<ProbeRecord> {
        if buffer.len() < RECORD_SIZE {
            return None;
        }

        Some(ProbeRecord {
            seq: u16::from_be_bytes([buffer[0], buffer[1]]),
            ttl: u16::from_be_bytes([buffer[2], buffer[3]]),
            sent_secs: u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]),
            sent_micros: u32::from_be_bytes([buffer[8], buffer[9], buffer[10], buffer[11]]),
        })
    }
}

/// One probe in flight: the wire record plus everything the correlator
/// needs to recognize its reply. At most one of these exists at a time.
#[derive(Debug, Clone, Copy)]
pub struct OutstandingProbe {
    pub kind: ProbeKind,
    /// ICMP identifier (echo kind).
    pub ident: u16,
    pub record: ProbeRecord,
    /// Local source port the send socket is bound to (UDP kind).
    pub src_port: u16,
    /// Destination port the probe was addressed to (UDP kind),
    /// `base_port + seq`.
    pub dst_port: u16,
}

/// Builds the bytes to transmit for one probe.
///
/// The buffer is zeroed before any field is written; the echo checksum is
/// computed last, over header + data.
pub fn build_probe(kind: ProbeKind, ident: u16, record: &ProbeRecord) -> Vec<u8> {
    match kind {
        ProbeKind::IcmpEcho => {
            let mut payload = [0u8; ICMP_DATA_LEN];
            payload[RECORD_SIZE..].fill(FILLER);
            record.encode(&mut payload);

            let mut buffer = vec![0u8; HEADER_SIZE + ICMP_DATA_LEN];
            let request = EchoRequest {
                ident,
                seq_cnt: record.seq,
                payload: &payload,
            };
            // infallible: the buffer is sized for the payload
            request
                .encode(&mut buffer)
                .expect("echo probe buffer sized for payload");

            buffer
        }
        ProbeKind::Udp => {
            let mut buffer = vec![0u8; RECORD_SIZE];
            record.encode(&mut buffer);
            buffer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum;

    #[test]
    fn record_roundtrip() {
        let record = ProbeRecord {
            seq: 5,
            ttl: 3,
            sent_secs: 1_700_000_000,
            sent_micros: 123_456,
        };

        let mut wire = [0u8; RECORD_SIZE];
        record.encode(&mut wire);
        assert_eq!(ProbeRecord::decode(&wire), Some(record));
    }

    #[test]
    fn record_decode_needs_twelve_bytes() {
        assert_eq!(ProbeRecord::decode(&[0u8; RECORD_SIZE - 1]), None);
    }

    #[test]
    fn echo_probe_layout() {
        let record = ProbeRecord::new(9, 4);
        let buffer = build_probe(ProbeKind::IcmpEcho, 0x1234, &record);

        assert_eq!(buffer.len(), HEADER_SIZE + ICMP_DATA_LEN);
        // checksum over the whole message self-verifies
        assert_eq!(checksum(&buffer), 0);
        // record at data offset 0, filler after it
        assert_eq!(
            ProbeRecord::decode(&buffer[HEADER_SIZE..]),
            Some(record)
        );
        assert!(buffer[HEADER_SIZE + RECORD_SIZE..].iter().all(|&b| b == FILLER));
        // header seq mirrors the record seq
        assert_eq!(u16::from_be_bytes([buffer[6], buffer[7]]), 9);
    }

    #[test]
    fn udp_probe_is_record_only() {
        let record = ProbeRecord::new(2, 1);
        let buffer = build_probe(ProbeKind::Udp, 0, &record);

        assert_eq!(buffer.len(), RECORD_SIZE);
        assert_eq!(ProbeRecord::decode(&buffer), Some(record));
    }

    #[test]
    fn source_port_is_above_reserved_range() {
        assert!(local_source_port() >= 0x8000);
    }
}
