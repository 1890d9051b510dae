//! Matching parsed replies against the outstanding probe.
//!
//! Echo probes are identified by the `{seq, ttl}` pair of the record the
//! router quotes back (or that the destination echoes); UDP probes are
//! identified by the quoted UDP port pair, since the destination port is
//! varied per probe as `base_port + seq` and the source port is bound to
//! a process-derived value. Ports survive even when a router quotes only
//! the minimum 8 byte of the original datagram.

use crate::icmp::CODE_PORT_UNREACHABLE;
use crate::probe::{OutstandingProbe, ProbeKind};
use crate::reply::{ParsedReply, QuotedProbe, ReplyBody};

/// What one probe attempt amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// A router en route dropped the probe (TTL reached zero).
    TtlExceeded,
    /// The destination was reached and the probe port was closed.
    UnreachablePort,
    /// Unreachable for another reason (net/host/protocol).
    UnreachableOther,
    /// Echo reply from the destination itself.
    DestinationHit,
    /// The deadline elapsed with no correlated reply.
    Timeout,
}

impl ReplyClass {
    /// Terminal classes end the TTL walk.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReplyClass::UnreachablePort | ReplyClass::UnreachableOther | ReplyClass::DestinationHit
        )
    }
}

/// Matches `reply` against `probe`. `None` means the datagram parsed but
/// does not belong to the outstanding probe; the caller keeps waiting.
pub fn correlate(reply: &ParsedReply, probe: &OutstandingProbe) -> Option<ReplyClass> {
    match reply.body {
        ReplyBody::EchoReply { ident, record } => {
            if probe.kind != ProbeKind::IcmpEcho || ident != probe.ident {
                return None;
            }
            let record = record?;
            (record.seq == probe.record.seq && record.ttl == probe.record.ttl)
                .then(|| ReplyClass::DestinationHit)
        }
        ReplyBody::TimeExceeded { quoted } => {
            matches_quote(&quoted, probe).then(|| ReplyClass::TtlExceeded)
        }
        ReplyBody::Unreachable { code, quoted } => {
            matches_quote(&quoted, probe).then(|| {
                if code == CODE_PORT_UNREACHABLE {
                    ReplyClass::UnreachablePort
                } else {
                    ReplyClass::UnreachableOther
                }
            })
        }
    }
}

fn matches_quote(quoted: &QuotedProbe, probe: &OutstandingProbe) -> bool {
    match (*quoted, probe.kind) {
        (QuotedProbe::Icmp { ident, seq_cnt, record }, ProbeKind::IcmpEcho) => match record {
            Some(record) => record.seq == probe.record.seq && record.ttl == probe.record.ttl,
            // router quoted only the 8 byte icmp header; fall back to the
            // echoed identifier + sequence, which carry the same identity
            None => ident == probe.ident && seq_cnt == probe.record.seq,
        },
        (QuotedProbe::Udp { src_port, dst_port }, ProbeKind::Udp) => {
            src_port == probe.src_port && dst_port == probe.dst_port
        }
        _ => false,
    }
}
