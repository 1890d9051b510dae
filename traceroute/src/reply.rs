//! Incoming datagram parsing.
//!
//! A reply datagram read off the raw socket nests up to four headers:
//!
//!   outer IPv4 | outer ICMP | quoted IPv4 | quoted ICMP or UDP | ...
//!
//! The quoted pair is only present for time-exceeded and
//! destination-unreachable messages, where the router copies the probe's
//! own IP header and leading payload bytes back to the sender. Every
//! offset step below is gated on the received length; a truncated or
//! malformed datagram yields a [`ParseError`], which the walker logs and
//! ignores.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::icmp::{self, Header};
use crate::ip::{self, protocol, IpV4Packet};
use crate::probe::ProbeRecord;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("bad outer ip header: {0}")]
    Ip(#[from] ip::Error),

    #[error("outer packet is not icmp (protocol = {0})")]
    NotIcmp(u8),

    #[error("bad icmp header: {0}")]
    Icmp(#[from] icmp::DecodeError),

    #[error("quoted packet too short ({0} byte)")]
    QuoteTooShort(usize),

    #[error("bad quoted ip header: {0}")]
    QuotedIp(ip::Error),

    #[error("quoted packet has unexpected protocol ({0})")]
    QuotedProtocol(u8),

    #[error("unrecognized icmp message (type = {0}, code = {1})")]
    UnexpectedMessage(u8, u8),
}

/// The original probe as quoted inside an ICMP error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotedProbe {
    Icmp {
        ident: u16,
        seq_cnt: u16,
        /// `None` when the router truncated the quote below the record.
        record: Option<ProbeRecord>,
    },
    Udp {
        src_port: u16,
        dst_port: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyBody {
    /// Echo reply from the destination itself; the record sits directly
    /// in the outer ICMP payload.
    EchoReply {
        ident: u16,
        record: Option<ProbeRecord>,
    },
    /// A router dropped the probe when its TTL reached zero.
    TimeExceeded { quoted: QuotedProbe },
    /// The destination (or a router) could not deliver the probe.
    Unreachable { code: u8, quoted: QuotedProbe },
}

/// One validated, decoded reply datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedReply {
    pub source: Ipv4Addr,
    pub body: ReplyBody,
}

/// Decodes a raw datagram into a [`ParsedReply`].
///
/// Never reads past `buffer`; anything shorter than the minimum header
/// chain for its message type fails with an explicit error.
pub fn parse(buffer: &[u8]) -> Result<ParsedReply, ParseError> {
    let outer_ip = IpV4Packet::decode(buffer)?;
    if outer_ip.protocol != protocol::ICMP {
        return Err(ParseError::NotIcmp(outer_ip.protocol));
    }

    let outer = Header::decode(outer_ip.data)?;

    let body = match (outer.msg_type, outer.code) {
        (icmp::ECHO_REPLY, 0) => ReplyBody::EchoReply {
            ident: outer.ident,
            record: ProbeRecord::decode(outer.payload),
        },
        (icmp::TIME_EXCEEDED, icmp::CODE_TTL_IN_TRANSIT) => ReplyBody::TimeExceeded {
            quoted: parse_quote(outer.payload)?,
        },
        (icmp::DEST_UNREACHABLE, code) => ReplyBody::Unreachable {
            code,
            quoted: parse_quote(outer.payload)?,
        },
        (msg_type, code) => return Err(ParseError::UnexpectedMessage(msg_type, code)),
    };

    Ok(ParsedReply {
        source: outer_ip.source,
        body,
    })
}

/// Decodes the quoted IP header + leading transport bytes of an ICMP
/// error payload.
fn parse_quote(quote: &[u8]) -> Result<QuotedProbe, ParseError> {
    // the quote must at least fit an unpadded ip header plus the four
    // bytes holding the transport ports / icmp type line
    if quote.len() < ip::MIN_HEADER_SIZE + 4 {
        return Err(ParseError::QuoteTooShort(quote.len()));
    }

    let quoted_ip = IpV4Packet::decode(quote).map_err(ParseError::QuotedIp)?;

    match quoted_ip.protocol {
        protocol::ICMP => {
            let quoted_icmp = Header::decode(quoted_ip.data)?;
            Ok(QuotedProbe::Icmp {
                ident: quoted_icmp.ident,
                seq_cnt: quoted_icmp.seq_cnt,
                record: ProbeRecord::decode(quoted_icmp.payload),
            })
        }
        protocol::UDP => {
            // the first four bytes of a udp header are the two ports,
            // which is all the correlator needs
            let ports = quoted_ip.data;
            if ports.len() < 4 {
                return Err(ParseError::QuoteTooShort(ports.len()));
            }
            Ok(QuotedProbe::Udp {
                src_port: u16::from_be_bytes([ports[0], ports[1]]),
                dst_port: u16::from_be_bytes([ports[2], ports[3]]),
            })
        }
        other => Err(ParseError::QuotedProtocol(other)),
    }
}
