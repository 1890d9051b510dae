// IPv4 报文格式参考资料(相关 RFC ):
// https://www.rfc-editor.org/pdfrfc/rfc791.txt.pdf
//
//  |       0       |       1       |       2       |       3       |
//  |0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7|
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |Version|  IHL  |Type of Service|          Total Length         |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |         Identification        |Flags|      Fragment Offset    |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |  Time to Live |    Protocol   |         Header Checksum       |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |                       Source Address                          |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |                    Destination Address                        |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |                    Options                    |    Padding    |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// the header length is not fixed: the IHL field counts 4-byte blocks
// (so the byte length is IHL << 2), and the payload starts there.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Smallest legal IPv4 header (IHL = 5, no options).
pub const MIN_HEADER_SIZE: usize = 20;

pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("buffer too short for an ipv4 header ({0} byte)")]
    TooShort(usize),
    #[error("ipv4 header length field out of range ({0} byte)")]
    BadHeaderLength(usize),
    #[error("not an ipv4 packet (version = {0})")]
    BadVersion(u8),
}

/// A validated view over one IPv4 datagram.
///
/// `data` is the payload immediately after the (variable-length) header;
/// its length is bounded by the receive size, never by the total-length
/// field, so a lying header cannot push reads past the buffer.
pub struct IpV4Packet<'a> {
    pub header_len: usize,
    pub ttl: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub dest: Ipv4Addr,
    pub data: &'a [u8],
}

impl<'a> IpV4Packet<'a> {
    pub fn decode(buffer: &'a [u8]) -> Result<IpV4Packet<'a>, Error> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::TooShort(buffer.len()));
        }

        let version = buffer[0] >> 4;
        if version != 4 {
            return Err(Error::BadVersion(version));
        }

        let header_len = usize::from(buffer[0] & 0x0f) << 2;
        if header_len < MIN_HEADER_SIZE || header_len > buffer.len() {
            return Err(Error::BadHeaderLength(header_len));
        }

        let source = Ipv4Addr::new(buffer[12], buffer[13], buffer[14], buffer[15]);
        let dest = Ipv4Addr::new(buffer[16], buffer[17], buffer[18], buffer[19]);

        Ok(IpV4Packet {
            header_len,
            ttl: buffer[8],
            protocol: buffer[9],
            source,
            dest,
            data: &buffer[header_len..],
        })
    }
}
