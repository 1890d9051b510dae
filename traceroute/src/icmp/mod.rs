// 报文格式参考资料(相关 RFC ):
// ICMPv4: https://www.rfc-editor.org/pdfrfc/rfc792.txt.pdf
//
// every ICMP message starts with the same 8 byte header:
//
//  |       0       |       1       |       2       |       3       |
//  |0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7|
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |     Type      |      Code     |           Checksum            |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |                     Rest of Header                            |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |   Data   ...
//  +-+-+-+-+-
//
// for echo request/reply the "rest of header" is identifier + sequence
// number; for time-exceeded and destination-unreachable it is unused and
// the data section quotes the IP header + first 8 byte of the datagram
// that triggered the error.

mod echo;
mod error;

pub use echo::{EchoReply, EchoRequest};
pub use error::{DecodeError, DecodeResult};

pub const HEADER_SIZE: usize = 8;

pub const ECHO_REPLY: u8 = 0;
pub const DEST_UNREACHABLE: u8 = 3;
pub const ECHO_REQUEST: u8 = 8;
pub const TIME_EXCEEDED: u8 = 11;

/// Time-exceeded code: TTL reached zero in transit.
pub const CODE_TTL_IN_TRANSIT: u8 = 0;
/// Destination-unreachable code: the probe reached the host but hit a
/// closed port.
pub const CODE_PORT_UNREACHABLE: u8 = 3;

/// The common 8 byte header, plus whatever followed it.
pub struct Header<'a> {
    pub msg_type: u8,
    pub code: u8,
    pub ident: u16,
    pub seq_cnt: u16,
    pub payload: &'a [u8],
}

impl<'a> Header<'a> {
    pub fn decode(buffer: &'a [u8]) -> DecodeResult<Header<'a>> {
        if buffer.len() < HEADER_SIZE {
            return Err(DecodeError::InvalidSize(buffer.len()));
        }

        // ident/seq_cnt are only meaningful for echo messages; for error
        // messages the same four bytes are reserved and read as zero.
        let ident = (u16::from(buffer[4]) << 8) + u16::from(buffer[5]);
        let seq_cnt = (u16::from(buffer[6]) << 8) + u16::from(buffer[7]);

        Ok(Header {
            msg_type: buffer[0],
            code: buffer[1],
            ident,
            seq_cnt,
            payload: &buffer[HEADER_SIZE..],
        })
    }
}

fn write_checksum(buffer: &mut [u8]) {
    let sum = crate::checksum::checksum(buffer);
    buffer[2] = (sum >> 8) as u8;
    buffer[3] = (sum & 0xff) as u8;
}
