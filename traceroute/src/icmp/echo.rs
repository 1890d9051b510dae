// Echo or Echo Reply Message (RFC 792)
//  |       0       |       1       |       2       |       3       |
//  |0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7|
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |     Type      |      Code     |           Checksum            |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |           Identifier          |        Sequence Number        |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |   Data   ...
//  +-+-+-+-+-
//
// the identifier and sequence number are echoed back unchanged, which is
// what lets the sender match replies against requests. the checksum is
// computed over the entire message with the checksum field zeroed.

use std::io::Write;

use super::{write_checksum, DecodeError, DecodeResult, ECHO_REPLY, ECHO_REQUEST, HEADER_SIZE};

pub struct EchoRequest<'a> {
    pub ident: u16,
    pub seq_cnt: u16,
    pub payload: &'a [u8],
}

impl<'a> EchoRequest<'a> {
    /// Encodes the request into `buffer`, which must hold at least
    /// `HEADER_SIZE + payload.len()` bytes and should be zeroed by the
    /// caller: stale bytes past the payload would be summed into the
    /// checksum.
    pub fn encode(&self, buffer: &mut [u8]) -> DecodeResult<()> {
        buffer[0] = ECHO_REQUEST;
        buffer[1] = 0;

        buffer[4..=5].clone_from_slice(&self.ident.to_be_bytes());
        buffer[6..=7].clone_from_slice(&self.seq_cnt.to_be_bytes());

        if (&mut buffer[HEADER_SIZE..]).write_all(self.payload).is_err() {
            return Err(DecodeError::InvalidSize(buffer.len()));
        }

        write_checksum(buffer);
        Ok(())
    }
}

pub struct EchoReply<'a> {
    pub ident: u16,
    pub seq_cnt: u16,
    pub payload: &'a [u8],
}

impl<'a> EchoReply<'a> {
    pub fn decode(buffer: &'a [u8]) -> DecodeResult<EchoReply<'a>> {
        if buffer.len() < HEADER_SIZE {
            return Err(DecodeError::InvalidSize(buffer.len()));
        }

        let type_ = buffer[0];
        let code = buffer[1];
        if type_ != ECHO_REPLY || code != 0 {
            return Err(DecodeError::InvalidPacket(type_, code));
        }

        let ident = (u16::from(buffer[4]) << 8) + u16::from(buffer[5]);
        let seq_cnt = (u16::from(buffer[6]) << 8) + u16::from(buffer[7]);

        Ok(EchoReply {
            ident,
            seq_cnt,
            payload: &buffer[HEADER_SIZE..],
        })
    }
}
