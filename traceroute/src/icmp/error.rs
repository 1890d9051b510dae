use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("buffer too short for an icmp message ({0} byte)")]
    InvalidSize(usize),

    #[error("unexpected icmp type/code ({0}/{1})")]
    InvalidPacket(u8, u8),
}
pub type DecodeResult<T> = Result<T, DecodeError>;
