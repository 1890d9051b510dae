// 校验和算法参考 RFC 1071:
// https://www.rfc-editor.org/rfc/rfc1071
//
// the algorithm is simple: using a 32 bit accumulator, add sequential
// 16 bit words, and at the end fold all the carry bits from the top
// 16 bits back into the lower 16 bits. the complement of the folded
// sum is the checksum.

/// 16-bit one's complement Internet checksum over `buffer`.
///
/// An odd trailing byte is treated as if padded with a zero low byte.
/// The checksum field of the message must be zero when this is called
/// to compute the value to transmit; computed over a message whose
/// checksum field is already filled in, the result is `0`.
pub fn checksum(buffer: &[u8]) -> u16 {
    let mut sum = 0u32;

    for word in buffer.chunks(2) {
        let mut part = u16::from(word[0]) << 8;
        if word.len() > 1 {
            part += u16::from(word[1]);
        }
        sum = sum.wrapping_add(u32::from(part));
    }

    while (sum >> 16) > 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !sum as u16
}
