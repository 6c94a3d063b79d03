//! Rolling frame checksum
//!
//! Not a CRC: the accumulator is rotated left one bit, the next byte is added,
//! and a carry out of the byte is folded back by subtracting 255 (not 256).

/// Accumulator seed (the STX value)
pub const CHECKSUM_SEED: u8 = 0x02;

/// Fold one byte into the accumulator
pub fn checksum_add(acc: u8, byte: u8) -> u8 {
    let sum = acc.rotate_left(1) as u16 + byte as u16;
    if sum > 255 {
        (sum - 255) as u8
    } else {
        sum as u8
    }
}

/// Checksum over an arbitrary byte sequence, starting from the seed
pub fn checksum<'a, I>(bytes: I) -> u8
where
    I: IntoIterator<Item = &'a u8>,
{
    bytes
        .into_iter()
        .fold(CHECKSUM_SEED, |acc, &b| checksum_add(acc, b))
}

/// Checksum of a message: LENGTH, MESSAGE_ID, COUNTER, then the unstuffed payload
pub fn message_checksum(declared_length: u8, message_id: u8, counter: u8, payload: &[u8]) -> u8 {
    checksum([declared_length, message_id, counter].iter().chain(payload))
}
