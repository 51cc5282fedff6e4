//! Checksum calculation for Chaino packets
//!
//! Packets carry a CRC-16/XMODEM over their payload; bus reply headers carry
//! a one-byte complement sum.

/// Size of the checksum prefix on every packet
pub const CHECKSUM_LEN: usize = 2;

/// CRC-16/XMODEM polynomial
const POLY: u16 = 0x1021;

/// CRC-16/XMODEM continuing from `seed`
/// Polynomial: 0x1021, RefIn: false, RefOut: false, XorOut: 0x0000
pub fn crc16(data: &[u8], seed: u16) -> u16 {
    let mut crc = seed;

    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// CRC-16/XMODEM
/// Polynomial: 0x1021, Init: 0x0000, RefIn: false, RefOut: false
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    crc16(data, 0)
}

/// Checksum prefix bytes for a payload (big-endian)
pub fn checksum_bytes(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    crc16_xmodem(payload).to_be_bytes()
}

/// Verify a `checksum ‖ payload` packet.
///
/// A packet of two bytes or fewer cannot hold a checksum plus a status byte
/// and is never valid.
pub fn verify(packet: &[u8]) -> bool {
    if packet.len() <= CHECKSUM_LEN {
        return false;
    }
    let received = u16::from_be_bytes([packet[0], packet[1]]);
    received == crc16_xmodem(&packet[CHECKSUM_LEN..])
}

/// Complement-sum checksum of a bus reply header (status, length)
pub fn header_checksum(status: u8, length: u8) -> u8 {
    !status.wrapping_add(length)
}
