//! Checksum algorithms of the three receiver protocols
//!
//! Supports: UBX Fletcher-8 pair, NMEA XOR, RTCM3 CRC-24Q

/// Running UBX checksum (8-bit Fletcher over class, id, length and body)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fletcher8 {
    a: u8,
    b: u8,
}

impl Fletcher8 {
    /// Fresh accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one byte in
    pub fn update(&mut self, byte: u8) {
        self.a = self.a.wrapping_add(byte);
        self.b = self.b.wrapping_add(self.a);
    }

    /// Current `(CK_A, CK_B)` pair
    pub fn finish(&self) -> (u8, u8) {
        (self.a, self.b)
    }
}

/// UBX checksum of `data` (everything between the sync chars and the checksum)
pub fn ubx_checksum(data: &[u8]) -> (u8, u8) {
    let mut ck = Fletcher8::new();
    data.iter().for_each(|&b| ck.update(b));
    ck.finish()
}

/// XOR checksum - XOR of all bytes
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

// ============ CRC-24Q ============

const CRC24Q_POLY: u32 = 0x0186_4CFB;
const CRC24Q_MASK: u32 = 0x00FF_FFFF;

const fn crc24q_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24Q_POLY;
            }
            bit += 1;
        }
        table[i] = crc & CRC24Q_MASK;
        i += 1;
    }
    table
}

static CRC24Q_TABLE: [u32; 256] = crc24q_table();

/// Fold one byte into a running CRC-24Q (seed 0)
pub fn crc24q_update(crc: u32, byte: u8) -> u32 {
    let index = ((crc >> 16) as u8 ^ byte) as usize;
    ((crc << 8) ^ CRC24Q_TABLE[index]) & CRC24Q_MASK
}

/// CRC-24Q as used by RTCM 3
pub fn crc24q(data: &[u8]) -> u32 {
    data.iter().fold(0, |crc, &b| crc24q_update(crc, b))
}
