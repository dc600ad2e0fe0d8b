//! The CRC-32 used to protect long-form PSI/SI sections (_ISO/IEC 13818-1_, Annex A).
//!
//! Polynomial `0x04C11DB7`, initial value `0xFFFFFFFF`, no bit reflection and no final XOR.
//! This is *not* the same as the zlib CRC-32.

const fn make_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = make_table();

/// Compute the CRC over the given bytes.
pub fn sum32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in data {
        crc = (crc << 8) ^ CRC_TABLE[((crc >> 24) ^ u32::from(b)) as usize];
    }
    crc
}

/// `true` if `data`, whose last 4 bytes hold a big-endian CRC, is intact.  Running the CRC over
/// the data *including* its trailing CRC value yields zero exactly when they agree.
pub fn check(data: &[u8]) -> bool {
    data.len() >= 4 && sum32(data) == 0
}
