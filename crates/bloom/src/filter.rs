use std::io::{self, Read, Write};

use crate::varint;

/// Bits of filter per key. Fixed by the on-disk format; changing it changes
/// the false-positive rate and the sizing of every filter ever written.
pub const BITS_PER_KEY: u32 = 16;

/// Number of double-hash probes per key.
pub const NR_PROBES: u32 = 11;

/// A single bloom filter over 64-bit hash values.
///
/// The bit count is `bytes * 8 - 3`, not `bytes * 8` -- the three-bit deficit
/// decorrelates `h % bits` from `h % 8`, which matters because probes are
/// derived from the same 64-bit `hv` by repeated addition of a fixed delta.
/// Do not round this up to a clean power of two.
pub struct BloomFilter {
    bytes: u32,
    nr_keys: u32,
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Sizes a filter for `nr_keys` expected insertions.
    pub fn new(nr_keys: u32) -> Self {
        let bytes = ((nr_keys as u64 * BITS_PER_KEY as u64 + 7) / 8).max(8) as u32;
        Self {
            bytes,
            nr_keys,
            bits: vec![0u8; bytes as usize],
        }
    }

    fn odd_bits(&self) -> u64 {
        (self.bytes as u64) * 8 - 3
    }

    /// Inserts `hv` into the filter.
    pub fn update(&mut self, hv: u64) {
        let bits = self.odd_bits();
        let delta = (hv >> 31) | (hv << 33);
        let mut h = hv;
        for _ in 0..NR_PROBES {
            self.set_bit(h % bits);
            h = h.wrapping_add(delta);
        }
    }

    /// Returns `false` only if `hv` was definitely never inserted.
    pub fn matches(&self, hv: u64) -> bool {
        let bits = self.odd_bits();
        let delta = (hv >> 31) | (hv << 33);
        let mut h = hv;
        for _ in 0..NR_PROBES {
            if !self.get_bit(h % bits) {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }

    pub fn bytes(&self) -> u32 {
        self.bytes
    }

    pub fn nr_keys(&self) -> u32 {
        self.nr_keys
    }

    fn set_bit(&mut self, idx: u64) {
        let byte = (idx / 8) as usize;
        let bit = (idx % 8) as u8;
        self.bits[byte] |= 1 << bit;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte = (idx / 8) as usize;
        let bit = (idx % 8) as u8;
        (self.bits[byte] >> bit) & 1 == 1
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn from_raw(bytes: u32, nr_keys: u32, bits: Vec<u8>) -> Self {
        debug_assert_eq!(bits.len(), bytes as usize);
        Self {
            bytes,
            nr_keys,
            bits,
        }
    }

    /// `varint(bytes) || filter bits`, the slab format used inside a BloomTable.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut len_buf = Vec::with_capacity(4);
        varint::encode_u64(&mut len_buf, self.bytes as u64);
        w.write_all(&len_buf)?;
        w.write_all(&self.bits)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let bytes = read_varint(r)? as u32;
        let mut bits = vec![0u8; bytes as usize];
        r.read_exact(&mut bits)?;
        // nr_keys is not recoverable from the slab; callers that need it
        // track it out of band (BloomTable does not need nr_keys after build).
        Ok(Self::from_raw(bytes, 0, bits))
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("bytes", &self.bytes)
            .field("nr_keys", &self.nr_keys)
            .field("bits", &self.odd_bits())
            .finish()
    }
}

/// Reads a varint one byte at a time from a `Read`, since the slab reader
/// does not know the length up front.
pub(crate) fn read_varint<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut result: u64 = 0;
    let mut one = [0u8; 1];
    for i in 0..10 {
        r.read_exact(&mut one)?;
        let byte = one[0];
        result |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_false_negatives() {
        let mut bf = BloomFilter::new(100);
        let hvs: Vec<u64> = (0..100).map(|i| i * 0x9E3779B97F4A7C15u64).collect();
        for &hv in &hvs {
            bf.update(hv);
        }
        for &hv in &hvs {
            assert!(bf.matches(hv));
        }
    }

    #[test]
    fn sizing_uses_odd_bits() {
        let bf = BloomFilter::new(8);
        assert_eq!(bf.bytes(), 16);
    }

    #[test]
    fn round_trip() {
        let mut bf = BloomFilter::new(10);
        bf.update(42);
        let mut buf = Vec::new();
        bf.write_to(&mut buf).unwrap();
        let bf2 = BloomFilter::read_from(&mut &buf[..]).unwrap();
        assert!(bf2.matches(42));
        assert_eq!(bf2.bytes(), bf.bytes());
    }
}
