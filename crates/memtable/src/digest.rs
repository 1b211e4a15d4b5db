//! The 160-bit key digest and the fixed byte-offset views the engine reads
//! from it. These offsets are the wire contract: every barrel id, bloom
//! input, and trie-descent decision the engine ever makes is derived from
//! one of the views below, and changing an offset silently breaks
//! on-disk compatibility.

use sha1::{Digest as _, Sha1};

/// Number of barrels in a Table. A prime, chosen so that `digest % TABLE_NR_BARRELS`
/// distributes evenly regardless of digest bit patterns.
pub const TABLE_NR_BARRELS: u64 = 8191;

/// Number of intra-barrel hash buckets.
pub const BARREL_NR_HT: u32 = 64;

/// A 20-byte (160-bit) key digest.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Digest(pub [u8; 20]);

impl Digest {
    /// Computes the digest of a key. The engine treats this as an internal
    /// implementation detail (SHA-1) rather than a pluggable collaborator,
    /// since every on-disk byte offset assumes a 20-byte digest.
    pub fn of(key: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(key);
        let out = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&out);
        Digest(bytes)
    }

    /// Reads an unaligned little-endian `u64` starting at byte `offset`.
    fn le_u64_at(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[offset..offset + 8]);
        u64::from_le_bytes(buf)
    }

    /// Reads an unaligned little-endian `u32` starting at byte `offset`.
    fn le_u32_at(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.0[offset..offset + 4]);
        u32::from_le_bytes(buf)
    }

    /// `bid = digest[4..12) % TABLE_NR_BARRELS`: the barrel a key belongs to.
    pub fn barrel_id(&self) -> u16 {
        (self.le_u64_at(4) % TABLE_NR_BARRELS) as u16
    }

    /// `hv = digest[12..20)`: input to the bloom filter double-hash.
    pub fn bloom_hv(&self) -> u64 {
        self.le_u64_at(12)
    }

    /// `digest[16..20) % 64`: the intra-barrel hash-chain bucket.
    pub fn ht_bucket(&self) -> u32 {
        self.le_u32_at(16) % BARREL_NR_HT
    }

    /// The "order hash" used to rank items for displacement within barrel
    /// `bid`: `digest[12..16)` rotated left by `bid mod 32`.
    pub fn order_hash(&self, bid: u16) -> u32 {
        let hv = self.le_u32_at(12);
        hv.rotate_left((bid as u32) % 32)
    }

    /// Child-slot selector (0..8) at the trie level whose `start_bit == bid + 3`,
    /// used during compaction feed and read descent. `bid` here is the
    /// *parent* barrel id that the feeding table's byte-offset math keys off.
    ///
    /// `byte offset 4 + ((bid - 3)/8)`, little-endian 64-bit, shifted right
    /// by `(bid - 3) mod 8`, low 3 bits.
    pub fn child_slot(&self, bid: u64) -> u8 {
        let shifted_bid = bid.wrapping_sub(3);
        let byte_off = 4 + (shifted_bid / 8) as usize;
        let v = self.le_u64_at(byte_off.min(self.0.len() - 8));
        let shift = shifted_bid % 8;
        ((v >> shift) & 0b111) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Digest::of(b"hello").0, Digest::of(b"hello").0);
        assert_ne!(Digest::of(b"hello").0, Digest::of(b"world").0);
    }

    #[test]
    fn barrel_id_in_range() {
        for i in 0..1000u32 {
            let d = Digest::of(format!("key-{i}").as_bytes());
            assert!((d.barrel_id() as u64) < TABLE_NR_BARRELS);
        }
    }

    #[test]
    fn ht_bucket_in_range() {
        let d = Digest::of(b"some-key");
        assert!(d.ht_bucket() < BARREL_NR_HT);
    }
}
