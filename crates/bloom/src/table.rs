use std::io::{self, Read, Write};

use crate::filter::BloomFilter;
use crate::varint;

/// Skip-index granularity: remember the byte offset of every 16th filter so
/// random access costs at most 15 varint skips plus one direct offset.
pub const BLOOMTABLE_INTERVAL: u32 = 16;

/// The concatenated bloom filters for every barrel of one sealed Table.
///
/// Filters are stored back to back as `varint(bytes) || bits`; `offsets[i]`
/// is the byte offset of filter `i * BLOOMTABLE_INTERVAL` within `raw_bf`.
pub struct BloomTable {
    raw_bf: Vec<u8>,
    nr_bf: u32,
    offsets: Vec<u32>,
}

impl BloomTable {
    /// Packs `filters` (one per barrel, in barrel-id order) into a single slab.
    pub fn build(filters: &[BloomFilter]) -> Self {
        let nr_bf = filters.len() as u32;
        let mut raw_bf = Vec::new();
        let mut offsets = Vec::with_capacity((nr_bf as usize / BLOOMTABLE_INTERVAL as usize) + 1);
        for (i, bf) in filters.iter().enumerate() {
            if i % BLOOMTABLE_INTERVAL as usize == 0 {
                offsets.push(raw_bf.len() as u32);
            }
            bf.write_to(&mut raw_bf).expect("writing to Vec cannot fail");
        }
        Self {
            raw_bf,
            nr_bf,
            offsets,
        }
    }

    pub fn nr_bf(&self) -> u32 {
        self.nr_bf
    }

    pub fn raw_bf(&self) -> &[u8] {
        &self.raw_bf
    }

    /// Tests whether `hv` might be present in the filter for barrel `index`.
    pub fn matches(&self, index: u32, hv: u64) -> bool {
        let bf = self.filter_at(index);
        bf.matches(hv)
    }

    /// Reads and reconstructs the `BloomFilter` stored for `index`, skipping
    /// forward from the nearest skip-index entry.
    fn filter_at(&self, index: u32) -> BloomFilter {
        assert!(index < self.nr_bf);
        let skip_slot = (index / BLOOMTABLE_INTERVAL) as usize;
        let mut cursor = &self.raw_bf[self.offsets[skip_slot] as usize..];
        let remaining = index % BLOOMTABLE_INTERVAL;
        for _ in 0..remaining {
            let (len, consumed) = varint::decode_u64(cursor).expect("corrupt bloomtable slab");
            cursor = &cursor[consumed + len as usize..];
        }
        BloomFilter::read_from(&mut cursor).expect("corrupt bloomtable slab")
    }

    /// Writes `u32 nr_bf` followed by `u32 raw_len` and the raw slab.
    pub fn dump<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.nr_bf.to_le_bytes())?;
        w.write_all(&(self.raw_bf.len() as u32).to_le_bytes())?;
        w.write_all(&self.raw_bf)
    }

    /// Reads back a table written by [`BloomTable::dump`], rebuilding the
    /// skip-index from the slab contents.
    pub fn load<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf4 = [0u8; 4];
        r.read_exact(&mut buf4)?;
        let nr_bf = u32::from_le_bytes(buf4);
        r.read_exact(&mut buf4)?;
        let raw_len = u32::from_le_bytes(buf4) as usize;
        let mut raw_bf = vec![0u8; raw_len];
        r.read_exact(&mut raw_bf)?;

        let mut offsets = Vec::with_capacity((nr_bf as usize / BLOOMTABLE_INTERVAL as usize) + 1);
        let mut cursor: &[u8] = &raw_bf;
        let mut off = 0u32;
        for i in 0..nr_bf {
            if i % BLOOMTABLE_INTERVAL == 0 {
                offsets.push(off);
            }
            let (len, consumed) = varint::decode_u64(cursor)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "corrupt bloomtable"))?;
            let step = consumed + len as usize;
            cursor = &cursor[step..];
            off += step as u32;
        }
        Ok(Self {
            raw_bf,
            nr_bf,
            offsets,
        })
    }

    /// Parses out the individual filters, in barrel-id order. Used by
    /// [`crate::container::BloomContainer`] when building or merging cohorts.
    pub fn into_filters_ref(&self) -> Vec<BloomFilter> {
        let mut out = Vec::with_capacity(self.nr_bf as usize);
        let mut cursor: &[u8] = &self.raw_bf;
        for _ in 0..self.nr_bf {
            out.push(BloomFilter::read_from(&mut cursor).expect("corrupt bloomtable slab"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> Vec<BloomFilter> {
        (0..40u32)
            .map(|i| {
                let mut bf = BloomFilter::new(4);
                bf.update(i as u64 * 7 + 1);
                bf
            })
            .collect()
    }

    #[test]
    fn probe_matches_every_barrel() {
        let fs = filters();
        let bt = BloomTable::build(&fs);
        for i in 0..fs.len() as u32 {
            assert!(bt.matches(i, i as u64 * 7 + 1));
        }
    }

    #[test]
    fn dump_load_round_trip() {
        let fs = filters();
        let bt = BloomTable::build(&fs);
        let mut buf = Vec::new();
        bt.dump(&mut buf).unwrap();
        let bt2 = BloomTable::load(&mut &buf[..]).unwrap();
        for i in 0..fs.len() as u32 {
            assert_eq!(bt.matches(i, 999), bt2.matches(i, 999));
        }
    }
}
