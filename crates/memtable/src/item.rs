use crate::digest::Digest;
use crate::varint;

/// An owned key/value pair, the public unit of insertion and lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An item resident in a barrel's hash chain. Carries the precomputed digest
/// so the barrel never rehashes the key, and `nr_moved` purely as a
/// diagnostic counter (not part of any on-disk format).
#[derive(Clone, Debug)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub digest: Digest,
    pub nr_moved: u16,
}

impl Item {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        let digest = Digest::of(&key);
        Self {
            key,
            value,
            digest,
            nr_moved: 0,
        }
    }

    pub fn with_digest(key: Vec<u8>, value: Vec<u8>, digest: Digest) -> Self {
        Self {
            key,
            value,
            digest,
            nr_moved: 0,
        }
    }

    /// Encoded on-disk size: `varint(klen) + klen + varint(vlen) + vlen`.
    pub fn volume(&self) -> u16 {
        let klen = self.key.len() as u64;
        let vlen = self.value.len() as u64;
        (varint::varint_len(klen) + self.key.len() + varint::varint_len(vlen) + self.value.len())
            as u16
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        varint::encode_u64(out, self.key.len() as u64);
        out.extend_from_slice(&self.key);
        varint::encode_u64(out, self.value.len() as u64);
        out.extend_from_slice(&self.value);
    }

    pub fn to_keyvalue(&self) -> KeyValue {
        KeyValue::new(self.key.clone(), self.value.clone())
    }
}

/// Decodes one `[varint klen][key][varint vlen][value]` record from `buf`,
/// returning the record and the number of bytes consumed. Returns `None` on
/// a zero-length key, which marks the end of a barrel page's live records.
pub fn decode_record(buf: &[u8]) -> Option<(Vec<u8>, Vec<u8>, usize)> {
    let (klen, consumed_k) = varint::decode_u64(buf)?;
    if klen == 0 {
        return None;
    }
    let mut off = consumed_k;
    let key = buf.get(off..off + klen as usize)?.to_vec();
    off += klen as usize;
    let (vlen, consumed_v) = varint::decode_u64(&buf[off..])?;
    off += consumed_v;
    let value = buf.get(off..off + vlen as usize)?.to_vec();
    off += vlen as usize;
    Some((key, value, off))
}
