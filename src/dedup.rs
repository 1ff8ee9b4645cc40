// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Write-side content dedup table: hash-bucketed interning of identical byte
//! payloads so the writer never stores the same bytes twice.

/// Seed for the hash used to bucket payloads, per spec: `h = h*33 ^ byte`,
/// seeded 5381 (a DJB2 variant).
const HASH_SEED: u32 = 5381;

pub fn hash_fragments(fragments: &[&[u8]]) -> u32 {
    let mut h: u32 = HASH_SEED;
    for frag in fragments {
        for &b in *frag {
            h = h.wrapping_mul(33) ^ (b as u32);
        }
    }
    h
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    hash: u32,
    len: u32,
    offs: u32,
    align: u16,
}

/// A fixed number of hash buckets, each an unbounded chain of entries.
///
/// The original engine caps each bucket to a fixed-capacity array and links
/// additional fixed-capacity buckets when one fills; this implementation
/// uses a growable `Vec` per bucket index instead, which is observationally
/// identical (an unbounded chain) without the fixed-capacity bookkeeping.
#[derive(Debug)]
pub struct DedupTable {
    buckets: Vec<Vec<Entry>>,
}

impl DedupTable {
    pub fn new(num_buckets: usize) -> Self {
        DedupTable {
            buckets: vec![Vec::new(); num_buckets.max(1)],
        }
    }

    fn bucket_index(&self, hash: u32) -> usize {
        (hash as usize) % self.buckets.len()
    }

    /// Looks for an existing interned copy of `fragments` written with
    /// alignment `align`. Returns its arena offset on a match.
    pub fn find(&self, arena: &[u8], hash: u32, fragments: &[&[u8]], align: usize) -> Option<usize> {
        let total_len: usize = fragments.iter().map(|f| f.len()).sum();
        let bucket = &self.buckets[self.bucket_index(hash)];
        for entry in bucket {
            if entry.hash != hash || entry.len as usize != total_len || entry.align as usize != align {
                continue;
            }
            let offs = entry.offs as usize;
            let Some(candidate) = arena.get(offs..offs + total_len) else {
                continue;
            };
            if fragments_equal(candidate, fragments) {
                return Some(offs);
            }
        }
        None
    }

    pub fn insert(&mut self, hash: u32, len: usize, offs: usize, align: usize) {
        let idx = self.bucket_index(hash);
        self.buckets[idx].push(Entry {
            hash,
            len: len as u32,
            offs: offs as u32,
            align: align as u16,
        });
        if self.buckets[idx].len() > BUCKET_OVERFLOW_WARN_LEN {
            log::warn!(
                "dedup bucket {idx} holds {} entries, well beyond {} buckets' worth of even distribution",
                self.buckets[idx].len(),
                self.buckets.len()
            );
        }
    }
}

/// A bucket chain growing past this length is a sign the hash is clustering
/// badly for this writer's payload mix, not a hard limit (the chain is
/// unbounded).
const BUCKET_OVERFLOW_WARN_LEN: usize = 64;

fn fragments_equal(candidate: &[u8], fragments: &[&[u8]]) -> bool {
    let mut pos = 0;
    for frag in fragments {
        let end = pos + frag.len();
        if candidate[pos..end] != **frag {
            return false;
        }
        pos = end;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_content_sensitive() {
        assert_eq!(hash_fragments(&[b"abc"]), hash_fragments(&[b"abc"]));
        assert_ne!(hash_fragments(&[b"abc"]), hash_fragments(&[b"abd"]));
    }

    #[test]
    fn hash_matches_concatenation_across_fragments() {
        assert_eq!(hash_fragments(&[b"ab", b"c"]), hash_fragments(&[b"abc"]));
    }

    #[test]
    fn find_respects_alignment() {
        let arena = b"abc".to_vec();
        let mut table = DedupTable::new(4);
        let hash = hash_fragments(&[b"abc"]);
        table.insert(hash, 3, 0, 1);

        assert_eq!(table.find(&arena, hash, &[b"abc"], 1), Some(0));
        assert_eq!(table.find(&arena, hash, &[b"abc"], 4), None);
    }
}
