//! HEALPix ring→nested pixel reordering (§4.7, §9).
//!
//! No HEALPix crate is available in the dependency surface, so the
//! conversion is hand-implemented as a precomputed permutation table
//! keyed by `nside`, following the base-pixel face geometry from
//! Gorski et al. (2005): 12 base faces, each subdivided into an
//! `nside x nside` grid addressed by Morton-interleaved `(ix, iy)`
//! coordinates in the nested scheme. Ring order is, by definition,
//! "ring index ascending, then azimuthal position within the ring
//! ascending" — so the permutation is built by computing each nested
//! pixel's `(ring, phi)` key and sorting, rather than by deriving a
//! closed-form ring→nested formula directly.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Row (in units of nside) of the base face a nested pixel's face
/// index belongs to, used to compute its global ring number.
const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
/// Azimuthal phase of each base face.
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

fn decompress_bits(v: u64, nbits: u32) -> (i64, i64) {
    let mut x = 0i64;
    let mut y = 0i64;
    for b in 0..nbits {
        if v & (1 << (2 * b)) != 0 {
            x |= 1 << b;
        }
        if v & (1 << (2 * b + 1)) != 0 {
            y |= 1 << b;
        }
    }
    (x, y)
}

/// `(ring, phi)` sort key for a nested pixel index, `ring` ascending
/// from the north pole and `phi` ascending within the ring.
fn nest_to_ring_key(nside: u32, nest_pix: u64) -> (i64, i64) {
    let nside = i64::from(nside);
    let nside2 = (nside * nside) as u64;
    let face = (nest_pix / nside2) as usize;
    let local = nest_pix % nside2;
    let nbits = 64 - nside.leading_zeros() as u32 - 1; // floor(log2(nside)) for power-of-two nside
    let (ix, iy) = decompress_bits(local, nbits.max(1));

    let jr = JRLL[face] * nside - ix - iy - 1;

    let nr = if jr < nside {
        jr
    } else if jr > 3 * nside {
        4 * nside - jr
    } else {
        nside
    };
    let kshift = if (nside..=3 * nside).contains(&jr) {
        (jr - nside) & 1
    } else {
        0
    };

    let mut jp = (JPLL[face] * nr + ix - iy + 1 + kshift) / 2;
    let ring_len = 4 * nr;
    if jp > ring_len {
        jp -= ring_len;
    }
    if jp < 1 {
        jp += ring_len;
    }

    (jr, jp)
}

/// Precomputed ring→nested permutation table for one `nside`.
/// `table[ring_index]` is the nested index of the pixel occupying
/// `ring_index` in ring order.
#[derive(Debug, Clone)]
pub struct RingToNestTable {
    pub nside: u32,
    pub npix: usize,
    table: Vec<u32>,
}

impl RingToNestTable {
    pub fn build(nside: u32) -> Self {
        let npix = 12 * (nside as usize) * (nside as usize);
        let mut keyed: Vec<(i64, i64, u32)> = (0..npix as u64)
            .map(|nest| {
                let (ring, phi) = nest_to_ring_key(nside, nest);
                (ring, phi, nest as u32)
            })
            .collect();
        keyed.sort_unstable_by_key(|&(ring, phi, nest)| (ring, phi, nest));
        let table = keyed.into_iter().map(|(_, _, nest)| nest).collect();
        Self { nside, npix, table }
    }

    /// Reorder a ring-ordered array into nested order: `out[nest] = ring_values[ring]`.
    pub fn ring_to_nested<T: Clone + Default>(&self, ring_values: &[T]) -> Vec<T> {
        let mut out = vec![T::default(); self.npix];
        for (ring_idx, &nest_idx) in self.table.iter().enumerate() {
            if let Some(v) = ring_values.get(ring_idx) {
                out[nest_idx as usize] = v.clone();
            }
        }
        out
    }

    pub fn nested_index_of_ring(&self, ring_idx: usize) -> Option<u32> {
        self.table.get(ring_idx).copied()
    }
}

/// Cache of permutation tables keyed by `nside`, built once per
/// distinct value seen.
#[derive(Clone, Default)]
pub struct HealpixCache {
    inner: Arc<RwLock<HashMap<u32, Arc<RingToNestTable>>>>,
}

impl HealpixCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_for(&self, nside: u32) -> Arc<RingToNestTable> {
        if let Some(table) = self.inner.read().unwrap_or_else(|e| e.into_inner()).get(&nside) {
            return table.clone();
        }
        let table = Arc::new(RingToNestTable::build(nside));
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(nside, table.clone());
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutation_is_bijective() {
        for nside in [1u32, 2, 4, 8, 32] {
            let table = RingToNestTable::build(nside);
            assert_eq!(table.npix, 12 * (nside as usize).pow(2));
            let mut seen = vec![false; table.npix];
            for &nest in &table.table {
                assert!(!seen[nest as usize], "nside={nside}: duplicate nest index {nest}");
                seen[nest as usize] = true;
            }
            assert!(seen.iter().all(|&s| s), "nside={nside}: not a full permutation");
        }
    }

    #[test]
    fn reorders_ring_values_into_nested_positions() {
        let table = RingToNestTable::build(32);
        assert_eq!(table.npix, 12_288);
        let ring_values: Vec<f64> = (0..table.npix).map(|i| i as f64).collect();
        let nested = table.ring_to_nested(&ring_values);
        // For every ring position, the value placed at its nested slot
        // must be the original ring-ordered value.
        for ring_idx in 0..table.npix {
            let nest_idx = table.nested_index_of_ring(ring_idx).unwrap() as usize;
            assert_eq!(nested[nest_idx], ring_idx as f64);
        }
    }

    #[test]
    fn cache_reuses_table_for_same_nside() {
        let cache = HealpixCache::new();
        let a = cache.table_for(32);
        let b = cache.table_for(32);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
