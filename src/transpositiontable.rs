//! The shared transposition table: a fixed array of cache-line-sized
//! clusters, probed and written by every search thread without locks.
//!
//! Races are part of the contract. A reader may observe an entry whose
//! 16-bit verification key and 64-bit payload belong to different writes;
//! the only artefact is a spurious move, which callers must vet with
//! `Position::pseudo_legal` before trusting. All accesses are relaxed
//! atomic loads and stores of naturally-atomic widths, so torn reads of a
//! single field cannot occur and the races are defined behaviour.

use std::{
    alloc::{alloc_zeroed, handle_alloc_error, Layout},
    mem::size_of,
    sync::atomic::{AtomicU16, AtomicU64, AtomicU8, Ordering},
};

use crate::chess::chessmove::Move;

pub const VALUE_NONE: i32 = 32002;

pub const CLUSTER_SIZE: usize = 6;

/// Stored depth is biased by this offset so that quiescence depths down to
/// `-DEPTH_ENTRY_OFFSET + 1` fit in a byte while raw zero stays reserved
/// for "empty slot".
pub const DEPTH_ENTRY_OFFSET: i32 = 3;

const GENERATION_BITS: u32 = 3;
/// Generation steps over the bound and PV bits it shares a byte with.
pub const GENERATION_DELTA: u8 = 1 << GENERATION_BITS;
const GENERATION_CYCLE: i32 = 255 + GENERATION_DELTA as i32;
const GENERATION_MASK: i32 = 0xFF << GENERATION_BITS & 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    None = 0,
    Upper = 1,
    Lower = 2,
    Exact = 3,
}

impl Bound {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::None,
            1 => Self::Upper,
            2 => Self::Lower,
            _ => Self::Exact,
        }
    }
}

/// One decoded entry payload. The wire format is a single `u64`:
///
/// ```text
/// bits  0..16   move
/// bits 16..32   value
/// bits 32..48   static eval
/// bits 48..56   bound (2) | pv (1) | generation (5)
/// bits 56..64   depth + DEPTH_ENTRY_OFFSET, 0 = empty
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PackedEntry {
    move16: u16,
    value16: i16,
    eval16: i16,
    gen_bound8: u8,
    depth8: u8,
}

impl PackedEntry {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    const fn from_raw(raw: u64) -> Self {
        Self {
            move16: raw as u16,
            value16: (raw >> 16) as i16,
            eval16: (raw >> 32) as i16,
            gen_bound8: (raw >> 48) as u8,
            depth8: (raw >> 56) as u8,
        }
    }

    #[allow(clippy::cast_sign_loss)]
    const fn to_raw(self) -> u64 {
        self.move16 as u64
            | (self.value16 as u16 as u64) << 16
            | (self.eval16 as u16 as u64) << 32
            | (self.gen_bound8 as u64) << 48
            | (self.depth8 as u64) << 56
    }

    const fn depth(self) -> i32 {
        self.depth8 as i32 - DEPTH_ENTRY_OFFSET
    }

    const fn bound(self) -> Bound {
        Bound::from_bits(self.gen_bound8)
    }

    const fn is_pv(self) -> bool {
        self.gen_bound8 & 0b100 != 0
    }

    const fn is_occupied(self) -> bool {
        self.depth8 != 0
    }

    /// Age of the entry relative to the current generation, in generation
    /// steps scaled by `GENERATION_DELTA`. The cycle constant keeps the
    /// subtraction correct across generation wrap-around, and the mask
    /// drops the unrelated low bits sharing the byte.
    const fn relative_age(self, generation8: u8) -> i32 {
        (GENERATION_CYCLE + generation8 as i32 - self.gen_bound8 as i32) & GENERATION_MASK
    }

    const fn replace_score(self, generation8: u8) -> i32 {
        self.depth8 as i32 - self.relative_age(generation8)
    }
}

/// Exactly one cache line: six packed payloads, six verification keys, and
/// four bytes of padding.
#[repr(C, align(64))]
struct Cluster {
    entries: [AtomicU64; CLUSTER_SIZE],
    keys: [AtomicU16; CLUSTER_SIZE],
    _padding: [u8; 4],
}

const _CLUSTER_SIZE_ASSERT: () =
    assert!(size_of::<Cluster>() == 64, "cluster must fill one cache line");

impl Cluster {
    fn entry(&self, slot: usize) -> PackedEntry {
        PackedEntry::from_raw(self.entries[slot].load(Ordering::Relaxed))
    }

    fn verification_key(&self, slot: usize) -> u16 {
        self.keys[slot].load(Ordering::Relaxed)
    }

    fn clear(&self) {
        for entry in &self.entries {
            entry.store(0, Ordering::Relaxed);
        }
        for key in &self.keys {
            key.store(0, Ordering::Relaxed);
        }
    }

    /// Writes a new node's data into `slot`, possibly keeping parts of the
    /// old entry. The key half and the payload half are two separate
    /// stores, deliberately unsynchronised.
    #[allow(clippy::too_many_arguments, clippy::cast_possible_truncation)]
    fn save(
        &self,
        slot: usize,
        key: u64,
        value: i32,
        pv: bool,
        bound: Bound,
        depth: i32,
        mv: Option<Move>,
        eval: i32,
        generation8: u8,
    ) {
        let key16 = key as u16;
        let old_key16 = self.verification_key(slot);
        let mut entry = self.entry(slot);

        // Keep the old best move when re-probing the same position did not
        // produce a better one.
        if mv.is_some() || key16 != old_key16 {
            entry.move16 = mv.map_or(0, Move::inner);
        }

        // Overwrite less valuable entries (cheapest checks first): exact
        // bounds and fresh positions always land, deeper entries beat
        // shallower ones with a little hysteresis, and anything from an
        // earlier generation loses its slot.
        if bound == Bound::Exact
            || key16 != old_key16
            || depth + DEPTH_ENTRY_OFFSET + 2 * i32::from(pv) > i32::from(entry.depth8) - 4
            || entry.relative_age(generation8) != 0
        {
            debug_assert!(depth > -DEPTH_ENTRY_OFFSET);
            debug_assert!(depth < 256 - DEPTH_ENTRY_OFFSET);
            debug_assert!(i16::try_from(value).is_ok());
            debug_assert!(i16::try_from(eval).is_ok());

            entry.depth8 = (depth + DEPTH_ENTRY_OFFSET) as u8;
            entry.gen_bound8 = generation8 | u8::from(pv) << 2 | bound as u8;
            entry.value16 = value as i16;
            entry.eval16 = eval as i16;

            self.keys[slot].store(key16, Ordering::Relaxed);
        } else if entry.depth() >= 5 && entry.bound() != Bound::Exact {
            // Gradually age surviving entries so stale depth eventually
            // loses to fresh shallow results.
            entry.depth8 -= 1;
        }

        self.entries[slot].store(entry.to_raw(), Ordering::Relaxed);
    }
}

/// Snapshot of a probed entry.
#[derive(Debug, Clone, Copy)]
pub struct TTData {
    pub mv: Option<Move>,
    pub value: i32,
    pub eval: i32,
    pub depth: i32,
    pub bound: Bound,
    pub pv: bool,
}

impl TTData {
    const fn empty() -> Self {
        Self {
            mv: None,
            value: VALUE_NONE,
            eval: VALUE_NONE,
            depth: -DEPTH_ENTRY_OFFSET,
            bound: Bound::None,
            pv: false,
        }
    }
}

/// Write handle for the slot a probe settled on.
pub struct TTWriter<'a> {
    cluster: &'a Cluster,
    slot: usize,
}

impl TTWriter<'_> {
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        key: u64,
        value: i32,
        pv: bool,
        bound: Bound,
        depth: i32,
        mv: Option<Move>,
        eval: i32,
        generation8: u8,
    ) {
        self.cluster.save(self.slot, key, value, pv, bound, depth, mv, eval, generation8);
    }
}

pub struct TranspositionTable {
    table: Vec<Cluster>,
    generation8: AtomicU8,
}

impl TranspositionTable {
    pub const fn new() -> Self {
        Self { table: Vec::new(), generation8: AtomicU8::new(0) }
    }

    /// Releases any existing backing store and allocates `mb` megabytes of
    /// zeroed clusters. `mb` must be at least 1. Allocation failure is
    /// fatal by way of the global allocation error handler.
    pub fn resize(&mut self, mb: usize, threads: usize) {
        debug_assert!(mb >= 1, "table floor is one megabyte");

        // Drop the old table before allocating the new one, so peak usage
        // never holds both.
        self.table = Vec::new();

        let cluster_count = mb * 1024 * 1024 / size_of::<Cluster>();
        // SAFETY: zeroed memory is a valid Cluster (empty entries), and the
        // Vec is reconstructed with the very layout it will deallocate.
        unsafe {
            let layout = Layout::array::<Cluster>(cluster_count).unwrap();
            let ptr = alloc_zeroed(layout);
            if ptr.is_null() {
                handle_alloc_error(layout);
            }
            self.table = Vec::from_raw_parts(ptr.cast(), cluster_count, cluster_count);
        }

        self.clear(threads);
    }

    /// Zeroes the whole table, striped across `threads` workers, and
    /// resets the generation. Returns only when every stripe is done.
    pub fn clear(&self, threads: usize) {
        self.generation8.store(0, Ordering::Relaxed);

        let threads = threads.max(1);
        let stride = self.table.len() / threads;

        std::thread::scope(|s| {
            for i in 0..threads {
                let start = stride * i;
                let len =
                    if i + 1 == threads { self.table.len() - start } else { stride };
                let chunk = &self.table[start..start + len];
                s.spawn(move || {
                    for cluster in chunk {
                        cluster.clear();
                    }
                });
            }
        });
    }

    /// Called once at the start of each search; entries written earlier
    /// become progressively cheaper to evict.
    pub fn new_search(&self) {
        self.generation8.fetch_add(GENERATION_DELTA, Ordering::Relaxed);
    }

    pub fn generation(&self) -> u8 {
        self.generation8.load(Ordering::Relaxed)
    }

    pub fn cluster_count(&self) -> usize {
        self.table.len()
    }

    /// Maps a key to its cluster: the high half of the 128-bit product
    /// spreads a uniform key uniformly over the clusters without a modulo.
    #[allow(clippy::cast_possible_truncation)]
    fn cluster(&self, key: u64) -> &Cluster {
        debug_assert!(!self.table.is_empty(), "probe of an unsized table");
        let index = (u128::from(key) * self.table.len() as u128 >> 64) as usize;
        &self.table[index]
    }

    /// Raw pointer to the cluster a key maps to, for software prefetch.
    /// Opaque to callers.
    pub fn first_entry(&self, key: u64) -> *const u8 {
        std::ptr::from_ref(self.cluster(key)).cast()
    }

    pub fn prefetch(&self, key: u64) {
        #[cfg(target_arch = "x86_64")]
        // SAFETY: the pointer is in bounds and prefetching cannot fault.
        unsafe {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            _mm_prefetch(self.first_entry(key).cast(), _MM_HINT_T0);
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = key;
        }
    }

    /// Looks up `key`. On a hit, returns the entry snapshot and a writer
    /// for its slot. On a miss, returns empty data and a writer for the
    /// cluster's least valuable slot, scored as stored depth minus scaled
    /// relative age, ties to the lowest index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn probe(&self, key: u64) -> (bool, TTData, TTWriter<'_>) {
        let cluster = self.cluster(key);
        let key16 = key as u16;

        for slot in 0..CLUSTER_SIZE {
            if cluster.verification_key(slot) == key16 {
                let entry = cluster.entry(slot);
                return (
                    entry.is_occupied(),
                    TTData {
                        mv: Move::from_raw(entry.move16),
                        value: i32::from(entry.value16),
                        eval: i32::from(entry.eval16),
                        depth: entry.depth(),
                        bound: entry.bound(),
                        pv: entry.is_pv(),
                    },
                    TTWriter { cluster, slot },
                );
            }
        }

        let generation8 = self.generation();
        let mut slot = 0;
        let mut score = cluster.entry(0).replace_score(generation8);
        for i in 1..CLUSTER_SIZE {
            let candidate = cluster.entry(i).replace_score(generation8);
            if score > candidate {
                slot = i;
                score = candidate;
            }
        }

        (false, TTData::empty(), TTWriter { cluster, slot })
    }

    /// Estimated permille occupancy, sampled over the first
    /// `min(1000, cluster_count)` clusters. Counts only entries within
    /// `max_age` generations of the current one.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn hashfull(&self, max_age: i32) -> i32 {
        let generation8 = self.generation();
        let max_age_internal = max_age * i32::from(GENERATION_DELTA);
        let sample = self.table.len().min(1000);
        if sample == 0 {
            return 0;
        }

        let mut count = 0usize;
        for cluster in &self.table[..sample] {
            for slot in 0..CLUSTER_SIZE {
                let entry = cluster.entry(slot);
                if entry.is_occupied() && entry.relative_age(generation8) <= max_age_internal
                {
                    count += 1;
                }
            }
        }

        (count * 1000 / (sample * CLUSTER_SIZE)) as i32
    }
}

impl Default for TranspositionTable {
    fn default() -> Self {
        Self::new()
    }
}
