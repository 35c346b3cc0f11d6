//! Cuckoo tables for upcoming-repetition detection, after Marcel van
//! Kervinck's algorithm: a perfect hash of every reversible non-pawn move,
//! keyed by the Zobrist delta that move applies to a position key.

use std::sync::OnceLock;

use crate::chess::{
    attacks::attacks_by_type,
    chessmove::Move,
    piece::{Piece, PieceType},
    squareset::SquareSet,
    types::Square,
    zobrist::{PIECE_KEYS, SIDE_KEY},
};

pub const TABLE_SIZE: usize = 8192;

/// Number of distinct reversible move keys; the build asserts it.
pub const ENTRY_COUNT: usize = 3668;

pub const fn h1(key: u64) -> usize {
    (key >> 51 & 0x1FFF) as usize
}

pub const fn h2(key: u64) -> usize {
    (key >> 35 & 0x1FFF) as usize
}

pub struct CuckooTables {
    keys: [u64; TABLE_SIZE],
    moves: [Option<Move>; TABLE_SIZE],
}

impl CuckooTables {
    /// Looks up a move key in both hash slots. Returns the reversible move
    /// whose Zobrist delta equals `key`, if there is one.
    pub fn lookup(&self, key: u64) -> Option<Move> {
        let slot = h1(key);
        if self.keys[slot] == key {
            return self.moves[slot];
        }
        let slot = h2(key);
        if self.keys[slot] == key {
            return self.moves[slot];
        }
        None
    }
}

static TABLES: OnceLock<CuckooTables> = OnceLock::new();

/// Builds the process-wide tables. Idempotent; later calls are free.
pub fn init() {
    let _ = tables();
}

pub fn tables() -> &'static CuckooTables {
    TABLES.get_or_init(build)
}

fn build() -> CuckooTables {
    let mut keys = [0u64; TABLE_SIZE];
    let mut moves = [None; TABLE_SIZE];
    let mut count = 0usize;

    for piece in Piece::all().filter(|piece| piece.piece_type() != PieceType::Pawn) {
        for s1 in Square::all() {
            for s2 in Square::all().filter(|&s2| s2 > s1) {
                if !attacks_by_type(piece.piece_type(), s1, SquareSet::EMPTY)
                    .contains_square(s2)
                {
                    continue;
                }

                let mut mv = Some(Move::new(s1, s2));
                let mut key = PIECE_KEYS[piece][s1] ^ PIECE_KEYS[piece][s2] ^ SIDE_KEY;
                let mut slot = h1(key);
                // Cuckoo displacement: push the evicted entry to its
                // alternative slot until an empty one is found.
                loop {
                    std::mem::swap(&mut keys[slot], &mut key);
                    std::mem::swap(&mut moves[slot], &mut mv);
                    if mv.is_none() {
                        break;
                    }
                    slot = if slot == h1(key) { h2(key) } else { h1(key) };
                }
                count += 1;
            }
        }
    }

    assert_eq!(count, ENTRY_COUNT, "cuckoo table construction is broken");
    CuckooTables { keys, moves }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_inserts_exactly_the_reversible_moves() {
        // the assert inside `build` is the real check; this also exercises
        // idempotence of the public entry point.
        init();
        init();
        let tables = tables();
        let occupancy = tables.keys.iter().filter(|&&k| k != 0).count();
        assert_eq!(occupancy, ENTRY_COUNT);
    }

    #[test]
    fn lookup_finds_a_known_knight_shuffle() {
        let piece = Piece::WN;
        let key = PIECE_KEYS[piece][Square::G1.index()]
            ^ PIECE_KEYS[piece][Square::F3.index()]
            ^ SIDE_KEY;
        let mv = tables().lookup(key).expect("g1-f3 must be a reversible move key");
        assert_eq!((mv.from(), mv.to()), (Square::G1, Square::F3));
        assert_eq!(tables().lookup(key ^ 1), None);
    }
}
