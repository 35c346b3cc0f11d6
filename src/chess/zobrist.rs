//! Zobrist key material, generated at compile time from a fixed seed so that
//! position keys are reproducible across runs and builds.

/// xorshift64* with a fixed seed; const-evaluable so the key tables can live
/// in statics.
const fn next(mut state: u64) -> (u64, u64) {
    state ^= state >> 12;
    state ^= state << 25;
    state ^= state >> 27;
    (state.wrapping_mul(0x2545_F491_4F6C_DD1D), state)
}

const SEED: u64 = 0x9E0C_9A1B_71D4_2E67;

type KeyTables = ([[u64; 64]; 12], [u64; 8], [u64; 16], u64, u64);

const fn init_keys() -> KeyTables {
    let mut state = SEED;
    let mut piece_keys = [[0; 64]; 12];
    let mut pc = 0;
    while pc < 12 {
        let mut sq = 0;
        while sq < 64 {
            (piece_keys[pc][sq], state) = next(state);
            sq += 1;
        }
        pc += 1;
    }

    // Zero the pawn back ranks (piece indices 0 and 6 are the two pawns).
    // A promotion then needs no key update for the vanishing pawn, and the
    // rows can never hold a real pawn anyway.
    let mut sq = 0;
    while sq < 8 {
        piece_keys[0][sq] = 0;
        piece_keys[0][56 + sq] = 0;
        piece_keys[6][sq] = 0;
        piece_keys[6][56 + sq] = 0;
        sq += 1;
    }

    let mut ep_keys = [0; 8];
    let mut file = 0;
    while file < 8 {
        (ep_keys[file], state) = next(state);
        file += 1;
    }

    // Index 0 is the no-rights mask and contributes nothing to the key.
    let mut castling_keys = [0; 16];
    let mut rights = 1;
    while rights < 16 {
        (castling_keys[rights], state) = next(state);
        rights += 1;
    }

    let (side, state) = next(state);
    let (no_pawns, _) = next(state);

    (piece_keys, ep_keys, castling_keys, side, no_pawns)
}

const KEYS: KeyTables = init_keys();

/// `PIECE_KEYS[piece][square]`. Squares 8..16 double as the material-key
/// slots `8 + piece_count`.
pub static PIECE_KEYS: [[u64; 64]; 12] = KEYS.0;
/// One key per en-passant file.
pub static EP_KEYS: [u64; 8] = KEYS.1;
/// One key per castling-rights bitmask.
pub static CASTLING_KEYS: [u64; 16] = KEYS.2;
/// Toggled whenever the side to move changes.
pub const SIDE_KEY: u64 = KEYS.3;
/// Base value of the pawn key for a pawnless board.
pub const NO_PAWNS_KEY: u64 = KEYS.4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_nonzero_keys_distinct() {
        let mut keys: Vec<u64> = PIECE_KEYS
            .iter()
            .flatten()
            .copied()
            .chain(EP_KEYS.iter().copied())
            .chain(CASTLING_KEYS.iter().copied())
            .chain([SIDE_KEY, NO_PAWNS_KEY])
            .filter(|&k| k != 0)
            .collect();
        let len_before = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(len_before, keys.len());
    }

    #[test]
    fn pawn_back_ranks_are_zero() {
        for pawn in [0, 6] {
            for sq in (0..8).chain(56..64) {
                assert_eq!(PIECE_KEYS[pawn][sq], 0);
            }
            // material-key slots must stay live.
            for sq in 8..16 {
                assert_ne!(PIECE_KEYS[pawn][sq], 0);
            }
        }
    }

    #[test]
    fn no_rights_castling_key_is_zero() {
        assert_eq!(CASTLING_KEYS[0], 0);
        for rights in 1..16 {
            assert_ne!(CASTLING_KEYS[rights], 0);
        }
    }
}
