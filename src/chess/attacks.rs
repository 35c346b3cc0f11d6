//! Pure attack lookups: jumping-piece tables, blocked-ray slider attacks,
//! and the between/line geometry tables, all built at compile time.

use crate::chess::{
    piece::{Colour, PieceType},
    squareset::SquareSet,
    types::Square,
};

/// (file delta, rank delta) per ray direction. The first four directions walk
/// towards higher square indices, the last four towards lower ones; the
/// blocker scan below depends on this split.
const RAY_DIRS: [(i8, i8); 8] = [
    (0, 1),   // north
    (1, 0),   // east
    (1, 1),   // north-east
    (-1, 1),  // north-west
    (0, -1),  // south
    (-1, 0),  // west
    (-1, -1), // south-west
    (1, -1),  // south-east
];

const fn build_rays() -> [[u64; 64]; 8] {
    let mut rays = [[0; 64]; 8];
    let mut dir = 0;
    while dir < 8 {
        let (df, dr) = RAY_DIRS[dir];
        let mut sq = 0;
        while sq < 64 {
            let mut file = (sq % 8) as i8 + df;
            let mut rank = (sq / 8) as i8 + dr;
            let mut ray = 0u64;
            while 0 <= file && file < 8 && 0 <= rank && rank < 8 {
                ray |= 1 << (rank * 8 + file);
                file += df;
                rank += dr;
            }
            rays[dir][sq] = ray;
            sq += 1;
        }
        dir += 1;
    }
    rays
}

static RAYS: [[u64; 64]; 8] = build_rays();

const fn build_jumping_attacks(deltas: &[(i8, i8)]) -> [u64; 64] {
    let mut attacks = [0; 64];
    let mut sq = 0;
    while sq < 64 {
        let file = (sq % 8) as i8;
        let rank = (sq / 8) as i8;
        let mut bb = 0u64;
        let mut idx = 0;
        while idx < deltas.len() {
            let (df, dr) = deltas[idx];
            let (f, r) = (file + df, rank + dr);
            if 0 <= f && f < 8 && 0 <= r && r < 8 {
                bb |= 1 << (r * 8 + f);
            }
            idx += 1;
        }
        attacks[sq] = bb;
        sq += 1;
    }
    attacks
}

static KNIGHT_ATTACKS: [u64; 64] = build_jumping_attacks(&[
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
]);

static KING_ATTACKS: [u64; 64] = build_jumping_attacks(&[
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
]);

static PAWN_ATTACKS: [[u64; 64]; 2] = [
    build_jumping_attacks(&[(-1, 1), (1, 1)]),
    build_jumping_attacks(&[(-1, -1), (1, -1)]),
];

/// `BETWEEN[a][b]`: the squares strictly between `a` and `b`, plus `b`
/// itself. For squares not sharing a rank, file, or diagonal this is just
/// `{b}`, which makes "block the check or capture the checker" a single
/// intersection test.
const fn build_between() -> [[u64; 64]; 64] {
    let mut between = [[0; 64]; 64];
    let mut a = 0;
    while a < 64 {
        let mut b = 0;
        while b < 64 {
            between[a][b] = 1 << b;
            b += 1;
        }
        let mut dir = 0;
        while dir < 8 {
            let (df, dr) = RAY_DIRS[dir];
            let mut file = (a % 8) as i8 + df;
            let mut rank = (a / 8) as i8 + dr;
            let mut walked = 0u64;
            while 0 <= file && file < 8 && 0 <= rank && rank < 8 {
                let sq = (rank * 8 + file) as usize;
                between[a][sq] = walked | 1 << sq;
                walked |= 1 << sq;
                file += df;
                rank += dr;
            }
            dir += 1;
        }
        a += 1;
    }
    between
}

/// `LINE[a][b]`: the full rank, file, or diagonal through `a` and `b`
/// (including both), or empty if they are not aligned.
const fn build_line() -> [[u64; 64]; 64] {
    let rays = build_rays();
    let mut line = [[0; 64]; 64];
    let mut a = 0;
    while a < 64 {
        let mut dir = 0;
        while dir < 4 {
            let opposite = dir + 4;
            let full = rays[dir][a] | rays[opposite][a] | 1 << a;
            let mut rest = rays[dir][a] | rays[opposite][a];
            while rest != 0 {
                let b = rest.trailing_zeros() as usize;
                line[a][b] = full;
                rest &= rest - 1;
            }
            dir += 1;
        }
        a += 1;
    }
    line
}

static BETWEEN: [[u64; 64]; 64] = build_between();
static LINE: [[u64; 64]; 64] = build_line();

pub fn pawn_attacks(sq: Square, side: Colour) -> SquareSet {
    SquareSet::from_inner(PAWN_ATTACKS[side.index()][sq.index()])
}

/// Attacks of a whole set of `side` pawns at once.
pub fn pawn_attacks_set(pawns: SquareSet, side: Colour) -> SquareSet {
    match side {
        Colour::White => pawns.north_one().east_one() | pawns.north_one().west_one(),
        Colour::Black => pawns.south_one().east_one() | pawns.south_one().west_one(),
    }
}

pub fn knight_attacks(sq: Square) -> SquareSet {
    SquareSet::from_inner(KNIGHT_ATTACKS[sq.index()])
}

pub fn king_attacks(sq: Square) -> SquareSet {
    SquareSet::from_inner(KING_ATTACKS[sq.index()])
}

fn ray_attacks(dir: usize, sq: Square, occupied: SquareSet) -> SquareSet {
    let ray = RAYS[dir][sq.index()];
    let blockers = ray & occupied.inner();
    if blockers == 0 {
        return SquareSet::from_inner(ray);
    }
    #[allow(clippy::cast_possible_truncation)]
    let blocker = if dir < 4 {
        blockers.trailing_zeros() as usize
    } else {
        63 - blockers.leading_zeros() as usize
    };
    SquareSet::from_inner(ray ^ RAYS[dir][blocker])
}

pub fn bishop_attacks(sq: Square, occupied: SquareSet) -> SquareSet {
    ray_attacks(2, sq, occupied)
        | ray_attacks(3, sq, occupied)
        | ray_attacks(6, sq, occupied)
        | ray_attacks(7, sq, occupied)
}

pub fn rook_attacks(sq: Square, occupied: SquareSet) -> SquareSet {
    ray_attacks(0, sq, occupied)
        | ray_attacks(1, sq, occupied)
        | ray_attacks(4, sq, occupied)
        | ray_attacks(5, sq, occupied)
}

pub fn queen_attacks(sq: Square, occupied: SquareSet) -> SquareSet {
    bishop_attacks(sq, occupied) | rook_attacks(sq, occupied)
}

/// Attacks of a non-pawn piece type. Pawn attacks depend on colour and go
/// through [`pawn_attacks`] instead.
pub fn attacks_by_type(piece_type: PieceType, sq: Square, occupied: SquareSet) -> SquareSet {
    match piece_type {
        PieceType::Knight => knight_attacks(sq),
        PieceType::Bishop => bishop_attacks(sq, occupied),
        PieceType::Rook => rook_attacks(sq, occupied),
        PieceType::Queen => queen_attacks(sq, occupied),
        PieceType::King => king_attacks(sq),
        PieceType::Pawn => unreachable!("pawn attacks are colour-dependent"),
    }
}

pub fn between(a: Square, b: Square) -> SquareSet {
    SquareSet::from_inner(BETWEEN[a.index()][b.index()])
}

pub fn line(a: Square, b: Square) -> SquareSet {
    SquareSet::from_inner(LINE[a.index()][b.index()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jumping_attack_counts() {
        assert_eq!(knight_attacks(Square::A1).count(), 2);
        assert_eq!(knight_attacks(Square::E4).count(), 8);
        assert_eq!(king_attacks(Square::A1).count(), 3);
        assert_eq!(king_attacks(Square::E4).count(), 8);
        // cross-checked against the python-chess attack tables.
        assert_eq!(knight_attacks(Square::A1).inner(), 132_096);
        assert_eq!(knight_attacks(Square::H8).inner(), 9_077_567_998_918_656);
        assert_eq!(king_attacks(Square::A1).inner(), 770);
    }

    #[test]
    fn pawn_attacks_by_colour() {
        assert_eq!(
            pawn_attacks(Square::E4, Colour::White),
            Square::D5.as_set() | Square::F5.as_set()
        );
        assert_eq!(
            pawn_attacks(Square::E4, Colour::Black),
            Square::D3.as_set() | Square::F3.as_set()
        );
        assert_eq!(pawn_attacks(Square::A4, Colour::White), Square::B5.as_set());
        let pawns = Square::E4.as_set() | Square::A4.as_set();
        assert_eq!(
            pawn_attacks_set(pawns, Colour::White),
            Square::D5.as_set() | Square::F5.as_set() | Square::B5.as_set()
        );
    }

    #[test]
    fn slider_attacks_respect_blockers() {
        let occ = Square::E6.as_set() | Square::B4.as_set();
        let rook = rook_attacks(Square::E4, occ);
        assert!(rook.contains_square(Square::E6));
        assert!(!rook.contains_square(Square::E7));
        assert!(rook.contains_square(Square::B4));
        assert!(!rook.contains_square(Square::A4));
        assert!(rook.contains_square(Square::H4));
        assert!(rook.contains_square(Square::E1));

        let bishop = bishop_attacks(Square::C1, Square::E3.as_set());
        assert!(bishop.contains_square(Square::E3));
        assert!(!bishop.contains_square(Square::F4));
        assert!(bishop.contains_square(Square::A3));
    }

    #[test]
    fn empty_board_slider_counts() {
        assert_eq!(rook_attacks(Square::E4, SquareSet::EMPTY).count(), 14);
        assert_eq!(bishop_attacks(Square::E4, SquareSet::EMPTY).count(), 13);
        assert_eq!(queen_attacks(Square::E4, SquareSet::EMPTY).count(), 27);
    }

    #[test]
    fn between_includes_target() {
        assert_eq!(
            between(Square::A1, Square::D1),
            Square::B1.as_set() | Square::C1.as_set() | Square::D1.as_set()
        );
        // unaligned pairs degrade to the target square alone.
        assert_eq!(between(Square::A1, Square::B3), Square::B3.as_set());
        assert_eq!(between(Square::E1, Square::E2), Square::E2.as_set());
    }

    #[test]
    fn line_requires_alignment() {
        assert_eq!(line(Square::A1, Square::C3).count(), 8);
        assert!(line(Square::A1, Square::C3).contains_square(Square::H8));
        assert_eq!(line(Square::A1, Square::B3), SquareSet::EMPTY);
        assert!(line(Square::A4, Square::H4).contains_square(Square::A4));
    }
}
