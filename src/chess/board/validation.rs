//! Debug-build consistency checks. A violation is a programmer error, so
//! everything here panics; release builds compile the checks out entirely.

#![cfg(debug_assertions)]

use crate::chess::{
    piece::{Colour, Piece, PieceType},
    squareset::SquareSet,
    types::{CastlingRights, Rank},
};

use super::Position;

impl Position {
    /// Fast sanity check, run on every make/unmake in debug builds.
    pub fn check_ok(&self) {
        assert_eq!(self.pieces_cp(Colour::White, PieceType::King).count(), 1);
        assert_eq!(self.pieces_cp(Colour::Black, PieceType::King).count(), 1);

        if let Some(ep) = self.ep_square() {
            assert_eq!(ep.rank(), Rank::Six.relative_to(self.side_to_move()));
        }

        // The side that just moved must not have left its king in check.
        assert!(!self.attackers_to_exist(
            self.king_sq(!self.side_to_move()),
            self.pieces(),
            self.side_to_move(),
        ));
    }

    /// Exhaustive cross-check of every piece of redundant state. Run when a
    /// position is set up from external input, and from tests.
    pub fn check_ok_full(&self) {
        self.check_ok();

        assert_eq!(
            self.pieces_c(Colour::White) & self.pieces_c(Colour::Black),
            SquareSet::EMPTY
        );
        assert_eq!(
            self.pieces_c(Colour::White) | self.pieces_c(Colour::Black),
            self.pieces()
        );
        assert!(self.pieces_c(Colour::White).count() <= 16);
        assert!(self.pieces_c(Colour::Black).count() <= 16);

        assert_eq!(
            self.pieces_pt(PieceType::Pawn) & SquareSet::BACK_RANKS,
            SquareSet::EMPTY
        );

        for a in PieceType::all() {
            for b in PieceType::all().filter(|&b| b != a) {
                assert_eq!(self.pieces_pt(a) & self.pieces_pt(b), SquareSet::EMPTY);
            }
        }

        let mut occupied = SquareSet::EMPTY;
        for piece_type in PieceType::all() {
            occupied |= self.pieces_pt(piece_type);
        }
        assert_eq!(occupied, self.pieces());

        for piece in Piece::all() {
            let set = self.pieces_cp(piece.colour(), piece.piece_type());
            assert_eq!(u32::from(self.piece_count(piece)), set.count());
            let on_board = crate::chess::types::Square::all()
                .filter(|&sq| self.piece_on(sq) == Some(piece))
                .count();
            assert_eq!(usize::from(self.piece_count(piece)), on_board);
            for sq in set {
                assert_eq!(self.piece_on(sq), Some(piece));
            }
        }

        for colour in Colour::all() {
            for kingside in [true, false] {
                let right = CastlingRights::new(colour, kingside);
                if !self.can_castle(right) {
                    continue;
                }
                let rook_sq = self
                    .castling_rook_square(right)
                    .expect("castling right without a rook square");
                assert_eq!(
                    self.piece_on(rook_sq),
                    Some(Piece::new(colour, PieceType::Rook))
                );
            }
        }
    }
}
