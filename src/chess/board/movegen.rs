//! Pseudo-legal move generation. Two modes: evasions while in check,
//! non-evasions otherwise. Full legality is the business of
//! `Position::legal`, which the legal-move driver below applies only to the
//! moves that can actually be illegal.

use arrayvec::ArrayVec;

use crate::chess::{
    attacks::{attacks_by_type, between, king_attacks, pawn_attacks},
    chessmove::Move,
    piece::PieceType,
    squareset::SquareSet,
    types::{CastlingRights, Rank, Square},
};

use super::Position;

pub const MAX_MOVES: usize = 256;

pub type MoveList = ArrayVec<Move, MAX_MOVES>;

fn push_promotions(list: &mut MoveList, from: Square, to: Square) {
    for promo in [PieceType::Queen, PieceType::Rook, PieceType::Bishop, PieceType::Knight] {
        list.push(Move::new_promotion(from, to, promo));
    }
}

impl Position {
    /// Generates the pseudo-legal moves of the current mode: evasions when
    /// in check, everything otherwise.
    pub fn generate_moves(&self, list: &mut MoveList) {
        if self.checkers().non_empty() {
            self.generate_evasions(list);
        } else {
            self.generate_non_evasions(list);
        }
    }

    fn generate_non_evasions(&self, list: &mut MoveList) {
        let us = self.side_to_move();
        let target = !self.pieces_c(us);
        let ksq = self.king_sq(us);

        self.generate_pawn_moves(target, false, list);
        for piece_type in
            [PieceType::Knight, PieceType::Bishop, PieceType::Rook, PieceType::Queen]
        {
            self.generate_piece_moves(piece_type, target, list);
        }

        for to in king_attacks(ksq) & target {
            list.push(Move::new(ksq, to));
        }

        for kingside in [true, false] {
            let right = CastlingRights::new(us, kingside);
            if self.can_castle(right) && !self.castling_impeded(right) {
                let rook = self.castling_rook_square(right).unwrap();
                list.push(Move::new_castling(ksq, rook));
            }
        }
    }

    fn generate_evasions(&self, list: &mut MoveList) {
        let us = self.side_to_move();
        let ksq = self.king_sq(us);

        for to in king_attacks(ksq) & !self.pieces_c(us) {
            list.push(Move::new(ksq, to));
        }

        // Double check admits king moves only.
        if self.checkers().many() {
            return;
        }

        // Block the check or capture the checker.
        let checker = self.checkers().first().unwrap();
        let target = between(ksq, checker);

        self.generate_pawn_moves(target, true, list);
        for piece_type in
            [PieceType::Knight, PieceType::Bishop, PieceType::Rook, PieceType::Queen]
        {
            self.generate_piece_moves(piece_type, target, list);
        }
    }

    fn generate_piece_moves(
        &self,
        piece_type: PieceType,
        target: SquareSet,
        list: &mut MoveList,
    ) {
        let us = self.side_to_move();
        for from in self.pieces_cp(us, piece_type) {
            for to in attacks_by_type(piece_type, from, self.pieces()) & target {
                list.push(Move::new(from, to));
            }
        }
    }

    fn generate_pawn_moves(&self, target: SquareSet, evasions: bool, list: &mut MoveList) {
        let us = self.side_to_move();
        let them = !us;
        let rank7 = SquareSet::rank(Rank::Seven.relative_to(us));
        let pawns_on_7 = self.pieces_cp(us, PieceType::Pawn) & rank7;
        let pawns_not_on_7 = self.pieces_cp(us, PieceType::Pawn) & !rank7;
        let empty = !self.pieces();
        // While evading, a capture must take the checker and a push must
        // block; the `target` of an evasion holds both square sets.
        let enemies = if evasions { self.checkers() } else { self.pieces_c(them) };

        for from in pawns_not_on_7 {
            if let Some(one) = from.pawn_push(us) {
                if empty.contains_square(one) {
                    if !evasions || target.contains_square(one) {
                        list.push(Move::new(from, one));
                    }
                    if from.rank() == Rank::Two.relative_to(us) {
                        if let Some(two) = one.pawn_push(us) {
                            if empty.contains_square(two)
                                && (!evasions || target.contains_square(two))
                            {
                                list.push(Move::new(from, two));
                            }
                        }
                    }
                }
            }
            for to in pawn_attacks(from, us) & enemies {
                list.push(Move::new(from, to));
            }
        }

        for from in pawns_on_7 {
            if let Some(one) = from.pawn_push(us) {
                if empty.contains_square(one) && (!evasions || target.contains_square(one)) {
                    push_promotions(list, from, one);
                }
            }
            for to in pawn_attacks(from, us) & enemies {
                push_promotions(list, from, to);
            }
        }

        if let Some(ep) = self.ep_square() {
            debug_assert_eq!(ep.rank(), Rank::Six.relative_to(us));

            // An en passant capture can never resolve a discovered check:
            // the discovered line runs through the double-push origin.
            if evasions && target.contains_square(ep.pawn_push(us).unwrap()) {
                return;
            }

            for from in pawns_not_on_7 & pawn_attacks(ep, them) {
                list.push(Move::new_en_passant(from, ep));
            }
        }
    }

    /// All fully-legal moves. Only pinned pieces, king moves, and en
    /// passant captures can be pseudo-legal yet illegal, so only those go
    /// through the full legality test.
    pub fn legal_moves(&self) -> MoveList {
        let us = self.side_to_move();
        let pinned = self.blockers_for_king(us) & self.pieces_c(us);
        let ksq = self.king_sq(us);

        let mut list = MoveList::new();
        self.generate_moves(&mut list);
        list.retain(|&mut m| {
            !(pinned.contains_square(m.from()) || m.from() == ksq || m.is_en_passant())
                || self.legal(m)
        });
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::types::Square;

    #[test]
    fn startpos_has_twenty_moves() {
        let pos = Position::startpos();
        assert_eq!(pos.legal_moves().len(), 20);
    }

    #[test]
    fn kiwipete_has_fortyeight_moves() {
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            false,
        )
        .unwrap();
        assert_eq!(pos.legal_moves().len(), 48);
    }

    #[test]
    fn evasions_only_resolve_the_check() {
        // White king on e1 checked by a rook on e8: the bishop can block
        // on e3, and the king has d1, f1, and f2. Nothing else helps.
        let pos = Position::from_fen("4r2k/8/8/8/8/8/3B4/4K3 w - - 0 1", false).unwrap();
        let legal = pos.legal_moves();
        assert!(legal.contains(&Move::new(Square::D2, Square::E3)));
        assert_eq!(legal.len(), 4);
        assert!(legal
            .iter()
            .all(|&m| m.from() == Square::E1 || m == Move::new(Square::D2, Square::E3)));
    }

    #[test]
    fn promotions_generate_all_four_pieces() {
        let pos = Position::from_fen("4k3/P7/8/8/8/8/8/4K3 w - - 0 1", false).unwrap();
        let promos: Vec<_> =
            pos.legal_moves().into_iter().filter(|m| m.is_promotion()).collect();
        assert_eq!(promos.len(), 4);
        assert!(promos
            .iter()
            .all(|m| m.from() == Square::A7 && m.to() == Square::A8));
    }

    #[test]
    fn en_passant_evasion_captures_the_checking_pawn() {
        // The freshly double-pushed d5 pawn checks the e4 king; exd5 e.p.
        // removes the checker.
        let pos = Position::from_fen("4k3/8/8/3pP3/4K3/8/8/8 w - d6 0 1", false).unwrap();
        assert!(pos.checkers().contains_square(Square::D5));
        let ep = Move::new_en_passant(Square::E5, Square::D6);
        assert!(pos.legal_moves().contains(&ep));
    }
}
