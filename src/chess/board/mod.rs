pub mod movegen;
pub mod validation;

use std::fmt::{self, Display, Formatter};

use crate::{
    chess::{
        attacks::{
            attacks_by_type, between, bishop_attacks, king_attacks, knight_attacks, line,
            pawn_attacks, rook_attacks,
        },
        chessmove::Move,
        cuckoo,
        fen::{endgame_code_fen, Fen},
        piece::{Colour, Piece, PieceType},
        squareset::SquareSet,
        types::{CastlingRights, File, Rank, Square},
        zobrist::{CASTLING_KEYS, EP_KEYS, NO_PAWNS_KEY, PIECE_KEYS, SIDE_KEY},
    },
    errors::{EndgameCodeError, FenParseError, MoveParseError},
    transpositiontable::TranspositionTable,
};

use movegen::MoveList;

/// Everything that cannot be recomputed cheaply when a move is retracted.
/// One record per ply; `Position` keeps the current record inline and the
/// older ones on a stack that grows on `do_move` and shrinks on `undo_move`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StateInfo {
    pub key: u64,
    pub pawn_key: u64,
    pub material_key: u64,
    pub minor_piece_key: u64,
    pub non_pawn_key: [u64; 2],
    pub non_pawn_material: [i32; 2],
    pub castling_rights: CastlingRights,
    pub ep_square: Option<Square>,
    pub rule50: i32,
    pub plies_from_null: i32,
    pub checkers: SquareSet,
    pub blockers_for_king: [SquareSet; 2],
    pub pinners: [SquareSet; 2],
    pub check_squares: [SquareSet; 6],
    pub captured_piece: Option<Piece>,
    /// Ply distance to a previous occurrence of this position: positive for
    /// a first recurrence, negative once the position has occurred at least
    /// twice before, zero when it has not occurred at all.
    pub repetition: i32,
}

/// The board delta produced by one move, for consumers that maintain
/// incrementally-updated evaluation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyPiece {
    pub pc: Piece,
    pub from: Square,
    /// `None` iff the move is a promotion (the pawn disappears).
    pub to: Option<Square>,
    /// Captured piece and its square, or the castling rook and its origin.
    pub remove: Option<(Piece, Square)>,
    /// Added piece and its square: the promotion piece, or the castling
    /// rook on its destination.
    pub add: Option<(Piece, Square)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Position {
    board: [Option<Piece>; 64],
    by_type: [SquareSet; 6],
    by_colour: [SquareSet; 2],
    piece_count: [u8; 12],
    side_to_move: Colour,
    game_ply: i32,
    chess960: bool,
    castling_rights_mask: [CastlingRights; 64],
    castling_rook_square: [Option<Square>; 4],
    castling_path: [SquareSet; 4],
    st: StateInfo,
    history: Vec<StateInfo>,
}

impl Position {
    pub const STARTING_FEN: &'static str =
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    /// One-time process setup: builds the cuckoo tables used by
    /// [`Self::upcoming_repetition`]. Idempotent. The Zobrist material is
    /// baked in at compile time and needs no runtime setup.
    pub fn init() {
        cuckoo::init();
    }

    fn blank() -> Self {
        Self {
            board: [None; 64],
            by_type: [SquareSet::EMPTY; 6],
            by_colour: [SquareSet::EMPTY; 2],
            piece_count: [0; 12],
            side_to_move: Colour::White,
            game_ply: 0,
            chess960: false,
            castling_rights_mask: [CastlingRights::NONE; 64],
            castling_rook_square: [None; 4],
            castling_path: [SquareSet::EMPTY; 4],
            st: StateInfo::default(),
            history: Vec::new(),
        }
    }

    pub fn from_fen(fen: &str, chess960: bool) -> Result<Self, FenParseError> {
        let parsed = Fen::parse(fen)?;
        let mut pos = Self::blank();
        pos.set_from_fen(&parsed, chess960);
        Ok(pos)
    }

    pub fn startpos() -> Self {
        Self::from_fen(Self::STARTING_FEN, false).expect("STARTING_FEN is broken")
    }

    /// Builds a bare material configuration from a Kaufman-style endgame
    /// code such as `"KBNKQQ"`; the side selected by `colour` gets the
    /// pieces after the second 'K'. Mainly useful for computing material
    /// keys.
    pub fn from_endgame_code(code: &str, colour: Colour) -> Result<Self, EndgameCodeError> {
        let fen = endgame_code_fen(code, colour)?;
        Ok(Self::from_fen(&fen, false)?)
    }

    fn set_from_fen(&mut self, fen: &Fen, chess960: bool) {
        for sq in Square::all() {
            if let Some(piece) = fen.board[sq.index()] {
                self.put_piece(piece, sq);
            }
        }
        self.side_to_move = fen.side;
        self.chess960 = chess960;

        for &(colour, rook_sq) in &fen.castling_rooks {
            self.set_castling_right(colour, rook_sq);
        }

        // The en passant square survives only if a capture on it could
        // actually be played: a friendly pawn attacks it, the enemy pawn is
        // in front of it, and both it and the square behind it are empty.
        self.st.ep_square = fen.ep_square.filter(|&ep| self.ep_capture_plausible(ep));

        self.st.rule50 = fen.halfmove;
        self.game_ply = ((fen.fullmove - 1) * 2).max(0) + i32::from(fen.side == Colour::Black);

        self.set_state();

        #[cfg(debug_assertions)]
        self.check_ok_full();
    }

    fn ep_capture_plausible(&self, ep: Square) -> bool {
        let us = self.side_to_move;
        let them = !us;
        let behind: SquareSet = ep
            .pawn_push(us)
            .map_or(SquareSet::EMPTY, Square::as_set);
        (pawn_attacks(ep, them) & self.pieces_cp(us, PieceType::Pawn)).non_empty()
            && ep
                .pawn_push(them)
                .is_some_and(|sq| self.pieces_cp(them, PieceType::Pawn).contains_square(sq))
            && (self.pieces() & (ep.as_set() | behind)).is_empty()
    }

    fn set_castling_right(&mut self, colour: Colour, rook_from: Square) {
        let king_from = self.king_sq(colour);
        let kingside = king_from < rook_from;
        let right = CastlingRights::new(colour, kingside);
        let index = right.right_index();

        self.st.castling_rights |= right;
        self.castling_rights_mask[king_from] |= right;
        self.castling_rights_mask[rook_from] |= right;
        self.castling_rook_square[index] = Some(rook_from);

        let king_to = if kingside { Square::G1 } else { Square::C1 }.relative_to(colour);
        let rook_to = if kingside { Square::F1 } else { Square::D1 }.relative_to(colour);
        self.castling_path[index] = (between(rook_from, rook_to)
            | between(king_from, king_to))
        .without(king_from.as_set() | rook_from.as_set());
    }

    /// Recomputes every key and all check metadata from scratch. Only used
    /// when a position is set up; afterwards everything is maintained
    /// incrementally.
    fn set_state(&mut self) {
        self.st.key = 0;
        self.st.material_key = 0;
        self.st.minor_piece_key = 0;
        self.st.non_pawn_key = [0; 2];
        self.st.pawn_key = NO_PAWNS_KEY;
        self.st.non_pawn_material = [0; 2];
        self.st.checkers = self.attackers_to(self.king_sq(self.side_to_move), self.pieces())
            & self.pieces_c(!self.side_to_move);

        self.set_check_info();

        for sq in self.pieces() {
            let piece = self.board[sq].unwrap();
            let key = PIECE_KEYS[piece][sq];
            self.st.key ^= key;

            match piece.piece_type() {
                PieceType::Pawn => self.st.pawn_key ^= key,
                PieceType::King => self.st.non_pawn_key[piece.colour()] ^= key,
                piece_type => {
                    self.st.non_pawn_key[piece.colour()] ^= key;
                    self.st.non_pawn_material[piece.colour()] += piece.value();
                    if piece_type <= PieceType::Bishop {
                        self.st.minor_piece_key ^= key;
                    }
                }
            }
        }

        if let Some(ep) = self.st.ep_square {
            self.st.key ^= EP_KEYS[ep.file()];
        }
        if self.side_to_move == Colour::Black {
            self.st.key ^= SIDE_KEY;
        }
        self.st.key ^= CASTLING_KEYS[self.st.castling_rights.index()];

        for piece in Piece::all() {
            for count in 0..self.piece_count[piece] {
                self.st.material_key ^= PIECE_KEYS[piece][8 + count as usize];
            }
        }
    }

    /// Refreshes the king-safety metadata used for fast check detection:
    /// slider blockers and pinners for both kings, and the squares from
    /// which each piece type would check the opponent's king.
    fn set_check_info(&mut self) {
        self.update_slider_blockers(Colour::White);
        self.update_slider_blockers(Colour::Black);

        let them = !self.side_to_move;
        let ksq = self.king_sq(them);
        let occupied = self.pieces();

        self.st.check_squares[PieceType::Pawn] = pawn_attacks(ksq, them);
        self.st.check_squares[PieceType::Knight] = knight_attacks(ksq);
        self.st.check_squares[PieceType::Bishop] = bishop_attacks(ksq, occupied);
        self.st.check_squares[PieceType::Rook] = rook_attacks(ksq, occupied);
        self.st.check_squares[PieceType::Queen] = self.st.check_squares[PieceType::Bishop]
            | self.st.check_squares[PieceType::Rook];
        self.st.check_squares[PieceType::King] = SquareSet::EMPTY;
    }

    /// Computes the pieces shielding the king of `colour` from enemy
    /// sliders, and the enemy sliders doing the pinning.
    fn update_slider_blockers(&mut self, colour: Colour) {
        let ksq = self.king_sq(colour);

        self.st.blockers_for_king[colour] = SquareSet::EMPTY;
        self.st.pinners[!colour] = SquareSet::EMPTY;

        let snipers = ((rook_attacks(ksq, SquareSet::EMPTY) & self.orthogonal_sliders())
            | (bishop_attacks(ksq, SquareSet::EMPTY) & self.diagonal_sliders()))
            & self.pieces_c(!colour);
        let occupancy = self.pieces() ^ snipers;

        for sniper in snipers {
            let blocking = between(ksq, sniper) & occupancy;
            if blocking.non_empty() && !blocking.many() {
                self.st.blockers_for_king[colour] |= blocking;
                if (blocking & self.pieces_c(colour)).non_empty() {
                    self.st.pinners[!colour] |= sniper.as_set();
                }
            }
        }
    }

    // board access

    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.board[sq]
    }

    pub fn moved_piece(&self, m: Move) -> Option<Piece> {
        self.board[m.from()]
    }

    pub fn pieces(&self) -> SquareSet {
        self.by_colour[Colour::White] | self.by_colour[Colour::Black]
    }

    pub fn pieces_pt(&self, piece_type: PieceType) -> SquareSet {
        self.by_type[piece_type]
    }

    pub fn pieces_c(&self, colour: Colour) -> SquareSet {
        self.by_colour[colour]
    }

    pub fn pieces_cp(&self, colour: Colour, piece_type: PieceType) -> SquareSet {
        self.by_colour[colour] & self.by_type[piece_type]
    }

    /// All rooks and queens, of both colours.
    pub fn orthogonal_sliders(&self) -> SquareSet {
        self.by_type[PieceType::Rook] | self.by_type[PieceType::Queen]
    }

    /// All bishops and queens, of both colours.
    pub fn diagonal_sliders(&self) -> SquareSet {
        self.by_type[PieceType::Bishop] | self.by_type[PieceType::Queen]
    }

    pub fn king_sq(&self, colour: Colour) -> Square {
        self.pieces_cp(colour, PieceType::King).first().unwrap()
    }

    pub fn piece_count(&self, piece: Piece) -> u8 {
        self.piece_count[piece]
    }

    pub const fn side_to_move(&self) -> Colour {
        self.side_to_move
    }

    pub const fn game_ply(&self) -> i32 {
        self.game_ply
    }

    pub const fn is_chess960(&self) -> bool {
        self.chess960
    }

    pub const fn rule50_count(&self) -> i32 {
        self.st.rule50
    }

    pub const fn ep_square(&self) -> Option<Square> {
        self.st.ep_square
    }

    pub const fn checkers(&self) -> SquareSet {
        self.st.checkers
    }

    pub fn blockers_for_king(&self, colour: Colour) -> SquareSet {
        self.st.blockers_for_king[colour]
    }

    pub fn pinners(&self, colour: Colour) -> SquareSet {
        self.st.pinners[colour]
    }

    pub fn check_squares(&self, piece_type: PieceType) -> SquareSet {
        self.st.check_squares[piece_type]
    }

    pub const fn state(&self) -> &StateInfo {
        &self.st
    }

    // keys

    pub const fn key(&self) -> u64 {
        self.st.key
    }

    pub const fn pawn_key(&self) -> u64 {
        self.st.pawn_key
    }

    pub const fn material_key(&self) -> u64 {
        self.st.material_key
    }

    pub const fn minor_piece_key(&self) -> u64 {
        self.st.minor_piece_key
    }

    pub fn non_pawn_key(&self, colour: Colour) -> u64 {
        self.st.non_pawn_key[colour]
    }

    pub fn non_pawn_material(&self, colour: Colour) -> i32 {
        self.st.non_pawn_material[colour]
    }

    // castling

    pub fn can_castle(&self, right: CastlingRights) -> bool {
        self.st.castling_rights.intersects(right)
    }

    pub fn castling_rights(&self) -> CastlingRights {
        self.st.castling_rights
    }

    pub fn castling_rook_square(&self, right: CastlingRights) -> Option<Square> {
        self.castling_rook_square[right.right_index()]
    }

    pub fn castling_impeded(&self, right: CastlingRights) -> bool {
        (self.castling_path[right.right_index()] & self.pieces()).non_empty()
    }

    // attack queries

    /// All pieces of either colour attacking `sq` on the given occupancy.
    pub fn attackers_to(&self, sq: Square, occupied: SquareSet) -> SquareSet {
        (rook_attacks(sq, occupied) & self.orthogonal_sliders())
            | (bishop_attacks(sq, occupied) & self.diagonal_sliders())
            | (pawn_attacks(sq, Colour::Black) & self.pieces_cp(Colour::White, PieceType::Pawn))
            | (pawn_attacks(sq, Colour::White) & self.pieces_cp(Colour::Black, PieceType::Pawn))
            | (knight_attacks(sq) & self.by_type[PieceType::Knight])
            | (king_attacks(sq) & self.by_type[PieceType::King])
    }

    /// Existence test for an attacker of colour `by` on `sq`; cheaper than
    /// materialising the full attacker set when only the answer matters.
    pub fn attackers_to_exist(&self, sq: Square, occupied: SquareSet, by: Colour) -> bool {
        let orthos = self.pieces_c(by) & self.orthogonal_sliders();
        let diags = self.pieces_c(by) & self.diagonal_sliders();
        ((rook_attacks(sq, SquareSet::EMPTY) & orthos).non_empty()
            && (rook_attacks(sq, occupied) & orthos).non_empty())
            || ((bishop_attacks(sq, SquareSet::EMPTY) & diags).non_empty()
                && (bishop_attacks(sq, occupied) & diags).non_empty())
            || (((pawn_attacks(sq, !by) & self.by_type[PieceType::Pawn])
                | (knight_attacks(sq) & self.by_type[PieceType::Knight])
                | (king_attacks(sq) & self.by_type[PieceType::King]))
                & self.pieces_c(by))
            .non_empty()
    }

    // incremental board updates

    fn put_piece(&mut self, piece: Piece, sq: Square) {
        debug_assert!(self.board[sq].is_none());
        self.board[sq] = Some(piece);
        self.by_type[piece.piece_type()] |= sq.as_set();
        self.by_colour[piece.colour()] |= sq.as_set();
        self.piece_count[piece] += 1;
    }

    fn remove_piece(&mut self, sq: Square) -> Piece {
        let piece = self.board[sq].take().unwrap();
        self.by_type[piece.piece_type()] ^= sq.as_set();
        self.by_colour[piece.colour()] ^= sq.as_set();
        self.piece_count[piece] -= 1;
        piece
    }

    fn move_piece(&mut self, from: Square, to: Square) {
        let piece = self.board[from].take().unwrap();
        debug_assert!(self.board[to].is_none());
        let mask = from.as_set() | to.as_set();
        self.by_type[piece.piece_type()] ^= mask;
        self.by_colour[piece.colour()] ^= mask;
        self.board[to] = Some(piece);
    }

    /// Moves king and rook to their castling destinations, or back. Both
    /// pieces are lifted before either lands because the four squares can
    /// overlap in Chess960.
    fn do_castling<const APPLY: bool>(
        &mut self,
        us: Colour,
        king_from: Square,
        rook_from: Square,
    ) -> (Square, Square) {
        let kingside = rook_from > king_from;
        let king_to = if kingside { Square::G1 } else { Square::C1 }.relative_to(us);
        let rook_to = if kingside { Square::F1 } else { Square::D1 }.relative_to(us);

        if APPLY {
            self.remove_piece(king_from);
            self.remove_piece(rook_from);
            self.put_piece(Piece::new(us, PieceType::King), king_to);
            self.put_piece(Piece::new(us, PieceType::Rook), rook_to);
        } else {
            self.remove_piece(king_to);
            self.remove_piece(rook_to);
            self.put_piece(Piece::new(us, PieceType::King), king_from);
            self.put_piece(Piece::new(us, PieceType::Rook), rook_from);
        }

        (king_to, rook_to)
    }

    // making and unmaking moves

    /// Convenience wrapper for callers that have not already computed
    /// whether the move gives check.
    pub fn do_move_simple(&mut self, m: Move) -> DirtyPiece {
        let gives_check = self.gives_check(m);
        self.do_move(m, gives_check, None)
    }

    /// Makes a legal move. `gives_check` must be `gives_check(m)`; the
    /// caller usually has it already. If a transposition table is supplied,
    /// the cluster of the resulting key is prefetched.
    #[allow(clippy::too_many_lines, clippy::cognitive_complexity)]
    pub fn do_move(
        &mut self,
        m: Move,
        gives_check: bool,
        tt: Option<&TranspositionTable>,
    ) -> DirtyPiece {
        debug_assert!(self.pseudo_legal(m), "illegal move {m} in {self}");
        debug_assert!(self.legal(m), "illegal move {m} in {self}");
        #[cfg(debug_assertions)]
        self.check_ok();

        let mut k = self.st.key ^ SIDE_KEY;
        self.history.push(self.st.clone());

        self.game_ply += 1;
        self.st.rule50 += 1;
        self.st.plies_from_null += 1;

        let us = self.side_to_move;
        let them = !us;
        let from = m.from();
        let mut to = m.to();
        let pc = self.board[from].unwrap();
        let mut captured = if m.is_en_passant() {
            Some(Piece::new(them, PieceType::Pawn))
        } else {
            self.board[to]
        };

        let mut dp = DirtyPiece { pc, from, to: Some(to), remove: None, add: None };

        debug_assert_eq!(pc.colour(), us);
        debug_assert!(captured.is_none_or(|cap| cap.piece_type() != PieceType::King));

        if m.is_castling() {
            debug_assert_eq!(pc, Piece::new(us, PieceType::King));
            debug_assert_eq!(captured, Some(Piece::new(us, PieceType::Rook)));

            let rook = captured.unwrap();
            let rook_from = to;
            let (king_to, rook_to) = self.do_castling::<true>(us, from, rook_from);
            to = king_to;

            dp.to = Some(king_to);
            dp.remove = Some((rook, rook_from));
            dp.add = Some((rook, rook_to));

            let rook_delta = PIECE_KEYS[rook][rook_from] ^ PIECE_KEYS[rook][rook_to];
            k ^= rook_delta;
            self.st.non_pawn_key[us] ^= rook_delta;
            captured = None;
        } else if let Some(cap) = captured {
            let mut capsq = to;

            if cap.piece_type() == PieceType::Pawn {
                if m.is_en_passant() {
                    capsq = to.pawn_push(them).unwrap();

                    debug_assert_eq!(pc, Piece::new(us, PieceType::Pawn));
                    debug_assert_eq!(Some(to), self.history.last().unwrap().ep_square);
                    debug_assert_eq!(to.rank(), Rank::Six.relative_to(us));
                    debug_assert!(self.board[to].is_none());
                    debug_assert_eq!(self.board[capsq], Some(cap));
                }
                self.st.pawn_key ^= PIECE_KEYS[cap][capsq];
            } else {
                self.st.non_pawn_material[them] -= cap.value();
                self.st.non_pawn_key[them] ^= PIECE_KEYS[cap][capsq];
                if cap.piece_type() <= PieceType::Bishop {
                    self.st.minor_piece_key ^= PIECE_KEYS[cap][capsq];
                }
            }

            dp.remove = Some((cap, capsq));
            self.remove_piece(capsq);
            k ^= PIECE_KEYS[cap][capsq];
            self.st.material_key ^=
                PIECE_KEYS[cap][8 + usize::from(self.piece_count[cap])];

            self.st.rule50 = 0;
        }

        k ^= PIECE_KEYS[pc][from] ^ PIECE_KEYS[pc][to];

        if let Some(ep) = self.st.ep_square.take() {
            k ^= EP_KEYS[ep.file()];
        }

        let rights_touched = self.castling_rights_mask[from] | self.castling_rights_mask[to];
        if self.st.castling_rights.intersects(rights_touched) {
            k ^= CASTLING_KEYS[self.st.castling_rights.index()];
            self.st.castling_rights.remove(rights_touched);
            k ^= CASTLING_KEYS[self.st.castling_rights.index()];
        }

        // The board update for castling happened above.
        if !m.is_castling() {
            self.move_piece(from, to);
        }

        let mut double_push = false;
        if pc.piece_type() == PieceType::Pawn {
            if from.inner() ^ to.inner() == 16 {
                double_push = true;
            } else if let Some(promo_type) = m.promotion_type() {
                let promotion = Piece::new(us, promo_type);

                debug_assert_eq!(to.rank(), Rank::Eight.relative_to(us));
                debug_assert!(promo_type.legal_promo());

                self.remove_piece(to);
                self.put_piece(promotion, to);

                dp.add = Some((promotion, to));
                dp.to = None;

                // PIECE_KEYS[pawn][to] is zero on the back rank, so the
                // pawn needs no clearing from the main or pawn keys.
                k ^= PIECE_KEYS[promotion][to];
                self.st.material_key ^= PIECE_KEYS[promotion]
                    [8 + usize::from(self.piece_count[promotion]) - 1]
                    ^ PIECE_KEYS[pc][8 + usize::from(self.piece_count[pc])];

                if promo_type <= PieceType::Bishop {
                    self.st.minor_piece_key ^= PIECE_KEYS[promotion][to];
                }
                self.st.non_pawn_material[us] += promotion.value();
            }

            self.st.pawn_key ^= PIECE_KEYS[pc][from] ^ PIECE_KEYS[pc][to];
            self.st.rule50 = 0;
        } else {
            let delta = PIECE_KEYS[pc][from] ^ PIECE_KEYS[pc][to];
            self.st.non_pawn_key[us] ^= delta;
            if pc.piece_type() <= PieceType::Bishop {
                self.st.minor_piece_key ^= delta;
            }
        }

        self.st.captured_piece = captured;

        self.st.checkers = if gives_check {
            self.attackers_to(self.king_sq(them), self.pieces()) & self.pieces_c(us)
        } else {
            SquareSet::EMPTY
        };

        self.side_to_move = them;
        self.set_check_info();

        // A double push only records an en passant square if the capture
        // would actually be playable next move; the key must agree.
        if double_push {
            if let Some(ep) = self.legal_ep_square(us, to) {
                self.st.ep_square = Some(ep);
                k ^= EP_KEYS[ep.file()];
            }
        }

        self.st.key = k;
        if let Some(tt) = tt {
            tt.prefetch(k);
        }

        self.st.repetition = 0;
        let end = self.st.rule50.min(self.st.plies_from_null);
        if end >= 4 {
            let len = self.history.len();
            let mut i = 4;
            while i <= end {
                let prior = &self.history[len - i as usize];
                if prior.key == self.st.key {
                    self.st.repetition = if prior.repetition != 0 { -i } else { i };
                    break;
                }
                i += 2;
            }
        }

        #[cfg(debug_assertions)]
        self.check_ok();

        debug_assert_eq!(dp.remove.is_some(), captured.is_some() || m.is_castling());
        debug_assert_eq!(dp.add.is_some(), m.is_promotion() || m.is_castling());
        dp
    }

    /// Decides whether an en passant square should be recorded after a
    /// double push to `to` by `us`. Only squares whose capture is legal for
    /// the opponent are recorded.
    fn legal_ep_square(&self, us: Colour, to: Square) -> Option<Square> {
        let them = !us;
        let ep = to.pawn_push(them).unwrap();

        let mut pawns = pawn_attacks(ep, us) & self.pieces_cp(them, PieceType::Pawn);

        // No pawn can capture: no en passant square.
        if pawns.is_empty() {
            return None;
        }

        // A checker other than the pushed pawn makes en passant illegal
        // next move regardless of the capturing pawn.
        if (self.st.checkers & !to.as_set()).non_empty() {
            return None;
        }

        // Three or more attacking pawns cannot occur in a legal game.
        debug_assert!(pawns.count() <= 2);

        if pawns.many() {
            // With two candidate pawns of which at least one is unpinned,
            // the capture is legal: no horizontal check can be exposed.
            if !(self.blockers_for_king(them) & pawns).many() {
                return Some(ep);
            }

            // Both pawns are pinned. Unless one of them sits on the king's
            // file (pinned by a rook from in front, which the capture
            // cannot expose) the capture is always illegal.
            let king_file = SquareSet::file(self.king_sq(them).file());
            if (king_file & pawns).is_empty() {
                return None;
            }

            // Verify the remaining pawn alone.
            pawns = pawns.without(king_file);
        }

        let ksq = self.king_sq(them);
        let occupied = (self.pieces() ^ pawns.isolate_first() ^ to.as_set()) | ep.as_set();

        let exposed = (rook_attacks(ksq, occupied)
            & self.pieces_c(us)
            & self.orthogonal_sliders())
        .non_empty()
            || (bishop_attacks(ksq, occupied) & self.pieces_c(us) & self.diagonal_sliders())
                .non_empty();

        (!exposed).then_some(ep)
    }

    /// Exactly reverses [`Self::do_move`].
    pub fn undo_move(&mut self, m: Move) {
        self.side_to_move = !self.side_to_move;

        let us = self.side_to_move;
        let from = m.from();
        let to = m.to();

        debug_assert!(self.board[from].is_none() || m.is_castling());
        debug_assert!(self
            .st
            .captured_piece
            .is_none_or(|cap| cap.piece_type() != PieceType::King));

        if m.is_promotion() {
            debug_assert_eq!(to.rank(), Rank::Eight.relative_to(us));
            debug_assert_eq!(
                self.board[to].map(Piece::piece_type),
                m.promotion_type()
            );

            self.remove_piece(to);
            self.put_piece(Piece::new(us, PieceType::Pawn), to);
        }

        if m.is_castling() {
            self.do_castling::<false>(us, from, to);
        } else {
            self.move_piece(to, from);

            if let Some(captured) = self.st.captured_piece {
                let capsq = if m.is_en_passant() {
                    to.pawn_push(!us).unwrap()
                } else {
                    to
                };
                self.put_piece(captured, capsq);
            }
        }

        self.st = self.history.pop().expect("no move to undo");
        self.game_ply -= 1;

        #[cfg(debug_assertions)]
        self.check_ok();
    }

    /// Flips the side to move without touching the board. Requires the
    /// side to move not to be in check.
    pub fn do_null_move(&mut self, tt: Option<&TranspositionTable>) {
        debug_assert!(self.st.checkers.is_empty());

        self.history.push(self.st.clone());

        if let Some(ep) = self.st.ep_square.take() {
            self.st.key ^= EP_KEYS[ep.file()];
        }
        self.st.key ^= SIDE_KEY;

        if let Some(tt) = tt {
            tt.prefetch(self.st.key);
        }

        self.st.plies_from_null = 0;
        self.side_to_move = !self.side_to_move;
        self.set_check_info();
        self.st.repetition = 0;

        #[cfg(debug_assertions)]
        self.check_ok();
    }

    pub fn undo_null_move(&mut self) {
        debug_assert!(self.st.checkers.is_empty());

        self.st = self.history.pop().expect("no null move to undo");
        self.side_to_move = !self.side_to_move;
    }

    // move vetting

    /// Tests a pseudo-legal move for full legality.
    pub fn legal(&self, m: Move) -> bool {
        debug_assert!(self.pseudo_legal(m));

        let us = self.side_to_move;
        let them = !us;
        let from = m.from();
        let to = m.to();

        debug_assert_eq!(self.moved_piece(m).map(Piece::colour), Some(us));

        // En passant exposure is uncommon enough to test by simulation.
        if m.is_en_passant() {
            let ksq = self.king_sq(us);
            let capsq = to.pawn_push(them).unwrap();
            let occupied =
                (self.pieces() ^ from.as_set() ^ capsq.as_set()) | to.as_set();

            debug_assert_eq!(Some(to), self.st.ep_square);

            return (rook_attacks(ksq, occupied)
                & self.pieces_c(them)
                & self.orthogonal_sliders())
            .is_empty()
                && (bishop_attacks(ksq, occupied)
                    & self.pieces_c(them)
                    & self.diagonal_sliders())
                .is_empty();
        }

        // Castling walks the king's path; move generation deferred the
        // attack check to here.
        if m.is_castling() {
            let king_to = if to > from { Square::G1 } else { Square::C1 }.relative_to(us);
            // Walk from the king's destination back towards its origin; in
            // Chess960 the destination can lie on either side of it.
            let step: i8 = if king_to > from { -1 } else { 1 };

            let mut sq = king_to;
            while sq != from {
                if self.attackers_to_exist(sq, self.pieces(), them) {
                    return false;
                }
                #[allow(clippy::cast_sign_loss)]
                {
                    // The walk stays on the back rank between king_to and from.
                    sq = Square::new((sq.inner() as i8 + step) as u8).unwrap();
                }
            }

            // In Chess960 the castling rook itself may have been shielding
            // the king.
            return !self.chess960 || !self.blockers_for_king(us).contains_square(to);
        }

        // King moves must step off the attacked square with the king
        // removed from the occupancy, to catch retreats along the ray.
        if self.board[from].unwrap().piece_type() == PieceType::King {
            return !self.attackers_to_exist(to, self.pieces() ^ from.as_set(), them);
        }

        // Everything else is legal iff it is not pinned or stays on the
        // pin ray.
        !self.blockers_for_king(us).contains_square(from)
            || line(from, to).contains_square(self.king_sq(us))
    }

    /// Validates an arbitrary 16-bit move against this position. Used to
    /// vet moves read from the transposition table, which can be corrupted
    /// by data races or key collisions.
    pub fn pseudo_legal(&self, m: Move) -> bool {
        let us = self.side_to_move;
        let from = m.from();
        let to = m.to();

        // Uncommon kinds defer to the move generator for the current mode.
        if !m.is_normal() {
            let mut list = MoveList::new();
            self.generate_moves(&mut list);
            return list.contains(&m);
        }

        let Some(pc) = self.board[from] else {
            return false;
        };
        if pc.colour() != us {
            return false;
        }

        if self.pieces_c(us).contains_square(to) {
            return false;
        }

        if pc.piece_type() == PieceType::Pawn {
            // Promotions carry their own kind; a normal pawn move may not
            // land on a back rank.
            if SquareSet::BACK_RANKS.contains_square(to) {
                return false;
            }

            let is_capture = pawn_attacks(from, us).contains_square(to)
                && self.pieces_c(!us).contains_square(to);
            let single = from.pawn_push(us) == Some(to) && self.board[to].is_none();
            let double = from.rank() == Rank::Two.relative_to(us)
                && from.pawn_push(us).and_then(|sq| sq.pawn_push(us)) == Some(to)
                && self.board[to].is_none()
                && from.pawn_push(us).is_some_and(|sq| self.board[sq].is_none());

            if !(is_capture || single || double) {
                return false;
            }
        } else if !attacks_by_type(pc.piece_type(), from, self.pieces()).contains_square(to) {
            return false;
        }

        // In check, the move must resolve the check the same way the
        // evasion generator would.
        if self.st.checkers.non_empty() {
            if pc.piece_type() != PieceType::King {
                if self.st.checkers.many() {
                    return false;
                }
                if !between(self.king_sq(us), self.st.checkers.first().unwrap())
                    .contains_square(to)
                {
                    return false;
                }
            } else if self.attackers_to_exist(to, self.pieces() ^ from.as_set(), !us) {
                return false;
            }
        }

        true
    }

    /// Tests whether a pseudo-legal move gives check.
    pub fn gives_check(&self, m: Move) -> bool {
        let us = self.side_to_move;
        let them = !us;
        let from = m.from();
        let to = m.to();

        debug_assert_eq!(self.board[from].map(Piece::colour), Some(us));

        // Direct check.
        if self
            .check_squares(self.board[from].unwrap().piece_type())
            .contains_square(to)
        {
            return true;
        }

        let enemy_king = self.king_sq(them);

        // Discovered check: the mover is a blocker for the enemy king and
        // leaves the ray. Castling always discovers if the king blocked.
        if self.blockers_for_king(them).contains_square(from) {
            return !line(from, to).contains_square(enemy_king) || m.is_castling();
        }

        if m.is_promotion() {
            let promo = m.promotion_type().unwrap();
            return attacks_by_type(promo, to, self.pieces() ^ from.as_set())
                .contains_square(enemy_king);
        }

        // En passant can discover a check through the captured pawn, which
        // neither of the cases above sees.
        if m.is_en_passant() {
            let capsq = Square::from_rank_file(from.rank(), to.file());
            let occupied =
                (self.pieces() ^ from.as_set() ^ capsq.as_set()) | to.as_set();

            return (rook_attacks(enemy_king, occupied)
                & self.pieces_c(us)
                & self.orthogonal_sliders())
            .non_empty()
                || (bishop_attacks(enemy_king, occupied)
                    & self.pieces_c(us)
                    & self.diagonal_sliders())
                .non_empty();
        }

        if m.is_castling() {
            let rook_to = if to > from { Square::F1 } else { Square::D1 }.relative_to(us);
            return self.check_squares(PieceType::Rook).contains_square(rook_to);
        }

        false
    }

    // static exchange evaluation

    /// Tests whether the static exchange evaluation of `m` meets
    /// `threshold`: a null-window alpha-beta over the capture sequence on
    /// the destination square.
    pub fn see_ge(&self, m: Move, threshold: i32) -> bool {
        // Only normal moves are scored; the others pass a trivial SEE.
        if !m.is_normal() {
            return 0 >= threshold;
        }

        let from = m.from();
        let to = m.to();

        let mut swap = self.board[to].map_or(0, Piece::value) - threshold;
        if swap < 0 {
            return false;
        }

        swap = self.board[from].unwrap().value() - swap;
        if swap <= 0 {
            return true;
        }

        debug_assert_eq!(self.board[from].unwrap().colour(), self.side_to_move);

        // Removing `to` from the occupancy matters for the pinned-piece
        // logic when the first capture removes a pinner.
        let mut occupied = self.pieces() ^ from.as_set() ^ to.as_set();
        let mut stm = self.side_to_move;
        let mut attackers = self.attackers_to(to, occupied);
        let mut res = 1;

        loop {
            stm = !stm;
            attackers &= occupied;

            let mut stm_attackers = attackers & self.pieces_c(stm);
            if stm_attackers.is_empty() {
                break;
            }

            // Pinned pieces sit the exchange out while their pinners stand.
            if (self.pinners(!stm) & occupied).non_empty() {
                stm_attackers = stm_attackers.without(self.blockers_for_king(stm));
                if stm_attackers.is_empty() {
                    break;
                }
            }

            res ^= 1;

            // Capture with the least valuable attacker, revealing any
            // x-ray attackers behind it.
            let pawns = stm_attackers & self.by_type[PieceType::Pawn];
            let knights = stm_attackers & self.by_type[PieceType::Knight];
            let bishops = stm_attackers & self.by_type[PieceType::Bishop];
            let rooks = stm_attackers & self.by_type[PieceType::Rook];
            let queens = stm_attackers & self.by_type[PieceType::Queen];

            if pawns.non_empty() {
                swap = PieceType::Pawn.value() - swap;
                if swap < res {
                    break;
                }
                occupied ^= pawns.isolate_first();
                attackers |= bishop_attacks(to, occupied) & self.diagonal_sliders();
            } else if knights.non_empty() {
                swap = PieceType::Knight.value() - swap;
                if swap < res {
                    break;
                }
                occupied ^= knights.isolate_first();
            } else if bishops.non_empty() {
                swap = PieceType::Bishop.value() - swap;
                if swap < res {
                    break;
                }
                occupied ^= bishops.isolate_first();
                attackers |= bishop_attacks(to, occupied) & self.diagonal_sliders();
            } else if rooks.non_empty() {
                swap = PieceType::Rook.value() - swap;
                if swap < res {
                    break;
                }
                occupied ^= rooks.isolate_first();
                attackers |= rook_attacks(to, occupied) & self.orthogonal_sliders();
            } else if queens.non_empty() {
                swap = PieceType::Queen.value() - swap;
                debug_assert!(swap >= res);
                occupied ^= queens.isolate_first();
                attackers |= (bishop_attacks(to, occupied) & self.diagonal_sliders())
                    | (rook_attacks(to, occupied) & self.orthogonal_sliders());
            } else {
                // A king capture is only final if the opponent has no
                // attacker left; otherwise it is illegal and the result
                // flips back.
                return if (attackers & !self.pieces_c(stm)).non_empty() {
                    res == 0
                } else {
                    res != 0
                };
            }
        }

        res != 0
    }

    /// Cheap estimate of the key after a normal move, for speculative
    /// transposition-table prefetching. Ignores castling rights, en
    /// passant, and promotions.
    pub fn key_after(&self, m: Move) -> u64 {
        let from = m.from();
        let to = m.to();
        let pc = self.board[from].unwrap();

        let mut key = self.st.key ^ SIDE_KEY;
        key ^= PIECE_KEYS[pc][from] ^ PIECE_KEYS[pc][to];
        if let Some(captured) = self.board[to] {
            key ^= PIECE_KEYS[captured][to];
        }
        key
    }

    // draws and repetitions

    /// Whether the position is drawn by the fifty-move rule or by
    /// repetition. Stalemate is the move loop's business, not ours.
    pub fn is_draw(&self, ply: i32) -> bool {
        if self.st.rule50 > 99 && (self.st.checkers.is_empty() || self.has_legal_moves()) {
            return true;
        }
        self.is_repetition(ply)
    }

    /// A position repeated once strictly after the root counts as a draw;
    /// at or before the root it must have occurred twice (tracked by the
    /// sign of `repetition`).
    pub fn is_repetition(&self, ply: i32) -> bool {
        self.st.repetition != 0 && self.st.repetition < ply
    }

    /// Whether any position since the last irreversible move has already
    /// repeated an earlier one.
    pub fn has_repeated(&self) -> bool {
        let mut end = self.st.rule50.min(self.st.plies_from_null);
        let mut back = 0;
        while end >= 4 {
            let state = if back == 0 {
                &self.st
            } else {
                &self.history[self.history.len() - back]
            };
            if state.repetition != 0 {
                return true;
            }
            back += 1;
            end -= 1;
        }
        false
    }

    /// Tests whether the side to move has a move that would complete a
    /// repetition, via the cuckoo tables of reversible-move keys. Agrees
    /// with `is_draw(ply + 1)` across all legal moves.
    pub fn upcoming_repetition(&self, ply: i32) -> bool {
        let end = self.st.rule50.min(self.st.plies_from_null);
        if end < 3 {
            return false;
        }

        let tables = cuckoo::tables();
        let occupied = self.pieces();
        let original_key = self.st.key;
        let len = self.history.len();
        let key_back = |plies: i32| self.history[len - plies as usize].key;

        let mut other = original_key ^ key_back(1) ^ SIDE_KEY;

        let mut i = 3;
        while i <= end {
            other ^= key_back(i - 1) ^ key_back(i) ^ SIDE_KEY;

            if other == 0 {
                let move_key = original_key ^ key_back(i);
                if let Some(mv) = tables.lookup(move_key) {
                    // The move is only playable if nothing stands between
                    // its endpoints.
                    let path = between(mv.from(), mv.to()).toggle_square(mv.to());
                    if (path & occupied).is_empty() {
                        if ply > i {
                            return true;
                        }
                        // At or below the root, require a true repetition
                        // rather than a first visit.
                        if self.history[len - i as usize].repetition != 0 {
                            return true;
                        }
                    }
                }
            }

            i += 2;
        }
        false
    }

    fn has_legal_moves(&self) -> bool {
        !self.legal_moves().is_empty()
    }

    // FEN and debugging output

    pub fn fen(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        for rank in Rank::all().rev() {
            let mut empty_run = 0;
            for file in File::all() {
                match self.board[Square::from_rank_file(rank, file)] {
                    Some(piece) => {
                        if empty_run > 0 {
                            write!(out, "{empty_run}").unwrap();
                            empty_run = 0;
                        }
                        out.push(piece.char());
                    }
                    None => empty_run += 1,
                }
            }
            if empty_run > 0 {
                write!(out, "{empty_run}").unwrap();
            }
            if rank != Rank::One {
                out.push('/');
            }
        }

        out.push(' ');
        out.push_str(if self.side_to_move == Colour::White { "w" } else { "b" });
        out.push(' ');

        if self.st.castling_rights.is_empty() {
            out.push('-');
        } else {
            for (right, standard) in [
                (CastlingRights::WHITE_KING, 'K'),
                (CastlingRights::WHITE_QUEEN, 'Q'),
                (CastlingRights::BLACK_KING, 'k'),
                (CastlingRights::BLACK_QUEEN, 'q'),
            ] {
                if !self.can_castle(right) {
                    continue;
                }
                if self.chess960 {
                    // Shredder-FEN: name the rook file.
                    let rook = self.castling_rook_square(right).unwrap();
                    let c = rook.file().char();
                    out.push(if standard.is_ascii_uppercase() {
                        c.to_ascii_uppercase()
                    } else {
                        c
                    });
                } else {
                    out.push(standard);
                }
            }
        }

        out.push(' ');
        match self.st.ep_square {
            Some(ep) => out.push_str(ep.name()),
            None => out.push('-'),
        }

        let fullmove = 1 + (self.game_ply - i32::from(self.side_to_move == Colour::Black)) / 2;
        write!(out, " {} {}", self.st.rule50, fullmove).unwrap();

        out
    }

    /// Mirrors the position top-to-bottom with colours reversed; the key
    /// and evaluation of the flipped position must match the original.
    /// Debugging aid.
    pub fn flip(&mut self) {
        let fen = self.fen();
        let mut fields = fen.split(' ');

        let swap_case = |s: &str| {
            s.chars()
                .map(|c| {
                    if c.is_ascii_uppercase() {
                        c.to_ascii_lowercase()
                    } else {
                        c.to_ascii_uppercase()
                    }
                })
                .collect::<String>()
        };

        let placement = fields.next().unwrap();
        let placement =
            swap_case(&placement.split('/').rev().collect::<Vec<_>>().join("/"));

        let side = if fields.next() == Some("w") { "b" } else { "w" };
        let castling = swap_case(fields.next().unwrap_or("-"));
        let ep = match fields.next() {
            Some("-") | None => "-".to_string(),
            Some(ep) => {
                let mut chars = ep.chars();
                let file = chars.next().unwrap();
                let rank = if chars.next() == Some('6') { '3' } else { '6' };
                format!("{file}{rank}")
            }
        };
        let rest: Vec<_> = fields.collect();

        let flipped = format!("{placement} {side} {castling} {ep} {}", rest.join(" "));
        let parsed = Fen::parse(&flipped).expect("flipped FEN must parse");
        let chess960 = self.chess960;
        *self = Self::blank();
        self.set_from_fen(&parsed, chess960);
    }

    /// Finds the legal move matching a UCI move string. Castling is
    /// accepted in king-destination form for standard chess and
    /// king-takes-rook form for Chess960.
    pub fn parse_uci(&self, uci: &str) -> Result<Move, MoveParseError> {
        if !(4..=5).contains(&uci.len()) {
            return Err(MoveParseError::InvalidLength(uci.len()));
        }
        for m in self.legal_moves() {
            if self.move_to_uci(m) == uci {
                return Ok(m);
            }
        }
        Err(MoveParseError::IllegalMove(uci.to_string()))
    }

    pub fn move_to_uci(&self, m: Move) -> String {
        let to = if m.is_castling() && !self.chess960 {
            let file = if m.to() > m.from() { File::G } else { File::C };
            Square::from_rank_file(m.from().rank(), file)
        } else {
            m.to()
        };
        match m.promotion_type() {
            Some(promo) => {
                format!("{}{}{}", m.from(), to, promo.promo_char().unwrap_or('?'))
            }
            None => format!("{}{}", m.from(), to),
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "+---+---+---+---+---+---+---+---+")?;
        for rank in Rank::all().rev() {
            write!(f, "|")?;
            for file in File::all() {
                let sq = Square::from_rank_file(rank, file);
                match self.board[sq] {
                    Some(piece) => write!(f, " {} |", piece.char())?,
                    None => write!(f, "   |")?,
                }
            }
            writeln!(f, " {}", rank.char())?;
            writeln!(f, "+---+---+---+---+---+---+---+---+")?;
        }
        writeln!(f, "  a   b   c   d   e   f   g   h")?;
        writeln!(f, "fen: {}", self.fen())?;
        writeln!(f, "key: {:016X}", self.st.key)?;
        write!(f, "checkers:")?;
        for sq in self.st.checkers {
            write!(f, " {sq}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIWIPETE: &str =
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

    fn play(pos: &mut Position, moves: &str) {
        for uci in moves.split_whitespace() {
            let m = pos.parse_uci(uci).unwrap();
            pos.do_move_simple(m);
        }
    }

    #[test]
    fn startpos_basics() {
        let pos = Position::startpos();
        assert_eq!(pos.side_to_move(), Colour::White);
        assert_eq!(pos.pieces().count(), 32);
        assert_eq!(pos.piece_count(Piece::WP), 8);
        assert_eq!(pos.king_sq(Colour::White), Square::E1);
        assert_eq!(pos.king_sq(Colour::Black), Square::E8);
        assert!(pos.checkers().is_empty());
        assert_eq!(pos.fen(), Position::STARTING_FEN);
    }

    #[test]
    fn fen_round_trips() {
        for fen in [
            Position::STARTING_FEN,
            KIWIPETE,
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "4k3/8/8/8/8/8/8/4K3 w - - 3 17",
        ] {
            let pos = Position::from_fen(fen, false).unwrap();
            assert_eq!(pos.fen(), fen, "round trip failed");
        }
    }

    #[test]
    fn shredder_fen_round_trips_in_chess960() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w HAha - 0 1";
        let pos = Position::from_fen(fen, true).unwrap();
        assert_eq!(pos.fen(), fen);
    }

    #[test]
    fn incremental_key_matches_scratch_regeneration() {
        let mut pos = Position::startpos();
        for uci in ["e2e4", "c7c5", "g1f3"] {
            let m = pos.parse_uci(uci).unwrap();
            pos.do_move_simple(m);

            let scratch = Position::from_fen(&pos.fen(), false).unwrap();
            assert_eq!(pos.key(), scratch.key(), "after {uci}");
            assert_eq!(pos.pawn_key(), scratch.pawn_key(), "after {uci}");
            assert_eq!(pos.material_key(), scratch.material_key(), "after {uci}");
            assert_eq!(pos.minor_piece_key(), scratch.minor_piece_key(), "after {uci}");
            for colour in Colour::all() {
                assert_eq!(pos.non_pawn_key(colour), scratch.non_pawn_key(colour));
                assert_eq!(
                    pos.non_pawn_material(colour),
                    scratch.non_pawn_material(colour)
                );
            }
        }
    }

    #[test]
    fn do_undo_restores_everything() {
        for fen in [
            Position::STARTING_FEN,
            KIWIPETE,
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        ] {
            let mut pos = Position::from_fen(fen, false).unwrap();
            let snapshot = pos.clone();
            for m in pos.legal_moves() {
                let gives_check = pos.gives_check(m);
                pos.do_move(m, gives_check, None);
                pos.undo_move(m);
                assert_eq!(pos, snapshot, "do/undo of {m} changed the position");
            }
        }
    }

    #[test]
    fn null_move_round_trips() {
        let mut pos = Position::from_fen(KIWIPETE, false).unwrap();
        let snapshot = pos.clone();
        pos.do_null_move(None);
        assert_ne!(pos.key(), snapshot.key());
        assert_eq!(pos.side_to_move(), Colour::Black);
        pos.undo_null_move();
        assert_eq!(pos, snapshot);
    }

    #[test]
    fn captures_and_promotions_update_material_keys() {
        let mut pos =
            Position::from_fen("rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8", false)
                .unwrap();
        play(&mut pos, "d7c8q");
        let scratch = Position::from_fen(&pos.fen(), false).unwrap();
        assert_eq!(pos.key(), scratch.key());
        assert_eq!(pos.material_key(), scratch.material_key());
        assert_eq!(pos.pawn_key(), scratch.pawn_key());
        assert_eq!(pos.minor_piece_key(), scratch.minor_piece_key());
    }

    #[test]
    fn en_passant_pin_is_illegal() {
        // The d5 pawn may not capture e6 en passant: the h5 rook would
        // skewer the king along the fifth rank.
        let pos = Position::from_fen("1k6/8/8/K2Pp2r/8/8/8/8 w - e6 0 1", false).unwrap();
        assert_eq!(pos.ep_square(), Some(Square::E6));
        let ep = Move::new_en_passant(Square::D5, Square::E6);
        assert!(pos.pseudo_legal(ep));
        assert!(!pos.legal(ep));
        assert!(!pos.legal_moves().contains(&ep));
    }

    #[test]
    fn double_push_into_pin_does_not_set_ep_square() {
        let mut pos =
            Position::from_fen("1k6/4p3/8/K2P3r/8/8/8/8 b - - 0 1", false).unwrap();
        play(&mut pos, "e7e5");
        assert_eq!(pos.ep_square(), None);
        // the key must agree with a from-scratch setup.
        let scratch = Position::from_fen(&pos.fen(), false).unwrap();
        assert_eq!(pos.key(), scratch.key());
    }

    #[test]
    fn double_push_with_legal_capture_sets_ep_square() {
        let mut pos = Position::startpos();
        play(&mut pos, "e2e4 a7a6 e4e5 d7d5");
        assert_eq!(pos.ep_square(), Some(Square::D6));
        let scratch = Position::from_fen(&pos.fen(), false).unwrap();
        assert_eq!(pos.key(), scratch.key());
    }

    #[test]
    fn double_push_without_adjacent_pawn_sets_no_ep_square() {
        let mut pos = Position::startpos();
        play(&mut pos, "e2e4");
        assert_eq!(pos.ep_square(), None);
    }

    #[test]
    fn chess960_castling_with_overlapping_squares() {
        // King on b1, rook on a1: castling queenside lands king c1 and
        // rook d1, with the rook passing over the king's origin.
        let mut pos = Position::from_fen("7k/8/8/8/8/8/8/RK6 w A - 0 1", true).unwrap();
        let snapshot = pos.clone();

        let castle = Move::new_castling(Square::B1, Square::A1);
        assert!(pos.legal_moves().contains(&castle));

        pos.do_move_simple(castle);
        assert_eq!(pos.piece_on(Square::C1), Some(Piece::WK));
        assert_eq!(pos.piece_on(Square::D1), Some(Piece::WR));
        assert_eq!(pos.piece_on(Square::A1), None);
        assert_eq!(pos.piece_on(Square::B1), None);
        assert_eq!(pos.pieces().count(), 3);

        pos.undo_move(castle);
        assert_eq!(pos, snapshot);
    }

    #[test]
    fn castling_through_attacked_square_is_illegal() {
        // The h2 queen covers g1 but neither the king nor the queenside
        // path, so only the kingside castle is forbidden.
        let pos =
            Position::from_fen("r3k2r/8/8/8/8/8/7q/R3K2R w KQkq - 0 1", false).unwrap();
        let kingside = Move::new_castling(Square::E1, Square::H1);
        let queenside = Move::new_castling(Square::E1, Square::A1);
        assert!(!pos.legal(kingside));
        assert!(pos.legal_moves().contains(&queenside));
    }

    #[test]
    fn gives_check_matches_reality() {
        for fen in [
            Position::STARTING_FEN,
            KIWIPETE,
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "1k6/8/8/K2Pp2r/8/8/8/8 w - e6 0 1",
        ] {
            let mut pos = Position::from_fen(fen, false).unwrap();
            for m in pos.legal_moves() {
                let predicted = pos.gives_check(m);
                pos.do_move(m, predicted, None);
                assert_eq!(
                    pos.checkers().non_empty(),
                    predicted,
                    "gives_check disagreed for {m} in {fen}"
                );
                pos.undo_move(m);
            }
        }
    }

    #[test]
    fn see_orders_simple_exchanges() {
        // Rook takes an undefended pawn: wins exactly a pawn.
        let pos =
            Position::from_fen("1k1r4/1pp4p/p7/4p3/8/P5P1/1PP4P/2K1R3 w - - 0 1", false).unwrap();
        let m = pos.parse_uci("e1e5").unwrap();
        assert!(pos.see_ge(m, PieceType::Pawn.value()));
        assert!(!pos.see_ge(m, PieceType::Pawn.value() + 1));

        // Knight takes a pawn defended by a pawn: loses knight for pawn.
        let pos =
            Position::from_fen("4k3/8/5p2/4p3/8/3N4/8/4K3 w - - 0 1", false).unwrap();
        let m = pos.parse_uci("d3e5").unwrap();
        assert!(pos.see_ge(m, PieceType::Pawn.value() - PieceType::Knight.value()));
        assert!(!pos.see_ge(m, PieceType::Pawn.value() - PieceType::Knight.value() + 1));

        // Doubled rooks against a lone defender: the x-ray recapture from
        // d1 is revealed once the d2 rook has traded itself off.
        let pos =
            Position::from_fen("3r3k/8/8/3p4/8/8/3R4/3R3K w - - 0 1", false).unwrap();
        let m = pos.parse_uci("d2d5").unwrap();
        assert!(pos.see_ge(m, PieceType::Pawn.value()));
    }

    #[test]
    fn see_respects_pins() {
        // The b7 knight is the only defender of d6, but it is pinned to
        // the a8 king by the g2 bishop and cannot recapture.
        let pos =
            Position::from_fen("k7/1n6/3p4/8/8/8/6B1/3RK3 w - - 0 1", false).unwrap();
        assert!(pos.blockers_for_king(Colour::Black).contains_square(Square::B7));
        let m = pos.parse_uci("d1d6").unwrap();
        assert!(pos.see_ge(m, PieceType::Pawn.value()));

        // With the pin released (bishop off the diagonal), the knight
        // recaptures and the rook is lost for a pawn.
        let pos =
            Position::from_fen("k7/1n6/3p4/8/8/8/4B3/3RK3 w - - 0 1", false).unwrap();
        let m = pos.parse_uci("d1d6").unwrap();
        assert!(!pos.see_ge(m, 0));
    }

    #[test]
    fn upcoming_repetition_detects_knight_shuffle() {
        Position::init();
        let mut pos = Position::startpos();
        assert!(!pos.upcoming_repetition(5));

        play(&mut pos, "g1f3 g8f6 f3g1");
        // Black can play Ng8 and restore the start position.
        assert!(pos.upcoming_repetition(5));

        play(&mut pos, "f6g8");
        assert!(pos.is_draw(6));
        assert!(pos.is_repetition(6));
        assert!(pos.has_repeated());
    }

    #[test]
    fn upcoming_repetition_agrees_with_is_draw() {
        Position::init();
        let mut pos = Position::startpos();
        for uci in ["g1f3", "g8f6", "f3g1", "f6g8", "b1c3", "b8c6", "c3b1"] {
            let upcoming = pos.upcoming_repetition(5);
            let mut any_drawing_move = false;
            for m in pos.legal_moves() {
                let gives_check = pos.gives_check(m);
                pos.do_move(m, gives_check, None);
                any_drawing_move |= pos.is_draw(6);
                pos.undo_move(m);
            }
            assert_eq!(upcoming, any_drawing_move, "disagreement before {uci}");
            play(&mut pos, uci);
        }
    }

    #[test]
    fn fifty_move_rule_draws() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 100 80", false).unwrap();
        assert!(pos.is_draw(1));
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 99 80", false).unwrap();
        assert!(!pos.is_draw(1));
    }

    #[test]
    fn material_keys_from_endgame_codes() {
        let kbnkqq = Position::from_endgame_code("KBNKQQ", Colour::White).unwrap();
        assert_eq!(kbnkqq.fen(), "8/kqq5/8/8/8/8/8/KBN5 w - - 0 10");

        // The material key depends only on the piece counts, not on where
        // the pieces stand.
        let same_material =
            Position::from_fen("8/8/1qk5/3q4/8/2N5/1B6/K7 w - - 0 1", false).unwrap();
        assert_eq!(kbnkqq.material_key(), same_material.material_key());

        let different =
            Position::from_endgame_code("KBNKQ", Colour::White).unwrap();
        assert_ne!(kbnkqq.material_key(), different.material_key());
    }

    #[test]
    fn flip_preserves_structure() {
        let mut pos = Position::from_fen(KIWIPETE, false).unwrap();
        let original = pos.clone();
        pos.flip();
        assert_eq!(pos.side_to_move(), Colour::Black);
        assert_eq!(pos.pieces().count(), original.pieces().count());
        pos.flip();
        assert_eq!(pos.fen(), original.fen());
    }

    #[test]
    fn pseudo_legal_rejects_corrupt_moves() {
        let pos = Position::startpos();
        // moving an empty square
        assert!(!pos.pseudo_legal(Move::new(Square::E4, Square::E5)));
        // moving an enemy piece
        assert!(!pos.pseudo_legal(Move::new(Square::E7, Square::E5)));
        // landing on a friendly piece
        assert!(!pos.pseudo_legal(Move::new(Square::D1, Square::D2)));
        // a knight move that knights cannot make
        assert!(!pos.pseudo_legal(Move::new(Square::B1, Square::B4)));
        // a rook sliding through its own pawn
        assert!(!pos.pseudo_legal(Move::new(Square::A1, Square::A4)));
        // pawn double push blocked
        let blocked =
            Position::from_fen("4k3/8/8/8/8/4n3/4P3/4K3 w - - 0 1", false).unwrap();
        assert!(!blocked.pseudo_legal(Move::new(Square::E2, Square::E4)));
        assert!(!blocked.pseudo_legal(Move::new(Square::E2, Square::E3)));

        // every raw 16-bit pattern must be safely classifiable.
        for raw in 0..=u16::MAX {
            if let Some(m) = Move::from_raw(raw) {
                let _ = pos.pseudo_legal(m);
            }
        }
    }

    #[test]
    fn pseudo_legal_accepts_generated_moves() {
        for fen in [Position::STARTING_FEN, KIWIPETE] {
            let pos = Position::from_fen(fen, false).unwrap();
            let mut list = MoveList::new();
            pos.generate_moves(&mut list);
            for &m in &list {
                assert!(pos.pseudo_legal(m), "{m} generated but not pseudo-legal");
            }
        }
    }

    #[test]
    fn key_after_predicts_normal_moves() {
        let pos = Position::from_fen(KIWIPETE, false).unwrap();
        for m in pos.legal_moves() {
            if !m.is_normal() || pos.moved_piece(m).unwrap().piece_type() == PieceType::Pawn {
                continue;
            }
            if pos
                .castling_rights_mask
                .iter()
                .enumerate()
                .any(|(sq, mask)| {
                    !mask.is_empty() && (sq == m.from().index() || sq == m.to().index())
                })
            {
                continue;
            }
            let mut probe = pos.clone();
            let predicted = probe.key_after(m);
            probe.do_move_simple(m);
            assert_eq!(probe.key(), predicted, "key_after wrong for {m}");
        }
    }
}
