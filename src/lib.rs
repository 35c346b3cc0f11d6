//! Position representation and shared transposition table for a parallel
//! alpha-beta chess engine.
//!
//! The crate has two halves. The [`chess`] module owns the board: incremental
//! Zobrist hashing, make/unmake with per-ply state snapshots, legality and
//! check detection, static exchange evaluation, and upcoming-repetition
//! detection via cuckoo hashing. The [`transpositiontable`] module owns the
//! process-wide cache that search threads probe with the keys the board
//! produces: a lock-free array of cache-line-sized clusters with an
//! age/depth-weighted replacement policy.
//!
//! Search, evaluation, and the UCI front-end live in consuming crates; this
//! crate only promises that `do_move`/`undo_move` round-trip exactly and that
//! a corrupt transposition-table read can never produce a move that survives
//! [`Position::pseudo_legal`].
//!
//! Call [`Position::init`] once at startup before using repetition detection.
//!
//! [`Position::init`]: chess::board::Position::init
//! [`Position::pseudo_legal`]: chess::board::Position::pseudo_legal

pub mod chess;
pub mod errors;
pub mod perft;
pub mod transpositiontable;

pub use chess::board::{DirtyPiece, Position};
pub use chess::chessmove::Move;
pub use transpositiontable::{Bound, TranspositionTable};
