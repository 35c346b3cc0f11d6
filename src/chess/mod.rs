pub mod attacks;
pub mod board;
pub mod chessmove;
pub mod cuckoo;
pub mod fen;
pub mod piece;
pub mod squareset;
pub mod types;
pub mod zobrist;
