use thiserror::Error;

/// Errors raised while reading the load-bearing fields of a FEN string.
///
/// Only the piece placement, side to move, and castling fields are strict;
/// damage to the en passant, halfmove, and fullmove fields degrades to
/// defaults silently, as the front-end is responsible for well-formed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenParseError {
    #[error("FEN string is empty")]
    Empty,
    #[error("unexpected character in piece placement: '{0}'")]
    UnexpectedCharacter(char),
    #[error("piece placement ran off the board")]
    RanOffBoard,
    #[error("expected side to be 'w' or 'b', got \"{0}\"")]
    InvalidSide(String),
    #[error("{0} king count is not exactly one")]
    KingCount(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveParseError {
    #[error("invalid move length {0}")]
    InvalidLength(usize),
    #[error("invalid square name \"{0}\"")]
    InvalidSquare(String),
    #[error("invalid promotion piece {0}")]
    InvalidPromotionPiece(char),
    #[error("move {0} is not legal in this position")]
    IllegalMove(String),
}

/// Errors raised by endgame-code position synthesis ("KBNKQQ" and friends).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndgameCodeError {
    #[error("endgame code must start with 'K'")]
    MissingLeadingKing,
    #[error("endgame code has no second 'K'")]
    MissingSecondKing,
    #[error("endgame code side \"{0}\" is empty or longer than 7 pieces")]
    BadSideLength(String),
    #[error("failed to parse synthesised FEN: {0}")]
    Fen(#[from] FenParseError),
}
