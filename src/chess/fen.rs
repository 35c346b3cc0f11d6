//! FEN reading. Accepts standard FEN, Shredder-FEN, and X-FEN castling
//! fields. Only the piece placement, side, and castling fields are strict;
//! the trailing fields degrade to defaults on damage, since the front-end is
//! responsible for well-formed input. Emission is on `Position::fen`.

use arrayvec::ArrayVec;

use crate::{
    chess::{
        piece::{Colour, Piece, PieceType},
        types::{File, Rank, Square},
    },
    errors::{EndgameCodeError, FenParseError},
};

/// A parsed FEN record. Castling tokens are resolved to concrete rook
/// squares against the parsed placement, which is what `Position::set` needs
/// for Chess960-capable castling bookkeeping.
pub struct Fen {
    pub board: [Option<Piece>; 64],
    pub side: Colour,
    pub castling_rooks: ArrayVec<(Colour, Square), 4>,
    pub ep_square: Option<Square>,
    pub halfmove: i32,
    pub fullmove: i32,
}

impl Fen {
    pub fn parse(fen: &str) -> Result<Self, FenParseError> {
        let mut tokens = fen.split_whitespace();

        let placement = tokens.next().ok_or(FenParseError::Empty)?;
        let board = parse_placement(placement)?;

        let side = match tokens.next() {
            None => Colour::White,
            Some("w") => Colour::White,
            Some("b") => Colour::Black,
            Some(other) => return Err(FenParseError::InvalidSide(other.to_string())),
        };

        let mut castling_rooks = ArrayVec::new();
        if let Some(castling) = tokens.next() {
            for token in castling.chars() {
                let Some(rook_sq) = resolve_castling_token(&board, token) else {
                    continue;
                };
                if !castling_rooks.is_full() {
                    castling_rooks.push(rook_sq);
                }
            }
        }

        // The en passant field is only trusted as far as its shape; whether
        // a capture is actually available is decided during `Position::set`.
        let ep_square = tokens
            .next()
            .and_then(|token| token.parse::<Square>().ok())
            .filter(|sq| sq.rank() == Rank::Six.relative_to(side));

        let halfmove = tokens
            .next()
            .and_then(|token| token.parse().ok())
            .map_or(0, |n: i32| n.max(0));
        let fullmove = tokens
            .next()
            .and_then(|token| token.parse().ok())
            .map_or(1, |n: i32| n.max(1));

        Ok(Self { board, side, castling_rooks, ep_square, halfmove, fullmove })
    }
}

fn parse_placement(placement: &str) -> Result<[Option<Piece>; 64], FenParseError> {
    let mut board = [None; 64];
    let mut rank = 7u8;
    let mut file = 0u8;
    for ch in placement.chars() {
        match ch {
            '/' => {
                if rank == 0 {
                    return Err(FenParseError::RanOffBoard);
                }
                rank -= 1;
                file = 0;
            }
            '1'..='8' => file += ch as u8 - b'0',
            _ => {
                let piece =
                    Piece::from_char(ch).ok_or(FenParseError::UnexpectedCharacter(ch))?;
                if file >= 8 {
                    return Err(FenParseError::RanOffBoard);
                }
                board[(rank * 8 + file) as usize] = Some(piece);
                file += 1;
            }
        }
        if file > 8 {
            return Err(FenParseError::RanOffBoard);
        }
    }

    for colour in Colour::all() {
        let king = Piece::new(colour, PieceType::King);
        let count = board.iter().filter(|&&piece| piece == Some(king)).count();
        if count != 1 {
            return Err(FenParseError::KingCount(if colour == Colour::White {
                "white"
            } else {
                "black"
            }));
        }
    }

    Ok(board)
}

/// Resolves one castling-field character to the implied rook square.
///
/// 'K'/'Q' scan inward from the outer file, Shredder/X-FEN file letters name
/// the rook file directly. Tokens that do not correspond to a rook on the
/// back rank are dropped.
fn resolve_castling_token(
    board: &[Option<Piece>; 64],
    token: char,
) -> Option<(Colour, Square)> {
    let colour = if token.is_ascii_lowercase() { Colour::Black } else { Colour::White };
    let rook = Piece::new(colour, PieceType::Rook);
    let back_rank = Rank::One.relative_to(colour);

    let file = match token.to_ascii_uppercase() {
        'K' => File::all()
            .rev()
            .find(|&file| board[Square::from_rank_file(back_rank, file).index()] == Some(rook)),
        'Q' => File::all()
            .find(|&file| board[Square::from_rank_file(back_rank, file).index()] == Some(rook)),
        file @ 'A'..='H' => {
            let file = File::from_index(file as u8 - b'A')?;
            (board[Square::from_rank_file(back_rank, file).index()] == Some(rook))
                .then_some(file)
        }
        _ => None,
    }?;

    Some((colour, Square::from_rank_file(back_rank, file)))
}

/// Synthesises the FEN of a bare material configuration from a Kaufman-style
/// endgame code such as `"KBNKQQ"` or `"KRPvKR"`. The side selected by
/// `colour` is rendered as Black on the seventh rank.
pub fn endgame_code_fen(code: &str, colour: Colour) -> Result<String, EndgameCodeError> {
    if !code.starts_with('K') {
        return Err(EndgameCodeError::MissingLeadingKing);
    }
    let second_king = code[1..]
        .find('K')
        .map(|i| i + 1)
        .ok_or(EndgameCodeError::MissingSecondKing)?;
    let strong_end = code.find('v').map_or(second_king, |v| v.min(second_king));

    let weak = code[second_king..].to_string();
    let strong = code[..strong_end].to_string();
    for side in [&weak, &strong] {
        if side.is_empty() || side.len() >= 8 {
            return Err(EndgameCodeError::BadSideLength(side.clone()));
        }
    }

    let mut sides = [weak, strong];
    sides[colour.index()] = sides[colour.index()].to_ascii_lowercase();

    Ok(format!(
        "8/{}{}/8/8/8/8/8/{}{} w - - 0 10",
        sides[0],
        8 - sides[0].len(),
        sides[1],
        8 - sides[1].len(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn parses_the_start_position() {
        let fen = Fen::parse(STARTPOS).unwrap();
        assert_eq!(fen.board[Square::E1.index()], Some(Piece::WK));
        assert_eq!(fen.board[Square::D8.index()], Some(Piece::BQ));
        assert_eq!(fen.board[Square::E4.index()], None);
        assert_eq!(fen.side, Colour::White);
        assert_eq!(fen.halfmove, 0);
        assert_eq!(fen.fullmove, 1);
        assert_eq!(fen.castling_rooks.len(), 4);
        assert!(fen.castling_rooks.contains(&(Colour::White, Square::H1)));
        assert!(fen.castling_rooks.contains(&(Colour::Black, Square::A8)));
    }

    #[test]
    fn shredder_castling_files() {
        let fen = Fen::parse("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w HAha - 0 1").unwrap();
        assert!(fen.castling_rooks.contains(&(Colour::White, Square::H1)));
        assert!(fen.castling_rooks.contains(&(Colour::White, Square::A1)));
        assert!(fen.castling_rooks.contains(&(Colour::Black, Square::H8)));
        assert!(fen.castling_rooks.contains(&(Colour::Black, Square::A8)));
    }

    #[test]
    fn missing_trailing_fields_default() {
        let fen = Fen::parse("8/8/8/8/8/4k3/8/4K3 b").unwrap();
        assert_eq!(fen.side, Colour::Black);
        assert!(fen.castling_rooks.is_empty());
        assert_eq!(fen.ep_square, None);
        assert_eq!(fen.halfmove, 0);
        assert_eq!(fen.fullmove, 1);
    }

    #[test]
    fn garbage_trailing_fields_default() {
        let fen = Fen::parse("8/8/8/8/8/4k3/8/4K3 w - bogus xx yy").unwrap();
        assert_eq!(fen.ep_square, None);
        assert_eq!(fen.halfmove, 0);
        assert_eq!(fen.fullmove, 1);
    }

    #[test]
    fn ep_square_must_sit_on_relative_rank_six() {
        let fen = Fen::parse("8/8/8/4Pp2/8/4k3/8/4K3 w - f6 0 2").unwrap();
        assert_eq!(fen.ep_square, Some(Square::F6));
        let fen = Fen::parse("8/8/8/4Pp2/8/4k3/8/4K3 w - f3 0 2").unwrap();
        assert_eq!(fen.ep_square, None);
    }

    #[test]
    fn rejects_broken_placement() {
        assert!(matches!(
            Fen::parse("rnbqkbnr/ppppXppp/8/8/8/8/PPPPPPPP/RNBQKBNR w - - 0 1"),
            Err(FenParseError::UnexpectedCharacter('X'))
        ));
        assert!(matches!(
            Fen::parse("rnbqkbnr/ppppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w - - 0 1"),
            Err(FenParseError::RanOffBoard)
        ));
        assert!(matches!(
            Fen::parse("8/8/8/8/8/8/8/4K3 w - - 0 1"),
            Err(FenParseError::KingCount("black"))
        ));
    }

    #[test]
    fn endgame_codes() {
        assert_eq!(
            endgame_code_fen("KBNKQQ", Colour::White).unwrap(),
            "8/kqq5/8/8/8/8/8/KBN5 w - - 0 10"
        );
        assert_eq!(
            endgame_code_fen("KRPvKR", Colour::White).unwrap(),
            "8/kr6/8/8/8/8/8/KRP5 w - - 0 10"
        );
        assert!(endgame_code_fen("QKK", Colour::White).is_err());
        assert!(endgame_code_fen("KQQ", Colour::White).is_err());
    }
}
