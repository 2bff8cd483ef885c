//! # Move notation
//!
//! Converts between board indices and Yinsh coordinates, and between moves
//! and their wire form on the command protocol.
//!
//! ## Coordinates
//!
//! A coordinate is a column letter `A..K` followed by a row number `1..11`:
//! the letter is the x axis of the 11×11 embedding, the number is `y + 1`.
//! Only the 85 in-play intersections are valid.
//!
//! ## Wire form
//!
//! - `P <coord>`: place a ring
//! - `M <from>-<to>`: move a ring
//! - `X <from>-<to>`: remove a row of five markers, `to` being four steps
//!   from `from` along the row
//! - `R <coord>`: remove a ring
//! - `-`: pass

use thiserror::Error;

use crate::bitboard::{Bitboard, Direction, ALL_DIRECTIONS};
use crate::moves::Move;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseMoveError {
    #[error("empty move string")]
    Empty,
    #[error("unknown move prefix: {0}")]
    UnknownPrefix(String),
    #[error("malformed coordinate: {0}")]
    MalformedCoordinate(String),
    #[error("coordinate is not on the board: {0}")]
    OffBoard(String),
    #[error("expected '<from>-<to>', got: {0}")]
    MalformedSegment(String),
    #[error("{from} and {to} are not on a common board axis")]
    NotCollinear { from: String, to: String },
    #[error("row removal {from}-{to} does not span five cells")]
    BadRowSpan { from: String, to: String },
}

/// Board index to coordinate, e.g. `38` → `"F4"`.
pub fn index_to_coordinate(index: u8) -> String {
    debug_assert!(Bitboard::is_index_in_game(index));
    let (x, y) = Bitboard::index_to_coords(index);
    format!("{}{}", (b'A' + x) as char, y + 1)
}

/// Coordinate to board index. Rejects anything outside the playing mask.
pub fn coordinate_to_index(coordinate: &str) -> Result<u8, ParseMoveError> {
    let malformed = || ParseMoveError::MalformedCoordinate(coordinate.to_string());

    let mut chars = coordinate.chars();
    let column = chars.next().ok_or_else(malformed)?.to_ascii_uppercase();
    if !('A'..='K').contains(&column) {
        return Err(malformed());
    }

    let row: u8 = chars.as_str().parse().map_err(|_| malformed())?;
    if !(1..=11).contains(&row) {
        return Err(malformed());
    }

    let x = column as u8 - b'A';
    let y = row - 1;
    let index = Bitboard::coords_to_index(x, y);

    if !Bitboard::is_index_in_game(index) {
        return Err(ParseMoveError::OffBoard(coordinate.to_string()));
    }

    Ok(index)
}

/// Move to wire form.
pub fn format_move(mv: Move) -> String {
    match mv {
        Move::PlaceRing { index } => format!("P {}", index_to_coordinate(index)),
        Move::RingMove { from, to, .. } => {
            format!("M {}-{}", index_to_coordinate(from), index_to_coordinate(to))
        }
        Move::RemoveRow { from, direction } => {
            let to = Bitboard::index_move_direction(from, direction, 4);
            format!("X {}-{}", index_to_coordinate(from), index_to_coordinate(to))
        }
        Move::RemoveRing { index } => format!("R {}", index_to_coordinate(index)),
        Move::Pass => "-".to_string(),
    }
}

/// Wire form to move. The direction of `M` and `X` segments is recovered
/// from the coordinate delta, which must be a whole number of steps along
/// one of the three axes.
pub fn parse_move(text: &str) -> Result<Move, ParseMoveError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseMoveError::Empty);
    }

    if text == "-" {
        return Ok(Move::Pass);
    }

    let (prefix, rest) = match text.split_once(char::is_whitespace) {
        Some((prefix, rest)) => (prefix, rest.trim()),
        None => return Err(ParseMoveError::UnknownPrefix(text.to_string())),
    };

    match prefix {
        "P" => Ok(Move::PlaceRing { index: coordinate_to_index(rest)? }),
        "R" => Ok(Move::RemoveRing { index: coordinate_to_index(rest)? }),
        "M" => {
            let (from, to, direction, _) = parse_segment(rest)?;
            Ok(Move::RingMove { from, to, direction })
        }
        "X" => {
            let (from, to, direction, steps) = parse_segment(rest)?;
            if steps != 4 {
                return Err(ParseMoveError::BadRowSpan {
                    from: index_to_coordinate(from),
                    to: index_to_coordinate(to),
                });
            }
            Ok(Move::RemoveRow { from, direction })
        }
        _ => Err(ParseMoveError::UnknownPrefix(text.to_string())),
    }
}

/// Parse `<from>-<to>` and recover the axis: the delta must equal
/// `steps × unit` for exactly one direction and `steps ≥ 1`.
fn parse_segment(text: &str) -> Result<(u8, u8, Direction, u8), ParseMoveError> {
    let (from_text, to_text) = text
        .split_once('-')
        .ok_or_else(|| ParseMoveError::MalformedSegment(text.to_string()))?;

    let from = coordinate_to_index(from_text.trim())?;
    let to = coordinate_to_index(to_text.trim())?;

    let (from_x, from_y) = Bitboard::index_to_coords(from);
    let (to_x, to_y) = Bitboard::index_to_coords(to);
    let dx = to_x as i16 - from_x as i16;
    let dy = to_y as i16 - from_y as i16;

    for direction in ALL_DIRECTIONS {
        let (ux, uy) = direction.to_vec();
        let (ux, uy) = (ux as i16, uy as i16);

        let steps = if ux != 0 && dx % ux == 0 && dx / ux > 0 {
            dx / ux
        } else if ux == 0 && dx == 0 && uy != 0 && dy % uy == 0 && dy / uy > 0 {
            dy / uy
        } else {
            continue;
        };

        if dx == steps * ux && dy == steps * uy {
            return Ok((from, to, direction, steps as u8));
        }
    }

    Err(ParseMoveError::NotCollinear {
        from: from_text.trim().to_string(),
        to: to_text.trim().to_string(),
    })
}
