//! # Board state and move generation
//!
//! `BoardState` is a small value type: four bitboards (rings and markers per
//! color), the phase tag, and the last ring move. It is copied freely: the
//! search clones one per iteration and replays moves onto it.
//!
//! ## Phases
//!
//! A Yinsh game walks through four action kinds. Placement runs until both
//! sides have five rings down. Ring movement is the main phase; whenever a
//! move completes one or more rows of five markers, the owning player first
//! removes a row, then one of their rings, and play returns to ring
//! movement (or to another removal if rows remain). The game ends when a
//! player has removed three rings, or when the 51-marker supply is
//! exhausted with no row pending.
//!
//! ## Move generation
//!
//! Everything is mask arithmetic over the precomputed ray table. A ring
//! slides along a ray; the reachable span is cut at the first blocking ring,
//! markers inside the span may be jumped as one contiguous run, and the
//! landing cell is the first empty cell after that run; cells beyond it
//! are forbidden. Rows are discovered by scanning outward from the cells
//! the last ring move passed over.

use rand::Rng;
use std::fmt;

use crate::bitboard::{Bitboard, Direction, ALL_DIRECTIONS, AXES, GAME_BOARD};
use crate::moves::{Move, MoveList};
use crate::rays::ray;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameResult {
    Draw,
    WhiteWon,
    BlackWon,
}

/// Which kind of action the position is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextAction {
    RingPlacement,
    RingMovement,
    RowRemoval,
    RingRemoval,
    Done,
}

/// Total marker supply shared by both players.
pub const MARKER_SUPPLY: u8 = 51;

/// A ring move as retained for row scanning.
#[derive(Clone, Copy, Debug)]
pub struct LastRingMove {
    pub from: u8,
    pub to: u8,
    pub direction: Direction,
}

#[derive(Clone, Copy)]
pub struct BoardState {
    pub(crate) next_action: NextAction,
    /// Player currently choosing a row or ring to remove.
    pub(crate) removal_color: Color,
    /// Color that made the most recent turn. Toggles after every placement,
    /// ring move and pass; the side to move is its opposite.
    pub(crate) last_ring_move_color: Color,
    /// Consulted only after at least one ring move has been played.
    pub(crate) last_ring_move: LastRingMove,

    pub(crate) white_rings: Bitboard,
    pub(crate) black_rings: Bitboard,
    pub(crate) white_markers: Bitboard,
    pub(crate) black_markers: Bitboard,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    /// Standard initial position: empty board, White places first.
    pub fn new() -> Self {
        Self {
            next_action: NextAction::RingPlacement,
            removal_color: Color::Black,
            last_ring_move_color: Color::Black,
            last_ring_move: LastRingMove { from: 0, to: 0, direction: Direction::SE },
            white_rings: Bitboard::EMPTY,
            black_rings: Bitboard::EMPTY,
            white_markers: Bitboard::EMPTY,
            black_markers: Bitboard::EMPTY,
        }
    }

    pub fn next_action(&self) -> NextAction {
        self.next_action
    }

    /// The color that acts next: the removal color during removals,
    /// otherwise the opponent of the last mover.
    pub fn whose_move(&self) -> Color {
        match self.next_action {
            NextAction::RowRemoval | NextAction::RingRemoval => self.removal_color,
            _ => self.last_ring_move_color.opposite(),
        }
    }

    pub fn rings(&self, color: Color) -> Bitboard {
        match color {
            Color::White => self.white_rings,
            Color::Black => self.black_rings,
        }
    }

    pub fn markers(&self, color: Color) -> Bitboard {
        match color {
            Color::White => self.white_markers,
            Color::Black => self.black_markers,
        }
    }

    /// Fill `move_list` with every legal move for the current phase.
    /// The list must be empty on entry and is never empty on return.
    pub fn generate_moves(&self, move_list: &mut MoveList) {
        debug_assert!(move_list.is_empty());

        match self.next_action {
            NextAction::RingPlacement => self.generate_ring_placement_moves(move_list),
            NextAction::RingMovement => self.generate_ring_moves(move_list),
            NextAction::RowRemoval => self.generate_row_removal(move_list),
            NextAction::RingRemoval => self.generate_ring_removal(move_list),
            NextAction::Done => unreachable!("move generation on a finished game"),
        }

        debug_assert!(!move_list.is_empty());
    }

    fn generate_ring_placement_moves(&self, move_list: &mut MoveList) {
        let occupancy = self.white_rings | self.black_rings;
        let empty_cells = !occupancy & GAME_BOARD;

        for index in empty_cells.iter() {
            move_list.append(Move::PlaceRing { index });
        }
    }

    fn generate_ring_moves(&self, move_list: &mut MoveList) {
        let all_rings = self.white_rings | self.black_rings;
        let all_markers = self.white_markers | self.black_markers;
        let our_rings = self.rings(self.last_ring_move_color.opposite());

        for ring_index in our_rings.iter() {
            for direction in ALL_DIRECTIONS {
                let ray_from_ring = ray(ring_index, direction);

                // Cut the ray at the first ring in the way.
                let blocking_rings = all_rings & ray_from_ring;
                let span = if blocking_rings.any() {
                    let closest = blocking_rings.bit_scan_direction(direction);
                    ray_from_ring & !ray(closest, direction).with_bit(closest)
                } else {
                    ray_from_ring
                };

                // A jump ends on the first empty cell after a marker run,
                // so everything beyond that cell is out of reach.
                let markers_on_ray = all_markers & ray_from_ring;
                let empty_on_ray = !markers_on_ray & ray_from_ring;
                let landing_cells =
                    markers_on_ray.shift_in_direction(direction) & empty_on_ray;

                let allowed = if landing_cells.any() {
                    let closest_landing = landing_cells.bit_scan_direction(direction);
                    span & !all_markers & !ray(closest_landing, direction)
                } else {
                    span & !all_markers
                };

                for to in allowed.iter() {
                    move_list.append(Move::RingMove { from: ring_index, to, direction });
                }
            }
        }

        if move_list.is_empty() {
            move_list.append(Move::Pass);
        }
    }

    fn generate_row_removal(&self, move_list: &mut MoveList) {
        let last_move = self.last_ring_move;
        let affected = self.affected_cells(last_move);
        let markers = self.markers(self.removal_color);

        // Rows along the movement axis only belong to the mover, whose
        // fresh marker sits at the move origin.
        if self.last_ring_move_color == self.removal_color && markers.get_bit(last_move.from) {
            let forward = length_of_row(markers, last_move.from, last_move.direction);
            let backward =
                length_of_row(markers, last_move.from, last_move.direction.opposite());
            push_row_moves(
                move_list,
                last_move.from,
                last_move.direction,
                forward,
                backward,
            );
        }

        // The other two axes, from every affected marker of the removal color.
        for marker_index in (markers & affected).iter() {
            for axis in AXES {
                if axis == last_move.direction || axis == last_move.direction.opposite() {
                    continue;
                }

                let forward = length_of_row(markers, marker_index, axis);
                let backward = length_of_row(markers, marker_index, axis.opposite());
                push_row_moves(move_list, marker_index, axis, forward, backward);
            }
        }
    }

    fn generate_ring_removal(&self, move_list: &mut MoveList) {
        for ring_index in self.rings(self.removal_color).iter() {
            move_list.append(Move::RemoveRing { index: ring_index });
        }
    }

    /// Cells the last ring move passed over, origin included.
    fn affected_cells(&self, last_move: LastRingMove) -> Bitboard {
        let ray_from_from = ray(last_move.from, last_move.direction);
        let ray_from_to = ray(last_move.to, last_move.direction);
        (ray_from_from & !ray_from_to).with_bit(last_move.from)
    }

    pub fn apply_move(&mut self, mv: Move) {
        match mv {
            Move::PlaceRing { index } => {
                match self.last_ring_move_color {
                    Color::Black => {
                        debug_assert!(!self.white_rings.get_bit(index));
                        self.white_rings.set_bit(index);
                    }
                    Color::White => {
                        debug_assert!(!self.black_rings.get_bit(index));
                        self.black_rings.set_bit(index);
                    }
                }

                self.last_ring_move_color = self.last_ring_move_color.opposite();

                // Black always places the tenth ring.
                if self.black_rings.popcount() == 5 {
                    self.next_action = NextAction::RingMovement;
                }
            }
            Move::RingMove { from, to, direction } => {
                debug_assert!(!(self.white_markers | self.black_markers).get_bit(to));

                match self.last_ring_move_color {
                    Color::Black => {
                        debug_assert!(!self.black_rings.get_bit(to));
                        self.white_rings.clear_bit(from);
                        self.white_rings.set_bit(to);
                        self.white_markers.set_bit(from);
                    }
                    Color::White => {
                        debug_assert!(!self.white_rings.get_bit(to));
                        self.black_rings.clear_bit(from);
                        self.black_rings.set_bit(to);
                        self.black_markers.set_bit(from);
                    }
                }

                // Everything between from (exclusive) and to (inclusive)
                // was jumped; markers there swap color. The landing cell
                // itself is empty so it contributes nothing.
                let flip_mask = ray(from, direction) & !ray(to, direction);

                let black_to_flip = self.black_markers & flip_mask;
                let white_to_flip = self.white_markers & flip_mask;
                self.white_markers &= !flip_mask;
                self.black_markers &= !flip_mask;
                self.white_markers |= black_to_flip;
                self.black_markers |= white_to_flip;

                self.last_ring_move = LastRingMove { from, to, direction };
                self.last_ring_move_color = self.last_ring_move_color.opposite();

                if let Some(rows_color) = self.check_rows(self.last_ring_move) {
                    self.next_action = NextAction::RowRemoval;
                    self.removal_color = rows_color;
                } else if self.white_markers.popcount() + self.black_markers.popcount()
                    == MARKER_SUPPLY
                {
                    self.next_action = NextAction::Done;
                }
            }
            Move::RemoveRow { from, direction } => {
                let removed = line_in_direction(from, direction, 5);
                debug_assert_eq!(removed.popcount(), 5);

                match self.removal_color {
                    Color::White => {
                        debug_assert_eq!((self.white_markers & removed).popcount(), 5);
                        self.white_markers &= !removed;
                    }
                    Color::Black => {
                        debug_assert_eq!((self.black_markers & removed).popcount(), 5);
                        self.black_markers &= !removed;
                    }
                }

                self.next_action = NextAction::RingRemoval;
            }
            Move::RemoveRing { index } => {
                match self.removal_color {
                    Color::White => self.white_rings.clear_bit(index),
                    Color::Black => self.black_rings.clear_bit(index),
                }

                if self.white_rings.popcount() == 2 || self.black_rings.popcount() == 2 {
                    self.next_action = NextAction::Done;
                    return;
                }

                // The same ring move may have completed several rows; any
                // survivor keeps the position in row removal.
                if let Some(rows_color) = self.check_rows(self.last_ring_move) {
                    self.next_action = NextAction::RowRemoval;
                    self.removal_color = rows_color;
                } else {
                    self.next_action = NextAction::RingMovement;
                }
            }
            Move::Pass => {
                self.last_ring_move_color = self.last_ring_move_color.opposite();
            }
        }
    }

    /// Color owning at least one completed row touching the last ring move,
    /// mover first. `None` when no row exists.
    fn check_rows(&self, last_move: LastRingMove) -> Option<Color> {
        let affected = self.affected_cells(last_move);

        // Along the movement axis only the mover can have a row: every
        // crossed enemy marker was just flipped to the mover's color.
        let mover_markers = self.markers(self.last_ring_move_color);
        if mover_markers.get_bit(last_move.from) {
            let forward = length_of_row(mover_markers, last_move.from, last_move.direction);
            let backward =
                length_of_row(mover_markers, last_move.from, last_move.direction.opposite());

            if forward + backward >= 4 {
                return Some(self.last_ring_move_color);
            }
        }

        for color in [self.last_ring_move_color, self.last_ring_move_color.opposite()] {
            let markers = self.markers(color);

            for marker_index in (markers & affected).iter() {
                for axis in AXES {
                    if axis == last_move.direction || axis == last_move.direction.opposite() {
                        continue;
                    }

                    let forward = length_of_row(markers, marker_index, axis);
                    let backward = length_of_row(markers, marker_index, axis.opposite());

                    if forward + backward >= 4 {
                        return Some(color);
                    }
                }
            }
        }

        None
    }

    /// Play random legal moves until the game is over.
    pub fn playout<R: Rng>(&mut self, rng: &mut R) {
        let mut move_list = MoveList::new();
        while self.next_action != NextAction::Done {
            self.generate_moves(&mut move_list);

            let mv = move_list[rng.random_range(0..move_list.len())];
            self.apply_move(mv);

            move_list.reset();
        }
    }

    /// Winner by remaining ring count. Valid only once the game is done:
    /// three removed rings win, and at marker exhaustion whoever removed
    /// more rings wins.
    pub fn game_result(&self) -> GameResult {
        debug_assert_eq!(self.next_action, NextAction::Done);

        let white_ring_count = self.white_rings.popcount();
        let black_ring_count = self.black_rings.popcount();

        match white_ring_count.cmp(&black_ring_count) {
            std::cmp::Ordering::Equal => GameResult::Draw,
            std::cmp::Ordering::Less => GameResult::WhiteWon,
            std::cmp::Ordering::Greater => GameResult::BlackWon,
        }
    }
}

/// Emit one `RemoveRow` per length-5 subsequence of the maximal row through
/// `index` along `direction`, given the marker run lengths on either side.
fn push_row_moves(
    move_list: &mut MoveList,
    index: u8,
    direction: Direction,
    forward: u8,
    backward: u8,
) {
    let total_length = forward + backward + 1;
    if total_length < 5 {
        return;
    }

    let row_start = Bitboard::index_move_direction(index, direction.opposite(), backward);
    for row_offset in 0..=(total_length - 5) {
        let from = Bitboard::index_move_direction(row_start, direction, row_offset);
        move_list.append(Move::RemoveRow { from, direction });
    }
}

/// Number of consecutive set bits starting one step beyond `index` along
/// `direction`.
pub(crate) fn length_of_row(bitboard: Bitboard, index: u8, direction: Direction) -> u8 {
    let ray_from_index = ray(index, direction);
    let empty_on_ray = !bitboard & ray_from_index;

    if empty_on_ray.any() {
        let closest_empty = empty_on_ray.bit_scan_direction(direction);
        let run = ray_from_index & !ray(closest_empty, direction).with_bit(closest_empty);
        run.popcount()
    } else {
        ray_from_index.popcount()
    }
}

/// The `length` cells starting at `index` (inclusive) along `direction`.
pub(crate) fn line_in_direction(index: u8, direction: Direction, length: u8) -> Bitboard {
    let ray_from_index = ray(index, direction).with_bit(index);
    let end_index = Bitboard::index_move_direction(index, direction, length - 1);
    ray_from_index & !ray(end_index, direction)
}

impl fmt::Display for BoardState {
    /// ASCII diagram in the physical hex orientation. White ring `A`,
    /// white marker `a`, black ring `B`, black marker `b`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let piece = |index: u8| {
            if self.white_rings.get_bit(index) {
                'A'
            } else if self.white_markers.get_bit(index) {
                'a'
            } else if self.black_rings.get_bit(index) {
                'B'
            } else if self.black_markers.get_bit(index) {
                'b'
            } else {
                '.'
            }
        };

        for y in (0..11).rev() {
            write!(f, "{}", "    ".repeat(y))?;
            for n in 0..(11 - y) {
                let index = Bitboard::coords_to_index(n as u8, (y + n) as u8);
                if GAME_BOARD.get_bit(index) {
                    write!(f, "{}       ", piece(index))?;
                } else {
                    write!(f, "        ")?;
                }
            }
            writeln!(f)?;
        }
        for x in 1..11 {
            write!(f, "{}", "    ".repeat(x))?;
            for n in 0..(11 - x) {
                let index = Bitboard::coords_to_index((x + n) as u8, n as u8);
                if GAME_BOARD.get_bit(index) {
                    write!(f, "{}       ", piece(index))?;
                } else {
                    write!(f, "        ")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
