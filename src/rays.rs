//! Precomputed ray table: for every cell and direction, the set of in-play
//! cells strictly beyond that cell up to the board edge. Pure geometry,
//! computed once on first use.

use once_cell::sync::Lazy;

use crate::bitboard::{Bitboard, Direction, ALL_DIRECTIONS};

pub type RayTable = [[Bitboard; 6]; 121];

pub static RAYS: Lazy<RayTable> = Lazy::new(build_ray_table);

/// Cells strictly beyond `index` in `direction`, restricted to the playing
/// mask. Empty for off-board indices.
#[inline]
pub fn ray(index: u8, direction: Direction) -> Bitboard {
    RAYS[index as usize][direction as usize]
}

fn build_ray_table() -> RayTable {
    let mut table = [[Bitboard::EMPTY; 6]; 121];

    for index in 0..121u8 {
        if !Bitboard::is_index_in_game(index) {
            continue;
        }

        let (x, y) = Bitboard::index_to_coords(index);

        for direction in ALL_DIRECTIONS {
            let (dx, dy) = direction.to_vec();
            let mut builder = Bitboard::EMPTY;

            let mut cx = x as i16 + dx as i16;
            let mut cy = y as i16 + dy as i16;
            while (0..11).contains(&cx)
                && (0..11).contains(&cy)
                && Bitboard::are_coords_in_game(cx as u8, cy as u8)
            {
                builder.set_bit(Bitboard::coords_to_index(cx as u8, cy as u8));
                cx += dx as i16;
                cy += dy as i16;
            }

            table[index as usize][direction as usize] = builder;
        }
    }

    table
}
