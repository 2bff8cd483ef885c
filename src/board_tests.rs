#[cfg(test)]
mod tests {
    use rand::Rng;
    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    use crate::bitboard::{Bitboard, Direction, GAME_BOARD};
    use crate::board::{
        BoardState, Color, GameResult, LastRingMove, NextAction, MARKER_SUPPLY,
    };
    use crate::moves::{Move, MoveList};

    fn idx(x: u8, y: u8) -> u8 {
        assert!(Bitboard::are_coords_in_game(x, y), "({x},{y}) is not in play");
        Bitboard::coords_to_index(x, y)
    }

    fn bb(indices: &[u8]) -> Bitboard {
        let mut board = Bitboard::EMPTY;
        for &index in indices {
            assert!(Bitboard::is_index_in_game(index));
            board.set_bit(index);
        }
        board
    }

    /// Movement-phase position built directly from piece sets. The mover is
    /// the opposite of `last_mover`.
    fn movement_position(
        white_rings: &[u8],
        black_rings: &[u8],
        white_markers: &[u8],
        black_markers: &[u8],
        last_mover: Color,
    ) -> BoardState {
        BoardState {
            next_action: NextAction::RingMovement,
            removal_color: Color::Black,
            last_ring_move_color: last_mover,
            last_ring_move: LastRingMove { from: 0, to: 0, direction: Direction::SE },
            white_rings: bb(white_rings),
            black_rings: bb(black_rings),
            white_markers: bb(white_markers),
            black_markers: bb(black_markers),
        }
    }

    fn assert_invariants(board: &BoardState) {
        let sets = [
            board.rings(Color::White),
            board.rings(Color::Black),
            board.markers(Color::White),
            board.markers(Color::Black),
        ];

        for (i, a) in sets.iter().enumerate() {
            assert!((*a & !GAME_BOARD).is_empty(), "pieces off the playing mask");
            for b in sets.iter().skip(i + 1) {
                assert!((*a & *b).is_empty(), "bitboards overlap");
            }
        }

        let marker_count = board.markers(Color::White).popcount()
            + board.markers(Color::Black).popcount();
        assert!(marker_count <= MARKER_SUPPLY);
    }

    /// Check the §-by-§ shape of a generated ring move: from `from`
    /// (exclusive) to `to` (inclusive) the path is empty cells, then one
    /// contiguous marker run, then the empty landing cell, with no ring
    /// anywhere on it.
    fn assert_ring_move_shape(board: &BoardState, from: u8, to: u8, direction: Direction) {
        let all_rings = board.rings(Color::White) | board.rings(Color::Black);
        let all_markers = board.markers(Color::White) | board.markers(Color::Black);

        let (fx, fy) = Bitboard::index_to_coords(from);
        let (tx, ty) = Bitboard::index_to_coords(to);
        let (dx, dy) = direction.to_vec();
        let steps_x = (tx as i16 - fx as i16) * dx.signum() as i16;
        let steps_y = (ty as i16 - fy as i16) * dy.signum() as i16;
        let steps = steps_x.max(steps_y);
        assert!(steps > 0, "ring move goes nowhere");

        let mut seen_marker = false;
        for step in 1..=steps {
            let cell = Bitboard::index_move_direction(from, direction, step as u8);
            assert!(Bitboard::is_index_in_game(cell));
            assert!(!all_rings.get_bit(cell), "ring move crosses a ring");

            if step == steps {
                assert!(!all_markers.get_bit(cell), "ring lands on a marker");
            } else if all_markers.get_bit(cell) {
                seen_marker = true;
            } else {
                assert!(!seen_marker, "jump continues past the first empty cell");
            }
        }
    }

    #[test]
    fn initial_placement_offers_every_intersection() {
        let board = BoardState::new();
        assert_eq!(board.whose_move(), Color::White);

        let mut moves = MoveList::new();
        board.generate_moves(&mut moves);

        assert_eq!(moves.len(), 85);
        let mut seen = Bitboard::EMPTY;
        for mv in moves.iter() {
            match *mv {
                Move::PlaceRing { index } => {
                    assert!(Bitboard::is_index_in_game(index));
                    assert!(!seen.get_bit(index));
                    seen.set_bit(index);
                }
                other => panic!("unexpected move in placement: {other:?}"),
            }
        }
    }

    #[test]
    fn placement_alternates_and_ends_on_the_tenth_ring() {
        let mut board = BoardState::new();
        let mut moves = MoveList::new();

        for placement in 0..10 {
            assert_eq!(board.next_action(), NextAction::RingPlacement);
            let expected_mover =
                if placement % 2 == 0 { Color::White } else { Color::Black };
            assert_eq!(board.whose_move(), expected_mover);

            board.generate_moves(&mut moves);
            let mv = moves[0];
            board.apply_move(mv);
            moves.reset();
        }

        assert_eq!(board.next_action(), NextAction::RingMovement);
        assert_eq!(board.rings(Color::White).popcount(), 5);
        assert_eq!(board.rings(Color::Black).popcount(), 5);
        assert_eq!(board.whose_move(), Color::White);
    }

    #[test]
    fn first_placement_is_white() {
        let mut board = BoardState::new();
        let target = idx(5, 5);
        board.apply_move(Move::PlaceRing { index: target });

        assert!(board.rings(Color::White).get_bit(target));
        assert!(!board.rings(Color::Black).get_bit(target));
        assert_eq!(board.whose_move(), Color::Black);
    }

    #[test]
    fn ring_move_leaves_marker_and_flips_the_jumped_run() {
        // White ring on (1,5) jumps the black run on (2..4,5) and lands on
        // the first empty cell behind it.
        let from = idx(1, 5);
        let run = [idx(2, 5), idx(3, 5), idx(4, 5)];
        let to = idx(5, 5);

        let mut board = movement_position(&[from], &[idx(6, 0)], &[], &run, Color::Black);

        let mut moves = MoveList::new();
        board.generate_moves(&mut moves);
        let jump = Move::RingMove { from, to, direction: Direction::SE };
        assert!(moves.iter().any(|&mv| mv == jump), "jump move not generated");

        let markers_before = board.markers(Color::White).popcount()
            + board.markers(Color::Black).popcount();

        board.apply_move(jump);

        assert!(board.markers(Color::White).get_bit(from), "no marker left behind");
        assert!(board.rings(Color::White).get_bit(to));
        assert!(!board.rings(Color::White).get_bit(from));

        // Jumped markers keep their cells but switch color.
        for cell in run {
            assert!(board.markers(Color::White).get_bit(cell));
            assert!(!board.markers(Color::Black).get_bit(cell));
        }

        let markers_after = board.markers(Color::White).popcount()
            + board.markers(Color::Black).popcount();
        assert_eq!(markers_after, markers_before + 1);
        assert_eq!(board.whose_move(), Color::Black);
    }

    #[test]
    fn jump_must_land_immediately_after_the_run() {
        let from = idx(1, 5);
        let board = movement_position(
            &[from],
            &[idx(6, 0)],
            &[],
            &[idx(2, 5), idx(3, 5)],
            Color::Black,
        );

        let mut moves = MoveList::new();
        board.generate_moves(&mut moves);

        for mv in moves.iter() {
            if let Move::RingMove { from: f, to, direction } = *mv {
                assert_ring_move_shape(&board, f, to, direction);
                if f == from && direction == Direction::SE {
                    // The only SE option is the cell right behind the run.
                    assert_eq!(to, idx(4, 5));
                }
            }
        }
    }

    #[test]
    fn jump_capped_by_the_board_edge() {
        // Markers run all the way to the edge of row 0; the jump would land
        // off-board, so SE yields nothing for this ring.
        let ring = idx(6, 0);
        let board = movement_position(
            &[ring],
            &[idx(1, 10)],
            &[],
            &[idx(7, 0), idx(8, 0), idx(9, 0)],
            Color::Black,
        );

        let mut moves = MoveList::new();
        board.generate_moves(&mut moves);

        assert!(moves.len() > 0);
        for mv in moves.iter() {
            if let Move::RingMove { from, to, direction } = *mv {
                assert_ring_move_shape(&board, from, to, direction);
                assert!(
                    !(from == ring && direction == Direction::SE),
                    "jump escaped the board edge"
                );
            }
        }
    }

    #[test]
    fn boxed_in_rings_force_a_pass() {
        // White's only ring is walled in by black rings on all six
        // neighbors: no span anywhere, so the turn is forfeited.
        let center = idx(5, 5);
        let neighbors = [idx(6, 5), idx(5, 6), idx(4, 6), idx(4, 5), idx(5, 4), idx(6, 4)];

        let mut board =
            movement_position(&[center], &neighbors, &[], &[], Color::Black);

        let mut moves = MoveList::new();
        board.generate_moves(&mut moves);

        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0], Move::Pass);

        board.apply_move(Move::Pass);
        assert_eq!(board.next_action(), NextAction::RingMovement);
        assert_eq!(board.whose_move(), Color::Black);
    }

    /// Six-in-a-row along the move axis: two removable windows.
    #[test]
    fn overlong_row_offers_each_window() {
        let from = idx(2, 5);
        let run: Vec<u8> = (2..8).map(|x| idx(x, 5)).collect();
        let to = idx(8, 5);

        let mut board = BoardState {
            next_action: NextAction::RowRemoval,
            removal_color: Color::White,
            last_ring_move_color: Color::White,
            last_ring_move: LastRingMove { from, to, direction: Direction::SE },
            white_rings: bb(&[to, idx(1, 10), idx(2, 10)]),
            black_rings: bb(&[idx(6, 0), idx(7, 0), idx(8, 0)]),
            white_markers: bb(&run),
            black_markers: Bitboard::EMPTY,
        };

        let mut moves = MoveList::new();
        board.generate_moves(&mut moves);

        let expected = [
            Move::RemoveRow { from: idx(2, 5), direction: Direction::SE },
            Move::RemoveRow { from: idx(3, 5), direction: Direction::SE },
        ];
        assert_eq!(moves.len(), expected.len());
        for want in expected {
            assert!(moves.iter().any(|&mv| mv == want), "{want:?} missing");
        }

        // Removing the first window leaves the sixth marker on the board.
        board.apply_move(moves[0]);
        assert_eq!(board.next_action(), NextAction::RingRemoval);
        assert_eq!(board.markers(Color::White).popcount(), 1);
        assert!(board.markers(Color::White).get_bit(idx(7, 5)));
    }

    /// Two rows completed by one move: removing the first and a ring still
    /// leaves the second row pending.
    #[test]
    fn surviving_row_reenters_row_removal() {
        let from = idx(2, 5); // 57
        let to = idx(8, 5); // 63
        let se_run: Vec<u8> = (2..8).map(|x| idx(x, 5)).collect(); // 57..62
        let ne_tail = [idx(7, 1), idx(7, 2), idx(7, 3), idx(7, 4)]; // below 62 on the NE axis

        let mut white_markers = se_run.clone();
        white_markers.extend_from_slice(&ne_tail);

        let mut board = BoardState {
            next_action: NextAction::RowRemoval,
            removal_color: Color::White,
            last_ring_move_color: Color::White,
            last_ring_move: LastRingMove { from, to, direction: Direction::SE },
            white_rings: bb(&[to, idx(1, 10), idx(2, 10), idx(3, 10)]),
            black_rings: bb(&[idx(6, 0), idx(7, 0), idx(8, 0), idx(9, 0)]),
            white_markers: bb(&white_markers),
            black_markers: Bitboard::EMPTY,
        };

        let mut moves = MoveList::new();
        board.generate_moves(&mut moves);

        // Two windows on the SE row plus the cross row on the NE axis.
        assert_eq!(moves.len(), 3);
        let ne_row = Move::RemoveRow { from: idx(7, 1), direction: Direction::NE };
        assert!(moves.iter().any(|&mv| mv == ne_row));

        // Take the SE window that keeps (7,5), then a ring.
        board.apply_move(Move::RemoveRow { from: idx(2, 5), direction: Direction::SE });
        assert_eq!(board.next_action(), NextAction::RingRemoval);

        board.apply_move(Move::RemoveRing { index: to });
        assert_eq!(board.next_action(), NextAction::RowRemoval);
        assert_eq!(board.whose_move(), Color::White);

        moves.reset();
        board.generate_moves(&mut moves);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0], ne_row);
    }

    #[test]
    fn third_removed_ring_ends_the_game() {
        let mut board = BoardState {
            next_action: NextAction::RingRemoval,
            removal_color: Color::White,
            last_ring_move_color: Color::White,
            last_ring_move: LastRingMove { from: idx(2, 5), to: idx(8, 5), direction: Direction::SE },
            white_rings: bb(&[idx(8, 5), idx(1, 10), idx(2, 10)]),
            black_rings: bb(&[idx(6, 0), idx(7, 0), idx(8, 0), idx(9, 0)]),
            white_markers: Bitboard::EMPTY,
            black_markers: Bitboard::EMPTY,
        };

        board.apply_move(Move::RemoveRing { index: idx(8, 5) });

        assert_eq!(board.next_action(), NextAction::Done);
        assert_eq!(board.game_result(), GameResult::WhiteWon);
    }

    #[test]
    fn marker_exhaustion_ends_the_game_at_once() {
        // 50 markers already placed; one quiet ring move spends the 51st
        // and the game is over on the spot, no row, no further action.
        //
        // Pieces sit on a 3-coloring of the hex lattice ((x + 2y) mod 3)
        // so no line anywhere holds two adjacent same-color markers.
        let from = idx(5, 5);
        let to = idx(6, 5);

        let mut white_markers = Vec::new();
        let mut black_markers = Vec::new();
        for index in GAME_BOARD.iter() {
            if index == from || index == to {
                continue;
            }
            let (x, y) = Bitboard::index_to_coords(index);
            match (x + 2 * y) % 3 {
                0 if white_markers.len() < 25 => white_markers.push(index),
                1 if black_markers.len() < 25 => black_markers.push(index),
                _ => {}
            }
        }
        assert_eq!(white_markers.len() + black_markers.len(), 50);

        // One ring each, parked on third-color cells.
        let black_ring = GAME_BOARD
            .iter()
            .find(|&i| {
                let (x, y) = Bitboard::index_to_coords(i);
                (x + 2 * y) % 3 == 2 && !white_markers.contains(&i) && !black_markers.contains(&i)
            })
            .unwrap();

        let mut board = movement_position(
            &[from],
            &[black_ring],
            &white_markers,
            &black_markers,
            Color::Black,
        );
        assert_invariants(&board);

        board.apply_move(Move::RingMove { from, to, direction: Direction::SE });

        let total = board.markers(Color::White).popcount()
            + board.markers(Color::Black).popcount();
        assert_eq!(total, MARKER_SUPPLY);
        assert_eq!(board.next_action(), NextAction::Done);
        assert_eq!(board.game_result(), GameResult::Draw);
    }

    #[test]
    fn whose_move_tracks_the_phase() {
        let mut board = BoardState::new();
        assert_eq!(board.whose_move(), Color::White);

        board.last_ring_move_color = Color::White;
        assert_eq!(board.whose_move(), Color::Black);

        board.next_action = NextAction::RowRemoval;
        board.removal_color = Color::White;
        assert_eq!(board.whose_move(), Color::White);

        board.next_action = NextAction::RingRemoval;
        board.removal_color = Color::Black;
        assert_eq!(board.whose_move(), Color::Black);
    }

    #[test]
    fn game_result_rewards_the_side_with_fewer_rings() {
        let mut board = BoardState::new();
        board.next_action = NextAction::Done;
        board.white_rings = bb(&[idx(5, 5), idx(6, 5)]);
        board.black_rings = bb(&[idx(6, 0), idx(7, 0), idx(8, 0), idx(9, 0)]);
        assert_eq!(board.game_result(), GameResult::WhiteWon);

        std::mem::swap(&mut board.white_rings, &mut board.black_rings);
        assert_eq!(board.game_result(), GameResult::BlackWon);

        board.white_rings = board.black_rings;
        assert_eq!(board.game_result(), GameResult::Draw);
    }

    /// Random games, validating structural invariants and every generated
    /// ring move along the way.
    #[test]
    fn random_games_preserve_invariants() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(7);
        let mut moves = MoveList::new();

        for _game in 0..20 {
            let mut board = BoardState::new();

            while board.next_action() != NextAction::Done {
                board.generate_moves(&mut moves);
                assert!(!moves.is_empty());

                for mv in moves.iter() {
                    match *mv {
                        Move::RingMove { from, to, direction } => {
                            assert_ring_move_shape(&board, from, to, direction);
                        }
                        Move::RemoveRow { from, direction } => {
                            // All five cells hold the removal color.
                            let markers = board.markers(board.whose_move());
                            for step in 0..5 {
                                let cell =
                                    Bitboard::index_move_direction(from, direction, step);
                                assert!(markers.get_bit(cell));
                            }
                        }
                        _ => {}
                    }
                }

                let before_markers = board.markers(Color::White).popcount()
                    + board.markers(Color::Black).popcount();
                let mv = moves[rng.random_range(0..moves.len())];
                board.apply_move(mv);
                moves.reset();

                assert_invariants(&board);
                if let Move::RingMove { .. } = mv {
                    let after_markers = board.markers(Color::White).popcount()
                        + board.markers(Color::Black).popcount();
                    assert_eq!(after_markers, before_markers + 1);
                }
            }

            // The game ended either by ring count or by marker exhaustion.
            let white_rings = board.rings(Color::White).popcount();
            let black_rings = board.rings(Color::Black).popcount();
            let markers = board.markers(Color::White).popcount()
                + board.markers(Color::Black).popcount();
            assert!(
                white_rings == 2 || black_rings == 2 || markers == MARKER_SUPPLY,
                "game ended without a terminal condition"
            );
        }
    }

    #[test]
    fn playouts_terminate() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(42);
        for _ in 0..50 {
            let mut board = BoardState::new();
            board.playout(&mut rng);
            assert_eq!(board.next_action(), NextAction::Done);
            let _ = board.game_result();
        }
    }
}
