//! # Monte-Carlo tree search
//!
//! Parallel, lock-free MCTS over the shared node tree.
//!
//! ## Architecture
//!
//! The controller owns the real game state, the node pool and the root of
//! the retained tree. A search call spawns a dedicated thread pool of
//! worker threads that all hammer the same tree; every coordination point
//! lives in the node atomics (see [`crate::node`]), so workers never block
//! each other.
//!
//! Each iteration is a pure function of a board copy:
//!
//! 1. **Selection**: descend from the root by UCT while nodes are fully
//!    expanded, replaying each chosen `parent_move` on the copy.
//! 2. **Expansion**: materialize the child list once (first worker wins)
//!    and take one unexpanded child; its move is applied to the copy.
//! 3. **Simulation**: random playout to the end of the game.
//! 4. **Backup**: one atomic add per node on the path; 2 half-wins for a
//!    win from that node's perspective, 1 for a draw.
//!
//! Between real moves the tree is rerooted at the played child and every
//! other subtree goes back to the pool; only the controller thread prunes,
//! and never while workers run.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use tracing::debug;

use crate::arena::NodePool;
use crate::board::{BoardState, Color, GameResult, NextAction};
use crate::moves::{Move, MoveList};
use crate::node::MctsNode;

/// Default exploration constant. Low for a game this tactical; tunable via
/// [`Mcts::set_exploration`].
pub const DEFAULT_EXPLORATION: f32 = 0.5;

/// Computational budget for one search call, polled once per iteration.
#[derive(Clone, Copy, Debug)]
pub enum SearchLimit {
    Iterations(u64),
    Seconds(f32),
}

/// Raw node pointer that may cross thread boundaries. Safety rests on the
/// node protocol: everything reachable through it is atomics or published
/// links, and the pool backing it outlives the search.
#[derive(Clone, Copy)]
struct SharedNode(NonNull<MctsNode>);

unsafe impl Send for SharedNode {}
unsafe impl Sync for SharedNode {}

/// In-flight search; [`join`](SearchHandle::join) yields the chosen move.
pub struct SearchHandle(HandleInner);

enum HandleInner {
    /// Forced move, answered without searching.
    Ready(Move),
    Pending(JoinHandle<Move>),
}

impl SearchHandle {
    pub fn join(self) -> Move {
        match self.0 {
            HandleInner::Ready(mv) => mv,
            HandleInner::Pending(handle) => handle.join().expect("search thread panicked"),
        }
    }
}

/// MCTS controller: owns the game state and the retained tree.
pub struct Mcts {
    board: BoardState,
    pool: Arc<NodePool>,
    root: Option<NonNull<MctsNode>>,
    stop_search: Arc<AtomicBool>,
    exploration: f32,
    seed: Option<u64>,
}

impl Mcts {
    /// Engine with a node arena of exactly `memory_limit_bytes`.
    pub fn new(memory_limit_bytes: usize) -> Self {
        Self {
            board: BoardState::new(),
            pool: Arc::new(NodePool::new(memory_limit_bytes)),
            root: None,
            stop_search: Arc::new(AtomicBool::new(false)),
            exploration: DEFAULT_EXPLORATION,
            seed: None,
        }
    }

    pub fn board(&self) -> BoardState {
        self.board
    }

    pub fn set_exploration(&mut self, exploration: f32) {
        self.exploration = exploration;
    }

    /// Fix the base PRNG seed; worker `i` derives `seed + i`. With one
    /// worker this makes the whole search reproducible. `None` restores
    /// per-worker OS entropy.
    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    /// Replace the game state and drop any retained tree.
    pub fn set_board(&mut self, board: BoardState) {
        if let Some(root) = self.root.take() {
            free_subtree(&self.pool, root);
        }
        self.board = board;
    }

    /// Start a search on a background thread.
    ///
    /// The handle must be joined before any other controller call; the
    /// tree is pruned only while no worker is running.
    ///
    /// Panics if the game is already over, or if the arena cannot even hold
    /// the root node.
    pub fn search(&mut self, limit: SearchLimit, thread_count: usize) -> SearchHandle {
        assert!(
            self.board.next_action() != NextAction::Done,
            "search called on a finished game"
        );

        // A forced move needs no tree at all.
        let mut moves_from_root = MoveList::new();
        self.board.generate_moves(&mut moves_from_root);
        if moves_from_root.len() == 1 {
            return SearchHandle(HandleInner::Ready(moves_from_root[0]));
        }

        let root = self.ensure_root();

        let board = self.board;
        let pool = Arc::clone(&self.pool);
        let stop_search = Arc::clone(&self.stop_search);
        let exploration = self.exploration;
        let seed = self.seed;
        let shared_root = SharedNode(root);

        let handle = std::thread::spawn(move || {
            search_threaded(
                shared_root,
                board,
                &pool,
                &stop_search,
                exploration,
                seed,
                limit,
                thread_count,
            )
        });

        SearchHandle(HandleInner::Pending(handle))
    }

    /// Run a search to completion on the calling thread.
    pub fn search_blocking(&mut self, limit: SearchLimit, thread_count: usize) -> Move {
        self.search(limit, thread_count).join()
    }

    /// Advance the real game and reroot the retained tree at the child the
    /// move leads to. Every other subtree is returned to the pool; if the
    /// move was never expanded the whole tree is dropped.
    pub fn apply_move(&mut self, mv: Move) {
        self.board.apply_move(mv);

        let Some(root) = self.root else {
            return;
        };

        let root_ref = unsafe { root.as_ref() };
        let mut new_root: Option<NonNull<MctsNode>> = None;
        let mut current = root_ref.first_child();

        if current.is_null() {
            free_subtree(&self.pool, root);
            self.root = None;
            return;
        }

        while let Some(child) = NonNull::new(current) {
            current = unsafe { child.as_ref() }.next_sibling();

            if unsafe { child.as_ref() }.parent_move == mv {
                debug_assert!(new_root.is_none());
                new_root = Some(child);
            } else {
                free_subtree(&self.pool, child);
            }
        }

        // The old root is no longer part of the tree either way.
        self.pool.free(root);

        if let Some(new_root) = new_root {
            let node = unsafe { new_root.as_ref() };
            node.set_next_sibling(std::ptr::null_mut());
            node.set_parent(std::ptr::null_mut());

            let (half_wins, simulations) = node.half_wins_and_simulations();
            if simulations > 0 {
                debug!(
                    win_rate = half_wins as f32 / 2.0 / simulations as f32,
                    tree_size = tree_size(Some(new_root)),
                    "retained subtree"
                );
            }
        }

        self.root = new_root;
    }

    /// `(half_wins, simulations)` of the retained root, if a tree is held.
    /// The root's simulations count completed iterations.
    pub fn root_statistics(&self) -> Option<(u32, u32)> {
        self.root
            .map(|root| unsafe { root.as_ref() }.half_wins_and_simulations())
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> Option<NonNull<MctsNode>> {
        self.root
    }

    /// Lazily allocate the retained root. Its color is the opponent of the
    /// side to move; backup never scores the root, so it only has to exist.
    fn ensure_root(&mut self) -> NonNull<MctsNode> {
        match self.root {
            Some(root) => root,
            None => {
                let root = self
                    .pool
                    .allocate(
                        Move::Pass,
                        std::ptr::null_mut(),
                        self.board.whose_move().opposite(),
                    )
                    .expect("arena exhausted allocating the search root");
                self.root = Some(root);
                root
            }
        }
    }
}

impl Drop for Mcts {
    fn drop(&mut self) {
        // Workers poll this once per iteration; any detached search winds
        // down on its own while the Arc keeps the pool alive.
        self.stop_search.store(true, Ordering::Relaxed);
    }
}

// The raw root pointer is only dereferenced by the controller between
// searches and by workers inside a search.
unsafe impl Send for Mcts {}

#[allow(clippy::too_many_arguments)]
fn search_threaded(
    root: SharedNode,
    board: BoardState,
    pool: &NodePool,
    stop_search: &AtomicBool,
    exploration: f32,
    seed: Option<u64>,
    limit: SearchLimit,
    thread_count: usize,
) -> Move {
    let workers = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .thread_name(|i| format!("mcts-worker-{i}"))
        .build()
        .expect("failed to build search worker pool");

    workers.broadcast(|ctx| {
        search_worker(
            root,
            board,
            pool,
            stop_search,
            exploration,
            seed,
            limit,
            ctx.index(),
        );
    });

    // Answer with the most-simulated child: the move the search kept
    // coming back to.
    let root_ref = unsafe { root.0.as_ref() };
    let mut most_simulations = 0u32;
    let mut best: Option<&MctsNode> = None;

    let mut current = root_ref.first_child();
    while let Some(child) = NonNull::new(current) {
        let child = unsafe { child.as_ref() };
        let (_, simulations) = child.half_wins_and_simulations();

        if best.is_none() || simulations > most_simulations {
            most_simulations = simulations;
            best = Some(child);
        }

        current = child.next_sibling();
    }

    let best = best.expect("search finished with no children at the root");

    let (half_wins, simulations) = best.half_wins_and_simulations();
    let root_simulations = root_ref.half_wins_and_simulations().1;
    debug!(
        win_rate = half_wins as f32 / 2.0 / simulations.max(1) as f32,
        confidence = simulations as f32 / root_simulations.max(1) as f32,
        iterations = root_simulations,
        memory_used_mb = pool.used_bytes() / 1024 / 1024,
        tree_size = tree_size(Some(root.0)),
        "search finished"
    );

    best.parent_move
}

#[allow(clippy::too_many_arguments)]
fn search_worker(
    root: SharedNode,
    root_board: BoardState,
    pool: &NodePool,
    stop_search: &AtomicBool,
    exploration: f32,
    seed: Option<u64>,
    limit: SearchLimit,
    worker_index: usize,
) {
    let start_time = Instant::now();

    let mut rng = match seed {
        Some(base) => Xoshiro256StarStar::seed_from_u64(base.wrapping_add(worker_index as u64)),
        None => Xoshiro256StarStar::from_rng(&mut rand::rng()),
    };

    let mut iterations = 0u64;
    while !stop_search.load(Ordering::Relaxed) {
        match limit {
            SearchLimit::Iterations(max_iterations) => {
                if iterations >= max_iterations {
                    break;
                }
            }
            SearchLimit::Seconds(max_seconds) => {
                if start_time.elapsed().as_secs_f32() >= max_seconds {
                    break;
                }
            }
        }

        let (selected, mut board) = select(root.0, root_board, exploration);

        let expanded = expand(selected, &mut board, pool, &mut rng);

        board.playout(&mut rng);
        let playout_result = board.game_result();

        backup(expanded, playout_result);

        iterations += 1;
    }
}

/// Descend by UCT while nodes are fully expanded, replaying moves onto a
/// board copy. An unvisited child short-circuits the sibling scan: nothing
/// can beat an infinite score.
fn select(
    root: NonNull<MctsNode>,
    root_board: BoardState,
    exploration: f32,
) -> (NonNull<MctsNode>, BoardState) {
    let mut current = root;
    let mut board = root_board;

    while unsafe { current.as_ref() }.is_fully_expanded() {
        let parent_simulations = unsafe { current.as_ref() }.half_wins_and_simulations().1;

        let first_child = NonNull::new(unsafe { current.as_ref() }.first_child())
            .expect("fully expanded node has no children");

        let mut greatest_uct_node = first_child;
        let mut greatest_uct =
            unsafe { first_child.as_ref() }.compute_uct(parent_simulations, exploration);

        let mut child = first_child;
        while let Some(next) = NonNull::new(unsafe { child.as_ref() }.next_sibling()) {
            if greatest_uct.is_infinite() {
                break;
            }

            child = next;

            let uct = unsafe { child.as_ref() }.compute_uct(parent_simulations, exploration);
            if uct > greatest_uct {
                greatest_uct = uct;
                greatest_uct_node = child;
            }
        }

        current = greatest_uct_node;
        board.apply_move(unsafe { current.as_ref() }.parent_move);
    }

    (current, board)
}

/// Create children (first caller only) and claim one. The claimed child's
/// move is applied to `board` so the playout starts from its position.
/// Returns the selected node itself when it is terminal, its children are
/// still being materialized elsewhere, or none are left to claim.
fn expand<R: Rng>(
    node: NonNull<MctsNode>,
    board: &mut BoardState,
    pool: &NodePool,
    rng: &mut R,
) -> NonNull<MctsNode> {
    if board.next_action() == NextAction::Done {
        return node;
    }

    let node_ref = unsafe { node.as_ref() };
    node_ref.create_children(pool, rng, board);

    let handed_out = NonNull::new(node_ref.add_child()).expect("add_child returned null");
    if handed_out != node {
        board.apply_move(unsafe { handed_out.as_ref() }.parent_move);
    }

    handed_out
}

/// One atomic add per node on the path to the root. The root itself only
/// counts the simulation.
fn backup(from: NonNull<MctsNode>, playout_result: GameResult) {
    let mut current = from;

    loop {
        let node = unsafe { current.as_ref() };

        let Some(parent) = NonNull::new(node.parent()) else {
            node.add_half_wins_and_simulations(0, 1);
            break;
        };

        let half_wins = match playout_result {
            GameResult::Draw => 1,
            GameResult::WhiteWon if node.color == Color::White => 2,
            GameResult::BlackWon if node.color == Color::Black => 2,
            _ => 0,
        };

        node.add_half_wins_and_simulations(half_wins, 1);
        current = parent;
    }
}

/// Return `node` and its whole subtree to the pool.
fn free_subtree(pool: &NodePool, node: NonNull<MctsNode>) {
    let mut current = unsafe { node.as_ref() }.first_child();
    while let Some(child) = NonNull::new(current) {
        current = unsafe { child.as_ref() }.next_sibling();
        free_subtree(pool, child);
    }

    pool.free(node);
}

/// Node count of the subtree, root included.
fn tree_size(node: Option<NonNull<MctsNode>>) -> usize {
    let Some(node) = node else {
        return 0;
    };

    let mut total = 1;
    let mut current = unsafe { node.as_ref() }.first_child();
    while let Some(child) = NonNull::new(current) {
        total += tree_size(Some(child));
        current = unsafe { child.as_ref() }.next_sibling();
    }

    total
}
