//! # Search tree node
//!
//! Nodes are pool-allocated and shared by every worker without locks.
//! Children form a singly-linked sibling list. The coordination protocol:
//!
//! - `is_parent` is claimed by atomic exchange; exactly one worker ever
//!   builds the child list.
//! - That worker links all siblings through plain stores, then publishes
//!   them with a release store to `is_expandable`. Everyone else loads
//!   `is_expandable` with acquire before touching the links.
//! - `unexpanded_child` walks the sibling chain by CAS, handing each new
//!   child to exactly one worker. Whoever takes the last child sets
//!   `is_fully_expanded`, which switches selection to UCT over the
//!   children.
//! - Statistics are a single `AtomicU64` packing `(half_wins << 32) |
//!   simulations`, so one `fetch_add` updates both and one `load` reads a
//!   consistent pair. Half-wins count 2 per win and 1 per draw.

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::arena::NodePool;
use crate::board::{BoardState, Color};
use crate::moves::{Move, MoveList};

pub struct MctsNode {
    half_wins_and_simulations: AtomicU64,
    is_parent: AtomicBool,
    is_expandable: AtomicBool,
    unexpanded_child: AtomicPtr<MctsNode>,
    is_fully_expanded: AtomicBool,

    /// The move that produced this node.
    pub parent_move: Move,
    /// The side that played `parent_move`; playouts are scored for it.
    pub color: Color,

    // Plain link fields. Written only by the single expanding worker (or by
    // the controller while no worker runs) and read only after the
    // release/acquire handshake on `is_expandable`, so no per-field atomics
    // are needed.
    parent: UnsafeCell<*mut MctsNode>,
    first_child: UnsafeCell<*mut MctsNode>,
    next_sibling: UnsafeCell<*mut MctsNode>,
    prev_free: UnsafeCell<*mut MctsNode>,
}

// Shared mutable state is either atomic or an UnsafeCell link governed by
// the publication protocol in the module docs.
unsafe impl Send for MctsNode {}
unsafe impl Sync for MctsNode {}

impl MctsNode {
    pub fn new(parent_move: Move, parent: *mut MctsNode, color: Color) -> Self {
        Self {
            half_wins_and_simulations: AtomicU64::new(0),
            is_parent: AtomicBool::new(false),
            is_expandable: AtomicBool::new(false),
            unexpanded_child: AtomicPtr::new(std::ptr::null_mut()),
            is_fully_expanded: AtomicBool::new(false),
            parent_move,
            color,
            parent: UnsafeCell::new(parent),
            first_child: UnsafeCell::new(std::ptr::null_mut()),
            next_sibling: UnsafeCell::new(std::ptr::null_mut()),
            prev_free: UnsafeCell::new(std::ptr::null_mut()),
        }
    }

    #[inline]
    pub fn parent(&self) -> *mut MctsNode {
        unsafe { *self.parent.get() }
    }

    #[inline]
    pub fn set_parent(&self, parent: *mut MctsNode) {
        unsafe { *self.parent.get() = parent }
    }

    #[inline]
    pub fn first_child(&self) -> *mut MctsNode {
        unsafe { *self.first_child.get() }
    }

    #[inline]
    pub fn set_first_child(&self, child: *mut MctsNode) {
        unsafe { *self.first_child.get() = child }
    }

    #[inline]
    pub fn next_sibling(&self) -> *mut MctsNode {
        unsafe { *self.next_sibling.get() }
    }

    #[inline]
    pub fn set_next_sibling(&self, sibling: *mut MctsNode) {
        unsafe { *self.next_sibling.get() = sibling }
    }

    #[inline]
    pub(crate) fn prev_free(&self) -> *mut MctsNode {
        unsafe { *self.prev_free.get() }
    }

    #[inline]
    pub(crate) fn set_prev_free(&self, node: *mut MctsNode) {
        unsafe { *self.prev_free.get() = node }
    }

    /// Acquire pairs with the release in [`add_child`](Self::add_child):
    /// a selector that observes `true` may follow the child links without
    /// having gone through `is_expandable`.
    #[inline]
    pub fn is_fully_expanded(&self) -> bool {
        self.is_fully_expanded.load(Ordering::Acquire)
    }

    /// Current `(half_wins, simulations)` as one consistent pair.
    #[inline]
    pub fn half_wins_and_simulations(&self) -> (u32, u32) {
        let packed = self.half_wins_and_simulations.load(Ordering::Relaxed);
        ((packed >> 32) as u32, packed as u32)
    }

    /// Single wait-free update of both counters.
    #[inline]
    pub fn add_half_wins_and_simulations(&self, half_wins: u32, simulations: u32) {
        let increase = (u64::from(half_wins) << 32) | u64::from(simulations);
        self.half_wins_and_simulations
            .fetch_add(increase, Ordering::Relaxed);
    }

    /// UCT score. Unvisited nodes are infinitely attractive so every child
    /// gets simulated once before exploitation kicks in.
    pub fn compute_uct(&self, parent_simulations: u32, exploration: f32) -> f32 {
        let (half_wins, simulations) = self.half_wins_and_simulations();

        if simulations == 0 {
            return f32::INFINITY;
        }

        let exploitation = (half_wins as f32 / 2.0) / simulations as f32;
        let exploration =
            exploration * ((parent_simulations as f32).ln() / simulations as f32).sqrt();

        exploitation + exploration
    }

    /// Materialize the child list, once. The first worker through the
    /// `is_parent` exchange generates and shuffles the legal moves of
    /// `board` (the position at this node) and links one child per move.
    /// If the pool runs dry mid-build, the partial list is returned to the
    /// pool and `is_parent` reverts so a later iteration can retry.
    pub fn create_children<R: Rng>(&self, pool: &NodePool, rng: &mut R, board: &BoardState) {
        if self.is_parent.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut move_list = MoveList::new();
        board.generate_moves(&mut move_list);

        // Shuffling here randomizes the expansion order instead of paying
        // for a random pick on every hand-out.
        move_list.as_mut_slice().shuffle(rng);

        let node_color = board.whose_move();
        let self_ptr = self as *const MctsNode as *mut MctsNode;

        let Some(first_child) = pool.allocate(move_list[0], self_ptr, node_color) else {
            self.is_parent.store(false, Ordering::Release);
            return;
        };
        self.set_first_child(first_child.as_ptr());

        let mut last_child = first_child;
        let mut failed_to_allocate = false;

        for move_index in 1..move_list.len() {
            match pool.allocate(move_list[move_index], self_ptr, node_color) {
                Some(child) => {
                    unsafe { last_child.as_ref() }.set_next_sibling(child.as_ptr());
                    last_child = child;
                }
                None => {
                    failed_to_allocate = true;
                    break;
                }
            }
        }

        if failed_to_allocate {
            let mut current = self.first_child();
            while let Some(child) = NonNull::new(current) {
                current = unsafe { child.as_ref() }.next_sibling();
                pool.free(child);
            }

            self.set_first_child(std::ptr::null_mut());
            self.is_parent.store(false, Ordering::Release);
            return;
        }

        self.unexpanded_child
            .store(self.first_child(), Ordering::Relaxed);
        self.is_expandable.store(true, Ordering::Release);
    }

    /// Take the next unexpanded child, or this node itself when the child
    /// list is not yet published or already exhausted.
    pub fn add_child(&self) -> *mut MctsNode {
        let self_ptr = self as *const MctsNode as *mut MctsNode;

        if !self.is_expandable.load(Ordering::Acquire) {
            return self_ptr;
        }

        let mut expected = self.unexpanded_child.load(Ordering::Relaxed);

        loop {
            let Some(child) = NonNull::new(expected) else {
                return self_ptr;
            };

            let desired = unsafe { child.as_ref() }.next_sibling();

            match self.unexpanded_child.compare_exchange_weak(
                expected,
                desired,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if desired.is_null() {
                        // Late observers just treat the node as unexpanded
                        // for one extra iteration, which is harmless. The
                        // release re-publishes the sibling links for
                        // selectors that never load `is_expandable`.
                        self.is_fully_expanded.store(true, Ordering::Release);
                    }
                    return child.as_ptr();
                }
                Err(actual) => expected = actual,
            }
        }
    }
}
