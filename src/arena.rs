//! # Allocators
//!
//! Search nodes live in one big anonymous virtual-memory reservation. A
//! single atomic cursor bump-allocates from it, so any number of workers can
//! allocate without locks, pointers stay stable for the lifetime of the
//! search, and teardown is a cursor reset. A lock-free LIFO freelist is
//! layered on top so subtrees pruned between searches can be recycled.

use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use memmap2::MmapMut;

use crate::board::Color;
use crate::moves::Move;
use crate::node::MctsNode;

/// Bump arena over a single anonymous mapping of fixed capacity.
pub struct ArenaAllocator {
    data: MmapMut,
    used: AtomicUsize,
}

impl ArenaAllocator {
    /// Reserve `capacity` bytes of anonymous memory. Panics if the platform
    /// refuses the mapping; there is nothing useful to do without it.
    pub fn new(capacity: usize) -> Self {
        let data = MmapMut::map_anon(capacity)
            .unwrap_or_else(|e| panic!("failed to reserve {capacity} byte arena: {e}"));
        Self { data, used: AtomicUsize::new(0) }
    }

    /// Allocate `size` bytes at `alignment`, or `None` once the reservation
    /// is exhausted. Safe to call from any number of threads.
    pub fn allocate_aligned(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        debug_assert!(alignment.is_power_of_two());

        let base = self.data.as_ptr() as usize;
        let mut current = self.used.load(Ordering::Relaxed);

        loop {
            let start = (base + current + alignment - 1) & !(alignment - 1);
            let end = start + size - base;
            if end > self.data.len() {
                return None;
            }

            match self.used.compare_exchange_weak(
                current,
                end,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return NonNull::new(start as *mut u8),
                Err(actual) => current = actual,
            }
        }
    }

    /// Reset the cursor. The caller must guarantee nothing allocated from
    /// this arena is still referenced.
    pub fn clear(&self) {
        self.used.store(0, Ordering::Relaxed);
    }

    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn capacity_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Pool of [`MctsNode`] slots over an [`ArenaAllocator`].
///
/// Freed nodes form a Treiber stack threaded through the nodes' own
/// `prev_free` links; allocation pops the stack and falls back to an arena
/// bump when it is empty. Both paths are lock-free.
pub struct NodePool {
    arena: ArenaAllocator,
    last_free_node: AtomicPtr<MctsNode>,
}

impl NodePool {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            arena: ArenaAllocator::new(capacity_bytes),
            last_free_node: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Construct a node in a recycled or freshly bumped slot. `None` means
    /// the arena is full; callers back off and retry on a later iteration.
    pub fn allocate(
        &self,
        parent_move: Move,
        parent: *mut MctsNode,
        color: Color,
    ) -> Option<NonNull<MctsNode>> {
        let mut expected = self.last_free_node.load(Ordering::Acquire);

        let slot = loop {
            let Some(free) = NonNull::new(expected) else {
                let raw = self
                    .arena
                    .allocate_aligned(size_of::<MctsNode>(), align_of::<MctsNode>())?;
                break raw.cast::<MctsNode>();
            };

            // The link was written before the node was pushed; the acquire
            // loads above and below make it visible here.
            let desired = unsafe { free.as_ref() }.prev_free();

            match self.last_free_node.compare_exchange_weak(
                expected,
                desired,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => break free,
                Err(actual) => expected = actual,
            }
        };

        unsafe {
            slot.as_ptr()
                .write(MctsNode::new(parent_move, parent, color));
        }
        Some(slot)
    }

    /// Push a node onto the freelist. The caller must guarantee no other
    /// thread still holds a reference to it.
    pub fn free(&self, node: NonNull<MctsNode>) {
        let mut expected = self.last_free_node.load(Ordering::Relaxed);

        loop {
            unsafe { node.as_ref() }.set_prev_free(expected);

            match self.last_free_node.compare_exchange_weak(
                expected,
                node.as_ptr(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => expected = actual,
            }
        }
    }

    /// Drop every node at once: empty the freelist and rewind the arena.
    /// Only valid while no search is running.
    pub fn clear(&self) {
        self.last_free_node.store(std::ptr::null_mut(), Ordering::Relaxed);
        self.arena.clear();
    }

    pub fn used_bytes(&self) -> usize {
        self.arena.used_bytes()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.arena.capacity_bytes()
    }
}

// The pool hands out raw node pointers but all shared mutation inside it
// goes through the atomics above.
unsafe impl Send for NodePool {}
unsafe impl Sync for NodePool {}
