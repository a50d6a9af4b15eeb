//! Region-based ("pool") allocator.
//!
//! Mirrors `spec.md` §4.1: a stack of named arenas, where every tensor buffer
//! and gradient node allocated while pool `id` is active is charged to `id`
//! and released all at once by [`free`]. `spec.md` §5 is explicit that the
//! pool stack is process-global and single-threaded (no thread-safety is in
//! scope), so this is realized as `thread_local!` state rather than the
//! `parking_lot`-guarded globals `dfdx`/`burn` use for their (thread-safe)
//! device state — there is nothing to guard here.
//!
//! Rust's ownership model gives us a safe substitute for "the pool owns every
//! buffer and nothing is ever freed individually": buffers are
//! `Rc<RefCell<_>>`, the pool keeps a strong reference to every allocation
//! charged to it, and [`free`] drops the pool's references. If client code
//! honors the documented lifetime discipline (§5: don't retain a `Tensor`
//! past `free` of its owning pool) the backing memory is reclaimed
//! immediately; if it doesn't, the `Rc` simply keeps the buffer alive rather
//! than producing a use-after-free, which is a strictly safer failure mode
//! than the spec's C-like arena and is the idiomatic Rust rendition of
//! "the library does not detect use-after-free".

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::diagnostics::fatal;

const MAX_STACK_DEPTH: usize = 16;

/// The default, always-present pool.
pub const DEFAULT_POOL: u64 = 0;

#[derive(Default)]
struct PoolAllocator {
    stack: Vec<u64>,
    charged: HashMap<u64, Vec<Rc<dyn Any>>>,
}

impl PoolAllocator {
    fn active_pool(&self) -> u64 {
        *self.stack.last().unwrap_or(&DEFAULT_POOL)
    }
}

thread_local! {
    static ALLOCATOR: RefCell<PoolAllocator> = RefCell::new(PoolAllocator::default());
}

/// Sets up per-process allocator state. Idempotent; call once before using
/// the pool API (a fresh `thread_local!` already starts initialized, so this
/// mainly exists to mirror the explicit `initialize`/`finalize` contract of
/// `spec.md` §4.1 and to give embedders an explicit place to hook startup
/// logging).
pub fn initialize() {
    log::trace!("pool allocator initialized");
    ALLOCATOR.with(|a| {
        let mut a = a.borrow_mut();
        a.stack.clear();
        a.charged.clear();
    });
}

/// Tears down all pools, including the default pool. After this call, using
/// any tensor allocated before it is a documented lifetime violation.
pub fn finalize() {
    ALLOCATOR.with(|a| {
        let mut a = a.borrow_mut();
        a.stack.clear();
        a.charged.clear();
    });
    log::trace!("pool allocator finalized");
}

/// Pushes `id` onto the pool stack; subsequent allocations are charged to it
/// until the matching [`end_malloc`].
pub fn begin_malloc(id: u64) {
    ALLOCATOR.with(|a| {
        let mut a = a.borrow_mut();
        if a.stack.len() >= MAX_STACK_DEPTH {
            fatal(format!(
                "allocation failure: pool stack depth exceeds {MAX_STACK_DEPTH}"
            ));
        }
        log::trace!("begin_malloc({id})");
        a.stack.push(id);
    });
}

/// Pops the top of the pool stack. Fatal if the stack is already at the
/// implicit default-pool base.
pub fn end_malloc() {
    ALLOCATOR.with(|a| {
        let mut a = a.borrow_mut();
        if a.stack.pop().is_none() {
            fatal("allocation failure: end_malloc() with no matching begin_malloc()");
        }
        log::trace!("end_malloc()");
    });
}

/// Releases every block ever charged to `id`, regardless of the current
/// stack state. O(1) save for dropping the `Vec` of strong references.
pub fn free(id: u64) {
    ALLOCATOR.with(|a| {
        a.borrow_mut().charged.remove(&id);
    });
    log::trace!("free({id})");
}

/// Allocates a fresh zero-filled `f32` buffer of length `len`, charged to
/// whichever pool is currently active.
pub(crate) fn alloc_f32(len: usize) -> Rc<RefCell<Vec<f32>>> {
    let buf = Rc::new(RefCell::new(vec![0.0f32; len]));
    charge(buf.clone());
    buf
}

fn charge(buf: Rc<RefCell<Vec<f32>>>) {
    ALLOCATOR.with(|a| {
        let mut a = a.borrow_mut();
        let pool = a.active_pool();
        a.charged.entry(pool).or_default().push(buf);
    });
}

/// Wraps `value` in an `Rc<RefCell<_>>` charged to the active pool. Used for
/// [`crate::autograd::GradNode`]s, which `spec.md` §3 says are owned by the
/// pool exactly like tensor buffers.
pub(crate) fn alloc_rc<T: Any>(value: T) -> Rc<RefCell<T>> {
    let rc = Rc::new(RefCell::new(value));
    let erased: Rc<dyn Any> = rc.clone();
    ALLOCATOR.with(|a| {
        let mut a = a.borrow_mut();
        let pool = a.active_pool();
        a.charged.entry(pool).or_default().push(erased);
    });
    rc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_is_active_without_begin_malloc() {
        initialize();
        let b = alloc_f32(4);
        assert_eq!(b.borrow().len(), 4);
        finalize();
    }

    #[test]
    fn free_releases_charged_allocations() {
        initialize();
        begin_malloc(7);
        let b = alloc_f32(1000);
        end_malloc();
        assert_eq!(Rc::strong_count(&b), 2); // our handle + the pool's.
        free(7);
        assert_eq!(Rc::strong_count(&b), 1); // pool's reference dropped.
        finalize();
    }

    #[test]
    #[should_panic(expected = "no matching begin_malloc")]
    fn unbalanced_end_malloc_is_fatal() {
        initialize();
        end_malloc();
    }

    #[test]
    fn nested_pools_stack() {
        initialize();
        begin_malloc(1);
        begin_malloc(2);
        let b2 = alloc_f32(8);
        end_malloc();
        let b1 = alloc_f32(8);
        end_malloc();
        free(2);
        assert_eq!(Rc::strong_count(&b2), 1);
        assert_eq!(Rc::strong_count(&b1), 2);
        free(1);
        finalize();
    }
}
