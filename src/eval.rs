//! Process-wide eval-mode stack (`spec.md` §3 "Eval mode").
//!
//! While an eval frame is active, tracked operators still run their forward
//! kernel but skip attaching a [`crate::autograd::GradNode`] — the tape never
//! sees them. Like the pool stack, this is process-global and single
//! threaded by spec, so `thread_local!` is the right primitive (no
//! `parking_lot::Mutex` needed, unlike `dfdx`'s genuinely thread-shared
//! device state).

use std::cell::Cell;

thread_local! {
    static EVAL_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Pushes a no-grad frame.
pub fn eval_begin() {
    EVAL_DEPTH.with(|d| d.set(d.get() + 1));
    log::trace!("eval_begin()");
}

/// Pops a no-grad frame. Fatal if called without a matching [`eval_begin`].
pub fn eval_end() {
    EVAL_DEPTH.with(|d| {
        let cur = d.get();
        if cur == 0 {
            crate::diagnostics::fatal("autograd misuse: eval_end() with no matching eval_begin()");
        }
        d.set(cur - 1);
    });
    log::trace!("eval_end()");
}

/// Whether an eval frame is currently active anywhere on the stack.
pub(crate) fn is_active() -> bool {
    EVAL_DEPTH.with(|d| d.get() > 0)
}

/// Runs `f` inside a no-grad scope, always popping the frame afterward even
/// if `f` panics.
pub fn with_eval<R>(f: impl FnOnce() -> R) -> R {
    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {
            eval_end();
        }
    }
    eval_begin();
    let _guard = Guard;
    f()
}
