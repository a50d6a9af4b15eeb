//! Fatal-diagnostic helpers.
//!
//! `spec.md` §7 treats every precondition violation as fatal: no recoverable
//! errors cross the public API. These helpers centralize the "log then
//! panic" shape so every call site produces the same diagnostic text.

/// Logs `msg` at `error!` level and panics with it.
///
/// This is the crate's only error-reporting primitive. It never returns.
#[track_caller]
pub(crate) fn fatal(msg: impl AsRef<str>) -> ! {
    let msg = msg.as_ref();
    log::error!("{msg}");
    panic!("{msg}");
}

/// Panics with a formatted shape-mismatch diagnostic.
#[track_caller]
pub(crate) fn fatal_shape(op: &str, a: impl std::fmt::Debug, b: impl std::fmt::Debug) -> ! {
    fatal(format!(
        "shape violation in `{op}`: incompatible shapes {a:?} and {b:?}"
    ));
}
