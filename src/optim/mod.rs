//! Optimizers and gradient-clipping helpers (`spec.md` §6).
//!
//! Each optimizer keeps its running state (momentum/moment buffers) keyed by
//! a parameter tensor's buffer identity, so a single optimizer instance can
//! drive any number of independently-shaped parameters without the caller
//! threading state through manually.

pub mod adagrad;
pub mod adam;
pub mod clip;
pub mod rmsprop;
pub mod sgd;

pub use adagrad::AdaGrad;
pub use adam::Adam;
pub use rmsprop::RmsProp;
pub use sgd::Sgd;

/// Shared hyperparameter validation (`spec.md` §4.5: "All optimizers validate
/// their hyperparameters on construction"). `name` identifies the failing
/// parameter in the diagnostic.
pub(crate) fn require_non_negative(name: &str, value: f32) {
    if value < 0.0 {
        crate::diagnostics::fatal(format!("domain violation: {name} must be non-negative, got {value}"));
    }
}

/// Validates a decay/momentum coefficient lies in `[0, 1)`.
pub(crate) fn require_unit_interval(name: &str, value: f32) {
    if !(0.0..1.0).contains(&value) {
        crate::diagnostics::fatal(format!("domain violation: {name} must be in [0, 1), got {value}"));
    }
}
