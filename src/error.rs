//! Fatal setup failures
//!
//! Anything in here stops the process: every later stage depends on it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("required X extension {0} is not available")]
    MissingExtension(&'static str),

    #[error(
        "Composite {major}.{minor} is too old, overlay window retrieval needs at least 0.3"
    )]
    CompositeTooOld { major: u32, minor: u32 },

    #[error("could not acquire the window manager or compositing manager selection")]
    NoRoles,

    #[error("Composite overlay window is unavailable")]
    NoOverlay,

    #[error("host surface has no native window")]
    NoHostWindow,
}
