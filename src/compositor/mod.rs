//! Compositor Module
//!
//! Redirected window state, the overlay that carries composited output, and
//! the damage pipeline feeding the consumer.

pub mod damage;
pub mod overlay;
pub mod window;
