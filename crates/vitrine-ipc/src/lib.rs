//! Vitrine IPC Protocol
//!
//! Message types exchanged between `vitrine` (the compositing window manager)
//! and the external renderer that turns damaged pixmaps into pixels.
//!
//! `vitrine` connects to the renderer's socket and streams
//! [`CompositorEvent`]s; the renderer answers with [`RendererCommand`]s on the
//! same connection. Both directions use [`FramedMessage`] framing.

pub mod framing;

pub use framing::{FrameError, FrameReader, FramedMessage, MAX_FRAME_LEN};

use serde::{Deserialize, Serialize};

/// Default socket path for the renderer connection
pub fn socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    std::path::PathBuf::from(runtime_dir).join("vitrine.sock")
}

/// Opaque handle the renderer uses to refer to a window's content
pub type ContentId = u64;

/// A rectangle in window-relative coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

// ============================================================================
// Compositor → Renderer Events
// ============================================================================

/// Events sent from the compositor to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompositorEvent {
    /// A window was accepted and is now tracked under `content`
    WindowCreated {
        content: ContentId,
        window: u32,
        override_redirect: bool,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    },

    /// The window behind `content` is gone
    WindowDestroyed { content: ContentId },

    /// The window became viewable
    WindowMapped { content: ContentId },

    /// The window was unmapped
    WindowUnmapped { content: ContentId },

    /// The window was moved, resized or restacked
    WindowConfigured {
        content: ContentId,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
        /// Content directly below which this window now sits, if tracked
        above: Option<ContentId>,
    },

    /// A property changed on the window
    PropertyChanged { content: ContentId, atom: u32 },

    /// Redraw `rect` of the window from `pixmap`
    Redraw {
        content: ContentId,
        pixmap: u32,
        visual: u32,
        rect: Rect,
    },
}

// ============================================================================
// Renderer → Compositor Commands
// ============================================================================

/// Commands sent from the renderer back to the compositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RendererCommand {
    /// Make the overlay visible and opaque to input
    ShowOverlay,

    /// Collapse the overlay to an empty shape
    HideOverlay,

    /// Deliver a synthetic pointer event to a tracked window
    InjectInput { window: u32, input: InputEvent },
}

/// Pointer position carried by every synthetic input event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PointerPosition {
    pub x: i16,
    pub y: i16,
    pub root_x: i16,
    pub root_y: i16,
}

/// A synthetic pointer event requested by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum InputEvent {
    ButtonPress {
        button: u8,
        position: PointerPosition,
        state: u16,
        time: u32,
    },
    ButtonRelease {
        button: u8,
        position: PointerPosition,
        state: u16,
        time: u32,
    },
    Motion {
        position: PointerPosition,
        state: u16,
        time: u32,
    },
    Enter { position: PointerPosition, time: u32 },
    Leave { position: PointerPosition, time: u32 },
}
