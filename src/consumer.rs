//! Interfaces to the compositor's collaborators
//!
//! The core never draws. It reports window lifecycle and damage to a
//! [`Consumer`] and asks a [`HostSurface`] which window holds the composited
//! output.

use x11rb::protocol::xproto::Rectangle;

use crate::server::{Atom, PixmapId, VisualId, WindowId};

/// Position, size and border of a configured window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border_width: u16,
}

/// The rendering side of the compositor.
///
/// `Content` is whatever handle the consumer wants back for a window it
/// accepted. A window is tracked only while its content exists.
pub trait Consumer {
    type Content;

    /// Offer a new window; return `None` to leave it untracked
    fn window_created(
        &mut self,
        window: WindowId,
        override_redirect: bool,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    ) -> Option<Self::Content>;

    fn window_destroyed(&mut self, content: &Self::Content);

    fn window_mapped(&mut self, content: &Self::Content);

    fn window_unmapped(&mut self, content: &Self::Content);

    /// `above` is the content of the sibling directly below, if tracked
    fn window_configured(
        &mut self,
        content: &Self::Content,
        geometry: Geometry,
        above: Option<&Self::Content>,
    );

    fn property_changed(&mut self, content: &Self::Content, atom: Atom);

    /// Repaint exactly `dirty` of the window from `pixmap`
    fn redraw(
        &mut self,
        content: &Self::Content,
        pixmap: PixmapId,
        visual: VisualId,
        dirty: Rectangle,
    );
}

/// The embedding environment that owns the output surface
pub trait HostSurface {
    /// Native window backing the host's rendering surface
    fn resolve_native_window(&self) -> Option<WindowId>;
}

/// A host surface whose window id is known up front (command line, env, config)
#[derive(Debug, Clone, Copy)]
pub struct KnownHost(pub Option<WindowId>);

impl HostSurface for KnownHost {
    fn resolve_native_window(&self) -> Option<WindowId> {
        self.0.filter(|&id| id != x11rb::NONE)
    }
}
