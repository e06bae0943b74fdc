//! Display server seam
//!
//! Everything the compositor core asks of the X server goes through
//! [`DisplayServer`]. The production implementation lives in `crate::x11`;
//! tests drive the core against an in-memory server instead.

use anyhow::Result;
use tracing::warn;
use x11rb::protocol::xproto::{EventMask, Rectangle};

pub type WindowId = u32;
pub type PixmapId = u32;
pub type DamageId = u32;
pub type Atom = u32;
pub type VisualId = u32;

/// The five extensions the compositor cannot run without
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    Composite,
    Render,
    Damage,
    XFixes,
    Shape,
}

impl Extension {
    pub const REQUIRED: [Extension; 5] = [
        Extension::Composite,
        Extension::Render,
        Extension::Damage,
        Extension::XFixes,
        Extension::Shape,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Extension::Composite => x11rb::protocol::composite::X11_EXTENSION_NAME,
            Extension::Render => x11rb::protocol::render::X11_EXTENSION_NAME,
            Extension::Damage => x11rb::protocol::damage::X11_EXTENSION_NAME,
            Extension::XFixes => x11rb::protocol::xfixes::X11_EXTENSION_NAME,
            Extension::Shape => x11rb::protocol::shape::X11_EXTENSION_NAME,
        }
    }
}

/// What the server told us about an extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionPresence {
    pub first_event: u8,
    pub major_version: u32,
    pub minor_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    InputOutput,
    InputOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Unmapped,
    Unviewable,
    Viewable,
}

/// Snapshot of a window's attributes and geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttributes {
    pub kind: WindowKind,
    pub override_redirect: bool,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border_width: u16,
    pub visual: VisualId,
    pub map_state: MapState,
    pub root: WindowId,
}

impl WindowAttributes {
    pub fn is_viewable(&self) -> bool {
        self.map_state == MapState::Viewable
    }
}

/// Which shape of a window to replace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Bounding,
    Input,
}

/// Errors the server reported for a synchronously checked request.
///
/// Returned by value from the check instead of being accumulated in a
/// process-wide counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncErrors {
    pub count: u32,
    /// Error code of the last reported error
    pub last_code: Option<u8>,
}

impl SyncErrors {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn single(code: u8) -> Self {
        Self {
            count: 1,
            last_code: Some(code),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.count == 0
    }
}

/// Requests the compositor core issues against the display server.
///
/// Methods take `&self` like the x11rb connection does. `grab_server` /
/// `ungrab_server` nest: only the outermost pair reaches the server. Use
/// [`ServerGrab`] rather than calling them directly.
pub trait DisplayServer {
    fn root(&self) -> WindowId;

    fn screen_size(&self) -> (u16, u16);

    /// Presence, event base and version of an extension, `None` if absent
    fn query_extension(&self, ext: Extension) -> Result<Option<ExtensionPresence>>;

    /// Create the tiny off-screen override-redirect selection holder
    fn create_manager_window(&self) -> Result<WindowId>;

    fn intern_atom(&self, name: &str) -> Result<Atom>;

    fn set_selection_owner(&self, owner: WindowId, selection: Atom) -> Result<()>;

    fn selection_owner(&self, selection: Atom) -> Result<WindowId>;

    /// Replace the root event mask, flush, and report server errors for it
    fn select_root_input(&self, mask: EventMask) -> Result<SyncErrors>;

    fn grab_server(&self) -> Result<()>;

    fn ungrab_server(&self) -> Result<()>;

    fn query_children(&self, window: WindowId) -> Result<Vec<WindowId>>;

    /// Composite overlay window of the root, 0 when unavailable
    fn overlay_window(&self) -> Result<WindowId>;

    fn set_override_redirect(&self, window: WindowId, enabled: bool) -> Result<()>;

    fn reparent(&self, window: WindowId, parent: WindowId, x: i16, y: i16) -> Result<()>;

    /// Replace a shape of `window` with the union of `rects` (empty = nothing)
    fn set_shape_region(&self, window: WindowId, kind: ShapeKind, rects: &[Rectangle])
        -> Result<()>;

    /// Attributes plus geometry, `None` if the window no longer exists
    fn window_attributes(&self, window: WindowId) -> Result<Option<WindowAttributes>>;

    fn redirect_window(&self, window: WindowId) -> Result<()>;

    fn unredirect_window(&self, window: WindowId) -> Result<()>;

    fn select_window_input(&self, window: WindowId, mask: EventMask) -> Result<()>;

    fn create_damage(&self, window: WindowId) -> Result<DamageId>;

    fn destroy_damage(&self, damage: DamageId) -> Result<()>;

    /// Mark all accumulated damage as repaired
    fn subtract_damage(&self, damage: DamageId) -> Result<()>;

    fn name_window_pixmap(&self, window: WindowId) -> Result<PixmapId>;

    fn free_pixmap(&self, pixmap: PixmapId) -> Result<()>;

    fn move_resize(&self, window: WindowId, x: i16, y: i16, width: u16, height: u16)
        -> Result<()>;

    fn map_raised(&self, window: WindowId) -> Result<()>;

    fn send_event(&self, window: WindowId, mask: EventMask, event: [u8; 32]) -> Result<()>;

    fn flush(&self) -> Result<()>;
}

/// Holds a server grab until dropped.
///
/// The ungrab runs from `Drop`, so early returns and `?` paths release the
/// grab too.
pub struct ServerGrab<'a, S: DisplayServer + ?Sized> {
    server: &'a S,
}

impl<'a, S: DisplayServer + ?Sized> ServerGrab<'a, S> {
    pub fn new(server: &'a S) -> Result<Self> {
        server.grab_server()?;
        Ok(Self { server })
    }
}

impl<S: DisplayServer + ?Sized> Drop for ServerGrab<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.server.ungrab_server() {
            warn!("Failed to release server grab: {}", e);
        }
    }
}
