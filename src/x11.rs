//! x11rb-backed display server

use std::cell::Cell;
use std::os::unix::io::{AsRawFd, RawFd};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::ReplyError;
use x11rb::protocol::composite::{ConnectionExt as _, Redirect};
use x11rb::protocol::damage::{ConnectionExt as _, ReportLevel};
use x11rb::protocol::render::ConnectionExt as _;
use x11rb::protocol::shape::{ConnectionExt as _, SK};
use x11rb::protocol::xfixes::ConnectionExt as _;
use x11rb::protocol::xproto::{
    self, ChangeWindowAttributesAux, ConfigureWindowAux, ConnectionExt as _, CreateWindowAux,
    EventMask, Rectangle, StackMode, WindowClass,
};
use x11rb::rust_connection::RustConnection;

use crate::server::{
    Atom, DamageId, DisplayServer, Extension, ExtensionPresence, MapState, PixmapId, ShapeKind,
    SyncErrors, WindowAttributes, WindowId, WindowKind,
};

pub struct X11Server {
    conn: RustConnection,
    screen_num: usize,
    root: WindowId,
    size: (u16, u16),
    grab_depth: Cell<u32>,
}

impl X11Server {
    /// Connect to `display`, or `$DISPLAY` when `None`
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) =
            RustConnection::connect(display).context("Failed to connect to X server")?;

        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .context("X server reported no such screen")?;
        let root = screen.root;
        let size = (screen.width_in_pixels, screen.height_in_pixels);

        info!(
            "Connected to X server, screen {} ({}x{}), root 0x{:x}",
            screen_num, size.0, size.1, root
        );

        Ok(Self {
            conn,
            screen_num,
            root,
            size,
            grab_depth: Cell::new(0),
        })
    }

    pub fn screen_num(&self) -> usize {
        self.screen_num
    }

    /// Next buffered or readable event, without blocking
    pub fn poll_raw_event(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.conn.poll_for_raw_event()?)
    }

    pub fn raw_fd(&self) -> RawFd {
        self.conn.stream().as_raw_fd()
    }
}

impl DisplayServer for X11Server {
    fn root(&self) -> WindowId {
        self.root
    }

    fn screen_size(&self) -> (u16, u16) {
        self.size
    }

    fn query_extension(&self, ext: Extension) -> Result<Option<ExtensionPresence>> {
        let Some(info) = self.conn.extension_information(ext.name())? else {
            return Ok(None);
        };

        let (major_version, minor_version) = match ext {
            Extension::Composite => {
                let r = self.conn.composite_query_version(0, 4)?.reply()?;
                (r.major_version, r.minor_version)
            }
            Extension::Render => {
                let r = self.conn.render_query_version(0, 11)?.reply()?;
                (r.major_version, r.minor_version)
            }
            Extension::Damage => {
                let r = self.conn.damage_query_version(1, 1)?.reply()?;
                (r.major_version, r.minor_version)
            }
            Extension::XFixes => {
                let r = self.conn.xfixes_query_version(5, 0)?.reply()?;
                (r.major_version, r.minor_version)
            }
            Extension::Shape => {
                let r = self.conn.shape_query_version()?.reply()?;
                (u32::from(r.major_version), u32::from(r.minor_version))
            }
        };

        Ok(Some(ExtensionPresence {
            first_event: info.first_event,
            major_version,
            minor_version,
        }))
    }

    fn create_manager_window(&self) -> Result<WindowId> {
        let window = self.conn.generate_id()?;
        let aux = CreateWindowAux::new()
            .override_redirect(1)
            .event_mask(EventMask::PROPERTY_CHANGE);
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            self.root,
            -100,
            -100,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &aux,
        )?;
        Ok(window)
    }

    fn intern_atom(&self, name: &str) -> Result<Atom> {
        Ok(self.conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
    }

    fn set_selection_owner(&self, owner: WindowId, selection: Atom) -> Result<()> {
        self.conn
            .set_selection_owner(owner, selection, x11rb::CURRENT_TIME)?;
        Ok(())
    }

    fn selection_owner(&self, selection: Atom) -> Result<WindowId> {
        Ok(self.conn.get_selection_owner(selection)?.reply()?.owner)
    }

    fn select_root_input(&self, mask: EventMask) -> Result<SyncErrors> {
        let aux = ChangeWindowAttributesAux::new().event_mask(mask);
        let cookie = self.conn.change_window_attributes(self.root, &aux)?;
        match cookie.check() {
            Ok(()) => Ok(SyncErrors::clean()),
            Err(ReplyError::X11Error(e)) => {
                debug!("Root subscription refused: {:?}", e.error_kind);
                Ok(SyncErrors::single(e.error_code))
            }
            Err(ReplyError::ConnectionError(e)) => Err(e.into()),
        }
    }

    fn grab_server(&self) -> Result<()> {
        let depth = self.grab_depth.get();
        if depth == 0 {
            self.conn.grab_server()?;
        }
        self.grab_depth.set(depth + 1);
        Ok(())
    }

    fn ungrab_server(&self) -> Result<()> {
        match self.grab_depth.get() {
            0 => warn!("Ungrab without a matching grab"),
            1 => {
                self.grab_depth.set(0);
                self.conn.ungrab_server()?;
                self.conn.flush()?;
            }
            depth => self.grab_depth.set(depth - 1),
        }
        Ok(())
    }

    fn query_children(&self, window: WindowId) -> Result<Vec<WindowId>> {
        Ok(self.conn.query_tree(window)?.reply()?.children)
    }

    fn overlay_window(&self) -> Result<WindowId> {
        Ok(self
            .conn
            .composite_get_overlay_window(self.root)?
            .reply()?
            .overlay_win)
    }

    fn set_override_redirect(&self, window: WindowId, enabled: bool) -> Result<()> {
        let aux = ChangeWindowAttributesAux::new().override_redirect(u32::from(enabled));
        self.conn.change_window_attributes(window, &aux)?;
        Ok(())
    }

    fn reparent(&self, window: WindowId, parent: WindowId, x: i16, y: i16) -> Result<()> {
        self.conn.reparent_window(window, parent, x, y)?;
        Ok(())
    }

    fn set_shape_region(
        &self,
        window: WindowId,
        kind: ShapeKind,
        rects: &[Rectangle],
    ) -> Result<()> {
        let kind = match kind {
            ShapeKind::Bounding => SK::BOUNDING,
            ShapeKind::Input => SK::INPUT,
        };

        let region = self.conn.generate_id()?;
        self.conn.xfixes_create_region(region, rects)?;
        self.conn
            .xfixes_set_window_shape_region(window, kind, 0, 0, region)?;
        self.conn.xfixes_destroy_region(region)?;
        Ok(())
    }

    fn window_attributes(&self, window: WindowId) -> Result<Option<WindowAttributes>> {
        let attrs_cookie = self.conn.get_window_attributes(window)?;
        let geometry_cookie = self.conn.get_geometry(window)?;

        let attrs = match attrs_cookie.reply() {
            Ok(attrs) => attrs,
            Err(ReplyError::X11Error(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let geometry = match geometry_cookie.reply() {
            Ok(geometry) => geometry,
            Err(ReplyError::X11Error(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let kind = if attrs.class == WindowClass::INPUT_ONLY {
            WindowKind::InputOnly
        } else {
            WindowKind::InputOutput
        };
        let map_state = match attrs.map_state {
            xproto::MapState::VIEWABLE => MapState::Viewable,
            xproto::MapState::UNVIEWABLE => MapState::Unviewable,
            _ => MapState::Unmapped,
        };

        Ok(Some(WindowAttributes {
            kind,
            override_redirect: attrs.override_redirect,
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            border_width: geometry.border_width,
            visual: attrs.visual,
            map_state,
            root: geometry.root,
        }))
    }

    fn redirect_window(&self, window: WindowId) -> Result<()> {
        self.conn
            .composite_redirect_window(window, Redirect::AUTOMATIC)?;
        Ok(())
    }

    fn unredirect_window(&self, window: WindowId) -> Result<()> {
        self.conn
            .composite_unredirect_window(window, Redirect::AUTOMATIC)?;
        Ok(())
    }

    fn select_window_input(&self, window: WindowId, mask: EventMask) -> Result<()> {
        let aux = ChangeWindowAttributesAux::new().event_mask(mask);
        self.conn.change_window_attributes(window, &aux)?;
        Ok(())
    }

    fn create_damage(&self, window: WindowId) -> Result<DamageId> {
        let damage = self.conn.generate_id()?;
        self.conn
            .damage_create(damage, window, ReportLevel::NON_EMPTY)?;
        Ok(damage)
    }

    fn destroy_damage(&self, damage: DamageId) -> Result<()> {
        self.conn.damage_destroy(damage)?;
        Ok(())
    }

    fn subtract_damage(&self, damage: DamageId) -> Result<()> {
        self.conn
            .damage_subtract(damage, x11rb::NONE, x11rb::NONE)?;
        Ok(())
    }

    fn name_window_pixmap(&self, window: WindowId) -> Result<PixmapId> {
        let pixmap = self.conn.generate_id()?;
        self.conn.composite_name_window_pixmap(window, pixmap)?;
        Ok(pixmap)
    }

    fn free_pixmap(&self, pixmap: PixmapId) -> Result<()> {
        self.conn.free_pixmap(pixmap)?;
        Ok(())
    }

    fn move_resize(
        &self,
        window: WindowId,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    ) -> Result<()> {
        let aux = ConfigureWindowAux::new()
            .x(i32::from(x))
            .y(i32::from(y))
            .width(u32::from(width))
            .height(u32::from(height));
        self.conn.configure_window(window, &aux)?;
        Ok(())
    }

    fn map_raised(&self, window: WindowId) -> Result<()> {
        let aux = ConfigureWindowAux::new().stack_mode(StackMode::ABOVE);
        self.conn.configure_window(window, &aux)?;
        self.conn.map_window(window)?;
        Ok(())
    }

    fn send_event(&self, window: WindowId, mask: EventMask, event: [u8; 32]) -> Result<()> {
        self.conn.send_event(true, window, mask, event)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
