use anyhow::Result;
use tracing::debug;
use x11rb::protocol::xproto::EventMask;

use crate::server::{
    DamageId, DisplayServer, PixmapId, ServerGrab, WindowAttributes, WindowId,
};

/// Events selected on every tracked window
fn window_events() -> EventMask {
    EventMask::PROPERTY_CHANGE | EventMask::ENTER_WINDOW | EventMask::FOCUS_CHANGE
}

/// How much server-side cleanup a released window needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The window was destroyed; the server already dropped its damage object
    /// and redirection
    WindowGone,
    /// The window still exists; undo damage tracking and redirection
    Release,
}

/// Compositor-side state for one redirected top-level window.
///
/// `T` is the consumer's content handle. A freshly constructed window carries
/// `()` until the consumer accepts it.
#[derive(Debug)]
pub struct WindowEntity<T> {
    pub id: WindowId,
    attrs: WindowAttributes,
    damage: Option<DamageId>,
    /// Named lazily, only while the window is viewable
    pixmap: Option<PixmapId>,
    content: T,
}

impl WindowEntity<()> {
    /// Start damage tracking and automatic redirection for `id`
    pub fn construct<S: DisplayServer + ?Sized>(
        server: &S,
        id: WindowId,
        attrs: WindowAttributes,
    ) -> Result<Self> {
        let damage = server.create_damage(id)?;
        server.redirect_window(id)?;
        server.select_window_input(id, window_events())?;

        let mut entity = Self {
            id,
            attrs,
            damage: Some(damage),
            pixmap: None,
            content: (),
        };
        entity.ensure_pixmap(server)?;

        Ok(entity)
    }

    /// Hand the window to its consumer content
    pub fn attach<T>(self, content: T) -> WindowEntity<T> {
        WindowEntity {
            id: self.id,
            attrs: self.attrs,
            damage: self.damage,
            pixmap: self.pixmap,
            content,
        }
    }
}

impl<T> WindowEntity<T> {
    pub fn attrs(&self) -> &WindowAttributes {
        &self.attrs
    }

    pub fn content(&self) -> &T {
        &self.content
    }

    pub fn damage(&self) -> Option<DamageId> {
        self.damage
    }

    #[cfg(test)]
    pub fn pixmap(&self) -> Option<PixmapId> {
        self.pixmap
    }

    /// Name a backing pixmap if there is none and the window is viewable.
    ///
    /// Attribute read and naming happen under one grab so the window cannot
    /// be unmapped or destroyed in between.
    pub fn ensure_pixmap<S: DisplayServer + ?Sized>(
        &mut self,
        server: &S,
    ) -> Result<Option<PixmapId>> {
        if self.pixmap.is_some() {
            return Ok(self.pixmap);
        }

        let _grab = ServerGrab::new(server)?;

        match server.window_attributes(self.id)? {
            Some(attrs) => self.attrs = attrs,
            None => {
                debug!("Window 0x{:x} vanished before naming its pixmap", self.id);
                return Ok(None);
            }
        }

        if self.attrs.is_viewable() {
            let pixmap = server.name_window_pixmap(self.id)?;
            debug!("Named pixmap 0x{:x} for window 0x{:x}", pixmap, self.id);
            self.pixmap = Some(pixmap);
        }

        Ok(self.pixmap)
    }

    /// Free the backing pixmap; the next `ensure_pixmap` names a fresh one
    pub fn invalidate_pixmap<S: DisplayServer + ?Sized>(&mut self, server: &S) -> Result<()> {
        if let Some(pixmap) = self.pixmap.take() {
            debug!("Freeing pixmap 0x{:x} of window 0x{:x}", pixmap, self.id);
            server.free_pixmap(pixmap)?;
        }
        Ok(())
    }

    /// Record a new geometry; returns true if the size changed
    pub fn update_geometry(
        &mut self,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
    ) -> bool {
        let resized = self.attrs.width != width
            || self.attrs.height != height
            || self.attrs.border_width != border_width;
        self.attrs.x = x;
        self.attrs.y = y;
        self.attrs.width = width;
        self.attrs.height = height;
        self.attrs.border_width = border_width;
        resized
    }

    /// Drop every server resource held for this window
    pub fn release<S: DisplayServer + ?Sized>(mut self, server: &S, teardown: Teardown) -> Result<()> {
        self.invalidate_pixmap(server)?;

        let damage = self.damage.take();
        if teardown == Teardown::Release {
            if let Some(damage) = damage {
                server.destroy_damage(damage)?;
            }
            // Let the window draw itself again
            server.unredirect_window(self.id)?;
        }

        debug!("Released window 0x{:x} ({:?})", self.id, teardown);
        Ok(())
    }
}
