//! Event dispatch
//!
//! One event at a time, in arrival order. Events about the compositor's own
//! windows (host surface, its parent, the overlay, the manager window) are
//! dropped before they reach the registry.

use anyhow::Result;
use tracing::{debug, warn};

use super::Session;
use super::events::ServerEvent;
use super::registry::Registry;
use crate::compositor::window::{Teardown, WindowEntity};
use crate::consumer::{Consumer, Geometry};
use crate::server::{DisplayServer, WindowId, WindowKind};

/// Start tracking `window` if the consumer wants it.
///
/// Returns true if the window is now tracked.
pub(crate) fn add_window<S, C>(
    server: &S,
    consumer: &mut C,
    registry: &mut Registry<C::Content>,
    suppressed: &[Option<WindowId>],
    window: WindowId,
) -> Result<bool>
where
    S: DisplayServer + ?Sized,
    C: Consumer,
{
    if suppressed.contains(&Some(window)) {
        debug!("Not tracking own window 0x{:x}", window);
        return Ok(false);
    }
    if registry.contains(window) {
        debug!("Window 0x{:x} already tracked", window);
        return Ok(false);
    }

    let Some(attrs) = server.window_attributes(window)? else {
        debug!("Window 0x{:x} gone before it could be tracked", window);
        return Ok(false);
    };
    if attrs.kind == WindowKind::InputOnly {
        debug!("Ignoring InputOnly window 0x{:x}", window);
        return Ok(false);
    }

    let entity = WindowEntity::construct(server, window, attrs)?;
    let attrs = *entity.attrs();

    let Some(content) = consumer.window_created(
        window,
        attrs.override_redirect,
        attrs.x,
        attrs.y,
        attrs.width,
        attrs.height,
    ) else {
        debug!("Consumer declined window 0x{:x}", window);
        entity.release(server, Teardown::Release)?;
        return Ok(false);
    };

    if let Err(entity) = registry.insert(entity.attach(content)) {
        warn!("Window 0x{:x} tracked twice", window);
        consumer.window_destroyed(entity.content());
        entity.release(server, Teardown::Release)?;
        return Ok(false);
    }
    debug!(
        "Tracking window 0x{:x} ({}x{}+{}+{})",
        window, attrs.width, attrs.height, attrs.x, attrs.y
    );

    if attrs.is_viewable() {
        map_window(server, consumer, registry, window)?;
    }

    Ok(true)
}

fn map_window<S, C>(
    server: &S,
    consumer: &mut C,
    registry: &mut Registry<C::Content>,
    window: WindowId,
) -> Result<()>
where
    S: DisplayServer + ?Sized,
    C: Consumer,
{
    let Some(entity) = registry.get_mut(window) else {
        return Ok(());
    };
    entity.ensure_pixmap(server)?;
    consumer.window_mapped(entity.content());
    Ok(())
}

fn remove_window<S, C>(
    server: &S,
    consumer: &mut C,
    registry: &mut Registry<C::Content>,
    window: WindowId,
    teardown: Teardown,
) -> Result<bool>
where
    S: DisplayServer + ?Sized,
    C: Consumer,
{
    let Some(entity) = registry.remove(window) else {
        return Ok(false);
    };
    consumer.window_destroyed(entity.content());
    entity.release(server, teardown)?;
    debug!("Stopped tracking window 0x{:x}", window);
    Ok(true)
}

impl<S: DisplayServer, C: Consumer> Session<S, C> {
    /// Decode and handle one raw event; undecodable events are dropped
    pub fn handle_raw(&mut self, raw: &[u8]) -> Result<()> {
        match ServerEvent::decode(raw, &self.bases) {
            Ok(event) => self.handle_event(event),
            Err(e) => {
                warn!("Dropping event: {:#}", e);
                Ok(())
            }
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent) -> Result<()> {
        if let ServerEvent::Reparent { window, parent } = event {
            if window == self.overlay.host_window {
                return self.host_reparented(parent);
            }
        }

        if let Some(window) = event.window() {
            if self.is_suppressed(window) {
                debug!("Suppressed {:?}", event);
                return Ok(());
            }
        }

        match event {
            ServerEvent::Create { window, .. } => {
                let suppressed = self.suppressed_ids();
                add_window(
                    &self.server,
                    &mut self.consumer,
                    &mut self.registry,
                    &suppressed,
                    window,
                )?;
            }
            ServerEvent::Destroy { window } => {
                remove_window(
                    &self.server,
                    &mut self.consumer,
                    &mut self.registry,
                    window,
                    Teardown::WindowGone,
                )?;
            }
            ServerEvent::Reparent { window, parent } => self.reparented(window, parent)?,
            ServerEvent::ConfigureRequest {
                window,
                x,
                y,
                width,
                height,
            } => {
                let min = self.settings.min_offset;
                debug!(
                    "ConfigureRequest 0x{:x}: {}x{}+{}+{}",
                    window, width, height, x, y
                );
                self.server
                    .move_resize(window, x.max(min), y.max(min), width, height)?;
            }
            ServerEvent::Configure {
                window,
                above,
                x,
                y,
                width,
                height,
                border_width,
            } => {
                let Some(entity) = self.registry.get_mut(window) else {
                    return Ok(());
                };
                if entity.update_geometry(x, y, width, height, border_width) {
                    entity.invalidate_pixmap(&self.server)?;
                }

                let geometry = Geometry {
                    x,
                    y,
                    width,
                    height,
                    border_width,
                };
                if let Some(content) = self.registry.content(window) {
                    let above = self.registry.content(above);
                    self.consumer.window_configured(content, geometry, above);
                }
            }
            ServerEvent::MapRequest { window } => {
                debug!("MapRequest 0x{:x}", window);
                self.server.map_raised(window)?;
            }
            ServerEvent::Map { window } => {
                map_window(&self.server, &mut self.consumer, &mut self.registry, window)?;
            }
            ServerEvent::Unmap { window } => {
                let Some(entity) = self.registry.get_mut(window) else {
                    return Ok(());
                };
                self.consumer.window_unmapped(entity.content());
                if self.settings.free_pixmap_on_unmap {
                    entity.invalidate_pixmap(&self.server)?;
                }
            }
            ServerEvent::Property { window, atom } => {
                if let Some(content) = self.registry.content(window) {
                    self.consumer.property_changed(content, atom);
                }
            }
            ServerEvent::Damage { drawable, area } => self.on_damage(drawable, area)?,
            ServerEvent::Shape { window } => debug!("Shape changed on 0x{:x}", window),
            ServerEvent::Error { code, resource } => {
                warn!("X error {} on resource 0x{:x}", code, resource);
            }
            ServerEvent::Unknown { code } => debug!("Unhandled event type {}", code),
        }

        Ok(())
    }

    /// The host surface moved into a toolkit wrapper; that wrapper is ours now
    fn host_reparented(&mut self, parent: WindowId) -> Result<()> {
        debug!("Host window reparented into 0x{:x}", parent);
        self.host_parent = Some(parent);
        remove_window(
            &self.server,
            &mut self.consumer,
            &mut self.registry,
            parent,
            Teardown::Release,
        )?;
        Ok(())
    }

    fn reparented(&mut self, window: WindowId, parent: WindowId) -> Result<()> {
        let tracked = self.registry.contains(window);

        if parent == self.server.root() {
            // A tracked window coming back to the root keeps its entity
            if !tracked {
                let suppressed = self.suppressed_ids();
                add_window(
                    &self.server,
                    &mut self.consumer,
                    &mut self.registry,
                    &suppressed,
                    window,
                )?;
            }
        } else if tracked {
            // Still alive, just no longer top-level
            remove_window(
                &self.server,
                &mut self.consumer,
                &mut self.registry,
                window,
                Teardown::Release,
            )?;
        }

        Ok(())
    }
}
