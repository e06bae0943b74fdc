//! Window Manager Module
//!
//! Owns the session: extension negotiation, role acquisition, overlay setup,
//! the root subscription and the registry of tracked windows.

pub mod dispatch;
pub mod events;
pub mod registry;
pub mod roles;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::EventMask;

use crate::compositor::overlay::Overlay;
use crate::consumer::{Consumer, HostSurface};
use crate::extensions::{self, EventBases};
use crate::server::{DisplayServer, ServerGrab, WindowId};
use registry::Registry;
use roles::Roles;

/// Window management policy knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Smallest x and y granted to a ConfigureRequest
    pub min_offset: i16,
    /// Free a window's pixmap when it is unmapped
    pub free_pixmap_on_unmap: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_offset: 30,
            free_pixmap_on_unmap: true,
        }
    }
}

/// Root events selected whether or not we manage windows
fn root_events() -> EventMask {
    EventMask::SUBSTRUCTURE_NOTIFY | EventMask::STRUCTURE_NOTIFY | EventMask::PROPERTY_CHANGE
}

pub struct Session<S: DisplayServer, C: Consumer> {
    pub(crate) server: S,
    pub(crate) consumer: C,
    pub(crate) bases: EventBases,
    pub(crate) roles: Roles,
    pub(crate) manager_window: WindowId,
    pub(crate) overlay: Overlay,
    pub(crate) registry: Registry<C::Content>,
    /// Parent the host window was last reparented into
    pub(crate) host_parent: Option<WindowId>,
    pub(crate) settings: Settings,
}

impl<S: DisplayServer, C: Consumer> Session<S, C> {
    /// Bring the compositor up on `screen_num`.
    ///
    /// The overlay covers `output` (width, height). Any failure here is fatal.
    pub fn start<H: HostSurface + ?Sized>(
        server: S,
        consumer: C,
        host: &H,
        screen_num: usize,
        output: (u16, u16),
        settings: Settings,
    ) -> Result<Self> {
        info!("Starting session on screen {}", screen_num);

        let bases = extensions::negotiate(&server)?;
        let acquired = roles::acquire(&server, screen_num)?;
        let overlay = Overlay::setup(&server, host, output.0, output.1)?;

        let mut session = Self {
            server,
            consumer,
            bases,
            roles: acquired.roles,
            manager_window: acquired.manager_window,
            overlay,
            registry: Registry::new(),
            host_parent: None,
            settings,
        };

        session.take_over().context("Failed to take over the root window")?;
        session.server.flush()?;

        info!(
            "Session ready: {} windows tracked, window manager={}",
            session.registry.len(),
            session.roles.is_window_manager()
        );
        Ok(session)
    }

    /// Subscribe to the root and, when managing, adopt existing windows.
    ///
    /// Both happen under one grab so no window can appear in between.
    fn take_over(&mut self) -> Result<()> {
        let server = &self.server;
        let _grab = ServerGrab::new(server)?;

        if self.roles.is_window_manager() {
            let errors =
                server.select_root_input(root_events() | EventMask::SUBSTRUCTURE_REDIRECT)?;
            if !errors.is_clean() {
                warn!(
                    "Another window manager is running (error {:?}), continuing as compositor only",
                    errors.last_code
                );
                server.select_root_input(root_events())?;
                self.roles.remove(Roles::WINDOW_MANAGER);
            }
        } else {
            server.select_root_input(root_events())?;
        }

        if !self.roles.is_window_manager() {
            debug!("Not managing windows, skipping bootstrap");
            return Ok(());
        }

        let children = server
            .query_children(server.root())
            .context("Failed to query root children")?;
        debug!("Adopting {} existing windows", children.len());

        let suppressed = self.suppressed_ids();
        for window in children {
            dispatch::add_window(
                server,
                &mut self.consumer,
                &mut self.registry,
                &suppressed,
                window,
            )?;
        }

        Ok(())
    }

    /// Windows belonging to the compositor itself
    pub(crate) fn suppressed_ids(&self) -> [Option<WindowId>; 4] {
        [
            Some(self.overlay.host_window),
            self.host_parent,
            Some(self.overlay.window),
            Some(self.manager_window),
        ]
    }

    pub(crate) fn is_suppressed(&self, window: WindowId) -> bool {
        self.suppressed_ids().contains(&Some(window))
    }

    pub fn show_overlay(&mut self) -> Result<()> {
        self.overlay.show(&self.server)
    }

    pub fn hide_overlay(&mut self) -> Result<()> {
        self.overlay.hide(&self.server)
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    #[cfg(test)]
    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    pub fn roles(&self) -> Roles {
        self.roles
    }

    #[cfg(test)]
    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn registry(&self) -> &Registry<C::Content> {
        &self.registry
    }

    #[cfg(test)]
    pub fn host_parent(&self) -> Option<WindowId> {
        self.host_parent
    }
}
