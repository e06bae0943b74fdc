//! Composite overlay window setup
//!
//! The overlay sits above every other window. The host's output window is
//! reparented into it, and its shape decides whether the composited output is
//! visible and receives input.

use anyhow::{Context, Result};
use tracing::{debug, info};
use x11rb::protocol::xproto::Rectangle;

use crate::consumer::HostSurface;
use crate::error::SetupError;
use crate::server::{DisplayServer, ShapeKind, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Shown,
    Hidden,
}

#[derive(Debug)]
pub struct Overlay {
    pub window: WindowId,
    /// Native window of the host surface, now a child of the overlay
    pub host_window: WindowId,
    area: Rectangle,
    state: OverlayState,
}

impl Overlay {
    /// Claim the overlay, move the host window into it and show it.
    ///
    /// `width` x `height` is the area the overlay covers while shown.
    pub fn setup<S, H>(server: &S, host: &H, width: u16, height: u16) -> Result<Self>
    where
        S: DisplayServer + ?Sized,
        H: HostSurface + ?Sized,
    {
        let window = server
            .overlay_window()
            .context("Failed to get Composite overlay window")?;
        if window == x11rb::NONE {
            return Err(SetupError::NoOverlay.into());
        }
        info!("Using Composite overlay window 0x{:x}", window);

        let host_window = host
            .resolve_native_window()
            .ok_or(SetupError::NoHostWindow)?;
        debug!("Host surface window: 0x{:x}", host_window);

        // Keep our own top-level moves out of the management logic
        server.set_override_redirect(host_window, true)?;
        server
            .reparent(host_window, window, 0, 0)
            .context("Failed to reparent host window into overlay")?;

        let mut overlay = Self {
            window,
            host_window,
            area: Rectangle {
                x: 0,
                y: 0,
                width,
                height,
            },
            state: OverlayState::Hidden,
        };
        overlay.show(server)?;

        Ok(overlay)
    }

    /// Make the overlay draw and take input across the full area
    pub fn show<S: DisplayServer + ?Sized>(&mut self, server: &S) -> Result<()> {
        let rects = [self.area];
        server.set_shape_region(self.window, ShapeKind::Bounding, &rects)?;
        server.set_shape_region(self.window, ShapeKind::Input, &rects)?;
        debug!(
            "Overlay shown ({}x{}, was {:?})",
            self.area.width, self.area.height, self.state
        );
        self.state = OverlayState::Shown;
        Ok(())
    }

    /// Collapse the overlay to nothing, yielding the screen
    pub fn hide<S: DisplayServer + ?Sized>(&mut self, server: &S) -> Result<()> {
        server.set_shape_region(self.window, ShapeKind::Bounding, &[])?;
        debug!("Overlay hidden (was {:?})", self.state);
        self.state = OverlayState::Hidden;
        Ok(())
    }

    #[cfg(test)]
    pub fn state(&self) -> OverlayState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::KnownHost;
    use crate::testing::{Call, FakeServer, OVERLAY};

    const HOST: WindowId = 0x0340_0007;

    #[test]
    fn test_setup_reparents_host_and_shows() {
        let server = FakeServer::new();
        let overlay = Overlay::setup(&server, &KnownHost(Some(HOST)), 800, 600).unwrap();

        assert_eq!(overlay.window, OVERLAY);
        assert_eq!(overlay.host_window, HOST);
        assert_eq!(overlay.state(), OverlayState::Shown);

        let full = vec![Rectangle {
            x: 0,
            y: 0,
            width: 800,
            height: 600,
        }];
        assert_eq!(
            server.calls(),
            vec![
                Call::SetOverrideRedirect(HOST, true),
                Call::Reparent {
                    window: HOST,
                    parent: OVERLAY,
                },
                Call::SetShape {
                    window: OVERLAY,
                    kind: ShapeKind::Bounding,
                    rects: full.clone(),
                },
                Call::SetShape {
                    window: OVERLAY,
                    kind: ShapeKind::Input,
                    rects: full,
                },
            ]
        );
    }

    #[test]
    fn test_hide_sets_empty_bounding_shape() {
        let server = FakeServer::new();
        let mut overlay = Overlay::setup(&server, &KnownHost(Some(HOST)), 800, 600).unwrap();
        server.clear_calls();

        overlay.hide(&server).unwrap();
        assert_eq!(overlay.state(), OverlayState::Hidden);
        assert_eq!(
            server.calls(),
            vec![Call::SetShape {
                window: OVERLAY,
                kind: ShapeKind::Bounding,
                rects: vec![],
            }]
        );
    }

    #[test]
    fn test_missing_overlay_is_fatal() {
        let server = FakeServer::new();
        server.set_overlay(x11rb::NONE);
        let err = Overlay::setup(&server, &KnownHost(Some(HOST)), 800, 600).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::NoOverlay)
        ));
    }

    #[test]
    fn test_host_without_native_window_is_fatal() {
        let server = FakeServer::new();
        let err = Overlay::setup(&server, &KnownHost(None), 800, 600).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::NoHostWindow)
        ));
        assert!(server.calls().is_empty());
    }
}
