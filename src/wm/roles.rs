//! Window manager / compositing manager role acquisition
//!
//! Both roles are per-screen selections. Owning `WM_S{n}` makes us the window
//! manager, owning `_NET_WM_CM_S{n}` makes us the compositing manager. Setting
//! the owner is only a request; another client may win the race, so every
//! attempt is verified by reading the owner back.

use anyhow::{Context, Result};
use bitflags::bitflags;
use tracing::{debug, info, warn};

use crate::error::SetupError;
use crate::server::{DisplayServer, WindowId};

bitflags! {
    /// Roles this process won at startup
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Roles: u8 {
        const WINDOW_MANAGER = 1 << 0;
        const COMPOSITOR = 1 << 1;
    }
}

impl Roles {
    pub fn is_window_manager(self) -> bool {
        self.contains(Roles::WINDOW_MANAGER)
    }

    pub fn is_compositor(self) -> bool {
        self.contains(Roles::COMPOSITOR)
    }
}

/// Result of role acquisition
#[derive(Debug, Clone, Copy)]
pub struct RoleAcquisition {
    /// Selection holder; lives as long as the session
    pub manager_window: WindowId,
    pub roles: Roles,
}

pub fn compositor_selection(screen_num: usize) -> String {
    format!("_NET_WM_CM_S{}", screen_num)
}

pub fn wm_selection(screen_num: usize) -> String {
    format!("WM_S{}", screen_num)
}

/// Contend for both selections on `screen_num`.
///
/// Losing one role is fine; losing both is fatal.
pub fn acquire<S: DisplayServer + ?Sized>(server: &S, screen_num: usize) -> Result<RoleAcquisition> {
    let manager_window = server
        .create_manager_window()
        .context("Failed to create manager window")?;
    debug!("Manager window: 0x{:x}", manager_window);

    let mut roles = Roles::empty();

    if claim(server, manager_window, &compositor_selection(screen_num))? {
        roles |= Roles::COMPOSITOR;
    } else {
        warn!("Couldn't acquire compositing manager selection");
    }

    if claim(server, manager_window, &wm_selection(screen_num))? {
        roles |= Roles::WINDOW_MANAGER;
    } else {
        warn!("Couldn't acquire window manager selection");
    }

    if roles.is_empty() {
        return Err(SetupError::NoRoles.into());
    }

    info!(
        "Acquired roles: window manager={}, compositor={}",
        roles.is_window_manager(),
        roles.is_compositor()
    );

    Ok(RoleAcquisition {
        manager_window,
        roles,
    })
}

/// Request ownership of `selection_name`, then confirm we actually hold it
fn claim<S: DisplayServer + ?Sized>(
    server: &S,
    owner: WindowId,
    selection_name: &str,
) -> Result<bool> {
    let selection = server
        .intern_atom(selection_name)
        .with_context(|| format!("Failed to intern {}", selection_name))?;

    server
        .set_selection_owner(owner, selection)
        .with_context(|| format!("Failed to set {} owner", selection_name))?;

    let current = server
        .selection_owner(selection)
        .with_context(|| format!("Failed to verify {} owner", selection_name))?;
    debug!("{}: owner after acquisition 0x{:x}", selection_name, current);

    Ok(current == owner)
}
