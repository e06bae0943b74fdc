//! Extension negotiation and event classification
//!
//! Extension events arrive at a code the server assigns at runtime
//! (`first_event + n`). Negotiation records those bases once in
//! [`EventBases`]; [`classify`] then maps any response type to an
//! [`EventKind`] without further server round-trips.

use anyhow::{Context, Result};
use tracing::{debug, info};
use x11rb::protocol::{damage, shape, xproto};

use crate::error::SetupError;
use crate::server::{DisplayServer, Extension};

/// Composite 0.3 introduced GetOverlayWindow
pub const MIN_COMPOSITE_VERSION: (u32, u32) = (0, 3);

/// Bit set on events delivered through SendEvent
const SYNTHETIC_BIT: u8 = 0x80;

/// First-event code of every negotiated extension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBases {
    table: Vec<(Extension, u8)>,
}

impl EventBases {
    pub fn new(table: Vec<(Extension, u8)>) -> Self {
        Self { table }
    }

    pub fn base(&self, ext: Extension) -> Option<u8> {
        self.table
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|&(_, base)| base)
    }

    /// True when `code` is event number `offset` of `ext`
    fn is_event(&self, ext: Extension, offset: u8, code: u8) -> bool {
        match self.base(ext) {
            // Extensions without events report a base of 0
            Some(base) if base != 0 => base.wrapping_add(offset) == code,
            _ => false,
        }
    }
}

/// What an incoming response is, before any field is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Error,
    CreateNotify,
    DestroyNotify,
    ReparentNotify,
    ConfigureRequest,
    ConfigureNotify,
    MapRequest,
    MapNotify,
    UnmapNotify,
    PropertyNotify,
    DamageNotify,
    ShapeNotify,
    Unknown(u8),
}

/// Classify a response type against the negotiated event bases
pub fn classify(response_type: u8, bases: &EventBases) -> EventKind {
    let code = response_type & !SYNTHETIC_BIT;
    match code {
        0 => EventKind::Error,
        xproto::CREATE_NOTIFY_EVENT => EventKind::CreateNotify,
        xproto::DESTROY_NOTIFY_EVENT => EventKind::DestroyNotify,
        xproto::REPARENT_NOTIFY_EVENT => EventKind::ReparentNotify,
        xproto::CONFIGURE_REQUEST_EVENT => EventKind::ConfigureRequest,
        xproto::CONFIGURE_NOTIFY_EVENT => EventKind::ConfigureNotify,
        xproto::MAP_REQUEST_EVENT => EventKind::MapRequest,
        xproto::MAP_NOTIFY_EVENT => EventKind::MapNotify,
        xproto::UNMAP_NOTIFY_EVENT => EventKind::UnmapNotify,
        xproto::PROPERTY_NOTIFY_EVENT => EventKind::PropertyNotify,
        _ if bases.is_event(Extension::Damage, damage::NOTIFY_EVENT, code) => {
            EventKind::DamageNotify
        }
        _ if bases.is_event(Extension::Shape, shape::NOTIFY_EVENT, code) => {
            EventKind::ShapeNotify
        }
        _ => EventKind::Unknown(code),
    }
}

/// Verify every required extension and record its event base
pub fn negotiate<S: DisplayServer + ?Sized>(server: &S) -> Result<EventBases> {
    let mut table = Vec::with_capacity(Extension::REQUIRED.len());

    for ext in Extension::REQUIRED {
        let presence = server
            .query_extension(ext)
            .with_context(|| format!("Failed to query {} extension", ext.name()))?
            .ok_or(SetupError::MissingExtension(ext.name()))?;

        if ext == Extension::Composite {
            let version = (presence.major_version, presence.minor_version);
            if version < MIN_COMPOSITE_VERSION {
                return Err(SetupError::CompositeTooOld {
                    major: presence.major_version,
                    minor: presence.minor_version,
                }
                .into());
            }
        }

        info!(
            "{} extension {}.{}",
            ext.name(),
            presence.major_version,
            presence.minor_version
        );
        debug!("{} first event: {}", ext.name(), presence.first_event);
        table.push((ext, presence.first_event));
    }

    Ok(EventBases::new(table))
}
