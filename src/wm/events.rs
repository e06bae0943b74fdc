//! Event decoding
//!
//! Raw 32-byte responses from the server are classified against the
//! negotiated extension bases and parsed into [`ServerEvent`], the only event
//! type the dispatcher sees.

use anyhow::{Context, Result};
use x11rb::protocol::xproto::{
    ConfigureNotifyEvent, ConfigureRequestEvent, CreateNotifyEvent, DestroyNotifyEvent,
    MapNotifyEvent, MapRequestEvent, PropertyNotifyEvent, Rectangle, ReparentNotifyEvent,
    UnmapNotifyEvent,
};
use x11rb::protocol::{damage, shape};
use x11rb::x11_utils::TryParse;

use crate::extensions::{EventBases, EventKind, classify};
use crate::server::{Atom, WindowId};

const ERROR_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    Create {
        window: WindowId,
        parent: WindowId,
        override_redirect: bool,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    },
    Destroy {
        window: WindowId,
    },
    Reparent {
        window: WindowId,
        parent: WindowId,
    },
    ConfigureRequest {
        window: WindowId,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    },
    Configure {
        window: WindowId,
        /// Sibling directly below the window, or `NONE`
        above: WindowId,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
    },
    MapRequest {
        window: WindowId,
    },
    Map {
        window: WindowId,
    },
    Unmap {
        window: WindowId,
    },
    Property {
        window: WindowId,
        atom: Atom,
    },
    Damage {
        drawable: WindowId,
        area: Rectangle,
    },
    Shape {
        window: WindowId,
    },
    Error {
        code: u8,
        resource: u32,
    },
    Unknown {
        code: u8,
    },
}

fn parse<T: TryParse>(raw: &[u8], what: &str) -> Result<T> {
    let (event, _) = T::try_parse(raw).with_context(|| format!("Malformed {} event", what))?;
    Ok(event)
}

impl ServerEvent {
    /// Decode one raw response
    pub fn decode(raw: &[u8], bases: &EventBases) -> Result<Self> {
        let response_type = *raw.first().context("Empty event")?;

        let event = match classify(response_type, bases) {
            EventKind::Error => {
                anyhow::ensure!(raw.len() >= ERROR_LEN, "Truncated error packet");
                ServerEvent::Error {
                    code: raw[1],
                    resource: u32::from_ne_bytes([raw[4], raw[5], raw[6], raw[7]]),
                }
            }
            EventKind::CreateNotify => {
                let e: CreateNotifyEvent = parse(raw, "CreateNotify")?;
                ServerEvent::Create {
                    window: e.window,
                    parent: e.parent,
                    override_redirect: e.override_redirect,
                    x: e.x,
                    y: e.y,
                    width: e.width,
                    height: e.height,
                }
            }
            EventKind::DestroyNotify => {
                let e: DestroyNotifyEvent = parse(raw, "DestroyNotify")?;
                ServerEvent::Destroy { window: e.window }
            }
            EventKind::ReparentNotify => {
                let e: ReparentNotifyEvent = parse(raw, "ReparentNotify")?;
                ServerEvent::Reparent {
                    window: e.window,
                    parent: e.parent,
                }
            }
            EventKind::ConfigureRequest => {
                let e: ConfigureRequestEvent = parse(raw, "ConfigureRequest")?;
                ServerEvent::ConfigureRequest {
                    window: e.window,
                    x: e.x,
                    y: e.y,
                    width: e.width,
                    height: e.height,
                }
            }
            EventKind::ConfigureNotify => {
                let e: ConfigureNotifyEvent = parse(raw, "ConfigureNotify")?;
                ServerEvent::Configure {
                    window: e.window,
                    above: e.above_sibling,
                    x: e.x,
                    y: e.y,
                    width: e.width,
                    height: e.height,
                    border_width: e.border_width,
                }
            }
            EventKind::MapRequest => {
                let e: MapRequestEvent = parse(raw, "MapRequest")?;
                ServerEvent::MapRequest { window: e.window }
            }
            EventKind::MapNotify => {
                let e: MapNotifyEvent = parse(raw, "MapNotify")?;
                ServerEvent::Map { window: e.window }
            }
            EventKind::UnmapNotify => {
                let e: UnmapNotifyEvent = parse(raw, "UnmapNotify")?;
                ServerEvent::Unmap { window: e.window }
            }
            EventKind::PropertyNotify => {
                let e: PropertyNotifyEvent = parse(raw, "PropertyNotify")?;
                ServerEvent::Property {
                    window: e.window,
                    atom: e.atom,
                }
            }
            EventKind::DamageNotify => {
                let e: damage::NotifyEvent = parse(raw, "DamageNotify")?;
                ServerEvent::Damage {
                    drawable: e.drawable,
                    area: e.area,
                }
            }
            EventKind::ShapeNotify => {
                let e: shape::NotifyEvent = parse(raw, "ShapeNotify")?;
                ServerEvent::Shape {
                    window: e.affected_window,
                }
            }
            EventKind::Unknown(code) => ServerEvent::Unknown { code },
        };

        Ok(event)
    }

    /// The window the event is about, if any
    pub fn window(&self) -> Option<WindowId> {
        match *self {
            ServerEvent::Create { window, .. }
            | ServerEvent::Destroy { window }
            | ServerEvent::Reparent { window, .. }
            | ServerEvent::ConfigureRequest { window, .. }
            | ServerEvent::Configure { window, .. }
            | ServerEvent::MapRequest { window }
            | ServerEvent::Map { window }
            | ServerEvent::Unmap { window }
            | ServerEvent::Property { window, .. }
            | ServerEvent::Shape { window } => Some(window),
            ServerEvent::Damage { drawable, .. } => Some(drawable),
            ServerEvent::Error { .. } | ServerEvent::Unknown { .. } => None,
        }
    }
}

/// Raw event builders shared by the dispatcher tests
#[cfg(test)]
pub(crate) mod raw {
    use x11rb::protocol::xproto::{
        ConfigureNotifyEvent, CreateNotifyEvent, Property, PropertyNotifyEvent, Rectangle,
        CONFIGURE_NOTIFY_EVENT, CREATE_NOTIFY_EVENT, PROPERTY_NOTIFY_EVENT,
    };
    use x11rb::protocol::damage::{self, ReportLevel};

    use crate::server::WindowId;
    use crate::testing::ROOT;

    pub fn create(window: WindowId, x: i16, y: i16, width: u16, height: u16) -> [u8; 32] {
        (&CreateNotifyEvent {
            response_type: CREATE_NOTIFY_EVENT,
            sequence: 1,
            parent: ROOT,
            window,
            x,
            y,
            width,
            height,
            border_width: 0,
            override_redirect: false,
        })
            .into()
    }

    pub fn configure(window: WindowId, above: WindowId, width: u16, height: u16) -> [u8; 32] {
        (&ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 2,
            event: ROOT,
            window,
            above_sibling: above,
            x: 30,
            y: 40,
            width,
            height,
            border_width: 1,
            override_redirect: false,
        })
            .into()
    }

    pub fn property(window: WindowId, atom: u32) -> [u8; 32] {
        (&PropertyNotifyEvent {
            response_type: PROPERTY_NOTIFY_EVENT,
            sequence: 3,
            window,
            atom,
            time: 0,
            state: Property::NEW_VALUE,
        })
            .into()
    }

    pub fn damage(base: u8, drawable: WindowId, area: Rectangle) -> [u8; 32] {
        (&damage::NotifyEvent {
            response_type: base + damage::NOTIFY_EVENT,
            level: ReportLevel::NON_EMPTY,
            sequence: 4,
            drawable,
            damage: 0x0060_0000,
            timestamp: 0,
            area,
            geometry: area,
        })
            .into()
    }
}
