//! Synthetic pointer input
//!
//! Pointer events the renderer receives on its composited copy of a window
//! are replayed to the real window with SendEvent.

use anyhow::Result;
use tracing::debug;
use x11rb::protocol::xproto::{
    BUTTON_PRESS_EVENT, BUTTON_RELEASE_EVENT, ButtonPressEvent, ENTER_NOTIFY_EVENT,
    EnterNotifyEvent, EventMask, KeyButMask, LEAVE_NOTIFY_EVENT, MOTION_NOTIFY_EVENT, Motion,
    MotionNotifyEvent, NotifyDetail, NotifyMode,
};

use crate::consumer::Consumer;
use crate::server::{DisplayServer, WindowId};
use crate::wm::Session;

/// Bit of the crossing events' `same_screen_focus` byte
const SAME_SCREEN: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    ButtonPress { button: u8 },
    ButtonRelease { button: u8 },
    Motion,
    Enter,
    Leave,
}

/// One pointer event, in window and root coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticInput {
    pub kind: InputKind,
    pub x: i16,
    pub y: i16,
    pub root_x: i16,
    pub root_y: i16,
    /// Modifier and button state
    pub state: u16,
    pub time: u32,
}

impl SyntheticInput {
    fn pressed_buttons(&self) -> bool {
        let buttons = KeyButMask::BUTTON1
            | KeyButMask::BUTTON2
            | KeyButMask::BUTTON3
            | KeyButMask::BUTTON4
            | KeyButMask::BUTTON5;
        u16::from(buttons) & self.state != 0
    }

    /// Clients that selected this mask receive the event
    pub fn event_mask(&self) -> EventMask {
        match self.kind {
            InputKind::ButtonPress { .. } => EventMask::BUTTON_PRESS,
            InputKind::ButtonRelease { .. } => EventMask::BUTTON_RELEASE,
            InputKind::Motion => {
                let mut mask = EventMask::POINTER_MOTION | EventMask::POINTER_MOTION_HINT;
                if self.pressed_buttons() {
                    mask = mask
                        | EventMask::BUTTON1_MOTION
                        | EventMask::BUTTON2_MOTION
                        | EventMask::BUTTON3_MOTION
                        | EventMask::BUTTON4_MOTION
                        | EventMask::BUTTON5_MOTION
                        | EventMask::BUTTON_MOTION;
                }
                mask
            }
            InputKind::Enter => EventMask::ENTER_WINDOW,
            InputKind::Leave => EventMask::LEAVE_WINDOW,
        }
    }

    /// Wire form of the event, delivered to `window` on `root`
    pub fn encode(&self, window: WindowId, root: WindowId) -> [u8; 32] {
        let state = KeyButMask::from(self.state);

        match self.kind {
            InputKind::ButtonPress { button } | InputKind::ButtonRelease { button } => {
                let response_type = if matches!(self.kind, InputKind::ButtonPress { .. }) {
                    BUTTON_PRESS_EVENT
                } else {
                    BUTTON_RELEASE_EVENT
                };
                ButtonPressEvent {
                    response_type,
                    detail: button,
                    sequence: 0,
                    time: self.time,
                    root,
                    event: window,
                    child: x11rb::NONE,
                    root_x: self.root_x,
                    root_y: self.root_y,
                    event_x: self.x,
                    event_y: self.y,
                    state,
                    same_screen: true,
                }
                .into()
            }
            InputKind::Motion => MotionNotifyEvent {
                response_type: MOTION_NOTIFY_EVENT,
                detail: Motion::NORMAL,
                sequence: 0,
                time: self.time,
                root,
                event: window,
                child: x11rb::NONE,
                root_x: self.root_x,
                root_y: self.root_y,
                event_x: self.x,
                event_y: self.y,
                state,
                same_screen: true,
            }
            .into(),
            InputKind::Enter | InputKind::Leave => EnterNotifyEvent {
                response_type: if self.kind == InputKind::Enter {
                    ENTER_NOTIFY_EVENT
                } else {
                    LEAVE_NOTIFY_EVENT
                },
                detail: NotifyDetail::ANCESTOR,
                sequence: 0,
                time: self.time,
                root,
                event: window,
                child: x11rb::NONE,
                root_x: self.root_x,
                root_y: self.root_y,
                event_x: self.x,
                event_y: self.y,
                state,
                mode: NotifyMode::NORMAL,
                same_screen_focus: SAME_SCREEN,
            }
            .into(),
        }
    }
}

impl<S: DisplayServer, C: Consumer> Session<S, C> {
    /// Replay `input` to a tracked window; returns false if it is untracked
    pub fn inject_input(&self, window: WindowId, input: SyntheticInput) -> Result<bool> {
        let Some(entity) = self.registry.get(window) else {
            debug!("Dropping input for untracked window 0x{:x}", window);
            return Ok(false);
        };

        let root = entity.attrs().root;
        self.server
            .send_event(window, input.event_mask(), input.encode(window, root))?;
        Ok(true)
    }
}
