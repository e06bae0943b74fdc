//! Renderer connection
//!
//! [`IpcConsumer`] forwards window lifecycle and redraw requests to the
//! renderer process as framed JSON. [`CommandReader`] reads the renderer's
//! commands back off the same socket.

use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use vitrine_ipc::{
    CompositorEvent, ContentId, FrameReader, FramedMessage, InputEvent, MAX_FRAME_LEN, Rect,
    RendererCommand,
};
use x11rb::protocol::xproto::Rectangle;

use crate::consumer::{Consumer, Geometry};
use crate::input::{InputKind, SyntheticInput};
use crate::server::{Atom, DisplayServer, PixmapId, VisualId, WindowId};
use crate::wm::Session;

const READ_CHUNK: usize = 4096;

/// Outbox size at which a renderer that stopped reading is given up on
pub const DEFAULT_MAX_PENDING: usize = 8 * MAX_FRAME_LEN;

/// Which windows the renderer wants to see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptPolicy {
    pub accept_override_redirect: bool,
    /// Smallest width and height worth compositing
    pub min_size: u16,
}

impl Default for AcceptPolicy {
    fn default() -> Self {
        Self {
            accept_override_redirect: true,
            min_size: 1,
        }
    }
}

impl AcceptPolicy {
    pub fn accepts(&self, override_redirect: bool, width: u16, height: u16) -> bool {
        if override_redirect && !self.accept_override_redirect {
            return false;
        }
        width >= self.min_size && height >= self.min_size
    }
}

/// Consumer that streams events to the renderer over a non-blocking socket.
///
/// Frames that do not fit in the socket buffer wait in an outbox until
/// [`IpcConsumer::flush`] is called on writability. The first write error is
/// kept and stops further sends; the event loop picks it up with
/// [`IpcConsumer::take_error`]. An outbox that grows past its limit counts
/// as a write error.
pub struct IpcConsumer<W: Write> {
    stream: W,
    policy: AcceptPolicy,
    next_content: ContentId,
    outbox: Vec<u8>,
    max_pending: usize,
    error: Option<io::Error>,
}

impl<W: Write> IpcConsumer<W> {
    pub fn new(stream: W, policy: AcceptPolicy) -> Self {
        Self {
            stream,
            policy,
            next_content: 1,
            outbox: Vec::new(),
            max_pending: DEFAULT_MAX_PENDING,
            error: None,
        }
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.stream
    }

    /// Bytes still waiting for the socket
    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Write as much of the outbox as the socket accepts
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.outbox.is_empty() {
            match self.stream.write(&self.outbox) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn send(&mut self, event: CompositorEvent) {
        if self.error.is_some() {
            return;
        }

        match FramedMessage::new(&event) {
            Ok(frame) => self.outbox.extend_from_slice(&frame.encode()),
            Err(e) => {
                warn!("Failed to serialize {:?}: {}", event, e);
                return;
            }
        }

        if let Err(e) = self.flush() {
            warn!("Renderer write failed: {}", e);
            self.error = Some(e);
            return;
        }

        if self.outbox.len() > self.max_pending {
            warn!(
                "Renderer is not reading, {} bytes pending (limit {})",
                self.outbox.len(),
                self.max_pending
            );
            self.error = Some(io::Error::other(format!(
                "renderer stalled with {} bytes pending",
                self.outbox.len()
            )));
        }
    }
}

fn rect(r: Rectangle) -> Rect {
    Rect {
        x: r.x,
        y: r.y,
        width: r.width,
        height: r.height,
    }
}

impl<W: Write> Consumer for IpcConsumer<W> {
    type Content = ContentId;

    fn window_created(
        &mut self,
        window: WindowId,
        override_redirect: bool,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    ) -> Option<ContentId> {
        if !self.policy.accepts(override_redirect, width, height) {
            debug!(
                "Renderer policy rejects 0x{:x} ({}x{}, override_redirect={})",
                window, width, height, override_redirect
            );
            return None;
        }

        let content = self.next_content;
        self.next_content += 1;
        self.send(CompositorEvent::WindowCreated {
            content,
            window,
            override_redirect,
            x,
            y,
            width,
            height,
        });
        Some(content)
    }

    fn window_destroyed(&mut self, content: &ContentId) {
        self.send(CompositorEvent::WindowDestroyed { content: *content });
    }

    fn window_mapped(&mut self, content: &ContentId) {
        self.send(CompositorEvent::WindowMapped { content: *content });
    }

    fn window_unmapped(&mut self, content: &ContentId) {
        self.send(CompositorEvent::WindowUnmapped { content: *content });
    }

    fn window_configured(
        &mut self,
        content: &ContentId,
        geometry: Geometry,
        above: Option<&ContentId>,
    ) {
        self.send(CompositorEvent::WindowConfigured {
            content: *content,
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            border_width: geometry.border_width,
            above: above.copied(),
        });
    }

    fn property_changed(&mut self, content: &ContentId, atom: Atom) {
        self.send(CompositorEvent::PropertyChanged {
            content: *content,
            atom,
        });
    }

    fn redraw(&mut self, content: &ContentId, pixmap: PixmapId, visual: VisualId, dirty: Rectangle) {
        self.send(CompositorEvent::Redraw {
            content: *content,
            pixmap,
            visual,
            rect: rect(dirty),
        });
    }
}

/// Reassembles renderer commands from non-blocking reads
#[derive(Debug, Default)]
pub struct CommandReader {
    frames: FrameReader,
    closed: bool,
}

impl CommandReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the renderer has closed its end
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read until the source would block and return every complete command
    pub fn read_from<R: Read>(&mut self, source: &mut R) -> Result<Vec<RendererCommand>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match source.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(n) => self.frames.push(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read from renderer"),
            }
        }

        let mut commands = Vec::new();
        while let Some(frame) = self
            .frames
            .next_frame()
            .context("Renderer protocol error")?
        {
            match FramedMessage::decode::<RendererCommand>(&frame) {
                Ok(command) => commands.push(command),
                Err(e) => warn!("Ignoring malformed renderer command: {}", e),
            }
        }
        Ok(commands)
    }
}

impl From<InputEvent> for SyntheticInput {
    fn from(event: InputEvent) -> Self {
        let (kind, position, state, time) = match event {
            InputEvent::ButtonPress {
                button,
                position,
                state,
                time,
            } => (InputKind::ButtonPress { button }, position, state, time),
            InputEvent::ButtonRelease {
                button,
                position,
                state,
                time,
            } => (InputKind::ButtonRelease { button }, position, state, time),
            InputEvent::Motion {
                position,
                state,
                time,
            } => (InputKind::Motion, position, state, time),
            InputEvent::Enter { position, time } => (InputKind::Enter, position, 0, time),
            InputEvent::Leave { position, time } => (InputKind::Leave, position, 0, time),
        };

        SyntheticInput {
            kind,
            x: position.x,
            y: position.y,
            root_x: position.root_x,
            root_y: position.root_y,
            state,
            time,
        }
    }
}

impl<S: DisplayServer, C: Consumer> Session<S, C> {
    pub fn apply_command(&mut self, command: RendererCommand) -> Result<()> {
        debug!("Renderer command: {:?}", command);
        match command {
            RendererCommand::ShowOverlay => self.show_overlay(),
            RendererCommand::HideOverlay => self.hide_overlay(),
            RendererCommand::InjectInput { window, input } => {
                self.inject_input(window, input.into())?;
                Ok(())
            }
        }
    }
}
