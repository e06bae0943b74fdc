//! In-memory display server and recording consumer for unit tests

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use anyhow::Result;
use x11rb::protocol::xproto::{EventMask, Rectangle};

use crate::consumer::{Consumer, Geometry};
use crate::server::{
    Atom, DamageId, DisplayServer, Extension, ExtensionPresence, MapState, PixmapId, ShapeKind,
    SyncErrors, VisualId, WindowAttributes, WindowId, WindowKind,
};

pub const ROOT: WindowId = 0x1e3;
pub const OVERLAY: WindowId = 0x2a0;
pub const VISUAL: VisualId = 0x21;
pub const DAMAGE_BASE: u8 = 91;
pub const SHAPE_BASE: u8 = 64;

/// Error code the fake reports when substructure redirect is contested
const BAD_ACCESS: u8 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateManagerWindow(WindowId),
    SetSelectionOwner { owner: WindowId, selection: Atom },
    SelectRootInput(EventMask),
    GrabServer,
    UngrabServer,
    QueryChildren(WindowId),
    SetOverrideRedirect(WindowId, bool),
    Reparent { window: WindowId, parent: WindowId },
    SetShape { window: WindowId, kind: ShapeKind, rects: Vec<Rectangle> },
    Redirect(WindowId),
    Unredirect(WindowId),
    SelectWindowInput(WindowId, EventMask),
    CreateDamage { window: WindowId, damage: DamageId },
    DestroyDamage(DamageId),
    SubtractDamage(DamageId),
    NamePixmap { window: WindowId, pixmap: PixmapId },
    FreePixmap(PixmapId),
    MoveResize { window: WindowId, x: i16, y: i16, width: u16, height: u16 },
    MapRaised(WindowId),
    SendEvent { window: WindowId, mask: EventMask, event: [u8; 32] },
}

pub fn attrs(map_state: MapState, x: i16, y: i16, width: u16, height: u16) -> WindowAttributes {
    WindowAttributes {
        kind: WindowKind::InputOutput,
        override_redirect: false,
        x,
        y,
        width,
        height,
        border_width: 0,
        visual: VISUAL,
        map_state,
        root: ROOT,
    }
}

pub fn viewable(x: i16, y: i16, width: u16, height: u16) -> WindowAttributes {
    attrs(MapState::Viewable, x, y, width, height)
}

pub fn unmapped(x: i16, y: i16, width: u16, height: u16) -> WindowAttributes {
    attrs(MapState::Unmapped, x, y, width, height)
}

pub fn input_only() -> WindowAttributes {
    WindowAttributes {
        kind: WindowKind::InputOnly,
        ..viewable(0, 0, 1, 1)
    }
}

pub struct FakeServer {
    extensions: RefCell<HashMap<Extension, ExtensionPresence>>,
    atoms: RefCell<HashMap<String, Atom>>,
    owners: RefCell<HashMap<Atom, WindowId>>,
    contested: RefCell<HashSet<String>>,
    windows: RefCell<HashMap<WindowId, WindowAttributes>>,
    children: RefCell<Vec<WindowId>>,
    overlay: Cell<WindowId>,
    deny_redirect: Cell<bool>,
    next_id: Cell<u32>,
    grab_depth: Cell<u32>,
    calls: RefCell<Vec<Call>>,
}

impl FakeServer {
    pub fn new() -> Self {
        let presence = |first_event, major_version, minor_version| ExtensionPresence {
            first_event,
            major_version,
            minor_version,
        };
        let extensions = HashMap::from([
            (Extension::Composite, presence(0, 0, 4)),
            (Extension::Render, presence(0, 0, 11)),
            (Extension::Damage, presence(DAMAGE_BASE, 1, 1)),
            (Extension::XFixes, presence(87, 5, 0)),
            (Extension::Shape, presence(SHAPE_BASE, 1, 1)),
        ]);

        Self {
            extensions: RefCell::new(extensions),
            atoms: RefCell::new(HashMap::new()),
            owners: RefCell::new(HashMap::new()),
            contested: RefCell::new(HashSet::new()),
            windows: RefCell::new(HashMap::new()),
            children: RefCell::new(Vec::new()),
            overlay: Cell::new(OVERLAY),
            deny_redirect: Cell::new(false),
            next_id: Cell::new(0x0060_0000),
            grab_depth: Cell::new(0),
            calls: RefCell::new(Vec::new()),
        }
    }

    // -- setup ---------------------------------------------------------------

    pub fn remove_extension(&self, ext: Extension) {
        self.extensions.borrow_mut().remove(&ext);
    }

    pub fn set_extension(&self, ext: Extension, presence: ExtensionPresence) {
        self.extensions.borrow_mut().insert(ext, presence);
    }

    /// Another client keeps winning this selection
    pub fn contest_selection(&self, name: &str) {
        self.contested.borrow_mut().insert(name.to_string());
    }

    /// Another window manager already holds substructure redirect on the root
    pub fn deny_substructure_redirect(&self) {
        self.deny_redirect.set(true);
    }

    pub fn set_overlay(&self, overlay: WindowId) {
        self.overlay.set(overlay);
    }

    /// Add a window; it also becomes a child of the root
    pub fn add_window(&self, window: WindowId, attrs: WindowAttributes) {
        self.windows.borrow_mut().insert(window, attrs);
        self.children.borrow_mut().push(window);
    }

    /// Add a window that is not a child of the root
    pub fn add_nested_window(&self, window: WindowId, attrs: WindowAttributes) {
        self.windows.borrow_mut().insert(window, attrs);
    }

    pub fn set_map_state(&self, window: WindowId, map_state: MapState) {
        if let Some(attrs) = self.windows.borrow_mut().get_mut(&window) {
            attrs.map_state = map_state;
        }
    }

    pub fn set_size(&self, window: WindowId, width: u16, height: u16) {
        if let Some(attrs) = self.windows.borrow_mut().get_mut(&window) {
            attrs.width = width;
            attrs.height = height;
        }
    }

    pub fn remove_window(&self, window: WindowId) {
        self.windows.borrow_mut().remove(&window);
        self.children.borrow_mut().retain(|&w| w != window);
    }

    // -- inspection ----------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn grab_depth(&self) -> u32 {
        self.grab_depth.get()
    }

    pub fn is_grabbed(&self) -> bool {
        self.grab_depth.get() > 0
    }

    pub fn atom(&self, name: &str) -> Option<Atom> {
        self.atoms.borrow().get(name).copied()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn generate_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

impl DisplayServer for FakeServer {
    fn root(&self) -> WindowId {
        ROOT
    }

    fn screen_size(&self) -> (u16, u16) {
        (1920, 1080)
    }

    fn query_extension(&self, ext: Extension) -> Result<Option<ExtensionPresence>> {
        Ok(self.extensions.borrow().get(&ext).copied())
    }

    fn create_manager_window(&self) -> Result<WindowId> {
        let id = self.generate_id();
        self.record(Call::CreateManagerWindow(id));
        Ok(id)
    }

    fn intern_atom(&self, name: &str) -> Result<Atom> {
        let mut atoms = self.atoms.borrow_mut();
        let next = 300 + atoms.len() as Atom;
        Ok(*atoms.entry(name.to_string()).or_insert(next))
    }

    fn set_selection_owner(&self, owner: WindowId, selection: Atom) -> Result<()> {
        self.record(Call::SetSelectionOwner { owner, selection });
        let name = self
            .atoms
            .borrow()
            .iter()
            .find(|&(_, &atom)| atom == selection)
            .map(|(name, _)| name.clone());
        let contested = name.is_some_and(|n| self.contested.borrow().contains(&n));
        let winner = if contested { 0xdead } else { owner };
        self.owners.borrow_mut().insert(selection, winner);
        Ok(())
    }

    fn selection_owner(&self, selection: Atom) -> Result<WindowId> {
        Ok(self.owners.borrow().get(&selection).copied().unwrap_or(0))
    }

    fn select_root_input(&self, mask: EventMask) -> Result<SyncErrors> {
        self.record(Call::SelectRootInput(mask));
        if self.deny_redirect.get() && mask.contains(EventMask::SUBSTRUCTURE_REDIRECT) {
            return Ok(SyncErrors::single(BAD_ACCESS));
        }
        Ok(SyncErrors::clean())
    }

    fn grab_server(&self) -> Result<()> {
        let depth = self.grab_depth.get();
        if depth == 0 {
            self.record(Call::GrabServer);
        }
        self.grab_depth.set(depth + 1);
        Ok(())
    }

    fn ungrab_server(&self) -> Result<()> {
        let depth = self.grab_depth.get();
        assert!(depth > 0, "ungrab without grab");
        self.grab_depth.set(depth - 1);
        if depth == 1 {
            self.record(Call::UngrabServer);
        }
        Ok(())
    }

    fn query_children(&self, window: WindowId) -> Result<Vec<WindowId>> {
        self.record(Call::QueryChildren(window));
        Ok(self.children.borrow().clone())
    }

    fn overlay_window(&self) -> Result<WindowId> {
        Ok(self.overlay.get())
    }

    fn set_override_redirect(&self, window: WindowId, enabled: bool) -> Result<()> {
        self.record(Call::SetOverrideRedirect(window, enabled));
        Ok(())
    }

    fn reparent(&self, window: WindowId, parent: WindowId, _x: i16, _y: i16) -> Result<()> {
        self.record(Call::Reparent { window, parent });
        Ok(())
    }

    fn set_shape_region(
        &self,
        window: WindowId,
        kind: ShapeKind,
        rects: &[Rectangle],
    ) -> Result<()> {
        self.record(Call::SetShape {
            window,
            kind,
            rects: rects.to_vec(),
        });
        Ok(())
    }

    fn window_attributes(&self, window: WindowId) -> Result<Option<WindowAttributes>> {
        Ok(self.windows.borrow().get(&window).copied())
    }

    fn redirect_window(&self, window: WindowId) -> Result<()> {
        self.record(Call::Redirect(window));
        Ok(())
    }

    fn unredirect_window(&self, window: WindowId) -> Result<()> {
        self.record(Call::Unredirect(window));
        Ok(())
    }

    fn select_window_input(&self, window: WindowId, mask: EventMask) -> Result<()> {
        self.record(Call::SelectWindowInput(window, mask));
        Ok(())
    }

    fn create_damage(&self, window: WindowId) -> Result<DamageId> {
        let damage = self.generate_id();
        self.record(Call::CreateDamage { window, damage });
        Ok(damage)
    }

    fn destroy_damage(&self, damage: DamageId) -> Result<()> {
        self.record(Call::DestroyDamage(damage));
        Ok(())
    }

    fn subtract_damage(&self, damage: DamageId) -> Result<()> {
        self.record(Call::SubtractDamage(damage));
        Ok(())
    }

    fn name_window_pixmap(&self, window: WindowId) -> Result<PixmapId> {
        let pixmap = self.generate_id();
        self.record(Call::NamePixmap { window, pixmap });
        Ok(pixmap)
    }

    fn free_pixmap(&self, pixmap: PixmapId) -> Result<()> {
        self.record(Call::FreePixmap(pixmap));
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
        self.record(Call::MoveResize {
            window,
            x,
            y,
            width,
            height,
        });
        Ok(())
    }

    fn map_raised(&self, window: WindowId) -> Result<()> {
        self.record(Call::MapRaised(window));
        Ok(())
    }

    fn send_event(&self, window: WindowId, mask: EventMask, event: [u8; 32]) -> Result<()> {
        self.record(Call::SendEvent {
            window,
            mask,
            event,
        });
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Created {
        window: WindowId,
        override_redirect: bool,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    },
    Destroyed(u64),
    Mapped(u64),
    Unmapped(u64),
    Configured {
        content: u64,
        geometry: Geometry,
        above: Option<u64>,
    },
    Property {
        content: u64,
        atom: Atom,
    },
    Redraw {
        content: u64,
        pixmap: PixmapId,
        visual: VisualId,
        dirty: Rectangle,
    },
}

/// Accepts every window unless told otherwise; content ids start at 1
#[derive(Debug, Default)]
pub struct RecordingConsumer {
    next: u64,
    rejected: HashSet<WindowId>,
    pub records: Vec<Record>,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&mut self, window: WindowId) {
        self.rejected.insert(window);
    }

    pub fn take(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }
}

impl Consumer for RecordingConsumer {
    type Content = u64;

    fn window_created(
        &mut self,
        window: WindowId,
        override_redirect: bool,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    ) -> Option<u64> {
        self.records.push(Record::Created {
            window,
            override_redirect,
            x,
            y,
            width,
            height,
        });
        if self.rejected.contains(&window) {
            return None;
        }
        self.next += 1;
        Some(self.next)
    }

    fn window_destroyed(&mut self, content: &u64) {
        self.records.push(Record::Destroyed(*content));
    }

    fn window_mapped(&mut self, content: &u64) {
        self.records.push(Record::Mapped(*content));
    }

    fn window_unmapped(&mut self, content: &u64) {
        self.records.push(Record::Unmapped(*content));
    }

    fn window_configured(&mut self, content: &u64, geometry: Geometry, above: Option<&u64>) {
        self.records.push(Record::Configured {
            content: *content,
            geometry,
            above: above.copied(),
        });
    }

    fn property_changed(&mut self, content: &u64, atom: Atom) {
        self.records.push(Record::Property {
            content: *content,
            atom,
        });
    }

    fn redraw(&mut self, content: &u64, pixmap: PixmapId, visual: VisualId, dirty: Rectangle) {
        self.records.push(Record::Redraw {
            content: *content,
            pixmap,
            visual,
            dirty,
        });
    }
}
