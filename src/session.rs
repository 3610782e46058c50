//! State of an interactive session: which screen is active, what the
//! dashboard started from, and the curve editor's working copy.

use log::info;

use crate::{
    config::Mode,
    curve_editor::{CurveDraft, DraftPoint, PointId, SPEED_STEP, TEMP_STEP},
    error::{EditError, StorageError},
    fan_curve::{Curve, CurveStore},
};

/// Speed a device gets when cycled from Auto into Manual.
pub const DEFAULT_MANUAL_SPEED: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    Editor,
}

/// Stack of mutually exclusive screens. Only the top one receives input;
/// popping it resumes the one below with its state untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenStack {
    screens: Vec<Screen>,
}

impl ScreenStack {
    pub fn new(root: Screen) -> Self {
        Self {
            screens: vec![root],
        }
    }

    pub fn current(&self) -> Option<Screen> {
        self.screens.last().copied()
    }

    pub fn enter(&mut self, screen: Screen) {
        self.screens.push(screen);
    }

    /// Leaves the top screen and returns the one now active, if any.
    pub fn leave(&mut self) -> Option<Screen> {
        self.screens.pop();
        self.current()
    }

    pub fn depth(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }
}

/// Next mode in the Auto -> Manual -> Curve -> Auto cycle.
pub fn cycle_mode(mode: Mode) -> Mode {
    match mode {
        Mode::Auto => Mode::Manual {
            speed: DEFAULT_MANUAL_SPEED,
        },
        Mode::Manual { .. } => Mode::Curve,
        Mode::Curve => Mode::Auto,
    }
}

/// Dashboard bookkeeping. Mode changes are written through immediately;
/// the modes seen on entry are kept so the session can be discarded.
#[derive(Debug, Clone)]
pub struct DashboardSession {
    selected: u32,
    initial: Vec<Mode>,
    dirty: bool,
}

impl DashboardSession {
    pub fn new(initial: Vec<Mode>) -> Self {
        Self {
            selected: 0,
            initial,
            dirty: false,
        }
    }

    pub fn device_count(&self) -> u32 {
        u32::try_from(self.initial.len()).unwrap_or(u32::MAX)
    }

    pub fn selected(&self) -> u32 {
        self.selected
    }

    /// Selects `gpu`; returns `false` when it does not exist.
    pub fn select(&mut self, gpu: u32) -> bool {
        if gpu < self.device_count() {
            self.selected = gpu;
            true
        } else {
            false
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Modes to write back when the session is discarded.
    pub fn initial_modes(&self) -> &[Mode] {
        &self.initial
    }
}

/// Curve editor working copy.
///
/// Nothing reaches disk until [`save`](Self::save); dropping the session
/// discards every change.
#[derive(Debug, Clone)]
pub struct EditorSession {
    draft: CurveDraft,
    selected: Option<PointId>,
    dirty: bool,
}

impl EditorSession {
    /// Opens the stored curve, or the preset when none is stored.
    pub fn open(store: &CurveStore) -> Self {
        let curve = store.load().unwrap_or_else(Curve::preset);
        Self::from_curve(&curve)
    }

    pub fn from_curve(curve: &Curve) -> Self {
        let draft = CurveDraft::from_curve(curve);
        let selected = draft.first();
        Self {
            draft,
            selected,
            dirty: false,
        }
    }

    pub fn draft(&self) -> &CurveDraft {
        &self.draft
    }

    pub fn selected(&self) -> Option<PointId> {
        self.selected
    }

    pub fn selected_point(&self) -> Option<&DraftPoint> {
        self.selected.and_then(|id| self.draft.get(id))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn select_next(&mut self) {
        if let Some(id) = self.selected.and_then(|id| self.draft.next(id)) {
            self.selected = Some(id);
        }
    }

    pub fn select_prev(&mut self) {
        if let Some(id) = self.selected.and_then(|id| self.draft.prev(id)) {
            self.selected = Some(id);
        }
    }

    /// Adds a point next to the selection and selects it.
    pub fn add(&mut self) -> Result<(), EditError> {
        let id = self.draft.add_point(self.selected)?;
        self.selected = Some(id);
        self.dirty = true;
        Ok(())
    }

    /// Deletes the selected point; the point that took its place is selected.
    pub fn delete(&mut self) -> Result<bool, EditError> {
        let id = self.selected.ok_or(EditError::NoSelection)?;
        let pos = self.draft.position(id).ok_or(EditError::NoSelection)?;
        if !self.draft.delete_point(id) {
            return Ok(false);
        }
        let pos = pos.min(self.draft.len().saturating_sub(1));
        self.selected = self.draft.points().get(pos).map(|p| p.id);
        self.dirty = true;
        Ok(true)
    }

    /// Moves the selected point one step left (`-1`) or right (`1`).
    pub fn step_temperature(&mut self, direction: i32) -> Result<(), EditError> {
        let id = self.selected.ok_or(EditError::NoSelection)?;
        let moved = self.draft.nudge_temperature(id, direction * TEMP_STEP)?;
        self.dirty |= moved;
        Ok(())
    }

    /// Raises (`1`) or lowers (`-1`) the selected point's speed by one step.
    pub fn step_speed(&mut self, direction: i32) -> Result<(), EditError> {
        let id = self.selected.ok_or(EditError::NoSelection)?;
        self.draft.nudge_speed(id, direction * SPEED_STEP)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_temperature(&mut self, temp: i32) -> Result<bool, EditError> {
        let id = self.selected.ok_or(EditError::NoSelection)?;
        let moved = self.draft.set_temperature(id, temp)?;
        self.dirty |= moved;
        Ok(moved)
    }

    pub fn set_speed(&mut self, speed: i32) -> Result<(), EditError> {
        let id = self.selected.ok_or(EditError::NoSelection)?;
        self.draft.set_speed(id, speed)?;
        self.dirty = true;
        Ok(())
    }

    /// Replaces the working copy with the preset curve.
    pub fn reset(&mut self) {
        self.draft = CurveDraft::from_curve(&Curve::preset());
        self.selected = self.draft.first();
        self.dirty = true;
    }

    /// Commits the working copy.
    pub fn save(&mut self, store: &CurveStore) -> Result<Curve, StorageError> {
        let curve = self.draft.to_curve();
        store.persist(&curve)?;
        self.dirty = false;
        info!("Fan curve saved ({} points)", curve.len());
        Ok(curve)
    }
}
