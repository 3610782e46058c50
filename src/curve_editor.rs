//! Point editing on a working copy of the fan curve.
//!
//! A [`CurveDraft`] keeps its points sorted by temperature with unique
//! temperatures, like [`Curve`], but every point also carries a [`PointId`]
//! that survives re-sorting. Callers hold on to the id of the selected point
//! instead of its position.

use crate::{
    error::EditError,
    fan_curve::{Curve, CurvePoint, MAX_CURVE_POINTS, SPEED_MAX, SPEED_MIN, TEMP_MAX, TEMP_MIN},
};

/// Temperature step for new points and arrow-key moves.
pub const TEMP_STEP: i32 = 5;
/// Speed step for arrow-key nudges.
pub const SPEED_STEP: i32 = 5;

const FIRST_POINT: (i32, i32) = (50, 50);

/// Stable identity of a draft point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftPoint {
    pub id: PointId,
    pub temperature: i32,
    pub speed: i32,
}

/// Editable copy of a [`Curve`].
#[derive(Debug, Clone, Default)]
pub struct CurveDraft {
    points: Vec<DraftPoint>,
    next_id: u32,
}

impl CurveDraft {
    pub fn from_curve(curve: &Curve) -> Self {
        let mut draft = Self::default();
        for p in curve.points() {
            draft.push(p.temperature, p.speed);
        }
        draft
    }

    pub fn to_curve(&self) -> Curve {
        Curve::from_points(self.points.iter().map(|p| CurvePoint {
            temperature: p.temperature,
            speed: p.speed,
        }))
    }

    pub fn points(&self) -> &[DraftPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, id: PointId) -> Option<&DraftPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Position of `id` in temperature order.
    pub fn position(&self, id: PointId) -> Option<usize> {
        self.points.iter().position(|p| p.id == id)
    }

    pub fn first(&self) -> Option<PointId> {
        self.points.first().map(|p| p.id)
    }

    /// Point after `id`, wrapping around.
    pub fn next(&self, id: PointId) -> Option<PointId> {
        let pos = self.position(id)?;
        Some(self.points[(pos + 1) % self.points.len()].id)
    }

    /// Point before `id`, wrapping around.
    pub fn prev(&self, id: PointId) -> Option<PointId> {
        let pos = self.position(id)?;
        let len = self.points.len();
        Some(self.points[(pos + len - 1) % len].id)
    }

    /// Inserts a point next to `selected` and returns its id.
    ///
    /// An empty draft gets a single (50, 50) point. Otherwise the new point
    /// sits halfway to the right neighbour, or one step right of the last
    /// point with the same speed. A temperature already in use is bumped
    /// upward until free; [`EditError::NoRoom`] when it reaches 100 without
    /// finding one.
    pub fn add_point(&mut self, selected: Option<PointId>) -> Result<PointId, EditError> {
        if self.points.len() >= MAX_CURVE_POINTS {
            return Err(EditError::Full {
                max: MAX_CURVE_POINTS,
            });
        }

        if self.points.is_empty() {
            return Ok(self.push(FIRST_POINT.0, FIRST_POINT.1));
        }

        let pos = selected
            .and_then(|id| self.position(id))
            .ok_or(EditError::NoSelection)?;
        let current = self.points[pos];

        let (mut temp, speed) = match self.points.get(pos + 1) {
            Some(right) => (
                (current.temperature + right.temperature).div_euclid(2),
                (current.speed + right.speed).div_euclid(2),
            ),
            None => ((current.temperature + TEMP_STEP).min(TEMP_MAX), current.speed),
        };

        while self.occupied(temp, None) && temp < TEMP_MAX {
            temp += 1;
        }
        if self.occupied(temp, None) {
            return Err(EditError::NoRoom);
        }

        Ok(self.push(temp, speed.clamp(SPEED_MIN, SPEED_MAX)))
    }

    /// Moves a point to `new_temp`, keeping its identity.
    ///
    /// The target is clamped to 0..=100 and then walked back toward the
    /// point's current temperature past any occupied one. Returns whether the
    /// point actually moved.
    pub fn move_point(&mut self, id: PointId, new_temp: i32) -> Result<bool, EditError> {
        let pos = self.position(id).ok_or(EditError::NoSelection)?;
        let old = self.points[pos].temperature;

        let mut temp = new_temp.clamp(TEMP_MIN, TEMP_MAX);
        while temp != old && self.occupied(temp, Some(id)) {
            temp += if temp > old { -1 } else { 1 };
        }

        if temp == old {
            return Ok(false);
        }
        self.points[pos].temperature = temp;
        self.sort();
        Ok(true)
    }

    /// Same as [`move_point`](Self::move_point).
    pub fn set_temperature(&mut self, id: PointId, temp: i32) -> Result<bool, EditError> {
        self.move_point(id, temp)
    }

    pub fn nudge_temperature(&mut self, id: PointId, delta: i32) -> Result<bool, EditError> {
        let current = self.get(id).ok_or(EditError::NoSelection)?.temperature;
        self.move_point(id, current.saturating_add(delta))
    }

    /// Overwrites a point's speed, clamped to the editable range.
    pub fn set_speed(&mut self, id: PointId, speed: i32) -> Result<bool, EditError> {
        let pos = self.position(id).ok_or(EditError::NoSelection)?;
        let speed = speed.clamp(SPEED_MIN, SPEED_MAX);
        let changed = self.points[pos].speed != speed;
        self.points[pos].speed = speed;
        Ok(changed)
    }

    pub fn nudge_speed(&mut self, id: PointId, delta: i32) -> Result<bool, EditError> {
        let current = self.get(id).ok_or(EditError::NoSelection)?.speed;
        self.set_speed(id, current.saturating_add(delta))
    }

    /// Removes a point. Refused while the draft has two points or fewer.
    pub fn delete_point(&mut self, id: PointId) -> bool {
        if self.points.len() <= 2 {
            return false;
        }
        match self.position(id) {
            Some(pos) => {
                self.points.remove(pos);
                true
            }
            None => false,
        }
    }

    fn occupied(&self, temp: i32, except: Option<PointId>) -> bool {
        self.points
            .iter()
            .any(|p| p.temperature == temp && Some(p.id) != except)
    }

    fn push(&mut self, temperature: i32, speed: i32) -> PointId {
        let id = PointId(self.next_id);
        self.next_id += 1;
        self.points.push(DraftPoint {
            id,
            temperature,
            speed,
        });
        self.sort();
        id
    }

    fn sort(&mut self) {
        self.points.sort_by_key(|p| p.temperature);
    }
}
