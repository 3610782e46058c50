//! Fan curve model: piecewise-linear temperature to fan-speed mapping.
//!
//! A [`Curve`] is a list of breakpoints kept sorted by temperature with no
//! duplicate temperatures. An empty curve is valid and means "no curve
//! configured": [`interpolate`] then falls back to the builtin default table.

use std::{collections::BTreeMap, fmt, fs, path::PathBuf};

use log::{debug, info};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};

use crate::{
    error::{CurveError, StorageError},
    storage,
};

/// Maximum number of breakpoints a curve may hold.
pub const MAX_CURVE_POINTS: usize = 20;

pub const TEMP_MIN: i32 = 0;
pub const TEMP_MAX: i32 = 100;

/// Lowest speed the interactive editor lets a point take.
pub const SPEED_MIN: i32 = 30;
pub const SPEED_MAX: i32 = 100;

/// Breakpoints of the builtin curve used when no curve is configured.
const DEFAULT_BREAKPOINTS: [(i32, i32); 6] =
    [(30, 30), (40, 40), (50, 55), (60, 65), (70, 85), (75, 100)];

/// Curve written by `curve reset` and offered to the editor when none exists.
const PRESET_POINTS: [(i32, i32); 6] =
    [(30, 30), (40, 40), (50, 55), (60, 65), (70, 85), (80, 100)];

/// A temperature/speed breakpoint.
///
/// # Example
///
/// ```
/// use nvfand::fan_curve::CurvePoint;
///
/// let point: CurvePoint = (45, 60).into(); // 45°C -> 60%
/// assert_eq!(point.temperature, 45);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurvePoint {
    pub temperature: i32,
    pub speed: i32,
}

impl From<(i32, i32)> for CurvePoint {
    fn from((temperature, speed): (i32, i32)) -> Self {
        Self { temperature, speed }
    }
}

/// What [`Curve::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Sorted, unique-temperature list of at most [`MAX_CURVE_POINTS`] points.
///
/// Persisted as a JSON object keyed by the decimal temperature:
///
/// ```json
/// { "30": 30, "60": 65, "80": 100 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Curve {
    points: Vec<CurvePoint>,
}

impl Curve {
    pub fn new() -> Self {
        Self::default()
    }

    /// The curve installed by a reset.
    pub fn preset() -> Self {
        Self::from_points(PRESET_POINTS.map(CurvePoint::from))
    }

    /// Builds a curve from unordered points.
    ///
    /// Points are sorted by temperature; on duplicate temperatures the last
    /// one wins, and only the [`MAX_CURVE_POINTS`] coolest points are kept.
    pub fn from_points(points: impl IntoIterator<Item = CurvePoint>) -> Self {
        let unique: BTreeMap<i32, i32> = points
            .into_iter()
            .map(|p| (p.temperature, p.speed))
            .collect();

        Self {
            points: unique
                .into_iter()
                .take(MAX_CURVE_POINTS)
                .map(CurvePoint::from)
                .collect(),
        }
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sets the speed at `temperature`, inserting a new point in order if
    /// none exists there.
    ///
    /// Inserting into a full curve fails with [`CurveError::Full`] and leaves
    /// the curve unchanged.
    pub fn upsert(&mut self, temperature: i32, speed: i32) -> Result<Upsert, CurveError> {
        match self
            .points
            .binary_search_by_key(&temperature, |p| p.temperature)
        {
            Ok(idx) => {
                self.points[idx].speed = speed;
                Ok(Upsert::Updated)
            }
            Err(_) if self.points.len() >= MAX_CURVE_POINTS => Err(CurveError::Full {
                max: MAX_CURVE_POINTS,
            }),
            Err(idx) => {
                self.points.insert(idx, CurvePoint { temperature, speed });
                Ok(Upsert::Inserted)
            }
        }
    }

    /// Speed for `temp` on this curve, see [`interpolate`].
    pub fn interpolate(&self, temp: i32) -> i32 {
        interpolate(temp, self)
    }
}

/// Computes the fan speed for `temp`.
///
/// An empty curve delegates to [`default_interpolate`]. Otherwise the speed
/// is clamped to the end points and linearly interpolated in between with
/// integer arithmetic truncating toward zero.
///
/// # Example
///
/// ```
/// use nvfand::fan_curve::{Curve, CurvePoint, interpolate};
///
/// let curve = Curve::from_points([(30, 30), (60, 65), (80, 100)].map(CurvePoint::from));
/// assert_eq!(interpolate(45, &curve), 47);
/// assert_eq!(interpolate(90, &curve), 100);
/// ```
pub fn interpolate(temp: i32, curve: &Curve) -> i32 {
    let (Some(first), Some(last)) = (curve.points.first(), curve.points.last()) else {
        return default_interpolate(temp);
    };

    if temp <= first.temperature {
        return first.speed;
    }
    if temp >= last.temperature {
        return last.speed;
    }

    curve
        .points
        .windows(2)
        .find(|w| temp >= w[0].temperature && temp < w[1].temperature)
        .map(|w| {
            let (lo, hi) = (w[0], w[1]);
            let span = i64::from(temp) - i64::from(lo.temperature);
            let rise = i64::from(hi.speed) - i64::from(lo.speed);
            let run = i64::from(hi.temperature) - i64::from(lo.temperature);
            let speed = i64::from(lo.speed) + span * rise / run;
            i32::try_from(speed).unwrap_or(last.speed)
        })
        .unwrap_or(last.speed)
}

/// Builtin curve used when no curve is configured.
///
/// Unlike [`interpolate`], each segment's slope is computed in `f32` and the
/// product truncated, which can differ by one from the integer rule.
pub fn default_interpolate(temp: i32) -> i32 {
    let (first_temp, first_speed) = DEFAULT_BREAKPOINTS[0];
    let (last_temp, last_speed) = DEFAULT_BREAKPOINTS[DEFAULT_BREAKPOINTS.len() - 1];

    if temp < first_temp {
        return first_speed;
    }
    if temp >= last_temp {
        return last_speed;
    }

    DEFAULT_BREAKPOINTS
        .windows(2)
        .find(|w| temp >= w[0].0 && temp < w[1].0)
        .map(|w| {
            let ((t0, s0), (t1, s1)) = (w[0], w[1]);
            let slope = (s1 - s0) as f32 / (t1 - t0) as f32;
            s0 + (slope * (temp - t0) as f32) as i32
        })
        .unwrap_or(last_speed)
}

impl Serialize for Curve {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.points.len()))?;
        for point in &self.points {
            map.serialize_entry(&point.temperature.to_string(), &point.speed)?;
        }
        map.end()
    }
}

/// Lenient reader: entries whose temperature is not an integer in
/// `0..=100`, or whose speed is not an integer, are skipped. Speeds are
/// clamped to `0..=100`.
impl<'de> Deserialize<'de> for Curve {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CurveVisitor;

        impl<'de> Visitor<'de> for CurveVisitor {
            type Value = Curve;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping temperatures to fan speeds")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Curve, A::Error> {
                let mut points = Vec::new();
                while let Some((key, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    let temperature = key
                        .trim()
                        .parse::<i32>()
                        .ok()
                        .filter(|t| (TEMP_MIN..=TEMP_MAX).contains(t));
                    let speed = value
                        .as_i64()
                        .map(|s| s.clamp(0, i64::from(SPEED_MAX)) as i32);
                    match (temperature, speed) {
                        (Some(temperature), Some(speed)) => {
                            points.push(CurvePoint { temperature, speed })
                        }
                        _ => debug!("Skipping malformed curve entry {key:?}: {value}"),
                    }
                }
                Ok(Curve::from_points(points))
            }
        }

        deserializer.deserialize_map(CurveVisitor)
    }
}

/// Durable home of the fan curve.
#[derive(Debug, Clone)]
pub struct CurveStore {
    path: PathBuf,
}

impl CurveStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Reads the persisted curve; `None` when the file is absent or corrupt.
    pub fn load(&self) -> Option<Curve> {
        let text = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&text) {
            Ok(curve) => Some(curve),
            Err(e) => {
                debug!("Ignoring unreadable curve {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Writes the whole curve atomically.
    pub fn persist(&self, curve: &Curve) -> Result<(), StorageError> {
        storage::write_json(&self.path, curve)
    }

    /// Sets one point of the persisted curve and writes it back.
    ///
    /// Starts from an empty curve when none is stored. Nothing is written
    /// when the curve is already full.
    pub fn upsert_point(&self, temperature: i32, speed: i32) -> Result<Upsert, CurveError> {
        let mut curve = self.load().unwrap_or_default();
        let outcome = curve.upsert(temperature, speed)?;
        self.persist(&curve)?;
        info!("Fan curve updated: {temperature}°C -> {speed}%");
        Ok(outcome)
    }

    /// Replaces the persisted curve with [`Curve::preset`].
    pub fn reset(&self) -> Result<Curve, StorageError> {
        let curve = Curve::preset();
        self.persist(&curve)?;
        info!("Fan curve reset to preset");
        Ok(curve)
    }
}
