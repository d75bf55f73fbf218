use std::{fmt, str::FromStr};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Coordinates;
use crate::error::InvalidInputError;

/// Number of trailing timestamp digits kept for a workout identifier.
const ID_DIGITS: usize = 10;

/// Discriminant selecting the concrete workout variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutKind {
    /// Running workout, carries cadence and pace.
    Running,
    /// Cycling workout, carries elevation gain and speed.
    Cycling,
}

impl WorkoutKind {
    /// Tag stored in the persisted `kind` field.
    pub fn tag(self) -> &'static str {
        match self {
            WorkoutKind::Running => "running",
            WorkoutKind::Cycling => "cycling",
        }
    }

    /// Capitalised label used in descriptions.
    pub fn label(self) -> &'static str {
        match self {
            WorkoutKind::Running => "Running",
            WorkoutKind::Cycling => "Cycling",
        }
    }

    /// The other kind; used by forms that switch between the two.
    pub fn toggled(self) -> Self {
        match self {
            WorkoutKind::Running => WorkoutKind::Cycling,
            WorkoutKind::Cycling => WorkoutKind::Running,
        }
    }
}

impl fmt::Display for WorkoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WorkoutKind {
    type Err = InvalidInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(WorkoutKind::Running),
            "cycling" => Ok(WorkoutKind::Cycling),
            _ => Err(InvalidInputError::UnknownKind(s.to_string())),
        }
    }
}

/// Numeric values collected by a form, before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkoutFields {
    /// Distance in kilometres.
    pub distance_km: f64,
    /// Duration in minutes.
    pub duration_min: f64,
    /// Cadence (steps/min) for running, elevation gain (m) for cycling.
    pub metric: f64,
}

impl WorkoutFields {
    /// Build from already numeric values.
    pub fn new(distance_km: f64, duration_min: f64, metric: f64) -> Self {
        Self {
            distance_km,
            duration_min,
            metric,
        }
    }

    /// Parse raw text inputs. Text that is not a number becomes NaN and is
    /// rejected later by validation.
    pub fn parse(distance: &str, duration: &str, metric: &str) -> Self {
        Self::new(
            parse_number(distance),
            parse_number(duration),
            parse_number(metric),
        )
    }
}

fn parse_number(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Fields shared by every workout variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutBase {
    id: String,
    created_at: DateTime<Utc>,
    distance_km: f64,
    duration_min: f64,
    coordinates: Coordinates,
    description: String,
    #[serde(default)]
    interaction_count: u32,
}

impl WorkoutBase {
    fn new(
        kind: WorkoutKind,
        created_at: DateTime<Utc>,
        distance_km: f64,
        duration_min: f64,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            id: id_from_timestamp(created_at),
            created_at,
            distance_km,
            duration_min,
            coordinates,
            description: describe(kind, created_at),
            interaction_count: 0,
        }
    }

    /// Session-unique (best effort) identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Distance in kilometres.
    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    /// Duration in minutes.
    pub fn duration_min(&self) -> f64 {
        self.duration_min
    }

    /// Where the workout was recorded.
    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    /// Label such as `Running on April 14`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// How many times the workout has been selected.
    pub fn interaction_count(&self) -> u32 {
        self.interaction_count
    }

    pub(crate) fn record_interaction(&mut self) {
        self.interaction_count = self.interaction_count.saturating_add(1);
    }
}

fn id_from_timestamp(created_at: DateTime<Utc>) -> String {
    let digits = created_at.timestamp_micros().unsigned_abs().to_string();
    let start = digits.len().saturating_sub(ID_DIGITS);
    digits[start..].to_string()
}

fn describe(kind: WorkoutKind, created_at: DateTime<Utc>) -> String {
    let local = created_at.with_timezone(&Local);
    format!("{} on {}", kind.label(), local.format("%B %-d"))
}

/// Running workout with cadence and derived pace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Running {
    #[serde(flatten)]
    base: WorkoutBase,
    cadence_spm: f64,
    pace_min_per_km: f64,
}

impl Running {
    /// Shared workout fields.
    pub fn base(&self) -> &WorkoutBase {
        &self.base
    }

    /// Steps per minute.
    pub fn cadence_spm(&self) -> f64 {
        self.cadence_spm
    }

    /// Minutes per kilometre, fixed at creation.
    pub fn pace_min_per_km(&self) -> f64 {
        self.pace_min_per_km
    }
}

/// Cycling workout with elevation gain and derived speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycling {
    #[serde(flatten)]
    base: WorkoutBase,
    elevation_gain_m: f64,
    speed_km_per_h: f64,
}

impl Cycling {
    /// Shared workout fields.
    pub fn base(&self) -> &WorkoutBase {
        &self.base
    }

    /// Metres climbed; may be zero or negative.
    pub fn elevation_gain_m(&self) -> f64 {
        self.elevation_gain_m
    }

    /// Kilometres per hour, fixed at creation.
    pub fn speed_km_per_h(&self) -> f64 {
        self.speed_km_per_h
    }
}

/// Persisted record whose kind was not recognised, or that failed to decode.
///
/// The raw record is kept so it survives the next write untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownWorkout {
    record: Value,
}

impl UnknownWorkout {
    pub(crate) fn new(record: Value) -> Self {
        Self { record }
    }

    /// Raw `kind` tag, if any.
    pub fn kind_tag(&self) -> Option<&str> {
        self.record.get(super::KIND_FIELD).and_then(Value::as_str)
    }

    /// Raw `id`, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.record.get("id").and_then(Value::as_str)
    }

    /// Raw `description`, if present and a string.
    pub fn description(&self) -> Option<&str> {
        self.record.get("description").and_then(Value::as_str)
    }

    /// Coordinates, when the record carries a well-formed pair.
    pub fn coordinates(&self) -> Option<Coordinates> {
        self.record
            .get("coordinates")
            .and_then(|value| serde_json::from_value::<Coordinates>(value.clone()).ok())
            .filter(Coordinates::is_finite)
    }

    /// The record exactly as it was read.
    pub fn record(&self) -> &Value {
        &self.record
    }
}

/// Any workout held by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Workout {
    /// A running workout.
    Running(Running),
    /// A cycling workout.
    Cycling(Cycling),
    /// A persisted record that could not be mapped onto a known kind.
    Unknown(UnknownWorkout),
}

impl Workout {
    /// Validate `fields` and build the variant selected by `kind`.
    pub fn create(
        kind: WorkoutKind,
        fields: WorkoutFields,
        coordinates: Coordinates,
    ) -> Result<Self, InvalidInputError> {
        match kind {
            WorkoutKind::Running => create_running(
                fields.distance_km,
                fields.duration_min,
                coordinates,
                fields.metric,
            )
            .map(Workout::Running),
            WorkoutKind::Cycling => create_cycling(
                fields.distance_km,
                fields.duration_min,
                coordinates,
                fields.metric,
            )
            .map(Workout::Cycling),
        }
    }

    /// Kind of a recognised workout.
    pub fn kind(&self) -> Option<WorkoutKind> {
        match self {
            Workout::Running(_) => Some(WorkoutKind::Running),
            Workout::Cycling(_) => Some(WorkoutKind::Cycling),
            Workout::Unknown(_) => None,
        }
    }

    /// Shared fields of a recognised workout.
    pub fn base(&self) -> Option<&WorkoutBase> {
        match self {
            Workout::Running(run) => Some(&run.base),
            Workout::Cycling(ride) => Some(&ride.base),
            Workout::Unknown(_) => None,
        }
    }

    fn base_mut(&mut self) -> Option<&mut WorkoutBase> {
        match self {
            Workout::Running(run) => Some(&mut run.base),
            Workout::Cycling(ride) => Some(&mut ride.base),
            Workout::Unknown(_) => None,
        }
    }

    /// Identifier, when one is known.
    pub fn id(&self) -> Option<&str> {
        match self {
            Workout::Unknown(unknown) => unknown.id(),
            _ => self.base().map(WorkoutBase::id),
        }
    }

    /// Coordinates, when they are known and well formed.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            Workout::Unknown(unknown) => unknown.coordinates(),
            _ => self.base().map(WorkoutBase::coordinates),
        }
    }

    /// Human-readable label.
    pub fn description(&self) -> &str {
        match self {
            Workout::Unknown(unknown) => unknown.description().unwrap_or("Unrecognised workout"),
            _ => self.base().map(WorkoutBase::description).unwrap_or_default(),
        }
    }

    pub(crate) fn record_interaction(&mut self) {
        if let Some(base) = self.base_mut() {
            base.record_interaction();
        }
    }
}

impl From<Running> for Workout {
    fn from(value: Running) -> Self {
        Workout::Running(value)
    }
}

impl From<Cycling> for Workout {
    fn from(value: Cycling) -> Self {
        Workout::Cycling(value)
    }
}

/// Validate and build a running workout stamped with the current time.
pub fn create_running(
    distance_km: f64,
    duration_min: f64,
    coordinates: Coordinates,
    cadence_spm: f64,
) -> Result<Running, InvalidInputError> {
    let distance_km = positive("distance", distance_km)?;
    let duration_min = positive("duration", duration_min)?;
    let cadence_spm = positive("cadence", cadence_spm)?;
    let coordinates = finite_coordinates(coordinates)?;

    let base = WorkoutBase::new(
        WorkoutKind::Running,
        Utc::now(),
        distance_km,
        duration_min,
        coordinates,
    );
    Ok(Running {
        base,
        cadence_spm,
        pace_min_per_km: duration_min / distance_km,
    })
}

/// Validate and build a cycling workout stamped with the current time.
///
/// Elevation gain only has to be finite; descents are recorded as negative gain.
pub fn create_cycling(
    distance_km: f64,
    duration_min: f64,
    coordinates: Coordinates,
    elevation_gain_m: f64,
) -> Result<Cycling, InvalidInputError> {
    let distance_km = positive("distance", distance_km)?;
    let duration_min = positive("duration", duration_min)?;
    let elevation_gain_m = finite("elevation gain", elevation_gain_m)?;
    let coordinates = finite_coordinates(coordinates)?;

    let base = WorkoutBase::new(
        WorkoutKind::Cycling,
        Utc::now(),
        distance_km,
        duration_min,
        coordinates,
    );
    Ok(Cycling {
        base,
        elevation_gain_m,
        speed_km_per_h: distance_km / (duration_min / 60.0),
    })
}

fn finite(field: &'static str, value: f64) -> Result<f64, InvalidInputError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InvalidInputError::NotFinite { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, InvalidInputError> {
    let value = finite(field, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(InvalidInputError::NotPositive { field, value })
    }
}

fn finite_coordinates(coordinates: Coordinates) -> Result<Coordinates, InvalidInputError> {
    finite("latitude", coordinates.latitude)?;
    finite("longitude", coordinates.longitude)?;
    Ok(coordinates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HERE: Coordinates = Coordinates::new(52.1, 4.3);

    #[test]
    fn running_pace_is_duration_over_distance() {
        let run = create_running(5.0, 30.0, HERE, 180.0).expect("valid run");
        assert_eq!(run.pace_min_per_km(), 6.0);
        assert_eq!(run.cadence_spm(), 180.0);
        assert_eq!(run.base().coordinates(), HERE);
        assert_eq!(run.base().interaction_count(), 0);

        for (distance, duration) in [(3.0, 17.5), (42.195, 201.0), (0.4, 2.0)] {
            let run = create_running(distance, duration, HERE, 170.0).expect("valid run");
            assert_eq!(run.pace_min_per_km(), duration / distance);
        }
    }

    #[test]
    fn cycling_speed_accepts_negative_elevation() {
        let ride = create_cycling(20.0, 60.0, HERE, -5.0).expect("valid ride");
        assert_eq!(ride.speed_km_per_h(), 20.0);
        assert_eq!(ride.elevation_gain_m(), -5.0);

        let flat = create_cycling(27.0, 95.0, HERE, 0.0).expect("zero gain is allowed");
        assert_eq!(flat.speed_km_per_h(), 27.0 / (95.0 / 60.0));
    }

    #[test]
    fn rejects_non_positive_and_non_finite_values() {
        assert_eq!(
            create_running(0.0, 30.0, HERE, 180.0).unwrap_err(),
            InvalidInputError::NotPositive {
                field: "distance",
                value: 0.0
            }
        );
        assert!(matches!(
            create_running(5.0, -1.0, HERE, 180.0),
            Err(InvalidInputError::NotPositive {
                field: "duration",
                ..
            })
        ));
        assert!(matches!(
            create_running(5.0, 30.0, HERE, 0.0),
            Err(InvalidInputError::NotPositive { field: "cadence", .. })
        ));
        assert!(matches!(
            create_running(f64::NAN, 30.0, HERE, 180.0),
            Err(InvalidInputError::NotFinite { field: "distance", .. })
        ));
        assert!(matches!(
            create_cycling(10.0, f64::INFINITY, HERE, 3.0),
            Err(InvalidInputError::NotFinite { field: "duration", .. })
        ));
        assert!(matches!(
            create_cycling(10.0, 30.0, HERE, f64::NEG_INFINITY),
            Err(InvalidInputError::NotFinite {
                field: "elevation gain",
                ..
            })
        ));
        assert!(matches!(
            create_cycling(10.0, 30.0, Coordinates::new(f64::NAN, 4.3), 3.0),
            Err(InvalidInputError::NotFinite { field: "latitude", .. })
        ));
    }

    #[test]
    fn description_names_kind_and_local_day() {
        let ride = create_cycling(12.0, 40.0, HERE, 80.0).expect("valid ride");
        let local = ride.base().created_at().with_timezone(&Local);
        let expected = format!("Cycling on {}", local.format("%B %-d"));
        assert_eq!(ride.base().description(), expected);
    }

    #[test]
    fn id_keeps_trailing_timestamp_digits() {
        let run = create_running(5.0, 30.0, HERE, 180.0).expect("valid run");
        let id = run.base().id();
        assert_eq!(id.len(), ID_DIGITS);
        assert!(id.chars().all(|ch| ch.is_ascii_digit()));
        let micros = run.base().created_at().timestamp_micros().to_string();
        assert!(micros.ends_with(id));
    }

    #[test]
    fn raw_fields_parse_or_become_nan() {
        let fields = WorkoutFields::parse(" 5 ", "30.5", "abc");
        assert_eq!(fields.distance_km, 5.0);
        assert_eq!(fields.duration_min, 30.5);
        assert!(fields.metric.is_nan());

        let err = Workout::create(WorkoutKind::Running, fields, HERE).unwrap_err();
        assert!(matches!(err, InvalidInputError::NotFinite { field: "cadence", .. }));
    }

    #[test]
    fn kind_parses_tags_case_insensitively() {
        assert_eq!("running".parse::<WorkoutKind>(), Ok(WorkoutKind::Running));
        assert_eq!(" Cycling ".parse::<WorkoutKind>(), Ok(WorkoutKind::Cycling));
        assert_eq!(
            "swimming".parse::<WorkoutKind>(),
            Err(InvalidInputError::UnknownKind("swimming".to_string()))
        );
        assert_eq!(WorkoutKind::Running.toggled(), WorkoutKind::Cycling);
    }

    #[test]
    fn selection_counter_increments() {
        let mut workout = Workout::from(create_running(5.0, 30.0, HERE, 180.0).expect("valid run"));
        workout.record_interaction();
        workout.record_interaction();
        assert_eq!(workout.base().map(WorkoutBase::interaction_count), Some(2));
    }
}
