//! Flat record encoding and tag-driven reconstruction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::workout::{Cycling, Running, UnknownWorkout, Workout, WorkoutKind};

/// Name of the discriminant field in persisted records.
pub const KIND_FIELD: &str = "kind";

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum TaggedRef<'a> {
    Running(&'a Running),
    Cycling(&'a Cycling),
}

impl Workout {
    /// Flatten into the persisted record shape. Unrecognised records are
    /// returned exactly as they were read.
    pub fn to_record(&self) -> Result<Value, serde_json::Error> {
        match self {
            Workout::Running(run) => serde_json::to_value(TaggedRef::Running(run)),
            Workout::Cycling(ride) => serde_json::to_value(TaggedRef::Cycling(ride)),
            Workout::Unknown(unknown) => Ok(unknown.record().clone()),
        }
    }
}

/// Rebuild a typed workout from a plain record.
///
/// Stored derived fields are taken as-is. Records with a missing or unknown
/// tag, or that do not fit their tagged variant, come back as
/// [`Workout::Unknown`] instead of failing.
pub fn reconstruct(record: Value) -> Workout {
    let tag = record.get(KIND_FIELD).and_then(Value::as_str);
    let kind = match tag.map(str::parse::<WorkoutKind>) {
        Some(Ok(kind)) => kind,
        _ => {
            debug!(tag = ?tag, "keeping record with unrecognised kind");
            return Workout::Unknown(UnknownWorkout::new(record));
        }
    };

    let typed = match kind {
        WorkoutKind::Running => Running::deserialize(&record).map(Workout::Running),
        WorkoutKind::Cycling => Cycling::deserialize(&record).map(Workout::Cycling),
    };
    match typed {
        Ok(workout) => workout,
        Err(err) => {
            warn!(kind = kind.tag(), %err, "malformed workout record kept as unrecognised");
            Workout::Unknown(UnknownWorkout::new(record))
        }
    }
}

/// Serialise a whole collection into the persisted JSON array.
pub fn encode_collection(workouts: &[Workout]) -> Result<String, serde_json::Error> {
    let records = workouts
        .iter()
        .map(Workout::to_record)
        .collect::<Result<Vec<_>, _>>()?;
    serde_json::to_string(&records)
}

/// Parse a persisted JSON array and reconstruct every entry.
///
/// Only a payload that is not a JSON array fails; individual entries never do.
pub fn decode_collection(payload: &str) -> Result<Vec<Workout>, serde_json::Error> {
    let records: Vec<Value> = serde_json::from_str(payload)?;
    Ok(records.into_iter().map(reconstruct).collect())
}
