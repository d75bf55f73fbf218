//! Session-owned workout collection and its persistence.

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::{
    error::StoreError,
    models::{
        decode_collection, encode_collection, Coordinates, Workout, WorkoutFields, WorkoutKind,
    },
    storage::KeyValueStore,
};

/// Key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "workouts";
/// Appended to the storage key to keep a copy of a payload that failed to decode.
pub const CORRUPT_SUFFIX: &str = "-corrupt";

/// Lifecycle of a store within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has been read from persistence yet.
    Empty,
    /// The collection mirrors persistence and accepts new workouts.
    Loaded,
    /// Everything was cleared; load again to start a new session.
    Reset,
}

/// Summary of a [`WorkoutStore::load_from_persistence`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    /// Entries reconstructed as running or cycling workouts.
    pub restored: usize,
    /// Entries kept as unrecognised records.
    pub unrecognized: usize,
}

/// Result of a successful [`WorkoutStore::add_workout`].
#[derive(Debug)]
pub struct Added<'a> {
    /// The workout that was appended.
    pub workout: &'a Workout,
    /// Set when the workout was kept in memory but could not be persisted.
    pub warning: Option<StoreError>,
}

/// Owns the ordered workouts of a session and keeps the medium in sync.
pub struct WorkoutStore<S> {
    storage: S,
    key: String,
    workouts: Vec<Workout>,
    state: SessionState,
    writes_suspended: bool,
}

impl<S: KeyValueStore> WorkoutStore<S> {
    /// Build a store over `storage` using the default key.
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, DEFAULT_STORAGE_KEY)
    }

    /// Build a store over `storage` persisting under `key`.
    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            workouts: Vec::new(),
            state: SessionState::Empty,
            writes_suspended: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Key the collection is persisted under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Workouts in insertion order.
    pub fn workouts(&self) -> &[Workout] {
        &self.workouts
    }

    /// Iterate workouts in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Workout> {
        self.workouts.iter()
    }

    /// Number of workouts held.
    pub fn len(&self) -> usize {
        self.workouts.len()
    }

    /// Whether no workout is held.
    pub fn is_empty(&self) -> bool {
        self.workouts.is_empty()
    }

    /// Whether writes are skipped because the stored collection could not be
    /// read or backed up. The in-memory collection stays usable.
    pub fn writes_suspended(&self) -> bool {
        self.writes_suspended
    }

    /// Key holding the copy of an undecodable payload.
    pub fn backup_key(&self) -> String {
        format!("{}{CORRUPT_SUFFIX}", self.key)
    }

    /// Borrow the persistence medium.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Read the persisted collection and replace the in-memory one with it.
    ///
    /// An absent key is an empty collection. The session counts as loaded
    /// even when the medium cannot be read or the payload cannot be decoded,
    /// so new workouts can still be recorded; in that case the collection is
    /// empty and the error returned. An unreadable medium suspends writes for
    /// the session, and an undecodable payload is copied to
    /// [`Self::backup_key`] before anything overwrites it.
    pub fn load_from_persistence(&mut self) -> Result<LoadReport, StoreError> {
        if self.state == SessionState::Loaded {
            return Err(StoreError::AlreadyLoaded);
        }

        self.workouts.clear();
        self.state = SessionState::Loaded;
        self.writes_suspended = false;

        let payload = match self.storage.get(&self.key) {
            Ok(payload) => payload,
            Err(source) => {
                warn!(
                    key = %self.key,
                    err = %source,
                    "stored workouts unreadable; writes suspended"
                );
                self.writes_suspended = true;
                return Err(StoreError::Storage {
                    operation: "read stored workouts",
                    source,
                });
            }
        };

        let Some(payload) = payload else {
            info!(key = %self.key, "no stored workouts; starting empty");
            return Ok(LoadReport::default());
        };

        let workouts = match decode_collection(&payload) {
            Ok(workouts) => workouts,
            Err(source) => {
                self.back_up_payload(&payload);
                return Err(StoreError::Decode {
                    operation: "decode stored workouts",
                    source,
                });
            }
        };
        let unrecognized = workouts
            .iter()
            .filter(|workout| matches!(workout, Workout::Unknown(_)))
            .count();
        let report = LoadReport {
            restored: workouts.len() - unrecognized,
            unrecognized,
        };
        if report.unrecognized > 0 {
            warn!(
                unrecognized = report.unrecognized,
                "stored workouts contain unrecognised entries"
            );
        }
        self.workouts = workouts;
        info!(key = %self.key, restored = report.restored, "stored workouts loaded");
        Ok(report)
    }

    fn back_up_payload(&mut self, payload: &str) {
        let backup_key = self.backup_key();
        match self.storage.set(&backup_key, payload) {
            Ok(()) => warn!(
                key = %self.key,
                backup = %backup_key,
                "undecodable workouts backed up"
            ),
            Err(err) => {
                warn!(
                    key = %self.key,
                    %err,
                    "undecodable workouts could not be backed up; writes suspended"
                );
                self.writes_suspended = true;
            }
        }
    }

    /// Validate, build, append and persist a new workout.
    ///
    /// Invalid input leaves the collection untouched. A failed write keeps
    /// the workout in memory and is reported through [`Added::warning`].
    pub fn add_workout(
        &mut self,
        kind: WorkoutKind,
        fields: WorkoutFields,
        coordinates: Coordinates,
    ) -> Result<Added<'_>, StoreError> {
        if self.state != SessionState::Loaded {
            return Err(StoreError::NotLoaded);
        }

        let workout = Workout::create(kind, fields, coordinates)?;
        debug!(kind = kind.tag(), id = ?workout.id(), "workout created");
        self.workouts.push(workout);

        let warning = match self.persist() {
            Ok(()) => None,
            Err(err) => {
                warn!(%err, "workout kept in memory only");
                Some(err)
            }
        };
        let Some(workout) = self.workouts.last() else {
            unreachable!("a workout was appended above");
        };
        Ok(Added { workout, warning })
    }

    /// Overwrite the persisted collection with the in-memory one.
    ///
    /// Fails without touching the medium while writes are suspended.
    pub fn persist(&mut self) -> Result<(), StoreError> {
        if self.writes_suspended {
            return Err(StoreError::Storage {
                operation: "write workouts",
                source: anyhow!(
                    "stored workouts were not loaded intact, changes are kept in memory only"
                ),
            });
        }
        let payload = encode_collection(&self.workouts).map_err(|source| StoreError::Decode {
            operation: "encode workouts",
            source,
        })?;
        self.storage
            .set(&self.key, &payload)
            .map_err(|source| StoreError::Storage {
                operation: "write workouts",
                source,
            })?;
        debug!(key = %self.key, total = self.workouts.len(), "workouts persisted");
        Ok(())
    }

    /// Find a workout by identifier.
    pub fn find_by_id(&self, id: &str) -> Option<&Workout> {
        self.workouts
            .iter()
            .find(|workout| workout.id() == Some(id))
    }

    /// Find a workout by identifier and count the selection.
    pub fn select(&mut self, id: &str) -> Option<&Workout> {
        let workout = self
            .workouts
            .iter_mut()
            .find(|workout| workout.id() == Some(id))?;
        workout.record_interaction();
        Some(&*workout)
    }

    /// Delete the persisted collection and empty the session.
    ///
    /// The in-memory collection is only dropped once the medium confirmed
    /// the removal.
    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        self.storage
            .remove(&self.key)
            .map_err(|source| StoreError::Storage {
                operation: "remove stored workouts",
                source,
            })?;
        let dropped = self.workouts.len();
        self.workouts.clear();
        self.state = SessionState::Reset;
        self.writes_suspended = false;
        info!(key = %self.key, dropped, "all workouts cleared");
        Ok(())
    }
}
