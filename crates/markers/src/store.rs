use runtime::{Event, EventBus, WriteQueue};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::MarkerError;
use crate::model::{Marker, MarkerChange, MarkerId};
use crate::snapshot;
use crate::surface::PersistenceSurface;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Ready,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub writes_ok: u64,
    pub write_failures: u64,
    /// Snapshots that were replaced by a newer one before reaching storage.
    pub superseded: u64,
}

/// Authoritative in-memory marker collection mirrored into a
/// [`PersistenceSurface`].
///
/// Every mutation rewrites the full snapshot. A failed write is logged and
/// kept pending; memory is never rolled back. Only one store may own a given
/// storage key.
#[derive(Debug)]
pub struct MarkerStore<S: PersistenceSurface> {
    surface: S,
    config: StoreConfig,
    state: StoreState,
    markers: Vec<Marker>,
    revision: u64,
    writes: WriteQueue<String>,
    stats: PersistStats,
    changes: EventBus<MarkerChange>,
}

impl<S: PersistenceSurface> MarkerStore<S> {
    pub fn new(surface: S, config: StoreConfig) -> Self {
        let changes = EventBus::with_max_len(config.change_log_len);
        Self {
            surface,
            config,
            state: StoreState::Uninitialized,
            markers: Vec::new(),
            revision: 0,
            writes: WriteQueue::new(),
            stats: PersistStats::default(),
            changes,
        }
    }

    /// `new` followed by `initialize`.
    pub fn open(surface: S, config: StoreConfig) -> Self {
        let mut store = Self::new(surface, config);
        store.initialize();
        store
    }

    /// Loads the persisted snapshot and makes the store ready.
    ///
    /// Read and parse problems are logged and leave an empty collection; a
    /// corrupt snapshot is copied to [`StoreConfig::corrupt_backup_key`]
    /// first. Calls after the first are no-ops.
    pub fn initialize(&mut self) {
        if self.state == StoreState::Ready {
            debug!("marker store already initialized");
            return;
        }

        let key = self.config.storage_key.clone();
        let markers = match self.surface.read(&key) {
            Ok(None) => Vec::new(),
            Ok(Some(raw)) => match snapshot::decode(&raw, &self.config) {
                Ok(decoded) => {
                    for d in &decoded.dropped {
                        warn!(key = %key, index = d.index, "dropping stored marker: {}", d.reason);
                    }
                    decoded.markers
                }
                Err(e) => {
                    warn!(key = %key, "{e}; starting with no markers");
                    self.backup_corrupt(&raw);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(key = %key, "marker snapshot read failed: {e}; starting with no markers");
                Vec::new()
            }
        };

        self.markers = markers;
        self.state = StoreState::Ready;
        info!(key = %key, count = self.markers.len(), "marker store ready");
        self.changes.emit(MarkerChange::Loaded {
            count: self.markers.len(),
        });
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Current collection in insertion order; empty until initialized.
    pub fn list(&self) -> &[Marker] {
        &self.markers
    }

    pub fn get(&self, id: &MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| &m.id == id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Bumped once per applied mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn changes(&self) -> &[Event<MarkerChange>] {
        self.changes.events()
    }

    pub fn changes_since(&self, seq: u64) -> &[Event<MarkerChange>] {
        self.changes.since(seq)
    }

    pub fn drain_changes(&mut self) -> Vec<Event<MarkerChange>> {
        self.changes.drain()
    }

    pub fn add(
        &mut self,
        lng: f64,
        lat: f64,
        label: Option<&str>,
        note: Option<&str>,
    ) -> Result<Marker, MarkerError> {
        self.ensure_ready()?;
        let pos = foundation::LngLat::new(lng, lat)?;

        let marker = Marker {
            id: self.fresh_id(),
            lng: pos.lng(),
            lat: pos.lat(),
            label: self.config.normalize_label(label),
            note: self.config.clamp_note(note.unwrap_or("")),
        };
        self.markers.push(marker.clone());
        debug!(id = %marker.id, lng, lat, "marker added");
        self.commit(MarkerChange::Added(marker.id.clone()));
        Ok(marker)
    }

    /// Replaces the note, truncating it to the configured length.
    pub fn update_note(&mut self, id: &MarkerId, note: &str) -> Result<&Marker, MarkerError> {
        self.ensure_ready()?;
        let idx = self.index_of(id)?;
        self.markers[idx].note = self.config.clamp_note(note);
        self.commit(MarkerChange::NoteUpdated(id.clone()));
        Ok(&self.markers[idx])
    }

    /// Replaces the label; a blank label resets to the placeholder.
    pub fn rename(&mut self, id: &MarkerId, label: &str) -> Result<&Marker, MarkerError> {
        self.ensure_ready()?;
        let idx = self.index_of(id)?;
        self.markers[idx].label = self.config.normalize_label(Some(label));
        self.commit(MarkerChange::Renamed(id.clone()));
        Ok(&self.markers[idx])
    }

    /// Removes the marker if present. Deleting an unknown id is a no-op and
    /// returns `false`.
    pub fn delete(&mut self, id: &MarkerId) -> Result<bool, MarkerError> {
        self.ensure_ready()?;
        let Ok(idx) = self.index_of(id) else {
            debug!(id = %id, "delete of unknown marker ignored");
            return Ok(false);
        };
        self.markers.remove(idx);
        self.commit(MarkerChange::Deleted(id.clone()));
        Ok(true)
    }

    /// Removes every marker; returns how many were removed.
    pub fn clear(&mut self) -> Result<usize, MarkerError> {
        self.ensure_ready()?;
        let count = self.markers.len();
        self.markers.clear();
        self.commit(MarkerChange::Cleared { count });
        Ok(count)
    }

    /// Writes the pending snapshot, if any.
    pub fn flush(&mut self) -> Result<(), MarkerError> {
        let result = self.drain_writes();
        self.stats.superseded = self.writes.superseded();
        result
    }

    pub fn has_pending_write(&self) -> bool {
        !self.writes.is_idle()
    }

    pub fn persist_stats(&self) -> PersistStats {
        self.stats
    }

    fn ensure_ready(&self) -> Result<(), MarkerError> {
        match self.state {
            StoreState::Ready => Ok(()),
            StoreState::Uninitialized => Err(MarkerError::NotReady),
        }
    }

    fn index_of(&self, id: &MarkerId) -> Result<usize, MarkerError> {
        self.markers
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| MarkerError::NotFound(id.clone()))
    }

    fn fresh_id(&self) -> MarkerId {
        loop {
            let id = MarkerId::random();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }

    fn commit(&mut self, change: MarkerChange) {
        self.revision += 1;
        self.changes.emit(change);
        match snapshot::encode(&self.markers) {
            Ok(raw) => {
                self.writes.push(raw);
            }
            Err(e) => {
                warn!("{e}");
                self.stats.write_failures += 1;
                return;
            }
        }
        if let Err(e) = self.flush() {
            warn!(key = %self.config.storage_key, "{e}; in-memory markers kept");
        }
    }

    fn drain_writes(&mut self) -> Result<(), MarkerError> {
        let attempts = self.config.write_attempts.max(1);
        while let Some((seq, raw)) = self.writes.take() {
            let mut last_err = None;
            for attempt in 1..=attempts {
                match self.surface.write(&self.config.storage_key, &raw) {
                    Ok(()) => {
                        last_err = None;
                        break;
                    }
                    Err(e) => {
                        debug!(attempt, "marker snapshot write attempt failed: {e}");
                        last_err = Some(e);
                    }
                }
            }

            match last_err {
                None => {
                    self.writes.complete(seq);
                    self.stats.writes_ok += 1;
                }
                Some(e) => {
                    self.writes.fail(seq, raw);
                    self.stats.write_failures += 1;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn backup_corrupt(&mut self, raw: &str) {
        let backup_key = self.config.corrupt_backup_key();
        match self.surface.write(&backup_key, raw) {
            Ok(()) => info!(key = %backup_key, "corrupt marker snapshot backed up"),
            Err(e) => warn!(key = %backup_key, "corrupt marker snapshot backup failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::{MarkerStore, StoreState};
    use crate::config::{DEFAULT_LABEL, StoreConfig};
    use crate::error::{MarkerError, SurfaceError};
    use crate::model::{MarkerChange, MarkerId};
    use crate::surface::{InMemorySurface, PersistenceSurface};

    const KEY: &str = "userMarkers";

    fn ready(surface: &mut InMemorySurface) -> MarkerStore<&mut InMemorySurface> {
        MarkerStore::open(surface, StoreConfig::default())
    }

    /// Surface whose writes can be switched off to simulate quota errors.
    #[derive(Debug, Default)]
    struct FlakySurface {
        inner: InMemorySurface,
        failing: bool,
        write_calls: u32,
    }

    impl PersistenceSurface for FlakySurface {
        fn read(&self, key: &str) -> Result<Option<String>, SurfaceError> {
            self.inner.read(key)
        }

        fn write(&mut self, key: &str, value: &str) -> Result<(), SurfaceError> {
            self.write_calls += 1;
            if self.failing {
                return Err(SurfaceError::Io("QuotaExceededError".to_string()));
            }
            self.inner.write(key, value)
        }
    }

    #[test]
    fn add_returns_marker_with_defaults() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);

        let m = store.add(2.2945, 48.8584, Some("Paris Bistro"), None).unwrap();
        assert_eq!(m.lng, 2.2945);
        assert_eq!(m.lat, 48.8584);
        assert_eq!(m.label, "Paris Bistro");
        assert_eq!(m.note, "");
        assert_eq!(store.len(), 1);
        assert_eq!(store.list()[0], m);

        let unnamed = store.add(0.0, 0.0, None, Some("hello")).unwrap();
        assert_eq!(unnamed.label, DEFAULT_LABEL);
        assert_eq!(unnamed.note, "hello");
    }

    #[test]
    fn invalid_coordinates_leave_collection_unchanged() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);
        store.add(2.2945, 48.8584, Some("Paris Bistro"), None).unwrap();
        let before = store.list().to_vec();
        let rev = store.revision();

        for (lng, lat) in [
            (999.0, 0.0),
            (-180.01, 0.0),
            (0.0, 90.5),
            (0.0, -91.0),
            (f64::NAN, 0.0),
            (0.0, f64::INFINITY),
        ] {
            let err = store.add(lng, lat, None, None).unwrap_err();
            assert!(matches!(err, MarkerError::InvalidCoordinates { .. }));
        }
        assert_eq!(store.list(), before.as_slice());
        assert_eq!(store.revision(), rev);
    }

    #[test]
    fn boundary_coordinates_are_accepted() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);
        for (lng, lat) in [(-180.0, -90.0), (180.0, 90.0), (-180.0, 90.0), (180.0, -90.0)] {
            store.add(lng, lat, None, None).unwrap();
        }
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn ids_are_fresh_and_unique() {
        let mut surface = InMemorySurface::with_value(
            KEY,
            r#"[{"id":"legacy-1","lng":0,"lat":0,"label":"a","note":""}]"#,
        );
        let mut store = ready(&mut surface);
        let mut seen: HashSet<MarkerId> = store.list().iter().map(|m| m.id.clone()).collect();
        for i in 0..200 {
            let before = store.len();
            let m = store.add((i % 360) as f64 - 180.0, 0.0, None, None).unwrap();
            assert_eq!(store.len(), before + 1);
            assert!(seen.insert(m.id), "id reused");
        }
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);
        let a = store.add(1.0, 1.0, Some("a"), None).unwrap();
        let b = store.add(2.0, 2.0, Some("b"), None).unwrap();
        let c = store.add(3.0, 3.0, Some("c"), None).unwrap();
        store.delete(&b.id).unwrap();
        let d = store.add(4.0, 4.0, Some("d"), None).unwrap();

        let labels: Vec<&str> = store.list().iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "c", "d"]);
        assert_eq!(store.list()[0].id, a.id);
        assert_eq!(store.list()[1].id, c.id);
        assert_eq!(store.list()[2].id, d.id);
    }

    #[test]
    fn update_note_keeps_position_and_fields() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);
        store.add(1.0, 1.0, Some("first"), None).unwrap();
        let target = store.add(2.0, 2.0, Some("second"), Some("old")).unwrap();
        store.add(3.0, 3.0, Some("third"), None).unwrap();

        let updated = store.update_note(&target.id, "new note").unwrap().clone();
        assert_eq!(updated.note, "new note");
        assert_eq!(updated.label, "second");
        assert_eq!((updated.lng, updated.lat), (2.0, 2.0));
        assert_eq!(store.list()[1], updated);
    }

    #[test]
    fn update_note_truncates_to_500_chars() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);
        let m = store.add(0.0, 0.0, None, None).unwrap();

        let long: String = "é".repeat(650);
        let note = store.update_note(&m.id, &long).unwrap().note.clone();
        assert_eq!(note.chars().count(), 500);
        assert!(long.starts_with(&note));

        let exact = "n".repeat(500);
        assert_eq!(store.update_note(&m.id, &exact).unwrap().note, exact);

        let added = store.add(0.0, 0.0, None, Some(&"z".repeat(501))).unwrap();
        assert_eq!(added.note.chars().count(), 500);
    }

    #[test]
    fn update_note_on_unknown_id_is_not_found() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);
        store.add(0.0, 0.0, None, None).unwrap();
        let before = store.list().to_vec();

        let missing = MarkerId::new("nope");
        assert_eq!(
            store.update_note(&missing, "x").unwrap_err(),
            MarkerError::NotFound(missing.clone())
        );
        assert_eq!(store.list(), before.as_slice());
    }

    #[test]
    fn rename_resets_blank_labels() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);
        let m = store.add(0.0, 0.0, Some("Old"), Some("keep")).unwrap();

        assert_eq!(store.rename(&m.id, "New").unwrap().label, "New");
        let renamed = store.rename(&m.id, "  ").unwrap();
        assert_eq!(renamed.label, DEFAULT_LABEL);
        assert_eq!(renamed.note, "keep");
        assert!(matches!(
            store.rename(&MarkerId::new("nope"), "x"),
            Err(MarkerError::NotFound(_))
        ));
    }

    #[test]
    fn delete_is_idempotent() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);
        let m = store.add(0.0, 0.0, None, None).unwrap();
        let rev = store.revision();

        assert_eq!(store.delete(&m.id), Ok(true));
        assert!(store.is_empty());
        assert_eq!(store.delete(&m.id), Ok(false));
        assert_eq!(store.revision(), rev + 1);
    }

    #[test]
    fn clear_persists_empty_array() {
        let mut surface = InMemorySurface::new();
        {
            let mut store = ready(&mut surface);
            for i in 0..5 {
                store.add(i as f64, i as f64, None, None).unwrap();
            }
            assert_eq!(store.clear(), Ok(5));
            assert!(store.list().is_empty());
        }
        assert_eq!(surface.get(KEY), Some("[]"));
    }

    #[test]
    fn every_mutation_writes_full_snapshot() {
        let mut surface = InMemorySurface::new();
        let a_id;
        {
            let mut store = ready(&mut surface);
            let a = store.add(1.5, -2.5, Some("A"), None).unwrap();
            store.update_note(&a.id, "note").unwrap();
            a_id = a.id;
        }
        let expected = format!(
            r#"[{{"id":"{a_id}","lng":1.5,"lat":-2.5,"label":"A","note":"note"}}]"#
        );
        assert_eq!(surface.get(KEY), Some(expected.as_str()));
    }

    #[test]
    fn reopen_round_trips_collection() {
        let mut surface = InMemorySurface::new();
        let original = {
            let mut store = ready(&mut surface);
            store.add(2.2945, 48.8584, Some("Paris Bistro"), None).unwrap();
            let b = store.add(-73.9857, 40.7484, Some("Empire"), Some("views")).unwrap();
            store.add(139.6917, 35.6895, None, None).unwrap();
            store.update_note(&b.id, "great views").unwrap();
            store.list().to_vec()
        };

        let reopened = ready(&mut surface);
        assert_eq!(reopened.list(), original.as_slice());
    }

    #[test]
    fn mutations_before_initialize_fail_fast() {
        let mut surface = InMemorySurface::new();
        let mut store = MarkerStore::new(&mut surface, StoreConfig::default());
        assert_eq!(store.state(), StoreState::Uninitialized);
        assert!(store.list().is_empty());

        assert_eq!(store.add(0.0, 0.0, None, None).unwrap_err(), MarkerError::NotReady);
        let id = MarkerId::new("x");
        assert_eq!(store.update_note(&id, "n").unwrap_err(), MarkerError::NotReady);
        assert_eq!(store.rename(&id, "n").unwrap_err(), MarkerError::NotReady);
        assert_eq!(store.delete(&id).unwrap_err(), MarkerError::NotReady);
        assert_eq!(store.clear().unwrap_err(), MarkerError::NotReady);

        store.initialize();
        assert_eq!(store.state(), StoreState::Ready);
        assert!(store.add(0.0, 0.0, None, None).is_ok());
    }

    #[test]
    fn initialize_runs_once() {
        let mut surface = InMemorySurface::with_value(
            KEY,
            r#"[{"id":"a","lng":1,"lat":1,"label":"A","note":""}]"#,
        );
        let mut store = ready(&mut surface);
        store.add(0.0, 0.0, None, None).unwrap();
        store.initialize();
        assert_eq!(store.len(), 2);

        let loads = store
            .changes()
            .iter()
            .filter(|e| matches!(e.payload, MarkerChange::Loaded { .. }))
            .count();
        assert_eq!(loads, 1);
    }

    #[test]
    fn corrupt_snapshot_starts_empty_and_is_backed_up() {
        let mut surface = InMemorySurface::with_value(KEY, "{definitely not json");
        {
            let store = ready(&mut surface);
            assert_eq!(store.state(), StoreState::Ready);
            assert!(store.is_empty());
        }
        assert_eq!(surface.get("userMarkers.corrupt"), Some("{definitely not json"));
        // The original value is only replaced by the next mutation.
        assert_eq!(surface.get(KEY), Some("{definitely not json"));

        let mut store = ready(&mut surface);
        store.add(0.0, 0.0, None, None).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn non_array_snapshot_is_treated_as_corrupt() {
        let mut surface = InMemorySurface::with_value(KEY, r#"{"markers":[]}"#);
        let store = ready(&mut surface);
        assert!(store.is_empty());
    }

    #[test]
    fn partially_valid_snapshot_keeps_good_records() {
        let mut surface = InMemorySurface::with_value(
            KEY,
            r#"[{"id":"good","lng":5,"lat":5,"label":"G","note":""},{"id":"bad","lng":"x"}]"#,
        );
        let store = ready(&mut surface);
        assert_eq!(store.len(), 1);
        assert_eq!(store.list()[0].id, MarkerId::new("good"));
    }

    #[test]
    fn write_failure_keeps_memory_and_retries_later() {
        let mut surface = FlakySurface {
            failing: true,
            ..FlakySurface::default()
        };
        let mut store = MarkerStore::open(&mut surface, StoreConfig::default());

        let m = store.add(10.0, 20.0, Some("kept"), None).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.has_pending_write());
        assert_eq!(store.persist_stats().write_failures, 1);

        assert!(matches!(
            store.flush(),
            Err(MarkerError::PersistenceWriteFailed(_))
        ));

        store.surface.failing = false;
        store.flush().unwrap();
        assert!(!store.has_pending_write());
        assert_eq!(store.persist_stats().writes_ok, 1);

        drop(store);
        let stored = surface.inner.get(KEY).unwrap();
        assert!(stored.contains(m.id.as_str()));
    }

    #[test]
    fn newest_snapshot_wins_after_failures() {
        let mut surface = FlakySurface {
            failing: true,
            ..FlakySurface::default()
        };
        let mut store = MarkerStore::open(&mut surface, StoreConfig::default());
        store.add(1.0, 1.0, Some("one"), None).unwrap();
        store.add(2.0, 2.0, Some("two"), None).unwrap();
        store.surface.failing = false;
        store.add(3.0, 3.0, Some("three"), None).unwrap();
        assert!(!store.has_pending_write());
        assert!(store.persist_stats().superseded >= 1);
        drop(store);

        let reopened = MarkerStore::open(&mut surface, StoreConfig::default());
        let labels: Vec<&str> = reopened.list().iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["one", "two", "three"]);
    }

    #[test]
    fn write_attempts_are_bounded() {
        let mut surface = FlakySurface {
            failing: true,
            ..FlakySurface::default()
        };
        let config = StoreConfig {
            write_attempts: 3,
            ..StoreConfig::default()
        };
        let mut store = MarkerStore::open(&mut surface, config);
        store.add(0.0, 0.0, None, None).unwrap();
        drop(store);
        assert_eq!(surface.write_calls, 3);
    }

    #[test]
    fn change_log_stays_bounded_without_draining() {
        let mut surface = InMemorySurface::new();
        let config = StoreConfig {
            change_log_len: 8,
            ..StoreConfig::default()
        };
        let mut store = MarkerStore::open(&mut surface, config);
        let m = store.add(0.0, 0.0, None, None).unwrap();
        for i in 0..500 {
            store.update_note(&m.id, &format!("note {i}")).unwrap();
        }

        assert_eq!(store.changes().len(), 8);
        let last = store.changes().last().unwrap();
        assert_eq!(last.seq, 502);
        assert_eq!(last.payload, MarkerChange::NoteUpdated(m.id.clone()));
        assert_eq!(store.changes_since(500).len(), 2);
    }

    #[test]
    fn changes_are_reported_in_order() {
        let mut surface = InMemorySurface::new();
        let mut store = ready(&mut surface);
        let seen = store.changes().last().map(|e| e.seq).unwrap_or(0);

        let a = store.add(0.0, 0.0, None, None).unwrap();
        store.update_note(&a.id, "n").unwrap();
        store.delete(&a.id).unwrap();
        store.clear().unwrap();

        let kinds: Vec<MarkerChange> = store
            .changes_since(seen)
            .iter()
            .map(|e| e.payload.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                MarkerChange::Added(a.id.clone()),
                MarkerChange::NoteUpdated(a.id.clone()),
                MarkerChange::Deleted(a.id.clone()),
                MarkerChange::Cleared { count: 0 },
            ]
        );
        assert_eq!(store.drain_changes().len(), 5);
        assert!(store.changes().is_empty());
    }
}
