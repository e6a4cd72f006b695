use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use shaderschema::{ComponentType, UniformRange, UniformSchema, UniformStyle};

use crate::debounce::{DebounceSettings, FlushOutcome};
use crate::error::PersistError;
use crate::pack::pack_into;
use crate::persist::{format_persisted, parse_persisted, LoadReport, PersistedEntry};
use crate::undo::{UndoEntry, UndoSink, UndoWindows};
use crate::variable::UniformVariable;

/// Side effects of a [`UniformStore::set_values`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOptions {
    /// Schedule the debounced refresh that redraws with the new values.
    /// The packed buffer goes stale whenever a value changes regardless.
    pub update_buffer: bool,
    /// Schedule a debounced write of the persisted uniform file.
    pub persist: bool,
    /// Open (or extend) the undo window for this name.
    pub record_undo: bool,
}

impl SetOptions {
    /// A user edit: everything on.
    pub const INTERACTIVE: Self = Self {
        update_buffer: true,
        persist: true,
        record_undo: true,
    };
    /// Undo/redo replay: persisted but not recorded again.
    pub const REPLAY: Self = Self {
        update_buffer: true,
        persist: true,
        record_undo: false,
    };
    /// Values restored from disk.
    pub const RESTORE: Self = Self {
        update_buffer: true,
        persist: false,
        record_undo: false,
    };
}

impl Default for SetOptions {
    fn default() -> Self {
        Self::INTERACTIVE
    }
}

/// The uniform variables of one schema plus their packed GPU bytes.
///
/// `mapping` and `variables` always agree; `variables` order is the buffer
/// layout order.
#[derive(Debug, Clone)]
pub struct UniformTable {
    mapping: HashMap<String, usize>,
    variables: Vec<UniformVariable>,
    dirty: bool,
    packed: Vec<u8>,
}

impl Default for UniformTable {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformTable {
    pub fn new() -> Self {
        let mut packed = Vec::new();
        pack_into(&[], &mut packed);
        Self {
            mapping: HashMap::new(),
            variables: Vec::new(),
            dirty: true,
            packed,
        }
    }

    /// Builds the table for `schema`, carrying values over from `previous`
    /// when name and component type match, otherwise from `persisted`.
    pub fn from_schema(
        schema: &UniformSchema,
        previous: &UniformTable,
        persisted: &[PersistedEntry],
    ) -> Self {
        let mut table = previous.clone();
        table.rebuild(schema, persisted);
        table
    }

    pub fn rebuild(&mut self, schema: &UniformSchema, persisted: &[PersistedEntry]) {
        let carried: HashMap<String, UniformVariable> = self
            .variables
            .drain(..)
            .map(|variable| (variable.name.clone(), variable))
            .collect();
        self.reset_schema();
        for decl in &schema.declarations {
            let Some(index) = self.declare(&decl.name, decl.component_type, decl.style, decl.range)
            else {
                continue;
            };
            let variable = &mut self.variables[index];
            variable.active = decl.active;
            if let Some(old) = carried
                .get(&decl.name)
                .filter(|old| old.component_type == decl.component_type)
            {
                variable.assign(old.values());
            } else if let Some(entry) = persisted.iter().find(|entry| entry.name == decl.name) {
                variable.assign(&entry.values);
            }
        }
        tracing::debug!(
            variables = self.variables.len(),
            carried = carried.len(),
            "uniform table rebuilt"
        );
    }

    pub fn reset_schema(&mut self) {
        self.mapping.clear();
        self.variables.clear();
        self.dirty = true;
    }

    pub fn declare(
        &mut self,
        name: &str,
        component_type: ComponentType,
        style: UniformStyle,
        range: UniformRange,
    ) -> Option<usize> {
        if self.mapping.contains_key(name) {
            tracing::warn!(name, "uniform declared twice; ignoring");
            return None;
        }
        let index = self.variables.len();
        self.variables
            .push(UniformVariable::new(name, component_type, style, range));
        self.mapping.insert(name.to_string(), index);
        self.dirty = true;
        Some(index)
    }

    pub fn declare_raw(
        &mut self,
        name: &str,
        type_name: &str,
        style: UniformStyle,
        range: UniformRange,
    ) -> Option<usize> {
        match ComponentType::from_type_name(type_name) {
            Some(component_type) => self.declare(name, component_type, style, range),
            None => {
                tracing::warn!(name, type_name, "unsupported uniform type");
                None
            }
        }
    }

    /// Stores clamped values and returns the values they replaced.
    pub fn set_values(&mut self, name: &str, values: &[f32]) -> Option<Vec<f32>> {
        let Some(&index) = self.mapping.get(name) else {
            tracing::debug!(name, "ignoring value for unknown uniform");
            return None;
        };
        let variable = &mut self.variables[index];
        let previous = variable.values().to_vec();
        variable.assign(values);
        Some(previous)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Repacks when dirty; `None` means the previous packing is still valid.
    pub fn pack_buffer(&mut self) -> Option<&[u8]> {
        if !self.dirty {
            return None;
        }
        pack_into(&self.variables, &mut self.packed);
        self.dirty = false;
        Some(&self.packed)
    }

    pub fn packed_bytes(&self) -> &[u8] {
        &self.packed
    }

    pub fn get(&self, name: &str) -> Option<&UniformVariable> {
        self.mapping.get(name).map(|&index| &self.variables[index])
    }

    pub fn variables(&self) -> &[UniformVariable] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

struct StoreState {
    table: UniformTable,
    epoch: u64,
    persist_path: Option<PathBuf>,
    persist_deadline: Option<Instant>,
    refresh_deadline: Option<Instant>,
    undo: UndoWindows,
}

/// Thread-safe home of the live [`UniformTable`].
///
/// Every public operation takes the store lock once. The schema epoch changes
/// whenever the table's layout is replaced, so a packed buffer can be matched
/// to the generation that was built for it.
pub struct UniformStore {
    state: Mutex<StoreState>,
    settings: DebounceSettings,
    undo_sink: Option<Arc<dyn UndoSink>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Default for UniformStore {
    fn default() -> Self {
        Self::new(DebounceSettings::default())
    }
}

impl UniformStore {
    pub fn new(settings: DebounceSettings) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
        Self {
            state: Mutex::new(StoreState {
                table: UniformTable::new(),
                epoch: 0,
                persist_path: None,
                persist_deadline: None,
                refresh_deadline: None,
                undo: UndoWindows::default(),
            }),
            settings,
            undo_sink: None,
            wake_tx,
            wake_rx,
        }
    }

    pub fn with_undo_sink(mut self, sink: Arc<dyn UndoSink>) -> Self {
        self.undo_sink = Some(sink);
        self
    }

    pub fn with_persist_path(self, path: impl Into<PathBuf>) -> Self {
        self.state.lock().persist_path = Some(path.into());
        self
    }

    pub fn set_persist_path(&self, path: Option<PathBuf>) {
        self.state.lock().persist_path = path;
    }

    pub fn persist_path(&self) -> Option<PathBuf> {
        self.state.lock().persist_path.clone()
    }

    pub fn settings(&self) -> &DebounceSettings {
        &self.settings
    }

    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    pub fn reset_schema(&self) {
        let mut state = self.state.lock();
        state.table.reset_schema();
        state.undo.clear();
        state.epoch += 1;
    }

    pub fn declare(
        &self,
        name: &str,
        component_type: ComponentType,
        style: UniformStyle,
        range: UniformRange,
    ) -> Option<usize> {
        self.state
            .lock()
            .table
            .declare(name, component_type, style, range)
    }

    pub fn declare_raw(
        &self,
        name: &str,
        type_name: &str,
        style: UniformStyle,
        range: UniformRange,
    ) -> Option<usize> {
        self.state
            .lock()
            .table
            .declare_raw(name, type_name, style, range)
    }

    pub fn set_values(&self, name: &str, values: &[f32], options: SetOptions) -> bool {
        self.set_values_at(name, values, options, Instant::now())
    }

    /// [`Self::set_values`] with an explicit clock, so debounce deadlines are
    /// computed from `now`.
    pub fn set_values_at(
        &self,
        name: &str,
        values: &[f32],
        options: SetOptions,
        now: Instant,
    ) -> bool {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(previous) = state.table.set_values(name, values) else {
                return false;
            };
            if state.table.get(name).map(|variable| variable.values()) != Some(&previous[..]) {
                state.table.mark_dirty();
            }
            if options.update_buffer {
                state.refresh_deadline = Some(now + self.settings.refresh);
            }
            if options.persist && state.persist_path.is_some() {
                state.persist_deadline = Some(now + self.settings.persist);
            }
            if options.record_undo && self.undo_sink.is_some() {
                state.undo.observe(name, &previous, now + self.settings.undo);
            }
        }
        let _ = self.wake_tx.try_send(());
        true
    }

    pub fn mark_dirty(&self) {
        self.state.lock().table.mark_dirty();
    }

    pub fn values(&self, name: &str) -> Option<Vec<f32>> {
        self.state
            .lock()
            .table
            .get(name)
            .map(|variable| variable.values().to_vec())
    }

    pub fn variables(&self) -> Vec<UniformVariable> {
        self.state.lock().table.variables().to_vec()
    }

    pub fn active_variables(&self) -> Vec<UniformVariable> {
        self.state
            .lock()
            .table
            .variables()
            .iter()
            .filter(|variable| variable.active)
            .cloned()
            .collect()
    }

    pub fn pack_buffer(&self) -> Option<Vec<u8>> {
        self.state.lock().table.pack_buffer().map(<[u8]>::to_vec)
    }

    /// Like [`Self::pack_buffer`], but only while the live layout still has
    /// `epoch`.
    pub fn pack_for_epoch(&self, epoch: u64) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return None;
        }
        state.table.pack_buffer().map(<[u8]>::to_vec)
    }

    pub fn packed_bytes(&self) -> Vec<u8> {
        self.state.lock().table.packed_bytes().to_vec()
    }

    /// Rebuilds the live table for `schema` and bumps the epoch, running
    /// `publish` with the new epoch before the store lock is released.
    ///
    /// Values edited while a reload was compiling carry over because the
    /// rebuild starts from the live table, not a copy taken earlier.
    pub fn install_schema<R>(
        &self,
        schema: &UniformSchema,
        persisted: &[PersistedEntry],
        publish: impl FnOnce(u64) -> R,
    ) -> R {
        let mut state = self.state.lock();
        state.table.rebuild(schema, persisted);
        state.table.mark_dirty();
        state.undo.clear();
        state.epoch += 1;
        let epoch = state.epoch;
        tracing::debug!(epoch, variables = state.table.len(), "uniform table installed");
        publish(epoch)
    }

    pub fn persist(&self, path: &Path) -> Result<(), PersistError> {
        let contents = format_persisted(self.state.lock().table.variables());
        write_persisted(path, &contents)
    }

    /// Writes to the configured path immediately, cancelling any pending write.
    pub fn persist_now(&self) -> Result<(), PersistError> {
        let (path, contents) = {
            let mut state = self.state.lock();
            state.persist_deadline = None;
            let path = state.persist_path.clone().ok_or(PersistError::NoPath)?;
            (path, format_persisted(state.table.variables()))
        };
        write_persisted(&path, &contents)
    }

    /// Applies every well-formed line; malformed lines are reported and skipped.
    pub fn load(&self, path: &Path) -> Result<LoadReport, PersistError> {
        let contents = read_to_string(path)?;
        let (entries, errors) = parse_persisted(&contents);
        for error in &errors {
            tracing::warn!(path = %path.display(), line = error.line, reason = %error.reason, "skipping uniform file line");
        }
        let mut report = self.apply_entries(&entries);
        report.errors = errors;
        Ok(report)
    }

    /// Applies nothing unless every line parses.
    pub fn load_strict(&self, path: &Path) -> Result<LoadReport, PersistError> {
        let contents = read_to_string(path)?;
        let (entries, errors) = parse_persisted(&contents);
        if let Some(source) = errors.into_iter().next() {
            return Err(PersistError::Parse {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(self.apply_entries(&entries))
    }

    fn apply_entries(&self, entries: &[PersistedEntry]) -> LoadReport {
        let mut report = LoadReport::default();
        for entry in entries {
            if self.set_values(&entry.name, &entry.values, SetOptions::RESTORE) {
                report.applied += 1;
            } else {
                report.unknown.push(entry.name.clone());
            }
        }
        report
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let state = self.state.lock();
        [
            state.persist_deadline,
            state.refresh_deadline,
            state.undo.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn flush_due(&self, now: Instant) -> FlushOutcome {
        self.flush(Some(now))
    }

    /// Runs every pending deadline immediately.
    pub fn flush_all(&self) -> FlushOutcome {
        self.flush(None)
    }

    pub fn commit_pending_undo(&self) {
        let commits = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            collect_commits(state, None)
        };
        self.record_commits(commits);
    }

    pub(crate) fn wakeups(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }

    fn flush(&self, now: Option<Instant>) -> FlushOutcome {
        let is_due = |deadline: Option<Instant>| match (deadline, now) {
            (Some(deadline), Some(now)) => deadline <= now,
            (Some(_), None) => true,
            (None, _) => false,
        };
        let mut outcome = FlushOutcome::default();
        let (write, commits) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if is_due(state.refresh_deadline) {
                state.refresh_deadline = None;
                outcome.refresh = true;
            }
            let write = if is_due(state.persist_deadline) {
                state.persist_deadline = None;
                state
                    .persist_path
                    .clone()
                    .map(|path| (path, format_persisted(state.table.variables())))
            } else {
                None
            };
            (write, collect_commits(state, now))
        };
        if let Some((path, contents)) = write {
            match write_persisted(&path, &contents) {
                Ok(()) => {
                    outcome.persisted = true;
                    tracing::debug!(path = %path.display(), "uniform values saved");
                }
                Err(err) => tracing::warn!(error = %err, "failed to save uniform values"),
            }
        }
        outcome.undo_commits = commits.len();
        self.record_commits(commits);
        outcome
    }

    fn record_commits(&self, commits: Vec<UndoEntry>) {
        if let Some(sink) = &self.undo_sink {
            for entry in commits {
                sink.record(entry);
            }
        }
    }
}

fn collect_commits(state: &mut StoreState, now: Option<Instant>) -> Vec<UndoEntry> {
    state
        .undo
        .take_due(now)
        .into_iter()
        .filter_map(|(name, baseline)| {
            let next = state.table.get(&name)?.values().to_vec();
            (next != baseline).then_some(UndoEntry {
                name,
                previous: baseline,
                next,
            })
        })
        .collect()
}

/// Entries of a persisted uniform file; a missing file yields none.
pub fn read_persisted_entries(path: &Path) -> Result<Vec<PersistedEntry>, PersistError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = read_to_string(path)?;
    let (entries, errors) = parse_persisted(&contents);
    if !errors.is_empty() {
        tracing::warn!(path = %path.display(), skipped = errors.len(), "ignoring malformed uniform file lines");
    }
    Ok(entries)
}

fn read_to_string(path: &Path) -> Result<String, PersistError> {
    fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_persisted(path: &Path, contents: &str) -> Result<(), PersistError> {
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::undo::UndoHistory;
    use shaderschema::extract_schema;
    use std::time::Duration;

    fn store_with(decls: &[(&str, ComponentType, UniformRange)]) -> UniformStore {
        let store = UniformStore::default();
        for (name, component_type, range) in decls {
            store.declare(name, *component_type, UniformStyle::Slider, *range);
        }
        store
    }

    #[test]
    fn set_values_clamps_into_range() {
        let store = store_with(&[("pos", ComponentType::Vec2, UniformRange::new(-1.0, 1.0))]);
        assert!(store.set_values("pos", &[2.0, -5.0], SetOptions::RESTORE));
        assert_eq!(store.values("pos"), Some(vec![1.0, -1.0]));
        assert!(!store.set_values("missing", &[1.0], SetOptions::RESTORE));
    }

    #[test]
    fn declare_rejects_duplicates_and_unknown_types() {
        let store = UniformStore::default();
        let range = UniformRange::default();
        assert_eq!(
            store.declare("a", ComponentType::Scalar, UniformStyle::Slider, range),
            Some(0)
        );
        assert_eq!(
            store.declare("a", ComponentType::Vec2, UniformStyle::Slider, range),
            None
        );
        assert_eq!(
            store.declare_raw("b", "float3", UniformStyle::Slider, range),
            Some(1)
        );
        assert_eq!(
            store.declare_raw("c", "mat4", UniformStyle::Slider, range),
            None
        );
        assert_eq!(store.variables().len(), 2);
    }

    #[test]
    fn packing_is_idempotent_until_values_change() {
        let store = store_with(&[("gain", ComponentType::Scalar, UniformRange::default())]);
        let first = store.pack_buffer().expect("fresh table packs");
        assert!(store.pack_buffer().is_none());
        assert_eq!(store.packed_bytes(), first);

        store.set_values("gain", &[0.5], SetOptions::RESTORE);
        let second = store.pack_buffer().expect("edit repacks");
        assert_eq!(&second[0..4], &0.5f32.to_ne_bytes());
        assert!(store.pack_buffer().is_none());
    }

    #[test]
    fn quiet_edits_still_repack() {
        let store = store_with(&[("gain", ComponentType::Scalar, UniformRange::default())]);
        store.pack_buffer().expect("fresh table packs");
        let quiet = SetOptions {
            update_buffer: false,
            persist: false,
            record_undo: false,
        };

        assert!(store.set_values("gain", &[0.25], quiet));
        assert!(store.next_deadline().is_none());
        let packed = store.pack_buffer().expect("changed value repacks");
        assert_eq!(&packed[0..4], &0.25f32.to_ne_bytes());

        assert!(store.set_values("gain", &[0.25], quiet));
        assert!(store.pack_buffer().is_none());
    }

    #[test]
    fn pack_for_epoch_skips_stale_layouts() {
        let store = store_with(&[("gain", ComponentType::Scalar, UniformRange::default())]);
        let epoch = store.epoch();
        store.reset_schema();
        assert!(store.pack_for_epoch(epoch).is_none());
        assert!(store.pack_for_epoch(store.epoch()).is_some());
    }

    #[test]
    fn persisted_values_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("uniforms.txt");
        let decls = [
            ("pos", ComponentType::Vec2, UniformRange::new(-1.0, 1.0)),
            ("gain", ComponentType::Scalar, UniformRange::new(0.0, 10.0)),
        ];
        let store = store_with(&decls);
        store.set_values("pos", &[0.123_456_7, -0.75], SetOptions::RESTORE);
        store.set_values("gain", &[3.3], SetOptions::RESTORE);
        store.persist(&path).expect("persist");

        let restored = store_with(&decls);
        let report = restored.load(&path).expect("load");
        assert!(report.is_clean());
        assert_eq!(report.applied, 2);
        for (name, _, _) in decls {
            let before = store.values(name).expect("value");
            let after = restored.values(name).expect("value");
            for (a, b) in before.iter().zip(&after) {
                assert!((a - b).abs() < 1e-6, "{name}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn best_effort_load_reports_and_strict_load_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("uniforms.txt");
        fs::write(&path, "gain, 0.4\ngain oops\nghost, 1\n").expect("write");

        let store = store_with(&[("gain", ComponentType::Scalar, UniformRange::default())]);
        let report = store.load(&path).expect("load");
        assert_eq!(report.applied, 1);
        assert_eq!(report.unknown, vec!["ghost".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].line, 2);
        assert_eq!(store.values("gain"), Some(vec![0.4]));

        let strict = store_with(&[("gain", ComponentType::Scalar, UniformRange::default())]);
        let err = strict.load_strict(&path).expect_err("strict load fails");
        assert!(matches!(err, PersistError::Parse { ref source, .. } if source.line == 2));
        assert_eq!(strict.values("gain"), Some(vec![0.0]));
    }

    #[test]
    fn undo_commit_records_value_before_first_edit() {
        let history = Arc::new(UndoHistory::default());
        let store = UniformStore::default().with_undo_sink(history.clone());
        store.declare(
            "gain",
            ComponentType::Scalar,
            UniformStyle::Slider,
            UniformRange::default(),
        );
        store.set_values("gain", &[0.1], SetOptions::RESTORE);

        let start = Instant::now();
        store.set_values_at("gain", &[0.2], SetOptions::INTERACTIVE, start);
        store.set_values_at(
            "gain",
            &[0.5],
            SetOptions::INTERACTIVE,
            start + Duration::from_millis(100),
        );
        store.set_values_at(
            "gain",
            &[0.7],
            SetOptions::INTERACTIVE,
            start + Duration::from_millis(200),
        );

        let early = store.flush_due(start + Duration::from_millis(300));
        assert_eq!(early.undo_commits, 0);
        let late = store.flush_due(start + Duration::from_millis(450));
        assert_eq!(late.undo_commits, 1);

        let entry = history.undo(&store).expect("one entry");
        assert_eq!(entry.previous, vec![0.1]);
        assert_eq!(entry.next, vec![0.7]);
        assert_eq!(store.values("gain"), Some(vec![0.1]));

        history.redo(&store).expect("redo");
        assert_eq!(store.values("gain"), Some(vec![0.7]));
        assert!(!history.can_redo());
    }

    #[test]
    fn debounced_persist_writes_after_deadline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("uniforms.txt");
        let store = UniformStore::default().with_persist_path(&path);
        store.declare(
            "gain",
            ComponentType::Scalar,
            UniformStyle::Slider,
            UniformRange::default(),
        );
        let start = Instant::now();
        store.set_values_at("gain", &[0.25], SetOptions::INTERACTIVE, start);
        assert_eq!(
            store.next_deadline(),
            Some(start + store.settings().refresh)
        );

        let outcome = store.flush_due(start + Duration::from_millis(10));
        assert!(outcome.refresh);
        assert!(!outcome.persisted);
        assert!(!path.exists());

        let outcome = store.flush_due(start + Duration::from_millis(500));
        assert!(outcome.persisted);
        assert_eq!(fs::read_to_string(&path).expect("saved"), "gain, 0.25\n");
        assert_eq!(store.next_deadline(), None);
    }

    #[test]
    fn rebuild_carries_matching_values_and_seeds_from_disk() {
        let old_schema = extract_schema(
            "struct U { // @uniform\n  float2 pos; // @range -1 .. 1\n  float gain;\n};\n",
        )
        .expect("schema");
        let new_schema = extract_schema(
            "struct U { // @uniform\n  float3 pos; // @range -1 .. 1\n  float gain;\n  float mix;\n};\nfloat y = mix;\n",
        )
        .expect("schema");
        let mut live = UniformTable::from_schema(&old_schema, &UniformTable::new(), &[]);
        live.set_values("pos", &[0.5, 0.5]);
        live.set_values("gain", &[0.9]);

        let persisted = vec![
            PersistedEntry {
                name: "pos".into(),
                values: vec![0.1, 0.2, 0.3],
            },
            PersistedEntry {
                name: "mix".into(),
                values: vec![0.6],
            },
        ];
        let staged = UniformTable::from_schema(&new_schema, &live, &persisted);
        assert_eq!(staged.get("gain").map(|v| v.values().to_vec()), Some(vec![0.9]));
        assert_eq!(
            staged.get("pos").map(|v| v.values().to_vec()),
            Some(vec![0.1, 0.2, 0.3])
        );
        assert_eq!(staged.get("mix").map(|v| v.values().to_vec()), Some(vec![0.6]));
        assert!(staged.get("mix").is_some_and(|v| v.active));
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn install_bumps_epoch_inside_publish() {
        let store = UniformStore::default();
        store.declare(
            "gain",
            ComponentType::Scalar,
            UniformStyle::Slider,
            UniformRange::new(0.0, 2.0),
        );
        store.set_values("gain", &[1.25], SetOptions::RESTORE);
        let before = store.epoch();

        let schema = extract_schema(
            "struct P { // @uniform\nfloat gain; // @range 0 .. 2\nfloat3 tint;\n};\n",
        )
        .unwrap();
        let seen = store.install_schema(&schema, &[], |epoch| epoch);
        assert_eq!(seen, before + 1);
        assert_eq!(store.epoch(), seen);
        assert_eq!(store.values("gain"), Some(vec![1.25]));
        assert_eq!(store.values("tint"), Some(vec![0.0, 0.0, 0.0]));
        assert!(store.pack_for_epoch(seen).is_some());
    }
}
