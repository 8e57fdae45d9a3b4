//! Reconciles record metadata with what YouTube reports for the linked video.
//!
//! Two flows share the same building blocks:
//!
//! * Interactive edits. A [`RecordSession`] watches one record's URL field;
//!   after the debounce period the video is looked up once, empty title and
//!   author fields are filled in, and disagreements with non-empty fields are
//!   handed to a [`ConflictArbiter`] to decide.
//! * Batch auto-fill. [`Reconciler::run_batch`] walks the whole collection one
//!   record at a time with a fixed pause between lookups, only ever filling
//!   empty fields and never asking the arbiter.
//!
//! Lookup failures never abort anything. They are reported back to the caller
//! and the record stays as it was.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::task;

use crate::collection::CollectionStore;
use crate::debounce::{DEFAULT_DEBOUNCE, FetchTicket, UrlWatch};
use crate::oembed::{FetchError, FetchedMetadata, MetadataFetcher};
use crate::record::{Record, RecordId, RecordPatch};
use crate::youtube::{self, CanonicalUrl};

pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// The two record fields YouTube can tell us something about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictField {
    Title,
    Author,
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictField::Title => f.write_str("title"),
            ConflictField::Author => f.write_str("author"),
        }
    }
}

/// A non-empty record field that disagrees with the fetched value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataConflict {
    pub field: ConflictField,
    pub current_value: String,
    pub fetched_value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Choice {
    #[default]
    Current,
    Fetched,
}

/// Per-field decisions. Fields without an explicit choice keep their
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Choices(HashMap<ConflictField, Choice>);

impl Choices {
    pub fn all(conflicts: &[MetadataConflict], choice: Choice) -> Self {
        Self(
            conflicts
                .iter()
                .map(|conflict| (conflict.field, choice))
                .collect(),
        )
    }

    pub fn set(&mut self, field: ConflictField, choice: Choice) {
        self.0.insert(field, choice);
    }

    pub fn get(&self, field: ConflictField) -> Choice {
        self.0.get(&field).copied().unwrap_or_default()
    }
}

/// Decides conflicts on behalf of the user. Called synchronously with the
/// record as it is now and every conflict found for it.
pub trait ConflictArbiter {
    fn choose(&self, record: &Record, conflicts: &[MetadataConflict]) -> Choices;
}

/// Keeps whatever the user typed.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepCurrent;

impl ConflictArbiter for KeepCurrent {
    fn choose(&self, _record: &Record, _conflicts: &[MetadataConflict]) -> Choices {
        Choices::default()
    }
}

/// Takes YouTube's values for every conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferFetched;

impl ConflictArbiter for PreferFetched {
    fn choose(&self, _record: &Record, conflicts: &[MetadataConflict]) -> Choices {
        Choices::all(conflicts, Choice::Fetched)
    }
}

/// Lists the fields where the record already holds a value that differs
/// from the fetched one. Empty fields are never conflicts, and neither is an
/// empty fetched value since there is nothing to offer instead.
pub fn compare(record: &Record, fetched: &FetchedMetadata) -> Vec<MetadataConflict> {
    let candidates = [
        (ConflictField::Title, &record.title, &fetched.title),
        (ConflictField::Author, &record.author, &fetched.author_name),
    ];
    candidates
        .into_iter()
        .filter(|(_, current, incoming)| {
            !current.trim().is_empty() && !incoming.trim().is_empty() && current != incoming
        })
        .map(|(field, current, incoming)| MetadataConflict {
            field,
            current_value: current.clone(),
            fetched_value: incoming.clone(),
        })
        .collect()
}

/// Fills empty title/author fields and never touches anything else.
pub fn fill_empty(record: &Record, fetched: &FetchedMetadata) -> Record {
    let mut next = record.clone();
    if next.title.trim().is_empty() {
        next.title = fetched.title.clone();
    }
    if next.author.trim().is_empty() {
        next.author = fetched.author_name.clone();
    }
    next
}

/// Applies the chosen side of every conflict, then fills whatever is still
/// empty from the fetched metadata.
pub fn resolve(
    record: &Record,
    fetched: &FetchedMetadata,
    conflicts: &[MetadataConflict],
    choices: &Choices,
) -> Record {
    let mut patch = RecordPatch::default();
    for conflict in conflicts {
        if choices.get(conflict.field) != Choice::Fetched {
            continue;
        }
        match conflict.field {
            ConflictField::Title => patch.title = Some(conflict.fetched_value.clone()),
            ConflictField::Author => patch.author = Some(conflict.fetched_value.clone()),
        }
    }
    fill_empty(&record.apply(&patch), fetched)
}

/// What happened to a record after a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Nothing to look up: the URL is incomplete or was already handled.
    Skipped,
    /// The lookup finished but the record moved on in the meantime.
    Stale,
    /// The lookup agreed with the record, or only offered empty values.
    Unchanged,
    /// Empty fields were filled without asking.
    Filled(Record),
    /// Conflicts were put to the arbiter and its decision applied.
    Arbitrated {
        record: Record,
        conflicts: Vec<MetadataConflict>,
        choices: Choices,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub debounce: Duration,
    pub batch_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            batch_delay: DEFAULT_BATCH_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Editing state for one record's URL field.
#[derive(Debug, Clone)]
pub struct RecordSession {
    record_id: RecordId,
    watch: UrlWatch,
}

impl RecordSession {
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn watch(&self) -> &UrlWatch {
        &self.watch
    }

    pub fn is_loading(&self) -> bool {
        self.watch.is_loading()
    }

    /// Stores the raw value on the record and restarts the debounce period.
    pub fn url_changed(&mut self, store: &CollectionStore, raw: &str) {
        let patch = RecordPatch {
            url: Some(raw.to_owned()),
            ..RecordPatch::default()
        };
        store.modify(|collection| collection.update(self.record_id, &patch));
        self.watch.url_changed(raw, Instant::now());
    }
}

/// Bookkeeping carried between batch runs.
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    processed: HashSet<String>,
    attempts: HashMap<String, u32>,
    held: HashSet<RecordId>,
    in_flight: Option<RecordId>,
}

impl BatchState {
    /// Keeps freshly imported records out of batch runs until
    /// [`BatchState::release_imported`] is called.
    pub fn hold_imported<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = RecordId>,
    {
        self.held.extend(ids);
    }

    pub fn release_imported(&mut self) {
        self.held.clear();
    }

    pub fn is_held(&self, id: RecordId) -> bool {
        self.held.contains(&id)
    }

    pub fn is_processed(&self, video_id: &str) -> bool {
        self.processed.contains(video_id)
    }

    pub fn attempts(&self, video_id: &str) -> u32 {
        self.attempts.get(video_id).copied().unwrap_or_default()
    }

    /// Clears the failure counters so exhausted videos get another chance.
    pub fn reset_attempts(&mut self) {
        self.attempts.clear();
    }

    /// Record currently being looked up, if any.
    pub fn in_flight(&self) -> Option<RecordId> {
        self.in_flight
    }

    /// Forgets videos no record points at anymore.
    pub fn prune(&mut self, records: &[Record]) {
        let present: HashSet<String> = records
            .iter()
            .filter_map(|record| youtube::normalize_str(&record.url))
            .map(|canonical| canonical.video_id().to_owned())
            .collect();
        self.processed.retain(|video_id| present.contains(video_id));
        self.attempts.retain(|video_id, _| present.contains(video_id));
    }
}

/// Result of one batch run, one entry per record touched.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub filled: Vec<RecordId>,
    pub unchanged: Vec<RecordId>,
    pub stale: Vec<RecordId>,
    pub held: Vec<RecordId>,
    pub exhausted: Vec<RecordId>,
    pub failed: Vec<(RecordId, FetchError)>,
}

impl BatchReport {
    pub fn lookups(&self) -> usize {
        self.filled.len() + self.unchanged.len() + self.stale.len() + self.failed.len()
    }
}

/// Drives metadata lookups for a collection store.
#[derive(Clone)]
pub struct Reconciler {
    fetcher: Arc<dyn MetadataFetcher>,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(fetcher: Arc<dyn MetadataFetcher>, options: ReconcileOptions) -> Self {
        Self { fetcher, options }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Opens an editing session for `record`. The video it already points at
    /// is treated as handled.
    pub fn session(&self, record: &Record) -> RecordSession {
        RecordSession {
            record_id: record.id,
            watch: UrlWatch::seeded(self.options.debounce, &record.url),
        }
    }

    /// Looks up metadata on a blocking worker so the HTTP call does not stall
    /// the runtime.
    pub async fn fetch(&self, canonical: &CanonicalUrl) -> Result<FetchedMetadata, FetchError> {
        let fetcher = self.fetcher.clone();
        let video_id = canonical.video_id().to_owned();
        task::spawn_blocking(move || fetcher.fetch_metadata(&video_id))
            .await
            .map_err(|err| FetchError::Interrupted(err.to_string()))?
    }

    /// Waits out the session's debounce period and, if the URL is ready and
    /// new, looks it up and merges the result into the store.
    pub async fn settle(
        &self,
        session: &mut RecordSession,
        store: &CollectionStore,
        arbiter: &dyn ConflictArbiter,
    ) -> Result<EditOutcome, FetchError> {
        let ticket = loop {
            let Some(deadline) = session.watch.deadline() else {
                return Ok(EditOutcome::Skipped);
            };
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            if let Some(ticket) = session.watch.poll(Instant::now()) {
                break ticket;
            }
        };

        debug!(
            "record {}: looking up {}",
            session.record_id, ticket.canonical
        );
        let fetched = match self.fetch(&ticket.canonical).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!("record {}: metadata lookup failed: {err}", session.record_id);
                session.watch.finish(&ticket, false);
                return Err(err);
            }
        };

        if !session.watch.is_current(&ticket) {
            debug!("record {}: dropping superseded lookup", session.record_id);
            return Ok(EditOutcome::Stale);
        }
        let outcome = self.merge(store, session.record_id, &ticket, &fetched, arbiter);
        session
            .watch
            .finish(&ticket, outcome != EditOutcome::Stale);
        Ok(outcome)
    }

    /// Looks up a single record right away, bypassing the debounce, and
    /// merges the result with the arbiter's help.
    pub async fn reconcile_record(
        &self,
        store: &CollectionStore,
        id: RecordId,
        arbiter: &dyn ConflictArbiter,
    ) -> Result<EditOutcome, FetchError> {
        let snapshot = store.snapshot();
        let Some(canonical) = snapshot
            .get(id)
            .and_then(|record| youtube::normalize_str(&record.url))
        else {
            return Ok(EditOutcome::Skipped);
        };
        let fetched = self.fetch(&canonical).await?;
        let ticket = FetchTicket {
            generation: 0,
            canonical,
        };
        Ok(self.merge(store, id, &ticket, &fetched, arbiter))
    }

    fn merge(
        &self,
        store: &CollectionStore,
        id: RecordId,
        ticket: &FetchTicket,
        fetched: &FetchedMetadata,
        arbiter: &dyn ConflictArbiter,
    ) -> EditOutcome {
        let snapshot = store.snapshot();
        let Some(record) = current_target(snapshot.records(), id, &ticket.canonical) else {
            debug!("record {id}: URL changed while the lookup was running");
            return EditOutcome::Stale;
        };

        let conflicts = compare(record, fetched);
        if conflicts.is_empty() {
            let filled = fill_empty(record, fetched);
            if filled == *record {
                return EditOutcome::Unchanged;
            }
            store.modify(|collection| collection.put(filled.clone()));
            return EditOutcome::Filled(filled);
        }

        let choices = arbiter.choose(record, &conflicts);
        let resolved = resolve(record, fetched, &conflicts, &choices);
        if resolved != *record {
            store.modify(|collection| collection.put(resolved.clone()));
        }
        EditOutcome::Arbitrated {
            record: resolved,
            conflicts,
            choices,
        }
    }

    /// Fills empty fields across the whole collection, one lookup at a time.
    ///
    /// Records are eligible when their URL names a video that has not been
    /// handled yet, they are not held back after an import, and the video has
    /// not used up its attempts. A failed lookup makes the video eligible
    /// again on the next run.
    pub async fn run_batch(&self, store: &CollectionStore, state: &mut BatchState) -> BatchReport {
        let mut report = BatchReport::default();
        let snapshot = store.snapshot();
        state.prune(snapshot.records());

        let mut queue = Vec::new();
        for record in snapshot.records() {
            let Some(canonical) = youtube::normalize_str(&record.url) else {
                continue;
            };
            if state.is_processed(canonical.video_id()) {
                continue;
            }
            if state.is_held(record.id) {
                report.held.push(record.id);
                continue;
            }
            if state.attempts(canonical.video_id()) >= self.options.max_attempts {
                report.exhausted.push(record.id);
                continue;
            }
            queue.push((record.id, canonical));
        }

        let mut first = true;
        for (id, canonical) in queue {
            let video_id = canonical.video_id().to_owned();
            if state.processed.contains(&video_id) {
                continue;
            }
            if !first {
                tokio::time::sleep(self.options.batch_delay).await;
            }
            first = false;

            state.processed.insert(video_id.clone());
            state.in_flight = Some(id);
            let result = self.fetch(&canonical).await;
            state.in_flight = None;

            let fetched = match result {
                Ok(fetched) => fetched,
                Err(err) => {
                    state.processed.remove(&video_id);
                    let attempts = state.attempts.entry(video_id).or_default();
                    *attempts += 1;
                    warn!("record {id}: metadata lookup failed (attempt {attempts}): {err}");
                    report.failed.push((id, err));
                    continue;
                }
            };
            state.attempts.remove(&video_id);

            let latest = store.snapshot();
            let Some(record) = current_target(latest.records(), id, &canonical) else {
                report.stale.push(id);
                continue;
            };
            let filled = fill_empty(record, &fetched);
            if filled == *record {
                report.unchanged.push(id);
            } else {
                store.modify(|collection| collection.put(filled.clone()));
                report.filled.push(id);
            }
        }

        info!(
            "auto-fill finished: {} filled, {} unchanged, {} failed",
            report.filled.len(),
            report.unchanged.len(),
            report.failed.len()
        );
        report
    }
}

/// The record `id` if it still exists and still points at `canonical`.
fn current_target<'a>(
    records: &'a [Record],
    id: RecordId,
    canonical: &CanonicalUrl,
) -> Option<&'a Record> {
    records.iter().find(|record| record.id == id).filter(|record| {
        youtube::normalize_str(&record.url)
            .is_some_and(|current| current.video_id() == canonical.video_id())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;
    use std::sync::Mutex;

    const ID_A: &str = "dQw4w9WgXcQ";
    const ID_B: &str = "aaaaaaaaaaa";

    /// Serves canned answers keyed by video id and counts calls.
    #[derive(Default)]
    struct ScriptedFetcher {
        answers: Mutex<HashMap<String, Vec<Result<FetchedMetadata, FetchError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn answer(self, video_id: &str, result: Result<FetchedMetadata, FetchError>) -> Self {
            self.answers
                .lock()
                .unwrap()
                .entry(video_id.to_owned())
                .or_default()
                .push(result);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl MetadataFetcher for ScriptedFetcher {
        fn fetch_metadata(&self, video_id: &str) -> Result<FetchedMetadata, FetchError> {
            self.calls.lock().unwrap().push(video_id.to_owned());
            let mut answers = self.answers.lock().unwrap();
            let queue = answers.entry(video_id.to_owned()).or_default();
            if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Err(FetchError::Transport("no answer".into())))
            }
        }
    }

    fn meta(title: &str, author: &str) -> FetchedMetadata {
        FetchedMetadata {
            title: title.into(),
            author_name: author.into(),
        }
    }

    fn quick() -> ReconcileOptions {
        ReconcileOptions {
            debounce: Duration::from_millis(1),
            batch_delay: Duration::ZERO,
            max_attempts: 2,
        }
    }

    fn with_url(id: &str) -> Record {
        Record {
            url: format!("https://youtu.be/{id}"),
            ..Record::empty()
        }
    }

    #[test]
    fn one_conflict_and_one_silent_fill() {
        let record = Record {
            title: "Foo".into(),
            ..Record::empty()
        };
        let fetched = meta("Bar", "Baz");
        let conflicts = compare(&record, &fetched);
        assert_eq!(
            conflicts,
            vec![MetadataConflict {
                field: ConflictField::Title,
                current_value: "Foo".into(),
                fetched_value: "Bar".into(),
            }]
        );

        let kept = resolve(&record, &fetched, &conflicts, &Choices::default());
        assert_eq!(kept.title, "Foo");
        assert_eq!(kept.author, "Baz");

        let adopted = resolve(
            &record,
            &fetched,
            &conflicts,
            &Choices::all(&conflicts, Choice::Fetched),
        );
        assert_eq!(adopted.title, "Bar");
        assert_eq!(adopted.author, "Baz");
    }

    #[test]
    fn fill_empty_never_overwrites() {
        let record = Record {
            title: "Mine".into(),
            author: "  ".into(),
            ..Record::empty()
        };
        let filled = fill_empty(&record, &meta("Theirs", "Channel"));
        assert_eq!(filled.title, "Mine");
        assert_eq!(filled.author, "Channel");
    }

    #[test]
    fn identical_or_empty_fetched_values_are_not_conflicts() {
        let record = Record {
            title: "Same".into(),
            author: "Someone".into(),
            ..Record::empty()
        };
        assert!(compare(&record, &meta("Same", "")).is_empty());
    }

    #[test]
    fn per_field_choices_are_independent() {
        let record = Record {
            title: "Foo".into(),
            author: "Me".into(),
            ..Record::empty()
        };
        let fetched = meta("Bar", "Them");
        let conflicts = compare(&record, &fetched);
        let mut choices = Choices::default();
        choices.set(ConflictField::Author, Choice::Fetched);
        let merged = resolve(&record, &fetched, &conflicts, &choices);
        assert_eq!(merged.title, "Foo");
        assert_eq!(merged.author, "Them");
    }

    #[tokio::test]
    async fn settle_fills_empty_fields_after_debounce() {
        let record = Record::empty();
        let store = CollectionStore::new(Collection::from_records(vec![record.clone()]));
        let fetcher = Arc::new(ScriptedFetcher::default().answer(ID_A, Ok(meta("Book", "Writer"))));
        let reconciler = Reconciler::new(fetcher.clone(), quick());

        let mut session = reconciler.session(&record);
        session.url_changed(&store, &format!("youtube.com/watch?v={ID_A}&t=30"));
        let outcome = reconciler.settle(&mut session, &store, &KeepCurrent).await.unwrap();

        let updated = store.snapshot().get(record.id).cloned().unwrap();
        assert_eq!(outcome, EditOutcome::Filled(updated.clone()));
        assert_eq!(updated.title, "Book");
        assert_eq!(updated.author, "Writer");
        assert_eq!(fetcher.calls(), vec![ID_A.to_string()]);
        assert!(!session.is_loading());

        session.url_changed(&store, &format!("https://youtu.be/{ID_A}"));
        let again = reconciler.settle(&mut session, &store, &KeepCurrent).await.unwrap();
        assert_eq!(again, EditOutcome::Skipped);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn settle_ignores_incomplete_urls() {
        let record = Record::empty();
        let store = CollectionStore::new(Collection::from_records(vec![record.clone()]));
        let fetcher = Arc::new(ScriptedFetcher::default());
        let reconciler = Reconciler::new(fetcher.clone(), quick());

        let mut session = reconciler.session(&record);
        session.url_changed(&store, "https://www.youtube.com/watch?v=dQw4");
        let outcome = reconciler.settle(&mut session, &store, &KeepCurrent).await.unwrap();
        assert_eq!(outcome, EditOutcome::Skipped);
        assert!(fetcher.calls().is_empty());
        assert_eq!(
            store.snapshot().get(record.id).unwrap().url,
            "https://www.youtube.com/watch?v=dQw4"
        );
    }

    #[tokio::test]
    async fn settle_asks_the_arbiter_about_conflicts() {
        let record = Record {
            title: "Foo".into(),
            ..Record::empty()
        };
        let store = CollectionStore::new(Collection::from_records(vec![record.clone()]));
        let fetcher = Arc::new(ScriptedFetcher::default().answer(ID_A, Ok(meta("Bar", "Baz"))));
        let reconciler = Reconciler::new(fetcher, quick());

        let mut session = reconciler.session(&record);
        session.url_changed(&store, &format!("https://youtu.be/{ID_A}"));
        let outcome = reconciler
            .settle(&mut session, &store, &PreferFetched)
            .await
            .unwrap();

        match outcome {
            EditOutcome::Arbitrated {
                record, conflicts, ..
            } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(record.title, "Bar");
                assert_eq!(record.author, "Baz");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(store.snapshot().get(record.id).unwrap().title, "Bar");
    }

    #[tokio::test]
    async fn failed_lookup_leaves_record_alone_and_allows_retry() {
        let record = Record::empty();
        let store = CollectionStore::new(Collection::from_records(vec![record.clone()]));
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .answer(
                    ID_A,
                    Err(FetchError::Status {
                        status: 503,
                        message: "busy".into(),
                    }),
                )
                .answer(ID_A, Ok(meta("Book", "Writer"))),
        );
        let reconciler = Reconciler::new(fetcher.clone(), quick());

        let mut session = reconciler.session(&record);
        let url = format!("https://youtu.be/{ID_A}");
        session.url_changed(&store, &url);
        let err = reconciler
            .settle(&mut session, &store, &KeepCurrent)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(!session.is_loading());
        assert!(store.snapshot().get(record.id).unwrap().title.is_empty());

        session.url_changed(&store, &url);
        let outcome = reconciler.settle(&mut session, &store, &KeepCurrent).await.unwrap();
        assert!(matches!(outcome, EditOutcome::Filled(_)));
        assert_eq!(fetcher.calls().len(), 2);
    }

    /// Rewrites the record's URL while the lookup is running.
    struct MovingTarget {
        store: Arc<CollectionStore>,
        id: RecordId,
    }

    impl MetadataFetcher for MovingTarget {
        fn fetch_metadata(&self, _video_id: &str) -> Result<FetchedMetadata, FetchError> {
            let patch = RecordPatch {
                url: Some(format!("https://youtu.be/{ID_B}")),
                ..RecordPatch::default()
            };
            self.store
                .modify(|collection| collection.update(self.id, &patch));
            Ok(meta("Late", "Answer"))
        }
    }

    #[tokio::test]
    async fn results_for_a_replaced_url_are_discarded() {
        let record = with_url(ID_A);
        let store = Arc::new(CollectionStore::new(Collection::from_records(vec![
            record.clone(),
        ])));
        let fetcher = Arc::new(MovingTarget {
            store: store.clone(),
            id: record.id,
        });
        let reconciler = Reconciler::new(fetcher, quick());

        let outcome = reconciler
            .reconcile_record(&store, record.id, &KeepCurrent)
            .await
            .unwrap();
        assert_eq!(outcome, EditOutcome::Stale);
        assert!(store.snapshot().get(record.id).unwrap().title.is_empty());
    }

    #[tokio::test]
    async fn batch_fills_only_empty_fields_and_skips_held_records() {
        let typed = Record {
            title: "Typed".into(),
            ..with_url(ID_A)
        };
        let imported = with_url(ID_B);
        let no_url = Record::empty();
        let store = CollectionStore::new(Collection::from_records(vec![
            typed.clone(),
            imported.clone(),
            no_url,
        ]));
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .answer(ID_A, Ok(meta("Fetched", "Channel A")))
                .answer(ID_B, Ok(meta("Other", "Channel B"))),
        );
        let reconciler = Reconciler::new(fetcher.clone(), quick());
        let mut state = BatchState::default();
        state.hold_imported([imported.id]);

        let report = reconciler.run_batch(&store, &mut state).await;
        assert_eq!(report.filled, vec![typed.id]);
        assert_eq!(report.held, vec![imported.id]);
        let snapshot = store.snapshot();
        let typed_now = snapshot.get(typed.id).unwrap();
        assert_eq!(typed_now.title, "Typed");
        assert_eq!(typed_now.author, "Channel A");
        assert!(snapshot.get(imported.id).unwrap().title.is_empty());

        state.release_imported();
        let report = reconciler.run_batch(&store, &mut state).await;
        assert_eq!(report.filled, vec![imported.id]);
        assert_eq!(fetcher.calls(), vec![ID_A.to_string(), ID_B.to_string()]);

        let report = reconciler.run_batch(&store, &mut state).await;
        assert_eq!(report.lookups(), 0);
    }

    #[tokio::test]
    async fn batch_continues_past_failures_and_caps_retries() {
        let failing = with_url(ID_A);
        let working = with_url(ID_B);
        let store = CollectionStore::new(Collection::from_records(vec![
            failing.clone(),
            working.clone(),
        ]));
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .answer(ID_A, Err(FetchError::Transport("offline".into())))
                .answer(ID_B, Ok(meta("Works", "Fine"))),
        );
        let reconciler = Reconciler::new(fetcher.clone(), quick());
        let mut state = BatchState::default();

        let first = reconciler.run_batch(&store, &mut state).await;
        assert_eq!(first.failed.len(), 1);
        assert_eq!(first.failed[0].0, failing.id);
        assert_eq!(first.filled, vec![working.id]);
        assert!(!state.is_processed(ID_A));
        assert_eq!(state.in_flight(), None);

        let second = reconciler.run_batch(&store, &mut state).await;
        assert_eq!(second.failed.len(), 1);
        assert_eq!(state.attempts(ID_A), 2);

        let third = reconciler.run_batch(&store, &mut state).await;
        assert_eq!(third.exhausted, vec![failing.id]);
        assert_eq!(third.lookups(), 0);
        assert_eq!(fetcher.calls().iter().filter(|id| *id == ID_A).count(), 2);

        state.reset_attempts();
        let fourth = reconciler.run_batch(&store, &mut state).await;
        assert_eq!(fourth.failed.len(), 1);
    }

    #[tokio::test]
    async fn batch_looks_up_duplicate_videos_once() {
        let first = with_url(ID_A);
        let second = Record {
            url: format!("https://www.youtube.com/watch?v={ID_A}"),
            ..Record::empty()
        };
        let store = CollectionStore::new(Collection::from_records(vec![first, second]));
        let fetcher = Arc::new(ScriptedFetcher::default().answer(ID_A, Ok(meta("T", "A"))));
        let reconciler = Reconciler::new(fetcher.clone(), quick());

        let report = reconciler.run_batch(&store, &mut BatchState::default()).await;
        assert_eq!(report.filled.len(), 1);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[test]
    fn prune_forgets_removed_videos() {
        let mut state = BatchState::default();
        state.processed.insert(ID_A.into());
        state.processed.insert(ID_B.into());
        state.prune(&[with_url(ID_B)]);
        assert!(!state.is_processed(ID_A));
        assert!(state.is_processed(ID_B));
    }
}
