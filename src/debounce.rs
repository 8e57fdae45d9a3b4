//! Per-record URL watcher.
//!
//! Each edit of a record's URL field restarts a short quiet period. Once the
//! user stops typing, the value is normalized and, if it names a video we have
//! not looked up yet for this record, a [`FetchTicket`] is handed out. Every
//! edit bumps a generation counter so a lookup that finishes after a newer
//! edit can be recognised as stale and dropped.

use std::time::{Duration, Instant};

use crate::youtube::{self, CanonicalUrl};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    PendingDebounce {
        deadline: Instant,
        raw: String,
        generation: u64,
    },
    Fetching(FetchTicket),
    Resolved {
        video_id: String,
    },
}

/// Permission to look up one canonical URL on behalf of one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub canonical: CanonicalUrl,
}

#[derive(Debug, Clone)]
pub struct UrlWatch {
    state: WatchState,
    generation: u64,
    last_processed: Option<String>,
    debounce: Duration,
}

impl Default for UrlWatch {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl UrlWatch {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: WatchState::Idle,
            generation: 0,
            last_processed: None,
            debounce,
        }
    }

    /// Starts watching a record whose URL is already known, so reopening it
    /// does not trigger a lookup for the video it already points at.
    pub fn seeded(debounce: Duration, current_url: &str) -> Self {
        let mut watch = Self::new(debounce);
        watch.last_processed =
            youtube::normalize_str(current_url).map(|canonical| canonical.video_id().to_owned());
        watch
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, WatchState::Fetching(_))
    }

    /// When the pending quiet period ends, if one is running.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            WatchState::PendingDebounce { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Records a new raw value. Any pending quiet period is replaced and any
    /// lookup still in flight becomes stale.
    pub fn url_changed(&mut self, raw: &str, now: Instant) -> u64 {
        self.generation += 1;
        self.state = WatchState::PendingDebounce {
            deadline: now + self.debounce,
            raw: raw.to_owned(),
            generation: self.generation,
        };
        self.generation
    }

    /// Drops a pending quiet period without looking anything up.
    pub fn cancel(&mut self) {
        if matches!(self.state, WatchState::PendingDebounce { .. }) {
            self.state = WatchState::Idle;
        }
    }

    /// Advances the watcher. Returns a ticket once the quiet period is over
    /// and the value names a video that has not been looked up yet.
    pub fn poll(&mut self, now: Instant) -> Option<FetchTicket> {
        let WatchState::PendingDebounce {
            deadline,
            raw,
            generation,
        } = &self.state
        else {
            return None;
        };
        if now < *deadline {
            return None;
        }
        let generation = *generation;

        let Some(canonical) = youtube::normalize_str(raw) else {
            self.state = WatchState::Idle;
            return None;
        };
        if self.last_processed.as_deref() == Some(canonical.video_id()) {
            self.state = WatchState::Idle;
            return None;
        }

        self.last_processed = Some(canonical.video_id().to_owned());
        let ticket = FetchTicket {
            generation,
            canonical,
        };
        self.state = WatchState::Fetching(ticket.clone());
        Some(ticket)
    }

    /// Whether a finished lookup still belongs to the latest edit.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        matches!(&self.state, WatchState::Fetching(active) if active == ticket)
    }

    /// Marks the lookup for `ticket` as done. A failed lookup forgets the
    /// video id so the same URL can be retried. Stale tickets are ignored.
    pub fn finish(&mut self, ticket: &FetchTicket, succeeded: bool) {
        if !succeeded && self.last_processed.as_deref() == Some(ticket.canonical.video_id()) {
            self.last_processed = None;
        }
        if !self.is_current(ticket) {
            return;
        }
        self.state = if succeeded {
            WatchState::Resolved {
                video_id: ticket.canonical.video_id().to_owned(),
            }
        } else {
            WatchState::Idle
        };
    }
}
