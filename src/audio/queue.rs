use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

use crate::sources::TrackIdentity;

/// Where a queued track came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOrigin {
    /// Served from the media cache.
    Cached(TrackIdentity),
    /// Jukebox or playlist file, identified by its path.
    Local(PathBuf),
}

/// One queue element. Never changed after it is enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    pub origin: TrackOrigin,
    /// Resolved file the sink renders; also the dedup key.
    pub file: PathBuf,
    pub service: String,
    pub duration_secs: u64,
    pub enqueued_at: DateTime<Utc>,
    pub requester: String,
}

/// Result of [`SessionQueue::skip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    /// Everything was dropped, including the current track.
    Cleared(usize),
    /// This many tracks were skipped, counting the current one.
    Skipped(usize),
}

/// Per-session play order. Index 0 is the track being rendered.
#[derive(Debug, Default)]
pub struct SessionQueue {
    tracks: Vec<Track>,
    loop_enabled: bool,
    shuffle_enabled: bool,
}

impl SessionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.first()
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle_enabled
    }

    pub fn append(&mut self, track: Track) {
        debug!("➕ Encolado {} ({})", track.title, track.file.display());
        self.tracks.push(track);
    }

    pub fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) {
        self.tracks.extend(tracks);
    }

    /// Drops later tracks that render the same file as an earlier one.
    ///
    /// Returns how many were removed.
    pub fn dedupe(&mut self) -> usize {
        let before = self.tracks.len();
        let mut seen = HashSet::new();
        self.tracks.retain(|t| seen.insert(t.file.clone()));

        let removed = before - self.tracks.len();
        if removed > 0 {
            debug!("🗑️ {} tracks duplicados eliminados", removed);
        }
        removed
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.loop_enabled = !self.loop_enabled;
        info!("🔁 Loop {}", if self.loop_enabled { "activado" } else { "desactivado" });
        self.loop_enabled
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle_enabled = !self.shuffle_enabled;
        info!("🔀 Shuffle {}", if self.shuffle_enabled { "activado" } else { "desactivado" });
        self.shuffle_enabled
    }

    pub fn apply_shuffle_if_enabled(&mut self) {
        self.apply_shuffle_with(&mut rand::thread_rng());
    }

    /// Permutes everything after the current track when shuffle is on.
    pub fn apply_shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.shuffle_enabled && self.tracks.len() > 1 {
            self.tracks[1..].shuffle(rng);
        }
    }

    /// Removes tracks ahead of a skip.
    ///
    /// `n <= 0` or `n >= len` clears the whole queue. Otherwise the `n - 1`
    /// tracks after the current one are dropped; the current one is left for
    /// the transition that follows the sink stop.
    pub fn skip(&mut self, n: i64) -> SkipOutcome {
        let len = self.tracks.len();
        match usize::try_from(n) {
            Ok(n) if n > 0 && n < len => {
                self.tracks.drain(1..n);
                SkipOutcome::Skipped(n)
            }
            _ => {
                self.tracks.clear();
                SkipOutcome::Cleared(len)
            }
        }
    }

    /// Moves the track rendering `file` to position 1.
    ///
    /// Returns `false` when nothing moved: the file is not queued, or it is
    /// the current track already.
    pub fn play_next(&mut self, file: &Path) -> bool {
        match self.tracks.iter().position(|t| t.file == file) {
            Some(0) | None => false,
            Some(1) => true,
            Some(i) => {
                let track = self.tracks.remove(i);
                self.tracks.insert(1, track);
                true
            }
        }
    }

    /// Position of the track rendering `file`.
    pub fn position_of(&self, file: &Path) -> Option<usize> {
        self.tracks.iter().position(|t| t.file == file)
    }

    /// Moves past the finished track; with loop on, the current track stays.
    pub fn advance(&mut self) -> Option<&Track> {
        if !self.loop_enabled && !self.tracks.is_empty() {
            let finished = self.tracks.remove(0);
            debug!("⏭️ Terminado {}", finished.title);
        }
        self.tracks.first()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Copy of the queue for display.
    pub fn snapshot(&self) -> UpcomingSnapshot {
        UpcomingSnapshot {
            tracks: self.tracks.clone(),
            looping: self.loop_enabled,
            shuffling: self.shuffle_enabled,
        }
    }
}

/// Owned copy of a queue at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingSnapshot {
    pub tracks: Vec<Track>,
    pub looping: bool,
    pub shuffling: bool,
}

impl UpcomingSnapshot {
    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(self.tracks.iter().map(|t| t.duration_secs).sum())
    }

    /// One page of the snapshot; `page` starts at 0 and is clamped.
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        let per_page = per_page.max(1);
        let total_pages = self.tracks.len().div_ceil(per_page).max(1);
        let page = page.min(total_pages - 1);
        let start = page * per_page;

        let entries = self
            .tracks
            .iter()
            .enumerate()
            .skip(start)
            .take(per_page)
            .map(|(position, track)| (position, track.clone()))
            .collect();

        QueuePage {
            entries,
            page,
            total_pages,
            total_tracks: self.tracks.len(),
            total_duration: self.total_duration(),
            looping: self.looping,
        }
    }
}

/// Slice of the queue prepared for an embed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    /// (queue position, track)
    pub entries: Vec<(usize, Track)>,
    pub page: usize,
    pub total_pages: usize,
    pub total_tracks: usize,
    /// Sum of known durations; local files count as zero.
    pub total_duration: Duration,
    pub looping: bool,
}

impl QueuePage {
    /// Field heading for a queue position.
    pub fn label(&self, position: usize) -> String {
        match position {
            0 if self.looping => "LOOPING".to_string(),
            0 => "NOW PLAYING".to_string(),
            n => format!("{n}."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn track(name: &str) -> Track {
        Track {
            title: name.to_string(),
            origin: TrackOrigin::Local(PathBuf::from(format!("{name}.opus"))),
            file: PathBuf::from(format!("{name}.opus")),
            service: "Jukebox".to_string(),
            duration_secs: 60,
            enqueued_at: Utc::now(),
            requester: "tester".to_string(),
        }
    }

    fn queue_of(names: &[&str]) -> SessionQueue {
        let mut queue = SessionQueue::new();
        queue.extend(names.iter().map(|n| track(n)));
        queue
    }

    fn titles(queue: &SessionQueue) -> Vec<String> {
        queue.snapshot().tracks.into_iter().map(|t| t.title).collect()
    }

    #[test]
    fn dedupe_keeps_first_occurrence_and_is_idempotent() {
        let mut queue = queue_of(&["a", "b"]);
        for name in ["a", "c", "b"] {
            queue.append(track(name));
        }
        assert_eq!(queue.dedupe(), 2);
        assert_eq!(titles(&queue), vec!["a", "b", "c"]);
        assert_eq!(queue.dedupe(), 0);
        assert_eq!(titles(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn skip_zero_or_past_end_clears() {
        for n in [0, -3, 3, 10] {
            let mut queue = queue_of(&["a", "b", "c"]);
            assert_eq!(queue.skip(n), SkipOutcome::Cleared(3), "n = {n}");
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn skip_drops_the_tracks_between() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.skip(1), SkipOutcome::Skipped(1));
        assert_eq!(titles(&queue), vec!["a", "b", "c"]);

        let mut queue = queue_of(&["a", "b", "c", "d"]);
        assert_eq!(queue.skip(3), SkipOutcome::Skipped(3));
        // "a" is still rendering; the transition removes it.
        assert_eq!(titles(&queue), vec!["a", "d"]);
    }

    #[test]
    fn play_next_moves_to_second_slot() {
        let mut queue = queue_of(&["a", "b", "c", "d"]);
        assert!(queue.play_next(Path::new("d.opus")));
        assert_eq!(titles(&queue), vec!["a", "d", "b", "c"]);

        assert!(!queue.play_next(Path::new("a.opus")));
        assert!(!queue.play_next(Path::new("zzz.opus")));
        assert_eq!(titles(&queue), vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn advance_pops_unless_looping() {
        let mut queue = queue_of(&["a", "b"]);
        assert_eq!(queue.advance().map(|t| t.title.as_str()), Some("b"));

        queue.toggle_loop();
        for _ in 0..5 {
            assert_eq!(queue.advance().map(|t| t.title.as_str()), Some("b"));
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn shuffle_never_moves_current_track() {
        let mut queue = queue_of(&["a", "b", "c", "d", "e", "f"]);
        let mut rng = StdRng::seed_from_u64(7);

        queue.apply_shuffle_with(&mut rng);
        assert_eq!(titles(&queue), vec!["a", "b", "c", "d", "e", "f"]);

        queue.toggle_shuffle();
        for _ in 0..10 {
            queue.apply_shuffle_with(&mut rng);
            let mut after = titles(&queue);
            assert_eq!(after[0], "a");
            after.sort();
            assert_eq!(after, vec!["a", "b", "c", "d", "e", "f"]);
        }
    }

    #[test]
    fn pages_are_clamped_and_numbered_by_queue_position() {
        let queue = queue_of(&["a", "b", "c", "d", "e"]);
        let snapshot = queue.snapshot();

        let page = snapshot.page(1, 2);
        assert_eq!(page.total_pages, 3);
        let positions: Vec<_> = page.entries.iter().map(|(i, _)| *i).collect();
        assert_eq!(positions, vec![2, 3]);

        let last = snapshot.page(99, 2);
        assert_eq!(last.page, 2);
        assert_eq!(last.entries.len(), 1);

        assert_eq!(snapshot.page(0, 2).label(0), "NOW PLAYING");
        assert_eq!(page.label(3), "3.");

        assert_eq!(SessionQueue::new().snapshot().page(0, 10).total_pages, 1);
        assert_eq!(snapshot.total_duration(), Duration::from_secs(300));
    }

    #[test]
    fn toggles_report_new_state() {
        let mut queue = queue_of(&["a"]);
        assert!(queue.toggle_loop());
        assert_eq!(queue.snapshot().page(0, 5).label(0), "LOOPING");
        assert!(!queue.toggle_loop());
        assert!(queue.toggle_shuffle());
        assert!(queue.snapshot().shuffling);
    }
}
