//! Event reconciliation: diffs a freshly fetched scoring-event list against
//! the last known list and classifies events as new, updated, or removed.
//!
//! The stats API intermittently returns an empty play-by-play for games that
//! have events. A bounded retry policy absorbs those glitches so a goal is
//! only reported as rescinded once the empty response has repeated past the
//! retry bound.

use tracing::{debug, warn};

use crate::data::models::GameEvent;

/// Number of consecutive empty responses tolerated while exactly one event
/// is known, before the empty list is accepted as ground truth.
pub const EMPTY_EVENTS_RETRIES: u32 = 5;

/// Classification of one event across two polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDelta {
    New(GameEvent),
    Updated(GameEvent),
    Removed(GameEvent),
}

/// The reconciled event snapshot for one tracked game.
///
/// Owned exclusively by that game's tracker; `reconcile` is the only
/// mutation path.
#[derive(Debug, Default)]
pub struct EventJournal {
    known: Vec<GameEvent>,
    empty_retries: u32,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn known(&self) -> &[GameEvent] {
        &self.known
    }

    #[cfg(test)]
    pub fn retries(&self) -> u32 {
        self.empty_retries
    }

    /// Diffs `fresh` against the known list and replaces the known list.
    ///
    /// Returns the deltas to act on, in order: new/updated events first (in
    /// fresh-list order), then removals. Events with no players are never
    /// eligible for notification. An empty fresh list is treated as a
    /// transient glitch while the retry budget lasts; with more than one
    /// known event it is skipped outright as an anomaly.
    pub fn reconcile(&mut self, fresh: &[GameEvent]) -> Vec<EventDelta> {
        if fresh.is_empty() && !self.known.is_empty() {
            if self.known.len() > 1 {
                warn!(
                    known = self.known.len(),
                    "Source returned no events while multiple are known; skipping cycle"
                );
                return Vec::new();
            }
            self.empty_retries += 1;
            if self.empty_retries <= EMPTY_EVENTS_RETRIES {
                warn!(
                    retries = self.empty_retries,
                    max_retries = EMPTY_EVENTS_RETRIES,
                    "Source returned no events while one is known; could be a rescinded goal, retrying"
                );
                return Vec::new();
            }
            // Retry budget exhausted: the empty list is ground truth.
        }
        self.empty_retries = 0;

        let mut deltas = Vec::new();

        for event in fresh {
            if event.players.is_empty() {
                // Incomplete data from the source; not notifiable yet.
                debug!(event_id = event.id, "Skipping event with no players");
                continue;
            }
            match self.known.iter().find(|k| k.id == event.id) {
                Some(known) if known == event => {}
                Some(_) => {
                    debug!(event_id = event.id, "Updated event");
                    deltas.push(EventDelta::Updated(event.clone()));
                }
                None => {
                    debug!(event_id = event.id, "New event");
                    deltas.push(EventDelta::New(event.clone()));
                }
            }
        }

        for known in &self.known {
            if !fresh.iter().any(|e| e.id == known.id) {
                debug!(event_id = known.id, "Removed event");
                deltas.push(EventDelta::Removed(known.clone()));
            }
        }

        self.known = fresh.to_vec();
        deltas
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::{EventStrength, Player, Team};

    fn event(id: i64, strength: EventStrength, players: Vec<Player>) -> GameEvent {
        GameEvent {
            id,
            team: Team::VancouverCanucks,
            strength,
            period: "1st".to_string(),
            players,
        }
    }

    fn scorer(id: i64, name: &str) -> Player {
        Player::new(id, name, "Scorer")
    }

    #[test]
    fn new_event_is_classified_once() {
        let mut journal = EventJournal::new();
        let e1 = event(1, EventStrength::Even, vec![scorer(10, "A")]);

        let deltas = journal.reconcile(std::slice::from_ref(&e1));
        assert_eq!(deltas, vec![EventDelta::New(e1.clone())]);

        // Second identical poll produces nothing.
        let deltas = journal.reconcile(&[e1]);
        assert!(deltas.is_empty());
    }

    #[test]
    fn changed_strength_is_update_not_new_plus_removed() {
        let mut journal = EventJournal::new();
        let e1 = event(1, EventStrength::Even, vec![scorer(10, "A")]);
        journal.reconcile(std::slice::from_ref(&e1));

        let mut e1b = e1.clone();
        e1b.strength = EventStrength::PowerPlay;
        let deltas = journal.reconcile(std::slice::from_ref(&e1b));
        assert_eq!(deltas, vec![EventDelta::Updated(e1b)]);
    }

    #[test]
    fn missing_event_is_removed() {
        let mut journal = EventJournal::new();
        let e1 = event(1, EventStrength::Even, vec![scorer(10, "A")]);
        let e2 = event(2, EventStrength::Even, vec![scorer(11, "B")]);
        journal.reconcile(&[e1.clone(), e2.clone()]);

        let deltas = journal.reconcile(std::slice::from_ref(&e1));
        assert_eq!(deltas, vec![EventDelta::Removed(e2)]);
    }

    #[test]
    fn empty_fetches_retry_five_times_then_accept() {
        let mut journal = EventJournal::new();
        let e1 = event(1, EventStrength::Even, vec![scorer(10, "A")]);
        journal.reconcile(std::slice::from_ref(&e1));

        // Cycles 1-5: glitch tolerance, known list unchanged.
        for _ in 0..EMPTY_EVENTS_RETRIES {
            let deltas = journal.reconcile(&[]);
            assert!(deltas.is_empty());
            assert_eq!(journal.known().len(), 1);
        }

        // Cycle 6: empty list accepted, event is rescinded.
        let deltas = journal.reconcile(&[]);
        assert_eq!(deltas, vec![EventDelta::Removed(e1)]);
        assert!(journal.known().is_empty());
    }

    #[test]
    fn non_empty_fetch_resets_retry_counter() {
        let mut journal = EventJournal::new();
        let e1 = event(1, EventStrength::Even, vec![scorer(10, "A")]);
        journal.reconcile(std::slice::from_ref(&e1));

        journal.reconcile(&[]);
        journal.reconcile(&[]);
        assert_eq!(journal.retries(), 2);

        journal.reconcile(std::slice::from_ref(&e1));
        assert_eq!(journal.retries(), 0);
    }

    #[test]
    fn empty_fetch_with_multiple_known_events_is_skipped_without_retry() {
        let mut journal = EventJournal::new();
        let e1 = event(1, EventStrength::Even, vec![scorer(10, "A")]);
        let e2 = event(2, EventStrength::Even, vec![scorer(11, "B")]);
        journal.reconcile(&[e1, e2]);

        for _ in 0..20 {
            let deltas = journal.reconcile(&[]);
            assert!(deltas.is_empty());
            assert_eq!(journal.known().len(), 2);
        }
        assert_eq!(journal.retries(), 0);
    }

    #[test]
    fn events_without_players_are_not_notifiable() {
        let mut journal = EventJournal::new();
        let bare = event(1, EventStrength::Even, Vec::new());

        let deltas = journal.reconcile(std::slice::from_ref(&bare));
        assert!(deltas.is_empty());
        // Still stored; it becomes notifiable once players arrive.
        assert_eq!(journal.known().len(), 1);

        let filled = event(1, EventStrength::Even, vec![scorer(10, "A")]);
        let deltas = journal.reconcile(std::slice::from_ref(&filled));
        assert_eq!(deltas, vec![EventDelta::Updated(filled)]);
    }
}
