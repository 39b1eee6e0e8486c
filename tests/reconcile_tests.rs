//! End-to-end reconciliation and channel-lifecycle tests, run through the
//! public library surface with the in-memory gateway.
//!
//! Modules under test:
//!   1. Channel lifecycle idempotency   (src/bot/channels.rs)
//!   2. Event reconciliation policy     (src/data/reconcile.rs)
//!   3. Tracker notification flow       (src/bot/tracker.rs)

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use gameday_bot::api::errors::ApiError;
use gameday_bot::api::SportsDataSource;
use gameday_bot::bot::channels::{channel_name, ensure_game_channel};
use gameday_bot::bot::tracker::{GameTracker, NextGameSource, TrackerConfig};
use gameday_bot::data::models::{
    EventStrength, Game, GameEvent, GameStatus, GameUpdate, Player, Team,
};
use gameday_bot::data::reconcile::{EventDelta, EventJournal};
use gameday_bot::gateway::memory::MemoryGateway;

// =============================================================================
// Helpers
// =============================================================================

fn make_game(status: GameStatus) -> Game {
    Game {
        id: 2016020015,
        home_team: Team::VancouverCanucks,
        away_team: Team::EdmontonOilers,
        start: Utc.with_ymd_and_hms(2016, 10, 16, 2, 0, 0).unwrap(),
        status,
        home_score: 0,
        away_score: 0,
        events: Vec::new(),
    }
}

fn goal(id: i64, strength: EventStrength, scorer: &str) -> GameEvent {
    GameEvent {
        id,
        team: Team::VancouverCanucks,
        strength,
        period: "1st".to_string(),
        players: vec![Player::new(id * 100, scorer, "Scorer")],
    }
}

fn update(status: GameStatus, events: Vec<GameEvent>) -> GameUpdate {
    GameUpdate {
        status,
        home_score: events.len() as u32,
        away_score: 0,
        events,
    }
}

/// Data source that replays a scripted sequence of updates, then repeats
/// the last one.
struct ScriptedSource {
    updates: Mutex<VecDeque<GameUpdate>>,
    last: Mutex<Option<GameUpdate>>,
}

impl ScriptedSource {
    fn new(updates: Vec<GameUpdate>) -> Self {
        Self {
            updates: Mutex::new(updates.into()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl SportsDataSource for ScriptedSource {
    async fn schedule(
        &self,
        _team: Team,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Game>, ApiError> {
        Ok(Vec::new())
    }

    async fn fetch_game(&self, game: &Game) -> Result<GameUpdate, ApiError> {
        let mut updates = self.updates.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        match updates.pop_front() {
            Some(u) => {
                *last = Some(u.clone());
                Ok(u)
            }
            None => last.clone().ok_or(ApiError::GameNotFound(game.id)),
        }
    }
}

struct NoNextGame;

impl NextGameSource for NoNextGame {
    fn next_game(&self, _team: Team) -> Option<Game> {
        None
    }
}

async fn run_tracker(source: ScriptedSource, game: Game) -> Arc<MemoryGateway> {
    let gateway = Arc::new(MemoryGateway::new());
    let config = TrackerConfig {
        idle_poll: Duration::from_millis(5),
        active_poll: Duration::from_millis(5),
        post_game_window: Duration::from_millis(15),
        ..TrackerConfig::default()
    };
    let tracker = GameTracker::new(
        Arc::new(source),
        gateway.clone(),
        Arc::new(NoNextGame),
        Team::VancouverCanucks,
        game,
        config,
        CancellationToken::new(),
    );
    tracker.spawn().join().await;
    gateway
}

// =============================================================================
// Channel lifecycle idempotency
// =============================================================================

#[tokio::test]
async fn ensure_game_channel_is_idempotent() {
    let gateway = MemoryGateway::new();
    let game = make_game(GameStatus::Preview);

    let first = ensure_game_channel(&gateway, &game, Team::VancouverCanucks).await;
    let second = ensure_game_channel(&gateway, &game, Team::VancouverCanucks).await;

    // One underlying channel, addressed by both calls.
    assert_eq!(first.as_ref().map(|c| &c.id), second.as_ref().map(|c| &c.id));
    assert_eq!(gateway.channel_names(), vec![channel_name(&game)]);

    // Exactly one details message, pinned, sent on creation only.
    let name = channel_name(&game);
    assert_eq!(gateway.messages_in(&name).len(), 1);
    assert_eq!(gateway.pinned_texts(&name).len(), 1);
    assert!(gateway.messages_in(&name)[0].contains("**Vancouver Canucks** vs **Edmonton Oilers**"));

    // Topic carries the team cheer.
    assert_eq!(gateway.topic_of(&name).as_deref(), Some("Go Canucks Go!"));
}

// =============================================================================
// Event reconciliation policy
// =============================================================================

#[test]
fn transient_empty_fetches_retry_then_accept_as_removal() {
    let mut journal = EventJournal::new();
    let e1 = goal(1, EventStrength::Even, "Bo Horvat");

    let deltas = journal.reconcile(std::slice::from_ref(&e1));
    assert_eq!(deltas, vec![EventDelta::New(e1.clone())]);

    // Five empty fetches: nothing emitted, known list unchanged.
    for _ in 0..5 {
        assert!(journal.reconcile(&[]).is_empty());
    }

    // Sixth empty fetch: accepted as ground truth, goal rescinded.
    let deltas = journal.reconcile(&[]);
    assert_eq!(deltas, vec![EventDelta::Removed(e1)]);
}

#[test]
fn strength_change_is_an_update_not_a_replacement() {
    let mut journal = EventJournal::new();
    let even = goal(1, EventStrength::Even, "Bo Horvat");
    journal.reconcile(std::slice::from_ref(&even));

    let power_play = goal(1, EventStrength::PowerPlay, "Bo Horvat");
    let deltas = journal.reconcile(std::slice::from_ref(&power_play));
    assert_eq!(deltas, vec![EventDelta::Updated(power_play)]);
}

// =============================================================================
// Tracker notification flow
// =============================================================================

#[tokio::test]
async fn goal_lifecycle_new_then_updated_then_rescinded() {
    let new_goal = goal(1, EventStrength::Even, "Bo Horvat");
    let upgraded = goal(1, EventStrength::PowerPlay, "Bo Horvat");

    let source = ScriptedSource::new(vec![
        // First fetch is consumed while confirming the game has started.
        update(GameStatus::Live, vec![]),
        update(GameStatus::Live, vec![new_goal]),
        // Same id, changed strength: must edit the notification in place.
        update(GameStatus::Live, vec![upgraded]),
        // Goal disappears for good; the journal's retry budget is consumed
        // by the repeating empty fetch before the tracker winds down.
        update(GameStatus::Live, vec![]),
        update(GameStatus::Live, vec![]),
        update(GameStatus::Live, vec![]),
        update(GameStatus::Live, vec![]),
        update(GameStatus::Live, vec![]),
        update(GameStatus::Live, vec![]),
        update(GameStatus::Final, vec![]),
    ]);

    let gateway = run_tracker(source, make_game(GameStatus::Live)).await;
    let messages = gateway.messages_in("van-vs-edm-16-10-15");

    // The notification was edited in place, so only the power play variant
    // survives.
    let goal_messages: Vec<&String> = messages
        .iter()
        .filter(|m| m.contains("goal by **Bo Horvat**"))
        .collect();
    assert_eq!(goal_messages.len(), 1);
    assert!(goal_messages[0].contains("power play"));

    assert!(messages
        .iter()
        .any(|m| m.contains("Goal by Bo Horvat has been rescinded.")));
}

#[tokio::test]
async fn empty_player_events_are_never_announced() {
    let bare = GameEvent {
        id: 9,
        team: Team::VancouverCanucks,
        strength: EventStrength::Even,
        period: "1st".to_string(),
        players: Vec::new(),
    };
    let source = ScriptedSource::new(vec![
        update(GameStatus::Live, vec![]),
        update(GameStatus::Live, vec![bare.clone()]),
        update(GameStatus::Final, vec![bare]),
    ]);

    let gateway = run_tracker(source, make_game(GameStatus::Live)).await;
    let messages = gateway.messages_in("van-vs-edm-16-10-15");
    assert!(!messages.iter().any(|m| m.contains("goal by")));
}
