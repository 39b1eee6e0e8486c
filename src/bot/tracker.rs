//! Per-game tracking worker.
//!
//! One tracker per actively tracked game, running as its own task. It owns
//! the game's live state machine:
//!
//! `PreGame -> Reminders -> WaitingForStart -> Live -> PostGame -> Finished`
//!
//! The tracker polls the stats source at an idle rate far from game start
//! and an active rate near/inside the game, reconciles scoring events on
//! every live cycle, and drives all channel and message updates. Everything
//! it mutates is privately owned; the only outward signal is the shared
//! finished flag the orchestrator sweeps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::SportsDataSource;
use crate::bot::channels::{
    channel_name, end_of_game_message, ensure_game_channel, event_message, rescinded_message,
    start_of_game_message,
};
use crate::data::models::{Game, GameStatus, Team};
use crate::data::reconcile::{EventDelta, EventJournal};
use crate::gateway::{ChannelHandle, MessageHandle, MessagingGateway};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Poll rate when the game is not close to starting.
    pub idle_poll: Duration,
    /// Poll rate when the game is about to start or in progress.
    pub active_poll: Duration,
    /// Time before scheduled start at which polling switches to active.
    pub close_to_start: Duration,
    /// How long to keep re-polling after the game turns Final.
    pub post_game_window: Duration,
    /// Reminder thresholds (ms before start) and their messages.
    pub reminders: Vec<(i64, String)>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_secs(60),
            active_poll: Duration::from_secs(5),
            close_to_start: Duration::from_secs(300),
            post_game_window: Duration::from_secs(600),
            reminders: vec![
                (3_600_000, "60 minutes till puck drop.".to_string()),
                (1_800_000, "30 minutes till puck drop.".to_string()),
                (600_000, "10 minutes till puck drop.".to_string()),
            ],
        }
    }
}

// =============================================================================
// Reminders
// =============================================================================

/// Tracks which pre-game reminder thresholds have been crossed.
///
/// Each threshold fires at most once, in descending-threshold order, and
/// never on the very first observation — a tracker started inside a
/// reminder window must not fire the reminders it has already missed.
#[derive(Debug)]
pub struct ReminderSchedule {
    pending: Vec<(i64, String)>,
    first_check: bool,
}

impl ReminderSchedule {
    pub fn new(thresholds: &[(i64, String)]) -> Self {
        Self {
            pending: thresholds.to_vec(),
            first_check: true,
        }
    }

    /// Observes the current time-to-start and returns the reminder to send
    /// now, if any. Crossed thresholds are consumed even when suppressed.
    pub fn observe(&mut self, time_till_start_ms: i64) -> Option<String> {
        let mut fired: Option<(i64, String)> = None;
        self.pending.retain(|(threshold, message)| {
            if *threshold > time_till_start_ms {
                match &fired {
                    Some((lowest, _)) if *lowest <= *threshold => {}
                    _ => fired = Some((*threshold, message.clone())),
                }
                false
            } else {
                true
            }
        });

        let first = std::mem::replace(&mut self.first_check, false);
        if first {
            None
        } else {
            fired.map(|(_, message)| message)
        }
    }
}

// =============================================================================
// Tracker state
// =============================================================================

/// Source of "what does this team play next", consulted for the end-of-game
/// summary. Implemented by the season schedule.
pub trait NextGameSource: Send + Sync {
    fn next_game(&self, team: Team) -> Option<Game>;
}

/// Everything a tracker privately owns about its game's channel presence.
#[derive(Debug, Default)]
struct TrackedGameState {
    journal: EventJournal,
    channel: Option<ChannelHandle>,
    /// event id -> notification message, for in-place edits.
    event_messages: HashMap<i64, MessageHandle>,
    end_of_game_message: Option<MessageHandle>,
}

/// Handle the orchestrator keeps for a spawned tracker.
pub struct TrackerHandle {
    pub game: Game,
    finished: Arc<AtomicBool>,
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl TrackerHandle {
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Requests cooperative shutdown. The tracker exits at its next loop
    /// boundary or sleep.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) {
        let _ = self.join.await;
    }
}

// =============================================================================
// Tracker
// =============================================================================

pub struct GameTracker {
    source: Arc<dyn SportsDataSource>,
    gateway: Arc<dyn MessagingGateway>,
    schedule: Arc<dyn NextGameSource>,
    /// The team whose readers this channel serves; picks the cheer, time
    /// zone, and next-game lookup.
    team: Team,
    game: Game,
    config: TrackerConfig,
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
    state: TrackedGameState,
}

impl GameTracker {
    pub fn new(
        source: Arc<dyn SportsDataSource>,
        gateway: Arc<dyn MessagingGateway>,
        schedule: Arc<dyn NextGameSource>,
        team: Team,
        game: Game,
        config: TrackerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            gateway,
            schedule,
            team,
            game,
            config,
            cancel,
            finished: Arc::new(AtomicBool::new(false)),
            state: TrackedGameState::default(),
        }
    }

    /// Spawns the tracker as its own task and returns the handle the
    /// orchestrator keeps.
    pub fn spawn(self) -> TrackerHandle {
        let game = self.game.clone();
        let finished = self.finished.clone();
        let cancel = self.cancel.clone();
        let join = tokio::spawn(self.run());
        TrackerHandle {
            game,
            finished,
            cancel,
            join,
        }
    }

    async fn run(mut self) {
        let name = channel_name(&self.game);
        info!(channel = %name, game = %self.game, "Tracker started");

        if self.game.is_ended() {
            info!(channel = %name, "Game is already final; nothing to track");
        } else {
            self.track().await;
        }

        self.finished.store(true, Ordering::Release);
        info!(channel = %name, "Tracker finished");
    }

    async fn track(&mut self) {
        // PreGame: make sure the channel exists before anything is sent.
        self.state.channel = ensure_game_channel(&*self.gateway, &self.game, self.team).await;

        // Reminders: idle-rate polling until close to start.
        self.send_reminders().await;
        if self.cancel.is_cancelled() {
            return;
        }

        // WaitingForStart: active-rate polling until status leaves Preview.
        let already_started = self.wait_for_start().await;
        if self.cancel.is_cancelled() {
            return;
        }

        if already_started {
            info!(game = %self.game, "Game had already started when tracking began");
        } else {
            info!(game = %self.game, "Game is starting");
            self.send(&start_of_game_message(self.team)).await;
        }

        // Live/PostGame: if the source flips the game back out of Final
        // during the post-game window, loop back into live tracking.
        while self.game.status != GameStatus::Final && !self.cancel.is_cancelled() {
            self.live_updates().await;
            if self.cancel.is_cancelled() {
                return;
            }

            self.send_end_of_game_message().await;
            self.update_pinned_message().await;

            self.post_game_updates().await;
        }
    }

    // =========================================================================
    // Phases
    // =========================================================================

    async fn send_reminders(&mut self) {
        let mut schedule = ReminderSchedule::new(&self.config.reminders);
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let remaining_ms = (self.game.start - Utc::now()).num_milliseconds();
            if remaining_ms < self.config.close_to_start.as_millis() as i64 {
                return;
            }
            if let Some(message) = schedule.observe(remaining_ms) {
                self.send(&message).await;
            }
            debug!(remaining_ms, "Idling until near game start");
            if !self.idle(self.config.idle_poll).await {
                return;
            }
        }
    }

    /// Polls at the active rate until the game leaves Preview. Returns
    /// whether the game had already started before the first check, in
    /// which case the start announcement must be suppressed.
    async fn wait_for_start(&mut self) -> bool {
        let already_started = self.game.status != GameStatus::Preview;
        loop {
            if self.cancel.is_cancelled() {
                return already_started;
            }
            self.refresh_game().await;
            if self.game.status != GameStatus::Preview {
                return already_started;
            }
            debug!(game = %self.game, "Game almost started");
            if !self.idle(self.config.active_poll).await {
                return already_started;
            }
        }
    }

    async fn live_updates(&mut self) {
        while self.game.status != GameStatus::Final && !self.cancel.is_cancelled() {
            self.update_messages().await;
            if self.game.status != GameStatus::Final && !self.cancel.is_cancelled() {
                debug!(game = %self.game, "Game in progress");
                if !self.idle(self.config.active_poll).await {
                    return;
                }
            }
        }
    }

    /// Re-polls for a bounded window after the game turns Final, picking up
    /// late corrections. Exits early if the status regresses (the caller
    /// loops back into live tracking) or on cancellation.
    async fn post_game_updates(&mut self) {
        let mut elapsed = Duration::ZERO;
        while elapsed < self.config.post_game_window
            && self.game.status == GameStatus::Final
            && !self.cancel.is_cancelled()
        {
            self.update_messages().await;
            self.update_end_of_game_message().await;
            self.update_pinned_message().await;
            if self.game.status == GameStatus::Final && !self.cancel.is_cancelled() {
                if !self.idle(self.config.idle_poll).await {
                    return;
                }
                elapsed += self.config.idle_poll;
            }
        }
    }

    // =========================================================================
    // Polling and reconciliation
    // =========================================================================

    /// One refresh from the source. Failures abort this cycle only; the
    /// next poll retries.
    async fn refresh_game(&mut self) -> bool {
        match self.source.fetch_game(&self.game).await {
            Ok(update) => {
                self.game.apply(update);
                true
            }
            Err(e) => {
                warn!(game = %self.game, error = %e, "Failed to refresh game");
                false
            }
        }
    }

    /// Refreshes the game and turns event deltas into channel traffic.
    async fn update_messages(&mut self) {
        if !self.refresh_game().await {
            return;
        }
        let fresh = self.game.events.clone();
        let deltas = self.state.journal.reconcile(&fresh);

        for delta in deltas {
            match delta {
                EventDelta::New(event) => {
                    info!(event_id = event.id, "New scoring event");
                    if let Some(handle) = self.send(&event_message(&event)).await {
                        self.state.event_messages.insert(event.id, handle);
                    }
                }
                EventDelta::Updated(event) => {
                    info!(event_id = event.id, "Scoring event updated");
                    let text = event_message(&event);
                    match self.state.event_messages.get(&event.id) {
                        Some(handle) => match self.gateway.update_message(handle, &text).await {
                            Ok(updated) => {
                                self.state.event_messages.insert(event.id, updated);
                            }
                            Err(e) => {
                                warn!(event_id = event.id, error = %e, "Failed to update event message")
                            }
                        },
                        None => {
                            // Tracker may have started mid-game; announce it fresh.
                            warn!(event_id = event.id, "No message exists for updated event");
                            if let Some(handle) = self.send(&text).await {
                                self.state.event_messages.insert(event.id, handle);
                            }
                        }
                    }
                }
                EventDelta::Removed(event) => {
                    info!(event_id = event.id, "Scoring event rescinded");
                    if let Some(text) = rescinded_message(&event) {
                        self.send(&text).await;
                    }
                    self.state.event_messages.remove(&event.id);
                }
            }
        }
    }

    // =========================================================================
    // Summary messages
    // =========================================================================

    fn end_of_game_text(&self) -> String {
        let next = self.schedule.next_game(self.team);
        end_of_game_message(&self.game, self.team, next.as_ref())
    }

    async fn send_end_of_game_message(&mut self) {
        info!(game = %self.game, "Sending end of game message");
        let text = self.end_of_game_text();
        self.state.end_of_game_message = self.send(&text).await;
    }

    async fn update_end_of_game_message(&mut self) {
        let text = self.end_of_game_text();
        match &self.state.end_of_game_message {
            Some(handle) => match self.gateway.update_message(handle, &text).await {
                Ok(updated) => self.state.end_of_game_message = Some(updated),
                Err(e) => warn!(error = %e, "Failed to update end of game message"),
            },
            None => warn!("End of game message does not exist yet"),
        }
    }

    /// Refreshes the bot's own pinned message with the current summary.
    async fn update_pinned_message(&mut self) {
        let Some(channel) = self.state.channel.clone() else {
            return;
        };
        let pins = match self.gateway.pinned_messages(&channel).await {
            Ok(pins) => pins,
            Err(e) => {
                warn!(error = %e, "Failed to list pinned messages");
                return;
            }
        };
        if let Some(pin) = pins.iter().find(|p| p.own) {
            let text = self.end_of_game_text();
            if let Err(e) = self.gateway.update_message(&pin.handle, &text).await {
                warn!(error = %e, "Failed to update pinned message");
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Fire-and-forget send into this game's channel; failures are logged
    /// and swallowed so the state machine keeps going.
    async fn send(&self, text: &str) -> Option<MessageHandle> {
        let channel = self.state.channel.as_ref()?;
        match self.gateway.send_message(channel, text).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(channel = %channel.name, error = %e, "Failed to send message");
                None
            }
        }
    }

    /// Cancellable sleep. Returns false when cancelled mid-sleep.
    async fn idle(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::errors::ApiError;
    use crate::data::models::{EventStrength, GameEvent, GameUpdate, Player};
    use crate::gateway::memory::MemoryGateway;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // =========================================================================
    // ReminderSchedule
    // =========================================================================

    fn default_reminders() -> Vec<(i64, String)> {
        TrackerConfig::default().reminders
    }

    #[test]
    fn reminders_fire_once_each_in_descending_order() {
        let mut schedule = ReminderSchedule::new(&default_reminders());
        let observations = [7_200_000, 3_500_000, 1_700_000, 400_000];
        let fired: Vec<Option<String>> = observations
            .iter()
            .map(|&t| schedule.observe(t))
            .collect();
        assert_eq!(
            fired,
            vec![
                None,
                Some("60 minutes till puck drop.".to_string()),
                Some("30 minutes till puck drop.".to_string()),
                Some("10 minutes till puck drop.".to_string()),
            ]
        );
        // Nothing left to fire.
        assert_eq!(schedule.observe(0), None);
    }

    #[test]
    fn reminders_never_fire_on_first_observation() {
        let mut schedule = ReminderSchedule::new(&default_reminders());
        // First observation is already inside the 60-minute window; that
        // reminder is consumed silently.
        assert_eq!(schedule.observe(1_900_000), None);
        assert_eq!(
            schedule.observe(1_700_000),
            Some("30 minutes till puck drop.".to_string())
        );
        assert_eq!(
            schedule.observe(500_000),
            Some("10 minutes till puck drop.".to_string())
        );
    }

    #[test]
    fn crossing_multiple_thresholds_fires_only_the_lowest() {
        let mut schedule = ReminderSchedule::new(&default_reminders());
        assert_eq!(schedule.observe(7_200_000), None);
        // Jumped from outside all windows to inside the 10-minute one.
        assert_eq!(
            schedule.observe(400_000),
            Some("10 minutes till puck drop.".to_string())
        );
        assert_eq!(schedule.observe(100_000), None);
    }

    // =========================================================================
    // Tracker state machine
    // =========================================================================

    /// Data source that replays a scripted sequence of updates, then keeps
    /// returning the last one.
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
            _start: chrono::NaiveDate,
            _end: chrono::NaiveDate,
        ) -> Result<Vec<Game>, ApiError> {
            Ok(Vec::new())
        }

        async fn fetch_game(&self, game: &Game) -> Result<GameUpdate, ApiError> {
            let mut updates = self.updates.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            match updates.pop_front() {
                Some(update) => {
                    *last = Some(update.clone());
                    Ok(update)
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

    fn test_config() -> TrackerConfig {
        TrackerConfig {
            idle_poll: Duration::from_millis(5),
            active_poll: Duration::from_millis(5),
            close_to_start: Duration::from_secs(300),
            post_game_window: Duration::from_millis(15),
            reminders: default_reminders(),
        }
    }

    fn game(status: GameStatus) -> Game {
        Game {
            id: 2016020015,
            home_team: Team::VancouverCanucks,
            away_team: Team::EdmontonOilers,
            // Started in the past so the reminder phase exits immediately.
            start: chrono::Utc
                .with_ymd_and_hms(2016, 10, 16, 2, 0, 0)
                .unwrap(),
            status,
            home_score: 0,
            away_score: 0,
            events: Vec::new(),
        }
    }

    fn update(status: GameStatus, events: Vec<GameEvent>) -> GameUpdate {
        GameUpdate {
            status,
            home_score: 1,
            away_score: 0,
            events,
        }
    }

    fn goal(id: i64) -> GameEvent {
        GameEvent {
            id,
            team: Team::VancouverCanucks,
            strength: EventStrength::Even,
            period: "1st".to_string(),
            players: vec![Player::new(8477500, "Bo Horvat", "Scorer")],
        }
    }

    async fn run_tracker(
        source: ScriptedSource,
        game: Game,
    ) -> (Arc<MemoryGateway>, TrackerHandle) {
        let gateway = Arc::new(MemoryGateway::new());
        let tracker = GameTracker::new(
            Arc::new(source),
            gateway.clone(),
            Arc::new(NoNextGame),
            Team::VancouverCanucks,
            game,
            test_config(),
            CancellationToken::new(),
        );
        let handle = tracker.spawn();
        (gateway, handle)
    }

    #[tokio::test]
    async fn already_final_game_finishes_without_any_work() {
        let source = ScriptedSource::new(Vec::new());
        let (gateway, handle) = run_tracker(source, game(GameStatus::Final)).await;
        handle.join().await;
        assert!(gateway.channel_names().is_empty());
    }

    #[tokio::test]
    async fn preview_game_gets_start_message_and_goal_notifications() {
        let source = ScriptedSource::new(vec![
            // WaitingForStart sees Preview once, then the game begins.
            update(GameStatus::Preview, Vec::new()),
            update(GameStatus::Live, Vec::new()),
            update(GameStatus::Live, vec![goal(1)]),
            update(GameStatus::Final, vec![goal(1)]),
        ]);
        let (gateway, handle) = run_tracker(source, game(GameStatus::Preview)).await;
        handle.join().await;

        let messages = gateway.messages_in("van-vs-edm-16-10-15");
        assert!(messages
            .iter()
            .any(|m| m.contains("Game is about to start!")));
        assert!(messages
            .iter()
            .any(|m| m.contains("goal by **Bo Horvat**")));
        assert!(messages.iter().any(|m| m.contains("Game has ended")));
    }

    #[tokio::test]
    async fn start_message_is_suppressed_when_game_already_started() {
        let source = ScriptedSource::new(vec![
            update(GameStatus::Live, Vec::new()),
            update(GameStatus::Final, Vec::new()),
        ]);
        // Status was already Live when the tracker was created.
        let (gateway, handle) = run_tracker(source, game(GameStatus::Live)).await;
        handle.join().await;

        let messages = gateway.messages_in("van-vs-edm-16-10-15");
        assert!(!messages
            .iter()
            .any(|m| m.contains("Game is about to start!")));
        assert!(messages.iter().any(|m| m.contains("Game has ended")));
    }

    #[tokio::test]
    async fn channel_reuse_skips_details_message() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway
            .find_or_create_channel("van-vs-edm-16-10-15")
            .await
            .unwrap();

        let source = ScriptedSource::new(vec![update(GameStatus::Final, Vec::new())]);
        let tracker = GameTracker::new(
            Arc::new(source),
            gateway.clone(),
            Arc::new(NoNextGame),
            Team::VancouverCanucks,
            game(GameStatus::Live),
            test_config(),
            CancellationToken::new(),
        );
        tracker.spawn().join().await;

        // No pinned details message was sent into the pre-existing channel.
        assert!(gateway.pinned_texts("van-vs-edm-16-10-15").is_empty());
        assert_eq!(gateway.channel_names().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_tracker_promptly() {
        // Preview forever: without cancellation this would never finish.
        let source = ScriptedSource::new(vec![update(GameStatus::Preview, Vec::new())]);
        let (_, handle) = run_tracker(source, game(GameStatus::Preview)).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        handle.stop();
        handle.join().await;
    }

    #[tokio::test]
    async fn status_regression_in_post_game_resumes_live_tracking() {
        let source = ScriptedSource::new(vec![
            update(GameStatus::Live, vec![goal(1)]),
            // Final once, then the source flips back to Live with a second
            // goal, then Final for good.
            update(GameStatus::Final, vec![goal(1)]),
            update(GameStatus::Live, vec![goal(1), goal(2)]),
            update(GameStatus::Final, vec![goal(1), goal(2)]),
        ]);
        let (gateway, handle) = run_tracker(source, game(GameStatus::Live)).await;
        handle.join().await;

        let messages = gateway.messages_in("van-vs-edm-16-10-15");
        let goals = messages
            .iter()
            .filter(|m| m.contains("goal by **Bo Horvat**"))
            .count();
        assert_eq!(goals, 2);
        // End-of-game message sent again after the regression.
        let endings = messages
            .iter()
            .filter(|m| m.contains("Game has ended"))
            .count();
        assert_eq!(endings, 2);
    }
}
