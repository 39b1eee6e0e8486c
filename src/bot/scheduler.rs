//! Season schedule orchestration.
//!
//! The orchestrator owns the authoritative season game list and a bounded
//! per-team window of games of interest, spawns one tracker per windowed
//! game, and runs the periodic maintenance loop that rolls windows forward
//! and tears down stale channels. All window and registry mutation happens
//! on the orchestrator's own task; trackers only report termination through
//! their finished flag.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{errors::ApiError, SportsDataSource};
use crate::bot::channels::{channel_name, ensure_game_channel, is_channel_name_format};
use crate::bot::tracker::{GameTracker, NextGameSource, TrackerConfig, TrackerHandle};
use crate::data::models::{Game, GameStatus, Team};
use crate::gateway::MessagingGateway;

const TEAM_COUNT: usize = Team::ALL.len();

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Interval between maintenance cycles.
    pub maintenance_interval: Duration,
    pub tracker: TrackerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: Duration::from_secs(1800),
            tracker: TrackerConfig::default(),
        }
    }
}

// =============================================================================
// Season
// =============================================================================

/// The authoritative season game list, deduplicated and sorted by start.
/// Shared read-only with trackers for next-game lookups; mutated only by
/// the orchestrator (marking finished games Final).
#[derive(Debug, Default)]
pub struct Season {
    games: RwLock<Vec<Game>>,
}

impl Season {
    pub fn new(games: Vec<Game>) -> Self {
        Self {
            games: RwLock::new(games),
        }
    }

    pub fn games(&self) -> Vec<Game> {
        self.games.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.games.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks the season-list copy of a game Final, so subsequent next/last
    /// lookups see it. Tracker-side refreshes never reach this list.
    pub fn mark_final(&self, game_id: i64) {
        let mut games = self.games.write().unwrap_or_else(|e| e.into_inner());
        if let Some(game) = games.iter_mut().find(|g| g.id == game_id) {
            game.status = GameStatus::Final;
        }
    }

    /// The team's nth upcoming game, ascending by start. An index past the
    /// end clamps to the last available entry; `None` only when the team
    /// has no upcoming games at all.
    pub fn future_game(&self, team: Team, index: usize) -> Option<Game> {
        let games = self.games.read().unwrap_or_else(|e| e.into_inner());
        let upcoming: Vec<&Game> = games
            .iter()
            .filter(|g| g.contains_team(team) && g.status == GameStatus::Preview)
            .collect();
        let clamped = index.min(upcoming.len().checked_sub(1)?);
        upcoming.get(clamped).map(|g| (*g).clone())
    }

    /// The team's nth most recent completed game, descending from the
    /// latest. Clamps like `future_game`.
    pub fn past_game(&self, team: Team, index: usize) -> Option<Game> {
        let games = self.games.read().unwrap_or_else(|e| e.into_inner());
        let completed: Vec<&Game> = games
            .iter()
            .rev()
            .filter(|g| g.contains_team(team) && g.is_ended())
            .collect();
        let clamped = index.min(completed.len().checked_sub(1)?);
        completed.get(clamped).map(|g| (*g).clone())
    }

    /// The team's in-progress game, if any.
    pub fn current_game(&self, team: Team) -> Option<Game> {
        let games = self.games.read().unwrap_or_else(|e| e.into_inner());
        games
            .iter()
            .find(|g| g.contains_team(team) && g.status.is_started())
            .cloned()
    }
}

impl NextGameSource for Season {
    fn next_game(&self, team: Team) -> Option<Game> {
        self.future_game(team, 0)
    }
}

/// Inclusive date range covering the league season that `today` falls in.
/// Seasons run across the year boundary, so the range pivots on August.
pub fn season_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start_year = if today.month() >= 8 {
        today.year()
    } else {
        today.year() - 1
    };
    let start = NaiveDate::from_ymd_opt(start_year, 8, 1).unwrap_or(today);
    let end = NaiveDate::from_ymd_opt(start_year + 1, 6, 30).unwrap_or(today);
    (start, end)
}

// =============================================================================
// Team windows
// =============================================================================

/// Fixed-size window table, one slot per cataloged team. Each slot is an
/// ordered list of games of interest, bounded at 2 by maintenance-time
/// eviction.
#[derive(Debug)]
struct TeamWindows {
    slots: [Vec<Game>; TEAM_COUNT],
}

impl TeamWindows {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Vec::new()),
        }
    }

    fn get(&self, team: Team) -> &[Game] {
        &self.slots[team.index()]
    }

    fn get_mut(&mut self, team: Team) -> &mut Vec<Game> {
        &mut self.slots[team.index()]
    }

    /// Appends unless the game is already in the team's window.
    fn push(&mut self, team: Team, game: Game) {
        let slot = self.get_mut(team);
        if !slot.iter().any(|g| g.id == game.id) {
            slot.push(game);
        }
    }

    fn contains(&self, game_id: i64) -> bool {
        self.slots.iter().flatten().any(|g| g.id == game_id)
    }

    /// All windowed games, deduplicated by id.
    fn games(&self) -> Vec<Game> {
        let mut games: Vec<Game> = Vec::new();
        for game in self.slots.iter().flatten() {
            if !games.iter().any(|g| g.id == game.id) {
                games.push(game.clone());
            }
        }
        games
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct ScheduleOrchestrator {
    source: Arc<dyn SportsDataSource>,
    gateway: Arc<dyn MessagingGateway>,
    season: Arc<Season>,
    windows: TeamWindows,
    /// Active trackers keyed by game id; one tracker per game even when the
    /// game sits in two teams' windows.
    trackers: HashMap<i64, TrackerHandle>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl ScheduleOrchestrator {
    pub fn new(
        source: Arc<dyn SportsDataSource>,
        gateway: Arc<dyn MessagingGateway>,
        config: OrchestratorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            gateway,
            season: Arc::new(Season::default()),
            windows: TeamWindows::new(),
            trackers: HashMap::new(),
            config,
            cancel,
        }
    }

    pub fn season(&self) -> Arc<Season> {
        self.season.clone()
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Fetches the full season schedule for every cataloged team. Fatal on
    /// failure: with no schedule there is nothing to track.
    pub async fn load_season(&mut self) -> Result<(), ApiError> {
        let (start, end) = season_bounds(Utc::now().date_naive());
        info!(%start, %end, "Loading season schedule");

        let mut games: Vec<Game> = Vec::new();
        for &team in Team::ALL {
            let team_games = self.source.schedule(team, start, end).await?;
            for game in team_games {
                // A game shared by two cataloged teams appears once.
                if !games.iter().any(|g| g.id == game.id) {
                    games.push(game);
                }
            }
        }
        games.sort_by_key(|g| g.start);

        info!(games = games.len(), "Season schedule loaded");
        self.season = Arc::new(Season::new(games));
        Ok(())
    }

    /// Seeds every team's window with its last completed game and its
    /// current live game (else next upcoming). Teams with neither get an
    /// empty window.
    pub fn initial_windows(&mut self) {
        for &team in Team::ALL {
            if let Some(last) = self.season.past_game(team, 0) {
                self.windows.push(team, last);
            }
            let active = self
                .season
                .current_game(team)
                .or_else(|| self.season.next_game(team));
            if let Some(game) = active {
                self.windows.push(team, game);
            }
        }
        debug!(games = self.windows.games().len(), "Seeded team windows");
    }

    /// Ensures a channel and (for unfinished games) a tracker exist for
    /// every windowed game, then deletes game channels that no longer map
    /// to a windowed game.
    pub async fn reconcile_channels(&mut self) {
        let windowed = self.windows.games();
        for game in &windowed {
            ensure_game_channel(&*self.gateway, game, game.home_team).await;
            if !game.is_ended() {
                self.spawn_tracker(game.clone());
            }
        }
        self.delete_stale_channels(&windowed).await;
    }

    /// Removes channels that look like game channels but match no windowed
    /// game. Channels that are not in the game-channel name format are
    /// never touched.
    async fn delete_stale_channels(&self, windowed: &[Game]) {
        let channels = match self.gateway.list_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Failed to list channels for cleanup");
                return;
            }
        };
        for channel in channels {
            let name = channel.name.to_lowercase();
            if !is_channel_name_format(&name) {
                continue;
            }
            if windowed.iter().any(|g| channel_name(g) == name) {
                continue;
            }
            info!(channel = %channel.name, "Deleting stale game channel");
            if let Err(e) = self.gateway.delete_channel(&channel).await {
                warn!(channel = %channel.name, error = %e, "Failed to delete stale channel");
            }
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Runs startup (season load, window seeding, channel reconciliation)
    /// and then the maintenance loop until cancelled.
    pub async fn run(mut self) -> Result<(), ApiError> {
        self.load_season().await?;
        self.initial_windows();
        self.reconcile_channels().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.maintenance_interval) => {}
            }
            self.maintenance().await;
        }

        info!("Orchestrator stopping; shutting down trackers");
        for (_, handle) in self.trackers.drain() {
            handle.stop();
        }
        Ok(())
    }

    /// One maintenance cycle: sweep finished trackers and roll the affected
    /// windows forward, then evict windows past the bound.
    pub async fn maintenance(&mut self) {
        self.sweep_finished_trackers().await;
        self.evict_overfull_windows().await;
    }

    async fn sweep_finished_trackers(&mut self) {
        let finished: Vec<i64> = self
            .trackers
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for game_id in finished {
            let Some(handle) = self.trackers.remove(&game_id) else {
                continue;
            };
            info!(game = %handle.game, "Tracker finished; rolling windows forward");
            self.season.mark_final(game_id);

            // Both participants' windows advance to their next game.
            for team in handle.game.teams() {
                let in_window = self.windows.get(team).iter().any(|g| g.id == game_id);
                if !in_window {
                    continue;
                }
                if let Some(windowed) = self
                    .windows
                    .get_mut(team)
                    .iter_mut()
                    .find(|g| g.id == game_id)
                {
                    windowed.status = GameStatus::Final;
                }
                match self.season.next_game(team) {
                    Some(next) => {
                        debug!(team = %team, game = %next, "Appending next game to window");
                        ensure_game_channel(&*self.gateway, &next, next.home_team).await;
                        self.spawn_tracker(next.clone());
                        self.windows.push(team, next);
                    }
                    // Off-season: the window shrinks instead of retaining
                    // a stale pair.
                    None => debug!(team = %team, "No upcoming game; window shrinks"),
                }
            }
        }
    }

    async fn evict_overfull_windows(&mut self) {
        let mut evicted: Vec<Game> = Vec::new();
        for &team in Team::ALL {
            let slot = self.windows.get_mut(team);
            while slot.len() > 2 {
                let game = slot.remove(0);
                info!(team = %team, game = %game, "Evicting oldest game from window");
                evicted.push(game);
            }
        }

        for game in evicted {
            // Still windowed for the other participant: keep its channel.
            if self.windows.contains(game.id) {
                continue;
            }
            if let Some(handle) = self.trackers.remove(&game.id) {
                handle.stop();
            }
            self.teardown_channel(&game).await;
        }
    }

    async fn teardown_channel(&self, game: &Game) {
        let name = channel_name(game);
        let channels = match self.gateway.list_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(channel = %name, error = %e, "Failed to list channels for teardown");
                return;
            }
        };
        if let Some(channel) = channels
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(&name))
        {
            info!(channel = %channel.name, "Tearing down evicted game channel");
            if let Err(e) = self.gateway.delete_channel(&channel).await {
                warn!(channel = %channel.name, error = %e, "Failed to delete channel");
            }
        }
    }

    fn spawn_tracker(&mut self, game: Game) {
        if self.trackers.contains_key(&game.id) || game.is_ended() {
            return;
        }
        let tracker = GameTracker::new(
            self.source.clone(),
            self.gateway.clone(),
            self.season.clone(),
            game.home_team,
            game.clone(),
            self.config.tracker.clone(),
            self.cancel.child_token(),
        );
        info!(game = %game, "Starting tracker");
        self.trackers.insert(game.id, tracker.spawn());
    }
}

// =============================================================================
// Tests
// =============================================================================
