//! Stats API surface: the data-source trait and its REST implementation.

pub mod client;
pub mod errors;

use chrono::NaiveDate;

use crate::data::models::{Game, GameUpdate, Team};
use errors::ApiError;

/// Read-only source of season schedules and live game snapshots.
///
/// Trait seam so trackers and the orchestrator can be exercised against a
/// scripted source in tests.
#[async_trait::async_trait]
pub trait SportsDataSource: Send + Sync {
    /// Full dated game list for a team over the given range, with scoring
    /// plays expanded.
    async fn schedule(
        &self,
        team: Team,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Game>, ApiError>;

    /// Fresh status/score/event snapshot for one game.
    async fn fetch_game(&self, game: &Game) -> Result<GameUpdate, ApiError>;
}
