//! Async REST client for the league stats API.
//!
//! Features:
//! - Rate limiting (configurable, default 5 req/sec)
//! - Automatic retries with exponential backoff on 5xx/429
//! - Typed schedule responses converted into domain models
//!
//! The schedule endpoint is the single query surface: a date range plus a
//! team filter returns dated games, each expandable with its scoring plays.
//! Refreshing a tracked game re-queries the schedule window around that
//! game's date and picks its record back out by id.

use chrono::{Duration as ChronoDuration, NaiveDate};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::errors::ApiError;
use crate::api::SportsDataSource;
use crate::data::models::{EventStrength, Game, GameEvent, GameStatus, GameUpdate, Player, Team};

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    dates: Vec<ScheduleDate>,
}

#[derive(Debug, Deserialize)]
struct ScheduleDate {
    #[serde(default)]
    games: Vec<GameRecord>,
}

#[derive(Debug, Deserialize)]
struct GameRecord {
    #[serde(rename = "gamePk")]
    game_pk: i64,
    #[serde(rename = "gameDate")]
    game_date: chrono::DateTime<chrono::Utc>,
    status: StatusRecord,
    teams: TeamsRecord,
    #[serde(rename = "scoringPlays", default)]
    scoring_plays: Vec<ScoringPlay>,
}

#[derive(Debug, Deserialize)]
struct StatusRecord {
    #[serde(rename = "statusCode")]
    status_code: String,
}

#[derive(Debug, Deserialize)]
struct TeamsRecord {
    home: SideRecord,
    away: SideRecord,
}

#[derive(Debug, Deserialize)]
struct SideRecord {
    team: TeamRef,
    #[serde(default)]
    score: u32,
}

#[derive(Debug, Deserialize)]
struct TeamRef {
    id: u32,
}

#[derive(Debug, Deserialize)]
struct ScoringPlay {
    #[serde(default)]
    players: Vec<PlayPlayer>,
    result: PlayResult,
    about: PlayAbout,
    team: TeamRef,
}

#[derive(Debug, Deserialize)]
struct PlayPlayer {
    player: PlayerRef,
    #[serde(rename = "playerType")]
    player_type: String,
}

#[derive(Debug, Deserialize)]
struct PlayerRef {
    id: i64,
    #[serde(rename = "fullName")]
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct PlayResult {
    #[serde(default)]
    strength: Option<StrengthRecord>,
}

#[derive(Debug, Deserialize)]
struct StrengthRecord {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct PlayAbout {
    #[serde(rename = "eventId")]
    event_id: i64,
    #[serde(rename = "ordinalNum", default)]
    ordinal_num: String,
}

impl GameRecord {
    /// Converts the wire record into a domain Game. Records referencing
    /// teams outside the catalog are dropped with a warning.
    fn into_game(self) -> Option<Game> {
        let home_team = match Team::from_id(self.teams.home.team.id) {
            Some(t) => t,
            None => {
                warn!(team_id = self.teams.home.team.id, "Unknown home team in schedule");
                return None;
            }
        };
        let away_team = match Team::from_id(self.teams.away.team.id) {
            Some(t) => t,
            None => {
                warn!(team_id = self.teams.away.team.id, "Unknown away team in schedule");
                return None;
            }
        };
        let events = parse_events(&self.scoring_plays);
        Some(Game {
            id: self.game_pk,
            home_team,
            away_team,
            start: self.game_date,
            status: GameStatus::parse(&self.status.status_code),
            home_score: self.teams.home.score,
            away_score: self.teams.away.score,
            events,
        })
    }
}

fn parse_events(plays: &[ScoringPlay]) -> Vec<GameEvent> {
    plays
        .iter()
        .filter_map(|play| {
            let team = Team::from_id(play.team.id)?;
            let players = play
                .players
                .iter()
                .filter(|p| p.player_type != "Goalie")
                .map(|p| Player::new(p.player.id, p.player.full_name.clone(), p.player_type.clone()))
                .collect();
            let strength = play
                .result
                .strength
                .as_ref()
                .map(|s| EventStrength::parse(&s.code))
                .unwrap_or(EventStrength::Even);
            Some(GameEvent {
                id: play.about.event_id,
                team,
                strength,
                period: play.about.ordinal_num.clone(),
                players,
            })
        })
        .collect()
}

// =============================================================================
// Client
// =============================================================================

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// REST client for the stats API.
pub struct StatsApiClient {
    base_url: String,
    client: Client,
    rate_limiter: Arc<DirectLimiter>,
    max_retries: u32,
}

impl StatsApiClient {
    pub fn new(
        base_url: &str,
        rate_limit: u32,
        max_retries: u32,
        timeout_secs: u64,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let quota =
            Quota::per_second(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::new(5).unwrap()));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter,
            max_retries,
        })
    }

    /// Create with default settings.
    pub fn with_defaults(base_url: &str) -> Result<Self, ApiError> {
        Self::new(base_url, 5, 3, 30)
    }

    async fn get_schedule(
        &self,
        team: Team,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ScheduleResponse, ApiError> {
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let team_id = team.id().to_string();
        let params: &[(&str, &str)] = &[
            ("startDate", &start),
            ("endDate", &end),
            ("teamId", &team_id),
            ("expand", "schedule.scoringplays"),
        ];
        let json = self.request("/schedule", params).await?;
        serde_json::from_value(json).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    async fn request(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error: Option<ApiError> = None;

        for attempt in 0..self.max_retries {
            // Rate limiting
            self.rate_limiter.until_ready().await;

            debug!(path = %path, attempt = attempt + 1, "Stats API request");

            let result = self.client.get(&url).query(params).send().await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let text = response
                            .text()
                            .await
                            .map_err(|e| ApiError::Network(e.to_string()))?;
                        let json: serde_json::Value = serde_json::from_str(&text)
                            .map_err(|e| ApiError::Deserialization(e.to_string()))?;
                        return Ok(json);
                    }

                    // Rate limit — always retry.
                    if status.as_u16() == 429 {
                        let retry_after = response
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(1);
                        warn!(retry_after, attempt = attempt + 1, "Rate limited");
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                        last_error = Some(ApiError::RateLimited { retry_after });
                        continue;
                    }

                    // Server errors — retry with backoff.
                    if status.as_u16() >= 500 {
                        let delay_ms = 500 * 2u64.pow(attempt);
                        warn!(
                            status_code = status.as_u16(),
                            delay_ms,
                            attempt = attempt + 1,
                            "Server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        last_error = Some(ApiError::Http {
                            status_code: status.as_u16(),
                            message: status.to_string(),
                        });
                        continue;
                    }

                    // Client errors are not retryable.
                    let body = response.text().await.unwrap_or_default();
                    return Err(ApiError::Http {
                        status_code: status.as_u16(),
                        message: body,
                    });
                }
                Err(e) if e.is_timeout() => {
                    warn!(error = %e, attempt = attempt + 1, "Request timed out");
                    last_error = Some(ApiError::Timeout(e.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempt + 1, "Request failed");
                    last_error = Some(ApiError::Network(e.to_string()));
                }
            }
        }

        Err(ApiError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait::async_trait]
impl SportsDataSource for StatsApiClient {
    async fn schedule(
        &self,
        team: Team,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Game>, ApiError> {
        let response = self.get_schedule(team, start, end).await?;
        let games: Vec<Game> = response
            .dates
            .into_iter()
            .flat_map(|d| d.games)
            .filter_map(GameRecord::into_game)
            .collect();
        debug!(team = %team.code(), games = games.len(), "Fetched schedule");
        Ok(games)
    }

    async fn fetch_game(&self, game: &Game) -> Result<GameUpdate, ApiError> {
        // The schedule endpoint is the only query surface; a one-day window
        // around the start covers games that cross midnight UTC.
        let date = game.start.date_naive();
        let response = self
            .get_schedule(
                game.home_team,
                date - ChronoDuration::days(1),
                date + ChronoDuration::days(1),
            )
            .await?;
        let record = response
            .dates
            .into_iter()
            .flat_map(|d| d.games)
            .find(|g| g.game_pk == game.id)
            .ok_or(ApiError::GameNotFound(game.id))?;
        Ok(GameUpdate {
            status: GameStatus::parse(&record.status.status_code),
            home_score: record.teams.home.score,
            away_score: record.teams.away.score,
            events: parse_events(&record.scoring_plays),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
