//! Channel naming and message composition for game day channels.
//!
//! The channel name format is load-bearing: it is the idempotency key for
//! channel creation and is reverse-matched back to a game during stale
//! channel cleanup, so formatting and parsing must agree exactly.

use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::bot::flavor;
use crate::data::models::{EventStrength, Game, GameEvent, Team};
use crate::gateway::{ChannelHandle, MessagingGateway};

/// Category that all game day channels are filed under.
pub const GAME_CHANNEL_CATEGORY: &str = "Game Day Channels";

/// Fixed reference zone for the date embedded in channel names, so the
/// same game produces the same name regardless of which team's zone the
/// reader is in.
const REFERENCE_ZONE: Tz = chrono_tz::America::New_York;

// =============================================================================
// Channel names
// =============================================================================

/// `{home3}-vs-{away3}-{yy-MM-dd}`, lower-cased, date in the reference zone.
pub fn channel_name(game: &Game) -> String {
    format!(
        "{}-vs-{}-{}",
        game.home_team.code().to_lowercase(),
        game.away_team.code().to_lowercase(),
        short_date(game, REFERENCE_ZONE),
    )
}

/// Date in the format "yy-MM-dd", localized.
pub fn short_date(game: &Game, zone: Tz) -> String {
    game.start.with_timezone(&zone).format("%y-%m-%d").to_string()
}

/// Date in the format "Weekday d/Mon/yyyy", localized.
pub fn nice_date(game: &Game, zone: Tz) -> String {
    game.start.with_timezone(&zone).format("%A %-d/%b/%Y").to_string()
}

/// Start time in the format "H:mm Zone", localized.
pub fn start_time(game: &Game, zone: Tz) -> String {
    game.start.with_timezone(&zone).format("%-H:%M %Z").to_string()
}

/// Whether a channel name has the shape of a game channel for cataloged
/// teams. Does not check that the game exists.
pub fn is_channel_name_format(name: &str) -> bool {
    let parts: Vec<&str> = name.split('-').collect();
    let [home, vs, away, yy, mm, dd] = parts.as_slice() else {
        return false;
    };
    *vs == "vs"
        && Team::from_code(home).is_some()
        && Team::from_code(away).is_some()
        && [yy, mm, dd]
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit()))
}

/// Reverse lookup: the game in `games` whose channel name matches, if any.
/// Malformed or unknown names are simply "no associated game".
pub fn game_for_channel_name<'a>(games: &'a [Game], name: &str) -> Option<&'a Game> {
    games
        .iter()
        .find(|game| channel_name(game).eq_ignore_ascii_case(name))
}

// =============================================================================
// Channel lifecycle
// =============================================================================

/// Ensures the game's channel exists, idempotently. A freshly created
/// channel gets the team cheer as its topic and a pinned details message;
/// a reused channel gets neither. The category move is applied either way.
/// Gateway failures are logged and yield `None`; the caller retries on a
/// later cycle.
pub async fn ensure_game_channel(
    gateway: &dyn MessagingGateway,
    game: &Game,
    team: Team,
) -> Option<ChannelHandle> {
    let name = channel_name(game);
    let found = match gateway.find_or_create_channel(&name).await {
        Ok(found) => found,
        Err(e) => {
            warn!(channel = %name, error = %e, "Failed to find or create channel");
            return None;
        }
    };

    if found.created {
        if let Err(e) = gateway.set_topic(&found.channel, team.cheer()).await {
            warn!(channel = %name, error = %e, "Failed to set channel topic");
        }
        let details = details_message(game, team.time_zone());
        match gateway.send_message(&found.channel, &details).await {
            Ok(message) => {
                if let Err(e) = gateway.pin_message(&found.channel, &message).await {
                    warn!(channel = %name, error = %e, "Failed to pin details message");
                }
            }
            Err(e) => warn!(channel = %name, error = %e, "Failed to send details message"),
        }
    } else {
        debug!(channel = %name, "Channel already exists; reusing");
    }

    match gateway.get_or_create_category(GAME_CHANNEL_CATEGORY).await {
        Ok(category) => {
            if let Err(e) = gateway.move_to_category(&category, &found.channel).await {
                warn!(channel = %name, error = %e, "Failed to move channel into category");
            }
        }
        Err(e) => warn!(error = %e, "Failed to resolve channel category"),
    }

    Some(found.channel)
}

// =============================================================================
// Message composition
// =============================================================================

/// Pinned details line: `**Home** vs **Away** at **time** on **date**`.
pub fn details_message(game: &Game, zone: Tz) -> String {
    format!(
        "**{}** vs **{}** at **{}** on **{}**",
        game.home_team.full_name(),
        game.away_team.full_name(),
        start_time(game, zone),
        nice_date(game, zone),
    )
}

/// `Home **h** - **a** Away`.
pub fn score_message(game: &Game) -> String {
    format!(
        "{} **{}** - **{}** {}",
        game.home_team.name(),
        game.home_score,
        game.away_score,
        game.away_team.name(),
    )
}

/// One line per goal, in order; "(no goals)" when the list is empty.
pub fn goals_message(game: &Game) -> String {
    if game.events.is_empty() {
        return "(no goals)".to_string();
    }
    game.events
        .iter()
        .map(|event| format!("{} - {}", event.period, plain_event_message(event)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Notification text for a scoring event. A rotating quarter of events (by
/// id) gets a team flavor line prepended when the flavor table has an entry
/// for the scoring players; otherwise the plain message stands alone.
pub fn event_message(event: &GameEvent) -> String {
    let plain = plain_event_message(event);
    if event.id % 4 == 0 {
        if let Some(line) = flavor::flavor_line(event.team, &event.players) {
            return format!("{line}\n{plain}");
        }
    }
    plain
}

fn plain_event_message(event: &GameEvent) -> String {
    let scorer = event
        .scorer()
        .map(|p| p.full_name.as_str())
        .unwrap_or("Unknown");
    let mut message = if event.strength == EventStrength::Even {
        format!("{} goal by **{}**!", event.team.location(), scorer)
    } else {
        format!(
            "{} {} goal by **{}**!",
            event.team.location(),
            event.strength.label().to_lowercase(),
            scorer,
        )
    };
    if let Some(first_assist) = event.players.get(1) {
        message.push_str(&format!(" Assists: {}", first_assist.full_name));
    }
    if let Some(second_assist) = event.players.get(2) {
        message.push_str(&format!(", {}", second_assist.full_name));
    }
    message
}

/// Notice sent when a previously reported goal disappears from the source.
/// None when the event never had a named scorer.
pub fn rescinded_message(event: &GameEvent) -> Option<String> {
    event
        .scorer()
        .map(|scorer| format!("Goal by {} has been rescinded.", scorer.full_name))
}

/// Start-of-game announcement for the channel's team.
pub fn start_of_game_message(team: Team) -> String {
    format!("Game is about to start! {}", team.cheer())
}

/// End-of-game summary: final score, goal list, and the next game when
/// known. Also used as the pinned summary body.
pub fn end_of_game_message(game: &Game, team: Team, next_game: Option<&Game>) -> String {
    let mut message = format!(
        "Game has ended. Thanks for joining!\nFinal Score: {}\nGoals Scored:\n{}",
        score_message(game),
        goals_message(game),
    );
    if let Some(next) = next_game {
        message.push_str(&format!(
            "\nThe next game is: {}",
            details_message(next, team.time_zone())
        ));
    }
    message
}

// =============================================================================
// Tests
// =============================================================================
