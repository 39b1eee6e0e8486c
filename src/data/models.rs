//! Core domain models: the team catalog, games, scoring events, players.
//!
//! `Team` is a closed catalog known at compile time; everything else is
//! built from stats API responses and refreshed in place while a game is
//! being tracked.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Team catalog
// =============================================================================

/// One entry of the fixed team catalog.
struct TeamInfo {
    id: u32,
    code: &'static str,
    location: &'static str,
    name: &'static str,
    cheer: &'static str,
    time_zone: Tz,
}

macro_rules! team_catalog {
    ($(($variant:ident, $id:expr, $code:expr, $location:expr, $name:expr, $cheer:expr, $tz:expr)),+ $(,)?) => {
        /// Closed catalog of tracked teams. Identity, display text, and time
        /// zone are process-wide constants.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Team {
            $($variant,)+
        }

        impl Team {
            pub const ALL: &'static [Team] = &[$(Team::$variant,)+];

            fn info(self) -> &'static TeamInfo {
                match self {
                    $(Team::$variant => &TeamInfo {
                        id: $id,
                        code: $code,
                        location: $location,
                        name: $name,
                        cheer: $cheer,
                        time_zone: $tz,
                    },)+
                }
            }
        }
    };
}

team_catalog![
    (NewJerseyDevils, 1, "NJD", "New Jersey", "Devils", "Let's go Devils!", chrono_tz::America::New_York),
    (NewYorkIslanders, 2, "NYI", "New York", "Islanders", "Let's go Islanders!", chrono_tz::America::New_York),
    (NewYorkRangers, 3, "NYR", "New York", "Rangers", "Let's go Rangers!", chrono_tz::America::New_York),
    (PhiladelphiaFlyers, 4, "PHI", "Philadelphia", "Flyers", "Let's go Flyers!", chrono_tz::America::New_York),
    (PittsburghPenguins, 5, "PIT", "Pittsburgh", "Penguins", "Let's go Pens!", chrono_tz::America::New_York),
    (BostonBruins, 6, "BOS", "Boston", "Bruins", "Let's go Bruins!", chrono_tz::America::New_York),
    (BuffaloSabres, 7, "BUF", "Buffalo", "Sabres", "Let's go Buffalo!", chrono_tz::America::New_York),
    (MontrealCanadiens, 8, "MTL", "Montreal", "Canadiens", "Go Habs Go!", chrono_tz::America::Montreal),
    (OttawaSenators, 9, "OTT", "Ottawa", "Senators", "Go Sens Go!", chrono_tz::America::Toronto),
    (TorontoMapleLeafs, 10, "TOR", "Toronto", "Maple Leafs", "Go Leafs Go!", chrono_tz::America::Toronto),
    (CarolinaHurricanes, 12, "CAR", "Carolina", "Hurricanes", "Let's go Canes!", chrono_tz::America::New_York),
    (FloridaPanthers, 13, "FLA", "Florida", "Panthers", "Let's go Panthers!", chrono_tz::America::New_York),
    (TampaBayLightning, 14, "TBL", "Tampa Bay", "Lightning", "Let's go Bolts!", chrono_tz::America::New_York),
    (WashingtonCapitals, 15, "WSH", "Washington", "Capitals", "Let's go Caps!", chrono_tz::America::New_York),
    (ChicagoBlackhawks, 16, "CHI", "Chicago", "Blackhawks", "Let's go Hawks!", chrono_tz::America::Chicago),
    (DetroitRedWings, 17, "DET", "Detroit", "Red Wings", "Let's go Red Wings!", chrono_tz::America::Detroit),
    (NashvillePredators, 18, "NSH", "Nashville", "Predators", "Let's go Predators!", chrono_tz::America::Chicago),
    (StLouisBlues, 19, "STL", "St. Louis", "Blues", "Let's go Blues!", chrono_tz::America::Chicago),
    (CalgaryFlames, 20, "CGY", "Calgary", "Flames", "Go Flames Go!", chrono_tz::America::Edmonton),
    (ColoradoAvalanche, 21, "COL", "Colorado", "Avalanche", "Let's go Avs!", chrono_tz::America::Denver),
    (EdmontonOilers, 22, "EDM", "Edmonton", "Oilers", "Let's go Oilers!", chrono_tz::America::Edmonton),
    (VancouverCanucks, 23, "VAN", "Vancouver", "Canucks", "Go Canucks Go!", chrono_tz::America::Vancouver),
    (AnaheimDucks, 24, "ANA", "Anaheim", "Ducks", "Let's go Ducks!", chrono_tz::America::Los_Angeles),
    (DallasStars, 25, "DAL", "Dallas", "Stars", "Go Stars Go!", chrono_tz::America::Chicago),
    (LosAngelesKings, 26, "LAK", "Los Angeles", "Kings", "Go Kings Go!", chrono_tz::America::Los_Angeles),
    (SanJoseSharks, 28, "SJS", "San Jose", "Sharks", "Let's go Sharks!", chrono_tz::America::Los_Angeles),
    (ColumbusBlueJackets, 29, "CBJ", "Columbus", "Blue Jackets", "Let's go Jackets!", chrono_tz::America::New_York),
    (MinnesotaWild, 30, "MIN", "Minnesota", "Wild", "Let's go Wild!", chrono_tz::America::Chicago),
    (WinnipegJets, 52, "WPG", "Winnipeg", "Jets", "Go Jets Go!", chrono_tz::America::Winnipeg),
    (ArizonaCoyotes, 53, "ARI", "Arizona", "Coyotes", "Let's go Coyotes!", chrono_tz::America::Phoenix),
];

impl Team {
    /// External id used by the stats API.
    pub fn id(self) -> u32 {
        self.info().id
    }

    /// 3-letter team code, upper case.
    pub fn code(self) -> &'static str {
        self.info().code
    }

    pub fn location(self) -> &'static str {
        self.info().location
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn full_name(self) -> String {
        format!("{} {}", self.location(), self.name())
    }

    /// Channel topic / start-of-game cheer line.
    pub fn cheer(self) -> &'static str {
        self.info().cheer
    }

    pub fn time_zone(self) -> Tz {
        self.info().time_zone
    }

    /// Dense index for fixed-size tables keyed by team.
    pub fn index(self) -> usize {
        Team::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn from_id(id: u32) -> Option<Team> {
        Team::ALL.iter().copied().find(|t| t.id() == id)
    }

    pub fn from_code(code: &str) -> Option<Team> {
        Team::ALL
            .iter()
            .copied()
            .find(|t| t.code().eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

// =============================================================================
// Game status
// =============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    #[default]
    Preview,
    Started,
    Live,
    Final,
}

impl GameStatus {
    /// Parses the wire `statusCode`. Unknown codes fall back to Preview so
    /// the tracker keeps polling rather than acting on bad data.
    pub fn parse(code: &str) -> GameStatus {
        match code {
            "1" => GameStatus::Preview,
            "2" => GameStatus::Started,
            "3" | "4" => GameStatus::Live,
            "5" | "6" | "7" => GameStatus::Final,
            other => {
                tracing::warn!(status_code = other, "Unknown game status code");
                GameStatus::Preview
            }
        }
    }

    pub fn is_started(self) -> bool {
        matches!(self, GameStatus::Started | GameStatus::Live)
    }
}

// =============================================================================
// Players and scoring events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub full_name: String,
    /// Role tag from the wire format ("Scorer", "Assist", ...).
    pub role: String,
}

impl Player {
    pub fn new(id: i64, full_name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            role: role.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStrength {
    Even,
    PowerPlay,
    ShortHanded,
    EmptyNet,
}

impl EventStrength {
    pub fn parse(code: &str) -> EventStrength {
        match code {
            "PPG" => EventStrength::PowerPlay,
            "SHG" => EventStrength::ShortHanded,
            "EN" => EventStrength::EmptyNet,
            _ => EventStrength::Even,
        }
    }

    /// Qualifier inserted into goal messages. Even strength gets none.
    pub fn label(self) -> &'static str {
        match self {
            EventStrength::Even => "Even",
            EventStrength::PowerPlay => "Power Play",
            EventStrength::ShortHanded => "Short Handed",
            EventStrength::EmptyNet => "Empty Net",
        }
    }
}

/// A scoring event within a game. Player order is semantic: index 0 is the
/// scorer, 1 the first assist, 2 the second assist.
///
/// Two events with the same id but different attributes are an *update* of
/// one another, not duplicates; full equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    pub id: i64,
    pub team: Team,
    pub strength: EventStrength,
    /// Ordinal period descriptor ("1st", "2nd", "OT").
    pub period: String,
    pub players: Vec<Player>,
}

impl GameEvent {
    pub fn scorer(&self) -> Option<&Player> {
        self.players.first()
    }
}

// =============================================================================
// Games
// =============================================================================

/// One scheduled contest. Identity is the external game id; status, scores
/// and events mutate as the game is refreshed, teams and start time do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub home_team: Team,
    pub away_team: Team,
    pub start: DateTime<Utc>,
    pub status: GameStatus,
    pub home_score: u32,
    pub away_score: u32,
    pub events: Vec<GameEvent>,
}

impl Game {
    pub fn teams(&self) -> [Team; 2] {
        [self.home_team, self.away_team]
    }

    pub fn contains_team(&self, team: Team) -> bool {
        self.home_team == team || self.away_team == team
    }

    pub fn is_ended(&self) -> bool {
        self.status == GameStatus::Final
    }

    /// Applies a freshly fetched snapshot. Identity fields are untouched.
    pub fn apply(&mut self, update: GameUpdate) {
        self.status = update.status;
        self.home_score = update.home_score;
        self.away_score = update.away_score;
        self.events = update.events;
    }
}

impl PartialEq for Game {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Game {}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} vs {} ({:?})",
            self.id,
            self.home_team.code(),
            self.away_team.code(),
            self.status
        )
    }
}

/// Per-poll refresh of a tracked game.
#[derive(Debug, Clone)]
pub struct GameUpdate {
    pub status: GameStatus,
    pub home_score: u32,
    pub away_score: u32,
    pub events: Vec<GameEvent>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn game() -> Game {
        Game {
            id: 2016020001,
            home_team: Team::VancouverCanucks,
            away_team: Team::EdmontonOilers,
            start: Utc.with_ymd_and_hms(2016, 10, 15, 2, 0, 0).unwrap(),
            status: GameStatus::Preview,
            home_score: 0,
            away_score: 0,
            events: Vec::new(),
        }
    }

    #[test]
    fn team_lookup_by_code_is_case_insensitive() {
        assert_eq!(Team::from_code("van"), Some(Team::VancouverCanucks));
        assert_eq!(Team::from_code("VAN"), Some(Team::VancouverCanucks));
        assert_eq!(Team::from_code("xyz"), None);
    }

    #[test]
    fn team_lookup_by_id() {
        assert_eq!(Team::from_id(22), Some(Team::EdmontonOilers));
        assert_eq!(Team::from_id(999), None);
    }

    #[test]
    fn team_indices_are_dense_and_unique() {
        for (i, team) in Team::ALL.iter().enumerate() {
            assert_eq!(team.index(), i);
        }
    }

    #[test]
    fn status_codes_map_to_lifecycle() {
        assert_eq!(GameStatus::parse("1"), GameStatus::Preview);
        assert_eq!(GameStatus::parse("2"), GameStatus::Started);
        assert_eq!(GameStatus::parse("3"), GameStatus::Live);
        assert_eq!(GameStatus::parse("4"), GameStatus::Live);
        assert_eq!(GameStatus::parse("7"), GameStatus::Final);
        // Unknown codes keep the game in Preview.
        assert_eq!(GameStatus::parse("99"), GameStatus::Preview);
    }

    #[test]
    fn game_equality_is_by_id() {
        let a = game();
        let mut b = game();
        b.status = GameStatus::Final;
        b.home_score = 4;
        assert_eq!(a, b);
    }

    #[test]
    fn same_event_id_with_changed_attributes_is_not_equal() {
        let e1 = GameEvent {
            id: 7,
            team: Team::VancouverCanucks,
            strength: EventStrength::Even,
            period: "1st".to_string(),
            players: vec![Player::new(10, "Henrik Sedin", "Scorer")],
        };
        let mut e2 = e1.clone();
        e2.strength = EventStrength::PowerPlay;
        assert_ne!(e1, e2);
    }

    #[test]
    fn apply_update_preserves_identity() {
        let mut g = game();
        g.apply(GameUpdate {
            status: GameStatus::Live,
            home_score: 2,
            away_score: 1,
            events: Vec::new(),
        });
        assert_eq!(g.id, 2016020001);
        assert_eq!(g.home_team, Team::VancouverCanucks);
        assert_eq!(g.status, GameStatus::Live);
        assert_eq!(g.home_score, 2);
    }
}
