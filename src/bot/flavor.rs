//! Team flavor lines for goal notifications.
//!
//! Looked up by the scoring players; a miss falls back to the plain goal
//! message. Scorer/assist duos take precedence over single-scorer entries.

use crate::data::models::{Player, Team};

// Player ids from the stats API.
const DANIEL_SEDIN: i64 = 8467875;
const HENRIK_SEDIN: i64 = 8467876;
const BO_HORVAT: i64 = 8477500;
const BRANDON_SUTTER: i64 = 8474618;
const LOUI_ERIKSSON: i64 = 8470626;
const CONNOR_MCDAVID: i64 = 8478402;

/// Flavor line for a scoring event, if the table has one for this team and
/// these players.
pub fn flavor_line(team: Team, players: &[Player]) -> Option<String> {
    let scorer = players.first()?;
    let first_assist = players.get(1);

    // Duos: scorer + first assist, order-insensitive.
    if let Some(assist) = first_assist {
        let pair = [scorer.id, assist.id];
        if team == Team::VancouverCanucks
            && pair.contains(&DANIEL_SEDIN)
            && pair.contains(&HENRIK_SEDIN)
        {
            return Some("Sedinery!".to_string());
        }
    }

    let line = match (team, scorer.id) {
        (Team::VancouverCanucks, HENRIK_SEDIN) => "King Henrik strikes!",
        (Team::VancouverCanucks, DANIEL_SEDIN) => "Daniel brings the hammer down!",
        (Team::VancouverCanucks, BO_HORVAT) => "Bo knows goals!",
        (Team::VancouverCanucks, BRANDON_SUTTER) => "Sutter? I hardly know her!",
        (Team::VancouverCanucks, LOUI_ERIKSSON) => "Louuuuuu!",
        (Team::EdmontonOilers, CONNOR_MCDAVID) => "McJesus saves!",
        _ => return None,
    };
    Some(line.to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: i64, name: &str) -> Player {
        Player::new(id, name, "Scorer")
    }

    #[test]
    fn duo_takes_precedence_over_scorer_entry() {
        let players = vec![
            player(HENRIK_SEDIN, "Henrik Sedin"),
            player(DANIEL_SEDIN, "Daniel Sedin"),
        ];
        assert_eq!(
            flavor_line(Team::VancouverCanucks, &players),
            Some("Sedinery!".to_string())
        );
        // Order-insensitive.
        let reversed = vec![
            player(DANIEL_SEDIN, "Daniel Sedin"),
            player(HENRIK_SEDIN, "Henrik Sedin"),
        ];
        assert_eq!(
            flavor_line(Team::VancouverCanucks, &reversed),
            Some("Sedinery!".to_string())
        );
    }

    #[test]
    fn scorer_entry_matches_without_assist() {
        let players = vec![player(BO_HORVAT, "Bo Horvat")];
        assert_eq!(
            flavor_line(Team::VancouverCanucks, &players),
            Some("Bo knows goals!".to_string())
        );
    }

    #[test]
    fn unknown_scorer_falls_back_to_none() {
        let players = vec![player(1, "Somebody Else")];
        assert_eq!(flavor_line(Team::VancouverCanucks, &players), None);
        assert_eq!(flavor_line(Team::CalgaryFlames, &players), None);
    }
}
