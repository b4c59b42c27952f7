//! End-of-match summary and awards.

use serde::{Deserialize, Serialize};

use crate::events::Outcome;
use crate::session::Session;
use crate::unit::{Team, Unit, UnitId, UnitStats};

/// Honours handed out to player units at the end of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AwardKind {
    /// Most kills.
    Commando,
    /// Most distance travelled.
    Marathoner,
    /// Most heals given.
    Medic,
    /// Best accuracy among units that fired.
    Marksman,
}

impl AwardKind {
    /// Every award, in presentation order.
    pub const ALL: [Self; 4] = [Self::Commando, Self::Marathoner, Self::Medic, Self::Marksman];

    /// Display title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Commando => "Commando",
            Self::Marathoner => "Marathoner",
            Self::Medic => "Medic",
            Self::Marksman => "Marksman",
        }
    }

    /// Display line for a winning `value`.
    #[must_use]
    pub fn describe(self, value: u32) -> String {
        match self {
            Self::Commando => format!("{value} kills"),
            Self::Marathoner => format!("{value}m travelled"),
            Self::Medic => format!("{value} heals"),
            Self::Marksman => format!("{value}% accuracy"),
        }
    }

    fn score(self, stats: &UnitStats) -> Option<u32> {
        match self {
            Self::Commando => Some(stats.kills),
            Self::Marathoner => Some(stats.distance_travelled),
            Self::Medic => Some(stats.heals_given),
            Self::Marksman => stats.accuracy_percent(),
        }
    }
}

/// One award and who earned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    /// Which award.
    pub kind: AwardKind,
    /// Recipient.
    pub unit: UnitId,
    /// Recipient's label.
    pub label: String,
    /// Winning score.
    pub value: u32,
}

/// Per-unit line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    /// Unit handle.
    pub unit: UnitId,
    /// Label.
    pub label: String,
    /// Survived the match.
    pub alive: bool,
    /// Final statistics.
    pub stats: UnitStats,
}

/// Summary of a finished (or abandoned) match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    /// Result, if the match was decided.
    pub outcome: Option<Outcome>,
    /// Turn counter at the end.
    pub turns: u32,
    /// Awards with a non-zero winner.
    pub awards: Vec<Award>,
    /// Player units.
    pub squad: Vec<UnitSummary>,
    /// Enemies still standing.
    pub enemies_remaining: usize,
}

impl MatchReport {
    /// Build the report for `session`.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let players: Vec<&Unit> = session
            .player_squad()
            .members
            .iter()
            .filter_map(|&id| session.unit(id))
            .collect();

        let awards = AwardKind::ALL
            .iter()
            .filter_map(|&kind| best_of(kind, &players))
            .collect();
        let squad = players
            .iter()
            .map(|u| UnitSummary {
                unit: u.id,
                label: u.label(),
                alive: u.is_alive,
                stats: u.stats,
            })
            .collect();

        Self {
            outcome: session.outcome(),
            turns: session.turn_number(),
            awards,
            squad,
            enemies_remaining: session.living(Team::Enemy).count(),
        }
    }

    /// Award of `kind`, if anyone earned it.
    #[must_use]
    pub fn award(&self, kind: AwardKind) -> Option<&Award> {
        self.awards.iter().find(|a| a.kind == kind)
    }
}

/// Highest non-zero score wins; the earlier unit wins ties.
fn best_of(kind: AwardKind, players: &[&Unit]) -> Option<Award> {
    let mut best: Option<(&Unit, u32)> = None;
    for &unit in players {
        let Some(score) = kind.score(&unit.stats) else {
            continue;
        };
        if score > 0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((unit, score));
        }
    }
    best.map(|(unit, value)| Award {
        kind,
        unit: unit.id,
        label: unit.label(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn session_with_stats(stats: &[UnitStats]) -> Session {
        let mut session = Session::new(GameConfig::default().with_seed(2)).unwrap();
        let members = session.player_squad().members.clone();
        for (id, s) in members.iter().zip(stats) {
            session.units[id.index()].stats = *s;
        }
        session
    }

    #[test]
    fn test_awards_pick_leaders() {
        let session = session_with_stats(&[
            UnitStats { kills: 2, shots_taken: 4, shots_hit: 2, ..UnitStats::default() },
            UnitStats { distance_travelled: 30, heals_given: 1, ..UnitStats::default() },
            UnitStats { kills: 2, shots_taken: 2, shots_hit: 2, ..UnitStats::default() },
            UnitStats::default(),
        ]);
        let report = MatchReport::from_session(&session);

        let commando = report.award(AwardKind::Commando).unwrap();
        assert_eq!(commando.label, "Alpha");
        assert_eq!(commando.value, 2);
        assert_eq!(report.award(AwardKind::Marathoner).unwrap().label, "Bravo");
        assert_eq!(report.award(AwardKind::Medic).unwrap().label, "Bravo");
        let marksman = report.award(AwardKind::Marksman).unwrap();
        assert_eq!(marksman.label, "Charlie");
        assert_eq!(marksman.value, 100);
        assert_eq!(report.enemies_remaining, 12);
    }

    #[test]
    fn test_no_awards_for_idle_squad() {
        let session = session_with_stats(&[]);
        let report = MatchReport::from_session(&session);
        assert!(report.awards.is_empty());
        assert_eq!(report.squad.len(), 4);
        assert_eq!(report.turns, 1);
    }

    #[test]
    fn test_describe() {
        assert_eq!(AwardKind::Marathoner.describe(12), "12m travelled");
        assert_eq!(AwardKind::Marksman.title(), "Marksman");
    }
}
