//! ASCII rendering of session snapshots for terminal review.

use std::fmt::Write as _;

use squad_core::prelude::*;

/// ASCII rendering options.
#[derive(Debug, Clone)]
pub struct AsciiConfig {
    /// Draw the whole map and every unit, ignoring the fog of war.
    pub reveal: bool,
    /// Append a status line per unit.
    pub show_legend: bool,
    /// Use ANSI colours.
    pub use_color: bool,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            reveal: false,
            show_legend: true,
            use_color: false,
        }
    }
}

/// ANSI color codes.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
}

/// Character for a terrain tile.
fn tile_char(tile: &Tile, lit: bool) -> char {
    match (tile.is_wall, tile.is_cover, lit) {
        (true, _, _) => '#',
        (_, true, _) => '+',
        (_, _, true) => '.',
        _ => ',',
    }
}

/// Character for a unit standing on a tile.
fn unit_char(unit: &UnitView) -> char {
    if !unit.is_alive {
        return 'x';
    }
    match unit.team {
        Team::Player => unit
            .number
            .and_then(|n| char::from_digit(n, 10))
            .unwrap_or('P'),
        Team::Enemy if unit.posture == Posture::Prone => 'e',
        Team::Enemy => 'E',
    }
}

/// Render the map with units on top.
///
/// Unexplored tiles are blank and remembered tiles use `,` unless
/// [`AsciiConfig::reveal`] is set. Enemies only appear on visible tiles.
#[must_use]
pub fn render_ascii(snapshot: &SessionSnapshot, config: &AsciiConfig) -> String {
    let paint = |text: char, color: &str| {
        if config.use_color {
            format!("{color}{text}{}", colors::RESET)
        } else {
            text.to_string()
        }
    };

    let mut out = String::new();
    for y in 0..snapshot.height as i32 {
        for x in 0..snapshot.width as i32 {
            let cell = GridPos::new(x, y);
            let Some(tile) = snapshot.tile(cell) else {
                continue;
            };
            let lit = config.reveal || tile.is_visible;
            if !config.reveal && !tile.is_explored {
                out.push(' ');
                continue;
            }

            // Living units are drawn over the dead.
            let unit = snapshot
                .units
                .iter()
                .filter(|u| u.position == cell)
                .max_by_key(|u| u.is_alive);
            let shown = unit.filter(|u| lit || u.team == Team::Player);
            out.push_str(&match shown {
                Some(u) if !u.is_alive => paint('x', colors::DIM),
                Some(u) if u.team == Team::Player && u.is_selected => {
                    paint(unit_char(u), colors::YELLOW)
                }
                Some(u) if u.team == Team::Player => paint(unit_char(u), colors::CYAN),
                Some(u) => paint(unit_char(u), colors::RED),
                None if tile.is_wall => paint('#', colors::DIM),
                None => tile_char(tile, lit).to_string(),
            });
        }
        out.push('\n');
    }

    if config.show_legend {
        render_legend(snapshot, config, &mut out);
    }
    out
}

fn render_legend(snapshot: &SessionSnapshot, config: &AsciiConfig, out: &mut String) {
    let _ = writeln!(
        out,
        "Turn {} | {}{}",
        snapshot.turn_number,
        snapshot.state.name(),
        snapshot
            .outcome
            .map(|o| format!(" | {o:?}"))
            .unwrap_or_default()
    );
    for unit in &snapshot.units {
        let visible = snapshot.tile(unit.position).is_some_and(|t| t.is_visible);
        if unit.team == Team::Enemy && !config.reveal && !visible {
            continue;
        }
        let mut flags = Vec::new();
        if !unit.is_alive {
            flags.push("down");
        }
        if unit.posture == Posture::Prone {
            flags.push("prone");
        }
        if unit.is_on_overwatch {
            flags.push("overwatch");
        }
        let _ = writeln!(
            out,
            "  {} {:<10} {} hp {:>3}/{:<3} ap {:>2}/{:<2} {}",
            unit_char(unit),
            unit.label,
            unit.position,
            unit.hp,
            unit.max_hp,
            unit.ap,
            unit.max_ap,
            flags.join(" ")
        );
    }
    for effect in &snapshot.effects {
        if let Some(label) = effect.kind.label() {
            let _ = writeln!(out, "  {label} at {}", effect.kind.position());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_test_utils::dice::ScriptedDice;
    use squad_test_utils::fixtures::{pos, skirmish};

    fn plain() -> AsciiConfig {
        AsciiConfig {
            show_legend: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_fog_hides_distant_enemies() {
        let session = skirmish(&[pos(2, 2)], &[pos(18, 18)], ScriptedDice::always_miss());
        let fogged = render_ascii(&session.snapshot(), &plain());
        assert!(fogged.contains('1'));
        assert!(!fogged.contains('E'));

        let revealed = render_ascii(
            &session.snapshot(),
            &AsciiConfig {
                reveal: true,
                ..plain()
            },
        );
        assert!(revealed.contains('E'));
        assert_eq!(revealed.lines().count(), 20);
        assert!(revealed.lines().all(|l| l.chars().count() == 20));
    }

    #[test]
    fn test_legend_lists_squad_and_messages() {
        let mut session = skirmish(&[pos(5, 5)], &[pos(9, 5)], ScriptedDice::always_miss());
        session.ranged_attack(UnitId(0), UnitId(1)).unwrap();
        let text = render_ascii(&session.snapshot(), &AsciiConfig::default());
        assert!(text.contains("Turn 1 | player turn"));
        assert!(text.contains("Alpha"));
        assert!(text.contains("Miss! at (9, 5)"));
    }
}
