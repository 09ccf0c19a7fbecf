//! Normalized control vocabulary and its effect on the game.

use crate::game::{Direction, Game};
use std::fmt;
use std::str::FromStr;

/// Every action name the tool schema accepts, in schema order.
pub const ACTION_NAMES: [&str; 8] = [
    "UP", "DOWN", "LEFT", "RIGHT", "START", "STOP", "RESTART", "PAUSE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Pause,
    Move(Direction),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown control action: {0}")]
pub struct ParseActionError(pub String);

impl FromStr for ControlAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "UP" => ControlAction::Move(Direction::Up),
            "DOWN" => ControlAction::Move(Direction::Down),
            "LEFT" => ControlAction::Move(Direction::Left),
            "RIGHT" => ControlAction::Move(Direction::Right),
            "START" => ControlAction::Start,
            "STOP" => ControlAction::Stop,
            "RESTART" => ControlAction::Restart,
            "PAUSE" => ControlAction::Pause,
            _ => return Err(ParseActionError(s.to_string())),
        })
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlAction::Move(Direction::Up) => "UP",
            ControlAction::Move(Direction::Down) => "DOWN",
            ControlAction::Move(Direction::Left) => "LEFT",
            ControlAction::Move(Direction::Right) => "RIGHT",
            ControlAction::Start => "START",
            ControlAction::Stop => "STOP",
            ControlAction::Restart => "RESTART",
            ControlAction::Pause => "PAUSE",
        };
        f.write_str(name)
    }
}

/// Applies one action to the game.
///
/// | action        | when    | effect                                   |
/// |---------------|---------|------------------------------------------|
/// | direction     | Playing | stage it unless it reverses the snake    |
/// | START/RESTART | always  | fresh board, score 0, heading right      |
/// | STOP/PAUSE    | always  | Paused, board untouched                  |
pub fn apply(game: &mut Game, action: ControlAction) {
    match action {
        ControlAction::Move(direction) => {
            if !game.stage_direction(direction) {
                tracing::debug!(%action, status = ?game.status(), "direction ignored");
            }
        }
        ControlAction::Start | ControlAction::Restart => game.start(),
        ControlAction::Stop | ControlAction::Pause => game.pause(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameStatus, Point, TickOutcome};

    #[test]
    fn parses_every_schema_name() {
        for name in ACTION_NAMES {
            let action: ControlAction = name.parse().unwrap();
            assert_eq!(action.to_string(), name);
        }
        assert_eq!("  left ".parse(), Ok(ControlAction::Move(Direction::Left)));
        assert!("JUMP".parse::<ControlAction>().is_err());
        assert!("".parse::<ControlAction>().is_err());
    }

    #[test]
    fn directions_are_ignored_unless_playing() {
        let mut game = Game::with_seed(3);
        apply(&mut game, ControlAction::Move(Direction::Up));
        assert_eq!(game.staged_direction(), Direction::Right);

        apply(&mut game, ControlAction::Start);
        apply(&mut game, ControlAction::Pause);
        apply(&mut game, ControlAction::Move(Direction::Up));
        assert_eq!(game.staged_direction(), Direction::Right);
    }

    #[test]
    fn stop_pauses_without_touching_the_board() {
        let mut game = Game::with_state(
            vec![Point::new(4, 4), Point::new(3, 4)],
            Point::new(9, 9),
            Direction::Right,
        );
        let before = game.snapshot();

        apply(&mut game, ControlAction::Stop);
        assert_eq!(game.status(), GameStatus::Paused);
        assert_eq!(game.tick(), TickOutcome::Idle);

        let after = game.snapshot();
        assert_eq!(after.snake, before.snake);
        assert_eq!(after.food, before.food);
        assert_eq!(after.score, before.score);
    }

    #[test]
    fn start_resets_regardless_of_state() {
        let mut game = Game::with_state(
            vec![Point::new(4, 4), Point::new(4, 5)],
            Point::new(9, 9),
            Direction::Up,
        );
        apply(&mut game, ControlAction::Stop);
        apply(&mut game, ControlAction::Start);
        assert_eq!(game.status(), GameStatus::Playing);
        assert_eq!(game.score(), 0);
        assert_eq!(game.direction(), Direction::Right);

        // Mid-game START also resets.
        game.tick();
        apply(&mut game, ControlAction::Move(Direction::Down));
        game.tick();
        apply(&mut game, ControlAction::Restart);
        assert_eq!(game.direction(), Direction::Right);
        assert_eq!(game.snake().len(), 1);
        assert_eq!(game.status(), GameStatus::Playing);
    }

    #[test]
    fn restart_after_game_over() {
        let mut game = Game::with_state(vec![Point::new(19, 0)], Point::new(0, 5), Direction::Right);
        game.tick();
        assert_eq!(game.status(), GameStatus::GameOver);

        apply(&mut game, ControlAction::Restart);
        assert_eq!(game.status(), GameStatus::Playing);
        assert_eq!(game.tick(), TickOutcome::Moved);
    }

    #[test]
    fn same_tick_burst_cannot_reverse() {
        let mut game = Game::with_seed(5);
        apply(&mut game, ControlAction::Start);
        apply(&mut game, ControlAction::Move(Direction::Up));
        game.tick();
        // Heading up: UP, DOWN, UP burst keeps heading up.
        for d in [Direction::Up, Direction::Down, Direction::Up, Direction::Down] {
            apply(&mut game, ControlAction::Move(d));
        }
        game.tick();
        assert_eq!(game.direction(), Direction::Up);
        assert_eq!(game.head(), Point::new(10, 8));
    }
}
