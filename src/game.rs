//! Fixed-tick Snake simulation on a square grid.
//!
//! Direction input is double-buffered: writers only touch the staged slot,
//! and [`Game::tick`] is the single place that commits it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

pub const GRID_SIZE: i32 = 20;
pub const TICK_PERIOD: Duration = Duration::from_millis(150);
pub const INITIAL_HEAD: Point = Point::new(10, 10);
pub const INITIAL_FOOD: Point = Point::new(15, 15);
pub const INITIAL_DIRECTION: Direction = Direction::Right;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Grid offset of one step. `y` grows downwards.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn in_bounds(self) -> bool {
        (0..GRID_SIZE).contains(&self.x) && (0..GRID_SIZE).contains(&self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Idle,
    Playing,
    Paused,
    GameOver,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not playing; nothing moved.
    Idle,
    Moved,
    Ate { score: u32 },
    GameOver { score: u32 },
}

pub struct Game {
    snake: VecDeque<Point>,
    food: Point,
    direction: Direction,
    staged: Direction,
    status: GameStatus,
    score: u32,
    best_score: u32,
    rng: StdRng,
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic food placement.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            snake: VecDeque::from([INITIAL_HEAD]),
            food: INITIAL_FOOD,
            direction: INITIAL_DIRECTION,
            staged: INITIAL_DIRECTION,
            status: GameStatus::Idle,
            score: 0,
            best_score: 0,
            rng,
        }
    }

    /// A running game with the given board. `snake` is head first and must
    /// not be empty.
    pub fn with_state(snake: Vec<Point>, food: Point, direction: Direction) -> Self {
        assert!(!snake.is_empty(), "snake needs at least a head");
        let mut game = Self::with_seed(0);
        game.score = (snake.len() - 1) as u32;
        game.snake = snake.into();
        game.food = food;
        game.direction = direction;
        game.staged = direction;
        game.status = GameStatus::Playing;
        game
    }

    /// Back to the initial board, Idle. The best score survives.
    pub fn reset(&mut self) {
        self.snake.clear();
        self.snake.push_back(INITIAL_HEAD);
        self.food = INITIAL_FOOD;
        self.direction = INITIAL_DIRECTION;
        self.staged = INITIAL_DIRECTION;
        self.score = 0;
        self.status = GameStatus::Idle;
    }

    /// Fresh board, Playing.
    pub fn start(&mut self) {
        self.reset();
        self.status = GameStatus::Playing;
    }

    pub fn pause(&mut self) {
        self.status = GameStatus::Paused;
    }

    /// Stages `direction` for the next tick. Ignored unless Playing or when
    /// it would reverse the committed direction. Returns whether it was staged.
    pub fn stage_direction(&mut self, direction: Direction) -> bool {
        if self.status != GameStatus::Playing || direction == self.direction.opposite() {
            return false;
        }
        self.staged = direction;
        true
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.status != GameStatus::Playing {
            return TickOutcome::Idle;
        }

        self.direction = self.staged;
        let Some(&head) = self.snake.front() else {
            return self.end_run();
        };
        let next = head.step(self.direction);

        if !next.in_bounds() || self.snake.contains(&next) {
            return self.end_run();
        }

        self.snake.push_front(next);
        if next != self.food {
            self.snake.pop_back();
            return TickOutcome::Moved;
        }

        self.score += 1;
        self.best_score = self.best_score.max(self.score);
        match self.spawn_food() {
            Some(food) => {
                self.food = food;
                TickOutcome::Ate { score: self.score }
            }
            // The snake fills the board.
            None => self.end_run(),
        }
    }

    fn end_run(&mut self) -> TickOutcome {
        self.status = GameStatus::GameOver;
        self.score = self.snake.len().saturating_sub(1) as u32;
        self.best_score = self.best_score.max(self.score);
        tracing::info!(score = self.score, "game over");
        TickOutcome::GameOver { score: self.score }
    }

    /// Uniformly random free cell, or `None` when every cell is occupied.
    fn spawn_food(&mut self) -> Option<Point> {
        let free: Vec<Point> = (0..GRID_SIZE)
            .flat_map(|y| (0..GRID_SIZE).map(move |x| Point::new(x, y)))
            .filter(|p| !self.snake.contains(p))
            .collect();
        if free.is_empty() {
            return None;
        }
        Some(free[self.rng.gen_range(0..free.len())])
    }

    pub fn snake(&self) -> &VecDeque<Point> {
        &self.snake
    }

    pub fn head(&self) -> Point {
        self.snake.front().copied().unwrap_or(INITIAL_HEAD)
    }

    pub fn food(&self) -> Point {
        self.food
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn staged_direction(&self) -> Direction {
        self.staged
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn best_score(&self) -> u32 {
        self.best_score
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            snake: self.snake.iter().copied().collect(),
            food: self.food,
            direction: self.direction,
            status: self.status,
            score: self.score,
            best_score: self.best_score,
        }
    }
}

/// Read-only copy of the board handed to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub snake: Vec<Point>,
    pub food: Point,
    pub direction: Direction,
    pub status: GameStatus,
    pub score: u32,
    pub best_score: u32,
}

impl Default for Snapshot {
    fn default() -> Self {
        Game::with_seed(0).snapshot()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "score {}  best {}  [{:?}]",
            self.score, self.best_score, self.status
        )?;
        let border = "-".repeat(GRID_SIZE as usize);
        writeln!(f, "+{}+", border)?;
        for y in 0..GRID_SIZE {
            write!(f, "|")?;
            for x in 0..GRID_SIZE {
                let cell = Point::new(x, y);
                let c = if self.snake.first() == Some(&cell) {
                    '@'
                } else if self.snake.contains(&cell) {
                    'o'
                } else if self.food == cell {
                    '*'
                } else {
                    ' '
                };
                write!(f, "{}", c)?;
            }
            writeln!(f, "|")?;
        }
        write!(f, "+{}+", border)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn playing() -> Game {
        let mut game = Game::with_seed(7);
        game.start();
        game
    }

    #[test]
    fn starts_idle_on_initial_board() {
        let game = Game::with_seed(1);
        assert_eq!(game.status(), GameStatus::Idle);
        assert_eq!(game.snake().len(), 1);
        assert_eq!(game.head(), INITIAL_HEAD);
        assert_eq!(game.food(), INITIAL_FOOD);
        assert_eq!(game.direction(), Direction::Right);
    }

    #[test]
    fn idle_game_does_not_move() {
        let mut game = Game::with_seed(1);
        assert_eq!(game.tick(), TickOutcome::Idle);
        assert_eq!(game.head(), INITIAL_HEAD);
    }

    #[test]
    fn five_ticks_right_reach_column_fifteen() {
        let mut game = playing();
        for _ in 0..5 {
            game.stage_direction(Direction::Right);
            assert_eq!(game.tick(), TickOutcome::Moved);
        }
        assert_eq!(game.head(), Point::new(15, 10));
        assert_eq!(game.score(), 0);
        assert_eq!(game.snake().len(), 1);
        assert_eq!(game.status(), GameStatus::Playing);
    }

    #[test]
    fn leaving_the_grid_ends_the_run_without_moving() {
        let mut game = Game::with_state(vec![Point::new(19, 10)], Point::new(0, 0), Direction::Right);
        assert_eq!(game.tick(), TickOutcome::GameOver { score: 0 });
        assert_eq!(game.status(), GameStatus::GameOver);
        assert_eq!(game.snake().iter().copied().collect::<Vec<_>>(), vec![Point::new(19, 10)]);
        assert_eq!(game.tick(), TickOutcome::Idle);
    }

    #[test]
    fn game_over_score_is_length_minus_one() {
        let snake = vec![Point::new(19, 5), Point::new(18, 5), Point::new(17, 5)];
        let mut game = Game::with_state(snake, Point::new(0, 0), Direction::Right);
        assert_eq!(game.tick(), TickOutcome::GameOver { score: 2 });
        assert_eq!(game.best_score(), 2);
    }

    #[test]
    fn eating_grows_and_respawns_food_on_free_cell() {
        let mut game = Game::with_state(vec![Point::new(14, 15)], Point::new(15, 15), Direction::Right);
        assert_eq!(game.tick(), TickOutcome::Ate { score: 1 });
        assert_eq!(
            game.snake().iter().copied().collect::<Vec<_>>(),
            vec![Point::new(15, 15), Point::new(14, 15)]
        );
        assert_eq!(game.score(), 1);
        assert!(!game.snake().contains(&game.food()));
        assert!(game.food().in_bounds());
    }

    #[test]
    fn running_into_itself_ends_the_run() {
        // A U-shape whose head turns back into its own body.
        let snake = vec![
            Point::new(5, 5),
            Point::new(5, 6),
            Point::new(6, 6),
            Point::new(6, 5),
            Point::new(7, 5),
        ];
        let mut game = Game::with_state(snake.clone(), Point::new(0, 0), Direction::Up);
        game.stage_direction(Direction::Right);
        assert_eq!(game.tick(), TickOutcome::GameOver { score: 4 });
        assert_eq!(game.snake().iter().copied().collect::<Vec<_>>(), snake);
    }

    #[test]
    fn tail_cell_is_occupied_until_it_moves() {
        // Square of four: moving into the current tail is a collision.
        let snake = vec![
            Point::new(5, 5),
            Point::new(5, 6),
            Point::new(6, 6),
            Point::new(6, 5),
        ];
        let mut game = Game::with_state(snake, Point::new(0, 0), Direction::Up);
        game.stage_direction(Direction::Right);
        assert!(matches!(game.tick(), TickOutcome::GameOver { .. }));
    }

    #[test]
    fn reversal_is_checked_against_committed_direction() {
        let mut game = playing();
        // Heading right: Up then Left within one tick must not reverse.
        assert!(game.stage_direction(Direction::Up));
        assert!(!game.stage_direction(Direction::Left));
        assert_eq!(game.staged_direction(), Direction::Up);
        game.tick();
        assert_eq!(game.direction(), Direction::Up);
        assert_eq!(game.head(), Point::new(10, 9));
    }

    #[test]
    fn full_board_ends_the_run() {
        // Every cell but the food cell is occupied by a serpentine snake.
        let mut cells = Vec::new();
        for y in 0..GRID_SIZE {
            let row: Vec<Point> = (0..GRID_SIZE).map(|x| Point::new(x, y)).collect();
            if y % 2 == 0 {
                cells.extend(row);
            } else {
                cells.extend(row.into_iter().rev());
            }
        }
        // Snake ends (tail) at (0,0); head sits next to the last free cell.
        cells.reverse();
        let food = cells.remove(0);
        let mut game = Game::with_state(cells, food, Direction::Left);
        assert!(matches!(game.tick(), TickOutcome::GameOver { .. }));
        assert_eq!(game.snake().len(), (GRID_SIZE * GRID_SIZE) as usize);
    }

    #[test]
    fn snapshot_renders_grid() {
        let rendered = playing().snapshot().to_string();
        assert_eq!(rendered.lines().count(), GRID_SIZE as usize + 3);
        assert!(rendered.contains('@'));
        assert!(rendered.contains('*'));
    }

    fn direction() -> impl Strategy<Value = Direction> {
        prop_oneof![
            Just(Direction::Up),
            Just(Direction::Down),
            Just(Direction::Left),
            Just(Direction::Right),
        ]
    }

    proptest! {
        #[test]
        fn committed_direction_never_reverses(
            bursts in prop::collection::vec(prop::collection::vec(direction(), 0..6), 1..40)
        ) {
            let mut game = playing();
            for burst in bursts {
                if game.status() != GameStatus::Playing {
                    break;
                }
                let before = game.direction();
                let head = game.head();
                for d in burst {
                    game.stage_direction(d);
                }
                if let TickOutcome::GameOver { .. } = game.tick() {
                    break;
                }
                prop_assert_ne!(game.direction(), before.opposite());
                let (dx, dy) = game.direction().offset();
                prop_assert_eq!(game.head(), Point::new(head.x + dx, head.y + dy));
            }
        }

        #[test]
        fn food_never_spawns_on_the_snake(seed in any::<u64>(), turns in prop::collection::vec(direction(), 1..200)) {
            let mut game = Game::with_seed(seed);
            game.start();
            for d in turns {
                game.stage_direction(d);
                match game.tick() {
                    TickOutcome::GameOver { .. } => break,
                    _ => prop_assert!(!game.snake().contains(&game.food())),
                }
            }
        }
    }
}
