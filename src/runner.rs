use crate::command::{self, ControlAction};
use crate::game::{Game, Snapshot, TickOutcome, TICK_PERIOD};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Input to the game loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    Control(ControlAction),
    /// Back to the idle board, as on every fresh voice session.
    Reset,
}

impl From<ControlAction> for LoopCommand {
    fn from(action: ControlAction) -> Self {
        LoopCommand::Control(action)
    }
}

/// Drives a [`Game`] at a fixed tick.
///
/// The loop is the only owner of the game: control actions from voice or
/// keyboard arrive on one channel and are applied between ticks, so the
/// staged direction is read exactly once per tick without locking.
pub struct GameLoop {
    game: Game,
    period: Duration,
}

impl GameLoop {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            period: TICK_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Runs until every command sender is dropped. Each change is published
    /// on `snapshots`.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<LoopCommand>,
        snapshots: watch::Sender<Snapshot>,
    ) -> Game {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        snapshots.send_replace(self.game.snapshot());

        loop {
            tokio::select! {
                biased;
                next = commands.recv() => {
                    match next {
                        Some(LoopCommand::Control(action)) => {
                            tracing::debug!(%action, "control action");
                            command::apply(&mut self.game, action);
                        }
                        Some(LoopCommand::Reset) => self.game.reset(),
                        None => {
                            tracing::debug!("control channel closed, stopping game loop");
                            break;
                        }
                    }
                    snapshots.send_replace(self.game.snapshot());
                }
                _ = interval.tick() => {
                    match self.game.tick() {
                        TickOutcome::Idle => continue,
                        TickOutcome::Moved => {}
                        TickOutcome::Ate { score } => tracing::info!(score, "food eaten"),
                        TickOutcome::GameOver { score } => {
                            tracing::info!(score, best = self.game.best_score(), "run ended");
                        }
                    }
                    snapshots.send_replace(self.game.snapshot());
                }
            }
        }

        self.game
    }
}
