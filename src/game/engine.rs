use super::{
    action::Direction,
    config::GameConfig,
    state::{GameState, Position, Snake},
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Information about a step
#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    /// Whether the snake ate the apple this step
    pub ate_food: bool,
    /// Whether the head ran into the body
    pub collided: bool,
    /// Whether the snake now covers every cell
    pub board_full: bool,
}

/// Result of a game step
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Reward for this step (for RL training)
    pub reward: f64,
    /// Whether the game has terminated
    pub terminated: bool,
    /// Additional information about the step
    pub info: StepInfo,
}

/// The game engine that handles all game logic
///
/// The grid is a torus: leaving one edge re-enters at the opposite edge, so
/// the only way to die is to run into the snake's own body.
#[derive(Debug, Clone)]
pub struct GameEngine {
    config: GameConfig,
    rng: StdRng,
}

impl GameEngine {
    /// Create a new game engine whose apple and start positions follow `seed`
    pub fn new(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Reset the game to initial state
    ///
    /// The head starts on a random cell heading Right, with the rest of the
    /// body trailing to its left.
    pub fn reset(&mut self) -> GameState {
        let head = Position::new(
            self.rng.gen_range(0..self.config.grid_width) as i32,
            self.rng.gen_range(0..self.config.grid_height) as i32,
        );

        let snake = Snake::new(
            head,
            Direction::Right,
            self.config.initial_snake_length,
            self.config.grid_width,
            self.config.grid_height,
        );

        let apple = self.spawn_apple(&snake);

        GameState::new(snake, apple, self.config.grid_width, self.config.grid_height)
    }

    /// Execute one step of the game
    pub fn step(&mut self, state: &mut GameState, direction: Direction) -> StepResult {
        if !state.is_alive {
            return StepResult {
                reward: 0.0,
                terminated: true,
                info: StepInfo {
                    ate_food: false,
                    collided: false,
                    board_full: false,
                },
            };
        }

        let new_head = state.neighbour(state.snake.head(), direction);
        let ate_food = state.apple == Some(new_head);
        state.steps += 1;

        // Reversing into the neck counts as a collision even when the neck is
        // also the tail about to move away
        let reversed = state.snake.len() > 1 && state.snake.body[1] == new_head;
        if reversed || state.snake.blocking_segments(ate_food).contains(&new_head) {
            state.is_alive = false;

            return StepResult {
                reward: self.config.death_penalty,
                terminated: true,
                info: StepInfo {
                    ate_food: false,
                    collided: true,
                    board_full: false,
                },
            };
        }

        state.snake.direction = direction;
        state.snake.advance(new_head, ate_food);

        let mut reward = self.config.step_reward;
        let mut board_full = false;

        if ate_food {
            state.score += 1;
            state.apple = self.spawn_apple(&state.snake);
            reward = self.config.apple_reward;

            if state.apple.is_none() {
                board_full = true;
                state.is_alive = false;
            }
        }

        StepResult {
            reward,
            terminated: board_full,
            info: StepInfo {
                ate_food,
                collided: false,
                board_full,
            },
        }
    }

    /// Spawn the apple on a random cell the snake does not cover
    fn spawn_apple(&mut self, snake: &Snake) -> Option<Position> {
        let free: Vec<Position> = (0..self.config.grid_height as i32)
            .flat_map(|y| (0..self.config.grid_width as i32).map(move |x| Position::new(x, y)))
            .filter(|pos| !snake.body.contains(pos))
            .collect();

        free.choose(&mut self.rng).copied()
    }
}
