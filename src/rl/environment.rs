use super::observation::create_observation;
use crate::game::{Direction, GameConfig, GameEngine, GameState};
use crate::nn::Tensor;

/// Episodic environment with four discrete actions
///
/// This is the whole surface the agent needs: reset, act, observe.
pub trait Environment {
    /// Start a fresh episode
    fn initialize(&mut self);

    /// Apply a move and return its reward
    fn step(&mut self, direction: Direction) -> f64;

    /// Whether the current episode has ended
    fn is_terminal(&self) -> bool;

    /// Current observation
    fn state(&self) -> Tensor;

    /// Points collected in the current episode
    fn score(&self) -> f64;

    /// Moves taken in the current episode
    fn steps(&self) -> usize;
}

/// Snake environment for reinforcement learning
///
/// Wraps the game engine and exposes:
/// - Egocentric single-channel grid observations
/// - Four discrete actions (Up, Right, Down, Left)
pub struct SnakeEnvironment {
    engine: GameEngine,
    state: GameState,
}

impl SnakeEnvironment {
    /// Create a new Snake environment whose randomness follows `seed`
    pub fn new(config: GameConfig, seed: u64) -> Self {
        let mut engine = GameEngine::new(config, seed);
        let state = engine.reset();
        Self { engine, state }
    }

    /// Get reference to current game state (for rendering and testing)
    pub fn game(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> &GameConfig {
        self.engine.config()
    }
}

impl Environment for SnakeEnvironment {
    fn initialize(&mut self) {
        self.state = self.engine.reset();
    }

    fn step(&mut self, direction: Direction) -> f64 {
        self.engine.step(&mut self.state, direction).reward
    }

    fn is_terminal(&self) -> bool {
        !self.state.is_alive
    }

    fn state(&self) -> Tensor {
        create_observation(&self.state)
    }

    fn score(&self) -> f64 {
        self.state.score as f64
    }

    fn steps(&self) -> usize {
        self.state.steps as usize
    }
}
