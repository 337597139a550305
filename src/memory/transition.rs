//! One recorded environment step

use crate::game::Direction;
use crate::nn::Tensor;
use crate::rl::Environment;

/// `(state, action, reward, next_state, terminal)` for one step
///
/// Built in one go by [`Transition::observe`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Tensor,
    pub action: Direction,
    pub reward: f64,
    pub next_state: Tensor,
    pub terminal: bool,
}

impl Transition {
    pub fn new(state: Tensor, action: Direction, reward: f64, next_state: Tensor, terminal: bool) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminal,
        }
    }

    /// Apply `action` to `env`, recording the states on either side
    pub fn observe<E: Environment + ?Sized>(env: &mut E, action: Direction) -> Self {
        let state = env.state();
        let reward = env.step(action);
        let next_state = env.state();
        let terminal = env.is_terminal();
        Self::new(state, action, reward, next_state, terminal)
    }
}
