//! Deep Q-learning agent with prioritized replay and double networks
//!
//! Each gradient step:
//! 1. Sample a batch of slots from the active replay memory
//! 2. For every sample (in parallel), build the target vector: the network's
//!    own prediction with the taken action's entry replaced by
//!    `r + γ·Q_eval(s′, argmax Q_select(s′))` (just `r` when terminal)
//! 3. Backpropagate each sample and average the gradients
//! 4. Apply one optimizer step to the active network
//! 5. Refresh the sampled priorities from the new errors
//!
//! With `double` enabled there are two networks, each with its own memory;
//! the active one selects the next action and the other evaluates it, and
//! the active role is re-drawn after every step.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use super::config::DqnConfig;
use super::environment::Environment;
use crate::game::Direction;
use crate::memory::{priority, MemoryError, ReplayMemory, Transition};
use crate::nn::{huber_loss, Gradients, Network, NetworkError, Tensor};

/// Failure while building or training a [`DqnAgent`]
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("topology maps a {grid:?} grid to {found:?}, expected a 1x1x4 action vector")]
    Topology {
        grid: (usize, usize),
        found: Option<(usize, usize, usize)>,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Per-sample result of the parallel part of [`DqnAgent::learn`]
struct SampleUpdate {
    slot: usize,
    error: f64,
    loss: f64,
    gradients: Gradients,
}

/// DQN agent for the snake environment
///
/// Owns its networks, replay memories and random number generator; every
/// random decision (initial weights, exploration, sampling, role swaps)
/// follows the seed given at construction.
///
/// # Example
///
/// ```rust,no_run
/// use conv_snake::game::GameConfig;
/// use conv_snake::rl::{DqnAgent, DqnConfig, Environment, SnakeEnvironment};
///
/// let mut env = SnakeEnvironment::new(GameConfig::default(), 0);
/// let mut agent = DqnAgent::new(DqnConfig::default(), 10, 10, 0).unwrap();
/// agent.prefill(&mut env).unwrap();
///
/// let action = agent.select_action(&env.state()).unwrap();
/// let transition = conv_snake::memory::Transition::observe(&mut env, action);
/// agent.remember(transition).unwrap();
/// let loss = agent.learn().unwrap();
/// ```
pub struct DqnAgent {
    /// Hyperparameters
    config: DqnConfig,

    /// One network, or two in double mode
    networks: Vec<Network>,

    /// One replay memory per network
    memories: Vec<ReplayMemory>,

    /// Index of the network being trained and consulted
    active: usize,

    /// Gradient steps taken
    steps: u64,

    rng: StdRng,
}

impl DqnAgent {
    /// Create an agent for a `grid_height`×`grid_width` single-channel observation
    ///
    /// Fails if the configuration is invalid or the topology does not reduce
    /// the grid to a 1×1×4 output.
    pub fn new(
        config: DqnConfig,
        grid_height: usize,
        grid_width: usize,
        seed: u64,
    ) -> Result<Self, AgentError> {
        config.validate().map_err(AgentError::Config)?;

        let topology = config.topology.topology(1);
        let found = topology.output_dims(grid_height, grid_width);
        if found != Some((1, 1, Direction::ALL.len())) {
            return Err(AgentError::Topology {
                grid: (grid_height, grid_width),
                found,
            });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let count = if config.double { 2 } else { 1 };
        let networks = (0..count)
            .map(|_| topology.build(&mut rng))
            .collect::<Result<Vec<_>, _>>()?;
        let memories = (0..count)
            .map(|_| ReplayMemory::new(config.memory, config.replay_capacity))
            .collect();

        Ok(Self {
            config,
            networks,
            memories,
            active: 0,
            steps: 0,
            rng,
        })
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    /// Mutable access for loading weights
    pub fn networks_mut(&mut self) -> &mut [Network] {
        &mut self.networks
    }

    pub fn memories(&self) -> &[ReplayMemory] {
        &self.memories
    }

    /// Index of the network currently trained and consulted
    pub fn active(&self) -> usize {
        self.active
    }

    /// Gradient steps taken so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Current exploration rate
    pub fn epsilon(&self) -> f64 {
        self.config.epsilon(self.steps)
    }

    /// Whether the episode in `env` has run too long without scoring
    pub fn is_starving<E: Environment + ?Sized>(&self, env: &E) -> bool {
        env.steps() >= self.config.starvation_limit(env.score())
    }

    /// Action values of the active network
    pub fn q_values(&self, state: &Tensor) -> Result<Vec<f64>, AgentError> {
        Ok(self.networks[self.active].predict(state)?)
    }

    /// Action with the highest value under the active network
    pub fn greedy_action(&self, state: &Tensor) -> Result<Direction, AgentError> {
        let values = self.q_values(state)?;
        Ok(Direction::from_index(argmax(&values)).unwrap_or(Direction::Up))
    }

    /// ε-greedy action at the current exploration rate
    pub fn select_action(&mut self, state: &Tensor) -> Result<Direction, AgentError> {
        if self.rng.gen::<f64>() > self.epsilon() {
            self.greedy_action(state)
        } else {
            Ok(self.random_action())
        }
    }

    fn random_action(&mut self) -> Direction {
        Direction::ALL[self.rng.gen_range(0..Direction::ALL.len())]
    }

    /// Fill every replay memory with random-action experience
    ///
    /// Priorities come from the rewards alone. The environment is restarted
    /// whenever an episode ends or starves.
    pub fn prefill<E: Environment + ?Sized>(&mut self, env: &mut E) -> Result<(), AgentError> {
        for index in 0..self.memories.len() {
            let capacity = self.memories[index].capacity();
            for _ in 0..capacity {
                let action = self.random_action();
                let transition = Transition::observe(env, action);
                let p = priority(
                    transition.reward,
                    self.config.priority_alpha,
                    self.config.priority_epsilon,
                );
                let terminal = transition.terminal;
                self.memories[index].push(transition, p)?;

                if terminal || self.is_starving(env) {
                    env.initialize();
                }
            }
        }
        Ok(())
    }

    /// Store a freshly played transition in the active memory
    ///
    /// It gets the configured fresh priority so the next batches pick it up.
    pub fn remember(&mut self, transition: Transition) -> Result<usize, AgentError> {
        let slot = self.memories[self.active].push(transition, self.config.fresh_priority)?;
        Ok(slot)
    }

    /// One gradient step on the active network, returning the mean Huber loss
    pub fn learn(&mut self) -> Result<f64, AgentError> {
        let active = self.active;
        let evaluator = if self.networks.len() > 1 { 1 - active } else { active };
        let slots = self.memories[active].sample(self.config.batch_size, &mut self.rng)?;

        let updates = {
            let select = &self.networks[active];
            let evaluate = &self.networks[evaluator];
            let memory = &self.memories[active];
            let config = &self.config;

            slots
                .par_iter()
                .map(|&slot| {
                    let transition = memory.get(slot).ok_or(MemoryError::Vacant { slot })?;
                    sample_update(slot, transition, select, evaluate, config)
                })
                .collect::<Result<Vec<_>, AgentError>>()?
        };

        let mean = Gradients::mean_of(&self.networks[active], updates.iter().map(|u| &u.gradients))?;
        self.networks[active].apply_gradient(&mean, &self.config.optimizer)?;

        for update in &updates {
            let p = priority(
                update.error,
                self.config.priority_alpha,
                self.config.priority_epsilon,
            );
            self.memories[active].update_priority(update.slot, p)?;
        }

        self.steps += 1;
        if self.networks.len() > 1 {
            self.active = self.rng.gen_range(0..self.networks.len());
        }

        let loss = updates.iter().map(|u| u.loss).sum::<f64>() / updates.len().max(1) as f64;
        Ok(loss)
    }
}

/// Target, error and gradients for one sampled transition
fn sample_update(
    slot: usize,
    transition: &Transition,
    select: &Network,
    evaluate: &Network,
    config: &DqnConfig,
) -> Result<SampleUpdate, AgentError> {
    let stack = select.forward(&transition.state)?;
    let predicted = stack.last().ok_or(NetworkError::Empty)?.channels_at_origin();
    let action = transition.action.index();

    let mut target = predicted.clone();
    target[action] = transition.reward;
    if !transition.terminal {
        let next_action = argmax(&select.predict(&transition.next_state)?);
        let next_values = evaluate.predict(&transition.next_state)?;
        target[action] += config.gamma * next_values[next_action];
    }

    let gradients = select.backward(&stack, &target, config.huber_delta)?;
    Ok(SampleUpdate {
        slot,
        error: predicted[action] - target[action],
        loss: huber_loss(&predicted, &target, config.huber_delta),
        gradients,
    })
}

/// Index of the first maximum
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
