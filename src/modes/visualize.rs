//! Visualization mode for watching trained agents
//!
//! This module implements a TUI-based visualization mode that loads a weight
//! file and displays the agent playing Snake greedily. Users can control
//! playback speed, pause, and reset episodes.
//!
//! # Controls
//!
//! - Space: Pause/unpause
//! - R: Reset episode
//! - 1-4: Speed control (1=slow, 2=normal, 3=fast, 4=very fast)
//! - Q/Esc: Quit
//!
//! # Example
//!
//! ```rust,no_run
//! use conv_snake::game::GameConfig;
//! use conv_snake::modes::VisualizeMode;
//! use conv_snake::rl::DqnConfig;
//! use std::path::Path;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut visualize_mode = VisualizeMode::new(
//!     Path::new("models/weights.txt"),
//!     GameConfig::default(),
//!     DqnConfig::default(),
//!     0,
//! )?;
//! visualize_mode.run().await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    io::{stderr, Stderr},
    path::Path,
    time::Duration,
};
use tokio::time::{interval, Interval};
use tracing::info;

use crate::game::{Direction, GameConfig};
use crate::nn::load_weights;
use crate::render::{Hud, Renderer};
use crate::rl::{DqnAgent, DqnConfig, Environment, SnakeEnvironment};

/// Visualization speed settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizationSpeed {
    /// Slow: 2 Hz (500ms per step)
    Slow,
    /// Normal: 8 Hz (125ms per step)
    Normal,
    /// Fast: 20 Hz (50ms per step)
    Fast,
    /// Very Fast: 60 Hz (16ms per step)
    VeryFast,
}

impl VisualizationSpeed {
    /// Get the tick interval for this speed
    fn tick_interval(&self) -> Duration {
        match self {
            Self::Slow => Duration::from_millis(500),
            Self::Normal => Duration::from_millis(125),
            Self::Fast => Duration::from_millis(50),
            Self::VeryFast => Duration::from_millis(16),
        }
    }

    /// Get a string representation of the speed
    fn as_str(&self) -> &'static str {
        match self {
            Self::Slow => "Slow",
            Self::Normal => "Normal",
            Self::Fast => "Fast",
            Self::VeryFast => "Very Fast",
        }
    }
}

/// Visualization mode for watching trained agents
pub struct VisualizeMode {
    /// Single-network agent holding the loaded weights; only ever acts greedily
    agent: DqnAgent,

    /// Snake environment
    env: SnakeEnvironment,

    /// Renderer for TUI display
    renderer: Renderer,

    /// Action values behind the last move
    q_values: Vec<f64>,

    /// Last move taken
    last_action: Option<Direction>,

    /// Whether to quit the visualization
    should_quit: bool,

    /// Whether playback is paused
    paused: bool,

    /// Current playback speed
    speed: VisualizationSpeed,

    /// Number of episodes completed
    episode_count: usize,

    best_score: u32,
}

impl VisualizeMode {
    /// Create a new visualization mode
    ///
    /// Builds the network described by `dqn.topology` for the grid in
    /// `config` and fills it from `weights_path`. The file must come from
    /// a network of the same topology and grid size.
    pub fn new(weights_path: &Path, config: GameConfig, dqn: DqnConfig, seed: u64) -> Result<Self> {
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid game configuration")?;

        let dqn = DqnConfig {
            double: false,
            ..dqn
        };
        let mut agent = DqnAgent::new(dqn, config.grid_height, config.grid_width, seed)
            .context("Failed to build network")?;
        for network in agent.networks_mut() {
            load_weights(network, weights_path)
                .with_context(|| format!("Failed to load weights from {:?}", weights_path))?;
        }

        info!(
            path = ?weights_path,
            topology = ?agent.config().topology,
            grid = %format!("{}x{}", config.grid_width, config.grid_height),
            "Loaded weights"
        );

        let env = SnakeEnvironment::new(config, seed.wrapping_add(1));

        Ok(Self {
            agent,
            env,
            renderer: Renderer::new(),
            q_values: Vec::new(),
            last_action: None,
            should_quit: false,
            paused: false,
            speed: VisualizationSpeed::Normal,
            episode_count: 0,
            best_score: 0,
        })
    }

    /// Run the visualization loop
    ///
    /// Sets up the terminal, runs the main visualization loop, and cleans up
    /// on exit.
    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stderr = stderr();
        execute!(stderr, EnterAlternateScreen).context("Failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stderr);
        let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;
        terminal.hide_cursor().context("Failed to hide cursor")?;
        terminal.clear().context("Failed to clear terminal")?;

        let result = self.run_visualization_loop(&mut terminal).await;

        self.cleanup_terminal(&mut terminal)?;

        info!(
            episodes = self.episode_count,
            best_score = self.best_score,
            "Visualization finished"
        );

        result
    }

    /// Main visualization loop
    async fn run_visualization_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stderr>>,
    ) -> Result<()> {
        let mut event_stream = EventStream::new();

        // Game ticks based on speed
        let mut tick_timer = interval(self.speed.tick_interval());

        // Render at 30 FPS
        let mut render_timer = interval(Duration::from_millis(33));

        self.restart();

        loop {
            tokio::select! {
                maybe_event = event_stream.next() => {
                    if let Some(Ok(event)) = maybe_event {
                        self.handle_event(event, &mut tick_timer);
                    }
                }

                _ = tick_timer.tick() => {
                    if !self.paused {
                        self.tick()?;
                    }
                }

                _ = render_timer.tick() => {
                    terminal.draw(|frame| {
                        self.renderer.render(frame, self.env.game(), &self.hud());
                    }).context("Failed to draw frame")?;
                }

                _ = tokio::signal::ctrl_c() => {
                    self.should_quit = true;
                }
            }

            if self.should_quit {
                break;
            }
        }

        Ok(())
    }

    /// Advance playback by one tick
    ///
    /// A finished or starving episode is replaced by a fresh one; otherwise
    /// the agent makes one greedy move.
    fn tick(&mut self) -> Result<()> {
        if self.env.is_terminal() || self.agent.is_starving(&self.env) {
            self.restart();
            Ok(())
        } else {
            self.step_agent()
        }
    }

    /// Step the agent forward one greedy action
    fn step_agent(&mut self) -> Result<()> {
        let state = self.env.state();
        self.q_values = self
            .agent
            .q_values(&state)
            .context("Failed to evaluate network")?;
        let action = self
            .agent
            .greedy_action(&state)
            .context("Failed to select action")?;

        self.env.step(action);
        self.last_action = Some(action);
        self.best_score = self.best_score.max(self.env.game().score);

        Ok(())
    }

    fn restart(&mut self) {
        if self.env.steps() > 0 {
            self.episode_count += 1;
        }
        self.env.initialize();
        self.q_values.clear();
        self.last_action = None;
    }

    fn hud(&self) -> Hud<'_> {
        Hud {
            episode: self.episode_count + 1,
            best_score: self.best_score,
            speed: self.speed.as_str(),
            paused: self.paused,
            q_values: &self.q_values,
            last_action: self.last_action,
        }
    }

    /// Handle keyboard events
    fn handle_event(&mut self, event: Event, tick_timer: &mut Interval) {
        if let Event::Key(key) = event {
            // Only process key press events
            if key.kind != KeyEventKind::Press {
                return;
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.should_quit = true;
                }
                KeyCode::Char(' ') => {
                    self.paused = !self.paused;
                }
                KeyCode::Char('r') => {
                    self.restart();
                }
                KeyCode::Char('1') => {
                    self.change_speed(VisualizationSpeed::Slow, tick_timer);
                }
                KeyCode::Char('2') => {
                    self.change_speed(VisualizationSpeed::Normal, tick_timer);
                }
                KeyCode::Char('3') => {
                    self.change_speed(VisualizationSpeed::Fast, tick_timer);
                }
                KeyCode::Char('4') => {
                    self.change_speed(VisualizationSpeed::VeryFast, tick_timer);
                }
                _ => {}
            }
        }
    }

    /// Change the visualization speed
    fn change_speed(&mut self, new_speed: VisualizationSpeed, tick_timer: &mut Interval) {
        self.speed = new_speed;
        *tick_timer = interval(self.speed.tick_interval());
    }

    /// Cleanup terminal state
    fn cleanup_terminal(&mut self, terminal: &mut Terminal<CrosstermBackend<Stderr>>) -> Result<()> {
        disable_raw_mode().context("Failed to disable raw mode")?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)
            .context("Failed to leave alternate screen")?;
        terminal.show_cursor().context("Failed to show cursor")?;
        Ok(())
    }
}
