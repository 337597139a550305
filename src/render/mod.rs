//! Terminal rendering of a game in progress

pub mod renderer;

pub use renderer::{Hud, Renderer};
