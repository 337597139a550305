use crate::game::GameState;
use crate::nn::Tensor;

/// Value of a body cell in the observation grid
pub const BODY_VALUE: f64 = 1.0;

/// Value of the apple cell in the observation grid
pub const APPLE_VALUE: f64 = 0.299;

/// Create a single-channel, head-centred observation from game state
///
/// The grid is rolled (wrapping at the edges) so that the head always lands
/// at `(height / 2, width / 2)`. Each cell holds `min(body + 0.299·apple, 1)`,
/// so body cells read 1.0, the apple 0.299 and empty cells 0.
///
/// Returns: Tensor with shape [height, width, 1]
pub fn create_observation(state: &GameState) -> Tensor {
    let height = state.grid_height;
    let width = state.grid_width;
    let head = state.snake.head();

    let mut grid = Tensor::zeros(height, width, 1);
    let cell = |x: i32, y: i32| -> (usize, usize, usize) {
        let row = (y - head.y + (height + height / 2) as i32).rem_euclid(height as i32) as usize;
        let col = (x - head.x + (width + width / 2) as i32).rem_euclid(width as i32) as usize;
        (row, col, 0)
    };

    for &pos in &state.snake.body {
        grid[cell(pos.x, pos.y)] = BODY_VALUE;
    }
    if let Some(apple) = state.apple {
        let index = cell(apple.x, apple.y);
        grid[index] = (grid[index] + APPLE_VALUE).min(1.0);
    }

    grid
}
