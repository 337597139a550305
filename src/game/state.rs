use super::action::Direction;

/// A position on the game grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Move position by delta, wrapping around a `width`×`height` torus
    pub fn wrapped_by(&self, dx: i32, dy: i32, width: usize, height: usize) -> Self {
        Self {
            x: (self.x + dx).rem_euclid(width as i32),
            y: (self.y + dy).rem_euclid(height as i32),
        }
    }

    /// Move position one cell in a direction on a `width`×`height` torus
    pub fn moved_in_direction(&self, direction: Direction, width: usize, height: usize) -> Self {
        let (dx, dy) = direction.delta();
        self.wrapped_by(dx, dy, width, height)
    }
}

/// The snake in the game
#[derive(Debug, Clone, PartialEq)]
pub struct Snake {
    /// Body segments, with head at index 0
    pub body: Vec<Position>,
    /// Direction of the last move
    pub direction: Direction,
}

impl Snake {
    /// Create a snake whose body trails behind `head`, wrapping at the edges
    pub fn new(head: Position, direction: Direction, length: usize, width: usize, height: usize) -> Self {
        let mut body = vec![head];

        let (dx, dy) = direction.delta();
        for i in 1..length {
            let prev = body[i - 1];
            body.push(prev.wrapped_by(-dx, -dy, width, height));
        }

        Self { body, direction }
    }

    /// Get the head position
    pub fn head(&self) -> Position {
        self.body[0]
    }

    /// Cells still occupied after the next move
    ///
    /// The tail vacates its cell unless the snake is growing.
    pub fn blocking_segments(&self, growing: bool) -> &[Position] {
        if growing {
            &self.body
        } else {
            &self.body[..self.body.len() - 1]
        }
    }

    /// Move the head to `new_head`, growing if should_grow is true
    pub fn advance(&mut self, new_head: Position, should_grow: bool) {
        self.body.insert(0, new_head);

        if !should_grow {
            self.body.pop();
        }
    }

    /// Get the length of the snake
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Check if the snake is empty (should never happen in practice)
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Complete game state
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub snake: Snake,
    /// Apple position; `None` once the snake fills the grid
    pub apple: Option<Position>,
    pub grid_width: usize,
    pub grid_height: usize,
    pub score: u32,
    pub steps: u32,
    pub is_alive: bool,
}

impl GameState {
    /// Create a new game state
    pub fn new(snake: Snake, apple: Option<Position>, grid_width: usize, grid_height: usize) -> Self {
        Self {
            snake,
            apple,
            grid_width,
            grid_height,
            score: 0,
            steps: 0,
            is_alive: true,
        }
    }

    /// Check if a position is occupied by the snake
    pub fn is_occupied_by_snake(&self, pos: Position) -> bool {
        self.snake.body.contains(&pos)
    }

    /// Neighbouring cell of `pos` in `direction`, wrapping at the edges
    pub fn neighbour(&self, pos: Position, direction: Direction) -> Position {
        pos.moved_in_direction(direction, self.grid_width, self.grid_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_wraps() {
        let pos = Position::new(0, 9);
        assert_eq!(pos.wrapped_by(-1, 0, 10, 10), Position::new(9, 9));
        assert_eq!(pos.wrapped_by(0, 1, 10, 10), Position::new(0, 0));
        assert_eq!(pos.moved_in_direction(Direction::Right, 10, 10), Position::new(1, 9));
        assert_eq!(pos.moved_in_direction(Direction::Up, 10, 10), Position::new(0, 8));
    }

    #[test]
    fn test_snake_creation_wraps_body() {
        let snake = Snake::new(Position::new(1, 5), Direction::Right, 3, 10, 10);
        assert_eq!(snake.len(), 3);
        assert_eq!(snake.head(), Position::new(1, 5));
        assert_eq!(snake.body[1], Position::new(0, 5));
        assert_eq!(snake.body[2], Position::new(9, 5));
    }

    #[test]
    fn test_snake_advance() {
        let mut snake = Snake::new(Position::new(5, 5), Direction::Right, 3, 10, 10);

        snake.advance(Position::new(6, 5), false);
        assert_eq!(snake.len(), 3);
        assert_eq!(snake.head(), Position::new(6, 5));

        snake.advance(Position::new(7, 5), true);
        assert_eq!(snake.len(), 4);
        assert_eq!(snake.head(), Position::new(7, 5));
    }

    #[test]
    fn test_blocking_segments_release_tail() {
        let snake = Snake::new(Position::new(5, 5), Direction::Right, 3, 10, 10);
        assert_eq!(snake.blocking_segments(false).len(), 2);
        assert!(!snake.blocking_segments(false).contains(&Position::new(3, 5)));
        assert!(snake.blocking_segments(true).contains(&Position::new(3, 5)));
    }
}
