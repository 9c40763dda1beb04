use crate::modules::grid::{Cell, Direction};

/// Waypoint queue plus move synthesis. Hosts with real path-finding supply
/// their own implementation; the agent only needs these operations.
pub trait Navigator {
    fn add_waypoint(&mut self, cell: Cell);

    fn add_waypoints(&mut self, cells: impl IntoIterator<Item = Cell>)
    where
        Self: Sized,
    {
        for cell in cells {
            self.add_waypoint(cell);
        }
    }

    /// Remaining waypoints, next one first.
    fn waypoints(&self) -> &[Cell];

    /// A route was set and every waypoint on it has been reached.
    fn is_done(&self) -> bool;

    fn reset(&mut self);

    /// Advance past waypoints the agent is already standing on.
    fn sync(&mut self, position: Cell);

    fn next_move(&mut self, position: Cell) -> Option<Direction>;
}

/// Straight-line navigator: closes the x gap, then the y gap. No obstacle
/// avoidance.
#[derive(Clone, Debug, Default)]
pub struct GridNavigator {
    route: Vec<Cell>,
    cursor: usize,
}

impl GridNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_target(&self) -> Option<Cell> {
        self.route.get(self.cursor).copied()
    }
}

impl Navigator for GridNavigator {
    fn add_waypoint(&mut self, cell: Cell) {
        self.route.push(cell);
    }

    fn waypoints(&self) -> &[Cell] {
        &self.route[self.cursor.min(self.route.len())..]
    }

    fn is_done(&self) -> bool {
        !self.route.is_empty() && self.cursor >= self.route.len()
    }

    fn reset(&mut self) {
        self.route.clear();
        self.cursor = 0;
    }

    fn sync(&mut self, position: Cell) {
        while self.route.get(self.cursor) == Some(&position) {
            self.cursor += 1;
        }
    }

    fn next_move(&mut self, position: Cell) -> Option<Direction> {
        self.sync(position);
        let target = self.current_target()?;
        Direction::towards(position, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_route_in_order() {
        let mut nav = GridNavigator::new();
        assert!(!nav.is_done());
        nav.add_waypoints([Cell::new(1, 0), Cell::new(1, 2)]);

        let mut pos = Cell::new(0, 0);
        let mut steps = 0;
        while let Some(dir) = nav.next_move(pos) {
            pos = pos.step(dir);
            steps += 1;
        }
        assert_eq!(pos, Cell::new(1, 2));
        assert_eq!(steps, 3);
        assert!(nav.is_done());
        assert!(nav.waypoints().is_empty());
    }

    #[test]
    fn sync_skips_reached_waypoints() {
        let mut nav = GridNavigator::new();
        nav.add_waypoints([Cell::new(2, 2), Cell::new(4, 2)]);
        nav.sync(Cell::new(2, 2));
        assert_eq!(nav.waypoints(), &[Cell::new(4, 2)]);
        nav.reset();
        assert!(nav.waypoints().is_empty());
        assert!(!nav.is_done());
    }
}
