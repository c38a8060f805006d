use anyhow::{anyhow, Context};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;

#[derive(Debug, Clone)]
pub struct Tile {
    passable: bool,
    pub neighbors: Vec<(usize, usize)>, // Stores coordinates of accessible neighbors, self included
}

impl Tile {
    pub fn is_passable(&self) -> bool {
        self.passable
    }
}

#[derive(Debug, Clone)]
pub struct Map {
    pub height: usize,
    pub width: usize,
    pub grid: Vec<Vec<Tile>>,
}

impl Map {
    /// Load a MovingAI `.map` file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading map {path}"))?;
        Self::parse(&text).with_context(|| format!("parsing map {path}"))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut lines = text.lines();

        let _type = lines.next().ok_or_else(|| anyhow!("missing type line"))?;
        let height = header_value(lines.next(), "height")?;
        let width = header_value(lines.next(), "width")?;
        let _map = lines.next().ok_or_else(|| anyhow!("missing map line"))?;

        let rows: Vec<&str> = lines.take(height).collect();
        if rows.len() != height {
            return Err(anyhow!("expected {height} rows, found {}", rows.len()));
        }
        if let Some(row) = rows.iter().find(|row| row.chars().count() < width) {
            return Err(anyhow!("row shorter than width {width}: {row:?}"));
        }
        Ok(Self::from_rows(&rows))
    }

    /// Build a map from raw rows, `.` marking passable cells.
    pub fn from_rows(rows: &[&str]) -> Self {
        let height = rows.len();
        let width = rows.iter().map(|row| row.chars().count()).max().unwrap_or(0);
        let grid = rows
            .iter()
            .map(|row| {
                let mut tiles: Vec<Tile> = row
                    .chars()
                    .map(|ch| Tile {
                        passable: ch == '.',
                        neighbors: Vec::new(),
                    })
                    .collect();
                tiles.resize(
                    width,
                    Tile {
                        passable: false,
                        neighbors: Vec::new(),
                    },
                );
                tiles
            })
            .collect();

        let mut map = Map {
            height,
            width,
            grid,
        };
        map.initialize_neighbors();
        map
    }

    fn initialize_neighbors(&mut self) {
        for x in 0..self.height {
            for y in 0..self.width {
                if self.grid[x][y].passable {
                    self.grid[x][y].neighbors = self.compute_neighbors(x, y);
                }
            }
        }
    }

    fn compute_neighbors(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        let directions = [(-1, 0), (1, 0), (0, -1), (0, 1), (0, 0)]; // Up, down, left, right, stay
        let mut neighbors = Vec::new();

        for &(dx, dy) in &directions {
            let new_x = x as i64 + dx;
            let new_y = y as i64 + dy;
            if new_x >= 0
                && new_y >= 0
                && new_x < self.height as i64
                && new_y < self.width as i64
                && self.grid[new_x as usize][new_y as usize].passable
            {
                neighbors.push((new_x as usize, new_y as usize));
            }
        }

        neighbors
    }

    pub fn get_neighbors(&self, x: usize, y: usize) -> Vec<(usize, usize)> {
        match self.grid.get(x).and_then(|row| row.get(y)) {
            Some(tile) => tile.neighbors.clone(),
            None => Vec::new(),
        }
    }

    pub fn is_passable(&self, x: usize, y: usize) -> bool {
        self.grid
            .get(x)
            .and_then(|row| row.get(y))
            .is_some_and(Tile::is_passable)
    }

    pub fn heuristic_dji(&self, goal: (usize, usize)) -> Vec<Vec<usize>> {
        let mut heuristic = vec![vec![usize::MAX; self.width]; self.height];
        if !self.is_passable(goal.0, goal.1) {
            return heuristic;
        }
        let mut heap = BinaryHeap::new();

        heuristic[goal.0][goal.1] = 0;
        heap.push((Reverse(0), goal));

        while let Some((Reverse(cost), (x, y))) = heap.pop() {
            if cost > heuristic[x][y] {
                continue;
            }

            for &(new_x, new_y) in &self.grid[x][y].neighbors {
                let next_cost = cost + 1;
                if next_cost < heuristic[new_x][new_y] {
                    heap.push((Reverse(next_cost), (new_x, new_y)));
                    heuristic[new_x][new_y] = next_cost;
                }
            }
        }

        heuristic
    }
}

fn header_value(line: Option<&str>, name: &str) -> anyhow::Result<usize> {
    let line = line.ok_or_else(|| anyhow!("missing {name} line"))?;
    line.split_whitespace()
        .last()
        .ok_or_else(|| anyhow!("empty {name} line"))?
        .parse::<usize>()
        .with_context(|| format!("invalid {name}: {line:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_map() {
        let map = Map::from_file("map_file/test/test.map").unwrap();

        assert_eq!(map.height, 5);
        assert_eq!(map.width, 5);

        assert!(map.is_passable(0, 0));
        assert!(!map.is_passable(1, 1));
        assert!(!map.is_passable(7, 7));

        let neighbors = map.get_neighbors(0, 1);
        assert_eq!(neighbors.len(), 3);
        assert!(neighbors.contains(&(0, 0)));
        assert!(neighbors.contains(&(0, 2)));
        assert!(neighbors.contains(&(0, 1)));
    }

    #[test]
    fn test_parse_rejects_short_map() {
        let text = "type octile\nheight 3\nwidth 3\nmap\n...\n...\n";
        assert!(Map::parse(text).is_err());
    }

    #[test]
    fn test_heuristic_around_wall() {
        let map = Map::from_rows(&["...", "@@.", "..."]);
        let h = map.heuristic_dji((2, 0));
        assert_eq!(h[0][0], 6);
        assert_eq!(h[1][0], usize::MAX);
        assert_eq!(h[2][2], 2);
    }
}
