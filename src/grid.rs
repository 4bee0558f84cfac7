// Typed gridworld model, parsed from (and serialized back to) the text format:
//
//   <episode length>
//   <row 0 tokens...>
//   <row 1 tokens...>
//
// Tokens: 'A' agent, '#' wall, '.' empty, 'C<v>' coin worth v,
// 'SD<t>' time-extension device adding t steps.
use itertools::Itertools;
use serde::{Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// Maximum number of interactable objects, bounded by the width of the
/// visited-set bitmask.
pub const MAX_OBJECTS: usize = 64;

pub type ObjectId = u8;

#[derive(Serialize, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, Copy, Clone)]
pub struct Tile {
    pub x: u16,
    pub y: u16,
}

impl Tile {
    pub fn new(x: u16, y: u16) -> Self {
        Tile { x, y }
    }
}

#[derive(Serialize, Debug, PartialEq, Eq, Hash, Copy, Clone)]
#[serde(tag = "kind", content = "value")]
pub enum Content {
    Agent,
    Coin(u32),
    TimeExtension(u32),
    Wall,
    Empty,
}

impl Content {
    pub fn is_interactable(&self) -> bool {
        matches!(self, Content::Agent | Content::Coin(_) | Content::TimeExtension(_))
    }

    /// Coin value, or extension amount. Zero for everything else.
    pub fn value(&self) -> u32 {
        match *self {
            Content::Coin(value) | Content::TimeExtension(value) => value,
            Content::Agent | Content::Wall | Content::Empty => 0,
        }
    }

    fn parse_token(token: &str) -> Option<Content> {
        match token {
            "A" => Some(Content::Agent),
            "#" => Some(Content::Wall),
            "." => Some(Content::Empty),
            _ => {
                if let Some(amount) = token.strip_prefix("SD") {
                    parse_positive(amount).map(Content::TimeExtension)
                } else if let Some(value) = token.strip_prefix('C') {
                    parse_positive(value).map(Content::Coin)
                } else {
                    None
                }
            }
        }
    }
}

// Plain digits only, so that serializing gives back the same token.
fn parse_positive(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|&v| v > 0)
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Agent => write!(f, "A"),
            Content::Coin(value) => write!(f, "C{value}"),
            Content::TimeExtension(amount) => write!(f, "SD{amount}"),
            Content::Wall => write!(f, "#"),
            Content::Empty => write!(f, "."),
        }
    }
}

#[derive(Serialize, Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub struct GridObject {
    pub id: ObjectId,
    pub content: Content,
    pub tile: Tile,
}

impl GridObject {
    pub fn value(&self) -> u32 {
        self.content.value()
    }
}

impl fmt::Display for GridObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@({},{})", self.content, self.tile.x, self.tile.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    episode_length: u32,
    width: usize,
    height: usize,
    // tiles[y * width + x]
    tiles: Vec<Content>,
    // Agent first, then coins, then time-extension devices (row-major within
    // each kind). Indexed by ObjectId.
    objects: Vec<GridObject>,
}

impl Grid {
    pub fn parse(text: &str) -> Result<Grid, ConfigurationError> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let first = lines.next().ok_or(ConfigurationError::MissingEpisodeLength)?;
        let first = first.trim();
        let episode_length = parse_positive(first)
            .ok_or_else(|| ConfigurationError::InvalidEpisodeLength(first.to_string()))?;

        let mut rows = Vec::new();
        for (y, line) in lines.enumerate() {
            let row = line.split_whitespace().enumerate()
                .map(|(x, token)| Content::parse_token(token).ok_or_else(
                    || ConfigurationError::InvalidToken {
                        row: y, column: x, token: token.to_string()
                    }))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
        Grid::from_rows(episode_length, rows)
    }

    /// Builds a grid from rows of contents, validating the same invariants as
    /// parsing does.
    pub fn from_rows(
        episode_length: u32, rows: Vec<Vec<Content>>
        ) -> Result<Grid, ConfigurationError> {
        let height = rows.len();
        let width = rows.first().map(|row| row.len()).unwrap_or(0);
        if height == 0 || width == 0 {
            return Err(ConfigurationError::EmptyGrid);
        }
        if let Some((row, found)) = rows.iter().map(|r| r.len()).enumerate()
            .find(|&(_, len)| len != width) {
            return Err(ConfigurationError::NonRectangular {
                row, expected: width, found
            });
        }
        if width > u16::MAX as usize || height > u16::MAX as usize {
            return Err(ConfigurationError::TooLarge { width, height });
        }
        if episode_length == 0 {
            return Err(ConfigurationError::InvalidEpisodeLength(
                episode_length.to_string()));
        }

        let tiles: Vec<Content> = rows.into_iter().flatten().collect();
        let objects = enumerate_objects(&tiles, width)?;
        Ok(Grid { episode_length, width, height, tiles, objects })
    }

    /// Copy of this grid with a single tile replaced.
    pub fn with_content(
        &self, tile: Tile, content: Content
        ) -> Result<Grid, ConfigurationError> {
        if !self.in_bounds(&tile) {
            return Err(ConfigurationError::OutOfBounds(tile));
        }
        let mut rows: Vec<Vec<Content>> = self.tiles.chunks(self.width)
            .map(|row| row.to_vec())
            .collect();
        rows[tile.y as usize][tile.x as usize] = content;
        Grid::from_rows(self.episode_length, rows)
    }

    pub fn episode_length(&self) -> u32 {
        self.episode_length
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn in_bounds(&self, tile: &Tile) -> bool {
        (tile.x as usize) < self.width && (tile.y as usize) < self.height
    }

    /// Content at a tile. Out of bounds reads as a wall.
    #[inline]
    pub fn content(&self, tile: &Tile) -> Content {
        if self.in_bounds(tile) {
            self.tiles[tile.y as usize * self.width + tile.x as usize]
        } else {
            Content::Wall
        }
    }

    pub fn tiles(&self) -> impl Iterator<Item=(Tile, Content)> + '_ {
        let width = self.width;
        self.tiles.iter().enumerate().map(move |(i, &content)| {
            (Tile::new((i % width) as u16, (i / width) as u16), content)
        })
    }

    pub fn objects(&self) -> &[GridObject] {
        &self.objects
    }

    pub fn object(&self, id: ObjectId) -> Option<&GridObject> {
        self.objects.get(id as usize)
    }

    pub fn agent(&self) -> &GridObject {
        // Construction guarantees the agent is object 0.
        &self.objects[0]
    }

    pub fn total_coin_value(&self) -> u64 {
        self.objects.iter()
            .filter(|object| matches!(object.content, Content::Coin(_)))
            .map(|object| u64::from(object.value()))
            .sum()
    }
}

fn enumerate_objects(
    tiles: &[Content], width: usize
    ) -> Result<Vec<GridObject>, ConfigurationError> {
    let located = |i: usize| Tile::new((i % width) as u16, (i / width) as u16);

    let mut agents = tiles.iter().positions(|c| *c == Content::Agent);
    let agent = agents.next().ok_or(ConfigurationError::MissingAgent)?;
    if let Some(second) = agents.next() {
        return Err(ConfigurationError::MultipleAgents {
            first: located(agent), second: located(second)
        });
    }

    let coins = tiles.iter().positions(|c| matches!(c, Content::Coin(_)));
    let extensions = tiles.iter()
        .positions(|c| matches!(c, Content::TimeExtension(_)));
    let indices: Vec<usize> = std::iter::once(agent)
        .chain(coins)
        .chain(extensions)
        .collect();
    if indices.len() > MAX_OBJECTS {
        return Err(ConfigurationError::TooManyObjects {
            count: indices.len(), max: MAX_OBJECTS
        });
    }
    Ok(indices.into_iter().enumerate()
        .map(|(id, i)| GridObject {
            id: id as ObjectId,
            content: tiles[i],
            tile: located(i),
        })
        .collect())
}

impl FromStr for Grid {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grid::parse(s)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.episode_length)?;
        let tokens: Vec<String> = self.tiles.iter().map(|c| c.to_string())
            .collect();
        let column_widths: Vec<usize> = (0..self.width)
            .map(|x| (0..self.height)
                 .map(|y| tokens[y * self.width + x].len())
                 .max()
                 .unwrap_or(1))
            .collect();
        for row in tokens.chunks(self.width) {
            let line = row.iter().zip(&column_widths)
                .map(|(token, &width)| format!("{token:^width$}"))
                .join(" ");
            writeln!(f, "{}", line.trim_end())?;
        }
        Ok(())
    }
}
