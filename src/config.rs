use std::{fmt::Display, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::board::validate_grid_size;
use crate::error::Result;
use crate::opponent::Difficulty;

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Privacy {
    #[default]
    Public,
    Private,
}

impl Display for Privacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Privacy::Public => write!(f, "public"),
            Privacy::Private => write!(f, "private"),
        }
    }
}

impl FromStr for Privacy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" | "PUBLIC" | "Public" => Ok(Privacy::Public),
            "private" | "PRIVATE" | "Private" => Ok(Privacy::Private),
            _ => Err(()),
        }
    }
}

/// Fixed for the lifetime of one game.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct GameConfig {
    grid_size: usize,
    difficulty: Difficulty,
    privacy: Privacy,
}

impl GameConfig {
    pub fn new(grid_size: usize, difficulty: Difficulty, privacy: Privacy) -> Result<Self> {
        validate_grid_size(grid_size)?;
        Ok(Self {
            grid_size,
            difficulty,
            privacy,
        })
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn privacy(&self) -> Privacy {
        self.privacy
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_size: 3,
            difficulty: Difficulty::Easy,
            privacy: Privacy::Public,
        }
    }
}

/// Runtime settings, read from a RON file. Every field may be omitted.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub grid_size: usize,
    pub difficulty: Difficulty,
    /// Opponent "thinking" pause in offline play; 0 disables it.
    pub think_delay_ms: u64,
    pub transaction_timeout_ms: u64,
    pub max_transaction_retries: u32,
    pub server_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grid_size: 3,
            difficulty: Difficulty::Easy,
            think_delay_ms: 1000,
            transaction_timeout_ms: 5000,
            max_transaction_retries: 5,
            server_addr: "127.0.0.1:6969".to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let settings = ron::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(settings)
    }

    pub fn game_config(&self, privacy: Privacy) -> Result<GameConfig> {
        GameConfig::new(self.grid_size, self.difficulty, privacy)
    }

    pub fn think_delay(&self) -> Duration {
        Duration::from_millis(self.think_delay_ms)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }
}
