//! Game server regions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::wg::WgError;

/// A WoT Blitz server cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Ru,
    Eu,
    Com,
    Asia,
    China,
}

impl Region {
    pub const ALL: [Region; 5] = [Region::Ru, Region::Eu, Region::Com, Region::Asia, Region::China];

    /// Regions with a public API server.
    pub const API: [Region; 4] = [Region::Ru, Region::Eu, Region::Com, Region::Asia];

    /// Infer the region from an account ID. Each cluster allocates IDs from
    /// its own range; everything below 500M is RU and everything from 3.1B up
    /// is China.
    pub fn from_account_id(account_id: u64) -> Region {
        match account_id {
            3_100_000_000.. => Region::China,
            2_000_000_000.. => Region::Asia,
            1_000_000_000.. => Region::Com,
            500_000_000.. => Region::Eu,
            _ => Region::Ru,
        }
    }

    /// API root for this region, `None` where no public server exists.
    pub fn base_url(&self) -> Option<&'static str> {
        match self {
            Region::Ru => Some("https://api.wotblitz.ru/wotb/"),
            Region::Eu => Some("https://api.wotblitz.eu/wotb/"),
            Region::Com => Some("https://api.wotblitz.com/wotb/"),
            Region::Asia => Some("https://api.wotblitz.asia/wotb/"),
            Region::China => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Ru => "ru",
            Region::Eu => "eu",
            Region::Com => "com",
            Region::Asia => "asia",
            Region::China => "china",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = WgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ru" => Ok(Region::Ru),
            "eu" => Ok(Region::Eu),
            "com" | "na" => Ok(Region::Com),
            "asia" => Ok(Region::Asia),
            "china" => Ok(Region::China),
            other => Err(WgError::UnknownRegion(other.to_string())),
        }
    }
}
