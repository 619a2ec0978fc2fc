//! Administrative hierarchy: country > region > district > ward.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator between levels in an administrative path.
pub const PATH_DELIMITER: &str = " > ";

/// Level in the administrative hierarchy, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdministrativeLevel {
    Country,
    Region,
    District,
    Ward,
}

impl AdministrativeLevel {
    /// Level for a node at `depth` (0 = root). Anything deeper than a ward
    /// has no level.
    pub fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => Some(Self::Country),
            1 => Some(Self::Region),
            2 => Some(Self::District),
            3 => Some(Self::Ward),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::Region => "region",
            Self::District => "district",
            Self::Ward => "ward",
        }
    }
}

impl std::fmt::Display for AdministrativeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdministrativeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "country" => Ok(Self::Country),
            "region" => Ok(Self::Region),
            "district" => Ok(Self::District),
            "ward" => Ok(Self::Ward),
            other => Err(format!("unknown administrative level: {other}")),
        }
    }
}

/// A stored administrative area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Administrative {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub level: AdministrativeLevel,
    pub parent_id: Option<i64>,
    /// Human-readable path, root to leaf, joined by [`PATH_DELIMITER`].
    pub path: String,
}

/// An area to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAdministrative {
    pub code: String,
    pub name: String,
    pub level: AdministrativeLevel,
    pub parent_id: Option<i64>,
    pub path: String,
}

/// Split a path into trimmed, non-empty segments, root first.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(PATH_DELIMITER.trim())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// The (province, district, ward) triple for a ward path.
///
/// Takes the last three segments; with fewer than three, the missing upper
/// levels are empty strings.
pub fn ward_triple(path: &str) -> (String, String, String) {
    let segments = path_segments(path);
    let n = segments.len();
    let at = |offset: usize| -> String {
        if n >= offset {
            segments[n - offset].to_string()
        } else {
            String::new()
        }
    };
    (at(3), at(2), at(1))
}

/// Join segments into a path string.
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(PATH_DELIMITER)
}
