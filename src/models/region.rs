//! Hierarchical region codes (NUTS-style).

use serde::{Deserialize, Serialize};

/// Number of levels in a NUTS hierarchy (country, region, sub-region, local unit).
pub const NUTS_LEVELS: u8 = 4;

/// Level encoded by the length of a NUTS code (`UK` -> 0, `UKH12` -> 3).
///
/// Only a hint: the pivot index is the authoritative parent/child relation.
pub fn level_for_code(code: &str) -> Option<u8> {
    match code.len() {
        2 => Some(0),
        3 => Some(1),
        4 => Some(2),
        5 => Some(3),
        _ => None,
    }
}

/// Single level entry in a region path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub level: u8,
    pub code: String,
    #[serde(default)]
    pub name: String,
}

/// Ancestor path of a region, coarsest level first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPath {
    /// Country code as used by the boundary dataset (e.g. `UK`, `EL`)
    pub country: String,
    pub entries: Vec<RegionEntry>,
}

impl RegionPath {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            entries: Vec::new(),
        }
    }

    /// Set an entry for its level, keeping entries ordered by level
    pub fn set(&mut self, entry: RegionEntry) {
        match self.entries.binary_search_by_key(&entry.level, |e| e.level) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    pub fn get(&self, level: u8) -> Option<&RegionEntry> {
        self.entries.iter().find(|e| e.level == level)
    }

    /// Most specific entry
    pub fn deepest(&self) -> Option<&RegionEntry> {
        self.entries.last()
    }

    /// `UK/UKH/UKH1/UKH12`
    pub fn path(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.code.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flat `nuts{level}_id` / `nuts{level}` columns for every level.
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("nuts_country".to_string(), self.country.clone())];
        for level in 0..NUTS_LEVELS {
            let entry = self.get(level);
            fields.push((
                format!("nuts{}_id", level),
                entry.map(|e| e.code.clone()).unwrap_or_default(),
            ));
            fields.push((
                format!("nuts{}", level),
                entry.map(|e| e.name.clone()).unwrap_or_default(),
            ));
        }
        fields
    }

    /// Rebuild a path from flat per-level codes (names unknown).
    pub fn from_codes<I, S>(codes: I) -> Option<Self>
    where
        I: IntoIterator<Item = (u8, Option<S>)>,
        S: Into<String>,
    {
        let mut path = RegionPath::default();
        for (level, code) in codes {
            if let Some(code) = code {
                let code: String = code.into();
                if code.is_empty() {
                    continue;
                }
                if level == 0 {
                    path.country = code.clone();
                }
                path.set(RegionEntry {
                    level,
                    code,
                    name: String::new(),
                });
            }
        }
        if path.is_empty() {
            return None;
        }
        if path.country.is_empty() {
            path.country = path.entries[0].code.chars().take(2).collect();
        }
        Some(path)
    }
}
