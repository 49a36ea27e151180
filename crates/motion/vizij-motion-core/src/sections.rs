//! Named clip sections and the dependency table gating which frames a search may pick.
//!
//! Section 0 is the implicit `Always` section: every frame belongs to it. A
//! frame is eligible for a search iff its section mask intersects the allowed
//! mask of the query's active section.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};

/// Name of the implicit section every frame belongs to.
pub const ALWAYS_SECTION: &str = "Always";

/// Maximum number of sections one graph may declare (bits of [`SectionMask`]).
pub const MAX_SECTIONS: usize = 64;

/// Bitmask of section indices.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionMask(pub u64);

impl SectionMask {
    pub const EMPTY: SectionMask = SectionMask(0);
    pub const ALL: SectionMask = SectionMask(u64::MAX);
    pub const ALWAYS: SectionMask = SectionMask(1);

    #[inline]
    pub fn of(section: u32) -> Self {
        debug_assert!((section as usize) < MAX_SECTIONS);
        SectionMask(1u64 << section)
    }

    #[inline]
    pub fn with(self, section: u32) -> Self {
        SectionMask(self.0 | Self::of(section).0)
    }

    #[inline]
    pub fn contains(self, section: u32) -> bool {
        self.0 & Self::of(section).0 != 0
    }

    #[inline]
    pub fn intersects(self, other: SectionMask) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn union(self, other: SectionMask) -> Self {
        SectionMask(self.0 | other.0)
    }
}

/// Authoring form of one section.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SectionDesc {
    pub name: String,
    /// Other sections whose frames may be picked while this one is active.
    #[serde(default)]
    pub allowed_with: Vec<String>,
}

/// Resolved section dependency table.
#[derive(Clone, Debug)]
pub struct SectionTable {
    names: Vec<String>,
    allowed: Vec<SectionMask>,
    by_name: HashMap<String, u32>,
}

impl Default for SectionTable {
    fn default() -> Self {
        let mut by_name = HashMap::new();
        by_name.insert(ALWAYS_SECTION.to_string(), 0);
        Self {
            names: vec![ALWAYS_SECTION.to_string()],
            allowed: vec![SectionMask::ALWAYS],
            by_name,
        }
    }
}

impl SectionTable {
    /// Resolve authoring descriptors into masks. `Always` may be listed
    /// explicitly to give it dependencies; it is index 0 either way.
    pub fn build(descs: &[SectionDesc]) -> Result<Self> {
        let mut table = SectionTable::default();
        for desc in descs {
            if desc.name == ALWAYS_SECTION {
                continue;
            }
            if table.by_name.contains_key(&desc.name) {
                return Err(MotionError::DuplicateName {
                    kind: "section",
                    name: desc.name.clone(),
                });
            }
            if table.names.len() >= MAX_SECTIONS {
                return Err(MotionError::TooManySections { max: MAX_SECTIONS });
            }
            let idx = table.names.len() as u32;
            table.names.push(desc.name.clone());
            table.allowed.push(SectionMask::of(idx));
            table.by_name.insert(desc.name.clone(), idx);
        }
        for desc in descs {
            let idx = table.index(&desc.name)?;
            let mut mask = SectionMask::of(idx);
            for other in &desc.allowed_with {
                mask = mask.with(table.index(other)?);
            }
            table.allowed[idx as usize] = mask;
        }
        Ok(table)
    }

    pub fn index(&self, name: &str) -> Result<u32> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| MotionError::UnknownSection {
                name: name.to_string(),
            })
    }

    pub fn name(&self, section: u32) -> Option<&str> {
        self.names.get(section as usize).map(String::as_str)
    }

    /// Mask of sections whose frames may be searched while `active` is current.
    pub fn allowed(&self, active: u32) -> SectionMask {
        self.allowed
            .get(active as usize)
            .copied()
            .unwrap_or(SectionMask::ALWAYS)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, allowed: &[&str]) -> SectionDesc {
        SectionDesc {
            name: name.into(),
            allowed_with: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn always_is_index_zero_and_allows_itself() {
        let table = SectionTable::build(&[]).unwrap();
        assert_eq!(table.index(ALWAYS_SECTION).unwrap(), 0);
        assert_eq!(table.allowed(0), SectionMask::ALWAYS);
    }

    #[test]
    fn dependencies_resolve_forward_references() {
        let table =
            SectionTable::build(&[desc("Walk", &["Run"]), desc("Run", &[]), desc("Jump", &[])])
                .unwrap();
        let walk = table.index("Walk").unwrap();
        let run = table.index("Run").unwrap();
        let jump = table.index("Jump").unwrap();
        let allowed = table.allowed(walk);
        assert!(allowed.contains(walk));
        assert!(allowed.contains(run));
        assert!(!allowed.contains(jump));
        assert!(!table.allowed(run).contains(walk));
    }

    #[test]
    fn duplicate_and_unknown_names_are_rejected() {
        assert!(matches!(
            SectionTable::build(&[desc("A", &[]), desc("A", &[])]),
            Err(MotionError::DuplicateName { .. })
        ));
        assert!(matches!(
            SectionTable::build(&[desc("A", &["Nope"])]),
            Err(MotionError::UnknownSection { .. })
        ));
    }
}
