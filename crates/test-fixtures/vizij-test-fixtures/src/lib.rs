use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "motion-groups")]
    motion_groups: HashMap<String, String>,
    graphs: HashMap<String, GraphEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GraphEntry {
    Path(String),
    Detailed { path: String },
}

impl GraphEntry {
    fn as_path(&self) -> &str {
        match self {
            GraphEntry::Path(path) => path,
            GraphEntry::Detailed { path } => path,
        }
    }
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

/// Baked motion data groups (clips with per-frame samples).
pub mod motion_groups {
    use super::*;

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.motion_groups, "motion group", name)?;
        super::load_json(rel)
    }
}

/// Animation graph descriptors.
pub mod graphs {
    use super::*;

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.graphs, "graph", name)?;
        super::load_json(entry.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_manifest_entry_loads() {
        for name in MANIFEST.motion_groups.keys() {
            motion_groups::load::<serde_json::Value>(name).unwrap();
        }
        for name in MANIFEST.graphs.keys() {
            graphs::load::<serde_json::Value>(name).unwrap();
        }
    }

    #[test]
    fn unknown_names_are_reported() {
        let err = graphs::load::<serde_json::Value>("nope").unwrap_err();
        assert!(err.to_string().contains("unknown graph fixture 'nope'"));
        assert!(motion_groups::load::<serde_json::Value>("nope").is_err());
    }
}
