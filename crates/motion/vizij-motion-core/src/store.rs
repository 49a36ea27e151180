//! Shared, reference-counted frame databases.
//!
//! A state's database is built on first `acquire` and shared read-only by
//! every animator that enters the state. `release` drops one reference; the
//! last release frees the arenas. Group mutation rebuilds the database between
//! batches and bumps its generation so holders can notice the swap.

use std::sync::Arc;

use log::{debug, error};
use parking_lot::Mutex;

use crate::data::MotionDataGroup;
use crate::database::{BuildSettings, FrameDatabase};
use crate::error::{MotionError, Result};
use crate::ids::StateId;
use crate::sections::SectionTable;

/// Source clips and frame database of one motion data group.
#[derive(Debug)]
pub struct GroupDatabase {
    pub source: MotionDataGroup,
    pub frames: FrameDatabase,
}

/// Built database of one state: one entry per motion data group.
#[derive(Debug)]
pub struct StateDatabase {
    pub state: StateId,
    pub name: String,
    pub groups: Vec<GroupDatabase>,
}

impl StateDatabase {
    pub fn group(&self, index: usize) -> Option<&GroupDatabase> {
        self.groups.get(index)
    }

    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.source.name == name)
    }

    /// Usable frames across all groups.
    pub fn usable_frames(&self) -> usize {
        self.groups.iter().map(|g| g.frames.usable_frames()).sum()
    }
}

#[derive(Debug)]
struct StoreEntry {
    name: String,
    contact_requirement: Option<usize>,
    groups: Vec<MotionDataGroup>,
    built: Option<Arc<StateDatabase>>,
    refs: usize,
    generation: u64,
}

/// Owner of every state's frame database.
#[derive(Debug)]
pub struct DatabaseStore {
    settings: BuildSettings,
    sections: Arc<SectionTable>,
    entries: Mutex<Vec<StoreEntry>>,
}

impl DatabaseStore {
    pub fn new(settings: BuildSettings, sections: Arc<SectionTable>) -> Self {
        Self {
            settings,
            sections,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a state's groups; returns its id. Nothing is built yet.
    pub fn register(
        &self,
        name: impl Into<String>,
        groups: Vec<MotionDataGroup>,
        contact_requirement: Option<usize>,
    ) -> StateId {
        let mut entries = self.entries.lock();
        let id = StateId(entries.len() as u32);
        entries.push(StoreEntry {
            name: name.into(),
            contact_requirement,
            groups,
            built: None,
            refs: 0,
            generation: 0,
        });
        id
    }

    pub fn sections(&self) -> &Arc<SectionTable> {
        &self.sections
    }

    pub fn settings(&self) -> BuildSettings {
        self.settings
    }

    fn build_entry(&self, state: StateId, entry: &StoreEntry) -> Result<StateDatabase> {
        let requirement = entry
            .contact_requirement
            .map(|n| (entry.name.as_str(), n));
        let mut groups = Vec::with_capacity(entry.groups.len());
        for (gi, group) in entry.groups.iter().enumerate() {
            let frames =
                FrameDatabase::build(group, gi as u32, &self.sections, self.settings, requirement)?;
            groups.push(GroupDatabase {
                source: group.clone(),
                frames,
            });
        }
        Ok(StateDatabase {
            state,
            name: entry.name.clone(),
            groups,
        })
    }

    fn unknown(state: StateId) -> MotionError {
        MotionError::UnknownState {
            name: format!("#{}", state.0),
        }
    }

    /// Take a reference to `state`'s database, building it on first use.
    pub fn acquire(&self, state: StateId) -> Result<Arc<StateDatabase>> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(state.index())
            .ok_or_else(|| Self::unknown(state))?;
        let db = match &entry.built {
            Some(db) => Arc::clone(db),
            None => {
                let db = Arc::new(self.build_entry(state, entry)?);
                debug!(
                    "built database for state '{}' ({} usable frames)",
                    entry.name,
                    db.usable_frames()
                );
                entry.built = Some(Arc::clone(&db));
                db
            }
        };
        entry.refs += 1;
        Ok(db)
    }

    /// Drop one reference; the last one frees the database.
    pub fn release(&self, state: StateId) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(state.index())
            .ok_or_else(|| Self::unknown(state))?;
        if entry.refs == 0 {
            error!("database for state '{}' released with no holders", entry.name);
            return Err(MotionError::DatabaseOverReleased {
                state: entry.name.clone(),
            });
        }
        entry.refs -= 1;
        if entry.refs == 0 {
            entry.built = None;
            debug!("released database for state '{}'", entry.name);
        }
        Ok(())
    }

    /// Current database of `state` without taking a reference.
    pub fn get(&self, state: StateId) -> Result<Arc<StateDatabase>> {
        let entries = self.entries.lock();
        let entry = entries.get(state.index()).ok_or_else(|| Self::unknown(state))?;
        match &entry.built {
            Some(db) => Ok(Arc::clone(db)),
            None => {
                error!("database for state '{}' accessed before it was built", entry.name);
                Err(MotionError::DatabaseNotBuilt {
                    state: entry.name.clone(),
                })
            }
        }
    }

    pub fn ref_count(&self, state: StateId) -> usize {
        self.entries
            .lock()
            .get(state.index())
            .map_or(0, |e| e.refs)
    }

    pub fn is_built(&self, state: StateId) -> bool {
        self.entries
            .lock()
            .get(state.index())
            .is_some_and(|e| e.built.is_some())
    }

    /// Bumped every time the database of `state` is rebuilt by a mutation.
    pub fn generation(&self, state: StateId) -> u64 {
        self.entries
            .lock()
            .get(state.index())
            .map_or(0, |e| e.generation)
    }

    /// Number of groups registered for `state`.
    pub fn group_count(&self, state: StateId) -> usize {
        self.entries
            .lock()
            .get(state.index())
            .map_or(0, |e| e.groups.len())
    }

    /// Index of the group named `name` in `state`.
    pub fn group_index(&self, state: StateId, name: &str) -> Option<usize> {
        self.entries
            .lock()
            .get(state.index())
            .and_then(|e| e.groups.iter().position(|g| g.name == name))
    }

    /// Add a group to `state`. Callers must have drained in-flight batches.
    pub fn add_group(&self, state: StateId, group: MotionDataGroup) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(state.index())
            .ok_or_else(|| Self::unknown(state))?;
        if entry.groups.iter().any(|g| g.name == group.name) {
            return Err(MotionError::DuplicateName {
                kind: "motion data group",
                name: group.name,
            });
        }
        entry.groups.push(group);
        if let Err(err) = self.rebuild(state, entry) {
            entry.groups.pop();
            return Err(err);
        }
        Ok(())
    }

    /// Remove the group named `name` from `state`.
    pub fn remove_group(&self, state: StateId, name: &str) -> Result<MotionDataGroup> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(state.index())
            .ok_or_else(|| Self::unknown(state))?;
        let Some(pos) = entry.groups.iter().position(|g| g.name == name) else {
            return Err(MotionError::UnknownGroup {
                state: entry.name.clone(),
                name: name.to_string(),
            });
        };
        if entry.groups.len() == 1 {
            return Err(MotionError::EmptyState {
                state: entry.name.clone(),
            });
        }
        let removed = entry.groups.remove(pos);
        if let Err(err) = self.rebuild(state, entry) {
            entry.groups.insert(pos, removed);
            return Err(err);
        }
        Ok(removed)
    }

    fn rebuild(&self, state: StateId, entry: &mut StoreEntry) -> Result<()> {
        if entry.built.is_some() {
            let db = self.build_entry(state, entry)?;
            entry.built = Some(Arc::new(db));
            debug!("rebuilt database for state '{}'", entry.name);
        }
        entry.generation += 1;
        Ok(())
    }
}
