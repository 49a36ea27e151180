//! Animation graph: states, transitions, parameters and sections resolved
//! from an authoring description.
//!
//! Names are resolved once here; everything downstream works with ids and
//! handles. The graph owns the database store shared by every animator that
//! runs it.

use std::sync::Arc;

use hashbrown::HashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::cost::CostConfig;
use crate::database::BuildSettings;
use crate::error::{MotionError, Result};
use crate::ids::StateId;
use crate::params::{ParameterDesc, ParameterTable};
use crate::sections::{SectionDesc, SectionTable};
use crate::state::{StateDesc, StateKind};
use crate::store::DatabaseStore;
use crate::transition::{Transition, TransitionDesc, TransitionOption};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDesc {
    pub states: Vec<StateDesc>,
    #[serde(default)]
    pub transitions: Vec<TransitionDesc>,
    #[serde(default)]
    pub parameters: Vec<ParameterDesc>,
    #[serde(default)]
    pub sections: Vec<SectionDesc>,
    /// Defaults to the first state.
    #[serde(default)]
    pub start_state: Option<String>,
}

/// A resolved state.
#[derive(Clone, Debug)]
pub struct StateNode {
    pub id: StateId,
    pub name: String,
    pub kind: StateKind,
    pub cost: CostConfig,
    /// Outgoing transitions in evaluation order.
    pub transitions: Vec<Transition>,
}

#[derive(Debug)]
pub struct AnimationGraph {
    config: Config,
    states: Vec<StateNode>,
    by_name: HashMap<String, StateId>,
    params: ParameterTable,
    sections: Arc<SectionTable>,
    store: DatabaseStore,
    start: StateId,
}

/// Single-animation checks: every search window names a clip of the state and
/// the fallback clip exists in the first group.
fn validate_single_animation(desc: &StateDesc) -> Result<()> {
    let StateKind::SingleAnimation(features) = &desc.kind else {
        return Ok(());
    };
    for w in &features.windows {
        let known = desc
            .groups
            .iter()
            .any(|g| g.clips.iter().any(|c| c.name == w.clip));
        if !known {
            return Err(MotionError::InvalidClip {
                clip: w.clip.clone(),
                reason: format!("search window names a clip not in state '{}'", desc.name),
            });
        }
    }
    let clips = desc.groups.first().map_or(0, |g| g.clips.len());
    if features.clip >= clips {
        return Err(MotionError::InvalidClip {
            clip: format!("#{}", features.clip),
            reason: format!(
                "fallback clip of state '{}' is out of range ({clips} clips in its first group)",
                desc.name
            ),
        });
    }
    Ok(())
}

impl AnimationGraph {
    pub fn build(desc: GraphDesc, config: &Config) -> Result<Arc<Self>> {
        let sections = Arc::new(SectionTable::build(&desc.sections)?);
        let params = ParameterTable::build(&desc.parameters)?;
        let store = DatabaseStore::new(
            BuildSettings {
                max_frames_per_job: config.max_frames_per_job,
                workers: config.worker_threads(),
            },
            Arc::clone(&sections),
        );

        let mut by_name = HashMap::new();
        let mut states = Vec::with_capacity(desc.states.len());
        for state in &desc.states {
            if by_name.contains_key(&state.name) {
                return Err(MotionError::DuplicateName {
                    kind: "state",
                    name: state.name.clone(),
                });
            }
            if state.groups.is_empty() || state.groups.iter().any(|g| g.clips.is_empty()) {
                return Err(MotionError::EmptyState {
                    state: state.name.clone(),
                });
            }
            for (i, g) in state.groups.iter().enumerate() {
                if state.groups[..i].iter().any(|other| other.name == g.name) {
                    return Err(MotionError::DuplicateName {
                        kind: "motion data group",
                        name: g.name.clone(),
                    });
                }
            }
            validate_single_animation(state)?;
            let id = store.register(
                state.name.clone(),
                state.groups.clone(),
                state.kind.contact_requirement(),
            );
            by_name.insert(state.name.clone(), id);
            states.push(StateNode {
                id,
                name: state.name.clone(),
                kind: state.kind.clone(),
                cost: state.cost,
                transitions: Vec::new(),
            });
        }

        let lookup = |name: &str| {
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| MotionError::UnknownState {
                    name: name.to_string(),
                })
        };
        for t in &desc.transitions {
            let from = lookup(&t.from)?;
            let to = lookup(&t.to)?;
            let source = &desc.states[from.index()];
            let options = t
                .options
                .iter()
                .map(|o| TransitionOption::resolve(o, &source.name, &source.groups, &params, &sections))
                .collect::<Result<Vec<_>>>()?;
            states[from.index()]
                .transitions
                .push(Transition { from, to, options });
        }

        let start = match &desc.start_state {
            Some(name) => lookup(name)?,
            None if !states.is_empty() => StateId(0),
            None => {
                return Err(MotionError::UnknownState {
                    name: "<start>".into(),
                })
            }
        };

        debug!(
            "built animation graph: {} states, {} parameters, {} sections",
            states.len(),
            params.len(),
            sections.len()
        );

        Ok(Arc::new(Self {
            config: config.clone(),
            states,
            by_name,
            params,
            sections,
            store,
            start,
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self, id: StateId) -> Option<&StateNode> {
        self.states.get(id.index())
    }

    pub fn state_id(&self, name: &str) -> Result<StateId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| MotionError::UnknownState {
                name: name.to_string(),
            })
    }

    pub fn states(&self) -> &[StateNode] {
        &self.states
    }

    pub fn start_state(&self) -> StateId {
        self.start
    }

    pub fn params(&self) -> &ParameterTable {
        &self.params
    }

    pub fn sections(&self) -> &SectionTable {
        &self.sections
    }

    pub fn store(&self) -> &DatabaseStore {
        &self.store
    }
}
