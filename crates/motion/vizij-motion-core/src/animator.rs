//! Per-character state machine.
//!
//! The animator owns search timing, weight ramps, transition gating and contact
//! correction for one character. It is driven by the host once per frame:
//! advance the mixer, call [`Animator::update`], apply root motion, then call
//! [`Animator::late_update`].
//!
//! Periodic motion-matching searches are issued on one frame and joined on the
//! next; entry and forced searches block until their batch finishes.

use std::sync::Arc;

use glam::{Quat, Vec3};
use log::{debug, warn};

use crate::blend::{BlendController, BlendInput, BlendMixer, ClipRef};
use crate::contact::{ContactMovement, ContactPattern};
use crate::data::{BoneSample, Clip, ContactSample, TrajectoryPoint};
use crate::error::{MotionError, Result};
use crate::graph::{AnimationGraph, StateNode};
use crate::guard::{ContinuityGuard, Playback};
use crate::ids::{InputHandle, StateId};
use crate::outputs::{MotionEvent, Outputs};
use crate::params::{ParamValue, ParameterValues};
use crate::query::Query;
use crate::sampling::{sample_contact, sample_pose};
use crate::search::{JobSystem, PendingSearch, SearchKind, SearchPhase, SearchRequest, Winner};
use crate::state::{StateKind, StatePhase};
use crate::store::StateDatabase;
use crate::time::{crossed, extrapolate};
use crate::transition::{evaluate, TransitionContext};

#[derive(Debug)]
struct ActiveState {
    id: StateId,
    db: Arc<StateDatabase>,
    generation: u64,
    group: usize,
    active_section: u32,
    phase: StatePhase,
    since_search: f32,
    responsivity: f32,
}

/// In-flight periodic search plus what it needs when joined.
#[derive(Debug)]
struct InFlight {
    pending: PendingSearch,
    elapsed: f32,
}

#[derive(Debug)]
struct ContactRun {
    handle: InputHandle,
    group: usize,
    clip: usize,
    /// Clip contact index approached by each target.
    clip_contacts: Vec<usize>,
    next: usize,
    movement: ContactMovement,
    lerp: Option<LerpState>,
    angular_speed: f32,
    remaining_angle: f32,
}

#[derive(Clone, Copy, Debug)]
struct LerpState {
    gap: Vec3,
    applied: Vec3,
    start_time: f32,
}

pub struct Animator {
    graph: Arc<AnimationGraph>,
    jobs: JobSystem,
    params: ParameterValues,
    current: Option<ActiveState>,
    blend: BlendController,
    in_flight: Option<InFlight>,
    ready: Option<(Winner, u64, f32)>,
    input_trajectory: Vec<TrajectoryPoint>,
    contact_targets: Vec<ContactSample>,
    contact: Option<ContactRun>,
    root_position: Vec3,
    root_rotation: Quat,
    marker_cursor: Option<(InputHandle, f32)>,
    outputs: Outputs,
    scratch_pose: Vec<BoneSample>,
}

impl std::fmt::Debug for Animator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Animator")
            .field("state", &self.current.as_ref().map(|s| s.id))
            .field("inputs", &self.blend.input_count())
            .field("search_phase", &self.search_phase())
            .finish()
    }
}

fn wrong_kind(node: &StateNode, expected: &'static str) -> MotionError {
    MotionError::WrongStateKind {
        state: node.name.clone(),
        expected,
        found: node.kind.name(),
    }
}

/// Clip played without a search: the single-animation clip, else clip 0 of
/// the first group. Group edits can leave it out of range.
fn fallback_clip(node: &StateNode, db: &StateDatabase) -> Result<usize> {
    let clip = match &node.kind {
        StateKind::SingleAnimation(f) => f.clip,
        _ => 0,
    };
    let clips = db.group(0).map_or(0, |g| g.source.clips.len());
    if clip >= clips {
        return Err(MotionError::InvalidClip {
            clip: format!("#{clip}"),
            reason: format!("state '{}' has {clips} clips in its first group", node.name),
        });
    }
    Ok(clip)
}

fn signed_yaw(from: Vec3, to: Vec3) -> f32 {
    let a = Vec3::new(from.x, 0.0, from.z).normalize_or_zero();
    let b = Vec3::new(to.x, 0.0, to.z).normalize_or_zero();
    a.cross(b).y.atan2(a.dot(b))
}

impl Animator {
    pub fn new(graph: Arc<AnimationGraph>, jobs: JobSystem) -> Self {
        let params = graph.params().values();
        Self {
            graph,
            jobs,
            params,
            current: None,
            blend: BlendController::new(),
            in_flight: None,
            ready: None,
            input_trajectory: Vec::new(),
            contact_targets: Vec::new(),
            contact: None,
            root_position: Vec3::ZERO,
            root_rotation: Quat::IDENTITY,
            marker_cursor: None,
            outputs: Outputs::default(),
            scratch_pose: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Arc<AnimationGraph> {
        &self.graph
    }

    fn node(&self, id: StateId) -> Result<&StateNode> {
        self.graph.state(id).ok_or_else(|| MotionError::UnknownState {
            name: format!("#{}", id.0),
        })
    }

    fn active(&self) -> Result<&ActiveState> {
        self.current.as_ref().ok_or(MotionError::NotStarted)
    }

    /// Enter the graph's start state: its first clip from time zero, no search.
    pub fn start(&mut self, mixer: &mut dyn BlendMixer) -> Result<&Outputs> {
        self.outputs.clear();
        let id = self.graph.start_state();
        let db = self.graph.store().acquire(id)?;
        let node = self.node(id)?;
        let start_clip = match fallback_clip(node, &db) {
            Ok(clip) => clip,
            Err(err) => {
                self.graph.store().release(id)?;
                return Err(err);
            }
        };
        let name = node.name.clone();
        let responsivity = match &node.kind {
            StateKind::MotionMatching(f) => f.responsivity,
            _ => 1.0,
        };
        let (length, looping) = db
            .group(0)
            .and_then(|g| g.source.clips.get(start_clip))
            .map_or((0.0, false), |c| (c.length, c.looping));
        self.drain();
        self.blend.clear(mixer);
        if let Some(old) = self.current.take() {
            self.graph.store().release(old.id)?;
        }
        let generation = self.graph.store().generation(id);
        self.current = Some(ActiveState {
            id,
            db,
            generation,
            group: 0,
            active_section: 0,
            phase: StatePhase::Start,
            since_search: 0.0,
            responsivity,
        });
        self.blend.push(
            mixer,
            ClipRef {
                state: id,
                group: 0,
                clip: start_clip as u32,
                length,
                looping,
            },
            0.0,
            0.0,
            1.0,
        );
        debug!("animator started in state '{name}'");
        self.outputs.push_event(MotionEvent::StateEntered { state: name });
        self.sync_outputs();
        Ok(&self.outputs)
    }

    pub fn is_started(&self) -> bool {
        self.current.is_some()
    }

    /// Id of the playing state.
    pub fn current_state(&self) -> Option<StateId> {
        self.current.as_ref().map(|s| s.id)
    }

    pub fn current_state_name(&self) -> Option<&str> {
        let id = self.current_state()?;
        self.graph.state(id).map(|n| n.name.as_str())
    }

    pub fn state_phase(&self) -> Option<StatePhase> {
        self.current.as_ref().map(|s| s.phase)
    }

    pub fn search_phase(&self) -> SearchPhase {
        if self.ready.is_some() {
            SearchPhase::Ready
        } else if self.in_flight.is_some() {
            SearchPhase::Searching
        } else {
            SearchPhase::Idle
        }
    }

    pub fn blend(&self) -> &BlendController {
        &self.blend
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn root(&self) -> (Vec3, Quat) {
        (self.root_position, self.root_rotation)
    }

    /// Host-side root after root motion was applied.
    pub fn set_root(&mut self, position: Vec3, rotation: Quat) {
        self.root_position = position;
        self.root_rotation = rotation;
    }

    /// Goal trajectory in root space, ordered like the baked trajectories.
    pub fn set_input_trajectory(&mut self, trajectory: Vec<TrajectoryPoint>) -> Result<()> {
        if let Some(active) = &self.current {
            if let Some(group) = active.db.group(active.group) {
                let expected = group.frames.layout.trajectory_len;
                if trajectory.len() != expected {
                    return Err(MotionError::TrajectoryLength {
                        expected,
                        found: trajectory.len(),
                    });
                }
            }
        }
        self.input_trajectory = trajectory;
        Ok(())
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<()> {
        self.params.set(self.graph.params(), name, value.into())
    }

    pub fn parameter(&self, name: &str) -> Result<ParamValue> {
        let handle = self.graph.params().handle(name)?;
        self.params
            .get(handle)
            .ok_or_else(|| MotionError::UnknownParameter {
                name: name.to_string(),
            })
    }

    /// World-space contact targets for the next (or current) contact state.
    pub fn set_contact_targets(&mut self, targets: Vec<ContactSample>) {
        self.contact_targets = targets;
    }

    /// Search a different motion data group of the playing state from now on.
    ///
    /// Names resolve against the store, so groups added or removed since the
    /// graph was built are honoured.
    pub fn select_group(&mut self, name: &str) -> Result<()> {
        let id = self.active()?.id;
        if self.graph.store().group_index(id, name).is_none() {
            return Err(MotionError::UnknownGroup {
                state: self.node(id)?.name.clone(),
                name: name.to_string(),
            });
        }
        self.drain();
        self.refresh_database()?;
        let active = self.current.as_mut().ok_or(MotionError::NotStarted)?;
        active.group = active
            .db
            .group_index(name)
            .ok_or_else(|| MotionError::UnknownGroup {
                state: active.db.name.clone(),
                name: name.to_string(),
            })?;
        Ok(())
    }

    pub fn set_active_section(&mut self, name: &str) -> Result<()> {
        let section = self.graph.sections().index(name)?;
        if let Some(active) = self.current.as_mut() {
            active.active_section = section;
        }
        Ok(())
    }

    /// Non-blocking check of the in-flight batch; moves `Searching` to `Ready`.
    pub fn poll_search(&mut self) -> Result<SearchPhase> {
        if let Some(flight) = &self.in_flight {
            if let Some(result) = flight.pending.poll() {
                let generation = flight.pending.generation;
                let elapsed = flight.elapsed;
                self.in_flight = None;
                self.ready = Some((result?, generation, elapsed));
            }
        }
        Ok(self.search_phase())
    }

    /// Join and discard any in-flight batch.
    fn drain(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            if let Err(err) = flight.pending.join() {
                warn!("discarding search batch: {err}");
            }
        }
        self.ready = None;
    }

    /// Swap in a rebuilt database. Only called with no batch in flight.
    fn refresh_database(&mut self) -> Result<()> {
        let Some(active) = self.current.as_mut() else {
            return Ok(());
        };
        let generation = self.graph.store().generation(active.id);
        if generation == active.generation {
            return Ok(());
        }
        let db = self.graph.store().get(active.id)?;
        // Old group index -> index of the same-named group in the rebuilt database.
        let remap: Vec<Option<u32>> = active
            .db
            .groups
            .iter()
            .map(|g| db.group_index(&g.source.name).map(|i| i as u32))
            .collect();
        active.group = remap
            .get(active.group)
            .copied()
            .flatten()
            .map_or(0, |g| g as usize);
        active.db = db;
        active.generation = generation;
        self.blend.remap_groups(active.id, &remap);
        if let Some(run) = self.contact.as_mut() {
            match remap.get(run.group).copied().flatten() {
                Some(g) => run.group = g as usize,
                None => self.contact = None,
            }
        }
        debug!("picked up rebuilt database (generation {generation})");
        Ok(())
    }

    fn dominant(&self, mixer: &dyn BlendMixer) -> Option<(BlendInput, f32)> {
        let input = *self.blend.dominant()?;
        let time = mixer.time(input.handle)?;
        Some((input, time))
    }

    /// Clip of `input` when it belongs to the playing state.
    fn clip_of(&self, input: &BlendInput) -> Option<&Clip> {
        let active = self.current.as_ref()?;
        if input.clip.state != active.id || input.detached {
            return None;
        }
        active
            .db
            .group(input.clip.group as usize)?
            .source
            .clips
            .get(input.clip.clip as usize)
    }

    fn current_pose(&mut self, mixer: &dyn BlendMixer) -> Vec<BoneSample> {
        let mut pose = std::mem::take(&mut self.scratch_pose);
        pose.clear();
        if let Some((input, time)) = self.dominant(mixer) {
            if let Some(clip) = self.clip_of(&input) {
                sample_pose(clip, time, &mut pose);
            }
        }
        let out = pose.clone();
        self.scratch_pose = pose;
        out
    }

    fn local_contact_targets(&self) -> Vec<ContactSample> {
        let inv = self.root_rotation.inverse();
        self.contact_targets
            .iter()
            .map(|t| ContactSample::new(inv * (t.position - self.root_position), inv * t.normal))
            .collect()
    }

    fn build_request(&self, node: &StateNode, active: &ActiveState, pose: Vec<BoneSample>) -> SearchRequest {
        let mut query = Query::new(pose, self.input_trajectory.clone())
            .with_section(self.graph.sections(), active.active_section)
            .with_responsivity(active.responsivity);
        let kind = match &node.kind {
            StateKind::MotionMatching(_) => SearchKind::Basic,
            StateKind::SingleAnimation(f) => SearchKind::SingleAnimation {
                windows: active
                    .db
                    .group(active.group)
                    .map(|g| f.windows_in(&g.source))
                    .unwrap_or_default(),
            },
            StateKind::Contact(f) => {
                query = query.with_contacts(self.local_contact_targets());
                SearchKind::ContactEnter { pattern: f.pattern }
            }
            StateKind::Impact(_) => {
                query = query.with_contacts(self.local_contact_targets());
                SearchKind::Impact
            }
        };
        SearchRequest {
            query,
            kind,
            cost: node.cost,
            exclude_clip: None,
        }
    }

    /// Clip index that may not win because it is playing and opts out of
    /// finding itself.
    fn excluded_clip(&self, mixer: &dyn BlendMixer) -> Option<u32> {
        let active = self.current.as_ref()?;
        let (input, _) = self.dominant(mixer)?;
        if input.clip.state != active.id || input.clip.group as usize != active.group {
            return None;
        }
        let clip = self.clip_of(&input)?;
        (!clip.find_in_yourself).then_some(input.clip.clip)
    }

    /// Start playing `winner` (already filtered) in the current state.
    fn accept(&mut self, winner: Winner, blend_time: f32, mixer: &mut dyn BlendMixer) {
        let Some(active) = self.current.as_ref() else {
            return;
        };
        let Some(clip_index) = winner.clip() else {
            return;
        };
        let Some(group) = active.db.group(winner.group_index as usize) else {
            return;
        };
        let Some(clip) = group.source.clips.get(clip_index) else {
            return;
        };
        let clip_ref = ClipRef {
            state: active.id,
            group: winner.group_index,
            clip: clip_index as u32,
            length: clip.length,
            looping: clip.looping,
        };
        let event = MotionEvent::PoseSelected {
            state: active.db.name.clone(),
            group: winner.group_index,
            clip: clip.name.clone(),
            local_time: winner.local_time,
            cost: winner.cost,
        };
        debug!(
            "selected '{}' at {:.3}s (cost {:.4})",
            clip.name, winner.local_time, winner.cost
        );
        let start_weight = self.graph.config().min_start_weight;
        self.blend
            .push(mixer, clip_ref, winner.local_time, blend_time, start_weight);
        self.outputs.push_event(event);
    }

    /// Apply a joined periodic result: guard, then blend.
    fn consume(
        &mut self,
        winner: Winner,
        generation: u64,
        elapsed: f32,
        mixer: &mut dyn BlendMixer,
    ) -> Result<()> {
        let Some(active) = self.current.as_ref() else {
            return Ok(());
        };
        if generation != active.generation || winner.is_none() {
            return Ok(());
        }
        let StateKind::MotionMatching(features) = self.node(active.id)?.kind.clone() else {
            return Ok(());
        };
        let Some(group) = active.db.group(winner.group_index as usize) else {
            return Ok(());
        };
        let Some(clip) = winner.clip().and_then(|c| group.source.clips.get(c)) else {
            return Ok(());
        };
        // The batch saw the pose `elapsed` seconds ago.
        let advanced = Winner {
            local_time: extrapolate(winner.local_time, elapsed, clip.length, clip.looping),
            ..winner
        };
        if let Some((input, time)) = self.dominant(mixer) {
            if input.clip.state == active.id && !input.detached {
                let playback = Playback {
                    group_index: input.clip.group,
                    clip_index: input.clip.clip,
                    local_time: time,
                };
                let guard = ContinuityGuard::new(features.max_clip_delta_time);
                if guard.vetoes(&advanced, &playback, clip, 0.0) {
                    let event = MotionEvent::SearchVetoed {
                        clip: clip.name.clone(),
                        local_time: advanced.local_time,
                    };
                    self.outputs.push_event(event);
                    return Ok(());
                }
            }
        }
        self.accept(advanced, features.blend_time, mixer);
        Ok(())
    }

    /// Per-frame driver: ramps weights, consumes last frame's search, issues
    /// the next one when due and emits markers.
    pub fn update(&mut self, dt: f32, mixer: &mut dyn BlendMixer) -> Result<&Outputs> {
        let dt = dt.max(0.0);
        self.outputs.clear();
        let id = self.active()?.id;

        self.blend.ramp(dt, mixer);

        if let Some(flight) = self.in_flight.as_mut() {
            flight.elapsed += dt;
        }
        let joined = match (self.ready.take(), self.in_flight.take()) {
            (Some(ready), _) => Some(ready),
            (None, Some(flight)) => {
                let generation = flight.pending.generation;
                let elapsed = flight.elapsed;
                Some((flight.pending.join()?, generation, elapsed))
            }
            (None, None) => None,
        };
        if let Some((winner, generation, elapsed)) = joined {
            debug!("consuming search result (clip {})", winner.clip_index);
            self.consume(winner, generation, elapsed, mixer)?;
        }
        self.refresh_database()?;

        let graph = Arc::clone(&self.graph);
        let node = graph.state(id).ok_or(MotionError::NotStarted)?;
        if let Some(active) = self.current.as_mut() {
            active.since_search += dt;
        }
        if let StateKind::MotionMatching(features) = &node.kind {
            let due = self
                .current
                .as_ref()
                .is_some_and(|a| a.phase == StatePhase::Update && a.since_search >= features.update_interval);
            let blocked = self
                .dominant(mixer)
                .and_then(|(input, time)| self.clip_of(&input).map(|c| c.search_blocked_at(time)))
                .unwrap_or(false);
            if due
                && !blocked
                && self.blend.input_count() < features.max_blended_clip_count
            {
                self.issue(node, mixer)?;
            }
        }

        self.emit_markers(mixer);

        if let Some(active) = self.current.as_mut() {
            if matches!(active.phase, StatePhase::Start | StatePhase::Enter) {
                active.phase = StatePhase::Update;
            }
        }
        self.sync_outputs();
        Ok(&self.outputs)
    }

    fn issue(&mut self, node: &StateNode, mixer: &mut dyn BlendMixer) -> Result<()> {
        let pose = self.current_pose(mixer);
        let exclude = self.excluded_clip(mixer);
        let active = self.active()?;
        let mut request = self.build_request(node, active, pose);
        request.exclude_clip = exclude;
        let pending = self.jobs.spawn(
            Arc::clone(&active.db),
            active.group,
            active.generation,
            request,
        );
        self.in_flight = Some(InFlight {
            pending,
            elapsed: 0.0,
        });
        if let Some(active) = self.current.as_mut() {
            active.since_search = 0.0;
        }
        Ok(())
    }

    fn emit_markers(&mut self, mixer: &dyn BlendMixer) {
        let Some((input, now)) = self.dominant(mixer) else {
            self.marker_cursor = None;
            return;
        };
        let previous = match self.marker_cursor {
            Some((handle, t)) if handle == input.handle => Some(t),
            _ => None,
        };
        self.marker_cursor = Some((input.handle, now));
        let Some(from) = previous else {
            return;
        };
        let Some(clip) = self.clip_of(&input) else {
            return;
        };
        let events: Vec<MotionEvent> = clip
            .events
            .iter()
            .filter(|m| crossed(from, now, m.time, clip.looping))
            .map(|m| MotionEvent::Marker {
                clip: clip.name.clone(),
                name: m.name.clone(),
                time: m.time,
            })
            .collect();
        self.outputs.events.extend(events);
    }

    /// Late driver: contact correction and transition evaluation.
    pub fn late_update(&mut self, dt: f32, mixer: &mut dyn BlendMixer) -> Result<&Outputs> {
        let dt = dt.max(0.0);
        let id = self.active()?.id;
        self.correct_contact(dt, mixer);

        let phase = self.active()?.phase;
        // A state still entering does not evaluate its own transitions.
        if phase == StatePhase::Update {
            let graph = Arc::clone(&self.graph);
            let node = graph.state(id).ok_or(MotionError::NotStarted)?;
            let fired = self
                .transition_context(mixer)
                .and_then(|ctx| evaluate(&node.transitions, &ctx, &self.params));
            if let Some((ti, oi)) = fired {
                let transition = &node.transitions[ti];
                let option = transition.options[oi].clone();
                let to = transition.to;
                let from_name = node.name.clone();
                let to_name = graph.state(to).map(|n| n.name.clone()).unwrap_or_default();
                debug!("transition '{from_name}' -> '{to_name}' (option {oi})");
                self.outputs.push_event(MotionEvent::TransitionFired {
                    from: from_name,
                    to: to_name,
                    option: oi,
                });
                self.enter_state(
                    to,
                    option.blend_time,
                    option.start_section,
                    Some(option.responsivity),
                    mixer,
                )?;
            }
        }
        self.sync_outputs();
        Ok(&self.outputs)
    }

    fn transition_context(&self, mixer: &dyn BlendMixer) -> Option<TransitionContext<'_>> {
        let active = self.current.as_ref()?;
        let (input, time) = self.dominant(mixer)?;
        if input.clip.state != active.id {
            return None;
        }
        let blend_time = self.graph.state(active.id)?.kind.blend_time();
        let exit_time_reached = !input.clip.looping && time >= input.clip.length - blend_time;
        // A detached input has no clip to match windows against.
        let clip = self.clip_of(&input).map_or("", |c| c.name.as_str());
        Some(TransitionContext {
            clip,
            local_time: time,
            exit_time_reached,
        })
    }

    /// Switch to `name` with an entry search. Returns `false`, leaving playback
    /// alone, while the playing state was entered this frame and has not been
    /// updated yet.
    pub fn switch_to_state(
        &mut self,
        name: &str,
        blend_time: f32,
        start_section: Option<&str>,
        mixer: &mut dyn BlendMixer,
    ) -> Result<bool> {
        let id = self.graph.state_id(name)?;
        let section = start_section
            .map(|s| self.graph.sections().index(s))
            .transpose()?;
        if self.active()?.phase == StatePhase::Enter {
            debug!("switch to '{name}' ignored while entering");
            return Ok(false);
        }
        self.enter_state(id, blend_time, section, None, mixer)?;
        Ok(true)
    }

    /// Switch to a contact or impact state aiming at `targets` (world space).
    pub fn switch_to_contact_state(
        &mut self,
        name: &str,
        targets: Vec<ContactSample>,
        blend_time: f32,
        mixer: &mut dyn BlendMixer,
    ) -> Result<bool> {
        let id = self.graph.state_id(name)?;
        let node = self.node(id)?;
        if !matches!(node.kind, StateKind::Contact(_) | StateKind::Impact(_)) {
            return Err(wrong_kind(node, "contact"));
        }
        self.set_contact_targets(targets);
        self.switch_to_state(name, blend_time, None, mixer)
    }

    /// Run a blocking search now; motion-matching states only.
    pub fn force_search(&mut self, mixer: &mut dyn BlendMixer) -> Result<Winner> {
        let id = self.active()?.id;
        let graph = Arc::clone(&self.graph);
        let node = graph.state(id).ok_or(MotionError::NotStarted)?;
        if !matches!(node.kind, StateKind::MotionMatching(_)) {
            return Err(wrong_kind(node, "motion matching"));
        }
        self.drain();
        self.refresh_database()?;
        let pose = self.current_pose(mixer);
        let exclude = self.excluded_clip(mixer);
        let active = self.active()?;
        let mut request = self.build_request(node, active, pose);
        request.exclude_clip = exclude;
        let generation = active.generation;
        let winner = match active.db.group(active.group) {
            Some(g) => self.jobs.run(&g.frames, &request),
            None => Winner::NONE,
        };
        let vetoed = !winner.is_none() && {
            let before = self.outputs.events.len();
            self.consume(winner, generation, 0.0, mixer)?;
            self.outputs.events[before..]
                .iter()
                .any(|e| matches!(e, MotionEvent::SearchVetoed { .. }))
        };
        if let Some(active) = self.current.as_mut() {
            active.since_search = 0.0;
        }
        debug!("forced search in '{}' -> clip {}", node.name, winner.clip_index);
        Ok(if vetoed { Winner::NONE } else { winner })
    }

    fn enter_state(
        &mut self,
        id: StateId,
        blend_time: f32,
        section: Option<u32>,
        responsivity: Option<f32>,
        mixer: &mut dyn BlendMixer,
    ) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let node = graph.state(id).ok_or_else(|| MotionError::UnknownState {
            name: format!("#{}", id.0),
        })?;
        if let Some(required) = node.kind.contact_requirement() {
            if self.contact_targets.len() < required {
                return Err(MotionError::MissingContactTargets {
                    state: node.name.clone(),
                    required,
                    found: self.contact_targets.len(),
                });
            }
        }
        let db = self.graph.store().acquire(id)?;
        let fallback = match fallback_clip(node, &db) {
            Ok(clip) => clip,
            Err(err) => {
                self.graph.store().release(id)?;
                return Err(err);
            }
        };
        self.drain();

        // Pose of the outgoing clip, sampled before its database is released.
        let pose = self.current_pose(mixer);
        if let Some(old) = self.current.take() {
            let old_name = old.db.name.clone();
            if let Err(err) = self.graph.store().release(old.id) {
                // Keep the new reference balanced before bailing out.
                let _ = self.graph.store().release(id);
                return Err(err);
            }
            self.outputs
                .push_event(MotionEvent::StateExited { state: old_name });
        }
        self.contact = None;

        let default_responsivity = match &node.kind {
            StateKind::MotionMatching(f) => f.responsivity,
            _ => 1.0,
        };
        let active = ActiveState {
            id,
            generation: self.graph.store().generation(id),
            db,
            group: 0,
            active_section: section.unwrap_or(0),
            phase: StatePhase::Enter,
            since_search: 0.0,
            responsivity: responsivity.unwrap_or(default_responsivity),
        };
        let request = self.build_request(node, &active, pose);
        debug!("entering state '{}'", node.name);

        let search = !matches!(&node.kind, StateKind::SingleAnimation(f) if !f.find_pose);
        let mut winner = if search {
            match active.db.group(active.group) {
                Some(g) => self.jobs.run(&g.frames, &request),
                None => Winner::NONE,
            }
        } else {
            Winner::NONE
        };
        if winner.is_none() {
            if matches!(node.kind, StateKind::Contact(_) | StateKind::Impact(_)) {
                warn!("contact search in '{}' found no candidate", node.name);
            }
            winner = Winner {
                group_index: active.group as u32,
                clip_index: fallback as i32,
                local_time: 0.0,
                cost: f32::INFINITY,
            };
        }
        self.current = Some(active);
        self.outputs.push_event(MotionEvent::StateEntered {
            state: node.name.clone(),
        });
        self.accept(winner, blend_time, mixer);
        self.begin_contact(node, &winner, mixer);
        Ok(())
    }

    fn begin_contact(&mut self, node: &StateNode, winner: &Winner, mixer: &dyn BlendMixer) {
        let (pattern, movement, rotate) = match &node.kind {
            StateKind::Contact(f) => (Some(f.pattern), f.movement, f.rotate_to_start),
            StateKind::Impact(f) => (None, f.movement, f.rotate_to_start),
            _ => return,
        };
        let Some(input) = self.blend.newest().copied() else {
            return;
        };
        let Some(clip) = self.clip_of(&input) else {
            return;
        };
        let count = clip.contacts.len();
        let targets = match pattern {
            Some(_) => self.contact_targets.len(),
            None => 1,
        };
        let clip_contacts: Vec<usize> = (0..targets)
            .map_while(|i| match pattern {
                Some(p) => ContactPattern::frame_index(p, i, targets, count),
                None => (count > 0).then_some(0),
            })
            .collect();
        let entry_time = mixer.time(input.handle).unwrap_or(winner.local_time);
        let (mut angular_speed, mut remaining_angle) = (0.0, 0.0);
        if rotate {
            let facing = self.root_rotation * Vec3::Z;
            let desired = self.contact_targets.first().map(|t| -t.normal);
            let first_start = clip_contacts
                .first()
                .and_then(|&k| clip.contacts.get(k))
                .map(|c| c.start_time);
            if let (Some(desired), Some(start)) = (desired, first_start) {
                remaining_angle = signed_yaw(facing, desired);
                let time = start - entry_time;
                angular_speed = if time > 1e-4 {
                    remaining_angle / time
                } else {
                    f32::INFINITY * remaining_angle.signum()
                };
            }
        }
        self.contact = Some(ContactRun {
            handle: input.handle,
            group: input.clip.group as usize,
            clip: input.clip.clip as usize,
            clip_contacts,
            next: 0,
            movement,
            lerp: None,
            angular_speed,
            remaining_angle,
        });
    }

    fn correct_contact(&mut self, dt: f32, mixer: &dyn BlendMixer) {
        let Some(mut run) = self.contact.take() else {
            return;
        };
        let Some(t) = mixer.time(run.handle) else {
            return;
        };
        let Some(active) = self.current.as_ref() else {
            return;
        };
        let db = Arc::clone(&active.db);
        let Some(clip) = db.group(run.group).and_then(|g| g.source.clips.get(run.clip)) else {
            return;
        };

        if run.remaining_angle != 0.0 {
            let step = if run.angular_speed.is_finite() {
                let s = run.angular_speed * dt;
                if s.abs() >= run.remaining_angle.abs() {
                    run.remaining_angle
                } else {
                    s
                }
            } else {
                run.remaining_angle
            };
            self.root_rotation = (Quat::from_rotation_y(step) * self.root_rotation).normalize();
            run.remaining_angle -= step;
        }

        while let Some(&k) = run.clip_contacts.get(run.next) {
            let Some(recorded) = clip.contacts.get(k) else {
                break;
            };
            let target_index = if self.contact_targets.len() > run.next {
                run.next
            } else {
                0
            };
            let Some(target) = self.contact_targets.get(target_index).copied() else {
                break;
            };
            if t >= recorded.start_time {
                self.outputs.push_event(MotionEvent::ContactReached {
                    state: db.name.clone(),
                    index: run.next,
                });
                run.next += 1;
                run.lerp = None;
                continue;
            }
            let Some(local) = sample_contact(clip, t, k) else {
                break;
            };
            let world = self.root_position + self.root_rotation * local.position;
            let gap = target.position - world;
            match run.movement {
                ContactMovement::MovePosition => {
                    let remaining = recorded.start_time - t;
                    let step = if remaining <= dt {
                        gap
                    } else {
                        gap * (dt / remaining)
                    };
                    self.root_position += step;
                }
                ContactMovement::LerpPosition => {
                    let lerp = run.lerp.get_or_insert(LerpState {
                        gap,
                        applied: Vec3::ZERO,
                        start_time: t,
                    });
                    let span = recorded.start_time - lerp.start_time;
                    let alpha = if span > 1e-6 {
                        ((t - lerp.start_time) / span).clamp(0.0, 1.0)
                    } else {
                        1.0
                    };
                    let desired = lerp.gap * alpha;
                    self.root_position += desired - lerp.applied;
                    lerp.applied = desired;
                }
            }
            break;
        }
        self.contact = Some(run);
    }

    /// Stop, release the database and remove every mixer input.
    pub fn dispose(&mut self, mixer: &mut dyn BlendMixer) -> Result<()> {
        self.drain();
        self.blend.clear(mixer);
        self.contact = None;
        self.marker_cursor = None;
        if let Some(active) = self.current.take() {
            self.graph.store().release(active.id)?;
            debug!("animator disposed");
        }
        Ok(())
    }

    fn sync_outputs(&mut self) {
        self.outputs.search_phase = self.search_phase();
        self.outputs.root_position = self.root_position;
        self.outputs.root_rotation = self.root_rotation;
    }
}

impl Drop for Animator {
    fn drop(&mut self) {
        self.drain();
        if let Some(active) = self.current.take() {
            if let Err(err) = self.graph.store().release(active.id) {
                warn!("release on drop failed: {err}");
            }
        }
    }
}
