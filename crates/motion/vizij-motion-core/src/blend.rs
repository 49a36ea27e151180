//! Weight ramps over the host's blend mixer.
//!
//! Every accepted winner becomes a new mixer input that ramps from a near-zero
//! weight toward 1 while older inputs ramp toward 0 at `1 / blend_time` per
//! second. An input whose weight reaches 0 is removed from the mixer, not just
//! silenced.

use log::trace;

use crate::ids::{IdAllocator, InputHandle, StateId};
use crate::time::extrapolate;

/// Blend times at or below this are applied instantly.
pub const INSTANT_BLEND: f32 = 1e-4;

/// Identifies the clip a mixer input plays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipRef {
    pub state: StateId,
    pub group: u32,
    pub clip: u32,
    pub length: f32,
    pub looping: bool,
}

/// Contract of the host's weighted clip player.
pub trait BlendMixer {
    /// Start playing `clip` from `local_time` at `start_weight`.
    fn create_input(
        &mut self,
        clip: &ClipRef,
        local_time: f32,
        blend_time: f32,
        start_weight: f32,
    ) -> InputHandle;
    fn set_weight(&mut self, input: InputHandle, weight: f32);
    /// Playback time of `input`; `None` once it is gone.
    fn time(&self, input: InputHandle) -> Option<f32>;
    fn remove_input(&mut self, input: InputHandle);
}

/// One ramping input owned by a [`BlendController`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendInput {
    pub handle: InputHandle,
    pub clip: ClipRef,
    pub weight: f32,
    pub target: f32,
    /// Weight change per second.
    pub rate: f32,
    /// Its group was removed from the store; the input only fades out.
    pub detached: bool,
}

#[derive(Clone, Debug, Default)]
pub struct BlendController {
    inputs: Vec<BlendInput>,
}

impl BlendController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `clip` as the new target input and fade every other input out.
    pub fn push(
        &mut self,
        mixer: &mut dyn BlendMixer,
        clip: ClipRef,
        local_time: f32,
        blend_time: f32,
        start_weight: f32,
    ) -> InputHandle {
        let instant = blend_time <= INSTANT_BLEND;
        if instant {
            self.clear(mixer);
        } else {
            let rate = 1.0 / blend_time;
            for input in &mut self.inputs {
                input.target = 0.0;
                input.rate = rate;
            }
        }
        let weight = if instant {
            1.0
        } else {
            start_weight.clamp(0.0, 1.0)
        };
        let handle = mixer.create_input(&clip, local_time, blend_time, weight);
        self.inputs.push(BlendInput {
            handle,
            clip,
            weight,
            target: 1.0,
            rate: if instant { f32::INFINITY } else { 1.0 / blend_time },
            detached: false,
        });
        handle
    }

    /// Move every weight toward its target; returns the handles removed.
    pub fn ramp(&mut self, dt: f32, mixer: &mut dyn BlendMixer) -> Vec<InputHandle> {
        let mut removed = Vec::new();
        for input in &mut self.inputs {
            let step = input.rate * dt.max(0.0);
            input.weight = if input.weight < input.target {
                (input.weight + step).min(input.target)
            } else {
                (input.weight - step).max(input.target)
            };
            trace!(
                "input {:?} weight {:.4} -> target {}",
                input.handle,
                input.weight,
                input.target
            );
            if input.target <= 0.0 && input.weight <= 0.0 {
                removed.push(input.handle);
            } else {
                mixer.set_weight(input.handle, input.weight);
            }
        }
        if !removed.is_empty() {
            self.inputs.retain(|i| !removed.contains(&i.handle));
            for handle in &removed {
                mixer.remove_input(*handle);
            }
        }
        removed
    }

    /// Re-point inputs of `state` at rebuilt group indices. `remap[old]` is the
    /// new index, or `None` when the group is gone.
    pub fn remap_groups(&mut self, state: StateId, remap: &[Option<u32>]) {
        for input in self.inputs.iter_mut().filter(|i| i.clip.state == state && !i.detached) {
            match remap.get(input.clip.group as usize).copied().flatten() {
                Some(group) => input.clip.group = group,
                None => input.detached = true,
            }
        }
    }

    /// Input with the highest weight; the newest wins ties.
    pub fn dominant(&self) -> Option<&BlendInput> {
        self.inputs
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }

    /// Newest input, the one everything else fades toward.
    pub fn newest(&self) -> Option<&BlendInput> {
        self.inputs.last()
    }

    pub fn inputs(&self) -> &[BlendInput] {
        &self.inputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Drop every input from the mixer.
    pub fn clear(&mut self, mixer: &mut dyn BlendMixer) {
        for input in self.inputs.drain(..) {
            mixer.remove_input(input.handle);
        }
    }
}

/// One input of a [`SimpleMixer`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixerInput {
    pub handle: InputHandle,
    pub clip: ClipRef,
    pub time: f32,
    pub weight: f32,
}

/// In-memory mixer: advances input times and records weights.
#[derive(Debug, Default)]
pub struct SimpleMixer {
    ids: IdAllocator,
    inputs: Vec<MixerInput>,
    removed: usize,
}

impl SimpleMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every input by `dt`; looping clips wrap, others clamp at the end.
    pub fn advance(&mut self, dt: f32) {
        for input in &mut self.inputs {
            input.time = extrapolate(input.time, dt, input.clip.length, input.clip.looping);
        }
    }

    pub fn input(&self, handle: InputHandle) -> Option<&MixerInput> {
        self.inputs.iter().find(|i| i.handle == handle)
    }

    pub fn inputs(&self) -> &[MixerInput] {
        &self.inputs
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Total inputs removed since creation.
    pub fn removed_count(&self) -> usize {
        self.removed
    }

    /// Sum of live weights.
    pub fn total_weight(&self) -> f32 {
        self.inputs.iter().map(|i| i.weight).sum()
    }
}

impl BlendMixer for SimpleMixer {
    fn create_input(
        &mut self,
        clip: &ClipRef,
        local_time: f32,
        _blend_time: f32,
        start_weight: f32,
    ) -> InputHandle {
        let handle = self.ids.alloc_input();
        self.inputs.push(MixerInput {
            handle,
            clip: *clip,
            time: local_time,
            weight: start_weight,
        });
        handle
    }

    fn set_weight(&mut self, input: InputHandle, weight: f32) {
        if let Some(i) = self.inputs.iter_mut().find(|i| i.handle == input) {
            i.weight = weight;
        }
    }

    fn time(&self, input: InputHandle) -> Option<f32> {
        self.input(input).map(|i| i.time)
    }

    fn remove_input(&mut self, input: InputHandle) {
        let before = self.inputs.len();
        self.inputs.retain(|i| i.handle != input);
        self.removed += before - self.inputs.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(i: u32) -> ClipRef {
        ClipRef {
            state: StateId(0),
            group: 0,
            clip: i,
            length: 1.0,
            looping: true,
        }
    }

    #[test]
    fn new_input_ramps_in_old_ramps_out() {
        let mut mixer = SimpleMixer::new();
        let mut ctl = BlendController::new();
        let a = ctl.push(&mut mixer, clip(0), 0.0, 0.0, 0.001);
        let b = ctl.push(&mut mixer, clip(1), 0.0, 0.5, 0.001);
        ctl.ramp(0.25, &mut mixer);
        let wa = mixer.input(a).map(|i| i.weight).unwrap();
        let wb = mixer.input(b).map(|i| i.weight).unwrap();
        assert!((wa - 0.5).abs() < 1e-5);
        assert!((wb - 0.501).abs() < 1e-5);
    }

    #[test]
    fn faded_inputs_are_removed() {
        let mut mixer = SimpleMixer::new();
        let mut ctl = BlendController::new();
        let a = ctl.push(&mut mixer, clip(0), 0.0, 0.0, 0.001);
        ctl.push(&mut mixer, clip(1), 0.0, 0.2, 0.001);
        let removed = ctl.ramp(0.3, &mut mixer);
        assert_eq!(removed, vec![a]);
        assert!(mixer.input(a).is_none());
        assert_eq!(ctl.input_count(), 1);
        assert_eq!(mixer.removed_count(), 1);
    }

    #[test]
    fn instant_blend_replaces_everything() {
        let mut mixer = SimpleMixer::new();
        let mut ctl = BlendController::new();
        ctl.push(&mut mixer, clip(0), 0.0, 0.3, 0.001);
        ctl.push(&mut mixer, clip(1), 0.0, 0.3, 0.001);
        let c = ctl.push(&mut mixer, clip(2), 0.4, 0.0, 0.001);
        assert_eq!(mixer.len(), 1);
        assert_eq!(ctl.dominant().map(|i| i.handle), Some(c));
        assert_eq!(mixer.time(c), Some(0.4));
    }

    #[test]
    fn remap_moves_live_inputs_and_detaches_removed_ones() {
        let mut mixer = SimpleMixer::new();
        let mut ctl = BlendController::new();
        ctl.push(&mut mixer, clip(0), 0.0, 0.0, 0.001);
        let moved = ClipRef { group: 1, ..clip(0) };
        ctl.push(&mut mixer, moved, 0.0, 0.2, 0.001);
        ctl.remap_groups(StateId(0), &[None, Some(0)]);
        let inputs = ctl.inputs();
        assert!(inputs[0].detached);
        assert!(!inputs[1].detached);
        assert_eq!(inputs[1].clip.group, 0);
        // Other states are left alone.
        ctl.remap_groups(StateId(3), &[None, None]);
        assert!(!ctl.inputs()[1].detached);
    }

    #[test]
    fn mixer_wraps_looping_time() {
        let mut mixer = SimpleMixer::new();
        let h = mixer.create_input(&clip(0), 0.9, 0.0, 1.0);
        mixer.advance(0.2);
        assert!((mixer.time(h).unwrap() - 0.1).abs() < 1e-5);
    }
}
