//! Identifiers and simple allocators for core entities.

use serde::{Deserialize, Serialize};

/// Index of a state inside an [`crate::AnimationGraph`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub u32);

/// Typed slot of a parameter, resolved once at graph build time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ParamHandle(pub u32);

/// Handle of a weighted clip input living in a [`crate::BlendMixer`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct InputHandle(pub u32);

impl StateId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ParamHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Monotonic allocator for mixer input handles.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_input: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_input(&mut self) -> InputHandle {
        let id = InputHandle(self.next_input);
        self.next_input = self.next_input.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
