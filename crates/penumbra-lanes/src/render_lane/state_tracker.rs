// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime record of the access state of every frame resource.

use super::FrameResource;
use super::FrameResources;
use ahash::AHashMap;
use penumbra_core::renderer::{CommandEncoder, RenderError, ResourceState};

/// One recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The resource.
    pub resource: FrameResource,
    /// The state it leaves.
    pub from: ResourceState,
    /// The state it enters.
    pub to: ResourceState,
}

impl Transition {
    /// Creates a transition.
    pub const fn new(resource: FrameResource, from: ResourceState, to: ResourceState) -> Self {
        Self { resource, from, to }
    }
}

/// Tracks the current state of every live frame resource and records transitions on
/// an encoder after checking them.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    states: AHashMap<FrameResource, ResourceState>,
    transitions: u64,
}

impl ResourceStateTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `resource` at its home state.
    pub fn register(&mut self, resource: FrameResource) {
        self.states.insert(resource, resource.home_state());
    }

    /// Stops tracking `resource`.
    pub fn unregister(&mut self, resource: FrameResource) {
        self.states.remove(&resource);
    }

    /// Puts `resource` back at its home state, used after it was recreated.
    pub fn reset_to_home(&mut self, resource: FrameResource) {
        self.register(resource);
    }

    /// Registers every resource of `resources` not tracked yet and forgets the ones
    /// that no longer exist.
    pub fn sync(&mut self, resources: &FrameResources) {
        let live = resources.live();
        self.states.retain(|resource, _| live.contains(resource));
        for resource in live {
            self.states
                .entry(resource)
                .or_insert_with(|| resource.home_state());
        }
    }

    /// The current state of `resource`.
    pub fn state(&self, resource: FrameResource) -> Option<ResourceState> {
        self.states.get(&resource).copied()
    }

    /// Returns `true` if `resource` is tracked.
    pub fn is_tracked(&self, resource: FrameResource) -> bool {
        self.states.contains_key(&resource)
    }

    /// Transitions recorded since creation.
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    fn apply(&mut self, transition: Transition) -> Result<(), RenderError> {
        let Transition { resource, from, to } = transition;
        let current = self.state(resource).ok_or_else(|| {
            RenderError::InternalInvariantViolation(format!("{resource:?} is not tracked"))
        })?;
        if current != from {
            return Err(RenderError::InternalInvariantViolation(format!(
                "{resource:?} is {current}, not {from}"
            )));
        }
        if from == to {
            return Err(RenderError::InternalInvariantViolation(format!(
                "redundant transition of {resource:?} to {to}"
            )));
        }
        self.states.insert(resource, to);
        self.transitions += 1;
        Ok(())
    }

    /// Checks `transition` against the tracked state, records it on `encoder` and
    /// updates the tracked state.
    ///
    /// # Returns
    ///
    /// [`RenderError::InternalInvariantViolation`] if the resource is not in the
    /// transition's source state, or if the transition does not change the state.
    pub fn transition(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        resources: &FrameResources,
        transition: Transition,
    ) -> Result<(), RenderError> {
        let Transition { resource, from, to } = transition;
        if resource.is_texture() {
            let texture = resources.texture(resource)?;
            self.apply(transition)?;
            encoder.transition_texture(texture, from, to);
        } else {
            let buffer = resources.buffer(resource)?;
            self.apply(transition)?;
            encoder.transition_buffer(buffer, from, to);
        }
        Ok(())
    }

    /// Shorthand for [`ResourceStateTracker::transition`].
    pub fn transition_to(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        resources: &FrameResources,
        resource: FrameResource,
        from: ResourceState,
        to: ResourceState,
    ) -> Result<(), RenderError> {
        self.transition(encoder, resources, Transition::new(resource, from, to))
    }

    /// Fails unless `resource` is currently in `state`.
    pub fn expect(&self, resource: FrameResource, state: ResourceState) -> Result<(), RenderError> {
        match self.state(resource) {
            Some(current) if current == state => Ok(()),
            Some(current) => Err(RenderError::InternalInvariantViolation(format!(
                "{resource:?} is {current}, expected {state}"
            ))),
            None => Err(RenderError::InternalInvariantViolation(format!(
                "{resource:?} is not tracked"
            ))),
        }
    }

    /// Fails unless every tracked resource is at its home state.
    pub fn verify_home(&self) -> Result<(), RenderError> {
        let mut away: Vec<_> = self
            .states
            .iter()
            .filter(|(resource, state)| resource.home_state() != **state)
            .map(|(resource, state)| format!("{resource:?} is {state}"))
            .collect();
        if away.is_empty() {
            return Ok(());
        }
        away.sort();
        Err(RenderError::InternalInvariantViolation(format!(
            "resources away from home at frame start: {}",
            away.join(", ")
        )))
    }
}
