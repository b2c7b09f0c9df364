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

//! Declared resource accesses and the barrier schedule derived from them.
//!
//! Every pass declares the state each resource must be in when it starts and the
//! state it leaves it in. [`FrameSchedule::assemble`] simulates the frame from the
//! home states and inserts a barrier wherever the simulated state and the next
//! entry state differ, then closes every resource back to its home state.

use super::{FrameResource, Transition};
use penumbra_core::renderer::{RenderError, ResourceState};
use std::collections::BTreeMap;
use thiserror::Error;

/// One resource used by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAccess {
    /// The resource.
    pub resource: FrameResource,
    /// Required state when the pass starts.
    pub entry: ResourceState,
    /// State the pass leaves it in.
    pub exit: ResourceState,
}

/// The resource accesses of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassDeclaration {
    /// Accesses in declaration order.
    pub accesses: Vec<ResourceAccess>,
}

impl PassDeclaration {
    /// An empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an access that changes the state of `resource`.
    pub fn access(
        mut self,
        resource: FrameResource,
        entry: ResourceState,
        exit: ResourceState,
    ) -> Self {
        self.accesses.push(ResourceAccess {
            resource,
            entry,
            exit,
        });
        self
    }

    /// Adds an access that leaves `resource` in the state it entered with.
    pub fn uses(self, resource: FrameResource, state: ResourceState) -> Self {
        self.access(resource, state, state)
    }

    /// Adds the same access for several resources.
    pub fn uses_all(
        mut self,
        resources: impl IntoIterator<Item = FrameResource>,
        state: ResourceState,
    ) -> Self {
        for resource in resources {
            self = self.uses(resource, state);
        }
        self
    }

    /// The declared access to `resource`, if any.
    pub fn get(&self, resource: FrameResource) -> Option<&ResourceAccess> {
        self.accesses.iter().find(|a| a.resource == resource)
    }
}

/// A schedule error found while assembling or validating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum ScheduleError {
    /// A pass starts while one of its resources is in another state.
    #[error("pass '{pass}' needs {resource:?} in {expected}, but it is {found}")]
    EntryNotMet {
        pass: String,
        resource: FrameResource,
        expected: ResourceState,
        found: ResourceState,
    },
    /// A barrier does not change the state.
    #[error("redundant barrier keeps {resource:?} in {state}")]
    RedundantTransition {
        resource: FrameResource,
        state: ResourceState,
    },
    /// A barrier's source state is not the current state.
    #[error("barrier moves {resource:?} from {expected}, but it is {found}")]
    WrongSourceState {
        resource: FrameResource,
        expected: ResourceState,
        found: ResourceState,
    },
    /// A resource ends the frame away from its home state.
    #[error("{resource:?} ends the frame in {found} instead of {home}")]
    NotClosed {
        resource: FrameResource,
        found: ResourceState,
        home: ResourceState,
    },
    /// A pass declares the same resource twice.
    #[error("pass '{pass}' declares {resource:?} more than once")]
    DuplicateAccess {
        pass: String,
        resource: FrameResource,
    },
    /// A step refers to a pass index outside the declaration list.
    #[error("schedule step refers to unknown pass {0}")]
    UnknownPass(usize),
}

impl From<ScheduleError> for RenderError {
    fn from(err: ScheduleError) -> Self {
        RenderError::InternalInvariantViolation(err.to_string())
    }
}

/// One step of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleStep {
    /// State transitions recorded before the next pass.
    Barrier(Vec<Transition>),
    /// Runs the pass with this index.
    Pass(usize),
}

/// The ordered steps of a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSchedule {
    steps: Vec<ScheduleStep>,
}

/// Simulated resource states, starting from home.
#[derive(Default)]
struct Simulation {
    states: BTreeMap<FrameResource, ResourceState>,
}

impl Simulation {
    fn current(&self, resource: FrameResource) -> ResourceState {
        self.states
            .get(&resource)
            .copied()
            .unwrap_or_else(|| resource.home_state())
    }

    fn set(&mut self, resource: FrameResource, state: ResourceState) {
        self.states.insert(resource, state);
    }

    fn away_from_home(&self, skip: &[ResourceAccess]) -> Vec<Transition> {
        self.states
            .iter()
            .filter(|(resource, state)| {
                resource.home_state() != **state && !skip.iter().any(|a| a.resource == **resource)
            })
            .map(|(resource, state)| Transition::new(*resource, *state, resource.home_state()))
            .collect()
    }
}

fn check_duplicates(name: &str, declaration: &PassDeclaration) -> Result<(), ScheduleError> {
    for (i, access) in declaration.accesses.iter().enumerate() {
        if declaration.accesses[..i]
            .iter()
            .any(|earlier| earlier.resource == access.resource)
        {
            return Err(ScheduleError::DuplicateAccess {
                pass: name.to_string(),
                resource: access.resource,
            });
        }
    }
    Ok(())
}

impl FrameSchedule {
    /// Wraps hand-written steps, mostly useful to exercise [`FrameSchedule::validate`].
    pub fn from_steps(steps: Vec<ScheduleStep>) -> Self {
        Self { steps }
    }

    /// Builds the schedule of `passes`, run in order.
    ///
    /// # Arguments
    ///
    /// * `passes` - Name and declaration of every pass, in execution order. The last
    ///   pass is expected to present.
    /// * `is_live` - Filters out declared resources that do not exist, such as an
    ///   unsupported shading-rate image.
    ///
    /// # Returns
    ///
    /// The schedule, or [`ScheduleError::DuplicateAccess`] for a malformed
    /// declaration.
    pub fn assemble(
        passes: &[(&str, PassDeclaration)],
        is_live: impl Fn(FrameResource) -> bool,
    ) -> Result<Self, ScheduleError> {
        let mut sim = Simulation::default();
        let mut steps = Vec::with_capacity(passes.len() * 2 + 1);

        for (index, (name, declaration)) in passes.iter().enumerate() {
            check_duplicates(name, declaration)?;
            let live: Vec<ResourceAccess> = declaration
                .accesses
                .iter()
                .filter(|a| is_live(a.resource))
                .copied()
                .collect();

            let mut barrier: Vec<Transition> = live
                .iter()
                .filter(|a| sim.current(a.resource) != a.entry)
                .map(|a| Transition::new(a.resource, sim.current(a.resource), a.entry))
                .collect();

            // Close everything before the final pass, so it is the last to touch
            // the back buffer.
            if index + 1 == passes.len() {
                barrier.extend(sim.away_from_home(&live));
            }

            if !barrier.is_empty() {
                steps.push(ScheduleStep::Barrier(barrier));
            }
            steps.push(ScheduleStep::Pass(index));
            for access in &live {
                sim.set(access.resource, access.exit);
            }
        }

        let trailing = sim.away_from_home(&[]);
        if !trailing.is_empty() {
            steps.push(ScheduleStep::Barrier(trailing));
        }

        Ok(Self { steps })
    }

    /// Re-simulates the schedule against `passes` and checks every barrier, every
    /// entry state and the closure of the frame.
    pub fn validate(
        &self,
        passes: &[(&str, PassDeclaration)],
        is_live: impl Fn(FrameResource) -> bool,
    ) -> Result<(), ScheduleError> {
        let mut sim = Simulation::default();
        for step in &self.steps {
            match step {
                ScheduleStep::Barrier(transitions) => {
                    for t in transitions {
                        if t.from == t.to {
                            return Err(ScheduleError::RedundantTransition {
                                resource: t.resource,
                                state: t.to,
                            });
                        }
                        let found = sim.current(t.resource);
                        if found != t.from {
                            return Err(ScheduleError::WrongSourceState {
                                resource: t.resource,
                                expected: t.from,
                                found,
                            });
                        }
                        sim.set(t.resource, t.to);
                    }
                }
                ScheduleStep::Pass(index) => {
                    let (name, declaration) =
                        passes.get(*index).ok_or(ScheduleError::UnknownPass(*index))?;
                    check_duplicates(name, declaration)?;
                    for access in declaration.accesses.iter().filter(|a| is_live(a.resource)) {
                        let found = sim.current(access.resource);
                        if found != access.entry {
                            return Err(ScheduleError::EntryNotMet {
                                pass: name.to_string(),
                                resource: access.resource,
                                expected: access.entry,
                                found,
                            });
                        }
                    }
                    for access in declaration.accesses.iter().filter(|a| is_live(a.resource)) {
                        sim.set(access.resource, access.exit);
                    }
                }
            }
        }

        match sim.away_from_home(&[]).first() {
            Some(t) => Err(ScheduleError::NotClosed {
                resource: t.resource,
                found: t.from,
                home: t.to,
            }),
            None => Ok(()),
        }
    }

    /// The steps in execution order.
    pub fn steps(&self) -> &[ScheduleStep] {
        &self.steps
    }

    /// Total number of transitions across all barriers.
    pub fn barrier_transition_count(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                ScheduleStep::Barrier(t) => t.len(),
                ScheduleStep::Pass(_) => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceState::*;

    fn passes() -> Vec<(&'static str, PassDeclaration)> {
        vec![
            (
                "Base",
                PassDeclaration::new()
                    .uses(FrameResource::GBufferAlbedo, RenderTarget)
                    .uses(FrameResource::GBufferDepth, DepthWrite),
            ),
            (
                "Lighting",
                PassDeclaration::new()
                    .uses(FrameResource::GBufferAlbedo, NonPixelShaderResource)
                    .uses(FrameResource::GBufferDepth, NonPixelShaderResource)
                    .access(FrameResource::FinalTarget, UnorderedAccess, PixelShaderResource),
            ),
            (
                "Blit",
                PassDeclaration::new()
                    .uses(FrameResource::FinalTarget, PixelShaderResource)
                    .uses(FrameResource::BackBuffer, RenderTarget),
            ),
            ("Present", PassDeclaration::new().uses(FrameResource::BackBuffer, Present)),
        ]
    }

    #[test]
    fn test_assembled_schedule_validates() {
        let passes = passes();
        let schedule = FrameSchedule::assemble(&passes, |_| true).expect("assemble");
        schedule.validate(&passes, |_| true).expect("valid");

        let first = &schedule.steps()[0];
        assert_eq!(
            first,
            &ScheduleStep::Barrier(vec![
                Transition::new(FrameResource::GBufferAlbedo, NonPixelShaderResource, RenderTarget),
                Transition::new(FrameResource::GBufferDepth, PixelShaderResource, DepthWrite),
            ])
        );
    }

    #[test]
    fn test_closing_barrier_precedes_present() {
        let passes = passes();
        let schedule = FrameSchedule::assemble(&passes, |_| true).expect("assemble");
        let steps = schedule.steps();
        assert_eq!(steps.last(), Some(&ScheduleStep::Pass(3)));
        let ScheduleStep::Barrier(closing) = &steps[steps.len() - 2] else {
            panic!("expected a closing barrier");
        };
        assert!(closing.contains(&Transition::new(
            FrameResource::GBufferDepth,
            NonPixelShaderResource,
            PixelShaderResource
        )));
        assert!(closing.contains(&Transition::new(
            FrameResource::BackBuffer,
            RenderTarget,
            Present
        )));
        assert!(!closing.iter().any(|t| t.resource == FrameResource::FinalTarget));
    }

    #[test]
    fn test_dead_resources_are_skipped() {
        let passes = vec![(
            "Vrs",
            PassDeclaration::new().access(
                FrameResource::ShadingRateImage,
                UnorderedAccess,
                ShadingRateSource,
            ),
        )];
        let schedule = FrameSchedule::assemble(&passes, |r| r != FrameResource::ShadingRateImage)
            .expect("assemble");
        assert_eq!(schedule.steps(), &[ScheduleStep::Pass(0)]);
        assert_eq!(schedule.barrier_transition_count(), 0);
    }

    #[test]
    fn test_validate_detects_broken_schedules() {
        let passes = passes();

        let missing_barrier = FrameSchedule::from_steps(vec![ScheduleStep::Pass(0)]);
        assert!(matches!(
            missing_barrier.validate(&passes, |_| true),
            Err(ScheduleError::EntryNotMet { .. })
        ));

        let redundant = FrameSchedule::from_steps(vec![ScheduleStep::Barrier(vec![
            Transition::new(FrameResource::BackBuffer, Present, Present),
        ])]);
        assert!(matches!(
            redundant.validate(&passes, |_| true),
            Err(ScheduleError::RedundantTransition { .. })
        ));

        let wrong_source = FrameSchedule::from_steps(vec![ScheduleStep::Barrier(vec![
            Transition::new(FrameResource::BackBuffer, RenderTarget, Present),
        ])]);
        assert!(matches!(
            wrong_source.validate(&passes, |_| true),
            Err(ScheduleError::WrongSourceState { .. })
        ));

        let open = FrameSchedule::from_steps(vec![ScheduleStep::Barrier(vec![
            Transition::new(FrameResource::BackBuffer, Present, RenderTarget),
        ])]);
        assert!(matches!(
            open.validate(&passes, |_| true),
            Err(ScheduleError::NotClosed { .. })
        ));
    }

    #[test]
    fn test_duplicate_access_is_rejected() {
        let passes = vec![(
            "Twice",
            PassDeclaration::new()
                .uses(FrameResource::GBufferDepth, DepthWrite)
                .uses(FrameResource::GBufferDepth, DepthRead),
        )];
        assert!(matches!(
            FrameSchedule::assemble(&passes, |_| true),
            Err(ScheduleError::DuplicateAccess { .. })
        ));
    }

    #[test]
    fn test_schedule_error_becomes_invariant_violation() {
        let err: RenderError = ScheduleError::UnknownPass(4).into();
        assert!(matches!(err, RenderError::InternalInvariantViolation(_)));
    }
}
