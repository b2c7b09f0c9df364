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

//! Replays a submitted command stream against the device-side resource states.

use ahash::AHashMap;
use penumbra_core::renderer::{
    BufferId, CommandBufferId, QueryId, ResourceBinding, ResourceState, TextureId,
};
use std::fmt;

use super::command::RecordedCommand;

/// A resource known to the headless device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    /// A texture.
    Texture(TextureId),
    /// A buffer.
    Buffer(BufferId),
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Texture(id) => write!(f, "texture #{}", id.0),
            ResourceRef::Buffer(id) => write!(f, "buffer #{}", id.0),
        }
    }
}

/// A misuse of the resource-state protocol found while replaying a submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateViolation {
    /// A transition claimed a source state the resource was not in.
    #[error(
        "command buffer {command_buffer}: {resource} transitioned from {claimed} \
         but was in {actual}"
    )]
    TransitionMismatch {
        /// The submission the command belongs to.
        command_buffer: u64,
        /// The resource.
        resource: ResourceRef,
        /// The claimed source state.
        claimed: ResourceState,
        /// The tracked state.
        actual: ResourceState,
    },
    /// A resource was accessed in a state that does not permit the access.
    #[error("command buffer {command_buffer}: {resource} used as {access} while in {actual}")]
    WrongState {
        /// The submission the command belongs to.
        command_buffer: u64,
        /// The resource.
        resource: ResourceRef,
        /// What the command did with the resource.
        access: &'static str,
        /// The tracked state.
        actual: ResourceState,
    },
    /// Debug groups were left open or popped without a push.
    #[error("command buffer {command_buffer}: unbalanced debug groups (depth {depth})")]
    UnbalancedDebugGroups {
        /// The submission.
        command_buffer: u64,
        /// Final nesting depth; negative when more groups were popped than pushed.
        depth: i64,
    },
}

/// What a replay observed besides violations.
#[derive(Debug, Default)]
pub(crate) struct ReplayOutcome {
    pub ended_queries: Vec<QueryId>,
    pub presented: Vec<TextureId>,
}

fn accepts(binding: ResourceBinding, state: ResourceState) -> bool {
    use ResourceState as S;
    match binding {
        ResourceBinding::ConstantBuffer(_) => state == S::ConstantBuffer,
        ResourceBinding::Buffer(_) => {
            matches!(state, S::NonPixelShaderResource | S::PixelShaderResource)
        }
        ResourceBinding::StorageBuffer(_) | ResourceBinding::StorageTexture(_) => {
            state == S::UnorderedAccess
        }
        ResourceBinding::Texture(_) => matches!(
            state,
            S::NonPixelShaderResource | S::PixelShaderResource | S::DepthRead
        ),
    }
}

fn binding_target(binding: ResourceBinding) -> (ResourceRef, &'static str) {
    match binding {
        ResourceBinding::ConstantBuffer(id) => (ResourceRef::Buffer(id), "constant buffer"),
        ResourceBinding::Buffer(id) => (ResourceRef::Buffer(id), "shader resource"),
        ResourceBinding::StorageBuffer(id) => (ResourceRef::Buffer(id), "storage buffer"),
        ResourceBinding::Texture(id) => (ResourceRef::Texture(id), "sampled texture"),
        ResourceBinding::StorageTexture(id) => (ResourceRef::Texture(id), "storage texture"),
    }
}

struct Replay<'a> {
    command_buffer: u64,
    states: &'a mut AHashMap<ResourceRef, ResourceState>,
    violations: &'a mut Vec<StateViolation>,
}

impl Replay<'_> {
    fn transition(&mut self, resource: ResourceRef, before: ResourceState, after: ResourceState) {
        let Some(state) = self.states.get_mut(&resource) else {
            return;
        };
        if *state != before {
            self.violations.push(StateViolation::TransitionMismatch {
                command_buffer: self.command_buffer,
                resource,
                claimed: before,
                actual: *state,
            });
        }
        *state = after;
    }

    /// Resources the device does not own (mesh streams, material textures) are skipped.
    fn require(
        &mut self,
        resource: ResourceRef,
        access: &'static str,
        ok: impl Fn(ResourceState) -> bool,
    ) {
        let Some(&actual) = self.states.get(&resource) else {
            return;
        };
        if !ok(actual) {
            self.violations.push(StateViolation::WrongState {
                command_buffer: self.command_buffer,
                resource,
                access,
                actual,
            });
        }
    }
}

/// Applies `commands` to `states`, appending every misuse to `violations`.
pub(crate) fn replay(
    command_buffer: CommandBufferId,
    commands: &[RecordedCommand],
    states: &mut AHashMap<ResourceRef, ResourceState>,
    violations: &mut Vec<StateViolation>,
) -> ReplayOutcome {
    let mut outcome = ReplayOutcome::default();
    let mut depth: i64 = 0;
    let mut replay = Replay {
        command_buffer: command_buffer.0,
        states,
        violations,
    };

    for command in commands {
        match command {
            RecordedCommand::TransitionTexture {
                texture,
                before,
                after,
            } => replay.transition(ResourceRef::Texture(*texture), *before, *after),
            RecordedCommand::TransitionBuffer {
                buffer,
                before,
                after,
            } => replay.transition(ResourceRef::Buffer(*buffer), *before, *after),
            RecordedCommand::BeginRenderPass {
                color_attachments,
                depth_attachment,
                ..
            } => {
                for &(texture, _) in color_attachments {
                    replay.require(ResourceRef::Texture(texture), "color attachment", |s| {
                        s == ResourceState::RenderTarget
                    });
                }
                if let Some((texture, _, read_only)) = *depth_attachment {
                    if read_only {
                        replay.require(ResourceRef::Texture(texture), "read-only depth", |s| {
                            matches!(s, ResourceState::DepthRead | ResourceState::DepthWrite)
                        });
                    } else {
                        replay.require(ResourceRef::Texture(texture), "depth attachment", |s| {
                            s == ResourceState::DepthWrite
                        });
                    }
                }
            }
            RecordedCommand::SetBinding { binding, .. } => {
                let (resource, access) = binding_target(*binding);
                let binding = *binding;
                replay.require(resource, access, |s| accepts(binding, s));
            }
            RecordedCommand::UpdateBuffer { buffer, .. } => {
                replay.require(ResourceRef::Buffer(*buffer), "copy destination", |s| {
                    s == ResourceState::CopyDest
                });
            }
            RecordedCommand::ClearUnorderedAccess { texture, .. } => {
                replay.require(ResourceRef::Texture(*texture), "unordered-access clear", |s| {
                    s == ResourceState::UnorderedAccess
                });
            }
            RecordedCommand::ClearDepth { texture, .. } => {
                replay.require(ResourceRef::Texture(*texture), "depth clear", |s| {
                    s == ResourceState::DepthWrite
                });
            }
            RecordedCommand::CopyTexture {
                source,
                destination,
            } => {
                replay.require(ResourceRef::Texture(*source), "copy source", |s| {
                    s == ResourceState::CopySource
                });
                replay.require(ResourceRef::Texture(*destination), "copy destination", |s| {
                    s == ResourceState::CopyDest
                });
            }
            RecordedCommand::SetShadingRateImage(Some(texture)) => {
                replay.require(ResourceRef::Texture(*texture), "shading-rate image", |s| {
                    s == ResourceState::ShadingRateSource
                });
            }
            RecordedCommand::Present { back_buffer, .. } => {
                replay.require(ResourceRef::Texture(*back_buffer), "presented image", |s| {
                    s == ResourceState::Present
                });
                outcome.presented.push(*back_buffer);
            }
            RecordedCommand::EndQuery(query) => outcome.ended_queries.push(*query),
            RecordedCommand::PushDebugGroup(_) => depth += 1,
            RecordedCommand::PopDebugGroup => depth -= 1,
            _ => {}
        }
    }

    if depth != 0 {
        replay.violations.push(StateViolation::UnbalancedDebugGroups {
            command_buffer: command_buffer.0,
            depth,
        });
    }
    outcome
}
