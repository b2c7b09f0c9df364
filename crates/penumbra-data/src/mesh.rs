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

//! Mesh geometry as seen by the renderer: vertex streams, index buffer, bounds and
//! sub-mesh ranges.

use penumbra_core::math::Aabb;
use penumbra_core::renderer::{BufferId, IndexFormat, VertexStreams};

/// A contiguous index range of a mesh drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubMesh {
    /// Value added to every index before fetching vertices.
    pub base_vertex: i32,
    /// First index of the range.
    pub start_index: u32,
    /// Number of indices in the range.
    pub index_count: u32,
    /// Number of vertices referenced by the range.
    pub vertex_count: u32,
}

/// The GPU buffers holding each vertex stream. Only positions are mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBuffers {
    /// Object-space positions.
    pub positions: BufferId,
    /// Vertex normals.
    pub normals: Option<BufferId>,
    /// Texture coordinates.
    pub texcoords: Option<BufferId>,
    /// Tangent frames.
    pub tangents: Option<BufferId>,
}

impl VertexBuffers {
    /// Vertex buffers with only a position stream.
    pub fn positions_only(positions: BufferId) -> Self {
        Self {
            positions,
            normals: None,
            texcoords: None,
            tangents: None,
        }
    }

    /// Returns the buffer bound for `stream`, which must be a single flag.
    pub fn stream(&self, stream: VertexStreams) -> Option<BufferId> {
        if stream == VertexStreams::POSITIONS {
            Some(self.positions)
        } else if stream == VertexStreams::NORMALS {
            self.normals
        } else if stream == VertexStreams::TEXCOORDS {
            self.texcoords
        } else if stream == VertexStreams::TANGENTS {
            self.tangents
        } else {
            None
        }
    }

    /// The set of streams this mesh provides.
    pub fn available(&self) -> VertexStreams {
        let mut streams = VertexStreams::POSITIONS;
        streams.set(VertexStreams::NORMALS, self.normals.is_some());
        streams.set(VertexStreams::TEXCOORDS, self.texcoords.is_some());
        streams.set(VertexStreams::TANGENTS, self.tangents.is_some());
        streams
    }
}

/// A renderable mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Debug name.
    pub label: String,
    /// Vertex stream buffers.
    pub vertex_buffers: VertexBuffers,
    /// The index buffer shared by all sub-meshes.
    pub index_buffer: BufferId,
    /// Format of the index buffer.
    pub index_format: IndexFormat,
    /// Object-space bounds.
    pub bounds: Aabb,
    /// Sub-mesh ranges, one per material slot.
    pub sub_meshes: Vec<SubMesh>,
}

impl Mesh {
    /// Number of sub-meshes, which is also the number of materials a drawable needs.
    pub fn sub_mesh_count(&self) -> usize {
        self.sub_meshes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_streams() {
        let mut buffers = VertexBuffers::positions_only(BufferId(1));
        assert_eq!(buffers.available(), VertexStreams::POSITIONS);

        buffers.texcoords = Some(BufferId(3));
        assert_eq!(
            buffers.available(),
            VertexStreams::POSITIONS | VertexStreams::TEXCOORDS
        );
        assert_eq!(buffers.stream(VertexStreams::TEXCOORDS), Some(BufferId(3)));
        assert_eq!(buffers.stream(VertexStreams::NORMALS), None);
    }
}
