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

//! Errors raised by scene mutation.

use thiserror::Error;

/// A rejected scene mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// A drawable needs exactly one material per sub-mesh.
    #[error("mesh '{mesh}' has {expected} sub-meshes but {actual} materials were given")]
    MaterialCountMismatch {
        /// Label of the mesh.
        mesh: String,
        /// Sub-mesh count of the mesh.
        expected: usize,
        /// Number of materials supplied.
        actual: usize,
    },
    /// The mesh handle does not resolve in the asset table.
    #[error("mesh {0} is not in the asset table")]
    UnknownMesh(u32),
}
