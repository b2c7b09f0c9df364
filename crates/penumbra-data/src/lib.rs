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

//! # Penumbra Data
//!
//! Everything the renderer reads from the world each frame: the [`scene::Scene`] arena
//! of drawables and lights, the active camera, and the asset tables that own meshes
//! and materials.
//!
//! Drawables and point lights are addressed by generational handles. Meshes and
//! materials are shared through [`assets::AssetHandle`]s and never owned by a drawable.

#![warn(missing_docs)]

pub mod arena;
pub mod assets;
pub mod camera;
pub mod error;
pub mod light;
pub mod material;
pub mod mesh;
pub mod occlusion;
pub mod scene;

pub use arena::{Arena, Handle};
pub use assets::{AssetHandle, AssetTable, SceneAssets};
pub use camera::Camera;
pub use error::SceneError;
pub use light::{DirectionalLight, PointLight, PointLightFace};
pub use material::{Material, MaterialConstants, MaterialFlags, TextureSlot};
pub use mesh::{Mesh, SubMesh, VertexBuffers};
pub use occlusion::OcclusionState;
pub use scene::{Drawable, DrawableHandle, PointLightHandle, Scene};
