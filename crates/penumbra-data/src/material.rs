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

//! Surface materials: capability flags, shader constants and texture slots.

use penumbra_core::renderer::TextureId;

bitflags::bitflags! {
    /// Capabilities of a material that change which pipeline variant draws it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        /// Back faces are not culled.
        const DOUBLE_SIDED = 1 << 0;
        /// Pixels below the alpha cutoff are discarded.
        const ALPHA_MASKED = 1 << 1;
        /// Texture coordinates are displaced by a height map.
        const HEIGHT_MAPPED = 1 << 2;
        /// Roughness, metalness and height share one packed texture.
        const PACKED_TEXTURES = 1 << 3;
        /// A tangent-space normal map is applied.
        const NORMAL_MAPPED = 1 << 4;
    }
}

/// The constant block uploaded for every material.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct MaterialConstants {
    /// Linear base color and opacity.
    pub base_color: [f32; 4],
    /// Perceptual roughness.
    pub roughness: f32,
    /// Metalness.
    pub metalness: f32,
    /// Alpha-test threshold, used when alpha-masked.
    pub alpha_cutoff: f32,
    /// Parallax scale, used when height-mapped.
    pub height_scale: f32,
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            roughness: 0.5,
            metalness: 0.0,
            alpha_cutoff: 0.5,
            height_scale: 0.05,
        }
    }
}

/// Named texture slots of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    /// Base color (albedo) map.
    BaseColor = 0,
    /// Normal map.
    Normal = 1,
    /// Roughness/metalness map, or the packed texture.
    Surface = 2,
    /// Height map.
    Height = 3,
}

/// Number of texture slots per material.
pub const TEXTURE_SLOT_COUNT: usize = 4;

/// A shared surface description.
///
/// Every mutation bumps [`Material::revision`], which is how the renderer decides the
/// GPU copy of the constants is stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Debug name.
    pub label: String,
    flags: MaterialFlags,
    constants: MaterialConstants,
    textures: [Option<TextureId>; TEXTURE_SLOT_COUNT],
    render_in_forward_pass: bool,
    render_in_pre_pass: bool,
    revision: u64,
}

impl Default for Material {
    fn default() -> Self {
        Self::new("material")
    }
}

impl Material {
    /// Creates an opaque, deferred-shaded material with default constants.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            flags: MaterialFlags::empty(),
            constants: MaterialConstants::default(),
            textures: [None; TEXTURE_SLOT_COUNT],
            render_in_forward_pass: false,
            render_in_pre_pass: true,
            revision: 0,
        }
    }

    /// Sets the capability flags, builder-style.
    pub fn with_flags(mut self, flags: MaterialFlags) -> Self {
        self.set_flags(flags);
        self
    }

    /// Marks the material as forward-shaded, builder-style.
    pub fn with_forward_shading(mut self) -> Self {
        self.set_render_in_forward_pass(true);
        self
    }

    /// Sets the constant block, builder-style.
    pub fn with_constants(mut self, constants: MaterialConstants) -> Self {
        self.set_constants(constants);
        self
    }

    /// The capability flags.
    pub fn flags(&self) -> MaterialFlags {
        self.flags
    }

    /// Replaces the capability flags.
    pub fn set_flags(&mut self, flags: MaterialFlags) {
        self.flags = flags;
        self.touch();
    }

    /// The constant block.
    pub fn constants(&self) -> &MaterialConstants {
        &self.constants
    }

    /// Replaces the constant block.
    pub fn set_constants(&mut self, constants: MaterialConstants) {
        self.constants = constants;
        self.touch();
    }

    /// The texture bound to `slot`.
    pub fn texture(&self, slot: TextureSlot) -> Option<TextureId> {
        self.textures[slot as usize]
    }

    /// Binds (or clears) the texture of `slot`.
    pub fn set_texture(&mut self, slot: TextureSlot, texture: Option<TextureId>) {
        self.textures[slot as usize] = texture;
        self.touch();
    }

    /// Whether drawables using this material are shaded in the forward pass.
    pub fn render_in_forward_pass(&self) -> bool {
        self.render_in_forward_pass
    }

    /// Moves the material between the deferred and the forward path.
    pub fn set_render_in_forward_pass(&mut self, forward: bool) {
        self.render_in_forward_pass = forward;
        self.touch();
    }

    /// Whether the material is drawn into the depth pre-pass.
    pub fn render_in_pre_pass(&self) -> bool {
        self.render_in_pre_pass
    }

    /// Includes or excludes the material from the depth pre-pass.
    pub fn set_render_in_pre_pass(&mut self, pre_pass: bool) {
        self.render_in_pre_pass = pre_pass;
        self.touch();
    }

    /// A counter bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_defaults() {
        let material = Material::new("stone");
        assert!(material.flags().is_empty());
        assert!(!material.render_in_forward_pass());
        assert!(material.render_in_pre_pass());
        assert_eq!(material.revision(), 0);
    }

    #[test]
    fn test_mutation_bumps_revision() {
        let mut material = Material::new("glass");
        material.set_flags(MaterialFlags::ALPHA_MASKED | MaterialFlags::DOUBLE_SIDED);
        material.set_texture(TextureSlot::BaseColor, Some(TextureId(4)));
        assert_eq!(material.revision(), 2);
        assert_eq!(material.texture(TextureSlot::BaseColor), Some(TextureId(4)));
        assert_eq!(material.texture(TextureSlot::Height), None);
    }

    #[test]
    fn test_constants_are_gpu_sized() {
        assert_eq!(std::mem::size_of::<MaterialConstants>(), 32);
    }
}
