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

//! Shared draw-call recording for batch-driven passes.

use super::{
    FrameInputs, FrameResource, FrameResources, MaterialVariant, PipelineCache, PipelineKey,
};
use crate::visibility_lane::{MeshBatch, PrimitiveRef};
use penumbra_core::math::Mat4;
use penumbra_core::renderer::{
    CompareFunction, ComputePipelineDescriptor, ComputePipelineId, DepthState, GraphicsDevice,
    GraphicsPipelineDescriptor, GraphicsPipelineId, RenderError, RenderPass, ResourceBinding,
    ShaderProgram, TextureFormat, VertexStreams,
};
use penumbra_data::{Drawable, Material, TextureSlot};
use std::ops::Range;

/// Binding slot of the camera constants.
pub const CAMERA_SLOT: u32 = 0;
/// Binding slot of the material constants.
pub const MATERIAL_SLOT: u32 = 1;
/// First binding slot of the material textures, in [`TextureSlot`] order.
pub const TEXTURE_SLOT_BASE: u32 = 2;

const STREAM_SLOTS: [(u32, VertexStreams); 4] = [
    (0, VertexStreams::POSITIONS),
    (1, VertexStreams::NORMALS),
    (2, VertexStreams::TEXCOORDS),
    (3, VertexStreams::TANGENTS),
];

const MATERIAL_TEXTURES: [TextureSlot; 4] = [
    TextureSlot::BaseColor,
    TextureSlot::Normal,
    TextureSlot::Surface,
    TextureSlot::Height,
];

/// Per-draw root constants.
///
/// # Memory Layout
///
/// 80 bytes: the world matrix, then the view index (shadow cube, cube group or
/// cascade) padded to 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectConstants {
    /// Object to world.
    pub world: [[f32; 4]; 4],
    /// Which view of a multi-view pass this draw targets.
    pub view_index: u32,
    /// Padding to 16-byte alignment.
    pub _padding: [u32; 3],
}

impl ObjectConstants {
    /// Constants for one draw.
    pub fn new(world: &Mat4, view_index: u32) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            view_index,
            _padding: [0; 3],
        }
    }
}

/// The pipeline of a material and the vertex streams it reads.
pub(crate) type BatchPipeline = (GraphicsPipelineId, VertexStreams);

/// How the primitives of a batch are drawn.
pub(crate) struct BatchDraw {
    /// Value of [`ObjectConstants::view_index`].
    pub view_index: u32,
    /// Instance range of every draw.
    pub instances: Range<u32>,
    /// Drawables reported occluded are skipped.
    pub skip_occluded: bool,
    /// Binds the material constants and textures.
    pub bind_material: bool,
}

impl BatchDraw {
    pub fn single(view_index: u32) -> Self {
        Self {
            view_index,
            instances: 0..1,
            skip_occluded: false,
            bind_material: true,
        }
    }
}

/// Binds a material's constant buffer and textures.
pub(crate) fn bind_material(
    pass: &mut dyn RenderPass<'_>,
    resources: &FrameResources,
    handle: u32,
    material: &Material,
) -> Result<(), RenderError> {
    let constants = resources.buffer(FrameResource::MaterialConstants(handle))?;
    pass.set_binding(MATERIAL_SLOT, ResourceBinding::ConstantBuffer(constants));
    for slot in MATERIAL_TEXTURES {
        if let Some(texture) = material.texture(slot) {
            pass.set_binding(TEXTURE_SLOT_BASE + slot as u32, ResourceBinding::Texture(texture));
        }
    }
    Ok(())
}

fn draw_primitive(
    pass: &mut dyn RenderPass<'_>,
    inputs: &FrameInputs<'_>,
    drawable: &Drawable,
    primitive: &PrimitiveRef,
    streams: VertexStreams,
    draw: &BatchDraw,
) -> bool {
    let Some(mesh) = inputs.assets.meshes.get(drawable.mesh()) else {
        return false;
    };
    for (slot, stream) in STREAM_SLOTS {
        if !streams.contains(stream) {
            continue;
        }
        if let Some(buffer) = mesh.vertex_buffers.stream(stream) {
            pass.set_vertex_buffer(slot, buffer, 0);
        }
    }
    pass.set_index_buffer(mesh.index_buffer, 0, mesh.index_format);

    let constants = ObjectConstants::new(drawable.transform(), draw.view_index);
    pass.set_constants(bytemuck::bytes_of(&constants));
    let first = primitive.start_index;
    pass.draw_indexed(
        first..first + primitive.index_count,
        primitive.base_vertex,
        draw.instances.clone(),
    );
    true
}

/// Records every primitive of `batches`.
///
/// `pipeline` picks the pipeline and vertex streams of a material, or `None` to skip
/// the whole batch. Batches whose material no longer exists are skipped.
///
/// # Returns
///
/// The number of draw calls recorded.
pub(crate) fn draw_batches(
    pass: &mut dyn RenderPass<'_>,
    resources: &FrameResources,
    inputs: &FrameInputs<'_>,
    batches: &[MeshBatch],
    draw: &BatchDraw,
    mut pipeline: impl FnMut(&Material) -> Result<Option<BatchPipeline>, RenderError>,
) -> Result<u32, RenderError> {
    let mut draws = 0;
    for batch in batches {
        let Some(material) = inputs.assets.materials.get(batch.material) else {
            log::debug!("draw_batches: material {:?} is gone, skipping", batch.material);
            continue;
        };
        let Some((pipeline_id, streams)) = pipeline(material)? else {
            continue;
        };
        pass.set_pipeline(pipeline_id);
        if draw.bind_material {
            bind_material(pass, resources, batch.material.id(), material)?;
        }

        for primitive in &batch.primitives {
            let Some(drawable) = inputs.scene.drawable(primitive.drawable) else {
                continue;
            };
            if draw.skip_occluded && drawable.is_occluded() {
                continue;
            }
            if draw_primitive(pass, inputs, drawable, primitive, streams, draw) {
                draws += 1;
            }
        }
    }
    Ok(draws)
}

/// A depth-only pipeline for `key`, used by the pre-pass and the shadow passes.
///
/// Only alpha-tested and parallax variants get a pixel stage.
pub(crate) fn depth_only_descriptor(
    label: &str,
    vertex: &str,
    key: PipelineKey,
    defines: &[&str],
) -> GraphicsPipelineDescriptor {
    let with_defines = |mut program: ShaderProgram| {
        for define in defines {
            program = program.with_define(*define);
        }
        program
    };
    let pixel = (key.variant != MaterialVariant::Opaque)
        .then(|| with_defines(key.program("DepthOnly.ps")));
    GraphicsPipelineDescriptor {
        label: format!("{label} {key:?}"),
        vertex: with_defines(key.program(vertex)),
        pixel,
        vertex_streams: key.depth_only_streams(),
        color_formats: Vec::new(),
        depth: Some(DepthState {
            format: TextureFormat::Depth32Float,
            write_enabled: true,
            compare: CompareFunction::LessEqual,
        }),
        cull_mode: key.cull_mode(),
        color_writes: false,
    }
}

/// Builds the pipeline of every material in `batches` that is not cached yet.
pub(crate) fn prepare_material_pipelines<'b>(
    device: &dyn GraphicsDevice,
    cache: &mut PipelineCache<PipelineKey, GraphicsPipelineId>,
    inputs: &FrameInputs<'_>,
    batches: impl IntoIterator<Item = &'b MeshBatch>,
    mut descriptor: impl FnMut(PipelineKey) -> GraphicsPipelineDescriptor,
) -> Result<(), RenderError> {
    for batch in batches {
        let Some(material) = inputs.assets.materials.get(batch.material) else {
            continue;
        };
        let key = PipelineKey::from_flags(material.flags());
        cache.get_or_create(key, |key| {
            device
                .create_graphics_pipeline(&descriptor(key))
                .map_err(RenderError::from)
        })?;
    }
    Ok(())
}

/// Returns the pipeline created at initialisation.
pub(crate) fn initialized<T: Copy>(
    pipeline: &Option<T>,
    pass: &str,
) -> Result<T, RenderError> {
    pipeline.ok_or_else(|| {
        RenderError::InternalInvariantViolation(format!("{pass}: used before initialization"))
    })
}

/// Destroys a graphics pipeline, logging failures.
pub(crate) fn destroy_graphics_pipeline(
    device: &dyn GraphicsDevice,
    pass: &str,
    id: GraphicsPipelineId,
) {
    if let Err(e) = device.destroy_graphics_pipeline(id) {
        log::warn!("{pass}: failed to destroy pipeline {id:?}: {e}");
    }
}

/// Destroys a compute pipeline, logging failures.
pub(crate) fn destroy_compute_pipeline(
    device: &dyn GraphicsDevice,
    pass: &str,
    id: ComputePipelineId,
) {
    if let Err(e) = device.destroy_compute_pipeline(id) {
        log::warn!("{pass}: failed to destroy pipeline {id:?}: {e}");
    }
}

/// Creates the compute pipeline running `program`.
pub(crate) fn compute_pipeline(
    device: &dyn GraphicsDevice,
    label: &str,
    program: ShaderProgram,
) -> Result<ComputePipelineId, RenderError> {
    device
        .create_compute_pipeline(&ComputePipelineDescriptor {
            label: label.to_string(),
            program,
        })
        .map_err(RenderError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_data::MaterialFlags;

    #[test]
    fn test_depth_only_pixel_stage() {
        let opaque = PipelineKey::from_flags(MaterialFlags::empty());
        assert!(depth_only_descriptor("Test", "DepthOnly.vs", opaque, &[]).pixel.is_none());

        let masked = PipelineKey::from_flags(MaterialFlags::ALPHA_MASKED);
        let descriptor = depth_only_descriptor("Test", "Shadow.vs", masked, &["SINGLE_PASS"]);
        let pixel = descriptor.pixel.expect("alpha-tested depth needs a pixel stage");
        assert!(pixel.defines.iter().any(|d| d == "ALPHA_TEST"));
        assert!(pixel.defines.iter().any(|d| d == "SINGLE_PASS"));
        assert!(descriptor.vertex.defines.iter().any(|d| d == "SINGLE_PASS"));
        assert!(!descriptor.color_writes);
    }

    #[test]
    fn test_object_constants_layout() {
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 80);
        let constants = ObjectConstants::new(&Mat4::IDENTITY, 3);
        assert_eq!(constants.world[3], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(constants.view_index, 3);
    }
}
