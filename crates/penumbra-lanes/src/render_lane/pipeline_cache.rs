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

//! Material pipeline variants and the lazily filled cache that maps them to
//! pipeline objects.

use ahash::AHashMap;
use penumbra_core::renderer::{CullMode, RenderError, ShaderProgram, VertexStreams};
use penumbra_data::MaterialFlags;
use std::fmt::Debug;
use std::hash::Hash;

/// The shading variant a material needs. Alpha masking wins over height mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialVariant {
    /// No alpha test, no parallax.
    Opaque,
    /// Alpha-tested. `packed` selects the packed-texture layout.
    AlphaMasked {
        /// Surface data is packed into a single texture.
        packed: bool,
    },
    /// Parallax-mapped. `packed` selects the packed-texture layout.
    HeightMapped {
        /// Surface data is packed into a single texture.
        packed: bool,
    },
}

/// The pipeline-relevant subset of a material's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Shading variant.
    pub variant: MaterialVariant,
    /// Back faces are not culled.
    pub double_sided: bool,
    /// Tangent-space normal mapping.
    pub normal_mapped: bool,
}

impl PipelineKey {
    /// Derives the key from material flags.
    pub fn from_flags(flags: MaterialFlags) -> Self {
        let packed = flags.contains(MaterialFlags::PACKED_TEXTURES);
        let variant = if flags.contains(MaterialFlags::ALPHA_MASKED) {
            MaterialVariant::AlphaMasked { packed }
        } else if flags.contains(MaterialFlags::HEIGHT_MAPPED) {
            MaterialVariant::HeightMapped { packed }
        } else {
            MaterialVariant::Opaque
        };
        Self {
            variant,
            double_sided: flags.contains(MaterialFlags::DOUBLE_SIDED),
            normal_mapped: flags.contains(MaterialFlags::NORMAL_MAPPED),
        }
    }

    /// Streams read by depth-only rendering (pre-pass and shadows).
    ///
    /// Alpha-tested and double-sided materials need texture coordinates, parallax
    /// needs normals as well, everything else only positions.
    pub fn depth_only_streams(&self) -> VertexStreams {
        match self.variant {
            MaterialVariant::HeightMapped { .. } => {
                VertexStreams::POSITIONS | VertexStreams::NORMALS | VertexStreams::TEXCOORDS
            }
            MaterialVariant::AlphaMasked { .. } => {
                VertexStreams::POSITIONS | VertexStreams::TEXCOORDS
            }
            MaterialVariant::Opaque if self.double_sided => {
                VertexStreams::POSITIONS | VertexStreams::TEXCOORDS
            }
            MaterialVariant::Opaque => VertexStreams::POSITIONS,
        }
    }

    /// Streams read by the GBuffer and forward passes.
    pub fn shading_streams(&self) -> VertexStreams {
        let streams = VertexStreams::POSITIONS | VertexStreams::NORMALS | VertexStreams::TEXCOORDS;
        if self.normal_mapped {
            streams | VertexStreams::TANGENTS
        } else {
            streams
        }
    }

    /// Face culling for this key.
    pub fn cull_mode(&self) -> CullMode {
        if self.double_sided {
            CullMode::None
        } else {
            CullMode::Back
        }
    }

    /// `name` with the defines selecting this variant.
    pub fn program(&self, name: &str) -> ShaderProgram {
        let mut program = ShaderProgram::new(name);
        match self.variant {
            MaterialVariant::Opaque => {}
            MaterialVariant::AlphaMasked { packed } => {
                program = program.with_define("ALPHA_TEST");
                if packed {
                    program = program.with_define("PACKED_TEXTURES");
                }
            }
            MaterialVariant::HeightMapped { packed } => {
                program = program.with_define("PARALLAX");
                if packed {
                    program = program.with_define("PACKED_TEXTURES");
                }
            }
        }
        if self.double_sided {
            program = program.with_define("DOUBLE_SIDED");
        }
        if self.normal_mapped {
            program = program.with_define("NORMAL_MAPPING");
        }
        program
    }
}

/// A key to pipeline map, filled while preparing a frame and read while encoding.
///
/// Encoding never creates pipelines: a key missing at that point means preparation
/// was skipped, which is reported as [`RenderError::InternalInvariantViolation`].
#[derive(Debug)]
pub struct PipelineCache<K, P> {
    name: &'static str,
    entries: AHashMap<K, P>,
}

impl<K, P> PipelineCache<K, P>
where
    K: Copy + Eq + Hash + Debug,
    P: Copy,
{
    /// An empty cache. `name` appears in error messages.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: AHashMap::new(),
        }
    }

    /// Returns the pipeline of `key`, building it with `build` on first use.
    pub fn get_or_create<E>(
        &mut self,
        key: K,
        build: impl FnOnce(K) -> Result<P, E>,
    ) -> Result<P, E> {
        if let Some(pipeline) = self.entries.get(&key) {
            return Ok(*pipeline);
        }
        let pipeline = build(key)?;
        self.entries.insert(key, pipeline);
        Ok(pipeline)
    }

    /// Returns the pipeline of `key`, which must have been created already.
    pub fn get(&self, key: K) -> Result<P, RenderError> {
        self.entries.get(&key).copied().ok_or_else(|| {
            RenderError::InternalInvariantViolation(format!(
                "{}: no pipeline was built for {key:?}",
                self.name
            ))
        })
    }

    /// Returns `true` if a pipeline exists for `key`.
    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    /// Number of cached pipelines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was built yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the cache, handing every pipeline to the caller for destruction.
    pub fn drain(&mut self) -> impl Iterator<Item = P> + '_ {
        self.entries.drain().map(|(_, pipeline)| pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_mask_takes_precedence_over_height() {
        let key = PipelineKey::from_flags(
            MaterialFlags::ALPHA_MASKED
                | MaterialFlags::HEIGHT_MAPPED
                | MaterialFlags::PACKED_TEXTURES,
        );
        assert_eq!(key.variant, MaterialVariant::AlphaMasked { packed: true });
        let key = PipelineKey::from_flags(MaterialFlags::HEIGHT_MAPPED);
        assert_eq!(key.variant, MaterialVariant::HeightMapped { packed: false });
    }

    #[test]
    fn test_depth_only_streams() {
        let opaque = PipelineKey::from_flags(MaterialFlags::empty());
        assert_eq!(opaque.depth_only_streams(), VertexStreams::POSITIONS);
        let two_sided = PipelineKey::from_flags(MaterialFlags::DOUBLE_SIDED);
        assert!(two_sided.depth_only_streams().contains(VertexStreams::TEXCOORDS));
        assert_eq!(two_sided.cull_mode(), CullMode::None);
        let parallax = PipelineKey::from_flags(MaterialFlags::HEIGHT_MAPPED);
        assert!(parallax.depth_only_streams().contains(VertexStreams::NORMALS));
    }

    #[test]
    fn test_program_defines() {
        let key =
            PipelineKey::from_flags(MaterialFlags::ALPHA_MASKED | MaterialFlags::NORMAL_MAPPED);
        let program = key.program("GBuffer");
        assert_eq!(
            program.defines,
            vec!["ALPHA_TEST".to_string(), "NORMAL_MAPPING".to_string()]
        );
        assert!(key.shading_streams().contains(VertexStreams::TANGENTS));
    }

    #[test]
    fn test_cache_builds_once_and_reports_missing_keys() {
        let mut cache: PipelineCache<PipelineKey, u32> = PipelineCache::new("Test");
        let key = PipelineKey::from_flags(MaterialFlags::empty());
        let mut builds = 0;
        for _ in 0..3 {
            let id = cache
                .get_or_create(key, |_| {
                    builds += 1;
                    Ok::<_, RenderError>(7)
                })
                .expect("built");
            assert_eq!(id, 7);
        }
        assert_eq!(builds, 1);
        assert_eq!(cache.get(key).ok(), Some(7));

        let other = PipelineKey::from_flags(MaterialFlags::DOUBLE_SIDED);
        assert!(matches!(
            cache.get(other),
            Err(RenderError::InternalInvariantViolation(_))
        ));
        assert_eq!(cache.drain().collect::<Vec<_>>(), vec![7]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let mut cache: PipelineCache<u8, u32> = PipelineCache::new("Test");
        assert!(cache.get_or_create(1, |_| Err("boom")).is_err());
        assert!(!cache.contains(1));
    }
}
