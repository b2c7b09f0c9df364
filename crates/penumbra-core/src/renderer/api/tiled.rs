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

//! Defines data structures for tiled deferred light culling.
//!
//! The screen is divided into square tiles, one compute thread group per tile. Each
//! group builds the list of lights touching its tile from the tile's depth range and
//! shades the tile's pixels straight into the final target.

use bytemuck::{Pod, Zeroable};

/// The tile edge used by tiled light culling and by depth reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileSize {
    /// 16×16 pixel tiles.
    #[default]
    X16,
    /// 32×32 pixel tiles.
    X32,
}

impl TileSize {
    /// Returns the tile size in pixels.
    #[inline]
    pub const fn pixels(&self) -> u32 {
        match self {
            TileSize::X16 => 16,
            TileSize::X32 => 32,
        }
    }

    /// Calculates the number of tiles needed to cover `screen_size` pixels.
    #[inline]
    pub const fn tile_count(&self, screen_size: u32) -> u32 {
        screen_size.div_ceil(self.pixels())
    }

    /// Calculates the tile grid (and therefore dispatch) dimensions for a screen.
    #[inline]
    pub const fn tile_dimensions(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        (self.tile_count(screen_width), self.tile_count(screen_height))
    }
}

/// Root constants of the tiled lighting dispatch.
///
/// # Memory Layout
///
/// 32 bytes, eight 4-byte fields.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TiledLightingConstants {
    /// Number of non-shadow-casting point lights.
    pub num_point_lights: u32,
    /// Number of shadow-casting point lights.
    pub num_shadow_casting_point_lights: u32,
    /// Mip count of the sky irradiance texture.
    pub num_sky_light_mips: u32,
    /// Viewport width in pixels.
    pub screen_width: u32,
    /// Viewport height in pixels.
    pub screen_height: u32,
    /// Non-zero when point-light shadow maps are valid this frame.
    pub enable_point_light_shadows: u32,
    /// Number of tiles along X, for indexing the per-tile light lists.
    pub tiles_x: u32,
    /// Padding to 16-byte alignment.
    pub _padding: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_count_calculation() {
        let (tiles_x, tiles_y) = TileSize::X16.tile_dimensions(1920, 1080);
        assert_eq!(tiles_x, 120); // 1920 / 16
        assert_eq!(tiles_y, 68); // ceil(1080 / 16)
    }

    #[test]
    fn test_tile_count_rounds_up_partial_tiles() {
        assert_eq!(TileSize::X16.tile_count(1), 1);
        assert_eq!(TileSize::X32.tile_count(65), 3);
        assert_eq!(TileSize::X16.tile_count(0), 0);
    }

    #[test]
    fn test_constants_layout() {
        assert_eq!(std::mem::size_of::<TiledLightingConstants>(), 32);
    }
}
