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

//! Shared asset storage for meshes and materials.

use crate::{material::Material, mesh::Mesh};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A non-owning, typed reference to an asset in an [`AssetTable`].
///
/// Many drawables can hold the same handle; the table is the single owner. The handle
/// is also the identity used to group draws by material.
pub struct AssetHandle<A> {
    id: u32,
    _marker: PhantomData<fn() -> A>,
}

impl<A> AssetHandle<A> {
    /// Builds a handle from a raw id. Only meaningful for the table that issued it.
    pub const fn from_raw(id: u32) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The raw id of this handle.
    pub const fn id(&self) -> u32 {
        self.id
    }
}

impl<A> Clone for AssetHandle<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for AssetHandle<A> {}

impl<A> PartialEq for AssetHandle<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<A> Eq for AssetHandle<A> {}

impl<A> Hash for AssetHandle<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<A> fmt::Debug for AssetHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetHandle({})", self.id)
    }
}

/// A central, in-memory store for a specific type of asset `A`.
///
/// Ids are never reused, so a handle to a removed asset stays dangling instead of
/// silently resolving to a different one.
pub struct AssetTable<A> {
    storage: Vec<Option<A>>,
}

impl<A> Default for AssetTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> AssetTable<A> {
    /// Creates a new, empty table.
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
        }
    }

    /// Stores `asset` and returns its handle.
    pub fn insert(&mut self, asset: A) -> AssetHandle<A> {
        let id = self.storage.len() as u32;
        self.storage.push(Some(asset));
        AssetHandle::from_raw(id)
    }

    /// Retrieves the asset behind `handle`.
    /// Returns `None` if it was never inserted or has been removed.
    pub fn get(&self, handle: AssetHandle<A>) -> Option<&A> {
        self.storage.get(handle.id as usize).and_then(Option::as_ref)
    }

    /// Retrieves the asset behind `handle` mutably.
    pub fn get_mut(&mut self, handle: AssetHandle<A>) -> Option<&mut A> {
        self.storage
            .get_mut(handle.id as usize)
            .and_then(Option::as_mut)
    }

    /// Removes the asset behind `handle`.
    pub fn remove(&mut self, handle: AssetHandle<A>) -> Option<A> {
        self.storage.get_mut(handle.id as usize).and_then(Option::take)
    }

    /// Checks if `handle` resolves to a live asset.
    pub fn contains(&self, handle: AssetHandle<A>) -> bool {
        self.get(handle).is_some()
    }

    /// Iterates live assets in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (AssetHandle<A>, &A)> + '_ {
        self.storage
            .iter()
            .enumerate()
            .filter_map(|(id, asset)| asset.as_ref().map(|a| (AssetHandle::from_raw(id as u32), a)))
    }

    /// Number of live assets.
    pub fn len(&self) -> usize {
        self.storage.iter().filter(|a| a.is_some()).count()
    }

    /// Returns `true` if no asset is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The mesh and material tables a scene's drawables point into.
#[derive(Default)]
pub struct SceneAssets {
    /// All meshes.
    pub meshes: AssetTable<Mesh>,
    /// All materials.
    pub materials: AssetTable<Material>,
}

impl SceneAssets {
    /// Creates empty tables.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut table = AssetTable::new();
        let a = table.insert(1u32);
        let b = table.insert(2u32);
        assert_eq!(table.get(a), Some(&1));
        assert_eq!(table.remove(a), Some(1));
        assert!(!table.contains(a));
        assert_eq!(table.get(b), Some(&2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut table = AssetTable::new();
        let a = table.insert("a");
        table.remove(a);
        let b = table.insert("b");
        assert_ne!(a, b);
        assert!(table.get(a).is_none());
    }
}
