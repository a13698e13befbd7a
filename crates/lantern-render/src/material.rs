//! Materials and the material registry.

use ash::vk;
use hashbrown::HashMap;

/// Immutable pairing of a pipeline and its layout.
///
/// Materials are never destroyed individually; the pipeline objects behind
/// them are torn down en masse through the deletion queue at shutdown.
#[derive(Clone, Copy, Debug)]
pub struct Material {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// Handle into a [`MaterialRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialHandle(u32);

/// Name-keyed material storage.
#[derive(Default)]
pub struct MaterialRegistry {
    materials: Vec<Material>,
    by_name: HashMap<String, MaterialHandle>,
}

impl MaterialRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a material under a name.
    pub fn insert(&mut self, name: impl Into<String>, material: Material) -> MaterialHandle {
        let handle = MaterialHandle(self.materials.len() as u32);
        self.materials.push(material);
        self.by_name.insert(name.into(), handle);
        handle
    }

    /// Look up a material by handle.
    pub fn get(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.0 as usize)
    }

    /// Look up a handle by name.
    pub fn handle(&self, name: &str) -> Option<MaterialHandle> {
        self.by_name.get(name).copied()
    }

    /// Number of registered materials.
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Returns `true` if no materials are registered.
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup() {
        let mut registry = MaterialRegistry::new();
        let material = Material {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
        };

        let lit = registry.insert("lit", material);
        let unlit = registry.insert("unlit", material);

        assert_ne!(lit, unlit);
        assert_eq!(registry.handle("lit"), Some(lit));
        assert_eq!(registry.handle("unlit"), Some(unlit));
        assert!(registry.get(lit).is_some());
        assert_eq!(registry.handle("missing"), None);
        assert_eq!(registry.len(), 2);
    }
}
