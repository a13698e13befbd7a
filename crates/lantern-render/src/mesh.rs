//! Mesh data and the mesh registry.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Vec3;
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use lantern_gpu::{DeletionQueue, GpuContext, TrackedBuffer};
use thiserror::Error;

/// Errors produced while importing mesh data.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The OBJ file could not be read or parsed.
    #[error("failed to load OBJ {path}: {source}")]
    Obj {
        path: String,
        source: tobj::LoadError,
    },
}

/// A single mesh vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, color: Vec3) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            color: color.to_array(),
        }
    }

    /// Vertex input bindings and attributes for pipeline creation.
    pub fn input_description() -> VertexInputDescription {
        let bindings = vec![vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(std::mem::size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)];

        let attributes = vec![
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Self, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Self, normal) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(2)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Self, color) as u32),
        ];

        VertexInputDescription {
            bindings,
            attributes,
        }
    }
}

/// Vertex input state for pipeline creation.
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// An ordered triangle list plus its GPU-resident vertex buffer.
///
/// Immutable after upload; owned by a [`MeshRegistry`].
pub struct Mesh {
    vertices: Vec<Vertex>,
    buffer: Option<TrackedBuffer>,
}

impl Mesh {
    /// Create a mesh from raw vertices.
    pub fn from_vertices(vertices: Vec<Vertex>) -> Self {
        Self {
            vertices,
            buffer: None,
        }
    }

    /// Load a mesh from an OBJ file as an unindexed triangle list.
    ///
    /// Vertex color is taken from the normal, which gives imported models a
    /// visible shading without any material data.
    pub fn load_obj(path: &Path) -> Result<Self, MeshError> {
        let (models, _materials) =
            tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS).map_err(|source| MeshError::Obj {
                path: path.display().to_string(),
                source,
            })?;

        let mut vertices = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            for &index in &mesh.indices {
                let i = index as usize;
                let position = Vec3::new(
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                );
                let normal = if mesh.normals.is_empty() {
                    Vec3::Z
                } else {
                    Vec3::new(
                        mesh.normals[3 * i],
                        mesh.normals[3 * i + 1],
                        mesh.normals[3 * i + 2],
                    )
                };
                vertices.push(Vertex::new(position, normal, normal));
            }
        }

        tracing::info!(
            "loaded {} ({} vertices)",
            path.display(),
            vertices.len()
        );

        Ok(Self::from_vertices(vertices))
    }

    /// Copy the vertex list into a GPU vertex buffer.
    ///
    /// The buffer's release is registered with the deletion queue, so the
    /// mesh itself never frees GPU memory.
    pub fn upload(
        &mut self,
        gpu: &Arc<GpuContext>,
        queue: &mut DeletionQueue,
    ) -> lantern_gpu::Result<()> {
        let size = std::mem::size_of_val(self.vertices.as_slice()) as u64;
        let buffer = TrackedBuffer::new(
            gpu,
            queue,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::CpuToGpu,
            "mesh_vertices",
        )?;
        buffer.write(&self.vertices)?;
        self.buffer = Some(buffer);
        Ok(())
    }

    /// Number of vertices to draw.
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// The vertex data.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// The GPU vertex buffer handle; null until uploaded.
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.buffer
            .as_ref()
            .map_or(vk::Buffer::null(), TrackedBuffer::handle)
    }

    /// Whether the mesh has been uploaded to the GPU.
    pub fn is_uploaded(&self) -> bool {
        self.buffer.is_some()
    }
}

/// Handle into a [`MeshRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(u32);

/// Name-keyed mesh storage.
#[derive(Default)]
pub struct MeshRegistry {
    meshes: Vec<Mesh>,
    by_name: HashMap<String, MeshHandle>,
}

impl MeshRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mesh under a name, replacing any previous mapping of that
    /// name (the previous mesh stays alive until shutdown).
    pub fn insert(&mut self, name: impl Into<String>, mesh: Mesh) -> MeshHandle {
        let handle = MeshHandle(self.meshes.len() as u32);
        self.meshes.push(mesh);
        self.by_name.insert(name.into(), handle);
        handle
    }

    /// Look up a mesh by handle.
    pub fn get(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle.0 as usize)
    }

    /// Look up a handle by name.
    pub fn handle(&self, name: &str) -> Option<MeshHandle> {
        self.by_name.get(name).copied()
    }

    /// Number of registered meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Returns `true` if no meshes are registered.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        Mesh::from_vertices(vec![
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, Vec3::Y),
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::Z, Vec3::Y),
            Vertex::new(Vec3::new(0.0, -1.0, 0.0), Vec3::Z, Vec3::Y),
        ])
    }

    #[test]
    fn vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 36);
        assert_eq!(std::mem::offset_of!(Vertex, position), 0);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 12);
        assert_eq!(std::mem::offset_of!(Vertex, color), 24);
    }

    #[test]
    fn input_description_matches_vertex() {
        let description = Vertex::input_description();
        assert_eq!(description.bindings.len(), 1);
        assert_eq!(description.bindings[0].stride, 36);
        assert_eq!(description.attributes.len(), 3);
        assert_eq!(description.attributes[1].offset, 12);
        assert_eq!(description.attributes[2].offset, 24);
    }

    #[test]
    fn registry_lookup_by_name_and_handle() {
        let mut registry = MeshRegistry::new();
        let handle = registry.insert("triangle", triangle());

        assert_eq!(registry.handle("triangle"), Some(handle));
        assert_eq!(registry.get(handle).unwrap().vertex_count(), 3);
        assert_eq!(registry.handle("missing"), None);
    }

    #[test]
    fn unuploaded_mesh_has_null_buffer() {
        let mesh = triangle();
        assert!(!mesh.is_uploaded());
        assert_eq!(mesh.vertex_buffer(), vk::Buffer::null());
    }
}
