//! Draw submission with redundant-state elimination.
//!
//! Walks a list of renderable instances in caller order and emits bind/draw
//! commands, skipping pipeline and vertex-buffer binds that would rebind what
//! is already bound. Correctness never depends on list order; bind counts do,
//! so callers that want few binds group by material, then mesh.

use ash::vk;
use glam::Mat4;

use crate::material::{Material, MaterialHandle, MaterialRegistry};
use crate::mesh::{MeshHandle, MeshRegistry};

/// A drawable instance: registry references plus a model transform.
///
/// Transient; scene descriptions rebuild these freely since they carry no
/// ownership.
#[derive(Clone, Copy, Debug)]
pub struct RenderObject {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub transform: Mat4,
}

/// Per-draw constants written directly into the command stream.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshPushConstants {
    pub render_matrix: [[f32; 4]; 4],
}

impl MeshPushConstants {
    /// Size in bytes, for the pipeline's push constant range.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;
}

/// Sink for the commands the submitter emits.
///
/// The production implementation is [`CommandEncoder`], which records into a
/// Vulkan command buffer; tests substitute a recording encoder to observe
/// bind counts.
pub trait DrawEncoder {
    /// Bind the material's pipeline and the frame's global descriptor set at
    /// the given dynamic scene-buffer offset.
    fn bind_material(&mut self, material: &Material, scene_offset: u32);
    /// Write the per-draw constants through the material's layout.
    fn push_transform(&mut self, material: &Material, constants: &MeshPushConstants);
    /// Bind a mesh vertex buffer at binding 0.
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);
    /// Issue a draw of `vertex_count` vertices.
    fn draw(&mut self, vertex_count: u32);
}

/// Emit draw commands for `objects` in input order.
///
/// An object referencing a handle missing from its registry is a caller bug:
/// debug builds panic with a description, release builds log and skip the
/// draw.
pub fn submit_objects<E: DrawEncoder>(
    encoder: &mut E,
    meshes: &MeshRegistry,
    materials: &MaterialRegistry,
    objects: &[RenderObject],
    scene_offset: u32,
) {
    let mut last_material: Option<MaterialHandle> = None;
    let mut last_mesh: Option<MeshHandle> = None;

    for object in objects {
        let Some(material) = materials.get(object.material) else {
            debug_assert!(false, "render object references unknown {:?}", object.material);
            tracing::error!("skipping draw: unknown {:?}", object.material);
            continue;
        };
        let Some(mesh) = meshes.get(object.mesh) else {
            debug_assert!(false, "render object references unknown {:?}", object.mesh);
            tracing::error!("skipping draw: unknown {:?}", object.mesh);
            continue;
        };

        if last_material != Some(object.material) {
            encoder.bind_material(material, scene_offset);
            last_material = Some(object.material);
        }

        let constants = MeshPushConstants {
            render_matrix: object.transform.to_cols_array_2d(),
        };
        encoder.push_transform(material, &constants);

        if last_mesh != Some(object.mesh) {
            encoder.bind_vertex_buffer(mesh.vertex_buffer());
            last_mesh = Some(object.mesh);
        }

        encoder.draw(mesh.vertex_count());
    }
}

/// [`DrawEncoder`] that records into a Vulkan command buffer.
pub struct CommandEncoder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
    global_set: vk::DescriptorSet,
}

impl<'a> CommandEncoder<'a> {
    /// Create an encoder for a command buffer.
    ///
    /// # Safety
    /// The command buffer must be in recording state inside an active dynamic
    /// rendering scope, and `global_set` must match the layout of every
    /// material bound through this encoder.
    pub unsafe fn new(
        device: &'a ash::Device,
        cmd: vk::CommandBuffer,
        global_set: vk::DescriptorSet,
    ) -> Self {
        Self {
            device,
            cmd,
            global_set,
        }
    }
}

impl DrawEncoder for CommandEncoder<'_> {
    fn bind_material(&mut self, material: &Material, scene_offset: u32) {
        unsafe {
            self.device.cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                material.pipeline,
            );
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                material.layout,
                0,
                &[self.global_set],
                &[scene_offset],
            );
        }
    }

    fn push_transform(&mut self, material: &Material, constants: &MeshPushConstants) {
        unsafe {
            self.device.cmd_push_constants(
                self.cmd,
                material.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(constants),
            );
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, 0, &[buffer], &[0]);
        }
    }

    fn draw(&mut self, vertex_count: u32) {
        unsafe {
            self.device.cmd_draw(self.cmd, vertex_count, 1, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Mesh, Vertex};
    use glam::Vec3;

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        BindMaterial(u32),
        PushTransform,
        BindVertexBuffer,
        Draw(u32),
    }

    #[derive(Default)]
    struct RecordingEncoder {
        calls: Vec<Call>,
    }

    impl DrawEncoder for RecordingEncoder {
        fn bind_material(&mut self, _material: &Material, scene_offset: u32) {
            self.calls.push(Call::BindMaterial(scene_offset));
        }

        fn push_transform(&mut self, _material: &Material, _constants: &MeshPushConstants) {
            self.calls.push(Call::PushTransform);
        }

        fn bind_vertex_buffer(&mut self, _buffer: vk::Buffer) {
            self.calls.push(Call::BindVertexBuffer);
        }

        fn draw(&mut self, vertex_count: u32) {
            self.calls.push(Call::Draw(vertex_count));
        }
    }

    fn test_mesh(vertex_count: usize) -> Mesh {
        let vertex = Vertex::new(Vec3::ZERO, Vec3::Z, Vec3::Y);
        Mesh::from_vertices(vec![vertex; vertex_count])
    }

    fn null_material() -> Material {
        Material {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
        }
    }

    #[test]
    fn adjacent_materials_bind_once_meshes_rebind() {
        let mut meshes = MeshRegistry::new();
        let m1 = meshes.insert("m1", test_mesh(3));
        let m2 = meshes.insert("m2", test_mesh(6));

        let mut materials = MaterialRegistry::new();
        let mat1 = materials.insert("mat1", null_material());
        let mat2 = materials.insert("mat2", null_material());

        // Materials [M1, M1, M2], meshes [m1, m2, m1]: two pipeline binds,
        // three vertex-buffer binds (no de-duplication across non-adjacent
        // entries), three draws, in input order.
        let objects = [
            RenderObject {
                mesh: m1,
                material: mat1,
                transform: Mat4::IDENTITY,
            },
            RenderObject {
                mesh: m2,
                material: mat1,
                transform: Mat4::IDENTITY,
            },
            RenderObject {
                mesh: m1,
                material: mat2,
                transform: Mat4::IDENTITY,
            },
        ];

        let mut encoder = RecordingEncoder::default();
        submit_objects(&mut encoder, &meshes, &materials, &objects, 128);

        assert_eq!(
            encoder.calls,
            vec![
                Call::BindMaterial(128),
                Call::PushTransform,
                Call::BindVertexBuffer,
                Call::Draw(3),
                Call::PushTransform,
                Call::BindVertexBuffer,
                Call::Draw(6),
                Call::BindMaterial(128),
                Call::PushTransform,
                Call::BindVertexBuffer,
                Call::Draw(3),
            ]
        );

        let material_binds = encoder
            .calls
            .iter()
            .filter(|c| matches!(c, Call::BindMaterial(_)))
            .count();
        let buffer_binds = encoder
            .calls
            .iter()
            .filter(|c| matches!(c, Call::BindVertexBuffer))
            .count();
        let draws = encoder
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Draw(_)))
            .count();
        assert_eq!((material_binds, buffer_binds, draws), (2, 3, 3));
    }

    #[test]
    fn same_mesh_and_material_bind_once() {
        let mut meshes = MeshRegistry::new();
        let mesh = meshes.insert("mesh", test_mesh(3));
        let mut materials = MaterialRegistry::new();
        let material = materials.insert("material", null_material());

        let objects = vec![
            RenderObject {
                mesh,
                material,
                transform: Mat4::IDENTITY,
            };
            4
        ];

        let mut encoder = RecordingEncoder::default();
        submit_objects(&mut encoder, &meshes, &materials, &objects, 0);

        let material_binds = encoder
            .calls
            .iter()
            .filter(|c| matches!(c, Call::BindMaterial(_)))
            .count();
        let buffer_binds = encoder
            .calls
            .iter()
            .filter(|c| matches!(c, Call::BindVertexBuffer))
            .count();
        let draws = encoder
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Draw(_)))
            .count();
        assert_eq!((material_binds, buffer_binds, draws), (1, 1, 4));
    }

    #[test]
    fn empty_object_list_emits_nothing() {
        let meshes = MeshRegistry::new();
        let materials = MaterialRegistry::new();
        let mut encoder = RecordingEncoder::default();
        submit_objects(&mut encoder, &meshes, &materials, &[], 0);
        assert!(encoder.calls.is_empty());
    }

    #[test]
    #[should_panic(expected = "unknown")]
    #[cfg(debug_assertions)]
    fn dangling_handle_panics_in_debug() {
        let mut meshes = MeshRegistry::new();
        let mesh = meshes.insert("mesh", test_mesh(3));
        let materials = MaterialRegistry::new();

        // Handle minted from a different registry generation.
        let mut other = MaterialRegistry::new();
        let dangling = other.insert("material", null_material());

        let objects = [RenderObject {
            mesh,
            material: dangling,
            transform: Mat4::IDENTITY,
        }];

        let mut encoder = RecordingEncoder::default();
        submit_objects(&mut encoder, &meshes, &materials, &objects, 0);
    }

    #[test]
    fn push_constants_fit_vulkan_minimum() {
        // 128 bytes is the guaranteed-minimum push constant budget.
        assert_eq!(MeshPushConstants::SIZE, 64);
    }
}
