//! The engine lifecycle controller.
//!
//! Owns every GPU resource for the lifetime of the process and sequences
//! setup in dependency order: device → surface/swapchain → depth target →
//! descriptor infrastructure → per-frame slots → pipelines → meshes → scene.
//! Each setup site pushes its teardown onto the deletion queue immediately
//! after creating a resource, so shutdown is wait-idle plus a single drain.

use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3};
use gpu_allocator::MemoryLocation;
use tracing::{info, warn};
use winit::keyboard::KeyCode;
use winit::window::Window;

use lantern_gpu::command::{
    begin_command_buffer, end_command_buffer, submit_command_buffers, transition_image,
    CommandPool,
};
use lantern_gpu::descriptors::{
    write_uniform_buffer, write_uniform_buffer_dynamic, DescriptorPool,
    DescriptorSetLayoutBuilder,
};
use lantern_gpu::pipeline::{load_spirv, GraphicsPipeline, GraphicsPipelineConfig};
use lantern_gpu::sync::FrameSync;
use lantern_gpu::{
    DeletionQueue, GpuContext, GpuContextBuilder, Result, SurfaceContext, Swapchain,
    TrackedBuffer,
};
use lantern_render::{
    submit_objects, Camera, CommandEncoder, FrameBackend, GpuCameraData, GpuSceneData, Material,
    MaterialRegistry, Mesh, MeshPushConstants, MeshRegistry, RenderObject, SceneUniformLayout,
    Vertex,
};

use crate::input::KeyboardState;
use crate::runner::EngineConfig;

/// Material names registered at startup; Space cycles the focus object
/// through them.
const MATERIAL_NAMES: [&str; 2] = ["default_lit", "unlit"];

/// One element of the frame ring.
///
/// The command buffer comes from a pool dedicated to this slot, so resetting
/// it never disturbs another slot mid-flight. All handles are owned by the
/// deletion queue; the slot just uses them.
struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    sync: FrameSync,
    camera_buffer: TrackedBuffer,
    global_set: vk::DescriptorSet,
}

/// The engine: every GPU resource plus the scene being rendered.
pub struct Engine {
    gpu: Arc<GpuContext>,
    surface: SurfaceContext,
    swapchain: Swapchain,

    depth_image: vk::Image,
    depth_view: vk::ImageView,

    frames: Vec<FrameSlot>,

    scene_layout: SceneUniformLayout,
    scene_buffer: TrackedBuffer,
    scene_data: GpuSceneData,

    meshes: MeshRegistry,
    materials: MaterialRegistry,
    renderables: Vec<RenderObject>,

    camera: Camera,
    selected_material: usize,

    deletion_queue: DeletionQueue,
    torn_down: bool,
}

impl Engine {
    /// Initialize the engine against a window.
    ///
    /// Setup runs in dependency order; any failure propagates immediately and
    /// the resources created so far are reclaimed when the process exits.
    pub fn new(window: &Window, config: &EngineConfig) -> anyhow::Result<Self> {
        let gpu = Arc::new(
            GpuContextBuilder::new()
                .app_name(&config.title)
                .validation(config.validation)
                .build()?,
        );

        let surface = unsafe { SurfaceContext::from_window(gpu.as_ref(), window)? };

        let size = window.inner_size();
        let swapchain = unsafe {
            surface.create_swapchain(
                &gpu,
                size.width.max(1),
                size.height.max(1),
                config.vsync,
            )?
        };
        info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len()
        );

        let mut deletion_queue = DeletionQueue::new();

        let (depth_image, depth_view) =
            Self::init_depth(&gpu, &mut deletion_queue, swapchain.extent)?;

        // Descriptor infrastructure precedes the slots that allocate from it.
        let global_set_layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
                .uniform_buffer_dynamic(
                    1,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                )
                .build(gpu.device())?
        };
        {
            let device = (*gpu.device()).clone();
            deletion_queue.push(move || unsafe {
                device.destroy_descriptor_set_layout(global_set_layout, None);
            });
        }

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 10,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 10,
            },
        ];
        let descriptor_pool = unsafe { DescriptorPool::new(gpu.device(), 10, &pool_sizes)? };
        {
            let device = (*gpu.device()).clone();
            let pool = descriptor_pool.handle();
            deletion_queue.push(move || unsafe {
                device.destroy_descriptor_pool(pool, None);
            });
        }

        // One shared scene buffer, partitioned per frame slot by aligned
        // offset.
        let scene_layout = SceneUniformLayout::new(
            GpuSceneData::SIZE,
            gpu.limits().min_uniform_buffer_offset_alignment,
            config.frames_in_flight,
        );
        let scene_buffer = TrackedBuffer::new(
            &gpu,
            &mut deletion_queue,
            scene_layout.total_size(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "scene_uniforms",
        )?;

        let frames = Self::init_frames(
            &gpu,
            &mut deletion_queue,
            &descriptor_pool,
            global_set_layout,
            &scene_buffer,
            config.frames_in_flight,
        )?;

        let mut materials = MaterialRegistry::new();
        Self::init_pipelines(
            &gpu,
            &mut deletion_queue,
            &mut materials,
            global_set_layout,
            swapchain.format,
            config,
        )?;

        let mut meshes = MeshRegistry::new();
        Self::load_meshes(&gpu, &mut deletion_queue, &mut meshes, config)?;

        let renderables = Self::init_scene(&meshes, &materials)?;
        info!("Scene ready: {} renderables", renderables.len());

        let mut camera = Camera::default();
        camera.set_aspect(swapchain.extent.width as f32 / swapchain.extent.height as f32);

        Ok(Self {
            gpu,
            surface,
            swapchain,
            depth_image,
            depth_view,
            frames,
            scene_layout,
            scene_buffer,
            scene_data: GpuSceneData::default(),
            meshes,
            materials,
            renderables,
            camera,
            selected_material: 0,
            deletion_queue,
            torn_down: false,
        })
    }

    /// Translate the camera from held keys, one fixed step per frame.
    pub fn apply_input(&mut self, keys: &KeyboardState) {
        let mut axes = Vec3::ZERO;
        if keys.is_pressed(KeyCode::KeyA) {
            axes.x = 1.0;
        }
        if keys.is_pressed(KeyCode::KeyD) {
            axes.x = -1.0;
        }
        if keys.is_pressed(KeyCode::KeyQ) {
            axes.y = 1.0;
        }
        if keys.is_pressed(KeyCode::KeyE) {
            axes.y = -1.0;
        }
        if keys.is_pressed(KeyCode::KeyW) {
            axes.z = 1.0;
        }
        if keys.is_pressed(KeyCode::KeyS) {
            axes.z = -1.0;
        }
        self.camera.apply_movement(axes);
    }

    /// Cycle the focus object (the first renderable) through the registered
    /// materials.
    pub fn toggle_focus_material(&mut self) {
        self.selected_material = (self.selected_material + 1) % MATERIAL_NAMES.len();
        let name = MATERIAL_NAMES[self.selected_material];
        if let (Some(handle), Some(focus)) =
            (self.materials.handle(name), self.renderables.first_mut())
        {
            focus.material = handle;
            info!("focus material: {name}");
        }
    }

    /// Tear down all GPU resources.
    ///
    /// Waits for the device to go idle, then drains the deletion queue once;
    /// the swapchain and surface follow, and the device itself dies with the
    /// context. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        info!("Shutting down...");
        if let Err(err) = self.gpu.wait_idle() {
            tracing::error!("wait-idle failed during shutdown: {err}");
        }

        self.deletion_queue.drain();

        unsafe {
            self.swapchain
                .destroy(self.gpu.device(), &self.surface.swapchain_loader);
            self.surface.destroy();
        }
        info!("Shutdown complete");
    }

    fn init_depth(
        gpu: &Arc<GpuContext>,
        queue: &mut DeletionQueue,
        extent: vk::Extent2D,
    ) -> Result<(vk::Image, vk::ImageView)> {
        let depth_format = vk::Format::D32_SFLOAT;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(depth_format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);

        let image =
            gpu.allocator()
                .lock()
                .create_image(&image_info, MemoryLocation::GpuOnly, "depth")?;
        let image_handle = image.image;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image_handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(depth_format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let view = unsafe { gpu.device().create_image_view(&view_info, None)? };

        let ctx = Arc::clone(gpu);
        queue.push(move || {
            let mut image = image;
            unsafe {
                ctx.device().destroy_image_view(view, None);
            }
            if let Err(err) = ctx.allocator().lock().free_image(&mut image) {
                warn!("failed to free depth image: {err}");
            }
        });

        Ok((image_handle, view))
    }

    fn init_frames(
        gpu: &Arc<GpuContext>,
        queue: &mut DeletionQueue,
        descriptor_pool: &DescriptorPool,
        global_set_layout: vk::DescriptorSetLayout,
        scene_buffer: &TrackedBuffer,
        frames_in_flight: usize,
    ) -> Result<Vec<FrameSlot>> {
        let device = gpu.device();
        let mut frames = Vec::with_capacity(frames_in_flight);

        for _ in 0..frames_in_flight {
            let pool = unsafe {
                CommandPool::new(
                    device,
                    gpu.graphics_queue_family(),
                    vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                )?
            };
            let command_buffer = unsafe { pool.allocate_command_buffer(device)? };
            {
                let device = (*device).clone();
                let pool = pool.handle();
                queue.push(move || unsafe {
                    device.destroy_command_pool(pool, None);
                });
            }

            let sync = unsafe { FrameSync::new(device)? };
            {
                let device = (*device).clone();
                let (image_available, render_finished, in_flight) =
                    (sync.image_available, sync.render_finished, sync.in_flight);
                queue.push(move || unsafe {
                    device.destroy_semaphore(image_available, None);
                    device.destroy_semaphore(render_finished, None);
                    device.destroy_fence(in_flight, None);
                });
            }

            let camera_buffer = TrackedBuffer::new(
                gpu,
                queue,
                std::mem::size_of::<GpuCameraData>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                "camera_uniforms",
            )?;

            let global_set =
                unsafe { descriptor_pool.allocate(device, &[global_set_layout])?[0] };
            unsafe {
                write_uniform_buffer(
                    device,
                    global_set,
                    0,
                    camera_buffer.handle(),
                    0,
                    std::mem::size_of::<GpuCameraData>() as u64,
                );
                write_uniform_buffer_dynamic(
                    device,
                    global_set,
                    1,
                    scene_buffer.handle(),
                    GpuSceneData::SIZE,
                );
            }

            frames.push(FrameSlot {
                command_buffer,
                sync,
                camera_buffer,
                global_set,
            });
        }

        Ok(frames)
    }

    fn init_pipelines(
        gpu: &Arc<GpuContext>,
        queue: &mut DeletionQueue,
        materials: &mut MaterialRegistry,
        global_set_layout: vk::DescriptorSetLayout,
        color_format: vk::Format,
        config: &EngineConfig,
    ) -> Result<()> {
        let shader_dir = config.asset_dir.join("shaders");
        // A missing shader file fails setup here rather than at first draw.
        let mesh_vert = load_spirv(&shader_dir.join("tri_mesh.vert.spv"))?;
        let lit_frag = load_spirv(&shader_dir.join("default_lit.frag.spv"))?;
        let unlit_frag = load_spirv(&shader_dir.join("colored_triangle.frag.spv"))?;

        let input = Vertex::input_description();
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(MeshPushConstants::SIZE);

        for (name, fragment_shader) in
            [("default_lit", lit_frag), ("unlit", unlit_frag)]
        {
            let pipeline_config = GraphicsPipelineConfig {
                vertex_shader: mesh_vert.clone(),
                fragment_shader,
                vertex_bindings: input.bindings.clone(),
                vertex_attributes: input.attributes.clone(),
                color_format,
                ..Default::default()
            };

            let pipeline = unsafe {
                GraphicsPipeline::new(
                    gpu.device(),
                    &pipeline_config,
                    &[global_set_layout],
                    std::slice::from_ref(&push_constant_range),
                )?
            };

            materials.insert(
                name,
                Material {
                    pipeline: pipeline.pipeline,
                    layout: pipeline.layout,
                },
            );

            let device = (*gpu.device()).clone();
            queue.push(move || unsafe {
                pipeline.destroy(&device);
            });
        }

        Ok(())
    }

    fn load_meshes(
        gpu: &Arc<GpuContext>,
        queue: &mut DeletionQueue,
        meshes: &mut MeshRegistry,
        config: &EngineConfig,
    ) -> Result<()> {
        let monkey_path = config.asset_dir.join("monkey_smooth.obj");
        let mut monkey = match Mesh::load_obj(&monkey_path) {
            Ok(mesh) => mesh,
            Err(err) => {
                warn!("{err}; using the built-in triangle instead");
                Self::triangle_mesh()
            }
        };
        monkey.upload(gpu, queue)?;
        meshes.insert("monkey", monkey);

        let mut triangle = Self::triangle_mesh();
        triangle.upload(gpu, queue)?;
        meshes.insert("triangle", triangle);

        Ok(())
    }

    fn triangle_mesh() -> Mesh {
        let green = Vec3::new(0.0, 1.0, 0.0);
        Mesh::from_vertices(vec![
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, green),
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::Z, green),
            Vertex::new(Vec3::new(0.0, -1.0, 0.0), Vec3::Z, green),
        ])
    }

    /// Build the default scene: the focus mesh at the origin surrounded by a
    /// grid of small triangles sharing one material.
    fn init_scene(
        meshes: &MeshRegistry,
        materials: &MaterialRegistry,
    ) -> Result<Vec<RenderObject>> {
        let monkey = meshes
            .handle("monkey")
            .ok_or_else(|| missing("mesh", "monkey"))?;
        let triangle = meshes
            .handle("triangle")
            .ok_or_else(|| missing("mesh", "triangle"))?;
        let material = materials
            .handle("default_lit")
            .ok_or_else(|| missing("material", "default_lit"))?;

        let mut renderables = vec![RenderObject {
            mesh: monkey,
            material,
            transform: Mat4::IDENTITY,
        }];

        for x in -20..=20 {
            for y in -20..20 {
                let translation =
                    Mat4::from_translation(Vec3::new(x as f32, 0.0, y as f32));
                let scale = Mat4::from_scale(Vec3::splat(0.2));
                renderables.push(RenderObject {
                    mesh: triangle,
                    material,
                    transform: translation * scale,
                });
            }
        }

        Ok(renderables)
    }

    fn record_commands(
        &mut self,
        slot: usize,
        image_index: u32,
        frame_number: u64,
    ) -> Result<()> {
        // Per-frame uniform updates. The fence wait has already passed, so
        // this slot's camera buffer and scene region are safe to overwrite.
        self.camera.set_aspect(
            self.swapchain.extent.width as f32 / self.swapchain.extent.height as f32,
        );
        let camera_data = GpuCameraData::from(&self.camera);
        self.frames[slot]
            .camera_buffer
            .write(std::slice::from_ref(&camera_data))?;

        let framed = frame_number as f32 / 120.0;
        self.scene_data.ambient_color = [framed.sin(), 0.0, framed.cos(), 1.0];
        let scene_offset = self.scene_layout.offset_for(frame_number);
        self.scene_buffer
            .write_bytes(scene_offset, bytemuck::bytes_of(&self.scene_data))?;

        let device = self.gpu.device();
        let cmd = self.frames[slot].command_buffer;
        let image = self.swapchain.images[image_index as usize];
        let view = self.swapchain.image_views[image_index as usize];
        let extent = self.swapchain.extent;

        unsafe {
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            transition_image(
                device,
                cmd,
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE),
                (
                    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                    vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                ),
            );
            transition_image(
                device,
                cmd,
                self.depth_image,
                vk::ImageAspectFlags::DEPTH,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE),
                (
                    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
            );

            // Blue flash with a 120*pi frame period
            let flash = (frame_number as f32 / 120.0).sin().abs();
            let clear_color = vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, flash, 1.0],
                },
            };
            let depth_clear = vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            };

            let color_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_color);
            let depth_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(self.depth_view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(depth_clear);

            let rendering_info = vk::RenderingInfo::default()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .layer_count(1)
                .color_attachments(std::slice::from_ref(&color_attachment))
                .depth_attachment(&depth_attachment);

            device.cmd_begin_rendering(cmd, &rendering_info);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );

            let mut encoder =
                CommandEncoder::new(device, cmd, self.frames[slot].global_set);
            submit_objects(
                &mut encoder,
                &self.meshes,
                &self.materials,
                &self.renderables,
                scene_offset as u32,
            );

            device.cmd_end_rendering(cmd);

            transition_image(
                device,
                cmd,
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
                (
                    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                    vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                ),
                (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE),
            );

            end_command_buffer(device, cmd)?;
        }

        Ok(())
    }
}

impl FrameBackend for Engine {
    fn wait_slot(&mut self, slot: usize, timeout_ns: u64) -> Result<()> {
        unsafe { self.frames[slot].sync.wait(self.gpu.device(), timeout_ns) }
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let frame = &self.frames[slot];
        unsafe {
            frame.sync.reset(self.gpu.device())?;
            self.gpu.device().reset_command_buffer(
                frame.command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
        }
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<u32> {
        unsafe {
            self.swapchain.acquire_next_image(
                &self.surface.swapchain_loader,
                self.frames[slot].sync.image_available,
                lantern_gpu::FENCE_TIMEOUT_NS,
            )
        }
    }

    fn record(&mut self, slot: usize, image_index: u32, frame_number: u64) -> Result<()> {
        self.record_commands(slot, image_index, frame_number)
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = &self.frames[slot];
        unsafe {
            submit_command_buffers(
                self.gpu.device(),
                self.gpu.graphics_queue(),
                &[frame.command_buffer],
                &[frame.sync.image_available],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[frame.sync.render_finished],
                frame.sync.in_flight,
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<()> {
        unsafe {
            self.swapchain.present(
                &self.surface.swapchain_loader,
                self.gpu.graphics_queue(),
                image_index,
                &[self.frames[slot].sync.render_finished],
            )
        }
    }
}

fn missing(kind: &str, name: &str) -> lantern_gpu::GpuError {
    lantern_gpu::GpuError::InvalidState(format!("{kind} \"{name}\" is not registered"))
}
