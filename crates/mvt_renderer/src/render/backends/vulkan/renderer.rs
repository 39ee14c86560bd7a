//! Vulkan renderer
//!
//! Owns every GPU object the scene needs and implements [`FrameDevice`] so
//! the frame state machine can drive it. Fields are declared in destruction
//! order: scene resources first, the device context last.

use ash::vk;
use std::sync::Arc;
use std::time::Instant;

use super::memory::MemoryAllocator;
use super::rendering::{CommandPool, CommandRecorder, GraphicsPipeline, PipelineTargets, ShaderModule};
use super::resources::{
    image_barrier, mesh_layout_builder, subresource_range, DescriptorSetLayout, FrameUniforms, GpuMesh,
    ResourceFactory, Texture, TextureDescriptorSets, TransitionMasks,
};
use super::state::{
    AcquireOutcome, FenceStatus, FrameDevice, FrameOutcome, FramePipeline, FrameSlot, PresentOutcome,
    SemaphorePool, SwapchainManager,
};
use super::{VulkanContext, VulkanError, VulkanResult};
use crate::assets::{load_model, ImageData};
use crate::core::config::{SceneConfig, ShaderConfig, VulkanRendererConfig};
use crate::render::{UniformBufferObject, Window, TWO_QUAD_INDICES, TWO_QUAD_VERTICES};
use crate::shader::{EntryPoint, ShaderCompiler, ShaderStage, ShaderWatcher};

/// Texture used by meshes that carry none
const DEFAULT_TEXTURE: usize = 0;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Replace `current` with the result of `build`, keeping it when `build` fails
///
/// Returns whether the value was replaced. Failures are logged.
pub fn swap_if_built<T, E: std::fmt::Display>(current: &mut T, build: impl FnOnce() -> Result<T, E>) -> bool {
    match build() {
        Ok(next) => {
            *current = next;
            true
        }
        Err(e) => {
            log::error!("[PIPELINE] Reload failed, keeping previous pipeline: {}", e);
            false
        }
    }
}

/// Largest supported sample count not above the configured cap
pub fn sample_count_for(enabled: bool, cap: Option<u32>, device_max: vk::SampleCountFlags) -> vk::SampleCountFlags {
    if !enabled {
        return vk::SampleCountFlags::TYPE_1;
    }
    let limit = cap.map_or(device_max.as_raw(), |cap| cap.min(device_max.as_raw())).max(1);
    vk::SampleCountFlags::from_raw(1 << (31 - limit.leading_zeros()))
}

fn color_attachment_masks() -> TransitionMasks {
    TransitionMasks {
        src_access: vk::AccessFlags2::NONE,
        dst_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
    }
}

fn depth_attachment_masks() -> TransitionMasks {
    let fragment_tests =
        vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
    TransitionMasks {
        src_access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        src_stage: fragment_tests,
        dst_stage: fragment_tests,
    }
}

fn present_masks() -> TransitionMasks {
    TransitionMasks {
        src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        dst_access: vk::AccessFlags2::NONE,
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
    }
}

/// Compile both stages of the configured module and build the mesh pipeline
fn build_pipeline(
    device: &ash::Device,
    shaders: &ShaderConfig,
    set_layout: &DescriptorSetLayout,
    targets: PipelineTargets,
) -> VulkanResult<GraphicsPipeline> {
    let vertex_entry = EntryPoint::new(shaders.vertex_entry.as_str(), ShaderStage::Vertex);
    let fragment_entry = EntryPoint::new(shaders.fragment_entry.as_str(), ShaderStage::Fragment);

    let vertex_spirv = ShaderCompiler::compile(&shaders.module_name, Some(&vertex_entry))?;
    let fragment_spirv = ShaderCompiler::compile(&shaders.module_name, Some(&fragment_entry))?;

    let vertex_module = ShaderModule::from_spirv(device, &vertex_spirv)?;
    let fragment_module = ShaderModule::from_spirv(device, &fragment_spirv)?;

    GraphicsPipeline::new(device, &vertex_module, &fragment_module, set_layout.handle(), targets)
}

/// Upload the configured scene
///
/// Texture 0 is always a 1x1 white texture. A model or texture that fails to
/// load is reported and left out.
fn load_scene(
    factory: &ResourceFactory,
    scene: &SceneConfig,
    colocate: bool,
) -> VulkanResult<(Vec<Texture>, Vec<GpuMesh>)> {
    let mut textures = vec![Texture::white(factory)?];
    let mut meshes = Vec::new();

    if scene.include_builtin_quads {
        meshes.push(GpuMesh::upload(factory, &TWO_QUAD_VERTICES, &TWO_QUAD_INDICES, colocate, None)?);
    }

    if let Some(model_path) = &scene.model_path {
        match load_model(model_path) {
            Ok(model) => {
                let texture = match scene.texture_path.as_deref().map(ImageData::from_file) {
                    Some(Ok(image)) => {
                        textures.push(Texture::from_image_data(factory, &image)?);
                        Some(textures.len() - 1)
                    }
                    Some(Err(e)) => {
                        log::warn!("[UPLOAD] Skipping texture: {}", e);
                        None
                    }
                    None => None,
                };
                meshes.push(GpuMesh::upload(factory, &model.vertices, &model.indices, colocate, texture)?);
            }
            Err(e) => log::warn!("[UPLOAD] Skipping model {}: {}", model_path, e),
        }
    }

    log::info!("[UPLOAD] Scene ready: {} meshes, {} textures", meshes.len(), textures.len());
    Ok((textures, meshes))
}

/// Renders the spinning scene into a window
pub struct VulkanRenderer {
    descriptor_sets: TextureDescriptorSets,
    pipeline: GraphicsPipeline,
    set_layout: DescriptorSetLayout,
    meshes: Vec<GpuMesh>,
    textures: Vec<Texture>,
    uniforms: FrameUniforms,
    _allocator: Arc<MemoryAllocator>,
    semaphores: SemaphorePool,
    frame_slots: Vec<FrameSlot>,
    _command_pool: CommandPool,
    swapchain: SwapchainManager,
    factory: ResourceFactory,
    context: VulkanContext,

    frames: FramePipeline,
    targets: PipelineTargets,
    shaders: ShaderConfig,
    watcher: Option<ShaderWatcher>,
    framebuffer_size: (u32, u32),
    started: Instant,
}

impl VulkanRenderer {
    /// Create the device, swapchain, scene resources and pipeline for `window`
    ///
    /// The shader compiler must already be initialized; a compile failure here
    /// is returned as an error.
    pub fn new(window: &mut Window, config: &VulkanRendererConfig, scene: &SceneConfig) -> VulkanResult<Self> {
        config.validate().map_err(VulkanError::InvalidArgument)?;

        let context = VulkanContext::new(window, config)?;
        let device = context.raw_device();
        let factory = ResourceFactory::new(&context)?;
        let allocator = MemoryAllocator::new(&context)?;

        let depth_format = factory.find_depth_format()?;
        let samples = sample_count_for(
            config.enable_msaa,
            config.max_msaa_samples,
            context.physical_device.max_msaa_samples,
        );
        let framebuffer_size = window.framebuffer_size();
        let swapchain = SwapchainManager::new(&context, &factory, depth_format, samples, framebuffer_size)?;
        let image_count = swapchain.swapchain().image_count();

        let command_pool = CommandPool::new(device, context.graphics_queue_family())?;
        let frame_slots = FrameSlot::create_all(device, &command_pool, config.max_frames_in_flight)?;
        let semaphores = SemaphorePool::new(device, image_count)?;
        let uniforms = FrameUniforms::new(&allocator, config.max_frames_in_flight)?;

        let (textures, meshes) = load_scene(&factory, scene, config.colocate_mesh_buffers)?;

        let set_layout = mesh_layout_builder().build(device)?;
        let descriptor_sets =
            TextureDescriptorSets::new(device, &set_layout, &textures, &uniforms.descriptor_ranges())?;

        let targets = PipelineTargets {
            color_format: swapchain.swapchain().format().format,
            depth_format,
            samples,
        };
        let pipeline = build_pipeline(device, &config.shaders, &set_layout, targets)?;

        let watcher = config
            .shaders
            .hot_reload
            .then(|| ShaderWatcher::new(&config.shaders.watch_file));

        log::info!(
            "Renderer ready on {} ({} frames in flight, {} swapchain images, {:?})",
            context.physical_device.name(),
            config.max_frames_in_flight,
            image_count,
            samples
        );

        Ok(Self {
            descriptor_sets,
            pipeline,
            set_layout,
            meshes,
            textures,
            uniforms,
            _allocator: allocator,
            semaphores,
            frame_slots,
            _command_pool: command_pool,
            swapchain,
            factory,
            context,
            frames: FramePipeline::new(config.max_frames_in_flight, image_count, config.fence_timeout_ns()),
            targets,
            shaders: config.shaders.clone(),
            watcher,
            framebuffer_size,
            started: Instant::now(),
        })
    }

    /// Render and present one frame
    pub fn draw_frame(&mut self) -> VulkanResult<FrameOutcome> {
        // The cursors drive `self` as a FrameDevice, so they are moved out for the frame
        let mut frames = std::mem::take(&mut self.frames);
        let outcome = frames.draw_frame(self);
        self.frames = frames;
        outcome
    }

    /// Rebuild the swapchain after the next presented frame
    pub fn request_swapchain_rebuild(&mut self, framebuffer_size: (u32, u32)) {
        self.framebuffer_size = framebuffer_size;
        self.frames.request_rebuild();
    }

    /// Recompile and swap the pipeline when the watched shader changed
    ///
    /// Returns whether a new pipeline is in use. A failed compile keeps the
    /// current pipeline.
    pub fn reload_pipeline_if_changed(&mut self) -> VulkanResult<bool> {
        let changed = self.watcher.as_mut().is_some_and(ShaderWatcher::poll);
        if !changed {
            return Ok(false);
        }

        self.context.wait_idle()?;
        let reloaded = swap_if_built(&mut self.pipeline, || {
            build_pipeline(self.context.raw_device(), &self.shaders, &self.set_layout, self.targets)
        });
        if reloaded {
            log::info!("[PIPELINE] Reloaded from {}", self.shaders.module_name);
        }
        Ok(reloaded)
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.swapchain().extent()
    }

    /// Frames submitted since creation
    pub fn frames_submitted(&self) -> u64 {
        self.frames.frames_submitted()
    }

    /// Number of meshes drawn each frame
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Number of textures, including the default white one
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    fn slot(&self, frame: usize) -> VulkanResult<&FrameSlot> {
        self.frame_slots
            .get(frame)
            .ok_or_else(|| VulkanError::InvalidArgument(format!("no frame slot {}", frame)))
    }
}

impl FrameDevice for VulkanRenderer {
    fn wait_for_frame_fence(&mut self, frame: usize, timeout_ns: u64) -> VulkanResult<FenceStatus> {
        self.slot(frame)?.in_flight.wait(timeout_ns)
    }

    fn acquire_image(&mut self, semaphore_index: usize) -> VulkanResult<AcquireOutcome> {
        let semaphore = self.semaphores.present_complete(semaphore_index)?;
        self.swapchain.swapchain().acquire_next_image(semaphore)
    }

    fn begin_frame(&mut self, frame: usize) -> VulkanResult<()> {
        let slot = self.slot(frame)?;
        slot.in_flight.reset()?;
        unsafe {
            self.context
                .raw_device()
                .reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(VulkanError::Api)
    }

    fn record_commands(&mut self, frame: usize, image_index: u32) -> VulkanResult<()> {
        let command_buffer = self.slot(frame)?.command_buffer;
        let index = image_index as usize;
        let swapchain = self.swapchain.swapchain();
        let extent = swapchain.extent();
        let missing = || VulkanError::InvalidArgument(format!("no swapchain image {}", image_index));

        let image = *swapchain.images().get(index).ok_or_else(missing)?;
        let view = swapchain.view(index).ok_or_else(missing)?;
        let attachments = self.swapchain.attachments(index).ok_or_else(missing)?;
        let (depth_image, depth_view) = attachments.depth_target();
        let color_target = attachments.color_target();

        let color_range = subresource_range(vk::ImageAspectFlags::COLOR, 0, 1);
        let mut barriers = vec![image_barrier(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            color_attachment_masks(),
            color_range,
        )];
        if let Some((msaa_image, _)) = color_target {
            barriers.push(image_barrier(
                msaa_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                color_attachment_masks(),
                color_range,
            ));
        }
        barriers.push(image_barrier(
            depth_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            depth_attachment_masks(),
            subresource_range(vk::ImageAspectFlags::DEPTH, 0, 1),
        ));

        let clear_color = vk::ClearValue {
            color: vk::ClearColorValue { float32: CLEAR_COLOR },
        };
        let color_attachment = match color_target {
            // Multisampled target resolved into the swapchain image
            Some((_, msaa_view)) => vk::RenderingAttachmentInfo::builder()
                .image_view(msaa_view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(view)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(clear_color)
                .build(),
            None => vk::RenderingAttachmentInfo::builder()
                .image_view(view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_color)
                .build(),
        };
        let depth_attachment = vk::RenderingAttachmentInfo::builder()
            .image_view(depth_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            })
            .build();

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let color_attachments = [color_attachment];
        let rendering_info = vk::RenderingInfo::builder()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        let mut recorder = CommandRecorder::new(command_buffer, self.context.raw_device());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        recorder.image_barriers(&barriers);
        {
            let mut pass = recorder.begin_rendering(&rendering_info)?;
            pass.bind_pipeline(self.pipeline.handle());
            pass.set_viewport(vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            });
            pass.set_scissor(render_area);

            for mesh in &self.meshes {
                let set = self
                    .descriptor_sets
                    .get(mesh.texture().unwrap_or(DEFAULT_TEXTURE), frame)?;
                pass.bind_vertex_buffer(mesh.vertex_buffer(), 0);
                pass.bind_index_buffer(mesh.index_buffer(), 0);
                pass.bind_descriptor_set(self.pipeline.layout(), set);
                pass.draw_indexed(mesh.index_count());
            }
        }
        recorder.image_barriers(&[image_barrier(
            image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            present_masks(),
            color_range,
        )]);
        recorder.end()?;
        Ok(())
    }

    fn update_uniforms(&mut self, frame: usize) -> VulkanResult<()> {
        let extent = self.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let ubo = UniformBufferObject::spinning(self.started.elapsed().as_secs_f32(), aspect);
        self.uniforms.update(frame, &ubo)
    }

    fn submit(&mut self, frame: usize, semaphore_index: usize) -> VulkanResult<()> {
        let slot = self.slot(frame)?;
        let wait = [vk::SemaphoreSubmitInfo::builder()
            .semaphore(self.semaphores.present_complete(semaphore_index)?)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .build()];
        let signal = [vk::SemaphoreSubmitInfo::builder()
            .semaphore(self.semaphores.render_finished(semaphore_index)?)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .build()];
        let command_buffers = [vk::CommandBufferSubmitInfo::builder()
            .command_buffer(slot.command_buffer)
            .build()];
        let submit = vk::SubmitInfo2::builder()
            .wait_semaphore_infos(&wait)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signal)
            .build();

        unsafe {
            self.context
                .raw_device()
                .queue_submit2(self.context.graphics_queue(), &[submit], slot.in_flight.handle())
        }
        .map_err(VulkanError::Api)
    }

    fn present(&mut self, image_index: u32, semaphore_index: usize) -> VulkanResult<PresentOutcome> {
        let wait = self.semaphores.render_finished(semaphore_index)?;
        self.swapchain
            .swapchain()
            .present(self.context.present_queue(), image_index, wait)
    }

    fn rebuild_swapchain(&mut self) -> VulkanResult<usize> {
        self.swapchain.recreate(&self.context, &self.factory, self.framebuffer_size)?;
        let image_count = self.swapchain.swapchain().image_count();
        self.semaphores = SemaphorePool::new(self.context.raw_device(), image_count)?;

        let color_format = self.swapchain.swapchain().format().format;
        if color_format != self.targets.color_format {
            self.targets.color_format = color_format;
            self.pipeline = build_pipeline(self.context.raw_device(), &self.shaders, &self.set_layout, self.targets)?;
            log::info!("[PIPELINE] Rebuilt for swapchain format {:?}", color_format);
        }
        Ok(image_count)
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during teardown: {}", e);
        }
    }
}
