use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::commands::barrier::{GfxBarrierMask, GfxBarrierSet};
use crate::commands::command_list::{
    GfxCommand, GfxCommandList, GfxDescriptorInfo, GfxDescriptorWrite, GfxRenderingAttachment,
};
use crate::context::state::{GfxAttachment, GfxContextFlags, GfxContextState, GfxResourceBinding};
use crate::foundation::host::HostDevice;
use crate::pipelines::compute_pipeline::GfxComputePipeline;
use crate::pipelines::graphics_pipeline::{GfxGraphicsPipeline, GfxGraphicsPipelineShaders};
use crate::pipelines::lookup_cache::{GfxLookupCacheStats, GfxPipelineLookupCache};
use crate::pipelines::pipeline_layout::GfxPipelineLayoutDesc;
use crate::pipelines::shader::GfxShader;
use crate::pipelines::state::{
    GfxDepthStencilState, GfxInputAssemblyState, GfxRasterizerState, GfxVertexBindingState, MAX_RENDER_TARGETS,
    MAX_VERTEX_BINDINGS,
};
use crate::resources::buffer::{GfxBufferSlice, GfxBufferView};
use crate::resources::image::{GfxImage, GfxImageView};
use crate::resources::sampler::GfxSampler;
use crate::sync::gpu_event::GfxGpuEvent;
use crate::GfxResult;

/// dispatch 写入的数据对之后的任何命令可见
const COMPUTE_WRITE_MASK: GfxBarrierMask = GfxBarrierMask {
    src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
    dst_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
    src_access: vk::AccessFlags2::SHADER_WRITE,
    dst_access: vk::AccessFlags2::from_raw(
        vk::AccessFlags2::MEMORY_READ.as_raw() | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
    ),
};

/// transfer 写入的数据对之后的任何命令可见
const TRANSFER_WRITE_MASK: GfxBarrierMask = GfxBarrierMask {
    src_stage: vk::PipelineStageFlags2::TRANSFER,
    dst_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
    src_access: vk::AccessFlags2::TRANSFER_WRITE,
    dst_access: vk::AccessFlags2::from_raw(
        vk::AccessFlags2::MEMORY_READ.as_raw() | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
    ),
};

/// 图形 shader 通过资源槽位写入的数据对 render pass 之后的任何命令可见
fn graphics_write_mask(src_stage: vk::PipelineStageFlags2) -> GfxBarrierMask {
    GfxBarrierMask {
        src_stage,
        src_access: vk::AccessFlags2::SHADER_WRITE,
        ..COMPUTE_WRITE_MASK
    }
}

fn graphics_pipeline_stages(stages: vk::ShaderStageFlags) -> vk::PipelineStageFlags2 {
    let mut flags = vk::PipelineStageFlags2::empty();
    if stages.contains(vk::ShaderStageFlags::VERTEX) {
        flags |= vk::PipelineStageFlags2::VERTEX_SHADER;
    }
    if stages.intersects(
        vk::ShaderStageFlags::TESSELLATION_CONTROL
            | vk::ShaderStageFlags::TESSELLATION_EVALUATION
            | vk::ShaderStageFlags::GEOMETRY,
    ) {
        flags |= vk::PipelineStageFlags2::PRE_RASTERIZATION_SHADERS;
    }
    if stages.contains(vk::ShaderStageFlags::FRAGMENT) {
        flags |= vk::PipelineStageFlags2::FRAGMENT_SHADER;
    }
    flags
}

/// 渲染上下文
///
/// 状态机：Idle -> Recording -> Idle。绑定操作只修改累积的状态并标记 dirty，
/// 真正的命令在 draw / dispatch 之前统一提交（[`GfxContext::commit_graphics_state`]）。
/// layout 转换先进入 barrier 集合，在下一个依赖它的命令之前合并写入。
pub struct GfxContext {
    device: Arc<dyn HostDevice>,

    flags: GfxContextFlags,
    state: GfxContextState,
    barriers: GfxBarrierSet,

    graphics_pipelines: GfxPipelineLookupCache<GfxGraphicsPipelineShaders, GfxGraphicsPipeline>,
    compute_pipelines: GfxPipelineLookupCache<u64, GfxComputePipeline>,

    /// 当前命令列表中已经绑定的 pipeline，避免重复绑定
    bound_graphics_pipeline: vk::Pipeline,
    bound_compute_pipeline: vk::Pipeline,

    /// 当前 render pass 中写过资源的 shader stage，render pass 结束时转为 memory barrier
    pending_graphics_writes: vk::PipelineStageFlags2,
    /// 平时 layout 为 UNDEFINED 的 image 在本次录制中实际所处的 layout
    transient_layouts: HashMap<vk::Image, vk::ImageLayout>,

    cmd: Option<GfxCommandList>,
}

/// 录制中的命令列表，在 begin/end 之外录制属于调用错误
fn recording(cmd: &mut Option<GfxCommandList>) -> &mut GfxCommandList {
    cmd.as_mut().expect("gfx context used outside of begin_recording/end_recording")
}

// new & init
impl GfxContext {
    pub fn new(device: Arc<dyn HostDevice>) -> Self {
        Self {
            device,
            flags: GfxContextFlags::GP_DIRTY_ALL | GfxContextFlags::CP_DIRTY_ALL,
            state: GfxContextState::default(),
            barriers: GfxBarrierSet::new(),
            graphics_pipelines: GfxPipelineLookupCache::new(),
            compute_pipelines: GfxPipelineLookupCache::new(),
            bound_graphics_pipeline: vk::Pipeline::null(),
            bound_compute_pipeline: vk::Pipeline::null(),
            pending_graphics_writes: vk::PipelineStageFlags2::empty(),
            transient_layouts: HashMap::new(),
            cmd: None,
        }
    }
}
// recording
impl GfxContext {
    /// 开始向 `cmd` 录制，已经绑定的状态保持不变
    pub fn begin_recording(&mut self, cmd: GfxCommandList) {
        assert!(self.cmd.is_none(), "begin_recording called while already recording");
        log::trace!("begin recording: {}", cmd.label());

        // 新的命令列表中还没有任何绑定
        self.flags.insert(GfxContextFlags::GP_DIRTY_ALL | GfxContextFlags::CP_DIRTY_ALL);
        self.flags.remove(GfxContextFlags::GP_RENDERING_ACTIVE);
        self.bound_graphics_pipeline = vk::Pipeline::null();
        self.bound_compute_pipeline = vk::Pipeline::null();
        self.pending_graphics_writes = vk::PipelineStageFlags2::empty();
        self.transient_layouts.clear();
        self.cmd = Some(cmd);
    }

    /// 结束录制并返回命令列表
    pub fn end_recording(&mut self) -> GfxCommandList {
        self.end_rendering();
        self.flush_barriers();

        let cmd = self.cmd.take().expect("end_recording called without begin_recording");
        log::trace!("end recording: {} ({} commands)", cmd.label(), cmd.commands().len());
        cmd
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.cmd.is_some()
    }
}
// state binding
impl GfxContext {
    pub fn bind_render_target(&mut self, slot: usize, attachment: GfxAttachment) {
        assert!(slot < MAX_RENDER_TARGETS, "render target slot {slot} out of range");

        let format = attachment.format();
        if self.state.gp_state.color_formats[slot] != format {
            self.state.gp_state.color_formats[slot] = format;
            self.flags.insert(GfxContextFlags::GP_DIRTY_PIPELINE_STATE);
        }
        self.state.color_targets[slot] = Some(attachment);
        self.flags.insert(GfxContextFlags::GP_DIRTY_FRAMEBUFFER);
    }

    pub fn bind_depth_render_target(&mut self, attachment: GfxAttachment) {
        let format = attachment.format();
        if self.state.gp_state.depth_format != format {
            self.state.gp_state.depth_format = format;
            self.flags.insert(GfxContextFlags::GP_DIRTY_PIPELINE_STATE);
        }
        self.state.depth_target = Some(attachment);
        self.flags.insert(GfxContextFlags::GP_DIRTY_FRAMEBUFFER);
    }

    /// 解除所有 render target 的绑定
    pub fn unbind_render_targets(&mut self) {
        self.state.color_targets = std::array::from_fn(|_| None);
        self.state.depth_target = None;
        self.state.gp_state.color_formats = [vk::Format::UNDEFINED; MAX_RENDER_TARGETS];
        self.state.gp_state.depth_format = vk::Format::UNDEFINED;
        self.flags
            .insert(GfxContextFlags::GP_DIRTY_FRAMEBUFFER | GfxContextFlags::GP_DIRTY_PIPELINE_STATE);
    }

    /// 绑定某个 stage 的 shader，None 表示解除绑定
    pub fn bind_shader(&mut self, stage: vk::ShaderStageFlags, shader: Option<Rc<GfxShader>>) {
        let slot = match stage {
            vk::ShaderStageFlags::VERTEX => &mut self.state.gp_shaders.vs,
            vk::ShaderStageFlags::TESSELLATION_CONTROL => &mut self.state.gp_shaders.tcs,
            vk::ShaderStageFlags::TESSELLATION_EVALUATION => &mut self.state.gp_shaders.tes,
            vk::ShaderStageFlags::GEOMETRY => &mut self.state.gp_shaders.gs,
            vk::ShaderStageFlags::FRAGMENT => &mut self.state.gp_shaders.fs,
            vk::ShaderStageFlags::COMPUTE => {
                self.state.cp_shader = shader;
                self.flags.insert(GfxContextFlags::CP_DIRTY_PIPELINE);
                return;
            }
            other => panic!("unsupported shader stage {other:?}"),
        };
        *slot = shader;
        self.flags.insert(GfxContextFlags::GP_DIRTY_PIPELINE);
    }

    pub fn set_viewports(&mut self, viewports: &[vk::Viewport]) {
        self.state.viewports = viewports.to_vec();
        self.flags.insert(GfxContextFlags::GP_DIRTY_VIEWPORTS);
    }

    pub fn set_scissors(&mut self, scissors: &[vk::Rect2D]) {
        self.state.scissors = scissors.to_vec();
        self.flags.insert(GfxContextFlags::GP_DIRTY_SCISSORS);
    }

    pub fn set_input_assembly(&mut self, state: GfxInputAssemblyState) {
        if self.state.gp_state.input_assembly != state {
            self.state.gp_state.input_assembly = state;
            self.flags.insert(GfxContextFlags::GP_DIRTY_PIPELINE_STATE);
        }
    }

    pub fn set_rasterizer(&mut self, state: GfxRasterizerState) {
        if self.state.gp_state.rasterizer != state {
            self.state.gp_state.rasterizer = state;
            self.flags.insert(GfxContextFlags::GP_DIRTY_PIPELINE_STATE);
        }
    }

    pub fn set_depth_stencil(&mut self, state: GfxDepthStencilState) {
        if self.state.gp_state.depth_stencil != state {
            self.state.gp_state.depth_stencil = state;
            self.flags.insert(GfxContextFlags::GP_DIRTY_PIPELINE_STATE);
        }
    }

    pub fn bind_index_buffer(&mut self, buffer: GfxBufferSlice, index_type: vk::IndexType) {
        self.state.index_buffer = Some((buffer, index_type));
        self.flags.insert(GfxContextFlags::GP_DIRTY_INDEX_BUFFER);
    }

    pub fn bind_vertex_buffer(&mut self, binding: u32, buffer: GfxBufferSlice, stride: u32) {
        assert!((binding as usize) < MAX_VERTEX_BINDINGS, "vertex binding {binding} out of range");
        self.state.vertex_buffers[binding as usize] = Some(buffer);
        self.flags.insert(GfxContextFlags::GP_DIRTY_VERTEX_BUFFERS);

        let bindings = &mut self.state.gp_state.vertex_bindings;
        match bindings.iter_mut().find(|b| b.binding == binding) {
            Some(b) if b.stride == stride => {}
            Some(b) => {
                b.stride = stride;
                self.flags.insert(GfxContextFlags::GP_DIRTY_PIPELINE_STATE);
            }
            None => {
                bindings.push(GfxVertexBindingState { binding, stride });
                bindings.sort_by_key(|b| b.binding);
                self.flags.insert(GfxContextFlags::GP_DIRTY_PIPELINE_STATE);
            }
        }
    }

    /// indirect 参数所在的 buffer
    pub fn bind_draw_buffer(&mut self, buffer: GfxBufferSlice) {
        self.state.draw_buffer = Some(buffer);
    }

    pub fn bind_resource_buffer(&mut self, slot: u32, buffer: GfxBufferSlice) {
        self.bind_resource(slot, GfxResourceBinding::Buffer(buffer));
    }

    pub fn bind_resource_buffer_view(&mut self, slot: u32, view: Rc<GfxBufferView>) {
        self.bind_resource(slot, GfxResourceBinding::BufferView(view));
    }

    pub fn bind_resource_image(&mut self, slot: u32, view: Rc<GfxImageView>) {
        self.bind_resource(slot, GfxResourceBinding::Image(view));
    }

    pub fn bind_resource_sampler(&mut self, slot: u32, sampler: Rc<GfxSampler>) {
        self.bind_resource(slot, GfxResourceBinding::Sampler(sampler));
    }

    fn bind_resource(&mut self, slot: u32, binding: GfxResourceBinding) {
        self.state.resources.insert(slot, binding);
        self.flags.insert(GfxContextFlags::GP_DIRTY_RESOURCES | GfxContextFlags::CP_DIRTY_RESOURCES);
    }
}
// barriers
impl GfxContext {
    /// layout 转换，stage 和 access 由两个 layout 推断
    pub fn transform_image(
        &mut self,
        image: &Rc<GfxImage>,
        range: vk::ImageSubresourceRange,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let mask = GfxBarrierMask::for_layout(old_layout, new_layout);
        self.transform_image_with_masks(image, range, old_layout, new_layout, mask);
    }

    /// layout 转换，显式指定 stage 和 access
    pub fn transform_image_with_masks(
        &mut self,
        image: &Rc<GfxImage>,
        range: vk::ImageSubresourceRange,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mask: GfxBarrierMask,
    ) {
        // render pass 内部不能插入 layout 转换
        self.end_rendering();
        recording(&mut self.cmd).track_object(image.clone());
        if image.desc().layout == vk::ImageLayout::UNDEFINED {
            self.transient_layouts.insert(image.handle(), new_layout);
        }
        self.access_image(image.handle(), range, old_layout, new_layout, mask);
    }

    /// render pass 之外 image 所处的 layout
    fn current_layout(&self, image: &GfxImage) -> vk::ImageLayout {
        match image.desc().layout {
            vk::ImageLayout::UNDEFINED => {
                self.transient_layouts.get(&image.handle()).copied().unwrap_or(vk::ImageLayout::UNDEFINED)
            }
            resting => resting,
        }
    }

    fn access_image(
        &mut self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mask: GfxBarrierMask,
    ) {
        if self.barriers.is_image_dirty(image, &range) {
            self.flush_barriers();
        }
        self.barriers.access_image(image, range, old_layout, new_layout, mask);
    }

    fn flush_barriers(&mut self) {
        debug_assert!(
            !self.flags.contains(GfxContextFlags::GP_RENDERING_ACTIVE),
            "barriers flushed inside a render pass"
        );
        self.barriers.record_commands(recording(&mut self.cmd));
    }

    #[inline]
    pub fn has_pending_barriers(&self) -> bool {
        !self.barriers.is_empty()
    }
}
// rendering
impl GfxContext {
    fn begin_rendering(&mut self) {
        if self.flags.contains(GfxContextFlags::GP_RENDERING_ACTIVE) {
            return;
        }

        let attachments = self.state.attachments().cloned().collect::<Vec<_>>();
        for attachment in &attachments {
            let current = self.current_layout(attachment.view.image());
            if current != attachment.layout {
                self.access_image(
                    attachment.view.image().handle(),
                    attachment.view.subresource_range(),
                    current,
                    attachment.layout,
                    GfxBarrierMask::for_layout(current, attachment.layout),
                );
            }
        }
        self.flush_barriers();

        let render_area = self.render_area();
        let to_rendering_attachment = |a: &GfxAttachment| GfxRenderingAttachment {
            view: a.view.handle(),
            layout: a.layout,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
        };
        let color_count = self.state.gp_state.color_attachment_count();
        let color = self.state.color_targets[..color_count]
            .iter()
            .map(|a| a.as_ref().map(to_rendering_attachment))
            .collect();
        let depth = self.state.depth_target.as_ref().map(to_rendering_attachment);

        let cmd = recording(&mut self.cmd);
        for attachment in attachments {
            cmd.track_object(attachment.view);
        }
        cmd.push(GfxCommand::BeginRendering {
            render_area,
            color,
            depth,
        });
        self.flags.insert(GfxContextFlags::GP_RENDERING_ACTIVE);
        self.flags.remove(GfxContextFlags::GP_DIRTY_FRAMEBUFFER);
    }

    /// 结束 render pass，并把 attachment 转换回平时的 layout
    ///
    /// 平时 layout 为 UNDEFINED 的 attachment 留在 attachment layout 中，下一次 render pass 直接使用
    fn end_rendering(&mut self) {
        if !self.flags.contains(GfxContextFlags::GP_RENDERING_ACTIVE) {
            return;
        }

        recording(&mut self.cmd).push(GfxCommand::EndRendering);
        self.flags.remove(GfxContextFlags::GP_RENDERING_ACTIVE);
        // 下一次 draw 需要重新开始 render pass
        self.flags.insert(GfxContextFlags::GP_DIRTY_FRAMEBUFFER);

        let attachments = self.state.attachments().cloned().collect::<Vec<_>>();
        for attachment in attachments {
            let resting = attachment.view.image().desc().layout;
            if resting == vk::ImageLayout::UNDEFINED {
                self.transient_layouts.insert(attachment.view.image().handle(), attachment.layout);
            } else if resting != attachment.layout {
                self.access_image(
                    attachment.view.image().handle(),
                    attachment.view.subresource_range(),
                    attachment.layout,
                    resting,
                    GfxBarrierMask::for_layout(attachment.layout, resting),
                );
            }
        }

        if !self.pending_graphics_writes.is_empty() {
            self.barriers.access_memory(graphics_write_mask(self.pending_graphics_writes));
            self.pending_graphics_writes = vk::PipelineStageFlags2::empty();
        }
    }

    /// 所有 attachment 的公共区域，没有 attachment 时使用第一个 viewport
    fn render_area(&self) -> vk::Rect2D {
        let extent = self
            .state
            .attachments()
            .map(|a| a.view.extent())
            .reduce(|a, b| vk::Extent3D {
                width: a.width.min(b.width),
                height: a.height.min(b.height),
                depth: 1,
            })
            .map(|e| vk::Extent2D {
                width: e.width,
                height: e.height,
            })
            .or_else(|| {
                self.state.viewports.first().map(|v| vk::Extent2D {
                    width: v.width.abs() as u32,
                    height: v.height.abs() as u32,
                })
            })
            .unwrap_or_default();
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        }
    }

    /// 确保 render pass 处于正确的状态，并且没有待处理的 barrier
    fn update_framebuffer(&mut self) {
        let active = self.flags.contains(GfxContextFlags::GP_RENDERING_ACTIVE);
        if active && (self.flags.contains(GfxContextFlags::GP_DIRTY_FRAMEBUFFER) || !self.barriers.is_empty()) {
            self.end_rendering();
        }
        if !self.flags.contains(GfxContextFlags::GP_RENDERING_ACTIVE) {
            self.flush_barriers();
            self.begin_rendering();
        }
    }
}
// pipelines
impl GfxContext {
    fn update_graphics_pipeline(&mut self) -> GfxResult<()> {
        let shaders = self.state.gp_shaders.clone();
        let device = self.device.clone();
        let pipeline = self
            .graphics_pipelines
            .get_or_try_insert_with(&shaders, || GfxGraphicsPipeline::new(device, shaders.clone()))
            .and_then(|pipeline| {
                let handle = pipeline.get_pipeline_handle(&self.state.gp_state)?;
                Ok((pipeline, handle))
            });
        let (pipeline, handle) = match pipeline {
            Ok(pipeline) => pipeline,
            Err(e) => return Err(pipeline_failure(e)),
        };

        if handle != self.bound_graphics_pipeline {
            let cmd = recording(&mut self.cmd);
            cmd.push(GfxCommand::BindPipeline {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                pipeline: handle,
            });
            cmd.track_object(pipeline.clone());
            self.bound_graphics_pipeline = handle;
            self.flags.insert(GfxContextFlags::GP_DIRTY_RESOURCES | GfxContextFlags::GP_DIRTY_CONSTANTS);
        }
        self.state.gp_pipeline = Some(pipeline);
        self.flags.remove(GfxContextFlags::GP_DIRTY_PIPELINE | GfxContextFlags::GP_DIRTY_PIPELINE_STATE);
        Ok(())
    }

    fn update_compute_pipeline(&mut self) -> GfxResult<()> {
        let Some(shader) = self.state.cp_shader.clone() else {
            return Err(pipeline_failure(crate::GfxError::InvalidPipeline(
                "no compute shader bound".to_string(),
            )));
        };
        let device = self.device.clone();
        let pipeline = match self
            .compute_pipelines
            .get_or_try_insert_with(&shader.cookie(), || GfxComputePipeline::new(device, shader.clone()))
        {
            Ok(pipeline) => pipeline,
            Err(e) => return Err(pipeline_failure(e)),
        };

        if pipeline.handle() != self.bound_compute_pipeline {
            let cmd = recording(&mut self.cmd);
            cmd.push(GfxCommand::BindPipeline {
                bind_point: vk::PipelineBindPoint::COMPUTE,
                pipeline: pipeline.handle(),
            });
            cmd.track_object(pipeline.clone());
            self.bound_compute_pipeline = pipeline.handle();
            self.flags.insert(GfxContextFlags::CP_DIRTY_RESOURCES | GfxContextFlags::CP_DIRTY_CONSTANTS);
        }
        self.state.cp_pipeline = Some(pipeline);
        self.flags.remove(GfxContextFlags::CP_DIRTY_PIPELINE);
        Ok(())
    }

    pub fn graphics_pipeline_cache_stats(&self) -> GfxLookupCacheStats {
        self.graphics_pipelines.stats()
    }

    pub fn compute_pipeline_cache_stats(&self) -> GfxLookupCacheStats {
        self.compute_pipelines.stats()
    }
}

/// 没有可以退回的 pipeline：debug 下直接断言，release 下中止这次提交
fn pipeline_failure(e: crate::GfxError) -> crate::GfxError {
    log::error!("pipeline lookup failed, aborting recording: {e}");
    if cfg!(debug_assertions) {
        panic!("cannot build pipeline: {e}");
    }
    e
}

/// 根据 layout 把已绑定的资源写成 push descriptor
fn descriptor_writes(
    layout: &GfxPipelineLayoutDesc,
    resources: &BTreeMap<u32, GfxResourceBinding>,
    cmd: &mut GfxCommandList,
) -> Vec<GfxDescriptorWrite> {
    let mut writes = Vec::with_capacity(layout.bindings.len());
    for binding in &layout.bindings {
        let Some(resource) = resources.get(&binding.binding) else {
            log::warn!("resource slot {} is used by the shader but nothing is bound", binding.binding);
            continue;
        };
        if !resource.is_compatible(binding.ty) {
            log::warn!("resource slot {} cannot be written as {:?}", binding.binding, binding.ty);
            continue;
        }

        let info = match resource {
            GfxResourceBinding::Buffer(slice) => {
                cmd.track_object(slice.buffer().clone());
                GfxDescriptorInfo::Buffer(slice.descriptor_info())
            }
            GfxResourceBinding::BufferView(view) => {
                cmd.track_object(view.clone());
                GfxDescriptorInfo::TexelBuffer(*view.handle())
            }
            GfxResourceBinding::Image(view) => {
                cmd.track_object(view.clone());
                GfxDescriptorInfo::Image(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: view.handle(),
                    image_layout: view.image().desc().layout,
                })
            }
            GfxResourceBinding::Sampler(sampler) => {
                cmd.track_object(sampler.clone());
                GfxDescriptorInfo::Image(vk::DescriptorImageInfo {
                    sampler: *sampler.handle(),
                    ..Default::default()
                })
            }
        };
        writes.push(GfxDescriptorWrite {
            binding: binding.binding,
            ty: binding.ty,
            info,
        });
    }
    writes
}

/// 各个 shader 的立即数常量
fn push_constant_commands<'a>(
    layout: vk::PipelineLayout,
    stages: vk::ShaderStageFlags,
    shaders: impl Iterator<Item = &'a Rc<GfxShader>>,
) -> Vec<GfxCommand> {
    shaders
        .filter_map(|shader| {
            shader.immediate_constants().map(|data| GfxCommand::PushConstants {
                layout,
                stages,
                offset: shader.interface_slots().push_const_offset,
                data: data.to_vec(),
            })
        })
        .collect()
}

// commit
impl GfxContext {
    /// draw 之前唯一的状态提交点
    ///
    /// 依次：解析 pipeline、处理 render pass 和 barrier、绑定 viewport / scissor、
    /// 顶点和 index、资源以及立即数常量
    pub fn commit_graphics_state<const INDEXED: bool, const INDIRECT: bool>(&mut self) -> GfxResult<()> {
        assert!(self.is_recording(), "draw recorded outside of begin_recording/end_recording");

        if self
            .flags
            .intersects(GfxContextFlags::GP_DIRTY_PIPELINE | GfxContextFlags::GP_DIRTY_PIPELINE_STATE)
        {
            self.update_graphics_pipeline()?;
        }

        self.update_framebuffer();

        let flags = self.flags;
        let state = &self.state;
        let cmd = recording(&mut self.cmd);

        if flags.contains(GfxContextFlags::GP_DIRTY_VIEWPORTS) {
            cmd.push(GfxCommand::SetViewports(state.viewports.clone()));
        }
        if flags.intersects(GfxContextFlags::GP_DIRTY_SCISSORS | GfxContextFlags::GP_DIRTY_VIEWPORTS) {
            // scissor 数量必须与 viewport 一致，没有设置时覆盖整个 viewport
            let scissors = if state.scissors.len() == state.viewports.len() {
                state.scissors.clone()
            } else {
                state
                    .viewports
                    .iter()
                    .map(|v| vk::Rect2D {
                        offset: vk::Offset2D {
                            x: v.x as i32,
                            y: v.y as i32,
                        },
                        extent: vk::Extent2D {
                            width: v.width.abs() as u32,
                            height: v.height.abs() as u32,
                        },
                    })
                    .collect()
            };
            cmd.push(GfxCommand::SetScissors(scissors));
        }

        if INDEXED && flags.contains(GfxContextFlags::GP_DIRTY_INDEX_BUFFER) {
            let (buffer, index_type) = state.index_buffer.as_ref().expect("indexed draw without an index buffer");
            cmd.track_object(buffer.buffer().clone());
            cmd.push(GfxCommand::BindIndexBuffer {
                buffer: buffer.handle(),
                offset: buffer.offset(),
                index_type: *index_type,
            });
        }

        if flags.contains(GfxContextFlags::GP_DIRTY_VERTEX_BUFFERS) {
            for (binding, buffer) in state.vertex_buffers.iter().enumerate() {
                let Some(buffer) = buffer else { continue };
                cmd.track_object(buffer.buffer().clone());
                cmd.push(GfxCommand::BindVertexBuffers {
                    first_binding: binding as u32,
                    buffers: vec![buffer.handle()],
                    offsets: vec![buffer.offset()],
                });
            }
        }

        if INDIRECT {
            let buffer = state.draw_buffer.as_ref().expect("indirect draw without a draw buffer");
            cmd.track_object(buffer.buffer().clone());
        }

        let pipeline = state.gp_pipeline.as_ref().expect("graphics pipeline resolved above");
        let write_stages = graphics_pipeline_stages(pipeline.layout_desc().write_stages());
        if flags.contains(GfxContextFlags::GP_DIRTY_RESOURCES) && !pipeline.layout_desc().bindings.is_empty() {
            let writes = descriptor_writes(pipeline.layout_desc(), &state.resources, cmd);
            cmd.push(GfxCommand::PushDescriptors {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                layout: pipeline.layout(),
                writes,
            });
        }
        if flags.contains(GfxContextFlags::GP_DIRTY_CONSTANTS) {
            let stages = pipeline.layout_desc().push_constant_stages;
            for command in push_constant_commands(pipeline.layout(), stages, pipeline.shaders().iter()) {
                cmd.push(command);
            }
        }

        let mut clear = GfxContextFlags::GP_DIRTY_VIEWPORTS
            | GfxContextFlags::GP_DIRTY_SCISSORS
            | GfxContextFlags::GP_DIRTY_VERTEX_BUFFERS
            | GfxContextFlags::GP_DIRTY_RESOURCES
            | GfxContextFlags::GP_DIRTY_CONSTANTS;
        if INDEXED {
            clear |= GfxContextFlags::GP_DIRTY_INDEX_BUFFER;
        }
        self.flags.remove(clear);
        self.pending_graphics_writes |= write_stages;
        Ok(())
    }

    /// dispatch 之前的状态提交点
    pub fn commit_compute_state<const INDIRECT: bool>(&mut self) -> GfxResult<()> {
        assert!(self.is_recording(), "dispatch recorded outside of begin_recording/end_recording");

        self.end_rendering();
        if self.flags.contains(GfxContextFlags::CP_DIRTY_PIPELINE) {
            self.update_compute_pipeline()?;
        }
        self.flush_barriers();

        let flags = self.flags;
        let state = &self.state;
        let cmd = recording(&mut self.cmd);

        if INDIRECT {
            let buffer = state.draw_buffer.as_ref().expect("indirect dispatch without a draw buffer");
            cmd.track_object(buffer.buffer().clone());
        }

        let pipeline = state.cp_pipeline.as_ref().expect("compute pipeline resolved above");
        if flags.contains(GfxContextFlags::CP_DIRTY_RESOURCES) && !pipeline.layout_desc().bindings.is_empty() {
            let writes = descriptor_writes(pipeline.layout_desc(), &state.resources, cmd);
            cmd.push(GfxCommand::PushDescriptors {
                bind_point: vk::PipelineBindPoint::COMPUTE,
                layout: pipeline.layout(),
                writes,
            });
        }
        if flags.contains(GfxContextFlags::CP_DIRTY_CONSTANTS) {
            let stages = pipeline.layout_desc().push_constant_stages;
            for command in push_constant_commands(pipeline.layout(), stages, std::iter::once(pipeline.shader())) {
                cmd.push(command);
            }
        }

        self.flags.remove(GfxContextFlags::CP_DIRTY_RESOURCES | GfxContextFlags::CP_DIRTY_CONSTANTS);
        Ok(())
    }
}
// actions
impl GfxContext {
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> GfxResult<()> {
        self.commit_graphics_state::<false, false>()?;
        recording(&mut self.cmd).push(GfxCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> GfxResult<()> {
        self.commit_graphics_state::<true, false>()?;
        recording(&mut self.cmd).push(GfxCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
        Ok(())
    }

    /// 参数来自 draw buffer 中 `offset` 处
    pub fn draw_indirect(&mut self, offset: vk::DeviceSize, draw_count: u32, stride: u32) -> GfxResult<()> {
        self.commit_graphics_state::<false, true>()?;
        let buffer = self.draw_buffer_location(offset);
        recording(&mut self.cmd).push(GfxCommand::DrawIndirect {
            buffer: buffer.0,
            offset: buffer.1,
            draw_count,
            stride,
        });
        Ok(())
    }

    pub fn draw_indexed_indirect(&mut self, offset: vk::DeviceSize, draw_count: u32, stride: u32) -> GfxResult<()> {
        self.commit_graphics_state::<true, true>()?;
        let buffer = self.draw_buffer_location(offset);
        recording(&mut self.cmd).push(GfxCommand::DrawIndexedIndirect {
            buffer: buffer.0,
            offset: buffer.1,
            draw_count,
            stride,
        });
        Ok(())
    }

    pub fn dispatch(&mut self, group_count: glam::UVec3) -> GfxResult<()> {
        self.commit_compute_state::<false>()?;
        recording(&mut self.cmd).push(GfxCommand::Dispatch { group_count });
        self.barriers.access_memory(COMPUTE_WRITE_MASK);
        Ok(())
    }

    pub fn dispatch_indirect(&mut self, offset: vk::DeviceSize) -> GfxResult<()> {
        self.commit_compute_state::<true>()?;
        let (buffer, offset) = self.draw_buffer_location(offset);
        recording(&mut self.cmd).push(GfxCommand::DispatchIndirect { buffer, offset });
        self.barriers.access_memory(COMPUTE_WRITE_MASK);
        Ok(())
    }

    fn draw_buffer_location(&self, offset: vk::DeviceSize) -> (vk::Buffer, vk::DeviceSize) {
        let buffer = self.state.draw_buffer.as_ref().expect("indirect command without a draw buffer");
        (buffer.handle(), buffer.offset() + offset)
    }

    /// 复制 `src` 到 `dst`，长度取两者中较小的
    pub fn copy_buffer(&mut self, src: &GfxBufferSlice, dst: &GfxBufferSlice) {
        let size = src.length().min(dst.length());
        self.prepare_transfer(&[(src, size), (dst, size)]);

        let cmd = recording(&mut self.cmd);
        cmd.track_object(src.buffer().clone());
        cmd.track_object(dst.buffer().clone());
        cmd.push(GfxCommand::CopyBuffer {
            src: src.handle(),
            dst: dst.handle(),
            regions: vec![vk::BufferCopy {
                src_offset: src.offset(),
                dst_offset: dst.offset(),
                size,
            }],
        });
        self.barriers.access_buffer(dst.handle(), dst.offset(), size, TRANSFER_WRITE_MASK);
    }

    /// 用 `data` 覆盖 `dst` 的开头，大小必须是 4 的倍数且不超过 64KiB
    pub fn update_buffer(&mut self, dst: &GfxBufferSlice, data: &[u8]) {
        assert!(
            data.len() % 4 == 0 && data.len() <= 65536,
            "update_buffer size {} must be a multiple of 4 and at most 64KiB",
            data.len()
        );
        debug_assert!(data.len() as u64 <= dst.length());
        let size = data.len() as vk::DeviceSize;
        self.prepare_transfer(&[(dst, size)]);

        let cmd = recording(&mut self.cmd);
        cmd.track_object(dst.buffer().clone());
        cmd.push(GfxCommand::UpdateBuffer {
            dst: dst.handle(),
            offset: dst.offset(),
            data: data.to_vec(),
        });
        self.barriers.access_buffer(dst.handle(), dst.offset(), size, TRANSFER_WRITE_MASK);
    }

    /// transfer 只依赖涉及的 buffer 区间以及全局的 memory barrier
    fn prepare_transfer(&mut self, ranges: &[(&GfxBufferSlice, vk::DeviceSize)]) {
        assert!(self.is_recording(), "transfer recorded outside of begin_recording/end_recording");
        self.end_rendering();

        let dirty = self.barriers.has_memory_barrier()
            || ranges
                .iter()
                .any(|(slice, size)| self.barriers.is_buffer_dirty(slice.handle(), slice.offset(), *size));
        if dirty {
            self.flush_barriers();
        }
    }

    /// GPU 执行到这里之后 event 变为 set 状态
    pub fn signal_gpu_event(&mut self, event: &GfxGpuEvent, stage: vk::PipelineStageFlags2) {
        self.end_rendering();
        self.flush_barriers();
        recording(&mut self.cmd).push(GfxCommand::SetEvent {
            event: event.handle(),
            stage,
        });
    }

    pub fn reset_gpu_event(&mut self, event: &GfxGpuEvent, stage: vk::PipelineStageFlags2) {
        self.end_rendering();
        recording(&mut self.cmd).push(GfxCommand::ResetEvent {
            event: event.handle(),
            stage,
        });
    }
}
// getters
impl GfxContext {
    #[inline]
    pub fn state(&self) -> &GfxContextState {
        &self.state
    }

    #[inline]
    pub fn flags(&self) -> GfxContextFlags {
        self.flags
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn HostDevice> {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::commands::submission::GfxSubmission;
    use crate::foundation::host::GfxQueueKind;
    use crate::foundation::null_device::{NullDeviceEvent, NullHostDevice};
    use crate::pipelines::shader::{GfxInterfaceSlots, GfxResourceSlot, GfxShaderCreateInfo};
    use crate::resources::buffer::GfxBuffer;
    use crate::resources::image::{GfxImageDesc, GfxImageViewDesc};
    use crate::resources::memory::GfxMemory;
    use crate::sync::gpu_event::{GfxGpuEventPool, GfxGpuEventStatus};

    const FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

    fn shader(stage: vk::ShaderStageFlags, resource_slots: Vec<GfxResourceSlot>) -> Rc<GfxShader> {
        Rc::new(GfxShader::new(GfxShaderCreateInfo {
            stage,
            entry_point: "main".to_string(),
            code: vec![0x0723_0203],
            resource_slots,
            interface_slots: GfxInterfaceSlots::default(),
            vertex_inputs: vec![],
            immediate_constants: None,
        }))
    }

    fn image(handle: u64, mip_levels: u32) -> Rc<GfxImage> {
        let mut desc =
            GfxImageDesc::new_2d(FORMAT, 1280, 720, vk::ImageUsageFlags::COLOR_ATTACHMENT, vk::ImageLayout::GENERAL);
        desc.mip_levels = mip_levels;
        let memory = GfxMemory::new(0x1000_0000, vk::DeviceMemory::null(), 1280 * 720 * 4);
        Rc::new(GfxImage::external(vk::Image::from_raw(handle), desc, memory, "display-buffer"))
    }

    fn color_target(handle: u64) -> GfxAttachment {
        let view = GfxImageView::new(
            None,
            vk::ImageView::from_raw(handle + 1),
            image(handle, 1),
            GfxImageViewDesc::new_2d(FORMAT, vk::ImageAspectFlags::COLOR),
        );
        GfxAttachment::new(Rc::new(view), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
    }

    fn buffer(handle: u64, size: u64) -> GfxBufferSlice {
        let buffer = GfxBuffer::external(
            vk::Buffer::from_raw(handle),
            GfxMemory::new(0x2000_0000 + handle * 0x1000, vk::DeviceMemory::null(), size),
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            format!("buffer-{handle}"),
        );
        GfxBufferSlice::whole(Rc::new(buffer))
    }

    fn viewport() -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: 1280.0,
            height: 720.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    fn context() -> (NullHostDevice, GfxContext) {
        sable_crate_tools::init_log::init_test_log();
        let device = NullHostDevice::new();
        let context = GfxContext::new(Arc::new(device.clone()));
        (device, context)
    }

    fn record_triangle(ctx: &mut GfxContext, vs: &Rc<GfxShader>, fs: &Rc<GfxShader>) -> GfxCommandList {
        ctx.begin_recording(GfxCommandList::new("triangle"));
        ctx.bind_render_target(0, color_target(10));
        ctx.bind_shader(vk::ShaderStageFlags::VERTEX, Some(vs.clone()));
        ctx.bind_shader(vk::ShaderStageFlags::FRAGMENT, Some(fs.clone()));
        ctx.set_viewports(&[viewport()]);
        ctx.draw(3, 1, 0, 0).unwrap();
        ctx.draw(3, 1, 0, 0).unwrap();
        ctx.end_recording()
    }

    #[test]
    fn test_draw_commits_state_in_order() {
        let (device, mut ctx) = context();
        let vs = shader(vk::ShaderStageFlags::VERTEX, vec![]);
        let fs = shader(vk::ShaderStageFlags::FRAGMENT, vec![]);

        let list = record_triangle(&mut ctx, &vs, &fs);
        assert_eq!(
            list.command_names(),
            [
                "BindPipeline",
                "PipelineBarrier",
                "BeginRendering",
                "SetViewports",
                "SetScissors",
                "Draw",
                "Draw",
                "EndRendering",
                "PipelineBarrier",
            ]
        );
        assert_eq!(list.stats().draws, 2);
        assert_eq!(list.stats().barriers, 2);
        assert!(!ctx.is_recording());
        assert_eq!(device.count(|e| matches!(e, NullDeviceEvent::GraphicsPipelineCreated(_))), 1);
    }

    #[test]
    fn test_pipeline_is_reused_across_recordings() {
        let (device, mut ctx) = context();
        let vs = shader(vk::ShaderStageFlags::VERTEX, vec![]);
        let fs = shader(vk::ShaderStageFlags::FRAGMENT, vec![]);

        record_triangle(&mut ctx, &vs, &fs);
        record_triangle(&mut ctx, &vs, &fs);

        let stats = ctx.graphics_pipeline_cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(device.count(|e| matches!(e, NullDeviceEvent::GraphicsPipelineCreated(_))), 1);

        // 固定功能状态变化只产生新的 variant
        ctx.begin_recording(GfxCommandList::new("wireframe"));
        ctx.set_rasterizer(GfxRasterizerState {
            polygon_mode: vk::PolygonMode::LINE,
            ..Default::default()
        });
        ctx.draw(3, 1, 0, 0).unwrap();
        ctx.end_recording();
        assert_eq!(device.count(|e| matches!(e, NullDeviceEvent::GraphicsPipelineCreated(_))), 2);
        assert_eq!(device.count(|e| matches!(e, NullDeviceEvent::PipelineLayoutCreated(_))), 1);
    }

    #[test]
    fn test_disjoint_transforms_are_batched() {
        let (_device, mut ctx) = context();
        let image = image(20, 4);
        let mip = |level: u32| vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        ctx.begin_recording(GfxCommandList::new("transforms"));
        ctx.transform_image(&image, mip(0), vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        ctx.transform_image(&image, mip(1), vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert!(ctx.has_pending_barriers());
        // 与未写入的 barrier 重叠，先 flush 之前的批次
        ctx.transform_image(
            &image,
            mip(0),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        let list = ctx.end_recording();

        assert_eq!(list.command_names(), ["PipelineBarrier", "PipelineBarrier"]);
        let GfxCommand::PipelineBarrier(first) = &list.commands()[0] else {
            panic!("expected a barrier");
        };
        assert_eq!(first.images.len(), 2);
        assert_eq!(first.images[0].dst_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
    }

    #[test]
    #[should_panic(expected = "outside of begin_recording")]
    fn test_draw_outside_recording_panics() {
        let (_device, mut ctx) = context();
        ctx.bind_shader(vk::ShaderStageFlags::VERTEX, Some(shader(vk::ShaderStageFlags::VERTEX, vec![])));
        let _ = ctx.draw(3, 1, 0, 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "cannot build pipeline")]
    fn test_missing_vertex_shader_is_fatal_in_debug() {
        let (_device, mut ctx) = context();
        ctx.begin_recording(GfxCommandList::new("broken"));
        ctx.bind_shader(vk::ShaderStageFlags::FRAGMENT, Some(shader(vk::ShaderStageFlags::FRAGMENT, vec![])));
        let _ = ctx.draw(3, 1, 0, 0);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_missing_vertex_shader_aborts_recording() {
        let (_device, mut ctx) = context();
        ctx.begin_recording(GfxCommandList::new("broken"));
        ctx.bind_shader(vk::ShaderStageFlags::FRAGMENT, Some(shader(vk::ShaderStageFlags::FRAGMENT, vec![])));
        assert!(matches!(ctx.draw(3, 1, 0, 0), Err(crate::GfxError::InvalidPipeline(_))));
    }

    #[test]
    fn test_transfer_waits_for_dispatch() {
        let (device, mut ctx) = context();
        let storage = GfxResourceSlot {
            slot: 0,
            ty: vk::DescriptorType::STORAGE_BUFFER,
            view: vk::ImageViewType::TYPE_2D,
            access: vk::AccessFlags2::SHADER_WRITE,
        };
        let output = buffer(1, 256);
        let readback = buffer(2, 256);

        ctx.begin_recording(GfxCommandList::new("compute"));
        ctx.bind_shader(vk::ShaderStageFlags::COMPUTE, Some(shader(vk::ShaderStageFlags::COMPUTE, vec![storage])));
        ctx.bind_resource_buffer(0, output.clone());
        ctx.dispatch(glam::UVec3::new(8, 1, 1)).unwrap();
        ctx.copy_buffer(&output, &readback);
        let list = ctx.end_recording();

        assert_eq!(
            list.command_names(),
            ["BindPipeline", "PushDescriptors", "Dispatch", "PipelineBarrier", "CopyBuffer", "PipelineBarrier"]
        );
        assert_eq!(list.stats().dispatches, 1);
        assert_eq!(list.stats().transfers, 1);
        assert!(list.tracked_object_count() >= 3);
        assert_eq!(device.count(|e| matches!(e, NullDeviceEvent::ComputePipelineCreated(_))), 1);
    }

    #[test]
    fn test_transfer_waits_for_fragment_shader_write() {
        let (_device, mut ctx) = context();
        let storage = GfxResourceSlot {
            slot: 0,
            ty: vk::DescriptorType::STORAGE_BUFFER,
            view: vk::ImageViewType::TYPE_2D,
            access: vk::AccessFlags2::SHADER_WRITE,
        };
        let output = buffer(5, 256);
        let readback = buffer(6, 256);

        ctx.begin_recording(GfxCommandList::new("fragment-write"));
        ctx.bind_render_target(0, color_target(10));
        ctx.bind_shader(vk::ShaderStageFlags::VERTEX, Some(shader(vk::ShaderStageFlags::VERTEX, vec![])));
        ctx.bind_shader(vk::ShaderStageFlags::FRAGMENT, Some(shader(vk::ShaderStageFlags::FRAGMENT, vec![storage])));
        ctx.set_viewports(&[viewport()]);
        ctx.bind_resource_buffer(0, output.clone());
        ctx.draw(3, 1, 0, 0).unwrap();
        ctx.copy_buffer(&output, &readback);
        let list = ctx.end_recording();

        assert_eq!(
            list.command_names(),
            [
                "BindPipeline",
                "PipelineBarrier",
                "BeginRendering",
                "SetViewports",
                "SetScissors",
                "PushDescriptors",
                "Draw",
                "EndRendering",
                "PipelineBarrier",
                "CopyBuffer",
                "PipelineBarrier",
            ]
        );
        let GfxCommand::PipelineBarrier(before_copy) = &list.commands()[8] else {
            panic!("expected a barrier");
        };
        let memory = before_copy.memory.expect("shader write needs a memory barrier");
        assert!(memory.src_stage_mask.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(memory.src_access_mask.contains(vk::AccessFlags2::SHADER_WRITE));
    }

    #[test]
    fn test_read_only_draw_adds_no_memory_barrier() {
        let (_device, mut ctx) = context();
        let sampled = GfxResourceSlot {
            slot: 0,
            ty: vk::DescriptorType::STORAGE_BUFFER,
            view: vk::ImageViewType::TYPE_2D,
            access: vk::AccessFlags2::SHADER_READ,
        };
        let input = buffer(7, 256);

        ctx.begin_recording(GfxCommandList::new("fragment-read"));
        ctx.bind_render_target(0, color_target(10));
        ctx.bind_shader(vk::ShaderStageFlags::VERTEX, Some(shader(vk::ShaderStageFlags::VERTEX, vec![])));
        ctx.bind_shader(vk::ShaderStageFlags::FRAGMENT, Some(shader(vk::ShaderStageFlags::FRAGMENT, vec![sampled])));
        ctx.set_viewports(&[viewport()]);
        ctx.bind_resource_buffer(0, input);
        ctx.draw(3, 1, 0, 0).unwrap();
        let list = ctx.end_recording();

        assert!(list.commands().iter().all(|c| !matches!(c, GfxCommand::PipelineBarrier(b) if b.memory.is_some())));
    }

    #[test]
    fn test_transient_target_keeps_contents_between_passes() {
        let (_device, mut ctx) = context();
        let desc =
            GfxImageDesc::new_2d(FORMAT, 1280, 720, vk::ImageUsageFlags::COLOR_ATTACHMENT, vk::ImageLayout::UNDEFINED);
        let memory = GfxMemory::new(0x3000_0000, vk::DeviceMemory::null(), 1280 * 720 * 4);
        let image = Rc::new(GfxImage::external(vk::Image::from_raw(20), desc, memory, "transient"));
        let view = GfxImageView::new(
            None,
            vk::ImageView::from_raw(21),
            image,
            GfxImageViewDesc::new_2d(FORMAT, vk::ImageAspectFlags::COLOR),
        );
        let constants = buffer(8, 64);

        ctx.begin_recording(GfxCommandList::new("split-pass"));
        ctx.bind_render_target(
            0,
            GfxAttachment::new(Rc::new(view), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
        ctx.bind_shader(vk::ShaderStageFlags::VERTEX, Some(shader(vk::ShaderStageFlags::VERTEX, vec![])));
        ctx.bind_shader(vk::ShaderStageFlags::FRAGMENT, Some(shader(vk::ShaderStageFlags::FRAGMENT, vec![])));
        ctx.set_viewports(&[viewport()]);
        ctx.draw(3, 1, 0, 0).unwrap();
        ctx.update_buffer(&constants, &[0u8; 16]);
        ctx.draw(3, 1, 0, 0).unwrap();
        let list = ctx.end_recording();

        assert_eq!(
            list.command_names(),
            [
                "BindPipeline",
                "PipelineBarrier",
                "BeginRendering",
                "SetViewports",
                "SetScissors",
                "Draw",
                "EndRendering",
                "UpdateBuffer",
                "PipelineBarrier",
                "BeginRendering",
                "Draw",
                "EndRendering",
            ]
        );
        // 只有第一次进入 render pass 时从 UNDEFINED 转换
        let discards = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                GfxCommand::PipelineBarrier(batch) => Some(batch),
                _ => None,
            })
            .flat_map(|batch| batch.images.iter())
            .filter(|b| b.old_layout == vk::ImageLayout::UNDEFINED)
            .count();
        assert_eq!(discards, 1);
    }

    #[test]
    fn test_independent_update_skips_barrier() {
        let (_device, mut ctx) = context();
        let a = buffer(3, 64);
        let b = buffer(4, 64);

        ctx.begin_recording(GfxCommandList::new("updates"));
        ctx.update_buffer(&a, &[0u8; 16]);
        ctx.update_buffer(&b, &[1u8; 16]);
        // 读取刚写入的 buffer 需要 barrier
        ctx.copy_buffer(&a, &b);
        let list = ctx.end_recording();

        assert_eq!(
            list.command_names(),
            ["UpdateBuffer", "UpdateBuffer", "PipelineBarrier", "CopyBuffer", "PipelineBarrier"]
        );
    }

    #[test]
    fn test_gpu_event_signaled_after_synchronize() {
        let (device, mut ctx) = context();
        let pool = GfxGpuEventPool::new(Arc::new(device.clone()));
        let event = pool.acquire();
        let mut queue = device.create_queue(GfxQueueKind::Graphics).unwrap();

        ctx.begin_recording(GfxCommandList::new("signal"));
        ctx.signal_gpu_event(&event, vk::PipelineStageFlags2::ALL_COMMANDS);
        queue.submit(GfxSubmission::new(ctx.end_recording())).unwrap();
        assert_eq!(event.test(), GfxGpuEventStatus::Unsignaled);

        queue.synchronize(None).unwrap();
        assert_eq!(event.test(), GfxGpuEventStatus::Signaled);

        ctx.begin_recording(GfxCommandList::new("reset"));
        ctx.reset_gpu_event(&event, vk::PipelineStageFlags2::ALL_COMMANDS);
        queue.submit(GfxSubmission::new(ctx.end_recording())).unwrap();
        queue.synchronize(None).unwrap();
        assert_eq!(event.test(), GfxGpuEventStatus::Unsignaled);
    }
}
