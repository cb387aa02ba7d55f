use std::collections::BTreeMap;
use std::rc::Rc;

use ash::vk;
use bitflags::bitflags;

use crate::pipelines::compute_pipeline::GfxComputePipeline;
use crate::pipelines::graphics_pipeline::{GfxGraphicsPipeline, GfxGraphicsPipelineShaders};
use crate::pipelines::shader::GfxShader;
use crate::pipelines::state::{GfxGraphicsPipelineState, MAX_RENDER_TARGETS, MAX_VERTEX_BINDINGS};
use crate::resources::buffer::{GfxBufferSlice, GfxBufferView};
use crate::resources::image::GfxImageView;
use crate::resources::sampler::GfxSampler;

bitflags! {
    /// 上下文中尚未写入命令列表的状态
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GfxContextFlags: u32 {
        /// 绑定的 shader 组合变化，需要重新查找 pipeline
        const GP_DIRTY_PIPELINE       = 1 << 0;
        /// 固定功能状态变化，需要重新选择 pipeline variant
        const GP_DIRTY_PIPELINE_STATE = 1 << 1;
        const GP_DIRTY_FRAMEBUFFER    = 1 << 2;
        const GP_DIRTY_VIEWPORTS      = 1 << 3;
        const GP_DIRTY_SCISSORS       = 1 << 4;
        const GP_DIRTY_INDEX_BUFFER   = 1 << 5;
        const GP_DIRTY_VERTEX_BUFFERS = 1 << 6;
        const GP_DIRTY_RESOURCES      = 1 << 7;
        const GP_DIRTY_CONSTANTS      = 1 << 8;
        /// dynamic rendering 正在进行中
        const GP_RENDERING_ACTIVE     = 1 << 9;

        const CP_DIRTY_PIPELINE       = 1 << 16;
        const CP_DIRTY_RESOURCES      = 1 << 17;
        const CP_DIRTY_CONSTANTS      = 1 << 18;

        const GP_DIRTY_ALL = Self::GP_DIRTY_PIPELINE.bits()
            | Self::GP_DIRTY_PIPELINE_STATE.bits()
            | Self::GP_DIRTY_FRAMEBUFFER.bits()
            | Self::GP_DIRTY_VIEWPORTS.bits()
            | Self::GP_DIRTY_SCISSORS.bits()
            | Self::GP_DIRTY_INDEX_BUFFER.bits()
            | Self::GP_DIRTY_VERTEX_BUFFERS.bits()
            | Self::GP_DIRTY_RESOURCES.bits()
            | Self::GP_DIRTY_CONSTANTS.bits();
        const CP_DIRTY_ALL = Self::CP_DIRTY_PIPELINE.bits()
            | Self::CP_DIRTY_RESOURCES.bits()
            | Self::CP_DIRTY_CONSTANTS.bits();
    }
}

/// 绑定为 render target 的 image view
///
/// `layout` 是渲染期间使用的 layout，image 平时保持在 `GfxImageDesc::layout`
#[derive(Clone)]
pub struct GfxAttachment {
    pub view: Rc<GfxImageView>,
    pub layout: vk::ImageLayout,
}
impl GfxAttachment {
    pub fn new(view: Rc<GfxImageView>, layout: vk::ImageLayout) -> Self {
        Self { view, layout }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.view.desc().format
    }
}

/// 资源槽位上绑定的对象
#[derive(Clone)]
pub enum GfxResourceBinding {
    Buffer(GfxBufferSlice),
    BufferView(Rc<GfxBufferView>),
    Image(Rc<GfxImageView>),
    Sampler(Rc<GfxSampler>),
}
impl GfxResourceBinding {
    /// 能否写入该类型的 descriptor
    pub fn is_compatible(&self, ty: vk::DescriptorType) -> bool {
        match self {
            Self::Buffer(_) => matches!(ty, vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::STORAGE_BUFFER),
            Self::BufferView(_) => matches!(
                ty,
                vk::DescriptorType::UNIFORM_TEXEL_BUFFER | vk::DescriptorType::STORAGE_TEXEL_BUFFER
            ),
            Self::Image(_) => matches!(ty, vk::DescriptorType::SAMPLED_IMAGE | vk::DescriptorType::STORAGE_IMAGE),
            Self::Sampler(_) => ty == vk::DescriptorType::SAMPLER,
        }
    }
}

/// 上下文累积的全部绑定状态
pub struct GfxContextState {
    pub gp_shaders: GfxGraphicsPipelineShaders,
    pub gp_state: GfxGraphicsPipelineState,
    pub gp_pipeline: Option<Rc<GfxGraphicsPipeline>>,

    pub cp_shader: Option<Rc<GfxShader>>,
    pub cp_pipeline: Option<Rc<GfxComputePipeline>>,

    pub color_targets: [Option<GfxAttachment>; MAX_RENDER_TARGETS],
    pub depth_target: Option<GfxAttachment>,

    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,

    pub index_buffer: Option<(GfxBufferSlice, vk::IndexType)>,
    pub vertex_buffers: [Option<GfxBufferSlice>; MAX_VERTEX_BINDINGS],
    /// indirect draw / dispatch 的参数 buffer
    pub draw_buffer: Option<GfxBufferSlice>,

    /// 槽位号 -> 资源，graphics 和 compute 共享
    pub resources: BTreeMap<u32, GfxResourceBinding>,
}
impl Default for GfxContextState {
    fn default() -> Self {
        Self {
            gp_shaders: Default::default(),
            gp_state: Default::default(),
            gp_pipeline: None,
            cp_shader: None,
            cp_pipeline: None,
            color_targets: std::array::from_fn(|_| None),
            depth_target: None,
            viewports: Vec::new(),
            scissors: Vec::new(),
            index_buffer: None,
            vertex_buffers: std::array::from_fn(|_| None),
            draw_buffer: None,
            resources: BTreeMap::new(),
        }
    }
}
impl GfxContextState {
    /// 所有已绑定的 attachment，color 在前
    pub fn attachments(&self) -> impl Iterator<Item = &GfxAttachment> {
        self.color_targets.iter().flatten().chain(self.depth_target.iter())
    }
}
