use ash::vk;

/// 最多同时绑定的 color attachment 数量
pub const MAX_RENDER_TARGETS: usize = 8;
/// 最多同时绑定的 vertex buffer 数量
pub const MAX_VERTEX_BINDINGS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxInputAssemblyState {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
}
impl Default for GfxInputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxRasterizerState {
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}
impl Default for GfxRasterizerState {
    fn default() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxDepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare_op: vk::CompareOp,
}
impl Default for GfxDepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            compare_op: vk::CompareOp::ALWAYS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GfxVertexBindingState {
    pub binding: u32,
    pub stride: u32,
}

/// 除 shader 以外决定一个 pipeline variant 的全部固定功能状态
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxGraphicsPipelineState {
    pub input_assembly: GfxInputAssemblyState,
    pub rasterizer: GfxRasterizerState,
    pub depth_stencil: GfxDepthStencilState,
    /// 未绑定的槽位为 `vk::Format::UNDEFINED`
    pub color_formats: [vk::Format; MAX_RENDER_TARGETS],
    pub depth_format: vk::Format,
    pub vertex_bindings: Vec<GfxVertexBindingState>,
}
impl Default for GfxGraphicsPipelineState {
    fn default() -> Self {
        Self {
            input_assembly: Default::default(),
            rasterizer: Default::default(),
            depth_stencil: Default::default(),
            color_formats: [vk::Format::UNDEFINED; MAX_RENDER_TARGETS],
            depth_format: vk::Format::UNDEFINED,
            vertex_bindings: Vec::new(),
        }
    }
}
impl GfxGraphicsPipelineState {
    /// 实际使用的 color attachment 数量（最后一个已绑定槽位 + 1）
    pub fn color_attachment_count(&self) -> usize {
        self.color_formats.iter().rposition(|f| *f != vk::Format::UNDEFINED).map_or(0, |i| i + 1)
    }
}
