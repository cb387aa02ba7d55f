use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;

/// shader 访问的一个资源槽位
///
/// 槽位号直接作为 descriptor set 中的 binding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxResourceSlot {
    pub slot: u32,
    pub ty: vk::DescriptorType,
    /// 对于 image 类型的资源，shader 期望的 view 类型
    pub view: vk::ImageViewType,
    pub access: vk::AccessFlags2,
}

/// stage 之间的接口位置
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GfxInterfaceSlots {
    /// 输入 location 的位掩码
    pub input_slots: u32,
    /// 输出 location 的位掩码
    pub output_slots: u32,
    /// 立即数常量在 push constant 块中的偏移
    pub push_const_offset: u32,
    pub push_const_size: u32,
}

/// vertex shader 的顶点输入
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxVertexInput {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

pub struct GfxShaderCreateInfo {
    pub stage: vk::ShaderStageFlags,
    pub entry_point: String,
    /// SPIR-V 字节码
    pub code: Vec<u32>,
    pub resource_slots: Vec<GfxResourceSlot>,
    pub interface_slots: GfxInterfaceSlots,
    pub vertex_inputs: Vec<GfxVertexInput>,
    pub immediate_constants: Option<Vec<u8>>,
}

static NEXT_SHADER_COOKIE: AtomicU64 = AtomicU64::new(1);

/// shader 编译器产出的 shader 对象
///
/// 创建之后不可变。`cookie` 在进程内唯一，pipeline 缓存使用它作为 shader 的身份。
#[derive(Debug)]
pub struct GfxShader {
    cookie: u64,
    stage: vk::ShaderStageFlags,
    entry_point: String,
    code: Vec<u32>,
    resource_slots: Vec<GfxResourceSlot>,
    interface_slots: GfxInterfaceSlots,
    vertex_inputs: Vec<GfxVertexInput>,
    immediate_constants: Option<Vec<u8>>,
}
impl GfxShader {
    pub fn new(info: GfxShaderCreateInfo) -> Self {
        Self {
            cookie: NEXT_SHADER_COOKIE.fetch_add(1, Ordering::Relaxed),
            stage: info.stage,
            entry_point: info.entry_point,
            code: info.code,
            resource_slots: info.resource_slots,
            interface_slots: info.interface_slots,
            vertex_inputs: info.vertex_inputs,
            immediate_constants: info.immediate_constants,
        }
    }
}
// getters
impl GfxShader {
    #[inline]
    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    #[inline]
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    #[inline]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    #[inline]
    pub fn code(&self) -> &[u32] {
        &self.code
    }

    #[inline]
    pub fn resource_slots(&self) -> &[GfxResourceSlot] {
        &self.resource_slots
    }

    #[inline]
    pub fn interface_slots(&self) -> &GfxInterfaceSlots {
        &self.interface_slots
    }

    #[inline]
    pub fn vertex_inputs(&self) -> &[GfxVertexInput] {
        &self.vertex_inputs
    }

    #[inline]
    pub fn immediate_constants(&self) -> Option<&[u8]> {
        self.immediate_constants.as_deref()
    }
}
