use ash::vk;
use itertools::Itertools;

use crate::pipelines::shader::GfxShader;
use crate::{GfxError, GfxResult};

/// descriptor set 中的一个 binding，由各个 stage 的资源槽位合并而来
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxLayoutBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
    /// 各个 stage 对该槽位访问方式的并集
    pub access: vk::AccessFlags2,
}

/// pipeline layout 的描述
///
/// 只使用一个 push descriptor set，binding 号等于 shader 的资源槽位号；
/// shader 的立即数常量放在一个覆盖所有 stage 的 push constant 区间中
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxPipelineLayoutDesc {
    pub bindings: Vec<GfxLayoutBinding>,
    pub push_constant_size: u32,
    pub push_constant_stages: vk::ShaderStageFlags,
}
impl GfxPipelineLayoutDesc {
    /// 合并多个 shader 的资源槽位
    ///
    /// 同一个槽位在不同 stage 中的 descriptor 类型必须一致
    pub fn from_shaders<'a>(shaders: impl IntoIterator<Item = &'a GfxShader>) -> GfxResult<Self> {
        let mut desc = Self::default();
        for shader in shaders {
            for slot in shader.resource_slots() {
                match desc.bindings.iter_mut().find(|b| b.binding == slot.slot) {
                    Some(binding) if binding.ty != slot.ty => {
                        return Err(GfxError::InvalidPipeline(format!(
                            "slot {} declared as {:?} and {:?}",
                            slot.slot, binding.ty, slot.ty
                        )));
                    }
                    Some(binding) => {
                        binding.stages |= shader.stage();
                        binding.access |= slot.access;
                    }
                    None => desc.bindings.push(GfxLayoutBinding {
                        binding: slot.slot,
                        ty: slot.ty,
                        stages: shader.stage(),
                        access: slot.access,
                    }),
                }
            }

            if let Some(data) = shader.immediate_constants() {
                let iface = shader.interface_slots();
                let end = iface.push_const_offset + data.len() as u32;
                desc.push_constant_size = desc.push_constant_size.max(end);
                desc.push_constant_stages |= shader.stage();
            }
        }
        desc.bindings = desc.bindings.into_iter().sorted_by_key(|b| b.binding).collect();
        Ok(desc)
    }

    /// 通过资源槽位写内存的 stage
    pub fn write_stages(&self) -> vk::ShaderStageFlags {
        let write = vk::AccessFlags2::SHADER_WRITE | vk::AccessFlags2::SHADER_STORAGE_WRITE;
        self.bindings
            .iter()
            .filter(|b| b.access.intersects(write))
            .fold(vk::ShaderStageFlags::empty(), |stages, b| stages | b.stages)
    }

    /// 某个 binding 的 descriptor 类型
    pub fn binding_type(&self, binding: u32) -> Option<vk::DescriptorType> {
        self.bindings.iter().find(|b| b.binding == binding).map(|b| b.ty)
    }
}

/// 由宿主设备创建的 layout 句柄
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxPipelineLayout {
    pub set_layout: vk::DescriptorSetLayout,
    pub layout: vk::PipelineLayout,
}
