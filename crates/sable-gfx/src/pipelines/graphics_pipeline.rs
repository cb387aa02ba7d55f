use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::foundation::host::HostDevice;
use crate::pipelines::pipeline_layout::{GfxPipelineLayout, GfxPipelineLayoutDesc};
use crate::pipelines::shader::GfxShader;
use crate::pipelines::state::GfxGraphicsPipelineState;
use crate::{GfxError, GfxResult};

/// 组成一个 graphics pipeline 的 shader 组合，同时也是 pipeline 查找缓存的 key
///
/// 相等性和哈希只看 shader 的 cookie
#[derive(Clone, Default, Debug)]
pub struct GfxGraphicsPipelineShaders {
    pub vs: Option<Rc<GfxShader>>,
    pub tcs: Option<Rc<GfxShader>>,
    pub tes: Option<Rc<GfxShader>>,
    pub gs: Option<Rc<GfxShader>>,
    pub fs: Option<Rc<GfxShader>>,
}
impl GfxGraphicsPipelineShaders {
    fn cookies(&self) -> [u64; 5] {
        [&self.vs, &self.tcs, &self.tes, &self.gs, &self.fs].map(|s| s.as_ref().map_or(0, |s| s.cookie()))
    }

    /// 按 stage 顺序遍历已绑定的 shader
    pub fn iter(&self) -> impl Iterator<Item = &Rc<GfxShader>> {
        [&self.vs, &self.tcs, &self.tes, &self.gs, &self.fs].into_iter().flatten()
    }

    /// 检查这个组合能否构成 pipeline
    pub fn validate(&self) -> GfxResult<()> {
        if self.vs.is_none() {
            return Err(GfxError::InvalidPipeline("no vertex shader bound".to_string()));
        }
        if self.tcs.is_some() != self.tes.is_some() {
            return Err(GfxError::InvalidPipeline(
                "tessellation needs both control and evaluation shaders".to_string(),
            ));
        }

        let expected = [
            (&self.vs, vk::ShaderStageFlags::VERTEX),
            (&self.tcs, vk::ShaderStageFlags::TESSELLATION_CONTROL),
            (&self.tes, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
            (&self.gs, vk::ShaderStageFlags::GEOMETRY),
            (&self.fs, vk::ShaderStageFlags::FRAGMENT),
        ];
        for (shader, stage) in expected {
            let Some(shader) = shader else { continue };
            if shader.stage() != stage {
                return Err(GfxError::InvalidPipeline(format!(
                    "shader {} bound as {:?} but compiled for {:?}",
                    shader.cookie(),
                    stage,
                    shader.stage()
                )));
            }
        }
        for shader in self.iter() {
            if shader.entry_point().is_empty() {
                return Err(GfxError::InvalidShaderEntryPoint(shader.entry_point().to_string()));
            }
        }
        Ok(())
    }
}
impl PartialEq for GfxGraphicsPipelineShaders {
    fn eq(&self, other: &Self) -> bool {
        self.cookies() == other.cookies()
    }
}
impl Eq for GfxGraphicsPipelineShaders {}
impl Hash for GfxGraphicsPipelineShaders {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cookies().hash(state);
    }
}

/// 宿主设备创建 graphics pipeline 需要的全部信息
pub struct GfxGraphicsPipelineDesc<'a> {
    pub shaders: &'a GfxGraphicsPipelineShaders,
    pub layout: vk::PipelineLayout,
    pub state: &'a GfxGraphicsPipelineState,
}

/// 一组 shader 对应的 pipeline 对象
///
/// 固定功能状态不同时会产生不同的 variant，variant 在第一次使用时创建
pub struct GfxGraphicsPipeline {
    device: Arc<dyn HostDevice>,
    shaders: GfxGraphicsPipelineShaders,
    layout_desc: GfxPipelineLayoutDesc,
    layout: GfxPipelineLayout,
    variants: RefCell<Vec<(GfxGraphicsPipelineState, vk::Pipeline)>>,
}
impl GfxGraphicsPipeline {
    pub fn new(device: Arc<dyn HostDevice>, shaders: GfxGraphicsPipelineShaders) -> GfxResult<Self> {
        shaders.validate()?;
        let layout_desc = GfxPipelineLayoutDesc::from_shaders(shaders.iter().map(|s| s.as_ref()))?;
        let layout = device.create_pipeline_layout(&layout_desc)?;
        Ok(Self {
            device,
            shaders,
            layout_desc,
            layout,
            variants: RefCell::new(Vec::new()),
        })
    }

    /// 找到或创建与 `state` 匹配的 variant
    pub fn get_pipeline_handle(&self, state: &GfxGraphicsPipelineState) -> GfxResult<vk::Pipeline> {
        if let Some((_, handle)) = self.variants.borrow().iter().find(|(s, _)| s == state) {
            return Ok(*handle);
        }

        let handle = self.device.create_graphics_pipeline(&GfxGraphicsPipelineDesc {
            shaders: &self.shaders,
            layout: self.layout.layout,
            state,
        })?;
        log::debug!(
            "graphics pipeline variant #{} created: {:?}",
            self.variants.borrow().len(),
            self.shaders.cookies()
        );
        self.variants.borrow_mut().push((state.clone(), handle));
        Ok(handle)
    }

    #[inline]
    pub fn shaders(&self) -> &GfxGraphicsPipelineShaders {
        &self.shaders
    }

    #[inline]
    pub fn layout_desc(&self) -> &GfxPipelineLayoutDesc {
        &self.layout_desc
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.layout
    }

    #[inline]
    pub fn variant_count(&self) -> usize {
        self.variants.borrow().len()
    }
}
impl Drop for GfxGraphicsPipeline {
    fn drop(&mut self) {
        for (_, handle) in self.variants.get_mut().drain(..) {
            self.device.destroy_pipeline(handle);
        }
        self.device.destroy_pipeline_layout(self.layout);
    }
}
