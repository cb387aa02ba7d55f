use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::foundation::host::HostDevice;
use crate::pipelines::pipeline_layout::{GfxPipelineLayout, GfxPipelineLayoutDesc};
use crate::pipelines::shader::GfxShader;
use crate::{GfxError, GfxResult};

pub struct GfxComputePipeline {
    device: Arc<dyn HostDevice>,
    shader: Rc<GfxShader>,
    layout_desc: GfxPipelineLayoutDesc,
    layout: GfxPipelineLayout,
    handle: vk::Pipeline,
}
impl GfxComputePipeline {
    pub fn new(device: Arc<dyn HostDevice>, shader: Rc<GfxShader>) -> GfxResult<Self> {
        if shader.stage() != vk::ShaderStageFlags::COMPUTE {
            return Err(GfxError::InvalidPipeline(format!(
                "shader {} is not a compute shader: {:?}",
                shader.cookie(),
                shader.stage()
            )));
        }
        if shader.entry_point().is_empty() {
            return Err(GfxError::InvalidShaderEntryPoint(String::new()));
        }

        let layout_desc = GfxPipelineLayoutDesc::from_shaders([shader.as_ref()])?;
        let layout = device.create_pipeline_layout(&layout_desc)?;
        let handle = match device.create_compute_pipeline(&shader, layout.layout) {
            Ok(handle) => handle,
            Err(e) => {
                device.destroy_pipeline_layout(layout);
                return Err(e);
            }
        };
        log::debug!("compute pipeline created for shader {}", shader.cookie());

        Ok(Self {
            device,
            shader,
            layout_desc,
            layout,
            handle,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.layout
    }

    #[inline]
    pub fn layout_desc(&self) -> &GfxPipelineLayoutDesc {
        &self.layout_desc
    }

    #[inline]
    pub fn shader(&self) -> &Rc<GfxShader> {
        &self.shader
    }
}
impl Drop for GfxComputePipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.handle);
        self.device.destroy_pipeline_layout(self.layout);
    }
}
