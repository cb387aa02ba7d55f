use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use itertools::Itertools;

use crate::foundation::ash_queue::AshHostQueue;
use crate::foundation::host::{GfxOwnedObject, GfxQueueKind, HostDevice, HostQueue};
use crate::pipelines::graphics_pipeline::GfxGraphicsPipelineDesc;
use crate::pipelines::pipeline_layout::{GfxPipelineLayout, GfxPipelineLayoutDesc};
use crate::pipelines::shader::GfxShader;
use crate::resources::image::format_aspect;
use crate::{GfxError, GfxResult};

/// 已经创建好的 vulkan queue
#[derive(Clone, Copy, Debug)]
pub struct AshQueueInfo {
    pub family_index: u32,
    pub queue: vk::Queue,
}

pub(crate) struct AshDeviceShared {
    pub(crate) device: ash::Device,
    pub(crate) push_descriptor: ash::khr::push_descriptor::Device,
    pub(crate) graphics: AshQueueInfo,
    pub(crate) compute: AshQueueInfo,
}

/// 基于 ash 的宿主设备
///
/// instance 和 device 由外部创建并管理生命周期，这里不负责销毁。
/// device 需要开启 vulkan 1.3 的 synchronization2、dynamic rendering 以及 VK_KHR_push_descriptor。
#[derive(Clone)]
pub struct AshHostDevice {
    shared: Arc<AshDeviceShared>,
}
impl AshHostDevice {
    pub fn new(instance: &ash::Instance, device: ash::Device, graphics: AshQueueInfo, compute: AshQueueInfo) -> Self {
        let push_descriptor = ash::khr::push_descriptor::Device::new(instance, &device);
        log::info!(
            "ash host device: graphics family {}, compute family {}",
            graphics.family_index,
            compute.family_index
        );
        Self {
            shared: Arc::new(AshDeviceShared {
                device,
                push_descriptor,
                graphics,
                compute,
            }),
        }
    }

    #[inline]
    pub fn device(&self) -> &ash::Device {
        &self.shared.device
    }
}

/// pipeline 创建期间临时使用的 shader module，离开作用域时统一销毁
struct AshShaderModules<'a> {
    device: &'a ash::Device,
    modules: Vec<vk::ShaderModule>,
}
impl<'a> AshShaderModules<'a> {
    fn new(device: &'a ash::Device) -> Self {
        Self {
            device,
            modules: Vec::new(),
        }
    }

    fn create(&mut self, shader: &GfxShader) -> GfxResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::default().code(shader.code());
        let module = unsafe { self.device.create_shader_module(&info, None) }.map_err(GfxError::from_vk)?;
        self.modules.push(module);
        Ok(module)
    }
}
impl Drop for AshShaderModules<'_> {
    fn drop(&mut self) {
        for module in self.modules.drain(..) {
            unsafe { self.device.destroy_shader_module(module, None) };
        }
    }
}

fn entry_point_name(shader: &GfxShader) -> GfxResult<CString> {
    CString::new(shader.entry_point()).map_err(|_| GfxError::InvalidShaderEntryPoint(shader.entry_point().to_string()))
}

impl HostDevice for AshHostDevice {
    fn create_event(&self) -> GfxResult<vk::Event> {
        unsafe { self.shared.device.create_event(&vk::EventCreateInfo::default(), None) }.map_err(GfxError::from_vk)
    }

    fn destroy_event(&self, event: vk::Event) {
        unsafe { self.shared.device.destroy_event(event, None) }
    }

    fn event_status(&self, event: vk::Event) -> GfxResult<bool> {
        unsafe { self.shared.device.get_event_status(event) }.map_err(GfxError::from_vk)
    }

    fn set_event(&self, event: vk::Event) -> GfxResult<()> {
        unsafe { self.shared.device.set_event(event) }.map_err(GfxError::from_vk)
    }

    fn reset_event(&self, event: vk::Event) -> GfxResult<()> {
        unsafe { self.shared.device.reset_event(event) }.map_err(GfxError::from_vk)
    }

    fn create_pipeline_layout(&self, desc: &GfxPipelineLayoutDesc) -> GfxResult<GfxPipelineLayout> {
        let device = &self.shared.device;
        let bindings = desc
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.ty)
                    .descriptor_count(1)
                    .stage_flags(b.stages)
            })
            .collect_vec();
        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR)
            .bindings(&bindings);
        let set_layout =
            unsafe { device.create_descriptor_set_layout(&set_layout_info, None) }.map_err(GfxError::from_vk)?;

        let push_constant_ranges = if desc.push_constant_size > 0 {
            vec![vk::PushConstantRange {
                stage_flags: desc.push_constant_stages,
                offset: 0,
                size: desc.push_constant_size,
            }]
        } else {
            vec![]
        };
        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        match unsafe { device.create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => Ok(GfxPipelineLayout { set_layout, layout }),
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
                Err(GfxError::from_vk(e))
            }
        }
    }

    fn destroy_pipeline_layout(&self, layout: GfxPipelineLayout) {
        unsafe {
            self.shared.device.destroy_pipeline_layout(layout.layout, None);
            self.shared.device.destroy_descriptor_set_layout(layout.set_layout, None);
        }
    }

    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc<'_>) -> GfxResult<vk::Pipeline> {
        let device = &self.shared.device;
        let state = desc.state;
        let shaders = desc.shaders.iter().collect_vec();

        let names = shaders.iter().map(|s| entry_point_name(s)).collect::<GfxResult<Vec<_>>>()?;
        let mut modules = AshShaderModules::new(device);
        let stages = shaders
            .iter()
            .zip(&names)
            .map(|(shader, name)| {
                Ok(vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader.stage())
                    .module(modules.create(shader)?)
                    .name(name))
            })
            .collect::<GfxResult<Vec<_>>>()?;

        // 顶点输入：stride 来自绑定状态，attribute 来自 vertex shader
        let vertex_bindings = state
            .vertex_bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect_vec();
        let vertex_attributes = desc
            .shaders
            .vs
            .iter()
            .flat_map(|vs| vs.vertex_inputs())
            .map(|input| vk::VertexInputAttributeDescription {
                location: input.location,
                binding: input.binding,
                format: input.format,
                offset: input.offset,
            })
            .collect_vec();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(state.input_assembly.topology)
            .primitive_restart_enable(state.input_assembly.primitive_restart);

        // viewport 和 scissor 的数量也是动态的
        let viewport_info = vk::PipelineViewportStateCreateInfo::default();

        let rasterize_info = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(state.rasterizer.polygon_mode)
            .cull_mode(state.rasterizer.cull_mode)
            .front_face(state.rasterizer.front_face)
            .line_width(1.0);

        let msaa_info =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_info = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(state.depth_stencil.depth_test)
            .depth_write_enable(state.depth_stencil.depth_write)
            .depth_compare_op(state.depth_stencil.compare_op);

        let color_count = state.color_attachment_count();
        let blend_states = vec![
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(false)
                .color_write_mask(vk::ColorComponentFlags::RGBA);
            color_count
        ];
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_states);

        let dynamic_states = [vk::DynamicState::VIEWPORT_WITH_COUNT, vk::DynamicState::SCISSOR_WITH_COUNT];
        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // dynamic rendering 需要的 framebuffer 信息
        let stencil_format = if format_aspect(state.depth_format).contains(vk::ImageAspectFlags::STENCIL) {
            state.depth_format
        } else {
            vk::Format::UNDEFINED
        };
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&state.color_formats[..color_count])
            .depth_attachment_format(state.depth_format)
            .stencil_attachment_format(stencil_format);

        let tessellation_info = vk::PipelineTessellationStateCreateInfo::default().patch_control_points(3);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&rasterize_info)
            .multisample_state(&msaa_info)
            .depth_stencil_state(&depth_stencil_info)
            .color_blend_state(&color_blend_info)
            .dynamic_state(&dynamic_info)
            .layout(desc.layout)
            .push_next(&mut rendering_info);
        if desc.shaders.tcs.is_some() {
            pipeline_info = pipeline_info.tessellation_state(&tessellation_info);
        }

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        }
        .map_err(|(_, e)| GfxError::from_vk(e))?;
        pipelines.into_iter().next().ok_or(GfxError::Vk(vk::Result::ERROR_UNKNOWN))
    }

    fn create_compute_pipeline(&self, shader: &GfxShader, layout: vk::PipelineLayout) -> GfxResult<vk::Pipeline> {
        let device = &self.shared.device;
        let name = entry_point_name(shader)?;
        let mut modules = AshShaderModules::new(device);
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(modules.create(shader)?)
            .name(&name);
        let pipeline_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout);

        let pipelines = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        }
        .map_err(|(_, e)| GfxError::from_vk(e))?;
        pipelines.into_iter().next().ok_or(GfxError::Vk(vk::Result::ERROR_UNKNOWN))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.shared.device.destroy_pipeline(pipeline, None) }
    }

    fn destroy_object(&self, object: GfxOwnedObject) {
        let device = &self.shared.device;
        unsafe {
            match object {
                GfxOwnedObject::Buffer(buffer) => device.destroy_buffer(buffer, None),
                GfxOwnedObject::BufferView(view) => device.destroy_buffer_view(view, None),
                GfxOwnedObject::Image(image) => device.destroy_image(image, None),
                GfxOwnedObject::ImageView(view) => device.destroy_image_view(view, None),
                GfxOwnedObject::Sampler(sampler) => device.destroy_sampler(sampler, None),
            }
        }
    }

    fn create_queue(&self, kind: GfxQueueKind) -> GfxResult<Box<dyn HostQueue>> {
        let info = match kind {
            GfxQueueKind::Graphics => self.shared.graphics,
            GfxQueueKind::Compute => self.shared.compute,
        };
        Ok(Box::new(AshHostQueue::new(self.shared.clone(), kind, info)?))
    }
}
