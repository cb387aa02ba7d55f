use std::time::Duration;

use ash::vk;

use crate::commands::submission::GfxSubmission;
use crate::pipelines::graphics_pipeline::GfxGraphicsPipelineDesc;
use crate::pipelines::pipeline_layout::{GfxPipelineLayout, GfxPipelineLayoutDesc};
use crate::pipelines::shader::GfxShader;
use crate::GfxResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxQueueKind {
    Graphics,
    Compute,
}

/// 由宿主设备销毁的资源句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfxOwnedObject {
    Buffer(vk::Buffer),
    BufferView(vk::BufferView),
    Image(vk::Image),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
}

/// 翻译层之下的显式 API 设备
///
/// 资源的创建在这一层之外完成，这里只负责翻译层自己需要的对象：
/// event、pipeline layout、pipeline 以及队列。
pub trait HostDevice: Send + Sync {
    fn create_event(&self) -> GfxResult<vk::Event>;
    fn destroy_event(&self, event: vk::Event);
    /// `Ok(true)` 表示 event 处于 set 状态
    fn event_status(&self, event: vk::Event) -> GfxResult<bool>;
    fn set_event(&self, event: vk::Event) -> GfxResult<()>;
    fn reset_event(&self, event: vk::Event) -> GfxResult<()>;

    fn create_pipeline_layout(&self, desc: &GfxPipelineLayoutDesc) -> GfxResult<GfxPipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: GfxPipelineLayout);
    fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc<'_>) -> GfxResult<vk::Pipeline>;
    fn create_compute_pipeline(&self, shader: &GfxShader, layout: vk::PipelineLayout) -> GfxResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn destroy_object(&self, object: GfxOwnedObject);

    fn create_queue(&self, kind: GfxQueueKind) -> GfxResult<Box<dyn HostQueue>>;
}

/// 宿主队列
///
/// 提交之后命令列表由队列持有，`synchronize` 返回时所有已提交的工作都已完成并被释放
pub trait HostQueue {
    fn kind(&self) -> GfxQueueKind;

    fn submit(&mut self, submission: GfxSubmission) -> GfxResult<()>;

    /// 等待所有已提交的工作完成，`timeout` 为 None 时无限等待
    fn synchronize(&mut self, timeout: Option<Duration>) -> GfxResult<()>;
}
