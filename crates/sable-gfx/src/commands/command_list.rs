use std::any::Any;
use std::rc::Rc;

use ash::vk;

use crate::commands::barrier::GfxBarrierBatch;

/// push descriptor 写入的内容
#[derive(Clone, Copy, Debug)]
pub enum GfxDescriptorInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
    TexelBuffer(vk::BufferView),
}

#[derive(Clone, Copy, Debug)]
pub struct GfxDescriptorWrite {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub info: GfxDescriptorInfo,
}

/// dynamic rendering 的一个 attachment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxRenderingAttachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

/// 软件命令
///
/// 上下文只产出这些命令，由宿主队列在提交时回放到真正的 `vk::CommandBuffer` 中
#[derive(Clone, Debug)]
pub enum GfxCommand {
    PipelineBarrier(GfxBarrierBatch),
    BeginRendering {
        render_area: vk::Rect2D,
        color: Vec<Option<GfxRenderingAttachment>>,
        depth: Option<GfxRenderingAttachment>,
    },
    EndRendering,
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    SetViewports(Vec<vk::Viewport>),
    SetScissors(Vec<vk::Rect2D>),
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<vk::DeviceSize>,
    },
    PushDescriptors {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        writes: Vec<GfxDescriptorWrite>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    },
    Dispatch {
        group_count: glam::UVec3,
    },
    DispatchIndirect {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<vk::BufferCopy>,
    },
    UpdateBuffer {
        dst: vk::Buffer,
        offset: vk::DeviceSize,
        data: Vec<u8>,
    },
    SetEvent {
        event: vk::Event,
        stage: vk::PipelineStageFlags2,
    },
    ResetEvent {
        event: vk::Event,
        stage: vk::PipelineStageFlags2,
    },
}
impl GfxCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PipelineBarrier(_) => "PipelineBarrier",
            Self::BeginRendering { .. } => "BeginRendering",
            Self::EndRendering => "EndRendering",
            Self::BindPipeline { .. } => "BindPipeline",
            Self::SetViewports(_) => "SetViewports",
            Self::SetScissors(_) => "SetScissors",
            Self::BindIndexBuffer { .. } => "BindIndexBuffer",
            Self::BindVertexBuffers { .. } => "BindVertexBuffers",
            Self::PushDescriptors { .. } => "PushDescriptors",
            Self::PushConstants { .. } => "PushConstants",
            Self::Draw { .. } => "Draw",
            Self::DrawIndexed { .. } => "DrawIndexed",
            Self::DrawIndirect { .. } => "DrawIndirect",
            Self::DrawIndexedIndirect { .. } => "DrawIndexedIndirect",
            Self::Dispatch { .. } => "Dispatch",
            Self::DispatchIndirect { .. } => "DispatchIndirect",
            Self::CopyBuffer { .. } => "CopyBuffer",
            Self::UpdateBuffer { .. } => "UpdateBuffer",
            Self::SetEvent { .. } => "SetEvent",
            Self::ResetEvent { .. } => "ResetEvent",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxCommandListStats {
    pub draws: u32,
    pub dispatches: u32,
    pub barriers: u32,
    pub transfers: u32,
}

/// 一次录制产出的命令序列
///
/// 同时持有命令引用到的所有资源，直到宿主队列确认执行完成后才释放
pub struct GfxCommandList {
    label: String,
    commands: Vec<GfxCommand>,
    objects: Vec<Rc<dyn Any>>,
    stats: GfxCommandListStats,
}
impl GfxCommandList {
    pub fn new(label: impl AsRef<str>) -> Self {
        Self {
            label: label.as_ref().to_string(),
            commands: Vec::new(),
            objects: Vec::new(),
            stats: GfxCommandListStats::default(),
        }
    }

    pub fn push(&mut self, command: GfxCommand) {
        match &command {
            GfxCommand::Draw { .. }
            | GfxCommand::DrawIndexed { .. }
            | GfxCommand::DrawIndirect { .. }
            | GfxCommand::DrawIndexedIndirect { .. } => self.stats.draws += 1,
            GfxCommand::Dispatch { .. } | GfxCommand::DispatchIndirect { .. } => self.stats.dispatches += 1,
            GfxCommand::PipelineBarrier(_) => self.stats.barriers += 1,
            GfxCommand::CopyBuffer { .. } | GfxCommand::UpdateBuffer { .. } => self.stats.transfers += 1,
            _ => {}
        }
        self.commands.push(command);
    }

    /// 让命令列表持有一个对象，保证它活到命令执行完成
    pub fn track_object<T: 'static>(&mut self, object: Rc<T>) {
        self.objects.push(object);
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn commands(&self) -> &[GfxCommand] {
        &self.commands
    }

    #[inline]
    pub fn tracked_object_count(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn stats(&self) -> GfxCommandListStats {
        self.stats
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// 各条命令的名字，主要用于日志和测试
    pub fn command_names(&self) -> Vec<&'static str> {
        self.commands.iter().map(GfxCommand::name).collect()
    }
}
impl std::fmt::Debug for GfxCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfxCommandList")
            .field("label", &self.label)
            .field("commands", &self.commands.len())
            .field("objects", &self.objects.len())
            .field("stats", &self.stats)
            .finish()
    }
}
