use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use ash::vk;
use ash::vk::Handle;

use crate::commands::command_list::{GfxCommand, GfxCommandList, GfxCommandListStats};
use crate::commands::submission::GfxSubmission;
use crate::foundation::host::{GfxOwnedObject, GfxQueueKind, HostDevice, HostQueue};
use crate::pipelines::graphics_pipeline::GfxGraphicsPipelineDesc;
use crate::pipelines::pipeline_layout::{GfxPipelineLayout, GfxPipelineLayoutDesc};
use crate::pipelines::shader::GfxShader;
use crate::{GfxError, GfxResult};

/// null 设备记录下来的一次调用
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NullDeviceEvent {
    EventCreated(vk::Event),
    EventDestroyed(vk::Event),
    PipelineLayoutCreated(vk::PipelineLayout),
    PipelineLayoutDestroyed(vk::PipelineLayout),
    GraphicsPipelineCreated(vk::Pipeline),
    ComputePipelineCreated(vk::Pipeline),
    PipelineDestroyed(vk::Pipeline),
    ObjectDestroyed(GfxOwnedObject),
    QueueCreated(GfxQueueKind),
    Submitted {
        queue: GfxQueueKind,
        label: String,
        commands: Vec<&'static str>,
        stats: GfxCommandListStats,
    },
    Synchronized(GfxQueueKind),
}

#[derive(Default)]
struct NullDeviceShared {
    next_handle: AtomicU64,
    /// event 句柄 -> 是否处于 set 状态
    events: spin::Mutex<HashMap<u64, bool>>,
    journal: spin::Mutex<Vec<NullDeviceEvent>>,
    fail_submit: AtomicBool,
    fail_event_creation: AtomicBool,
}
impl NullDeviceShared {
    fn alloc_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record(&self, event: NullDeviceEvent) {
        self.journal.lock().push(event);
    }
}

/// 不依赖 GPU 的宿主设备
///
/// 句柄由计数器生成，所有调用都记录到 journal 中；提交时会模拟命令列表中的 SetEvent / ResetEvent。
/// 用于测试以及没有显卡的环境。
#[derive(Clone, Default)]
pub struct NullHostDevice {
    shared: Arc<NullDeviceShared>,
}
impl NullHostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前的全部调用记录
    pub fn journal(&self) -> Vec<NullDeviceEvent> {
        self.shared.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.shared.journal.lock().clear();
    }

    /// 满足条件的记录数量
    pub fn count(&self, pred: impl Fn(&NullDeviceEvent) -> bool) -> usize {
        self.shared.journal.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn submissions(&self) -> Vec<NullDeviceEvent> {
        self.shared
            .journal
            .lock()
            .iter()
            .filter(|e| matches!(e, NullDeviceEvent::Submitted { .. }))
            .cloned()
            .collect()
    }

    /// 之后的提交都返回 device lost
    pub fn set_fail_submit(&self, fail: bool) {
        self.shared.fail_submit.store(fail, Ordering::Relaxed);
    }

    /// 之后的 event 创建都失败
    pub fn set_fail_event_creation(&self, fail: bool) {
        self.shared.fail_event_creation.store(fail, Ordering::Relaxed);
    }

    /// 仍然存活的 event 数量
    pub fn live_event_count(&self) -> usize {
        self.shared.events.lock().len()
    }
}

impl HostDevice for NullHostDevice {
    fn create_event(&self) -> GfxResult<vk::Event> {
        if self.shared.fail_event_creation.load(Ordering::Relaxed) {
            return Err(GfxError::Vk(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        let raw = self.shared.alloc_handle();
        self.shared.events.lock().insert(raw, false);
        let event = vk::Event::from_raw(raw);
        self.shared.record(NullDeviceEvent::EventCreated(event));
        Ok(event)
    }

    fn destroy_event(&self, event: vk::Event) {
        self.shared.events.lock().remove(&event.as_raw());
        self.shared.record(NullDeviceEvent::EventDestroyed(event));
    }

    fn event_status(&self, event: vk::Event) -> GfxResult<bool> {
        self.shared
            .events
            .lock()
            .get(&event.as_raw())
            .copied()
            .ok_or(GfxError::Vk(vk::Result::ERROR_UNKNOWN))
    }

    fn set_event(&self, event: vk::Event) -> GfxResult<()> {
        match self.shared.events.lock().get_mut(&event.as_raw()) {
            Some(state) => {
                *state = true;
                Ok(())
            }
            None => Err(GfxError::Vk(vk::Result::ERROR_UNKNOWN)),
        }
    }

    fn reset_event(&self, event: vk::Event) -> GfxResult<()> {
        match self.shared.events.lock().get_mut(&event.as_raw()) {
            Some(state) => {
                *state = false;
                Ok(())
            }
            None => Err(GfxError::Vk(vk::Result::ERROR_UNKNOWN)),
        }
    }

    fn create_pipeline_layout(&self, desc: &GfxPipelineLayoutDesc) -> GfxResult<GfxPipelineLayout> {
        let layout = GfxPipelineLayout {
            set_layout: vk::DescriptorSetLayout::from_raw(self.shared.alloc_handle()),
            layout: vk::PipelineLayout::from_raw(self.shared.alloc_handle()),
        };
        log::trace!("null device: pipeline layout with {} bindings", desc.bindings.len());
        self.shared.record(NullDeviceEvent::PipelineLayoutCreated(layout.layout));
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: GfxPipelineLayout) {
        self.shared.record(NullDeviceEvent::PipelineLayoutDestroyed(layout.layout));
    }

    fn create_graphics_pipeline(&self, _desc: &GfxGraphicsPipelineDesc<'_>) -> GfxResult<vk::Pipeline> {
        let pipeline = vk::Pipeline::from_raw(self.shared.alloc_handle());
        self.shared.record(NullDeviceEvent::GraphicsPipelineCreated(pipeline));
        Ok(pipeline)
    }

    fn create_compute_pipeline(&self, _shader: &GfxShader, _layout: vk::PipelineLayout) -> GfxResult<vk::Pipeline> {
        let pipeline = vk::Pipeline::from_raw(self.shared.alloc_handle());
        self.shared.record(NullDeviceEvent::ComputePipelineCreated(pipeline));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.shared.record(NullDeviceEvent::PipelineDestroyed(pipeline));
    }

    fn destroy_object(&self, object: GfxOwnedObject) {
        self.shared.record(NullDeviceEvent::ObjectDestroyed(object));
    }

    fn create_queue(&self, kind: GfxQueueKind) -> GfxResult<Box<dyn HostQueue>> {
        self.shared.record(NullDeviceEvent::QueueCreated(kind));
        Ok(Box::new(NullHostQueue {
            shared: self.shared.clone(),
            kind,
            in_flight: Vec::new(),
        }))
    }
}

/// null 设备的队列，提交的命令列表在 `synchronize` 时 "执行完成"
pub struct NullHostQueue {
    shared: Arc<NullDeviceShared>,
    kind: GfxQueueKind,
    in_flight: Vec<GfxCommandList>,
}
impl HostQueue for NullHostQueue {
    fn kind(&self) -> GfxQueueKind {
        self.kind
    }

    fn submit(&mut self, submission: GfxSubmission) -> GfxResult<()> {
        if self.shared.fail_submit.load(Ordering::Relaxed) {
            return Err(GfxError::DeviceLost);
        }

        let list = submission.command_list;
        self.shared.record(NullDeviceEvent::Submitted {
            queue: self.kind,
            label: list.label().to_string(),
            commands: list.command_names(),
            stats: list.stats(),
        });
        self.in_flight.push(list);
        Ok(())
    }

    fn synchronize(&mut self, _timeout: Option<Duration>) -> GfxResult<()> {
        for list in self.in_flight.drain(..) {
            let mut events = self.shared.events.lock();
            for command in list.commands() {
                match command {
                    GfxCommand::SetEvent { event, .. } => {
                        events.insert(event.as_raw(), true);
                    }
                    GfxCommand::ResetEvent { event, .. } => {
                        events.insert(event.as_raw(), false);
                    }
                    _ => {}
                }
            }
        }
        self.shared.record(NullDeviceEvent::Synchronized(self.kind));
        Ok(())
    }
}
