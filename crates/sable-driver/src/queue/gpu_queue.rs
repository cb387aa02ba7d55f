use std::sync::Arc;
use std::time::Duration;

use sable_gfx::commands::command_list::GfxCommandList;
use sable_gfx::commands::submission::GfxSubmission;
use sable_gfx::context::GfxContext;
use sable_gfx::foundation::host::{GfxQueueKind, HostDevice, HostQueue};

use crate::DriverResult;
use crate::queue::processor::CommandProcessor;
use crate::sce::tracker::SceResourceTracker;

/// compute 队列的 ring buffer，全部位于 guest 内存中
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceRingBuffer {
    /// 256 字节对齐
    pub base_address: u64,
    /// 2 的幂
    pub size_in_dw: u32,
    /// GPU 读到的位置，以 dword 计，4 字节对齐
    pub read_ptr_address: u64,
    /// 与 `read_ptr_address` 处的值保持一致
    pub read_offset_in_dw: u32,
}
impl SceRingBuffer {
    /// 从当前读位置到 `next_start_offset_in_dw` 之间的 dword 区间，最多两段
    pub fn pending_ranges(&self, next_start_offset_in_dw: u32) -> [(u32, u32); 2] {
        let mask = self.size_in_dw - 1;
        let begin = self.read_offset_in_dw & mask;
        let end = next_start_offset_in_dw & mask;
        if begin <= end {
            [(begin, end - begin), (0, 0)]
        } else {
            [(begin, self.size_in_dw - begin), (0, end)]
        }
    }
}

/// 一个虚拟 GPU 队列
///
/// 拥有自己的宿主队列、渲染上下文和命令处理器；graphics 队列只有一个，compute 队列按需创建
pub struct SceGpuQueue {
    kind: GfxQueueKind,
    host: Box<dyn HostQueue>,
    context: GfxContext,
    processor: Box<dyn CommandProcessor>,
    ring: Option<SceRingBuffer>,

    record_count: u64,
}
// new & init
impl SceGpuQueue {
    pub fn new(
        device: &Arc<dyn HostDevice>,
        kind: GfxQueueKind,
        processor: Box<dyn CommandProcessor>,
        ring: Option<SceRingBuffer>,
    ) -> DriverResult<Self> {
        let host = device.create_queue(kind)?;
        log::debug!("create {:?} gpu queue", kind);
        Ok(Self {
            kind,
            host,
            context: GfxContext::new(device.clone()),
            processor,
            ring,
            record_count: 0,
        })
    }
}
// getter
impl SceGpuQueue {
    #[inline]
    pub fn kind(&self) -> GfxQueueKind {
        self.kind
    }

    #[inline]
    pub fn ring(&self) -> Option<&SceRingBuffer> {
        self.ring.as_ref()
    }

    #[inline]
    pub fn ring_mut(&mut self) -> Option<&mut SceRingBuffer> {
        self.ring.as_mut()
    }

    #[inline]
    pub fn context(&self) -> &GfxContext {
        &self.context
    }

    #[inline]
    pub fn record_count(&self) -> u64 {
        self.record_count
    }
}
// tools
impl SceGpuQueue {
    /// 解释一段 command buffer 并录制为命令列表
    ///
    /// 处理失败时同样会结束录制，已经录制的部分随命令列表一起丢弃
    pub fn record(&mut self, tracker: &mut SceResourceTracker, dwords: &[u32]) -> DriverResult<GfxCommandList> {
        self.record_count += 1;
        let label = format!("{:?}-{}", self.kind, self.record_count);
        self.context.begin_recording(GfxCommandList::new(label));
        let result = self.processor.process(&mut self.context, tracker, dwords);
        let list = self.context.end_recording();
        result.map(|_| list)
    }

    pub fn submit(&mut self, list: GfxCommandList) -> DriverResult<()> {
        log::trace!("submit {} to {:?} queue", list.label(), self.kind);
        self.host.submit(GfxSubmission::new(list))?;
        Ok(())
    }

    /// 阻塞直到所有提交的工作完成
    pub fn synchronize(&mut self, timeout: Option<Duration>) -> DriverResult<()> {
        self.host.synchronize(timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use sable_gfx::foundation::null_device::{NullDeviceEvent, NullHostDevice};

    use super::*;
    use crate::queue::pm4::tests::MapShaderResolver;
    use crate::queue::pm4::{Pm4Builder, Pm4CommandProcessor, opcode};

    fn ring(read_offset_in_dw: u32) -> SceRingBuffer {
        SceRingBuffer {
            base_address: 0x1000,
            size_in_dw: 64,
            read_ptr_address: 0x800,
            read_offset_in_dw,
        }
    }

    #[test]
    fn test_pending_ranges() {
        assert_eq!(ring(4).pending_ranges(20), [(4, 16), (0, 0)]);
        assert_eq!(ring(60).pending_ranges(8), [(60, 4), (0, 8)]);
        assert_eq!(ring(8).pending_ranges(8), [(8, 0), (0, 0)]);
    }

    #[test]
    fn test_record_submit_synchronize() {
        sable_crate_tools::init_log::init_test_log();
        let device = NullHostDevice::new();
        let host: Arc<dyn HostDevice> = Arc::new(device.clone());
        let processor = Pm4CommandProcessor::new(GfxQueueKind::Graphics, Rc::new(MapShaderResolver::with_defaults()));
        let mut queue = SceGpuQueue::new(&host, GfxQueueKind::Graphics, Box::new(processor), None).unwrap();

        let mut tracker = SceResourceTracker::new();
        let dwords = Pm4Builder::new().packet(opcode::NOP, &[0]).build();
        let list = queue.record(&mut tracker, &dwords).unwrap();
        assert!(list.is_empty());
        assert!(!queue.context().is_recording());

        queue.submit(list).unwrap();
        queue.synchronize(None).unwrap();
        assert_eq!(
            device.journal(),
            [
                NullDeviceEvent::QueueCreated(GfxQueueKind::Graphics),
                NullDeviceEvent::Submitted {
                    queue: GfxQueueKind::Graphics,
                    label: "Graphics-1".to_string(),
                    commands: vec![],
                    stats: Default::default(),
                },
                NullDeviceEvent::Synchronized(GfxQueueKind::Graphics),
            ]
        );
    }

    #[test]
    fn test_failed_record_ends_recording() {
        sable_crate_tools::init_log::init_test_log();
        let host: Arc<dyn HostDevice> = Arc::new(NullHostDevice::new());
        let processor = Pm4CommandProcessor::new(GfxQueueKind::Graphics, Rc::new(MapShaderResolver::default()));
        let mut queue = SceGpuQueue::new(&host, GfxQueueKind::Graphics, Box::new(processor), None).unwrap();

        let mut tracker = SceResourceTracker::new();
        assert!(queue.record(&mut tracker, &[1 << 30]).is_err());
        assert!(!queue.context().is_recording());
        assert!(queue.record(&mut tracker, &[]).is_ok());
    }
}
