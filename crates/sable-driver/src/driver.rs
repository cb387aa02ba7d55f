use std::rc::Rc;
use std::sync::Arc;

use sable_gfx::commands::command_list::GfxCommandList;
use sable_gfx::foundation::host::{GfxQueueKind, HostDevice};

use crate::config::DriverConfig;
use crate::memory::GuestMemory;
use crate::presenter::{ScePresenter, SceWindowEvents};
use crate::queue::gpu_queue::{SceGpuQueue, SceRingBuffer};
use crate::queue::processor::CommandProcessorFactory;
use crate::sce::tracker::SceResourceTracker;
use crate::{DriverError, DriverResult, SCE_OK, SceError};

/// graphics 队列不占用虚拟队列编号，0 只用于错误信息
pub const GRAPHICS_QUEUE_ID: u32 = 0;
pub const VQUEUE_ID_BEGIN: u32 = 1;
pub const MAX_PIPE_ID: u32 = 7;
pub const MAX_QUEUE_ID: u32 = 8;
pub const MAX_COMPUTE_QUEUE_COUNT: u32 = MAX_PIPE_ID * MAX_QUEUE_ID;

/// guest 内存中的一段 command buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceCommandBuffer {
    pub address: u64,
    pub size_in_bytes: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceFlipRequest {
    pub video_out_handle: u32,
    pub display_buffer_index: u32,
    pub flip_mode: u32,
    pub flip_arg: i64,
}

pub struct SceDriverCreateInfo {
    pub device: Arc<dyn HostDevice>,
    pub memory: Rc<dyn GuestMemory>,
    pub presenter: Box<dyn ScePresenter>,
    pub window_events: Box<dyn SceWindowEvents>,
    pub processors: Box<dyn CommandProcessorFactory>,
    pub config: DriverConfig,
}

/// Gnm driver
///
/// 提交是同步的：每次调用都按 追踪 display buffer -> 录制 -> 提交 -> 等待 -> present -> 重置追踪器 的顺序完成，
/// 返回时 GPU 工作已经结束。只能在一个线程上使用。
pub struct SceGnmDriver {
    device: Arc<dyn HostDevice>,
    memory: Rc<dyn GuestMemory>,
    presenter: Box<dyn ScePresenter>,
    window_events: Box<dyn SceWindowEvents>,
    processors: Box<dyn CommandProcessorFactory>,
    config: DriverConfig,

    graphics_queue: Option<SceGpuQueue>,
    /// 以 `vqueue_id - VQUEUE_ID_BEGIN` 索引
    compute_queues: Vec<Option<SceGpuQueue>>,

    tracker: SceResourceTracker,
}
// new & init
impl SceGnmDriver {
    pub fn new(info: SceDriverCreateInfo) -> DriverResult<Self> {
        let SceDriverCreateInfo {
            device,
            memory,
            presenter,
            window_events,
            processors,
            config,
        } = info;

        let graphics_queue =
            SceGpuQueue::new(&device, GfxQueueKind::Graphics, processors.create(GfxQueueKind::Graphics), None)?;
        log::info!("gnm driver created, config: {:?}", config);

        Ok(Self {
            device,
            memory,
            presenter,
            window_events,
            processors,
            config,
            graphics_queue: Some(graphics_queue),
            compute_queues: (0..MAX_COMPUTE_QUEUE_COUNT).map(|_| None).collect(),
            tracker: SceResourceTracker::new(),
        })
    }
}
// submission
impl SceGnmDriver {
    /// 不翻转的提交，同样会 present 0 号 display buffer
    pub fn submit_command_buffers(&mut self, dcbs: &[SceCommandBuffer], ccbs: &[SceCommandBuffer]) -> i32 {
        self.submit_and_flip_command_buffers(dcbs, ccbs, SceFlipRequest::default())
    }

    /// 每次只接受一个 command buffer，返回 `SCE_OK` 或者负的错误码
    pub fn submit_and_flip_command_buffers(
        &mut self,
        dcbs: &[SceCommandBuffer],
        ccbs: &[SceCommandBuffer],
        flip: SceFlipRequest,
    ) -> i32 {
        assert_eq!(dcbs.len(), 1, "only one command buffer per submission is supported");

        match self.try_submit_and_flip(dcbs[0], ccbs.first().copied(), flip) {
            Ok(()) => SCE_OK,
            Err(e) => {
                log::error!("submission aborted: {e}");
                self.reset_resource_tracker();
                e.code()
            }
        }
    }

    fn try_submit_and_flip(
        &mut self,
        dcb: SceCommandBuffer,
        ccb: Option<SceCommandBuffer>,
        flip: SceFlipRequest,
    ) -> DriverResult<()> {
        if let Some(ccb) = ccb.filter(|ccb| ccb.size_in_bytes != 0) {
            log::trace!("constant command buffer {:#x} ({} bytes) is not interpreted", ccb.address, ccb.size_in_bytes);
        }
        log::trace!(
            "submit {:#x} ({} bytes), flip {:?}",
            dcb.address,
            dcb.size_in_bytes,
            flip
        );

        // 录制时通过 CB_COLOR0_BASE 的地址找到 display buffer
        self.track_render_target(flip.display_buffer_index)?;

        let dwords = self.memory.read_dwords(dcb.address, dcb.size_in_bytes as usize / 4)?;
        let queue = self.graphics_queue.as_mut().ok_or(DriverError::UnmappedQueue(GRAPHICS_QUEUE_ID))?;
        let list = queue.record(&mut self.tracker, &dwords)?;

        self.submit_present(list, flip.display_buffer_index)?;

        // 每帧清空一次
        self.reset_resource_tracker();
        Ok(())
    }

    /// 提交、等待、present
    ///
    /// 同步提交只发生在这里
    fn submit_present(&mut self, list: GfxCommandList, display_buffer_index: u32) -> DriverResult<()> {
        let timeout = self.config.sync_timeout();
        let queue = self.graphics_queue.as_mut().ok_or(DriverError::UnmappedQueue(GRAPHICS_QUEUE_ID))?;
        queue.submit(list)?;
        queue.synchronize(timeout)?;

        if self.config.present {
            self.presenter.present(display_buffer_index).map_err(DriverError::Present)?;
        }
        Ok(())
    }

    /// 一帧结束，处理窗口事件
    pub fn submit_done(&mut self) -> i32 {
        self.window_events.poll_events();
        SCE_OK
    }

    fn track_render_target(&mut self, index: u32) -> DriverResult<()> {
        let target = self.presenter.display_buffer(index).ok_or(DriverError::MissingDisplayBuffer(index))?;
        self.tracker.track_render_target(target);
        Ok(())
    }

    fn reset_resource_tracker(&mut self) {
        self.tracker.reset();
    }
}
// compute queues
impl SceGnmDriver {
    /// 按 pipe -> queue -> ring base -> ring size -> 读指针 的顺序检查参数，
    /// 通过之后把读指针清零并创建队列
    pub fn try_map_compute_queue(
        &mut self,
        pipe_id: u32,
        queue_id: u32,
        ring_base_addr: u64,
        ring_size_in_dw: u32,
        read_ptr_addr: u64,
    ) -> Result<u32, SceError> {
        if pipe_id >= MAX_PIPE_ID {
            return Err(SceError::InvalidPipeId);
        }
        if queue_id >= MAX_QUEUE_ID {
            return Err(SceError::InvalidQueueId);
        }
        if ring_base_addr % 256 != 0 {
            return Err(SceError::InvalidRingBaseAddress);
        }
        if !ring_size_in_dw.is_power_of_two() {
            return Err(SceError::InvalidRingSize);
        }
        if read_ptr_addr % 4 != 0 {
            return Err(SceError::InvalidReadPtrAddress);
        }

        let vqueue_id = VQUEUE_ID_BEGIN + pipe_id * MAX_PIPE_ID + queue_id;
        if vqueue_id >= MAX_COMPUTE_QUEUE_COUNT {
            log::error!("vqueue id {} is larger than max queue count", vqueue_id);
            return Err(SceError::Unknown);
        }
        if !self.config.compute_queues {
            log::warn!("compute queues are disabled, pipe {} queue {} rejected", pipe_id, queue_id);
            return Err(SceError::Unknown);
        }

        self.memory.write_u32(read_ptr_addr, 0).map_err(|e| {
            log::error!("cannot reset read pointer: {e}");
            SceError::Unknown
        })?;

        let ring = SceRingBuffer {
            base_address: ring_base_addr,
            size_in_dw: ring_size_in_dw,
            read_ptr_address: read_ptr_addr,
            read_offset_in_dw: 0,
        };
        let processor = self.processors.create(GfxQueueKind::Compute);
        let queue = SceGpuQueue::new(&self.device, GfxQueueKind::Compute, processor, Some(ring)).map_err(|e| {
            log::error!("cannot create compute queue: {e}");
            SceError::Unknown
        })?;

        let slot = &mut self.compute_queues[(vqueue_id - VQUEUE_ID_BEGIN) as usize];
        if slot.is_some() {
            log::warn!("vqueue {} is mapped again, the previous queue is released", vqueue_id);
        }
        *slot = Some(queue);
        log::info!("map compute queue pipe {} queue {} -> vqueue {}", pipe_id, queue_id, vqueue_id);
        Ok(vqueue_id)
    }

    /// 成功时返回正的虚拟队列编号，失败时返回负的错误码
    pub fn map_compute_queue(
        &mut self,
        pipe_id: u32,
        queue_id: u32,
        ring_base_addr: u64,
        ring_size_in_dw: u32,
        read_ptr_addr: u64,
    ) -> i32 {
        match self.try_map_compute_queue(pipe_id, queue_id, ring_base_addr, ring_size_in_dw, read_ptr_addr) {
            Ok(vqueue_id) => vqueue_id as i32,
            Err(e) => {
                log::debug!("map compute queue failed: {e}");
                e.code()
            }
        }
    }

    pub fn unmap_compute_queue(&mut self, vqueue_id: u32) {
        if !(VQUEUE_ID_BEGIN..MAX_COMPUTE_QUEUE_COUNT).contains(&vqueue_id) {
            log::error!("vqueue id {} is out of range", vqueue_id);
            return;
        }
        if self.compute_queues[(vqueue_id - VQUEUE_ID_BEGIN) as usize].take().is_none() {
            log::warn!("vqueue {} is not mapped", vqueue_id);
        }
    }

    /// 通知 GPU ring buffer 中已经写到 `next_start_offset_in_dw`
    ///
    /// 处理读指针到该位置之间的命令，完成后更新读指针
    pub fn ding_dong(&mut self, vqueue_id: u32, next_start_offset_in_dw: u32) -> DriverResult<()> {
        let timeout = self.config.sync_timeout();
        let queue = vqueue_id
            .checked_sub(VQUEUE_ID_BEGIN)
            .and_then(|index| self.compute_queues.get_mut(index as usize))
            .and_then(Option::as_mut)
            .ok_or(DriverError::UnmappedQueue(vqueue_id))?;
        let ring = *queue.ring().ok_or(DriverError::UnmappedQueue(vqueue_id))?;

        let mut dwords = Vec::new();
        for (offset, len) in ring.pending_ranges(next_start_offset_in_dw) {
            if len != 0 {
                dwords.extend(self.memory.read_dwords(ring.base_address + offset as u64 * 4, len as usize)?);
            }
        }
        log::trace!("vqueue {} ding dong: {} dwords", vqueue_id, dwords.len());

        let list = queue.record(&mut self.tracker, &dwords)?;
        queue.submit(list)?;
        queue.synchronize(timeout)?;

        let read_offset = next_start_offset_in_dw & (ring.size_in_dw - 1);
        self.memory.write_u32(ring.read_ptr_address, read_offset)?;
        if let Some(ring) = queue.ring_mut() {
            ring.read_offset_in_dw = read_offset;
        }
        Ok(())
    }

    fn destroy_gpu_queues(&mut self) {
        self.graphics_queue = None;
        for queue in &mut self.compute_queues {
            *queue = None;
        }
    }
}
// getters
impl SceGnmDriver {
    #[inline]
    pub fn tracker(&self) -> &SceResourceTracker {
        &self.tracker
    }

    #[inline]
    pub fn tracker_mut(&mut self) -> &mut SceResourceTracker {
        &mut self.tracker
    }

    #[inline]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn compute_queue(&self, vqueue_id: u32) -> Option<&SceGpuQueue> {
        let index = vqueue_id.checked_sub(VQUEUE_ID_BEGIN)?;
        self.compute_queues.get(index as usize)?.as_ref()
    }

    pub fn mapped_compute_queue_count(&self) -> usize {
        self.compute_queues.iter().filter(|q| q.is_some()).count()
    }
}
impl Drop for SceGnmDriver {
    fn drop(&mut self) {
        log::debug!("destroy gnm driver, {} compute queues mapped", self.mapped_compute_queue_count());
        self.destroy_gpu_queues();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use sable_gfx::foundation::null_device::{NullDeviceEvent, NullHostDevice};

    use super::*;
    use crate::memory::VecGuestMemory;
    use crate::presenter::NoWindowEvents;
    use crate::queue::pm4::tests::{CS_ADDRESS, MapShaderResolver};
    use crate::queue::pm4::{Pm4Builder, Pm4ProcessorFactory, reg};
    use crate::sce::resource::SceRenderTarget;
    use crate::sce::resource::tests::{ADDRESS, render_target};

    const MEMORY_BASE: u64 = 0x10_0000;
    const RING_BASE: u64 = MEMORY_BASE + 0x1000;
    const READ_PTR: u64 = MEMORY_BASE + 0x100;

    struct TestPresenter {
        presents: Rc<RefCell<Vec<u32>>>,
    }
    impl ScePresenter for TestPresenter {
        fn display_buffer(&self, index: u32) -> Option<SceRenderTarget> {
            (index == 0).then(|| render_target(ADDRESS))
        }

        fn present(&mut self, index: u32) -> Result<(), String> {
            self.presents.borrow_mut().push(index);
            Ok(())
        }
    }

    struct Fixture {
        device: NullHostDevice,
        memory: Rc<VecGuestMemory>,
        presents: Rc<RefCell<Vec<u32>>>,
        driver: SceGnmDriver,
    }

    fn fixture(config: DriverConfig) -> Fixture {
        sable_crate_tools::init_log::init_test_log();
        let device = NullHostDevice::new();
        let memory = Rc::new(VecGuestMemory::with_base(MEMORY_BASE, 0x10000));
        memory.write_u32(READ_PTR, 0xFFFF_FFFF).unwrap();
        let presents = Rc::new(RefCell::new(Vec::new()));
        let driver = SceGnmDriver::new(SceDriverCreateInfo {
            device: Arc::new(device.clone()),
            memory: memory.clone(),
            presenter: Box::new(TestPresenter {
                presents: presents.clone(),
            }),
            window_events: Box::new(NoWindowEvents),
            processors: Box::new(Pm4ProcessorFactory::new(Rc::new(MapShaderResolver::with_defaults()))),
            config,
        })
        .unwrap();
        Fixture {
            device,
            memory,
            presents,
            driver,
        }
    }

    fn compute_queues_created(device: &NullHostDevice) -> usize {
        device.count(|e| matches!(e, NullDeviceEvent::QueueCreated(GfxQueueKind::Compute)))
    }

    #[test]
    fn test_map_unmap_map_reuses_id() {
        let mut f = fixture(DriverConfig::default());
        for pipe_id in 0..MAX_PIPE_ID {
            for queue_id in 0..MAX_QUEUE_ID {
                let first = f.driver.try_map_compute_queue(pipe_id, queue_id, RING_BASE, 128, READ_PTR).unwrap();
                f.driver.unmap_compute_queue(first);
                let second = f.driver.try_map_compute_queue(pipe_id, queue_id, RING_BASE, 128, READ_PTR).unwrap();
                assert_eq!(first, second);
                assert!(first >= VQUEUE_ID_BEGIN && first < MAX_COMPUTE_QUEUE_COUNT);
                f.driver.unmap_compute_queue(second);
            }
        }
        assert_eq!(f.driver.mapped_compute_queue_count(), 0);
    }

    #[test]
    fn test_out_of_range_ids_create_nothing() {
        let mut f = fixture(DriverConfig::default());
        assert_eq!(
            f.driver.map_compute_queue(MAX_PIPE_ID, 0, RING_BASE, 128, READ_PTR),
            SceError::InvalidPipeId.code()
        );
        assert_eq!(
            f.driver.map_compute_queue(0, MAX_QUEUE_ID, RING_BASE, 128, READ_PTR),
            SceError::InvalidQueueId.code()
        );
        assert_eq!(
            f.driver.map_compute_queue(MAX_PIPE_ID + 3, MAX_QUEUE_ID + 3, RING_BASE, 128, READ_PTR),
            SceError::InvalidPipeId.code()
        );
        assert_eq!(f.driver.mapped_compute_queue_count(), 0);
        assert_eq!(compute_queues_created(&f.device), 0);
        assert_eq!(f.memory.read_u32(READ_PTR).unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_misaligned_ring_base_leaves_read_ptr() {
        let mut f = fixture(DriverConfig::default());
        assert_eq!(
            f.driver.try_map_compute_queue(0, 0, RING_BASE + 0x80, 128, READ_PTR),
            Err(SceError::InvalidRingBaseAddress)
        );
        assert_eq!(f.memory.read_u32(READ_PTR).unwrap(), 0xFFFF_FFFF);
        assert_eq!(compute_queues_created(&f.device), 0);
    }

    #[test]
    fn test_ring_size_must_be_power_of_two() {
        let mut f = fixture(DriverConfig::default());
        assert_eq!(f.driver.try_map_compute_queue(0, 0, RING_BASE, 100, READ_PTR), Err(SceError::InvalidRingSize));
        assert_eq!(f.memory.read_u32(READ_PTR).unwrap(), 0xFFFF_FFFF);

        let id = f.driver.map_compute_queue(0, 0, RING_BASE, 128, READ_PTR);
        assert!(id > 0);
        assert_eq!(f.memory.read_u32(READ_PTR).unwrap(), 0);
        assert_eq!(compute_queues_created(&f.device), 1);
    }

    #[test]
    fn test_read_ptr_alignment_is_checked_last() {
        let mut f = fixture(DriverConfig::default());
        assert_eq!(
            f.driver.try_map_compute_queue(0, 0, RING_BASE, 128, READ_PTR + 2),
            Err(SceError::InvalidReadPtrAddress)
        );
        assert_eq!(
            f.driver.try_map_compute_queue(0, 0, RING_BASE + 1, 100, READ_PTR + 2),
            Err(SceError::InvalidRingBaseAddress)
        );
    }

    #[test]
    fn test_disabled_compute_queues() {
        let mut f = fixture(DriverConfig {
            compute_queues: false,
            ..Default::default()
        });
        assert_eq!(f.driver.map_compute_queue(0, 0, RING_BASE, 128, READ_PTR), SceError::Unknown.code());
        assert_eq!(f.memory.read_u32(READ_PTR).unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_unmap_out_of_range_is_ignored() {
        let mut f = fixture(DriverConfig::default());
        let id = f.driver.try_map_compute_queue(1, 2, RING_BASE, 128, READ_PTR).unwrap();
        f.driver.unmap_compute_queue(0);
        f.driver.unmap_compute_queue(MAX_COMPUTE_QUEUE_COUNT);
        f.driver.unmap_compute_queue(u32::MAX);
        assert!(f.driver.compute_queue(id).is_some());
    }

    fn dispatch_dwords() -> Vec<u32> {
        Pm4Builder::new()
            .set_shader_program(reg::COMPUTE_PGM_LO, CS_ADDRESS)
            .dispatch_direct(1, 1, 1)
            .build()
    }

    fn submitted_dispatches(device: &NullHostDevice) -> u32 {
        device
            .submissions()
            .iter()
            .map(|s| match s {
                NullDeviceEvent::Submitted { stats, .. } => stats.dispatches,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_ding_dong_wraps_and_updates_read_ptr() {
        let mut f = fixture(DriverConfig::default());
        let id = f.driver.try_map_compute_queue(0, 0, RING_BASE, 16, READ_PTR).unwrap();

        // 先把读指针推进到 12
        f.driver.ding_dong(id, 12).unwrap();
        assert_eq!(f.memory.read_u32(READ_PTR).unwrap(), 12);

        // 写在 ring 的末尾并回绕到开头
        let dwords = dispatch_dwords();
        assert_eq!(dwords.len(), 9);
        f.memory.write_dwords(RING_BASE + 12 * 4, &dwords[..4]).unwrap();
        f.memory.write_dwords(RING_BASE, &dwords[4..]).unwrap();
        f.device.clear_journal();
        f.driver.ding_dong(id, 5).unwrap();

        assert_eq!(f.memory.read_u32(READ_PTR).unwrap(), 5);
        assert_eq!(f.driver.compute_queue(id).unwrap().ring().unwrap().read_offset_in_dw, 5);
        assert_eq!(submitted_dispatches(&f.device), 1);
    }

    #[test]
    fn test_ding_dong_unmapped() {
        let mut f = fixture(DriverConfig::default());
        assert!(matches!(f.driver.ding_dong(5, 0), Err(DriverError::UnmappedQueue(5))));
        assert!(matches!(f.driver.ding_dong(0, 0), Err(DriverError::UnmappedQueue(0))));
    }

    #[test]
    fn test_missing_display_buffer_aborts() {
        let mut f = fixture(DriverConfig::default());
        let dcb = SceCommandBuffer {
            address: MEMORY_BASE,
            size_in_bytes: 0,
        };
        let flip = SceFlipRequest {
            display_buffer_index: 3,
            ..Default::default()
        };
        assert_eq!(f.driver.submit_and_flip_command_buffers(&[dcb], &[], flip), SceError::Unknown.code());
        assert!(f.presents.borrow().is_empty());
        assert_eq!(f.driver.tracker().frame(), 1);
    }

    #[test]
    #[should_panic(expected = "only one command buffer")]
    fn test_multiple_command_buffers_assert() {
        let mut f = fixture(DriverConfig::default());
        let dcb = SceCommandBuffer::default();
        f.driver.submit_command_buffers(&[dcb, dcb], &[]);
    }

    #[test]
    fn test_drop_releases_queues() {
        let mut f = fixture(DriverConfig::default());
        let id = f.driver.try_map_compute_queue(0, 1, RING_BASE, 16, READ_PTR).unwrap();
        f.memory.write_dwords(RING_BASE, &dispatch_dwords()).unwrap();
        f.driver.ding_dong(id, 9).unwrap();
        assert_eq!(submitted_dispatches(&f.device), 1);

        let device = f.device.clone();
        drop(f);
        assert_eq!(device.count(|e| matches!(e, NullDeviceEvent::PipelineDestroyed(_))), 1);
        assert_eq!(device.count(|e| matches!(e, NullDeviceEvent::PipelineLayoutDestroyed(_))), 1);
    }
}
