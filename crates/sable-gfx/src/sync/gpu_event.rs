use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ash::vk;

use crate::foundation::host::HostDevice;

/// event 的三种状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GfxGpuEventStatus {
    Signaled,
    Unsignaled,
    /// 句柄无效，或者设备已经丢失
    Invalid,
}

/// 可复用的 GPU event 池
///
/// freelist 由自旋锁保护，可以在提交线程以外的线程上分配和归还。
/// 池销毁时会销毁所有还在 freelist 中的 event，此时仍被借出的 event 属于调用者的错误。
pub struct GfxGpuEventPool {
    device: Arc<dyn HostDevice>,
    free_events: spin::Mutex<Vec<vk::Event>>,
    created_count: AtomicUsize,
}
impl GfxGpuEventPool {
    pub fn new(device: Arc<dyn HostDevice>) -> Arc<Self> {
        Arc::new(Self {
            device,
            free_events: spin::Mutex::new(Vec::new()),
            created_count: AtomicUsize::new(0),
        })
    }

    /// 从 freelist 中取出一个 event，没有时新建
    ///
    /// 创建失败时返回空句柄，[`GfxGpuEventPool::event_status`] 对它返回 `Invalid`
    pub fn alloc_event(&self) -> vk::Event {
        let recycled = self.free_events.lock().pop();
        if let Some(event) = recycled {
            // 复用的 event 可能残留上一次的 set 状态
            if let Err(e) = self.device.reset_event(event) {
                log::error!("failed to reset recycled event {event:?}: {e}");
            }
            return event;
        }

        match self.device.create_event() {
            Ok(event) => {
                self.created_count.fetch_add(1, Ordering::Relaxed);
                event
            }
            Err(e) => {
                log::error!("failed to create gpu event: {e}");
                vk::Event::null()
            }
        }
    }

    /// 归还 event，每个借出的句柄只能归还一次
    pub fn free_event(&self, event: vk::Event) {
        if event == vk::Event::null() {
            return;
        }
        self.free_events.lock().push(event);
    }

    pub fn event_status(&self, event: vk::Event) -> GfxGpuEventStatus {
        if event == vk::Event::null() {
            return GfxGpuEventStatus::Invalid;
        }
        match self.device.event_status(event) {
            Ok(true) => GfxGpuEventStatus::Signaled,
            Ok(false) => GfxGpuEventStatus::Unsignaled,
            Err(e) => {
                log::warn!("event {event:?} status query failed: {e}");
                GfxGpuEventStatus::Invalid
            }
        }
    }

    /// 借出一个 event，drop 时自动归还
    pub fn acquire(self: &Arc<Self>) -> GfxGpuEvent {
        GfxGpuEvent {
            pool: self.clone(),
            handle: self.alloc_event(),
        }
    }

    /// 当前在 freelist 中的 event 数量
    pub fn free_count(&self) -> usize {
        self.free_events.lock().len()
    }

    /// 池创建过的 event 总数
    pub fn created_count(&self) -> usize {
        self.created_count.load(Ordering::Relaxed)
    }
}
impl Drop for GfxGpuEventPool {
    fn drop(&mut self) {
        let events = std::mem::take(self.free_events.get_mut());
        let created = self.created_count.load(Ordering::Relaxed);
        if events.len() != created {
            log::warn!("event pool destroyed with {} events still borrowed", created - events.len().min(created));
        }
        for event in events {
            self.device.destroy_event(event);
        }
    }
}

/// 从池中借出的 event
pub struct GfxGpuEvent {
    pool: Arc<GfxGpuEventPool>,
    handle: vk::Event,
}
impl GfxGpuEvent {
    #[inline]
    pub fn handle(&self) -> vk::Event {
        self.handle
    }

    #[inline]
    pub fn test(&self) -> GfxGpuEventStatus {
        self.pool.event_status(self.handle)
    }

    /// 在 host 端 set
    pub fn signal(&self) -> crate::GfxResult<()> {
        self.pool.device.set_event(self.handle)
    }

    /// 在 host 端 reset
    pub fn reset(&self) -> crate::GfxResult<()> {
        self.pool.device.reset_event(self.handle)
    }
}
impl Drop for GfxGpuEvent {
    fn drop(&mut self) {
        self.pool.free_event(self.handle);
    }
}
impl std::fmt::Debug for GfxGpuEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpuEvent({:?})", self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::null_device::{NullDeviceEvent, NullHostDevice};

    fn created_events(device: &NullHostDevice) -> usize {
        device.count(|e| matches!(e, NullDeviceEvent::EventCreated(_)))
    }

    #[test]
    fn test_recycled_event_is_unsignaled_without_second_creation() {
        sable_crate_tools::init_log::init_test_log();
        let device = NullHostDevice::new();
        let pool = GfxGpuEventPool::new(Arc::new(device.clone()));

        let event = pool.alloc_event();
        device.set_event(event).unwrap();
        assert_eq!(pool.event_status(event), GfxGpuEventStatus::Signaled);
        pool.free_event(event);

        let again = pool.alloc_event();
        assert_eq!(again, event);
        assert_eq!(pool.event_status(again), GfxGpuEventStatus::Unsignaled);
        assert_eq!(created_events(&device), 1);
        assert_eq!(pool.created_count(), 1);
    }

    #[test]
    fn test_scoped_event_returns_to_pool() {
        let device = NullHostDevice::new();
        let pool = GfxGpuEventPool::new(Arc::new(device.clone()));

        {
            let event = pool.acquire();
            assert_eq!(event.test(), GfxGpuEventStatus::Unsignaled);
            event.signal().unwrap();
            assert_eq!(event.test(), GfxGpuEventStatus::Signaled);
            assert_eq!(pool.free_count(), 0);
        }
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_creation_failure_yields_invalid_handle() {
        let device = NullHostDevice::new();
        device.set_fail_event_creation(true);
        let pool = GfxGpuEventPool::new(Arc::new(device.clone()));

        let event = pool.acquire();
        assert_eq!(event.handle(), vk::Event::null());
        assert_eq!(event.test(), GfxGpuEventStatus::Invalid);
        drop(event);
        // 空句柄不会进入 freelist
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_pool_drop_destroys_pooled_events() {
        let device = NullHostDevice::new();
        let pool = GfxGpuEventPool::new(Arc::new(device.clone()));
        let a = pool.alloc_event();
        let b = pool.alloc_event();
        pool.free_event(a);
        pool.free_event(b);
        assert_eq!(device.live_event_count(), 2);

        drop(pool);
        assert_eq!(device.live_event_count(), 0);
        assert_eq!(device.count(|e| matches!(e, NullDeviceEvent::EventDestroyed(_))), 2);
    }

    #[test]
    fn test_pool_is_shared_across_threads() {
        let device = NullHostDevice::new();
        let pool = GfxGpuEventPool::new(Arc::new(device));

        let handles = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..16 {
                        let event = pool.alloc_event();
                        pool.free_event(event);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        // 每个线程同一时刻最多借出一个
        assert!(pool.created_count() <= 4);
        assert_eq!(pool.free_count(), pool.created_count());
    }
}
