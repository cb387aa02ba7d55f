use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::sce::resource::{SceRenderTarget, SceResource};

/// 每一帧中 GPU 可能访问的资源，以 guest 地址索引
///
/// 命令处理器只能看到寄存器中的地址，需要通过这里找到对应的宿主对象。
/// 一帧内多次提交的资源会一直累积，直到 present 之后 `reset`。
#[derive(Default)]
pub struct SceResourceTracker {
    resources: BTreeMap<u64, SceResource>,
    frame: u64,
}
impl SceResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同一地址上已经有同样大小的资源时合并视图，否则替换
    pub fn track(&mut self, resource: SceResource) -> &mut SceResource {
        let address = resource.cpu_memory();
        match self.resources.entry(address) {
            Entry::Occupied(entry) => {
                let tracked = entry.into_mut();
                if tracked.size() == resource.size() {
                    tracked.merge(resource);
                } else {
                    log::debug!(
                        "resource at {:#x} resized from {:#x} to {:#x}",
                        address,
                        tracked.size(),
                        resource.size()
                    );
                    *tracked = resource;
                }
                tracked
            }
            Entry::Vacant(entry) => {
                log::trace!("track resource {:#x} {:?}", address, resource.ty());
                entry.insert(resource)
            }
        }
    }

    pub fn track_render_target(&mut self, target: SceRenderTarget) -> &mut SceResource {
        self.track(SceResource::from_render_target(target))
    }

    /// 起始地址恰好为 `address` 的资源
    pub fn find(&self, address: u64) -> Option<&SceResource> {
        self.resources.get(&address)
    }

    pub fn find_mut(&mut self, address: u64) -> Option<&mut SceResource> {
        self.resources.get_mut(&address)
    }

    /// 包含 `address` 的资源
    pub fn find_containing(&self, address: u64) -> Option<&SceResource> {
        self.resources
            .range(..=address)
            .next_back()
            .map(|(_, resource)| resource)
            .filter(|resource| resource.contains(address))
    }

    /// 清空本帧追踪的资源
    pub fn reset(&mut self) {
        log::trace!("reset resource tracker, frame {} tracked {}", self.frame, self.resources.len());
        self.resources.clear();
        self.frame += 1;
    }

    /// 已经 reset 的次数
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sce::resource::tests::{ADDRESS, SIZE, buffer, render_target, texture};
    use crate::sce::resource::SceResourceType;

    #[test]
    fn test_same_address_merges() {
        let mut tracker = SceResourceTracker::new();
        tracker.track(SceResource::from_texture(texture(ADDRESS)));
        tracker.track_render_target(render_target(ADDRESS));

        assert_eq!(tracker.len(), 1);
        let resource = tracker.find(ADDRESS).unwrap();
        assert_eq!(resource.ty(), SceResourceType::TEXTURE | SceResourceType::RENDER_TARGET);
    }

    #[test]
    fn test_resize_replaces() {
        let mut tracker = SceResourceTracker::new();
        tracker.track(SceResource::from_buffer(buffer(ADDRESS, 0x100)));
        tracker.track(SceResource::from_buffer(buffer(ADDRESS, 0x200)));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.find(ADDRESS).unwrap().size(), 0x200);
    }

    #[test]
    fn test_find_containing() {
        let mut tracker = SceResourceTracker::new();
        tracker.track(SceResource::from_buffer(buffer(ADDRESS, 0x100)));
        tracker.track_render_target(render_target(ADDRESS + 0x1000));

        assert_eq!(tracker.find_containing(ADDRESS + 0xFF).unwrap().cpu_memory(), ADDRESS);
        assert!(tracker.find_containing(ADDRESS + 0x100).is_none());
        assert!(tracker.find_containing(ADDRESS - 1).is_none());
        assert_eq!(tracker.find_containing(ADDRESS + 0x1000 + SIZE - 1).unwrap().cpu_memory(), ADDRESS + 0x1000);
        assert!(tracker.find(ADDRESS + 0x10).is_none());
    }

    #[test]
    fn test_reset_bumps_frame() {
        let mut tracker = SceResourceTracker::new();
        tracker.track_render_target(render_target(ADDRESS));
        tracker.reset();
        assert!(tracker.is_empty());
        assert_eq!(tracker.frame(), 1);
    }
}
