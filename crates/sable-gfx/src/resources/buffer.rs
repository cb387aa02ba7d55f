use std::rc::Rc;
use std::sync::Arc;

use ash::vk;
use derive_getters::Getters;

use crate::foundation::host::{GfxOwnedObject, HostDevice};
use crate::resources::memory::GfxMemory;

pub struct GfxBuffer {
    handle: vk::Buffer,
    memory: GfxMemory,
    usage: vk::BufferUsageFlags,

    /// 为 None 时生命周期由外部管理，drop 时不销毁
    owner: Option<Arc<dyn HostDevice>>,
    name: String,
}
// new & init
impl GfxBuffer {
    /// 接管一个已经创建好的 buffer，drop 时交给 device 销毁
    pub fn new(
        device: Arc<dyn HostDevice>,
        handle: vk::Buffer,
        memory: GfxMemory,
        usage: vk::BufferUsageFlags,
        name: impl AsRef<str>,
    ) -> Self {
        Self {
            handle,
            memory,
            usage,
            owner: Some(device),
            name: name.as_ref().to_string(),
        }
    }

    /// 生命周期由外部管理的 buffer
    pub fn external(handle: vk::Buffer, memory: GfxMemory, usage: vk::BufferUsageFlags, name: impl AsRef<str>) -> Self {
        Self {
            handle,
            memory,
            usage,
            owner: None,
            name: name.as_ref().to_string(),
        }
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn memory(&self) -> &GfxMemory {
        &self.memory
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.memory.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        if let Some(device) = self.owner.take() {
            log::trace!("destroying buffer: {}", self.name);
            device.destroy_object(GfxOwnedObject::Buffer(self.handle));
        }
    }
}
impl std::fmt::Debug for GfxBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer({}, {:?})", self.name, self.handle)
    }
}

/// buffer 上的一段区间，绑定 vertex / index / descriptor 时使用
#[derive(Clone, Debug)]
pub struct GfxBufferSlice {
    buffer: Rc<GfxBuffer>,
    offset: vk::DeviceSize,
    length: vk::DeviceSize,
}
impl GfxBufferSlice {
    pub fn new(buffer: Rc<GfxBuffer>, offset: vk::DeviceSize, length: vk::DeviceSize) -> Self {
        debug_assert!(offset + length <= buffer.size(), "slice out of range of {}", buffer.name());
        Self { buffer, offset, length }
    }

    /// 整个 buffer
    pub fn whole(buffer: Rc<GfxBuffer>) -> Self {
        let length = buffer.size();
        Self {
            buffer,
            offset: 0,
            length,
        }
    }

    #[inline]
    pub fn buffer(&self) -> &Rc<GfxBuffer> {
        &self.buffer
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    #[inline]
    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    #[inline]
    pub fn length(&self) -> vk::DeviceSize {
        self.length
    }

    #[inline]
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.handle(),
            offset: self.offset,
            range: self.length,
        }
    }

    /// 两个 slice 是否有重叠的字节
    pub fn overlaps(&self, other: &GfxBufferSlice) -> bool {
        self.handle() == other.handle()
            && self.offset < other.offset + other.length
            && other.offset < self.offset + self.length
    }
}

/// texel buffer view
#[derive(Getters)]
pub struct GfxBufferView {
    handle: vk::BufferView,
    buffer: Rc<GfxBuffer>,
    format: vk::Format,

    #[getter(skip)]
    owner: Option<Arc<dyn HostDevice>>,
}
impl GfxBufferView {
    pub fn new(
        device: Option<Arc<dyn HostDevice>>,
        handle: vk::BufferView,
        buffer: Rc<GfxBuffer>,
        format: vk::Format,
    ) -> Self {
        Self {
            handle,
            buffer,
            format,
            owner: device,
        }
    }
}
impl Drop for GfxBufferView {
    fn drop(&mut self) {
        if let Some(device) = self.owner.take() {
            device.destroy_object(GfxOwnedObject::BufferView(self.handle));
        }
    }
}
impl std::fmt::Debug for GfxBufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufferView({}, {:?}, {:?})", self.buffer.name(), self.handle, self.format)
    }
}
