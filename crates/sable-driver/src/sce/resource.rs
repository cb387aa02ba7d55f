use std::rc::Rc;

use ash::vk;
use bitflags::bitflags;
use sable_gfx::resources::buffer::{GfxBuffer, GfxBufferSlice, GfxBufferView};
use sable_gfx::resources::image::{GfxImage, GfxImageView};
use sable_gfx::resources::memory::GfxMemory;
use sable_gfx::resources::sampler::GfxSampler;

use crate::sce::gnm::{GnmBuffer, GnmDepthRenderTarget, GnmRenderTarget, GnmSampler, GnmTexture};

bitflags! {
    /// 资源当前有效的视图
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SceResourceType: u32 {
        const BUFFER              = 1 << 0;
        const TEXTURE             = 1 << 1;
        /// 与 DEPTH_RENDER_TARGET 互斥
        const RENDER_TARGET       = 1 << 2;
        const DEPTH_RENDER_TARGET = 1 << 3;
    }
}

#[derive(Clone, Debug)]
pub struct SceBuffer {
    pub desc: GnmBuffer,
    pub buffer: Rc<GfxBuffer>,
    /// 以格式化方式访问时才有
    pub view: Option<Rc<GfxBufferView>>,
}
impl SceBuffer {
    pub fn new(desc: GnmBuffer, buffer: Rc<GfxBuffer>) -> Self {
        Self {
            desc,
            buffer,
            view: None,
        }
    }

    #[inline]
    fn memory(&self) -> &GfxMemory {
        self.buffer.memory()
    }

    /// 从 guest 地址 `address` 开始直到 buffer 末尾
    pub fn slice_from(&self, address: u64) -> GfxBufferSlice {
        let memory = self.memory();
        debug_assert!(memory.contains(address));
        let offset = address - memory.cpu_address;
        GfxBufferSlice::new(self.buffer.clone(), offset, self.buffer.size() - offset)
    }
}

#[derive(Clone, Debug)]
pub struct SceTexture {
    pub desc: GnmTexture,
    pub image: Rc<GfxImage>,
    pub view: Rc<GfxImageView>,
}

#[derive(Clone, Debug)]
pub struct SceRenderTarget {
    pub desc: GnmRenderTarget,
    pub image: Rc<GfxImage>,
    pub view: Rc<GfxImageView>,
}

#[derive(Clone, Debug)]
pub struct SceDepthRenderTarget {
    pub desc: GnmDepthRenderTarget,
    pub image: Rc<GfxImage>,
    pub view: Rc<GfxImageView>,
}

/// 不占用内存，因此不参与资源追踪
#[derive(Clone, Debug)]
pub struct SceSampler {
    pub desc: GnmSampler,
    pub sampler: Rc<GfxSampler>,
}

/// render target 与 depth render target 共用一个位置
#[derive(Clone, Debug)]
pub enum SceTarget {
    Color(SceRenderTarget),
    Depth(SceDepthRenderTarget),
}

/// 一块 backing allocation 以及它上面的各种视图
///
/// 地址和大小在整个生命周期内不变，只有视图可以被替换。
/// 同一块内存可以同时是 buffer 和 texture，render target 和 depth render target 只能是其中之一。
#[derive(Clone, Debug)]
pub struct SceResource {
    cpu_memory: u64,
    gpu_memory: vk::DeviceMemory,
    size: u64,
    ty: SceResourceType,

    buffer: Option<SceBuffer>,
    texture: Option<SceTexture>,
    target: Option<SceTarget>,
}
// new & init
impl SceResource {
    fn with_memory(memory: &GfxMemory) -> Self {
        Self {
            cpu_memory: memory.cpu_address,
            gpu_memory: memory.device_memory,
            size: memory.size,
            ty: SceResourceType::empty(),
            buffer: None,
            texture: None,
            target: None,
        }
    }

    pub fn from_buffer(buffer: SceBuffer) -> Self {
        let mut resource = Self::with_memory(buffer.memory());
        resource.set_buffer(buffer);
        resource
    }

    pub fn from_texture(texture: SceTexture) -> Self {
        let mut resource = Self::with_memory(texture.image.memory());
        resource.set_texture(texture);
        resource
    }

    pub fn from_render_target(target: SceRenderTarget) -> Self {
        let mut resource = Self::with_memory(target.image.memory());
        resource.set_render_target(target);
        resource
    }

    pub fn from_depth_render_target(target: SceDepthRenderTarget) -> Self {
        let mut resource = Self::with_memory(target.image.memory());
        resource.set_depth_render_target(target);
        resource
    }
}
// setters
impl SceResource {
    fn debug_check_memory(&self, memory: &GfxMemory) {
        debug_assert_eq!(memory.cpu_address, self.cpu_memory, "view does not share the resource address");
        debug_assert_eq!(memory.device_memory, self.gpu_memory, "view does not share the resource memory");
        debug_assert_eq!(memory.size, self.size, "view does not share the resource size");
    }

    pub fn set_buffer(&mut self, buffer: SceBuffer) {
        self.debug_check_memory(buffer.memory());
        self.buffer = Some(buffer);
        self.ty.insert(SceResourceType::BUFFER);
    }

    pub fn set_texture(&mut self, texture: SceTexture) {
        self.debug_check_memory(texture.image.memory());
        self.texture = Some(texture);
        self.ty.insert(SceResourceType::TEXTURE);
    }

    pub fn set_render_target(&mut self, target: SceRenderTarget) {
        self.debug_check_memory(target.image.memory());
        self.target = Some(SceTarget::Color(target));
        self.ty.remove(SceResourceType::DEPTH_RENDER_TARGET);
        self.ty.insert(SceResourceType::RENDER_TARGET);
    }

    pub fn set_depth_render_target(&mut self, target: SceDepthRenderTarget) {
        self.debug_check_memory(target.image.memory());
        self.target = Some(SceTarget::Depth(target));
        self.ty.remove(SceResourceType::RENDER_TARGET);
        self.ty.insert(SceResourceType::DEPTH_RENDER_TARGET);
    }

    /// 把 `other` 的视图合并进来，`other` 必须是同一块内存
    pub fn merge(&mut self, other: SceResource) {
        if let Some(buffer) = other.buffer {
            self.set_buffer(buffer);
        }
        if let Some(texture) = other.texture {
            self.set_texture(texture);
        }
        match other.target {
            Some(SceTarget::Color(target)) => self.set_render_target(target),
            Some(SceTarget::Depth(target)) => self.set_depth_render_target(target),
            None => {}
        }
    }
}
// getters
impl SceResource {
    #[inline]
    pub fn cpu_memory(&self) -> u64 {
        self.cpu_memory
    }

    #[inline]
    pub fn gpu_memory(&self) -> vk::DeviceMemory {
        self.gpu_memory
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn ty(&self) -> SceResourceType {
        self.ty
    }

    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.cpu_memory && address - self.cpu_memory < self.size
    }

    pub fn buffer(&self) -> Option<&SceBuffer> {
        debug_assert_eq!(self.buffer.is_some(), self.ty.contains(SceResourceType::BUFFER));
        self.buffer.as_ref()
    }

    pub fn texture(&self) -> Option<&SceTexture> {
        debug_assert_eq!(self.texture.is_some(), self.ty.contains(SceResourceType::TEXTURE));
        self.texture.as_ref()
    }

    pub fn render_target(&self) -> Option<&SceRenderTarget> {
        match &self.target {
            Some(SceTarget::Color(target)) => {
                debug_assert!(self.ty.contains(SceResourceType::RENDER_TARGET));
                Some(target)
            }
            _ => None,
        }
    }

    pub fn depth_render_target(&self) -> Option<&SceDepthRenderTarget> {
        match &self.target {
            Some(SceTarget::Depth(target)) => {
                debug_assert!(self.ty.contains(SceResourceType::DEPTH_RENDER_TARGET));
                Some(target)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ash::vk::Handle;
    use sable_gfx::resources::image::{GfxImageDesc, GfxImageViewDesc};

    use super::*;
    use crate::sce::gnm::data_format;

    pub(crate) const ADDRESS: u64 = 0x1_0000_0000;
    pub(crate) const SIZE: u64 = 64 * 64 * 4;

    pub(crate) fn memory(address: u64, size: u64) -> GfxMemory {
        GfxMemory::new(address, vk::DeviceMemory::from_raw(0x77), size)
    }

    pub(crate) fn image(address: u64, usage: vk::ImageUsageFlags, layout: vk::ImageLayout) -> Rc<GfxImage> {
        let desc = GfxImageDesc::new_2d(vk::Format::R8G8B8A8_UNORM, 64, 64, usage, layout);
        Rc::new(GfxImage::external(vk::Image::from_raw(address), desc, memory(address, SIZE), "image"))
    }

    fn view(image: &Rc<GfxImage>) -> Rc<GfxImageView> {
        Rc::new(GfxImageView::new(
            None,
            vk::ImageView::from_raw(image.handle().as_raw() + 1),
            image.clone(),
            GfxImageViewDesc::new_2d(vk::Format::R8G8B8A8_UNORM, vk::ImageAspectFlags::COLOR),
        ))
    }

    pub(crate) fn buffer(address: u64, size: u64) -> SceBuffer {
        let buffer = GfxBuffer::external(
            vk::Buffer::from_raw(address),
            memory(address, size),
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
            "buffer",
        );
        SceBuffer::new(GnmBuffer::new(address, 0, size as u32), Rc::new(buffer))
    }

    pub(crate) fn texture(address: u64) -> SceTexture {
        let image = image(address, vk::ImageUsageFlags::SAMPLED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        SceTexture {
            desc: GnmTexture::new(address, 64, 64, data_format::FMT_8_8_8_8),
            view: view(&image),
            image,
        }
    }

    pub(crate) fn render_target(address: u64) -> SceRenderTarget {
        let image = image(address, vk::ImageUsageFlags::COLOR_ATTACHMENT, vk::ImageLayout::PRESENT_SRC_KHR);
        SceRenderTarget {
            desc: GnmRenderTarget::new(address, 64, 64, data_format::FMT_8_8_8_8),
            view: view(&image),
            image,
        }
    }

    pub(crate) fn depth_target(address: u64) -> SceDepthRenderTarget {
        let image = image(
            address,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        );
        SceDepthRenderTarget {
            desc: GnmDepthRenderTarget::new(address, 64, 64, vk::Format::D32_SFLOAT),
            view: view(&image),
            image,
        }
    }

    #[test]
    fn test_buffer_then_texture() {
        let mut resource = SceResource::from_buffer(buffer(ADDRESS, SIZE));
        assert_eq!(resource.ty(), SceResourceType::BUFFER);
        let (size, gpu_memory) = (resource.size(), resource.gpu_memory());

        resource.set_texture(texture(ADDRESS));
        assert_eq!(resource.ty(), SceResourceType::BUFFER | SceResourceType::TEXTURE);
        assert_eq!(resource.size(), size);
        assert_eq!(resource.gpu_memory(), gpu_memory);
        assert_eq!(resource.cpu_memory(), ADDRESS);
        assert!(resource.buffer().is_some());
        assert!(resource.texture().is_some());
        assert!(resource.render_target().is_none());
    }

    #[test]
    fn test_targets_are_exclusive() {
        let mut resource = SceResource::from_render_target(render_target(ADDRESS));
        assert!(resource.render_target().is_some());

        resource.set_depth_render_target(depth_target(ADDRESS));
        assert_eq!(resource.ty(), SceResourceType::DEPTH_RENDER_TARGET);
        assert!(resource.render_target().is_none());
        assert!(resource.depth_render_target().is_some());

        resource.set_render_target(render_target(ADDRESS));
        assert_eq!(resource.ty(), SceResourceType::RENDER_TARGET);
    }

    #[test]
    fn test_merge_keeps_memory() {
        let mut resource = SceResource::from_texture(texture(ADDRESS));
        resource.merge(SceResource::from_render_target(render_target(ADDRESS)));
        assert_eq!(resource.ty(), SceResourceType::TEXTURE | SceResourceType::RENDER_TARGET);
        assert_eq!(resource.size(), SIZE);
    }

    #[test]
    fn test_buffer_slice_from_address() {
        let buffer = buffer(ADDRESS, 0x100);
        let slice = buffer.slice_from(ADDRESS + 0x40);
        assert_eq!(slice.offset(), 0x40);
        assert_eq!(slice.length(), 0xC0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_view_with_other_memory_asserts() {
        let mut resource = SceResource::from_buffer(buffer(ADDRESS, SIZE));
        resource.set_texture(texture(ADDRESS + 0x1000));
    }
}
