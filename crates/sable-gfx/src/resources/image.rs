use std::rc::Rc;
use std::sync::Arc;

use ash::vk;

use crate::foundation::host::{GfxOwnedObject, HostDevice};
use crate::resources::memory::GfxMemory;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImageDesc {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: vk::ImageUsageFlags,
    /// image 在两次使用之间保持的 layout
    ///
    /// 作为 attachment 使用时会先转换到 attachment layout，结束后再转换回来
    pub layout: vk::ImageLayout,
}
impl GfxImageDesc {
    pub fn new_2d(
        format: vk::Format,
        width: u32,
        height: u32,
        usage: vk::ImageUsageFlags,
        layout: vk::ImageLayout,
    ) -> Self {
        Self {
            format,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            usage,
            layout,
        }
    }
}

pub struct GfxImage {
    handle: vk::Image,
    desc: GfxImageDesc,
    memory: GfxMemory,

    owner: Option<Arc<dyn HostDevice>>,
    name: String,
}
// new & init
impl GfxImage {
    /// 接管一个已经创建好的 image，drop 时交给 device 销毁
    pub fn new(
        device: Arc<dyn HostDevice>,
        handle: vk::Image,
        desc: GfxImageDesc,
        memory: GfxMemory,
        name: impl AsRef<str>,
    ) -> Self {
        Self {
            handle,
            desc,
            memory,
            owner: Some(device),
            name: name.as_ref().to_string(),
        }
    }

    /// 生命周期由外部管理的 image，例如 swapchain image
    pub fn external(handle: vk::Image, desc: GfxImageDesc, memory: GfxMemory, name: impl AsRef<str>) -> Self {
        Self {
            handle,
            desc,
            memory,
            owner: None,
            name: name.as_ref().to_string(),
        }
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageDesc {
        &self.desc
    }

    #[inline]
    pub fn memory(&self) -> &GfxMemory {
        &self.memory
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 根据 format 推断 aspect
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        format_aspect(self.desc.format)
    }

    /// 覆盖所有 mip 和 layer 的 subresource range
    pub fn full_subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect(),
            base_mip_level: 0,
            level_count: self.desc.mip_levels,
            base_array_layer: 0,
            layer_count: self.desc.array_layers,
        }
    }

    /// 某个 mip level 的尺寸
    pub fn mip_level_extent(&self, level: u32) -> vk::Extent3D {
        let extent = self.desc.extent;
        vk::Extent3D {
            width: (extent.width >> level).max(1),
            height: (extent.height >> level).max(1),
            depth: (extent.depth >> level).max(1),
        }
    }
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        if let Some(device) = self.owner.take() {
            log::trace!("destroying image: {}", self.name);
            device.destroy_object(GfxOwnedObject::Image(self.handle));
        }
    }
}
impl std::fmt::Debug for GfxImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Image({}, {:?}, {:?})", self.name, self.handle, self.desc.format)
    }
}

/// 根据 format 推断 image aspect（简化版本）
pub fn format_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => vk::ImageAspectFlags::DEPTH,

        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,

        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }

        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageViewDesc {
    /// format 可以基于 vk::Image 重解释
    pub format: vk::Format,
    pub view_type: vk::ImageViewType,
    pub aspect_mask: vk::ImageAspectFlags,
    /// base mip level 和 mip level count
    pub mip: (u32, u32),
    /// base layer 和 layer count
    pub layers: (u32, u32),
}
impl GfxImageViewDesc {
    pub fn new_2d(format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            format,
            view_type: vk::ImageViewType::TYPE_2D,
            aspect_mask: aspect,
            mip: (0, 1),
            layers: (0, 1),
        }
    }
}

pub struct GfxImageView {
    handle: vk::ImageView,
    image: Rc<GfxImage>,
    desc: GfxImageViewDesc,

    owner: Option<Arc<dyn HostDevice>>,
}
// new & init
impl GfxImageView {
    pub fn new(
        device: Option<Arc<dyn HostDevice>>,
        handle: vk::ImageView,
        image: Rc<GfxImage>,
        desc: GfxImageViewDesc,
    ) -> Self {
        Self {
            handle,
            image,
            desc,
            owner: device,
        }
    }
}
// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    #[inline]
    pub fn image(&self) -> &Rc<GfxImage> {
        &self.image
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageViewDesc {
        &self.desc
    }

    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.desc.aspect_mask,
            base_mip_level: self.desc.mip.0,
            level_count: self.desc.mip.1,
            base_array_layer: self.desc.layers.0,
            layer_count: self.desc.layers.1,
        }
    }

    /// view 的第一个 mip level 的尺寸
    pub fn extent(&self) -> vk::Extent3D {
        self.image.mip_level_extent(self.desc.mip.0)
    }
}
impl Drop for GfxImageView {
    fn drop(&mut self) {
        if let Some(device) = self.owner.take() {
            device.destroy_object(GfxOwnedObject::ImageView(self.handle));
        }
    }
}
impl std::fmt::Display for GfxImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ImageView({}, {:?})", self.image.name(), self.handle)
    }
}
impl std::fmt::Debug for GfxImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
