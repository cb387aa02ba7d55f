use ash::vk;

use crate::commands::command_list::{GfxCommand, GfxCommandList};

/// barrier 使用的 src 和 dst 访问 mask
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxBarrierMask {
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_access: vk::AccessFlags2,
}
impl GfxBarrierMask {
    /// 只根据前后两个 layout 推断保守的 stage 和 access
    pub fn for_layout(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        let (src_stage, src_access) = layout_stage_access(old_layout);
        let (dst_stage, dst_access) = layout_stage_access(new_layout);
        Self {
            src_stage,
            dst_stage,
            src_access,
            dst_access,
        }
    }

    /// 两次访问合并为一次
    #[inline]
    pub fn merge(self, other: Self) -> Self {
        Self {
            src_stage: self.src_stage | other.src_stage,
            dst_stage: self.dst_stage | other.dst_stage,
            src_access: self.src_access | other.src_access,
            dst_access: self.dst_access | other.dst_access,
        }
    }
}

/// 某个 layout 下 image 可能被访问的 stage 和方式
fn layout_stage_access(layout: vk::ImageLayout) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    match layout {
        vk::ImageLayout::UNDEFINED | vk::ImageLayout::PREINITIALIZED => {
            (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE)
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::SHADER_READ,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL | vk::ImageLayout::READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags2::VERTEX_SHADER
                | vk::PipelineStageFlags2::FRAGMENT_SHADER
                | vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_READ,
        ),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
        }
        // 呈现引擎通过 semaphore 同步，这里只需要保证之前的写入完成
        vk::ImageLayout::PRESENT_SRC_KHR => (vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::NONE),
        _ => (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        ),
    }
}

/// 便捷创建 image memory barrier 的结构体
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}
impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::UNDEFINED,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                ..Default::default()
            },
        }
    }
}
impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'static> {
        &self.inner
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn mask(mut self, mask: GfxBarrierMask) -> Self {
        self.inner.src_stage_mask = mask.src_stage;
        self.inner.dst_stage_mask = mask.dst_stage;
        self.inner.src_access_mask = mask.src_access;
        self.inner.dst_access_mask = mask.dst_access;
        self
    }

    /// builder
    #[inline]
    pub fn subresource_range(mut self, range: vk::ImageSubresourceRange) -> Self {
        self.inner.subresource_range = range;
        self
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.inner.image = image;
        self
    }

    #[inline]
    pub fn build(self) -> vk::ImageMemoryBarrier2<'static> {
        self.inner
    }
}

pub struct GfxBufferBarrier {
    inner: vk::BufferMemoryBarrier2<'static>,
}
impl Default for GfxBufferBarrier {
    fn default() -> Self {
        Self {
            inner: vk::BufferMemoryBarrier2 {
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                ..Default::default()
            },
        }
    }
}
impl GfxBufferBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mask(mut self, mask: GfxBarrierMask) -> Self {
        self.inner.src_stage_mask = mask.src_stage;
        self.inner.dst_stage_mask = mask.dst_stage;
        self.inner.src_access_mask = mask.src_access;
        self.inner.dst_access_mask = mask.dst_access;
        self
    }

    #[inline]
    pub fn buffer(mut self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        self.inner.buffer = buffer;
        self.inner.offset = offset;
        self.inner.size = size;
        self
    }

    #[inline]
    pub fn build(self) -> vk::BufferMemoryBarrier2<'static> {
        self.inner
    }
}

/// 一次 PipelineBarrier 命令携带的全部 barrier
#[derive(Clone, Debug, Default)]
pub struct GfxBarrierBatch {
    pub memory: Option<vk::MemoryBarrier2<'static>>,
    pub buffers: Vec<vk::BufferMemoryBarrier2<'static>>,
    pub images: Vec<vk::ImageMemoryBarrier2<'static>>,
}
impl GfxBarrierBatch {
    #[inline]
    pub fn len(&self) -> usize {
        self.memory.iter().count() + self.buffers.len() + self.images.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ranges_overlap(a: &vk::ImageSubresourceRange, b: &vk::ImageSubresourceRange) -> bool {
    fn overlap(base_a: u32, count_a: u32, base_b: u32, count_b: u32) -> bool {
        let end_a = base_a.saturating_add(count_a);
        let end_b = base_b.saturating_add(count_b);
        base_a < end_b && base_b < end_a
    }

    a.aspect_mask.intersects(b.aspect_mask)
        && overlap(a.base_mip_level, a.level_count, b.base_mip_level, b.level_count)
        && overlap(a.base_array_layer, a.layer_count, b.base_array_layer, b.layer_count)
}

/// 累积的 barrier 集合
///
/// layout 转换和资源访问不会立即写入命令列表，而是先放在这里，
/// 在下一个依赖它们的 draw / dispatch / transfer 之前合并成一条 PipelineBarrier。
/// 同一个 image 的子资源在一个批次中只能出现一次，调用者需要先用
/// [`GfxBarrierSet::is_image_dirty`] 检查，冲突时先 flush。
#[derive(Default)]
pub struct GfxBarrierSet {
    memory: Option<GfxBarrierMask>,
    buffers: Vec<vk::BufferMemoryBarrier2<'static>>,
    images: Vec<vk::ImageMemoryBarrier2<'static>>,
}
impl GfxBarrierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access_image(
        &mut self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mask: GfxBarrierMask,
    ) {
        debug_assert!(!self.is_image_dirty(image, &range), "image {image:?} already has a pending barrier");
        self.images.push(
            GfxImageBarrier::new()
                .image(image)
                .subresource_range(range)
                .layout_transfer(old_layout, new_layout)
                .mask(mask)
                .build(),
        );
    }

    /// buffer 的访问，区间与已有 barrier 完全相同时合并 mask
    pub fn access_buffer(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        mask: GfxBarrierMask,
    ) {
        if let Some(barrier) =
            self.buffers.iter_mut().find(|b| b.buffer == buffer && b.offset == offset && b.size == size)
        {
            let merged = GfxBarrierMask {
                src_stage: barrier.src_stage_mask,
                dst_stage: barrier.dst_stage_mask,
                src_access: barrier.src_access_mask,
                dst_access: barrier.dst_access_mask,
            }
            .merge(mask);
            *barrier = GfxBufferBarrier::new().buffer(buffer, offset, size).mask(merged).build();
            return;
        }
        self.buffers.push(GfxBufferBarrier::new().buffer(buffer, offset, size).mask(mask).build());
    }

    /// 全局的 memory barrier，所有调用合并为一个
    pub fn access_memory(&mut self, mask: GfxBarrierMask) {
        self.memory = Some(self.memory.map_or(mask, |m| m.merge(mask)));
    }

    /// 该 image 的子资源是否已经有尚未写入的 barrier
    pub fn is_image_dirty(&self, image: vk::Image, range: &vk::ImageSubresourceRange) -> bool {
        self.images.iter().any(|b| b.image == image && ranges_overlap(&b.subresource_range, range))
    }

    pub fn is_buffer_dirty(&self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> bool {
        self.buffers.iter().any(|b| {
            b.buffer == buffer && b.offset < offset.saturating_add(size) && offset < b.offset.saturating_add(b.size)
        })
    }

    #[inline]
    pub fn has_memory_barrier(&self) -> bool {
        self.memory.is_some()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.buffers.is_empty() && self.images.is_empty()
    }

    /// 把累积的 barrier 作为一条命令写入命令列表并清空
    pub fn record_commands(&mut self, cmd: &mut GfxCommandList) {
        if self.is_empty() {
            return;
        }

        let batch = GfxBarrierBatch {
            memory: self.memory.take().map(|m| {
                vk::MemoryBarrier2::default()
                    .src_stage_mask(m.src_stage)
                    .src_access_mask(m.src_access)
                    .dst_stage_mask(m.dst_stage)
                    .dst_access_mask(m.dst_access)
            }),
            buffers: std::mem::take(&mut self.buffers),
            images: std::mem::take(&mut self.images),
        };
        cmd.push(GfxCommand::PipelineBarrier(batch));
    }
}
