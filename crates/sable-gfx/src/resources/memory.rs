use ash::vk;

/// 一块 backing allocation 的两种地址
///
/// 同一块内存可以同时被看作 buffer 和 image，因此地址和大小都放在这里，而不是放在具体的资源上
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxMemory {
    /// 模拟器分配的统一 GPU 内存，也就是 guest 看到的地址
    pub cpu_address: u64,
    /// 对应的 Vulkan memory
    pub device_memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GfxMemory {
    #[inline]
    pub fn new(cpu_address: u64, device_memory: vk::DeviceMemory, size: vk::DeviceSize) -> Self {
        Self {
            cpu_address,
            device_memory,
            size,
        }
    }

    /// `address` 是否落在这块内存内
    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.cpu_address && address - self.cpu_address < self.size
    }
}
