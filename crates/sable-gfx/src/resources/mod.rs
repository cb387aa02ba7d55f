//! Vulkan 资源对象
//!
//! 这些对象只是对已创建好的 Vulkan 句柄的封装：分配由外部的内存管理负责。
//! 通过 `Rc` 在资源模型和命令列表之间共享，最后一个引用释放时才交还设备销毁。

pub mod buffer;
pub mod image;
pub mod memory;
pub mod sampler;
