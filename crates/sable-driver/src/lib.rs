//! console 侧的 GPU 命令执行层
//!
//! - [`sce`]：console 资源描述符（V# / T# / S# 以及 render target 寄存器）、统一的资源对象和每帧的资源追踪
//! - [`queue`]：PM4 命令处理器以及基于宿主队列的虚拟队列
//! - [`driver`]：Gnm driver 入口，负责同步提交、present 和 compute 队列的映射
//! - [`memory`]：模拟的统一内存，command buffer、ring buffer 和读指针都在其中
//!
//! 整个提交路径只在一个线程上运行。

pub mod config;
pub mod driver;
pub mod error;
pub mod memory;
pub mod presenter;
pub mod queue;
pub mod sce;

pub use error::{DriverError, DriverResult, SCE_OK, SceError};
