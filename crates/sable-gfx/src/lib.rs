//! Vulkan 翻译层
//!
//! 把 console 风格的 "直接写寄存器" 命令模型翻译为显式 API 的资源绑定、barrier 和 pipeline 模型。
//!
//! - [`foundation`]：宿主设备与队列的抽象（[`foundation::host::HostDevice`]），以及 ash / null 两种实现
//! - [`commands`]：barrier 集合与软件命令列表，命令列表最终由宿主队列回放到 `vk::CommandBuffer`
//! - [`context`]：渲染上下文状态机，负责 pipeline 查找、barrier 合并和命令录制
//! - [`pipelines`]：编译后的 shader 对象以及定长的 pipeline 查找缓存
//! - [`sync`]：可复用的 GPU event 池
//!
//! 所有录制相关的类型都只在提交线程上使用（`Rc` 共享），只有 event 池可以跨线程。

pub mod commands;
pub mod context;
pub mod error;
pub mod foundation;
pub mod pipelines;
pub mod resources;
pub mod sync;

pub use error::{GfxError, GfxResult};
