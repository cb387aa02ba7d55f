use crate::sce::resource::SceRenderTarget;

/// swapchain 一侧
///
/// display buffer 是 swapchain 中的 image，以 render target 的形式交给 driver 追踪
pub trait ScePresenter {
    fn display_buffer(&self, index: u32) -> Option<SceRenderTarget>;

    /// 阻塞直到 present 引擎接收这张 image
    fn present(&mut self, index: u32) -> Result<(), String>;
}

/// 窗口系统的事件队列，在 `submit_done` 时处理
pub trait SceWindowEvents {
    fn poll_events(&mut self);
}

/// 没有窗口时使用
#[derive(Debug, Default)]
pub struct NoWindowEvents;
impl SceWindowEvents for NoWindowEvents {
    fn poll_events(&mut self) {}
}
