use crate::commands::command_list::GfxCommandList;

/// 一次提交给宿主队列的工作
///
/// 目前每次提交只携带一个命令列表
pub struct GfxSubmission {
    pub command_list: GfxCommandList,
}
impl GfxSubmission {
    pub fn new(command_list: GfxCommandList) -> Self {
        Self { command_list }
    }

    #[inline]
    pub fn label(&self) -> &str {
        self.command_list.label()
    }
}
