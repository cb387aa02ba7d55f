use std::rc::Rc;

use ash::vk;
use sable_gfx::context::GfxContext;
use sable_gfx::foundation::host::GfxQueueKind;
use sable_gfx::pipelines::shader::GfxShader;

use crate::DriverResult;
use crate::sce::tracker::SceResourceTracker;

/// 解释 command buffer，把其中的命令录制到上下文中
///
/// 调用时上下文已经处于录制状态，处理器不负责 begin / end
pub trait CommandProcessor {
    fn process(&mut self, ctx: &mut GfxContext, tracker: &mut SceResourceTracker, dwords: &[u32]) -> DriverResult<()>;
}

/// 每个虚拟队列拥有一个独立的处理器
pub trait CommandProcessorFactory {
    fn create(&self, kind: GfxQueueKind) -> Box<dyn CommandProcessor>;
}

/// shader 编译器一侧：把 guest 中 shader 程序的地址变成编译好的 shader
pub trait ShaderResolver {
    fn resolve(&self, stage: vk::ShaderStageFlags, address: u64) -> Option<Rc<GfxShader>>;
}
