use std::time::Duration;

use ash::vk;

/// GFX 层的错误类型
///
/// 协议错误（例如在 begin/end 之外录制）不在这里，而是直接 panic
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("vulkan call failed: {0}")]
    Vk(#[from] vk::Result),

    /// shader 组合无法构成合法的 pipeline，没有可以退回的 pipeline
    #[error("cannot build pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid shader entry point: {0:?}")]
    InvalidShaderEntryPoint(String),

    #[error("device lost")]
    DeviceLost,

    #[error("queue did not finish within {0:?}")]
    Timeout(Duration),
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    /// 区分 device lost 和其他 vulkan 错误
    pub fn from_vk(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            other => Self::Vk(other),
        }
    }
}
