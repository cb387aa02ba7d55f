use ash::vk;
use sable_gfx::GfxError;

use crate::memory::GuestMemoryError;
use crate::queue::pm4::Pm4Error;

pub const SCE_OK: i32 = 0;

/// Gnm 接口返回给游戏的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SceError {
    #[error("compute queue: invalid pipe id")]
    InvalidPipeId,
    #[error("compute queue: invalid queue id")]
    InvalidQueueId,
    #[error("compute queue: ring size is not a power of two")]
    InvalidRingSize,
    #[error("compute queue: ring base address is not 256-byte aligned")]
    InvalidRingBaseAddress,
    #[error("compute queue: read pointer address is not 4-byte aligned")]
    InvalidReadPtrAddress,
    #[error("unknown gnm error")]
    Unknown,
}
impl SceError {
    pub const fn code(self) -> i32 {
        let code: u32 = match self {
            Self::InvalidPipeId => 0x80D1_7000,
            Self::InvalidQueueId => 0x80D1_7001,
            Self::InvalidRingSize => 0x80D1_7002,
            Self::InvalidRingBaseAddress => 0x80D1_7003,
            Self::InvalidReadPtrAddress => 0x80D1_7004,
            Self::Unknown => 0x8EEE_EEFF,
        };
        code as i32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Gfx(#[from] GfxError),

    #[error(transparent)]
    GuestMemory(#[from] GuestMemoryError),

    #[error("malformed command buffer: {0}")]
    Pm4(#[from] Pm4Error),

    #[error(transparent)]
    Sce(#[from] SceError),

    #[error("presenter has no display buffer {0}")]
    MissingDisplayBuffer(u32),

    #[error("present failed: {0}")]
    Present(String),

    #[error("virtual queue {0} is not mapped")]
    UnmappedQueue(u32),

    #[error("no tracked resource at {0:#x}")]
    UntrackedResource(u64),

    #[error("no {stage:?} shader at {address:#x}")]
    UnresolvedShader { stage: vk::ShaderStageFlags, address: u64 },
}
impl DriverError {
    /// 返回给游戏的错误码，没有对应 Gnm 错误码的一律为 unknown
    pub fn code(&self) -> i32 {
        match self {
            Self::Sce(e) => e.code(),
            _ => SceError::Unknown.code(),
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
