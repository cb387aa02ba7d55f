//! console 的资源描述符
//!
//! V# / T# / S# 是 shader 直接读取的定长描述符，render target 和 depth target 则是一组寄存器。
//! 这里只解码翻译层需要的字段。

use ash::vk;

/// `BUF_DATA_FORMAT` / `IMG_DATA_FORMAT`
pub mod data_format {
    pub const FMT_8: u32 = 1;
    pub const FMT_16: u32 = 2;
    pub const FMT_8_8: u32 = 3;
    pub const FMT_32: u32 = 4;
    pub const FMT_16_16: u32 = 5;
    pub const FMT_10_11_11: u32 = 6;
    pub const FMT_11_11_10: u32 = 7;
    pub const FMT_10_10_10_2: u32 = 8;
    pub const FMT_2_10_10_10: u32 = 9;
    pub const FMT_8_8_8_8: u32 = 10;
    pub const FMT_32_32: u32 = 11;
    pub const FMT_16_16_16_16: u32 = 12;
    pub const FMT_32_32_32: u32 = 13;
    pub const FMT_32_32_32_32: u32 = 14;
}

/// 每个元素的字节数，未知格式返回 0
pub fn bytes_per_element(format: u32) -> u32 {
    use data_format::*;
    match format {
        FMT_8 => 1,
        FMT_16 | FMT_8_8 => 2,
        FMT_32 | FMT_16_16 | FMT_10_11_11 | FMT_11_11_10 | FMT_10_10_10_2 | FMT_2_10_10_10 | FMT_8_8_8_8 => 4,
        FMT_32_32 | FMT_16_16_16_16 => 8,
        FMT_32_32_32 => 12,
        FMT_32_32_32_32 => 16,
        _ => 0,
    }
}

/// unorm 的对应格式，display buffer 使用
pub fn vk_format(format: u32) -> vk::Format {
    use data_format::*;
    match format {
        FMT_8 => vk::Format::R8_UNORM,
        FMT_8_8 => vk::Format::R8G8_UNORM,
        FMT_8_8_8_8 => vk::Format::R8G8B8A8_UNORM,
        FMT_2_10_10_10 => vk::Format::A2B10G10R10_UNORM_PACK32,
        FMT_16_16_16_16 => vk::Format::R16G16B16A16_UNORM,
        FMT_32 => vk::Format::R32_SFLOAT,
        FMT_32_32_32_32 => vk::Format::R32G32B32A32_SFLOAT,
        _ => vk::Format::UNDEFINED,
    }
}

/// V#
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GnmBuffer {
    pub dwords: [u32; 4],
}
impl GnmBuffer {
    /// `stride` 为 0 时 `num_records` 以字节计
    pub fn new(base_address: u64, stride: u32, num_records: u32) -> Self {
        debug_assert!(base_address < 1 << 44);
        debug_assert!(stride < 1 << 14);
        Self {
            dwords: [
                base_address as u32,
                ((base_address >> 32) as u32 & 0xFFF) | ((stride & 0x3FFF) << 16),
                num_records,
                0,
            ],
        }
    }

    #[inline]
    pub fn base_address(&self) -> u64 {
        self.dwords[0] as u64 | ((self.dwords[1] & 0xFFF) as u64) << 32
    }

    #[inline]
    pub fn stride(&self) -> u32 {
        (self.dwords[1] >> 16) & 0x3FFF
    }

    #[inline]
    pub fn num_records(&self) -> u32 {
        self.dwords[2]
    }

    pub fn size(&self) -> u64 {
        match self.stride() {
            0 => self.num_records() as u64,
            stride => stride as u64 * self.num_records() as u64,
        }
    }
}

/// T#，只支持线性排布的 2D 纹理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GnmTexture {
    pub dwords: [u32; 8],
}
impl GnmTexture {
    pub fn new(base_address: u64, width: u32, height: u32, format: u32) -> Self {
        debug_assert!(base_address % 256 == 0);
        debug_assert!((1..=16384).contains(&width) && (1..=16384).contains(&height));
        let base_256b = base_address >> 8;
        let mut dwords = [0u32; 8];
        dwords[0] = base_256b as u32;
        dwords[1] = ((base_256b >> 32) as u32 & 0xFF) | ((format & 0x3F) << 20);
        dwords[2] = ((width - 1) & 0x3FFF) | (((height - 1) & 0x3FFF) << 14);
        Self { dwords }
    }

    #[inline]
    pub fn base_address(&self) -> u64 {
        (self.dwords[0] as u64 | ((self.dwords[1] & 0xFF) as u64) << 32) << 8
    }

    #[inline]
    pub fn data_format(&self) -> u32 {
        (self.dwords[1] >> 20) & 0x3F
    }

    #[inline]
    pub fn width(&self) -> u32 {
        (self.dwords[2] & 0x3FFF) + 1
    }

    #[inline]
    pub fn height(&self) -> u32 {
        ((self.dwords[2] >> 14) & 0x3FFF) + 1
    }

    pub fn size(&self) -> u64 {
        self.width() as u64 * self.height() as u64 * bytes_per_element(self.data_format()) as u64
    }
}

/// S#
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GnmSampler {
    pub dwords: [u32; 4],
}
impl GnmSampler {
    fn address_mode(bits: u32) -> vk::SamplerAddressMode {
        match bits & 0x7 {
            0 => vk::SamplerAddressMode::REPEAT,
            1 => vk::SamplerAddressMode::MIRRORED_REPEAT,
            2 => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            3 => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
            _ => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }

    fn filter(bits: u32) -> vk::Filter {
        match bits & 0x3 {
            0 => vk::Filter::NEAREST,
            _ => vk::Filter::LINEAR,
        }
    }

    pub fn address_mode_u(&self) -> vk::SamplerAddressMode {
        Self::address_mode(self.dwords[0])
    }

    pub fn address_mode_v(&self) -> vk::SamplerAddressMode {
        Self::address_mode(self.dwords[0] >> 3)
    }

    pub fn address_mode_w(&self) -> vk::SamplerAddressMode {
        Self::address_mode(self.dwords[0] >> 6)
    }

    pub fn mag_filter(&self) -> vk::Filter {
        Self::filter(self.dwords[2] >> 20)
    }

    pub fn min_filter(&self) -> vk::Filter {
        Self::filter(self.dwords[2] >> 22)
    }
}

/// CB_COLOR* 寄存器
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GnmRenderTarget {
    /// CB_COLOR_BASE，地址右移 8 位
    pub base_256b: u32,
    pub width: u32,
    pub height: u32,
    pub data_format: u32,
}
impl GnmRenderTarget {
    pub fn new(base_address: u64, width: u32, height: u32, data_format: u32) -> Self {
        debug_assert!(base_address % 256 == 0);
        Self {
            base_256b: (base_address >> 8) as u32,
            width,
            height,
            data_format,
        }
    }

    #[inline]
    pub fn base_address(&self) -> u64 {
        (self.base_256b as u64) << 8
    }

    pub fn size(&self) -> u64 {
        self.width as u64 * self.height as u64 * bytes_per_element(self.data_format) as u64
    }
}

/// DB_* 寄存器，只关心 depth 平面
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GnmDepthRenderTarget {
    /// DB_Z_READ_BASE，地址右移 8 位
    pub z_read_base_256b: u32,
    pub width: u32,
    pub height: u32,
    pub z_format: vk::Format,
}
impl GnmDepthRenderTarget {
    pub fn new(base_address: u64, width: u32, height: u32, z_format: vk::Format) -> Self {
        debug_assert!(base_address % 256 == 0);
        Self {
            z_read_base_256b: (base_address >> 8) as u32,
            width,
            height,
            z_format,
        }
    }

    #[inline]
    pub fn base_address(&self) -> u64 {
        (self.z_read_base_256b as u64) << 8
    }

    pub fn size(&self) -> u64 {
        let bytes = match self.z_format {
            vk::Format::D16_UNORM => 2,
            _ => 4,
        };
        self.width as u64 * self.height as u64 * bytes
    }
}
