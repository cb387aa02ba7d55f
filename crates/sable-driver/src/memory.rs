//! 模拟的统一内存
//!
//! console 上 CPU 和 GPU 共享同一块地址空间，command buffer、ring buffer 以及读指针都用这个地址访问。

use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("guest memory access out of bounds: address={address:#x}, len={len:#x}")]
pub struct GuestMemoryError {
    pub address: u64,
    pub len: usize,
}

pub trait GuestMemory {
    fn read(&self, address: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError>;
    fn write(&self, address: u64, src: &[u8]) -> Result<(), GuestMemoryError>;

    fn read_u32(&self, address: u64) -> Result<u32, GuestMemoryError> {
        let mut bytes = [0u8; 4];
        self.read(address, &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn write_u32(&self, address: u64, value: u32) -> Result<(), GuestMemoryError> {
        self.write(address, &value.to_le_bytes())
    }

    /// 从 `address` 开始读取 `count` 个 dword
    fn read_dwords(&self, address: u64, count: usize) -> Result<Vec<u32>, GuestMemoryError> {
        let mut bytes = vec![0u8; count * 4];
        self.read(address, &mut bytes)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn write_dwords(&self, address: u64, dwords: &[u32]) -> Result<(), GuestMemoryError> {
        let bytes = dwords.iter().flat_map(|d| d.to_le_bytes()).collect::<Vec<_>>();
        self.write(address, &bytes)
    }
}

/// 从 `base` 开始的一段连续内存，用于测试和无头运行
#[derive(Debug)]
pub struct VecGuestMemory {
    base: u64,
    mem: RefCell<Vec<u8>>,
}
impl VecGuestMemory {
    pub fn new(size_bytes: usize) -> Self {
        Self::with_base(0, size_bytes)
    }

    pub fn with_base(base: u64, size_bytes: usize) -> Self {
        Self {
            base,
            mem: RefCell::new(vec![0u8; size_bytes]),
        }
    }

    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    fn range(&self, address: u64, len: usize) -> Result<std::ops::Range<usize>, GuestMemoryError> {
        let err = GuestMemoryError { address, len };
        let start = address.checked_sub(self.base).ok_or(err)?;
        let start = usize::try_from(start).map_err(|_| err)?;
        let end = start.checked_add(len).ok_or(err)?;
        if end > self.mem.borrow().len() {
            return Err(err);
        }
        Ok(start..end)
    }
}
impl GuestMemory for VecGuestMemory {
    fn read(&self, address: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let range = self.range(address, dst.len())?;
        dst.copy_from_slice(&self.mem.borrow()[range]);
        Ok(())
    }

    fn write(&self, address: u64, src: &[u8]) -> Result<(), GuestMemoryError> {
        let range = self.range(address, src.len())?;
        self.mem.borrow_mut()[range].copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dwords_are_little_endian() {
        let memory = VecGuestMemory::with_base(0x1000, 64);
        memory.write_dwords(0x1010, &[0xDEAD_BEEF, 7]).unwrap();

        let mut bytes = [0u8; 4];
        memory.read(0x1010, &mut bytes).unwrap();
        assert_eq!(bytes, [0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(memory.read_dwords(0x1010, 2).unwrap(), [0xDEAD_BEEF, 7]);
    }

    #[test]
    fn test_out_of_bounds() {
        let memory = VecGuestMemory::with_base(0x1000, 64);
        assert_eq!(
            memory.read_u32(0x0FFC),
            Err(GuestMemoryError {
                address: 0x0FFC,
                len: 4
            })
        );
        assert!(memory.write_u32(0x103C, 1).is_ok());
        assert!(memory.write_u32(0x103E, 1).is_err());
        assert!(memory.read_dwords(u64::MAX - 2, 1).is_err());
    }
}
