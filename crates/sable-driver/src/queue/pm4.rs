//! PM4 command buffer
//!
//! 每个 packet 以一个 header dword 开始：
//! - `[31:30]` packet 类型
//! - type 0：`[29:16]` 为 body 长度减一，`[15:0]` 为寄存器起始编号
//! - type 2：只有 header 的填充
//! - type 3：`[29:16]` 为 body 长度减一，`[15:8]` 为 opcode，`[0]` 为 predicate
//!
//! 处理器只解释翻译层关心的 opcode，其余 packet 跳过。

use std::rc::Rc;

use ash::vk;
use sable_gfx::context::{GfxAttachment, GfxContext};
use sable_gfx::foundation::host::GfxQueueKind;
use sable_gfx::pipelines::shader::GfxShader;
use sable_gfx::resources::buffer::GfxBufferSlice;

use crate::queue::processor::{CommandProcessor, CommandProcessorFactory, ShaderResolver};
use crate::sce::tracker::SceResourceTracker;
use crate::{DriverError, DriverResult};

pub mod opcode {
    pub const NOP: u8 = 0x10;
    pub const SET_BASE: u8 = 0x11;
    pub const INDEX_BUFFER_SIZE: u8 = 0x13;
    pub const DISPATCH_DIRECT: u8 = 0x15;
    pub const DISPATCH_INDIRECT: u8 = 0x16;
    pub const DRAW_INDIRECT: u8 = 0x24;
    pub const DRAW_INDEX_INDIRECT: u8 = 0x25;
    pub const INDEX_BASE: u8 = 0x26;
    pub const DRAW_INDEX_2: u8 = 0x27;
    pub const INDEX_TYPE: u8 = 0x2A;
    pub const DRAW_INDEX_AUTO: u8 = 0x2D;
    pub const NUM_INSTANCES: u8 = 0x2F;
    pub const SET_CONTEXT_REG: u8 = 0x69;
    pub const SET_SH_REG: u8 = 0x76;
}

pub mod reg {
    pub const CONTEXT_REG_BASE: u32 = 0xA000;
    pub const SH_REG_BASE: u32 = 0x2C00;
    /// SET_SH_REG / SET_CONTEXT_REG 可以访问的寄存器窗口大小
    pub const REG_WINDOW_SIZE: u32 = 0x400;

    pub const SPI_SHADER_PGM_LO_PS: u32 = 0x2C08;
    pub const SPI_SHADER_PGM_HI_PS: u32 = 0x2C09;
    pub const SPI_SHADER_PGM_LO_VS: u32 = 0x2C48;
    pub const SPI_SHADER_PGM_HI_VS: u32 = 0x2C49;
    pub const COMPUTE_PGM_LO: u32 = 0x2E0C;
    pub const COMPUTE_PGM_HI: u32 = 0x2E0D;

    pub const DB_Z_READ_BASE: u32 = 0xA010;
    pub const CB_COLOR0_BASE: u32 = 0xA318;
}

/// `SET_BASE` 中 draw / dispatch indirect 参数的 base 编号
const BASE_INDEX_DRAW_INDEX: u32 = 1;
/// `DrawIndirectArgs`
const DRAW_INDIRECT_STRIDE: u32 = 16;
/// `DrawIndexIndirectArgs`
const DRAW_INDEX_INDIRECT_STRIDE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Pm4Error {
    #[error("packet at dword {offset} needs {needed} dwords, only {available} left")]
    Truncated { offset: usize, needed: usize, available: usize },

    #[error("reserved packet type {ty} at dword {offset}")]
    ReservedPacketType { offset: usize, ty: u32 },

    #[error("opcode {opcode:#x} at dword {offset} has only {len} body dwords")]
    ShortBody { offset: usize, opcode: u8, len: usize },

    #[error("opcode {opcode:#x} at dword {offset} writes {count} registers from {reg_offset:#x}, outside the register window")]
    RegisterOutOfRange { offset: usize, opcode: u8, reg_offset: u32, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pm4Header {
    Type0 { base_index: u32 },
    Type2,
    Type3 { opcode: u8, predicate: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct Pm4Packet<'a> {
    /// header 所在的 dword 位置
    pub offset: usize,
    pub header: Pm4Header,
    pub body: &'a [u32],
}

/// 按顺序读出 packet，遇到错误之后停止
pub struct Pm4PacketReader<'a> {
    dwords: &'a [u32],
    cursor: usize,
}
impl<'a> Pm4PacketReader<'a> {
    pub fn new(dwords: &'a [u32]) -> Self {
        Self { dwords, cursor: 0 }
    }

    fn fail(&mut self, error: Pm4Error) -> Option<Result<Pm4Packet<'a>, Pm4Error>> {
        self.cursor = self.dwords.len();
        Some(Err(error))
    }
}
impl<'a> Iterator for Pm4PacketReader<'a> {
    type Item = Result<Pm4Packet<'a>, Pm4Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.cursor;
        let header = *self.dwords.get(offset)?;
        let ty = header >> 30;
        let body_len = ((header >> 16) & 0x3FFF) as usize + 1;

        let (header, body_len) = match ty {
            0 => (
                Pm4Header::Type0 {
                    base_index: header & 0xFFFF,
                },
                body_len,
            ),
            2 => (Pm4Header::Type2, 0),
            3 => (
                Pm4Header::Type3 {
                    opcode: (header >> 8) as u8,
                    predicate: header & 1 != 0,
                },
                body_len,
            ),
            _ => return self.fail(Pm4Error::ReservedPacketType { offset, ty }),
        };

        let available = self.dwords.len() - offset - 1;
        if body_len > available {
            return self.fail(Pm4Error::Truncated {
                offset,
                needed: body_len + 1,
                available: available + 1,
            });
        }

        self.cursor = offset + 1 + body_len;
        Some(Ok(Pm4Packet {
            offset,
            header,
            body: &self.dwords[offset + 1..self.cursor],
        }))
    }
}

#[inline]
pub const fn pm4_type3_header(opcode: u8, body_len: usize) -> u32 {
    (3 << 30) | ((((body_len as u32).wrapping_sub(1)) & 0x3FFF) << 16) | ((opcode as u32) << 8)
}

#[inline]
pub const fn pm4_type2_header() -> u32 {
    2 << 30
}

/// 生成 command buffer，测试和工具使用
#[derive(Debug, Default, Clone)]
pub struct Pm4Builder {
    dwords: Vec<u32>,
}
impl Pm4Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packet(mut self, opcode: u8, body: &[u32]) -> Self {
        debug_assert!(!body.is_empty(), "type 3 packets carry at least one body dword");
        self.dwords.push(pm4_type3_header(opcode, body.len()));
        self.dwords.extend_from_slice(body);
        self
    }

    pub fn filler(mut self) -> Self {
        self.dwords.push(pm4_type2_header());
        self
    }

    pub fn set_sh_reg(self, reg: u32, values: &[u32]) -> Self {
        let body = std::iter::once(reg - reg::SH_REG_BASE).chain(values.iter().copied()).collect::<Vec<_>>();
        self.packet(opcode::SET_SH_REG, &body)
    }

    pub fn set_context_reg(self, reg: u32, values: &[u32]) -> Self {
        let body = std::iter::once(reg - reg::CONTEXT_REG_BASE).chain(values.iter().copied()).collect::<Vec<_>>();
        self.packet(opcode::SET_CONTEXT_REG, &body)
    }

    /// shader 程序地址按 256 字节对齐写入 lo / hi 两个寄存器
    pub fn set_shader_program(self, lo_reg: u32, address: u64) -> Self {
        debug_assert!(address % 256 == 0);
        self.set_sh_reg(lo_reg, &[(address >> 8) as u32, (address >> 40) as u32])
    }

    pub fn set_color_target(self, address: u64) -> Self {
        self.set_context_reg(reg::CB_COLOR0_BASE, &[(address >> 8) as u32])
    }

    pub fn set_depth_target(self, address: u64) -> Self {
        self.set_context_reg(reg::DB_Z_READ_BASE, &[(address >> 8) as u32])
    }

    pub fn draw_index_auto(self, index_count: u32) -> Self {
        self.packet(opcode::DRAW_INDEX_AUTO, &[index_count, 0])
    }

    pub fn dispatch_direct(self, x: u32, y: u32, z: u32) -> Self {
        self.packet(opcode::DISPATCH_DIRECT, &[x, y, z, 1])
    }

    pub fn build(self) -> Vec<u32> {
        self.dwords
    }
}

#[inline]
fn address_of(lo: u32, hi: u32) -> u64 {
    lo as u64 | (hi as u64) << 32
}

/// lo 寄存器是地址的 `[39:8]`，hi 寄存器是 `[47:40]`
#[inline]
fn program_address(regs: [u32; 2]) -> u64 {
    (regs[0] as u64) << 8 | ((regs[1] & 0xFF) as u64) << 40
}

fn min_body_len(op: u8) -> usize {
    match op {
        opcode::SET_BASE => 3,
        opcode::INDEX_BUFFER_SIZE | opcode::INDEX_TYPE | opcode::NUM_INSTANCES => 1,
        opcode::DISPATCH_DIRECT => 3,
        opcode::DISPATCH_INDIRECT | opcode::INDEX_BASE | opcode::SET_CONTEXT_REG | opcode::SET_SH_REG => 2,
        opcode::DRAW_INDIRECT | opcode::DRAW_INDEX_INDIRECT => 1,
        opcode::DRAW_INDEX_2 => 4,
        opcode::DRAW_INDEX_AUTO => 1,
        _ => 0,
    }
}

/// 翻译层关心的寄存器和 draw 状态
struct Pm4Registers {
    vs_program: [u32; 2],
    ps_program: [u32; 2],
    cs_program: [u32; 2],

    index_type: vk::IndexType,
    num_instances: u32,
    index_base: u64,
    /// index 的个数
    index_buffer_size: u32,
    draw_base: u64,
}
impl Default for Pm4Registers {
    fn default() -> Self {
        Self {
            vs_program: [0; 2],
            ps_program: [0; 2],
            cs_program: [0; 2],
            index_type: vk::IndexType::UINT16,
            num_instances: 1,
            index_base: 0,
            index_buffer_size: 0,
            draw_base: 0,
        }
    }
}

/// PM4 命令处理器
///
/// render target、index buffer 以及 indirect 参数都以 guest 地址给出，
/// 通过资源追踪器找到对应的宿主对象；shader 通过 [`ShaderResolver`] 得到。
pub struct Pm4CommandProcessor {
    kind: GfxQueueKind,
    shaders: Rc<dyn ShaderResolver>,
    regs: Pm4Registers,
}
impl Pm4CommandProcessor {
    pub fn new(kind: GfxQueueKind, shaders: Rc<dyn ShaderResolver>) -> Self {
        Self {
            kind,
            shaders,
            regs: Pm4Registers::default(),
        }
    }

    fn process_packet(
        &mut self,
        ctx: &mut GfxContext,
        tracker: &mut SceResourceTracker,
        packet: Pm4Packet<'_>,
    ) -> DriverResult<()> {
        let (op, body) = match packet.header {
            Pm4Header::Type2 => return Ok(()),
            Pm4Header::Type0 { base_index } => {
                log::trace!("skip type 0 packet at {}: register {:#x}", packet.offset, base_index);
                return Ok(());
            }
            Pm4Header::Type3 { opcode, .. } => (opcode, packet.body),
        };
        if body.len() < min_body_len(op) {
            return Err(Pm4Error::ShortBody {
                offset: packet.offset,
                opcode: op,
                len: body.len(),
            }
            .into());
        }

        let is_draw = matches!(
            op,
            opcode::DRAW_INDEX_AUTO | opcode::DRAW_INDEX_2 | opcode::DRAW_INDIRECT | opcode::DRAW_INDEX_INDIRECT
        );
        if is_draw && self.kind == GfxQueueKind::Compute {
            log::warn!("draw packet {:#x} on a compute queue is ignored", op);
            return Ok(());
        }

        match op {
            opcode::NOP => {}
            opcode::SET_SH_REG => {
                let first = register_window(packet.offset, op, reg::SH_REG_BASE, body)?;
                for (reg, value) in (first..).zip(&body[1..]) {
                    self.set_sh_reg(reg, *value);
                }
            }
            opcode::SET_CONTEXT_REG => {
                let first = register_window(packet.offset, op, reg::CONTEXT_REG_BASE, body)?;
                for (reg, value) in (first..).zip(&body[1..]) {
                    self.set_context_reg(ctx, tracker, reg, *value);
                }
            }
            opcode::INDEX_TYPE => {
                self.regs.index_type = match body[0] & 0x3 {
                    0 => vk::IndexType::UINT16,
                    _ => vk::IndexType::UINT32,
                };
            }
            opcode::NUM_INSTANCES => self.regs.num_instances = body[0].max(1),
            opcode::INDEX_BASE => self.regs.index_base = address_of(body[0], body[1] & 0xFFFF),
            opcode::INDEX_BUFFER_SIZE => self.regs.index_buffer_size = body[0],
            opcode::SET_BASE => {
                if body[0] & 0xF == BASE_INDEX_DRAW_INDEX {
                    self.regs.draw_base = address_of(body[1], body[2]);
                }
            }
            opcode::DRAW_INDEX_AUTO => {
                self.bind_graphics_shaders(ctx)?;
                ctx.draw(body[0], self.regs.num_instances, 0, 0)?;
            }
            opcode::DRAW_INDEX_2 => {
                let address = address_of(body[1], body[2]);
                ctx.bind_index_buffer(buffer_at(tracker, address)?, self.regs.index_type);
                self.bind_graphics_shaders(ctx)?;
                ctx.draw_indexed(body[3], self.regs.num_instances, 0, 0, 0)?;
            }
            opcode::DRAW_INDIRECT => {
                ctx.bind_draw_buffer(buffer_at(tracker, self.regs.draw_base)?);
                self.bind_graphics_shaders(ctx)?;
                ctx.draw_indirect(body[0] as vk::DeviceSize, 1, DRAW_INDIRECT_STRIDE)?;
            }
            opcode::DRAW_INDEX_INDIRECT => {
                log::trace!("indexed indirect draw, {} indices", self.regs.index_buffer_size);
                ctx.bind_index_buffer(buffer_at(tracker, self.regs.index_base)?, self.regs.index_type);
                ctx.bind_draw_buffer(buffer_at(tracker, self.regs.draw_base)?);
                self.bind_graphics_shaders(ctx)?;
                ctx.draw_indexed_indirect(body[0] as vk::DeviceSize, 1, DRAW_INDEX_INDIRECT_STRIDE)?;
            }
            opcode::DISPATCH_DIRECT => {
                self.bind_compute_shader(ctx)?;
                ctx.dispatch(glam::UVec3::new(body[0], body[1], body[2]))?;
            }
            opcode::DISPATCH_INDIRECT => {
                ctx.bind_draw_buffer(buffer_at(tracker, self.regs.draw_base)?);
                self.bind_compute_shader(ctx)?;
                ctx.dispatch_indirect(body[0] as vk::DeviceSize)?;
            }
            other => log::trace!("skip opcode {:#x} at {}", other, packet.offset),
        }
        Ok(())
    }

    fn set_sh_reg(&mut self, reg: u32, value: u32) {
        match reg {
            reg::SPI_SHADER_PGM_LO_VS => self.regs.vs_program[0] = value,
            reg::SPI_SHADER_PGM_HI_VS => self.regs.vs_program[1] = value,
            reg::SPI_SHADER_PGM_LO_PS => self.regs.ps_program[0] = value,
            reg::SPI_SHADER_PGM_HI_PS => self.regs.ps_program[1] = value,
            reg::COMPUTE_PGM_LO => self.regs.cs_program[0] = value,
            reg::COMPUTE_PGM_HI => self.regs.cs_program[1] = value,
            _ => {}
        }
    }

    fn set_context_reg(&mut self, ctx: &mut GfxContext, tracker: &SceResourceTracker, reg: u32, value: u32) {
        let address = (value as u64) << 8;
        match reg {
            reg::CB_COLOR0_BASE => {
                let Some(target) = tracker.find(address).and_then(|r| r.render_target()) else {
                    log::warn!("color target {:#x} is not tracked", address);
                    return;
                };
                let extent = target.view.extent();
                ctx.bind_render_target(
                    0,
                    GfxAttachment::new(target.view.clone(), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                );
                // 没有 viewport 寄存器时覆盖整个 render target
                ctx.set_viewports(&[vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }]);
                ctx.set_scissors(&[vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent: vk::Extent2D {
                        width: extent.width,
                        height: extent.height,
                    },
                }]);
            }
            reg::DB_Z_READ_BASE => {
                let Some(target) = tracker.find(address).and_then(|r| r.depth_render_target()) else {
                    log::warn!("depth target {:#x} is not tracked", address);
                    return;
                };
                ctx.bind_depth_render_target(GfxAttachment::new(
                    target.view.clone(),
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ));
            }
            _ => {}
        }
    }

    fn resolve(&self, stage: vk::ShaderStageFlags, address: u64) -> DriverResult<Rc<GfxShader>> {
        self.shaders
            .resolve(stage, address)
            .ok_or(DriverError::UnresolvedShader { stage, address })
    }

    /// vertex shader 必须存在，pixel shader 地址为 0 表示只写 depth
    fn bind_graphics_shaders(&self, ctx: &mut GfxContext) -> DriverResult<()> {
        let vs = self.resolve(vk::ShaderStageFlags::VERTEX, program_address(self.regs.vs_program))?;
        let ps = match program_address(self.regs.ps_program) {
            0 => None,
            address => Some(self.resolve(vk::ShaderStageFlags::FRAGMENT, address)?),
        };

        let shaders = &ctx.state().gp_shaders;
        let vs_changed = !same_shader(shaders.vs.as_ref(), Some(&vs));
        let ps_changed = !same_shader(shaders.fs.as_ref(), ps.as_ref());
        if vs_changed {
            ctx.bind_shader(vk::ShaderStageFlags::VERTEX, Some(vs));
        }
        if ps_changed {
            ctx.bind_shader(vk::ShaderStageFlags::FRAGMENT, ps);
        }
        Ok(())
    }

    fn bind_compute_shader(&self, ctx: &mut GfxContext) -> DriverResult<()> {
        let cs = self.resolve(vk::ShaderStageFlags::COMPUTE, program_address(self.regs.cs_program))?;
        if !same_shader(ctx.state().cp_shader.as_ref(), Some(&cs)) {
            ctx.bind_shader(vk::ShaderStageFlags::COMPUTE, Some(cs));
        }
        Ok(())
    }
}
impl CommandProcessor for Pm4CommandProcessor {
    fn process(&mut self, ctx: &mut GfxContext, tracker: &mut SceResourceTracker, dwords: &[u32]) -> DriverResult<()> {
        log::trace!("process {} dwords on {:?} queue", dwords.len(), self.kind);
        for packet in Pm4PacketReader::new(dwords) {
            self.process_packet(ctx, tracker, packet?)?;
        }
        Ok(())
    }
}

/// SET_*_REG 的第一个寄存器，整个写入区间必须落在寄存器窗口内
fn register_window(offset: usize, opcode: u8, base: u32, body: &[u32]) -> Result<u32, Pm4Error> {
    let reg_offset = body[0];
    let count = body.len() - 1;
    let end = reg_offset as u64 + count as u64;
    if end > reg::REG_WINDOW_SIZE as u64 {
        return Err(Pm4Error::RegisterOutOfRange {
            offset,
            opcode,
            reg_offset,
            count,
        });
    }
    Ok(base + reg_offset)
}

fn same_shader(a: Option<&Rc<GfxShader>>, b: Option<&Rc<GfxShader>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.cookie() == b.cookie(),
        (None, None) => true,
        _ => false,
    }
}

/// guest 地址处的 buffer，从该地址一直到 buffer 末尾
fn buffer_at(tracker: &SceResourceTracker, address: u64) -> DriverResult<GfxBufferSlice> {
    tracker
        .find_containing(address)
        .and_then(|resource| resource.buffer())
        .map(|buffer| buffer.slice_from(address))
        .ok_or(DriverError::UntrackedResource(address))
}

pub struct Pm4ProcessorFactory {
    shaders: Rc<dyn ShaderResolver>,
}
impl Pm4ProcessorFactory {
    pub fn new(shaders: Rc<dyn ShaderResolver>) -> Self {
        Self { shaders }
    }
}
impl CommandProcessorFactory for Pm4ProcessorFactory {
    fn create(&self, kind: GfxQueueKind) -> Box<dyn CommandProcessor> {
        Box::new(Pm4CommandProcessor::new(kind, self.shaders.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use sable_gfx::commands::command_list::GfxCommandList;
    use sable_gfx::foundation::null_device::NullHostDevice;
    use sable_gfx::pipelines::shader::{GfxInterfaceSlots, GfxShaderCreateInfo};

    use super::*;
    use crate::sce::resource::SceResource;
    use crate::sce::resource::tests::{ADDRESS, buffer, render_target};

    pub(crate) const VS_ADDRESS: u64 = 0x4_0000_0100;
    pub(crate) const PS_ADDRESS: u64 = 0x4_0000_0200;
    pub(crate) const CS_ADDRESS: u64 = 0x4_0000_0300;

    /// 地址到 shader 的固定映射
    #[derive(Default)]
    pub(crate) struct MapShaderResolver {
        shaders: HashMap<u64, Rc<GfxShader>>,
    }
    impl MapShaderResolver {
        pub(crate) fn with_defaults() -> Self {
            let mut resolver = Self::default();
            for (address, stage) in [
                (VS_ADDRESS, vk::ShaderStageFlags::VERTEX),
                (PS_ADDRESS, vk::ShaderStageFlags::FRAGMENT),
                (CS_ADDRESS, vk::ShaderStageFlags::COMPUTE),
            ] {
                let shader = GfxShader::new(GfxShaderCreateInfo {
                    stage,
                    entry_point: "main".to_string(),
                    code: vec![0x0723_0203],
                    resource_slots: vec![],
                    interface_slots: GfxInterfaceSlots::default(),
                    vertex_inputs: vec![],
                    immediate_constants: None,
                });
                resolver.shaders.insert(address, Rc::new(shader));
            }
            resolver
        }
    }
    impl ShaderResolver for MapShaderResolver {
        fn resolve(&self, stage: vk::ShaderStageFlags, address: u64) -> Option<Rc<GfxShader>> {
            self.shaders.get(&address).filter(|s| s.stage() == stage).cloned()
        }
    }

    fn context() -> GfxContext {
        sable_crate_tools::init_log::init_test_log();
        GfxContext::new(Arc::new(NullHostDevice::new()))
    }

    fn processor(kind: GfxQueueKind) -> Pm4CommandProcessor {
        Pm4CommandProcessor::new(kind, Rc::new(MapShaderResolver::with_defaults()))
    }

    fn run(
        processor: &mut Pm4CommandProcessor,
        tracker: &mut SceResourceTracker,
        dwords: &[u32],
    ) -> (DriverResult<()>, GfxCommandList) {
        let mut ctx = context();
        ctx.begin_recording(GfxCommandList::new("pm4"));
        let result = processor.process(&mut ctx, tracker, dwords);
        (result, ctx.end_recording())
    }

    #[test]
    fn test_reader_packet_sizes() {
        let dwords = Pm4Builder::new()
            .packet(opcode::NOP, &[0xAAAA, 0xBBBB])
            .filler()
            .draw_index_auto(3)
            .build();
        let packets = Pm4PacketReader::new(&dwords).collect::<Result<Vec<_>, _>>().unwrap();

        assert_eq!(packets.len(), 3);
        assert_eq!(
            packets[0].header,
            Pm4Header::Type3 {
                opcode: opcode::NOP,
                predicate: false
            }
        );
        assert_eq!(packets[0].body, [0xAAAA, 0xBBBB]);
        assert_eq!(packets[1].header, Pm4Header::Type2);
        assert_eq!(packets[1].offset, 3);
        assert_eq!(packets[2].offset, 4);
        assert_eq!(packets[2].body, [3, 0]);
    }

    #[test]
    fn test_reader_errors() {
        let mut dwords = Pm4Builder::new().draw_index_auto(3).build();
        dwords.pop();
        let mut reader = Pm4PacketReader::new(&dwords);
        assert_eq!(
            reader.next().unwrap().unwrap_err(),
            Pm4Error::Truncated {
                offset: 0,
                needed: 3,
                available: 2
            }
        );
        assert!(reader.next().is_none());

        let dwords = [pm4_type2_header(), 1 << 30];
        let errors = Pm4PacketReader::new(&dwords).filter_map(Result::err).collect::<Vec<_>>();
        assert_eq!(errors, [Pm4Error::ReservedPacketType { offset: 1, ty: 1 }]);
    }

    #[test]
    fn test_draw_into_tracked_target() {
        let mut tracker = SceResourceTracker::new();
        tracker.track_render_target(render_target(ADDRESS));

        let dwords = Pm4Builder::new()
            .set_color_target(ADDRESS)
            .set_shader_program(reg::SPI_SHADER_PGM_LO_VS, VS_ADDRESS)
            .set_shader_program(reg::SPI_SHADER_PGM_LO_PS, PS_ADDRESS)
            .draw_index_auto(3)
            .draw_index_auto(6)
            .build();
        let (result, list) = run(&mut processor(GfxQueueKind::Graphics), &mut tracker, &dwords);

        result.unwrap();
        assert_eq!(list.stats().draws, 2);
        assert_eq!(list.command_names().iter().filter(|n| **n == "BindPipeline").count(), 1);
        assert_eq!(list.command_names().iter().filter(|n| **n == "BeginRendering").count(), 1);
    }

    #[test]
    fn test_unresolved_vertex_shader() {
        let mut tracker = SceResourceTracker::new();
        tracker.track_render_target(render_target(ADDRESS));

        let dwords = Pm4Builder::new()
            .set_color_target(ADDRESS)
            .set_shader_program(reg::SPI_SHADER_PGM_LO_VS, 0x9900)
            .draw_index_auto(3)
            .build();
        let (result, list) = run(&mut processor(GfxQueueKind::Graphics), &mut tracker, &dwords);

        assert!(matches!(
            result,
            Err(DriverError::UnresolvedShader { address: 0x9900, .. })
        ));
        assert_eq!(list.stats().draws, 0);
    }

    #[test]
    fn test_indexed_draw_uses_tracked_buffer() {
        let index_address = ADDRESS + 0x10_0000;
        let mut tracker = SceResourceTracker::new();
        tracker.track_render_target(render_target(ADDRESS));
        tracker.track(SceResource::from_buffer(buffer(index_address, 0x1000)));

        let dwords = Pm4Builder::new()
            .set_color_target(ADDRESS)
            .set_shader_program(reg::SPI_SHADER_PGM_LO_VS, VS_ADDRESS)
            .packet(opcode::INDEX_TYPE, &[1])
            .packet(
                opcode::DRAW_INDEX_2,
                &[0x400, (index_address + 0x40) as u32, (index_address >> 32) as u32, 36, 0],
            )
            .build();
        let (result, list) = run(&mut processor(GfxQueueKind::Graphics), &mut tracker, &dwords);

        result.unwrap();
        let bind = list.commands().iter().find_map(|c| match c {
            sable_gfx::commands::command_list::GfxCommand::BindIndexBuffer { offset, index_type, .. } => {
                Some((*offset, *index_type))
            }
            _ => None,
        });
        assert_eq!(bind, Some((0x40, vk::IndexType::UINT32)));
    }

    #[test]
    fn test_untracked_index_buffer() {
        let mut tracker = SceResourceTracker::new();
        let dwords = Pm4Builder::new()
            .set_shader_program(reg::SPI_SHADER_PGM_LO_VS, VS_ADDRESS)
            .packet(opcode::DRAW_INDEX_2, &[0x400, 0x5000, 0, 36, 0])
            .build();
        let (result, _) = run(&mut processor(GfxQueueKind::Graphics), &mut tracker, &dwords);
        assert!(matches!(result, Err(DriverError::UntrackedResource(0x5000))));
    }

    #[test]
    fn test_dispatch_on_compute_queue_skips_draws() {
        let mut tracker = SceResourceTracker::new();
        let dwords = Pm4Builder::new()
            .set_shader_program(reg::COMPUTE_PGM_LO, CS_ADDRESS)
            .dispatch_direct(8, 4, 1)
            .draw_index_auto(3)
            .build();
        let (result, list) = run(&mut processor(GfxQueueKind::Compute), &mut tracker, &dwords);

        result.unwrap();
        assert_eq!(list.stats().dispatches, 1);
        assert_eq!(list.stats().draws, 0);
    }

    #[test]
    fn test_register_offset_outside_window() {
        let mut tracker = SceResourceTracker::new();
        let dwords = Pm4Builder::new().packet(opcode::SET_SH_REG, &[0xFFFF_FFFF, 0]).build();
        let (result, _) = run(&mut processor(GfxQueueKind::Graphics), &mut tracker, &dwords);
        assert!(matches!(
            result,
            Err(DriverError::Pm4(Pm4Error::RegisterOutOfRange {
                opcode: opcode::SET_SH_REG,
                reg_offset: 0xFFFF_FFFF,
                count: 1,
                ..
            }))
        ));

        // 区间的最后一个寄存器越过窗口
        let dwords = Pm4Builder::new()
            .packet(opcode::SET_CONTEXT_REG, &[reg::REG_WINDOW_SIZE - 1, 0, 0])
            .build();
        let (result, _) = run(&mut processor(GfxQueueKind::Graphics), &mut tracker, &dwords);
        assert!(matches!(
            result,
            Err(DriverError::Pm4(Pm4Error::RegisterOutOfRange { count: 2, .. }))
        ));

        let dwords = Pm4Builder::new()
            .packet(opcode::SET_CONTEXT_REG, &[reg::REG_WINDOW_SIZE - 1, 0])
            .build();
        let (result, _) = run(&mut processor(GfxQueueKind::Graphics), &mut tracker, &dwords);
        assert!(result.is_ok());
    }

    #[test]
    fn test_short_body() {
        let mut tracker = SceResourceTracker::new();
        let dwords = Pm4Builder::new().packet(opcode::SET_BASE, &[1]).build();
        let (result, _) = run(&mut processor(GfxQueueKind::Graphics), &mut tracker, &dwords);
        assert!(matches!(
            result,
            Err(DriverError::Pm4(Pm4Error::ShortBody {
                opcode: opcode::SET_BASE,
                ..
            }))
        ));
    }
}
