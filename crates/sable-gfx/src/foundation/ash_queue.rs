use std::slice;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use itertools::Itertools;

use crate::commands::command_list::{GfxCommand, GfxCommandList, GfxDescriptorInfo, GfxRenderingAttachment};
use crate::commands::submission::GfxSubmission;
use crate::foundation::ash_device::{AshDeviceShared, AshQueueInfo};
use crate::foundation::host::{GfxQueueKind, HostQueue};
use crate::{GfxError, GfxResult};

/// 已经提交但还没有确认完成的工作
struct AshInFlight {
    fence: vk::Fence,
    command_buffer: vk::CommandBuffer,
    _command_list: GfxCommandList,
}

/// 基于 ash 的宿主队列
///
/// 每次提交都分配一个新的 command buffer，把软件命令回放进去，并用一个 fence 跟踪完成状态
pub struct AshHostQueue {
    shared: Arc<AshDeviceShared>,
    kind: GfxQueueKind,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    in_flight: Vec<AshInFlight>,
}
impl AshHostQueue {
    pub(crate) fn new(shared: Arc<AshDeviceShared>, kind: GfxQueueKind, info: AshQueueInfo) -> GfxResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(info.family_index);
        let command_pool = unsafe { shared.device.create_command_pool(&pool_info, None) }.map_err(GfxError::from_vk)?;

        Ok(Self {
            shared,
            kind,
            queue: info.queue,
            command_pool,
            in_flight: Vec::new(),
        })
    }

    fn record(&self, command_buffer: vk::CommandBuffer, list: &GfxCommandList) -> GfxResult<()> {
        let device = &self.shared.device;
        unsafe {
            device
                .begin_command_buffer(
                    command_buffer,
                    &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .map_err(GfxError::from_vk)?;
        }
        for command in list.commands() {
            self.replay(command_buffer, command);
        }
        unsafe { device.end_command_buffer(command_buffer) }.map_err(GfxError::from_vk)
    }

    fn replay(&self, cb: vk::CommandBuffer, command: &GfxCommand) {
        let device = &self.shared.device;
        unsafe {
            match command {
                GfxCommand::PipelineBarrier(batch) => {
                    let dependency_info = vk::DependencyInfo::default()
                        .memory_barriers(batch.memory.as_slice())
                        .buffer_memory_barriers(&batch.buffers)
                        .image_memory_barriers(&batch.images);
                    device.cmd_pipeline_barrier2(cb, &dependency_info);
                }
                GfxCommand::BeginRendering {
                    render_area,
                    color,
                    depth,
                } => {
                    fn attachment_info(attachment: &GfxRenderingAttachment) -> vk::RenderingAttachmentInfo<'static> {
                        vk::RenderingAttachmentInfo::default()
                            .image_view(attachment.view)
                            .image_layout(attachment.layout)
                            .load_op(attachment.load_op)
                            .store_op(attachment.store_op)
                    }

                    // 未绑定的槽位使用空的 image view，会被忽略
                    let color_infos = color
                        .iter()
                        .map(|a| a.as_ref().map(attachment_info).unwrap_or_default())
                        .collect_vec();
                    let depth_info = depth.as_ref().map(attachment_info);

                    let mut rendering_info = vk::RenderingInfo::default()
                        .render_area(*render_area)
                        .layer_count(1)
                        .color_attachments(&color_infos);
                    if let Some(depth_info) = depth_info.as_ref() {
                        rendering_info = rendering_info.depth_attachment(depth_info);
                    }
                    device.cmd_begin_rendering(cb, &rendering_info);
                }
                GfxCommand::EndRendering => device.cmd_end_rendering(cb),
                GfxCommand::BindPipeline { bind_point, pipeline } => {
                    device.cmd_bind_pipeline(cb, *bind_point, *pipeline);
                }
                GfxCommand::SetViewports(viewports) => device.cmd_set_viewport_with_count(cb, viewports),
                GfxCommand::SetScissors(scissors) => device.cmd_set_scissor_with_count(cb, scissors),
                GfxCommand::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type,
                } => device.cmd_bind_index_buffer(cb, *buffer, *offset, *index_type),
                GfxCommand::BindVertexBuffers {
                    first_binding,
                    buffers,
                    offsets,
                } => device.cmd_bind_vertex_buffers(cb, *first_binding, buffers, offsets),
                GfxCommand::PushDescriptors {
                    bind_point,
                    layout,
                    writes,
                } => {
                    let vk_writes = writes
                        .iter()
                        .map(|w| {
                            let write = vk::WriteDescriptorSet::default().dst_binding(w.binding).descriptor_type(w.ty);
                            match &w.info {
                                GfxDescriptorInfo::Buffer(info) => write.buffer_info(slice::from_ref(info)),
                                GfxDescriptorInfo::Image(info) => write.image_info(slice::from_ref(info)),
                                GfxDescriptorInfo::TexelBuffer(view) => write.texel_buffer_view(slice::from_ref(view)),
                            }
                        })
                        .collect_vec();
                    self.shared.push_descriptor.cmd_push_descriptor_set(cb, *bind_point, *layout, 0, &vk_writes);
                }
                GfxCommand::PushConstants {
                    layout,
                    stages,
                    offset,
                    data,
                } => device.cmd_push_constants(cb, *layout, *stages, *offset, data),
                GfxCommand::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => device.cmd_draw(cb, *vertex_count, *instance_count, *first_vertex, *first_instance),
                GfxCommand::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                } => device.cmd_draw_indexed(
                    cb,
                    *index_count,
                    *instance_count,
                    *first_index,
                    *vertex_offset,
                    *first_instance,
                ),
                GfxCommand::DrawIndirect {
                    buffer,
                    offset,
                    draw_count,
                    stride,
                } => device.cmd_draw_indirect(cb, *buffer, *offset, *draw_count, *stride),
                GfxCommand::DrawIndexedIndirect {
                    buffer,
                    offset,
                    draw_count,
                    stride,
                } => device.cmd_draw_indexed_indirect(cb, *buffer, *offset, *draw_count, *stride),
                GfxCommand::Dispatch { group_count } => {
                    device.cmd_dispatch(cb, group_count.x, group_count.y, group_count.z);
                }
                GfxCommand::DispatchIndirect { buffer, offset } => device.cmd_dispatch_indirect(cb, *buffer, *offset),
                GfxCommand::CopyBuffer { src, dst, regions } => device.cmd_copy_buffer(cb, *src, *dst, regions),
                GfxCommand::UpdateBuffer { dst, offset, data } => device.cmd_update_buffer(cb, *dst, *offset, data),
                GfxCommand::SetEvent { event, stage } => {
                    let barrier = vk::MemoryBarrier2::default()
                        .src_stage_mask(*stage)
                        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE);
                    let dependency_info = vk::DependencyInfo::default().memory_barriers(slice::from_ref(&barrier));
                    device.cmd_set_event2(cb, *event, &dependency_info);
                }
                GfxCommand::ResetEvent { event, stage } => device.cmd_reset_event2(cb, *event, *stage),
            }
        }
    }

    /// 释放已经完成的工作
    fn retire_all(&mut self) {
        let device = &self.shared.device;
        for work in self.in_flight.drain(..) {
            unsafe {
                device.destroy_fence(work.fence, None);
                device.free_command_buffers(self.command_pool, slice::from_ref(&work.command_buffer));
            }
        }
    }
}

impl HostQueue for AshHostQueue {
    fn kind(&self) -> GfxQueueKind {
        self.kind
    }

    fn submit(&mut self, submission: GfxSubmission) -> GfxResult<()> {
        let device = &self.shared.device;
        let list = submission.command_list;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(GfxError::from_vk)?
            .into_iter()
            .next()
            .ok_or(GfxError::Vk(vk::Result::ERROR_UNKNOWN))?;

        let submitted = self.record(command_buffer, &list).and_then(|_| {
            let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
                .map_err(GfxError::from_vk)?;
            let cb_info = vk::CommandBufferSubmitInfo::default().command_buffer(command_buffer);
            let submit_info = vk::SubmitInfo2::default().command_buffer_infos(slice::from_ref(&cb_info));
            match unsafe { device.queue_submit2(self.queue, slice::from_ref(&submit_info), fence) } {
                Ok(()) => Ok(fence),
                Err(e) => {
                    unsafe { device.destroy_fence(fence, None) };
                    Err(GfxError::from_vk(e))
                }
            }
        });

        match submitted {
            Ok(fence) => {
                log::trace!("{:?} queue: submitted {} ({} commands)", self.kind, list.label(), list.commands().len());
                self.in_flight.push(AshInFlight {
                    fence,
                    command_buffer,
                    _command_list: list,
                });
                Ok(())
            }
            Err(e) => {
                unsafe { device.free_command_buffers(self.command_pool, slice::from_ref(&command_buffer)) };
                Err(e)
            }
        }
    }

    fn synchronize(&mut self, timeout: Option<Duration>) -> GfxResult<()> {
        if self.in_flight.is_empty() {
            return Ok(());
        }

        let fences = self.in_flight.iter().map(|w| w.fence).collect_vec();
        let timeout_ns = timeout.map_or(u64::MAX, |t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX));
        match unsafe { self.shared.device.wait_for_fences(&fences, true, timeout_ns) } {
            Ok(()) => {
                self.retire_all();
                Ok(())
            }
            Err(vk::Result::TIMEOUT) => Err(GfxError::Timeout(timeout.unwrap_or_default())),
            Err(e) => Err(GfxError::from_vk(e)),
        }
    }
}

impl Drop for AshHostQueue {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.shared.device.queue_wait_idle(self.queue) {
                log::error!("{:?} queue: wait idle failed on teardown: {e:?}", self.kind);
            }
        }
        self.retire_all();
        unsafe { self.shared.device.destroy_command_pool(self.command_pool, None) };
    }
}
