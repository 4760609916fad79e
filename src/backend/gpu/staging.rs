//! Transient host-visible staging buffers.
//!
//! Each GPU transfer allocates a staging buffer of exactly the request
//! size, uses it as the host-side end of one device copy, and releases it.
//! The memory type is chosen by intersecting the buffer's requirement
//! bitmask with the host-visible, host-coherent property bits; when nothing
//! matches the allocation fails with `ENOMEM`.

use std::sync::Arc;

use ash::vk;

use super::context::GpuContext;

pub(crate) struct StagingBuffer {
    ctx: Arc<GpuContext>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
}

impl StagingBuffer {
    /// Allocates and binds a staging buffer of `size` bytes. Errors carry
    /// the errno the request should fail with.
    pub fn new(ctx: &Arc<GpuContext>, size: u64, usage: vk::BufferUsageFlags) -> Result<Self, i32> {
        let device = ctx.device();

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer =
            unsafe { device.create_buffer(&buffer_info, None) }.map_err(|_| libc::ENOMEM)?;

        let requirement = unsafe { device.get_buffer_memory_requirements(buffer) };
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let Some(type_index) =
            find_memory_type(ctx.memory_props(), requirement.memory_type_bits, wanted)
        else {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(libc::ENOMEM);
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirement.size)
            .memory_type_index(type_index);
        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(_) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(libc::ENOMEM);
            }
        };

        if unsafe { device.bind_buffer_memory(buffer, memory, 0) }.is_err() {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(libc::EIO);
        }

        Ok(Self {
            ctx: ctx.clone(),
            buffer,
            memory,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Maps the whole allocation. The memory is host-coherent, so no
    /// explicit flush or invalidate is needed around the mapping.
    pub fn map(&self) -> Result<*mut u8, i32> {
        unsafe {
            self.ctx
                .device()
                .map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
        }
        .map(|ptr| ptr as *mut u8)
        .map_err(|_| libc::EIO)
    }

    pub fn unmap(&self) {
        unsafe { self.ctx.device().unmap_memory(self.memory) };
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_buffer(self.buffer, None);
            self.ctx.device().free_memory(self.memory, None);
        }
    }
}

/// First memory type allowed by `type_bits` that carries all of `wanted`.
pub(crate) fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    wanted: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&index| {
        type_bits & (1 << index) != 0
            && props.memory_types[index as usize]
                .property_flags
                .contains(wanted)
    })
}
