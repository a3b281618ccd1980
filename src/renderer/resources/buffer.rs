use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use crate::renderer::contexts::resource_ctx::memory::{BufferDesc, GpuBuffer};

/// Buffer bound to its own gpu-allocator allocation, released on drop
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        desc: &BufferDesc,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        if desc.size == 0 {
            return Err(eyre!("Buffer '{}' requested with zero size", desc.name));
        }

        let buffer = {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(desc.usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            unsafe { device.create_buffer(&buffer_info, None)? }
        };

        let requirements = unsafe {
            device.get_buffer_memory_requirements(buffer)
        };
        let allocation = memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: desc.name,
                requirements,
                location: desc.location,
                linear: true,
                allocation_scheme: AllocationScheme::DedicatedBuffer(buffer),
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err.into());
            }
        };

        unsafe {
            device.bind_buffer_memory(
                buffer,
                allocation.memory(),
                allocation.offset(),
            )?;
        }

        Ok(Self {
            buffer,
            size: desc.size,

            allocation: Some(allocation),
            memory_allocator,
            device,
        })
    }
}

impl GpuBuffer for Buffer {
    fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let allocation = self
            .allocation
            .as_mut()
            .ok_or_eyre("Buffer allocation already released")?;
        presser::copy_from_slice_to_offset(bytes, allocation, offset)?;
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(err) = allocator.free(allocation) {
                        log::error!("Failed to free buffer allocation: {}", err);
                    }
                }
                Err(err) => log::error!("Memory allocator poisoned: {}", err),
            }
        }
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}
