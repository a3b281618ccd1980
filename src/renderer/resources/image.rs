use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use crate::renderer::contexts::resource_ctx::memory::{GpuImage, ImageDesc};

/// 2D image with a matching view, bound to its own allocation and released on drop
pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub aspect: vk::ImageAspectFlags,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Image {
    // NOTE: The returned image is in `UNDEFINED` layout and holds no data.
    // Sampled images still need a staging upload and two layout transitions.
    pub fn new(
        desc: &ImageDesc,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(desc.format)
                .usage(desc.usage)
                .extent(vk::Extent3D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                    depth: 1,
                })
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .tiling(desc.tiling);
            unsafe { device.create_image(&info, None)? }
        };
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let allocation = memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: desc.name,
                requirements,
                location: desc.location,
                linear: desc.tiling == vk::ImageTiling::LINEAR,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(err.into());
            }
        };
        unsafe {
            device.bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }
        let view = {
            let info = vk::ImageViewCreateInfo::default()
                .view_type(vk::ImageViewType::TYPE_2D)
                .image(image)
                .format(desc.format)
                .subresource_range(vk::ImageSubresourceRange {
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                    aspect_mask: view_aspect(desc.aspect),
                });
            unsafe { device.create_image_view(&info, None)? }
        };

        Ok(Self {
            image,
            view,
            format: desc.format,
            extent: desc.extent,
            aspect: desc.aspect,

            allocation: Some(allocation),
            memory_allocator,
            device,
        })
    }
}

impl GpuImage for Image {
    fn handle(&self) -> vk::Image {
        self.image
    }

    fn view(&self) -> vk::ImageView {
        self.view
    }

    fn format(&self) -> vk::Format {
        self.format
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(err) = allocator.free(allocation) {
                        log::error!("Failed to free image allocation: {}", err);
                    }
                }
                Err(err) => log::error!("Memory allocator poisoned: {}", err),
            }
        }
        unsafe {
            self.device.destroy_image(self.image, None);
        }
    }
}

// Views of depth-stencil images only expose the depth aspect to shaders and attachments
fn view_aspect(aspect: vk::ImageAspectFlags) -> vk::ImageAspectFlags {
    if aspect.contains(vk::ImageAspectFlags::DEPTH) {
        vk::ImageAspectFlags::DEPTH
    } else {
        aspect
    }
}
