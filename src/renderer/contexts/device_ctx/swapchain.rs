use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::surface::RenderSurface;
use crate::renderer::error::{classify_acquire, classify_present, AcquiredImage, SurfaceStatus};

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_image_views: Vec<vk::ImageView>,
    pub swapchain_image_extent: vk::Extent2D,
    pub swapchain_image_format: vk::Format,

    device: Arc<ash::Device>,
}

impl Swapchain {
    pub fn new(
        framebuffer_extent: vk::Extent2D,
        surface: &RenderSurface,
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let support = surface.query_support(dev.physical)?;
        let capabilities = support.capabilities;

        let image_extent = choose_extent(&capabilities, framebuffer_extent);
        let min_image_count = choose_image_count(&capabilities);
        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(
            &ins.instance,
            &dev.logical,
        );
        // Graphics and present share one queue family
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(min_image_count)
            .image_format(support.format.format)
            .image_color_space(support.format.color_space)
            .image_extent(image_extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(support.present_mode)
            .clipped(true)
            .image_array_layers(1);

        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&swapchain_info, None)?
        };

        let created = Self::create_swapchain_images(
            swapchain,
            &swapchain_loader,
            support.format.format,
            &dev.logical,
        );
        let (swapchain_images, swapchain_image_views) = match created {
            Ok(images) => images,
            Err(err) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(err);
            }
        };

        log::debug!(
            "Created swapchain with {} images of {}x{} ({:?}, {:?})",
            swapchain_images.len(),
            image_extent.width,
            image_extent.height,
            support.format.format,
            support.present_mode,
        );

        Ok(Self {
            swapchain,
            swapchain_loader,
            swapchain_images,
            swapchain_image_views,
            swapchain_image_extent: image_extent,
            swapchain_image_format: support.format.format,

            device: dev.logical.clone(),
        })
    }

    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> Result<AcquiredImage> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        };
        Ok(classify_acquire(result)?)
    }

    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<SurfaceStatus> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let result = unsafe {
            self.swapchain_loader.queue_present(queue, &present_info)
        };
        Ok(classify_present(result)?)
    }

    fn create_swapchain_images(
        swapchain: vk::SwapchainKHR,
        swapchain_loader: &ash::khr::swapchain::Device,
        swapchain_image_format: vk::Format,
        device: &ash::Device,
    ) -> Result<(Vec<vk::Image>, Vec<vk::ImageView>)> {
        let swapchain_images = unsafe {
            swapchain_loader.get_swapchain_images(swapchain)?
        };
        let swapchain_image_views = swapchain_images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(swapchain_image_format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image(*image);
                unsafe {
                    device.create_image_view(&view_info, None)
                }
            })
            .collect::<VkResult<Vec<vk::ImageView>>>()?;

        Ok((
            swapchain_images,
            swapchain_image_views,
        ))
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in self.swapchain_image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Uses the surface's fixed extent when it has one, otherwise the framebuffer size clamped to the supported range
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: framebuffer_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: framebuffer_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One image more than the minimum, capped by the maximum when the surface has one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = capabilities.max_image_count;
    if max > 0 && min + 1 > max {
        max
    } else {
        min + 1
    }
}
