//! GPU memory facade
//!
//! Every buffer and image the renderer owns is created through [`GpuMemory`]. The Vulkan
//! implementation is backed by gpu-allocator and runs copies and layout transitions as one-shot
//! command buffers. Host-side implementations let the loading code run without a device.

use std::sync::{Arc, Mutex};
use ash::vk;
use bytemuck::Pod;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_allocator::vulkan::Allocator;
use gpu_allocator::MemoryLocation;
use crate::assets::texture::DecodedImage;
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::error::RenderError;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::image::Image;

pub struct BufferDesc<'a> {
    pub name: &'a str,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    /// `CpuToGpu` for host-visible coherent memory, `GpuOnly` for device-local memory
    pub location: MemoryLocation,
}

pub struct ImageDesc<'a> {
    pub name: &'a str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub location: MemoryLocation,
}

pub trait GpuBuffer {
    fn handle(&self) -> vk::Buffer;
    fn size(&self) -> u64;

    /// Copies into host-visible memory. Fails for device-local buffers.
    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;

    fn write<T: Pod>(&mut self, data: &[T], offset: usize) -> Result<()> {
        self.write_bytes(offset, bytemuck::cast_slice(data))
    }
}

pub trait GpuImage {
    fn handle(&self) -> vk::Image;
    fn view(&self) -> vk::ImageView;
    fn format(&self) -> vk::Format;
    fn extent(&self) -> vk::Extent2D;
    fn aspect(&self) -> vk::ImageAspectFlags;
}

/// Creates buffers and images and moves data between them.
/// Resources are released when the returned values are dropped.
pub trait GpuMemory {
    type Buffer: GpuBuffer;
    type Image: GpuImage;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Self::Buffer>;

    fn create_image(&self, desc: &ImageDesc) -> Result<Self::Image>;

    /// Device-side copy of `size` bytes; returns once the copy has completed
    fn copy_buffer(&self, src: &Self::Buffer, dst: &Self::Buffer, size: u64) -> Result<()>;

    /// Copies tightly packed texels into an image in `TRANSFER_DST_OPTIMAL` layout
    fn copy_buffer_to_image(&self, src: &Self::Buffer, dst: &Self::Image) -> Result<()>;

    fn transition_image_layout(
        &self,
        image: &Self::Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<()>;
}

/// Creates a host-visible coherent buffer for per-frame data
pub fn create_host_buffer<M: GpuMemory>(
    memory: &M,
    name: &str,
    size: u64,
    usage: vk::BufferUsageFlags,
) -> Result<M::Buffer> {
    memory.create_buffer(&BufferDesc {
        name,
        size,
        usage,
        location: MemoryLocation::CpuToGpu,
    })
}

/// Uploads `bytes` into a new device-local buffer through a temporary staging buffer
pub fn upload_device_local<M: GpuMemory>(
    memory: &M,
    name: &str,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<M::Buffer> {
    let size = bytes.len() as u64;
    let mut staging = create_host_buffer(
        memory,
        "Staging buffer",
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
    )?;
    staging.write_bytes(0, bytes)?;

    let buffer = memory.create_buffer(&BufferDesc {
        name,
        size,
        usage: usage | vk::BufferUsageFlags::TRANSFER_DST,
        location: MemoryLocation::GpuOnly,
    })?;
    memory.copy_buffer(&staging, &buffer, size)?;

    Ok(buffer)
}

/// Uploads decoded RGBA8 texels into a new sampled image left in `SHADER_READ_ONLY_OPTIMAL`
pub fn upload_texture<M: GpuMemory>(
    memory: &M,
    name: &str,
    decoded: &DecodedImage,
) -> Result<M::Image> {
    let expected = decoded.width as usize * decoded.height as usize * 4;
    if decoded.pixels.len() != expected {
        return Err(eyre!(
            "Texture '{}' has {} bytes of texels, expected {} for {}x{} RGBA8",
            name,
            decoded.pixels.len(),
            expected,
            decoded.width,
            decoded.height,
        ));
    }

    let mut staging = create_host_buffer(
        memory,
        "Texture staging buffer",
        decoded.pixels.len() as u64,
        vk::BufferUsageFlags::TRANSFER_SRC,
    )?;
    staging.write_bytes(0, &decoded.pixels)?;

    let image = memory.create_image(&ImageDesc {
        name,
        extent: vk::Extent2D {
            width: decoded.width,
            height: decoded.height,
        },
        format: vk::Format::R8G8B8A8_SRGB,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        aspect: vk::ImageAspectFlags::COLOR,
        location: MemoryLocation::GpuOnly,
    })?;

    memory.transition_image_layout(
        &image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;
    memory.copy_buffer_to_image(&staging, &image)?;
    memory.transition_image_layout(
        &image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;

    Ok(image)
}

/// Access masks and pipeline stages guarding one image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Only the transitions the renderer performs are supported
pub fn layout_transition(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> std::result::Result<LayoutTransition, RenderError> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok(LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        }),
        (old, new) => Err(RenderError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Memory facade backed by gpu-allocator on a live device
pub struct VulkanMemory {
    allocator: Arc<Mutex<Allocator>>,
    transfer: TransferContext,
    device: Arc<ash::Device>,
}

impl VulkanMemory {
    pub fn new(
        allocator: Allocator,
        transfer: TransferContext,
        device: Arc<ash::Device>,
    ) -> Self {
        Self {
            allocator: Arc::new(Mutex::new(allocator)),
            transfer,
            device,
        }
    }
}

impl GpuMemory for VulkanMemory {
    type Buffer = Buffer;
    type Image = Image;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Buffer> {
        Buffer::new(desc, self.allocator.clone(), self.device.clone())
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<Image> {
        Image::new(desc, self.allocator.clone(), self.device.clone())
    }

    fn copy_buffer(&self, src: &Buffer, dst: &Buffer, size: u64) -> Result<()> {
        self.transfer.immediate_submit(|cmd, device| {
            let region = vk::BufferCopy::default()
                .src_offset(0)
                .dst_offset(0)
                .size(size);
            unsafe {
                device.cmd_copy_buffer(cmd, src.buffer, dst.buffer, &[region]);
            }
            Ok(())
        })
    }

    fn copy_buffer_to_image(&self, src: &Buffer, dst: &Image) -> Result<()> {
        self.transfer.immediate_submit(|cmd, device| {
            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: dst.aspect,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width: dst.extent.width,
                    height: dst.extent.height,
                    depth: 1,
                });
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    src.buffer,
                    dst.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            Ok(())
        })
    }

    fn transition_image_layout(
        &self,
        image: &Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<()> {
        let transition = layout_transition(old, new)?;
        self.transfer.immediate_submit(|cmd, device| {
            let barrier = vk::ImageMemoryBarrier::default()
                .old_layout(old)
                .new_layout(new)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: image.aspect,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .src_access_mask(transition.src_access)
                .dst_access_mask(transition.dst_access);
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    transition.src_stage,
                    transition.dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }
            Ok(())
        })
    }
}

#[cfg(test)]
pub mod host {
    //! Host-memory stand-in for the GPU used by unit tests.
    //! Device-local buffers are plain byte vectors the tests can read back.

    use std::cell::{Cell, RefCell};
    use super::*;

    pub struct HostBuffer {
        pub name: String,
        pub usage: vk::BufferUsageFlags,
        pub location: MemoryLocation,
        pub bytes: RefCell<Vec<u8>>,
    }

    impl HostBuffer {
        pub fn contents(&self) -> Vec<u8> {
            self.bytes.borrow().clone()
        }
    }

    impl GpuBuffer for HostBuffer {
        fn handle(&self) -> vk::Buffer {
            vk::Buffer::null()
        }

        fn size(&self) -> u64 {
            self.bytes.borrow().len() as u64
        }

        fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
            if self.location == MemoryLocation::GpuOnly {
                return Err(eyre!("Buffer '{}' is not host-visible", self.name));
            }
            let mut dst = self.bytes.borrow_mut();
            let end = offset + bytes.len();
            if end > dst.len() {
                return Err(eyre!("Write of {} bytes at {} overflows '{}'", bytes.len(), offset, self.name));
            }
            dst[offset..end].copy_from_slice(bytes);
            Ok(())
        }
    }

    pub struct HostImage {
        pub extent: vk::Extent2D,
        pub format: vk::Format,
        pub aspect: vk::ImageAspectFlags,
        pub layout: Cell<vk::ImageLayout>,
        pub texels: RefCell<Vec<u8>>,
    }

    impl GpuImage for HostImage {
        fn handle(&self) -> vk::Image {
            vk::Image::null()
        }

        fn view(&self) -> vk::ImageView {
            vk::ImageView::null()
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

    #[derive(Default)]
    pub struct HostMemory {
        pub buffers_created: Cell<usize>,
        pub images_created: Cell<usize>,
        pub copies: Cell<usize>,
    }

    impl GpuMemory for HostMemory {
        type Buffer = HostBuffer;
        type Image = HostImage;

        fn create_buffer(&self, desc: &BufferDesc) -> Result<HostBuffer> {
            if desc.size == 0 {
                return Err(eyre!("Buffer '{}' requested with zero size", desc.name));
            }
            self.buffers_created.set(self.buffers_created.get() + 1);
            Ok(HostBuffer {
                name: desc.name.to_owned(),
                usage: desc.usage,
                location: desc.location,
                bytes: RefCell::new(vec![0; desc.size as usize]),
            })
        }

        fn create_image(&self, desc: &ImageDesc) -> Result<HostImage> {
            self.images_created.set(self.images_created.get() + 1);
            Ok(HostImage {
                extent: desc.extent,
                format: desc.format,
                aspect: desc.aspect,
                layout: Cell::new(vk::ImageLayout::UNDEFINED),
                texels: RefCell::new(Vec::new()),
            })
        }

        fn copy_buffer(&self, src: &HostBuffer, dst: &HostBuffer, size: u64) -> Result<()> {
            let size = size as usize;
            dst.bytes.borrow_mut()[..size].copy_from_slice(&src.bytes.borrow()[..size]);
            self.copies.set(self.copies.get() + 1);
            Ok(())
        }

        fn copy_buffer_to_image(&self, src: &HostBuffer, dst: &HostImage) -> Result<()> {
            if dst.layout.get() != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
                return Err(eyre!("Image copied while in {:?}", dst.layout.get()));
            }
            *dst.texels.borrow_mut() = src.contents();
            self.copies.set(self.copies.get() + 1);
            Ok(())
        }

        fn transition_image_layout(
            &self,
            image: &HostImage,
            old: vk::ImageLayout,
            new: vk::ImageLayout,
        ) -> Result<()> {
            layout_transition(old, new)?;
            if image.layout.get() != old {
                return Err(eyre!("Image is in {:?}, not {:?}", image.layout.get(), old));
            }
            image.layout.set(new);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::host::HostMemory;
    use super::*;
    use crate::renderer::resources::vertex::Vertex;
    use glam::{Vec2, Vec3};

    #[test]
    fn staged_vertex_upload_round_trips() {
        let memory = HostMemory::default();
        let vertices = [
            Vertex::new(Vec3::new(0.0, 0.0, 0.0), Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(1.0, 0.0, 0.0), Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(0.0, 1.0, 0.5), Vec2::new(0.0, 1.0)),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);

        let buffer = upload_device_local(
            &memory,
            "Vertex buffer",
            bytes,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        ).unwrap();

        assert_eq!(buffer.size(), (size_of::<Vertex>() * vertices.len()) as u64);
        assert_eq!(buffer.location, MemoryLocation::GpuOnly);
        assert!(buffer.usage.contains(vk::BufferUsageFlags::TRANSFER_DST));
        assert_eq!(buffer.contents(), bytes);
        // staging + destination
        assert_eq!(memory.buffers_created.get(), 2);
        assert_eq!(memory.copies.get(), 1);
    }

    #[test]
    fn device_local_buffers_reject_host_writes() {
        let memory = HostMemory::default();
        let mut buffer = upload_device_local(
            &memory,
            "Index buffer",
            bytemuck::cast_slice(&[0u32, 1, 2]),
            vk::BufferUsageFlags::INDEX_BUFFER,
        ).unwrap();
        assert!(buffer.write(&[7u32], 0).is_err());
    }

    #[test]
    fn texture_upload_ends_shader_readable() {
        let memory = HostMemory::default();
        let decoded = DecodedImage {
            width: 2,
            height: 1,
            pixels: vec![255, 0, 0, 255, 0, 255, 0, 255],
        };

        let image = upload_texture(&memory, "Texture", &decoded).unwrap();

        assert_eq!(image.layout.get(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(image.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(*image.texels.borrow(), decoded.pixels);
        assert_eq!(memory.images_created.get(), 1);
    }

    #[test]
    fn texture_upload_checks_texel_count() {
        let memory = HostMemory::default();
        let decoded = DecodedImage {
            width: 4,
            height: 4,
            pixels: vec![0; 3],
        };
        assert!(upload_texture(&memory, "Broken", &decoded).is_err());
    }

    #[test]
    fn supported_layout_transitions() {
        let to_dst = layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ).unwrap();
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let to_read = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ).unwrap();
        assert_eq!(to_read.dst_access, vk::AccessFlags::SHADER_READ);

        let to_depth = layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ).unwrap();
        assert_eq!(to_depth.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn unsupported_layout_transition_is_an_invalid_argument() {
        let err = layout_transition(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ).unwrap_err();
        assert!(matches!(
            err,
            RenderError::UnsupportedLayoutTransition {
                old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            }
        ));
    }
}
