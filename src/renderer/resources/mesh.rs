use ash::vk;
use color_eyre::Result;
use glam::Mat4;
use crate::assets::obj::ParsedMesh;
use crate::renderer::contexts::frame_ctx::slot::{FrameSlot, PerFrame};
use crate::renderer::contexts::resource_ctx::memory::{create_host_buffer, upload_device_local, GpuBuffer, GpuMemory};
use crate::renderer::contexts::resource_ctx::registry::MaterialId;
use crate::renderer::resources::vertex::Vertex;
use crate::renderer::shader_data::ModelData;

/// Indexed triangle geometry in device-local memory plus one model uniform buffer per frame slot
pub struct Mesh<B> {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material: MaterialId,

    pub vertex_buffer: B,
    pub index_buffer: B,
    pub model_uniforms: PerFrame<B>,
}

impl<B: GpuBuffer> Mesh<B> {
    pub fn upload<M>(
        memory: &M,
        parsed: ParsedMesh,
        material: MaterialId,
    ) -> Result<Self>
    where
        M: GpuMemory<Buffer = B>,
    {
        let vertex_buffer = upload_device_local(
            memory,
            "Vertex buffer",
            bytemuck::cast_slice(&parsed.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let index_buffer = upload_device_local(
            memory,
            "Index buffer",
            bytemuck::cast_slice(&parsed.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        let model_uniforms = PerFrame::try_from_fn(|_| {
            create_host_buffer(
                memory,
                "Model uniform buffer",
                size_of::<ModelData>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            )
        })?;

        Ok(Self {
            vertices: parsed.vertices,
            indices: parsed.indices,
            material,

            vertex_buffer,
            index_buffer,
            model_uniforms,
        })
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn write_transform(&mut self, slot: FrameSlot, model: Mat4) -> Result<()> {
        self.model_uniforms[slot].write(&[ModelData { model }], 0)
    }
}
