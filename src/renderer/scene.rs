//! What gets drawn each frame: the models of both render groups, the two cameras and the
//! UI instance transforms, together with the per-slot buffers they are uploaded into.

use std::time::Instant;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use glam::{Mat4, Vec3};
use crate::renderer::camera::Camera;
use crate::renderer::contexts::frame_ctx::slot::{FrameSlot, PerFrame};
use crate::renderer::contexts::resource_ctx::descriptors::{DescriptorManager, DescriptorSetIndex, DescriptorSetTable};
use crate::renderer::contexts::resource_ctx::memory::{create_host_buffer, GpuBuffer, GpuImage, GpuMemory};
use crate::renderer::contexts::resource_ctx::registry::ResourceRegistry;
use crate::renderer::resources::model::Model;
use crate::renderer::shader_data::CameraData;

pub const WORLD_CAMERA: usize = 0;
pub const UI_CAMERA: usize = 1;

pub const WORLD_SHADER_VARIANT: u32 = 0;
pub const UI_SHADER_VARIANT: u32 = 1;

/// World meshes spin about their up axis at a quarter turn per second
pub fn world_model_matrix(elapsed_secs: f32) -> Mat4 {
    Mat4::from_rotation_x(90f32.to_radians())
        * Mat4::from_rotation_y(elapsed_secs * (-90f32).to_radians())
}

pub fn ui_model_matrix() -> Mat4 {
    Mat4::from_rotation_x((-90f32).to_radians()) * Mat4::from_scale(Vec3::splat(0.1))
}

/// Placement of one UI instance at `offset` in UI space
pub fn ui_instance_transform(offset: Vec3) -> Mat4 {
    Mat4::from_translation(offset) * ui_model_matrix()
}

/// Seconds since the first frame asked for the time
#[derive(Debug, Default, Clone, Copy)]
pub struct AnimationClock {
    start: Option<Instant>,
}

impl AnimationClock {
    pub fn elapsed_secs(&mut self, now: Instant) -> f32 {
        let start = *self.start.get_or_insert(now);
        now.saturating_duration_since(start).as_secs_f32()
    }
}

/// Camera with one uniform buffer per frame slot
pub struct CameraBinding<B> {
    pub camera: Camera,
    pub uniforms: PerFrame<B>,
    pub descriptor_set: Option<DescriptorSetIndex>,
}

impl<B: GpuBuffer> CameraBinding<B> {
    pub fn new<M: GpuMemory<Buffer = B>>(memory: &M, camera: Camera) -> Result<Self> {
        let uniforms = PerFrame::try_from_fn(|_| {
            create_host_buffer(
                memory,
                "Camera uniform buffer",
                size_of::<CameraData>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            )
        })?;
        Ok(Self {
            camera,
            uniforms,
            descriptor_set: None,
        })
    }

    pub fn update(&mut self, slot: FrameSlot, extent: vk::Extent2D) -> Result<()> {
        let data = self.camera.shader_data(extent);
        self.uniforms[slot].write(&[data], 0)
    }
}

/// Per-instance model matrices of the UI group, one storage buffer per frame slot
pub struct UiInstances<B> {
    pub transforms: Vec<Mat4>,
    pub buffers: PerFrame<B>,
    pub descriptor_set: Option<DescriptorSetIndex>,
}

impl<B: GpuBuffer> UiInstances<B> {
    pub fn new<M: GpuMemory<Buffer = B>>(memory: &M, transforms: Vec<Mat4>) -> Result<Self> {
        if transforms.is_empty() {
            return Err(eyre!("At least one UI instance transform is required"));
        }
        let size = (size_of::<Mat4>() * transforms.len()) as u64;
        let buffers = PerFrame::try_from_fn(|_| {
            create_host_buffer(
                memory,
                "UI instance storage buffer",
                size,
                vk::BufferUsageFlags::STORAGE_BUFFER,
            )
        })?;
        let mut instances = Self {
            transforms,
            buffers,
            descriptor_set: None,
        };
        instances.upload_all()?;
        Ok(instances)
    }

    pub fn instance_count(&self) -> u32 {
        self.transforms.len() as u32
    }

    /// Writes the transform list into `slot`'s buffer only
    pub fn upload(&mut self, slot: FrameSlot) -> Result<()> {
        self.buffers[slot].write(&self.transforms, 0)
    }

    /// Fills every slot's buffer. Only valid before any frame has been submitted.
    fn upload_all(&mut self) -> Result<()> {
        for slot in FrameSlot::all() {
            self.upload(slot)?;
        }
        Ok(())
    }
}

/// One indexed draw of a mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDraw {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub descriptor_sets: [vk::DescriptorSet; 3],
}

/// Meshes sharing a camera, a shader variant and an instance count
#[derive(Debug, Clone, PartialEq)]
pub struct RenderGroup {
    pub shader_variant: u32,
    pub instance_count: u32,
    pub draws: Vec<MeshDraw>,
}

/// Fields drop in declaration order: models, UI instance buffers, camera buffers.
pub struct Scene<B> {
    pub world_models: Vec<Model<B>>,
    pub ui_models: Vec<Model<B>>,
    pub ui_instances: UiInstances<B>,
    /// Indexed by `WORLD_CAMERA` and `UI_CAMERA`
    pub cameras: [CameraBinding<B>; 2],
}

impl<B: GpuBuffer> Scene<B> {
    pub fn new<M: GpuMemory<Buffer = B>>(
        memory: &M,
        world_models: Vec<Model<B>>,
        ui_models: Vec<Model<B>>,
        ui_transforms: Vec<Mat4>,
    ) -> Result<Self> {
        Ok(Self {
            world_models,
            ui_models,
            cameras: [
                CameraBinding::new(memory, Camera::world())?,
                CameraBinding::new(memory, Camera::ui())?,
            ],
            ui_instances: UiInstances::new(memory, ui_transforms)?,
        })
    }

    /// Writes fresh camera, model and UI instance data for `slot`
    pub fn update(&mut self, slot: FrameSlot, extent: vk::Extent2D, elapsed_secs: f32) -> Result<()> {
        for camera in &mut self.cameras {
            camera.update(slot, extent)?;
        }

        let world = world_model_matrix(elapsed_secs);
        for model in &mut self.world_models {
            model.write_transform(slot, world)?;
        }

        self.ui_instances.upload(slot)?;

        let ui = ui_model_matrix();
        for model in &mut self.ui_models {
            model.write_transform(slot, ui)?;
        }
        Ok(())
    }

    /// Allocates and writes the camera, UI instance and material descriptor sets.
    /// A material's set points at the model uniforms of the first mesh bound with it.
    pub fn bind_descriptors<I: GpuImage>(
        &mut self,
        registry: &mut ResourceRegistry<I>,
        descriptors: &mut DescriptorManager,
        sampler: vk::Sampler,
    ) -> Result<()> {
        for camera in &mut self.cameras {
            camera.descriptor_set = Some(descriptors.bind_camera(&camera.uniforms)?);
        }
        self.ui_instances.descriptor_set =
            Some(descriptors.bind_ui_instances(&self.ui_instances.buffers)?);

        let meshes = self.world_models
            .iter()
            .chain(self.ui_models.iter())
            .flat_map(|model| model.meshes.iter());
        for mesh in meshes {
            registry.ensure_material_set(mesh.material, |texture| {
                let image = texture.image
                    .as_ref()
                    .ok_or_else(|| eyre!("Texture {} was never uploaded", texture.path.display()))?;
                descriptors.bind_material(&mesh.model_uniforms, image.view(), sampler)
            })?;
        }
        Ok(())
    }

    /// Draws in recording order: the world group under the world camera, then the UI group
    pub fn render_groups<I>(
        &self,
        registry: &ResourceRegistry<I>,
        table: &DescriptorSetTable,
        slot: FrameSlot,
    ) -> Result<Vec<RenderGroup>> {
        let ui_set = self.ui_instances.descriptor_set
            .ok_or_eyre("UI instances have no descriptor set")?;

        let groups = [
            (&self.world_models, WORLD_CAMERA, WORLD_SHADER_VARIANT, 1),
            (&self.ui_models, UI_CAMERA, UI_SHADER_VARIANT, self.ui_instances.instance_count()),
        ];
        groups
            .into_iter()
            .map(|(models, camera, shader_variant, instance_count)| -> Result<RenderGroup> {
                let camera_set = self.cameras[camera].descriptor_set
                    .ok_or_eyre("Camera has no descriptor set")?;
                let draws = models
                    .iter()
                    .flat_map(|model| model.meshes.iter())
                    .map(|mesh| -> Result<MeshDraw> {
                        let material_set = registry
                            .material(mesh.material)?
                            .descriptor_set
                            .ok_or_eyre("Material has no descriptor set")?;
                        Ok(MeshDraw {
                            vertex_buffer: mesh.vertex_buffer.handle(),
                            index_buffer: mesh.index_buffer.handle(),
                            index_count: mesh.index_count(),
                            descriptor_sets: table.sets_for_draw(slot, camera_set, material_set, ui_set)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(RenderGroup {
                    shader_variant,
                    instance_count,
                    draws,
                })
            })
            .collect()
    }
}
