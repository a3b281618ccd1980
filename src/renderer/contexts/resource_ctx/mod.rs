pub mod descriptor_set_layout_builder;
pub mod descriptors;
pub mod memory;
pub mod registry;

use std::path::PathBuf;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use glam::Mat4;
use crate::assets::texture::decode_file;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::resource_ctx::descriptors::DescriptorManager;
use crate::renderer::contexts::resource_ctx::registry::ResourceRegistry;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::image::Image;
use crate::renderer::resources::model::Model;
use crate::renderer::resources::sampler::Sampler;
use crate::renderer::scene::Scene;

/// What to load into the scene at startup
#[derive(Debug, Clone)]
pub struct SceneDesc {
    pub world_models: Vec<PathBuf>,
    pub ui_models: Vec<PathBuf>,
    pub ui_instances: Vec<Mat4>,
}

/// Responsibilities:
/// - Own the loaded models, their textures and the shared sampler
/// - Wire every resource into its descriptor sets once at startup
///
/// Models and per-frame buffers go first, then the textures, then the sampler.
pub struct RenderResourceContext {
    pub scene: Scene<Buffer>,
    pub registry: ResourceRegistry<Image>,
    pub sampler: Sampler,
}

impl RenderResourceContext {
    pub fn new(
        desc: &SceneDesc,
        dev_ctx: &RenderDeviceContext,
        descriptors: &mut DescriptorManager,
    ) -> Result<Self> {
        let memory = &dev_ctx.memory;
        let mut registry = ResourceRegistry::new();

        let mut load = |paths: &[PathBuf]| -> Result<Vec<Model<Buffer>>> {
            paths
                .iter()
                .map(|path| {
                    Model::load(path, &mut registry, memory, decode_file)
                        .wrap_err_with(|| format!("Failed to load model {}", path.display()))
                })
                .collect()
        };
        let world_models = load(&desc.world_models)?;
        let ui_models = load(&desc.ui_models)?;

        let sampler = Sampler::new_linear_repeat(
            dev_ctx.device.max_sampler_anisotropy,
            dev_ctx.device.logical.clone(),
        )?;
        let mut scene = Scene::new(memory, world_models, ui_models, desc.ui_instances.clone())?;
        scene.bind_descriptors(&mut registry, descriptors, sampler.sampler)?;

        log::info!(
            "Loaded {} world and {} UI models with {} textures, {} descriptor set groups",
            scene.world_models.len(),
            scene.ui_models.len(),
            registry.texture_count(),
            descriptors.table.len(),
        );

        Ok(Self {
            scene,
            registry,
            sampler,
        })
    }
}
