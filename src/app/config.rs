use std::path::PathBuf;
use glam::Vec3;
use winit::dpi::LogicalSize;
use crate::renderer::scene::ui_instance_transform;
use crate::renderer::SceneDesc;

/// Window and scene settings for the application shell
pub struct AppConfig {
    pub title: String,
    pub inner_size: LogicalSize<u32>,
    pub world_models: Vec<PathBuf>,
    pub ui_models: Vec<PathBuf>,
    /// World-space offsets of the UI model copies, drawn in this order
    pub ui_instance_offsets: Vec<Vec3>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Window".into(),
            inner_size: LogicalSize::new(800, 600),
            world_models: vec![
                PathBuf::from("Assets/Models/TexturedSuzanne/TexturedSuzanne.obj"),
            ],
            ui_models: vec![
                PathBuf::from("Assets/Models/LowPolyForestTerrain/LowPolyForestTerrain.obj"),
            ],
            ui_instance_offsets: vec![
                Vec3::new(1.0, 0.5, 0.0),
                Vec3::new(-1.0, 0.5, 0.0),
            ],
        }
    }
}

impl AppConfig {
    pub fn scene_desc(&self) -> SceneDesc {
        SceneDesc {
            world_models: self.world_models.clone(),
            ui_models: self.ui_models.clone(),
            ui_instances: self.ui_instance_offsets
                .iter()
                .copied()
                .map(ui_instance_transform)
                .collect(),
        }
    }
}
