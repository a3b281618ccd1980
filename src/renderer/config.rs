use std::path::PathBuf;

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub const CAMERA_UBO_BINDING: u32 = 0;
pub const MODEL_UBO_BINDING: u32 = 1;
pub const DIFFUSE_SAMPLER_BINDING: u32 = 2;
pub const UI_INSTANCE_SSBO_BINDING: u32 = 3;

/// Descriptor sets reserved per frame slot. The pool is sized once and never grows.
pub const DESCRIPTOR_SETS_PER_SLOT: u32 = 333;

/// Contains configuration options for the renderer like shader locations and clear values
pub struct RenderConfig {
    pub application_name: String,
    pub engine_name: String,
    pub vertex_shader_path: PathBuf,
    pub fragment_shader_path: PathBuf,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            application_name: "Vulkan Window".into(),
            engine_name: "Wonderingne".into(),
            vertex_shader_path: PathBuf::from("shaders-built/model.vert.spv"),
            fragment_shader_path: PathBuf::from("shaders-built/model.frag.spv"),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
        }
    }
}

impl RenderConfig {
    pub fn descriptor_pool_capacity() -> u32 {
        DESCRIPTOR_SETS_PER_SLOT * MAX_FRAMES_IN_FLIGHT as u32
    }
}
