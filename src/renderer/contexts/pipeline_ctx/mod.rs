pub mod pipeline;
pub mod render_pass;

use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::pipeline_ctx::pipeline::GraphicsPipeline;
use crate::renderer::resources::shader::GraphicsShader;
use crate::renderer::shader_data::PerDrawData;

/// Responsibilities:
/// - Build the one graphics pipeline and its layout
/// - Own the shader-selector push constant range
pub struct RenderPipelineContext {
    pub pipeline: GraphicsPipeline,
}

impl RenderPipelineContext {
    pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;

    pub fn new(
        config: &RenderConfig,
        set_layouts: &[vk::DescriptorSetLayout],
        render_pass: vk::RenderPass,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let push_constant_ranges = [
            vk::PushConstantRange::default()
                .stage_flags(Self::PUSH_CONSTANT_STAGES)
                .offset(0)
                .size(size_of::<PerDrawData>() as u32),
        ];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let pipeline_layout = unsafe {
            device.create_pipeline_layout(&layout_info, None)?
        };

        let shader = match GraphicsShader::load(
            &config.vertex_shader_path,
            &config.fragment_shader_path,
            device.clone(),
        ) {
            Ok(shader) => shader,
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout, None) };
                return Err(err);
            }
        };

        let pipeline = GraphicsPipeline::builder(device)
            .with_shader(shader)
            .with_pipeline_layout(pipeline_layout)
            .with_render_pass(render_pass)
            .with_cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
            .with_blending_disabled()
            .with_depth_test(true, Some(vk::CompareOp::LESS))
            .build()?;

        Ok(Self { pipeline })
    }
}
