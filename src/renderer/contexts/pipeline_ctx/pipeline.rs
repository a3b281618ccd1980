use std::ffi::CString;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::resources::shader::GraphicsShader;
use crate::renderer::resources::vertex::VertexInputDescription;

/// Graphics pipeline together with the layout it was built against
pub struct GraphicsPipeline {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl GraphicsPipeline {
    pub fn builder(device: Arc<ash::Device>) -> GraphicsPipelineBuilder {
        GraphicsPipelineBuilder::new(device)
    }

    pub fn bind_pipeline(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline,
            );
        }
    }

    pub fn update_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        stage_flags: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(
                command_buffer,
                self.pipeline_layout,
                stage_flags,
                0,
                data,
            );
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                first_set,
                descriptor_sets,
                dynamic_offsets,
            );
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}

pub struct GraphicsPipelineBuilder {
    device: Arc<ash::Device>,

    vertex_input_description: VertexInputDescription,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    render_pass: vk::RenderPass,
    shader: Option<GraphicsShader>,
    pipeline_layout: Option<vk::PipelineLayout>,
}

impl GraphicsPipelineBuilder {
    fn new(device: Arc<ash::Device>) -> Self {
        Self {
            device,

            vertex_input_description: VertexInputDescription::default(),
            input_assembly: Self::default_input_assembly_info(),
            rasterization: Self::default_rasterization_info(),
            color_blend_attachment: Self::default_color_blend_state(),
            multisample: Self::default_multisample_info(),
            depth_stencil: Self::default_depth_stencil_info(),
            render_pass: vk::RenderPass::null(),
            shader: None,
            pipeline_layout: None,
        }
    }

    pub fn with_shader(mut self, shader: GraphicsShader) -> Self {
        let _ = self.shader.replace(shader);
        self
    }

    /// The builder takes ownership of the layout; it is destroyed with the pipeline
    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        let _ = self.pipeline_layout.replace(layout);
        self
    }

    pub fn with_render_pass(mut self, render_pass: vk::RenderPass) -> Self {
        self.render_pass = render_pass;
        self
    }

    pub fn with_cull_mode(
        mut self,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> Self {
        self.rasterization.cull_mode = cull_mode;
        self.rasterization.front_face = front_face;
        self
    }

    pub fn with_blending_disabled(mut self) -> Self {
        self.color_blend_attachment.color_write_mask =
            vk::ColorComponentFlags::RGBA;
        self.color_blend_attachment.blend_enable = vk::FALSE;
        self
    }

    pub fn with_depth_test(
        mut self,
        enable: bool,
        compare: Option<vk::CompareOp>,
    ) -> Self {
        self.depth_stencil.depth_test_enable =
            if enable { vk::TRUE } else { vk::FALSE };
        self.depth_stencil.depth_write_enable =
            if enable { vk::TRUE } else { vk::FALSE };
        self.depth_stencil.depth_compare_op = if enable {
            compare.unwrap_or(vk::CompareOp::LESS_OR_EQUAL)
        } else {
            vk::CompareOp::ALWAYS
        };
        self
    }

    pub fn build(mut self) -> Result<GraphicsPipeline> {
        let device = self.device.clone();

        let pipeline_layout = self.pipeline_layout.take().ok_or_eyre(
            "No pipeline layout provided for GraphicsPipelineBuilder",
        )?;
        // From here on the layout is owned by the result or destroyed with the error
        match self.build_with_layout(pipeline_layout) {
            Ok(pipeline) => Ok(GraphicsPipeline {
                pipeline,
                pipeline_layout,
                device,
            }),
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout, None) };
                Err(err)
            }
        }
    }

    fn build_with_layout(mut self, pipeline_layout: vk::PipelineLayout) -> Result<vk::Pipeline> {
        if self.render_pass == vk::RenderPass::null() {
            return Err(eyre!("No render pass provided for GraphicsPipelineBuilder"));
        }
        let shader = self
            .shader
            .take()
            .ok_or_eyre("No shader provided for GraphicsPipelineBuilder")?;
        let shader_main_fn_name = CString::new("main")?;
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(shader.vert_mod)
                .name(&shader_main_fn_name),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(shader.frag_mod)
                .name(&shader_main_fn_name),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_attribute_descriptions(&self.vertex_input_description.attributes)
            .vertex_binding_descriptions(&self.vertex_input_description.bindings)
            .flags(self.vertex_input_description.flags);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let color_blend_attachments = [self.color_blend_attachment];
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        // Use dynamic state for viewport and scissor configuration
        let dynamic_states =
            [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .layout(pipeline_layout)
            .render_pass(self.render_pass)
            .subpass(0)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&self.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&self.rasterization)
            .multisample_state(&self.multisample)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&self.depth_stencil)
            .dynamic_state(&dynamic_info);

        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }.map_err(|(_, err)| eyre!("Failed to create graphics pipeline: {}", err))?;

        pipelines
            .into_iter()
            .next()
            .ok_or_eyre("Driver returned no graphics pipeline")
    }

    fn default_input_assembly_info() -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
        vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false)
    }

    fn default_rasterization_info() -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            // Discards all primitives before rasterization stage if true
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
    }

    fn default_color_blend_state() -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
    }

    fn default_multisample_info() -> vk::PipelineMultisampleStateCreateInfo<'static> {
        vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            // 1 sample per pixel means no multisampling
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false)
    }

    fn default_depth_stencil_info() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false)
    }
}
