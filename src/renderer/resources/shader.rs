use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;

/// Vertex and fragment modules, destroyed once the pipeline has been built
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn load(
        vertex_path: &Path,
        fragment_path: &Path,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let vert_mod = create_shader_module(vertex_path, &device)?;
        let frag_mod = match create_shader_module(fragment_path, &device) {
            Ok(module) => module,
            Err(err) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(err);
            }
        };
        Ok(Self { vert_mod, frag_mod, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

fn create_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let mut file = File::open(filepath)
        .wrap_err_with(|| format!("Failed to open shader {}", filepath.display()))?;
    // read_spv handles alignment and endianness of the SPIR-V words
    let code = ash::util::read_spv(&mut file)
        .wrap_err_with(|| format!("Failed to read SPIR-V from {}", filepath.display()))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}
