use color_eyre::Result;
use color_eyre::eyre::{eyre, OptionExt};
use shaderc::{CompileOptions, Compiler, ShaderKind};
use std::{env, fs, path::Path};

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=shaders");

    compile_shaders()?;

    Ok(())
}

/// Compiles every GLSL stage under `shaders/` into `shaders-built/<name>.<stage>.spv`
fn compile_shaders() -> Result<()> {
    let cargo_manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
    let shaders_in_dir = Path::new(&cargo_manifest_dir).join("shaders");
    let shaders_out_dir = Path::new(&cargo_manifest_dir).join("shaders-built");
    fs::create_dir_all(&shaders_out_dir)?;

    let compiler = Compiler::new().ok_or_eyre("Failed to create shader compiler")?;
    let options = CompileOptions::new().ok_or_eyre("Failed to create shader compile options")?;

    for entry in fs::read_dir(shaders_in_dir)? {
        let path = entry?.path();

        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_eyre(format!("Shader file has no extension: {:?}", path))?;
        let shader_kind = match ext {
            "vert" => ShaderKind::Vertex,
            "frag" => ShaderKind::Fragment,
            _ => {
                println!("cargo:warning=Skipping non-GLSL file: {:?}", path);
                continue;
            }
        };

        let file_name = path
            .file_name()
            .ok_or_eyre("Shader file has no name")?
            .to_str()
            .ok_or_eyre("Shader file name is not valid UTF-8")?;
        let source = fs::read_to_string(&path)?;
        let artifact = compiler
            .compile_into_spirv(&source, shader_kind, file_name, "main", Some(&options))
            .map_err(|err| eyre!("Failed to compile {}: {}", file_name, err))?;

        let output_filepath = shaders_out_dir.join(format!("{}.spv", file_name));
        fs::write(output_filepath, artifact.as_binary_u8())?;
    }

    Ok(())
}
