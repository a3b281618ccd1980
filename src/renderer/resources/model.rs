use std::path::{Path, PathBuf};
use color_eyre::Result;
use glam::Mat4;
use crate::assets::obj::{load_obj, ParsedModel};
use crate::assets::texture::DecodedImage;
use crate::renderer::contexts::frame_ctx::slot::FrameSlot;
use crate::renderer::contexts::resource_ctx::memory::{GpuBuffer, GpuMemory};
use crate::renderer::contexts::resource_ctx::registry::ResourceRegistry;
use crate::renderer::error::RenderError;
use crate::renderer::resources::mesh::Mesh;

/// A model file turned into GPU meshes. Materials and textures live in the registry.
pub struct Model<B> {
    pub path: PathBuf,
    pub directory: PathBuf,
    pub meshes: Vec<Mesh<B>>,
}

impl<B: GpuBuffer> Model<B> {
    /// Loads an OBJ file, uploads its geometry and any textures the registry has not seen yet
    pub fn load<M, D>(
        path: &Path,
        registry: &mut ResourceRegistry<M::Image>,
        memory: &M,
        decode: D,
    ) -> Result<Self>
    where
        M: GpuMemory<Buffer = B>,
        D: FnMut(&Path) -> Result<DecodedImage>,
    {
        let parsed = load_obj(path)?;
        let model = Self::from_parsed(parsed, registry, memory)?;
        registry.upload_pending_textures(memory, decode)?;
        Ok(model)
    }

    /// Registers one material per mesh and uploads the mesh geometry
    pub fn from_parsed<M>(
        parsed: ParsedModel,
        registry: &mut ResourceRegistry<M::Image>,
        memory: &M,
    ) -> Result<Self>
    where
        M: GpuMemory<Buffer = B>,
    {
        let mut meshes = Vec::with_capacity(parsed.meshes.len());
        for (i, mesh) in parsed.meshes.into_iter().enumerate() {
            let texture_path = mesh.diffuse_texture
                .as_deref()
                .ok_or_else(|| RenderError::MissingDiffuseTexture {
                    model: parsed.path.clone(),
                    mesh: i,
                })?;
            let material = registry.get_or_create_material(texture_path);
            meshes.push(Mesh::upload(memory, mesh, material)?);
        }

        Ok(Self {
            path: parsed.path,
            directory: parsed.directory,
            meshes,
        })
    }

    /// Writes the same model matrix into every mesh's uniform buffer for `slot`
    pub fn write_transform(&mut self, slot: FrameSlot, model: Mat4) -> Result<()> {
        for mesh in &mut self.meshes {
            mesh.write_transform(slot, model)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::obj::fixtures::{parse, TRIANGLE_MTL, TRIANGLE_OBJ};
    use crate::renderer::contexts::resource_ctx::memory::host::HostMemory;
    use crate::renderer::resources::vertex::Vertex;
    use crate::renderer::shader_data::ModelData;

    fn white(_: &Path) -> Result<DecodedImage> {
        Ok(DecodedImage {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        })
    }

    #[test]
    fn one_triangle_one_texture() {
        let memory = HostMemory::default();
        let mut registry = ResourceRegistry::new();
        let parsed = parse("Assets/Models/Tri/tri.obj", TRIANGLE_OBJ, TRIANGLE_MTL);

        let model = Model::from_parsed(parsed, &mut registry, &memory).unwrap();
        registry.upload_pending_textures(&memory, white).unwrap();

        assert_eq!(registry.material_count(), 1);
        assert_eq!(registry.texture_count(), 1);
        assert_eq!(memory.images_created.get(), 1);
        assert_eq!(model.meshes.len(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.vertex_buffer.size(), 3 * size_of::<Vertex>() as u64);
        assert_eq!(mesh.index_buffer.size(), 3 * size_of::<u32>() as u64);
        assert_eq!(mesh.index_count(), 3);
        assert_eq!(mesh.vertex_buffer.contents(), bytemuck::cast_slice::<Vertex, u8>(&mesh.vertices));
    }

    #[test]
    fn two_models_share_a_texture() {
        let memory = HostMemory::default();
        let mut registry = ResourceRegistry::new();

        for path in ["Assets/Models/Tri/a.obj", "Assets/Models/Tri/b.obj"] {
            let parsed = parse(path, TRIANGLE_OBJ, TRIANGLE_MTL);
            Model::from_parsed(parsed, &mut registry, &memory).unwrap();
            registry.upload_pending_textures(&memory, white).unwrap();
        }

        assert_eq!(registry.texture_count(), 1);
        assert_eq!(memory.images_created.get(), 1);
    }

    #[test]
    fn mesh_without_diffuse_texture_is_rejected() {
        let memory = HostMemory::default();
        let mut registry = ResourceRegistry::new();
        let parsed = parse("plain.obj", TRIANGLE_OBJ, "newmtl Textured\n");

        let Err(err) = Model::from_parsed(parsed, &mut registry, &memory) else {
            panic!("a mesh without a diffuse texture was accepted");
        };

        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::MissingDiffuseTexture { mesh: 0, .. }),
        ));
    }

    #[test]
    fn transforms_land_in_the_slot_buffer() {
        let memory = HostMemory::default();
        let mut registry = ResourceRegistry::new();
        let parsed = parse("tri.obj", TRIANGLE_OBJ, TRIANGLE_MTL);
        let mut model = Model::from_parsed(parsed, &mut registry, &memory).unwrap();

        let slot = FrameSlot::new(1);
        let transform = Mat4::from_scale(glam::Vec3::splat(2.0));
        model.write_transform(slot, transform).unwrap();

        let written = model.meshes[0].model_uniforms[slot].contents();
        assert_eq!(written, bytemuck::bytes_of(&ModelData { model: transform }));
        let untouched = model.meshes[0].model_uniforms[FrameSlot::new(0)].contents();
        assert!(untouched.iter().all(|b| *b == 0));
    }
}
