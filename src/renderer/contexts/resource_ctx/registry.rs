use std::collections::HashMap;
use std::path::{Path, PathBuf};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use crate::assets::texture::DecodedImage;
use crate::renderer::contexts::resource_ctx::descriptors::DescriptorSetIndex;
use crate::renderer::contexts::resource_ctx::memory::{upload_texture, GpuMemory};
use crate::renderer::resources::material::Material;
use crate::renderer::resources::texture::Texture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(usize);

impl TextureId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(usize);

impl MaterialId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Texture and material tables, filled while models load and read-only afterwards
pub struct ResourceRegistry<I> {
    textures: Vec<Texture<I>>,
    materials: Vec<Material>,
    material_by_path: HashMap<PathBuf, MaterialId>,
}

impl<I> Default for ResourceRegistry<I> {
    fn default() -> Self {
        Self {
            textures: Vec::new(),
            materials: Vec::new(),
            material_by_path: HashMap::new(),
        }
    }
}

impl<I> ResourceRegistry<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the material sampling `path`, creating the texture and material on first use
    pub fn get_or_create_material(&mut self, path: &Path) -> MaterialId {
        if let Some(id) = self.material_by_path.get(path) {
            log::debug!("Reusing material {} for {}", id.0, path.display());
            return *id;
        }

        let texture = TextureId(self.textures.len());
        self.textures.push(Texture::new(path));
        let material = MaterialId(self.materials.len());
        self.materials.push(Material::new(texture));
        self.material_by_path.insert(path.to_path_buf(), material);

        log::debug!(
            "Created material {} with texture {} for {}",
            material.0,
            texture.0,
            path.display(),
        );
        material
    }

    /// Decodes and uploads every texture that has no GPU image yet
    pub fn upload_pending_textures<M, D>(
        &mut self,
        memory: &M,
        mut decode: D,
    ) -> Result<usize>
    where
        M: GpuMemory<Image = I>,
        D: FnMut(&Path) -> Result<DecodedImage>,
    {
        let mut uploaded = 0;
        for texture in self.textures.iter_mut().filter(|t| !t.is_uploaded()) {
            let decoded = decode(&texture.path)
                .wrap_err_with(|| format!("Failed to load texture {}", texture.path.display()))?;
            let name = texture.path.to_string_lossy();
            texture.image = Some(upload_texture(memory, &name, &decoded)?);
            log::info!(
                "Uploaded texture {} ({}x{})",
                texture.path.display(),
                decoded.width,
                decoded.height,
            );
            uploaded += 1;
        }
        Ok(uploaded)
    }

    /// Returns the material's descriptor set, creating it with `create` the first time
    pub fn ensure_material_set<F>(
        &mut self,
        id: MaterialId,
        create: F,
    ) -> Result<DescriptorSetIndex>
    where
        F: FnOnce(&Texture<I>) -> Result<DescriptorSetIndex>,
    {
        let material = self.materials
            .get_mut(id.0)
            .ok_or_else(|| eyre!("Unknown material {}", id.0))?;
        if let Some(set) = material.descriptor_set {
            return Ok(set);
        }

        let texture = self.textures
            .get(material.diffuse_texture.0)
            .ok_or_else(|| eyre!("Unknown texture {}", material.diffuse_texture.0))?;
        let set = create(texture)?;
        material.descriptor_set = Some(set);
        Ok(set)
    }

    pub fn material(&self, id: MaterialId) -> Result<&Material> {
        self.materials
            .get(id.0)
            .ok_or_else(|| eyre!("Unknown material {}", id.0))
    }

    pub fn texture(&self, id: TextureId) -> Result<&Texture<I>> {
        self.textures
            .get(id.0)
            .ok_or_else(|| eyre!("Unknown texture {}", id.0))
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use super::*;
    use crate::renderer::contexts::resource_ctx::descriptors::DescriptorSetTable;
    use crate::renderer::contexts::resource_ctx::memory::host::{HostImage, HostMemory};
    use crate::renderer::contexts::frame_ctx::slot::PerFrame;
    use ash::vk;

    fn checkerboard(_: &Path) -> Result<DecodedImage> {
        Ok(DecodedImage {
            width: 2,
            height: 2,
            pixels: vec![128; 16],
        })
    }

    #[test]
    fn same_path_yields_same_material() {
        let mut registry: ResourceRegistry<HostImage> = ResourceRegistry::new();
        let a = registry.get_or_create_material(Path::new("Assets/a.png"));
        let b = registry.get_or_create_material(Path::new("Assets/b.png"));
        let again = registry.get_or_create_material(Path::new("Assets/a.png"));

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(registry.material_count(), 2);
        assert_eq!(registry.texture_count(), 2);
    }

    #[test]
    fn shared_texture_is_uploaded_once() {
        let memory = HostMemory::default();
        let mut registry = ResourceRegistry::new();

        registry.get_or_create_material(Path::new("Assets/shared.png"));
        assert_eq!(registry.upload_pending_textures(&memory, checkerboard).unwrap(), 1);

        // A second model referencing the same file
        registry.get_or_create_material(Path::new("Assets/shared.png"));
        assert_eq!(registry.upload_pending_textures(&memory, checkerboard).unwrap(), 0);

        assert_eq!(registry.texture_count(), 1);
        assert_eq!(memory.images_created.get(), 1);
    }

    #[test]
    fn decode_failure_is_fatal() {
        let memory = HostMemory::default();
        let mut registry = ResourceRegistry::new();
        registry.get_or_create_material(Path::new("Assets/missing.png"));

        let result = registry.upload_pending_textures(&memory, |_| Err(eyre!("no such file")));

        assert!(result.is_err());
        assert_eq!(memory.images_created.get(), 0);
    }

    #[test]
    fn material_set_is_created_once() {
        let mut registry: ResourceRegistry<HostImage> = ResourceRegistry::new();
        let mut table = DescriptorSetTable::default();
        let id = registry.get_or_create_material(Path::new("Assets/a.png"));
        let calls = Cell::new(0);

        let mut bind = |registry: &mut ResourceRegistry<HostImage>| {
            registry.ensure_material_set(id, |texture| {
                assert_eq!(texture.path, Path::new("Assets/a.png"));
                calls.set(calls.get() + 1);
                Ok(table.push(PerFrame::from_fn(|_| vk::DescriptorSet::null())))
            }).unwrap()
        };
        let first = bind(&mut registry);
        let second = bind(&mut registry);

        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        assert_eq!(registry.material(id).unwrap().descriptor_set, Some(first));
    }
}
