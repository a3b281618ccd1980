use crate::renderer::contexts::resource_ctx::descriptors::DescriptorSetIndex;
use crate::renderer::contexts::resource_ctx::registry::TextureId;

/// Shading inputs shared by every mesh that samples the same diffuse texture
pub struct Material {
    pub diffuse_texture: TextureId,
    /// Allocated when the first mesh using this material is bound
    pub descriptor_set: Option<DescriptorSetIndex>,
}

impl Material {
    pub fn new(diffuse_texture: TextureId) -> Self {
        Self {
            diffuse_texture,
            descriptor_set: None,
        }
    }
}
