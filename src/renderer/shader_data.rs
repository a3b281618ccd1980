use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Camera matrices passed into the per-camera uniform buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct CameraData {
    pub view: Mat4,
    pub proj: Mat4,
}

/// Data unique to each mesh passed into the per-mesh uniform buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct ModelData {
    pub model: Mat4,
}

/// Data unique to each render group passed as a push constant
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct PerDrawData {
    /// 0 selects world shading, 1 selects UI shading
    pub shader_variant: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_visible_sizes() {
        assert_eq!(size_of::<CameraData>(), 128);
        assert_eq!(size_of::<ModelData>(), 64);
        assert_eq!(size_of::<PerDrawData>(), 4);
    }
}
