/// "Resources" refers to the GPU-backed objects the renderer draws with.
/// Buffers and images release their memory when dropped.

pub mod buffer;
pub mod image;
pub mod material;
pub mod mesh;
pub mod model;
pub mod sampler;
pub mod shader;
pub mod texture;
pub mod vertex;
