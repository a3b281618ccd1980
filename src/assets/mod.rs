//! Boundary to the file formats the renderer consumes: OBJ geometry through tobj and
//! texture files through the image crate.

pub mod obj;
pub mod texture;
