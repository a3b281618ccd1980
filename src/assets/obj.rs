use std::path::{Path, PathBuf};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use glam::{Vec2, Vec3};
use crate::renderer::resources::vertex::Vertex;

/// Geometry of one sub-mesh as read from disk
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// First diffuse texture of the mesh's material, resolved against the model directory
    pub diffuse_texture: Option<PathBuf>,
}

/// Flat list of every mesh in a model file. Node transforms are not applied.
#[derive(Debug, Clone)]
pub struct ParsedModel {
    pub path: PathBuf,
    pub directory: PathBuf,
    pub meshes: Vec<ParsedMesh>,
}

pub fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    }
}

pub fn load_obj(path: &Path) -> Result<ParsedModel> {
    let (models, materials) = tobj::load_obj(path, &load_options())
        .wrap_err_with(|| format!("Failed to load model {}", path.display()))?;
    log::info!("Loaded {} meshes from {}", models.len(), path.display());
    Ok(ParsedModel::from_tobj(path, models, materials))
}

impl ParsedModel {
    pub fn from_tobj(
        path: &Path,
        models: Vec<tobj::Model>,
        materials: std::result::Result<Vec<tobj::Material>, tobj::LoadError>,
    ) -> Self {
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let materials = materials.unwrap_or_else(|err| {
            log::warn!("No materials for {}: {}", path.display(), err);
            Vec::new()
        });

        let meshes = models
            .into_iter()
            .map(|model| {
                let mesh = model.mesh;
                let diffuse_texture = mesh.material_id
                    .and_then(|id| materials.get(id))
                    .and_then(|material| material.diffuse_texture.as_deref())
                    .filter(|name| !name.is_empty())
                    .map(|name| directory.join(name));
                ParsedMesh {
                    vertices: interleave(&mesh.positions, &mesh.texcoords),
                    indices: mesh.indices,
                    diffuse_texture,
                }
            })
            .collect();

        Self {
            path: path.to_path_buf(),
            directory,
            meshes,
        }
    }
}

// Texture rows are stored top-down, so v is flipped
fn interleave(positions: &[f32], texcoords: &[f32]) -> Vec<Vertex> {
    positions
        .chunks_exact(3)
        .enumerate()
        .map(|(i, p)| {
            let texcoord = texcoords
                .get(i * 2..i * 2 + 2)
                .map(|uv| Vec2::new(uv[0], 1.0 - uv[1]))
                .unwrap_or(Vec2::ZERO);
            Vertex::new(Vec3::new(p[0], p[1], p[2]), texcoord)
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn triangle_fixture_parses() {
        let model = parse("Assets/Models/Tri/tri.obj", TRIANGLE_OBJ, TRIANGLE_MTL);

        assert_eq!(model.directory, Path::new("Assets/Models/Tri"));
        assert_eq!(model.meshes.len(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(
            mesh.diffuse_texture.as_deref(),
            Some(Path::new("Assets/Models/Tri/diffuse.png")),
        );
    }

    #[test]
    fn texcoords_are_flipped_vertically() {
        let model = parse("tri.obj", TRIANGLE_OBJ, TRIANGLE_MTL);
        let vertices = &model.meshes[0].vertices;
        assert_eq!(vertices[0].texcoord, Vec2::new(0.0, 1.0));
        assert_eq!(vertices[2].texcoord, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn material_without_diffuse_map() {
        let model = parse("tri.obj", TRIANGLE_OBJ, "newmtl Textured\nKd 1.0 1.0 1.0\n");
        assert_eq!(model.meshes[0].diffuse_texture, None);
    }
}
