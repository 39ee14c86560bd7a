//! OBJ file loader for 3D models
//!
//! Produces one vertex per unique (position, texture coordinate) pair. Texture
//! coordinates are flipped vertically to match Vulkan's top-left image origin
//! and every vertex is colored white.

use crate::assets::AssetError;
use crate::render::Vertex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Vertex and index data of a loaded model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    /// De-duplicated vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

/// Load an OBJ model from disk
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<ModelData, AssetError> {
    ObjLoader::load_obj(path)
}

/// Minimal OBJ parser covering positions, texture coordinates and polygon faces
pub struct ObjLoader;

impl ObjLoader {
    /// Load an OBJ file from disk
    pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<ModelData, AssetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }

        let file = File::open(path)?;
        let model = Self::parse(BufReader::new(file))?;
        log::info!(
            "Loaded model {:?}: {} unique vertices, {} indices",
            path,
            model.vertices.len(),
            model.indices.len()
        );
        Ok(model)
    }

    /// Parse OBJ text from any buffered reader
    pub fn parse<R: BufRead>(reader: R) -> Result<ModelData, AssetError> {
        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut tex_coords: Vec<[f32; 2]> = Vec::new();
        let mut model = ModelData::default();
        let mut unique_vertices: HashMap<[u32; 8], u32> = HashMap::new();

        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("v") => positions.push(parse_floats::<3>(parts, line_number)?),
                Some("vt") => tex_coords.push(parse_floats::<2>(parts, line_number)?),
                Some("f") => {
                    let mut face = Vec::with_capacity(4);
                    for corner in parts {
                        let vertex = face_vertex(corner, &positions, &tex_coords, line_number)?;
                        let next_index = model.vertices.len() as u32;
                        let index = *unique_vertices.entry(vertex_key(&vertex)).or_insert_with(|| {
                            model.vertices.push(vertex);
                            next_index
                        });
                        face.push(index);
                    }

                    if face.len() < 3 {
                        return Err(AssetError::InvalidData(format!(
                            "line {}: face needs at least 3 vertices",
                            line_number + 1
                        )));
                    }

                    // Fan triangulation
                    for i in 1..face.len() - 1 {
                        model.indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if model.vertices.is_empty() {
            return Err(AssetError::InvalidData("No faces found in OBJ data".to_string()));
        }

        Ok(model)
    }
}

fn parse_floats<'a, const N: usize>(
    parts: impl Iterator<Item = &'a str>,
    line_number: usize,
) -> Result<[f32; N], AssetError> {
    let mut values = [0.0_f32; N];
    let mut parts = parts;
    for value in &mut values {
        let token = parts.next().ok_or_else(|| {
            AssetError::InvalidData(format!("line {}: expected {} components", line_number + 1, N))
        })?;
        *value = token.parse().map_err(|_| {
            AssetError::InvalidData(format!("line {}: invalid number '{}'", line_number + 1, token))
        })?;
    }
    Ok(values)
}

/// Resolve a 1-based (or negative, relative) OBJ index
fn resolve_index(token: &str, len: usize, line_number: usize) -> Result<usize, AssetError> {
    let raw: i64 = token.parse().map_err(|_| {
        AssetError::InvalidData(format!("line {}: invalid index '{}'", line_number + 1, token))
    })?;
    let resolved = if raw < 0 { len as i64 + raw } else { raw - 1 };
    if resolved < 0 || resolved as usize >= len {
        return Err(AssetError::InvalidData(format!(
            "line {}: index {} out of bounds",
            line_number + 1,
            raw
        )));
    }
    Ok(resolved as usize)
}

fn face_vertex(
    corner: &str,
    positions: &[[f32; 3]],
    tex_coords: &[[f32; 2]],
    line_number: usize,
) -> Result<Vertex, AssetError> {
    let mut indices = corner.split('/');
    let position = indices
        .next()
        .map(|token| resolve_index(token, positions.len(), line_number))
        .transpose()?
        .map(|i| positions[i])
        .ok_or_else(|| AssetError::InvalidData(format!("line {}: empty face corner", line_number + 1)))?;

    let uv = match indices.next() {
        Some(token) if !token.is_empty() => {
            let [u, v] = tex_coords[resolve_index(token, tex_coords.len(), line_number)?];
            [u, 1.0 - v]
        }
        _ => [0.0, 0.0],
    };

    Ok(Vertex {
        position,
        color: [1.0, 1.0, 1.0],
        uv,
    })
}

fn vertex_key(vertex: &Vertex) -> [u32; 8] {
    let p = vertex.position;
    let c = vertex.color;
    let t = vertex.uv;
    [p[0], p[1], p[2], c[0], c[1], c[2], t[0], t[1]].map(f32::to_bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const QUAD: &str = "\
# two triangles sharing an edge
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3
f 1/1 3/3 4/4
";

    #[test]
    fn test_shared_vertices_are_deduplicated() {
        let model = ObjLoader::parse(QUAD.as_bytes()).unwrap();
        assert_eq!(model.vertices.len(), 4);
        assert_eq!(model.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_texture_v_is_flipped_and_color_white() {
        let model = ObjLoader::parse(QUAD.as_bytes()).unwrap();
        assert_relative_eq!(model.vertices[0].uv[1], 1.0);
        assert_relative_eq!(model.vertices[2].uv[1], 0.0);
        assert!(model.vertices.iter().all(|v| v.color == [1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_quad_face_is_fan_triangulated() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let model = ObjLoader::parse(obj.as_bytes()).unwrap();
        assert_eq!(model.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_same_position_different_uv_stays_separate() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 0.5 0.5\nf 1/1 2/1 3/1\nf 1/2 2/1 3/1\n";
        let model = ObjLoader::parse(obj.as_bytes()).unwrap();
        assert_eq!(model.vertices.len(), 4);
        assert_eq!(model.indices, vec![0, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_negative_indices() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let model = ObjLoader::parse(obj.as_bytes()).unwrap();
        assert_eq!(model.indices, vec![0, 1, 2]);
        assert_eq!(model.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_out_of_bounds_index_is_an_error() {
        let obj = "v 0 0 0\nf 1 2 3\n";
        assert!(matches!(ObjLoader::parse(obj.as_bytes()), Err(AssetError::InvalidData(_))));
    }

    #[test]
    fn test_empty_model_is_an_error() {
        assert!(ObjLoader::parse("# nothing\n".as_bytes()).is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        std::fs::write(&path, QUAD).unwrap();

        let model = load_model(&path).unwrap();
        assert_eq!(model.indices.len(), 6);
        assert!(matches!(load_model(dir.path().join("missing.obj")), Err(AssetError::NotFound(_))));
    }
}
