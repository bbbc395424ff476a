use std::io::{BufReader, Cursor};

use cgmath::InnerSpace;

use crate::{
    data_structures::mesh::{MeshData, MeshVertex},
    error::{EngineError, EngineResult},
    resources::load_string,
};

/// Fetches and parses an OBJ file.
pub async fn load_obj(path: &str) -> EngineResult<MeshData> {
    let text = load_string(path).await.map_err(|e| EngineError::MeshLoad {
        path: path.to_string(),
        reason: format!("{e:#}"),
    })?;
    parse_obj(path, &text).await
}

/**
 * Parses OBJ text into one mesh. All objects in the file are merged; their
 * materials are ignored since the engine binds materials per node.
 *
 * Files without normals get face-averaged ones, tangents are always derived.
 */
pub async fn parse_obj(path: &str, text: &str) -> EngineResult<MeshData> {
    let mesh_error = |reason: String| EngineError::MeshLoad {
        path: path.to_string(),
        reason,
    };

    let mut reader = BufReader::new(Cursor::new(text.as_bytes()));
    let (models, _materials) = tobj::load_obj_buf_async(
        &mut reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| async { Err(tobj::LoadError::GenericFailure) },
    )
    .await
    .map_err(|e| mesh_error(e.to_string()))?;

    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let mut has_normals = true;
    for m in &models {
        let base = vertices.len() as u32;
        let count = m.mesh.positions.len() / 3;
        has_normals &= m.mesh.normals.len() >= count * 3;
        vertices.extend((0..count).map(|i| {
            MeshVertex::new(
                [
                    m.mesh.positions[i * 3],
                    m.mesh.positions[i * 3 + 1],
                    m.mesh.positions[i * 3 + 2],
                ],
                [
                    m.mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                    m.mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                    m.mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
                ],
                [
                    m.mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                    1.0 - m.mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
                ],
            )
        }));
        for &index in &m.mesh.indices {
            if index as usize >= count {
                return Err(mesh_error(format!(
                    "index {index} out of range in object {}",
                    m.name
                )));
            }
            indices.push(base + index);
        }
    }

    if vertices.is_empty() || indices.is_empty() {
        return Err(mesh_error("no geometry".to_string()));
    }
    if !has_normals {
        log::debug!("{path} has no normals, deriving them from faces");
        face_normals(&mut vertices, &indices);
    }
    log::info!(
        "loaded {path}: {} vertices, {} triangles",
        vertices.len(),
        indices.len() / 3
    );
    Ok(MeshData::new(path, vertices, indices))
}

fn face_normals(vertices: &mut [MeshVertex], indices: &[u32]) {
    let mut sums = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    for c in indices.chunks_exact(3) {
        let p = |i: u32| cgmath::Vector3::from(vertices[i as usize].position);
        let normal = (p(c[1]) - p(c[0])).cross(p(c[2]) - p(c[0]));
        for &i in c {
            sums[i as usize] += normal;
        }
    }
    for (v, sum) in vertices.iter_mut().zip(sums) {
        if sum.magnitude2() > 0.0 {
            v.normal = sum.normalize().into();
        }
    }
}
