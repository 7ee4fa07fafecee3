// Demo scene geometry
//
// Two meshes, a ground plane and a unit cube, each with positions,
// u16 indices, normals, uvs, per-triangle material ids and a row-major
// 3x4 world transform. The derived payloads below are what the
// closest-hit shader reads through the storage-buffer arrays.

/// One mesh of the demo scene.
pub struct MeshData {
    pub name: &'static str,
    /// xyz per vertex
    pub vertices: Vec<f32>,
    pub indices: Vec<u16>,
    /// xyz per vertex
    pub normals: Vec<f32>,
    /// uv per vertex
    pub uvs: Vec<f32>,
    /// one id per triangle, stored as f32 for the shader
    pub material_ids: Vec<f32>,
    /// row-major 3x4, translation in the fourth column
    pub transform: [f32; 12],
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Per-index attribute records, 8 floats each:
    /// normal.xyz, pad, uv, pad, pad. Indexed by gl_PrimitiveID * 3 + n
    /// in the hit shader, so attributes are unrolled per index.
    pub fn attribute_data(&self) -> Vec<f32> {
        let mut out = vec![0.0f32; self.indices.len() * 8];
        for (ii, &index) in self.indices.iter().enumerate() {
            let o8 = ii * 8;
            let o3 = index as usize * 3;
            let o2 = index as usize * 2;
            out[o8] = self.normals[o3];
            out[o8 + 1] = self.normals[o3 + 1];
            out[o8 + 2] = self.normals[o3 + 2];
            out[o8 + 4] = self.uvs[o2];
            out[o8 + 5] = self.uvs[o2 + 1];
        }
        out
    }

    /// Per-triangle index records, 4 u32 each (a, b, c, pad). These
    /// address into the unrolled attribute records, so triangle f uses
    /// 3f, 3f+1, 3f+2.
    pub fn face_data(&self) -> Vec<u32> {
        let triangles = self.triangle_count();
        let mut out = vec![0u32; triangles * 4];
        for f in 0..triangles {
            out[4 * f] = (3 * f) as u32;
            out[4 * f + 1] = (3 * f + 1) as u32;
            out[4 * f + 2] = (3 * f + 2) as u32;
        }
        out
    }
}

const IDENTITY_3X4: [f32; 12] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0,
];

/// Ground plane, 12 units across, facing up.
pub fn plane() -> MeshData {
    MeshData {
        name: "plane",
        vertices: vec![
            -6.0, 0.0, -6.0, //
            6.0, 0.0, -6.0, //
            6.0, 0.0, 6.0, //
            -6.0, 0.0, 6.0,
        ],
        indices: vec![0, 1, 2, 2, 3, 0],
        normals: vec![
            0.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 1.0, 0.0,
        ],
        uvs: vec![
            0.0, 0.0, //
            1.0, 0.0, //
            1.0, 1.0, //
            0.0, 1.0,
        ],
        material_ids: vec![0.0, 0.0],
        transform: IDENTITY_3X4,
    }
}

/// Unit cube resting on the plane. 24 vertices so every face has flat
/// normals and its own uv square.
pub fn cube() -> MeshData {
    #[rustfmt::skip]
    let face_normals: [[f32; 3]; 6] = [
        [0.0, 0.0, 1.0],   // front
        [0.0, 0.0, -1.0],  // back
        [1.0, 0.0, 0.0],   // right
        [-1.0, 0.0, 0.0],  // left
        [0.0, 1.0, 0.0],   // top
        [0.0, -1.0, 0.0],  // bottom
    ];
    #[rustfmt::skip]
    let face_vertices: [[[f32; 3]; 4]; 6] = [
        // front
        [[-0.5, -0.5,  0.5], [ 0.5, -0.5,  0.5], [ 0.5,  0.5,  0.5], [-0.5,  0.5,  0.5]],
        // back
        [[ 0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5,  0.5, -0.5], [ 0.5,  0.5, -0.5]],
        // right
        [[ 0.5, -0.5,  0.5], [ 0.5, -0.5, -0.5], [ 0.5,  0.5, -0.5], [ 0.5,  0.5,  0.5]],
        // left
        [[-0.5, -0.5, -0.5], [-0.5, -0.5,  0.5], [-0.5,  0.5,  0.5], [-0.5,  0.5, -0.5]],
        // top
        [[-0.5,  0.5,  0.5], [ 0.5,  0.5,  0.5], [ 0.5,  0.5, -0.5], [-0.5,  0.5, -0.5]],
        // bottom
        [[-0.5, -0.5, -0.5], [ 0.5, -0.5, -0.5], [ 0.5, -0.5,  0.5], [-0.5, -0.5,  0.5]],
    ];

    let mut vertices = Vec::with_capacity(24 * 3);
    let mut normals = Vec::with_capacity(24 * 3);
    let mut uvs = Vec::with_capacity(24 * 2);
    let mut indices = Vec::with_capacity(36);

    for (face, corners) in face_vertices.iter().enumerate() {
        let base = (face * 4) as u16;
        for (corner, position) in corners.iter().enumerate() {
            vertices.extend_from_slice(position);
            normals.extend_from_slice(&face_normals[face]);
            let (u, v) = match corner {
                0 => (0.0, 0.0),
                1 => (1.0, 0.0),
                2 => (1.0, 1.0),
                _ => (0.0, 1.0),
            };
            uvs.push(u);
            uvs.push(v);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    MeshData {
        name: "cube",
        vertices,
        indices,
        normals,
        uvs,
        material_ids: vec![1.0; 12],
        // lifted half a unit so it sits on the plane
        transform: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.5, //
            0.0, 0.0, 1.0, 0.0,
        ],
    }
}

/// The scene both acceleration structures are built from.
pub fn demo_scene() -> Vec<MeshData> {
    vec![plane(), cube()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_scene_has_two_meshes() {
        let scene = demo_scene();
        assert_eq!(scene.len(), 2);
        assert_eq!(scene[0].name, "plane");
        assert_eq!(scene[1].name, "cube");
    }

    #[test]
    fn material_ids_cover_every_triangle() {
        for mesh in demo_scene() {
            assert_eq!(mesh.material_ids.len(), mesh.triangle_count());
        }
    }

    #[test]
    fn attribute_records_are_eight_floats_per_index() {
        let mesh = plane();
        let attrs = mesh.attribute_data();
        assert_eq!(attrs.len(), mesh.indices.len() * 8);

        // first index of the plane is vertex 0: normal up, uv (0, 0)
        assert_eq!(&attrs[0..4], &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(&attrs[4..8], &[0.0, 0.0, 0.0, 0.0]);

        // third index is vertex 2: uv (1, 1)
        assert_eq!(&attrs[2 * 8 + 4..2 * 8 + 6], &[1.0, 1.0]);
    }

    #[test]
    fn face_records_address_unrolled_attributes() {
        let mesh = cube();
        let faces = mesh.face_data();
        assert_eq!(faces.len(), mesh.triangle_count() * 4);

        for f in 0..mesh.triangle_count() {
            assert_eq!(faces[4 * f], (3 * f) as u32);
            assert_eq!(faces[4 * f + 1], (3 * f + 1) as u32);
            assert_eq!(faces[4 * f + 2], (3 * f + 2) as u32);
            assert_eq!(faces[4 * f + 3], 0);
        }
    }

    #[test]
    fn cube_has_flat_normals_per_face() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24 * 3);
        assert_eq!(mesh.indices.len(), 36);
        // every vertex of the top face points up
        for corner in 0..4 {
            let o = (16 + corner) * 3;
            assert_eq!(&mesh.normals[o..o + 3], &[0.0, 1.0, 0.0]);
        }
    }
}
