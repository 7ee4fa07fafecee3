// Camera uniform
//
// The ray-generation shader reconstructs primary rays from the camera
// basis vectors, so the uniform carries the view matrix decomposed into
// position, direction, up and side rows plus the projection parameters.
// Seven vec4 fields, 112 bytes, written once at startup.

use crate::config::CameraConfig;
use glam::{Mat4, Vec3, Vec4};

const LIGHT_POSITION: Vec3 = Vec3::new(0.0, 0.3, 0.5);
const AMBIENT: f32 = 0.1;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CameraUniform {
    pub sun_pos_and_ambient: [f32; 4],
    pub cam_pos: [f32; 4],
    pub cam_dir: [f32; 4],
    pub cam_up: [f32; 4],
    pub cam_side: [f32; 4],
    pub cam_near_far_fov: [f32; 4],
    pub frame_count: [f32; 4],
}

/// Build the uniform for the fixed demo viewpoint.
///
/// The camera sits behind the scene looking back at it: translate to
/// (0, -4, 10), then turn 180 degrees about Y. The view matrix is the
/// inverse of that, and the shader wants its rows.
pub fn build_camera_uniform(config: &CameraConfig, frame: f32) -> CameraUniform {
    let camera_matrix = Mat4::from_translation(Vec3::new(0.0, -4.0, 10.0))
        * Mat4::from_rotation_y(std::f32::consts::PI);
    let view = camera_matrix.inverse();

    let fovy = config.fov_degrees.to_radians();

    CameraUniform {
        sun_pos_and_ambient: LIGHT_POSITION.extend(AMBIENT).to_array(),
        cam_pos: view.w_axis.truncate().extend(0.0).to_array(),
        cam_dir: row_xyz(&view, 2),
        cam_up: row_xyz(&view, 1),
        cam_side: row_xyz(&view, 0),
        cam_near_far_fov: [config.near, config.far, fovy, 0.0],
        frame_count: [frame; 4],
    }
}

fn row_xyz(m: &Mat4, row: usize) -> [f32; 4] {
    let r: Vec4 = m.row(row);
    [r.x, r.y, r.z, 0.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_uniform() -> CameraUniform {
        build_camera_uniform(&CameraConfig::default(), 0.0)
    }

    #[test]
    fn uniform_is_112_bytes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 112);
    }

    #[test]
    fn near_far_fov_come_from_config() {
        let uniform = default_uniform();
        assert_eq!(uniform.cam_near_far_fov[0], 1.0);
        assert_eq!(uniform.cam_near_far_fov[1], 100.0);
        assert!((uniform.cam_near_far_fov[2] - 65.0f32.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn light_and_ambient_are_fixed() {
        let uniform = default_uniform();
        assert_eq!(uniform.sun_pos_and_ambient, [0.0, 0.3, 0.5, 0.1]);
    }

    #[test]
    fn view_inverts_the_camera_placement() {
        let uniform = default_uniform();
        // inverse of translate(0, -4, 10) then rotate 180 about Y
        let pos = uniform.cam_pos;
        assert!((pos[0]).abs() < 1e-5);
        assert!((pos[1] - 4.0).abs() < 1e-5);
        assert!((pos[2] - 10.0).abs() < 1e-5);

        // after the half-turn the view Z row faces -Z in world space
        let dir = uniform.cam_dir;
        assert!((dir[2] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn frame_count_fills_all_lanes() {
        let uniform = build_camera_uniform(&CameraConfig::default(), 7.0);
        assert_eq!(uniform.frame_count, [7.0; 4]);
    }
}
