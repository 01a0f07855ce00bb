use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Number of view transforms carried in the camera uniform. The same
/// pipeline serves single-view and stereo/array rendering by indexing into
/// this array; the WGSL declaration in [`crate::shaders`] must match.
pub const MAX_VIEWS: usize = 2;

/// Yaw/pitch camera. `calc_matrix` builds a right-handed look-to view.
#[derive(Debug, Clone, Copy, Default)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Camera {
    pub fn new<V: Into<Vec3>>(position: V, yaw: f32, pitch: f32) -> Self {
        Self {
            position: position.into(),
            yaw,
            pitch,
        }
    }

    /// Camera placed at `position` looking at `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let dir = (target - position).normalize_or_zero();
        Self {
            position,
            yaw: dir.z.atan2(dir.x),
            pitch: dir.y.clamp(-1.0, 1.0).asin(),
        }
    }

    pub fn calc_matrix(&self) -> Mat4 {
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        Mat4::look_to_rh(
            self.position,
            Vec3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize(),
            Vec3::Y,
        )
    }
}

/// Perspective projection with resize support.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    aspect: f32,
    fovy: f32,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new(width: u32, height: u32, fovy_degrees: f32, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy_degrees.to_radians(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn calc_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// GPU camera block: an indexed view-projection array plus the eye position
/// and the active view index. Written once per frame, immutable during it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UniformCamera {
    views: [[[f32; 4]; 4]; MAX_VIEWS],
    eye: [f32; 4],
    view_index: [u32; 4],
}

impl UniformCamera {
    /// Single-view setup: the one transform is replicated into every slot so
    /// any view index the host supplies stays valid.
    pub fn from_camera_projection(camera: &Camera, projection: &Projection) -> Self {
        let view_proj = projection.calc_matrix() * camera.calc_matrix();
        Self::from_views([view_proj; MAX_VIEWS], 0, camera.position)
    }

    pub fn from_views(views: [Mat4; MAX_VIEWS], active: u32, eye: Vec3) -> Self {
        debug_assert!((active as usize) < MAX_VIEWS);
        Self {
            views: views.map(|matrix| matrix.to_cols_array_2d()),
            eye: eye.extend(1.0).into(),
            view_index: [active, 0, 0, 0],
        }
    }

    pub fn view(&self, index: usize) -> Mat4 {
        Mat4::from_cols_array_2d(&self.views[index])
    }

    pub fn active_view(&self) -> u32 {
        self.view_index[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn single_view_replicates_transform() {
        let camera = Camera::new(Vec3::new(0.0, 1.0, 5.0), -std::f32::consts::FRAC_PI_2, 0.0);
        let projection = Projection::new(640, 480, 60.0, 0.1, 100.0);
        let uniform = UniformCamera::from_camera_projection(&camera, &projection);
        assert_eq!(uniform.active_view(), 0);
        assert_eq!(uniform.view(0), uniform.view(1));
        let clip = uniform.view(0) * Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert!(clip.w > 0.0);
    }

    #[test]
    fn looking_at_faces_the_target() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let view = camera.calc_matrix();
        // The target ends up in front of the camera (negative view-space z).
        let target_view = view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(target_view.z < 0.0);
    }

    #[test]
    fn resize_updates_aspect() {
        let mut projection = Projection::new(100, 100, 45.0, 0.1, 10.0);
        let square = projection.calc_matrix();
        projection.resize(200, 100);
        let wide = projection.calc_matrix();
        assert!(wide.col(0).x < square.col(0).x);
    }
}
