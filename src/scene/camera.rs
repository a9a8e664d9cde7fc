use glam::{Affine3A, Mat4, Vec3, Vec4};

use crate::resources::geometry::{BoundingBox, BoundingSphere};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    Perspective,
    Orthographic,
}

/// Camera projection plus the world transform it is viewed from.
///
/// Matrices use glam's right-handed conventions with a `[0, 1]` depth range
/// (the wgpu / Vulkan convention).
#[derive(Debug, Clone)]
pub struct Camera {
    pub projection_type: ProjectionType,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub ortho_size: f32,

    pub(crate) world_matrix: Affine3A,
    pub(crate) view_matrix: Mat4,
    pub(crate) projection_matrix: Mat4,
}

impl Camera {
    /// Creates a perspective camera. `fov` is given in degrees.
    #[must_use]
    pub fn new_perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut cam = Self {
            projection_type: ProjectionType::Perspective,
            fov: fov.to_radians(),
            aspect,
            near,
            far,
            ortho_size: 10.0,
            world_matrix: Affine3A::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
        };
        cam.update_projection_matrix();
        cam
    }

    /// Creates an orthographic camera spanning `ortho_size` half-height units.
    #[must_use]
    pub fn new_orthographic(ortho_size: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut cam = Self {
            projection_type: ProjectionType::Orthographic,
            fov: 0.0,
            aspect,
            near,
            far,
            ortho_size,
            world_matrix: Affine3A::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
        };
        cam.update_projection_matrix();
        cam
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = match self.projection_type {
            ProjectionType::Perspective => {
                Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
            }
            ProjectionType::Orthographic => {
                let w = self.ortho_size * self.aspect;
                let h = self.ortho_size;
                Mat4::orthographic_rh(-w, w, -h, h, self.near, self.far)
            }
        };
    }

    /// Places the camera. The view matrix is the inverse world matrix.
    pub fn update_view_projection(&mut self, world_transform: &Affine3A) {
        self.world_matrix = *world_transform;
        self.view_matrix = Mat4::from(*world_transform).inverse();
    }

    /// Convenience for hosts that drive the camera directly.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        let view = Mat4::look_at_rh(eye, target, up);
        self.view_matrix = view;
        self.world_matrix = Affine3A::from_mat4(view.inverse());
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix
    }

    /// `projection × inverse(world)`.
    #[inline]
    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.world_matrix.translation.into()
    }

    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_projection_matrix())
    }
}

/// Six normalised half-space planes: left, right, bottom, top, near, far.
///
/// A point `p` is inside plane `(n, d)` when `n·p + d >= 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Gribb-Hartmann extraction for a `[0, 1]` depth range.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0], // Left
            rows[3] - rows[0], // Right
            rows[3] + rows[1], // Bottom
            rows[3] - rows[1], // Top
            rows[2],           // Near
            rows[3] - rows[2], // Far
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[inline]
    #[must_use]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        for plane in &self.planes {
            let dist = plane.truncate().dot(center) + plane.w;
            if dist < -radius {
                return false;
            }
        }
        true
    }

    #[inline]
    #[must_use]
    pub fn intersects_bounding_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.intersects_sphere(sphere.center, sphere.radius)
    }

    /// AABB test using the positive vertex of each plane.
    #[must_use]
    pub fn intersects_box(&self, min: Vec3, max: Vec3) -> bool {
        for plane in &self.planes {
            let normal = plane.truncate();
            let p = Vec3::select(normal.cmpge(Vec3::ZERO), max, min);
            if normal.dot(p) + plane.w < 0.0 {
                return false;
            }
        }
        true
    }

    #[inline]
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &BoundingBox) -> bool {
        self.intersects_box(aabb.min, aabb.max)
    }
}
