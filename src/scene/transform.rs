use glam::{Affine3A, EulerRot, Mat4, Quat, Vec3};

/// Transform component
///
/// Position, rotation and scale (TRS) plus cached matrices and a shadow-state
/// dirty check, so the local matrix is only rebuilt when a field changed.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    pub(crate) local_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,

    last_position: Vec3,
    last_rotation: Quat,
    last_scale: Vec3,
    force_update: bool,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,

            local_matrix: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,

            last_position: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
            last_scale: Vec3::ONE,
            force_update: true,
        }
    }

    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::new()
        }
    }

    // ========================================================================
    // Dirty-checked update
    // ========================================================================

    /// Rebuilds the local matrix if any TRS field changed.
    ///
    /// Returns whether the matrix was rebuilt.
    pub fn update_local_matrix(&mut self) -> bool {
        let changed = self.position != self.last_position
            || self.rotation != self.last_rotation
            || self.scale != self.last_scale
            || self.force_update;

        if changed {
            self.local_matrix =
                Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position);

            self.last_position = self.position;
            self.last_rotation = self.rotation;
            self.last_scale = self.scale;
            self.force_update = false;
        }

        changed
    }

    // ========================================================================
    // Getters & Helpers
    // ========================================================================

    pub fn set_rotation_euler(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = Quat::from_euler(EulerRot::XYZ, x, y, z);
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    /// World matrix as `Mat4`, the layout instance buffers upload.
    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation.into()
    }

    pub fn set_world_matrix(&mut self, mat: Affine3A) {
        self.world_matrix = mat;
    }

    /// Copies TRS and cached matrices from another transform.
    ///
    /// Used when one node takes over another's slot in the hierarchy.
    pub fn copy_from(&mut self, other: &Transform) {
        self.position = other.position;
        self.rotation = other.rotation;
        self.scale = other.scale;
        self.local_matrix = other.local_matrix;
        self.world_matrix = other.world_matrix;
        self.mark_dirty();
    }

    /// Rotates so that -Z faces `target`. Both points are in parent space.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize();

        if forward.cross(up).length_squared() < 1e-4 {
            return;
        }

        let right = forward.cross(up).normalize();
        let new_up = right.cross(forward).normalize();

        let rot_mat = glam::Mat3::from_cols(right, new_up, -forward);
        self.rotation = Quat::from_mat3(&rot_mat);
    }

    pub fn mark_dirty(&mut self) {
        self.force_update = true;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
