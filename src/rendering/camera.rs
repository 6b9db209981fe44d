use cgmath::{InnerSpace, Matrix4, Point3, Vector3};

/// Position and facing of the viewer, as used for LOD selection and draw
/// ordering.
pub trait ViewingVolume {
    fn position(&self) -> Point3<f32>;
    fn direction(&self) -> Vector3<f32>;
}

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub eye: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    pub aspect: f32,
    pub fovy: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Camera {
    pub fn looking_at(eye: Point3<f32>, target: Point3<f32>) -> Self {
        Self {
            eye,
            target,
            up: Vector3::unit_y(),
            aspect: 16.0 / 9.0,
            fovy: 45.0,
            znear: 0.1,
            zfar: 10_000.0,
        }
    }

    pub fn build_view_projection_matrix(&self) -> Matrix4<f32> {
        let view = Matrix4::look_at_rh(self.eye, self.target, self.up);
        let proj = cgmath::perspective(cgmath::Deg(self.fovy), self.aspect, self.znear, self.zfar);
        OPENGL_TO_WGPU_MATRIX * proj * view
    }

    /// Moves eye and target together.
    pub fn translate(&mut self, by: Vector3<f32>) {
        self.eye += by;
        self.target += by;
    }
}

impl ViewingVolume for Camera {
    fn position(&self) -> Point3<f32> {
        self.eye
    }

    fn direction(&self) -> Vector3<f32> {
        let forward = self.target - self.eye;
        if forward.magnitude2() > 0.0 {
            forward.normalize()
        } else {
            -Vector3::unit_z()
        }
    }
}

/// A fixed viewpoint, handy for driving LOD selection without a camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewpoint {
    pub position: Point3<f32>,
    pub direction: Vector3<f32>,
}

impl Viewpoint {
    pub fn new(position: [f32; 3], direction: [f32; 3]) -> Self {
        Self {
            position: Point3::from(position),
            direction: Vector3::from(direction),
        }
    }

    pub fn at(position: Point3<f32>) -> Self {
        Self {
            position,
            direction: -Vector3::unit_z(),
        }
    }
}

impl ViewingVolume for Viewpoint {
    fn position(&self) -> Point3<f32> {
        self.position
    }

    fn direction(&self) -> Vector3<f32> {
        self.direction
    }
}

/// Per-frame uniform of the terrain shader. `lod` carries the LOD switch
/// distances as `[base, 1 / increment, 0, 0]`.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
    pub lod: [f32; 4],
}

impl CameraUniform {
    pub fn new(camera: &Camera, base_distance: f32, inv_inc_distance: f32) -> Self {
        Self {
            view_proj: camera.build_view_projection_matrix().into(),
            eye: camera.eye.to_homogeneous().into(),
            lod: [base_distance, inv_inc_distance, 0.0, 0.0],
        }
    }
}
