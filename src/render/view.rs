//! 场景视图（相机）数据
//!
//! 渲染侧只读输入：世界 → 视图变换、投影与相机位置。

use glam::{Mat4, Vec3, Vec4Swizzles};

/// 单个视图的相机数据
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneView {
    /// 视图序号（分屏、阴影等多视图时区分）
    pub index: usize,
    pub world_to_view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub camera_position: Vec3,
    view_to_world: Mat4,
}

impl SceneView {
    pub fn new(index: usize, world_to_view: Mat4, projection: Mat4) -> Self {
        let view_to_world = world_to_view.inverse();
        Self {
            index,
            world_to_view,
            projection,
            view_projection: projection * world_to_view,
            camera_position: view_to_world.w_axis.xyz(),
            view_to_world,
        }
    }

    /// 右手坐标系透视相机
    pub fn look_at(index: usize, eye: Vec3, target: Vec3, up: Vec3, fov_y: f32, aspect: f32) -> Self {
        let world_to_view = Mat4::look_at_rh(eye, target, up);
        let projection = Mat4::perspective_rh(fov_y, aspect, 0.1, 10_000.0);
        Self::new(index, world_to_view, projection)
    }

    pub fn camera_right(&self) -> Vec3 {
        self.view_to_world.x_axis.xyz().normalize_or_zero()
    }

    pub fn camera_up(&self) -> Vec3 {
        self.view_to_world.y_axis.xyz().normalize_or_zero()
    }

    /// 相机朝向（右手系看向 -Z）
    pub fn camera_forward(&self) -> Vec3 {
        -self.view_to_world.z_axis.xyz().normalize_or_zero()
    }

    /// 视图空间深度，相机前方为正
    pub fn view_depth(&self, world: Vec3) -> f32 {
        -self.world_to_view.transform_point3(world).z
    }

    /// 投影后的 w 分量
    pub fn clip_w(&self, world: Vec3) -> f32 {
        (self.view_projection * world.extend(1.0)).w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_basis() {
        let view = SceneView::look_at(0, Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y, 1.0, 1.0);
        assert!((view.camera_position - Vec3::new(0.0, 0.0, 10.0)).length() < 1e-4);
        assert!((view.camera_forward() - Vec3::NEG_Z).length() < 1e-4);
        assert!((view.camera_right() - Vec3::X).length() < 1e-4);
        assert!((view.camera_up() - Vec3::Y).length() < 1e-4);
        assert!((view.view_depth(Vec3::ZERO) - 10.0).abs() < 1e-4);
        assert!(view.view_depth(Vec3::new(0.0, 0.0, -5.0)) > view.view_depth(Vec3::ZERO));
    }
}
