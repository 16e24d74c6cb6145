//! 轴对齐包围盒

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// 轴对齐包围盒，`min > max` 表示空
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self::new(center - extents, center + extents)
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |mut aabb, point| {
            aabb.include_point(point);
            aabb
        })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn include_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// 以 `radius` 为半径包含一个点
    #[inline]
    pub fn include_sphere(&mut self, center: Vec3, radius: f32) {
        let radius = Vec3::splat(radius.abs());
        self.min = self.min.min(center - radius);
        self.max = self.max.max(center + radius);
    }

    pub fn merge(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.min + self.max) * 0.5
        }
    }

    pub fn extents(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.max - self.min) * 0.5
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// 变换后重新求包围盒（取 8 个角点）
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::from_points(self.corners().map(|corner| matrix.transform_point3(corner)))
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_merge() {
        let empty = Aabb::EMPTY;
        assert!(empty.is_empty());
        let unit = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(empty.merge(&unit), unit);
        assert_eq!(unit.merge(&empty), unit);
        assert_eq!(empty.extents(), Vec3::ZERO);
    }

    #[test]
    fn test_include_sphere() {
        let mut aabb = Aabb::EMPTY;
        aabb.include_sphere(Vec3::new(1.0, 0.0, 0.0), 0.5);
        aabb.include_point(Vec3::new(-1.0, 2.0, 0.0));
        assert_eq!(aabb.min, Vec3::new(-1.0, -0.5, -0.5));
        assert_eq!(aabb.max, Vec3::new(1.5, 2.0, 0.5));
        assert!(aabb.contains(Vec3::new(0.0, 1.0, 0.0)));
        assert!(!aabb.contains(Vec3::new(0.0, 3.0, 0.0)));
    }

    #[test]
    fn test_transformed() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(moved.extents(), Vec3::ONE);
    }
}
