//! Geometry primitives for annotation coordinates.
//!
//! Annotation locations live in voxel space as `f64` triples. Distance
//! comparisons use squared Euclidean distance; the only square root in the
//! crate is the split placement parametrization in [`ParametrizedLine`].

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// A point or direction in 3D voxel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length_squared(&self) -> f64 {
        self.dot(self)
    }

    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Squared distance between two points
    pub fn distance_squared(&self, other: &Vec3) -> f64 {
        (*self - *other).length_squared()
    }

    /// Integer-truncated voxel coordinate, as used by traced path endpoints
    pub fn truncated(&self) -> [i32; 3] {
        [self.x as i32, self.y as i32, self.z as i32]
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Line through two points, parametrized so that `t = 0` is `start` and
/// `t = 1` is `end`
#[derive(Debug, Clone, Copy)]
pub struct ParametrizedLine {
    start: Vec3,
    end: Vec3,
}

impl ParametrizedLine {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    pub fn length_squared(&self) -> f64 {
        self.start.distance_squared(&self.end)
    }

    /// Parameter value that lies `distance` units from `start`, clamped to
    /// `max_t`.
    ///
    /// The squared segment length is compared first so that the square root
    /// is only taken when the target distance is shorter than the clamp.
    pub fn parameter_at_distance(&self, distance: f64, max_t: f64) -> f64 {
        let length_squared = self.length_squared();
        if length_squared == 0.0 {
            return 0.0;
        }
        let max_distance_squared = length_squared * max_t * max_t;
        if distance * distance >= max_distance_squared {
            return max_t;
        }
        distance / length_squared.sqrt()
    }

    pub fn point_at(&self, t: f64) -> Vec3 {
        self.start + (self.end - self.start) * t
    }
}
