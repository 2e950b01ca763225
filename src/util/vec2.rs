//! 2D vector math in world units.

use serde::{Deserialize, Serialize};

/// A point or direction in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn length_sq(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Unit vector in the same direction. Zero stays zero.
    pub fn normalized(&self) -> Vec2 {
        let len = self.length();
        if len < 1e-9 {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    /// Unit vector, coercing the zero vector to `(1, 0)`.
    pub fn normalized_or_unit_x(&self) -> Vec2 {
        let n = self.normalized();
        if n == Vec2::ZERO {
            Vec2::new(1.0, 0.0)
        } else {
            n
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x.abs() < 1e-9 && self.y.abs() < 1e-9
    }

    pub fn distance_to(&self, other: Vec2) -> f64 {
        (*self - other).length()
    }

    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product; sign gives the turn direction.
    pub fn cross(&self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn scale(&self, s: f64) -> Vec2 {
        Vec2::new(self.x * s, self.y * s)
    }

    /// Rotate by `angle` radians (counter-clockwise).
    pub fn rotated(&self, angle: f64) -> Vec2 {
        let (sin, cos) = angle.sin_cos();
        Vec2::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Angle of this vector in radians.
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }

    /// Rotate this unit vector toward `target` by at most `max_angle` radians,
    /// turning along whichever perpendicular reaches the target sooner.
    pub fn rotated_toward(&self, target: Vec2, max_angle: f64) -> Vec2 {
        let angle = self.cross(target).atan2(self.dot(target));
        let step = angle.clamp(-max_angle, max_angle);
        self.rotated(step)
    }

    /// Reflect across a surface normal (normal must be unit length).
    pub fn reflected(&self, normal: Vec2) -> Vec2 {
        let d = 2.0 * self.dot(normal);
        Vec2::new(self.x - d * normal.x, self.y - d * normal.y)
    }

    /// True when both components differ by no more than `eps`.
    pub fn approx_eq(&self, other: Vec2, eps: f64) -> bool {
        (self.x - other.x).abs() <= eps && (self.y - other.y).abs() <= eps
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        self.scale(rhs)
    }
}
