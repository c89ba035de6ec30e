//! Fixed-arity vector types.
//!
//! Both serialize as plain JSON arrays. Decoding rejects any other length
//! rather than truncating or padding.

use serde::{Deserialize, Serialize};

/// Three ordered components (x, y, z).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "[f32; 3]")]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl TryFrom<Vec<f32>> for Vector3 {
    type Error = String;

    fn try_from(value: Vec<f32>) -> Result<Self, Self::Error> {
        match value.as_slice() {
            [x, y, z] => Ok(Self::new(*x, *y, *z)),
            other => Err(format!(
                "vector must contain 3 values, got {}",
                other.len()
            )),
        }
    }
}

impl From<Vector3> for [f32; 3] {
    fn from(v: Vector3) -> Self {
        v.to_array()
    }
}

/// Rotation quaternion, ordered (x, y, z, w) on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "[f32; 4]")]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TryFrom<Vec<f32>> for Quaternion {
    type Error = String;

    fn try_from(value: Vec<f32>) -> Result<Self, Self::Error> {
        match value.as_slice() {
            [x, y, z, w] => Ok(Self::new(*x, *y, *z, *w)),
            other => Err(format!(
                "quaternion must contain 4 values, got {}",
                other.len()
            )),
        }
    }
}

impl From<Quaternion> for [f32; 4] {
    fn from(q: Quaternion) -> Self {
        q.to_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quaternion_identity_from_wire() {
        let q: Quaternion = serde_json::from_value(json!([0, 0, 0, 1])).unwrap();
        assert!(q.is_identity());
    }

    #[test]
    fn quaternion_rejects_wrong_arity() {
        for bad in [json!([]), json!([0, 0, 1]), json!([0, 0, 0, 1, 0])] {
            let err = serde_json::from_value::<Quaternion>(bad).unwrap_err();
            assert!(err.to_string().contains("4 values"), "{err}");
        }
    }

    #[test]
    fn vector_rejects_wrong_arity() {
        let err = serde_json::from_value::<Vector3>(json!([1.0, 2.0])).unwrap_err();
        assert!(err.to_string().contains("3 values"), "{err}");
    }

    #[test]
    fn vector_serializes_as_array() {
        let v = Vector3::new(1.5, -2.0, 0.25);
        assert_eq!(serde_json::to_value(v).unwrap(), json!([1.5, -2.0, 0.25]));
    }
}
