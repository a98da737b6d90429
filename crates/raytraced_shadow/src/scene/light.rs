//! Shadow-casting lights
//!
//! Hosts describe lights with a [`LightDescriptor`] carrying the host's kind
//! tag. Only some kinds can cast raytraced hard shadows; those are converted
//! into the closed [`Light`] union, the rest are rejected without failing the
//! frame.

use std::fmt;

use crate::foundation::math::{self, Mat4, Vec3};

/// Light kind as reported by the host engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Parallel rays, e.g. the sun
    Directional,
    /// Cone from a position
    Spot,
    /// Omnidirectional from a position
    Point,
    /// Point light casting shadows outward, with inverted normals
    ReversePoint,
    /// Rectangular area light (baked only on most hosts)
    Area,
    /// Disc-shaped area light
    Disc,
}

impl fmt::Display for LightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Directional => "Directional",
            Self::Spot => "Spot",
            Self::Point => "Point",
            Self::ReversePoint => "ReversePoint",
            Self::Area => "Area",
            Self::Disc => "Disc",
        };
        f.write_str(name)
    }
}

/// Host-side description of a light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDescriptor {
    /// Kind tag used for dispatch
    pub kind: LightKind,
    /// Local-to-world transform
    pub transform: Mat4,
    /// Range for point, reverse point and spot lights
    pub range: f32,
    /// Full cone angle in degrees for spot lights
    pub spot_angle: f32,
}

impl LightDescriptor {
    /// Describe a directional light
    pub fn directional(transform: Mat4) -> Self {
        Self { kind: LightKind::Directional, transform, range: 0.0, spot_angle: 0.0 }
    }

    /// Describe a spot light
    pub fn spot(transform: Mat4, range: f32, spot_angle: f32) -> Self {
        Self { kind: LightKind::Spot, transform, range, spot_angle }
    }

    /// Describe a point light
    pub fn point(transform: Mat4, range: f32) -> Self {
        Self { kind: LightKind::Point, transform, range, spot_angle: 0.0 }
    }

    /// Describe a reverse point light
    pub fn reverse_point(transform: Mat4, range: f32) -> Self {
        Self { kind: LightKind::ReversePoint, transform, range, spot_angle: 0.0 }
    }

    /// Describe a light of any kind, supported or not
    pub fn with_kind(kind: LightKind, transform: Mat4) -> Self {
        Self { kind, transform, range: 0.0, spot_angle: 0.0 }
    }
}

/// A light kind that cannot cast raytraced hard shadows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedLight(pub LightKind);

impl fmt::Display for UnsupportedLight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} light is not supported", self.0)
    }
}

impl std::error::Error for UnsupportedLight {}

/// Light accepted into a scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    /// Parallel rays along the transform's forward axis
    Directional {
        /// World transform
        transform: Mat4,
    },
    /// Cone along the transform's forward axis
    Spot {
        /// World transform
        transform: Mat4,
        /// Maximum distance
        range: f32,
        /// Full cone angle in degrees
        spot_angle: f32,
    },
    /// Omnidirectional
    Point {
        /// World transform
        transform: Mat4,
        /// Maximum distance
        range: f32,
    },
    /// Omnidirectional, shadows cast outward
    ReversePoint {
        /// World transform
        transform: Mat4,
        /// Maximum distance
        range: f32,
    },
}

impl Light {
    /// Kind tag of this light
    pub fn kind(&self) -> LightKind {
        match self {
            Self::Directional { .. } => LightKind::Directional,
            Self::Spot { .. } => LightKind::Spot,
            Self::Point { .. } => LightKind::Point,
            Self::ReversePoint { .. } => LightKind::ReversePoint,
        }
    }

    /// World transform
    pub fn transform(&self) -> &Mat4 {
        match self {
            Self::Directional { transform }
            | Self::Spot { transform, .. }
            | Self::Point { transform, .. }
            | Self::ReversePoint { transform, .. } => transform,
        }
    }

    /// World position from the transform's translation
    pub fn position(&self) -> Vec3 {
        math::translation(self.transform())
    }

    /// Normalized forward axis of the transform
    pub fn direction(&self) -> Vec3 {
        math::forward(self.transform())
    }

    /// Range, or `None` for directional lights
    pub fn range(&self) -> Option<f32> {
        match self {
            Self::Directional { .. } => None,
            Self::Spot { range, .. } | Self::Point { range, .. } | Self::ReversePoint { range, .. } => Some(*range),
        }
    }
}

impl TryFrom<&LightDescriptor> for Light {
    type Error = UnsupportedLight;

    fn try_from(desc: &LightDescriptor) -> Result<Self, Self::Error> {
        let transform = desc.transform;
        match desc.kind {
            LightKind::Directional => Ok(Self::Directional { transform }),
            LightKind::Spot => Ok(Self::Spot { transform, range: desc.range, spot_angle: desc.spot_angle }),
            LightKind::Point => Ok(Self::Point { transform, range: desc.range }),
            LightKind::ReversePoint => Ok(Self::ReversePoint { transform, range: desc.range }),
            kind @ (LightKind::Area | LightKind::Disc) => Err(UnsupportedLight(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_supported_kinds_convert() {
        let transform = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let spot = Light::try_from(&LightDescriptor::spot(transform, 10.0, 45.0)).unwrap();
        assert_eq!(spot, Light::Spot { transform, range: 10.0, spot_angle: 45.0 });
        assert_relative_eq!(spot.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(spot.range(), Some(10.0));

        let directional = Light::try_from(&LightDescriptor::directional(transform)).unwrap();
        assert_eq!(directional.kind(), LightKind::Directional);
        assert_eq!(directional.range(), None);

        let reverse = Light::try_from(&LightDescriptor::reverse_point(transform, 4.0)).unwrap();
        assert_eq!(reverse.kind(), LightKind::ReversePoint);
    }

    #[test]
    fn test_area_lights_are_rejected() {
        let desc = LightDescriptor::with_kind(LightKind::Area, Mat4::identity());
        let err = Light::try_from(&desc).unwrap_err();
        assert_eq!(err, UnsupportedLight(LightKind::Area));
        assert_eq!(err.to_string(), "Area light is not supported");
    }

    #[test]
    fn test_direction_is_forward_axis() {
        let light = Light::Directional { transform: Mat4::identity() };
        assert_relative_eq!(light.direction(), Vec3::z());
    }
}
