//! Engine-to-BCF coordinate conversion.
//!
//! The 3D engine reports camera vectors in a Y-up right-handed frame; the
//! BCF standard stores them Z-up. The mapping is fixed:
//!
//! ```text
//! bcf.x =  native.x
//! bcf.y =  native.z
//! bcf.z = -native.y
//! ```
//!
//! Conversion happens exactly once per viewpoint, at capture time. Stored
//! cameras are never transformed again.

use crate::models::{EngineCamera, PerspectiveCamera, Vec3};

/// Convert an engine-native camera state into BCF Z-up space.
///
/// Applied field-by-field to the view point, direction, and up vector;
/// aspect ratio and field of view pass through unchanged.
pub fn to_bcf(native: &EngineCamera) -> PerspectiveCamera {
    PerspectiveCamera {
        view_point: yup_to_zup(native.view_point),
        direction: yup_to_zup(native.direction),
        up_vector: yup_to_zup(native.up_vector),
        aspect_ratio: native.aspect_ratio,
        field_of_view: native.field_of_view,
    }
}

fn yup_to_zup(v: Vec3) -> Vec3 {
    Vec3 {
        x: v.x,
        y: v.z,
        z: -v.y,
    }
}
