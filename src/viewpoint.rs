//! Viewpoint capture and refresh.
//!
//! Builds [`Viewpoint`] entities from an engine camera state plus optional
//! PNG bytes. The camera is converted to BCF space here, once; snapshot
//! bytes are accepted only when they carry the PNG signature. A rejected
//! image is a warning, not an error — the viewpoint is still created,
//! just without a snapshot reference.

use uuid::Uuid;

use crate::camera;
use crate::models::{EngineCamera, Viewpoint};

/// PNG magic number: the first four bytes of any valid PNG stream.
pub const PNG_SIGNATURE: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

/// A freshly built viewpoint together with its accepted snapshot bytes,
/// ready to be persisted by the store.
#[derive(Debug, Clone)]
pub struct CapturedViewpoint {
    pub viewpoint: Viewpoint,
    pub snapshot: Option<Vec<u8>>,
}

/// Returns true when `bytes` begins with the PNG signature.
pub fn is_png(bytes: &[u8]) -> bool {
    bytes.len() >= PNG_SIGNATURE.len() && bytes[..PNG_SIGNATURE.len()] == PNG_SIGNATURE
}

/// Build a new viewpoint from a camera snapshot.
///
/// Assigns a fresh GUID and converts the camera into BCF space. When image
/// bytes are present and valid, the snapshot reference is the viewpoint
/// GUID and the accepted bytes ride along in the result; invalid bytes are
/// dropped with a warning.
pub fn capture(title: &str, native: &EngineCamera, image: Option<&[u8]>) -> CapturedViewpoint {
    let guid = Uuid::new_v4().to_string();
    let (snapshot_ref, snapshot) = accept_image(&guid, image);

    CapturedViewpoint {
        viewpoint: Viewpoint {
            guid,
            title: title.to_string(),
            camera: camera::to_bcf(native),
            snapshot_ref,
        },
        snapshot,
    }
}

/// Refresh an existing viewpoint in place from a new camera state.
///
/// The GUID never changes. Camera fields are replaced with the freshly
/// converted state. A valid image replaces the snapshot reference and its
/// accepted bytes are returned for persistence; an invalid image leaves
/// the previous snapshot untouched.
pub fn recapture(
    viewpoint: &mut Viewpoint,
    native: &EngineCamera,
    image: Option<&[u8]>,
) -> Option<Vec<u8>> {
    viewpoint.camera = camera::to_bcf(native);

    let (snapshot_ref, snapshot) = accept_image(&viewpoint.guid, image);
    if snapshot_ref.is_some() {
        viewpoint.snapshot_ref = snapshot_ref;
    }
    snapshot
}

fn accept_image(guid: &str, image: Option<&[u8]>) -> (Option<String>, Option<Vec<u8>>) {
    match image {
        Some(bytes) if is_png(bytes) => (Some(guid.to_string()), Some(bytes.to_vec())),
        Some(bytes) => {
            tracing::warn!(
                viewpoint = guid,
                len = bytes.len(),
                "snapshot rejected: bytes do not start with the PNG signature"
            );
            (None, None)
        }
        None => (None, None),
    }
}
