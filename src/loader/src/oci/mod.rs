//! OCI image handling for nydus sources.
//!
//! - Descriptor construction from locally serialized bytes
//! - Nydus platform and manifest recognition
//! - Single-member extraction from (compressed) layer archives
//! - Registry access through `oci-distribution`

pub mod descriptor;
pub mod image;
pub mod layers;
pub mod platform;
pub mod registry;

pub use descriptor::{marshal_to_desc, sha256_digest};
pub use image::{
    is_bootstrap_layer, is_nydus_manifest, select_nydus_manifest, NydusImage, ParsedImage,
    BOOTSTRAP_FILE_NAME_IN_LAYER, LAYER_ANNOTATION_NYDUS_BOOTSTRAP, MEDIA_TYPE_NYDUS_BLOB,
};
pub use layers::{decompress_stream, unpack_file, Compression};
pub use platform::{is_nydus_platform, match_nydus_platform};
pub use registry::RegistryParser;
