//! Content-addressed descriptor construction.

use nydus_load_core::error::Result;
use oci_distribution::manifest::OciDescriptor;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// `sha256:<hex>` digest of raw bytes.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Serialize `data` to compact JSON and describe the resulting bytes.
///
/// The digest and size are always computed from the local serialization,
/// never copied from upstream metadata. Identical serialized bytes give an
/// identical descriptor; field order is whatever `data`'s `Serialize`
/// implementation produces.
pub fn marshal_to_desc<T>(data: &T, media_type: &str) -> Result<(OciDescriptor, Vec<u8>)>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(data)?;
    let desc = OciDescriptor {
        media_type: media_type.to_string(),
        digest: sha256_digest(&bytes),
        size: bytes.len() as i64,
        ..Default::default()
    };
    Ok((desc, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_digest_known_value() {
        assert_eq!(
            sha256_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_marshal_to_desc_describes_bytes() {
        let obj = json!({"schemaVersion": 2, "layers": []});
        let (desc, bytes) = marshal_to_desc(&obj, "application/json").unwrap();

        assert_eq!(bytes, serde_json::to_vec(&obj).unwrap());
        assert_eq!(desc.digest, sha256_digest(&bytes));
        assert_eq!(desc.media_type, "application/json");

        let serialized = serde_json::to_value(&desc).unwrap();
        assert_eq!(serialized["size"], json!(bytes.len()));
    }

    #[test]
    fn test_marshal_to_desc_is_stable() {
        let obj = json!({"name": "nydus", "size": 42});
        let (first, _) = marshal_to_desc(&obj, "application/json").unwrap();
        let (second, _) = marshal_to_desc(&obj, "application/json").unwrap();
        assert_eq!(first.digest, second.digest);
    }

    #[test]
    fn test_marshal_to_desc_digest_tracks_fields() {
        let (base, _) = marshal_to_desc(&json!({"name": "nydus", "size": 42}), "application/json")
            .unwrap();
        let (changed, _) =
            marshal_to_desc(&json!({"name": "nydus", "size": 43}), "application/json").unwrap();
        assert_ne!(base.digest, changed.digest);
    }

    #[test]
    fn test_marshal_to_desc_keeps_media_type() {
        let (desc, _) = marshal_to_desc(
            &json!({}),
            "application/vnd.oci.image.manifest.v1+json",
        )
        .unwrap();
        assert_eq!(desc.media_type, oci_distribution::manifest::OCI_IMAGE_MEDIA_TYPE);
        assert!(desc.annotations.is_none());
    }
}
