//! OCI layer extraction utilities.
//!
//! Nydus bootstrap layers are tar archives that may be stored compressed.
//! Only a single well-known member is needed from them, so extraction scans
//! headers and stops at the first match instead of unpacking the whole layer.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use nydus_load_core::error::{LoadError, Result, ResultExt};
use tar::Archive;
use xz2::read::XzDecoder;

/// Longest magic number we need to look at.
const MAGIC_LEN: usize = 10;

/// First block header or end-of-stream marker following `BZh<level>`.
const BZIP2_BLOCK_MAGIC: [u8; 6] = [0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
const BZIP2_EOS_MAGIC: [u8; 6] = [0x17, 0x72, 0x45, 0x38, 0x50, 0x90];

/// Compression formats recognized by their magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Uncompressed,
    Gzip,
    Zstd,
    Bzip2,
    Xz,
}

impl Compression {
    /// Identify the compression of a stream from its leading bytes.
    pub fn detect(head: &[u8]) -> Self {
        if head.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else if is_bzip2(head) {
            Self::Bzip2
        } else if head.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else {
            Self::Uncompressed
        }
    }
}

/// `BZh`, a block size digit, then a block or end-of-stream marker.
///
/// The three-byte signature alone also matches uncompressed tars whose
/// first member name starts with `BZh`.
fn is_bzip2(head: &[u8]) -> bool {
    match head {
        [b'B', b'Z', b'h', level, rest @ ..] if (b'1'..=b'9').contains(level) => {
            rest.starts_with(&BZIP2_BLOCK_MAGIC) || rest.starts_with(&BZIP2_EOS_MAGIC)
        }
        _ => false,
    }
}

/// Wrap `reader` in the decoder matching its compression format.
///
/// The sniffed bytes are replayed in front of the remaining stream, so the
/// returned reader yields the complete decompressed content.
pub fn decompress_stream<'a, R>(mut reader: R) -> Result<Box<dyn Read + 'a>>
where
    R: Read + 'a,
{
    let mut head = Vec::with_capacity(MAGIC_LEN);
    (&mut reader)
        .take(MAGIC_LEN as u64)
        .read_to_end(&mut head)
        .context("read layer header")?;

    let compression = Compression::detect(&head);
    tracing::debug!(?compression, "Detected layer compression");

    let stream = Cursor::new(head).chain(reader);
    let decoder: Box<dyn Read + 'a> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(stream)),
        Compression::Zstd => {
            Box::new(zstd::stream::read::Decoder::new(stream).context("init zstd decoder")?)
        }
        Compression::Bzip2 => Box::new(BzDecoder::new(stream)),
        Compression::Xz => Box::new(XzDecoder::new(stream)),
        Compression::Uncompressed => Box::new(stream),
    };
    Ok(decoder)
}

/// Extract the archive member named exactly `member` to `target`.
///
/// Headers are scanned in archive order and the first match wins; later
/// entries with the same name are never read.
///
/// # Errors
///
/// Returns error if:
/// - The stream cannot be decompressed or is not a tar archive
/// - The target file cannot be created or written
/// - No entry named `member` exists (`LoadError::MemberNotFound`)
pub fn unpack_file<R: Read>(reader: R, member: &str, target: &Path) -> Result<()> {
    let decoder = decompress_stream(reader)?;
    let mut archive = Archive::new(decoder);

    let entries = archive.entries().context("read layer archive")?;
    for entry in entries {
        let mut entry = entry.context("read layer archive entry")?;
        if entry.path_bytes().as_ref() != member.as_bytes() {
            continue;
        }

        let mut file = File::create(target)
            .with_context(|| format!("create {}", target.display()))?;
        let size = std::io::copy(&mut entry, &mut file)
            .with_context(|| format!("write {}", target.display()))?;

        tracing::debug!(
            member = member,
            target = %target.display(),
            size = size,
            "Unpacked layer member"
        );
        return Ok(());
    }

    Err(LoadError::MemberNotFound {
        member: member.to_string(),
    })
}
