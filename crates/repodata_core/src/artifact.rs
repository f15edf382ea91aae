use std::io::Write;

use repodata_config::{transient, RepoError};
use serde::Serialize;

/// Serializes a document to plain JSON, bzip2, and zstd byte strings —
/// the three encodings this pipeline republishes, matching
/// `rattler_index::write_repodata`'s practice of writing both a `.json`
/// and a `.zst` sibling (here extended with `.bz2` since `links.json.bz2`
/// and the legacy repodata mirrors are bzip2-compressed upstream).
pub struct EncodedArtifact {
    pub json: Vec<u8>,
    pub bz2: Vec<u8>,
    pub zst: Vec<u8>,
}

pub fn encode<T: Serialize>(document: &T) -> Result<EncodedArtifact, RepoError> {
    let json = serde_json::to_vec_pretty(document)?;

    let mut bz2_encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
    bz2_encoder.write_all(&json).map_err(|e| transient(e))?;
    let bz2 = bz2_encoder.finish().map_err(|e| transient(e))?;

    let zst = zstd::encode_all(&json[..], 19).map_err(|e| transient(e))?;

    Ok(EncodedArtifact { json, bz2, zst })
}
