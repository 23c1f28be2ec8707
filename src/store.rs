//! Object store contract and the temporary-download helper.

use anyhow::{Context, Result};
use std::io::{Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

/// Remote object store holding the source videos.
pub trait ObjectStore {
    /// Stream the object at `bucket`/`key` into `sink`, returning the number of
    /// bytes written.
    fn download(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> Result<u64>;
}

/// Download an object into a temporary file that is removed when dropped.
///
/// `suffix` is kept on the file name so decoders can sniff the container.
pub fn download_to_temp(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    suffix: &str,
) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("celebrity-video-")
        .suffix(suffix)
        .tempfile()
        .context("create temporary video file")?;
    let bytes = store
        .download(bucket, key, file.as_file_mut())
        .with_context(|| format!("download s3://{}/{}", bucket, key))?;
    file.as_file_mut().flush().context("flush temporary video file")?;
    file.as_file_mut()
        .seek(SeekFrom::Start(0))
        .context("rewind temporary video file")?;
    log::info!(
        "downloaded s3://{}/{} ({} bytes) to {}",
        bucket,
        key,
        bytes,
        file.path().display()
    );
    Ok(file)
}

/// Suffix (including the dot) of an object key, defaulting to `.mp4`.
pub fn key_suffix(key: &str) -> String {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => name[idx..].to_string(),
        _ => ".mp4".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BytesStore(Vec<u8>);

    impl ObjectStore for BytesStore {
        fn download(&self, _bucket: &str, _key: &str, sink: &mut dyn Write) -> Result<u64> {
            sink.write_all(&self.0)?;
            Ok(self.0.len() as u64)
        }
    }

    #[test]
    fn download_lands_in_temp_file() {
        let store = BytesStore(b"fake video".to_vec());
        let file = download_to_temp(&store, "bucket", "dir/output.mp4", ".mp4").unwrap();
        let path = file.path().to_path_buf();
        assert!(path.to_string_lossy().ends_with(".mp4"));
        assert_eq!(std::fs::read(&path).unwrap(), b"fake video");
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn key_suffix_defaults_to_mp4() {
        assert_eq!(key_suffix("wjqx/output.mov"), ".mov");
        assert_eq!(key_suffix("wjqx/output"), ".mp4");
        assert_eq!(key_suffix("dir.d/.hidden"), ".mp4");
    }
}
