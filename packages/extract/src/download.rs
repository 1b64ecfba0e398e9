//! Streaming download of job output.

use std::path::Path;

use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;

use crate::{ExtractError, retry};

/// Downloads `url` to `dest` with progress logging.
///
/// Streams the body so the archive is never held in memory. The parent
/// directory of `dest` is created if needed and an existing file is
/// overwritten.
///
/// # Errors
///
/// Returns [`ExtractError`] if the request fails or the local file
/// cannot be written.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, ExtractError> {
    log::info!("Downloading {url}");
    log::info!("  -> {}", dest.display());

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExtractError::io(parent, e))?;
    }

    let response = retry::send(&|| client.get(url)).await?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        #[allow(clippy::cast_precision_loss)]
        let mb = size as f64 / 1_048_576.0;
        log::info!("  file size: {mb:.1} MB");
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| ExtractError::io(dest, e))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_log_mb: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ExtractError::io(dest, e))?;
        downloaded += chunk.len() as u64;

        // Log every 10 MB
        let current = downloaded / (10 * 1_048_576);
        if current > last_log_mb {
            last_log_mb = current;
            #[allow(clippy::cast_precision_loss)]
            let mb = downloaded as f64 / 1_048_576.0;
            if let Some(total) = total_size {
                #[allow(clippy::cast_precision_loss)]
                let pct = (downloaded as f64 / total as f64) * 100.0;
                log::info!("  downloaded {mb:.0} MB ({pct:.0}%)");
            } else {
                log::info!("  downloaded {mb:.0} MB");
            }
        }
    }

    file.flush().await.map_err(|e| ExtractError::io(dest, e))?;

    #[allow(clippy::cast_precision_loss)]
    let mb = downloaded as f64 / 1_048_576.0;
    log::info!("  download complete: {mb:.1} MB");

    Ok(downloaded)
}
