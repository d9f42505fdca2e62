// src/model/fetch.rs
use crate::utils::error::ModelError;
use reqwest::header;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const FETCH_USER_AGENT: &str = concat!("finex/", env!("CARGO_PKG_VERSION"));
// Checkpoint weights run to hundreds of megabytes
const FETCH_TIMEOUT_SECS: u64 = 600;

/// Creates a reqwest client configured for model downloads.
fn build_fetch_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(FETCH_USER_AGENT)
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
}

/// Downloads a model file from `url` and writes it to `dest`, creating
/// parent directories as needed. The body is streamed to `<dest>.part` and
/// renamed once complete. Returns the number of bytes written.
pub async fn download_model(url: &str, dest: &Path) -> Result<usize, ModelError> {
    let client = build_fetch_client()?;

    tracing::info!("Downloading model file from: {}", url);

    let mut response = client
        .get(url)
        .header(header::ACCEPT, "*/*")
        .send()
        .await?; // Propagates reqwest::Error as ModelError::Network

    let status = response.status();
    if !status.is_success() {
        tracing::error!("HTTP error status: {} for URL: {}", status, url);
        return Err(ModelError::Http(status));
    }

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let part_path = dest.with_extension(match dest.extension() {
        Some(ext) => format!("{}.part", ext.to_string_lossy()),
        None => "part".to_string(),
    });
    let mut file = tokio::fs::File::create(&part_path).await?;
    let mut written = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&part_path, dest).await?;

    tracing::info!("Saved {} bytes to {}", written, dest.display());
    Ok(written)
}
