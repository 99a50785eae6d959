/**
 * This module contains all logic for loading meshes, textures and animations from external files.
 *
 * Natively, files are read from `./assets/`; on the web they are fetched from `<origin>/assets/`.
 * Everything here produces CPU-side data only, GPU uploads happen in the viewer.
 */
pub mod asset;
pub mod mesh;
pub mod platform;
pub mod texture;

use crate::data_structures::model::ModelVertex;

/// Progress of a single download or file read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadProgress {
    pub loaded: u64,
    /// `None` when the size is not known up front.
    pub total: Option<u64>,
}

impl LoadProgress {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(100.0),
            Some(total) => Some(self.loaded as f64 / total as f64 * 100.0),
            None => None,
        }
    }
}

/// Logs progress the way the viewer reports it: `"{percent}% loaded"`.
pub fn log_progress(progress: LoadProgress) {
    match progress.percent() {
        Some(percent) => log::info!("{percent}% loaded"),
        None => log::info!("{} bytes loaded", progress.loaded),
    }
}

/// Appends one received chunk and reports the bytes received so far.
fn append_chunk(
    data: &mut Vec<u8>,
    chunk: &[u8],
    total: Option<u64>,
    on_progress: &mut impl FnMut(LoadProgress),
) {
    data.extend_from_slice(chunk);
    on_progress(LoadProgress {
        loaded: data.len() as u64,
        total,
    });
}

/// Triangle list ready for upload, with tangents already filled in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimitiveData {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    /// Material index within the owning asset, `None` for the default material.
    pub material: Option<usize>,
}

/// `file_name` relative to the directory of `base`, as used for the external
/// buffers and images a glTF file references.
pub fn sibling_path(base: &str, file_name: &str) -> String {
    match base.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => format!("{dir}/{file_name}"),
        _ => file_name.to_string(),
    }
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    use anyhow::Context;

    let window = web_sys::window().context("no browser window")?;
    let origin = window
        .location()
        .origin()
        .map_err(|e| anyhow::anyhow!("could not read page origin: {e:?}"))?;
    let base = reqwest::Url::parse(&format!("{origin}/assets/"))?;
    Ok(base.join(file_name)?)
}

pub async fn load_binary(
    file_name: &str,
    on_progress: impl FnMut(LoadProgress),
) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        use futures::StreamExt;

        let mut on_progress = on_progress;
        let url = format_url(file_name)?;
        let response = reqwest::get(url).await?.error_for_status()?;
        let total = response.content_length();
        let mut data = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            append_chunk(&mut data, &chunk?, total, &mut on_progress);
        }
        if data.is_empty() {
            on_progress(LoadProgress { loaded: 0, total });
        }
        data
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = load_binary_from(std::path::Path::new("./assets"), file_name, on_progress).await?;

    Ok(data)
}

/// Reads `root/file_name` in chunks, reporting progress after every chunk.
#[cfg(not(target_arch = "wasm32"))]
pub async fn load_binary_from(
    root: &std::path::Path,
    file_name: &str,
    mut on_progress: impl FnMut(LoadProgress),
) -> anyhow::Result<Vec<u8>> {
    use anyhow::Context;
    use tokio::io::AsyncReadExt;

    const CHUNK: usize = 64 * 1024;

    let path = root.join(file_name);
    let mut file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("could not open {}", path.display()))?;
    let total = file.metadata().await.ok().map(|m| m.len());
    let mut data = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = vec![0u8; CHUNK];
    loop {
        let read = file
            .read(&mut chunk)
            .await
            .with_context(|| format!("could not read {}", path.display()))?;
        if read == 0 {
            break;
        }
        append_chunk(&mut data, &chunk[..read], total, &mut on_progress);
    }
    if data.is_empty() {
        on_progress(LoadProgress { loaded: 0, total });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_known_and_unknown_sizes() {
        let p = LoadProgress {
            loaded: 50,
            total: Some(200),
        };
        assert_eq!(p.percent(), Some(25.0));
        let p = LoadProgress {
            loaded: 0,
            total: Some(0),
        };
        assert_eq!(p.percent(), Some(100.0));
        let p = LoadProgress {
            loaded: 10,
            total: None,
        };
        assert_eq!(p.percent(), None);
    }

    #[test]
    fn siblings_resolve_next_to_the_model() {
        assert_eq!(sibling_path("animated_bee.glb", "bee.bin"), "bee.bin");
        assert_eq!(sibling_path("models/bee.gltf", "bee.bin"), "models/bee.bin");
        assert_eq!(sibling_path("a/b/c.gltf", "tex/d.png"), "a/b/tex/d.png");
    }

    #[test]
    fn every_chunk_reports_the_running_total() {
        let mut data = Vec::new();
        let mut reports = Vec::new();
        let mut record = |p: LoadProgress| reports.push(p);
        for chunk in [&b"abc"[..], &b"de"[..], &b"fghij"[..]] {
            append_chunk(&mut data, chunk, Some(10), &mut record);
        }
        assert_eq!(data, b"abcdefghij");
        let loaded: Vec<u64> = reports.iter().map(|p| p.loaded).collect();
        assert_eq!(loaded, vec![3, 5, 10]);
        assert_eq!(reports[2].percent(), Some(100.0));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[tokio::test]
    async fn chunked_reads_report_monotonic_progress() {
        let dir = std::env::temp_dir().join(format!("orbit-viewer-load-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let bytes: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(dir.join("blob.bin"), &bytes).unwrap();

        let mut reports = Vec::new();
        let data = load_binary_from(&dir, "blob.bin", |p| reports.push(p))
            .await
            .unwrap();
        assert_eq!(data, bytes);
        assert!(reports.len() > 1);
        assert!(reports.windows(2).all(|w| w[0].loaded < w[1].loaded));
        let last = reports.last().unwrap();
        assert_eq!(last.percent(), Some(100.0));

        assert!(load_binary_from(&dir, "missing.bin", |_| {}).await.is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
