//! Image acquisition for a landmark's training corpus
//!
//! Two modes, selected by whether the source hint parses as a well-formed
//! URL: URL mode scrapes `<img>` references out of a single page; search
//! mode walks a keyword list through the image-search collaborator. Both
//! funnel candidates through the same acceptance filter and collision-free
//! filename allocator, and both are best-effort: a bad candidate is skipped,
//! never fatal.

use crate::db::images as image_rows;
use crate::models::{name_to_query, ImageSource, LandmarkImage};
use crate::services::image_search::ImageSearchProvider;
use crate::{Error, Result};
use image::RgbImage;
use regex::Regex;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Curated per-landmark search keywords. Unregistered landmarks fall back
/// to their own name.
pub fn default_keywords() -> HashMap<String, Vec<String>> {
    let keyword_sets: [(&str, [&str; 5]); 8] = [
        (
            "eiffel_tower",
            [
                "Eiffel Tower Paris",
                "Eiffel Tower monument",
                "Eiffel Tower tourist",
                "Eiffel Tower view",
                "Eiffel Tower night",
            ],
        ),
        (
            "statue_of_liberty",
            [
                "Statue of Liberty New York",
                "Statue of Liberty USA",
                "Statue of Liberty monument",
                "Statue of Liberty tourist",
                "Statue of Liberty view",
            ],
        ),
        (
            "taj_mahal",
            [
                "Taj Mahal India",
                "Taj Mahal monument",
                "Taj Mahal Agra",
                "Taj Mahal view",
                "Taj Mahal tourist",
            ],
        ),
        (
            "colosseum",
            [
                "Colosseum Rome",
                "Colosseum Italy",
                "Colosseum ancient",
                "Colosseum view",
                "Colosseum tourist",
            ],
        ),
        (
            "big_ben",
            [
                "Big Ben London",
                "Big Ben UK",
                "Big Ben clock tower",
                "Big Ben view",
                "Big Ben tourist",
            ],
        ),
        (
            "pyramids_of_giza",
            [
                "Pyramids of Giza Egypt",
                "Giza pyramids",
                "Great Pyramid",
                "Pyramids desert",
                "Pyramids tourist",
            ],
        ),
        (
            "sydney_opera_house",
            [
                "Sydney Opera House Australia",
                "Opera House Sydney",
                "Sydney Opera House view",
                "Sydney Opera House tourist",
                "Sydney Opera House landmark",
            ],
        ),
        (
            "burj_khalifa",
            [
                "Burj Khalifa Dubai",
                "Burj Khalifa UAE",
                "Burj Khalifa tallest",
                "Burj Khalifa view",
                "Burj Khalifa tourist",
            ],
        ),
    ];

    keyword_sets
        .into_iter()
        .map(|(name, words)| {
            (
                name.to_string(),
                words.into_iter().map(str::to_string).collect(),
            )
        })
        .collect()
}

/// Acquisition strategy, decided by hint shape alone (no network probe)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireMode {
    /// Hint is a well-formed http(s) URL: scrape that page
    Url(Url),
    /// Anything else: keyword search (hint becomes an extra keyword)
    Search,
}

/// A hint selects URL mode only when it parses with an http(s) scheme and
/// a host. "taj mahal" or "www.example.com" fall through to search mode.
pub fn select_mode(source_hint: Option<&str>) -> AcquireMode {
    if let Some(hint) = source_hint {
        if let Ok(url) = Url::parse(hint) {
            if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
                return AcquireMode::Url(url);
            }
        }
    }
    AcquireMode::Search
}

/// Number of entries currently in a folder (missing folder counts as empty)
pub fn existing_file_count(folder: &Path) -> usize {
    match std::fs::read_dir(folder) {
        Ok(entries) => entries.filter_map(|e| e.ok()).count(),
        Err(_) => 0,
    }
}

/// Advance `from` past any occupied `<n>.jpg` names in `folder`.
///
/// Index allocation is append-only and gap-tolerant: starting at the current
/// file count and re-checking at write time guarantees no prior acquisition
/// is ever overwritten, across repeated runs.
pub fn next_free_index(folder: &Path, from: usize) -> usize {
    let mut index = from;
    while folder.join(format!("{}.jpg", index)).exists() {
        index += 1;
    }
    index
}

/// Decode candidate bytes into an RGB image suitable for the corpus.
///
/// Rejects bytes that don't decode and images under the minimum edge;
/// alpha channels are flattened to 3-channel RGB.
pub fn prepare_candidate(bytes: &[u8], min_edge: u32) -> Result<RgbImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::InvalidImage(format!("decode failed: {}", e)))?;

    let rgb = decoded.to_rgb8();
    if rgb.width() < min_edge || rgb.height() < min_edge {
        return Err(Error::InvalidImage(format!(
            "too small: {}x{}",
            rgb.width(),
            rgb.height()
        )));
    }

    Ok(rgb)
}

/// Pull `src` attributes out of a page's `<img>` tags
fn extract_image_refs(page_html: &str) -> Vec<String> {
    // No DOM needed for a src sweep
    let img_src = Regex::new(r#"(?i)<img[^>]*?src\s*=\s*["']?([^"'\s>]+)"#)
        .expect("static regex");
    img_src
        .captures_iter(page_html)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub struct ImageAcquirer {
    http_client: reqwest::Client,
    search: Arc<dyn ImageSearchProvider>,
    pool: Option<SqlitePool>,
    data_root: PathBuf,
    min_image_edge: u32,
    keywords: HashMap<String, Vec<String>>,
}

impl ImageAcquirer {
    pub fn new(
        search: Arc<dyn ImageSearchProvider>,
        pool: Option<SqlitePool>,
        data_root: PathBuf,
        user_agent: &str,
        download_timeout_secs: u64,
        min_image_edge: u32,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(download_timeout_secs))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;

        Ok(Self {
            http_client,
            search,
            pool,
            data_root,
            min_image_edge,
            keywords: default_keywords(),
        })
    }

    /// Acquire up to `target_count` new images for a landmark. Best-effort:
    /// the returned filenames may number fewer than requested.
    pub async fn acquire(
        &self,
        landmark_name: &str,
        source_hint: Option<&str>,
        target_count: usize,
    ) -> Result<Vec<String>> {
        let folder = self.data_root.join(landmark_name);
        std::fs::create_dir_all(&folder)?;

        match select_mode(source_hint) {
            AcquireMode::Url(url) => {
                tracing::info!(landmark = %landmark_name, url = %url, "Acquiring images from page URL");
                self.acquire_from_url(landmark_name, &folder, url, target_count)
                    .await
            }
            AcquireMode::Search => {
                tracing::info!(
                    landmark = %landmark_name,
                    hint = source_hint.unwrap_or("<default keywords>"),
                    "Acquiring images via keyword search"
                );
                self.acquire_from_search(landmark_name, &folder, source_hint, target_count)
                    .await
            }
        }
    }

    /// URL mode: one page fetch, then every image reference on it until the
    /// target is met. A failed page fetch yields zero acquisitions, not an
    /// error; failed candidates are skipped.
    async fn acquire_from_url(
        &self,
        landmark_name: &str,
        folder: &Path,
        page_url: Url,
        target_count: usize,
    ) -> Result<Vec<String>> {
        let page_html = match self.fetch_page(&page_url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(url = %page_url, error = %e, "Page fetch failed; nothing acquired");
                return Ok(Vec::new());
            }
        };

        let mut saved = Vec::new();
        let mut next_index = existing_file_count(folder);

        for img_ref in extract_image_refs(&page_html) {
            if saved.len() >= target_count {
                break;
            }

            // Relative references resolve against the page URL
            let img_url = match page_url.join(&img_ref) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!(reference = %img_ref, error = %e, "Skipping unresolvable image reference");
                    continue;
                }
            };

            if let Some(filename) = self
                .download_and_accept(landmark_name, folder, &img_url, &mut next_index)
                .await
            {
                saved.push(filename);
            }
        }

        tracing::info!(
            landmark = %landmark_name,
            acquired = saved.len(),
            "URL acquisition finished"
        );
        Ok(saved)
    }

    /// Search mode: keywords in list order until the target is met across
    /// all of them combined.
    async fn acquire_from_search(
        &self,
        landmark_name: &str,
        folder: &Path,
        source_hint: Option<&str>,
        target_count: usize,
    ) -> Result<Vec<String>> {
        let keywords = self.build_keywords(landmark_name, source_hint);

        let mut saved = Vec::new();
        let mut next_index = existing_file_count(folder);

        for keyword in &keywords {
            if saved.len() >= target_count {
                break;
            }
            let remaining = target_count - saved.len();

            let candidates = match self.search.search_images(keyword, remaining).await {
                Ok(urls) => urls,
                Err(e) => {
                    tracing::warn!(keyword = %keyword, error = %e, "Image search failed; trying next keyword");
                    continue;
                }
            };

            for candidate in candidates {
                if saved.len() >= target_count {
                    break;
                }
                let img_url = match Url::parse(&candidate) {
                    Ok(url) => url,
                    Err(_) => continue,
                };
                if let Some(filename) = self
                    .download_and_accept(landmark_name, folder, &img_url, &mut next_index)
                    .await
                {
                    saved.push(filename);
                }
            }
        }

        tracing::info!(
            landmark = %landmark_name,
            acquired = saved.len(),
            "Keyword acquisition finished"
        );
        Ok(saved)
    }

    /// Keyword list: registered defaults (or the bare name), hint prepended,
    /// deduplicated preserving order.
    fn build_keywords(&self, landmark_name: &str, source_hint: Option<&str>) -> Vec<String> {
        let mut keywords: Vec<String> = self
            .keywords
            .get(landmark_name)
            .cloned()
            .unwrap_or_else(|| vec![name_to_query(landmark_name)]);

        if let Some(hint) = source_hint {
            keywords.insert(0, hint.to_string());
        }

        let mut seen = std::collections::HashSet::new();
        keywords.retain(|k| seen.insert(k.clone()));
        keywords
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!("HTTP {} from {}", response.status(), url)));
        }

        response.text().await.map_err(|e| Error::Fetch(e.to_string()))
    }

    /// Download one candidate, run the acceptance filter, allocate a free
    /// filename, write, and record provenance. Any failure skips the
    /// candidate without aborting the batch.
    async fn download_and_accept(
        &self,
        landmark_name: &str,
        folder: &Path,
        img_url: &Url,
        next_index: &mut usize,
    ) -> Option<String> {
        let bytes = match self.fetch_bytes(img_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(url = %img_url, error = %e, "Download failed; skipping candidate");
                return None;
            }
        };

        let rgb = match prepare_candidate(&bytes, self.min_image_edge) {
            Ok(rgb) => rgb,
            Err(e) => {
                tracing::debug!(url = %img_url, error = %e, "Rejected candidate");
                return None;
            }
        };

        // Re-check at write time; concurrent writers may have taken indices
        *next_index = next_free_index(folder, *next_index);
        let filename = format!("{}.jpg", next_index);
        let path = folder.join(&filename);

        if let Err(e) = rgb.save(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Write failed; skipping candidate");
            return None;
        }
        *next_index += 1;

        self.record_provenance(landmark_name, &filename, ImageSource::Scraped)
            .await;

        tracing::debug!(path = %path.display(), "Accepted image");
        Some(filename)
    }

    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!("HTTP {} from {}", response.status(), url)));
        }

        let bytes = response.bytes().await.map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Provenance rows are best-effort; a bookkeeping failure must not
    /// abort an otherwise-successful acquisition.
    async fn record_provenance(&self, landmark_name: &str, filename: &str, source: ImageSource) {
        if let Some(pool) = &self.pool {
            let row = LandmarkImage::new(
                landmark_name.to_string(),
                format!("{}/{}", landmark_name, filename),
                source,
            );
            if let Err(e) = image_rows::insert(pool, &row).await {
                tracing::warn!(path = %row.relative_path, error = %e, "Failed to record image row");
            }
        }
    }

    /// Bulk-upload path: copy operator-supplied files through the same
    /// acceptance filter and allocator, recording `UPLOAD` provenance.
    pub async fn import_files(&self, landmark_name: &str, files: &[PathBuf]) -> Result<Vec<String>> {
        let folder = self.data_root.join(landmark_name);
        std::fs::create_dir_all(&folder)?;

        let mut saved = Vec::new();
        let mut rows = Vec::new();
        let mut next_index = existing_file_count(&folder);

        for file in files {
            let bytes = match std::fs::read(file) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "Unreadable upload; skipping");
                    continue;
                }
            };

            let rgb = match prepare_candidate(&bytes, self.min_image_edge) {
                Ok(rgb) => rgb,
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "Rejected upload");
                    continue;
                }
            };

            next_index = next_free_index(&folder, next_index);
            let filename = format!("{}.jpg", next_index);
            rgb.save(folder.join(&filename))
                .map_err(|e| Error::Internal(format!("Write failed: {}", e)))?;
            next_index += 1;

            rows.push(LandmarkImage::new(
                landmark_name.to_string(),
                format!("{}/{}", landmark_name, filename),
                ImageSource::Upload,
            ));
            saved.push(filename);
        }

        if let Some(pool) = &self.pool {
            if !rows.is_empty() {
                image_rows::bulk_insert(pool, &rows).await?;
            }
        }

        tracing::info!(landmark = %landmark_name, imported = saved.len(), "Bulk upload finished");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes_rgba(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 128]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_mode_selection_url() {
        match select_mode(Some("https://example.com/gallery")) {
            AcquireMode::Url(url) => assert_eq!(url.host_str(), Some("example.com")),
            AcquireMode::Search => panic!("expected URL mode"),
        }
    }

    #[test]
    fn test_mode_selection_malformed_hint_falls_back_to_search() {
        assert_eq!(select_mode(Some("taj mahal")), AcquireMode::Search);
        assert_eq!(select_mode(Some("www.example.com/pics")), AcquireMode::Search);
        assert_eq!(select_mode(Some("ftp://example.com/pics")), AcquireMode::Search);
        assert_eq!(select_mode(None), AcquireMode::Search);
    }

    #[test]
    fn test_next_free_index_continues_after_existing() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("{}.jpg", i)), b"x").unwrap();
        }

        let start = existing_file_count(dir.path());
        assert_eq!(start, 5);
        assert_eq!(next_free_index(dir.path(), start), 5);
    }

    #[test]
    fn test_next_free_index_skips_collisions() {
        let dir = tempfile::tempdir().unwrap();
        for i in [0usize, 1, 2, 5, 6] {
            std::fs::write(dir.path().join(format!("{}.jpg", i)), b"x").unwrap();
        }

        // Count is 5, but 5.jpg and 6.jpg are taken: allocation must land on 7
        let start = existing_file_count(dir.path());
        assert_eq!(next_free_index(dir.path(), start), 7);
        // A gap below the cursor is never revisited
        assert_eq!(next_free_index(dir.path(), 3), 3);
    }

    #[test]
    fn test_existing_file_count_missing_folder() {
        assert_eq!(existing_file_count(Path::new("/no/such/folder")), 0);
    }

    #[test]
    fn test_prepare_candidate_flattens_alpha() {
        let bytes = png_bytes_rgba(120, 140);
        let rgb = prepare_candidate(&bytes, 100).unwrap();
        assert_eq!((rgb.width(), rgb.height()), (120, 140));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_prepare_candidate_rejects_small_images() {
        let bytes = png_bytes_rgba(99, 400);
        assert!(prepare_candidate(&bytes, 100).is_err());
        let bytes = png_bytes_rgba(400, 50);
        assert!(prepare_candidate(&bytes, 100).is_err());
    }

    #[test]
    fn test_prepare_candidate_rejects_non_images() {
        assert!(prepare_candidate(b"<html>not an image</html>", 100).is_err());
    }

    #[test]
    fn test_extract_image_refs() {
        let html = r#"
            <html><body>
            <img src="/static/a.jpg" alt="a">
            <IMG class="hero" SRC='https://cdn.example.com/b.png'>
            <img data-lazy="1" src=c.gif>
            <img alt="no source">
            </body></html>
        "#;
        let refs = extract_image_refs(html);
        assert_eq!(refs, vec!["/static/a.jpg", "https://cdn.example.com/b.png", "c.gif"]);
    }

    #[test]
    fn test_build_keywords_hint_prepended_and_deduplicated() {
        let acquirer = test_acquirer();

        let keywords = acquirer.build_keywords("taj_mahal", Some("Taj Mahal monument"));
        assert_eq!(keywords[0], "Taj Mahal monument");
        // The hint also appears in the defaults; it must not repeat
        assert_eq!(
            keywords.iter().filter(|k| *k == "Taj Mahal monument").count(),
            1
        );
        assert_eq!(keywords.len(), 5);
    }

    #[test]
    fn test_build_keywords_unregistered_landmark_uses_name() {
        let acquirer = test_acquirer();
        let keywords = acquirer.build_keywords("gateway_of_india", None);
        assert_eq!(keywords, vec!["gateway of india"]);
    }

    fn test_acquirer() -> ImageAcquirer {
        struct NoSearch;
        #[async_trait::async_trait]
        impl ImageSearchProvider for NoSearch {
            async fn search_images(
                &self,
                _query: &str,
                _max_results: usize,
            ) -> std::result::Result<Vec<String>, crate::services::image_search::SearchError>
            {
                Ok(Vec::new())
            }
        }

        ImageAcquirer::new(
            Arc::new(NoSearch),
            None,
            PathBuf::from("/tmp/unused"),
            "landmark-finder/0.1",
            15,
            100,
        )
        .unwrap()
    }
}
