//! Media cache for downloaded message content
//!
//! Downloads image, video and audio content into a bounded directory that is
//! served publicly under `/images`, and renders small JPEG previews for
//! images. The directory never holds more than `max_files` regular files:
//! before every write the oldest files are evicted to make room.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{BotError, BotResult};
use crate::line_api::LineApiClient;

/// Default cap on stored files
pub const DEFAULT_MAX_FILES: usize = 30;

/// Smallest usable cap: an image and its preview must coexist
pub const MIN_MAX_FILES: usize = 2;

/// Edge length of rendered previews
pub const PREVIEW_SIZE: u32 = 240;

/// Prefix of preview file names
pub const PREVIEW_PREFIX: &str = "p_";

/// Exclusive upper bound of the random number in download names
const NAME_SPACE: u32 = 10_000;

/// Attempts at picking a download name that is not already taken
const NAME_ATTEMPTS: usize = 16;

/// Kind of downloadable content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
            Self::Audio => "m4a",
        }
    }

    /// `<prefix>_<n>.<ext>`
    pub fn file_name(self, n: u32) -> String {
        format!("{}_{}.{}", self.prefix(), n, self.extension())
    }
}

/// A stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Store for downloaded media
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Download the content of `message_id` and return the stored file name
    async fn fetch(&self, kind: MediaKind, message_id: &str) -> BotResult<String>;

    /// Render a 240x240 preview of a stored image and return its file name
    async fn derive_preview(&self, file_name: &str) -> BotResult<String>;

    /// Files currently held, in listing order
    async fn files(&self) -> BotResult<Vec<MediaFile>>;
}

/// Choose the files to delete so that one more file fits under `max_files`
///
/// Oldest first; files with equal timestamps go in listing order. The
/// `protected` file is never chosen.
pub fn select_victims(
    files: &[MediaFile],
    max_files: usize,
    protected: Option<&str>,
) -> Vec<String> {
    let keep = max_files.saturating_sub(1);
    if files.len() <= keep {
        return Vec::new();
    }

    let mut ordered: Vec<&MediaFile> = files
        .iter()
        .filter(|f| Some(f.name.as_str()) != protected)
        .collect();
    // stable sort keeps listing order between equal timestamps
    ordered.sort_by_key(|f| f.created_at);
    ordered
        .into_iter()
        .take(files.len() - keep)
        .map(|f| f.name.clone())
        .collect()
}

/// Decode an image and render the fixed-size JPEG preview
///
/// CPU-bound; call from `spawn_blocking`.
pub fn render_preview(data: &[u8]) -> BotResult<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let resized = img.resize_exact(PREVIEW_SIZE, PREVIEW_SIZE, FilterType::Lanczos3);

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(resized.to_rgb8()).write_to(&mut buf, ImageFormat::Jpeg)?;
    Ok(buf.into_inner())
}

fn check_file_name(name: &str) -> BotResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(BotError::InvalidArgument(format!(
            "invalid media file name: '{}'",
            name
        )));
    }
    Ok(())
}

fn pick_name(rng: &Mutex<StdRng>, kind: MediaKind, taken: &HashSet<String>) -> String {
    let mut rng = rng.lock();
    let mut name = kind.file_name(rng.gen_range(0..NAME_SPACE));
    for _ in 1..NAME_ATTEMPTS {
        if !taken.contains(&name) {
            break;
        }
        name = kind.file_name(rng.gen_range(0..NAME_SPACE));
    }
    name
}

// =============================================================================
// Disk store
// =============================================================================

/// Media store backed by a local directory
///
/// Check, evict and write run under one async mutex so concurrent requests
/// cannot overshoot the cap or pick the same victim.
pub struct DiskMediaStore {
    dir: PathBuf,
    max_files: usize,
    api: LineApiClient,
    write_lock: tokio::sync::Mutex<()>,
    rng: Mutex<StdRng>,
}

impl DiskMediaStore {
    pub fn new(dir: impl Into<PathBuf>, max_files: usize, api: LineApiClient) -> Self {
        Self {
            dir: dir.into(),
            max_files: max_files.max(MIN_MAX_FILES),
            api,
            write_lock: tokio::sync::Mutex::new(()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    async fn list(&self) -> BotResult<Vec<MediaFile>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            files.push(MediaFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                created_at: DateTime::<Utc>::from(metadata.modified()?),
            });
        }
        Ok(files)
    }

    /// Evict until one more file fits; returns the names still present
    ///
    /// Caller must hold `write_lock`.
    async fn make_room(&self, protected: Option<&str>) -> BotResult<HashSet<String>> {
        fs::create_dir_all(&self.dir).await?;

        let files = self.list().await?;
        let victims = select_victims(&files, self.max_files, protected);
        for name in &victims {
            match fs::remove_file(self.dir.join(name)).await {
                Ok(()) => info!("Evicted media file {}", name),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(files
            .into_iter()
            .map(|f| f.name)
            .filter(|name| !victims.contains(name))
            .collect())
    }
}

#[async_trait]
impl MediaStore for DiskMediaStore {
    async fn fetch(&self, kind: MediaKind, message_id: &str) -> BotResult<String> {
        // Download outside the lock; only the directory update is serialized
        let data = self.api.get_content(message_id).await?;

        let _guard = self.write_lock.lock().await;
        let remaining = self.make_room(None).await?;
        let name = pick_name(&self.rng, kind, &remaining);
        fs::write(self.dir.join(&name), &data).await?;

        info!(
            "Stored {} bytes for message {} as {}",
            data.len(),
            message_id,
            name
        );
        Ok(name)
    }

    async fn derive_preview(&self, file_name: &str) -> BotResult<String> {
        check_file_name(file_name)?;
        let data = fs::read(self.dir.join(file_name)).await?;

        let encoded = tokio::task::spawn_blocking(move || render_preview(&data))
            .await
            .map_err(|e| BotError::Io(std::io::Error::other(e)))??;

        let name = format!("{}{}", PREVIEW_PREFIX, file_name);
        let _guard = self.write_lock.lock().await;
        // the source image is what the reply links to
        self.make_room(Some(file_name)).await?;
        fs::write(self.dir.join(&name), &encoded).await?;

        debug!("Rendered preview {} ({} bytes)", name, encoded.len());
        Ok(name)
    }

    async fn files(&self) -> BotResult<Vec<MediaFile>> {
        self.list().await
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Media store that only tracks names, for tests and dry runs
///
/// Applies the same eviction rule as [`DiskMediaStore`] without touching the
/// network or the filesystem.
pub struct MemoryMediaStore {
    max_files: usize,
    files: Mutex<Vec<MediaFile>>,
    rng: Mutex<StdRng>,
}

impl MemoryMediaStore {
    pub fn new(max_files: usize) -> Self {
        Self::with_files(max_files, Vec::new())
    }

    pub fn with_files(max_files: usize, files: Vec<MediaFile>) -> Self {
        Self {
            max_files: max_files.max(MIN_MAX_FILES),
            files: Mutex::new(files),
            rng: Mutex::new(StdRng::seed_from_u64(0x5eed)),
        }
    }

    fn insert(&self, name: String, protected: Option<&str>) {
        let mut files = self.files.lock();
        let victims = select_victims(&files, self.max_files, protected);
        files.retain(|f| !victims.contains(&f.name));
        files.retain(|f| f.name != name);
        files.push(MediaFile {
            name,
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn fetch(&self, kind: MediaKind, _message_id: &str) -> BotResult<String> {
        let taken: HashSet<String> = self.files.lock().iter().map(|f| f.name.clone()).collect();
        let name = pick_name(&self.rng, kind, &taken);
        self.insert(name.clone(), None);
        Ok(name)
    }

    async fn derive_preview(&self, file_name: &str) -> BotResult<String> {
        check_file_name(file_name)?;
        if !self.files.lock().iter().any(|f| f.name == file_name) {
            return Err(BotError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no stored file named {}", file_name),
            )));
        }
        let name = format!("{}{}", PREVIEW_PREFIX, file_name);
        self.insert(name.clone(), Some(file_name));
        Ok(name)
    }

    async fn files(&self) -> BotResult<Vec<MediaFile>> {
        Ok(self.files.lock().clone())
    }
}
