//! Image identity indexer for a version's `samples/` directory.
//!
//! The directory listing is the index: every `{N}.json` sidecar holds the full
//! remote image record, and its identity maps back to the local key `N`. The
//! map is rebuilt from one listing pass per reconciliation and never persisted.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use modelsync_domain::ModelImage;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::ImageIndexError;
use crate::transfer::Fetcher;

pub const IMAGE_EXT: &str = "jpg";
pub const RECORD_EXT: &str = "json";
pub const META_EXT: &str = "meta";

/// File stem shared by a sample's `.jpg`, `.json` and `.meta` files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SampleKey(String);

impl SampleKey {
    pub fn from_index(index: u64) -> Self {
        Self(index.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn index(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn file(&self, dir: &Path, ext: &str) -> PathBuf {
        dir.join(format!("{}.{ext}", self.0))
    }
}

/// Identity → local key mapping built from one directory listing.
#[derive(Debug, Default)]
pub struct ImageIndex {
    by_identity: HashMap<String, SampleKey>,
    max_index: u64,
}

impl ImageIndex {
    /// Scan `dir` for sidecars. A missing directory is an empty index.
    ///
    /// Files without a `.json` extension are ignored. Sidecars with a
    /// non-numeric stem are indexed but do not move the next index. Sidecars
    /// are visited in index order so the lowest index wins for duplicate
    /// identities.
    ///
    /// # Errors
    /// Fails when the directory cannot be listed or when a sidecar cannot be
    /// read or parsed; the local index is untrustworthy in that case.
    pub fn scan(dir: &Path) -> Result<Self, ImageIndexError> {
        let io_err = |source: io::Error| ImageIndexError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(io_err(err)),
        };

        let mut sidecars = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                debug!(path = %path.display(), "skipping sidecar with non-utf8 name");
                continue;
            };
            if !path.is_file() {
                continue;
            }
            sidecars.push((SampleKey(stem.to_string()), path));
        }
        sidecars.sort_by(|(a, _), (b, _)| {
            (a.index().unwrap_or(u64::MAX), a.as_str()).cmp(&(b.index().unwrap_or(u64::MAX), b.as_str()))
        });

        let mut index = Self::default();
        for (key, path) in sidecars {
            let record = read_sidecar(&path)?;
            if let Some(number) = key.index() {
                index.max_index = index.max_index.max(number);
            }
            index.insert(record.identity(), key);
        }
        Ok(index)
    }

    pub fn lookup(&self, identity: &str) -> Option<&SampleKey> {
        self.by_identity.get(identity)
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    pub fn max_index(&self) -> u64 {
        self.max_index
    }

    /// Reserve `max + 1`. Gaps left by deleted samples are never reused.
    pub fn allocate(&mut self) -> SampleKey {
        self.max_index += 1;
        SampleKey::from_index(self.max_index)
    }

    /// First key recorded for an identity wins.
    fn insert(&mut self, identity: &str, key: SampleKey) {
        self.by_identity.entry(identity.to_string()).or_insert(key);
    }
}

fn read_sidecar(path: &Path) -> Result<ModelImage, ImageIndexError> {
    let malformed = |reason: String| ImageIndexError::MalformedSidecar {
        path: path.to_path_buf(),
        reason,
    };
    let contents = fs::read_to_string(path).map_err(|err| malformed(err.to_string()))?;
    let record: ModelImage =
        serde_json::from_str(&contents).map_err(|err| malformed(err.to_string()))?;
    if record.identity().trim().is_empty() {
        return Err(malformed("record has neither hash nor url".to_string()));
    }
    Ok(record)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Remote images already present locally.
    pub existing: usize,
    /// Indices allocated and written during this run.
    pub fetched: Vec<u64>,
    /// Indices that would have been allocated in dry-run mode.
    pub planned: Vec<u64>,
    /// Sidecars whose image file is missing; reported, not repaired.
    pub missing_images: Vec<PathBuf>,
}

pub struct ImageIndexer<'a> {
    fetcher: &'a dyn Fetcher,
    dry_run: bool,
}

impl<'a> ImageIndexer<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, dry_run: bool) -> Self {
        Self { fetcher, dry_run }
    }

    /// Give every remote image a stable local index under `samples_dir`,
    /// fetching only images whose identity is not recorded yet.
    ///
    /// # Errors
    /// Fails on malformed local sidecars, transport errors and write errors.
    pub fn reconcile(
        &self,
        samples_dir: &Path,
        images: &[ModelImage],
    ) -> Result<ReconcileReport, ImageIndexError> {
        let mut index = ImageIndex::scan(samples_dir)?;
        debug!(
            dir = %samples_dir.display(),
            known = index.len(),
            max_index = index.max_index(),
            "scanned samples"
        );
        let mut report = ReconcileReport::default();

        for image in images {
            let identity = image.identity();
            if let Some(key) = index.lookup(identity) {
                report.existing += 1;
                let image_path = key.file(samples_dir, IMAGE_EXT);
                if !image_path.is_file() {
                    warn!(
                        path = %image_path.display(),
                        "sample sidecar exists but its image is missing; not repairing"
                    );
                    report.missing_images.push(image_path);
                }
                continue;
            }

            let key = index.allocate();
            let number = index.max_index();
            if self.dry_run {
                info!(url = %image.url, index = number, "would fetch sample");
                report.planned.push(number);
            } else {
                self.store(samples_dir, &key, image)?;
                report.fetched.push(number);
            }
            index.insert(identity, key);
        }

        Ok(report)
    }

    /// Image first, then `.meta`, then the `.json` sidecar: a sidecar only
    /// appears once the files it describes are complete.
    fn store(&self, dir: &Path, key: &SampleKey, image: &ModelImage) -> Result<(), ImageIndexError> {
        let image_path = key.file(dir, IMAGE_EXT);
        info!(url = %image.url, path = %image_path.display(), "fetching sample");
        self.fetcher.fetch(&image.url, &image_path)?;

        write_json(&key.file(dir, META_EXT), image.meta_value())?;
        write_json(&key.file(dir, RECORD_EXT), image)?;
        Ok(())
    }
}

/// Serialize into a temp file next to `path` and persist it over `path`, so
/// an interrupted run never leaves a truncated sidecar behind.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ImageIndexError> {
    let io_err = |source: io::Error| ImageIndexError::Io {
        path: path.to_path_buf(),
        source,
    };
    let contents = serde_json::to_vec_pretty(value).map_err(|err| io_err(err.into()))?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_err)?;
    let mut staging = NamedTempFile::new_in(parent).map_err(io_err)?;
    staging.write_all(&contents).map_err(io_err)?;
    staging.flush().map_err(io_err)?;
    staging.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::transfer::FetchReport;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingFetcher {
        calls: Mutex<Vec<(String, PathBuf)>>,
    }

    impl RecordingFetcher {
        fn urls(&self) -> Vec<String> {
            self.calls
                .lock()
                .expect("calls lock")
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }
    }

    impl Fetcher for RecordingFetcher {
        fn fetch(&self, url: &str, destination: &Path) -> Result<FetchReport, FetchError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((url.to_string(), destination.to_path_buf()));
            fs::write(destination, url.as_bytes()).map_err(|source| FetchError::Write {
                path: destination.to_path_buf(),
                source,
            })?;
            Ok(FetchReport {
                bytes_written: url.len() as u64,
                declared_length: None,
            })
        }
    }

    fn image(hash: &str) -> ModelImage {
        serde_json::from_value(json!({
            "url": format!("https://example.invalid/{hash}.jpeg"),
            "hash": hash,
            "width": 512,
            "meta": {"prompt": format!("prompt for {hash}"), "seed": 1}
        }))
        .expect("image")
    }

    fn write_sidecar(dir: &Path, stem: &str, image: &ModelImage) {
        fs::write(
            dir.join(format!("{stem}.json")),
            serde_json::to_vec(image).expect("serialize"),
        )
        .expect("write sidecar");
        fs::write(dir.join(format!("{stem}.jpg")), b"jpeg").expect("write image");
    }

    #[test]
    fn new_images_get_the_next_index_after_the_maximum() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let samples = temp.path();
        let (a, b, c) = (image("AAA"), image("BBB"), image("CCC"));
        write_sidecar(samples, "1", &a);
        write_sidecar(samples, "2", &b);
        let fetcher = RecordingFetcher::default();

        let report = ImageIndexer::new(&fetcher, false).reconcile(samples, &[a, b, c.clone()])?;
        assert_eq!(report.existing, 2);
        assert_eq!(report.fetched, vec![3]);
        assert_eq!(fetcher.urls(), vec![c.url.clone()]);

        assert!(samples.join("3.jpg").is_file());
        let record: serde_json::Value =
            serde_json::from_slice(&fs::read(samples.join("3.json"))?)?;
        assert_eq!(record["hash"], "CCC");
        assert_eq!(record["width"], 512);
        let meta: serde_json::Value = serde_json::from_slice(&fs::read(samples.join("3.meta"))?)?;
        assert_eq!(meta["prompt"], "prompt for CCC");
        Ok(())
    }

    #[test]
    fn url_only_image_sidecar_has_no_null_hash() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let samples = temp.path();
        let bare: ModelImage =
            serde_json::from_value(json!({"url": "https://example.invalid/bare.jpeg"}))?;
        let fetcher = RecordingFetcher::default();

        ImageIndexer::new(&fetcher, false).reconcile(samples, &[bare])?;
        let record: serde_json::Value =
            serde_json::from_slice(&fs::read(samples.join("1.json"))?)?;
        assert_eq!(record, json!({"url": "https://example.invalid/bare.jpeg"}));
        let index = ImageIndex::scan(samples)?;
        let key = index.lookup("https://example.invalid/bare.jpeg");
        assert_eq!(key.and_then(SampleKey::index), Some(1));
        Ok(())
    }

    #[test]
    fn reconciling_twice_is_stable_and_fetches_nothing_the_second_time() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let samples = temp.path();
        let images = vec![image("AAA"), image("BBB"), image("CCC")];
        let fetcher = RecordingFetcher::default();
        let indexer = ImageIndexer::new(&fetcher, false);

        let first = indexer.reconcile(samples, &images)?;
        assert_eq!(first.fetched, vec![1, 2, 3]);
        let first_index = ImageIndex::scan(samples)?;

        let mut reordered = images.clone();
        reordered.reverse();
        let second = indexer.reconcile(samples, &reordered)?;
        assert!(second.fetched.is_empty());
        assert_eq!(second.existing, 3);
        assert_eq!(fetcher.urls().len(), 3);

        let second_index = ImageIndex::scan(samples)?;
        for img in &images {
            assert_eq!(
                first_index.lookup(img.identity()),
                second_index.lookup(img.identity())
            );
        }
        Ok(())
    }

    #[test]
    fn gaps_are_never_reused() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let samples = temp.path();
        write_sidecar(samples, "1", &image("AAA"));
        write_sidecar(samples, "7", &image("BBB"));
        let fetcher = RecordingFetcher::default();

        let report = ImageIndexer::new(&fetcher, false)
            .reconcile(samples, &[image("NEW1"), image("NEW2")])?;
        assert_eq!(report.fetched, vec![8, 9]);
        Ok(())
    }

    #[test]
    fn duplicate_identities_in_one_listing_are_fetched_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let fetcher = RecordingFetcher::default();
        let report = ImageIndexer::new(&fetcher, false)
            .reconcile(temp.path(), &[image("AAA"), image("AAA")])?;
        assert_eq!(report.fetched, vec![1]);
        assert_eq!(report.existing, 1);
        Ok(())
    }

    #[test]
    fn stray_files_and_named_sidecars_are_tolerated() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let samples = temp.path();
        fs::write(samples.join("notes.txt"), b"not a sidecar")?;
        fs::write(samples.join("4.meta"), b"{}")?;
        write_sidecar(samples, "cover", &image("AAA"));
        write_sidecar(samples, "2", &image("BBB"));

        let index = ImageIndex::scan(samples)?;
        assert_eq!(index.len(), 2);
        assert_eq!(index.max_index(), 2);
        assert_eq!(index.lookup("AAA").map(SampleKey::as_str), Some("cover"));

        let fetcher = RecordingFetcher::default();
        let report = ImageIndexer::new(&fetcher, false)
            .reconcile(samples, &[image("AAA"), image("CCC")])?;
        assert_eq!(report.existing, 1);
        assert_eq!(report.fetched, vec![3]);
        Ok(())
    }

    #[test]
    fn lowest_index_wins_for_duplicate_sidecars() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write_sidecar(temp.path(), "5", &image("AAA"));
        write_sidecar(temp.path(), "3", &image("AAA"));
        let index = ImageIndex::scan(temp.path())?;
        assert_eq!(index.lookup("AAA"), Some(&SampleKey::from_index(3)));
        Ok(())
    }

    #[test]
    fn corrupt_sidecar_fails_the_reconciliation() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        fs::write(temp.path().join("1.json"), b"{ not json")?;
        let fetcher = RecordingFetcher::default();

        let err = ImageIndexer::new(&fetcher, false)
            .reconcile(temp.path(), &[image("AAA")])
            .unwrap_err();
        assert!(matches!(err, ImageIndexError::MalformedSidecar { .. }));
        assert!(fetcher.urls().is_empty());
        Ok(())
    }

    #[test]
    fn leftover_staging_files_do_not_break_the_next_run() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let samples = temp.path();
        let fetcher = RecordingFetcher::default();
        let indexer = ImageIndexer::new(&fetcher, false);
        indexer.reconcile(samples, &[image("AAA")])?;

        // A run killed while staging a sidecar leaves only a temp file behind.
        let record = fs::read(samples.join("1.json"))?;
        fs::write(samples.join(".tmpK1lled"), &record[..record.len() / 2])?;

        let report = indexer.reconcile(samples, &[image("AAA"), image("BBB")])?;
        assert_eq!(report.existing, 1);
        assert_eq!(report.fetched, vec![2]);
        let record: serde_json::Value =
            serde_json::from_slice(&fs::read(samples.join("2.json"))?)?;
        assert_eq!(record["hash"], "BBB");
        assert!(samples.join("2.meta").is_file());
        Ok(())
    }

    #[test]
    fn sidecars_are_written_without_leftover_temp_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let fetcher = RecordingFetcher::default();
        ImageIndexer::new(&fetcher, false).reconcile(temp.path(), &[image("AAA"), image("BBB")])?;
        let mut names: Vec<String> = fs::read_dir(temp.path())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<Result<_, _>>()?;
        names.sort();
        assert_eq!(
            names,
            vec!["1.jpg", "1.json", "1.meta", "2.jpg", "2.json", "2.meta"]
        );
        Ok(())
    }

    #[test]
    fn missing_image_is_reported_not_repaired() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let samples = temp.path();
        let a = image("AAA");
        write_sidecar(samples, "1", &a);
        fs::remove_file(samples.join("1.jpg"))?;
        let fetcher = RecordingFetcher::default();

        let report = ImageIndexer::new(&fetcher, false).reconcile(samples, &[a])?;
        assert_eq!(report.missing_images, vec![samples.join("1.jpg")]);
        assert!(fetcher.urls().is_empty());
        assert!(!samples.join("1.jpg").exists());
        Ok(())
    }

    #[test]
    fn dry_run_plans_without_writing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let samples = temp.path().join("samples");
        let fetcher = RecordingFetcher::default();

        let report = ImageIndexer::new(&fetcher, true)
            .reconcile(&samples, &[image("AAA"), image("BBB")])?;
        assert_eq!(report.planned, vec![1, 2]);
        assert!(report.fetched.is_empty());
        assert!(fetcher.urls().is_empty());
        assert!(!samples.exists());
        Ok(())
    }
}
