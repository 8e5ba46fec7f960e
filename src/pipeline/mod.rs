use std::collections::BTreeSet;
use std::fs;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::actions::{self, Action, Outcome};
use crate::metadata::context::{DateContext, MediaContext, PlaceContext};
use crate::metadata::extractor::extract_source_info;
use crate::metadata::{ExifStore, Gazetteer, LocationHistory, MetadataStore};
use crate::resolver::{CoordinateSource, Resolution, Resolver};
use crate::template::{DEFAULT_TEMPLATE, apply_template};

const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "mp4", "mov"];

fn default_geonames() -> Utf8PathBuf {
    Utf8PathBuf::from("geonames")
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_exiftool() -> String {
    "exiftool".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: Utf8PathBuf,
    pub target: Utf8PathBuf,
    /// Folder of GeoNames `*.txt` dumps.
    #[serde(default = "default_geonames")]
    pub geonames: Utf8PathBuf,
    #[serde(default)]
    pub location_history: Option<Utf8PathBuf>,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default)]
    pub action: Action,
    /// Worker count; rayon's default when unset.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_exiftool")]
    pub exiftool: String,
}

impl Config {
    pub fn new(source: impl Into<Utf8PathBuf>, target: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            geonames: default_geonames(),
            location_history: None,
            template: default_template(),
            action: Action::default(),
            threads: None,
            recursive: true,
            dry_run: false,
            exiftool: default_exiftool(),
        }
    }

    pub fn from_yaml_file(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        serde_yaml::from_str(&content).with_context(|| "Failed to parse configuration")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub moved: usize,
    pub unchanged: usize,
    pub located_from_history: usize,
    pub unnamed: usize,
    pub errors: usize,
}

#[derive(Debug)]
pub struct FileOutcome {
    pub destination: Utf8PathBuf,
    pub resolution: Resolution,
    /// `None` on dry runs.
    pub outcome: Option<Outcome>,
}

pub struct Pipeline {
    config: Config,
    resolver: Resolver,
    store: Box<dyn MetadataStore>,
}

impl Pipeline {
    pub fn new(config: Config, resolver: Resolver, store: Box<dyn MetadataStore>) -> Self {
        Self {
            config,
            resolver,
            store,
        }
    }

    /// Validates the folders and builds both indices. Every failure here is
    /// fatal: nothing is processed against a half-built index.
    pub fn from_config(mut config: Config) -> Result<Self> {
        config.source = canonical_dir(&config.source, "Source")?;
        config.target = canonical_dir(&config.target, "Target")?;

        let gazetteer = Gazetteer::from_dir(&config.geonames).with_context(|| {
            format!(
                "Cannot continue without GeoNames data (download from https://download.geonames.org/export/dump/ into {})",
                config.geonames
            )
        })?;
        info!("Gazetteer ready with {} places", gazetteer.len());

        let history = config
            .location_history
            .as_deref()
            .map(LocationHistory::from_json_file)
            .transpose()
            .with_context(|| "Failed to load location history")?;

        let resolver = Resolver::new(gazetteer, history).with_write_back(!config.dry_run);
        let store = Box::new(ExifStore::new(config.exiftool.clone()));
        Ok(Self::new(config, resolver, store))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Media files under the source folder, sorted and de-duplicated so each
    /// file is handed to exactly one worker.
    pub fn discover(&self) -> Result<Vec<Utf8PathBuf>> {
        let mut walker = WalkDir::new(&self.config.source);
        if !self.config.recursive {
            walker = walker.max_depth(1);
        }

        let mut files = BTreeSet::new();
        for entry in walker {
            let entry = entry.with_context(|| "Failed to read directory entry")?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(entry.path().to_path_buf())
                .map_err(|p| anyhow::anyhow!("Non-UTF8 path: {p:?}"))?;
            if is_media_file(&path) {
                files.insert(path);
            }
        }

        Ok(files.into_iter().collect())
    }

    pub fn process_file(&self, path: &Utf8Path) -> Result<FileOutcome> {
        let resolution = self.resolver.resolve(self.store.as_ref(), path)?;
        let context = media_context(path, &resolution)?;
        let destination = self
            .config
            .target
            .join(apply_template(&self.config.template, &context)?);

        if self.config.dry_run {
            info!("[dry run] {path} → {destination}");
            return Ok(FileOutcome {
                destination,
                resolution,
                outcome: None,
            });
        }

        let outcome = self.config.action.execute(path, &destination)?;
        if outcome == Outcome::Done && self.config.action == Action::Move {
            if let Some(parent) = path.parent() {
                if parent != self.config.source.as_path() {
                    actions::remove_empty_dir(parent);
                }
            }
        }

        Ok(FileOutcome {
            destination,
            resolution,
            outcome: Some(outcome),
        })
    }

    /// Processes every discovered file on a bounded worker pool. Individual
    /// failures are counted, never fatal.
    pub fn run(&self) -> Result<RunSummary> {
        let files = self.discover()?;
        if files.is_empty() {
            warn!("No media files found in {}", self.config.source);
            return Ok(RunSummary::default());
        }

        info!(
            "Processing {} files from {} into {}",
            files.len(),
            self.config.source,
            self.config.target
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .build()
            .with_context(|| "Failed to start worker pool")?;

        let results: Vec<(&Utf8PathBuf, Result<FileOutcome>)> = pool.install(|| {
            files
                .par_iter()
                .map(|path| (path, self.process_file(path)))
                .collect()
        });

        let mut summary = RunSummary::default();
        for (path, result) in results {
            match result {
                Ok(file) => {
                    summary.processed += 1;
                    match file.outcome {
                        Some(Outcome::Done) => summary.moved += 1,
                        Some(Outcome::Unchanged) => summary.unchanged += 1,
                        None => {}
                    }
                    if file.resolution.coordinate_source == CoordinateSource::History {
                        summary.located_from_history += 1;
                    }
                    if file.resolution.place_name().is_empty() {
                        summary.unnamed += 1;
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    error!("Error processing {path}: {e:#}");
                }
            }
        }

        Ok(summary)
    }
}

fn canonical_dir(path: &Utf8Path, what: &str) -> Result<Utf8PathBuf> {
    if !path.is_dir() {
        anyhow::bail!("{what} folder '{path}' does not exist");
    }
    path.canonicalize_utf8()
        .with_context(|| format!("Failed to resolve {what} folder '{path}'"))
}

fn media_context(path: &Utf8Path, resolution: &Resolution) -> Result<MediaContext> {
    Ok(MediaContext {
        date: DateContext::from(&resolution.date),
        place: PlaceContext {
            name: resolution.place_name().to_string(),
            country_code: resolution
                .place
                .as_ref()
                .map(|p| p.country_code.clone())
                .unwrap_or_default(),
            lat: resolution.coordinate.map(|c| c.lat),
            lon: resolution.coordinate.map(|c| c.lon),
        },
        source: extract_source_info(path)?,
    })
}

fn is_media_file(path: &Utf8Path) -> bool {
    let by_extension = path
        .extension()
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false);

    by_extension
        || tree_magic_mini::from_filepath(path.as_std_path())
            .map(|mime| mime.starts_with("image/") || mime.starts_with("video/"))
            .unwrap_or(false)
}
