//! Local model lifecycle: pull, import, reset, remove, alias

use super::download::Downloader;
use super::hub::{GGUF_TAG, HubClient, HubModel, RemoteSort, select_quantized_file};
use super::slug::{format_file_size, generate_slug, validate_slug, validate_source_id};
use crate::error::{GgufError, GgufResult};
use crate::store::{ModelRecord, NewModel, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Number of rows shown by `recent` / `trending`
pub const REMOTE_LIST_LIMIT: usize = 20;

/// Result of a `pull`
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    /// The model directory already held a GGUF file; nothing was fetched
    AlreadyPresent(PathBuf),
    Downloaded(ModelRecord),
}

/// Summary of a models-directory scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub failed: usize,
}

/// Coordinates the hub, the downloader and the metadata store
pub struct ModelManager {
    models_dir: PathBuf,
    hub: Arc<dyn HubClient>,
    downloader: Arc<dyn Downloader>,
}

impl ModelManager {
    pub fn new(
        models_dir: PathBuf,
        hub: Arc<dyn HubClient>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            models_dir,
            hub,
            downloader,
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Download the `q4_k_m` artifact of `source_id` and record it
    pub async fn pull(&self, store: &Store, source_id: &str) -> GgufResult<PullOutcome> {
        validate_source_id(source_id)?;

        let model_dir = self.models_dir.join(source_id);
        if let Some(existing) = first_gguf_in(&model_dir)? {
            tracing::warn!(
                path = ?model_dir,
                "Model already exists. Remove existing files to re-download."
            );
            return Ok(PullOutcome::AlreadyPresent(existing));
        }

        tracing::info!(source_id = %source_id, "Fetching model information");
        let info = self.hub.model_info(source_id).await?;

        let file_name = select_quantized_file(&info)
            .ok_or_else(|| {
                GgufError::NotFound(format!("no q4_k_m.gguf file found for {}", source_id))
            })?
            .to_string();

        tokio::fs::create_dir_all(&model_dir).await?;

        tracing::info!(source_id = %source_id, file = %file_name, "Downloading model file");
        let downloaded = self
            .downloader
            .download(source_id, &file_name, &model_dir)
            .await?;

        let metadata = tokio::fs::metadata(&downloaded).await.map_err(|e| {
            GgufError::Download(format!("downloaded file not found: {:?}: {}", downloaded, e))
        })?;

        let slug = generate_slug(source_id);
        let record = store.upsert(&NewModel {
            slug: &slug,
            source_id,
            file_name: &file_name,
            file_path: &downloaded,
            file_size: &format_file_size(metadata.len()),
        })?;

        tracing::info!(slug = %record.slug, "Model added to database");
        Ok(PullOutcome::Downloaded(record))
    }

    /// Record every `*.gguf` found under the models directory
    ///
    /// Files must sit at least one directory deep; the directories between the
    /// root and the file form the source identifier. Individual failures are
    /// logged and skipped.
    pub fn import_existing(&self, store: &Store) -> GgufResult<ImportReport> {
        tracing::info!(models_dir = ?self.models_dir, "Scanning for existing models");

        let mut report = ImportReport::default();
        let walker = WalkDir::new(&self.models_dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable entry");
                    report.failed += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() || !has_gguf_extension(entry.path()) {
                continue;
            }

            match self.import_file(store, entry.path()) {
                Ok(Some(slug)) => {
                    tracing::info!(slug = %slug, "Imported model");
                    report.imported.push(slug);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = ?entry.path(), error = %e, "Failed to import model");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            imported = report.imported.len(),
            failed = report.failed,
            "Import completed"
        );
        Ok(report)
    }

    fn import_file(&self, store: &Store, path: &Path) -> GgufResult<Option<String>> {
        let Some(source_id) = source_id_from_path(&self.models_dir, path) else {
            return Ok(None);
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = std::fs::metadata(path)?.len();
        let slug = generate_slug(&source_id);

        store.upsert(&NewModel {
            slug: &slug,
            source_id: &source_id,
            file_name: &file_name,
            file_path: path,
            file_size: &format_file_size(size),
        })?;

        Ok(Some(slug))
    }

    /// Drop the store file, recreate it empty and re-import from disk
    ///
    /// Custom slugs are lost. Returns the freshly opened store.
    pub fn reset(&self, store: Store) -> GgufResult<(Store, ImportReport)> {
        let db_path = store
            .path()
            .map(Path::to_path_buf)
            .ok_or_else(|| GgufError::Validation("cannot reset an in-memory store".to_string()))?;

        tracing::warn!(path = ?db_path, "Resetting the database");
        store.close()?;

        match std::fs::remove_file(&db_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let fresh = Store::open(&db_path)?;
        let report = self.import_existing(&fresh)?;
        Ok((fresh, report))
    }

    /// First page of the public GGUF listing, limited to tagged models
    pub async fn list_remote(&self, sort: RemoteSort) -> GgufResult<Vec<HubModel>> {
        let models = self.hub.list_models(sort).await?;
        Ok(models
            .into_iter()
            .filter(|m| m.has_tag(GGUF_TAG))
            .take(REMOTE_LIST_LIMIT)
            .collect())
    }

    /// Delete the model file, then its record
    pub fn remove(&self, store: &Store, slug: &str) -> GgufResult<ModelRecord> {
        let record = store.get(slug)?;

        match std::fs::remove_file(&record.file_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?record.file_path, "Model file already missing");
            }
            Err(e) => return Err(e.into()),
        }

        store.remove(slug)?;
        tracing::info!(slug = %slug, "Model removed from filesystem and database");
        Ok(record)
    }

    /// Give a model a new slug
    pub fn alias(&self, store: &Store, old: &str, new: &str) -> GgufResult<()> {
        validate_slug(new)?;
        store.get(old)?;
        store.rename(old, new)?;
        tracing::info!(old = %old, new = %new, "Model aliased");
        Ok(())
    }
}

fn first_gguf_in(dir: &Path) -> GgufResult<Option<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && has_gguf_extension(&path) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

fn has_gguf_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gguf"))
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Directories between `root` and the file, joined with `/`
fn source_id_from_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    if parts.len() < 2 {
        return None;
    }
    Some(parts[..parts.len() - 1].join("/"))
}
