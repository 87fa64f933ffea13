//! Layer-to-job expansion.
//!
//! The [`FileResolver`] turns one [`LayerDescriptor`] into the concrete
//! conversion jobs for its input files:
//!
//! ```text
//! Single             source_path ──────────────────────────► {layer}.{ext}
//! FlatMulti/Listing  list dir ─► filter ext ─► match sub-id ► {layer}_{sub}.{ext}
//! FlatMulti/SourceIds {dir}/{source_id}.{ext} ─────────────► {layer}_{sub}.{ext}
//! HierarchicalMulti  walker ─► (collection, file) ─────────► {layer}_{collection}[_{stem}].{ext}
//! ```
//!
//! Resolution never fails as a whole: problems become [`ResolutionError`]s
//! in the returned [`Resolution`] alongside whatever jobs could be built.

mod listing;
mod naming;

pub use listing::{
    has_accepted_extension, CollectionFile, DirectoryLister, FsLister, HierarchyWalker,
    SubdirectoryWalker,
};
pub use naming::{match_sub_id, normalize_name};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::job::ConversionJob;
use crate::layer::{FlatSource, LayerDescriptor, Layout};

/// Jobs and errors produced for one layer.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Layer name.
    pub layer: String,
    /// Jobs to dispatch, in deterministic order.
    pub jobs: Vec<ConversionJob>,
    /// Problems found while resolving; none of them abort the layer.
    pub errors: Vec<ResolutionError>,
}

impl Resolution {
    fn new(layer: &str) -> Self {
        Self {
            layer: layer.to_string(),
            ..Default::default()
        }
    }

    /// Number of files skipped because no sub-identifier matched.
    pub fn unmatched_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_unmatched()).count()
    }
}

/// Expands layer descriptors into conversion jobs.
#[derive(Clone)]
pub struct FileResolver {
    input_root: PathBuf,
    output_root: PathBuf,
    lister: Arc<dyn DirectoryLister>,
    walker: Arc<dyn HierarchyWalker>,
}

impl FileResolver {
    /// Creates a resolver over the real filesystem.
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            lister: Arc::new(FsLister),
            walker: Arc::new(SubdirectoryWalker),
        }
    }

    /// Replaces the directory lister.
    pub fn with_lister(mut self, lister: Arc<dyn DirectoryLister>) -> Self {
        self.lister = lister;
        self
    }

    /// Replaces the strategy used for hierarchical layers.
    pub fn with_walker(mut self, walker: Arc<dyn HierarchyWalker>) -> Self {
        self.walker = walker;
        self
    }

    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Resolves one layer.
    pub fn resolve(&self, layer: &LayerDescriptor) -> Resolution {
        let source = self.input_root.join(&layer.source_path);
        let mut resolution = Resolution::new(&layer.name);

        match &layer.layout {
            Layout::Single => self.resolve_single(layer, source, &mut resolution),
            Layout::FlatMulti {
                sub_ids,
                source: FlatSource::Listing,
            } => self.resolve_listing(layer, &source, sub_ids, &mut resolution),
            Layout::FlatMulti {
                sub_ids,
                source: FlatSource::SourceIds(source_ids),
            } => self.resolve_source_ids(layer, &source, source_ids, sub_ids, &mut resolution),
            Layout::HierarchicalMulti => {
                self.resolve_hierarchical(layer, &source, &mut resolution)
            }
        }

        for error in &resolution.errors {
            warn!(layer = %layer.name, error = %error, "Resolution problem");
        }
        debug!(
            layer = %layer.name,
            layout = layer.layout.label(),
            jobs = resolution.jobs.len(),
            errors = resolution.errors.len(),
            "Resolved layer"
        );

        resolution
    }

    fn job(&self, layer: &LayerDescriptor, input: PathBuf, sub_id: Option<String>) -> ConversionJob {
        ConversionJob::new(&layer.name, input, &self.output_root, layer.kind, sub_id)
    }

    fn resolve_single(&self, layer: &LayerDescriptor, source: PathBuf, out: &mut Resolution) {
        if !self.lister.is_file(&source) {
            out.errors
                .push(ResolutionError::MissingSource { path: source });
            return;
        }
        out.jobs.push(self.job(layer, source, None));
    }

    fn resolve_listing(
        &self,
        layer: &LayerDescriptor,
        dir: &Path,
        sub_ids: &[String],
        out: &mut Resolution,
    ) {
        let files = match self.list_source_dir(dir) {
            Ok(files) => files,
            Err(e) => {
                out.errors.push(e);
                return;
            }
        };

        for path in files
            .into_iter()
            .filter(|p| has_accepted_extension(p, layer.kind))
        {
            let stem = file_stem(&path);
            match match_sub_id(&stem, sub_ids) {
                Some(sub_id) => {
                    let sub_id = sub_id.to_string();
                    out.jobs.push(self.job(layer, path, Some(sub_id)));
                }
                None => out.errors.push(ResolutionError::UnmatchedFile {
                    path,
                    sub_ids: sub_ids.to_vec(),
                }),
            }
        }
    }

    fn resolve_source_ids(
        &self,
        layer: &LayerDescriptor,
        dir: &Path,
        source_ids: &[String],
        sub_ids: &[String],
        out: &mut Resolution,
    ) {
        if !self.lister.is_dir(dir) {
            out.errors.push(ResolutionError::MissingSource {
                path: dir.to_path_buf(),
            });
            return;
        }

        for (source_id, sub_id) in source_ids.iter().zip(sub_ids) {
            // join, not with_extension: source ids may contain dots
            let input = dir.join(format!(
                "{}.{}",
                source_id,
                layer.kind.primary_input_extension()
            ));
            if self.lister.is_file(&input) {
                out.jobs.push(self.job(layer, input, Some(sub_id.clone())));
            } else {
                out.errors
                    .push(ResolutionError::MissingSource { path: input });
            }
        }
    }

    fn resolve_hierarchical(&self, layer: &LayerDescriptor, dir: &Path, out: &mut Resolution) {
        if !self.lister.is_dir(dir) {
            out.errors.push(ResolutionError::MissingSource {
                path: dir.to_path_buf(),
            });
            return;
        }

        let found = match self.walker.walk(self.lister.as_ref(), dir, layer.kind) {
            Ok(found) => found,
            Err(e) => {
                out.errors.push(e);
                return;
            }
        };

        let mut collections: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for file in found {
            collections.entry(file.collection).or_default().push(file.path);
        }

        for (collection, mut files) in collections {
            files.sort();
            let collection_id = normalize_name(&collection);
            if let [only] = files.as_slice() {
                out.jobs
                    .push(self.job(layer, only.clone(), Some(collection_id)));
                continue;
            }
            for path in files {
                let sub_id = format!("{}_{}", collection_id, normalize_name(&file_stem(&path)));
                out.jobs.push(self.job(layer, path, Some(sub_id)));
            }
        }
    }

    fn list_source_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, ResolutionError> {
        if !self.lister.is_dir(dir) {
            return Err(ResolutionError::MissingSource {
                path: dir.to_path_buf(),
            });
        }
        self.lister
            .list_files(dir)
            .map_err(|e| ResolutionError::listing(dir, e))
    }
}

impl std::fmt::Debug for FileResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileResolver")
            .field("input_root", &self.input_root)
            .field("output_root", &self.output_root)
            .finish()
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
