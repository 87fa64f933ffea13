//! Layer descriptors: what to convert and how its sources are laid out.
//!
//! A layer is one named dataset. Its [`Layout`] is a closed set of variants
//! so the resolver matches on it exhaustively; sub-identifiers only exist on
//! the flat multi-file variant.
//!
//! # Example
//!
//! ```ignore
//! use geocloud::layer::{LayerDescriptor, LayerKind};
//!
//! let layer = LayerDescriptor::flat_listing("mangrove", "Mangrove", LayerKind::Vector, ["25k", "50k"]);
//! assert_eq!(layer.kind.output_extension(), "fgb");
//! ```

mod catalog;

pub use catalog::{builtin_layers, Catalog};

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The kind of data a layer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Raster imagery, converted to Cloud-Optimized GeoTIFF.
    Raster,
    /// Vector shapefiles, converted to FlatGeobuf.
    Vector,
}

impl LayerKind {
    /// Input file extensions accepted for this kind (lower-case, no dot).
    pub fn input_extensions(&self) -> &'static [&'static str] {
        match self {
            LayerKind::Raster => &["tif", "tiff"],
            LayerKind::Vector => &["shp"],
        }
    }

    /// Extension used when building explicit source-id paths.
    pub fn primary_input_extension(&self) -> &'static str {
        self.input_extensions()[0]
    }

    /// Output file extension (no dot).
    pub fn output_extension(&self) -> &'static str {
        match self {
            LayerKind::Raster => "tif",
            LayerKind::Vector => "fgb",
        }
    }

    /// Returns true if `extension` is an accepted input extension.
    pub fn accepts_extension(&self, extension: &str) -> bool {
        self.input_extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Raster => write!(f, "raster"),
            LayerKind::Vector => write!(f, "vector"),
        }
    }
}

/// How files of a flat multi-file layer are found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatSource {
    /// List the source directory and match each file against the sub-identifiers.
    #[default]
    Listing,
    /// Explicit file stems under the source directory, paired positionally
    /// with the sub-identifiers.
    SourceIds(Vec<String>),
}

/// On-disk shape of a layer's source data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum Layout {
    /// `source_path` is the single input file.
    Single,
    /// `source_path` is a directory of sibling files told apart by sub-identifier.
    FlatMulti {
        sub_ids: Vec<String>,
        #[serde(default)]
        source: FlatSource,
    },
    /// `source_path` contains named sub-collections, each a flat group.
    HierarchicalMulti,
}

impl Layout {
    /// Short name for display.
    pub fn label(&self) -> &'static str {
        match self {
            Layout::Single => "single",
            Layout::FlatMulti {
                source: FlatSource::Listing,
                ..
            } => "flat (listing)",
            Layout::FlatMulti {
                source: FlatSource::SourceIds(_),
                ..
            } => "flat (source ids)",
            Layout::HierarchicalMulti => "hierarchical",
        }
    }
}

/// Immutable description of one layer to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Unique name; prefix of every output filename.
    pub name: String,

    /// Path relative to the input root.
    pub source_path: PathBuf,

    /// Raster or vector.
    pub kind: LayerKind,

    /// Source layout.
    #[serde(flatten)]
    pub layout: Layout,
}

impl LayerDescriptor {
    /// A layer backed by exactly one file.
    pub fn single(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        kind: LayerKind,
    ) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            kind,
            layout: Layout::Single,
        }
    }

    /// A flat multi-file layer resolved by directory listing.
    pub fn flat_listing<I, S>(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        kind: LayerKind,
        sub_ids: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            kind,
            layout: Layout::FlatMulti {
                sub_ids: sub_ids.into_iter().map(Into::into).collect(),
                source: FlatSource::Listing,
            },
        }
    }

    /// A flat multi-file layer with explicit `(source_id, sub_id)` pairs.
    pub fn flat_source_ids<I, A, B>(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        kind: LayerKind,
        pairs: I,
    ) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let (source_ids, sub_ids): (Vec<String>, Vec<String>) = pairs
            .into_iter()
            .map(|(source, sub)| (source.into(), sub.into()))
            .unzip();
        Self {
            name: name.into(),
            source_path: source_path.into(),
            kind,
            layout: Layout::FlatMulti {
                sub_ids,
                source: FlatSource::SourceIds(source_ids),
            },
        }
    }

    /// A layer made of named sub-collections.
    pub fn hierarchical(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        kind: LayerKind,
    ) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            kind,
            layout: Layout::HierarchicalMulti,
        }
    }
}
