//! The layer catalog: a validated, immutable list of layer descriptors.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::{FlatSource, LayerDescriptor, LayerKind, Layout};
use crate::error::ConfigurationError;

/// Validated list of layers for one run.
///
/// Construction checks every descriptor, so a `Catalog` in hand is always
/// well formed and work can be dispatched without further checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    layers: Vec<LayerDescriptor>,
}

impl Catalog {
    /// Validates `layers` and builds a catalog.
    pub fn new(layers: Vec<LayerDescriptor>) -> Result<Self, ConfigurationError> {
        validate(&layers)?;
        Ok(Self { layers })
    }

    /// The catalog shipped with the tool.
    pub fn builtin() -> Self {
        Self {
            layers: builtin_layers(),
        }
    }

    /// Loads a catalog from a JSON array of layer descriptors.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigurationError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigurationError::CatalogFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text).map_err(|e| match e {
            ConfigurationError::CatalogFile { reason, .. } => ConfigurationError::CatalogFile {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parses a catalog from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigurationError> {
        let layers: Vec<LayerDescriptor> =
            serde_json::from_str(text).map_err(|e| ConfigurationError::CatalogFile {
                path: "<inline>".into(),
                reason: e.to_string(),
            })?;
        Self::new(layers)
    }

    /// Keeps only the named layers, in catalog order.
    ///
    /// Unknown names are a configuration error.
    pub fn select(&self, names: &[String]) -> Result<Self, ConfigurationError> {
        if names.is_empty() {
            return Ok(self.clone());
        }
        for name in names {
            if self.get(name).is_none() {
                return Err(ConfigurationError::InvalidValue {
                    key: "layer".to_string(),
                    reason: format!("unknown layer '{}'", name),
                });
            }
        }
        Ok(Self {
            layers: self
                .layers
                .iter()
                .filter(|l| names.contains(&l.name))
                .cloned()
                .collect(),
        })
    }

    /// Looks up a layer by name.
    pub fn get(&self, name: &str) -> Option<&LayerDescriptor> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerDescriptor> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

fn validate(layers: &[LayerDescriptor]) -> Result<(), ConfigurationError> {
    if layers.is_empty() {
        return Err(ConfigurationError::EmptyCatalog);
    }

    let mut names = HashSet::new();
    for (index, layer) in layers.iter().enumerate() {
        if layer.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyLayerName { index });
        }
        if !names.insert(layer.name.as_str()) {
            return Err(ConfigurationError::DuplicateLayer(layer.name.clone()));
        }

        if let Layout::FlatMulti { sub_ids, source } = &layer.layout {
            if sub_ids.is_empty() {
                return Err(ConfigurationError::MissingSubIdentifiers(
                    layer.name.clone(),
                ));
            }

            let mut seen = HashSet::new();
            for sub_id in sub_ids {
                if sub_id.trim().is_empty() {
                    return Err(ConfigurationError::EmptySubIdentifier(layer.name.clone()));
                }
                if !seen.insert(sub_id.to_lowercase()) {
                    return Err(ConfigurationError::DuplicateSubIdentifier {
                        layer: layer.name.clone(),
                        sub_id: sub_id.clone(),
                    });
                }
            }

            if let FlatSource::SourceIds(source_ids) = source {
                if source_ids.len() != sub_ids.len() {
                    return Err(ConfigurationError::SourceIdMismatch {
                        layer: layer.name.clone(),
                        source_ids: source_ids.len(),
                        sub_ids: sub_ids.len(),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Layers of the Indonesian base-map deployment.
pub fn builtin_layers() -> Vec<LayerDescriptor> {
    use LayerKind::{Raster, Vector};

    vec![
        LayerDescriptor::single(
            "DEMNAS_Jawa_Timur",
            "Copy of [LapakGIS.com]_DEMNAS_Jawa_Timur_/[LapakGIS.com]_DEMNAS_Jawa_Timur_.tif",
            Raster,
        ),
        LayerDescriptor::single(
            "bathymetry_indonesia",
            "Data Peta Batimetri Seluruh Indonesia/BATIMETRI_NASIONAL_MSL_MOSAIC.tif",
            Raster,
        ),
        LayerDescriptor::single(
            "plantation_indonesia",
            "SHP Peta Perkebunan Pohon Indonesia [lapakgis.com]/Perkebunan Pohon Indonesia.shp",
            Vector,
        ),
        LayerDescriptor::hierarchical(
            "vegetation_landuse",
            "Vegetasi (Penggunaan Lahan Eksisting) Indonesia - Lapak GIS",
            Vector,
        ),
        LayerDescriptor::flat_source_ids(
            "mangrove",
            "[LapakGIS.com] Kawasan Hutan Mangrove",
            Vector,
            [
                ("Hutan_Mangrove_25K", "25k"),
                ("Hutan_Mangrove_50K", "50k"),
                ("Hutan_Mangrove_250K", "250k"),
            ],
        ),
        LayerDescriptor::flat_source_ids(
            "built_up_indonesia",
            "[LapakGIS.com] Lingkungan Terbangun Indonesia",
            Vector,
            [
                ("Permukiman 25K (164)", "25k"),
                ("Permukiman 50K (166)", "50k"),
                ("Permukiman Penduduk 250K (167)", "250k"),
            ],
        ),
        LayerDescriptor::hierarchical(
            "public_facilities_indonesia",
            "[LapakGIS.com] Shapefile Fasilitas Umum",
            Vector,
        ),
        LayerDescriptor::flat_source_ids(
            "road_indonesia",
            "Shapefile Jalan Indonesia [Lapak GIS.com]",
            Vector,
            [
                ("Permukiman 25K (164)", "25k"),
                ("Permukiman 50K (164)", "50k"),
                ("Ruas Jalan 250k (83)", "250k"),
                ("Ruas Jalan Utama 250k (82)", "main_250k"),
            ],
        ),
        LayerDescriptor::flat_source_ids(
            "geological_indonesia",
            "SHP Shapefile Peta Geologi Se-Indonesia [lapakgis.com]",
            Vector,
            [
                ("[LapakGIS.com] GEOLOGI_REGIONAL_250K", "regional"),
                ("[LapakGIS.com] JENIS SESAR", "sesar"),
                ("[LapakGIS.com] TEKNIKA NEOGEN", "neogen"),
                ("[LapakGIS.com] TEKNIKA OROGEN", "orogen"),
            ],
        ),
    ]
}
