use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::asset::{AssetCatalog, AssetDescriptor, normalize_asset_path};
use crate::error::{EditorError, EditorResult};
use crate::layer::{Layer, LayerKind, Size};
use crate::util::time::iso_timestamp;

/// Format version written into every exported document
pub const DOCUMENT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub canvas_size: Size,
}

/// A layer as it travels in a document.
///
/// Image layers carry `assetPath`, a catalog-relative reference, instead of a bitmap source.
/// `imageData` only appears in legacy documents and is never written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLayer {
    #[serde(flatten)]
    pub layer: Layer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_path: Option<String>,
    #[serde(default, skip_serializing)]
    pub image_data: Option<Value>,
}

/// The portable, file-serializable representation of a composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub version: String,
    #[serde(default, serialize_with = "serialize_export_date")]
    pub export_date: Option<DateTime<Utc>>,
    pub layers: Vec<DocumentLayer>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

fn serialize_export_date<S: Serializer>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
    match date {
        Some(date) => serializer.serialize_str(&iso_timestamp(*date)),
        None => serializer.serialize_none(),
    }
}

impl Document {
    pub fn to_json_pretty(&self) -> EditorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse raw document bytes.
    ///
    /// Fails with [`EditorError::MalformedDocument`] if the bytes are not JSON, if `layers`
    /// is missing or not a sequence, or if a layer record cannot be read.
    pub fn from_slice(raw: &[u8]) -> EditorResult<Self> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|err| EditorError::MalformedDocument(format!("not JSON: {err}")))?;

        match value.get("layers") {
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(EditorError::MalformedDocument(
                    "layers is not a sequence".to_owned(),
                ));
            }
            None => {
                return Err(EditorError::MalformedDocument(
                    "missing layers array".to_owned(),
                ));
            }
        }

        serde_json::from_value(value).map_err(|err| EditorError::MalformedDocument(err.to_string()))
    }
}

/// Result of importing a document. Unresolved assets are warnings, not failures.
#[derive(Debug)]
pub struct ImportOutcome {
    pub layers: Vec<Layer>,
    /// One [`EditorError::AssetUnresolved`] per image layer left without a source
    pub unresolved: Vec<EditorError>,
    pub canvas_size: Size,
}

impl ImportOutcome {
    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Wrap `layers` into a document stamped with the current time.
///
/// Image layers get their catalog-relative `assetPath`; their bitmap source is dropped.
pub fn export_document(layers: &[Layer], canvas_size: Size) -> Document {
    let layers = layers
        .iter()
        .map(|layer| {
            let mut layer = layer.clone();
            let asset_path = match layer.kind() {
                LayerKind::Image => {
                    layer.src = None;
                    layer.asset_id.as_deref().map(|id| normalize_asset_path(id).to_owned())
                }
                LayerKind::Text => None,
            };
            DocumentLayer {
                layer,
                asset_path,
                image_data: None,
            }
        })
        .collect();

    Document {
        version: DOCUMENT_VERSION.to_owned(),
        export_date: Some(Utc::now()),
        layers,
        metadata: DocumentMetadata { canvas_size },
    }
}

/// Parse `raw` and re-link every image layer against `catalog`.
///
/// Layers whose asset cannot be found are kept with no source and reported in
/// [`ImportOutcome::unresolved`].
pub fn import_document(raw: &[u8], catalog: &AssetCatalog) -> EditorResult<ImportOutcome> {
    let document = Document::from_slice(raw)?;
    Ok(relink_document(document, catalog))
}

/// Resolve the layers of an already-parsed document
pub fn relink_document(document: Document, catalog: &AssetCatalog) -> ImportOutcome {
    let mut unresolved = Vec::new();
    let layers: Vec<Layer> = document
        .layers
        .into_iter()
        .map(|entry| {
            if entry.layer.kind() != LayerKind::Image {
                return entry.layer;
            }

            let matched = resolve_image(&entry, catalog).and_then(|asset| {
                asset.src.as_ref().map(|src| (asset.id.clone(), src.clone()))
            });
            let mut layer = entry.layer;
            match matched {
                Some((asset_id, src)) => {
                    layer.asset_id = Some(asset_id);
                    layer.src = Some(src);
                }
                None => {
                    let reference = entry
                        .asset_path
                        .or_else(|| layer.asset_id.clone())
                        .unwrap_or_default();
                    log::warn!("Asset not found for layer {}: {}", layer.name, reference);
                    layer.src = None;
                    unresolved.push(EditorError::AssetUnresolved {
                        layer: layer.name.clone(),
                        reference,
                    });
                }
            }
            layer
        })
        .collect();

    if !unresolved.is_empty() {
        log::warn!(
            "Some assets could not be found ({} of {} layers)",
            unresolved.len(),
            layers.len()
        );
    }
    log::info!("Imported {} layers", layers.len());

    ImportOutcome {
        layers,
        unresolved,
        canvas_size: document.metadata.canvas_size,
    }
}

/// Match order: stored asset path, then normalized asset id, then the legacy id-only fallback
fn resolve_image<'a>(entry: &DocumentLayer, catalog: &'a AssetCatalog) -> Option<&'a AssetDescriptor> {
    let loadable = || catalog.images().filter(|asset| asset.src.is_some());

    if let Some(path) = entry.asset_path.as_deref() {
        if let Some(asset) = loadable().find(|asset| asset.relative_path() == path) {
            return Some(asset);
        }
    }

    let asset_id = entry.layer.asset_id.as_deref()?;
    let normalized = normalize_asset_path(asset_id);
    if let Some(asset) = loadable().find(|asset| asset.relative_path() == normalized || asset.id == asset_id) {
        return Some(asset);
    }

    entry.image_data.as_ref()?;
    catalog.get(asset_id)
}

/// File name for a document title, e.g. `"Fire Drake" -> "fire-drake.png"`
pub fn document_file_name(title: &str, extension: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_separator = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
            in_separator = false;
        } else if !in_separator {
            slug.push('-');
            in_separator = true;
        }
    }
    format!("{slug}.{extension}")
}
