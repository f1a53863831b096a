use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Root prefix of catalog ids
pub const ASSET_ROOT: &str = "../assets";
/// Id of the built-in text asset
pub const TEXT_ASSET_ID: &str = "text-box";

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "svg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Text,
}

/// A selectable catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Loadable bitmap source; text assets have none
    pub src: Option<String>,
    #[serde(rename = "type")]
    pub kind: AssetKind,
}

impl AssetDescriptor {
    pub fn image(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        src: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            src: Some(src.into()),
            kind: AssetKind::Image,
        }
    }

    /// The built-in text box template
    pub fn text_box() -> Self {
        Self {
            id: TEXT_ASSET_ID.to_owned(),
            name: "Text Box".to_owned(),
            category: "Text".to_owned(),
            src: None,
            kind: AssetKind::Text,
        }
    }

    /// Catalog-relative path, e.g. `cards/card1.png`
    pub fn relative_path(&self) -> &str {
        normalize_asset_path(&self.id)
    }
}

/// Strip relative-directory and catalog-root prefixes from an asset id.
///
/// `../assets/cards/a.png`, `../../assets/cards/a.png` and `cards/a.png` all normalize
/// to `cards/a.png`.
pub fn normalize_asset_path(id: &str) -> &str {
    let mut path = id;
    loop {
        if let Some(rest) = path.strip_prefix("../") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else {
            break;
        }
    }
    path.strip_prefix("assets/").unwrap_or(path)
}

/// The registry of selectable image and text assets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetCatalog {
    entries: Vec<AssetDescriptor>,
}

impl AssetCatalog {
    pub fn new(entries: Vec<AssetDescriptor>) -> Self {
        Self { entries }
    }

    /// Build a catalog from `(relative path, src)` pairs. The text asset always comes first.
    pub fn from_paths<I, P, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: AsRef<str>,
        S: Into<String>,
    {
        let mut entries = vec![AssetDescriptor::text_box()];
        for (path, src) in paths {
            let relative = normalize_asset_path(path.as_ref());
            let (name, category) = describe(relative);
            entries.push(AssetDescriptor::image(
                format!("{ASSET_ROOT}/{relative}"),
                name,
                category,
                src,
            ));
        }
        log::info!("Assets loaded: {}", entries.len());
        Self { entries }
    }

    /// Recursively collect the images under `root`
    pub fn scan_dir(root: &Path) -> std::io::Result<Self> {
        let mut found = Vec::new();
        collect_images(root, root, &mut found)?;
        found.sort();
        Ok(Self::from_paths(found))
    }

    pub fn entries(&self) -> &[AssetDescriptor] {
        &self.entries
    }

    pub fn images(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.entries.iter().filter(|a| a.kind == AssetKind::Image)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact id lookup
    pub fn get(&self, id: &str) -> Option<&AssetDescriptor> {
        self.entries.iter().find(|a| a.id == id)
    }

    /// Find a loadable image by path, ignoring catalog-root prefixes on either side
    pub fn resolve(&self, path: &str) -> Option<&AssetDescriptor> {
        let wanted = normalize_asset_path(path);
        self.images()
            .filter(|a| a.src.is_some())
            .find(|a| a.relative_path() == wanted)
    }

    /// Entries grouped by category name
    pub fn by_category(&self) -> BTreeMap<&str, Vec<&AssetDescriptor>> {
        let mut groups: BTreeMap<&str, Vec<&AssetDescriptor>> = BTreeMap::new();
        for asset in &self.entries {
            groups.entry(asset.category.as_str()).or_default().push(asset);
        }
        groups
    }
}

fn collect_images(root: &Path, dir: &Path, found: &mut Vec<(String, String)>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(root, &path, found)?;
            continue;
        }
        if !is_image_file(&path) {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            found.push((relative, path.display().to_string()));
        }
    }
    Ok(())
}

/// Check if a file is an image based on its extension
fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Display name and category for a catalog-relative path
fn describe(relative: &str) -> (String, String) {
    let mut segments: Vec<&str> = relative.split('/').collect();
    let file_name = segments.pop().unwrap_or_default();

    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    };
    let name = stem.replace(['-', '_'], " ");

    let category = if segments.is_empty() {
        "Uncategorized".to_owned()
    } else {
        segments
            .iter()
            .map(|segment| capitalize(&segment.replace(['-', '_'], " ")))
            .collect::<Vec<_>>()
            .join(" / ")
    };

    (name, category)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_asset_path() {
        assert_eq!(normalize_asset_path("../assets/cards/a.png"), "cards/a.png");
        assert_eq!(normalize_asset_path("../../assets/cards/a.png"), "cards/a.png");
        assert_eq!(normalize_asset_path("cards/a.png"), "cards/a.png");
        assert_eq!(normalize_asset_path("text-box"), "text-box");
    }

    #[test]
    fn test_from_paths_names_and_categories() {
        let catalog = AssetCatalog::from_paths([
            ("card_frames/gold-frame.png", "/a/card_frames/gold-frame.png"),
            ("logo.svg", "/a/logo.svg"),
        ]);

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.entries()[0].kind, AssetKind::Text);

        let frame = catalog.get("../assets/card_frames/gold-frame.png").unwrap();
        assert_eq!(frame.name, "gold frame");
        assert_eq!(frame.category, "Card frames");
        assert_eq!(frame.relative_path(), "card_frames/gold-frame.png");

        let logo = catalog.get("../assets/logo.svg").unwrap();
        assert_eq!(logo.category, "Uncategorized");
        assert_eq!(logo.name, "logo");
    }

    #[test]
    fn test_resolve_ignores_prefixes() {
        let catalog = AssetCatalog::from_paths([("cards/a.png", "/srv/cards/a.png")]);
        let hit = catalog.resolve("../../assets/cards/a.png").unwrap();
        assert_eq!(hit.src.as_deref(), Some("/srv/cards/a.png"));
        assert!(catalog.resolve("cards/b.png").is_none());
        // The text asset is never a bitmap source
        assert!(catalog.resolve(TEXT_ASSET_ID).is_none());
    }

    #[test]
    fn test_by_category() {
        let catalog = AssetCatalog::from_paths([
            ("cards/a.png", "a"),
            ("cards/b.png", "b"),
            ("icons/star.png", "s"),
        ]);
        let groups = catalog.by_category();
        assert_eq!(groups["Cards"].len(), 2);
        assert_eq!(groups["Icons"].len(), 1);
        assert_eq!(groups["Text"].len(), 1);
    }

    #[test]
    fn test_scan_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cards")).unwrap();
        std::fs::write(dir.path().join("cards/a.png"), b"not really a png").unwrap();
        std::fs::write(dir.path().join("cards/notes.txt"), b"skip me").unwrap();

        let catalog = AssetCatalog::scan_dir(dir.path()).unwrap();
        assert_eq!(catalog.images().count(), 1);
        assert!(catalog.resolve("cards/a.png").is_some());
    }
}
