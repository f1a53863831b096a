use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{RasterExporter, SurfaceRenderer};
use crate::asset::AssetCatalog;
use crate::config::BatchSettings;
use crate::document::import_document;
use crate::error::EditorResult;
use crate::io::FilePrompt;

/// Paces a batch between groups of items
pub trait Throttle {
    fn pause(&mut self, interval: Duration) -> BoxFuture<'_, ()>;
}

/// Sleeps the current thread for the full interval. Batches using it run on a worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepThrottle;

impl Throttle for SleepThrottle {
    fn pause(&mut self, interval: Duration) -> BoxFuture<'_, ()> {
        async move { std::thread::sleep(interval) }.boxed()
    }
}

/// Never waits; counts the pauses it was asked for
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThrottle {
    pub pauses: usize,
}

impl Throttle for NoThrottle {
    fn pause(&mut self, _interval: Duration) -> BoxFuture<'_, ()> {
        self.pauses += 1;
        futures::future::ready(()).boxed()
    }
}

/// Destination of rendered previews
pub trait PngSink {
    fn write(&mut self, file_name: &str, png: &[u8]) -> EditorResult<()>;
}

/// Writes previews into `<dir>/previews/`
#[derive(Debug, Clone)]
pub struct DirectorySink {
    previews: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: &Path) -> Self {
        Self {
            previews: dir.join("previews"),
        }
    }

    pub fn previews_dir(&self) -> &Path {
        &self.previews
    }
}

impl PngSink for DirectorySink {
    fn write(&mut self, file_name: &str, png: &[u8]) -> EditorResult<()> {
        std::fs::create_dir_all(&self.previews)?;
        std::fs::write(self.previews.join(file_name), png)?;
        Ok(())
    }
}

/// Saves each preview through its own save prompt, one file at a time
pub struct PromptSink<'a> {
    prompt: &'a mut dyn FilePrompt,
}

impl<'a> PromptSink<'a> {
    pub fn new(prompt: &'a mut dyn FilePrompt) -> Self {
        Self { prompt }
    }
}

impl PngSink for PromptSink<'_> {
    fn write(&mut self, file_name: &str, png: &[u8]) -> EditorResult<()> {
        let path = self.prompt.pick_save(file_name)?;
        std::fs::write(path, png)?;
        Ok(())
    }
}

/// One input document of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// File name without the `.json` extension
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} of {} files ({} failed)",
            self.processed, self.total, self.failed
        )
    }
}

/// Every `*.json` file directly inside `dir`, sorted by name
pub fn collect_json_documents(dir: &Path) -> EditorResult<Vec<BatchItem>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("json"))
        })
        .collect();
    paths.sort();
    log::info!("Found {} JSON files in {}", paths.len(), dir.display());
    read_json_documents(&paths)
}

/// Read the given document files, named after their file stems
pub fn read_json_documents(paths: &[PathBuf]) -> EditorResult<Vec<BatchItem>> {
    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = std::fs::read(path)?;
        items.push(BatchItem { name, bytes });
    }
    Ok(items)
}

/// Render every document in `dir` into `<dir>/previews/`
pub async fn export_directory<R, T>(
    dir: &Path,
    catalog: &AssetCatalog,
    exporter: &mut RasterExporter<R>,
    throttle: &mut T,
    settings: BatchSettings,
) -> EditorResult<BatchSummary>
where
    R: SurfaceRenderer,
    T: Throttle,
{
    let items = collect_json_documents(dir)?;
    let mut sink = DirectorySink::new(dir);
    Ok(run(items, catalog, exporter, &mut sink, throttle, settings).await)
}

fn export_item<R: SurfaceRenderer>(
    item: &BatchItem,
    catalog: &AssetCatalog,
    exporter: &mut RasterExporter<R>,
    sink: &mut dyn PngSink,
) -> EditorResult<String> {
    let outcome = import_document(&item.bytes, catalog)?;
    let png = exporter.export_png(&outcome.layers)?;
    let file_name = format!("{}.png", item.name);
    sink.write(&file_name, &png)?;
    Ok(file_name)
}

/// Render each item to a PNG, in groups of `settings.group_size` with a pause in between.
///
/// A failing item is logged and counted; the rest of the batch still runs.
pub async fn run<R, S, T>(
    items: Vec<BatchItem>,
    catalog: &AssetCatalog,
    exporter: &mut RasterExporter<R>,
    sink: &mut S,
    throttle: &mut T,
    settings: BatchSettings,
) -> BatchSummary
where
    R: SurfaceRenderer,
    S: PngSink,
    T: Throttle,
{
    let mut summary = BatchSummary {
        total: items.len(),
        ..BatchSummary::default()
    };
    let group_size = settings.group_size.max(1);
    let group_count = items.len().div_ceil(group_size);

    for (index, group) in items.chunks(group_size).enumerate() {
        for item in group {
            match export_item(item, catalog, exporter, sink) {
                Ok(file_name) => {
                    log::info!("Exported {} to {}", item.name, file_name);
                    summary.processed += 1;
                }
                Err(err) => {
                    log::error!("Failed to process {}: {}", item.name, err);
                    summary.failed += 1;
                }
            }
        }
        if index + 1 < group_count {
            throttle.pause(settings.interval()).await;
        }
    }

    log::info!("Batch export complete: {}", summary);
    summary
}
