use std::path::PathBuf;

use crate::error::{EditorError, EditorResult};

/// Open, save and directory pickers.
///
/// A dismissed picker returns [`EditorError::UserCancelled`]; callers end the operation
/// quietly with no side effects.
pub trait FilePrompt {
    /// Pick an existing file with the given extension
    fn pick_open(&mut self, extension: &str) -> EditorResult<PathBuf>;

    /// Pick a destination, starting from `suggested_name`
    fn pick_save(&mut self, suggested_name: &str) -> EditorResult<PathBuf>;

    fn pick_directory(&mut self) -> EditorResult<PathBuf>;

    /// Pick one or more existing files with the given extension
    fn pick_files(&mut self, extension: &str) -> EditorResult<Vec<PathBuf>>;
}

/// Answers every prompt with preset paths. An unset answer counts as a dismissal.
#[derive(Debug, Clone, Default)]
pub struct FixedPrompt {
    pub open: Option<PathBuf>,
    /// Save prompts resolve to `<save_dir>/<suggested name>`
    pub save_dir: Option<PathBuf>,
    pub directory: Option<PathBuf>,
    /// Multi-file picks; empty counts as a dismissal
    pub files: Vec<PathBuf>,
}

impl FixedPrompt {
    /// A prompt the user always dismisses
    pub fn cancelled() -> Self {
        Self::default()
    }

    pub fn with_open(mut self, path: impl Into<PathBuf>) -> Self {
        self.open = Some(path.into());
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    pub fn with_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }
}

impl FilePrompt for FixedPrompt {
    fn pick_open(&mut self, extension: &str) -> EditorResult<PathBuf> {
        let path = self.open.clone().ok_or(EditorError::UserCancelled)?;
        let matches = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
        if !matches {
            log::warn!("{} is not a .{} file", path.display(), extension);
        }
        Ok(path)
    }

    fn pick_save(&mut self, suggested_name: &str) -> EditorResult<PathBuf> {
        let dir = self.save_dir.as_ref().ok_or(EditorError::UserCancelled)?;
        Ok(dir.join(suggested_name))
    }

    fn pick_directory(&mut self) -> EditorResult<PathBuf> {
        self.directory.clone().ok_or(EditorError::UserCancelled)
    }

    fn pick_files(&mut self, extension: &str) -> EditorResult<Vec<PathBuf>> {
        if self.files.is_empty() {
            return Err(EditorError::UserCancelled);
        }
        let (matching, skipped): (Vec<PathBuf>, Vec<PathBuf>) = self.files.iter().cloned().partition(|path| {
            path.extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        });
        for path in skipped {
            log::warn!("Skipping {}: not a .{} file", path.display(), extension);
        }
        Ok(matching)
    }
}
