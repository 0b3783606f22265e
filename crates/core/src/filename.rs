//! Pure helpers that turn a detected title into a target file name.

use thiserror::Error;

/// Characters that are removed from a title before it becomes a file name.
pub const RESERVED_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

pub const PDF_EXTENSION: &str = ".pdf";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilenameError {
    #[error("title is empty after removing reserved characters")]
    Empty,
}

/// What should happen to a file once its title is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenamePlan {
    /// The file already carries the target name (ignoring case).
    AlreadyNamed,
    /// Rename the file to `to`.
    Rename { to: String },
}

/// Strip reserved characters and surrounding whitespace.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !RESERVED_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Build `<sanitized title>.pdf`.
pub fn target_file_name(title: &str) -> Result<String, FilenameError> {
    let clean = sanitize_title(title);
    if clean.is_empty() {
        return Err(FilenameError::Empty);
    }
    Ok(format!("{clean}{PDF_EXTENSION}"))
}

/// Case-insensitive `.pdf` suffix check.
pub fn is_pdf_file_name(name: &str) -> bool {
    name.to_lowercase().ends_with(PDF_EXTENSION)
}

/// Decide whether `current` needs renaming to match `title`.
///
/// Whether the target already exists on disk is left to the caller.
pub fn plan_rename(current: &str, title: &str) -> Result<RenamePlan, FilenameError> {
    let to = target_file_name(title)?;

    if to.to_lowercase() == current.to_lowercase() {
        Ok(RenamePlan::AlreadyNamed)
    } else {
        Ok(RenamePlan::Rename { to })
    }
}
