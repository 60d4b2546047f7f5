//! Extract attachments from parsed messages.

use std::path::{Path, PathBuf};

use crate::model::attachment::Attachment;
use crate::model::message::Message;

/// Longest file name written for an attachment.
const MAX_FILENAME_LEN: usize = 150;

/// Write a single decoded attachment into `output_dir`.
///
/// The file name is sanitized and never overwrites an existing file.
pub fn export_attachment(attachment: &Attachment, output_dir: &Path) -> anyhow::Result<PathBuf> {
    let filename = sanitize_filename_part(&attachment.filename, MAX_FILENAME_LEN);
    let path = unique_path(&output_dir.join(&filename));
    std::fs::write(&path, &attachment.data)?;
    tracing::debug!(
        path = %path.display(),
        size = attachment.size(),
        "Wrote attachment"
    );
    Ok(path)
}

/// Write every attachment of `message`, creating `output_dir` if needed.
///
/// A failing attachment is logged and skipped; the paths written are returned.
pub fn export_attachments(message: &Message, output_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if message.attachments.is_empty() {
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(output_dir)?;

    let mut paths = Vec::with_capacity(message.attachments.len());
    for att in &message.attachments {
        match export_attachment(att, output_dir) {
            Ok(path) => paths.push(path),
            Err(e) => {
                tracing::warn!(
                    filename = %att.filename,
                    error = %e,
                    "Failed to export attachment"
                );
            }
        }
    }
    Ok(paths)
}

/// Replace anything but alphanumerics and `- . _ @` with `_`.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    // "." and ".." would escape or alias the directory
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    for i in 1..1000 {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
    }

    parent.join(format!("{stem}_dup.{ext}"))
}
