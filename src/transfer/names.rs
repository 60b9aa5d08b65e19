//! File-name handling: client path stripping, length limits, staging names.

use std::path::{Path, PathBuf};

/// Marker prepended to a target's file name while it is being uploaded.
pub const STAGING_PREFIX: &str = "$";

/// Last path component of a client-supplied path, for either separator style.
pub fn base_name(client_path: &str) -> &str {
    client_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(client_path)
}

/// True for names that must never reach the filesystem.
pub fn is_unusable(name: &str) -> bool {
    name.is_empty() || name == "." || name == ".." || name.contains('\0')
}

/// Shorten `name` to at most `max_len` bytes, keeping the extension when it fits.
/// Cuts only on character boundaries.
pub fn ensure_maximum_size(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }

    let extension = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[dot..],
        _ => "",
    };
    if extension.len() >= max_len {
        return truncate_bytes(name, max_len).to_string();
    }

    let stem = &name[..name.len() - extension.len()];
    format!(
        "{}{extension}",
        truncate_bytes(stem, max_len - extension.len())
    )
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Split a free-form recipient list on commas, semicolons and whitespace.
pub fn tokenize_recipients(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn content_type_for(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// `<dir>/$<name>` for a target `<dir>/<name>`.
pub fn staging_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed");
    target.with_file_name(format!("{STAGING_PREFIX}{name}"))
}

/// `target` itself for `counter == 0`, otherwise `<stem> (<counter>)<extensions>`
/// in the same directory.
pub fn numbered_sibling(target: &Path, counter: u32) -> PathBuf {
    if counter == 0 {
        return target.to_path_buf();
    }

    let filename = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed");

    let (stem, extensions) = match filename.find('.') {
        Some(dot_pos) if dot_pos > 0 => filename.split_at(dot_pos),
        _ => (filename, ""),
    };

    target.with_file_name(format!("{stem} ({counter}){extensions}"))
}
