//! Stable, key-safe identifiers derived from a document's origin filename.
//!
//! The same filename always yields the same id, so re-uploading a document
//! overwrites its stored result instead of creating a duplicate.

use uuid::Uuid;

/// Characters that are not allowed in storage keys.
const ILLEGAL_KEY_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Returns the final path component, splitting on both `/` and `\`.
pub fn strip_path(filename: &str) -> &str {
    match filename.rfind(|c: char| c == '/' || c == '\\') {
        Some(pos) => &filename[pos + 1..],
        None => filename,
    }
}

/// Removes a trailing `.ext` suffix. A bare trailing dot is not an extension.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) if pos + 1 < name.len() => &name[..pos],
        _ => name,
    }
}

/// Replaces every character that is illegal in storage keys with `_`.
pub fn sanitize_key(name: &str) -> String {
    name.chars()
        .map(|c| if ILLEGAL_KEY_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Derives the document id from its filename.
///
/// - `a/b/report.pdf` → `report`
/// - `weird:name?.txt` → `weird_name_`
/// - `archive.tar.gz` → `archive.tar`
pub fn derive_id(filename: &str) -> String {
    sanitize_key(strip_extension(strip_path(filename)))
}

/// Derives the id from the filename when one is known, falling back to a
/// random UUID otherwise.
///
/// The fallback breaks idempotent reprocessing and is only taken when the
/// document's provenance is unknown (or its name reduces to nothing).
pub fn derive_id_or_random(filename: Option<&str>) -> String {
    match filename.map(derive_id).filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            tracing::warn!(id = %id, "No usable filename, generated random document id");
            id
        }
    }
}

/// Cleans an uploaded filename before it is used as a storage path:
/// illegal key characters and `..` sequences become `_`.
pub fn sanitize_upload_name(name: &str) -> String {
    sanitize_key(name).replace("..", "_")
}

/// The initial envelope kind for a file: its lower-cased final extension,
/// or the whole name when there is no dot.
pub fn file_kind(filename: &str) -> String {
    strip_path(filename)
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}
