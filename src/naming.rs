// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Key and name helpers shared by upload, multipart and reconciliation.

use crate::error::{TreeError, TreeResult};
use uuid::Uuid;

/// Content type given to zero-length folder marker objects.
pub const FOLDER_CONTENT_TYPE: &str = "application/x-directory";

const SUFFIX_LEN: usize = 8;

/// `.` and `..` would turn into relative key segments the store refuses.
fn reject_dot_segment(name: &str) -> TreeResult<()> {
    if name == "." || name == ".." {
        return Err(TreeError::InvalidArgument(format!(
            "{name:?} is not a valid name"
        )));
    }
    Ok(())
}

pub fn validate_folder_name(name: &str) -> TreeResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TreeError::Conflict("folder name cannot be empty".into()));
    }
    if name.contains('/') {
        return Err(TreeError::InvalidArgument(format!(
            "folder name cannot contain '/': {name}"
        )));
    }
    reject_dot_segment(name)?;
    Ok(name.to_string())
}

pub fn validate_file_name(name: &str) -> TreeResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TreeError::InvalidArgument("file name cannot be empty".into()));
    }
    if name.contains('/') {
        return Err(TreeError::InvalidArgument(format!(
            "file name cannot contain '/': {name}"
        )));
    }
    reject_dot_segment(name)?;
    Ok(name.to_string())
}

/// Split `name` into stem and extension. Dotfiles like `.env` have no extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// A fresh opaque token that keeps the extension of `name`.
pub fn unique_token(name: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    match split_extension(name).1 {
        Some(ext) => format!("{token}.{ext}"),
        None => token,
    }
}

/// `report.pdf` -> `report-1a2b3c4d.pdf`
pub fn disambiguate(name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..SUFFIX_LEN];
    match split_extension(name) {
        (stem, Some(ext)) => format!("{stem}-{suffix}.{ext}"),
        (stem, None) => format!("{stem}-{suffix}"),
    }
}

/// Best-effort content type from the extension of `name`.
pub fn content_type_for(name: &str) -> String {
    let ext = match split_extension(name).1 {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return mime::APPLICATION_OCTET_STREAM.to_string(),
    };
    let guessed = match ext.as_str() {
        "txt" | "log" | "md" => mime::TEXT_PLAIN,
        "csv" => mime::TEXT_CSV,
        "html" | "htm" => mime::TEXT_HTML,
        "css" => mime::TEXT_CSS,
        "js" | "mjs" => mime::TEXT_JAVASCRIPT,
        "xml" => mime::TEXT_XML,
        "json" => mime::APPLICATION_JSON,
        "pdf" => mime::APPLICATION_PDF,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        _ => mime::APPLICATION_OCTET_STREAM,
    };
    guessed.to_string()
}

/// Key of `segment` under the folder key `parent_path` (`None` for the bucket root).
pub fn join_key(parent_path: Option<&str>, segment: &str) -> String {
    match parent_path {
        Some(parent) if !parent.is_empty() => format!("{}/{}", parent.trim_end_matches('/'), segment),
        _ => segment.to_string(),
    }
}

/// Last non-empty segment of `key`, ignoring a trailing slash.
pub fn last_segment(key: &str) -> Option<&str> {
    key.split('/').filter(|s| !s.is_empty()).next_back()
}

/// Key of the folder that would contain `key`: `a/b/c.txt` -> `a/b/`, `a/b/` -> `a/`.
pub fn parent_key(key: &str) -> Option<String> {
    let trimmed = key.trim_end_matches('/');
    trimmed
        .rfind('/')
        .map(|idx| trimmed[..=idx].to_string())
        .filter(|parent| parent != "/")
}
