//! Utility functions

use crate::error::{AnalyzerError, Result};
use cfg_if::cfg_if;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::UNIX_EPOCH,
};
use walkdir::WalkDir;

/// Extensions the analyzer treats as Pike sources.
pub const PIKE_EXTENSIONS: &[&str] = &["pike", "pmod"];

/// The file the module system looks for inside a `.pmod` directory module.
pub const PMOD_DIR_MODULE_FILE: &str = "module.pmod";

/// A regex that matches a textual class declaration and captures the class
/// name in the named group "name". Used for the workspace sweep when
/// resolving an `inherit` that the module system cannot.
pub static RE_CLASS_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:(?:public|protected|private|static|final|local|optional)\s+)*class\s+(?P<name>\w+)").unwrap()
});

/// Returns an iterator that yields all pike/pmod files under the given root
/// path, or the `root` itself if it is a pike file.
///
/// This also follows symlinks.
pub fn source_files_iter<'a>(
    root: &Path,
    extensions: &'a [&'a str],
) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path().extension().map(|ext| extensions.iter().any(|e| ext == *e)).unwrap_or_default()
        })
        .map(|e| e.path().into())
}

/// Attempts to resolve symlinks and normalize the path.
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    cfg_if! {
        if #[cfg(windows)] {
            let res = dunce::canonicalize(path);
        } else {
            let res = path.canonicalize();
        }
    }
    res.map_err(|err| AnalyzerError::io(err, path))
}

/// Like [`canonicalize`] but returns the input unchanged if it cannot be
/// resolved, e.g. for an open document that was never saved.
pub fn canonicalized(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    canonicalize(&path).unwrap_or(path)
}

/// Returns true if `path` lies within `root`.
pub fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}

/// Returns the path relative to `root`, or the path itself if it is not a
/// child of `root`.
pub fn source_name<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

/// Normalizes a filename before it is handed to the host compiler.
///
/// The host mangles `/C:/...` style paths on Windows, so a leading slash in
/// front of a drive letter is stripped. Separators are unified to `/` the way
/// the host reports them back.
pub fn normalize_compiler_path(path: &Path) -> String {
    use path_slash::PathExt;
    let slashed = path.to_slash_lossy();
    strip_drive_slash(&slashed).to_string()
}

/// Strips the leading `/` from `/C:/...` style paths.
pub fn strip_drive_slash(path: &str) -> &str {
    let rest = match path.strip_prefix('/') {
        Some(rest) => rest,
        None => return path,
    };
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => rest,
        _ => path,
    }
}

/// The dotted module name implied by the `.pmod` directories enclosing
/// `path`, if any.
///
/// `/lib/Protocols.pmod/HTTP.pmod/Client.pike` yields `Protocols.HTTP`; a
/// file outside any `.pmod` directory yields `None`.
pub fn pmod_parent_module(path: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in path.parent()?.components() {
        if let Component::Normal(name) = component {
            let name = name.to_string_lossy();
            match name.strip_suffix(".pmod") {
                Some(module) => segments.push(module.to_string()),
                None => segments.clear(),
            }
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("."))
    }
}

/// Returns true if the file lives inside a `.pmod` directory module.
pub fn in_pmod_dir(path: &Path) -> bool {
    pmod_parent_module(path).is_some()
}

/// The file's last modification time in seconds since the epoch.
pub fn mtime_secs(path: &Path) -> Result<u64> {
    let meta = fs::metadata(path).map_err(|err| AnalyzerError::io(err, path))?;
    let modified = meta.modified().map_err(|err| AnalyzerError::io(err, path))?;
    Ok(modified.duration_since(UNIX_EPOCH).map_err(AnalyzerError::msg)?.as_secs())
}

/// Reads the file's mtime and size in one stat call.
pub fn stat_signature(path: &Path) -> Result<(u64, u64)> {
    let meta = fs::metadata(path).map_err(|err| AnalyzerError::io(err, path))?;
    let modified = meta.modified().map_err(|err| AnalyzerError::io(err, path))?;
    let mtime = modified.duration_since(UNIX_EPOCH).map_err(AnalyzerError::msg)?.as_secs();
    Ok((mtime, meta.len()))
}

/// Strips a trailing `:<line>` suffix the module system appends to program
/// paths, e.g. `Crypto.pmod/RSA.pike:42`.
pub fn strip_line_suffix(path: &str) -> &str {
    match path.rsplit_once(':') {
        Some((head, tail))
            if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) && !head.is_empty() =>
        {
            head
        }
        _ => path,
    }
}

/// Reads the content of the file at `path`.
pub fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| AnalyzerError::io(err, path))
}
