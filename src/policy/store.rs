//! Load path: directory scan → parse → identifier assignment → conflict check.
//!
//! [`DirectoryStore`] is the production [`PolicySource`]. Each supported file becomes one
//! [`Policy`]. Files are visited in filename order so load order is stable across runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::policy::types::{LoadWarning, Policy};

/// File extensions recognized as policy documents (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "json"];

/// Something that can produce the full set of policies in one pass.
///
/// Loading is blocking file I/O; the repository runs it on the blocking pool.
pub trait PolicySource: Send + Sync {
    fn load(&self) -> Result<LoadReport>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub policies: Vec<Policy>,
    /// Files skipped in non-strict mode.
    pub warnings: Vec<LoadWarning>,
}

/// Loads one policy per file from a single directory (non-recursive).
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    strict: bool,
}

/// Structured `.json` policy document.
#[derive(Deserialize)]
struct PolicyDocument {
    id: Option<String>,
    title: Option<String>,
    #[serde(alias = "text")]
    body: Option<String>,
}

impl DirectoryStore {
    /// `strict` aborts the load on the first bad file instead of skipping it.
    pub fn new(root: impl Into<PathBuf>, strict: bool) -> Self {
        Self {
            root: root.into(),
            strict,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidate_paths(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| Error::load(&self.root, format!("cannot read directory: {e}")))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| Error::load(&self.root, format!("cannot list directory: {e}")))?;
            let path = entry.path();
            if is_candidate(&path) {
                paths.push(path);
            } else {
                debug!(path = %path.display(), "ignoring non-policy entry");
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl PolicySource for DirectoryStore {
    fn load(&self) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for path in self.candidate_paths()? {
            let policy = match parse_file(&path) {
                Ok(policy) => policy,
                Err(reason) if self.strict => return Err(Error::load(&path, reason)),
                Err(reason) => {
                    warn!(path = %path.display(), reason = %reason, "skipping policy file");
                    report.warnings.push(LoadWarning { path, reason });
                    continue;
                }
            };

            if let Some(first) = seen.get(&policy.id) {
                return Err(Error::Conflict {
                    id: policy.id,
                    first: first.clone(),
                    second: path,
                });
            }
            seen.insert(policy.id.clone(), path);
            report.policies.push(policy);
        }

        if report.policies.is_empty() {
            return Err(Error::load(
                &self.root,
                format!(
                    "no valid policy documents ({} file(s) skipped)",
                    report.warnings.len()
                ),
            ));
        }

        info!(
            root = %self.root.display(),
            policies = report.policies.len(),
            skipped = report.warnings.len(),
            "policies loaded"
        );
        Ok(report)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

fn is_candidate(path: &Path) -> bool {
    // Lossy so a non-UTF-8 name still reaches `parse_file` and is reported there.
    let hidden = path
        .file_name()
        .map_or(true, |n| n.to_string_lossy().starts_with('.'));
    !hidden && path.is_file() && extension(path).is_some()
}

/// Lowercased extension, if it is one we parse.
fn extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Parse one file. Errors are reasons, attached to the path by the caller.
fn parse_file(path: &Path) -> Result<Policy, String> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read file: {e}"))?;
    let text = String::from_utf8(bytes).map_err(|_| "file is not valid UTF-8".to_string())?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| "file name is not valid UTF-8".to_string())?;

    let mut policy = match extension(path).as_deref() {
        Some("json") => parse_json(&text, stem, path)?,
        _ => parse_text(&text, stem, path)?,
    };

    policy.modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    Ok(policy)
}

/// Plain text / markdown: title is the first non-empty line, minus any heading marks.
fn parse_text(text: &str, stem: &str, path: &Path) -> Result<Policy, String> {
    let body = text.trim();
    if body.is_empty() {
        return Err("document is empty".into());
    }
    let id = normalize_id(stem)?;
    let title = title_from(body).unwrap_or_else(|| stem.to_string());
    Ok(Policy::new(id, title, body, path))
}

fn parse_json(text: &str, stem: &str, path: &Path) -> Result<Policy, String> {
    let doc: PolicyDocument =
        serde_json::from_str(text).map_err(|e| format!("invalid JSON policy: {e}"))?;

    let body = doc
        .body
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| "JSON policy has no \"body\" or \"text\"".to_string())?;

    let id = match doc.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => normalize_id(stem)?,
    };
    let title = doc
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| title_from(&body))
        .unwrap_or_else(|| stem.to_string());

    Ok(Policy::new(id, title, body, path))
}

fn title_from(body: &str) -> Option<String> {
    body.lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Lowercase, ASCII alphanumerics kept, every other run of characters becomes one `-`.
pub fn normalize_id(stem: &str) -> Result<String, String> {
    let mut id = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }
    let id = id.trim_matches('-').to_string();
    if id.is_empty() {
        return Err(format!("cannot derive a policy id from file name \"{stem}\""));
    }
    Ok(id)
}
