//! Template Engine (spec §4.4): renders the embedded template tree into
//! files under a project's working copy. Templates are compiled into the
//! binary via `rust_embed`; there is no user-supplied template loading.

use crate::core::error::EggError;
use rust_embed::RustEmbed;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tera::Tera;

#[derive(RustEmbed)]
#[folder = "src/templates/embedded/"]
struct Assets;

/// Outcome of a single file write, mirroring the idempotent re-run contract:
/// unchanged content is a no-op, new content without `force` is a hard error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileAction {
    Created,
    Unchanged,
    Preserved,
}

pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new() -> Result<Self, EggError> {
        let mut tera = Tera::default();
        let mut raw = Vec::new();
        for path in Assets::iter() {
            let path_str = path.as_ref();
            let file = Assets::get(path_str)
                .unwrap_or_else(|| panic!("embedded asset listed by iter() missing: {path_str}"));
            let contents = std::str::from_utf8(file.data.as_ref())
                .map_err(|e| EggError::TemplateUnresolved(format!("{path_str}: not utf-8: {e}")))?
                .to_string();
            raw.push((path_str.to_string(), contents));
        }
        tera.add_raw_templates(raw)
            .map_err(|e| EggError::TemplateUnresolved(tera_error_chain(&e)))?;
        Ok(TemplateEngine { tera })
    }

    /// Renders `template_id` (its embedded path, e.g. `project_init/gitignore.tera`)
    /// with `ctx`. Missing variables are a fatal `TemplateUnresolved`, never a
    /// silently empty substitution.
    pub fn render(&self, template_id: &str, ctx: &tera::Context) -> Result<String, EggError> {
        self.tera
            .render(template_id, ctx)
            .map_err(|e| EggError::TemplateUnresolved(tera_error_chain(&e)))
    }

    /// Renders and writes `template_id` to `destination`, relative to nothing
    /// in particular — callers pass an absolute or repo-rooted path.
    pub fn write_file(
        &self,
        template_id: &str,
        destination: &Path,
        ctx: &tera::Context,
        force: bool,
    ) -> Result<FileAction, EggError> {
        let rendered = self.render(template_id, ctx)?;
        write_rendered(destination, rendered.as_bytes(), force)
    }
}

fn tera_error_chain(err: &tera::Error) -> String {
    let mut msg = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Scripts and Dockerfile entry helpers are written executable (0755);
/// everything else is 0644 (spec §4.4).
fn is_executable_destination(destination: &Path) -> bool {
    match destination.extension().and_then(|e| e.to_str()) {
        Some("sh") => true,
        _ => destination
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("Dockerfile"))
            .unwrap_or(false),
    }
}

/// Writes `bytes` to `destination`. If the destination already exists with
/// byte-identical content the write is skipped (`Unchanged`). If it exists
/// with different content and `force` is false, fails with `FileExists`.
/// The write itself is atomic: content lands in a sibling `*.tmp_write` file
/// that is renamed over the destination only once fully written.
pub fn write_rendered(destination: &Path, bytes: &[u8], force: bool) -> Result<FileAction, EggError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    if destination.exists() {
        let existing = fs::read(destination)?;
        if sha256_hex(&existing) == sha256_hex(bytes) {
            return Ok(FileAction::Unchanged);
        }
        if !force {
            return Err(EggError::FileExists(destination.display().to_string()));
        }
    }

    let mut tmp_name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp_write");
    let tmp_path = destination.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes)?;
    set_mode(&tmp_path, is_executable_destination(destination))?;
    fs::rename(&tmp_path, destination)?;
    Ok(FileAction::Created)
}

/// Writes `bytes` to `destination` only if it does not already exist.
/// Used for chart/compose files an operator may have hand-edited: rather
/// than erroring on conflict, the existing file is left untouched and
/// reported as `Preserved` (spec §4.8's prompt-on-conflict resolved as
/// never clobbering operator-authored files outside the generated set).
pub fn write_preserving(destination: &Path, bytes: &[u8]) -> Result<FileAction, EggError> {
    if destination.exists() {
        return Ok(FileAction::Preserved);
    }
    write_rendered(destination, bytes, false)
}

#[cfg(unix)]
fn set_mode(path: &Path, executable: bool) -> Result<(), EggError> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if executable { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _executable: bool) -> Result<(), EggError> {
    Ok(())
}
