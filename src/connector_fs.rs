//! Filesystem connector: walks the configured document root and turns
//! parish files (markdown, plain text, PDF) into [`SourceItem`]s.

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::extract;
use crate::models::SourceItem;

pub fn scan_filesystem(config: &Config) -> Result<Vec<SourceItem>> {
    let fs_config = config
        .connectors
        .filesystem
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Filesystem connector not configured"))?;

    let root = &fs_config.root;
    if !root.exists() {
        bail!(
            "Filesystem connector root does not exist: {}",
            root.display()
        );
    }

    let include_set = build_globset(&fs_config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
    default_excludes.extend(fs_config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut items = Vec::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root).follow_links(fs_config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match file_to_source_item(path, &rel_str) {
            Ok(item) => items.push(item),
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", rel_str, e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        eprintln!("Warning: {} file(s) skipped during scan", skipped);
    }

    // Sort for deterministic ordering
    items.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    Ok(items)
}

fn file_to_source_item(path: &Path, relative_path: &str) -> Result<SourceItem> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let content_type = extract::content_type_for_extension(&ext)
        .ok_or_else(|| anyhow::anyhow!("unsupported file extension: .{}", ext))?;

    let metadata = std::fs::metadata(path)?;
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let modified_secs = modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let bytes = std::fs::read(path)?;
    let body = extract::extract_text(&bytes, content_type)?;

    let title = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(SourceItem {
        source: "filesystem".to_string(),
        source_id: relative_path.to_string(),
        source_url: Some(format!("file://{}", path.display())),
        title: Some(title),
        created_at: Utc.timestamp_opt(modified_secs, 0).unwrap(),
        updated_at: Utc.timestamp_opt(modified_secs, 0).unwrap(),
        content_type: content_type.to_string(),
        body,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
