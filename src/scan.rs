//! Corpus scanner: decides which files a batch index run visits.
//!
//! Walks a root directory with `walkdir`, keeping files whose path relative
//! to the root matches an include glob and no exclude glob. `.git`
//! directories are always skipped. Output is sorted for deterministic runs.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CorpusConfig;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**"];

/// Scan the configured corpus root.
pub fn scan_corpus(corpus: &CorpusConfig) -> Result<Vec<PathBuf>> {
    if !corpus.root.exists() {
        bail!("Corpus root does not exist: {}", corpus.root.display());
    }
    scan_dir(
        &corpus.root,
        &corpus.include_globs,
        &corpus.exclude_globs,
        corpus.follow_symlinks,
    )
}

fn scan_dir(
    root: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
    follow_symlinks: bool,
) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(include_globs)?;

    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut paths = Vec::new();

    for entry in WalkDir::new(root).follow_links(follow_symlinks) {
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

        paths.push(path.to_path_buf());
    }

    paths.sort();
    Ok(paths)
}

/// Expand explicit CLI paths: files pass through, directories are walked
/// with the corpus globs (or `**/*.md` when no corpus is configured).
pub fn expand_paths(inputs: &[PathBuf], corpus: Option<&CorpusConfig>) -> Result<Vec<PathBuf>> {
    let default_include = vec!["**/*.md".to_string()];
    let (include, exclude, follow) = match corpus {
        Some(c) => (&c.include_globs, c.exclude_globs.as_slice(), c.follow_symlinks),
        None => (&default_include, &[][..], false),
    };

    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            paths.extend(scan_dir(input, include, exclude, follow)?);
        } else {
            paths.push(input.clone());
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus(root: &Path) -> CorpusConfig {
        CorpusConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: vec!["**/drafts/**".to_string()],
            follow_symlinks: false,
        }
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "memory.md");
        touch(root, "daily/2026-01-02.md");
        touch(root, "daily/2026-01-01.md");
        touch(root, "drafts/wip.md");
        touch(root, ".git/HEAD.md");
        touch(root, "notes.txt");

        let found = scan_corpus(&corpus(root)).unwrap();
        let rel: Vec<String> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            rel,
            vec!["daily/2026-01-01.md", "daily/2026-01-02.md", "memory.md"]
        );
    }

    #[test]
    fn test_missing_root_errors() {
        assert!(scan_corpus(&corpus(Path::new("/no/such/root"))).is_err());
    }

    #[test]
    fn test_expand_paths_mixes_files_and_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "topics/rust.md");
        touch(root, "topics/skip.txt");
        touch(root, "single.txt");

        let expanded =
            expand_paths(&[root.join("topics"), root.join("single.txt")], None).unwrap();
        assert_eq!(expanded.len(), 2);
        assert!(expanded.iter().any(|p| p.ends_with("topics/rust.md")));
        assert!(expanded.iter().any(|p| p.ends_with("single.txt")));
    }
}
