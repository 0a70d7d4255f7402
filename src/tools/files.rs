//! File tools scoped to the sandbox. Paths are virtual: `/` is the sandbox root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::{arg_str, arg_u64, require_str, Tool};
use crate::sandbox::Sandbox;

const DEFAULT_READ_LIMIT: u64 = 2000;
const MAX_LINE_CHARS: usize = 2000;
const MAX_GLOB_RESULTS: usize = 500;
const MAX_GREP_MATCHES: usize = 100;
/// Files larger than this are skipped by grep.
const MAX_GREP_FILE_BYTES: u64 = 5 * 1024 * 1024;

fn bool_arg(args: &Value, key: &str) -> bool {
    match &args[key] {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

/// List a directory.
pub struct ListDir;

#[async_trait]
impl Tool for ListDir {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List files and directories in a sandbox directory. Directories end with '/'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: /)"
                }
            }
        })
    }

    async fn execute(&self, args: Value, sandbox: &Sandbox) -> anyhow::Result<String> {
        let path = arg_str(&args, "path").unwrap_or("/");
        let dir = sandbox.resolve(path)?;
        if !dir.is_dir() {
            anyhow::bail!("Directory not found: {}", path);
        }

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let mut shown = sandbox.to_virtual(&entry.path());
            if entry.file_type().await?.is_dir() {
                shown.push('/');
            }
            entries.push(shown);
        }
        entries.sort();

        if entries.is_empty() {
            Ok(format!("{} is empty", sandbox.to_virtual(&dir)))
        } else {
            Ok(entries.join("\n"))
        }
    }
}

/// Read a file with line numbers.
pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from the sandbox. Returns numbered lines; use offset and limit to page through long files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "File to read"},
                "offset": {"type": "integer", "description": "Line to start from, 0-based (default: 0)"},
                "limit": {"type": "integer", "description": "Maximum number of lines (default: 2000)"}
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: Value, sandbox: &Sandbox) -> anyhow::Result<String> {
        let file_path = require_str(&args, "file_path")?;
        let offset = arg_u64(&args, "offset").unwrap_or(0) as usize;
        let limit = arg_u64(&args, "limit").unwrap_or(DEFAULT_READ_LIMIT) as usize;

        let path = existing_file(sandbox, file_path)?;
        let bytes = tokio::fs::read(&path).await?;
        let content = String::from_utf8_lossy(&bytes);
        if content.trim().is_empty() {
            return Ok(format!("{} exists but is empty", file_path));
        }

        let total = content.lines().count();
        if offset >= total {
            anyhow::bail!("Line offset {} exceeds file length ({} lines)", offset, total);
        }
        Ok(number_lines(&content, offset, limit))
    }
}

/// `cat -n` style, long lines cut.
fn number_lines(content: &str, offset: usize, limit: usize) -> String {
    content
        .lines()
        .enumerate()
        .skip(offset)
        .take(limit)
        .map(|(i, line)| {
            let line: String = line.chars().take(MAX_LINE_CHARS).collect();
            format!("{:>6}\t{}", i + 1, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Create a new file.
pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create a new file in the sandbox. Fails if the file already exists; use edit_file to change existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "File to create"},
                "content": {"type": "string", "description": "File contents"}
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, args: Value, sandbox: &Sandbox) -> anyhow::Result<String> {
        let file_path = require_str(&args, "file_path")?;
        let content = require_str(&args, "content")?;

        let path = sandbox.resolve(file_path)?;
        if path == sandbox.root() {
            anyhow::bail!("'{}' is not a file path", file_path);
        }
        if path.exists() {
            anyhow::bail!(
                "Cannot write to {} because it already exists. Read and then edit it instead.",
                file_path
            );
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        tracing::info!(path = %sandbox.to_virtual(&path), bytes = content.len(), "write_file");
        Ok(format!("Created file {}", sandbox.to_virtual(&path)))
    }
}

/// Exact string replacement in a file.
pub struct EditFile;

#[async_trait]
impl Tool for EditFile {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a sandbox file. old_string must match exactly once unless replace_all is true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "File to edit"},
                "old_string": {"type": "string", "description": "Text to replace"},
                "new_string": {"type": "string", "description": "Replacement text"},
                "replace_all": {"type": "boolean", "description": "Replace every occurrence (default: false)"}
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: Value, sandbox: &Sandbox) -> anyhow::Result<String> {
        let file_path = require_str(&args, "file_path")?;
        let old_string = require_str(&args, "old_string")?;
        let new_string = require_str(&args, "new_string")?;
        let replace_all = bool_arg(&args, "replace_all");

        if old_string.is_empty() {
            anyhow::bail!("'old_string' must not be empty");
        }
        if old_string == new_string {
            anyhow::bail!("'old_string' and 'new_string' are identical");
        }

        let path = existing_file(sandbox, file_path)?;
        let content = tokio::fs::read_to_string(&path).await?;
        let (updated, count) = replace_text(&content, old_string, new_string, replace_all)?;
        tokio::fs::write(&path, updated).await?;

        tracing::info!(path = %file_path, count, "edit_file");
        Ok(format!(
            "Replaced {} occurrence{} in {}",
            count,
            if count == 1 { "" } else { "s" },
            sandbox.to_virtual(&path)
        ))
    }
}

fn replace_text(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> anyhow::Result<(String, usize)> {
    let count = content.matches(old).count();
    match count {
        0 => anyhow::bail!("String not found in file: '{}'", old),
        1 => Ok((content.replacen(old, new, 1), 1)),
        n if replace_all => Ok((content.replace(old, new), n)),
        n => anyhow::bail!(
            "String '{}' appears {} times in the file. Use replace_all=true or include more surrounding context.",
            old,
            n
        ),
    }
}

/// Find files by glob pattern.
pub struct GlobFiles;

#[async_trait]
impl Tool for GlobFiles {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find sandbox files matching a glob pattern such as '**/*.md' or 'notes/*.txt'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern"},
                "path": {"type": "string", "description": "Directory to search from (default: /)"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, sandbox: &Sandbox) -> anyhow::Result<String> {
        let pattern = require_str(&args, "pattern")?.trim();
        let base = sandbox.resolve(arg_str(&args, "path").unwrap_or("/"))?;
        if pattern.split('/').any(|part| part == "..") {
            anyhow::bail!("Glob pattern must not contain '..'");
        }

        let full = base.join(pattern.trim_start_matches('/'));
        let full = full
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Path is not valid UTF-8"))?
            .to_string();
        let root = sandbox.root().to_path_buf();

        let matches = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<PathBuf>> {
            let mut found = Vec::new();
            for entry in glob::glob(&full)? {
                let Ok(path) = entry else { continue };
                if path.is_file() && inside(&root, &path) {
                    found.push(path);
                }
            }
            Ok(found)
        })
        .await??;

        if matches.is_empty() {
            return Ok(format!("No files matching '{}'", pattern));
        }
        let mut listed: Vec<String> = matches.iter().map(|p| sandbox.to_virtual(p)).collect();
        listed.sort();
        let total = listed.len();
        listed.truncate(MAX_GLOB_RESULTS);
        let mut out = listed.join("\n");
        if total > MAX_GLOB_RESULTS {
            out.push_str(&format!("\n\n... ({} more)", total - MAX_GLOB_RESULTS));
        }
        Ok(out)
    }
}

/// Search file contents with a regex.
pub struct GrepFiles;

#[async_trait]
impl Tool for GrepFiles {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search sandbox file contents with a regular expression. Returns matching lines as path:line: text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regex pattern to search for"},
                "path": {"type": "string", "description": "Directory or file to search (default: /)"},
                "glob": {"type": "string", "description": "Only search files whose name matches this glob, e.g. '*.md'"},
                "case_sensitive": {"type": "boolean", "description": "Case-sensitive match (default: false)"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, sandbox: &Sandbox) -> anyhow::Result<String> {
        let pattern = require_str(&args, "pattern")?;
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!bool_arg(&args, "case_sensitive"))
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?;
        let file_filter = arg_str(&args, "glob")
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Invalid glob: {}", e))?;
        let base = sandbox.resolve(arg_str(&args, "path").unwrap_or("/"))?;
        if !base.exists() {
            anyhow::bail!("Path not found: {}", sandbox.to_virtual(&base));
        }

        // Symlinks are not followed, so every hit stays under the sandbox root.
        let hits = tokio::task::spawn_blocking(move || {
            let mut hits = Vec::new();
            let files = WalkDir::new(&base)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file());
            for entry in files {
                let name = entry.file_name().to_string_lossy();
                if file_filter.as_ref().is_some_and(|p| !p.matches(&name)) {
                    continue;
                }
                if entry.metadata().map(|m| m.len() > MAX_GREP_FILE_BYTES).unwrap_or(true) {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                for (i, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        hits.push((entry.path().to_path_buf(), i + 1, line.trim_end().to_string()));
                        if hits.len() > MAX_GREP_MATCHES {
                            return hits;
                        }
                    }
                }
            }
            hits
        })
        .await?;

        if hits.is_empty() {
            return Ok(format!("No matches found for pattern: {}", pattern));
        }
        let truncated = hits.len() > MAX_GREP_MATCHES;
        let mut out = hits
            .iter()
            .take(MAX_GREP_MATCHES)
            .map(|(path, line, text)| {
                let text: String = text.chars().take(MAX_LINE_CHARS).collect();
                format!("{}:{}: {}", sandbox.to_virtual(path), line, text)
            })
            .collect::<Vec<_>>()
            .join("\n");
        if truncated {
            out.push_str(&format!("\n\n... (showing first {} matches)", MAX_GREP_MATCHES));
        }
        Ok(out)
    }
}

fn existing_file(sandbox: &Sandbox, file_path: &str) -> anyhow::Result<PathBuf> {
    let path = sandbox.resolve(file_path)?;
    if !path.is_file() {
        anyhow::bail!("File not found: {}", file_path);
    }
    Ok(path)
}

fn inside(root: &Path, path: &Path) -> bool {
    path.canonicalize().map(|p| p.starts_with(root)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::open(dir.path()).unwrap();
        (dir, sandbox)
    }

    async fn write(sandbox: &Sandbox, path: &str, content: &str) {
        WriteFile
            .execute(json!({"file_path": path, "content": content}), sandbox)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn write_then_read_with_paging() {
        let (_dir, sandbox) = sandbox();
        write(&sandbox, "/notes/a.md", "one\ntwo\nthree\n").await;

        let out = ReadFile
            .execute(json!({"file_path": "/notes/a.md"}), &sandbox)
            .await
            .unwrap();
        assert_eq!(out, "     1\tone\n     2\ttwo\n     3\tthree");

        let out = ReadFile
            .execute(json!({"file_path": "notes/a.md", "offset": 1, "limit": 1}), &sandbox)
            .await
            .unwrap();
        assert_eq!(out, "     2\ttwo");

        let err = ReadFile
            .execute(json!({"file_path": "/notes/a.md", "offset": 10}), &sandbox)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds file length"));
    }

    #[tokio::test]
    async fn write_refuses_to_overwrite_and_escape() {
        let (_dir, sandbox) = sandbox();
        write(&sandbox, "/a.txt", "x").await;

        let err = WriteFile
            .execute(json!({"file_path": "/a.txt", "content": "y"}), &sandbox)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let err = WriteFile
            .execute(json!({"file_path": "/../escape.txt", "content": "y"}), &sandbox)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("escapes the sandbox"));
    }

    #[tokio::test]
    async fn edit_requires_unique_match() {
        let (_dir, sandbox) = sandbox();
        write(&sandbox, "/r.md", "cat cat dog").await;

        let err = EditFile
            .execute(
                json!({"file_path": "/r.md", "old_string": "cat", "new_string": "cow"}),
                &sandbox,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("appears 2 times"));

        let out = EditFile
            .execute(
                json!({"file_path": "/r.md", "old_string": "cat", "new_string": "cow", "replace_all": true}),
                &sandbox,
            )
            .await
            .unwrap();
        assert_eq!(out, "Replaced 2 occurrences in /r.md");

        let err = EditFile
            .execute(
                json!({"file_path": "/r.md", "old_string": "bird", "new_string": "x"}),
                &sandbox,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert_eq!(
            std::fs::read_to_string(sandbox.root().join("r.md")).unwrap(),
            "cow cow dog"
        );
    }

    #[tokio::test]
    async fn ls_glob_and_grep() {
        let (_dir, sandbox) = sandbox();
        write(&sandbox, "/report.md", "# Overview\nRust is fast\n").await;
        write(&sandbox, "/data/notes.txt", "rust async\nnothing\n").await;

        let out = ListDir.execute(json!({}), &sandbox).await.unwrap();
        assert_eq!(out, "/data/\n/report.md");

        let out = GlobFiles
            .execute(json!({"pattern": "**/*.txt"}), &sandbox)
            .await
            .unwrap();
        assert_eq!(out, "/data/notes.txt");
        assert!(GlobFiles
            .execute(json!({"pattern": "../*"}), &sandbox)
            .await
            .is_err());

        let out = GrepFiles
            .execute(json!({"pattern": "rust"}), &sandbox)
            .await
            .unwrap();
        assert_eq!(out, "/data/notes.txt:1: rust async\n/report.md:2: Rust is fast");

        let out = GrepFiles
            .execute(json!({"pattern": "rust", "glob": "*.md", "case_sensitive": true}), &sandbox)
            .await
            .unwrap();
        assert_eq!(out, "No matches found for pattern: rust");
    }
}
