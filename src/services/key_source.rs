use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, warn};

use crate::error::{NfeError, NfeResult};
use crate::models::types::{AccessKey, BranchCode};

static BRANCH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)FILIAL (\d+)").expect("branch pattern is valid"));

/// `CHAVES filial 4.txt` -> `FILIAL 04`
pub fn parse_branch_from_filename(name: &str) -> Option<BranchCode> {
    let caps = BRANCH_RE.captures(name)?;
    let digits = caps.get(1)?.as_str();
    Some(BranchCode::builder().digits(digits).build())
}

/// 1-based line number and parse outcome for every line, blank ones included.
fn key_lines(content: &str) -> impl Iterator<Item = (usize, NfeResult<AccessKey>)> + '_ {
    content.lines().enumerate().map(|(idx, line)| {
        let line = line.trim();
        let parsed = if line.is_empty() {
            Err(NfeError::MalformedKey("blank line".to_string()))
        } else {
            AccessKey::parse(line)
        };
        (idx + 1, parsed)
    })
}

/// Parses one key per line. Invalid and blank lines are logged and skipped.
pub fn parse_keys(content: &str, source: &str) -> Vec<AccessKey> {
    let mut keys = Vec::new();
    for (line, parsed) in key_lines(content) {
        match parsed {
            Ok(key) => keys.push(key),
            Err(e) => warn!(file = %source, line, error = %e, "keys: line skipped"),
        }
    }
    keys
}

pub async fn read_keys_from_file(path: &Path) -> Vec<AccessKey> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let content = String::from_utf8_lossy(&bytes);
            let content = content.trim_start_matches('\u{feff}');
            parse_keys(content, &path.display().to_string())
        }
        Err(e) => {
            error!(file = %path.display(), error = %e, "keys: cannot read key file");
            Vec::new()
        }
    }
}

/// Every key of every `*.txt` branch file in `input_dir`, files in name order.
pub async fn collect_branch_keys(input_dir: &Path) -> Vec<(BranchCode, AccessKey)> {
    let mut files = match list_key_files(input_dir).await {
        Ok(files) => files,
        Err(e) => {
            error!(dir = %input_dir.display(), error = %e, "keys: cannot list input directory");
            return Vec::new();
        }
    };
    files.sort();

    let mut out = Vec::new();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let Some(branch) = parse_branch_from_filename(&name) else {
            warn!(file = %name, "keys: no branch code in file name, skipped");
            continue;
        };
        let keys = read_keys_from_file(&path).await;
        info!(file = %name, branch = %branch, count = keys.len(), "keys: file loaded");
        out.extend(keys.into_iter().map(|k| (branch.clone(), k)));
    }
    out
}

async fn list_key_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_txt = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if is_txt && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}
