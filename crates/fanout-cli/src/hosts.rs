//! Host resolution: explicit machine lists, host files, and named group
//! files. All failures here are fatal before any task starts.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Union of all host sources, deduplicated preserving first-seen order.
pub fn resolve(machines: &[String], files: &[PathBuf], groups: &[String]) -> Result<Vec<String>> {
    let mut hosts = Vec::new();

    hosts.extend(from_machines(machines));
    for file in files {
        hosts.extend(
            from_file(file).with_context(|| format!("reading host file {}", file.display()))?,
        );
    }
    for group in groups.iter().flat_map(|g| g.split(',')) {
        let group = group.trim();
        if group.is_empty() {
            continue;
        }
        hosts.extend(from_group(group)?);
    }

    let mut seen = std::collections::HashSet::new();
    hosts.retain(|host| seen.insert(host.clone()));
    Ok(hosts)
}

/// Split `-m` arguments: each may name several machines, comma separated.
fn from_machines(machines: &[String]) -> Vec<String> {
    machines
        .iter()
        .flat_map(|arg| arg.split(','))
        .map(|host| host.trim().to_string())
        .filter(|host| !host.is_empty())
        .collect()
}

/// One host per line; blanks skipped.
fn from_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

/// Look a group up in the standard locations, first match wins.
fn from_group(group: &str) -> Result<Vec<String>> {
    if !is_valid_group_name(group) {
        bail!("invalid group name: {group}");
    }

    for dir in group_dirs() {
        let path = dir.join(group);
        if path.is_file() {
            return read_group_file(&path)
                .with_context(|| format!("reading group file {}", path.display()));
        }
    }
    bail!("no group file found for: {group}");
}

fn group_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(config) = dirs::config_dir() {
        dirs.push(config.join("fanout").join("group"));
    }
    dirs.push(PathBuf::from("/etc/fanout/group"));
    dirs
}

/// Group files allow `#` comments and blank lines.
fn read_group_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

fn is_valid_group_name(group: &str) -> bool {
    !group.is_empty()
        && group
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '='))
}
