// Workspace structure analysis
//
// Everything here is best effort: read errors become warnings on the report
// and never fail the session.

use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::WorkspaceConfig;
use crate::models::EnvironmentReport;

/// Scan the workspace and read the declared dependency set
pub fn analyze_environment(root: &Path, config: &WorkspaceConfig) -> EnvironmentReport {
    let mut report = EnvironmentReport::default();

    for dir in &config.source_dirs {
        match scan_sources(root, dir, &config.source_extensions) {
            Ok(files) => {
                report.files_scanned += files.len();
                let room = config.max_key_files.saturating_sub(report.key_files.len());
                report.key_files.extend(files.into_iter().take(room));
            }
            Err(message) => {
                log::debug!("[Environment] Skipping source dir '{}': {}", dir, message);
                report
                    .warnings
                    .push(format!("Could not scan {}: {}", dir, message));
            }
        }
    }

    if let Some(manifest) = config
        .manifest_files
        .iter()
        .find(|name| root.join(name).is_file())
    {
        match read_dependencies(&root.join(manifest)) {
            Ok(dependencies) => {
                report.dependencies = dependencies;
                report.manifest = Some(manifest.clone());
            }
            Err(message) => {
                log::warn!("[Environment] Could not analyze {}: {}", manifest, message);
                report
                    .warnings
                    .push(format!("Could not analyze {}: {}", manifest, message));
            }
        }
    } else {
        report
            .warnings
            .push("No dependency manifest found".to_string());
    }

    report
}

/// Relative paths of every file under `root/dir` with a matching extension,
/// in a stable order
fn scan_sources(root: &Path, dir: &str, extensions: &[String]) -> Result<Vec<String>, String> {
    let base = root.join(dir);
    if !base.is_dir() {
        return Err("directory not found".to_string());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&base).sort_by_file_name() {
        let entry = entry.map_err(|e| e.to_string())?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|wanted| wanted == ext))
            .unwrap_or(false);
        if matches {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    Ok(files)
}

/// Parse the dependency table of a manifest, keyed by file name
fn read_dependencies(path: &Path) -> Result<BTreeMap<String, String>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    match file_name {
        "Cargo.toml" => parse_cargo_dependencies(&content),
        "package.json" => parse_package_json_dependencies(&content),
        _ => parse_pubspec_dependencies(&content),
    }
}

fn parse_pubspec_dependencies(content: &str) -> Result<BTreeMap<String, String>, String> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    let mut dependencies = BTreeMap::new();

    if let Some(table) = doc.get("dependencies").and_then(|d| d.as_mapping()) {
        for (name, version) in table {
            let Some(name) = name.as_str() else { continue };
            let version = match version {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Mapping(m) => m
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("*")
                    .to_string(),
                _ => "any".to_string(),
            };
            dependencies.insert(name.to_string(), version);
        }
    }

    Ok(dependencies)
}

fn parse_cargo_dependencies(content: &str) -> Result<BTreeMap<String, String>, String> {
    let doc: toml::Value = toml::from_str(content).map_err(|e| e.to_string())?;
    let mut dependencies = BTreeMap::new();

    if let Some(table) = doc.get("dependencies").and_then(|d| d.as_table()) {
        for (name, spec) in table {
            let version = match spec {
                toml::Value::String(s) => s.clone(),
                toml::Value::Table(t) => t
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("*")
                    .to_string(),
                _ => "*".to_string(),
            };
            dependencies.insert(name.clone(), version);
        }
    }

    Ok(dependencies)
}

fn parse_package_json_dependencies(content: &str) -> Result<BTreeMap<String, String>, String> {
    let doc: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let mut dependencies = BTreeMap::new();

    if let Some(table) = doc.get("dependencies").and_then(|d| d.as_object()) {
        for (name, version) in table {
            let version = version.as_str().unwrap_or("*").to_string();
            dependencies.insert(name.clone(), version);
        }
    }

    Ok(dependencies)
}
