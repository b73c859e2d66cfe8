use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};
use weft_llm::ToolDefinition;

use super::{ANALYZE_PROJECT_TOOL, ToolContext, paths};
use crate::{ToolError, is_sidecar_path};

/// Directory names every walking tool leaves alone.
pub const SKIPPED_DIRECTORIES: [&str; 10] = [
    "node_modules",
    ".git",
    "target",
    "dist",
    "build",
    ".next",
    "out",
    "__pycache__",
    ".venv",
    "venv",
];

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzeProjectArgs {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProjectAnalysis {
    pub has_package_json: bool,
    pub has_cargo_toml: bool,
    pub has_requirements_txt: bool,
    pub has_gemfile: bool,
    /// `dependencies` then `devDependencies` from package.json, first
    /// occurrence wins.
    pub dependencies: Vec<String>,
    pub file_count: u64,
    pub total_size: u64,
}

pub(super) fn is_skipped_entry(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRECTORIES.contains(&name))
}

pub(super) fn analyze_project_definition() -> ToolDefinition {
    ToolDefinition {
        name: ANALYZE_PROJECT_TOOL.to_string(),
        description: "Summarize a project: detected manifests, package.json dependencies, file count and total size.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) async fn analyze(ctx: &ToolContext, args: &AnalyzeProjectArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let path = paths::resolve_or_root(root, args.path.as_deref())?;
    let shown = paths::display(root, &path);

    let analysis = tokio::task::spawn_blocking(move || analyze_project(&path))
        .await
        .map_err(|error| ToolError::Execution(format!("project analysis failed: {error}")))??;

    let mut value = serde_json::to_value(&analysis)
        .map_err(|error| ToolError::Execution(format!("serialize analysis: {error}")))?;
    if let Some(fields) = value.as_object_mut() {
        fields.insert("path".to_string(), Value::String(shown));
    }
    Ok(value)
}

pub fn analyze_project(path: &Path) -> Result<ProjectAnalysis, ToolError> {
    if !path.exists() {
        return Err(ToolError::NotFound(path.display().to_string()));
    }
    if !path.is_dir() {
        return Err(ToolError::Validation(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    let package_json = path.join("package.json");
    let mut analysis = ProjectAnalysis {
        has_package_json: package_json.is_file(),
        has_cargo_toml: path.join("Cargo.toml").is_file(),
        has_requirements_txt: path.join("requirements.txt").is_file(),
        has_gemfile: path.join("Gemfile").is_file(),
        ..ProjectAnalysis::default()
    };
    if analysis.has_package_json {
        analysis.dependencies = package_dependencies(&package_json);
    }

    let walker = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_skipped_entry(entry));
    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() || is_sidecar_path(entry.path()) {
            continue;
        }
        analysis.file_count += 1;
        if let Ok(metadata) = entry.metadata() {
            analysis.total_size += metadata.len();
        }
    }

    Ok(analysis)
}

/// Unreadable or malformed manifests yield no dependencies.
fn package_dependencies(package_json: &Path) -> Vec<String> {
    let Some(manifest) = std::fs::read_to_string(package_json)
        .ok()
        .and_then(|content| serde_json::from_str::<Value>(&content).ok())
    else {
        return Vec::new();
    };

    let mut dependencies: Vec<String> = Vec::new();
    for section in ["dependencies", "devDependencies"] {
        let Some(entries) = manifest.get(section).and_then(Value::as_object) else {
            continue;
        };
        for name in entries.keys() {
            if !dependencies.contains(name) {
                dependencies.push(name.clone());
            }
        }
    }
    dependencies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_reports_manifests_dependencies_and_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies":{"react":"18"},"devDependencies":{"vitest":"1","react":"18"}}"#,
        )
        .expect("write manifest");
        std::fs::write(dir.path().join("Gemfile"), "").expect("write gemfile");
        std::fs::create_dir_all(dir.path().join("node_modules/react")).expect("mkdir");
        std::fs::write(dir.path().join("node_modules/react/index.js"), "x".repeat(100))
            .expect("write dependency");
        std::fs::write(dir.path().join("index.js"), "abc").expect("write source");

        let analysis = analyze_project(dir.path()).expect("analysis");
        assert!(analysis.has_package_json);
        assert!(analysis.has_gemfile);
        assert!(!analysis.has_cargo_toml);
        assert!(!analysis.has_requirements_txt);
        assert_eq!(analysis.dependencies, vec!["react", "vitest"]);
        assert_eq!(analysis.file_count, 3);
        let manifest_len = std::fs::metadata(dir.path().join("package.json"))
            .expect("stat")
            .len();
        assert_eq!(analysis.total_size, manifest_len + 3);
    }

    #[test]
    fn analysis_rejects_missing_and_non_directory_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            analyze_project(&dir.path().join("missing")),
            Err(ToolError::NotFound(_))
        ));
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").expect("write");
        assert!(matches!(
            analyze_project(&file),
            Err(ToolError::Validation(_))
        ));
    }

    #[test]
    fn malformed_manifest_yields_no_dependencies() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("package.json"), "{ not json").expect("write");
        let analysis = analyze_project(dir.path()).expect("analysis");
        assert!(analysis.has_package_json);
        assert!(analysis.dependencies.is_empty());
    }
}
