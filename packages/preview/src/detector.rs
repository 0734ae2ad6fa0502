use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::fragment::{ProjectFile, TemplateId};

/// Package manager detected for the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Bun => "bun",
        }
    }

    pub fn install_command(&self) -> String {
        format!("{} install", self.as_str())
    }
}

/// Framework information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framework {
    pub name: String,
    pub version: Option<String>,
}

/// Commands used to bring a project up inside a sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCommands {
    pub package_manager: PackageManager,
    pub install_command: String,
    pub dev_command: String,
    pub framework: Option<Framework>,
}

/// Analyzes an in-memory project to pick install and dev-server commands
pub struct ProjectDetector;

impl ProjectDetector {
    /// Detect commands for a project.
    ///
    /// The fragment's own install command wins when present. Otherwise the
    /// detected package manager's install is used, and `default_install` when
    /// no lock file identifies one.
    pub fn detect(
        template: Option<TemplateId>,
        files: &[ProjectFile],
        install_override: Option<&str>,
        default_install: &str,
    ) -> ProjectCommands {
        let package_json = Self::parse_package_json(files);
        let scripts = package_json.as_ref().and_then(Self::extract_scripts);
        let framework = package_json.as_ref().and_then(Self::detect_framework);
        let package_manager = Self::detect_package_manager(files);

        let install_command = match install_override {
            Some(command) => command.to_string(),
            None if package_manager == PackageManager::Npm => default_install.to_string(),
            None => package_manager.install_command(),
        };

        let dev_command = Self::determine_dev_command(&scripts, package_manager, template);

        debug!(
            "Detected {} project: install='{}' dev='{}'",
            framework
                .as_ref()
                .map(|f| f.name.as_str())
                .unwrap_or("unknown"),
            install_command,
            dev_command
        );

        ProjectCommands {
            package_manager,
            install_command,
            dev_command,
            framework,
        }
    }

    fn parse_package_json(files: &[ProjectFile]) -> Option<Value> {
        let file = files.iter().find(|file| file.path == "/package.json")?;
        match serde_json::from_str(&file.content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Invalid package.json, falling back to default commands: {}", e);
                None
            }
        }
    }

    fn extract_scripts(package_json: &Value) -> Option<HashMap<String, String>> {
        package_json
            .get("scripts")
            .and_then(|s| s.as_object())
            .map(|scripts_obj| {
                scripts_obj
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_str().unwrap_or("").to_string()))
                    .collect()
            })
    }

    /// Detect framework from package.json dependencies
    fn detect_framework(package_json: &Value) -> Option<Framework> {
        let dependencies = package_json.get("dependencies").unwrap_or(&Value::Null);
        let dev_dependencies = package_json
            .get("devDependencies")
            .unwrap_or(&Value::Null);

        [("next", "Next.js"), ("vue", "Vue.js"), ("react", "React")]
            .into_iter()
            .find(|(dep, _)| {
                Self::has_dependency(dependencies, dep) || Self::has_dependency(dev_dependencies, dep)
            })
            .map(|(dep, name)| Framework {
                name: name.to_string(),
                version: Self::get_dependency_version(dependencies, dep)
                    .or_else(|| Self::get_dependency_version(dev_dependencies, dep)),
            })
    }

    fn has_dependency(deps: &Value, dep_name: &str) -> bool {
        deps.as_object()
            .map(|obj| obj.contains_key(dep_name))
            .unwrap_or(false)
    }

    fn get_dependency_version(deps: &Value, dep_name: &str) -> Option<String> {
        deps.as_object()
            .and_then(|obj| obj.get(dep_name))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// Pick the dev-server command from the scripts, in order of preference
    fn determine_dev_command(
        scripts: &Option<HashMap<String, String>>,
        package_manager: PackageManager,
        template: Option<TemplateId>,
    ) -> String {
        if let Some(scripts_map) = scripts {
            for script_name in ["dev", "start", "serve"] {
                if scripts_map.contains_key(script_name) {
                    return format!("{} run {}", package_manager.as_str(), script_name);
                }
            }
        }

        match template {
            Some(TemplateId::NextjsDeveloper) | Some(TemplateId::VueDeveloper) | None => {
                "npm run dev".to_string()
            }
            Some(other) => {
                warn!("No dev script for template {}, using npm run dev", other);
                "npm run dev".to_string()
            }
        }
    }

    /// Detect package manager by checking for lock files
    fn detect_package_manager(files: &[ProjectFile]) -> PackageManager {
        let has = |name: &str| files.iter().any(|file| file.path == format!("/{}", name));

        if has("bun.lockb") {
            PackageManager::Bun
        } else if has("pnpm-lock.yaml") {
            PackageManager::Pnpm
        } else if has("yarn.lock") {
            PackageManager::Yarn
        } else {
            PackageManager::Npm
        }
    }
}
