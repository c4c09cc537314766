// locus_sim/src/simulation/config/catalog.rs

//! Discovery of scenario files under a directory tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::simulation::error::ConfigError;

/// Every scenario found under a root directory. The key is a namespace string
/// built from the relative path (e.g. "highway.car_lateral"), so iteration
/// order is stable across platforms.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScenarioCatalog(pub BTreeMap<String, PathBuf>);

impl ScenarioCatalog {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PathBuf)> {
        self.0.iter()
    }
}

/// Walks `root` and collects every `.toml` file in it.
pub fn discover_scenarios(root: &Path) -> Result<ScenarioCatalog, ConfigError> {
    if !root.is_dir() {
        return Err(ConfigError::invalid(
            "scenario_dir",
            format!("{} is not a directory", root.display()),
        ));
    }
    info!("Discovering scenarios under: {}", root.display());

    let mut catalog = ScenarioCatalog::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_dir() || path.extension().map_or(true, |ext| ext != "toml") {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            warn!("Skipping {} outside the scenario root", path.display());
            continue;
        };
        let key = relative
            .with_extension("")
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, ".");
        info!("Found scenario: '{}'", key);
        catalog.0.insert(key, path.to_path_buf());
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_bundled_scenarios() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/scenarios");
        let catalog = discover_scenarios(&root).unwrap();
        assert!(catalog.0.contains_key("car_lateral"));
        assert!(catalog.0.contains_key("live_static"));
        assert!(catalog.iter().all(|(_, path)| path.extension().is_some_and(|e| e == "toml")));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/does_not_exist");
        assert!(matches!(
            discover_scenarios(&root),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
