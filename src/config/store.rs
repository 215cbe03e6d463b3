// ABOUTME: Registry of project configurations living under <base>/configs/

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{ConfigError, ScadConfig, CONFIG_TEMPLATE};

/// Loads, validates, lists, registers, and removes project configurations
/// from a single directory. The directory is an explicit parameter (DESIGN
/// NOTES §9: "Global home state -> injected base path") so tests can swap it.
pub struct ConfigStore {
    configs_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            configs_dir: base_dir.join("configs"),
        }
    }

    /// Renames a legacy `templates/` directory to `configs/` if present and if
    /// the new name doesn't already exist. At most once per process, a no-op
    /// if the target already exists (the one permitted implicit migration).
    fn migrate_legacy_dir(&self) -> Result<(), ConfigError> {
        let base = self
            .configs_dir
            .parent()
            .expect("configs_dir always has a parent");
        let legacy = base.join("templates");
        if !self.configs_dir.exists() && legacy.exists() {
            info!(
                from = %legacy.display(),
                to = %self.configs_dir.display(),
                "migrating legacy config directory"
            );
            std::fs::rename(&legacy, &self.configs_dir)?;
        }
        Ok(())
    }

    fn ensure_dir(&self) -> Result<(), ConfigError> {
        self.migrate_legacy_dir()?;
        if !self.configs_dir.exists() {
            std::fs::create_dir_all(&self.configs_dir)?;
        }
        Ok(())
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.configs_dir.join(format!("{name}.yml"))
    }

    pub fn list(&self) -> Result<Vec<String>, ConfigError> {
        self.migrate_legacy_dir()?;
        if !self.configs_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.configs_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn load(&self, name: &str) -> Result<ScadConfig, ConfigError> {
        self.migrate_legacy_dir()?;
        let path = self.path_for(name);
        if !path.exists() {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        let raw = std::fs::read_to_string(&path)?;
        ScadConfig::parse(name, &raw)
            .map_err(|e| ConfigError::Invalid(name.to_string(), e.to_string()))
    }

    /// Materializes a reference (a symlink) to an externally-authored config
    /// file inside the store. Idempotent when the existing reference already
    /// targets the same file; fails with `NameTaken` otherwise. Fully
    /// validates the file before registering.
    pub fn register(&self, external_path: &Path) -> Result<String, ConfigError> {
        self.ensure_dir()?;
        let name = external_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ConfigError::Invalid(
                    external_path.display().to_string(),
                    "config file has no usable name".to_string(),
                )
            })?
            .to_string();

        let raw = std::fs::read_to_string(external_path)?;
        ScadConfig::parse(&name, &raw)
            .map_err(|e| ConfigError::Invalid(name.clone(), e.to_string()))?;

        let link_path = self.path_for(&name);
        let absolute_external = external_path
            .canonicalize()
            .unwrap_or_else(|_| external_path.to_path_buf());

        if link_path.exists() {
            let is_same_symlink = link_path
                .read_link()
                .ok()
                .and_then(|target| target.canonicalize().ok())
                == Some(absolute_external.clone());
            if is_same_symlink {
                debug!(config = %name, "register is a no-op, reference already present");
                return Ok(name);
            }
            return Err(ConfigError::NameTaken(name));
        }

        #[cfg(unix)]
        std::os::unix::fs::symlink(&absolute_external, &link_path)?;
        #[cfg(windows)]
        std::os::windows::fs::symlink_file(&absolute_external, &link_path)?;

        info!(config = %name, target = %absolute_external.display(), "registered config");
        Ok(name)
    }

    /// Removes the store entry only, never the referenced file. If the entry
    /// happens to be a plain file rather than a symlink (e.g. written by
    /// `new`), it is deleted outright — there is no external copy to
    /// preserve in that case. See SPEC_FULL.md Open Question #3.
    pub fn remove(&self, name: &str) -> Result<(), ConfigError> {
        let path = self.path_for(name);
        if !path.exists() && !path.is_symlink() {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        if path.is_symlink() {
            std::fs::remove_file(&path)?;
            info!(config = %name, "removed config reference");
        } else {
            std::fs::remove_file(&path)?;
            warn!(config = %name, "removed non-symlink config entry, file is gone");
        }
        Ok(())
    }

    /// Writes a commented template; fails with `NameTaken` if one exists.
    pub fn new_config(&self, name: &str) -> Result<PathBuf, ConfigError> {
        self.ensure_dir()?;
        let path = self.path_for(name);
        if path.exists() {
            return Err(ConfigError::NameTaken(name.to_string()));
        }
        let content = CONFIG_TEMPLATE.replace("{name}", name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn view(&self, name: &str) -> Result<String, ConfigError> {
        self.migrate_legacy_dir()?;
        let path = self.path_for(name);
        if !path.exists() {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        Ok(std::fs::read_to_string(&path)?)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.path_for(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn new_then_list_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path());
        store.new_config("demo").unwrap();
        assert_eq!(store.list().unwrap(), vec!["demo".to_string()]);

        // The template alone doesn't satisfy the workdir invariant check
        // cleanly since it has a commented `workdir: true`... it does set it,
        // so loading should succeed.
        let config = store.load("demo").unwrap();
        assert_eq!(config.workdir_key(), "code");
    }

    #[test]
    fn new_config_name_taken() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path());
        store.new_config("demo").unwrap();
        let err = store.new_config("demo").unwrap_err();
        assert!(matches!(err, ConfigError::NameTaken(_)));
    }

    #[test]
    fn load_missing_config_fails() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path());
        let err = store.load("nope").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn register_external_file_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path());

        let external_dir = TempDir::new().unwrap();
        let external_path = external_dir.path().join("myproj.yml");
        std::fs::write(
            &external_path,
            "name: myproj\nrepos:\n  code:\n    path: /tmp/x\n    workdir: true\n",
        )
        .unwrap();

        let name = store.register(&external_path).unwrap();
        assert_eq!(name, "myproj");

        // Calling again with the same target is a no-op, not an error.
        let name2 = store.register(&external_path).unwrap();
        assert_eq!(name2, "myproj");
    }

    #[test]
    fn remove_missing_config_fails() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path());
        let err = store.remove("nope").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn legacy_templates_dir_is_migrated_once() {
        let tmp = TempDir::new().unwrap();
        let legacy = tmp.path().join("templates");
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(
            legacy.join("demo.yml"),
            "name: demo\nrepos:\n  code:\n    path: /tmp/x\n    workdir: true\n",
        )
        .unwrap();

        let store = ConfigStore::new(tmp.path());
        let names = store.list().unwrap();
        assert_eq!(names, vec!["demo".to_string()]);
        assert!(tmp.path().join("configs").exists());
        assert!(!legacy.exists());
    }
}
