//! Usecase discovery

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::definition::DefinitionUsecase;
use super::{Usecase, UsecaseError};

/// Source of usecases by name
pub trait UsecaseLoader {
    fn load(&self, name: &str) -> Result<Box<dyn Usecase>, UsecaseError>;
}

/// Key used to look a usecase up: the requested name up to its first space
pub fn usecase_key(requested: &str) -> &str {
    requested.split(' ').next().unwrap_or(requested)
}

/// Loads `<dir>/<name>.json` definitions
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
}

impl DirectoryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn definition_path(&self, key: &str) -> Result<PathBuf, UsecaseError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(UsecaseError::InvalidName(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl UsecaseLoader for DirectoryLoader {
    fn load(&self, name: &str) -> Result<Box<dyn Usecase>, UsecaseError> {
        let key = usecase_key(name);
        let path = self.definition_path(key)?;
        tracing::info!(usecase = %key, "Loading usecase from {}", path.display());

        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                UsecaseError::NotFound(key.to_string())
            } else {
                UsecaseError::Read {
                    name: key.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        Ok(Box::new(DefinitionUsecase::from_json(key, &content)?))
    }
}

type UsecaseFactory = Box<dyn Fn() -> Box<dyn Usecase> + Send + Sync>;

/// In-process table of usecases, for rules compiled into the binary
#[derive(Default)]
pub struct UsecaseRegistry {
    factories: HashMap<String, UsecaseFactory>,
}

impl UsecaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Usecase> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Register a declarative definition under its own name
    pub fn register_definition(&mut self, definition: DefinitionUsecase) {
        let name = definition.name.clone();
        self.register(name, move || -> Box<dyn Usecase> { Box::new(definition.clone()) });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(usecase_key(name))
    }
}

impl UsecaseLoader for UsecaseRegistry {
    fn load(&self, name: &str) -> Result<Box<dyn Usecase>, UsecaseError> {
        let key = usecase_key(name);
        self.factories
            .get(key)
            .map(|factory| factory())
            .ok_or_else(|| UsecaseError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"{
        "name": "port-scan",
        "query": { "index": "fw-*" },
        "threshold": { "fields": ["attacker_ip"] },
        "mapping": { "human_time": "ts", "attacker_ip": "src" }
    }"#;

    #[test]
    fn test_usecase_key() {
        assert_eq!(usecase_key("port-scan"), "port-scan");
        assert_eq!(usecase_key("port-scan extra words"), "port-scan");
    }

    #[test]
    fn test_directory_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("port-scan.json"), DEFINITION).unwrap();
        let loader = DirectoryLoader::new(dir.path());

        let uc = loader.load("port-scan").unwrap();
        assert_eq!(uc.name(), "port-scan");
        assert_eq!(uc.query().index, "fw-*");

        assert!(matches!(loader.load("other"), Err(UsecaseError::NotFound(_))));
    }

    #[test]
    fn test_directory_loader_rejects_paths() {
        let loader = DirectoryLoader::new("/tmp");
        assert!(matches!(loader.load("../etc/passwd"), Err(UsecaseError::InvalidName(_))));
        assert!(matches!(loader.load("a/b"), Err(UsecaseError::InvalidName(_))));
        assert!(matches!(loader.load(""), Err(UsecaseError::InvalidName(_))));
    }

    #[test]
    fn test_directory_loader_bad_definition() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ \"name\": 1 }").unwrap();
        let loader = DirectoryLoader::new(dir.path());
        assert!(matches!(loader.load("broken"), Err(UsecaseError::Definition { .. })));
    }

    #[test]
    fn test_bundled_definitions_load() {
        let loader = DirectoryLoader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/usecases.d"));
        let uc = loader.load("ssh-bruteforce").unwrap();
        assert_eq!(uc.threshold().fields.len(), 2);
        assert_eq!(uc.extra_values(), vec!["ssh".to_string()]);
    }

    #[test]
    fn test_registry() {
        let mut registry = UsecaseRegistry::new();
        registry.register_definition(DefinitionUsecase::from_json("port-scan", DEFINITION).unwrap());

        assert!(registry.contains("port-scan"));
        assert_eq!(registry.load("port-scan now").unwrap().name(), "port-scan");
        assert!(matches!(registry.load("nope"), Err(UsecaseError::NotFound(_))));
    }
}
