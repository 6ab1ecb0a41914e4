// src/config/loader.rs

use std::path::{Path, PathBuf};

use crate::config::model::{ActionConfig, ConfigFile, RawConfigFile};
use crate::errors::{Result, StardagError};
use crate::fs::{FileSystem, RealFileSystem};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    load_from_path_with_fs(path, &RealFileSystem)
}

pub fn load_from_path_with_fs(path: impl AsRef<Path>, fs: &dyn FileSystem) -> Result<RawConfigFile> {
    let contents = fs.read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file from path and run full validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Inlines `sql_file` scripts, resolved relative to the config file.
/// - Checks for:
///   - unknown `after` references,
///   - DAG cycles,
///   - malformed identifiers, durations and actions.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    load_and_validate_with_fs(path, &RealFileSystem)
}

pub fn load_and_validate_with_fs(path: impl AsRef<Path>, fs: &dyn FileSystem) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut raw_config = load_from_path_with_fs(path, fs)?;
    resolve_sql_files(&mut raw_config, &config_root_dir(path), fs)?;
    ConfigFile::try_from(raw_config)
}

/// Replace every `sql_file` reference with the file's contents.
pub fn resolve_sql_files(raw: &mut RawConfigFile, root: &Path, fs: &dyn FileSystem) -> Result<()> {
    for (name, task) in raw.task.iter_mut() {
        let ActionConfig::ExecuteSql(exec) = &mut task.action else {
            continue;
        };
        if exec.sql.is_some() {
            continue;
        }
        let Some(file) = exec.sql_file.as_ref() else {
            continue;
        };

        let full = if file.is_absolute() {
            file.clone()
        } else {
            root.join(file)
        };
        if !fs.is_file(&full) {
            return Err(StardagError::ConfigError(format!(
                "task '{name}': sql_file {:?} does not exist",
                full
            )));
        }
        exec.sql = Some(fs.read_to_string(&full)?);
    }
    Ok(())
}

/// Directory that relative paths in the config are resolved against.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::new(),
    }
}

/// Helper to resolve a default config path.
///
/// Currently this just returns `Pipeline.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Pipeline.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Action;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn sql_file_is_read_relative_to_config() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "pipelines/etl.toml",
            r#"
            [task.create]
            action = "execute_sql"
            sql_file = "sql/create.sql"
            "#,
        );
        fs.add_file(
            "pipelines/sql/create.sql",
            "CREATE TABLE a (x int);\n-- comment\nCREATE TABLE b (y int);",
        );

        let cfg = load_and_validate_with_fs("pipelines/etl.toml", &fs).unwrap();
        match &cfg.tasks["create"].action {
            Action::ExecuteSql(script) => assert_eq!(script.statements.len(), 2),
            other => panic!("expected execute_sql, got {other:?}"),
        }
    }

    #[test]
    fn missing_sql_file_is_a_config_error() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "etl.toml",
            r#"
            [task.create]
            action = "execute_sql"
            sql_file = "missing.sql"
            "#,
        );

        let err = load_and_validate_with_fs("etl.toml", &fs).unwrap_err();
        assert!(matches!(err, StardagError::ConfigError(msg) if msg.contains("missing.sql")));
    }
}
