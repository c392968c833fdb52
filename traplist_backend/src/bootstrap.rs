use crate::config::TraplistConfig;
use crate::database::Database;
use anyhow::Result;
use std::fs;

pub struct BootstrapResources {
    pub directories_created: Vec<String>,
    pub database_initialized: bool,
    pub database: Database,
}

pub fn initialize(config: &TraplistConfig) -> Result<BootstrapResources> {
    let mut directories_created = Vec::new();
    create_dir_if_missing(&config.paths.data_dir, &mut directories_created)?;
    create_dir_if_missing(&config.paths.logs_dir, &mut directories_created)?;

    let database = Database::connect(&config.paths)?;
    let database_initialized = database.ensure_migrations()?;

    Ok(BootstrapResources {
        directories_created,
        database_initialized,
        database,
    })
}

fn create_dir_if_missing(path: &std::path::Path, created: &mut Vec<String>) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        created.push(path.display().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraplistPaths;

    #[test]
    fn creates_layout_and_schema_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = TraplistConfig::new(0, TraplistPaths::from_base_dir(temp.path()).unwrap());

        let first = initialize(&config).expect("first boot");
        assert!(first.database_initialized);
        assert_eq!(first.directories_created.len(), 2);
        drop(first);

        let second = initialize(&config).expect("second boot");
        assert!(!second.database_initialized);
        assert!(second.directories_created.is_empty());
    }
}
