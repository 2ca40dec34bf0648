//! Loading metadata, configuration and maps from disk.
//!
//! Metadata, configuration, record lists and run setups are authored in RON.
//! Maps are stored in the kernel's binary record format.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use rts_kernel::config::KernelConfig;
use rts_kernel::context::KernelContext;
use rts_kernel::metadata::{Metadata, MetadataSource};
use rts_kernel::pathfinding::GridPathFinder;
use rts_kernel::persistence::{decode_records, Record};
use rts_kernel::replay::{ReplayCommand, ReplaySpawn};
use rts_kernel::scenario::MapInfo;

use crate::error::{Result, ToolError};

/// Units to place and commands to issue on top of a map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSetup {
    /// Entities placed before the first frame.
    pub spawns: Vec<ReplaySpawn>,
    /// Commands, each issued before the update of its frame.
    pub commands: Vec<ReplayCommand>,
}

fn read_to_string(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ToolError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Parse a RON file into `T`.
pub fn read_ron<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = read_to_string(path)?;
    Ok(ron::from_str(&contents)?)
}

/// Load metadata from a RON file, or the built-in rule set.
pub fn load_metadata(path: Option<&Path>) -> Result<Arc<Metadata>> {
    let Some(path) = path else {
        return Ok(Arc::new(Metadata::builtin()));
    };
    let source: MetadataSource = read_ron(path)?;
    let metadata = Metadata::from_source(source)?;
    metadata.validate()?;
    tracing::debug!(path = %path.display(), "metadata loaded");
    Ok(Arc::new(metadata))
}

/// Load a kernel configuration from a RON file, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<KernelConfig> {
    path.map_or_else(|| Ok(KernelConfig::default()), read_ron)
}

/// Load a run setup from a RON file, or an empty one.
pub fn load_setup(path: Option<&Path>) -> Result<RunSetup> {
    path.map_or_else(|| Ok(RunSetup::default()), read_ron)
}

/// Read a binary map file.
pub fn read_map(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(ToolError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read(path)?)
}

/// Size of the map encoded in `bytes`, taken from its header record.
pub fn map_info(bytes: &[u8]) -> Result<MapInfo> {
    match decode_records(bytes)?.into_iter().next() {
        Some(Record::MapHeader { name, width, height }) => {
            Ok(MapInfo::new(name, u32::from(width), u32::from(height)))
        }
        _ => Err(rts_kernel::error::KernelError::InvalidMap(
            "first record must be the map header".into(),
        )
        .into()),
    }
}

/// Collaborators for a map: the metadata and an open grid covering it.
#[must_use]
pub fn context_for(map: &MapInfo, metadata: Arc<Metadata>) -> KernelContext {
    let (width, height) = map.cell_size();
    KernelContext::new(metadata, Box::new(GridPathFinder::new(width, height)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rts_kernel::persistence::encode_records;

    #[test]
    fn test_missing_file_reported() {
        let err = read_map(Path::new("/nonexistent/map.skm")).unwrap_err();
        assert!(matches!(err, ToolError::FileNotFound(_)));
    }

    #[test]
    fn test_defaults_without_paths() {
        assert_eq!(load_config(None).unwrap(), KernelConfig::default());
        assert_eq!(load_setup(None).unwrap(), RunSetup::default());
        assert!(load_metadata(None).unwrap().entity_type("Marine").is_some());
    }

    #[test]
    fn test_config_from_ron() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(seed: 42, starting_minerals: 100)").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.starting_minerals, 100);
        assert_eq!(config.supply_cap, 200);
    }

    #[test]
    fn test_bad_ron_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(seed: \"many\")").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(ToolError::Parse(_))));
    }

    #[test]
    fn test_metadata_round_trips_through_ron() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.ron");
        let source = Metadata::builtin().to_source();
        std::fs::write(&path, ron::ser::to_string_pretty(&source, ron::ser::PrettyConfig::default()).unwrap())
            .unwrap();
        let loaded = load_metadata(Some(&path)).unwrap();
        assert_eq!(loaded.to_source(), source);
    }

    #[test]
    fn test_map_info_from_header() {
        let bytes = encode_records(&[Record::MapHeader {
            name: "Tiny".into(),
            width: 8,
            height: 4,
        }])
        .unwrap();
        let map = map_info(&bytes).unwrap();
        assert_eq!((map.name.as_str(), map.width, map.height), ("Tiny", 8, 4));
    }
}
