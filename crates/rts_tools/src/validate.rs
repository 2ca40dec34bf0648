//! Map validation.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rts_kernel::config::KernelConfig;
use rts_kernel::metadata::Metadata;
use rts_kernel::persistence::Record;
use rts_kernel::scenario::Scenario;

use crate::data::{context_for, map_info, read_map};
use crate::error::Result;

/// What a valid map contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapReport {
    /// Map name.
    pub name: String,
    /// Width in quad tiles.
    pub width: u32,
    /// Height in quad tiles.
    pub height: u32,
    /// Number of mineral fields.
    pub mineral_fields: usize,
    /// Number of vespene geysers.
    pub geysers: usize,
    /// Number of start locations.
    pub start_locations: usize,
    /// Total resources on the map.
    pub total_resources: u64,
}

impl fmt::Display for MapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}): {} mineral fields, {} geysers, {} start locations, {} resources",
            self.name,
            self.width,
            self.height,
            self.mineral_fields,
            self.geysers,
            self.start_locations,
            self.total_resources
        )
    }
}

/// Bootstrap the map in `bytes` and report its contents.
///
/// # Errors
///
/// Returns an error if the records cannot be decoded or any element breaks
/// a placement rule.
pub fn validate_map_bytes(bytes: &[u8], metadata: Arc<Metadata>) -> Result<MapReport> {
    let map = map_info(bytes)?;
    let context = context_for(&map, metadata);
    let scenario = Scenario::from_bytes(bytes, KernelConfig::default(), context)?;

    let mut report = MapReport {
        name: map.name.clone(),
        width: map.width,
        height: map.height,
        mineral_fields: 0,
        geysers: 0,
        start_locations: 0,
        total_resources: 0,
    };
    for record in scenario.to_records()? {
        match record {
            Record::MineralField { amount, .. } => {
                report.mineral_fields += 1;
                report.total_resources += u64::from(amount);
            }
            Record::VespeneGeyser { amount, .. } => {
                report.geysers += 1;
                report.total_resources += u64::from(amount);
            }
            Record::StartLocation { .. } => report.start_locations += 1,
            Record::MapHeader { .. } => {}
        }
    }
    Ok(report)
}

/// Validate a binary map file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the map is invalid.
pub fn validate_map(path: &Path, metadata: Arc<Metadata>) -> Result<MapReport> {
    let bytes = read_map(path)?;
    let report = validate_map_bytes(&bytes, metadata)?;
    tracing::info!(path = %path.display(), %report, "map is valid");
    Ok(report)
}
