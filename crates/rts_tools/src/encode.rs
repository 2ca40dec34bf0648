//! Conversion between RON record lists and binary map files.

use std::path::Path;

use ron::ser::PrettyConfig;

use rts_kernel::persistence::{decode_records, encode_records, Record};

use crate::data::{read_map, read_ron};
use crate::error::Result;

/// Encode the RON record list at `input` into a binary map at `output`.
///
/// Returns the number of records written.
///
/// # Errors
///
/// Returns an error if the input cannot be parsed or a value does not fit
/// the binary format.
pub fn encode_map(input: &Path, output: &Path) -> Result<usize> {
    let records: Vec<Record> = read_ron(input)?;
    let bytes = encode_records(&records)?;
    std::fs::write(output, &bytes)?;
    tracing::info!(records = records.len(), bytes = bytes.len(), output = %output.display(), "map encoded");
    Ok(records.len())
}

/// Decode the binary map at `input` into a RON record list at `output`.
///
/// Returns the number of records written.
///
/// # Errors
///
/// Returns an error if the map cannot be decoded.
pub fn decode_map(input: &Path, output: &Path) -> Result<usize> {
    let records = decode_records(&read_map(input)?)?;
    let text = ron::ser::to_string_pretty(&records, PrettyConfig::default())?;
    std::fs::write(output, text)?;
    tracing::info!(records = records.len(), output = %output.display(), "map decoded");
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use rts_test_utils::fixtures::duel_map_records;

    #[test]
    fn test_encode_then_decode_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("duel.ron");
        let binary = dir.path().join("duel.skm");
        let restored = dir.path().join("restored.ron");
        let text = ron::ser::to_string_pretty(&duel_map_records(), PrettyConfig::default()).unwrap();
        std::fs::write(&source, text).unwrap();

        assert_eq!(encode_map(&source, &binary).unwrap(), 8);
        assert_eq!(std::fs::read(&binary).unwrap(), encode_records(&duel_map_records()).unwrap());
        assert_eq!(decode_map(&binary, &restored).unwrap(), 8);
        let records: Vec<Record> = read_ron(&restored).unwrap();
        assert_eq!(records, duel_map_records());
    }

    #[test]
    fn test_hand_written_records() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tiny.ron");
        std::fs::write(
            &source,
            r#"[
                MapHeader(name: "Tiny", width: 16, height: 16),
                StartLocation(x: 1, y: 1, player: 0),
                MineralField(x: 10, y: 10, amount: 750),
            ]"#,
        )
        .unwrap();
        assert_eq!(encode_map(&source, &dir.path().join("tiny.skm")).unwrap(), 3);
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = encode_map(&dir.path().join("none.ron"), &dir.path().join("out.skm")).unwrap_err();
        assert!(matches!(err, ToolError::FileNotFound(_)));
    }
}
