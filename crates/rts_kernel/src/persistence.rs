//! Binary scenario records and map bootstrap.
//!
//! A map is stored as a sequence of self-describing records. Each record is
//!
//! ```text
//! magic "SK" | tag: u8 | format: u16 | fields...
//! ```
//!
//! with every integer little-endian and strings written as a `u32` length
//! followed by UTF-8 bytes. The first record of a map is its header.

use serde::{Deserialize, Serialize};

use crate::config::KernelConfig;
use crate::context::KernelContext;
use crate::element::{ElementId, ElementKind, PlayerIndex, ScenarioElement};
use crate::error::{KernelError, Result};
use crate::math::{Fixed, QuadPos, RectFixed, QUAD_TILE_CELLS};
use crate::scenario::{MapInfo, Scenario};

/// Marker at the start of every record.
pub const RECORD_MAGIC: [u8; 2] = *b"SK";

/// Format ID written for every record kind.
pub const FORMAT_ID: u16 = 1;

/// Quad tiles kept clear of resources around a start location's base area.
pub const BASE_CLEARANCE_QUADS: i32 = 3;

const TAG_MAP_HEADER: u8 = 1;
const TAG_MINERAL_FIELD: u8 = 2;
const TAG_VESPENE_GEYSER: u8 = 3;
const TAG_START_LOCATION: u8 = 4;

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// Map name and size in quad tiles.
    MapHeader {
        /// Display name.
        name: String,
        /// Width in quad tiles.
        width: u16,
        /// Height in quad tiles.
        height: u16,
    },
    /// A mineral field at a quad tile.
    MineralField {
        /// Quad column.
        x: u16,
        /// Quad row.
        y: u16,
        /// Minerals held.
        amount: u32,
    },
    /// A vespene geyser at a quad tile.
    VespeneGeyser {
        /// Quad column.
        x: u16,
        /// Quad row.
        y: u16,
        /// Gas held.
        amount: u32,
    },
    /// A player's start location at a quad tile.
    StartLocation {
        /// Quad column.
        x: u16,
        /// Quad row.
        y: u16,
        /// Player slot.
        player: u8,
    },
}

impl Record {
    fn tag(&self) -> u8 {
        match self {
            Self::MapHeader { .. } => TAG_MAP_HEADER,
            Self::MineralField { .. } => TAG_MINERAL_FIELD,
            Self::VespeneGeyser { .. } => TAG_VESPENE_GEYSER,
            Self::StartLocation { .. } => TAG_START_LOCATION,
        }
    }
}

/// Appends encoded records to a byte buffer.
#[derive(Debug, Default)]
pub struct RecordWriter {
    buffer: Vec<u8>,
}

impl RecordWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one record.
    pub fn write(&mut self, record: &Record) -> Result<()> {
        self.buffer.extend_from_slice(&RECORD_MAGIC);
        self.buffer.push(record.tag());
        self.buffer.extend_from_slice(&FORMAT_ID.to_le_bytes());
        match record {
            Record::MapHeader {
                name,
                width,
                height,
            } => {
                self.write_string(name)?;
                self.buffer.extend_from_slice(&width.to_le_bytes());
                self.buffer.extend_from_slice(&height.to_le_bytes());
            }
            Record::MineralField { x, y, amount } | Record::VespeneGeyser { x, y, amount } => {
                self.buffer.extend_from_slice(&x.to_le_bytes());
                self.buffer.extend_from_slice(&y.to_le_bytes());
                self.buffer.extend_from_slice(&amount.to_le_bytes());
            }
            Record::StartLocation { x, y, player } => {
                self.buffer.extend_from_slice(&x.to_le_bytes());
                self.buffer.extend_from_slice(&y.to_le_bytes());
                self.buffer.push(*player);
            }
        }
        Ok(())
    }

    /// The encoded bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        let length = u32::try_from(value.len())
            .map_err(|_| KernelError::InvalidMap(format!("string of {} bytes is too long", value.len())))?;
        self.buffer.extend_from_slice(&length.to_le_bytes());
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }
}

/// Decodes records from a byte slice.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> RecordReader<'a> {
    /// Read from the start of `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Byte offset of the next record.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Decode the next record, or `None` at the end of the stream.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        if self.offset == self.bytes.len() {
            return Ok(None);
        }
        let start = self.offset;
        let magic: [u8; 2] = self.take_array()?;
        if magic != RECORD_MAGIC {
            return Err(KernelError::BadMagic {
                offset: start,
                expected: RECORD_MAGIC,
                found: magic,
            });
        }
        let tag = self.read_u8()?;
        let format_id = self.read_u16()?;
        if !matches!(
            tag,
            TAG_MAP_HEADER | TAG_MINERAL_FIELD | TAG_VESPENE_GEYSER | TAG_START_LOCATION
        ) {
            return Err(KernelError::UnknownRecord { offset: start, tag });
        }
        if format_id != FORMAT_ID {
            return Err(KernelError::UnsupportedFormat { tag, format_id });
        }

        let record = match tag {
            TAG_MAP_HEADER => Record::MapHeader {
                name: self.read_string()?,
                width: self.read_u16()?,
                height: self.read_u16()?,
            },
            TAG_MINERAL_FIELD => Record::MineralField {
                x: self.read_u16()?,
                y: self.read_u16()?,
                amount: self.read_u32()?,
            },
            TAG_VESPENE_GEYSER => Record::VespeneGeyser {
                x: self.read_u16()?,
                y: self.read_u16()?,
                amount: self.read_u32()?,
            },
            _ => Record::StartLocation {
                x: self.read_u16()?,
                y: self.read_u16()?,
                player: self.read_u8()?,
            },
        };
        Ok(Some(record))
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let available = self.bytes.len() - self.offset;
        if available < count {
            return Err(KernelError::Truncated {
                offset: self.offset,
                needed: count - available,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    fn read_string(&mut self) -> Result<String> {
        let length = self.read_u32()? as usize;
        let offset = self.offset;
        let bytes = self.take(length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| KernelError::InvalidString { offset })
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.read_record();
        if result.is_err() {
            self.offset = self.bytes.len();
        }
        result.transpose()
    }
}

/// Encode a record list.
pub fn encode_records(records: &[Record]) -> Result<Vec<u8>> {
    let mut writer = RecordWriter::new();
    for record in records {
        writer.write(record)?;
    }
    Ok(writer.finish())
}

/// Decode every record in `bytes`.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<Record>> {
    RecordReader::new(bytes).collect()
}

impl Scenario {
    /// Build a scenario from map records.
    ///
    /// Every resource node and start location is admitted and attached, and a
    /// player is added for each start location. The whole load is rejected if
    /// any element ends up violating the placement rules.
    pub fn from_records(
        records: &[Record],
        config: KernelConfig,
        context: KernelContext,
    ) -> Result<Self> {
        let Some((Record::MapHeader { name, width, height }, rest)) = records.split_first() else {
            return Err(KernelError::InvalidMap("first record must be the map header".into()));
        };
        if *width == 0 || *height == 0 {
            return Err(KernelError::InvalidMap(format!("map {name} has no area")));
        }
        let map = MapInfo::new(name.clone(), u32::from(*width), u32::from(*height));
        let mut scenario = Self::new(map, config, context);

        for record in rest {
            if let Err(error) = scenario.bootstrap(record) {
                tracing::warn!(?record, %error, "map record rejected");
                return Err(error);
            }
        }
        scenario.validate_placement()?;
        tracing::info!(
            map = %scenario.map().name,
            elements = scenario.element_count(),
            "scenario bootstrapped from records"
        );
        Ok(scenario)
    }

    /// Decode a record stream and build a scenario from it.
    pub fn from_bytes(bytes: &[u8], config: KernelConfig, context: KernelContext) -> Result<Self> {
        let records = decode_records(bytes)?;
        Self::from_records(&records, config, context)
    }

    /// Export the map header, resource nodes and start locations.
    pub fn to_records(&self) -> Result<Vec<Record>> {
        let map = self.map();
        let mut records = vec![Record::MapHeader {
            name: map.name.clone(),
            width: to_u16(map.width, "map width")?,
            height: to_u16(map.height, "map height")?,
        }];
        for element in self.elements() {
            let record = match element.kind() {
                ElementKind::MineralField(node) => node.position().map(|quad| {
                    quad_coords(quad).map(|(x, y)| Record::MineralField {
                        x,
                        y,
                        amount: node.amount(),
                    })
                }),
                ElementKind::VespeneGeyser(node) => node.position().map(|quad| {
                    quad_coords(quad).map(|(x, y)| Record::VespeneGeyser {
                        x,
                        y,
                        amount: node.amount(),
                    })
                }),
                ElementKind::StartLocation(start) => start.position().map(|quad| {
                    quad_coords(quad).map(|(x, y)| Record::StartLocation {
                        x,
                        y,
                        player: start.player().get(),
                    })
                }),
                _ => None,
            };
            if let Some(record) = record {
                records.push(record?);
            }
        }
        Ok(records)
    }

    /// Check the placement rules for resources and start locations.
    ///
    /// Resource footprints must lie inside the map and never overlap, and no
    /// resource may come within [`BASE_CLEARANCE_QUADS`] of a start location's
    /// base area. Start locations must lie inside the map.
    pub fn validate_placement(&self) -> Result<()> {
        let bounds = self.map().bounds();
        let mut resources: Vec<(ElementId, RectFixed)> = Vec::new();
        let mut bases: Vec<(ElementId, RectFixed)> = Vec::new();
        for id in self.element_ids() {
            let Some(element) = self.element(id) else {
                continue;
            };
            let Some(area) = self.element_area(id) else {
                continue;
            };
            match element.kind() {
                ElementKind::MineralField(_) | ElementKind::VespeneGeyser(_) => {
                    if !inside(&bounds, &area) {
                        return Err(KernelError::Placement(format!(
                            "{} {id} lies outside the map",
                            element.type_name()
                        )));
                    }
                    if let Some((other, _)) = resources.iter().find(|(_, other)| other.intersects(&area)) {
                        return Err(KernelError::Placement(format!(
                            "{} {id} overlaps resource {other}",
                            element.type_name()
                        )));
                    }
                    resources.push((id, area));
                }
                ElementKind::StartLocation(_) => {
                    if !inside(&bounds, &area) {
                        return Err(KernelError::Placement(format!(
                            "start location {id} lies outside the map"
                        )));
                    }
                    bases.push((id, area));
                }
                _ => {}
            }
        }

        let clearance = Fixed::from_num(BASE_CLEARANCE_QUADS * QUAD_TILE_CELLS);
        for (base, area) in &bases {
            let keep_clear = area.inflate(clearance);
            if let Some((resource, _)) = resources.iter().find(|(_, r)| r.intersects(&keep_clear)) {
                return Err(KernelError::Placement(format!(
                    "resource {resource} is too close to start location {base}"
                )));
            }
        }
        Ok(())
    }

    fn bootstrap(&mut self, record: &Record) -> Result<()> {
        let (element, x, y) = match record {
            Record::MapHeader { .. } => {
                return Err(KernelError::InvalidMap("duplicate map header".into()));
            }
            Record::MineralField { x, y, amount } => (ScenarioElement::mineral_field(*amount), x, y),
            Record::VespeneGeyser { x, y, amount } => {
                (ScenarioElement::vespene_geyser(*amount), x, y)
            }
            Record::StartLocation { x, y, player } => {
                let Some(index) = PlayerIndex::new(*player) else {
                    return Err(KernelError::InvalidMap(format!("player slot {player} out of range")));
                };
                self.add_player(index);
                (ScenarioElement::start_location(index), x, y)
            }
        };
        let quad = QuadPos::new(i32::from(*x), i32::from(*y));
        let type_name = element.type_name().to_owned();
        let id = self.admit(element);
        if !self.attach_to_map(id, quad.corner()) {
            self.retire(id);
            return Err(KernelError::Placement(format!(
                "{type_name} at quad ({x}, {y}) is outside the map or overlaps another element"
            )));
        }
        Ok(())
    }

    fn element_area(&self, id: ElementId) -> Option<RectFixed> {
        let element = self.element(id)?;
        let key = *element.map_objects().first()?;
        self.spatial().get(key).map(|object| object.bounding_box)
    }
}

fn inside(bounds: &RectFixed, area: &RectFixed) -> bool {
    area.left() >= bounds.left()
        && area.top() >= bounds.top()
        && area.right() <= bounds.right()
        && area.bottom() <= bounds.bottom()
}

fn to_u16(value: u32, what: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| KernelError::InvalidMap(format!("{what} {value} does not fit a record")))
}

fn quad_coords(quad: QuadPos) -> Result<(u16, u16)> {
    let x = u16::try_from(quad.x);
    let y = u16::try_from(quad.y);
    match (x, y) {
        (Ok(x), Ok(y)) => Ok((x, y)),
        _ => Err(KernelError::InvalidMap(format!(
            "quad ({}, {}) cannot be stored in a record",
            quad.x, quad.y
        ))),
    }
}
