//! Cell-count record set.
//!
//! Four record variants live in one closed enum. Every encoded record starts
//! with a one-byte kind tag and the record's i64 id:
//!
//! | tag | variant          | payload                                             |
//! |-----|------------------|-----------------------------------------------------|
//! | 0   | Count            | timestamp, bool chamber, (i32, i32, f64) or f64     |
//! | 1   | Dilution         | timestamp, f64 sample volume, f64 dilution volume   |
//! | 2   | CountedDilution  | reference count, reference dilution (either absent) |
//! | 3   | CountingSeries   | i32 n, n references                                 |
//!
//! Volumes are in milliliters and densities in cells per milliliter. A
//! chamber count converts to density as `cells / (squares * square_volume *
//! 1000)`.

use std::fmt;
use std::io::Write;

use chrono::NaiveDateTime;
use labtools_store::codec::{ByteReader, ByteWriter};
use labtools_store::{
    CachedReference, Origin, OriginDecoder, OriginEncoder, OriginHandler, Resource, ResourceId,
    ResourceReference, StoreError,
};
use tracing::warn;

use crate::error::RuntimeError;

const CHAMBER_SCALE: f64 = 1000.0;

// ---------------------------------------------------------------------------
// Kind tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Count,
    Dilution,
    CountedDilution,
    CountingSeries,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Count,
        RecordKind::Dilution,
        RecordKind::CountedDilution,
        RecordKind::CountingSeries,
    ];

    pub fn tag(self) -> u8 {
        match self {
            RecordKind::Count => 0,
            RecordKind::Dilution => 1,
            RecordKind::CountedDilution => 2,
            RecordKind::CountingSeries => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Count => "count",
            RecordKind::Dilution => "dilution",
            RecordKind::CountedDilution => "counted dilution",
            RecordKind::CountingSeries => "counting series",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Count
// ---------------------------------------------------------------------------

/// How a count's density was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Counted in a counting chamber.
    Chamber {
        cells: i32,
        squares: i32,
        square_volume: f64,
    },
    /// Density entered directly.
    Density(f64),
}

/// A single cell-count event.
#[derive(Debug, Clone)]
pub struct Count {
    id: Option<ResourceId>,
    time: NaiveDateTime,
    measurement: Measurement,
}

impl Count {
    /// A count with a known density in cells/ml.
    pub fn from_density(density: f64, time: NaiveDateTime) -> Result<Self, RuntimeError> {
        let mut count = Self {
            id: None,
            time,
            measurement: Measurement::Density(0.0),
        };
        count.set_density(density)?;
        Ok(count)
    }

    /// A count taken in a counting chamber: total `cells` over `squares`
    /// squares of `square_volume` each.
    pub fn from_chamber(
        cells: i32,
        squares: i32,
        square_volume: f64,
        time: NaiveDateTime,
    ) -> Result<Self, RuntimeError> {
        let mut count = Self {
            id: None,
            time,
            measurement: Measurement::Density(0.0),
        };
        count.set_chamber(cells, squares, square_volume)?;
        Ok(count)
    }

    pub fn set_density(&mut self, density: f64) -> Result<(), RuntimeError> {
        if density.is_nan() || density < 0.0 {
            return Err(RuntimeError::InvalidRecord(format!(
                "cell density {density} must not be negative"
            )));
        }
        self.measurement = Measurement::Density(density);
        Ok(())
    }

    pub fn set_chamber(
        &mut self,
        cells: i32,
        squares: i32,
        square_volume: f64,
    ) -> Result<(), RuntimeError> {
        if cells < 0 || squares <= 0 || square_volume.is_nan() || square_volume <= 0.0 {
            return Err(RuntimeError::InvalidRecord(format!(
                "chamber count needs cells >= 0 ({cells}), squares > 0 ({squares}) \
                 and square volume > 0 ({square_volume})"
            )));
        }
        self.measurement = Measurement::Chamber {
            cells,
            squares,
            square_volume,
        };
        Ok(())
    }

    pub fn set_time(&mut self, time: NaiveDateTime) {
        self.time = time;
    }

    pub fn time(&self) -> NaiveDateTime {
        self.time
    }

    pub fn measurement(&self) -> Measurement {
        self.measurement
    }

    pub fn chamber_used(&self) -> bool {
        matches!(self.measurement, Measurement::Chamber { .. })
    }

    /// Cells per milliliter.
    pub fn density(&self) -> f64 {
        match self.measurement {
            Measurement::Density(density) => density,
            Measurement::Chamber {
                cells,
                squares,
                square_volume,
            } => f64::from(cells) / (f64::from(squares) * square_volume * CHAMBER_SCALE),
        }
    }

    fn write_payload(&self, writer: &mut ByteWriter) {
        writer
            .put_timestamp(&self.time)
            .put_bool(self.chamber_used());
        match self.measurement {
            Measurement::Chamber {
                cells,
                squares,
                square_volume,
            } => {
                writer.put_i32(cells).put_i32(squares).put_f64(square_volume);
            }
            Measurement::Density(density) => {
                writer.put_f64(density);
            }
        }
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Result<Self, RuntimeError> {
        let time = reader.read_timestamp()?;
        if reader.read_bool()? {
            let cells = reader.read_i32()?;
            let squares = reader.read_i32()?;
            let square_volume = reader.read_f64()?;
            Self::from_chamber(cells, squares, square_volume, time)
        } else {
            Self::from_density(reader.read_f64()?, time)
        }
    }
}

impl PartialEq for Count {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.measurement == other.measurement
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "counted a density of {} / ml at {}", self.density(), self.time)
    }
}

// ---------------------------------------------------------------------------
// Dilution
// ---------------------------------------------------------------------------

/// A single sample-dilution event.
#[derive(Debug, Clone)]
pub struct Dilution {
    id: Option<ResourceId>,
    time: NaiveDateTime,
    sample_volume: f64,
    dilution_volume: f64,
}

impl Dilution {
    pub fn new(
        sample_volume: f64,
        dilution_volume: f64,
        time: NaiveDateTime,
    ) -> Result<Self, RuntimeError> {
        let mut dilution = Self {
            id: None,
            time,
            sample_volume: 0.0,
            dilution_volume: 0.0,
        };
        dilution.set_sample_volume(sample_volume)?;
        dilution.set_dilution_volume(dilution_volume)?;
        Ok(dilution)
    }

    pub fn set_sample_volume(&mut self, volume: f64) -> Result<(), RuntimeError> {
        self.sample_volume = non_negative_volume("sample", volume)?;
        Ok(())
    }

    pub fn set_dilution_volume(&mut self, volume: f64) -> Result<(), RuntimeError> {
        self.dilution_volume = non_negative_volume("dilution", volume)?;
        Ok(())
    }

    pub fn set_time(&mut self, time: NaiveDateTime) {
        self.time = time;
    }

    pub fn time(&self) -> NaiveDateTime {
        self.time
    }

    pub fn sample_volume(&self) -> f64 {
        self.sample_volume
    }

    pub fn dilution_volume(&self) -> f64 {
        self.dilution_volume
    }

    /// Sample plus diluent.
    pub fn total_volume(&self) -> f64 {
        self.sample_volume + self.dilution_volume
    }

    fn write_payload(&self, writer: &mut ByteWriter) {
        writer
            .put_timestamp(&self.time)
            .put_f64(self.sample_volume)
            .put_f64(self.dilution_volume);
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Result<Self, RuntimeError> {
        let time = reader.read_timestamp()?;
        let sample_volume = reader.read_f64()?;
        let dilution_volume = reader.read_f64()?;
        Self::new(sample_volume, dilution_volume, time)
    }
}

fn non_negative_volume(what: &str, volume: f64) -> Result<f64, RuntimeError> {
    if volume.is_nan() || volume < 0.0 {
        return Err(RuntimeError::InvalidRecord(format!(
            "{what} volume {volume} must not be negative"
        )));
    }
    Ok(volume)
}

impl PartialEq for Dilution {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
            && self.sample_volume == other.sample_volume
            && self.dilution_volume == other.dilution_volume
    }
}

// ---------------------------------------------------------------------------
// CountedDilution
// ---------------------------------------------------------------------------

/// Pairs a count with the dilution the counted sample came from.
#[derive(Debug, Clone)]
pub struct CountedDilution {
    id: Option<ResourceId>,
    count: Option<CachedReference<CellCountRecord>>,
    dilution: Option<CachedReference<CellCountRecord>>,
}

impl CountedDilution {
    pub fn new(count: Option<ResourceReference>, dilution: Option<ResourceReference>) -> Self {
        Self {
            id: None,
            count: count.map(CachedReference::new),
            dilution: dilution.map(CachedReference::new),
        }
    }

    pub fn set_count(&mut self, count: Option<ResourceReference>) {
        self.count = count.map(CachedReference::new);
    }

    pub fn set_dilution(&mut self, dilution: Option<ResourceReference>) {
        self.dilution = dilution.map(CachedReference::new);
    }

    pub fn count_reference(&self) -> Option<&ResourceReference> {
        self.count.as_ref().map(CachedReference::reference)
    }

    pub fn dilution_reference(&self) -> Option<&ResourceReference> {
        self.dilution.as_ref().map(CachedReference::reference)
    }

    /// The referenced count, resolved once and cached.
    pub fn count(
        &mut self,
        handler: &OriginHandler<CellCountRecord>,
    ) -> Result<Option<&Count>, StoreError> {
        let Some(cached) = self.count.as_mut() else {
            return Ok(None);
        };
        Ok(cached
            .get_or_refresh_as(handler, RecordKind::Count)?
            .and_then(CellCountRecord::as_count))
    }

    /// The referenced dilution, resolved once and cached.
    pub fn dilution(
        &mut self,
        handler: &OriginHandler<CellCountRecord>,
    ) -> Result<Option<&Dilution>, StoreError> {
        let Some(cached) = self.dilution.as_mut() else {
            return Ok(None);
        };
        Ok(cached
            .get_or_refresh_as(handler, RecordKind::Dilution)?
            .and_then(CellCountRecord::as_dilution))
    }

    /// Drop both cached copies.
    pub fn invalidate(&mut self) {
        for cached in [self.count.as_mut(), self.dilution.as_mut()].into_iter().flatten() {
            cached.invalidate();
        }
    }

    fn write_payload(&self, writer: &mut ByteWriter) -> Result<(), StoreError> {
        writer.put_reference(self.count_reference())?;
        writer.put_reference(self.dilution_reference())?;
        Ok(())
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Result<Self, RuntimeError> {
        let count = reader.read_reference()?;
        let dilution = reader.read_reference()?;
        Ok(Self::new(count, dilution))
    }
}

impl PartialEq for CountedDilution {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count && self.dilution == other.dilution
    }
}

// ---------------------------------------------------------------------------
// CountingSeries
// ---------------------------------------------------------------------------

/// An ordered series of counted dilutions.
#[derive(Debug, Clone, Default)]
pub struct CountingSeries {
    id: Option<ResourceId>,
    entries: Vec<CachedReference<CellCountRecord>>,
}

impl CountingSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, counted_dilution: ResourceReference) {
        self.entries.push(CachedReference::new(counted_dilution));
    }

    /// Remove the first entry pointing at `counted_dilution`.
    pub fn remove(&mut self, counted_dilution: &ResourceReference) -> bool {
        match self
            .entries
            .iter()
            .position(|entry| entry.reference() == counted_dilution)
        {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn references(&self) -> impl Iterator<Item = &ResourceReference> {
        self.entries.iter().map(CachedReference::reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry against the live origins, in series order.
    ///
    /// Entries that cannot be resolved are logged and come back as `None`.
    pub fn events<'h>(
        &self,
        handler: &'h OriginHandler<CellCountRecord>,
    ) -> Vec<Option<&'h CountedDilution>> {
        self.references()
            .map(|reference| {
                match handler.dereference_as(reference, RecordKind::CountedDilution) {
                    Ok(record) => record.and_then(CellCountRecord::as_counted_dilution),
                    Err(err) => {
                        warn!(%reference, error = %err, "series entry could not be resolved");
                        None
                    }
                }
            })
            .collect()
    }

    fn write_payload(&self, writer: &mut ByteWriter) -> Result<(), StoreError> {
        let n = i32::try_from(self.entries.len()).map_err(|_| {
            StoreError::InvalidEncoding(format!("series of {} entries is too long", self.len()))
        })?;
        writer.put_i32(n);
        for reference in self.references() {
            writer.put_reference(Some(reference))?;
        }
        Ok(())
    }

    fn read_payload(reader: &mut ByteReader<'_>) -> Result<Self, RuntimeError> {
        let n = reader.read_i32()?;
        let n = usize::try_from(n).map_err(|_| {
            StoreError::InvalidEncoding(format!("negative series length {n}"))
        })?;
        let mut series = Self::new();
        for _ in 0..n {
            let reference = reader.read_reference()?.ok_or_else(|| {
                StoreError::InvalidEncoding("absent reference inside a counting series".into())
            })?;
            series.add(reference);
        }
        Ok(series)
    }
}

impl PartialEq for CountingSeries {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

// ---------------------------------------------------------------------------
// Record enum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum CellCountRecord {
    Count(Count),
    Dilution(Dilution),
    CountedDilution(CountedDilution),
    CountingSeries(CountingSeries),
}

impl CellCountRecord {
    pub fn as_count(&self) -> Option<&Count> {
        match self {
            CellCountRecord::Count(count) => Some(count),
            _ => None,
        }
    }

    pub fn as_dilution(&self) -> Option<&Dilution> {
        match self {
            CellCountRecord::Dilution(dilution) => Some(dilution),
            _ => None,
        }
    }

    pub fn as_counted_dilution(&self) -> Option<&CountedDilution> {
        match self {
            CellCountRecord::CountedDilution(counted) => Some(counted),
            _ => None,
        }
    }

    pub fn as_counting_series(&self) -> Option<&CountingSeries> {
        match self {
            CellCountRecord::CountingSeries(series) => Some(series),
            _ => None,
        }
    }

    fn id_slot(&mut self) -> &mut Option<ResourceId> {
        match self {
            CellCountRecord::Count(r) => &mut r.id,
            CellCountRecord::Dilution(r) => &mut r.id,
            CellCountRecord::CountedDilution(r) => &mut r.id,
            CellCountRecord::CountingSeries(r) => &mut r.id,
        }
    }

    /// Decode one record, leaving its identity unset. Returns the record and
    /// its stored numeric id.
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<(Self, i64), StoreError> {
        let tag = reader.read_u8()?;
        let kind = RecordKind::from_tag(tag)
            .ok_or_else(|| StoreError::InvalidEncoding(format!("unknown record tag {tag}")))?;
        let id = reader.read_i64()?;
        let record = match kind {
            RecordKind::Count => Count::read_payload(reader).map(CellCountRecord::Count),
            RecordKind::Dilution => Dilution::read_payload(reader).map(CellCountRecord::Dilution),
            RecordKind::CountedDilution => {
                CountedDilution::read_payload(reader).map(CellCountRecord::CountedDilution)
            }
            RecordKind::CountingSeries => {
                CountingSeries::read_payload(reader).map(CellCountRecord::CountingSeries)
            }
        }
        .map_err(into_store_error)?;
        Ok((record, id))
    }
}

fn into_store_error(err: RuntimeError) -> StoreError {
    match err {
        RuntimeError::Store(inner) => inner,
        other => StoreError::InvalidEncoding(other.to_string()),
    }
}

impl From<Count> for CellCountRecord {
    fn from(count: Count) -> Self {
        CellCountRecord::Count(count)
    }
}

impl From<Dilution> for CellCountRecord {
    fn from(dilution: Dilution) -> Self {
        CellCountRecord::Dilution(dilution)
    }
}

impl From<CountedDilution> for CellCountRecord {
    fn from(counted: CountedDilution) -> Self {
        CellCountRecord::CountedDilution(counted)
    }
}

impl From<CountingSeries> for CellCountRecord {
    fn from(series: CountingSeries) -> Self {
        CellCountRecord::CountingSeries(series)
    }
}

impl Resource for CellCountRecord {
    type Kind = RecordKind;

    fn kind(&self) -> RecordKind {
        match self {
            CellCountRecord::Count(_) => RecordKind::Count,
            CellCountRecord::Dilution(_) => RecordKind::Dilution,
            CellCountRecord::CountedDilution(_) => RecordKind::CountedDilution,
            CellCountRecord::CountingSeries(_) => RecordKind::CountingSeries,
        }
    }

    fn id(&self) -> Option<ResourceId> {
        match self {
            CellCountRecord::Count(r) => r.id,
            CellCountRecord::Dilution(r) => r.id,
            CellCountRecord::CountedDilution(r) => r.id,
            CellCountRecord::CountingSeries(r) => r.id,
        }
    }

    fn assign_id(&mut self, id: ResourceId) {
        *self.id_slot() = Some(id);
    }

    fn serialize(&self) -> Result<Vec<u8>, StoreError> {
        let id = self.id().ok_or_else(|| {
            StoreError::MissingInput(format!("{} cannot be serialized without an id", self.kind()))
        })?;
        let mut writer = ByteWriter::new();
        writer.put_u8(self.kind().tag()).put_i64(id.id());
        match self {
            CellCountRecord::Count(count) => count.write_payload(&mut writer),
            CellCountRecord::Dilution(dilution) => dilution.write_payload(&mut writer),
            CellCountRecord::CountedDilution(counted) => counted.write_payload(&mut writer)?,
            CellCountRecord::CountingSeries(series) => series.write_payload(&mut writer)?,
        }
        Ok(writer.into_vec())
    }
}

// ---------------------------------------------------------------------------
// Origin codec
// ---------------------------------------------------------------------------

/// Reads and writes cell-count origins. Records are written in id order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellCountCodec;

impl OriginEncoder<CellCountRecord> for CellCountCodec {
    fn encode(
        &self,
        origin: &Origin<CellCountRecord>,
        sink: &mut dyn Write,
    ) -> Result<(), StoreError> {
        let mut records: Vec<(i64, &CellCountRecord)> = origin
            .iter()
            .filter_map(|record| record.id().map(|id| (id.id(), record)))
            .collect();
        records.sort_unstable_by_key(|(id, _)| *id);
        for (_, record) in records {
            sink.write_all(&record.serialize()?)?;
        }
        Ok(())
    }
}

impl OriginDecoder<CellCountRecord> for CellCountCodec {
    fn decode(
        &self,
        data: &[u8],
        target: &mut Origin<CellCountRecord>,
    ) -> Result<(), StoreError> {
        let mut reader = ByteReader::new(data);
        while reader.has_remaining() {
            let (mut record, id) = CellCountRecord::decode(&mut reader)?;
            record.assign_id(ResourceId::new(target.key(), id));
            target
                .add(record)
                .map_err(|rejected| StoreError::IdentityMismatch(rejected.to_string()))?;
        }
        Ok(())
    }
}
