//! Minimal two-kind resource used by the unit tests.

use std::fmt;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::StoreError;
use crate::identity::ResourceId;
use crate::origin::{Origin, OriginDecoder};
use crate::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Note,
    Tally,
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Note => f.write_str("note"),
            SampleKind::Tally => f.write_str("tally"),
        }
    }
}

/// Equality ignores the identity so that a re-read record compares equal to
/// the one that was written.
#[derive(Debug, Clone)]
pub struct Sample {
    pub id: Option<ResourceId>,
    pub kind: SampleKind,
    pub label: String,
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.label == other.label
    }
}

impl Sample {
    pub fn note(label: &str) -> Self {
        Self {
            id: None,
            kind: SampleKind::Note,
            label: label.to_string(),
        }
    }

    pub fn tally(label: &str) -> Self {
        Self {
            kind: SampleKind::Tally,
            ..Self::note(label)
        }
    }

    pub fn with_id(mut self, id: ResourceId) -> Self {
        self.id = Some(id);
        self
    }
}

impl Resource for Sample {
    type Kind = SampleKind;

    fn kind(&self) -> SampleKind {
        self.kind
    }

    fn id(&self) -> Option<ResourceId> {
        self.id
    }

    fn assign_id(&mut self, id: ResourceId) {
        self.id = Some(id);
    }

    fn serialize(&self) -> Result<Vec<u8>, StoreError> {
        let id = self
            .id
            .ok_or_else(|| StoreError::MissingInput("sample has no identity".into()))?;
        let mut writer = ByteWriter::new();
        writer
            .put_bool(self.kind == SampleKind::Tally)
            .put_i64(id.id());
        writer.put_text(Some(&self.label))?;
        Ok(writer.into_vec())
    }
}

pub struct SampleDecoder;

impl OriginDecoder<Sample> for SampleDecoder {
    fn decode(&self, data: &[u8], target: &mut Origin<Sample>) -> Result<(), StoreError> {
        let mut reader = ByteReader::new(data);
        while reader.has_remaining() {
            let kind = if reader.read_bool()? {
                SampleKind::Tally
            } else {
                SampleKind::Note
            };
            let id = ResourceId::new(target.key(), reader.read_i64()?);
            let label = reader.read_text()?.unwrap_or_default();
            let sample = Sample {
                id: Some(id),
                kind,
                label,
            };
            target
                .add(sample)
                .map_err(|rejected| StoreError::IdentityMismatch(rejected.to_string()))?;
        }
        Ok(())
    }
}
