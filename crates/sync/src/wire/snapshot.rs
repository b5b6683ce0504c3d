use bitflags::bitflags;
use glam::{Quat, Vec3};

use super::quat;

/// Largest possible encoding: flags, sequence, position, non-basis
/// rotation, scale.
pub const MAX_SNAPSHOT_SIZE: usize = 1 + 4 + 12 + 7 + 12;

bitflags! {
    /// Which fields are physically present in a snapshot payload, plus the
    /// two protocol markers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SyncFields: u8 {
        const POSITION = 1;
        const ROTATION = 1 << 1;
        const SCALE = 1 << 2;
        /// Payload carries a sequence number; receivers drop stale ones.
        const SEQUENCED = 1 << 3;
        /// Sender reports the transform stopped moving. Sent reliably with
        /// all configured fields so the receiver holds an exact rest state.
        const SETTLED = 1 << 4;
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("snapshot truncated: needed {needed} more bytes, had {remaining}")]
    Truncated { needed: usize, remaining: usize },
    #[error("unknown field bits in flags byte {0:#04x}")]
    UnknownFields(u8),
    #[error("rotation index {0} out of range")]
    RotationIndex(u8),
    #[error("{0} trailing bytes after snapshot payload")]
    TrailingBytes(usize),
}

/// One transmitted pose update. Absent fields hold neutral values until
/// filled in from the receiver's previous goal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSnapshot {
    pub fields: SyncFields,
    pub sequence: u32,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl PoseSnapshot {
    pub fn new(
        fields: SyncFields,
        sequence: u32,
        position: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) -> Self {
        Self {
            fields,
            sequence,
            position,
            rotation,
            scale,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.fields.contains(SyncFields::SETTLED)
    }

    /// Serializes into the exact interop layout:
    /// `u8 flags | u32 seq | f32x3 pos | u8 rotIndex + i16x3 | f32x3 scale`,
    /// little-endian, each section present only when its flag is set and the
    /// rotation integers omitted for basis indices.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAX_SNAPSHOT_SIZE);
        out.push(self.fields.bits());

        if self.fields.contains(SyncFields::SEQUENCED) {
            out.extend_from_slice(&self.sequence.to_le_bytes());
        }
        if self.fields.contains(SyncFields::POSITION) {
            write_vec3(&mut out, self.position);
        }
        if self.fields.contains(SyncFields::ROTATION) {
            let (index, a, b, c) = quat::compress(self.rotation);
            out.push(index);
            if !quat::is_basis_index(index) {
                out.extend_from_slice(&a.to_le_bytes());
                out.extend_from_slice(&b.to_le_bytes());
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        if self.fields.contains(SyncFields::SCALE) {
            write_vec3(&mut out, self.scale);
        }

        out
    }

    /// Decodes a snapshot, rejecting truncated or over-long payloads. A
    /// failure only loses this one update; the connection stays usable.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);

        let bits = reader.read_u8()?;
        let fields = SyncFields::from_bits(bits).ok_or(WireError::UnknownFields(bits))?;

        let mut snapshot = Self::new(fields, 0, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);

        if fields.contains(SyncFields::SEQUENCED) {
            snapshot.sequence = reader.read_u32()?;
        }
        if fields.contains(SyncFields::POSITION) {
            snapshot.position = reader.read_vec3()?;
        }
        if fields.contains(SyncFields::ROTATION) {
            let index = reader.read_u8()?;
            if index > 7 {
                return Err(WireError::RotationIndex(index));
            }
            let (mut a, mut b, mut c) = (0, 0, 0);
            if !quat::is_basis_index(index) {
                a = reader.read_i16()?;
                b = reader.read_i16()?;
                c = reader.read_i16()?;
            }
            snapshot.rotation = quat::decompress(index, a, b, c);
        }
        if fields.contains(SyncFields::SCALE) {
            snapshot.scale = reader.read_vec3()?;
        }

        if reader.remaining() > 0 {
            return Err(WireError::TrailingBytes(reader.remaining()));
        }

        Ok(snapshot)
    }
}

fn write_vec3(out: &mut Vec<u8>, v: Vec3) {
    out.extend_from_slice(&v.x.to_le_bytes());
    out.extend_from_slice(&v.y.to_le_bytes());
    out.extend_from_slice(&v.z.to_le_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn read_i16(&mut self) -> Result<i16, WireError> {
        let bytes = self.take(2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f32(&mut self) -> Result<f32, WireError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_vec3(&mut self) -> Result<Vec3, WireError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }
}
