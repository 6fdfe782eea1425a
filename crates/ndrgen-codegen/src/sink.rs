//! Output sinks for format-string emission
//!
//! Every emitter writes through [`FormatSink`]. A [`FormatBuffer`] records
//! the items; a [`SizeCounter`] only advances its cursor. Both compute the
//! cursor from [`FormatItem::len`], so a sizing pass and a recording pass
//! over the same input always agree on offsets.

use crate::Fc;

/// One field of a format string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatItem {
    /// Shape tag opening a descriptor unit
    Tag(Fc),
    /// Format character inside a unit
    Code(Fc),
    /// Raw byte
    Byte(u8),
    /// Unsigned 16-bit field
    Short(u16),
    /// Signed 16-bit relative offset
    Offset(i16),
    /// Unsigned 32-bit field
    Long(u32),
}

impl FormatItem {
    pub fn len(&self) -> u32 {
        match self {
            FormatItem::Tag(_) | FormatItem::Code(_) | FormatItem::Byte(_) => 1,
            FormatItem::Short(_) | FormatItem::Offset(_) => 2,
            FormatItem::Long(_) => 4,
        }
    }

    /// Append the little-endian encoding
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            FormatItem::Tag(fc) | FormatItem::Code(fc) => out.push(fc.byte()),
            FormatItem::Byte(b) => out.push(b),
            FormatItem::Short(v) => out.extend_from_slice(&v.to_le_bytes()),
            FormatItem::Offset(v) => out.extend_from_slice(&v.to_le_bytes()),
            FormatItem::Long(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

/// Destination of emitted format items
pub trait FormatSink {
    /// Offset the next item will be written at
    fn offset(&self) -> u32;

    fn put(&mut self, item: FormatItem);

    /// True when nothing is recorded
    fn is_dry(&self) -> bool {
        false
    }
}

/// Records items together with their offsets
#[derive(Debug, Clone, Default)]
pub struct FormatBuffer {
    offset: u32,
    items: Vec<(u32, FormatItem)>,
}

impl FormatBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer whose first item lands at `offset`
    pub fn starting_at(offset: u32) -> Self {
        Self {
            offset,
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[(u32, FormatItem)] {
        &self.items
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (_, item) in &self.items {
            item.encode(&mut out);
        }
        out
    }
}

impl FormatSink for FormatBuffer {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn put(&mut self, item: FormatItem) {
        self.items.push((self.offset, item));
        self.offset += item.len();
    }
}

/// Counts bytes without recording them
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeCounter {
    offset: u32,
}

impl SizeCounter {
    pub fn starting_at(offset: u32) -> Self {
        Self { offset }
    }
}

impl FormatSink for SizeCounter {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn put(&mut self, item: FormatItem) {
        self.offset += item.len();
    }

    fn is_dry(&self) -> bool {
        true
    }
}
