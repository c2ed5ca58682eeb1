//! Minimal class-file reader.
//!
//! Parses just enough structure to address constant-pool entries by byte
//! offset and to reach the class-level attribute table: the pool entry table
//! is walked once in index order (offsets are monotonically increasing with
//! index), then fields and methods are skipped over without interpretation.
//! Nothing here validates bytecode; malformed input surfaces as an error.

use anyhow::{Context, Result, bail};

use crate::mutf8;

const MAGIC: u32 = 0xCAFE_BABE;

pub const CONSTANT_UTF8: u8 = 1;
pub const CONSTANT_CLASS: u8 = 7;

/// Byte offsets and tags for every constant-pool entry of one class file.
///
/// `offset(i)` points at the entry's content, just past the tag byte, so a
/// Utf8 entry's two-byte length prefix sits exactly at its offset.
#[derive(Debug)]
pub struct ConstantPool {
    offsets: Vec<usize>,
    tags: Vec<u8>,
    end: usize,
}

impl ConstantPool {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if read_u32(bytes, 0)? != MAGIC {
            bail!("not a class file (bad magic)");
        }

        let count = read_u16(bytes, 8)? as usize;
        let mut offsets = vec![0usize; count];
        let mut tags = vec![0u8; count];
        let mut offset = 10usize;
        let mut index = 1usize;

        while index < count {
            let tag = *bytes
                .get(offset)
                .with_context(|| format!("constant pool truncated at entry {index}"))?;
            offsets[index] = offset + 1;
            tags[index] = tag;

            let size = match tag {
                CONSTANT_UTF8 => 2 + read_u16(bytes, offset + 1)? as usize,
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => 4,
                5 | 6 => 8,
                CONSTANT_CLASS | 8 | 16 | 19 | 20 => 2,
                15 => 3,
                other => bail!("unknown constant pool tag {other} at entry {index}"),
            };
            offset += 1 + size;

            // Long and Double entries occupy two pool slots; the second slot
            // stays unusable (tag 0).
            index += if tag == 5 || tag == 6 { 2 } else { 1 };
        }

        if offset > bytes.len() {
            bail!("constant pool runs past end of file");
        }

        Ok(Self {
            offsets,
            tags,
            end: offset,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn tag(&self, index: usize) -> u8 {
        self.tags.get(index).copied().unwrap_or(0)
    }

    pub fn offset(&self, index: usize) -> usize {
        self.offsets.get(index).copied().unwrap_or(0)
    }

    /// Offset just past the last pool entry, where `access_flags` begins.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn utf8(&self, bytes: &[u8], index: usize) -> Result<String> {
        if self.tag(index) != CONSTANT_UTF8 {
            bail!("constant {index} is not a Utf8 entry");
        }
        let offset = self.offset(index);
        let length = read_u16(bytes, offset)? as usize;
        let payload = bytes
            .get(offset + 2..offset + 2 + length)
            .with_context(|| format!("Utf8 constant {index} runs past end of file"))?;
        mutf8::decode(payload)
    }

    pub fn class_name(&self, bytes: &[u8], index: usize) -> Result<String> {
        if self.tag(index) != CONSTANT_CLASS {
            bail!("constant {index} is not a Class entry");
        }
        let name_index = read_u16(bytes, self.offset(index))? as usize;
        self.utf8(bytes, name_index)
    }

    /// The class's own binary name, in slash form.
    pub fn this_class_name(&self, bytes: &[u8]) -> Result<String> {
        let index = read_u16(bytes, self.end + 2)? as usize;
        self.class_name(bytes, index)
    }

    /// Offset of the class-level `attributes_count`, past interfaces, fields,
    /// and methods.
    pub fn class_attributes_offset(&self, bytes: &[u8]) -> Result<usize> {
        let mut offset = self.end + 6;
        let interfaces = read_u16(bytes, offset)? as usize;
        offset += 2 + interfaces * 2;
        offset = skip_members(bytes, offset)?;
        offset = skip_members(bytes, offset)?;
        Ok(offset)
    }
}

fn skip_members(bytes: &[u8], mut offset: usize) -> Result<usize> {
    let count = read_u16(bytes, offset)? as usize;
    offset += 2;
    for _ in 0..count {
        // access_flags, name_index, descriptor_index
        offset += 6;
        offset = skip_attributes(bytes, offset)?;
    }
    Ok(offset)
}

fn skip_attributes(bytes: &[u8], mut offset: usize) -> Result<usize> {
    let count = read_u16(bytes, offset)? as usize;
    offset += 2;
    for _ in 0..count {
        let length = read_u32(bytes, offset + 2)? as usize;
        offset += 6 + length;
    }
    Ok(offset)
}

pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    let slice = bytes
        .get(offset..offset + 2)
        .with_context(|| format!("unexpected end of class file at offset {offset}"))?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let slice = bytes
        .get(offset..offset + 4)
        .with_context(|| format!("unexpected end of class file at offset {offset}"))?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::mutf8;

    pub fn utf8_entry(s: &str) -> Vec<u8> {
        let payload = mutf8::encode(s);
        let mut entry = vec![super::CONSTANT_UTF8];
        entry.extend((payload.len() as u16).to_be_bytes());
        entry.extend(payload);
        entry
    }

    pub fn class_entry(utf8_index: u16) -> Vec<u8> {
        let mut entry = vec![super::CONSTANT_CLASS];
        entry.extend(utf8_index.to_be_bytes());
        entry
    }

    /// Assembles a minimal class: `#1` Utf8 name, `#2` Class(#1), `#3` Utf8
    /// "java/lang/Object", `#4` Class(#3), then `extra` entries from `#5` on,
    /// no interfaces, no fields, no methods, and the given class attributes.
    pub fn build_class(name: &str, extra: &[Vec<u8>], attributes: &[Vec<u8>]) -> Vec<u8> {
        let mut pool: Vec<Vec<u8>> = vec![
            utf8_entry(name),
            class_entry(1),
            utf8_entry("java/lang/Object"),
            class_entry(3),
        ];
        pool.extend_from_slice(extra);

        let slots: usize = pool
            .iter()
            .map(|entry| if entry[0] == 5 || entry[0] == 6 { 2 } else { 1 })
            .sum();

        let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        out.extend(((slots + 1) as u16).to_be_bytes());
        for entry in &pool {
            out.extend(entry);
        }
        out.extend(0x0021u16.to_be_bytes());
        out.extend(2u16.to_be_bytes());
        out.extend(4u16.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend((attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            out.extend(attribute);
        }
        out
    }

    /// A `RuntimeInvisibleAnnotations` attribute holding one zero-argument
    /// annotation whose type descriptor lives at `descriptor_index`. The
    /// attribute name must live at `name_index`.
    pub fn marker_attribute(name_index: u16, descriptor_index: u16) -> Vec<u8> {
        let mut attribute = Vec::new();
        attribute.extend(name_index.to_be_bytes());
        attribute.extend(6u32.to_be_bytes());
        attribute.extend(1u16.to_be_bytes());
        attribute.extend(descriptor_index.to_be_bytes());
        attribute.extend(0u16.to_be_bytes());
        attribute
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{build_class, utf8_entry};
    use super::*;

    #[test]
    fn parse_resolves_this_class_name() {
        let bytes = build_class("a/b/Foo", &[], &[]);
        let pool = ConstantPool::parse(&bytes).unwrap();
        assert_eq!(pool.entry_count(), 5);
        assert_eq!(pool.this_class_name(&bytes).unwrap(), "a/b/Foo");
        assert_eq!(pool.utf8(&bytes, 3).unwrap(), "java/lang/Object");
    }

    #[test]
    fn offsets_increase_with_index() {
        let bytes = build_class("a/b/Foo", &[utf8_entry("x"), utf8_entry("y")], &[]);
        let pool = ConstantPool::parse(&bytes).unwrap();
        let mut previous = 0usize;
        for index in 1..pool.entry_count() {
            assert!(pool.offset(index) > previous);
            previous = pool.offset(index);
        }
    }

    #[test]
    fn long_entries_occupy_two_slots() {
        // tag 5 (Long) + 8 payload bytes, then one more Utf8 entry.
        let mut long_entry = vec![5u8];
        long_entry.extend(42u64.to_be_bytes());
        let bytes = build_class("a/b/Foo", &[long_entry, utf8_entry("after")], &[]);
        let pool = ConstantPool::parse(&bytes).unwrap();
        assert_eq!(pool.tag(5), 5);
        assert_eq!(pool.tag(6), 0);
        assert_eq!(pool.utf8(&bytes, 7).unwrap(), "after");
        assert_eq!(pool.this_class_name(&bytes).unwrap(), "a/b/Foo");
    }

    #[test]
    fn rejects_non_class_input() {
        assert!(ConstantPool::parse(b"not a class file").is_err());
        assert!(ConstantPool::parse(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]).is_err());
    }

    #[test]
    fn rejects_truncated_pool() {
        let mut bytes = build_class("a/b/Foo", &[], &[]);
        bytes.truncate(14);
        assert!(ConstantPool::parse(&bytes).is_err());
    }
}
