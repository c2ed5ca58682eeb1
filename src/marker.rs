//! Marker-annotation detection on compiled classes.
//!
//! A class is selected for relocation when the marker annotation appears on
//! the type itself, in either the `RuntimeVisibleAnnotations` or the
//! `RuntimeInvisibleAnnotations` class attribute. Annotations on fields and
//! methods are never inspected; the scan stops at the class attribute table.

use anyhow::{Context, Result, bail};

use crate::classfile::{ConstantPool, read_u16, read_u32};

pub const DEFAULT_MARKER_CLASS: &str = "dev.groos.relocator.RootPackage";

const ANNOTATION_ATTRIBUTES: [&str; 2] =
    ["RuntimeVisibleAnnotations", "RuntimeInvisibleAnnotations"];

/// Field descriptor form of a marker class name, accepting dot or slash input.
pub fn descriptor_for(marker_class: &str) -> String {
    format!("L{};", marker_class.replace('.', "/"))
}

#[derive(Debug, Clone)]
pub struct ClassInspection {
    pub name: String,
    pub marked: bool,
}

/// Reads just enough of a compiled class to learn its binary name and whether
/// the marker annotation is present on the type.
pub fn inspect(bytes: &[u8], marker_descriptor: &str) -> Result<ClassInspection> {
    let pool = ConstantPool::parse(bytes)?;
    let name = pool.this_class_name(bytes)?;

    let mut offset = pool.class_attributes_offset(bytes)?;
    let count = read_u16(bytes, offset)? as usize;
    offset += 2;

    let mut marked = false;
    for _ in 0..count {
        let name_index = read_u16(bytes, offset)? as usize;
        let length = read_u32(bytes, offset + 2)? as usize;
        let attribute_name = pool.utf8(bytes, name_index)?;
        if ANNOTATION_ATTRIBUTES.contains(&attribute_name.as_str())
            && annotations_contain(bytes, &pool, offset + 6, marker_descriptor)?
        {
            marked = true;
        }
        offset += 6 + length;
    }

    Ok(ClassInspection { name, marked })
}

fn annotations_contain(
    bytes: &[u8],
    pool: &ConstantPool,
    mut offset: usize,
    descriptor: &str,
) -> Result<bool> {
    let count = read_u16(bytes, offset)? as usize;
    offset += 2;
    for _ in 0..count {
        let type_index = read_u16(bytes, offset)? as usize;
        if pool.utf8(bytes, type_index)? == descriptor {
            return Ok(true);
        }
        offset = skip_annotation(bytes, offset)?;
    }
    Ok(false)
}

fn skip_annotation(bytes: &[u8], mut offset: usize) -> Result<usize> {
    // type_index
    offset += 2;
    let pairs = read_u16(bytes, offset)? as usize;
    offset += 2;
    for _ in 0..pairs {
        // element_name_index
        offset += 2;
        offset = skip_element_value(bytes, offset)?;
    }
    Ok(offset)
}

fn skip_element_value(bytes: &[u8], mut offset: usize) -> Result<usize> {
    let tag = *bytes
        .get(offset)
        .context("annotation element value truncated")?;
    offset += 1;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => Ok(offset + 2),
        b'e' => Ok(offset + 4),
        b'@' => skip_annotation(bytes, offset),
        b'[' => {
            let values = read_u16(bytes, offset)? as usize;
            offset += 2;
            for _ in 0..values {
                offset = skip_element_value(bytes, offset)?;
            }
            Ok(offset)
        }
        other => bail!("unknown annotation element value tag {other}"),
    }
}
