//! Surgical constant-pool rewriting over raw class bytes.
//!
//! Every other structure in a class file refers to text constants by pool
//! index, never by byte offset, so changing a Utf8 entry's byte length needs
//! no fixups anywhere else in the file. The rewrite is a single linear copy
//! of the input buffer with new length-prefixed payloads spliced in at the
//! recorded entry offsets; bytes outside those spans are copied verbatim.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::classfile::{CONSTANT_UTF8, ConstantPool, read_u16};
use crate::mutf8;
use crate::rules::Ruleset;

#[derive(Debug)]
struct PatchSpan {
    offset: usize,
    length: usize,
    new_value: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewrittenClass {
    pub class_name: String,
    pub renamed: bool,
    pub patched_constants: usize,
}

/// Rewrites one compiled class into the stream produced by `open`.
///
/// `open` is invoked exactly once, with the final (possibly relocated) binary
/// name, after every patch span has been computed; a malformed buffer fails
/// before any output stream exists. The returned writer is flushed and
/// dropped before this function returns.
pub fn rewrite_class<W, F>(rules: &Ruleset, bytes: &[u8], open: F) -> Result<RewrittenClass>
where
    W: Write,
    F: FnOnce(&str) -> Result<W>,
{
    let pool = ConstantPool::parse(bytes)?;
    let original_name = pool.this_class_name(bytes)?;
    let class_name = rules.apply(&original_name);

    let mut spans: Vec<PatchSpan> = Vec::new();
    for index in 1..pool.entry_count() {
        if pool.tag(index) != CONSTANT_UTF8 {
            continue;
        }
        let offset = pool.offset(index);
        let length = read_u16(bytes, offset)? as usize;
        let payload = bytes
            .get(offset + 2..offset + 2 + length)
            .with_context(|| format!("Utf8 constant {index} runs past end of file"))?;
        // An entry that does not decode (lone surrogate halves) cannot contain
        // a class name; it is left byte-identical.
        let Ok(original) = mutf8::decode(payload) else {
            continue;
        };
        let rewritten = rules.apply(&original);
        if rewritten != original {
            spans.push(PatchSpan {
                offset,
                length,
                new_value: mutf8::encode(&rewritten),
            });
        }
    }

    let patched_constants = spans.len();
    let mut out = open(&class_name)?;
    let mut copied = 0usize;
    for span in &spans {
        let new_length = u16::try_from(span.new_value.len())
            .map_err(|_| anyhow::anyhow!("rewritten constant exceeds 65535 bytes"))?;
        out.write_all(&bytes[copied..span.offset])?;
        out.write_all(&new_length.to_be_bytes())?;
        out.write_all(&span.new_value)?;
        copied = span.offset + 2 + span.length;
    }
    out.write_all(&bytes[copied..])?;
    out.flush()?;

    Ok(RewrittenClass {
        renamed: class_name != original_name,
        class_name,
        patched_constants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::testutil::{build_class, utf8_entry};

    fn ruleset() -> Ruleset {
        Ruleset::new(vec!["a/b/Foo".to_string()])
    }

    fn rewrite_to_vec(rules: &Ruleset, bytes: &[u8]) -> (RewrittenClass, Vec<u8>) {
        let mut out = Vec::new();
        let summary = rewrite_class(rules, bytes, |_| Ok(&mut out)).unwrap();
        (summary, out)
    }

    #[test]
    fn patches_matching_text_constants() {
        let bytes = build_class(
            "x/y/Uses",
            &[
                utf8_entry("a.b.Foo"),
                utf8_entry("La/b/Foo;"),
                utf8_entry("a/b/FooBar"),
                utf8_entry("unrelated/Name"),
            ],
            &[],
        );
        let (summary, out) = rewrite_to_vec(&ruleset(), &bytes);

        assert_eq!(summary.class_name, "x/y/Uses");
        assert!(!summary.renamed);
        assert_eq!(summary.patched_constants, 3);

        let pool = ConstantPool::parse(&out).unwrap();
        assert_eq!(pool.this_class_name(&out).unwrap(), "x/y/Uses");
        assert_eq!(pool.utf8(&out, 5).unwrap(), "Foo");
        assert_eq!(pool.utf8(&out, 6).unwrap(), "LFoo;");
        // Substring replacement, deliberately not boundary-aware.
        assert_eq!(pool.utf8(&out, 7).unwrap(), "FooBar");
        assert_eq!(pool.utf8(&out, 8).unwrap(), "unrelated/Name");
    }

    #[test]
    fn renames_the_class_itself() {
        let bytes = build_class("a/b/Foo", &[], &[]);
        let mut out = Vec::new();
        let mut sink_name = String::new();
        let summary = rewrite_class(&ruleset(), &bytes, |name| {
            sink_name = name.to_string();
            Ok(&mut out)
        })
        .unwrap();

        assert_eq!(sink_name, "Foo");
        assert_eq!(summary.class_name, "Foo");
        assert!(summary.renamed);
        assert_eq!(summary.patched_constants, 1);
        assert_eq!(ConstantPool::parse(&out).unwrap().this_class_name(&out).unwrap(), "Foo");
    }

    #[test]
    fn length_prefixes_and_total_size_stay_consistent() {
        let bytes = build_class("x/y/Uses", &[utf8_entry("a/b/Foo"), utf8_entry("keep")], &[]);
        let (_, out) = rewrite_to_vec(&ruleset(), &bytes);

        // "a/b/Foo" (7 bytes) became "Foo" (3 bytes): total shrinks by 4.
        assert_eq!(out.len(), bytes.len() - 4);

        let pool = ConstantPool::parse(&out).unwrap();
        let offset = pool.offset(5);
        assert_eq!(read_u16(&out, offset).unwrap(), 3);
        assert_eq!(&out[offset + 2..offset + 5], b"Foo");
    }

    #[test]
    fn bytes_outside_spans_are_preserved() {
        let bytes = build_class("x/y/Uses", &[utf8_entry("a/b/Foo")], &[]);
        let (_, out) = rewrite_to_vec(&ruleset(), &bytes);

        let pool_in = ConstantPool::parse(&bytes).unwrap();
        let pool_out = ConstantPool::parse(&out).unwrap();
        let span_start = pool_in.offset(5);
        // Prefix before the patched entry is untouched, and everything after
        // it is shifted verbatim.
        assert_eq!(out[..span_start], bytes[..span_start]);
        assert_eq!(out[pool_out.end()..], bytes[pool_in.end()..]);
    }

    #[test]
    fn untouched_class_is_copied_byte_for_byte() {
        let bytes = build_class("x/y/Uses", &[utf8_entry("nothing/ToSee")], &[]);
        let (summary, out) = rewrite_to_vec(&ruleset(), &bytes);
        assert_eq!(summary.patched_constants, 0);
        assert_eq!(out, bytes);
    }

    #[test]
    fn malformed_buffer_never_opens_the_sink() {
        let mut opened = false;
        let result = rewrite_class(&ruleset(), b"not a class", |_| {
            opened = true;
            Ok(Vec::new())
        });
        assert!(result.is_err());
        assert!(!opened);
    }
}
