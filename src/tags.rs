//! Comment tag codec.
//!
//! Tags cross the engine boundary as one flat text buffer: segments joined by
//! tabs, name and value split on the first `=`. Encoding validates and fails
//! before touching engine memory; decoding is total and never fails.

use thiserror::Error;

use crate::engine::{EngineError, RawBuffer};

/// Joins serialized tag segments.
pub const TAG_SEPARATOR: char = '\t';
/// Splits a segment into name and value. Only the first occurrence counts.
pub const TAG_DELIMITER: char = '=';

/// One piece of container metadata, e.g. a title or artist field.
///
/// On encode, `name` must contain neither [`TAG_DELIMITER`] nor
/// [`TAG_SEPARATOR`], and `value` must not contain [`TAG_SEPARATOR`].
/// `value` may contain `=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Capabilities the tag codec needs from the engine's memory: write a text
/// buffer into engine memory, read one back out. Buffer lifecycle stays with
/// the caller.
pub trait TagMemory {
    /// Write `text` into a newly allocated engine buffer and return its
    /// handle. The caller owns the buffer and must free it.
    fn alloc_text(&self, text: &str) -> Result<RawBuffer, EngineError>;

    /// Read the full text addressed by `buf`.
    fn read_text(&self, buf: RawBuffer) -> String;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    /// A tag name carries `=` or a tab, or a tag value carries a tab.
    #[error("invalid tag format: {field} of tag {index} contains {found:?}")]
    InvalidTagFormat {
        index: usize,
        field: &'static str,
        found: char,
    },
    /// Buffer allocation failed; propagated from the memory capability as-is.
    #[error(transparent)]
    Alloc(#[from] EngineError),
}

/// Serialize `tags` into a freshly allocated engine text buffer.
///
/// Every tag is validated before anything is allocated; an invalid tag fails
/// the whole set with no partial writes. The empty list allocates an empty
/// text buffer. The returned buffer is owned by the caller.
pub fn tags_to_buffer<M>(tags: &[Tag], memory: &M) -> Result<RawBuffer, TagError>
where
    M: TagMemory + ?Sized,
{
    for (index, tag) in tags.iter().enumerate() {
        if let Some(found) = tag
            .name
            .chars()
            .find(|&c| c == TAG_DELIMITER || c == TAG_SEPARATOR)
        {
            return Err(TagError::InvalidTagFormat {
                index,
                field: "name",
                found,
            });
        }
        if tag.value.contains(TAG_SEPARATOR) {
            return Err(TagError::InvalidTagFormat {
                index,
                field: "value",
                found: TAG_SEPARATOR,
            });
        }
    }

    let mut text = String::new();
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            text.push(TAG_SEPARATOR);
        }
        text.push_str(&tag.name);
        text.push(TAG_DELIMITER);
        text.push_str(&tag.value);
    }

    Ok(memory.alloc_text(&text)?)
}

/// Parse an engine text buffer back into tags, in segment order.
///
/// Never fails: the NULL handle and empty text give an empty list, and a
/// segment with no `=` becomes a tag with an empty value. Malformed input is
/// tolerated rather than rejected; nothing is trimmed or deduplicated.
pub fn buffer_to_tags<M>(buf: RawBuffer, memory: &M) -> Vec<Tag>
where
    M: TagMemory + ?Sized,
{
    if buf.is_null() {
        return Vec::new();
    }
    let text = memory.read_text(buf);
    if text.is_empty() {
        return Vec::new();
    }
    text.split(TAG_SEPARATOR)
        .map(|segment| match segment.split_once(TAG_DELIMITER) {
            Some((name, value)) => Tag::new(name, value),
            None => Tag::new(segment, ""),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// In-memory stand-in for the engine heap: remembers the last text
    /// written and hands it back on read.
    struct FakeMemory {
        text: RefCell<String>,
        allocs: Cell<usize>,
    }

    impl FakeMemory {
        fn new() -> Self {
            Self {
                text: RefCell::new(String::new()),
                allocs: Cell::new(0),
            }
        }

        fn with_text(text: &str) -> Self {
            let mem = Self::new();
            *mem.text.borrow_mut() = text.to_string();
            mem
        }
    }

    impl TagMemory for FakeMemory {
        fn alloc_text(&self, text: &str) -> Result<RawBuffer, EngineError> {
            self.allocs.set(self.allocs.get() + 1);
            *self.text.borrow_mut() = text.to_string();
            Ok(RawBuffer::new(0x1000))
        }

        fn read_text(&self, _buf: RawBuffer) -> String {
            self.text.borrow().clone()
        }
    }

    /// Memory that refuses every allocation.
    struct BrokenMemory;

    impl TagMemory for BrokenMemory {
        fn alloc_text(&self, text: &str) -> Result<RawBuffer, EngineError> {
            Err(EngineError::AllocFailed(text.len()))
        }

        fn read_text(&self, _buf: RawBuffer) -> String {
            String::new()
        }
    }

    #[test]
    fn test_empty_tags_serialize_to_empty_text() {
        let mem = FakeMemory::new();
        let buf = tags_to_buffer(&[], &mem).unwrap();
        assert!(!buf.is_null());
        assert_eq!(*mem.text.borrow(), "");
        assert_eq!(mem.allocs.get(), 1);
    }

    #[test]
    fn test_single_tag() {
        let mem = FakeMemory::new();
        let tags = [Tag::new("name1", "value1")];
        tags_to_buffer(&tags, &mem).unwrap();
        assert_eq!(*mem.text.borrow(), "name1=value1");
    }

    #[test]
    fn test_two_tags_join_with_tab() {
        let mem = FakeMemory::new();
        let tags = [Tag::new("name1", "value1"), Tag::new("name2", "value2")];
        tags_to_buffer(&tags, &mem).unwrap();
        assert_eq!(*mem.text.borrow(), "name1=value1\tname2=value2");
    }

    #[test]
    fn test_empty_value_serializes() {
        let mem = FakeMemory::new();
        tags_to_buffer(&[Tag::new("name1", "")], &mem).unwrap();
        assert_eq!(*mem.text.borrow(), "name1=");
    }

    #[test]
    fn test_value_may_contain_equals() {
        let mem = FakeMemory::new();
        tags_to_buffer(&[Tag::new("name1", "value=1")], &mem).unwrap();
        assert_eq!(*mem.text.borrow(), "name1=value=1");
    }

    #[test]
    fn test_name_with_equals_rejected() {
        let mem = FakeMemory::new();
        let err = tags_to_buffer(&[Tag::new("name=1", "value1")], &mem).unwrap_err();
        assert_eq!(
            err,
            TagError::InvalidTagFormat {
                index: 0,
                field: "name",
                found: '=',
            }
        );
    }

    #[test]
    fn test_name_with_tab_rejected() {
        let mem = FakeMemory::new();
        let err = tags_to_buffer(&[Tag::new("name\t1", "value1")], &mem).unwrap_err();
        assert_eq!(
            err,
            TagError::InvalidTagFormat {
                index: 0,
                field: "name",
                found: '\t',
            }
        );
    }

    #[test]
    fn test_value_with_tab_rejected() {
        let mem = FakeMemory::new();
        let err = tags_to_buffer(&[Tag::new("name1", "value\t1")], &mem).unwrap_err();
        assert_eq!(
            err,
            TagError::InvalidTagFormat {
                index: 0,
                field: "value",
                found: '\t',
            }
        );
    }

    #[test]
    fn test_invalid_tag_fails_before_allocating() {
        let mem = FakeMemory::new();
        let tags = [Tag::new("ok", "fine"), Tag::new("bad=name", "v")];
        assert!(tags_to_buffer(&tags, &mem).is_err());
        assert_eq!(mem.allocs.get(), 0);
    }

    #[test]
    fn test_alloc_failure_propagates() {
        let err = tags_to_buffer(&[Tag::new("a", "b")], &BrokenMemory).unwrap_err();
        assert_eq!(err, TagError::Alloc(EngineError::AllocFailed(3)));
    }

    #[test]
    fn test_decode_null_buffer_is_empty() {
        let mem = FakeMemory::with_text("name1=value1");
        assert!(buffer_to_tags(RawBuffer::NULL, &mem).is_empty());
    }

    #[test]
    fn test_decode_empty_text_is_empty() {
        let mem = FakeMemory::with_text("");
        assert!(buffer_to_tags(RawBuffer::new(0x1000), &mem).is_empty());
    }

    #[test]
    fn test_decode_one_tag() {
        let mem = FakeMemory::with_text("name1=value1");
        let tags = buffer_to_tags(RawBuffer::new(0x1000), &mem);
        assert_eq!(tags, vec![Tag::new("name1", "value1")]);
    }

    #[test]
    fn test_decode_two_tags_in_order() {
        let mem = FakeMemory::with_text("name1=value1\tname2=value2");
        let tags = buffer_to_tags(RawBuffer::new(0x1000), &mem);
        assert_eq!(
            tags,
            vec![Tag::new("name1", "value1"), Tag::new("name2", "value2")]
        );
    }

    #[test]
    fn test_decode_empty_value() {
        let mem = FakeMemory::with_text("name1=");
        let tags = buffer_to_tags(RawBuffer::new(0x1000), &mem);
        assert_eq!(tags, vec![Tag::new("name1", "")]);
    }

    #[test]
    fn test_decode_splits_on_first_equals_only() {
        let mem = FakeMemory::with_text("name1=value=1");
        let tags = buffer_to_tags(RawBuffer::new(0x1000), &mem);
        assert_eq!(tags, vec![Tag::new("name1", "value=1")]);
    }

    #[test]
    fn test_decode_tolerates_missing_equals() {
        let mem = FakeMemory::with_text("name1");
        let tags = buffer_to_tags(RawBuffer::new(0x1000), &mem);
        assert_eq!(tags, vec![Tag::new("name1", "")]);
    }

    #[test]
    fn test_decode_preserves_whitespace() {
        let mem = FakeMemory::with_text(" name = v ");
        let tags = buffer_to_tags(RawBuffer::new(0x1000), &mem);
        assert_eq!(tags, vec![Tag::new(" name ", " v ")]);
    }

    #[test]
    fn test_decode_yields_one_tag_per_segment() {
        // Pathological input: every segment still maps to exactly one tag.
        let mem = FakeMemory::with_text("\t\t");
        let tags = buffer_to_tags(RawBuffer::new(0x1000), &mem);
        assert_eq!(
            tags,
            vec![Tag::new("", ""), Tag::new("", ""), Tag::new("", "")]
        );
    }

    #[test]
    fn test_round_trip_preserves_order_and_text() {
        let original = vec![
            Tag::new("TITLE", "Night Drive"),
            Tag::new("ARTIST", "名前"),
            Tag::new("COMMENT", ""),
            Tag::new("URL", "https://example.com/?a=1&b=2"),
        ];
        let mem = FakeMemory::new();
        let buf = tags_to_buffer(&original, &mem).unwrap();
        assert_eq!(buffer_to_tags(buf, &mem), original);
    }

    #[test]
    fn test_round_trip_empty_list() {
        let mem = FakeMemory::new();
        let buf = tags_to_buffer(&[], &mem).unwrap();
        assert!(buffer_to_tags(buf, &mem).is_empty());
    }
}
