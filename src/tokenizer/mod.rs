//! Line tokenization
//!
//! A line is split into 1-based fields on ASCII whitespace. In the default
//! mode a double-quoted span is one field; greedy mode treats quotes as
//! ordinary content. Each field containing a network address is tagged with
//! the address kind and its canonical form; all other fields are ignored.

use crate::config::TokenizerSettings;
use crate::parser::{AddrKind, AddressParser};

/// A field that carries a network address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedField {
    /// 1-based field position within the line
    pub index: u16,
    pub kind: AddrKind,
    pub canonical: String,
}

/// Splits lines into fields and tags address-bearing ones
#[derive(Clone, Debug)]
pub struct FieldTokenizer {
    greedy: bool,
    max_fields: usize,
    parser: AddressParser,
}

impl FieldTokenizer {
    pub fn new(settings: &TokenizerSettings, parser: AddressParser) -> Self {
        Self {
            greedy: settings.greedy,
            // field positions must fit 16 bits
            max_fields: settings.max_fields.min(u16::MAX as usize),
            parser,
        }
    }

    /// Address-bearing fields of `line`, in field order
    pub fn tagged_fields(&self, line: &[u8]) -> Vec<TaggedField> {
        let mut tagged = Vec::new();
        for (i, field) in self.split_fields(line).into_iter().enumerate() {
            if let Some(candidate) = self.parser.first_address(field) {
                tagged.push(TaggedField {
                    index: (i + 1) as u16,
                    kind: candidate.kind,
                    canonical: candidate.canonical,
                });
            }
        }
        tagged
    }

    /// Split on ASCII whitespace, honoring quotes unless greedy
    fn split_fields<'a>(&self, line: &'a [u8]) -> Vec<&'a [u8]> {
        let mut fields = Vec::new();
        let mut start: Option<usize> = None;
        let mut in_quotes = false;

        for (i, &b) in line.iter().enumerate() {
            if b == b'"' && !self.greedy {
                in_quotes = !in_quotes;
            }
            if b.is_ascii_whitespace() && !in_quotes {
                if let Some(s) = start.take() {
                    fields.push(&line[s..i]);
                    if fields.len() >= self.max_fields {
                        return fields;
                    }
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            fields.push(&line[s..]);
        }
        fields
    }
}
