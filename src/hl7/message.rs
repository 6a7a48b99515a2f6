//! Parsed HL7 v2 message with structured field lookup.

use indexmap::IndexMap;
use thiserror::Error;

use crate::extraction::{Extractor, FieldAddress, FieldValue};
use crate::hl7::segmenter::MESSAGE_MARKER;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Hl7Error {
    #[error("Message does not start with an MSH segment")]
    MissingHeader,

    #[error("MSH segment is truncated before the field separator")]
    TruncatedHeader,
}

/// Delimiters declared in MSH-1 and MSH-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

impl Delimiters {
    /// Read the delimiters from the start of an MSH segment.
    fn from_header(header: &str) -> Result<Self, Hl7Error> {
        let mut chars = header[MESSAGE_MARKER.len()..].chars();
        let field = chars.next().ok_or(Hl7Error::TruncatedHeader)?;
        let encoding: Vec<char> = chars
            .take_while(|c| *c != field && *c != '\r' && *c != '\n')
            .collect();

        let defaults = Self::default();
        Ok(Self {
            field,
            component: encoding.first().copied().unwrap_or(defaults.component),
            repetition: encoding.get(1).copied().unwrap_or(defaults.repetition),
            escape: encoding.get(2).copied().unwrap_or(defaults.escape),
            subcomponent: encoding.get(3).copied().unwrap_or(defaults.subcomponent),
        })
    }
}

/// One segment; `fields[n]` holds HL7 field number `n` (`fields[0]` is the name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub fields: Vec<String>,
}

/// A single HL7 v2 message split into segments and fields.
///
/// Field numbering follows HL7: for MSH, field 1 is the field separator
/// itself and field 2 holds the encoding characters.
#[derive(Debug, Clone)]
pub struct Hl7Message {
    delimiters: Delimiters,
    segments: Vec<Segment>,
}

impl Hl7Message {
    /// Parse one message produced by [`crate::hl7::split_messages`].
    pub fn parse(raw: &str) -> Result<Self, Hl7Error> {
        let raw = raw.trim_start();
        if !raw.starts_with(MESSAGE_MARKER) {
            return Err(Hl7Error::MissingHeader);
        }
        let delimiters = Delimiters::from_header(raw)?;

        let segments = raw
            .split(['\r', '\n'])
            .filter_map(|line| Self::parse_segment(line, &delimiters))
            .collect();

        Ok(Self {
            delimiters,
            segments,
        })
    }

    fn parse_segment(line: &str, delimiters: &Delimiters) -> Option<Segment> {
        let mut parts = line.split(delimiters.field);
        let name = parts.next()?.trim().to_string();
        if name.is_empty() {
            return None;
        }

        let mut fields = vec![name.clone()];
        if name == MESSAGE_MARKER {
            fields.push(delimiters.field.to_string());
        }
        fields.extend(parts.map(str::to_string));

        Some(Segment { name, fields })
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn find_segment(&self, name: &str, occurrence: usize) -> Option<&Segment> {
        self.segments
            .iter()
            .filter(|s| s.name == name)
            .nth(occurrence)
    }

    /// Replace HL7 escape sequences (`\F\`, `\S\`, `\T\`, `\R\`, `\E\`) with the
    /// delimiters they stand for. Unknown sequences are kept verbatim.
    fn unescape(&self, text: &str) -> String {
        let esc = self.delimiters.escape;
        if !text.contains(esc) {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(esc) {
            out.push_str(&rest[..start]);
            let after = &rest[start + esc.len_utf8()..];
            match after.find(esc) {
                Some(end) => {
                    let code = &after[..end];
                    match code {
                        "F" => out.push(self.delimiters.field),
                        "S" => out.push(self.delimiters.component),
                        "T" => out.push(self.delimiters.subcomponent),
                        "R" => out.push(self.delimiters.repetition),
                        "E" => out.push(esc),
                        _ => {
                            out.push(esc);
                            out.push_str(code);
                            out.push(esc);
                        }
                    }
                    rest = &after[end + esc.len_utf8()..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl Extractor for Hl7Message {
    fn extract(&self, address: &FieldAddress) -> Option<FieldValue> {
        let segment = self.find_segment(&address.segment, address.occurrence)?;
        let raw = segment.fields.get(address.field)?;

        // MSH-1 and MSH-2 are the delimiters themselves
        if segment.name == MESSAGE_MARKER && address.field <= 2 {
            return Some(FieldValue::Scalar(raw.clone()));
        }

        let first_repetition = raw.split(self.delimiters.repetition).next().unwrap_or("");

        match address.component {
            Some(index) => first_repetition
                .split(self.delimiters.component)
                .nth(index.checked_sub(1)?)
                .filter(|c| !c.is_empty())
                .map(|c| FieldValue::Scalar(self.unescape(c))),
            None if first_repetition.contains(self.delimiters.component) => {
                let parts: IndexMap<usize, String> = first_repetition
                    .split(self.delimiters.component)
                    .enumerate()
                    .map(|(i, c)| (i + 1, self.unescape(c)))
                    .collect();
                if parts.values().all(String::is_empty) {
                    None
                } else {
                    Some(FieldValue::Composite(parts))
                }
            }
            None if first_repetition.is_empty() => None,
            None => Some(FieldValue::Scalar(self.unescape(first_repetition))),
        }
    }

    fn occurrences(&self, segment: &str) -> usize {
        self.segments.iter().filter(|s| s.name == segment).count()
    }
}
