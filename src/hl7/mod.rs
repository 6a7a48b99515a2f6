//! HL7 v2 message handling: batch segmentation and field lookup.

pub mod segmenter;
pub mod message;

pub use segmenter::{split_messages, MESSAGE_MARKER};
pub use message::{Delimiters, Hl7Error, Hl7Message, Segment};
