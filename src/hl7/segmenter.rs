//! Splits an uploaded batch into individual HL7 messages.

/// Literal that starts every HL7 v2 message (the MSH header segment).
pub const MESSAGE_MARKER: &str = "MSH";

/// Split a raw multi-message blob into self-contained message strings.
///
/// The blob is cut at every occurrence of `MSH`. Text before the first
/// marker is not a message and is dropped, as are blank fragments. Each
/// remaining fragment is trimmed and re-prefixed with the marker. Order of
/// appearance is preserved.
///
/// # Example
/// ```
/// use oru_risk::hl7::split_messages;
///
/// let blob = "MSH|^~\\&|A\rPID|1\n\nMSH|^~\\&|B\rPID|2\n";
/// let messages: Vec<String> = split_messages(blob).collect();
/// assert_eq!(messages, vec!["MSH|^~\\&|A\rPID|1", "MSH|^~\\&|B\rPID|2"]);
/// ```
pub fn split_messages(blob: &str) -> impl Iterator<Item = String> + '_ {
    blob.split(MESSAGE_MARKER)
        .skip(1)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| format!("{}{}", MESSAGE_MARKER, fragment))
}
