use crate::runner::ExitKind;

/// Marker the validator prints in front of its diagnostic.
pub const PRIMARY_MARKER: &str = " ### ";
/// Marker used by the failure summary line; only consulted when the primary
/// marker is absent.
pub const SECONDARY_MARKER: &str = " #*# ";
pub const MSG_NOT_PARSED: &str = "Msg not parsed";

/// Extracts the validator's diagnostic from captured stdout.
///
/// Successful runs carry no message. Otherwise the text after the last
/// marker, up to the end of that line, is returned.
pub fn extract_message(output: &str, exit: &ExitKind) -> String {
    if exit.is_success() {
        return String::new();
    }

    [PRIMARY_MARKER, SECONDARY_MARKER]
        .into_iter()
        .find_map(|marker| after_last(output, marker))
        .map(|msg| msg.trim_end_matches('\r').to_string())
        .unwrap_or_else(|| MSG_NOT_PARSED.to_string())
}

fn after_last<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.rfind(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find('\n').unwrap_or(rest.len());
    Some(&rest[..end])
}

pub const OUT_OF_MEMORY_MESSAGE: &str = "out of memory";

/// The validator reports memory exhaustion through its message more reliably
/// than through its exit code. Only the exact diagnostic counts; a parse
/// error that merely mentions memory does not.
pub fn indicates_out_of_memory(message: &str) -> bool {
    message.trim() == OUT_OF_MEMORY_MESSAGE
}
