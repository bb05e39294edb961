//! Sub-field encoding for composite frame bodies.
//!
//! Handshake and file-start frames carry several values in their single
//! `body` string:
//!
//! ```text
//! ConnectRequest body:  display_name # color # protocol_version
//! FileStart body:       file_name # file_size # payload_kind
//! ```
//!
//! Fields are separated by `#`. A literal `#` or `\` inside a field is
//! escaped with a backslash, so a display name like `A#1` survives the
//! trip as one field instead of splitting into two.

use crate::ProtocolError;

/// Separates fields inside a composite body.
pub const FIELD_SEPARATOR: char = '#';

const ESCAPE: char = '\\';

/// Joins fields into one body, escaping separators and escapes.
pub fn join_fields<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut body = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            body.push(FIELD_SEPARATOR);
        }
        for ch in field.as_ref().chars() {
            if ch == FIELD_SEPARATOR || ch == ESCAPE {
                body.push(ESCAPE);
            }
            body.push(ch);
        }
    }
    body
}

/// Splits a body produced by [`join_fields`] back into its fields.
///
/// An empty body yields one empty field, mirroring `join_fields([""])`.
///
/// # Errors
/// Returns [`ProtocolError::InvalidMessage`] if the body ends in the middle
/// of an escape sequence.
pub fn split_fields(body: &str) -> Result<Vec<String>, ProtocolError> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars();

    while let Some(ch) = chars.next() {
        match ch {
            ESCAPE => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => {
                    return Err(ProtocolError::InvalidMessage(
                        "body ends inside an escape sequence".into(),
                    ));
                }
            },
            FIELD_SEPARATOR => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    Ok(fields)
}
