//! The native log line codec.
//!
//! Log records cross the boundary between the native host process and the
//! supervising process as single lines of text:
//!
//! ```text
//! [<timestamp>, "<escaped-message>"]
//! ```
//!
//! The channel is line-oriented: a pipe, a socket, or an append-only file
//! read while still being written. Because readers tail the channel, a line
//! can be observed before the writer has finished emitting it. The decoder
//! therefore never requires the closing quote or bracket: it recovers
//! whatever fields are fully present, and callers that need the final value
//! re-decode once the line terminator arrives (see [`crate::tail::read_from`]).
//!
//! # Wire format
//!
//! - Timestamp: ASCII decimal digits, no sign, milliseconds since the epoch.
//! - Message: double-quoted on encode, quotes optional on decode; `"` and
//!   `\` are escaped with a backslash, all other content passes through.
//! - Whitespace: the encoder emits exactly one space, after the comma; the
//!   decoder accepts any number of spaces after `[`, around the comma, and
//!   before `]`.
//!
//! # Truncation
//!
//! A strict parser fails closed on a half-written line, which either crashes
//! the reader or drops live log data. The decoder here is a small
//! explicit-state scanner instead: input may end in any state, and the two
//! accumulating states (timestamp digits, message characters) keep whatever
//! has arrived. Only two inputs are unrecoverable: a line that does not
//! start with `[`, and a line with no timestamp digits.

use thiserror::Error;

use crate::record::{LogRecord, TimestampMs};

/// Errors that can occur when decoding a log line.
///
/// Truncation is deliberately not represented here: a prefix of a valid
/// line decodes successfully to a partial record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The line does not begin with `[` after trimming; not a log line.
    #[error("line does not begin with '['")]
    MissingBracket,

    /// No timestamp digits found after `[`; nothing safe to default to.
    #[error("no timestamp digits after '['")]
    MissingTimestamp,
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Encodes a record as one canonical log line.
///
/// The output is deterministic: `[<millis>, "<message>"]` with `"` and `\`
/// escaped and exactly one space after the comma. Every timestamp and every
/// message encodes; there are no error conditions. Raw newlines in the
/// message pass through unescaped and are the caller's concern.
pub fn encode_line(ts: TimestampMs, message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());
    for ch in message.chars() {
        if ch == '"' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("[{}, \"{}\"]", ts, escaped)
}

/// Decodes one log line, canonical or truncated.
///
/// Whitespace slack after `[`, around the comma, and before `]` is
/// accepted, as is a missing closing quote or bracket: input may stop at
/// any point after the timestamp digits, and the decoder returns the
/// timestamp plus as much of the message as has arrived. Detecting whether
/// the line was fully flushed is the caller's job (look for the trailing
/// `]` or the line terminator in the raw stream); a decode of a prefix is
/// advisory, not final.
///
/// # Errors
///
/// Returns [`DecodeError::MissingBracket`] if the trimmed input does not
/// start with `[`, and [`DecodeError::MissingTimestamp`] if no digits
/// follow it. The caller decides whether to retry with more input or
/// discard the line.
pub fn decode_line(raw: &str) -> Result<LogRecord> {
    let chars: Vec<char> = raw.trim().chars().collect();
    let mut index = 0usize;

    if chars.first() != Some(&'[') {
        return Err(DecodeError::MissingBracket);
    }
    index += 1;
    skip_spaces(&chars, &mut index);

    let ts = consume_timestamp(&chars, &mut index)?;

    skip_spaces(&chars, &mut index);
    if chars.get(index) == Some(&',') {
        index += 1;
    }
    skip_spaces(&chars, &mut index);

    let message = consume_message(&chars, &mut index);

    Ok(LogRecord::new(ts, message))
}

/// Reads the contiguous digit run following `[`.
///
/// Accumulates with saturating arithmetic so a garbage-length digit run
/// pins at `u64::MAX` instead of failing; the decoder stays total.
fn consume_timestamp(chars: &[char], index: &mut usize) -> Result<TimestampMs> {
    let start = *index;
    let mut millis: u64 = 0;
    while let Some(digit) = chars.get(*index).and_then(|ch| ch.to_digit(10)) {
        millis = millis.saturating_mul(10).saturating_add(digit as u64);
        *index += 1;
    }
    if *index == start {
        return Err(DecodeError::MissingTimestamp);
    }
    Ok(TimestampMs(millis))
}

/// Reads the message, quoted or bare, up to its terminator or end of input.
fn consume_message(chars: &[char], index: &mut usize) -> String {
    let quoted = chars.get(*index) == Some(&'"');
    if quoted {
        *index += 1;
    }

    let mut message = String::new();
    while *index < chars.len() {
        let ch = chars[*index];
        if quoted && ch == '"' {
            // closing quote: the rest of the line is framing
            break;
        }
        if !quoted && ch == ']' {
            break;
        }
        if ch == '\\' {
            *index += 1;
            match chars.get(*index) {
                Some(&escaped) => message.push(escaped),
                // input ended mid-escape; half an escape carries no content
                None => break,
            }
            *index += 1;
            continue;
        }
        message.push(ch);
        *index += 1;
    }

    if !quoted {
        // spaces ahead of the closing bracket are framing, not content
        message.truncate(message.trim_end_matches(' ').len());
    }
    message
}

fn skip_spaces(chars: &[char], index: &mut usize) {
    while chars.get(*index) == Some(&' ') {
        *index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decoded(raw: &str) -> (u64, String) {
        let record = decode_line(raw).expect("expected a decodable line");
        (record.ts.0, record.message)
    }

    mod encode {
        use super::*;

        #[test]
        fn canonical_example() {
            let line = encode_line(TimestampMs(1_700_000_000_000), "boot complete");
            assert_eq!(line, r#"[1700000000000, "boot complete"]"#);
        }

        #[test]
        fn escapes_quotes() {
            let line = encode_line(TimestampMs(1), r#"say "hi""#);
            assert_eq!(line, r#"[1, "say \"hi\""]"#);
        }

        #[test]
        fn escapes_backslashes() {
            let line = encode_line(TimestampMs(1), r"C:\logs");
            assert_eq!(line, r#"[1, "C:\\logs"]"#);
        }

        #[test]
        fn empty_message() {
            assert_eq!(encode_line(TimestampMs(0), ""), r#"[0, ""]"#);
        }

        #[test]
        fn unicode_passes_through() {
            let line = encode_line(TimestampMs(7), "héllo ☃");
            assert_eq!(line, "[7, \"héllo ☃\"]");
        }
    }

    mod decode {
        use super::*;

        #[test]
        fn rejects_non_bracketed_input() {
            assert_eq!(decode_line("not a line"), Err(DecodeError::MissingBracket));
            assert_eq!(decode_line(""), Err(DecodeError::MissingBracket));
            assert_eq!(decode_line("   "), Err(DecodeError::MissingBracket));
            assert_eq!(
                decode_line(r#"{"ts": 1}"#),
                Err(DecodeError::MissingBracket)
            );
        }

        #[test]
        fn rejects_missing_timestamp() {
            assert_eq!(
                decode_line(r#"[, "m"]"#),
                Err(DecodeError::MissingTimestamp)
            );
            assert_eq!(decode_line("["), Err(DecodeError::MissingTimestamp));
            assert_eq!(decode_line("[]"), Err(DecodeError::MissingTimestamp));
            assert_eq!(
                decode_line(r#"[ "m"]"#),
                Err(DecodeError::MissingTimestamp)
            );
        }

        #[test]
        fn canonical_line() {
            assert_eq!(
                decoded(r#"[1700000000000, "boot complete"]"#),
                (1_700_000_000_000, "boot complete".to_string())
            );
        }

        #[test]
        fn compact_line_without_space() {
            assert_eq!(decoded(r#"[123,"m"]"#), (123, "m".to_string()));
        }

        #[test]
        fn generous_whitespace() {
            assert_eq!(
                decoded(r#" [  1700000000000  ,  "boot complete" ]"#),
                (1_700_000_000_000, "boot complete".to_string())
            );
        }

        #[test]
        fn unescapes_quotes_and_backslashes() {
            assert_eq!(
                decoded(r#"[1, "say \"hi\""]"#),
                (1, r#"say "hi""#.to_string())
            );
            assert_eq!(decoded(r#"[1, "C:\\logs"]"#), (1, r"C:\logs".to_string()));
        }

        #[test]
        fn bare_message_without_quotes() {
            assert_eq!(decoded("[5, hello]"), (5, "hello".to_string()));
            assert_eq!(decoded("[5, hello world ]"), (5, "hello world".to_string()));
        }

        #[test]
        fn timestamp_only() {
            assert_eq!(decoded("[7]"), (7, String::new()));
            assert_eq!(decoded("[7 ]"), (7, String::new()));
            assert_eq!(decoded("[7, ]"), (7, String::new()));
        }

        #[test]
        fn quoted_message_preserves_inner_whitespace() {
            assert_eq!(decoded(r#"[1, " padded "]"#), (1, " padded ".to_string()));
        }

        #[test]
        fn ignores_framing_after_closing_quote() {
            assert_eq!(decoded(r#"[1, "m"  ]"#), (1, "m".to_string()));
            assert_eq!(decoded(r#"[1, "m"] trailing"#), (1, "m".to_string()));
        }

        #[test]
        fn huge_digit_run_saturates() {
            let (ts, _) = decoded(r#"[999999999999999999999999999999, "m"]"#);
            assert_eq!(ts, u64::MAX);
        }

        #[test]
        fn max_timestamp_is_exact() {
            assert_eq!(
                decoded(&format!(r#"[{}, "m"]"#, u64::MAX)),
                (u64::MAX, "m".to_string())
            );
        }
    }

    mod truncation {
        use super::*;

        #[test]
        fn trailing_bracket_dropped() {
            assert_eq!(
                decoded(r#"[1700000000000, "boot complete""#),
                (1_700_000_000_000, "boot complete".to_string())
            );
        }

        #[test]
        fn closing_quote_and_bracket_dropped() {
            assert_eq!(
                decoded(r#"[1700000000000, "boot complete"#),
                (1_700_000_000_000, "boot complete".to_string())
            );
        }

        #[test]
        fn ends_mid_separator() {
            assert_eq!(decoded("[12,"), (12, String::new()));
            assert_eq!(decoded(r#"[12, ""#), (12, String::new()));
        }

        #[test]
        fn ends_mid_timestamp() {
            // only some digits have arrived; they decode as a smaller number
            assert_eq!(decoded("[17"), (17, String::new()));
        }

        #[test]
        fn ends_mid_message() {
            assert_eq!(decoded(r#"[12, "boot co"#), (12, "boot co".to_string()));
            assert_eq!(decoded("[12, boot co"), (12, "boot co".to_string()));
        }

        #[test]
        fn ends_mid_escape_drops_the_dangling_backslash() {
            assert_eq!(decoded(r#"[1, "a\"#), (1, "a".to_string()));
        }

        proptest! {
            /// Dropping the closing bracket still recovers the full record;
            /// dropping the closing quote as well leaves any trailing
            /// whitespace of the message unprotected from the outer trim,
            /// so the recovered message is the trimmed one.
            #[test]
            fn dropped_terminators_still_decode(ts in any::<u64>(), message in any::<String>()) {
                let line = encode_line(TimestampMs(ts), &message);

                let without_bracket = &line[..line.len() - 1];
                prop_assert_eq!(
                    decode_line(without_bracket),
                    Ok(LogRecord::new(TimestampMs(ts), message.clone()))
                );

                let without_quote = &line[..line.len() - 2];
                prop_assert_eq!(
                    decode_line(without_quote),
                    Ok(LogRecord::new(TimestampMs(ts), message.trim_end()))
                );
            }

            /// Cutting an encoded line anywhere after the timestamp digits
            /// keeps the timestamp intact and yields a prefix of the
            /// message: exactly what a tailing reader sees mid-flush.
            #[test]
            fn any_cut_after_timestamp_keeps_prefix(ts in any::<u64>(), message in any::<String>()) {
                let line = encode_line(TimestampMs(ts), &message);
                let chars: Vec<char> = line.chars().collect();
                let digits_end = 1 + chars[1..]
                    .iter()
                    .take_while(|ch| ch.is_ascii_digit())
                    .count();

                for cut in digits_end..=chars.len() {
                    let prefix: String = chars[..cut].iter().collect();
                    let record = decode_line(&prefix);
                    prop_assert!(record.is_ok(), "cut at {} failed: {:?}", cut, record);
                    let record = record.unwrap();
                    prop_assert_eq!(record.ts, TimestampMs(ts));
                    prop_assert!(
                        message.starts_with(&record.message),
                        "cut at {}: {:?} is not a prefix of {:?}",
                        cut,
                        record.message,
                        message
                    );
                }
            }
        }
    }

    mod roundtrip {
        use super::*;

        proptest! {
            /// The core correctness property: decode(encode(t, m)) == (t, m)
            /// for every timestamp and every message, including quotes,
            /// backslashes, and other Unicode.
            #[test]
            fn decode_inverts_encode(ts in any::<u64>(), message in any::<String>()) {
                let line = encode_line(TimestampMs(ts), &message);
                let record = decode_line(&line);
                prop_assert_eq!(record, Ok(LogRecord::new(TimestampMs(ts), message)));
            }

            /// Space runs after `[`, around the comma, and before `]` never
            /// change the decoded record. Zero-width runs cover the compact
            /// form with no space after the comma.
            #[test]
            fn whitespace_padding_is_ignored(
                ts in any::<u64>(),
                message in any::<String>(),
                pads in prop::array::uniform4(0usize..4),
            ) {
                let canonical = encode_line(TimestampMs(ts), &message);
                // the first comma is the separator: only digits precede it
                let comma = canonical.find(',').unwrap();

                let mut padded = String::from("[");
                padded.push_str(&" ".repeat(pads[0]));
                padded.push_str(&canonical[1..comma]);
                padded.push_str(&" ".repeat(pads[1]));
                padded.push(',');
                padded.push_str(&" ".repeat(pads[2]));
                padded.push_str(&canonical[comma + 2..canonical.len() - 1]);
                padded.push_str(&" ".repeat(pads[3]));
                padded.push(']');

                let record = decode_line(&padded);
                prop_assert_eq!(record, Ok(LogRecord::new(TimestampMs(ts), message)));
            }
        }
    }
}
