//! Byte-level JSON scanning primitives.
//!
//! A hand-rolled cursor engine over `&[u8]`: whitespace skipping, exact
//! literal validation, string unescaping, number token scanning, and a
//! depth-guarded skip of arbitrary well-formed values. Every structural
//! decoder is built on these routines; all of them report byte-exact
//! offsets on failure.

use crate::error::{DecodeError, DecodeResult};

/// Maximum nesting depth tolerated while decoding or skipping values.
pub const MAX_DEPTH: usize = 10_000;

/// Advances past insignificant whitespace.
#[inline]
pub(crate) fn skip_whitespace(buf: &[u8], mut cur: usize) -> usize {
    while let Some(&b) = buf.get(cur) {
        match b {
            b' ' | b'\t' | b'\n' | b'\r' => cur += 1,
            _ => break,
        }
    }
    cur
}

/// Fails with [`DecodeError::ExceededMaxDepth`] once `depth` passes the limit.
#[inline]
pub(crate) fn check_depth(buf: &[u8], cur: usize, depth: usize) -> DecodeResult<()> {
    if depth > MAX_DEPTH {
        Err(DecodeError::ExceededMaxDepth {
            byte: buf.get(cur).copied().unwrap_or(0),
            offset: cur,
        })
    } else {
        Ok(())
    }
}

fn expect_literal(buf: &[u8], cur: usize, lit: &'static str) -> DecodeResult<()> {
    if buf[cur..].starts_with(lit.as_bytes()) {
        Ok(())
    } else {
        Err(DecodeError::Syntax {
            message: format!("invalid '{lit}' literal"),
            offset: cur,
        })
    }
}

/// Validates the 4 bytes at `cur` spell `null`.
pub(crate) fn validate_null(buf: &[u8], cur: usize) -> DecodeResult<()> {
    expect_literal(buf, cur, "null")
}

/// Validates the 4 bytes at `cur` spell `true`.
pub(crate) fn validate_true(buf: &[u8], cur: usize) -> DecodeResult<()> {
    expect_literal(buf, cur, "true")
}

/// Validates the 5 bytes at `cur` spell `false`.
pub(crate) fn validate_false(buf: &[u8], cur: usize) -> DecodeResult<()> {
    expect_literal(buf, cur, "false")
}

/// Scans a number token starting at `cur` and returns the end offset.
/// Tolerant by design; the caller parses the token and reports coercion
/// failures with the token text.
pub(crate) fn skip_number(buf: &[u8], mut cur: usize) -> usize {
    while let Some(&b) = buf.get(cur) {
        match b {
            b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E' => cur += 1,
            _ => break,
        }
    }
    cur
}

/// Skips one value of any kind, enforcing the nesting limit. `cur` may sit
/// on leading whitespace; the returned cursor is one past the value.
pub(crate) fn skip_value(buf: &[u8], cur: usize, depth: usize) -> DecodeResult<usize> {
    let cur = skip_whitespace(buf, cur);
    match buf.get(cur) {
        Some(b'{' | b'[') => skip_container(buf, cur, depth),
        Some(b'"') => skip_string(buf, cur),
        Some(b'-' | b'0'..=b'9') => Ok(skip_number(buf, cur)),
        Some(b't') => {
            validate_true(buf, cur)?;
            Ok(cur + 4)
        }
        Some(b'f') => {
            validate_false(buf, cur)?;
            Ok(cur + 5)
        }
        Some(b'n') => {
            validate_null(buf, cur)?;
            Ok(cur + 4)
        }
        Some(&b) => Err(DecodeError::InvalidCharacter {
            byte: b,
            context: "value",
            offset: cur,
        }),
        None => Err(DecodeError::UnexpectedEnd {
            context: "value",
            offset: cur,
        }),
    }
}

/// Skips a balanced `{...}` / `[...]` run without decoding it. Strings are
/// honored so brackets inside them do not count.
fn skip_container(buf: &[u8], mut cur: usize, depth: usize) -> DecodeResult<usize> {
    let start = cur;
    let mut level = 0usize;
    while cur < buf.len() {
        match buf[cur] {
            b'"' => {
                cur = skip_string(buf, cur)?;
            }
            b'{' | b'[' => {
                level += 1;
                check_depth(buf, cur, depth + level)?;
                cur += 1;
            }
            b'}' | b']' => {
                level -= 1;
                cur += 1;
                if level == 0 {
                    return Ok(cur);
                }
            }
            _ => cur += 1,
        }
    }
    Err(DecodeError::UnexpectedEnd {
        context: "value",
        offset: start,
    })
}

/// Skips a string token. `cur` must sit on the opening quote.
pub(crate) fn skip_string(buf: &[u8], cur: usize) -> DecodeResult<usize> {
    debug_assert_eq!(buf[cur], b'"');
    let mut i = cur + 1;
    while i < buf.len() {
        match buf[i] {
            b'"' => return Ok(i + 1),
            b'\\' => i += 2,
            _ => i += 1,
        }
    }
    Err(DecodeError::UnexpectedEnd {
        context: "string",
        offset: cur,
    })
}

/// Decodes a string or `null` starting at `cur` (leading whitespace is
/// skipped). Returns the unescaped bytes (`None` for `null`) and the cursor
/// past the token.
pub(crate) fn decode_string(buf: &[u8], cur: usize) -> DecodeResult<(Option<Vec<u8>>, usize)> {
    let cur = skip_whitespace(buf, cur);
    match buf.get(cur) {
        Some(b'n') => {
            validate_null(buf, cur)?;
            Ok((None, cur + 4))
        }
        Some(b'"') => {
            let (bytes, next) = unescape(buf, cur)?;
            Ok((Some(bytes), next))
        }
        Some(_) | None => Err(DecodeError::UnexpectedEnd {
            context: "string",
            offset: cur,
        }),
    }
}

fn unescape(buf: &[u8], cur: usize) -> DecodeResult<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut i = cur + 1;
    loop {
        match buf.get(i) {
            Some(b'"') => return Ok((out, i + 1)),
            Some(b'\\') => {
                i = unescape_one(buf, i, &mut out)?;
            }
            Some(&b) if b < 0x20 => {
                return Err(DecodeError::InvalidCharacter {
                    byte: b,
                    context: "string",
                    offset: i,
                });
            }
            Some(&b) => {
                out.push(b);
                i += 1;
            }
            None => {
                return Err(DecodeError::UnexpectedEnd {
                    context: "string",
                    offset: cur,
                });
            }
        }
    }
}

/// Handles one backslash escape at `i`, returning the cursor past it.
fn unescape_one(buf: &[u8], i: usize, out: &mut Vec<u8>) -> DecodeResult<usize> {
    match buf.get(i + 1) {
        Some(b'"') => {
            out.push(b'"');
            Ok(i + 2)
        }
        Some(b'\\') => {
            out.push(b'\\');
            Ok(i + 2)
        }
        Some(b'/') => {
            out.push(b'/');
            Ok(i + 2)
        }
        Some(b'b') => {
            out.push(0x08);
            Ok(i + 2)
        }
        Some(b'f') => {
            out.push(0x0C);
            Ok(i + 2)
        }
        Some(b'n') => {
            out.push(b'\n');
            Ok(i + 2)
        }
        Some(b'r') => {
            out.push(b'\r');
            Ok(i + 2)
        }
        Some(b't') => {
            out.push(b'\t');
            Ok(i + 2)
        }
        Some(b'u') => {
            let (code, next) = hex4(buf, i + 2)?;
            // Surrogate pair: a high surrogate followed by \uDC00..\uDFFF
            // combines into one supplementary code point.
            if (0xD800..=0xDBFF).contains(&code) {
                if buf.get(next) == Some(&b'\\') && buf.get(next + 1) == Some(&b'u') {
                    let (low, after) = hex4(buf, next + 2)?;
                    if (0xDC00..=0xDFFF).contains(&low) {
                        let combined =
                            0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                        push_code_point(combined, out);
                        return Ok(after);
                    }
                }
            }
            push_code_point(code, out);
            Ok(next)
        }
        Some(&b) => Err(DecodeError::InvalidCharacter {
            byte: b,
            context: "string",
            offset: i + 1,
        }),
        None => Err(DecodeError::UnexpectedEnd {
            context: "string",
            offset: i,
        }),
    }
}

fn hex4(buf: &[u8], at: usize) -> DecodeResult<(u32, usize)> {
    let mut code = 0u32;
    for k in 0..4 {
        let Some(&b) = buf.get(at + k) else {
            return Err(DecodeError::UnexpectedEnd {
                context: "string",
                offset: at,
            });
        };
        let digit = match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'a'..=b'f' => u32::from(b - b'a') + 10,
            b'A'..=b'F' => u32::from(b - b'A') + 10,
            _ => {
                return Err(DecodeError::InvalidCharacter {
                    byte: b,
                    context: "string",
                    offset: at + k,
                });
            }
        };
        code = code << 4 | digit;
    }
    Ok((code, at + 4))
}

fn push_code_point(code: u32, out: &mut Vec<u8>) {
    // Lone surrogates become U+FFFD, matching lenient decoders.
    let ch = char::from_u32(code).unwrap_or('\u{FFFD}');
    let mut tmp = [0u8; 4];
    out.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
}
