//! Minimal `.npy` codec for 1-D string arrays, which `ndarray-npy` does not model.
//!
//! Supports NumPy's fixed-width unicode (`<U n`, UTF-32) and byte-string (`|S n`) dtypes.

use crate::foundation::error::{MosculpError, MosculpResult};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Decode a 1-D (or flattened) string array from `.npy` bytes.
pub(crate) fn read_string_array(bytes: &[u8]) -> MosculpResult<Vec<String>> {
    let (header, data) = split_header(bytes)?;
    let descr = dict_str_value(&header, "descr")
        .ok_or_else(|| bad("npy header has no 'descr'"))?;
    let count = dict_shape(&header)
        .ok_or_else(|| bad("npy header has no 'shape'"))?
        .iter()
        .product::<usize>();

    let (kind, width, big_endian) = parse_descr(&descr)?;
    let item_bytes = match kind {
        'U' => width * 4,
        _ => width,
    };
    let needed = count
        .checked_mul(item_bytes)
        .ok_or_else(|| bad("npy string array size overflow"))?;
    if data.len() < needed {
        return Err(bad(format!(
            "npy string array truncated: need {needed} bytes, have {}",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(count);
    for item in data[..needed].chunks_exact(item_bytes.max(1)).take(count) {
        let s = match kind {
            'U' => decode_utf32(item, big_endian)?,
            _ => String::from_utf8(item.iter().copied().take_while(|&b| b != 0).collect())
                .map_err(|e| bad(format!("npy byte string is not utf-8: {e}")))?,
        };
        out.push(s);
    }
    if width == 0 {
        out.resize(count, String::new());
    }
    Ok(out)
}

/// Encode `items` as a little-endian fixed-width unicode `.npy` array.
pub(crate) fn write_unicode_array(items: &[String]) -> Vec<u8> {
    let width = items
        .iter()
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(0)
        .max(1);
    let mut header = format!(
        "{{'descr': '<U{width}', 'fortran_order': False, 'shape': ({},), }}",
        items.len()
    );
    // magic(6) + version(2) + len(2) + header + '\n' must be a multiple of 64.
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    let pad = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat_n(' ', pad));
    header.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + items.len() * width * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for s in items {
        let mut n = 0;
        for ch in s.chars() {
            out.extend_from_slice(&u32::from(ch).to_le_bytes());
            n += 1;
        }
        for _ in n..width {
            out.extend_from_slice(&[0, 0, 0, 0]);
        }
    }
    out
}

fn split_header(bytes: &[u8]) -> MosculpResult<(String, &[u8])> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(bad("not an npy array (bad magic)"));
    }
    let major = bytes[6];
    let (len, start) = match major {
        1 => (usize::from(u16::from_le_bytes([bytes[8], bytes[9]])), 10usize),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(bad("npy header truncated"));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12usize)
        }
        v => return Err(bad(format!("unsupported npy version {v}"))),
    };
    let end = start
        .checked_add(len)
        .filter(|&e| e <= bytes.len())
        .ok_or_else(|| bad("npy header truncated"))?;
    let header = String::from_utf8_lossy(&bytes[start..end]).into_owned();
    Ok((header, &bytes[end..]))
}

fn dict_str_value(header: &str, key: &str) -> Option<String> {
    let rest = after_key(header, key)?;
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let body = &rest[1..];
    let end = body.find(quote)?;
    Some(body[..end].to_string())
}

fn dict_shape(header: &str) -> Option<Vec<usize>> {
    let rest = after_key(header, "shape")?;
    let rest = rest.strip_prefix('(')?;
    let end = rest.find(')')?;
    rest[..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().ok())
        .collect()
}

fn after_key<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    for quoted in [format!("'{key}'"), format!("\"{key}\"")] {
        if let Some(pos) = header.find(&quoted) {
            let rest = header[pos + quoted.len()..].trim_start();
            return Some(rest.strip_prefix(':')?.trim_start());
        }
    }
    None
}

fn parse_descr(descr: &str) -> MosculpResult<(char, usize, bool)> {
    let mut chars = descr.chars();
    let (order, kind) = match chars.next() {
        Some(c @ ('<' | '>' | '|' | '=')) => (c, chars.next()),
        other => ('|', other),
    };
    let kind = match kind {
        Some(k @ ('U' | 'S')) => k,
        Some('O') => {
            return Err(bad(
                "object arrays are not supported; store layer names as a unicode array",
            ));
        }
        _ => return Err(bad(format!("'{descr}' is not a string dtype"))),
    };
    let width = chars
        .as_str()
        .parse::<usize>()
        .map_err(|_| bad(format!("bad string width in dtype '{descr}'")))?;
    Ok((kind, width, order == '>'))
}

fn decode_utf32(item: &[u8], big_endian: bool) -> MosculpResult<String> {
    let mut s = String::new();
    for cp in item.chunks_exact(4) {
        let raw = [cp[0], cp[1], cp[2], cp[3]];
        let v = if big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        };
        if v == 0 {
            break;
        }
        let ch = char::from_u32(v).ok_or_else(|| bad(format!("invalid code point {v:#x}")))?;
        s.push(ch);
    }
    Ok(s)
}

fn bad(msg: impl Into<String>) -> MosculpError {
    MosculpError::invalid_index_map(msg)
}

#[cfg(test)]
#[path = "../../tests/unit/assets/npy.rs"]
mod tests;
