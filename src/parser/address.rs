use memchr::memchr_iter;

use crate::config::ParserSettings;

/// Longest candidates each validator will consider
const MAX_IPV4_LEN: usize = 15;
const MAX_IPV6_LEN: usize = 39;
const MAC_LEN: usize = 17;

/// Cap on candidates extracted from a single scanned region
const MAX_CANDIDATES: usize = 256;

/// Address classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddrKind {
    Ipv4,
    Ipv6,
    Mac,
}

impl AddrKind {
    /// One-byte field tag consumed by the indexer
    pub fn tag(self) -> u8 {
        match self {
            AddrKind::Ipv4 => b'i',
            AddrKind::Ipv6 => b'I',
            AddrKind::Mac => b'm',
        }
    }
}

/// A validated address found inside a scanned byte region
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrCandidate {
    pub kind: AddrKind,
    /// Canonical textual form (see module docs for per-type rules)
    pub canonical: String,
    /// Byte offset of the match within the scanned region
    pub offset: usize,
    /// Matched length in bytes
    pub len: usize,
}

impl AddrCandidate {
    fn end(&self) -> usize {
        self.offset + self.len
    }

    fn covers(&self, pos: usize) -> bool {
        pos >= self.offset && pos < self.end()
    }
}

/// Stateless address scanner
///
/// Never fails: invalid candidates are silently not emitted.
#[derive(Clone, Debug)]
pub struct AddressParser {
    strict_ipv4: bool,
}

impl AddressParser {
    pub fn new(settings: &ParserSettings) -> Self {
        Self {
            strict_ipv4: settings.strict_ipv4,
        }
    }

    /// Extract every address candidate from `text`
    ///
    /// Two passes: dots first (IPv4), then colons and dashes (MAC before
    /// IPv6, since a MAC's shape is fixed at 17 bytes). Anchors inside an
    /// already-emitted candidate are skipped, and the backward walk never
    /// crosses behind the end of a previously emitted candidate.
    pub fn scan(&self, text: &[u8]) -> Vec<AddrCandidate> {
        let mut found: Vec<AddrCandidate> = Vec::new();

        for dot in memchr_iter(b'.', text) {
            if found.len() >= MAX_CANDIDATES {
                break;
            }
            if found.iter().any(|c| c.covers(dot)) {
                continue;
            }
            let floor = scan_floor(&found, dot);
            let mut start = dot;
            while start > floor {
                let b = text[start - 1];
                if b.is_ascii_digit() || b == b'.' {
                    start -= 1;
                } else {
                    break;
                }
            }
            if let Some((len, canonical)) = extract_ipv4(&text[start..], self.strict_ipv4) {
                insert_candidate(
                    &mut found,
                    AddrCandidate {
                        kind: AddrKind::Ipv4,
                        canonical,
                        offset: start,
                        len,
                    },
                );
            }
        }

        for anchor in colon_anchors(text) {
            if found.len() >= MAX_CANDIDATES {
                break;
            }
            if found.iter().any(|c| c.covers(anchor)) {
                continue;
            }
            let floor = scan_floor(&found, anchor);
            let mut start = anchor;
            while start > floor {
                let b = text[start - 1];
                if is_hex(b) || b == b':' || b == b'-' {
                    start -= 1;
                } else {
                    break;
                }
            }
            if let Some((len, canonical)) = extract_mac(&text[start..]) {
                insert_candidate(
                    &mut found,
                    AddrCandidate {
                        kind: AddrKind::Mac,
                        canonical,
                        offset: start,
                        len,
                    },
                );
                continue;
            }
            if let Some((len, canonical)) = extract_ipv6(&text[start..], self.strict_ipv4) {
                insert_candidate(
                    &mut found,
                    AddrCandidate {
                        kind: AddrKind::Ipv6,
                        canonical,
                        offset: start,
                        len,
                    },
                );
            }
        }

        found
    }

    /// Leftmost candidate in `text`, if any
    pub fn first_address(&self, text: &[u8]) -> Option<AddrCandidate> {
        self.scan(text).into_iter().min_by_key(|c| c.offset)
    }
}

/// Anchors for the second pass: colons and dashes
fn colon_anchors(text: &[u8]) -> Vec<usize> {
    text.iter()
        .enumerate()
        .filter(|(_, &b)| b == b':' || b == b'-')
        .map(|(i, _)| i)
        .collect()
}

/// Add `candidate`, resolving byte overlaps in favor of the longer match
fn insert_candidate(found: &mut Vec<AddrCandidate>, candidate: AddrCandidate) {
    let overlaps = |c: &AddrCandidate| c.offset < candidate.end() && candidate.offset < c.end();
    if found.iter().any(|c| overlaps(c) && c.len >= candidate.len) {
        return;
    }
    found.retain(|c| !overlaps(c));
    found.push(candidate);
}

/// Highest candidate end at or before `pos`; the backward walk stops here
fn scan_floor(found: &[AddrCandidate], pos: usize) -> usize {
    found
        .iter()
        .map(AddrCandidate::end)
        .filter(|&end| end <= pos)
        .max()
        .unwrap_or(0)
}

fn is_hex(b: u8) -> bool {
    b.is_ascii_hexdigit()
}

fn hex_val(b: u8) -> Option<u32> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as u32),
        b'a'..=b'f' => Some((b - b'a' + 10) as u32),
        b'A'..=b'F' => Some((b - b'A' + 10) as u32),
        _ => None,
    }
}

/// Validate an IPv4 literal at the start of `s`
///
/// Four decimal octets 0-255; a fourth dot immediately following a complete
/// candidate invalidates it, so `1.2.3.4.5` yields nothing. Returns the
/// matched length and the canonical dotted-decimal form (leading zeros
/// stripped).
fn extract_ipv4(s: &[u8], strict: bool) -> Option<(usize, String)> {
    // shortest IPv4 is 7 bytes
    if s.len() < 7 {
        return None;
    }

    let mut octets = [0u32; 4];
    let mut octet_count = 0;
    let mut digits = 0usize;
    let mut value = 0u32;
    let mut pos = 0usize;

    while pos < s.len() && pos < MAX_IPV4_LEN {
        let c = s[pos];
        if c.is_ascii_digit() {
            value = value * 10 + (c - b'0') as u32;
            digits += 1;
            if digits > 3 || value > 255 {
                return None;
            }
        } else if c == b'.' {
            if digits == 0 || octet_count >= 3 {
                return None;
            }
            if strict && digits > 1 && s[pos - digits] == b'0' {
                return None;
            }
            octets[octet_count] = value;
            octet_count += 1;
            value = 0;
            digits = 0;
        } else {
            break;
        }
        pos += 1;
    }

    if octet_count == 3 && digits > 0 && value <= 255 {
        if strict && digits > 1 && s[pos - digits] == b'0' {
            return None;
        }
        octets[3] = value;
        let canonical = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
        Some((pos, canonical))
    } else {
        None
    }
}

/// Validate a MAC-48 literal at the start of `s`
///
/// Exactly six 2-hex-digit bytes with one consistent separator (`:` or `-`).
/// Canonical form is lowercase with `:`.
fn extract_mac(s: &[u8]) -> Option<(usize, String)> {
    if s.len() < MAC_LEN {
        return None;
    }

    let mut bytes = [0u8; 6];
    let mut byte_count = 0usize;
    let mut digits = 0usize;
    let mut value = 0u32;
    let mut separator = 0u8;
    let mut pos = 0usize;

    while pos < MAC_LEN && byte_count < 6 {
        let c = s[pos];
        if let Some(h) = hex_val(c) {
            value = (value << 4) | h;
            digits += 1;
            if digits > 2 {
                return None;
            }
        } else if (c == b':' || c == b'-') && digits == 2 {
            if separator == 0 {
                separator = c;
            } else if c != separator {
                return None;
            }
            bytes[byte_count] = value as u8;
            byte_count += 1;
            value = 0;
            digits = 0;
        } else {
            if byte_count == 5 && digits == 2 {
                bytes[5] = value as u8;
                byte_count = 6;
                break;
            }
            return None;
        }
        pos += 1;
    }

    if byte_count == 5 && digits == 2 {
        bytes[5] = value as u8;
        byte_count = 6;
    }
    if byte_count != 6 {
        return None;
    }

    let canonical = format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    );
    Some((MAC_LEN, canonical))
}

/// Validate an IPv6 literal at the start of `s`
///
/// Groups of 1-4 hex digits, at most one `::`, exactly 8 groups without
/// compression, and an embedded dotted-quad only after at least 6 groups.
/// Canonical form is the matched literal lowercased, `::` preserved as
/// written.
fn extract_ipv6(s: &[u8], strict_ipv4: bool) -> Option<(usize, String)> {
    // shortest IPv6 is "::" followed by at least one more byte of context
    if s.len() < 3 {
        return None;
    }

    let mut group_count = 0usize;
    let mut digits = 0usize;
    let mut double_colon = false;
    let mut pos = 0usize;
    let mut embedded_end: Option<usize> = None;

    while pos < s.len() && pos < MAX_IPV6_LEN {
        let c = s[pos];
        if is_hex(c) {
            digits += 1;
            if digits > 4 {
                return None;
            }
        } else if c == b':' {
            if pos + 1 < s.len() && s[pos + 1] == b':' {
                if double_colon {
                    return None;
                }
                if digits > 0 {
                    if group_count >= 8 {
                        return None;
                    }
                    group_count += 1;
                }
                double_colon = true;
                digits = 0;
                pos += 1;
            } else {
                if digits == 0 && group_count == 0 {
                    return None;
                }
                if group_count >= 8 {
                    return None;
                }
                group_count += 1;
                digits = 0;
            }
        } else if c == b'.' && group_count >= 6 {
            // embedded dotted-quad occupies the last two groups
            if group_count > 6 {
                return None;
            }
            let v4_start = pos - digits;
            let (v4_len, _) = extract_ipv4(&s[v4_start..], strict_ipv4)?;
            group_count += 2;
            embedded_end = Some(v4_start + v4_len);
            break;
        } else {
            break;
        }
        pos += 1;
    }

    let end = match embedded_end {
        Some(end) => end,
        None => {
            if digits > 0 {
                if group_count >= 8 {
                    return None;
                }
                group_count += 1;
            }
            pos
        }
    };

    if double_colon {
        if group_count > 8 {
            return None;
        }
    } else if group_count != 8 {
        return None;
    }

    let literal = std::str::from_utf8(&s[..end]).ok()?;
    Some((end, literal.to_ascii_lowercase()))
}
