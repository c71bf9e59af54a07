//! Distinguished name helpers
//!
//! DNs are compared in normalized form: every RDN component is trimmed, the
//! attribute type and value are lowercased and the value is re-escaped in a
//! canonical way. `cN=user3, ou=customers,dc=MY-domain,dc= com` and
//! `cn=user3,ou=customers,dc=my-domain,dc=com` normalize to the same string.

use ldap3::dn_escape;

use crate::error::{DirectoryError, Result};

/// Split a DN on unescaped commas. Components are trimmed.
pub fn components(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, ch) in dn.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            ',' => {
                parts.push(dn[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }

    let last = dn[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// Split one RDN component into attribute type and raw (still escaped) value.
pub fn split_rdn(component: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (idx, ch) in component.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' => {
                let attr = component[..idx].trim();
                if attr.is_empty() {
                    return None;
                }
                return Some((attr, component[idx + 1..].trim()));
            }
            _ => {}
        }
    }
    None
}

/// Resolve backslash escapes, both `\,` and the hex form `\2C`.
pub fn unescape_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;

    while idx < bytes.len() {
        if bytes[idx] == b'\\' && idx + 1 < bytes.len() {
            if idx + 2 < bytes.len() {
                if let (Some(hi), Some(lo)) = (hex_digit(bytes[idx + 1]), hex_digit(bytes[idx + 2])) {
                    out.push(hi << 4 | lo);
                    idx += 3;
                    continue;
                }
            }
            out.push(bytes[idx + 1]);
            idx += 2;
            continue;
        }
        out.push(bytes[idx]);
        idx += 1;
    }

    String::from_utf8(out).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

fn hex_digit(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Normalize a DN for comparison and lookup.
pub fn normalize(dn: &str) -> Result<String> {
    let parts = components(dn);
    let mut normalized = Vec::with_capacity(parts.len());

    for part in parts {
        let (attr, value) = split_rdn(part)
            .ok_or_else(|| DirectoryError::invalid_dn(dn, format!("malformed component '{part}'")))?;
        let value = unescape_value(value).to_lowercase();
        normalized.push(format!("{}={}", attr.to_ascii_lowercase(), dn_escape(value.as_str())));
    }

    Ok(normalized.join(","))
}

/// Attribute type and unescaped value of the leading RDN.
pub fn rdn(dn: &str) -> Result<(String, String)> {
    let first = components(dn)
        .into_iter()
        .next()
        .ok_or_else(|| DirectoryError::invalid_dn(dn, "empty DN"))?;
    let (attr, value) = split_rdn(first)
        .ok_or_else(|| DirectoryError::invalid_dn(dn, format!("malformed component '{first}'")))?;
    Ok((attr.to_string(), unescape_value(value)))
}

/// Everything below the leading RDN, `None` for single component DNs.
pub fn parent(dn: &str) -> Option<String> {
    let parts = components(dn);
    if parts.len() < 2 {
        return None;
    }
    Some(parts[1..].join(","))
}

/// Build `<attr>=<escaped value>,<base>`.
pub fn child(attr: &str, value: &str, base: &str) -> String {
    if base.trim().is_empty() {
        format!("{}={}", attr, dn_escape(value))
    } else {
        format!("{}={},{}", attr, dn_escape(value), base)
    }
}

/// Number of RDNs `dn` sits below `base`, both normalized. `None` if `dn`
/// is not inside `base`.
pub fn depth_below(dn: &str, base: &str) -> Option<usize> {
    let dn_parts = components(dn);
    let base_parts = components(base);
    if dn_parts.len() < base_parts.len() {
        return None;
    }
    let offset = dn_parts.len() - base_parts.len();
    if dn_parts[offset..] == base_parts[..] {
        Some(offset)
    } else {
        None
    }
}

/// Compare two DNs in normalized form. Malformed DNs never match.
pub fn eq(left: &str, right: &str) -> bool {
    match (normalize(left), normalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}
