//! Content fingerprints for cache invalidation

const PREFIX: &str = "blake3:";

pub fn of_text(text: &str) -> String {
    format!("{}{}", PREFIX, blake3::hash(text.as_bytes()).to_hex())
}

/// Short stable identifier derived from arbitrary parts, used for records without ids.
pub fn short_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // separator so ("ab", "c") and ("a", "bc") differ
        hasher.update(&[0x1f]);
    }
    let hex = hasher.finalize().to_hex();
    format!("{}-{}", prefix, &hex.as_str()[..16])
}

/// A persisted fingerprint is either a derived `blake3:` digest or a caller marker.
pub fn is_well_formed(fp: &str) -> bool {
    match fp.strip_prefix(PREFIX) {
        Some(hex) => hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
        None => !fp.trim().is_empty(),
    }
}
