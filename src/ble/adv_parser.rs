//! Advertising payload (AD structure) parsing.
//!
//! Each AD structure is `len, type, data[len - 1]`. A zero length or a
//! structure running past the end of the payload terminates the walk.

/// AD type: Shortened Local Name.
pub const AD_TYPE_SHORT_NAME: u8 = 0x08;
/// AD type: Complete Local Name.
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;

/// Return the data of the first AD structure of type `ad_type`.
pub fn find_field(data: &[u8], ad_type: u8) -> Option<&[u8]> {
    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            break;
        }
        if data[i + 1] == ad_type {
            return Some(&data[i + 2..i + 1 + len]);
        }
        i += len + 1;
    }
    None
}

/// Extract the raw device name bytes: Complete Local Name if present,
/// otherwise Shortened Local Name.
pub fn extract_device_name(data: &[u8]) -> Option<&[u8]> {
    find_field(data, AD_TYPE_COMPLETE_NAME).or_else(|| find_field(data, AD_TYPE_SHORT_NAME))
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
