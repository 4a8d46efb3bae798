//! Packed sort keys.
//!
//! The engine sorts only by numeric attributes, so string sorts are
//! approximated by packing the first four bytes of the value into a `u32`,
//! most significant byte first. Missing bytes count as zero, so the packed
//! order agrees with byte-wise string order up to the fourth byte.

/// Pack the leading four bytes of a string into a sort key.
///
/// # Examples
///
/// ```
/// use polydex_core::util::packing::packed_key;
///
/// assert_eq!(packed_key("A"), 0x4100_0000);
/// assert_eq!(packed_key("abcdef"), packed_key("abcd"));
/// assert!(packed_key("abc") < packed_key("abd"));
/// ```
pub fn packed_key(value: &str) -> u32 {
    value
        .bytes()
        .chain(std::iter::repeat(0))
        .take(4)
        .fold(0u32, |acc, b| (acc << 8) | u32::from(b))
}

/// Name of the packed companion column of a sortable string field.
pub fn packed_column(field: &str) -> String {
    format!("_packed_{field}")
}
