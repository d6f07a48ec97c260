//! crates/reading_progress_core/src/cfi.rs
//!
//! Shape validation and spine-position extraction for EPUB canonical fragment
//! identifiers. Only the subset needed to locate a spine item is understood:
//!
//! ```text
//! epubcfi( path (":" offset)? ("[" tag "]")? ("!" path (":" offset)? ("[" tag "]")?)? )
//! path ::= "/"? step ("/" step)*      step ::= positive integer
//! ```

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CFI_PATTERN: Regex = Regex::new(
        r"(?i)^epubcfi\(/?([1-9][0-9]*)(?:/[1-9][0-9]*)*(?::[0-9]+)?(?:\[[^\[\]]*\])?(?:!/?[1-9][0-9]*(?:/[1-9][0-9]*)*(?::[0-9]+)?(?:\[[^\[\]]*\])?)?\)$"
    )
    .unwrap();
}

/// Returns `true` if the identifier has the expected shape.
/// Surrounding whitespace is ignored and the prefix is case-insensitive.
pub fn validate(cfi: &str) -> bool {
    CFI_PATTERN.is_match(cfi.trim())
}

/// Extracts the spine position from an identifier.
///
/// The first step is halved because content documents sit at even step numbers.
/// Returns `None` for malformed identifiers or when the position would be zero.
pub fn resolve(cfi: &str) -> Option<u32> {
    let captures = CFI_PATTERN.captures(cfi.trim())?;
    let first_step: u32 = captures.get(1)?.as_str().parse().ok()?;
    match first_step / 2 {
        0 => None,
        position => Some(position),
    }
}
