//! Repair of mojibake file names.
//!
//! Multipart headers are frequently decoded as Latin-1 even when the client
//! sent UTF-8, turning `résumé.pdf` into `rÃ©sumÃ©.pdf`. [`normalize`] undoes
//! that by mapping every char back to a single byte and decoding the result
//! as UTF-8.

/// Recover the UTF-8 text of a name that was mis-decoded as Latin-1.
///
/// Returns the input unchanged when it cannot be the product of such a
/// mis-decoding: a char above U+00FF, or bytes that are not valid UTF-8.
/// Plain ASCII passes through untouched.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let bytes: Option<Vec<u8>> = raw.chars().map(|c| u8::try_from(c).ok()).collect();

    match bytes.map(String::from_utf8) {
        Some(Ok(fixed)) => fixed,
        _ => raw.to_string(),
    }
}
