//! `Content-Disposition` values for downloads.

/// Build an `attachment` disposition carrying `file_name` as an RFC 5987
/// `filename*` parameter, so non-ASCII names survive intact.
///
/// ```rust
/// use yshare_core::delivery::attachment_disposition;
///
/// assert_eq!(
///     attachment_disposition("résumé.pdf"),
///     "attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
/// );
/// ```
pub fn attachment_disposition(file_name: &str) -> String {
    format!("attachment; filename*=UTF-8''{}", urlencoding::encode(file_name))
}
