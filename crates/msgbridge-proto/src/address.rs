//! Contact addressing.
//!
//! Gateways address contacts as `<digits>@<domain>`. Operators type phone
//! numbers in whatever shape they like, so everything that is not an ASCII
//! digit is dropped before the domain is appended.

/// Domain suffix used for individual contacts.
pub const DEFAULT_ADDRESS_DOMAIN: &str = "s.whatsapp.net";

/// Normalize a raw contact identifier into a gateway address.
///
/// Returns `None` when the identifier contains no digits at all.
///
/// ```rust
/// use msgbridge_proto::contact_address;
///
/// assert_eq!(
///     contact_address("+1 (555) 123-4567", "s.whatsapp.net").as_deref(),
///     Some("15551234567@s.whatsapp.net"),
/// );
/// assert_eq!(contact_address("n/a", "s.whatsapp.net"), None);
/// ```
pub fn contact_address(raw: &str, domain: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(format!("{digits}@{domain}"))
}
