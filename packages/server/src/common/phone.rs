//! MSISDN normalization helpers.
//!
//! Webhook events, approver lists and transport calls all use different
//! number shapes; everything inside the correlation maps is keyed by the
//! canonical `+<digits>` form.

/// Normalize a phone number to canonical `+<digits>` form.
///
/// Strips everything except digits and a leading `+`, then ensures the `+`
/// prefix is present.
pub fn normalize_msisdn(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("+{}", digits)
}

/// Reformat an international number to the local dialing convention the SMS
/// gateway accepts (0XXXXXXXXX). Numbers outside the +212 prefix are passed
/// through with the `+` stripped.
pub fn to_local_format(msisdn: &str) -> String {
    if let Some(rest) = msisdn.strip_prefix("+212") {
        format!("0{}", rest)
    } else {
        msisdn.trim_start_matches('+').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_plus_digits() {
        assert_eq!(normalize_msisdn("212600000000"), "+212600000000");
        assert_eq!(normalize_msisdn("+212 600-000-000"), "+212600000000");
        assert_eq!(normalize_msisdn("(212) 600 000 000"), "+212600000000");
    }

    #[test]
    fn reformats_moroccan_numbers_to_local() {
        assert_eq!(to_local_format("+212600000000"), "0600000000");
        assert_eq!(to_local_format("+212712345678"), "0712345678");
    }

    #[test]
    fn passes_through_other_prefixes() {
        assert_eq!(to_local_format("+33612345678"), "33612345678");
    }
}
