use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CouponError;

/// Indian local part: 10 digits, first digit 6-9.
static INDIAN_LOCAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").unwrap());
/// Generic international number after a `+` prefix.
static INTERNATIONAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d{7,17}$").unwrap());
/// Bare digit string without any country-code prefix.
static BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d{7,14}$").unwrap());

pub const FORMAT_HINT: &str = "Invalid mobile number. Supported formats: +919996275888, 919996275888, 9996275888, or international numbers";

/// Normalizes raw user input into the canonical allocation key.
///
/// Indian numbers are special-cased (the primary market): `+91XXXXXXXXXX`,
/// `91XXXXXXXXXX` and bare 10-digit numbers all map to the same `91...` key,
/// so differently formatted inputs for the same subscriber share one coupon.
/// Everything else falls back to a digit-count heuristic; the `+` is always
/// stripped so the key is digits-only.
pub fn normalize(raw: &str) -> Result<String, CouponError> {
    let cleaned = clean(raw);

    if let Some(rest) = cleaned.strip_prefix("+91") {
        if rest.len() == 10 && INDIAN_LOCAL.is_match(rest) {
            return Ok(format!("91{rest}"));
        }
    }
    if cleaned.starts_with("91") && cleaned.len() == 12 && INDIAN_LOCAL.is_match(&cleaned[2..]) {
        return Ok(cleaned);
    }
    if cleaned.len() == 10 && INDIAN_LOCAL.is_match(&cleaned) {
        return Ok(format!("91{cleaned}"));
    }
    if let Some(rest) = cleaned.strip_prefix('+') {
        if (8..=18).contains(&rest.len()) && INTERNATIONAL.is_match(rest) {
            return Ok(rest.to_string());
        }
    } else if (8..=15).contains(&cleaned.len()) && BARE.is_match(&cleaned) {
        return Ok(cleaned);
    }

    Err(CouponError::InvalidMobileNumber(FORMAT_HINT.to_string()))
}

/// Strips everything except ASCII digits and a leading `+`.
fn clean(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_digit() {
            out.push(c);
        } else if c == '+' && out.is_empty() {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indian_formats_share_one_key() {
        assert_eq!(normalize("+919996275888").unwrap(), "919996275888");
        assert_eq!(normalize("919996275888").unwrap(), "919996275888");
        assert_eq!(normalize("9996275888").unwrap(), "919996275888");
    }

    #[test]
    fn test_formatting_characters_are_stripped() {
        assert_eq!(normalize(" +91 99962-75888 ").unwrap(), "919996275888");
        assert_eq!(normalize("(+91) 99962 75888").unwrap(), "919996275888");
        assert_eq!(normalize("99-96-27-58-88").unwrap(), "919996275888");
    }

    #[test]
    fn test_international_plus_is_stripped() {
        assert_eq!(normalize("+14155552671").unwrap(), "14155552671");
        assert_eq!(normalize("+4930123456").unwrap(), "4930123456");
    }

    #[test]
    fn test_bare_international_passes_through() {
        assert_eq!(normalize("14155552671").unwrap(), "14155552671");
        // 10 digits outside the Indian 6-9 range fall back to the generic rule
        assert_eq!(normalize("5555555555").unwrap(), "5555555555");
    }

    #[test]
    fn test_too_short_is_rejected() {
        assert!(matches!(
            normalize("12345"),
            Err(CouponError::InvalidMobileNumber(_))
        ));
        assert!(normalize("1234567").is_err());
    }

    #[test]
    fn test_leading_zero_is_rejected() {
        assert!(normalize("0123456789").is_err());
        assert!(normalize("+0123456789").is_err());
    }

    #[test]
    fn test_too_long_is_rejected() {
        assert!(normalize("1234567890123456").is_err());
        assert!(normalize("+1234567890123456789").is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(normalize("not a number").is_err());
        assert!(normalize("").is_err());
        assert!(normalize("+").is_err());
    }

    #[test]
    fn test_interior_plus_is_dropped() {
        assert_eq!(normalize("99+96275888").unwrap(), "919996275888");
    }

    #[test]
    fn test_twelve_digit_91_with_bad_local_part_uses_generic_rule() {
        // starts with 91 but the local part fails the 6-9 rule, so it is
        // treated as a generic 12-digit number
        assert_eq!(normalize("915555555555").unwrap(), "915555555555");
    }
}
