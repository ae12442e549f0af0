use crate::error::PaymentError;

/// Kenyan country calling code, the prefix of every canonical number.
pub const COUNTRY_CODE: &str = "254";

/// Converts any accepted representation of a Kenyan mobile number into the
/// canonical 12-digit `254XXXXXXXXX` form used on the wire.
///
/// Accepted inputs, after removing whitespace, dashes and a leading `+`:
/// `254712345678`, `0712345678` and `712345678`.
pub fn normalize_phone(raw: &str) -> Result<String, PaymentError> {
    let trimmed: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = trimmed.strip_prefix('+').unwrap_or(&trimmed);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::InvalidPhone(raw.to_string()));
    }

    match digits.len() {
        12 if digits.starts_with(COUNTRY_CODE) => Ok(digits.to_string()),
        10 if digits.starts_with('0') => Ok(format!("{}{}", COUNTRY_CODE, &digits[1..])),
        9 => Ok(format!("{}{}", COUNTRY_CODE, digits)),
        _ => Err(PaymentError::InvalidPhone(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_formats_normalize_identically() {
        for input in [
            "254712345678",
            "+254712345678",
            "0712345678",
            "712345678",
            "+254 712 345 678",
            "0712-345-678",
        ] {
            assert_eq!(normalize_phone(input).unwrap(), "254712345678", "{input}");
        }
    }

    #[test]
    fn test_newer_prefixes() {
        assert_eq!(normalize_phone("0110123456").unwrap(), "254110123456");
    }

    #[test]
    fn test_rejects_malformed_numbers() {
        for input in [
            "",
            "+",
            "12345",
            "07123456789",
            "1712345678",
            "255712345678",
            "07123a5678",
            "++254712345678",
        ] {
            assert!(
                matches!(normalize_phone(input), Err(PaymentError::InvalidPhone(_))),
                "{input} should be rejected"
            );
        }
    }
}
