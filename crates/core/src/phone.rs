use crate::error::PhoneValidationError;

/// Strip every non-digit character, then check length and country prefix
/// per the phone validation rule (§6): exactly `total_digits` decimal
/// digits, beginning with `country_prefix`.
pub fn validate_phone(
    raw: &str,
    country_prefix: &str,
    total_digits: usize,
) -> Result<String, PhoneValidationError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() != total_digits {
        return Err(PhoneValidationError::WrongLength {
            expected: total_digits,
            found: digits.len(),
        });
    }

    if !digits.starts_with(country_prefix) {
        return Err(PhoneValidationError::WrongPrefix {
            prefix: country_prefix.to_string(),
        });
    }

    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_indian_number() {
        assert_eq!(
            validate_phone("919876543210", "91", 12).unwrap(),
            "919876543210"
        );
    }

    #[test]
    fn rejects_too_short() {
        let err = validate_phone("9198765", "91", 12).unwrap_err();
        assert_eq!(
            err,
            PhoneValidationError::WrongLength {
                expected: 12,
                found: 7
            }
        );
    }

    #[test]
    fn rejects_too_long() {
        let err = validate_phone("12345678901234", "91", 12).unwrap_err();
        assert_eq!(
            err,
            PhoneValidationError::WrongLength {
                expected: 12,
                found: 14
            }
        );
    }

    #[test]
    fn rejects_wrong_prefix() {
        let err = validate_phone("19876543210", "91", 12).unwrap_err();
        assert_eq!(
            err,
            PhoneValidationError::WrongPrefix {
                prefix: "91".to_string()
            }
        );
    }

    #[test]
    fn strips_non_digit_punctuation() {
        assert_eq!(
            validate_phone("+91-9876-543210", "91", 12).unwrap(),
            "919876543210"
        );
    }
}
