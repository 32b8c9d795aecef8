//! CNPJ validation and formatting.
//!
//! Implements the Receita Federal check-digit algorithm. Tax ids are
//! validated before persistence and stored as bare digits.

use validator::ValidationError;

const FIRST_DIGIT_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const SECOND_DIGIT_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Strips every non-digit character from a CNPJ.
pub fn clean_cnpj(cnpj: &str) -> String {
    cnpj.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Validates a CNPJ (formatted or bare digits).
///
/// Checks length, rejects the all-equal-digit degenerates and verifies
/// both check digits.
pub fn validate_cnpj(cnpj: &str) -> bool {
    let cnpj = clean_cnpj(cnpj);
    if cnpj.len() != 14 {
        return false;
    }

    let digits: Vec<u32> = cnpj.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    digits[12] == check_digit(&digits[..12], &FIRST_DIGIT_WEIGHTS)
        && digits[13] == check_digit(&digits[..13], &SECOND_DIGIT_WEIGHTS)
}

fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        11 - remainder
    }
}

/// Formats a CNPJ as `XX.XXX.XXX/XXXX-XX`, or returns an empty string
/// when the input does not hold 14 digits.
pub fn format_cnpj(cnpj: &str) -> String {
    let cnpj = clean_cnpj(cnpj);
    if cnpj.len() != 14 {
        return String::new();
    }
    format!(
        "{}.{}.{}/{}-{}",
        &cnpj[..2],
        &cnpj[2..5],
        &cnpj[5..8],
        &cnpj[8..12],
        &cnpj[12..14]
    )
}

/// `validator` hook for the CNPJ fields of the input structs.
pub fn validate_cnpj_field(cnpj: &str) -> Result<(), ValidationError> {
    if validate_cnpj(cnpj) {
        Ok(())
    } else {
        Err(ValidationError::new("cnpj"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_cnpjs() {
        assert!(validate_cnpj("11222333000181"));
        assert!(validate_cnpj("11.222.333/0001-81"));
        assert!(validate_cnpj("00.000.000/0001-91"));
    }

    #[test]
    fn rejects_bad_check_digits() {
        assert!(!validate_cnpj("11222333000182"));
        assert!(!validate_cnpj("12345678000195"));
    }

    #[test]
    fn rejects_repeated_digits() {
        assert!(!validate_cnpj("00000000000000"));
        assert!(!validate_cnpj("11111111111111"));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!validate_cnpj(""));
        assert!(!validate_cnpj("1122233300018"));
        assert!(!validate_cnpj("112223330001811"));
    }

    #[test]
    fn clean_strips_punctuation() {
        assert_eq!(clean_cnpj("11.222.333/0001-81"), "11222333000181");
    }

    #[test]
    fn format_round_trips() {
        assert_eq!(format_cnpj("11222333000181"), "11.222.333/0001-81");
        assert_eq!(format_cnpj("123"), "");
    }
}
