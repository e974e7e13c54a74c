//! Short codes students type in to find an assignment.

use rand::Rng;

const CHARACTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CODE_LENGTH: usize = 5;

/// Generates a random 5 character alphanumeric code
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CHARACTERS[rng.random_range(0..CHARACTERS.len())] as char)
        .collect()
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Upper-cases and trims user input so `ab12c ` finds `AB12C`
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_valid() {
        for _ in 0..500 {
            let code = generate_code();
            assert!(is_valid_code(&code), "{code} is not a valid code");
        }
    }

    #[test]
    fn validation() {
        assert!(is_valid_code("AB12C"));
        assert!(is_valid_code("00000"));
        assert!(!is_valid_code("ab12c"));
        assert!(!is_valid_code("AB12"));
        assert!(!is_valid_code("AB12CD"));
        assert!(!is_valid_code("AB-2C"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn normalization_precedes_validation() {
        assert_eq!(normalize_code(" ab12c "), "AB12C");
        assert!(is_valid_code(&normalize_code("xy9z0")));
    }
}
