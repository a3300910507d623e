use uuid::Uuid;

pub const ACCESS_CODE_LEN: usize = 6;

/// Upper bound on collision retries before giving up.
pub const MAX_GENERATION_ATTEMPTS: usize = 100;

/// Short lowercase hex token used for shareable access.
pub fn generate() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(ACCESS_CODE_LEN);
    code
}

/// Access codes are matched case-insensitively.
pub fn normalize(code: &str) -> String {
    code.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_short_lowercase_hex() {
        let code = generate();
        assert_eq!(code.len(), ACCESS_CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn normalize_lowercases_and_trims() {
        assert_eq!(normalize(" AbC123 "), "abc123");
    }
}
