//! Small config-assembly helpers owned by this crate family. File/env
//! merging itself is the caller's responsibility (§1); this module only
//! implements the one piece of behavior this crate's own config sections
//! need: `${NAME}` environment-variable expansion.

/// Replaces every `${NAME}` occurrence in `input` with the value of the
/// environment variable `NAME`. Names that are not set in the environment
/// are left literal, per §6.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = input[i + 2..].find('}') {
                let name = &input[i + 2..i + 2 + end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => out.push_str(&input[i..i + 2 + end + 1]),
                }
                i += 2 + end + 1;
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variable() {
        // SAFETY: test-only, single-threaded env mutation scoped to this test.
        unsafe {
            std::env::set_var("INGEST_TEST_VAR", "value");
        }
        assert_eq!(expand_env("prefix-${INGEST_TEST_VAR}-suffix"), "prefix-value-suffix");
        unsafe {
            std::env::remove_var("INGEST_TEST_VAR");
        }
    }

    #[test]
    fn leaves_unknown_variable_literal() {
        unsafe {
            std::env::remove_var("INGEST_TEST_VAR_MISSING_XYZ");
        }
        assert_eq!(
            expand_env("${INGEST_TEST_VAR_MISSING_XYZ}"),
            "${INGEST_TEST_VAR_MISSING_XYZ}"
        );
    }

    #[test]
    fn passes_through_text_without_placeholders() {
        assert_eq!(expand_env("no placeholders here"), "no placeholders here");
    }

    #[test]
    fn handles_unterminated_placeholder() {
        assert_eq!(expand_env("${unterminated"), "${unterminated");
    }
}
