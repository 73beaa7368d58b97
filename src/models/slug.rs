//! Hub identifier validation and slug derivation

use crate::error::{GgufError, GgufResult};

/// Check that `source_id` has the `namespace/name` shape accepted by the hub
///
/// The namespace allows ASCII alphanumerics, `-` and `_`; the name additionally
/// allows `.`.
pub fn validate_source_id(source_id: &str) -> GgufResult<()> {
    let valid = match source_id.split_once('/') {
        Some((namespace, name)) => {
            !namespace.is_empty()
                && !name.is_empty()
                && namespace
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(GgufError::Validation(format!(
            "invalid model ID format: {}",
            source_id
        )))
    }
}

/// Check a user-chosen slug
///
/// Slugs name lock and log files, so only ASCII alphanumerics, `-`, `_` and
/// `.` are accepted, and a leading `.` is refused.
pub fn validate_slug(slug: &str) -> GgufResult<()> {
    let valid = !slug.is_empty()
        && !slug.starts_with('.')
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(GgufError::Validation(format!("invalid slug: '{}'", slug)))
    }
}

/// Derive the default slug for a hub identifier
///
/// e.g. "TheBloke/Llama-2-7B-GGUF" -> "thebloke-llama-2-7b-gguf"
pub fn generate_slug(source_id: &str) -> String {
    let mapped: String = source_id
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    mapped.trim_matches('-').to_string()
}

/// Format a byte count as whole megabytes, e.g. `812M`
pub fn format_file_size(bytes: u64) -> String {
    format!("{}M", bytes / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for id in [
            "TheBloke/Llama-2-7B-GGUF",
            "bartowski/Qwen2.5-7B-Instruct-GGUF",
            "a_b/c",
            "x-1/y_2.z",
        ] {
            assert!(validate_source_id(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn test_invalid_ids() {
        for id in [
            "",
            "noslash",
            "/name",
            "ns/",
            "a/b/c",
            "ns.dot/name",
            "ns/na me",
            "ns/name?x=1",
        ] {
            let err = validate_source_id(id).unwrap_err();
            assert!(matches!(err, GgufError::Validation(_)), "{id} should be rejected");
        }
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("TheBloke/Llama-2-7B-GGUF"), "thebloke-llama-2-7b-gguf");
        assert_eq!(
            generate_slug("bartowski/Qwen2.5-7B-Instruct-GGUF"),
            "bartowski-qwen2-5-7b-instruct-gguf"
        );
        assert_eq!(generate_slug("_lead/trail_"), "lead-trail");
    }

    #[test]
    fn test_generate_slug_non_ascii() {
        assert_eq!(generate_slug("Über/Modèle"), "ber-mod-le");
    }

    #[test]
    fn test_validate_slug() {
        for ok in ["phi", "thebloke-llama-2-7b-gguf", "Phi_2.q4"] {
            assert!(validate_slug(ok).is_ok(), "{ok}");
        }
        for bad in ["", "my/phi", "../x", "..", ".x", "a\\b", "has space"] {
            assert!(validate_slug(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_generated_slugs_are_valid() {
        assert!(validate_slug(&generate_slug("TheBloke/Llama-2-7B-GGUF")).is_ok());
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0M");
        assert_eq!(format_file_size(1024 * 1024 - 1), "0M");
        assert_eq!(format_file_size(812 * 1024 * 1024 + 17), "812M");
    }
}
