//! Common utilities for the upload handler

use bucketpipe_core::AppError;

/// Normalize MIME type by stripping parameters (e.g. "text/plain; charset=utf-8" -> "text/plain").
fn normalize_mime_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .map(|s| s.trim())
        .unwrap_or(content_type)
}

/// Validate content type against the allowlist. An empty allowlist accepts every type.
pub fn validate_content_type(content_type: &str, allowed_types: &[String]) -> Result<(), AppError> {
    if allowed_types.is_empty() {
        return Ok(());
    }

    let normalized = normalize_mime_type(content_type).to_lowercase();
    if !allowed_types.iter().any(|ct| normalized == ct.to_lowercase()) {
        return Err(AppError::InvalidInput(format!(
            "Invalid file type. Allowed types: {}",
            allowed_types.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["text/plain".to_string(), "image/png".to_string()]
    }

    #[test]
    fn test_empty_allowlist_accepts_everything() {
        assert!(validate_content_type("application/x-anything", &[]).is_ok());
    }

    #[test]
    fn test_parameters_are_ignored() {
        assert!(validate_content_type("text/plain; charset=utf-8", &allowed()).is_ok());
        assert!(validate_content_type("IMAGE/PNG", &allowed()).is_ok());
    }

    #[test]
    fn test_disallowed_type_rejected() {
        match validate_content_type("application/pdf", &allowed()) {
            Err(AppError::InvalidInput(msg)) => {
                assert!(msg.starts_with("Invalid file type"));
                assert!(msg.contains("image/png"));
            }
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }
}
