use super::ApiError;

/// Treat blank strings like absent ones.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn validate_email(email: &str) -> Result<&str, ApiError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }

    if trimmed.len() > 254 {
        return Err(ApiError::validation("Email must be 254 characters or less"));
    }

    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(trimmed),
        _ => Err(ApiError::validation("A valid email address is required")),
    }
}

/// Accept an `Origin` header value only when it is an absolute http(s) origin.
pub fn parse_origin(origin: &str) -> Option<String> {
    let url = url::Url::parse(origin).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url.origin().ascii_serialization())
}
