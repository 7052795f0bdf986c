use crate::error::{InboundError, Result};

/// Basic email validation
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(InboundError::InvalidEmail("Email is empty".to_string()));
    }

    let (local, domain) = split_address(email)
        .ok_or_else(|| InboundError::InvalidEmail(format!("Invalid email format: {}", email)))?;

    if local.is_empty() || domain.is_empty() {
        return Err(InboundError::InvalidEmail(
            "Email parts cannot be empty".to_string(),
        ));
    }

    if !domain.contains('.') {
        return Err(InboundError::InvalidEmail(
            "Domain must contain a dot".to_string(),
        ));
    }

    Ok(())
}

/// Lowercase and trim an envelope address, dropping surrounding angle brackets
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let unbracketed = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    unbracketed.trim().to_lowercase()
}

/// Split `local@domain` on its single `@`
pub fn split_address(address: &str) -> Option<(&str, &str)> {
    let mut parts = address.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => Some((local, domain)),
        _ => None,
    }
}

/// Lowercase a hostname and strip any trailing root dot
pub fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_lowercase()
}
