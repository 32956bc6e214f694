use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address '{0}': expected a 0x-prefixed hex string")]
    InvalidAddress(String),

    #[error("Provider returned an unexpected response (status {status}): {body}")]
    ProviderResponse { status: u16, body: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Keeps provider bodies short enough to show in an error message.
pub fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let cut = trimmed
        .char_indices()
        .take_while(|(i, _)| *i < MAX)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    format!("{}…", &trimmed[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_body_keeps_short_bodies_intact() {
        assert_eq!(truncate_body("  not json  "), "not json");
    }

    #[test]
    fn truncate_body_cuts_long_bodies() {
        let long = "x".repeat(500);
        let cut = truncate_body(&long);
        assert!(cut.len() < 250);
        assert!(cut.ends_with('…'));
    }
}
