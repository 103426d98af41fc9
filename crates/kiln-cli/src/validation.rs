/// Parses a `KEY=VALUE` credential flag. The value may itself contain `=`.
pub fn parse_credential_pair(raw: &str) -> Result<(String, String), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got '{raw}'"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err("credential key must not be empty".to_string());
    }
    if value.trim().is_empty() {
        return Err(format!("credential '{key}' must have a non-empty value"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Validates a controller, model or app-name token.
pub fn parse_resource_name(raw: &str) -> Result<String, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if value.chars().any(char::is_whitespace) {
        return Err(format!("name '{value}' must not contain whitespace"));
    }
    if value.contains('/') {
        return Err(format!("name '{value}' must not contain '/'"));
    }
    Ok(value.to_string())
}
