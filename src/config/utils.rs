use crate::core::realtime::Modality;

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Parse a list of response modalities, rejecting unknown names.
pub fn parse_modalities<S: AsRef<str>>(values: &[S]) -> Result<Vec<Modality>, String> {
    values
        .iter()
        .map(|value| {
            Modality::parse(value.as_ref())
                .ok_or_else(|| format!("unknown response modality '{}'", value.as_ref().trim()))
        })
        .collect()
}

/// Treat empty strings as unset.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
