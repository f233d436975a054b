//! Sender parsing for the `From` header.

/// Sender of a message, split from a `From` header value.
///
/// # Examples
/// - `"IKUTO <billing@ikuto.fr>"` → `name = "IKUTO"`, `email = "billing@ikuto.fr"`
/// - `"billing@ikuto.fr"` → `name = ""`, `email = "billing@ikuto.fr"`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    /// Display name, surrounding quotes removed (may be empty).
    pub name: String,
    /// Address between the angle brackets, or the whole header value.
    pub email: String,
}

impl Sender {
    /// Split a `From` header value on the `Name <email>` pattern.
    ///
    /// When no `<...>` pair is present the entire (trimmed) value is taken
    /// as the address and the name is left empty.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    name: strip_quotes(&trimmed[..open]),
                    email: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        Self {
            name: String::new(),
            email: trimmed.to_string(),
        }
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}
