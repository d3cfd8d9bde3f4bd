use validator::ValidateEmail;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct RecipientEmail(String);

impl RecipientEmail {
    /// Trims surrounding whitespace before validating, so spreadsheet cells
    /// like `" ana@mail.com "` are accepted in their normalized form.
    pub fn parse(s: String) -> Result<Self, String> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("An empty address is not a valid recipient email.".into());
        }
        if !trimmed.contains('@') || !trimmed.validate_email() {
            return Err(format!("{trimmed} is not a valid recipient email."));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for RecipientEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecipientEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for RecipientEmail {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        RecipientEmail::parse(value)
    }
}
