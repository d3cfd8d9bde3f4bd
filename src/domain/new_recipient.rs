use std::collections::HashSet;

use super::RecipientEmail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipient {
    pub email: RecipientEmail,
}

impl TryFrom<String> for NewRecipient {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let email = RecipientEmail::parse(value)?;
        Ok(Self { email })
    }
}

/// Keeps the first occurrence of every address, preserving order.
pub fn dedup_by_email(recipients: Vec<NewRecipient>) -> Vec<NewRecipient> {
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter(|r| seen.insert(r.email.as_ref().to_lowercase()))
        .collect()
}
