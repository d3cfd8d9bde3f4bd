mod message;
mod new_recipient;
mod recipient;
mod recipient_email;

pub use message::{INLINE_CONTENT_ID, InlineAttachment, OutgoingMessage, Subject};
pub use new_recipient::{NewRecipient, dedup_by_email};
pub use recipient::{Recipient, RecipientId, RecipientState, RecipientView};
pub use recipient_email::RecipientEmail;
