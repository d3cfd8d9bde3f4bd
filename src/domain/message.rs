use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use unicode_segmentation::UnicodeSegmentation;

/// Content id every inline attachment is sent with. HTML bodies reference
/// the image as `<img src="cid:image1">`.
pub const INLINE_CONTENT_ID: &str = "image1";

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct Subject(String);

impl Subject {
    pub fn parse(s: String) -> Result<Self, String> {
        let is_empty_or_whitespace = s.trim().is_empty();
        let is_too_long = s.graphemes(true).count() > 256;
        let has_line_break = s.contains(&['\r', '\n'][..]);

        if is_empty_or_whitespace || is_too_long || has_line_break {
            Err(format!("{s} is not a valid subject line."))
        } else {
            Ok(Self(s))
        }
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAttachment {
    content: Vec<u8>,
    content_type: String,
}

impl InlineAttachment {
    /// Accepts either raw base64 or a `data:<type>;base64,<payload>` URL.
    /// A content type found in the data URL wins over `content_type`.
    pub fn parse(encoded: &str, content_type: Option<String>) -> Result<Self, String> {
        let (payload, content_type) = match encoded.trim().strip_prefix("data:") {
            Some(data_url) => {
                let (header, payload) = data_url
                    .split_once(',')
                    .ok_or_else(|| "The attachment data URL has no payload.".to_string())?;
                let declared = header.split(';').next().filter(|t| !t.is_empty());
                (payload, declared.map(str::to_string).or(content_type))
            }
            None => (encoded.trim(), content_type),
        };

        let content = STANDARD
            .decode(payload)
            .map_err(|e| format!("The attachment is not valid base64: {e}"))?;
        if content.is_empty() {
            return Err("The attachment is empty.".into());
        }

        Ok(Self {
            content,
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        })
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn filename(&self) -> String {
        let subtype = self
            .content_type
            .split_once('/')
            .map(|(_, subtype)| subtype.split(&['+', ';'][..]).next().unwrap_or_default().trim());
        let extension = match subtype {
            Some("jpeg") => "jpg",
            Some(subtype) if !subtype.is_empty() => subtype,
            _ => "bin",
        };
        format!("image.{extension}")
    }

    pub fn content_id(&self) -> &'static str {
        INLINE_CONTENT_ID
    }
}

#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub subject: Subject,
    pub html_body: String,
    pub attachment: Option<InlineAttachment>,
}

impl OutgoingMessage {
    pub fn parse(
        subject: String,
        html_body: String,
        attachment: Option<InlineAttachment>,
    ) -> Result<Self, String> {
        let subject = Subject::parse(subject)?;
        if html_body.trim().is_empty() {
            return Err("The message body cannot be empty.".into());
        }
        Ok(Self {
            subject,
            html_body,
            attachment,
        })
    }
}
