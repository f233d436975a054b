//! Messages as returned by a mail provider.

/// PDF media type, compared case-insensitively.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// One message fetched from the provider: its headers and top-level parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMessage {
    /// Stable provider-assigned identifier.
    pub id: String,
    /// Header `(name, value)` pairs in message order.
    pub headers: Vec<(String, String)>,
    pub parts: Vec<MessagePart>,
}

/// A body part that may carry an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePart {
    /// Attachment filename (empty for inline body parts).
    pub filename: String,
    /// Declared media type, e.g. `"application/pdf"`.
    pub mime_type: String,
    /// Opaque provider reference used to fetch the bytes.
    pub attachment_ref: String,
}

impl RemoteMessage {
    /// First header value whose name matches case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parts that are named PDF attachments.
    pub fn pdf_parts(&self) -> impl Iterator<Item = &MessagePart> {
        self.parts.iter().filter(|p| p.is_pdf())
    }
}

impl MessagePart {
    pub fn is_pdf(&self) -> bool {
        !self.filename.is_empty() && self.mime_type.trim().eq_ignore_ascii_case(PDF_MIME_TYPE)
    }
}
