//! multipart/form-data body encoder.
//!
//! # Design
//! The upload endpoints accept exactly one file per request. The encoder
//! writes that file section first and every string part after it, in the
//! order they were added. When several file parts are supplied only the
//! first is sent; the rest are reported as a `MultipartWarning` instead of
//! being dropped silently.
//!
//! `name` and `filename` are always wrapped in double quotes, string parts
//! included. The target API rejects unquoted parameters.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::error::BoxError;
use crate::request::{FileFormPart, FormPart, StringFormPart};

const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// Non-fatal observations made while encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartWarning {
    /// File parts beyond the first were not sent. Holds their part names.
    ExtraFileParts { ignored: Vec<String> },
}

/// An encoded body together with the boundary that delimits it.
#[derive(Debug, Clone)]
pub struct EncodedMultipart {
    pub boundary: String,
    pub body: Bytes,
    pub warnings: Vec<MultipartWarning>,
}

impl EncodedMultipart {
    /// Value for the `Content-Type` header matching this body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    boundary: String,
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartEncoder {
    /// Encoder with a freshly generated boundary.
    pub fn new() -> Self {
        Self {
            boundary: format!("box-core-{}", Uuid::new_v4().simple()),
        }
    }

    /// Encoder with a caller-chosen boundary. The boundary must not occur in
    /// any part's content.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Encode `parts` into a single body.
    ///
    /// Validation happens before the file stream is touched, so a rejected
    /// request leaves the caller's reader unread.
    pub async fn encode(self, parts: Vec<FormPart<'_>>) -> Result<EncodedMultipart, BoxError> {
        let mut file: Option<FileFormPart<'_>> = None;
        let mut ignored = Vec::new();
        let mut strings: Vec<StringFormPart> = Vec::new();

        for part in parts {
            if part.name().is_empty() {
                return Err(BoxError::MissingParameter("form part name"));
            }
            match part {
                FormPart::File(part) if file.is_none() => file = Some(part),
                FormPart::File(part) => ignored.push(part.name),
                FormPart::String(part) => strings.push(part),
            }
        }

        let mut file = file.ok_or(BoxError::MissingFilePart)?;
        if file.file_name.is_empty() {
            return Err(BoxError::MissingParameter("file_name"));
        }

        let mut warnings = Vec::new();
        if !ignored.is_empty() {
            tracing::warn!(ignored = ?ignored, "only the first file part is uploaded");
            warnings.push(MultipartWarning::ExtraFileParts { ignored });
        }

        let mut content = Vec::new();
        file.reader.read_to_end(&mut content).await?;

        let mut body = BytesMut::with_capacity(content.len() + 256 * (strings.len() + 1));
        self.open_section(&mut body);
        body.put_slice(
            format!(
                "Content-Disposition: form-data; name={}; filename={}\r\n",
                quote(&file.name),
                quote(&file.file_name)
            )
            .as_bytes(),
        );
        let content_type = file
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_FILE_CONTENT_TYPE);
        body.put_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.put_slice(&content);
        body.put_slice(b"\r\n");

        for part in &strings {
            self.open_section(&mut body);
            body.put_slice(
                format!("Content-Disposition: form-data; name={}\r\n\r\n", quote(&part.name))
                    .as_bytes(),
            );
            body.put_slice(part.value.as_bytes());
            body.put_slice(b"\r\n");
        }

        body.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        Ok(EncodedMultipart {
            boundary: self.boundary,
            body: body.freeze(),
            warnings,
        })
    }

    fn open_section(&self, body: &mut BytesMut) {
        body.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }
}

/// Wrap a parameter value in double quotes, escaping the characters that
/// would end the quoted string or the header line.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("%22"),
            '\r' => quoted.push_str("%0D"),
            '\n' => quoted.push_str("%0A"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_text(encoded: &EncodedMultipart) -> String {
        String::from_utf8(encoded.body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn file_section_comes_first_then_strings_in_order() {
        let mut file: &[u8] = b"hello";
        let parts = vec![
            FormPart::string("parent_id", "0"),
            FormPart::file("file", "hello.txt", &mut file),
            FormPart::string("name", "greeting"),
        ];

        let encoded = MultipartEncoder::with_boundary("XYZ").encode(parts).await.unwrap();

        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"hello.txt\"\r\n\
            Content-Type: application/octet-stream\r\n\r\n\
            hello\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"parent_id\"\r\n\r\n\
            0\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"name\"\r\n\r\n\
            greeting\r\n\
            --XYZ--\r\n";
        assert_eq!(body_text(&encoded), expected);
        assert!(encoded.warnings.is_empty());
        assert_eq!(encoded.content_type(), "multipart/form-data; boundary=XYZ");
    }

    #[tokio::test]
    async fn missing_file_part_is_rejected() {
        let parts = vec![FormPart::string("attributes", "{}")];
        let err = MultipartEncoder::new().encode(parts).await.unwrap_err();
        assert!(matches!(err, BoxError::MissingFilePart));
    }

    #[tokio::test]
    async fn extra_file_parts_are_reported_and_left_unread() {
        let mut first: &[u8] = b"one";
        let mut second: &[u8] = b"two";
        let parts = vec![
            FormPart::file("file", "1.txt", &mut first),
            FormPart::file("file2", "2.txt", &mut second),
        ];

        let encoded = MultipartEncoder::with_boundary("B").encode(parts).await.unwrap();

        assert_eq!(
            encoded.warnings,
            vec![MultipartWarning::ExtraFileParts {
                ignored: vec!["file2".to_string()]
            }]
        );
        let text = body_text(&encoded);
        assert!(text.contains("one"));
        assert!(!text.contains("2.txt"));
        assert_eq!(second, b"two");
    }

    #[tokio::test]
    async fn file_content_type_can_be_overridden() {
        let mut file: &[u8] = b"{}";
        let parts: Vec<FormPart<'_>> = vec![FileFormPart::new("file", "a.json", &mut file)
            .content_type("application/json")
            .into()];
        let encoded = MultipartEncoder::with_boundary("B").encode(parts).await.unwrap();
        assert!(body_text(&encoded).contains("Content-Type: application/json\r\n\r\n{}"));
    }

    #[tokio::test]
    async fn binary_content_is_copied_verbatim() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut file: &[u8] = &data;
        let parts = vec![FormPart::file("file", "bin", &mut file)];
        let encoded = MultipartEncoder::with_boundary("B").encode(parts).await.unwrap();
        assert!(encoded.body.windows(data.len()).any(|w| w == data.as_slice()));
    }

    #[tokio::test]
    async fn empty_names_are_precondition_errors() {
        let mut file: &[u8] = b"x";
        let err = MultipartEncoder::new()
            .encode(vec![FormPart::file("file", "", &mut file)])
            .await
            .unwrap_err();
        assert!(matches!(err, BoxError::MissingParameter("file_name")));

        let err = MultipartEncoder::new()
            .encode(vec![FormPart::string("", "v")])
            .await
            .unwrap_err();
        assert!(matches!(err, BoxError::MissingParameter("form part name")));
    }

    #[test]
    fn generated_boundaries_are_unique() {
        assert_ne!(MultipartEncoder::new().boundary(), MultipartEncoder::new().boundary());
    }

    #[test]
    fn quote_escapes_line_breaks_and_quotes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("a\"b\r\nc"), "\"a%22b%0D%0Ac\"");
    }
}
