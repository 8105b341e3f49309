//! Reference [`TextSource`] implementation.

use crate::traits::{TextSource, TextSourceError};

/// Treats the document bytes as UTF-8 text and normalizes whitespace.
///
/// This is the conversion used by the test suite and by the CLI for
/// pre-extracted documents. A real PDF converter is an external
/// collaborator that plugs in at the same seam.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8TextSource;

impl TextSource for Utf8TextSource {
    fn pdf_to_text(&self, bytes: &[u8]) -> Result<String, TextSourceError> {
        let raw = std::str::from_utf8(bytes)
            .map_err(|e| TextSourceError::Unreadable(format!("not valid UTF-8: {e}")))?;

        // Normalize line endings and strip trailing space per line; layout
        // otherwise passes through untouched.
        let mut text = String::with_capacity(raw.len());
        for line in raw.replace("\r\n", "\n").replace('\r', "\n").lines() {
            text.push_str(line.trim_end());
            text.push('\n');
        }
        while text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_line_endings() {
        let out = Utf8TextSource
            .pdf_to_text(b"Nome: GOKU  \r\nInscricao: 101943\r\n")
            .unwrap();
        assert_eq!(out, "Nome: GOKU\nInscricao: 101943");
    }

    #[test]
    fn test_rejects_non_utf8() {
        let err = Utf8TextSource.pdf_to_text(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, TextSourceError::Unreadable(_)));
    }

    #[test]
    fn test_deterministic() {
        let bytes = "Seccional: PR\nCategoria: ADVOGADO".as_bytes();
        let a = Utf8TextSource.pdf_to_text(bytes).unwrap();
        let b = Utf8TextSource.pdf_to_text(bytes).unwrap();
        assert_eq!(a, b);
    }
}
