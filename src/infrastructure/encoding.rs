//! Text encoding for export files.
//!
//! Export files are written in a legacy single- or multi-byte encoding
//! (Shift_JIS by default). Characters the encoding cannot represent are
//! dropped rather than replaced.

use encoding_rs::{EncoderResult, Encoding, UTF_8};

use crate::domain::{AppError, Result};

/// The encoding used for export files.
#[derive(Debug, Clone, Copy)]
pub struct ExportEncoding {
    encoding: &'static Encoding,
}

impl Default for ExportEncoding {
    fn default() -> Self {
        Self { encoding: UTF_8 }
    }
}

impl ExportEncoding {
    /// Looks up an encoding by WHATWG label (`shift_jis`, `cp932`, `utf-8`, ...).
    ///
    /// # Errors
    /// Returns a configuration error for unknown labels and for encodings that
    /// cannot be written (UTF-16 and `replacement`).
    pub fn for_label(label: &str) -> Result<Self> {
        // Python-style name that WHATWG does not list.
        let normalized = match label.trim() {
            l if l.eq_ignore_ascii_case("cp932") => "windows-31j",
            l => l,
        };

        let encoding =
            Encoding::for_label(normalized.as_bytes()).ok_or_else(|| AppError::Config {
                message: format!("Unknown export encoding: {label}"),
            })?;

        if encoding.output_encoding() != encoding {
            return Err(AppError::Config {
                message: format!("Encoding {} cannot be used for output", encoding.name()),
            });
        }

        Ok(Self { encoding })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Encodes `text`, silently dropping unmappable characters.
    #[must_use]
    pub fn encode_lossy(&self, text: &str) -> Vec<u8> {
        if self.encoding == UTF_8 {
            return text.as_bytes().to_vec();
        }

        let mut encoder = self.encoding.new_encoder();
        let mut out = Vec::with_capacity(text.len() + 16);
        let mut rest = text;

        loop {
            let needed = encoder
                .max_buffer_length_from_utf8_without_replacement(rest.len())
                .unwrap_or(rest.len() * 4 + 16);
            out.reserve(needed);

            let (result, read) =
                encoder.encode_from_utf8_to_vec_without_replacement(rest, &mut out, true);
            rest = &rest[read..];

            match result {
                EncoderResult::InputEmpty => break,
                EncoderResult::OutputFull => {}
                EncoderResult::Unmappable(c) => {
                    tracing::trace!(character = %c.escape_unicode(), "Dropping unmappable character");
                }
            }
        }

        out
    }

    /// Decodes bytes, substituting U+FFFD for malformed sequences.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (text, _, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            tracing::debug!(encoding = self.name(), "Malformed bytes while decoding");
        }
        text.into_owned()
    }
}
