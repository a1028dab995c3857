//! Clip encodings and the concatenated capture buffer

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Container/codec of a recorded clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Webm,
    Mp4,
    Ogg,
    Wav,
}

impl Encoding {
    /// Probe order used when negotiating with a backend
    pub const CANDIDATES: [Encoding; 4] =
        [Encoding::Webm, Encoding::Mp4, Encoding::Ogg, Encoding::Wav];

    /// Used when the backend supports none of the candidates
    pub const FALLBACK: Encoding = Encoding::Webm;

    pub fn mime_type(self) -> &'static str {
        match self {
            Encoding::Webm => "audio/webm",
            Encoding::Mp4 => "audio/mp4",
            Encoding::Ogg => "audio/ogg",
            Encoding::Wav => "audio/wav",
        }
    }

    /// First candidate accepted by `supported`, else [`Encoding::FALLBACK`]
    pub fn negotiate(mut supported: impl FnMut(Encoding) -> bool) -> Encoding {
        Self::CANDIDATES
            .into_iter()
            .find(|encoding| supported(*encoding))
            .unwrap_or(Self::FALLBACK)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// One finished clip: every chunk of a session, concatenated in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    bytes: Bytes,
    encoding: Encoding,
}

impl EncodedAudio {
    pub fn empty(encoding: Encoding) -> Self {
        Self {
            bytes: Bytes::new(),
            encoding,
        }
    }

    pub fn from_chunks(chunks: Vec<Bytes>, encoding: Encoding) -> Self {
        let bytes = match chunks.len() {
            0 => Bytes::new(),
            1 => chunks.into_iter().next().unwrap_or_default(),
            _ => {
                let total = chunks.iter().map(Bytes::len).sum();
                let mut joined = BytesMut::with_capacity(total);
                for chunk in chunks {
                    joined.extend_from_slice(&chunk);
                }
                joined.freeze()
            }
        };
        Self { bytes, encoding }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[cfg(test)]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_first_supported_wins() {
        let chosen = Encoding::negotiate(|e| matches!(e, Encoding::Ogg | Encoding::Wav));
        assert_eq!(chosen, Encoding::Ogg);
    }

    #[test]
    fn test_negotiate_falls_back_when_nothing_supported() {
        assert_eq!(Encoding::negotiate(|_| false), Encoding::Webm);
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let audio = EncodedAudio::from_chunks(
            vec![Bytes::from_static(b"RI"), Bytes::from_static(b"FF"), Bytes::from_static(b"!")],
            Encoding::Wav,
        );
        assert_eq!(audio.bytes().as_ref(), b"RIFF!");
        assert_eq!(audio.len(), 5);
        assert_eq!(audio.to_base64(), "UklGRiE=");
    }

    #[test]
    fn test_no_chunks_is_empty() {
        let audio = EncodedAudio::from_chunks(Vec::new(), Encoding::Mp4);
        assert!(audio.is_empty());
        assert_eq!(audio.encoding().mime_type(), "audio/mp4");
    }
}
