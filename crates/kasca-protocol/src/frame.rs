// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Binary audio frames sent by control clients
//!
//! Layout: 36 bytes of recording id, 36 bytes of keyboard session id, then
//! the encoded audio bytes. Identifiers are right-padded with spaces or NULs.

use crate::error::{ProtocolError, ProtocolResult};

pub const ID_FIELD_LEN: usize = 36;
pub const AUDIO_HEADER_LEN: usize = ID_FIELD_LEN * 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub recording_id: String,
    pub keyboard_session_id: String,
    pub payload: Vec<u8>,
}

impl AudioFrame {
    /// Split a binary frame into its header fields and payload.
    ///
    /// Takes ownership so the payload reuses the frame's allocation.
    pub fn decode(mut bytes: Vec<u8>) -> ProtocolResult<Self> {
        if bytes.len() < AUDIO_HEADER_LEN {
            return Err(ProtocolError::FrameTooShort { len: bytes.len() });
        }

        let recording_id = header_field(&bytes[..ID_FIELD_LEN], "recording_id")?;
        let keyboard_session_id =
            header_field(&bytes[ID_FIELD_LEN..AUDIO_HEADER_LEN], "keyboard_session_id")?;
        if recording_id.is_empty() {
            return Err(ProtocolError::invalid("recording_id", "header field is blank"));
        }

        bytes.drain(..AUDIO_HEADER_LEN);
        Ok(AudioFrame {
            recording_id,
            keyboard_session_id,
            payload: bytes,
        })
    }

    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut out = Vec::with_capacity(AUDIO_HEADER_LEN + self.payload.len());
        push_field(&mut out, &self.recording_id)?;
        push_field(&mut out, &self.keyboard_session_id)?;
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

fn header_field(raw: &[u8], name: &'static str) -> ProtocolResult<String> {
    let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::HeaderEncoding(name))?;
    Ok(text.trim_end_matches([' ', '\0']).to_string())
}

fn push_field(out: &mut Vec<u8>, value: &str) -> ProtocolResult<()> {
    if value.len() > ID_FIELD_LEN {
        return Err(ProtocolError::IdentifierTooLong(value.to_string()));
    }
    out.extend_from_slice(value.as_bytes());
    out.resize(out.len() + ID_FIELD_LEN - value.len(), b' ');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING: &str = "3f2b8c1e-0000-4000-8000-00000000abcd";

    #[test]
    fn test_decode_full_width_ids() {
        let frame = AudioFrame {
            recording_id: RECORDING.into(),
            keyboard_session_id: "5d0c7a3e-1111-4111-8111-000000000001".into(),
            payload: vec![0x1A, 0x45, 0xDF, 0xA3],
        };
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), AUDIO_HEADER_LEN + 4);
        assert_eq!(AudioFrame::decode(bytes).unwrap(), frame);
    }

    #[test]
    fn test_decode_trims_padding() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"rec-1");
        bytes.resize(ID_FIELD_LEN, 0);
        bytes.extend_from_slice(b"kbd-7");
        bytes.resize(AUDIO_HEADER_LEN, b' ');
        bytes.extend_from_slice(&[1, 2, 3]);

        let frame = AudioFrame::decode(bytes).unwrap();
        assert_eq!(frame.recording_id, "rec-1");
        assert_eq!(frame.keyboard_session_id, "kbd-7");
        assert_eq!(frame.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_header_only_frame_has_empty_payload() {
        let bytes = AudioFrame {
            recording_id: "r".into(),
            keyboard_session_id: "k".into(),
            payload: Vec::new(),
        }
        .encode()
        .unwrap();
        assert!(AudioFrame::decode(bytes).unwrap().payload.is_empty());
    }

    #[test]
    fn test_short_and_malformed_frames() {
        assert!(matches!(
            AudioFrame::decode(vec![b'a'; 71]),
            Err(ProtocolError::FrameTooShort { len: 71 })
        ));
        assert!(matches!(
            AudioFrame::decode(vec![b' '; 80]),
            Err(ProtocolError::InvalidField { field: "recording_id", .. })
        ));

        let mut bad_utf8 = vec![0xFF; ID_FIELD_LEN];
        bad_utf8.resize(AUDIO_HEADER_LEN, b' ');
        assert!(matches!(
            AudioFrame::decode(bad_utf8),
            Err(ProtocolError::HeaderEncoding("recording_id"))
        ));
    }

    #[test]
    fn test_encode_rejects_long_ids() {
        let frame = AudioFrame {
            recording_id: "x".repeat(ID_FIELD_LEN + 1),
            keyboard_session_id: String::new(),
            payload: Vec::new(),
        };
        assert!(matches!(
            frame.encode(),
            Err(ProtocolError::IdentifierTooLong(_))
        ));
    }
}
