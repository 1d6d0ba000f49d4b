//! Stateless codec primitives and the `(chunk id, mode)` decode dispatch.

use std::io::Read;

use flate2::read::{DeflateDecoder, ZlibDecoder};

use crate::chunks::{strips_size_prefix, ChunkId, Dialect, Encoding};
use crate::cipher::KeySchedule;
use crate::error::DecodeError;

/// Standard DEFLATE (zlib wrapped). `max_size` bounds the output; going
/// over it is treated the same as a corrupt stream.
pub fn inflate(bytes: &[u8], max_size: Option<usize>) -> Result<Vec<u8>, DecodeError> {
    bounded_read(ZlibDecoder::new(bytes), max_size)
}

/// The "anaconda" variant: a 4-byte wrapper header precedes a raw DEFLATE
/// stream.
pub fn inflate_anaconda(bytes: &[u8], max_size: Option<usize>) -> Result<Vec<u8>, DecodeError> {
    if bytes.len() < 4 {
        return Err(DecodeError::InflateFailed);
    }
    bounded_read(DeflateDecoder::new(&bytes[4..]), max_size)
}

/// Inflate if the bytes are a valid stream, otherwise hand them back
/// unchanged. Some authoring-tool sections are written either way.
pub fn inflate_or_raw(bytes: &[u8]) -> Vec<u8> {
    inflate(bytes, None).unwrap_or_else(|_| bytes.to_vec())
}

fn bounded_read(reader: impl Read, max_size: Option<usize>) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    match max_size {
        Some(max) => {
            reader
                .take(max as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|_| DecodeError::InflateFailed)?;
            if out.len() > max {
                return Err(DecodeError::InflateFailed);
            }
        }
        None => {
            let mut reader = reader;
            reader
                .read_to_end(&mut out)
                .map_err(|_| DecodeError::InflateFailed)?;
        }
    }
    Ok(out)
}

/// Everything needed to turn stored chunk bytes into plaintext: the
/// dialect and, once derived, the key schedule. Owned by the game; entries
/// borrow it for lazy decodes.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    pub dialect: Dialect,
    pub key: Option<KeySchedule>,
}

impl Decoder {
    /// Applies the §4.2.3 step sequence for `mode` to `bytes`.
    ///
    /// Mode 1 and 3 require the key schedule; hitting them before key
    /// derivation is a format violation, not a missing feature.
    pub fn decode(
        &self,
        id: ChunkId,
        mode: Encoding,
        bytes: &[u8],
        max_size: Option<usize>,
    ) -> Result<Vec<u8>, DecodeError> {
        match mode {
            Encoding::Plain => Ok(bytes.to_vec()),
            Encoding::Encrypted => {
                let decrypted = self.key()?.decrypt(bytes)?;
                if strips_size_prefix(id, self.dialect) {
                    Ok(decrypted[4..].to_vec())
                } else {
                    Ok(decrypted)
                }
            }
            Encoding::Compressed => inflate(bytes, max_size),
            Encoding::CompressedEncrypted => {
                // the validated length prefix doubles as the wrapper header
                // the anaconda inflater skips
                let decrypted = self.key()?.decrypt(bytes)?;
                inflate_anaconda(&decrypted, max_size)
            }
        }
    }

    fn key(&self) -> Result<&KeySchedule, DecodeError> {
        self.key
            .as_ref()
            .ok_or(DecodeError::InvalidState(
                "encrypted chunk before key derivation",
            ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use flate2::write::{DeflateEncoder, ZlibEncoder};
    use flate2::Compression;

    use super::*;
    use crate::cipher::KeyMaterial;

    pub(crate) fn zlib(bytes: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn deflate_raw(bytes: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn keyed_decoder() -> Decoder {
        let material = KeyMaterial {
            title: Some("A".into()),
            copyright: Some("C".into()),
            project: Some("".into()),
        };
        Decoder {
            dialect: Dialect::V288,
            key: Some(KeySchedule::derive(&material, 2, Dialect::V288, false)),
        }
    }

    #[test]
    fn inflate_round_trips_both_variants() {
        let payload = b"the same bytes out that went in".as_slice();
        assert_eq!(inflate(&zlib(payload), None).unwrap(), payload);

        let mut anaconda = (payload.len() as u32).to_le_bytes().to_vec();
        anaconda.extend(deflate_raw(payload));
        assert_eq!(inflate_anaconda(&anaconda, None).unwrap(), payload);
    }

    #[test]
    fn inflate_enforces_max_size() {
        let compressed = zlib(&[7u8; 64]);
        assert_eq!(inflate(&compressed, Some(64)).unwrap().len(), 64);
        assert_eq!(
            inflate(&compressed, Some(63)),
            Err(DecodeError::InflateFailed)
        );
    }

    #[test]
    fn inflate_or_raw_passes_raw_bytes_through() {
        assert_eq!(inflate_or_raw(b"not deflate"), b"not deflate");
        assert_eq!(inflate_or_raw(&zlib(b"abc")), b"abc");
    }

    #[test]
    fn mode0_is_identity() {
        let decoder = Decoder::default();
        assert_eq!(
            decoder
                .decode(ChunkId::HEADER, Encoding::Plain, b"raw", None)
                .unwrap(),
            b"raw"
        );
    }

    #[test]
    fn mode1_strips_prefix_for_string_chunks_only() {
        let decoder = keyed_decoder();
        let key = decoder.key.as_ref().unwrap();

        let title = decoder
            .decode(ChunkId::TITLE, Encoding::Encrypted, &key.encrypt(b"Hi"), None)
            .unwrap();
        assert_eq!(title, b"Hi");

        let other = decoder
            .decode(ChunkId::MENU, Encoding::Encrypted, &key.encrypt(b"Hi"), None)
            .unwrap();
        assert_eq!(&other[4..], b"Hi");
    }

    #[test]
    fn mode3_decrypts_then_inflates() {
        let decoder = keyed_decoder();
        let key = decoder.key.as_ref().unwrap();

        let payload = b"compressed and encrypted";
        let encrypted = key.encrypt(&deflate_raw(payload));
        let decoded = decoder
            .decode(
                ChunkId::GLOBAL_EVENTS,
                Encoding::CompressedEncrypted,
                &encrypted,
                Some(payload.len()),
            )
            .unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn encrypted_modes_need_the_key() {
        let decoder = Decoder::default();
        let err = decoder
            .decode(ChunkId::TITLE, Encoding::Encrypted, &[0; 16], None)
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidState(_)));
    }
}
