//! Position-tracked cursor over the loaded game buffer.
//!
//! All reads are bounded: anything that would run past the end of the
//! buffer fails with [`DecodeError::OutOfData`] instead of panicking.
//! Reads never copy the underlying buffer; spans are `Bytes` views into it.

use bytes::Bytes;

use crate::error::DecodeError;

/// Width of the length prefix in front of a counted string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    U8,
    U16,
    U32,
}

/// Character width of an embedded string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    /// Single-byte characters, decoded as Latin-1
    Narrow,
    /// Little-endian UTF-16 code units
    Wide,
}

#[derive(Debug, Clone, Default)]
pub struct Stream {
    data: Bytes,
    position: usize,
}

impl Stream {
    pub fn new(data: Bytes) -> Self {
        Stream { data, position: 0 }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn seek(&mut self, position: usize) -> Result<(), DecodeError> {
        if position > self.data.len() {
            return Err(DecodeError::out_of_data(self.remaining(), position));
        }
        self.position = position;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        if count > self.remaining() {
            return Err(DecodeError::out_of_data(self.remaining(), count));
        }
        self.position += count;
        Ok(())
    }

    /// Bounded read of `count` bytes as a zero-copy view.
    pub fn read_span(&mut self, count: usize) -> Result<Bytes, DecodeError> {
        if count > self.remaining() {
            return Err(DecodeError::out_of_data(self.remaining(), count));
        }
        let span = self.data.slice(self.position..self.position + count);
        self.position += count;
        Ok(span)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if N > self.remaining() {
            return Err(DecodeError::out_of_data(self.remaining(), N));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.position..self.position + N]);
        self.position += N;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.read_array::<1>().map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        self.read_array().map(i16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// NUL-terminated single-byte string. Fails if no terminator is found
    /// before the end of the buffer.
    pub fn read_cstring_narrow(&mut self) -> Result<String, DecodeError> {
        let rest = &self.data[self.position..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| DecodeError::out_of_data(self.remaining(), self.remaining() + 1))?;
        let value = latin1(&rest[..len]);
        self.position += len + 1;
        Ok(value)
    }

    /// NUL-terminated little-endian UTF-16 string.
    pub fn read_cstring_wide(&mut self) -> Result<String, DecodeError> {
        let rest = &self.data[self.position..];
        let mut units = Vec::new();
        let mut offset = 0;
        loop {
            if offset + 2 > rest.len() {
                return Err(DecodeError::out_of_data(self.remaining(), offset + 2));
            }
            let unit = u16::from_le_bytes([rest[offset], rest[offset + 1]]);
            offset += 2;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        self.position += offset;
        Ok(String::from_utf16_lossy(&units))
    }

    /// Fixed-length string of `count` code units.
    pub fn read_string(
        &mut self,
        count: usize,
        encoding: StringEncoding,
    ) -> Result<String, DecodeError> {
        match encoding {
            StringEncoding::Narrow => {
                let span = self.read_span(count)?;
                Ok(latin1(trim_nul_narrow(&span)))
            }
            StringEncoding::Wide => {
                let span = self.read_span(count * 2)?;
                let units = span
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .take_while(|&unit| unit != 0)
                    .collect::<Vec<_>>();
                Ok(String::from_utf16_lossy(&units))
            }
        }
    }

    /// Length-prefixed string; the prefix counts code units.
    pub fn read_length_prefixed(
        &mut self,
        width: PrefixWidth,
        encoding: StringEncoding,
    ) -> Result<String, DecodeError> {
        let count = match width {
            PrefixWidth::U8 => self.read_u8()? as usize,
            PrefixWidth::U16 => self.read_u16()? as usize,
            PrefixWidth::U32 => self.read_u32()? as usize,
        };
        self.read_string(count, encoding)
    }
}

fn trim_nul_narrow(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(len) => &bytes[..len],
        None => bytes,
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(bytes: &[u8]) -> Stream {
        Stream::new(Bytes::copy_from_slice(bytes))
    }

    #[test]
    fn bounded_integer_reads() {
        let mut strm = stream(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(strm.read_u16().unwrap(), 0x0201);
        assert_eq!(strm.read_u8().unwrap(), 0x03);
        assert_eq!(strm.position(), 3);
        assert_eq!(
            strm.read_u32(),
            Err(DecodeError::out_of_data(2, 4)),
        );
        // failed read must not advance
        assert_eq!(strm.position(), 3);

        let mut strm = stream(&[1, 0, 0, 0, 0, 0, 0, 0, 0xFF]);
        assert_eq!(strm.read_u64().unwrap(), 1);
        assert_eq!(strm.read_i16(), Err(DecodeError::out_of_data(1, 2)));
    }

    #[test]
    fn seek_is_clamped_to_size() {
        let mut strm = stream(&[0; 4]);
        strm.seek(4).unwrap();
        assert_eq!(strm.remaining(), 0);
        assert!(strm.seek(5).is_err());
    }

    #[test]
    fn cstring_narrow_requires_terminator() {
        let mut strm = stream(b"abc\0def");
        assert_eq!(strm.read_cstring_narrow().unwrap(), "abc");
        assert_eq!(strm.position(), 4);
        assert!(matches!(
            stream(b"abc").read_cstring_narrow(),
            Err(DecodeError::OutOfData { .. })
        ));
    }

    #[test]
    fn cstring_wide_reads_utf16le() {
        let mut strm = stream(&[b'h', 0, b'i', 0, 0, 0, 0xFF]);
        assert_eq!(strm.read_cstring_wide().unwrap(), "hi");
        assert_eq!(strm.position(), 6);
    }

    #[test]
    fn length_prefixed_counts_code_units() {
        let mut strm = stream(&[3, 0, b'a', 0, b'b', 0, b'c', 0]);
        let value = strm
            .read_length_prefixed(PrefixWidth::U16, StringEncoding::Wide)
            .unwrap();
        assert_eq!(value, "abc");
    }

    #[test]
    fn spans_are_views_into_the_buffer() {
        let mut strm = stream(b"0123456789");
        strm.skip(2).unwrap();
        let span = strm.read_span(3).unwrap();
        assert_eq!(&span[..], b"234");
        assert_eq!(strm.position(), 5);
    }
}
