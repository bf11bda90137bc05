//! MSB-first bit reader used by all three metadata parsers.

use crate::error::{FileKind, FormatError};

/// Bit reader over a whole metadata file.
///
/// Out-of-range reads return the corrupt-file error of the file kind the
/// reader was created for, carrying the byte offset of the failure.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
    kind: FileKind,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8], kind: FileKind) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
            kind,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn byte_pos(&self) -> usize {
        self.byte_pos
    }

    pub fn corrupt(&self, reason: &'static str) -> FormatError {
        self.kind.corrupt(reason, self.byte_pos)
    }

    fn remaining_bits(&self) -> usize {
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    fn ensure(&self, bits: usize) -> Result<(), FormatError> {
        if self.byte_pos > self.data.len() || self.remaining_bits() < bits {
            return Err(self.corrupt("unexpected end of data"));
        }
        Ok(())
    }

    /// Read `n` bits (up to 32).
    pub fn read(&mut self, n: u8) -> Result<u32, FormatError> {
        debug_assert!(n <= 32);
        self.ensure(n as usize)?;

        let mut result = 0u64;
        let mut left = n;
        while left > 0 {
            let avail = 8 - self.bit_pos;
            let take = avail.min(left);
            let shift = avail - take;
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (self.data[self.byte_pos] >> shift) & mask;
            result = (result << take) | chunk as u64;

            self.bit_pos += take;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            left -= take;
        }

        Ok(result as u32)
    }

    pub fn read_bool(&mut self) -> Result<bool, FormatError> {
        Ok(self.read(1)? == 1)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.read(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        Ok(self.read(16)? as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        self.read(32)
    }

    pub fn read_u64(&mut self) -> Result<u64, FormatError> {
        let hi = self.read(32)? as u64;
        let lo = self.read(32)? as u64;
        Ok((hi << 32) | lo)
    }

    pub fn skip(&mut self, bits: usize) -> Result<(), FormatError> {
        self.ensure(bits)?;
        let total = self.bit_pos as usize + bits;
        self.byte_pos += total / 8;
        self.bit_pos = (total % 8) as u8;
        Ok(())
    }

    pub fn skip_bytes(&mut self, bytes: usize) -> Result<(), FormatError> {
        self.skip(bytes * 8)
    }

    /// Jump to an absolute byte offset.
    pub fn seek_byte(&mut self, offset: usize) -> Result<(), FormatError> {
        if offset > self.data.len() {
            return Err(self.kind.corrupt("offset beyond end of file", offset));
        }
        self.byte_pos = offset;
        self.bit_pos = 0;
        Ok(())
    }

    /// Borrow `n` raw bytes. The reader must be byte aligned.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if self.bit_pos != 0 {
            return Err(self.corrupt("unaligned byte read"));
        }
        self.ensure(n * 8)?;
        let out = &self.data[self.byte_pos..self.byte_pos + n];
        self.byte_pos += n;
        Ok(out)
    }

    /// Read a fixed-width ASCII field such as a clip id or language code.
    pub fn read_string(&mut self, n: usize) -> Result<String, FormatError> {
        let raw = self.read_bytes(n)?;
        Ok(raw
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect())
    }

    /// Read a length-prefixed block header and return the absolute end offset.
    ///
    /// `len_bits` is the width of the length field; the block body starts
    /// right after it.
    pub fn block(&mut self, len_bits: u8) -> Result<usize, FormatError> {
        let len = self.read(len_bits)? as usize;
        let end = self.byte_pos + len;
        if end > self.data.len() {
            return Err(self.corrupt("block length exceeds file size"));
        }
        Ok(end)
    }

    /// Finish a length-prefixed block, rejecting bodies that overran it.
    pub fn end_block(&mut self, end: usize) -> Result<(), FormatError> {
        if self.byte_pos > end || (self.byte_pos == end && self.bit_pos != 0) {
            return Err(self.corrupt("block contents overrun declared length"));
        }
        self.seek_byte(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_across_bytes() {
        let data = [0b1011_0100, 0b0101_0101, 0xFF];
        let mut reader = BitReader::new(&data, FileKind::Playlist);

        assert_eq!(reader.read(4).unwrap(), 0b1011);
        assert_eq!(reader.read(6).unwrap(), 0b0100_01);
        assert_eq!(reader.read(6).unwrap(), 0b01_0101);
        assert_eq!(reader.read_u8().unwrap(), 0xFF);
        assert!(reader.read(1).is_err());
    }

    #[test]
    fn test_read_u64() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut reader = BitReader::new(&data, FileKind::Playlist);
        assert_eq!(reader.read_u64().unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_truncation_reports_kind_and_offset() {
        let data = [0u8; 3];
        let mut reader = BitReader::new(&data, FileKind::ClipInfo);
        reader.skip_bytes(2).unwrap();
        let err = reader.read_u16().unwrap_err();
        assert_eq!(
            err,
            FormatError::CorruptClipInfo {
                reason: "unexpected end of data",
                offset: 2
            }
        );
    }

    #[test]
    fn test_block_bounds() {
        // length 2, body of 2 bytes, trailing byte
        let data = [0x00, 0x02, 0xAA, 0xBB, 0xCC];
        let mut reader = BitReader::new(&data, FileKind::Index);
        let end = reader.block(16).unwrap();
        assert_eq!(end, 4);
        assert_eq!(reader.read_u8().unwrap(), 0xAA);
        reader.end_block(end).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 0xCC);

        let data = [0x00, 0x09, 0xAA];
        let mut reader = BitReader::new(&data, FileKind::Index);
        assert!(reader.block(16).is_err());
    }

    #[test]
    fn test_read_string_stops_at_nul() {
        let data = *b"eng\0\0";
        let mut reader = BitReader::new(&data, FileKind::ClipInfo);
        assert_eq!(reader.read_string(5).unwrap(), "eng");
    }
}
