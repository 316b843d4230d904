use nom::number::complete::{be_i16, be_u16, be_u32, be_u8};
use nom::IResult;
use thiserror::Error;

type NomError<'a> = nom::error::Error<&'a [u8]>;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("reading {wanted} byte(s) at offset {offset} overruns buffer of {len} bytes")]
pub struct OutOfBounds {
    pub offset: usize,
    pub wanted: usize,
    pub len: usize,
}

/// Big-endian cursor over a raw frame.
///
/// Every read advances the cursor by the width of the value it returns. A
/// read that would run past the end leaves the cursor untouched and returns
/// `OutOfBounds`.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// A reader positioned at `offset`, for peeking at fixed header fields.
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            pos: offset.min(data.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn parse<T, P>(&mut self, wanted: usize, mut parser: P) -> Result<T, OutOfBounds>
    where
        P: FnMut(&'a [u8]) -> IResult<&'a [u8], T, NomError<'a>>,
    {
        let input = &self.data[self.pos..];
        match parser(input) {
            Ok((rest, value)) => {
                self.pos += input.len() - rest.len();
                Ok(value)
            }
            Err(_) => Err(OutOfBounds {
                offset: self.pos,
                wanted,
                len: self.data.len(),
            }),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, OutOfBounds> {
        self.parse(1, be_u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, OutOfBounds> {
        self.parse(2, be_u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, OutOfBounds> {
        self.parse(4, be_u32)
    }

    pub fn read_i16(&mut self) -> Result<i16, OutOfBounds> {
        self.parse(2, be_i16)
    }

    /// One byte, any non-zero value is `true`.
    pub fn read_bool(&mut self) -> Result<bool, OutOfBounds> {
        Ok(self.read_u8()? > 0)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], OutOfBounds> {
        self.parse(len, nom::bytes::complete::take(len))
    }

    /// Fixed-width text field. With `replace_zeroes` set, NUL padding is
    /// rendered as spaces instead of being kept verbatim.
    pub fn read_string(&mut self, len: usize, replace_zeroes: bool) -> Result<String, OutOfBounds> {
        let bytes = self.read_bytes(len)?;
        if !replace_zeroes {
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }

        let copy: Vec<u8> = bytes
            .iter()
            .map(|&b| if b == 0 { b' ' } else { b })
            .collect();
        Ok(String::from_utf8_lossy(&copy).into_owned())
    }

    pub fn skip(&mut self, len: usize) -> Result<(), OutOfBounds> {
        self.read_bytes(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_and_advances() {
        let data = [0x01, 0x0c, 0xfb, 0x00, 0x00, 0x01, 0x00, 0xff, 0x9c];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_u8(), Ok(0x01));
        assert_eq!(reader.read_u16(), Ok(0x0cfb));
        assert_eq!(reader.read_u32(), Ok(0x0000_0100));
        assert_eq!(reader.read_i16(), Ok(-100));
        assert!(reader.is_empty());
    }

    #[test]
    fn overrun_leaves_cursor_in_place() {
        let data = [0x12, 0x34, 0x56];
        let mut reader = ByteReader::new(&data);
        reader.read_u8().unwrap();

        let err = reader.read_u32().unwrap_err();
        assert_eq!(
            err,
            OutOfBounds {
                offset: 1,
                wanted: 4,
                len: 3
            }
        );
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.read_u16(), Ok(0x3456));
    }

    #[test]
    fn strings_with_and_without_padding() {
        let data = b"JK\0\0BMS";
        let mut reader = ByteReader::new(data);
        assert_eq!(reader.read_string(4, true).unwrap(), "JK  ");

        let mut reader = ByteReader::new(data);
        assert_eq!(reader.read_string(4, false).unwrap(), "JK\0\0");
        assert_eq!(reader.read_string(3, false).unwrap(), "BMS");
        assert!(reader.read_string(1, false).is_err());
    }

    #[test]
    fn reader_at_offset() {
        let data = [0x4e, 0x57, 0x00, 0x12];
        assert_eq!(ByteReader::at(&data, 2).read_u16(), Ok(0x0012));
        assert!(ByteReader::at(&data, 10).read_u8().is_err());
    }

    #[test]
    fn bools_are_any_non_zero() {
        let data = [0x00, 0x01, 0x02];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_bool(), Ok(false));
        assert_eq!(reader.read_bool(), Ok(true));
        assert_eq!(reader.read_bool(), Ok(true));
    }
}
