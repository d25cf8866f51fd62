//! Binary codec: the byte-level reader and writer every message is built on.
//!
//! The format is deliberately dumb. There is no schema, no tagging, no
//! varints: each message writes its fields in a fixed order, and the
//! receiver reads them back in the same order. Both sides agree on the
//! order because they run the same code, and the handshake's type-identity
//! hash rejects peers that do not.
//!
//! All integers are little-endian. Strings are a `u16` byte count followed
//! by that many UTF-8 bytes. Counts that do not fit their prefix are
//! refused, never wrapped.

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A value that knows how to append itself to a [`ByteWriter`].
pub trait WireEncode {
    /// Appends this value's bytes to `w`.
    ///
    /// # Errors
    /// [`ProtocolError::Unencodable`] if a length or id does not fit its
    /// wire field. Nothing is ever written truncated.
    fn encode(&self, w: &mut ByteWriter) -> Result<(), ProtocolError>;

    /// Encodes this value into a fresh buffer.
    fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut w = ByteWriter::new();
        self.encode(&mut w)?;
        Ok(w.into_inner())
    }
}

/// A value that can be read back from a [`ByteReader`].
pub trait WireDecode: Sized {
    /// Reads one value, advancing the reader past it.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the bytes are truncated or invalid.
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError>;

    /// Decodes a value from the start of `data`.
    ///
    /// Trailing bytes are ignored.
    fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(data);
        Self::decode(&mut r)
    }
}

// ---------------------------------------------------------------------------
// ByteWriter
// ---------------------------------------------------------------------------

/// An append-only little-endian byte buffer.
///
/// ```rust
/// use warroom_protocol::ByteWriter;
///
/// let mut w = ByteWriter::new();
/// w.write_u8(6);
/// w.write_i32(-1);
/// assert_eq!(w.as_slice(), &[6, 0xFF, 0xFF, 0xFF, 0xFF]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer whose buffer starts with `header`.
    pub fn with_header(header: u8) -> Self {
        let mut w = Self::new();
        w.write_u8(header);
        w
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a `u16` element count.
    pub fn write_len(&mut self, len: usize) -> Result<(), ProtocolError> {
        let n = u16::try_from(len).map_err(|_| ProtocolError::Unencodable {
            field: "length",
            value: len,
            max: usize::from(u16::MAX),
        })?;
        self.write_u16(n);
        Ok(())
    }

    /// Writes a `u8` element count.
    pub fn write_short_len(&mut self, len: usize) -> Result<(), ProtocolError> {
        let n = u8::try_from(len).map_err(|_| ProtocolError::Unencodable {
            field: "length",
            value: len,
            max: usize::from(u8::MAX),
        })?;
        self.write_u8(n);
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// A string longer than `u16::MAX` bytes is an error and leaves the
    /// buffer untouched.
    pub fn write_string(&mut self, v: &str) -> Result<(), ProtocolError> {
        self.write_len(v.len())?;
        self.buf.extend_from_slice(v.as_bytes());
        Ok(())
    }

    /// Appends raw bytes with no length prefix.
    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

// ---------------------------------------------------------------------------
// ByteReader
// ---------------------------------------------------------------------------

/// A cursor over a borrowed byte slice.
///
/// Every `read_*` method either returns the value and advances, or returns
/// [`ProtocolError::UnexpectedEof`] and leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Everything after the cursor, without consuming it.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a byte as a boolean. Any non-zero value is `true`.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(n)
    }

    /// Consumes and returns everything after the cursor.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.rest();
        self.pos = self.data.len();
        rest
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
