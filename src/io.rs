use std::{
    convert::TryInto,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    mem::size_of,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use bit_vec::BitVec;

use crate::{error::DbError, types::DbResult};

pub trait Encode {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decode: Sized {
    fn decode<R: Read>(reader: &mut R) -> Self;
}

pub fn read_into<T: Decode, R: Read>(reader: &mut R) -> T {
    T::decode(reader)
}

pub fn read_exact<R: Read>(reader: &mut R, bytes_count: usize) -> Vec<u8> {
    let mut buf = vec![0u8; bytes_count];
    reader
        .read_exact(&mut buf)
        .unwrap_or_else(|e| panic!("io error, expect {} bytes: {}", bytes_count, e));
    buf
}

macro_rules! impl_le_codec {
    (for $($t:ty),+) => {
        $(
            impl Encode for $t {
                fn encode(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }

            impl Decode for $t {
                fn decode<R: Read>(reader: &mut R) -> Self {
                    let bytes = read_exact(reader, size_of::<Self>());
                    Self::from_le_bytes(bytes.try_into().unwrap())
                }
            }
        )*
    }
}

impl_le_codec!(for u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// # Format
///
/// - 2 bytes: payload size in bytes
/// - n bytes: bit vector payload
impl Encode for BitVec {
    fn encode(&self) -> Vec<u8> {
        let payload = self.to_bytes();

        let mut buf = Vec::new();
        buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        buf.extend_from_slice(&payload);
        buf
    }
}

impl Decode for BitVec {
    fn decode<R: Read>(reader: &mut R) -> Self {
        let size = u16::from_le_bytes(read_exact(reader, 2).try_into().unwrap());
        let buf = read_exact(reader, size as usize);
        BitVec::from_bytes(&buf)
    }
}

/// # Format
///
/// - 4 bytes: payload size in bytes
/// - n bytes: payload
///
/// Used for page images in the log, hence the wide length prefix.
impl Encode for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.len() as u32).to_le_bytes());
        buf.extend_from_slice(self);
        buf
    }
}

impl Decode for Vec<u8> {
    fn decode<R: Read>(reader: &mut R) -> Self {
        let size = u32::from_le_bytes(read_exact(reader, 4).try_into().unwrap());
        read_exact(reader, size as usize)
    }
}

/// Slot bitmaps are LSB-first on the wire: slot 0 is bit 0 of byte 0.
/// `BitVec`'s own byte conversion is MSB-first, so the page codecs go
/// through these two helpers instead.
pub fn bitmap_from_bytes(bytes: &[u8], bit_count: usize) -> BitVec {
    let mut bv = BitVec::from_elem(bit_count, false);
    for i in 0..bit_count {
        if bytes[i / 8] >> (i % 8) & 1 == 1 {
            bv.set(i, true);
        }
    }
    bv
}

pub fn bitmap_to_bytes(bv: &BitVec) -> Vec<u8> {
    let mut bytes = vec![0u8; (bv.len() + 7) / 8];
    for i in 0..bv.len() {
        if bv[i] {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Accumulates encoded values, then pads the result to a fixed size.
/// Page serializers build their images with this.
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encode>(&mut self, obj: &T) {
        self.buf.extend_from_slice(&obj.encode());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }

    pub fn to_padded_bytes(&self, size: usize) -> Vec<u8> {
        if self.buf.len() > size {
            panic!(
                "page image overflows the page: {} > {}",
                self.buf.len(),
                size
            );
        }

        let mut buf = self.buf.clone();
        buf.resize(size, 0);
        buf
    }
}

/// A file behind a `Mutex`, with typed read/write on top of the
/// `Encode`/`Decode` traits. Backs the log file and both table formats.
pub struct SharedFile {
    file: Mutex<File>,
}

impl SharedFile {
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self, DbError> {
        let f = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .open(file_path)
            .map_err(|e| DbError::io(&e.to_string()))?;

        Ok(Self {
            file: Mutex::new(f),
        })
    }

    pub fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    pub fn write<T: Encode>(&self, obj: &T) -> DbResult {
        self.get_file()
            .write_all(&obj.encode())
            .map_err(|e| DbError::io(&e.to_string()))
    }

    pub fn read<T: Decode>(&self) -> Result<T, DbError> {
        let mut file = self.get_file();
        Ok(T::decode(&mut *file))
    }

    pub fn get_size(&self) -> Result<u64, DbError> {
        let metadata = self
            .get_file()
            .metadata()
            .map_err(|e| DbError::io(&e.to_string()))?;
        Ok(metadata.len())
    }

    pub fn get_current_position(&self) -> Result<u64, DbError> {
        self.get_file()
            .stream_position()
            .map_err(|e| DbError::io(&e.to_string()))
    }

    pub fn seek(&self, pos: SeekFrom) -> Result<u64, DbError> {
        self.get_file()
            .seek(pos)
            .map_err(|e| DbError::io(&e.to_string()))
    }

    pub fn set_len(&self, len: u64) -> DbResult {
        self.get_file()
            .set_len(len)
            .map_err(|e| DbError::io(&e.to_string()))
    }

    pub fn flush(&self) -> DbResult {
        self.get_file()
            .flush()
            .map_err(|e| DbError::io(&e.to_string()))
    }
}

impl Read for SharedFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.get_file().read(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_primitive_round_trip() {
        let v: u64 = 0xdead_beef;
        let mut reader = Cursor::new(v.encode());
        assert_eq!(u64::decode(&mut reader), v);
    }

    #[test]
    fn test_bitvec_round_trip() {
        let mut bv = BitVec::from_elem(40, false);
        bv.set(3, true);
        bv.set(39, true);

        let mut reader = Cursor::new(bv.encode());
        let decoded = BitVec::decode(&mut reader);
        assert!(decoded[3]);
        assert!(decoded[39]);
        assert!(!decoded[4]);
    }

    #[test]
    fn test_writer_padding() {
        let mut writer = ByteWriter::new();
        writer.write(&42u32);
        let buf = writer.to_padded_bytes(16);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf[0], 42);
    }
}
