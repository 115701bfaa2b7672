//! Field-walk serialization.
//!
//! Every persisted structure exposes one ordered walk over its owned fields;
//! a visitor decides what happens at each field. One walker serializes, one
//! deserializes, one sums sizes, and the structures stay decoupled from any
//! binary format. The wire layout is implied by the walk itself: each field
//! in declared order, little-endian natural width, vectors prefixed by a
//! 64-bit length. There is no version header; compatibility is structural.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// One polymorphic operation per field kind.
pub trait Visitor {
    fn visit_u64(&mut self, x: &mut u64) -> io::Result<()>;
    fn visit_u128(&mut self, x: &mut u128) -> io::Result<()>;
    fn visit_u64_vec(&mut self, xs: &mut Vec<u64>) -> io::Result<()>;
}

/// Walked by a [`Visitor`] in declared field order.
///
/// The walk is mutable so that a single protocol serves both serialization
/// and deserialization; saving never modifies the values it visits.
pub trait Visit {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()>;
}

/// Writes each visited field to the underlying writer.
pub struct SaveVisitor<W: Write> {
    writer: W,
}

impl<W: Write> SaveVisitor<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Visitor for SaveVisitor<W> {
    fn visit_u64(&mut self, x: &mut u64) -> io::Result<()> {
        self.writer.write_u64::<LittleEndian>(*x)
    }

    fn visit_u128(&mut self, x: &mut u128) -> io::Result<()> {
        self.writer.write_u128::<LittleEndian>(*x)
    }

    fn visit_u64_vec(&mut self, xs: &mut Vec<u64>) -> io::Result<()> {
        self.writer.write_u64::<LittleEndian>(xs.len() as u64)?;
        for &x in xs.iter() {
            self.writer.write_u64::<LittleEndian>(x)?;
        }
        Ok(())
    }
}

/// Replaces each visited field with bytes from the underlying reader.
pub struct LoadVisitor<R: Read> {
    reader: R,
}

impl<R: Read> LoadVisitor<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> Visitor for LoadVisitor<R> {
    fn visit_u64(&mut self, x: &mut u64) -> io::Result<()> {
        *x = self.reader.read_u64::<LittleEndian>()?;
        Ok(())
    }

    fn visit_u128(&mut self, x: &mut u128) -> io::Result<()> {
        *x = self.reader.read_u128::<LittleEndian>()?;
        Ok(())
    }

    fn visit_u64_vec(&mut self, xs: &mut Vec<u64>) -> io::Result<()> {
        let len = self.reader.read_u64::<LittleEndian>()? as usize;
        xs.clear();
        xs.reserve(len.min(1 << 20));
        for _ in 0..len {
            xs.push(self.reader.read_u64::<LittleEndian>()?);
        }
        Ok(())
    }
}

/// Counts the bytes a [`SaveVisitor`] would write.
#[derive(Debug, Default)]
pub struct SizeVisitor {
    bytes: u64,
}

impl SizeVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_bytes(&self) -> u64 {
        self.bytes
    }
}

impl Visitor for SizeVisitor {
    fn visit_u64(&mut self, _x: &mut u64) -> io::Result<()> {
        self.bytes += 8;
        Ok(())
    }

    fn visit_u128(&mut self, _x: &mut u128) -> io::Result<()> {
        self.bytes += 16;
        Ok(())
    }

    fn visit_u64_vec(&mut self, xs: &mut Vec<u64>) -> io::Result<()> {
        self.bytes += 8 + 8 * xs.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, PartialEq, Debug)]
    struct Sample {
        a: u64,
        m: u128,
        v: Vec<u64>,
    }

    impl Visit for Sample {
        fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
            visitor.visit_u64(&mut self.a)?;
            visitor.visit_u128(&mut self.m)?;
            visitor.visit_u64_vec(&mut self.v)
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let mut s = Sample {
            a: 0xDEAD_BEEF,
            m: u128::MAX - 5,
            v: vec![1, 2, 3, u64::MAX],
        };
        let mut save = SaveVisitor::new(Vec::new());
        s.visit(&mut save).unwrap();
        let bytes = save.into_inner();

        let mut size = SizeVisitor::new();
        s.visit(&mut size).unwrap();
        assert_eq!(size.num_bytes(), bytes.len() as u64);

        let mut loaded = Sample::default();
        let mut load = LoadVisitor::new(bytes.as_slice());
        loaded.visit(&mut load).unwrap();
        assert_eq!(loaded, s);
    }

    #[test]
    fn layout_is_little_endian_with_length_prefix() {
        let mut s = Sample {
            a: 1,
            m: 2,
            v: vec![3],
        };
        let mut save = SaveVisitor::new(Vec::new());
        s.visit(&mut save).unwrap();
        let bytes = save.into_inner();
        assert_eq!(bytes.len(), 8 + 16 + 8 + 8);
        assert_eq!(&bytes[0..8], &1u64.to_le_bytes());
        assert_eq!(&bytes[8..24], &2u128.to_le_bytes());
        assert_eq!(&bytes[24..32], &1u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &3u64.to_le_bytes());
    }
}
