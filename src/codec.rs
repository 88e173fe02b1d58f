//! Decode/encode binary structures from schema descriptions.
//!
//! Handles fixed-width scalars (explicit byte order per field), the two variable-length
//! shapes (dual strings, trailer-stripped blobs) and nested structures. A structure
//! decodes its members in declared order against the remaining buffer and reports the
//! summed consumed length. A member failure fails the whole structure; partial
//! instances are never returned.

use crate::schema::{Atom, Endianness, MemberKind, Scalar, Schema, Variable};
use crate::value::{Fields, Value};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("short buffer: wanted {wanted} bytes, got {got}")]
    ShortBuffer { wanted: usize, got: usize },
    #[error("{schema}.{field}: {source}")]
    Member {
        schema: &'static str,
        field: &'static str,
        #[source]
        source: Box<CodecError>,
    },
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

impl CodecError {
    /// True when the failure (at any nesting depth) is a short buffer.
    pub fn is_short_buffer(&self) -> bool {
        match self {
            CodecError::ShortBuffer { .. } => true,
            CodecError::Member { source, .. } => source.is_short_buffer(),
            _ => false,
        }
    }

    /// `(wanted, got)` of the innermost short buffer, if that is what failed.
    pub fn short_buffer(&self) -> Option<(usize, usize)> {
        match self {
            CodecError::ShortBuffer { wanted, got } => Some((*wanted, *got)),
            CodecError::Member { source, .. } => source.short_buffer(),
            _ => None,
        }
    }
}

fn need(buf: &[u8], wanted: usize) -> Result<(), CodecError> {
    if buf.len() < wanted {
        return Err(CodecError::ShortBuffer { wanted, got: buf.len() });
    }
    Ok(())
}

impl Atom {
    /// Decode one scalar. Consumes exactly the declared width.
    pub fn decode(&self, buf: &[u8]) -> Result<(Value, usize), CodecError> {
        let width = self.scalar.width();
        need(buf, width)?;
        let mut r = Cursor::new(buf);
        let v = match (self.scalar, self.order) {
            (Scalar::U8, _) => Value::U8(r.read_u8()?),
            (Scalar::I8, _) => Value::I8(r.read_i8()?),
            (Scalar::U16, Endianness::Big) => Value::U16(r.read_u16::<BigEndian>()?),
            (Scalar::U16, Endianness::Little) => Value::U16(r.read_u16::<LittleEndian>()?),
            (Scalar::I16, Endianness::Big) => Value::I16(r.read_i16::<BigEndian>()?),
            (Scalar::I16, Endianness::Little) => Value::I16(r.read_i16::<LittleEndian>()?),
            (Scalar::U32, Endianness::Big) => Value::U32(r.read_u32::<BigEndian>()?),
            (Scalar::U32, Endianness::Little) => Value::U32(r.read_u32::<LittleEndian>()?),
            (Scalar::I32, Endianness::Big) => Value::I32(r.read_i32::<BigEndian>()?),
            (Scalar::I32, Endianness::Little) => Value::I32(r.read_i32::<LittleEndian>()?),
            (Scalar::Bytes(n), _) => {
                let mut b = vec![0u8; n];
                r.read_exact(&mut b)?;
                Value::Bytes(b)
            }
        };
        Ok((v, width))
    }

    pub fn encode(&self, w: &mut Vec<u8>, v: &Value) -> Result<(), CodecError> {
        let mismatch = || CodecError::TypeMismatch(format!("{:?} for {:?}", v, self.scalar));
        match (self.scalar, self.order, v) {
            (Scalar::U8, _, Value::U8(x)) => w.write_u8(*x)?,
            (Scalar::I8, _, Value::I8(x)) => w.write_i8(*x)?,
            (Scalar::U16, Endianness::Big, Value::U16(x)) => w.write_u16::<BigEndian>(*x)?,
            (Scalar::U16, Endianness::Little, Value::U16(x)) => w.write_u16::<LittleEndian>(*x)?,
            (Scalar::I16, Endianness::Big, Value::I16(x)) => w.write_i16::<BigEndian>(*x)?,
            (Scalar::I16, Endianness::Little, Value::I16(x)) => w.write_i16::<LittleEndian>(*x)?,
            (Scalar::U32, Endianness::Big, Value::U32(x)) => w.write_u32::<BigEndian>(*x)?,
            (Scalar::U32, Endianness::Little, Value::U32(x)) => w.write_u32::<LittleEndian>(*x)?,
            (Scalar::I32, Endianness::Big, Value::I32(x)) => w.write_i32::<BigEndian>(*x)?,
            (Scalar::I32, Endianness::Little, Value::I32(x)) => w.write_i32::<LittleEndian>(*x)?,
            (Scalar::Bytes(n), _, Value::Bytes(b)) => {
                // Fixed strings are NUL padded (or cut) to their declared width.
                let mut out = b.clone();
                out.resize(n, 0);
                w.write_all(&out)?;
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }
}

fn strip_nul(b: &[u8]) -> String {
    let end = b.iter().rposition(|&c| c != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&b[..end]).into_owned()
}

impl Variable {
    /// Decode a variable-length value; consumed length comes from the data.
    pub fn decode(&self, buf: &[u8]) -> Result<(Value, usize), CodecError> {
        match *self {
            Variable::DualString => {
                need(buf, 2)?;
                let len0 = buf[0] as usize;
                let len1 = buf[1] as usize;
                let total = len0 + len1 + 2;
                need(buf, total)?;
                let s0 = strip_nul(&buf[2..2 + len0]);
                let s1 = strip_nul(&buf[2 + len0..total]);
                Ok((Value::Pair(s0, s1), total))
            }
            Variable::TrailerStripped(trailer) => {
                need(buf, trailer)?;
                let body = buf[..buf.len() - trailer].to_vec();
                Ok((Value::Bytes(body), buf.len()))
            }
        }
    }

    pub fn encode(&self, w: &mut Vec<u8>, v: &Value) -> Result<(), CodecError> {
        match (*self, v) {
            (Variable::DualString, Value::Pair(a, b)) => {
                if a.len() > u8::MAX as usize || b.len() > u8::MAX as usize {
                    return Err(CodecError::TypeMismatch("dual string longer than 255".to_string()));
                }
                w.write_u8(a.len() as u8)?;
                w.write_u8(b.len() as u8)?;
                w.write_all(a.as_bytes())?;
                w.write_all(b.as_bytes())?;
                Ok(())
            }
            (Variable::TrailerStripped(trailer), Value::Bytes(b)) => {
                // The trailer is not kept in the value; it is written as zeros.
                w.write_all(b)?;
                w.write_all(&vec![0u8; trailer])?;
                Ok(())
            }
            _ => Err(CodecError::TypeMismatch(format!("{:?} for {:?}", v, self))),
        }
    }
}

impl Schema {
    /// Decode every member in declared order; returns the instance and bytes consumed.
    pub fn decode(&self, buf: &[u8]) -> Result<(Fields, usize), CodecError> {
        let mut out = Fields::with_capacity(self.members.len());
        let mut offset = 0usize;
        for m in self.members {
            let rest = &buf[offset.min(buf.len())..];
            let (v, n) = match &m.kind {
                MemberKind::Atom(a) => a.decode(rest),
                MemberKind::Var(v, _) => v.decode(rest),
                MemberKind::Nested(s) => s.decode(rest).map(|(f, n)| (Value::Struct(f), n)),
            }
            .map_err(|e| CodecError::Member { schema: self.name, field: m.name, source: Box::new(e) })?;
            offset += n;
            out.insert(m.name, v);
        }
        Ok((out, offset))
    }

    /// Encode an instance back to bytes using this schema's layout.
    pub fn encode(&self, values: &Fields) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode_into(&mut out, values)?;
        Ok(out)
    }

    fn encode_into(&self, w: &mut Vec<u8>, values: &Fields) -> Result<(), CodecError> {
        for m in self.members {
            let v = values.get(m.name).ok_or(CodecError::MissingField(m.name))?;
            match &m.kind {
                MemberKind::Atom(a) => a.encode(w, v)?,
                MemberKind::Var(var, _) => var.encode(w, v)?,
                MemberKind::Nested(s) => {
                    let sub = v
                        .as_struct()
                        .ok_or_else(|| CodecError::TypeMismatch(format!("{} is not a struct", m.name)))?;
                    s.encode_into(w, sub)?;
                }
            }
        }
        Ok(())
    }
}
