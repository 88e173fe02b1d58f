//! Immutable schema description for binary structures.
//!
//! A [`Schema`] is an ordered list of named [`Member`]s. Each member is a fixed-width
//! scalar ([`Atom`]), a data-dependent [`Variable`] value, or a nested schema. Schemas
//! hold no per-decode state: they are `static` blueprints shared by every decode call,
//! and decoding produces a fresh [`Fields`](crate::value::Fields) instance each time.
//!
//! Schemas are declared as `static` tables with the const constructors below:
//!
//! ```text
//! pub static RTCTIME: Schema = Schema {
//!     name: "rtctime",
//!     members: &[le("sub_sec", Scalar::U16, "{}"), le("sec", Scalar::U8, "{}"), ...],
//! };
//! ```

/// Byte order of a multi-byte field. Always explicit per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Fixed-width scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    /// Fixed-length byte/character string.
    Bytes(usize),
}

impl Scalar {
    pub const fn width(&self) -> usize {
        match self {
            Scalar::U8 | Scalar::I8 => 1,
            Scalar::U16 | Scalar::I16 => 2,
            Scalar::U32 | Scalar::I32 => 4,
            Scalar::Bytes(n) => *n,
        }
    }
}

/// Display-time value transform. Never alters the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Hexlify,
}

/// Display template plus optional transform (see [`dump::render`](crate::dump::render)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub template: &'static str,
    pub transform: Option<Transform>,
}

impl Format {
    pub const fn plain(template: &'static str) -> Self {
        Format { template, transform: None }
    }
}

/// A fixed-width scalar field: width, byte order and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atom {
    pub scalar: Scalar,
    pub order: Endianness,
    pub format: Format,
}

/// Fields whose consumed length comes from the data itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    /// `len0 len1 str0 str1`; consumes `len0 + len1 + 2`.
    DualString,
    /// Everything up to a fixed-size trailer; consumes the whole input.
    TrailerStripped(usize),
}

#[derive(Debug, Clone, Copy)]
pub enum MemberKind {
    Atom(Atom),
    Var(Variable, Format),
    Nested(&'static Schema),
}

#[derive(Debug, Clone, Copy)]
pub struct Member {
    pub name: &'static str,
    pub kind: MemberKind,
}

/// Ordered, named composition of members. Order is on-wire order.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub members: &'static [Member],
}

impl Schema {
    /// Static size when every member is fixed-width; `None` when a variable
    /// member (anywhere in the tree) makes the size data-dependent.
    pub fn fixed_size(&self) -> Option<usize> {
        self.members.iter().try_fold(0usize, |acc, m| {
            let n = match &m.kind {
                MemberKind::Atom(a) => Some(a.scalar.width()),
                MemberKind::Var(..) => None,
                MemberKind::Nested(s) => s.fixed_size(),
            }?;
            Some(acc + n)
        })
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Little-endian scalar member.
pub const fn le(name: &'static str, scalar: Scalar, template: &'static str) -> Member {
    Member {
        name,
        kind: MemberKind::Atom(Atom { scalar, order: Endianness::Little, format: Format::plain(template) }),
    }
}

/// Big-endian scalar member.
pub const fn be(name: &'static str, scalar: Scalar, template: &'static str) -> Member {
    Member {
        name,
        kind: MemberKind::Atom(Atom { scalar, order: Endianness::Big, format: Format::plain(template) }),
    }
}

/// Byte string displayed hex-encoded.
pub const fn hexbytes(name: &'static str, len: usize) -> Member {
    Member {
        name,
        kind: MemberKind::Atom(Atom {
            scalar: Scalar::Bytes(len),
            order: Endianness::Little,
            format: Format { template: "{}", transform: Some(Transform::Hexlify) },
        }),
    }
}

pub const fn var(name: &'static str, v: Variable, template: &'static str) -> Member {
    Member { name, kind: MemberKind::Var(v, Format::plain(template)) }
}

pub const fn nested(name: &'static str, schema: &'static Schema) -> Member {
    Member { name, kind: MemberKind::Nested(schema) }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INNER: Schema = Schema {
        name: "inner",
        members: &[le("a", Scalar::U16, "{}"), be("b", Scalar::I32, "{}")],
    };

    static OUTER: Schema = Schema {
        name: "outer",
        members: &[le("x", Scalar::U8, "{}"), nested("inner", &INNER), hexbytes("raw", 3)],
    };

    static WITH_VAR: Schema = Schema {
        name: "with_var",
        members: &[nested("outer", &OUTER), var("s", Variable::DualString, "{} {}")],
    };

    #[test]
    fn fixed_size_sums_nested_members() {
        assert_eq!(INNER.fixed_size(), Some(6));
        assert_eq!(OUTER.fixed_size(), Some(10));
    }

    #[test]
    fn variable_member_has_no_static_size() {
        assert_eq!(WITH_VAR.fixed_size(), None);
    }

    #[test]
    fn member_lookup() {
        assert!(OUTER.member("inner").is_some());
        assert!(OUTER.member("nope").is_none());
    }
}
