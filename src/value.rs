//! Runtime values produced by decoding (codec representation).

/// A single decoded value (field, variable-length value or compound).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    /// Fixed-width byte/character string, or a trailer-stripped blob.
    Bytes(Vec<u8>),
    /// Dual length-prefixed strings, trailing NULs stripped.
    Pair(String, String),
    Struct(Fields),
    List(Vec<Value>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(x) => Some(*x as u64),
            Value::U16(x) => Some(*x as u64),
            Value::U32(x) => Some(*x as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(x) => Some(*x as i64),
            Value::I16(x) => Some(*x as i64),
            Value::I32(x) => Some(*x as i64),
            Value::U8(x) => Some(*x as i64),
            Value::U16(x) => Some(*x as i64),
            Value::U32(x) => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<(&str, &str)> {
        match self {
            Value::Pair(a, b) => Some((a, b)),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Fields> {
        match self {
            Value::Struct(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

/// A decoded structure instance: field name to value, in on-wire order.
///
/// Insertion order is significant and preserved; lookups are linear, which
/// is fine for the handful of members a record carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(&'static str, Value)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Fields { entries: Vec::with_capacity(n) }
    }

    /// Append a member. Names are unique within a schema, so a repeated
    /// name replaces the earlier value in place.
    pub fn insert(&mut self, name: &'static str, v: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = v,
            None => self.entries.push((name, v)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| *k == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Unsigned member lookup.
    pub fn u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    /// Nested structure lookup.
    pub fn sub(&self, name: &str) -> Option<&Fields> {
        self.get(name).and_then(Value::as_struct)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_insertion_order() {
        let mut f = Fields::new();
        f.insert("len", Value::U16(40));
        f.insert("type", Value::U16(4));
        f.insert("recnum", Value::U32(7));
        assert_eq!(f.names(), vec!["len", "type", "recnum"]);
        f.insert("type", Value::U16(5));
        assert_eq!(f.names(), vec!["len", "type", "recnum"]);
        assert_eq!(f.u64("type"), Some(5));
    }

    #[test]
    fn signed_values_widen() {
        assert_eq!(Value::I16(-3).as_i64(), Some(-3));
        assert_eq!(Value::I16(-3).as_u64(), None);
        assert_eq!(Value::U32(9).as_i64(), Some(9));
    }
}
