//! The [`Serializable`] trait and its implementations for wire primitives.
//!
//! All integers are little-endian. Byte strings are length-prefixed with a
//! `u32` and zero-padded to a 4-byte boundary. Optional values carry an
//! explicit one-byte presence flag; the protocol never uses sentinel values
//! to mean "absent" (a zero coordinate is a real coordinate).

/// Serialize `self` into compass wire format.
pub trait Serializable {
    /// Appends the serialized form of `self` to `buf`.
    fn serialize(&self, buf: &mut impl Extend<u8>);

    /// Convenience: allocate a fresh `Vec<u8>` and serialize into it.
    fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.serialize(&mut v);
        v
    }
}

// ─── bool ────────────────────────────────────────────────────────────────────

/// `true` → `0x01`, `false` → `0x00`. Any other byte is a decode error.
impl Serializable for bool {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend([if *self { 1u8 } else { 0u8 }]);
    }
}

// ─── integers / floats ───────────────────────────────────────────────────────

impl Serializable for i32 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for u32 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for i64 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for u64 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for f64 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

// ─── bytes / strings ─────────────────────────────────────────────────────────

/// Byte-string encoding: `[len as u32 LE][data][0-padding to 4-byte boundary]`.
impl Serializable for &[u8] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let len = self.len();
        (len as u32).serialize(buf);
        buf.extend(self.iter().copied());
        let padding = (4 - (len % 4)) % 4;
        buf.extend(std::iter::repeat(0u8).take(padding));
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_slice().serialize(buf);
    }
}

impl Serializable for &str {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

impl Serializable for String {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

// ─── vectors ─────────────────────────────────────────────────────────────────

/// Count-prefixed list: `[count as u32 LE][item…]`.
impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (self.len() as u32).serialize(buf);
        for item in self {
            item.serialize(buf);
        }
    }
}

// ─── Option ──────────────────────────────────────────────────────────────────

/// Explicit presence flag: `0x00` for absent, `0x01` followed by the value.
impl<T: Serializable> Serializable for Option<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Some(v) => {
                buf.extend([1u8]);
                v.serialize(buf);
            }
            None => buf.extend([0u8]),
        }
    }
}
