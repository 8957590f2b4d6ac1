//! The primitive type alphabet and the field argument slots `Field()` dispatches on.

use std::convert::TryFrom;
use std::fmt;

/// One of the 12 wire-format type tags (single ASCII character).
///
/// `Int8` doubles as the wire representation for `bool` -- the distinction
/// only matters on the Rust side, where `FieldSlot::Bool` and
/// `FieldSlot::I8` are different argument types that both serialize to the
/// `c` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTag {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Str,
    WStr,
}

impl PrimitiveTag {
    pub fn as_char(self) -> char {
        use PrimitiveTag::*;
        match self {
            Int8 => 'c',
            Int16 => 'C',
            Int32 => 'd',
            Int64 => 'D',
            UInt8 => 'h',
            UInt16 => 'H',
            UInt32 => 'g',
            UInt64 => 'G',
            Float32 => 'f',
            Float64 => 'F',
            Str => 's',
            WStr => 'S',
        }
    }

    /// Natural alignment/size in bytes for fixed-width tags; strings have no
    /// fixed size and are handled separately by the callers of this method.
    pub fn fixed_width(self) -> Option<usize> {
        use PrimitiveTag::*;
        match self {
            Int8 | UInt8 => Some(1),
            Int16 | UInt16 => Some(2),
            Int32 | UInt32 | Float32 => Some(4),
            Int64 | UInt64 | Float64 => Some(8),
            Str | WStr => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveTag::Float32 | PrimitiveTag::Float64)
    }

    pub fn is_string(self) -> bool {
        matches!(self, PrimitiveTag::Str | PrimitiveTag::WStr)
    }
}

impl TryFrom<char> for PrimitiveTag {
    type Error = ();

    fn try_from(c: char) -> Result<Self, ()> {
        use PrimitiveTag::*;
        Ok(match c {
            'c' => Int8,
            'C' => Int16,
            'd' => Int32,
            'D' => Int64,
            'h' => UInt8,
            'H' => UInt16,
            'g' => UInt32,
            'G' => UInt64,
            'f' => Float32,
            'F' => Float64,
            's' => Str,
            'S' => WStr,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for PrimitiveTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Parse a run of type-tag characters (e.g. `"fff"` or `"Ddc"`) into tags.
/// Returns `None` (a format error at the call site) on the first unrecognized
/// character.
pub fn parse_tags(s: &str) -> Option<Vec<PrimitiveTag>> {
    s.chars().map(PrimitiveTag::try_from).collect::<Result<Vec<_>, _>>().ok()
}

pub fn tags_to_string(tags: &[PrimitiveTag]) -> String {
    tags.iter().map(|t| t.as_char()).collect()
}

/// A single caller-side argument to `Field()`. In write mode the engine reads
/// the value already stored in the referenced variable; in read mode it
/// writes the decoded value into it. This is the bidirectional analogue of
/// the 13 primitive-pointer variants of the original `arglist::types`.
pub enum FieldSlot<'a> {
    Bool(&'a mut bool),
    I8(&'a mut i8),
    I16(&'a mut i16),
    I32(&'a mut i32),
    I64(&'a mut i64),
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    F32(&'a mut f32),
    F64(&'a mut f64),
    Str(&'a mut String),
    WStr(&'a mut Vec<u16>),
}

impl<'a> FieldSlot<'a> {
    /// The wire tag this argument serializes to/deserializes from.
    pub fn tag(&self) -> PrimitiveTag {
        use FieldSlot::*;
        match self {
            Bool(_) | I8(_) => PrimitiveTag::Int8,
            I16(_) => PrimitiveTag::Int16,
            I32(_) => PrimitiveTag::Int32,
            I64(_) => PrimitiveTag::Int64,
            U8(_) => PrimitiveTag::UInt8,
            U16(_) => PrimitiveTag::UInt16,
            U32(_) => PrimitiveTag::UInt32,
            U64(_) => PrimitiveTag::UInt64,
            F32(_) => PrimitiveTag::Float32,
            F64(_) => PrimitiveTag::Float64,
            Str(_) => PrimitiveTag::Str,
            WStr(_) => PrimitiveTag::WStr,
        }
    }
}

/// Converts a mutable reference to a supported primitive into a `FieldSlot`.
/// Implemented for all 13 argument types so that the `fields!` macro can
/// build a slot array uniformly.
pub trait IntoFieldSlot<'a> {
    fn into_field_slot(self) -> FieldSlot<'a>;
}

macro_rules! impl_into_field_slot {
    ($ty:ty, $variant:ident) => {
        impl<'a> IntoFieldSlot<'a> for &'a mut $ty {
            fn into_field_slot(self) -> FieldSlot<'a> {
                FieldSlot::$variant(self)
            }
        }
    };
}

impl_into_field_slot!(bool, Bool);
impl_into_field_slot!(i8, I8);
impl_into_field_slot!(i16, I16);
impl_into_field_slot!(i32, I32);
impl_into_field_slot!(i64, I64);
impl_into_field_slot!(u8, U8);
impl_into_field_slot!(u16, U16);
impl_into_field_slot!(u32, U32);
impl_into_field_slot!(u64, U64);
impl_into_field_slot!(f32, F32);
impl_into_field_slot!(f64, F64);
impl_into_field_slot!(String, Str);
impl_into_field_slot!(Vec<u16>, WStr);

/// Builds a `Vec<FieldSlot>` from a list of mutable variable references,
/// e.g. `fields!(&mut x, &mut y, &mut z)`. This stands in for the variadic
/// template argument pack of the original `Field()` call.
#[macro_export]
macro_rules! fields {
    ($($arg:expr),+ $(,)?) => {
        vec![ $( $crate::primitive::IntoFieldSlot::into_field_slot($arg) ),+ ]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let tags = parse_tags("fff").unwrap();
        assert_eq!(tags, vec![PrimitiveTag::Float32; 3]);
        assert_eq!(tags_to_string(&tags), "fff");
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(parse_tags("fxf").is_none());
    }

    #[test]
    fn bool_and_int8_share_wire_tag() {
        let mut b = true;
        let mut i = 5i8;
        let slot_b = FieldSlot::Bool(&mut b);
        let slot_i = FieldSlot::I8(&mut i);
        assert_eq!(slot_b.tag(), slot_i.tag());
    }
}
