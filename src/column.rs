//! Column schema and the owned value representation used while a text block
//! is buffered for width computation.

use crate::primitive::{FieldSlot, PrimitiveTag};

/// How a column's type is declared.
///
/// `Fixed` columns share one type (or user type) across every row; `Dynamic`
/// columns carry their own type tag on each row, written as `Name:?` in the
/// types line and re-parsed per row on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Fixed { tags: Vec<PrimitiveTag>, user_type: Option<String> },
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSchema {
    pub fn fixed(name: impl Into<String>, tags: Vec<PrimitiveTag>) -> Self {
        ColumnSchema { name: name.into(), kind: ColumnKind::Fixed { tags, user_type: None } }
    }

    pub fn fixed_user_type(name: impl Into<String>, user_type: impl Into<String>, tags: Vec<PrimitiveTag>) -> Self {
        ColumnSchema {
            name: name.into(),
            kind: ColumnKind::Fixed { tags, user_type: Some(user_type.into()) },
        }
    }

    pub fn dynamic(name: impl Into<String>) -> Self {
        ColumnSchema { name: name.into(), kind: ColumnKind::Dynamic }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, ColumnKind::Dynamic)
    }

    /// Number of primitive sub-columns this column expands to (e.g. a
    /// 3-float vector type occupies 3 value slots under one header name).
    /// Dynamic columns are always a single slot; their width is
    /// recomputed per row since the type can change.
    pub fn width_in_slots(&self) -> usize {
        match &self.kind {
            ColumnKind::Fixed { tags, .. } => tags.len().max(1),
            ColumnKind::Dynamic => 1,
        }
    }
}

/// An owned snapshot of a field's value, used to buffer a block of rows in
/// memory while the text writer measures column widths before emitting
/// anything.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    WStr(Vec<u16>),
}

impl FieldValue {
    pub fn tag(&self) -> PrimitiveTag {
        use FieldValue::*;
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

impl From<&FieldSlot<'_>> for FieldValue {
    fn from(slot: &FieldSlot<'_>) -> Self {
        match slot {
            FieldSlot::Bool(v) => FieldValue::Bool(**v),
            FieldSlot::I8(v) => FieldValue::I8(**v),
            FieldSlot::I16(v) => FieldValue::I16(**v),
            FieldSlot::I32(v) => FieldValue::I32(**v),
            FieldSlot::I64(v) => FieldValue::I64(**v),
            FieldSlot::U8(v) => FieldValue::U8(**v),
            FieldSlot::U16(v) => FieldValue::U16(**v),
            FieldSlot::U32(v) => FieldValue::U32(**v),
            FieldSlot::U64(v) => FieldValue::U64(**v),
            FieldSlot::F32(v) => FieldValue::F32(**v),
            FieldSlot::F64(v) => FieldValue::F64(**v),
            FieldSlot::Str(v) => FieldValue::Str((*v).clone()),
            FieldSlot::WStr(v) => FieldValue::WStr((*v).clone()),
        }
    }
}

/// Writes a decoded `FieldValue` back into the caller's `FieldSlot`,
/// used on the read path once a row has been parsed or decoded.
pub fn assign_into_slot(slot: &mut FieldSlot<'_>, value: FieldValue) {
    match (slot, value) {
        (FieldSlot::Bool(dst), FieldValue::Bool(v)) => **dst = v,
        (FieldSlot::I8(dst), FieldValue::I8(v)) => **dst = v,
        (FieldSlot::I16(dst), FieldValue::I16(v)) => **dst = v,
        (FieldSlot::I32(dst), FieldValue::I32(v)) => **dst = v,
        (FieldSlot::I64(dst), FieldValue::I64(v)) => **dst = v,
        (FieldSlot::U8(dst), FieldValue::U8(v)) => **dst = v,
        (FieldSlot::U16(dst), FieldValue::U16(v)) => **dst = v,
        (FieldSlot::U32(dst), FieldValue::U32(v)) => **dst = v,
        (FieldSlot::U64(dst), FieldValue::U64(v)) => **dst = v,
        (FieldSlot::F32(dst), FieldValue::F32(v)) => **dst = v,
        (FieldSlot::F64(dst), FieldValue::F64(v)) => **dst = v,
        (FieldSlot::Str(dst), FieldValue::Str(v)) => **dst = v,
        (FieldSlot::WStr(dst), FieldValue::WStr(v)) => **dst = v,
        _ => unreachable!("tag mismatch should be rejected before assignment"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_column_slot_count() {
        let col = ColumnSchema::fixed("pos", vec![PrimitiveTag::Float32; 3]);
        assert_eq!(col.width_in_slots(), 3);
    }

    #[test]
    fn dynamic_column_is_single_slot() {
        let col = ColumnSchema::dynamic("value");
        assert!(col.is_dynamic());
        assert_eq!(col.width_in_slots(), 1);
    }

    #[test]
    fn slot_to_value_roundtrip() {
        let mut x = 42i32;
        let slot = FieldSlot::I32(&mut x);
        let value = FieldValue::from(&slot);
        assert_eq!(value, FieldValue::I32(42));
    }
}
