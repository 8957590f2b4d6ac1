//! Binary encoding: the same records and user types as the text codec, laid
//! out as fixed-width, NUL-terminated-name binary structures instead of
//! aligned columns of ASCII.
//!
//! A 4-byte magic opens the file: `NOIL` for native byte order, `LION` for a
//! file written on the opposite-endian machine. The reader swaps multi-byte
//! values whenever it sees `LION`; the writer always emits `NOIL` for the
//! host's own byte order.

use std::convert::TryFrom;

use crate::byteio::ByteIo;
use crate::column::{ColumnKind, ColumnSchema, FieldValue};
use crate::endian;
use crate::error::{Error, Result};
use crate::primitive::PrimitiveTag;
use crate::record::{RecordCount, RecordSchema};
use crate::user_type::UserTypeRegistry;

const MAGIC_NATIVE: [u8; 4] = *b"NOIL";
const MAGIC_SWAPPED: [u8; 4] = *b"LION";

/// Writes the 4-byte magic; `swap` selects `LION` (declares the file was
/// written byte-swapped from native order) over the default `NOIL`.
pub fn write_magic(io: &mut ByteIo, swap: bool) -> Result<()> {
    io.write_all(if swap { &MAGIC_SWAPPED } else { &MAGIC_NATIVE })
}

/// Reads 4 bytes and classifies them: `Some(swap)` for a recognized magic,
/// `None` for anything else (including running off the end of a short
/// file) -- the caller falls back to text mode on `None` rather than
/// treating an unrecognized magic as an error, per the probe/fallback rule
/// for files not forced into one encoding by their extension.
pub fn probe_magic(io: &mut ByteIo) -> Result<Option<bool>> {
    let mut magic = [0u8; 4];
    match io.read_exact(&mut magic) {
        Ok(()) => {
            if magic == MAGIC_NATIVE {
                Ok(Some(false))
            } else if magic == MAGIC_SWAPPED {
                Ok(Some(true))
            } else {
                Ok(None)
            }
        }
        Err(_) => Ok(None),
    }
}

/// Reads the magic for a file whose extension forced binary mode, where an
/// unrecognized magic is a hard error rather than a fallback opportunity.
pub fn read_magic(io: &mut ByteIo) -> Result<bool> {
    probe_magic(io)?.ok_or_else(|| Error::failure("not a recognized binary stream (bad magic)"))
}

fn write_cstr(io: &mut ByteIo, s: &str) -> Result<()> {
    io.write_all(s.as_bytes())?;
    io.write_all(&[0u8])
}

fn read_cstr(io: &mut ByteIo) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "unterminated name".into() })?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).map_err(|_| Error::failure("name is not valid UTF-8"))
}

fn write_u32(io: &mut ByteIo, v: u32) -> Result<()> {
    io.write_all(&v.to_le_bytes())
}

fn read_u32(io: &mut ByteIo, swap: bool) -> Result<u32> {
    let mut buf = [0u8; 4];
    io.read_exact(&mut buf)?;
    let v = u32::from_le_bytes(buf);
    Ok(if swap { endian::swap_u32(v) } else { v })
}

pub fn write_user_types(io: &mut ByteIo, registry: &UserTypeRegistry) -> Result<()> {
    let types: Vec<_> = registry.iter().collect();
    write_u32(io, types.len() as u32)?;
    for t in types {
        write_cstr(io, &t.name)?;
        io.write_all(&[t.tags.len() as u8])?;
        for tag in &t.tags {
            io.write_all(&[tag.as_char() as u8])?;
        }
    }
    Ok(())
}

pub fn read_user_types(io: &mut ByteIo, swap: bool, registry: &mut UserTypeRegistry) -> Result<()> {
    let count = read_u32(io, swap)?;
    for _ in 0..count {
        let name = read_cstr(io)?;
        let tag_count = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "truncated user type".into() })?;
        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            let c = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "truncated user type tags".into() })?;
            tags.push(PrimitiveTag::try_from(c as char).map_err(|_| Error::failure("bad type tag byte"))?);
        }
        registry.register(&name, tags)?;
    }
    Ok(())
}

fn write_column_header(io: &mut ByteIo, col: &ColumnSchema, registry: &UserTypeRegistry) -> Result<()> {
    write_cstr(io, &col.name)?;
    match &col.kind {
        ColumnKind::Dynamic => io.write_all(&[2u8]),
        ColumnKind::Fixed { tags, user_type: Some(name) } => {
            let _ = tags;
            let index = registry
                .index_of(name)
                .ok_or_else(|| Error::failure(format!("user type '{}' was never registered on this stream", name)))?;
            let index: u8 = index
                .try_into()
                .map_err(|_| Error::failure("more than 255 user types registered on this stream"))?;
            io.write_all(&[1u8])?;
            io.write_all(&[index])
        }
        ColumnKind::Fixed { tags, user_type: None } => {
            io.write_all(&[0u8])?;
            io.write_all(&[tags.len() as u8])?;
            for tag in tags {
                io.write_all(&[tag.as_char() as u8])?;
            }
            Ok(())
        }
    }
}

fn read_column_header(io: &mut ByteIo, registry: &UserTypeRegistry) -> Result<ColumnSchema> {
    let name = read_cstr(io)?;
    let kind = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "truncated column header".into() })?;
    match kind {
        2 => Ok(ColumnSchema::dynamic(name)),
        1 => {
            let index = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "truncated column header".into() })?;
            let user_type = registry
                .by_index(index as usize)
                .ok_or_else(|| Error::failure(format!("user type registry index {} out of range", index)))?;
            Ok(ColumnSchema::fixed_user_type(name, user_type.name.clone(), user_type.tags.clone()))
        }
        0 => {
            let tag_count = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "truncated column tags".into() })?;
            let mut tags = Vec::with_capacity(tag_count as usize);
            for _ in 0..tag_count {
                let c = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "truncated column tags".into() })?;
                tags.push(PrimitiveTag::try_from(c as char).map_err(|_| Error::failure("bad type tag byte"))?);
            }
            Ok(ColumnSchema::fixed(name, tags))
        }
        _ => Err(Error::failure("unknown column header kind byte")),
    }
}

fn count_kind_byte(count: RecordCount) -> u8 {
    match count {
        RecordCount::Rows(_) => 0,
        RecordCount::Unknown => 1,
        RecordCount::Label => 2,
    }
}

pub fn write_record(
    io: &mut ByteIo,
    schema: &RecordSchema,
    count: RecordCount,
    rows: &[Vec<FieldValue>],
    swap: bool,
    registry: &UserTypeRegistry,
) -> Result<()> {
    write_cstr(io, &schema.name)?;
    io.write_all(&[count_kind_byte(count)])?;
    write_u32(io, rows.len() as u32)?;
    io.write_all(&[schema.columns.len() as u8])?;
    for col in &schema.columns {
        write_column_header(io, col, registry)?;
    }
    for row in rows {
        write_row_with_dynamic_tags(io, &schema.columns, row, swap)?;
    }
    Ok(())
}

/// Writes one scalar. `swap` mirrors the read side's swap flag: a
/// swapped-endian file stores the byte-swapped bit pattern of every
/// multi-byte value, so that reading it back with the same flag set
/// (recovered from the magic) swaps it a second time and reproduces the
/// original value.
fn write_value(io: &mut ByteIo, value: &FieldValue, swap: bool) -> Result<()> {
    match value {
        FieldValue::Bool(v) => io.write_all(&[*v as u8]),
        FieldValue::I8(v) => io.write_all(&v.to_le_bytes()),
        FieldValue::I16(v) => io.write_all(&(if swap { endian::swap_u16(*v as u16) } else { *v as u16 }).to_le_bytes()),
        FieldValue::I32(v) => io.write_all(&(if swap { endian::swap_u32(*v as u32) } else { *v as u32 }).to_le_bytes()),
        FieldValue::I64(v) => io.write_all(&(if swap { endian::swap_u64(*v as u64) } else { *v as u64 }).to_le_bytes()),
        FieldValue::U8(v) => io.write_all(&v.to_le_bytes()),
        FieldValue::U16(v) => io.write_all(&(if swap { endian::swap_u16(*v) } else { *v }).to_le_bytes()),
        FieldValue::U32(v) => io.write_all(&(if swap { endian::swap_u32(*v) } else { *v }).to_le_bytes()),
        FieldValue::U64(v) => io.write_all(&(if swap { endian::swap_u64(*v) } else { *v }).to_le_bytes()),
        FieldValue::F32(v) => {
            let v = if swap { endian::swap_f32(*v) } else { *v };
            io.write_all(&v.to_le_bytes())
        }
        FieldValue::F64(v) => {
            let v = if swap { endian::swap_f64(*v) } else { *v };
            io.write_all(&v.to_le_bytes())
        }
        FieldValue::Str(s) => {
            write_u32(io, s.len() as u32)?;
            io.write_all(s.as_bytes())
        }
        FieldValue::WStr(units) => {
            write_u32(io, units.len() as u32)?;
            for u in units {
                io.write_all(&(if swap { endian::swap_u16(*u) } else { *u }).to_le_bytes())?;
            }
            Ok(())
        }
    }
}

fn read_value(io: &mut ByteIo, tag: PrimitiveTag, swap: bool) -> Result<FieldValue> {
    Ok(match tag {
        PrimitiveTag::Int8 => FieldValue::I8(read_i8(io)?),
        PrimitiveTag::Int16 => FieldValue::I16(read_i16(io, swap)?),
        PrimitiveTag::Int32 => FieldValue::I32(read_i32(io, swap)?),
        PrimitiveTag::Int64 => FieldValue::I64(read_i64(io, swap)?),
        PrimitiveTag::UInt8 => FieldValue::U8(read_u8(io)?),
        PrimitiveTag::UInt16 => FieldValue::U16(read_u16(io, swap)?),
        PrimitiveTag::UInt32 => FieldValue::U32(read_u32(io, swap)?),
        PrimitiveTag::UInt64 => FieldValue::U64(read_u64(io, swap)?),
        PrimitiveTag::Float32 => {
            let bits = read_u32(io, false)?;
            let v = f32::from_bits(bits);
            FieldValue::F32(if swap { endian::swap_f32(v) } else { v })
        }
        PrimitiveTag::Float64 => {
            let bits = read_u64(io, false)?;
            let v = f64::from_bits(bits);
            FieldValue::F64(if swap { endian::swap_f64(v) } else { v })
        }
        PrimitiveTag::Str => {
            let len = read_u32(io, swap)? as usize;
            let mut buf = vec![0u8; len];
            io.read_exact(&mut buf)?;
            FieldValue::Str(String::from_utf8(buf).map_err(|_| Error::failure("string is not valid UTF-8"))?)
        }
        PrimitiveTag::WStr => {
            let len = read_u32(io, swap)? as usize;
            let mut units = Vec::with_capacity(len);
            for _ in 0..len {
                units.push(read_u16(io, swap)?);
            }
            FieldValue::WStr(units)
        }
    })
}

fn read_u8(io: &mut ByteIo) -> Result<u8> {
    let mut buf = [0u8; 1];
    io.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i8(io: &mut ByteIo) -> Result<i8> {
    Ok(read_u8(io)? as i8)
}

fn read_u16(io: &mut ByteIo, swap: bool) -> Result<u16> {
    let mut buf = [0u8; 2];
    io.read_exact(&mut buf)?;
    let v = u16::from_le_bytes(buf);
    Ok(if swap { endian::swap_u16(v) } else { v })
}

fn read_i16(io: &mut ByteIo, swap: bool) -> Result<i16> {
    Ok(read_u16(io, swap)? as i16)
}

fn read_i32(io: &mut ByteIo, swap: bool) -> Result<i32> {
    Ok(read_u32(io, swap)? as i32)
}

fn read_u64(io: &mut ByteIo, swap: bool) -> Result<u64> {
    let mut buf = [0u8; 8];
    io.read_exact(&mut buf)?;
    let v = u64::from_le_bytes(buf);
    Ok(if swap { endian::swap_u64(v) } else { v })
}

fn read_i64(io: &mut ByteIo, swap: bool) -> Result<i64> {
    Ok(read_u64(io, swap)? as i64)
}

pub struct DecodedRecord {
    pub schema: RecordSchema,
    pub count: RecordCount,
    pub rows: Vec<Vec<FieldValue>>,
}

pub fn read_record(io: &mut ByteIo, swap: bool, registry: &UserTypeRegistry) -> Result<DecodedRecord> {
    let name = read_cstr(io)?;
    let count_kind = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "truncated record header".into() })?;
    let row_count = read_u32(io, swap)? as usize;
    let column_count = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "truncated record header".into() })?;

    let mut columns = Vec::with_capacity(column_count as usize);
    for _ in 0..column_count {
        columns.push(read_column_header(io, registry)?);
    }

    let mut rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let mut row = Vec::with_capacity(columns.len());
        for col in &columns {
            match &col.kind {
                ColumnKind::Dynamic => {
                    let tag_byte = io.read_byte()?.ok_or_else(|| Error::UnexpectedEof { message: "truncated dynamic tag".into() })?;
                    let tag = PrimitiveTag::try_from(tag_byte as char).map_err(|_| Error::failure("bad dynamic type tag byte"))?;
                    row.push(read_value(io, tag, swap)?);
                }
                ColumnKind::Fixed { tags, .. } => {
                    for tag in tags {
                        row.push(read_value(io, *tag, swap)?);
                    }
                }
            }
        }
        rows.push(row);
    }

    let count = match count_kind {
        0 => RecordCount::Rows(row_count),
        1 => RecordCount::Unknown,
        2 => RecordCount::Label,
        _ => return Err(Error::failure("unknown record count-kind byte")),
    };

    Ok(DecodedRecord { schema: RecordSchema::new(name, columns), count, rows })
}

// Dynamic columns write their per-row type tag ahead of the value; keep the
// writer in sync with `read_record`'s expectation.
//
// `row` is flattened across every column's tags (a column declaring N tags
// contributes N consecutive entries), so a fixed column with more than one
// tag must consume more than one `row` entry per iteration -- indexing by
// column position alone would walk `row` too slowly and read every later
// column's values under the wrong column.
pub fn write_row_with_dynamic_tags(io: &mut ByteIo, columns: &[ColumnSchema], row: &[FieldValue], swap: bool) -> Result<()> {
    let mut idx = 0;
    for col in columns {
        match &col.kind {
            ColumnKind::Dynamic => {
                let value = &row[idx];
                io.write_all(&[value.tag().as_char() as u8])?;
                write_value(io, value, swap)?;
                idx += 1;
            }
            ColumnKind::Fixed { tags, .. } => {
                for _ in tags {
                    write_value(io, &row[idx], swap)?;
                    idx += 1;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnSchema;

    fn roundtrip(schema: &RecordSchema, count: RecordCount, rows: Vec<Vec<FieldValue>>) -> DecodedRecord {
        roundtrip_with_swap(schema, count, rows, false)
    }

    fn roundtrip_with_swap(schema: &RecordSchema, count: RecordCount, rows: Vec<Vec<FieldValue>>, swap: bool) -> DecodedRecord {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.bin");
        {
            let mut io = ByteIo::create_write(&path).unwrap();
            write_magic(&mut io, swap).unwrap();
            let registry = UserTypeRegistry::new();
            write_user_types(&mut io, &registry).unwrap();
            write_record(&mut io, schema, count, &rows, swap, &registry).unwrap();
            io.close().unwrap();
        }
        let mut io = ByteIo::open_read(&path).unwrap();
        let detected_swap = read_magic(&mut io).unwrap();
        assert_eq!(detected_swap, swap);
        let mut registry = UserTypeRegistry::new();
        read_user_types(&mut io, detected_swap, &mut registry).unwrap();
        read_record(&mut io, detected_swap, &registry).unwrap()
    }

    #[test]
    fn fixed_record_roundtrip() {
        let schema = RecordSchema::new("POS", vec![ColumnSchema::fixed("x", vec![PrimitiveTag::Float64])]);
        let rows = vec![vec![FieldValue::F64(1.5)], vec![FieldValue::F64(-9.25)]];
        let decoded = roundtrip(&schema, RecordCount::Rows(2), rows.clone());
        assert_eq!(decoded.rows, rows);
        assert_eq!(decoded.schema.name, "POS");
    }

    #[test]
    fn string_roundtrip() {
        let schema = RecordSchema::new("NAMES", vec![ColumnSchema::fixed("n", vec![PrimitiveTag::Str])]);
        let rows = vec![vec![FieldValue::Str("abc".into())]];
        let decoded = roundtrip(&schema, RecordCount::Rows(1), rows.clone());
        assert_eq!(decoded.rows, rows);
    }

    #[test]
    fn forced_binary_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, b"XXXX").unwrap();
        let mut io = ByteIo::open_read(&path).unwrap();
        assert!(read_magic(&mut io).is_err());
    }

    #[test]
    fn probing_bad_magic_falls_back_instead_of_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad");
        std::fs::write(&path, b"XXXX").unwrap();
        let mut io = ByteIo::open_read(&path).unwrap();
        assert_eq!(probe_magic(&mut io).unwrap(), None);
    }

    #[test]
    fn probing_a_short_file_falls_back_instead_of_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        std::fs::write(&path, b"hi").unwrap();
        let mut io = ByteIo::open_read(&path).unwrap();
        assert_eq!(probe_magic(&mut io).unwrap(), None);
    }

    #[test]
    fn endian_swapped_roundtrip() {
        let schema = RecordSchema::new("POS", vec![ColumnSchema::fixed("x", vec![PrimitiveTag::Float64, PrimitiveTag::Int32])]);
        let rows = vec![vec![FieldValue::F64(1.5), FieldValue::I32(-70000)]];
        let decoded = roundtrip_with_swap(&schema, RecordCount::Rows(1), rows.clone(), true);
        assert_eq!(decoded.rows, rows);
    }

    #[test]
    fn multi_tag_column_values_are_not_shifted() {
        let schema = RecordSchema::new(
            "T",
            vec![
                ColumnSchema::fixed("s", vec![PrimitiveTag::Str]),
                ColumnSchema::fixed("pair", vec![PrimitiveTag::Int32, PrimitiveTag::Int32]),
                ColumnSchema::fixed("n", vec![PrimitiveTag::UInt8]),
            ],
        );
        let rows = vec![vec![
            FieldValue::Str("x".into()),
            FieldValue::I32(11),
            FieldValue::I32(22),
            FieldValue::U8(9),
        ]];
        let decoded = roundtrip(&schema, RecordCount::Rows(1), rows.clone());
        assert_eq!(decoded.rows, rows);
    }

    #[test]
    fn user_type_column_is_written_as_registry_index() {
        let mut registry = UserTypeRegistry::new();
        registry.register("V3", vec![PrimitiveTag::Float32; 3]).unwrap();
        let schema = RecordSchema::new("POS", vec![ColumnSchema::fixed_user_type("p", "V3", vec![PrimitiveTag::Float32; 3])]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v3.bin");
        {
            let mut io = ByteIo::create_write(&path).unwrap();
            write_magic(&mut io, false).unwrap();
            write_user_types(&mut io, &registry).unwrap();
            let rows = vec![vec![FieldValue::F32(1.0), FieldValue::F32(2.0), FieldValue::F32(3.0)]];
            write_record(&mut io, &schema, RecordCount::Rows(1), &rows, false, &registry).unwrap();
            io.close().unwrap();
        }

        let mut io = ByteIo::open_read(&path).unwrap();
        let swap = read_magic(&mut io).unwrap();
        let mut read_registry = UserTypeRegistry::new();
        read_user_types(&mut io, swap, &mut read_registry).unwrap();
        let decoded = read_record(&mut io, swap, &read_registry).unwrap();
        assert_eq!(decoded.rows, vec![vec![FieldValue::F32(1.0), FieldValue::F32(2.0), FieldValue::F32(3.0)]]);
        match &decoded.schema.columns[0].kind {
            ColumnKind::Fixed { user_type: Some(name), .. } => assert_eq!(name, "V3"),
            other => panic!("expected a user-typed column, got {:?}", other),
        }
    }
}
