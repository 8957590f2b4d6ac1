//! Text decoding: the inverse of `text_format` -- header, types and
//! underline lines, then column-typed row values.

use std::convert::TryFrom;

use crate::byteio::ByteIo;
use crate::column::{ColumnKind, ColumnSchema, FieldValue};
use crate::error::{Error, Result};
use crate::primitive::PrimitiveTag;
use crate::record::{RecordCount, RecordSchema};
use crate::user_type::UserTypeRegistry;

fn expect_byte(io: &mut ByteIo, expected: u8) -> Result<()> {
    io.skip_whitespace_and_comments()?;
    match io.read_byte()? {
        Some(b) if b == expected => Ok(()),
        Some(b) => Err(Error::failure(format!(
            "expected '{}', found '{}'",
            expected as char, b as char
        ))),
        None => Err(Error::UnexpectedEof { message: format!("expected '{}'", expected as char) }),
    }
}

/// Reads a run of non-whitespace, non-delimiter bytes as one token.
fn read_bare_token(io: &mut ByteIo, stop: &[u8]) -> Result<String> {
    let mut out = Vec::new();
    loop {
        match io.peek_byte()? {
            Some(b) if b.is_ascii_whitespace() || stop.contains(&b) => break,
            Some(_) => out.push(io.read_byte()?.unwrap()),
            None => break,
        }
    }
    String::from_utf8(out).map_err(|_| Error::failure("token is not valid UTF-8"))
}

fn read_quoted_string(io: &mut ByteIo) -> Result<String> {
    expect_byte(io, b'"')?;
    let mut out = String::new();
    loop {
        match io.read_byte()? {
            None => return Err(Error::UnexpectedEof { message: "unterminated string literal".into() }),
            Some(b'"') => break,
            Some(b'\\') => match io.read_byte()? {
                Some(b'"') => out.push('"'),
                Some(b'\\') => out.push('\\'),
                Some(b'n') => out.push('\n'),
                Some(other) => out.push(other as char),
                None => return Err(Error::UnexpectedEof { message: "unterminated escape".into() }),
            },
            Some(b) => out.push(b as char),
        }
    }
    Ok(out)
}

fn read_quoted_wide_string(io: &mut ByteIo) -> Result<Vec<u16>> {
    expect_byte(io, b'"')?;
    let mut out = Vec::new();
    loop {
        match io.read_byte()? {
            None => return Err(Error::UnexpectedEof { message: "unterminated wide string literal".into() }),
            Some(b'"') => break,
            Some(b'\\') => match io.read_byte()? {
                Some(b'"') => out.push(0x22),
                Some(b'\\') => out.push(0x5C),
                Some(b'u') => {
                    let mut digits = [0u8; 4];
                    io.read_exact(&mut digits)?;
                    let s = std::str::from_utf8(&digits).map_err(|_| Error::failure("bad \\u escape"))?;
                    let code = u16::from_str_radix(s, 16).map_err(|_| Error::failure("bad \\u escape"))?;
                    out.push(code);
                }
                Some(other) => out.push(other as u16),
                None => return Err(Error::UnexpectedEof { message: "unterminated escape".into() }),
            },
            Some(b) => out.push(b as u16),
        }
    }
    Ok(out)
}

fn parse_scalar(tok: &str, tag: PrimitiveTag) -> Result<FieldValue> {
    use PrimitiveTag::*;
    let bad = || Error::failure(format!("'{}' is not a valid {} literal", tok, tag));
    Ok(match tag {
        Int8 => FieldValue::I8(tok.parse().map_err(|_| bad())?),
        Int16 => FieldValue::I16(tok.parse().map_err(|_| bad())?),
        Int32 => FieldValue::I32(tok.parse().map_err(|_| bad())?),
        Int64 => FieldValue::I64(tok.parse().map_err(|_| bad())?),
        UInt8 => FieldValue::U8(tok.parse().map_err(|_| bad())?),
        UInt16 => FieldValue::U16(tok.parse().map_err(|_| bad())?),
        UInt32 => FieldValue::U32(tok.parse().map_err(|_| bad())?),
        UInt64 => FieldValue::U64(tok.parse().map_err(|_| bad())?),
        Float32 => FieldValue::F32(tok.parse().map_err(|_| bad())?),
        Float64 => FieldValue::F64(tok.parse().map_err(|_| bad())?),
        Str | WStr => unreachable!("strings are read via their own quoted-literal path"),
    })
}

fn read_value(io: &mut ByteIo, tag: PrimitiveTag) -> Result<FieldValue> {
    io.skip_whitespace_and_comments()?;
    match tag {
        PrimitiveTag::Str => Ok(FieldValue::Str(read_quoted_string(io)?)),
        PrimitiveTag::WStr => Ok(FieldValue::WStr(read_quoted_wide_string(io)?)),
        PrimitiveTag::Float32 | PrimitiveTag::Float64 => read_float_value(io, tag),
        _ => {
            let tok = read_bare_token(io, b"]}")?;
            parse_scalar(&tok, tag)
        }
    }
}

/// Floats are written either as a decimal literal (`write-floats = 1`) or,
/// by default, as a lossless `#<hex bit pattern>` literal -- distinguished
/// by a leading `#`.
fn read_float_value(io: &mut ByteIo, tag: PrimitiveTag) -> Result<FieldValue> {
    if io.peek_byte()? == Some(b'#') {
        io.read_byte()?;
        let tok = read_bare_token(io, b"]}")?;
        let bad = || Error::failure(format!("'#{}' is not a valid hex {} literal", tok, tag));
        return Ok(match tag {
            PrimitiveTag::Float32 => {
                FieldValue::F32(f32::from_bits(u32::from_str_radix(&tok, 16).map_err(|_| bad())?))
            }
            PrimitiveTag::Float64 => {
                FieldValue::F64(f64::from_bits(u64::from_str_radix(&tok, 16).map_err(|_| bad())?))
            }
            _ => unreachable!(),
        });
    }
    let tok = read_bare_token(io, b"]}")?;
    parse_scalar(&tok, tag)
}

/// `[ Name : Count ]`, `[ Name : ? ]`, or `@[ Name ]`.
fn read_header(io: &mut ByteIo) -> Result<(String, RecordCount)> {
    io.skip_whitespace_and_comments()?;
    let is_label = match io.peek_byte()? {
        Some(b'@') => {
            io.read_byte()?;
            true
        }
        _ => false,
    };
    expect_byte(io, b'[')?;
    io.skip_whitespace_and_comments()?;
    let name = read_bare_token(io, b":]")?;
    io.skip_whitespace_and_comments()?;
    let count = if is_label {
        RecordCount::Label
    } else {
        match io.peek_byte()? {
            Some(b':') => {
                io.read_byte()?;
                io.skip_whitespace_and_comments()?;
                let tok = read_bare_token(io, b"]")?;
                if tok == "?" {
                    RecordCount::Unknown
                } else {
                    RecordCount::Rows(tok.parse().map_err(|_| Error::failure(format!("bad row count '{}'", tok)))?)
                }
            }
            _ => RecordCount::Label,
        }
    };
    io.skip_whitespace_and_comments()?;
    expect_byte(io, b']')?;
    Ok((name, count))
}

/// `{ a:f b;Vec3 c:? }`
fn read_types_line(io: &mut ByteIo, registry: &UserTypeRegistry) -> Result<Vec<ColumnSchema>> {
    expect_byte(io, b'{')?;
    let mut columns = Vec::new();
    loop {
        io.skip_whitespace_and_comments()?;
        if io.peek_byte()? == Some(b'}') {
            io.read_byte()?;
            break;
        }
        let token = read_bare_token(io, b"}")?;
        columns.push(parse_column_token(&token, registry)?);
    }
    Ok(columns)
}

fn parse_column_token(token: &str, registry: &UserTypeRegistry) -> Result<ColumnSchema> {
    if let Some((name, rest)) = token.split_once(';') {
        let user_type = registry
            .by_name(rest)
            .ok_or_else(|| Error::failure(format!("unknown user type '{}'", rest)))?;
        return Ok(ColumnSchema::fixed_user_type(name, rest, user_type.tags.clone()));
    }
    if let Some((name, rest)) = token.split_once(':') {
        if rest == "?" {
            return Ok(ColumnSchema::dynamic(name));
        }
        let tags = crate::primitive::parse_tags(rest)
            .ok_or_else(|| Error::failure(format!("bad type tags '{}' in column '{}'", rest, name)))?;
        return Ok(ColumnSchema::fixed(name, tags));
    }
    Err(Error::failure(format!("malformed column header '{}'", token)))
}

fn skip_underline(io: &mut ByteIo) -> Result<()> {
    io.skip_whitespace_and_comments()?;
    loop {
        match io.read_byte()? {
            None | Some(b'\n') => break,
            Some(_) => {}
        }
    }
    Ok(())
}

fn read_row(io: &mut ByteIo, columns: &[ColumnSchema]) -> Result<Vec<FieldValue>> {
    let mut row = Vec::with_capacity(columns.len());
    for col in columns {
        match &col.kind {
            ColumnKind::Dynamic => {
                io.skip_whitespace_and_comments()?;
                let tag_tok = read_bare_token(io, b":")?;
                let tag_char = tag_tok.chars().next().ok_or_else(|| Error::failure("missing dynamic column tag"))?;
                let tag = PrimitiveTag::try_from(tag_char).map_err(|_| Error::failure(format!("unknown type tag '{}'", tag_char)))?;
                expect_byte(io, b':')?;
                row.push(read_value(io, tag)?);
            }
            ColumnKind::Fixed { tags, .. } => {
                for tag in tags {
                    row.push(read_value(io, *tag)?);
                }
            }
        }
    }
    Ok(row)
}

pub struct ParsedBlock {
    pub schema: RecordSchema,
    pub count: RecordCount,
    pub rows: Vec<Vec<FieldValue>>,
}

pub fn read_record_block(io: &mut ByteIo, registry: &UserTypeRegistry) -> Result<ParsedBlock> {
    let (name, count) = read_header(io)?;
    let columns = read_types_line(io, registry)?;
    skip_underline(io)?;

    let row_count = match count {
        RecordCount::Rows(n) => n,
        RecordCount::Unknown => io.scan_dynamic_row_count()?,
        RecordCount::Label => 1,
    };

    let mut rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        rows.push(read_row(io, &columns)?);
    }

    Ok(ParsedBlock { schema: RecordSchema::new(name, columns), count, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_format::write_record;

    fn roundtrip(schema: &RecordSchema, count: RecordCount, rows: Vec<Vec<FieldValue>>) -> ParsedBlock {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.txt");
        {
            let mut io = ByteIo::create_write(&path).unwrap();
            write_record(&mut io, schema, count, &rows, false).unwrap();
            io.close().unwrap();
        }
        let mut io = ByteIo::open_read(&path).unwrap();
        let registry = UserTypeRegistry::new();
        read_record_block(&mut io, &registry).unwrap()
    }

    #[test]
    fn fixed_column_roundtrip() {
        let schema = RecordSchema::new("POS", vec![ColumnSchema::fixed("x", vec![PrimitiveTag::Float32])]);
        let rows = vec![vec![FieldValue::F32(1.5)], vec![FieldValue::F32(-2.0)]];
        let block = roundtrip(&schema, RecordCount::Rows(2), rows.clone());
        assert_eq!(block.rows, rows);
        assert_eq!(block.schema.name, "POS");
    }

    #[test]
    fn string_column_roundtrip() {
        let schema = RecordSchema::new("NAMES", vec![ColumnSchema::fixed("n", vec![PrimitiveTag::Str])]);
        let rows = vec![vec![FieldValue::Str("hello world".into())]];
        let block = roundtrip(&schema, RecordCount::Rows(1), rows.clone());
        assert_eq!(block.rows, rows);
    }

    #[test]
    fn dynamic_column_roundtrip() {
        let schema = RecordSchema::new("MIXED", vec![ColumnSchema::dynamic("v")]);
        let rows = vec![vec![FieldValue::I32(7)], vec![FieldValue::F64(3.25)]];
        let block = roundtrip(&schema, RecordCount::Rows(2), rows.clone());
        assert_eq!(block.rows, rows);
    }

    #[test]
    fn float_roundtrips_in_both_write_modes() {
        let schema = RecordSchema::new("F", vec![ColumnSchema::fixed("v", vec![PrimitiveTag::Float64])]);
        let rows = vec![vec![FieldValue::F64(-12.25)]];

        let dir = tempfile::tempdir().unwrap();
        let hex_path = dir.path().join("hex.txt");
        {
            let mut io = ByteIo::create_write(&hex_path).unwrap();
            write_record(&mut io, &schema, RecordCount::Rows(1), &rows, false).unwrap();
            io.close().unwrap();
        }
        let contents = std::fs::read_to_string(&hex_path).unwrap();
        assert!(contents.contains('#'));
        let mut io = ByteIo::open_read(&hex_path).unwrap();
        let registry = UserTypeRegistry::new();
        let block = read_record_block(&mut io, &registry).unwrap();
        assert_eq!(block.rows, rows);

        let decimal_path = dir.path().join("decimal.txt");
        {
            let mut io = ByteIo::create_write(&decimal_path).unwrap();
            write_record(&mut io, &schema, RecordCount::Rows(1), &rows, true).unwrap();
            io.close().unwrap();
        }
        let mut io = ByteIo::open_read(&decimal_path).unwrap();
        let registry = UserTypeRegistry::new();
        let block = read_record_block(&mut io, &registry).unwrap();
        assert_eq!(block.rows, rows);
    }

    #[test]
    fn label_record_roundtrip() {
        let schema = RecordSchema::new("HEADER", vec![ColumnSchema::fixed("v", vec![PrimitiveTag::Int32])]);
        let rows = vec![vec![FieldValue::I32(42)]];
        let block = roundtrip(&schema, RecordCount::Label, rows.clone());
        assert_eq!(block.count, RecordCount::Label);
        assert_eq!(block.rows, rows);
    }
}
