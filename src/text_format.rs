//! Text encoding: header, types and underline lines, and column-aligned rows.
//!
//! Column widths are computed from a whole buffered block of rows so that
//! every row in the block lines up under its header -- the writer can't
//! know how wide a column needs to be until it has seen every value that
//! will go in it.

use crate::byteio::ByteIo;
use crate::column::{ColumnKind, ColumnSchema, FieldValue};
use crate::error::Result;
use crate::record::{RecordCount, RecordSchema};

const COLUMN_GAP: usize = 1;

/// Renders a value for the text format. Floats honor `write_floats_decimal`:
/// `false` (the default) emits the lossless `#<hex bit pattern>` form per
/// spec's `write-floats = 0` mode; `true` emits a lossy decimal literal.
pub fn format_value(value: &FieldValue, write_floats_decimal: bool) -> String {
    match value {
        FieldValue::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
        FieldValue::I8(v) => v.to_string(),
        FieldValue::I16(v) => v.to_string(),
        FieldValue::I32(v) => v.to_string(),
        FieldValue::I64(v) => v.to_string(),
        FieldValue::U8(v) => v.to_string(),
        FieldValue::U16(v) => v.to_string(),
        FieldValue::U32(v) => v.to_string(),
        FieldValue::U64(v) => v.to_string(),
        FieldValue::F32(v) => format_f32(*v, write_floats_decimal),
        FieldValue::F64(v) => format_f64(*v, write_floats_decimal),
        FieldValue::Str(s) => quote_string(s),
        FieldValue::WStr(units) => quote_wide_string(units),
    }
}

fn format_f32(v: f32, decimal: bool) -> String {
    if decimal {
        format_float(v as f64)
    } else {
        format!("#{:X}", v.to_bits())
    }
}

fn format_f64(v: f64, decimal: bool) -> String {
    if decimal {
        format_float(v)
    } else {
        format!("#{:X}", v.to_bits())
    }
}

fn format_float(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn quote_wide_string(units: &[u16]) -> String {
    let mut out = String::with_capacity(units.len() + 2);
    out.push('"');
    for &u in units {
        match u {
            0x22 => out.push_str("\\\""),
            0x5C => out.push_str("\\\\"),
            0x20..=0x7E => out.push(u as u8 as char),
            _ => out.push_str(&format!("\\u{:04x}", u)),
        }
    }
    out.push('"');
    out
}

fn header_line(schema: &RecordSchema, count: RecordCount) -> String {
    match count {
        RecordCount::Label => format!("@[ {} ]", schema.name),
        RecordCount::Rows(n) => format!("[ {} : {} ]", schema.name, n),
        RecordCount::Unknown => format!("[ {} : ? ]", schema.name),
    }
}

fn column_header_text(col: &ColumnSchema) -> String {
    match &col.kind {
        ColumnKind::Dynamic => format!("{}:?", col.name),
        ColumnKind::Fixed { tags, user_type: Some(name) } => {
            let _ = tags;
            format!("{};{}", col.name, name)
        }
        ColumnKind::Fixed { tags, user_type: None } => {
            format!("{}:{}", col.name, crate::primitive::tags_to_string(tags))
        }
    }
}

fn types_line(schema: &RecordSchema) -> String {
    let parts: Vec<String> = schema.columns.iter().map(column_header_text).collect();
    format!("{{ {} }}", parts.join(" "))
}

/// Display widths, one per *flattened primitive slot* (not one per column --
/// a column declaring several tags, e.g. `Floats:Ff`, contributes one slot
/// per tag, matching how rows are stored as a flat `Vec<FieldValue>`).
struct Layout {
    widths: Vec<usize>,
}

fn compute_layout(schema: &RecordSchema, rows: &[Vec<FieldValue>], write_floats_decimal: bool) -> Layout {
    let mut widths = vec![0usize; schema.total_slots()];

    // A single-tag column's header name sets a floor on its one slot's
    // width; a multi-tag column's header spans several slots and isn't
    // attributed to any one of them.
    let mut offset = 0;
    for col in &schema.columns {
        let width = col.width_in_slots();
        if width == 1 {
            widths[offset] = col.name.chars().count();
        }
        offset += width;
    }

    for row in rows {
        let mut offset = 0;
        for col in &schema.columns {
            let width = col.width_in_slots();
            for i in 0..width {
                let text = format_cell(col, &row[offset + i], write_floats_decimal);
                let w = text.chars().count();
                if w > widths[offset + i] {
                    widths[offset + i] = w;
                }
            }
            offset += width;
        }
    }
    Layout { widths }
}

fn format_cell(col: &ColumnSchema, value: &FieldValue, write_floats_decimal: bool) -> String {
    match col.kind {
        ColumnKind::Dynamic => format!("{}:{}", value.tag().as_char(), format_value(value, write_floats_decimal)),
        ColumnKind::Fixed { .. } => format_value(value, write_floats_decimal),
    }
}

pub fn write_record(
    io: &mut ByteIo,
    schema: &RecordSchema,
    count: RecordCount,
    rows: &[Vec<FieldValue>],
    write_floats_decimal: bool,
) -> Result<()> {
    io.write_all(b"\n")?;
    io.write_all(header_line(schema, count).as_bytes())?;
    io.write_all(b"\n")?;
    io.write_all(types_line(schema).as_bytes())?;
    io.write_all(b"\n")?;

    let layout = compute_layout(schema, rows, write_floats_decimal);
    let underline: String = layout
        .widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join(&" ".repeat(COLUMN_GAP));
    io.write_all(underline.as_bytes())?;
    io.write_all(b"\n")?;

    for row in rows {
        let mut line = String::new();
        let mut offset = 0;
        let mut first = true;
        for col in &schema.columns {
            let width = col.width_in_slots();
            for i in 0..width {
                if !first {
                    line.push_str(&" ".repeat(COLUMN_GAP));
                }
                first = false;
                let value = &row[offset + i];
                let text = format_cell(col, value, write_floats_decimal);
                let slot_width = layout.widths[offset + i];
                let is_numeric = !matches!(value, FieldValue::Str(_) | FieldValue::WStr(_));
                if is_numeric {
                    line.push_str(&" ".repeat(slot_width.saturating_sub(text.chars().count())));
                    line.push_str(&text);
                } else {
                    line.push_str(&text);
                    line.push_str(&" ".repeat(slot_width.saturating_sub(text.chars().count())));
                }
            }
            offset += width;
        }
        io.write_all(line.trim_end().as_bytes())?;
        io.write_all(b"\n")?;
    }
    Ok(())
}

pub fn write_comment(io: &mut ByteIo, text: &str) -> Result<()> {
    for line in text.lines() {
        io.write_all(b"// ")?;
        io.write_all(line.as_bytes())?;
        io.write_all(b"\n")?;
    }
    Ok(())
}
