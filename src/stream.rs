//! The public engine: one `Stream` handle drives either text or binary
//! encoding through the same `open`/`record`/`field`/`close` call sequence.

use std::path::Path;

use log::debug;

use crate::binary_codec;
use crate::byteio::ByteIo;
use crate::column::{assign_into_slot, ColumnSchema, FieldValue};
use crate::error::{Error, Result};
use crate::primitive::FieldSlot;
use crate::record::{ActiveRecord, RecordCount, RecordSchema};
use crate::text_format;
use crate::text_parse;
use crate::user_type::UserTypeRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Binary,
}

/// How a path's extension constrains format detection on open-for-read:
/// `.txt` always means text and `.bin` always means binary, skipping the
/// magic probe either way; anything else probes the first 4 bytes and
/// falls back to text if they aren't a recognized magic.
enum FormatHint {
    Text,
    Binary,
    Probe,
}

impl FormatHint {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") => FormatHint::Text,
            Some("bin") => FormatHint::Binary,
            _ => FormatHint::Probe,
        }
    }
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") => Format::Binary,
            _ => Format::Text,
        }
    }
}

/// Write-time flags from spec §6's stream-configuration byte, exposed as
/// plain constructor fields rather than a packed bitfield.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamConfig {
    /// `write-floats`: `true` emits lossy decimal float literals; `false`
    /// (the default) emits the lossless `#<hex bit pattern>` form.
    pub write_floats_decimal: bool,
    /// `write-endian-swap`: `true` writes the binary stream byte-swapped
    /// from native order (`LION` magic); `false` (the default) writes
    /// native order (`NOIL`). Has no effect on text output.
    pub write_endian_swap: bool,
}

/// The caller-facing stream engine. Opened once per file; `record` starts a
/// record (declaring or consuming its header), `field` walks the current
/// row's columns, and `close` flushes whatever is left buffered.
pub struct Stream {
    io: ByteIo,
    format: Format,
    swap: bool,
    write_floats_decimal: bool,
    registry: UserTypeRegistry,
    active: Option<ActiveRecord>,
    /// Rows of the record currently open: populated up front by
    /// `begin_read_record`, or accumulated one `advance_row()` at a time by
    /// `begin_write_record` until `close`/the next record flushes them.
    buffered_rows: Vec<Vec<FieldValue>>,
    /// The row being assembled from this record's in-progress `field()`
    /// calls on the write side, one slot per flattened column tag; `None`
    /// entries are columns not yet written for the current row.
    write_row_progress: Option<Vec<Option<FieldValue>>>,
    user_types_written: bool,
}

impl Stream {
    pub fn open_read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let hint = FormatHint::from_path(path);
        let mut io = ByteIo::open_read(path)?;
        let mut registry = UserTypeRegistry::new();

        let (format, swap) = match hint {
            FormatHint::Text => (Format::Text, false),
            FormatHint::Binary => {
                let swap = binary_codec::read_magic(&mut io)?;
                (Format::Binary, swap)
            }
            FormatHint::Probe => match binary_codec::probe_magic(&mut io)? {
                Some(swap) => (Format::Binary, swap),
                None => {
                    io.seek(0)?;
                    (Format::Text, false)
                }
            },
        };

        match format {
            Format::Binary => binary_codec::read_user_types(&mut io, swap, &mut registry)?,
            Format::Text => read_text_user_type_block(&mut io, &mut registry)?,
        }

        debug!("opened '{}' for reading ({:?}, swap={})", path.display(), format, swap);
        Ok(Stream {
            io,
            format,
            swap,
            write_floats_decimal: false,
            registry,
            active: None,
            buffered_rows: Vec::new(),
            write_row_progress: None,
            user_types_written: true,
        })
    }

    pub fn create_write(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_write_with_config(path, StreamConfig::default())
    }

    pub fn create_write_with_config(path: impl AsRef<Path>, config: StreamConfig) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::from_path(path);
        let mut io = ByteIo::create_write(path)?;
        if format == Format::Binary {
            binary_codec::write_magic(&mut io, config.write_endian_swap)?;
        }
        debug!(
            "opened '{}' for writing ({:?}, write_floats_decimal={}, write_endian_swap={})",
            path.display(),
            format,
            config.write_floats_decimal,
            config.write_endian_swap
        );
        Ok(Stream {
            io,
            format,
            swap: config.write_endian_swap,
            write_floats_decimal: config.write_floats_decimal,
            registry: UserTypeRegistry::new(),
            active: None,
            buffered_rows: Vec::new(),
            write_row_progress: None,
            user_types_written: false,
        })
    }

    pub fn is_reading(&self) -> bool {
        self.io.is_reading()
    }

    pub fn is_eof(&self) -> bool {
        self.io.is_eof()
    }

    pub fn record_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.schema.name.as_str())
    }

    pub fn record_count(&self) -> Option<RecordCount> {
        self.active.as_ref().map(|a| a.count)
    }

    pub fn add_user_type(&mut self, name: &str, tags: Vec<crate::primitive::PrimitiveTag>) -> Result<()> {
        if self.user_types_written {
            return Err(Error::failure("user types must be registered before the first record is written"));
        }
        self.registry.register(name, tags)?;
        Ok(())
    }

    /// Registers a batch of user types in one call.
    pub fn add_user_types(&mut self, defs: impl IntoIterator<Item = (String, Vec<crate::primitive::PrimitiveTag>)>) -> Result<()> {
        for (name, tags) in defs {
            self.add_user_type(&name, tags)?;
        }
        Ok(())
    }

    /// Looks up the user type bound to a column, if any, without reading a
    /// value from it -- used by callers that want to branch on a column's
    /// declared composite type before calling `field`.
    pub fn read_field_user_type(&self, column_name: &str) -> Option<&crate::user_type::UserType> {
        let active = self.active.as_ref()?;
        let col = active.schema.columns.iter().find(|c| c.name == column_name)?;
        match &col.kind {
            crate::column::ColumnKind::Fixed { user_type: Some(name), .. } => self.registry.by_name(name),
            _ => None,
        }
    }

    pub fn write_comment(&mut self, text: &str) -> Result<()> {
        match self.format {
            Format::Text => text_format::write_comment(&mut self.io, text),
            Format::Binary => Ok(()),
        }
    }

    fn flush_user_types(&mut self) -> Result<()> {
        if self.user_types_written {
            return Ok(());
        }
        match self.format {
            Format::Binary => binary_codec::write_user_types(&mut self.io, &self.registry)?,
            Format::Text => {
                if !self.registry.is_empty() {
                    write_text_user_type_block(&mut self.io, &self.registry)?;
                }
            }
        }
        self.user_types_written = true;
        Ok(())
    }

    /// Opens a record for writing with the given schema and declared count,
    /// first flushing whatever record was previously open.
    pub fn begin_write_record(&mut self, schema: RecordSchema, count: RecordCount) -> Result<()> {
        if self.io.is_reading() {
            return Err(Error::failure("stream is not open for writing"));
        }
        self.finish_write()?;
        self.flush_user_types()?;
        self.active = Some(ActiveRecord::new(schema, count));
        self.buffered_rows.clear();
        self.write_row_progress = None;
        Ok(())
    }

    /// Opens the next record for reading, expecting its name to match
    /// `expected_name` (pass `None` to accept whatever comes next).
    pub fn begin_read_record(&mut self, expected_name: Option<&str>) -> Result<()> {
        if !self.is_reading() {
            return Err(Error::failure("stream is not open for reading"));
        }
        let (schema, count, rows) = match self.format {
            Format::Text => {
                let block = text_parse::read_record_block(&mut self.io, &self.registry)?;
                (block.schema, block.count, block.rows)
            }
            Format::Binary => {
                let decoded = binary_codec::read_record(&mut self.io, self.swap, &self.registry)?;
                (decoded.schema, decoded.count, decoded.rows)
            }
        };

        if let Some(expected) = expected_name {
            if expected != schema.name {
                return Err(Error::UnexpectedRecord { expected: expected.to_string(), found: schema.name });
            }
        }

        self.buffered_rows = rows;
        self.active = Some(ActiveRecord::new(schema, count));
        Ok(())
    }

    /// Reads or writes the named column of the row the cursor currently
    /// sits on. `slots` must carry exactly as many entries as `name`'s
    /// column declares tags (one, for an ordinary or dynamic column;
    /// several, for a fixed column built from more than one primitive tag).
    /// The column is found by name against the record's actual column
    /// order, so callers may declare their fields in any order and skip
    /// ones they don't care about -- `Error::FieldNotFound` is returned
    /// (not a panic, not silent corruption of another field) if `name`
    /// doesn't match any column the file or caller declared.
    ///
    /// Call `advance_row` once every column of the current row has been
    /// read or written to move on to the next one.
    pub fn field(&mut self, name: &str, slots: &mut [FieldSlot<'_>]) -> Result<()> {
        let reading = self.io.is_reading();
        let active = self.active.as_ref().ok_or_else(|| Error::failure("no record is open"))?;

        let (start, len) = active.schema.column_flat_range(name).ok_or_else(|| Error::FieldNotFound {
            record: active.schema.name.clone(),
            field: name.to_string(),
        })?;
        if slots.len() != len {
            return Err(Error::failure(format!(
                "field '{}' of record '{}' declares {} value(s), {} given",
                name,
                active.schema.name,
                len,
                slots.len()
            )));
        }

        if reading {
            let row = self
                .buffered_rows
                .get(active.cursor.row)
                .ok_or_else(|| Error::UnexpectedEof { message: "no more rows in this record".into() })?;
            for (i, slot) in slots.iter_mut().enumerate() {
                let value = &row[start + i];
                if slot.tag() != value.tag() {
                    return Err(Error::ReadTypesDontMatch {
                        record: active.schema.name.clone(),
                        field: name.to_string(),
                    });
                }
                assign_into_slot(slot, value.clone());
            }
        } else {
            let total = active.schema.total_slots();
            let progress = self.write_row_progress.get_or_insert_with(|| vec![None; total]);
            for (i, slot) in slots.iter().enumerate() {
                progress[start + i] = Some(FieldValue::from(slot));
            }
        }

        Ok(())
    }

    /// Moves the cursor to the next row, flushing the row assembled from
    /// this row's `field()` calls on the write side. Returns `false` once
    /// the record's declared row count has been reached (always `true` for
    /// `Unknown`/`Label` counts, which have no fixed length to reach).
    pub fn advance_row(&mut self) -> Result<bool> {
        let reading = self.io.is_reading();
        let active = self.active.as_mut().ok_or_else(|| Error::failure("no record is open"))?;

        if !reading {
            let total = active.schema.total_slots();
            let progress = self.write_row_progress.take().unwrap_or_else(|| vec![None; total]);
            let mut row = Vec::with_capacity(total);
            for (i, slot) in progress.into_iter().enumerate() {
                row.push(slot.ok_or_else(|| {
                    Error::failure(format!("row {} of record '{}' is missing a value for slot {}", active.cursor.row, active.schema.name, i))
                })?);
            }
            if self.buffered_rows.len() > active.cursor.row {
                self.buffered_rows[active.cursor.row] = row;
            } else {
                self.buffered_rows.push(row);
            }
        }

        active.cursor.row += 1;
        Ok(!active.is_finished())
    }

    fn finish_write(&mut self) -> Result<()> {
        let active = match self.active.take() {
            Some(a) => a,
            None => return Ok(()),
        };
        let rows = std::mem::take(&mut self.buffered_rows);
        self.write_row_progress = None;
        match self.format {
            Format::Text => text_format::write_record(&mut self.io, &active.schema, active.count, &rows, self.write_floats_decimal)?,
            Format::Binary => binary_codec::write_record(&mut self.io, &active.schema, active.count, &rows, self.swap, &self.registry)?,
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        if !self.io.is_reading() {
            self.finish_write()?;
            self.flush_user_types()?;
        }
        self.io.close()
    }
}

fn read_text_user_type_block(io: &mut ByteIo, registry: &mut UserTypeRegistry) -> Result<()> {
    io.skip_whitespace_and_comments()?;
    match io.peek_byte()? {
        Some(b'<') => {}
        _ => return Ok(()),
    }
    io.read_byte()?;
    loop {
        io.skip_whitespace_and_comments()?;
        match io.peek_byte()? {
            Some(b'>') => {
                io.read_byte()?;
                break;
            }
            Some(_) => {
                let col = read_user_type_column(io)?;
                if let ColumnSchema {
                    name,
                    kind: crate::column::ColumnKind::Fixed { tags, .. },
                } = col
                {
                    registry.register(&name, tags)?;
                }
            }
            None => break,
        }
    }
    Ok(())
}

fn write_text_user_type_block(io: &mut ByteIo, registry: &UserTypeRegistry) -> Result<()> {
    io.write_all(b"< ")?;
    for t in registry.iter() {
        io.write_all(format!("{}:{} ", t.name, t.tag_string()).as_bytes())?;
    }
    io.write_all(b">\n")
}

fn read_user_type_column(io: &mut ByteIo) -> Result<ColumnSchema> {
    let mut token = Vec::new();
    loop {
        match io.peek_byte()? {
            Some(b) if b.is_ascii_whitespace() || b == b'>' => break,
            Some(_) => token.push(io.read_byte()?.unwrap()),
            None => break,
        }
    }
    let token = String::from_utf8(token).map_err(|_| Error::failure("user type token is not valid UTF-8"))?;
    let (name, tags) = token
        .split_once(':')
        .ok_or_else(|| Error::failure(format!("malformed user type declaration '{}'", token)))?;
    let tags = crate::primitive::parse_tags(tags)
        .ok_or_else(|| Error::failure(format!("bad type tags in user type '{}'", name)))?;
    Ok(ColumnSchema::fixed(name, tags))
}
