//! A self-describing, record-oriented serialization engine with matching
//! text and binary encodings.
//!
//! A [`Stream`] is opened once per file and driven through the same
//! `begin_write_record`/`field`/`close` (or `begin_read_record`/`field`)
//! sequence regardless of which encoding the file is in -- the choice is
//! made once, at `open`, from the file's extension (`.bin` for binary,
//! anything else for text).

pub mod arena;
pub mod binary_codec;
pub mod byteio;
pub mod column;
pub mod crc32;
pub mod endian;
pub mod error;
pub mod primitive;
pub mod record;
pub mod stream;
pub mod text_format;
pub mod text_parse;
pub mod user_type;

pub use column::{ColumnKind, ColumnSchema, FieldValue};
pub use crc32::Crc32;
pub use error::{Error, Result, State};
pub use primitive::{FieldSlot, PrimitiveTag};
pub use record::{RecordCount, RecordSchema};
pub use stream::{Format, Stream, StreamConfig};
pub use user_type::UserType;
