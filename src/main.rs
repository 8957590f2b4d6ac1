//! A thin demonstration client for the `tablestream` engine: writes a small
//! text file, then reads it back and prints what it found. This is not a
//! general-purpose CLI -- just enough to exercise the library end to end.

use std::env;

use tablestream::{ColumnSchema, FieldSlot, PrimitiveTag, RecordCount, RecordSchema, Stream};

fn main() {
    env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| "demo.txt".to_string());

    if let Err(e) = run(&path) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(path: &str) -> tablestream::Result<()> {
    {
        let mut out = Stream::create_write(path)?;
        out.write_comment("sample positions, written by the demo binary")?;
        let schema = RecordSchema::new("POS", vec![
            ColumnSchema::fixed("x", vec![PrimitiveTag::Float64]),
            ColumnSchema::fixed("y", vec![PrimitiveTag::Float64]),
        ]);
        out.begin_write_record(schema, RecordCount::Rows(3))?;
        for (x, y) in [(0.0, 0.0), (1.5, -2.25), (10.0, 4.0)] {
            let mut x = x;
            let mut y = y;
            out.field("x", &mut [FieldSlot::F64(&mut x)])?;
            out.field("y", &mut [FieldSlot::F64(&mut y)])?;
            out.advance_row()?;
        }
        out.close()?;
    }

    let mut input = Stream::open_read(path)?;
    input.begin_read_record(Some("POS"))?;
    println!("record '{}' has {:?} rows", input.record_name().unwrap_or("?"), input.record_count());

    let row_count = input.record_count().and_then(|c| c.row_count()).unwrap_or(0);
    for _ in 0..row_count {
        let mut x = 0.0f64;
        let mut y = 0.0f64;
        input.field("y", &mut [FieldSlot::F64(&mut y)])?;
        input.field("x", &mut [FieldSlot::F64(&mut x)])?;
        println!("  ({}, {})", x, y);
        input.advance_row()?;
    }

    Ok(())
}
