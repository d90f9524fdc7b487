//! Basic usage example for TinyamoDb
//!
//! This example demonstrates the fundamental operations:
//! - Opening a database (optionally from a JSON config file)
//! - Putting keys and observing the previous state
//! - Reading and deleting keys
//! - Inspecting segment rotation
//!
//! Run with `RUST_LOG=info cargo run --example basic [config.json]`.

use anyhow::Context;
use tinyamodb::{Db, Options};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let options = match std::env::args().nth(1) {
        Some(path) => Options::from_json_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => Options::default().partition_count(4).max_store_bytes(256),
    };

    let db = Db::open("./example_data", options).context("opening database")?;
    println!("Database opened with {} partitions", db.partition_count());

    println!("Writing keys...");
    for key in ["alice", "bob", "carol"] {
        let previous = db.put(key)?;
        println!("put {:<6} -> partition {}, previous: {:?}", key, db.partition_for(key), previous);
    }

    println!("Overwriting alice: previous = {:?}", db.put("alice")?);

    println!("Reading bob: {:?}", db.read("bob")?);

    println!("Deleting bob: previous = {:?}", db.delete("bob")?);
    match db.read("bob")? {
        Some(_) => println!("bob still exists (unexpected)"),
        None => println!("bob was successfully deleted"),
    }

    for id in 1..=db.partition_count() {
        if let Some(segments) = db.segments(id) {
            for s in segments {
                println!(
                    "partition {} segment {}: {} store bytes, {} index bytes{}",
                    id,
                    s.id,
                    s.store_bytes,
                    s.index_bytes,
                    if s.sealed { " (sealed)" } else { "" }
                );
            }
        }
    }

    db.close()?;
    println!("Database closed");

    Ok(())
}
