use anyhow::Result;
use cvmscraper::{ImportConfig, Store, Table};
use std::{env, path::PathBuf, process::exit};

fn main() {
    // Usage: inspect_table [STORE_PATH] [TABLE]
    let args: Vec<String> = env::args().collect();
    if args.len() > 3 {
        eprintln!("Usage: {} [STORE_PATH] [TABLE]", args[0]);
        exit(1);
    }
    let store_path = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| ImportConfig::default().store_path);
    if !store_path.exists() {
        eprintln!("Store not found: {}", store_path.display());
        exit(1);
    }

    if let Err(e) = inspect(&Store::open(store_path), args.get(2).map(String::as_str)) {
        eprintln!("Error: {}", e);
        exit(1);
    }
}

fn inspect(store: &Store, only: Option<&str>) -> Result<()> {
    let names = match only {
        Some(t) => vec![t.to_string()],
        None => store.table_names()?,
    };

    println!("=== Store: {} ===", store.path().display());
    for name in names {
        let table = store.read_all(&name)?;
        print_table(&name, &table);
    }
    Ok(())
}

fn print_table(name: &str, table: &Table) {
    println!();
    println!("--- {} ---", name);
    println!("Rows:    {}", table.len());
    println!("Columns: {}", table.columns().len());
    for (i, col) in table.columns().iter().enumerate() {
        println!("- {:<40} | {}", col, table.column_kind(i).sql_type());
    }
    if let Some(first) = table.record(0) {
        println!("First row:");
        for (col, value) in first.iter() {
            println!("  {:<38} = {}", col, value);
        }
    }
}
