// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! byztime-shm-viewer - Inspect byztime shared-memory time-sync regions
//!
//! Opens a region file read-only (the same path the consumer engine maps)
//! and prints the header fields, ring index, and most recent entry in
//! human-readable form. Unlike `ConsumerContext::open_ro`, this tool does
//! not fail on an era mismatch — that is exactly the condition an operator
//! reaches for this tool to diagnose.

use byztime::{ClockSource, MappedRegion, SystemClocks, NUM_ENTRIES};
use clap::Parser;
use colored::*;
use std::path::PathBuf;

/// Inspect a byztime shared-memory time-sync region
#[derive(Parser, Debug)]
#[command(name = "byztime-shm-viewer")]
#[command(version = "0.1.0")]
#[command(about = "Inspect byztime shared-memory time-sync regions")]
struct Args {
    /// Path to the region file
    path: PathBuf,

    /// Output format: pretty, json
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(OutputFormat::Pretty),
            "json" | "j" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {s}")),
        }
    }
}

struct RegionInfo {
    path: String,
    magic_valid: bool,
    era_matches_host: bool,
    index: u32,
    index_in_range: bool,
    entry: Option<EntryInfo>,
}

struct EntryInfo {
    offset: String,
    error: String,
    as_of: String,
    well_formed: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let info = inspect(&args.path)?;
    match args.format {
        OutputFormat::Pretty => print_pretty(&info),
        OutputFormat::Json => print_json(&info),
    }
    Ok(())
}

fn inspect(path: &std::path::Path) -> Result<RegionInfo, Box<dyn std::error::Error>> {
    let region = MappedRegion::open_ro(path)?;
    let header = region.header();

    let magic_valid = header.magic_valid();
    let host_era = SystemClocks::new().clock_era();
    let era_matches_host = magic_valid && header.era() == host_era;

    let index = header.load_index();
    let index_in_range = (index as usize) < NUM_ENTRIES;

    let entry = if magic_valid && index_in_range {
        // SAFETY: `index_in_range` was just checked.
        let raw = unsafe { region.read_entry(index) };
        Some(EntryInfo {
            offset: raw.offset.format(),
            error: raw.error.format(),
            as_of: raw.as_of.format(),
            well_formed: raw.is_well_formed(),
        })
    } else {
        None
    };

    Ok(RegionInfo {
        path: path.display().to_string(),
        magic_valid,
        era_matches_host,
        index,
        index_in_range,
        entry,
    })
}

fn print_pretty(info: &RegionInfo) {
    println!("{}", info.path.bold());
    println!(
        "  magic:    {}",
        if info.magic_valid {
            "valid".green().to_string()
        } else {
            "INVALID".red().bold().to_string()
        }
    );
    println!(
        "  era:      {}",
        if info.era_matches_host {
            "matches this host".green().to_string()
        } else {
            "does not match this host (no live provider for this boot)"
                .yellow()
                .to_string()
        }
    );
    println!(
        "  index:    {} ({})",
        info.index,
        if info.index_in_range {
            "in range".green().to_string()
        } else {
            "OUT OF RANGE".red().bold().to_string()
        }
    );
    match &info.entry {
        Some(entry) => {
            println!("  offset:   {}", entry.offset);
            println!("  error:    {}", entry.error);
            println!("  as_of:    {}", entry.as_of);
            println!(
                "  shape:    {}",
                if entry.well_formed {
                    "well-formed".green().to_string()
                } else {
                    "DENORMALIZED".red().bold().to_string()
                }
            );
        }
        None => println!("  entry:    {}", "unavailable (invalid magic or index)".yellow()),
    }
}

fn print_json(info: &RegionInfo) {
    let entry_json = match &info.entry {
        Some(e) => format!(
            "{{\"offset\":\"{}\",\"error\":\"{}\",\"as_of\":\"{}\",\"well_formed\":{}}}",
            e.offset, e.error, e.as_of, e.well_formed
        ),
        None => "null".to_string(),
    };
    println!(
        "{{\"path\":\"{}\",\"magic_valid\":{},\"era_matches_host\":{},\"index\":{},\"index_in_range\":{},\"entry\":{}}}",
        info.path, info.magic_valid, info.era_matches_host, info.index, info.index_in_range, entry_json
    );
}
