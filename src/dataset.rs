//! Loads listings from a delimited rental dataset and cleans them into the
//! shape the scorers require.
//!
//! Cleaning rules:
//! - a missing or blank description becomes [`MISSING_DESCRIPTION`]
//! - only the first `max_records` data rows are read; cleaning happens after
//!   the cap, so fewer listings may come back
//! - a price that does not parse as a non-negative number drops the row
//! - a negative bedroom count drops the row
//! - bedrooms that do not parse count as 0 (fractions are truncated)
//! - a repeated `id` drops the later row

use std::{collections::HashSet, io::Read, path::Path};

use csv::{ByteRecord, ReaderBuilder};
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    listing::Listing,
};

pub const MISSING_DESCRIPTION: &str = "No description available";
pub const DEFAULT_MAX_RECORDS: usize = 1000;

/// Source column → attribute name for the passthrough columns.
const PASSTHROUGH: &[(&str, &str)] = &[
    ("title", "title"),
    ("bathrooms", "bathrooms"),
    ("cityname", "city"),
    ("state", "state"),
    ("amenities", "amenities"),
];

#[derive(Debug, Clone, Copy)]
pub struct DatasetOptions {
    pub delimiter: u8,
    pub max_records: Option<usize>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            max_records: Some(DEFAULT_MAX_RECORDS),
        }
    }
}

/// Decode a field as UTF-8, falling back to Latin-1 byte-per-char.
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.trim().to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect::<String>().trim().to_string(),
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// `None` drops the row; unreadable counts become 0.
fn parse_bedrooms(raw: &str) -> Option<u32> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value < 0.0 => None,
        Ok(value) if value.is_finite() => Some(value.min(f64::from(u32::MAX)) as u32),
        _ => Some(0),
    }
}

struct Columns {
    id: Option<usize>,
    price: usize,
    bedrooms: usize,
    description: usize,
    passthrough: Vec<(usize, &'static str)>,
}

impl Columns {
    fn resolve(headers: &ByteRecord) -> Result<Self> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| decode_field(h).to_lowercase())
            .collect();
        let find = |name: &str| names.iter().position(|n| n == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                Error::Config(format!("dataset is missing the '{name}' column"))
            })
        };

        Ok(Self {
            id: find("id"),
            price: require("price")?,
            bedrooms: require("bedrooms")?,
            description: require("body")?,
            passthrough: PASSTHROUGH
                .iter()
                .filter_map(|(column, attr)| find(column).map(|i| (i, *attr)))
                .collect(),
        })
    }
}

/// Load and clean listings from the file at `path`.
pub fn load_listings(path: &Path, options: &DatasetOptions) -> Result<Vec<Listing>> {
    info!(path = %path.display(), "loading dataset");
    let file = std::fs::File::open(path).map_err(|e| {
        Error::Config(format!("cannot open dataset {}: {e}", path.display()))
    })?;
    read_listings(file, options)
}

/// Clean listings from any reader producing the delimited format.
pub fn read_listings<R: Read>(reader: R, options: &DatasetOptions) -> Result<Vec<Listing>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .from_reader(reader);
    let columns = Columns::resolve(reader.byte_headers()?)?;

    let cap = options.max_records.unwrap_or(usize::MAX);
    let mut listings = Vec::new();
    let mut seen = HashSet::new();
    let mut rows = 0usize;
    let mut dropped = 0usize;
    let mut record = ByteRecord::new();

    while rows < cap && reader.read_byte_record(&mut record)? {
        rows += 1;
        let field = |i: usize| record.get(i).map(decode_field).unwrap_or_default();

        let id = match columns.id.map(field) {
            Some(id) if !id.is_empty() => id,
            _ => rows.to_string(),
        };
        let Some(price) = parse_number(&field(columns.price)) else {
            dropped += 1;
            continue;
        };
        let Some(bedrooms) = parse_bedrooms(&field(columns.bedrooms)) else {
            dropped += 1;
            continue;
        };
        if !seen.insert(id.clone()) {
            warn!(id = %id, "skipping listing with repeated id");
            dropped += 1;
            continue;
        }

        let mut description = field(columns.description);
        if description.is_empty() {
            description = MISSING_DESCRIPTION.to_string();
        }

        let mut listing = Listing::new(id, price, bedrooms, description);
        for &(i, attr) in &columns.passthrough {
            let value = field(i);
            if !value.is_empty() {
                listing.attributes.insert(attr.to_string(), value);
            }
        }
        listings.push(listing);
    }

    info!(
        rows,
        kept = listings.len(),
        dropped,
        capped = rows == cap,
        "dataset cleaned"
    );
    Ok(listings)
}
