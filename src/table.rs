use crate::err::*;
use crate::models::*;
use csv::{ReaderBuilder, StringRecord, Trim};
use heck::ToSnakeCase;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;

lazy_static! {
    /// A five digit zip with an optional plus-four.
    static ref RE_ZIP: Regex = Regex::new(r"^\d{5}(-\d{4})?$").unwrap();
}

/// Required columns as named in the input sheet, with accepted spellings.
const COLUMNS: [(&str, &[&str]); 5] = [
    ("Adressee", &["adressee", "addressee"]),
    ("Address", &["address"]),
    ("City", &["city"]),
    ("State", &["state"]),
    ("Zip", &["zip"]),
];

/// Records read from the input table, keyed by 1-based row number.
#[derive(Debug, Default)]
pub struct Table {
    pub records: Vec<(usize, AddressRecord)>,
    pub skipped: Vec<Failure>,
}

impl Table {
    pub fn load(path: &Path, policy: RowPolicy) -> Result<Table> {
        info!("Reading file: {}", path.display());
        Table::from_reader(File::open(path)?, policy)
    }

    pub fn from_reader<R: Read>(rdr: R, policy: RowPolicy) -> Result<Table> {
        let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(rdr);
        let idxs = column_indexes(rdr.headers()?)?;
        let mut tbl = Table::default();

        for (idx, res) in rdr.records().enumerate() {
            let row = idx + 1;
            let adr = res
                .map_err(|err| err.to_string())
                .and_then(|rec| parse_row(&rec, &idxs));
            match adr {
                Ok(adr) => tbl.records.push((row, adr)),
                Err(reason) => match policy {
                    RowPolicy::Halt => return Err(Error::MalformedRow { row, reason }),
                    RowPolicy::Skip => {
                        warn!("skipping row {row}: {reason}");
                        tbl.skipped.push(Failure { row, reason });
                    }
                },
            }
        }

        info!("{} address records", tbl.records.len());
        Ok(tbl)
    }
}

/// Finds the position of each required column.
fn column_indexes(hdrs: &StringRecord) -> Result<[usize; 5]> {
    let keys: Vec<String> = hdrs.iter().map(|h| h.to_snake_case()).collect();
    let mut idxs = [0usize; 5];
    for (slot, (name, accepted)) in idxs.iter_mut().zip(COLUMNS) {
        *slot = keys
            .iter()
            .position(|k| accepted.contains(&k.as_str()))
            .ok_or_else(|| Error::MissingColumn(name.into()))?;
    }
    Ok(idxs)
}

fn parse_row(rec: &StringRecord, idxs: &[usize; 5]) -> std::result::Result<AddressRecord, String> {
    let mut vals = Vec::with_capacity(5);
    for (idx, (name, _)) in idxs.iter().zip(COLUMNS) {
        let val = rec.get(*idx).unwrap_or_default();
        if val.is_empty() {
            return Err(format!("{name} is empty"));
        }
        vals.push(val.to_string());
    }
    let zip = normalize_zip(&vals[4]);
    if !RE_ZIP.is_match(&zip) {
        return Err(format!("invalid zip {:?}", vals[4]));
    }

    Ok(AddressRecord {
        addressee: vals[0].clone(),
        address: vals[1].clone(),
        city: vals[2].clone(),
        state: vals[3].clone(),
        zip,
    })
}

/// Undoes spreadsheet damage to zip codes: a trailing ".0" and stripped
/// leading zeros.
pub fn normalize_zip(zip: &str) -> String {
    let zip = zip.strip_suffix(".0").unwrap_or(zip);
    if (3..5).contains(&zip.len()) && zip.chars().all(|c| c.is_ascii_digit()) {
        return format!("{zip:0>5}");
    }
    zip.to_string()
}
