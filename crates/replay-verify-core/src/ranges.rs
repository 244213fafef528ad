//! Version ranges and the per-environment range tables.
//!
//! Each environment's history is pre-split into contiguous runner ranges so
//! that separate jobs can verify disjoint slices. The last entry is open-ended
//! and is resolved against the backup's latest version at runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};

/// Resolved half-open version range `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub start: u64,
    pub end: u64,
}

impl VersionRange {
    /// Build a range, rejecting empty or inverted bounds.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start >= end {
            return Err(VerifyError::config(format!(
                "invalid version range: start {} must be below end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of versions covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// One entry of a range table. `end == None` means "extends to the current
/// tip of the backup".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl TableRange {
    pub const fn bounded(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub const fn open(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Ordered runner ranges for one environment.
pub type RangeTable = &'static [TableRange];

const TESTNET_RANGES: &[TableRange] = &[
    TableRange::bounded(1032373939, 1048163412),
    TableRange::bounded(1048163412, 1063952885),
    TableRange::bounded(1063952885, 1079742358),
    TableRange::bounded(1079742358, 1095531831),
    TableRange::bounded(1095531831, 1111321304),
    TableRange::bounded(1111321304, 1127110777),
    TableRange::bounded(1127110777, 1142900250),
    TableRange::bounded(1142900250, 1158689723),
    TableRange::bounded(1158689723, 1174479196),
    TableRange::bounded(1174479196, 1190268669),
    TableRange::bounded(1190268669, 1206058142),
    TableRange::bounded(1206058142, 1221847615),
    TableRange::bounded(1221847615, 1237637088),
    TableRange::bounded(1237637088, 1253426561),
    TableRange::bounded(1253426561, 1269216034),
    TableRange::bounded(1269216034, 1285005507),
    TableRange::bounded(1285005507, 1300794980),
    TableRange::bounded(1300794980, 1316584453),
    TableRange::open(1316584453),
];

const MAINNET_RANGES: &[TableRange] = &[
    TableRange::bounded(676365253, 692154726),
    TableRange::bounded(692154726, 707944199),
    TableRange::bounded(707944199, 723733672),
    TableRange::bounded(723733672, 739523145),
    TableRange::bounded(739523145, 755312618),
    TableRange::bounded(755312618, 771102091),
    TableRange::bounded(771102091, 786891564),
    TableRange::bounded(786891564, 802681037),
    TableRange::bounded(802681037, 818470510),
    TableRange::bounded(818470510, 834259983),
    TableRange::bounded(834259983, 850049456),
    TableRange::bounded(850049456, 865838929),
    TableRange::bounded(865838929, 881628402),
    TableRange::bounded(881628402, 897417875),
    TableRange::bounded(897417875, 913207348),
    TableRange::bounded(913207348, 928996821),
    TableRange::bounded(928996821, 944786294),
    TableRange::bounded(944786294, 960575767),
    TableRange::open(960575767),
];

/// Network whose backup is being verified.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Testnet,
    Mainnet,
}

impl Environment {
    /// All supported environments.
    pub const ALL: [Environment; 2] = [Environment::Testnet, Environment::Mainnet];

    pub fn name(&self) -> &'static str {
        match self {
            Environment::Testnet => "testnet",
            Environment::Mainnet => "mainnet",
        }
    }

    /// Pick the environment from a backup bucket name. Buckets mentioning
    /// `testnet` are testnet; everything else is mainnet.
    pub fn from_bucket(bucket: &str) -> Self {
        if bucket.contains("testnet") {
            Environment::Testnet
        } else {
            Environment::Mainnet
        }
    }

    /// The runner range table for this environment.
    pub fn range_table(&self) -> RangeTable {
        match self {
            Environment::Testnet => TESTNET_RANGES,
            Environment::Mainnet => MAINNET_RANGES,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Environment {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "testnet" => Ok(Environment::Testnet),
            "mainnet" => Ok(Environment::Mainnet),
            other => Err(VerifyError::config(format!("unknown environment: {}", other))),
        }
    }
}

/// Check that a table is non-empty, contiguous, and open only at its end.
pub fn check_table(table: &[TableRange]) -> Result<()> {
    let last = table
        .last()
        .ok_or_else(|| VerifyError::config("range table is empty"))?;
    if !last.is_open() {
        return Err(VerifyError::config("range table must end with an open range"));
    }
    for pair in table.windows(2) {
        match pair[0].end {
            Some(end) if end == pair[1].start && pair[0].start < end => {}
            Some(end) => {
                return Err(VerifyError::config(format!(
                    "range table gap or overlap at {} -> {}",
                    end, pair[1].start
                )))
            }
            None => return Err(VerifyError::config("open range before end of table")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tables_contiguous() {
        for env in Environment::ALL {
            let table = env.range_table();
            check_table(table).expect("table must be well formed");
            for i in 0..table.len() - 1 {
                assert_eq!(table[i].end, Some(table[i + 1].start), "{env} entry {i}");
            }
            assert!(table.last().unwrap().is_open());
        }
    }

    #[test]
    fn test_check_table_rejects_gap() {
        let table = [TableRange::bounded(0, 10), TableRange::open(11)];
        assert!(check_table(&table).unwrap_err().is_config());
    }

    #[test]
    fn test_check_table_rejects_closed_tail() {
        let table = [TableRange::bounded(0, 10), TableRange::bounded(10, 20)];
        assert!(check_table(&table).is_err());
        assert!(check_table(&[]).is_err());
    }

    #[test]
    fn test_environment_from_bucket() {
        assert_eq!(
            Environment::from_bucket("aptos-testnet-backup"),
            Environment::Testnet
        );
        assert_eq!(
            Environment::from_bucket("aptos-mainnet-backup-2"),
            Environment::Mainnet
        );
        assert_eq!(Environment::from_bucket("anything"), Environment::Mainnet);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("Testnet".parse::<Environment>().unwrap(), Environment::Testnet);
        assert_eq!("mainnet".parse::<Environment>().unwrap(), Environment::Mainnet);
        assert!("devnet".parse::<Environment>().is_err());
    }

    #[test]
    fn test_version_range_new() {
        let r = VersionRange::new(10, 20).unwrap();
        assert_eq!(r.len(), 10);
        assert_eq!(r.to_string(), "[10, 20)");
        assert!(VersionRange::new(20, 20).is_err());
        assert!(VersionRange::new(21, 20).is_err());
    }
}
