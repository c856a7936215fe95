//! Measurement data and the data file format.
//!
//! A data file is a sequence of data sets. Each set starts with a header line
//! and is followed by one `x y` pair per line:
//!
//! ```text
//!
//! # 1541000000; CircularTrampolineSheet{r1: 1.65, ...}
//! -0.2 13.91
//! -0.4 28.07
//! ```
//!
//! `x` is the height of the sheet centre and `y` the force pulling it back.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::DataError;

/// Float key ordered by [`f32::total_cmp`].
#[derive(Debug, Clone, Copy)]
struct Key(f32);

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Samples grouped by x.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatData {
    values: BTreeMap<Key, Vec<f32>>,
}

impl FloatData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `ys` to the samples at `x`.
    pub fn add(&mut self, x: f32, ys: &[f32]) {
        self.values.entry(Key(x)).or_default().extend_from_slice(ys);
    }

    /// Replaces the samples at `x` with `ys`.
    pub fn overwrite(&mut self, x: f32, ys: &[f32]) {
        self.values.insert(Key(x), ys.to_vec());
    }

    pub fn get(&self, x: f32) -> Option<&[f32]> {
        self.values.get(&Key(x)).map(Vec::as_slice)
    }

    /// Sorted x values and the mean of the samples at each. An x without
    /// samples is left out.
    pub fn averaged_lists(&self) -> (Vec<f32>, Vec<f32>) {
        self.values
            .iter()
            .filter(|(_, ys)| !ys.is_empty())
            .map(|(x, ys)| (x.0, ys.iter().sum::<f32>() / ys.len() as f32))
            .unzip()
    }

    /// Number of distinct x values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// One data set read back from a data file.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Header text after the `#`, trimmed.
    pub header: String,
    pub xs: Vec<f32>,
    pub ys: Vec<f32>,
}

impl DataSet {
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Least-squares slope of y over x, if x varies.
    pub fn slope(&self) -> Option<f32> {
        let n = self.len() as f64;
        if self.len() < 2 {
            return None;
        }
        let mean_x = self.xs.iter().map(|&x| x as f64).sum::<f64>() / n;
        let mean_y = self.ys.iter().map(|&y| y as f64).sum::<f64>() / n;
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (&x, &y) in self.xs.iter().zip(&self.ys) {
            let dx = x as f64 - mean_x;
            sxy += dx * (y as f64 - mean_y);
            sxx += dx * dx;
        }
        (sxx > 0.0).then(|| (sxy / sxx) as f32)
    }
}

/// Rounds `value` to `places` decimal places.
pub fn rounded(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Appends `data` as a new data set to the file at `path`, creating the file
/// and its parent directories if needed.
pub fn append_data_set(path: &Path, header: &str, data: &FloatData) -> Result<(), DataError> {
    let io_error = |source| DataError::Io { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut text = format!("\n# {}; {}", timestamp, header);
    let (xs, ys) = data.averaged_lists();
    for (x, y) in xs.iter().zip(&ys) {
        text.push_str(&format!("\n{} {}", x, y));
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)?;
    file.write_all(text.as_bytes()).map_err(io_error)?;

    log::info!("Wrote {} data points to {}", xs.len(), path.display());
    Ok(())
}

/// Parses data file text. Empty sets are dropped.
pub fn parse_data_sets(text: &str) -> Result<Vec<DataSet>, DataError> {
    let mut sets: Vec<DataSet> = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            sets.push(DataSet {
                header: header.trim().to_string(),
                xs: Vec::new(),
                ys: Vec::new(),
            });
            continue;
        }

        let parse_error = || DataError::Parse {
            line: number + 1,
            content: line.to_string(),
        };
        let mut words = line.split_whitespace();
        let (Some(x), Some(y), None) = (words.next(), words.next(), words.next()) else {
            return Err(parse_error());
        };
        let x: f32 = x.parse().map_err(|_| parse_error())?;
        let y: f32 = y.parse().map_err(|_| parse_error())?;

        // Pairs before the first header form an unnamed set
        if sets.is_empty() {
            sets.push(DataSet { header: String::new(), xs: Vec::new(), ys: Vec::new() });
        }
        if let Some(set) = sets.last_mut() {
            set.xs.push(x);
            set.ys.push(y);
        }
    }

    sets.retain(|set| !set.is_empty());
    Ok(sets)
}

/// Reads every data set of the file at `path`.
pub fn read_data_sets(path: &Path) -> Result<Vec<DataSet>, DataError> {
    let text = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_data_sets(&text)
}
