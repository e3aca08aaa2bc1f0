use std::{fs::File, io, path::Path};
use thiserror::Error;

use super::{SampleSet, SampleSetError};

/// Column of a delimited file holding the class index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassColumn {
    First,
    Last,
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvOptions {
    pub class_column: ClassColumn,
    pub has_headers: bool,
    pub delimiter: u8,
    /// Number of classes. Defaults to the biggest class index found plus one;
    /// validation data should reuse the training data's count.
    pub class_count: Option<usize>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            class_column: ClassColumn::Last,
            has_headers: false,
            delimiter: b',',
            class_count: None,
        }
    }
}

/// Reads a sample set from a delimited file.
/// Every column except the class column is an input feature.
pub fn load_csv<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<SampleSet, LoadError> {
    read_csv(File::open(path)?, options)
}

/// Same as `load_csv`, reading from any source.
///
/// # Examples
/// ```
/// # use rpclassifier::samples::{read_csv, CsvOptions};
/// let data = "0.5,1.5,1\n2.0,0.1,0\n";
/// let set = read_csv(data.as_bytes(), &CsvOptions::default()).unwrap();
/// assert_eq!(set.inputs()[1], vec![2.0, 0.1]);
/// assert_eq!(set.actual_classes(), &[1, 0]);
/// ```
pub fn read_csv<R: io::Read>(reader: R, options: &CsvOptions) -> Result<SampleSet, LoadError> {
    let mut inputs = Vec::new();
    let mut labels = Vec::new();

    for (line, fields) in records(reader, options.has_headers, options.delimiter)? {
        if fields.len() < 2 {
            return Err(LoadError::TooFewColumns {
                line,
                got: fields.len(),
            });
        }
        let class_column = match options.class_column {
            ClassColumn::First => 0,
            ClassColumn::Last => fields.len() - 1,
            ClassColumn::Index(column) if column < fields.len() => column,
            ClassColumn::Index(column) => {
                return Err(LoadError::NoClassColumn {
                    line,
                    column,
                    got: fields.len(),
                })
            }
        };

        let label = &fields[class_column];
        labels.push(label.parse::<usize>().map_err(|_| LoadError::BadLabel {
            line,
            value: label.clone(),
        })?);

        let mut sample = Vec::with_capacity(fields.len() - 1);
        for (column, field) in fields.iter().enumerate() {
            if column != class_column {
                sample.push(parse_number(line, column, field)?);
            }
        }
        inputs.push(sample);
    }

    let class_count = match options.class_count {
        Some(count) => count,
        None => match labels.iter().max() {
            Some(&max) => max + 1,
            None => return Err(SampleSetError::EmptySampleSet.into()),
        },
    };

    Ok(SampleSet::from_labels(inputs, &labels, class_count)?)
}

/// Reads feature vectors from a delimited file with no class column.
pub fn load_features<P: AsRef<Path>>(
    path: P,
    has_headers: bool,
    delimiter: u8,
) -> Result<Vec<Vec<f64>>, LoadError> {
    records(File::open(path)?, has_headers, delimiter)?
        .map(|(line, fields)| -> Result<Vec<f64>, LoadError> {
            fields
                .iter()
                .enumerate()
                .map(|(column, field)| parse_number(line, column, field))
                .collect()
        })
        .collect()
}

/// Parses every record into trimmed fields, paired with its line number.
fn records<R: io::Read>(
    reader: R,
    has_headers: bool,
    delimiter: u8,
) -> Result<impl Iterator<Item = (u64, Vec<String>)>, LoadError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .delimiter(delimiter)
        .trim(::csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        rows.push((line, record.iter().map(str::to_owned).collect()));
    }
    Ok(rows.into_iter())
}

fn parse_number(line: u64, column: usize, field: &str) -> Result<f64, LoadError> {
    field.parse::<f64>().map_err(|_| LoadError::BadNumber {
        line,
        column,
        value: field.to_owned(),
    })
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to open data file: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed CSV: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("Line {line}: expected a class column and at least one feature, but got {got} column(s)!")]
    TooFewColumns { line: u64, got: usize },
    #[error("Line {line}: class column {column} is out of {got} column(s)!")]
    NoClassColumn { line: u64, column: usize, got: usize },
    #[error("Line {line}, column {column}: {value:?} is not a number!")]
    BadNumber {
        line: u64,
        column: usize,
        value: String,
    },
    #[error("Line {line}: {value:?} is not a class index!")]
    BadLabel { line: u64, value: String },
    #[error(transparent)]
    Samples(#[from] SampleSetError),
}
