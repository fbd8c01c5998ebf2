//! On-disk dataset formats and typed (optionally sharded) dataset paths.
//!
//! Two formats are supported: CSV, and TFRecord framing around one JSON
//! example per record. A typed path reads `format:path` or `format:path@k`,
//! the latter denoting the `k` files `path-0000i-of-0000k`.

use crate::data::csv::{RawTable, read_csv_file, write_csv};
use crate::data::dataset::{Dataset, Value};
use crate::data::schema::DataSpecification;
use crate::error::{MlError, io_at};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Supported dataset file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    Csv,
    TfRecord,
}

impl DatasetFormat {
    pub fn parse(name: &str) -> Result<Self, MlError> {
        match name.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tfrecord" | "tfrecordv2" | "tfr" => Ok(Self::TfRecord),
            other => Err(MlError::config(format!("unknown dataset format \"{other}\""))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::TfRecord => "tfrecord",
        }
    }

    /// File extension, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => ".csv",
            Self::TfRecord => ".tfr",
        }
    }

    fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "csv" => Some(Self::Csv),
            "tfr" | "tfrecord" => Some(Self::TfRecord),
            _ => None,
        }
    }
}

/// A dataset location with its format, possibly split over several shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedPath {
    pub format: DatasetFormat,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_shards: Option<usize>,
}

impl TypedPath {
    pub fn new(format: DatasetFormat, path: impl Into<PathBuf>) -> Self {
        Self {
            format,
            path: path.into(),
            num_shards: None,
        }
    }

    pub fn sharded(format: DatasetFormat, path: impl Into<PathBuf>, num_shards: usize) -> Self {
        Self {
            format,
            path: path.into(),
            num_shards: Some(num_shards),
        }
    }

    /// Parse `format:path[@k]`, or a bare path typed by its extension.
    pub fn parse(text: &str) -> Result<Self, MlError> {
        let (format, rest) = match text.split_once(':') {
            Some((prefix, rest)) if DatasetFormat::parse(prefix).is_ok() => {
                (Some(DatasetFormat::parse(prefix)?), rest)
            }
            _ => (None, text),
        };
        let (path, num_shards) = match rest.rsplit_once('@') {
            Some((path, shards)) => {
                let k = shards.parse::<usize>().map_err(|_| {
                    MlError::config(format!("invalid shard count in dataset path \"{text}\""))
                })?;
                if k == 0 {
                    return Err(MlError::config(format!(
                        "dataset path \"{text}\" has zero shards"
                    )));
                }
                (PathBuf::from(path), Some(k))
            }
            None => (PathBuf::from(rest), None),
        };
        let format = match format {
            Some(f) => f,
            None => DatasetFormat::from_extension(&path).ok_or_else(|| {
                MlError::config(format!("cannot infer the format of dataset path \"{text}\""))
            })?,
        };
        Ok(Self {
            format,
            path,
            num_shards,
        })
    }

    /// The concrete files this path denotes.
    pub fn files(&self) -> Vec<PathBuf> {
        match self.num_shards {
            None => vec![self.path.clone()],
            Some(k) => (0..k).map(|i| shard_file_name(&self.path, i, k)).collect(),
        }
    }
}

impl fmt::Display for TypedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.format.name(), self.path.display())?;
        if let Some(k) = self.num_shards {
            write!(f, "@{k}")?;
        }
        Ok(())
    }
}

/// `dir/name.ext` -> `dir/name-0000i-of-0000k.ext`.
pub fn shard_file_name(base: &Path, index: usize, num_shards: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!(
            "{stem}-{index:05}-of-{num_shards:05}.{}",
            ext.to_string_lossy()
        ),
        None => format!("{stem}-{index:05}-of-{num_shards:05}"),
    };
    base.with_file_name(name)
}

/// Read every file of a typed path into one raw table.
pub fn read_raw(path: &TypedPath) -> Result<RawTable, MlError> {
    let mut table = RawTable::default();
    for file in path.files() {
        let part = match path.format {
            DatasetFormat::Csv => read_csv_file(&file)?,
            DatasetFormat::TfRecord => tfrecord::read_examples(&file)?,
        };
        table.merge(part);
    }
    tracing::debug!(path = %path, rows = table.rows.len(), "Read dataset");
    Ok(table)
}

/// Read a typed path as a dataset typed by `spec`.
pub fn read_dataset(path: &TypedPath, spec: &DataSpecification) -> Result<Dataset, MlError> {
    spec.parse_raw(&read_raw(path)?)
}

/// Write the given rows of a dataset to a single file.
pub fn write_rows(
    dataset: &Dataset,
    rows: &[usize],
    format: DatasetFormat,
    file: &Path,
) -> Result<(), MlError> {
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_at(parent, e))?;
    }
    match format {
        DatasetFormat::Csv => {
            let table = RawTable {
                header: dataset.column_names().iter().map(|s| s.to_string()).collect(),
                rows: rows
                    .iter()
                    .map(|&r| {
                        (0..dataset.columns().len())
                            .map(|c| dataset.value(r, c).to_field())
                            .collect()
                    })
                    .collect(),
            };
            let out = File::create(file).map_err(|e| io_at(file, e))?;
            write_csv(&table, BufWriter::new(out))
        }
        DatasetFormat::TfRecord => tfrecord::write_examples(dataset, rows, file),
    }
}

/// Write a whole dataset to a single file.
pub fn write_dataset(dataset: &Dataset, format: DatasetFormat, file: &Path) -> Result<(), MlError> {
    let rows: Vec<usize> = (0..dataset.nrow()).collect();
    write_rows(dataset, &rows, format, file)
}

mod tfrecord {
    //! TFRecord framing: `u64 len | u32 masked_crc(len) | payload | u32 masked_crc(payload)`.

    use super::*;

    const MASK_DELTA: u32 = 0xa282_ead8;

    /// CRC32C (Castagnoli, reflected polynomial 0x82F63B78), byte at a time.
    fn crc32c(data: &[u8]) -> u32 {
        let mut crc: u32 = 0xFFFF_FFFF;
        for &byte in data {
            crc ^= byte as u32;
            for _ in 0..8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0x82F6_3B78;
                } else {
                    crc >>= 1;
                }
            }
        }
        !crc
    }

    fn masked_crc(data: &[u8]) -> u32 {
        crc32c(data).rotate_right(15).wrapping_add(MASK_DELTA)
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Example {
        features: Vec<Feature>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Feature {
        name: String,
        #[serde(flatten)]
        value: FeatureValue,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    enum FeatureValue {
        Float(f32),
        Bytes(String),
    }

    pub(super) fn write_examples(
        dataset: &Dataset,
        rows: &[usize],
        file: &Path,
    ) -> Result<(), MlError> {
        let handle = File::create(file).map_err(|e| io_at(file, e))?;
        let mut writer = BufWriter::new(handle);
        for &row in rows {
            let features = dataset
                .columns()
                .iter()
                .enumerate()
                .filter_map(|(c, column)| {
                    let value = match dataset.value(row, c) {
                        Value::Numerical(v) => FeatureValue::Float(v),
                        Value::Categorical(s) | Value::Text(s) => FeatureValue::Bytes(s),
                        Value::Missing => return None,
                    };
                    Some(Feature {
                        name: column.name.clone(),
                        value,
                    })
                })
                .collect();
            let payload = serde_json::to_vec(&Example { features })?;
            let len = (payload.len() as u64).to_le_bytes();
            writer.write_all(&len)?;
            writer.write_all(&masked_crc(&len).to_le_bytes())?;
            writer.write_all(&payload)?;
            writer.write_all(&masked_crc(&payload).to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub(super) fn read_examples(file: &Path) -> Result<RawTable, MlError> {
        let mut bytes = Vec::new();
        File::open(file)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| io_at(file, e))?;

        let corrupted =
            |what: &str| MlError::dataset(format!("corrupted TFRecord file {}: {what}", file.display()));
        let mut table = RawTable::default();
        let mut pos = 0;
        while pos < bytes.len() {
            let header = bytes.get(pos..pos + 12).ok_or_else(|| corrupted("truncated header"))?;
            let (len_bytes, len_crc) = header.split_at(8);
            if masked_crc(len_bytes) != u32::from_le_bytes(len_crc.try_into().unwrap_or_default())
            {
                return Err(corrupted("length checksum mismatch"));
            }
            let len = u64::from_le_bytes(len_bytes.try_into().unwrap_or_default()) as usize;
            pos += 12;
            let payload = bytes
                .get(pos..pos + len)
                .ok_or_else(|| corrupted("truncated payload"))?;
            let crc = bytes
                .get(pos + len..pos + len + 4)
                .ok_or_else(|| corrupted("truncated payload checksum"))?;
            if masked_crc(payload) != u32::from_le_bytes(crc.try_into().unwrap_or_default()) {
                return Err(corrupted("payload checksum mismatch"));
            }
            pos += len + 4;

            let example: Example = serde_json::from_slice(payload)?;
            let mut row = RawTable {
                header: Vec::with_capacity(example.features.len()),
                rows: vec![Vec::with_capacity(example.features.len())],
            };
            for feature in example.features {
                row.header.push(feature.name);
                row.rows[0].push(match feature.value {
                    FeatureValue::Float(v) => v.to_string(),
                    FeatureValue::Bytes(s) => s,
                });
            }
            table.merge(row);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::toy_dataset;
    use crate::data::dataset::{Column, ColumnData};
    use crate::data::schema::DataSpecification;
    use tempfile::TempDir;

    #[test]
    fn test_typed_path_parse_and_display() {
        let p = TypedPath::parse("tfrecord:/tmp/ds/train.tfr@3").unwrap();
        assert_eq!(p.format, DatasetFormat::TfRecord);
        assert_eq!(p.num_shards, Some(3));
        assert_eq!(p.to_string(), "tfrecord:/tmp/ds/train.tfr@3");
        assert_eq!(
            p.files()[1],
            PathBuf::from("/tmp/ds/train-00001-of-00003.tfr")
        );

        let bare = TypedPath::parse("/data/adult.csv").unwrap();
        assert_eq!(bare.format, DatasetFormat::Csv);
        assert_eq!(bare.files(), vec![PathBuf::from("/data/adult.csv")]);

        assert!(TypedPath::parse("/data/unknown.bin").is_err());
        assert!(TypedPath::parse("csv:/data/x.csv@0").is_err());
    }

    #[test]
    fn test_csv_write_read() {
        let dir = TempDir::new().unwrap();
        let ds = toy_dataset();
        let spec = DataSpecification::from_dataset(&ds);
        let file = dir.path().join("toy.csv");
        write_dataset(&ds, DatasetFormat::Csv, &file).unwrap();
        let back = read_dataset(&TypedPath::new(DatasetFormat::Csv, &file), &spec).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn test_csv_keeps_multiline_and_padded_values() {
        let dir = TempDir::new().unwrap();
        let ds = Dataset::new(vec![
            Column::new(
                "id",
                ColumnData::Numerical(vec![Some(1.0), Some(2.0), Some(3.0)]),
            ),
            Column::new(
                "notes",
                ColumnData::Text(vec![
                    Some("line one\nline two".to_string()),
                    Some("  padded ".to_string()),
                    None,
                ]),
            ),
            Column::new(
                "color",
                ColumnData::Categorical(vec![
                    Some(" red".to_string()),
                    Some("blue ".to_string()),
                    Some("say \"hi\", twice".to_string()),
                ]),
            ),
        ])
        .unwrap();
        let spec = DataSpecification::from_dataset(&ds);
        let file = dir.path().join("text.csv");
        write_dataset(&ds, DatasetFormat::Csv, &file).unwrap();
        let back = read_dataset(&TypedPath::new(DatasetFormat::Csv, &file), &spec).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn test_csv_and_in_memory_shards_agree() {
        let dir = TempDir::new().unwrap();
        let ds = Dataset::new(vec![Column::new(
            "notes",
            ColumnData::Text(
                (0..6)
                    .map(|i| Some(format!(" row {i}\nsecond line ")))
                    .collect(),
            ),
        )])
        .unwrap();
        let spec = DataSpecification::from_dataset(&ds);
        let path =
            crate::data::shard::shard_dataset(&ds, 2, 1.0, DatasetFormat::Csv, "n", dir.path())
                .unwrap();
        let back = read_dataset(&path, &spec).unwrap();
        let ColumnData::Text(values) = &back.column("notes").unwrap().data else {
            panic!("notes should stay a text column");
        };
        let mut back: Vec<String> = values.iter().flatten().cloned().collect();
        back.sort();
        let expected: Vec<String> = (0..6).map(|i| format!(" row {i}\nsecond line ")).collect();
        assert_eq!(back, expected);
    }

    #[test]
    fn test_tfrecord_write_read() {
        let dir = TempDir::new().unwrap();
        let ds = toy_dataset();
        let spec = DataSpecification::from_dataset(&ds);
        let file = dir.path().join("toy.tfr");
        write_dataset(&ds, DatasetFormat::TfRecord, &file).unwrap();
        let back = read_dataset(&TypedPath::new(DatasetFormat::TfRecord, &file), &spec).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn test_tfrecord_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let ds = toy_dataset();
        let file = dir.path().join("toy.tfr");
        write_dataset(&ds, DatasetFormat::TfRecord, &file).unwrap();
        let mut bytes = std::fs::read(&file).unwrap();
        bytes[14] ^= 0xff;
        std::fs::write(&file, bytes).unwrap();
        let err = read_raw(&TypedPath::new(DatasetFormat::TfRecord, &file)).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }
}
