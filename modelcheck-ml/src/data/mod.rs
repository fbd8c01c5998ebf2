//! Dataset building: typed tables, specifications, formats, partitioning,
//! sharding, weight emulation and synthetic generation.

pub mod csv;
pub mod dataset;
pub mod format;
pub mod schema;
pub mod shard;
pub mod split;
pub mod synthetic;
pub mod weights;

pub use dataset::{Column, ColumnData, ColumnType, Dataset, Value};
pub use format::{DatasetFormat, TypedPath, read_dataset, read_raw, write_dataset};
pub use schema::{ColumnGuide, ColumnSpec, DataSpecification, DataSpecificationGuide};
pub use shard::shard_dataset;
pub use split::{SplitIndices, sample_indices, split_indices};
pub use synthetic::{SyntheticDatasetOptions, SyntheticTask};
pub use weights::emulate_weights_by_duplication;
