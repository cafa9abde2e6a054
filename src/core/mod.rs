pub mod column_filter;
pub mod etl;
pub mod fetch;
pub mod fhir;
pub mod flatten;
pub mod items;
pub mod merge;
pub mod normalize;
pub mod path_extract;
#[cfg(feature = "parquet")]
pub mod snapshot;
pub mod table_io;

pub use crate::domain::model::{ColumnTable, FlatRow, StageResult};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
