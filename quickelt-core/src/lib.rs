//! # QuickELT Core
//!
//! Library behind the `quickelt` command: sources, the ingestion orchestrator,
//! metadata sidecars, the bilingual logger, quality gates, the silver cleaning
//! template and a read-only catalog over the bronze/silver/gold tiers.

pub mod catalog;
pub mod cleaning;
pub mod columnar;
pub mod config;
pub mod contract;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod notify;
pub mod persistence;
pub mod quality;
pub mod retry;
pub mod schema;
pub mod silver;
pub mod source;
pub mod table;

// Re-export commonly used types at the crate root.
pub use catalog::{Catalog, CatalogEntry, CatalogIssue};
pub use cleaning::{CleaningConfig, CleaningPass, CleaningReport, clean};
pub use columnar::{FileFormat, OutputFormat};
pub use config::{PipelineConfig, load_config};
pub use contract::DataContract;
pub use error::{ErrorKind, PipelineError, Result};
pub use ingest::{IngestOutcome, IngestRequest, Ingestor};
pub use logging::{Bilingual, Language, LogLevel, Logger};
pub use metadata::{MetadataRecord, MetadataWriter};
pub use naming::{NamingKey, StorageLayout, Tier};
pub use quality::{QualityGate, QualityReport};
pub use retry::RetryPolicy;
pub use silver::{SilverOutcome, SilverRunner};
pub use source::{SourceDescriptor, SourceInfo, SourceReader};
pub use table::DataTable;
