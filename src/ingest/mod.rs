//! Record ingestion: mapping, batching, bounded insertion and CSV loading

pub mod chunker;
pub mod inserter;
pub mod loader;
pub mod mapper;
pub mod record;

pub use chunker::{batch_count, batches, Batches};
pub use inserter::{BatchFailure, BoundedInserter, InsertReport};
pub use loader::{format_file_size, list_data_files, CsvLoader, DataFile, FileLoad, LoadReport};
pub use mapper::{map_kind, map_record};
pub use record::{
    Assessment, CollectionKind, Course, RawRecord, StudentAssessment, StudentInfo,
    StudentRegistration, StudentVleInteraction, TypedRecord, VleSite,
};
