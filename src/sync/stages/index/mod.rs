pub mod ingest;
pub mod revert;
pub mod serializer;
pub mod stage;

pub use serializer::Serializer;
pub use stage::Exporter;
