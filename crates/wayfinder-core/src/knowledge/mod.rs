//! Knowledge corpus: raw place records, where they come from, and the
//! embedded index the retriever scores against.

mod entry;
mod index;
mod source;

pub use entry::{content_text, relation_text, stable_id, KnowledgeEntry, Location, PlaceRecord};
pub use index::{CorpusIndex, CorpusSnapshot};
pub use source::{CorpusSource, JsonFileCorpus, SledCorpus, StaticCorpus};
