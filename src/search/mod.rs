pub mod bm25;
pub mod expansion;
pub mod filter;
pub mod fusion;
pub mod hybrid;
pub mod tokenizer;

pub use bm25::{Bm25Index, LexicalIndex};
pub use expansion::expand_query;
pub use filter::MetadataFilter;
pub use fusion::{RrfFusion, RRF_K};
pub use hybrid::HybridSearch;
pub use tokenizer::tokenize;
