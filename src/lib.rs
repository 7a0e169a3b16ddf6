//! `rii`: a reconfigurable inverted-index approximate nearest neighbor search
//! engine over product-quantized vectors.
//!
//! Every item is encoded once, by a fitted [`codec::PqCodec`], into a short
//! code; an exhaustive linear scanner and a coarse-pruned inverted-file (IVF)
//! scanner both search directly over those codes via precomputed asymmetric
//! distance tables, and a [`planner::Planner`] auto-calibrates which scanner
//! to use for a given query. The coarse structure is entirely reconfigurable:
//! `configure` can be called again at any time to re-cluster with a new
//! `nlist`, without touching the codec or the underlying codes.

pub mod coarse;
pub mod code_store;
pub mod codec;
pub mod config;
pub mod distances;
pub mod engine;
pub mod error;
pub mod inverted_index;
pub mod linalg;
pub mod planner;
pub mod scan;
pub mod snapshot;
pub mod space_usage;
pub mod topk_selectors;

pub use codec::{Code, OpqQuantizer, PqCodec, ProductQuantizer};
pub use config::EngineConfig;
pub use engine::RiiIndex;
pub use error::{EngineError, Result};
pub use space_usage::SpaceUsage;
