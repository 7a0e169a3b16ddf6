//! Byte-level dump/restore of the full core state. Uses the teacher's own
//! serialization stack (`bincode::serialize(&inverted_index)` in
//! `build_inverted_index.rs`), wrapped in an explicit header so
//! `CorruptSnapshot` is raised on magic/version/shape mismatches before
//! bincode even sees the body.
//!
//! The fitted codec itself is the one external-collaborator boundary this
//! crate does not serialize (codebook training/persistence is out of this
//! core's scope, per `SPEC_FULL.md` §1); `restore` takes the codec back as
//! an argument, the same way `construct` does, and cross-checks its shape
//! against the header.

use serde::{Deserialize, Serialize};

use crate::codec::{Code, PqCodec};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

const MAGIC: [u8; 8] = *b"RIISNAP1";
const VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    magic: [u8; 8],
    version: u32,
    m: usize,
    ks: usize,
    d: usize,
    n: usize,
    nlist: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Body {
    header: Header,
    threshold: Option<f64>,
    codes: Vec<Code>,
    coarse_centers: Vec<Code>,
    posting_lists: Vec<Vec<i64>>,
    config: EngineConfig,
}

#[allow(clippy::too_many_arguments)]
pub fn dump(
    m: usize,
    ks: usize,
    d: usize,
    n: usize,
    nlist: usize,
    threshold: Option<f64>,
    codes: Vec<Code>,
    coarse_centers: Vec<Code>,
    posting_lists: Vec<Vec<i64>>,
    config: EngineConfig,
) -> Result<Vec<u8>> {
    let body = Body {
        header: Header { magic: MAGIC, version: VERSION, m, ks, d, n, nlist },
        threshold,
        codes,
        coarse_centers,
        posting_lists,
        config,
    };
    bincode::serialize(&body).map_err(EngineError::from)
}

pub struct RestoredState {
    pub n: usize,
    pub nlist: usize,
    pub threshold: Option<f64>,
    pub codes: Vec<Code>,
    pub coarse_centers: Vec<Code>,
    pub posting_lists: Vec<Vec<i64>>,
    pub config: EngineConfig,
}

pub fn restore(bytes: &[u8], codec: &dyn PqCodec) -> Result<RestoredState> {
    let body: Body = bincode::deserialize(bytes)?;

    if body.header.magic != MAGIC {
        return Err(EngineError::CorruptSnapshot("bad magic bytes".into()));
    }
    if body.header.version != VERSION {
        return Err(EngineError::CorruptSnapshot(format!(
            "unsupported snapshot version {}",
            body.header.version
        )));
    }
    if body.header.m != codec.m() || body.header.ks != codec.ks() || body.header.d != codec.d() {
        return Err(EngineError::CorruptSnapshot(
            "snapshot codec shape does not match the supplied codec".into(),
        ));
    }
    if body.codes.len() != body.header.n * body.header.m {
        return Err(EngineError::CorruptSnapshot("codes length inconsistent with header".into()));
    }
    if body.coarse_centers.len() != body.header.nlist * body.header.m {
        return Err(EngineError::CorruptSnapshot(
            "coarse centers length inconsistent with header".into(),
        ));
    }
    if body.posting_lists.len() != body.header.nlist {
        return Err(EngineError::CorruptSnapshot(
            "posting list count inconsistent with header".into(),
        ));
    }

    Ok(RestoredState {
        n: body.header.n,
        nlist: body.header.nlist,
        threshold: body.threshold,
        codes: body.codes,
        coarse_centers: body.coarse_centers,
        posting_lists: body.posting_lists,
        config: body.config,
    })
}
