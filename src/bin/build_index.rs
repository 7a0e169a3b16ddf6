use std::fs;
use std::time::Instant;

use clap::Parser;
use indicatif::ProgressBar;
use rii::{EngineConfig, OpqQuantizer, PqCodec, ProductQuantizer, RiiIndex, SpaceUsage};

/// Builds a `rii` index from a flat row-major `f32` vector file and runs a
/// handful of demo self-queries against it.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to a flat row-major f32 binary file of shape N x D.
    #[clap(short, long, value_parser)]
    input_file: String,

    /// Path the trained index snapshot is written to.
    #[clap(short, long, value_parser)]
    output_file: String,

    /// Number of vectors N in the input file.
    #[clap(short, long, value_parser)]
    n: usize,

    /// Vector dimensionality D.
    #[clap(short, long, value_parser)]
    d: usize,

    /// Number of PQ sub-quantizers.
    #[clap(short, long, value_parser)]
    #[arg(default_value_t = 8)]
    m: usize,

    /// Codebook size per sub-quantizer.
    #[clap(short, long, value_parser)]
    #[arg(default_value_t = 256)]
    ks: usize,

    /// Number of coarse (inverted-file) centers. 0 skips configure().
    #[clap(long, value_parser)]
    #[arg(default_value_t = 100)]
    nlist: usize,

    /// Train OPQ (rotation + PQ) instead of plain PQ.
    #[clap(long, value_parser)]
    #[arg(default_value_t = false)]
    opq: bool,

    /// Number of demo self-queries to run after building.
    #[clap(long, value_parser)]
    #[arg(default_value_t = 5)]
    demo_queries: usize,
}

fn read_vectors(path: &str, n: usize, d: usize) -> Vec<f32> {
    let bytes = fs::read(path).expect("failed to read input file");
    assert_eq!(bytes.len(), n * d * 4, "input file size does not match n * d * sizeof(f32)");
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let vectors = read_vectors(&args.input_file, args.n, args.d);
    log::info!("loaded {} vectors of dimension {}", args.n, args.d);

    let ds = args.d / args.m;
    let time = Instant::now();

    if args.opq {
        let codec = OpqQuantizer::train(&vectors, args.n, args.m, args.ks, ds, 123, 20, 3).expect("codec training failed");
        run(codec, &vectors, &args, time);
    } else {
        let codec = ProductQuantizer::train(&vectors, args.n, args.m, args.ks, ds, 123, 20).expect("codec training failed");
        run(codec, &vectors, &args, time);
    }
}

fn run<C: PqCodec>(codec: C, vectors: &[f32], args: &Args, time: Instant) {
    let mut index = RiiIndex::with_config(codec, EngineConfig::default());

    if args.nlist > 0 {
        index.append_and_configure(vectors, args.n, args.nlist).expect("append_and_configure failed");
    } else {
        index.append(vectors, args.n, false).expect("append failed");
    }

    println!("Time to build: {:.2}s", time.elapsed().as_secs_f64());
    println!("N = {}, nlist = {}, space usage = {:.2} MiB", index.n(), index.nlist(), index.space_usage_mb());

    let n_demo = args.demo_queries.min(args.n);
    let progress = ProgressBar::new(n_demo as u64);
    for i in 0..n_demo {
        let d = index.d();
        let q = &vectors[i * d..(i + 1) * d];
        let (ids, dists) = index.query(q, 10, &[], None).expect("query failed");
        println!("query {i}: top-1 id={} dist={:.4}", ids[0], dists[0]);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let snapshot = index.snapshot().expect("snapshot failed");
    fs::write(&args.output_file, &snapshot).expect("failed to write snapshot");
    println!("Saved snapshot to {} ({} bytes)", args.output_file, snapshot.len());
}
