use std::time::Instant;

use clap::{Parser, ValueEnum};
use sortline::{
    sim::{self, AlgorithmKind, InputKind, SimConfig},
    transport::DEFAULT_BASE_PORT,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "distributed sorting on a line of TCP-linked nodes")]
struct Args {
    /// Number of nodes in the line (1..=7000).
    #[arg(long, default_value_t = 10)]
    node_count: usize,
    #[arg(long, value_enum, default_value_t = InputArg::Random)]
    input_type: InputArg,
    #[arg(long, value_enum, default_value_t = AlgorithmArg::OddEven)]
    algorithm: AlgorithmArg,
    /// Node i listens on base_port + i, loopback only.
    #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,
    #[arg(long)]
    debug: bool,
    #[arg(long)]
    benchmark: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputArg {
    Random,
    Sorted,
    Reverse,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    #[value(name = "oddeven")]
    OddEven,
    Sasaki,
    Alternative,
}

impl From<InputArg> for InputKind {
    fn from(input: InputArg) -> Self {
        match input {
            InputArg::Random => Self::Random,
            InputArg::Sorted => Self::Sorted,
            InputArg::Reverse => Self::Reverse,
        }
    }
}

impl From<AlgorithmArg> for AlgorithmKind {
    fn from(algorithm: AlgorithmArg) -> Self {
        match algorithm {
            AlgorithmArg::OddEven => Self::OddEven,
            AlgorithmArg::Sasaki => Self::Sasaki,
            AlgorithmArg::Alternative => Self::Alternative,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_filter = if args.debug {
        "sortline=debug"
    } else {
        "sortline=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = SimConfig {
        node_count: args.node_count,
        input: args.input_type.into(),
        base_port: args.base_port,
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let start = Instant::now();
    let outcome = runtime.block_on(sim::run(args.algorithm.into(), config))?;
    let elapsed = start.elapsed();

    if args.node_count <= 100 {
        println!("initial: {:?}", outcome.initial);
        println!("final:   {:?}", outcome.sorted);
    }
    if args.benchmark {
        println!(
            "{:?} x {} nodes: {elapsed:?}",
            args.algorithm, args.node_count
        );
    } else {
        println!("simulation complete");
    }
    Ok(())
}
