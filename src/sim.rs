//! Process composition: one top-level task per node, all inside a single
//! process talking over loopback TCP.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::task::JoinSet;

use crate::{
    alternative::{self, AlternativePayload},
    engine::{broadcast_termination, discover_total_nodes, setup_node, Engine},
    oddeven::{self, OddEvenPayload},
    sasaki::{self, SasakiPayload},
    transport::DEFAULT_BASE_PORT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Random,
    Sorted,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    OddEven,
    Sasaki,
    Alternative,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub node_count: usize,
    pub input: InputKind,
    pub base_port: u16,
}

impl SimConfig {
    pub fn new(node_count: usize, input: InputKind) -> Self {
        Self {
            node_count,
            input,
            base_port: DEFAULT_BASE_PORT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SortOutcome {
    pub initial: Vec<i64>,
    pub sorted: Vec<i64>,
}

pub fn initial_value(id: usize, config: &SimConfig) -> i64 {
    match config.input {
        InputKind::Sorted => id as i64,
        InputKind::Reverse => (config.node_count - 1 - id) as i64,
        InputKind::Random => {
            let clock = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|since| since.as_nanos() as u64)
                .unwrap_or(0);
            let mut rng = StdRng::seed_from_u64(clock.wrapping_add(id as u64));
            rng.gen_range(0..1000)
        }
    }
}

pub async fn run(algorithm: AlgorithmKind, config: SimConfig) -> anyhow::Result<SortOutcome> {
    anyhow::ensure!(
        (1..=7000).contains(&config.node_count),
        "node count must be between 1 and 7000"
    );
    anyhow::ensure!(
        config.base_port as usize + config.node_count <= u16::MAX as usize + 1,
        "port range {}+{} leaves the u16 space",
        config.base_port,
        config.node_count
    );
    match algorithm {
        AlgorithmKind::OddEven => run_oddeven(config).await,
        AlgorithmKind::Sasaki => run_sasaki(config).await,
        AlgorithmKind::Alternative => run_alternative(config).await,
    }
}

pub async fn run_oddeven(config: SimConfig) -> anyhow::Result<SortOutcome> {
    let engine = Arc::new(Engine::new(config.node_count));
    let mut tasks = JoinSet::new();
    for id in 0..config.node_count {
        let engine = engine.clone();
        let config = config.clone();
        tasks.spawn(async move {
            let initial = initial_value(id, &config);
            let (mut node, mut left, mut right) =
                setup_node::<OddEvenPayload>(id, config.node_count, config.base_port)
                    .await
                    .with_context(|| format!("node {id} setup"))?;
            discover_total_nodes(&mut node, &mut left, &mut right)
                .await
                .with_context(|| format!("node {id} discovery"))?;
            node.value = OddEvenPayload { value: initial };
            oddeven::run(&mut node, &engine, &mut left, &mut right).await;
            broadcast_termination(&mut node).await;
            anyhow::Ok((id, initial, node.value.value))
        });
    }
    collect(config.node_count, tasks).await
}

pub async fn run_sasaki(config: SimConfig) -> anyhow::Result<SortOutcome> {
    let engine = Arc::new(Engine::new(config.node_count));
    let mut tasks = JoinSet::new();
    for id in 0..config.node_count {
        let engine = engine.clone();
        let config = config.clone();
        tasks.spawn(async move {
            let initial = initial_value(id, &config);
            let (mut node, mut left, mut right) =
                setup_node::<SasakiPayload>(id, config.node_count, config.base_port)
                    .await
                    .with_context(|| format!("node {id} setup"))?;
            discover_total_nodes(&mut node, &mut left, &mut right)
                .await
                .with_context(|| format!("node {id} discovery"))?;
            node.value = SasakiPayload {
                value: initial,
                marked: false,
            };
            sasaki::run(&mut node, &engine, &mut left, &mut right).await;
            broadcast_termination(&mut node).await;
            anyhow::Ok((id, initial, node.value.value))
        });
    }
    collect(config.node_count, tasks).await
}

pub async fn run_alternative(config: SimConfig) -> anyhow::Result<SortOutcome> {
    let engine = Arc::new(Engine::new(config.node_count));
    let mut tasks = JoinSet::new();
    for id in 0..config.node_count {
        let engine = engine.clone();
        let config = config.clone();
        tasks.spawn(async move {
            let initial = initial_value(id, &config);
            let (mut node, mut left, mut right) =
                setup_node::<AlternativePayload>(id, config.node_count, config.base_port)
                    .await
                    .with_context(|| format!("node {id} setup"))?;
            discover_total_nodes(&mut node, &mut left, &mut right)
                .await
                .with_context(|| format!("node {id} discovery"))?;
            node.value = AlternativePayload { value: initial };
            alternative::run(&mut node, &engine, &mut left, &mut right).await;
            broadcast_termination(&mut node).await;
            anyhow::Ok((id, initial, node.value.value))
        });
    }
    collect(config.node_count, tasks).await
}

/// Waits for every node task, failing fast if any of them could not come
/// up. Other nodes would wait forever on a missing neighbor, so a single
/// setup failure aborts the whole run.
async fn collect(
    node_count: usize,
    mut tasks: JoinSet<anyhow::Result<(usize, i64, i64)>>,
) -> anyhow::Result<SortOutcome> {
    let mut initial = vec![0i64; node_count];
    let mut sorted = vec![0i64; node_count];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((id, first, last))) => {
                initial[id] = first;
                sorted[id] = last;
            }
            Ok(Err(err)) => {
                tasks.abort_all();
                return Err(err);
            }
            Err(err) => {
                tasks.abort_all();
                return Err(err.into());
            }
        }
    }
    Ok(SortOutcome { initial, sorted })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const CASE_TIMEOUT: Duration = Duration::from_secs(60);

    fn config(node_count: usize, input: InputKind, base_port: u16) -> SimConfig {
        SimConfig {
            node_count,
            input,
            base_port,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oddeven_sorts_a_reversed_line() {
        let outcome = timeout(
            CASE_TIMEOUT,
            run_oddeven(config(6, InputKind::Reverse, 18300)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome.initial, vec![5, 4, 3, 2, 1, 0]);
        assert_eq!(outcome.sorted, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oddeven_keeps_sorted_input() {
        let outcome = timeout(
            CASE_TIMEOUT,
            run_oddeven(config(4, InputKind::Sorted, 18310)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome.sorted, vec![0, 1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sasaki_sorts_a_reversed_line() {
        let outcome = timeout(
            CASE_TIMEOUT,
            run_sasaki(config(5, InputKind::Reverse, 18320)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome.initial, vec![4, 3, 2, 1, 0]);
        assert_eq!(outcome.sorted, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn alternative_sorts_a_reversed_triple() {
        let outcome = timeout(
            CASE_TIMEOUT,
            run_alternative(config(3, InputKind::Reverse, 18330)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome.sorted, vec![0, 1, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn alternative_keeps_sorted_input() {
        let outcome = timeout(
            CASE_TIMEOUT,
            run_alternative(config(5, InputKind::Sorted, 18340)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome.sorted, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn random_input_is_permuted_into_order() {
        let outcome = timeout(
            CASE_TIMEOUT,
            run_oddeven(config(6, InputKind::Random, 18350)),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(outcome.sorted.windows(2).all(|pair| pair[0] <= pair[1]));
        let mut expected = outcome.initial.clone();
        expected.sort();
        assert_eq!(outcome.sorted, expected);
    }

    #[test]
    fn rejects_out_of_range_node_counts() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let result = runtime.block_on(run(
            AlgorithmKind::OddEven,
            config(0, InputKind::Sorted, 18360),
        ));
        assert!(result.is_err());
    }
}
