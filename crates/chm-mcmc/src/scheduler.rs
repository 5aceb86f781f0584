//! Metropolis-coupled scheduler.
//!
//! Chains advance in lock-step blocks on a worker pool. Blocks end where the
//! generation counter reaches a multiple of the swap interval; all chains
//! are joined before the single swap attempted at that point.

use std::io::{self, Write};

use chm_core::errors::{ChmError, ErrorInfo};
use chm_core::RngHandle;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::{Chain, Model, OperatorRow};
use crate::config::RunConfig;
use crate::determinism;
use crate::tempering::{self, SwapRule};
use crate::tuning::{self, SCALE_TARGET};

/// Construction parameters of a [`CoupledScheduler`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    /// Heat spacing of the ladder.
    pub delta: f64,
    /// Generations between swap attempts.
    pub swap_interval: usize,
    /// Comparison used for stochastic swap decisions.
    pub swap_rule: SwapRule,
    /// Seed from which chain and swap streams are derived.
    pub master_seed: u64,
    /// Worker threads (0 means one per chain).
    pub threads: usize,
}

impl SchedulerOptions {
    /// Extracts the scheduler settings of a run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            delta: config.ladder.delta,
            swap_interval: config.swap_interval,
            swap_rule: config.swap_rule,
            master_seed: config.seed_policy.master_seed,
            threads: config.ladder.threads,
        }
    }
}

/// Swap attempt counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapStats {
    /// Swaps attempted.
    pub attempted: usize,
    /// Swaps accepted.
    pub accepted: usize,
}

impl SwapStats {
    /// Acceptance rate, zero before the first attempt.
    pub fn rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }

    fn since(&self, earlier: &SwapStats) -> SwapStats {
        SwapStats {
            attempted: self.attempted - earlier.attempted,
            accepted: self.accepted - earlier.accepted,
        }
    }
}

/// Summary returned to callers after a run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Generations sampled (burn-in excluded).
    pub generations: usize,
    /// Final heat spacing.
    pub delta: f64,
    /// Final heat of every chain, by chain index.
    pub heats: Vec<f64>,
    /// Index of the chain holding the active flag.
    pub active_chain: usize,
    /// Swap counters over the whole lifetime of the scheduler.
    pub swaps: SwapStats,
    /// Log posterior of the cold chain.
    pub cold_ln_posterior: f64,
    /// Per chain, per move proposal counters.
    pub operators: Vec<OperatorRow>,
}

impl RunSummary {
    /// Writes a per chain, per move table followed by the swap counters.
    pub fn print_operator_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{:>5}  {:<20} {:>6} {:>9} {:>9} {:>8} {:>10}",
            "chain", "move", "weight", "tried", "accepted", "ratio", "tuning"
        )?;
        for row in &self.operators {
            let tuning = row
                .tuning_parameter
                .map(|value| format!("{value:.4}"))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                out,
                "{:>5}  {:<20} {:>6} {:>9} {:>9} {:>8.4} {:>10}",
                row.chain, row.name, row.weight, row.tried, row.accepted, row.acceptance, tuning
            )?;
        }
        writeln!(
            out,
            "swaps: {} attempted, {} accepted ({:.4})",
            self.swaps.attempted,
            self.swaps.accepted,
            self.swaps.rate()
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum BlockMode {
    Sample { start: usize },
    Burnin { start: usize, tuning_interval: usize },
}

/// Owns the chains of a heat ladder and drives them.
pub struct CoupledScheduler<M> {
    chains: Vec<Chain<M>>,
    delta: f64,
    swap_interval: usize,
    swap_rule: SwapRule,
    generation: usize,
    started: bool,
    swap_rng: RngHandle,
    swaps: SwapStats,
    pool: rayon::ThreadPool,
}

impl<M: Model> CoupledScheduler<M> {
    /// Places `chains` on the ladder: chain `i` gets heat `1 / (1 + delta * i)`
    /// and its own random substream, chain 0 becomes active.
    pub fn new(mut chains: Vec<Chain<M>>, options: SchedulerOptions) -> Result<Self, ChmError> {
        if chains.is_empty() {
            return Err(ChmError::Config(ErrorInfo::new(
                "empty-ladder",
                "at least one chain is required",
            )));
        }
        if !options.delta.is_finite() || options.delta < 0.0 {
            return Err(ChmError::Config(
                ErrorInfo::new("ladder-delta", "delta must be finite and non-negative")
                    .with_context("delta", options.delta.to_string()),
            ));
        }
        if options.swap_interval == 0 {
            return Err(ChmError::Config(ErrorInfo::new(
                "swap-interval",
                "swap_interval must be at least 1",
            )));
        }
        for (index, chain) in chains.iter_mut().enumerate() {
            chain.set_heat(tempering::heat(options.delta, index));
            chain.set_active(index == 0);
            chain.reseed(RngHandle::from_seed(determinism::chain_seed(
                options.master_seed,
                index,
            )));
        }
        let threads = if options.threads == 0 {
            chains.len()
        } else {
            options.threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| ChmError::Config(ErrorInfo::new("thread-pool", err.to_string())))?;
        Ok(Self {
            chains,
            delta: options.delta,
            swap_interval: options.swap_interval,
            swap_rule: options.swap_rule,
            generation: 0,
            started: false,
            swap_rng: RngHandle::from_seed(determinism::swap_seed(options.master_seed)),
            swaps: SwapStats::default(),
            pool,
        })
    }

    /// Chains by index.
    pub fn chains(&self) -> &[Chain<M>] {
        &self.chains
    }

    /// Generations sampled so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Current heat spacing.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Swap counters.
    pub fn swap_stats(&self) -> SwapStats {
        self.swaps
    }

    /// Index of the chain holding the active flag.
    pub fn active_chain(&self) -> usize {
        self.chains
            .iter()
            .position(|chain| chain.is_active())
            .unwrap_or(0)
    }

    /// Log posterior of the cold chain.
    pub fn cold_ln_posterior(&self) -> f64 {
        self.chains[self.active_chain()].ln_posterior()
    }

    /// Samples `generations` further generations.
    ///
    /// The first call also reports generation 0. The active chain notifies
    /// its monitors after each cycle it completes.
    pub fn run(&mut self, generations: usize) -> Result<(), ChmError> {
        info!(
            generations,
            start = self.generation,
            chains = self.chains.len(),
            "sampling"
        );
        if !self.started {
            self.started = true;
            let generation = self.generation;
            for chain in self.chains.iter_mut().filter(|chain| chain.is_active()) {
                chain.notify_monitors(generation)?;
            }
        }
        let mut remaining = generations;
        while remaining > 0 {
            let block = self.block_length(self.generation, remaining);
            self.advance_block(
                block,
                BlockMode::Sample {
                    start: self.generation,
                },
            )?;
            self.generation += block;
            remaining -= block;
            if self.generation % self.swap_interval == 0 {
                self.swap();
            }
        }
        info!(
            generation = self.generation,
            cold_ln_posterior = self.cold_ln_posterior(),
            swap_rate = self.swaps.rate(),
            "sampling finished"
        );
        Ok(())
    }

    /// Runs `generations` burn-in generations without monitor output,
    /// tuning every move each `tuning_interval` generations (0 disables
    /// tuning). The generation counter is left untouched. Returns the swap
    /// counters of the burn-in alone.
    pub fn burnin(
        &mut self,
        generations: usize,
        tuning_interval: usize,
    ) -> Result<SwapStats, ChmError> {
        info!(generations, tuning_interval, "burn-in");
        let before = self.swaps;
        let mut done = 0;
        while done < generations {
            let block = self.block_length(done, generations - done);
            self.advance_block(
                block,
                BlockMode::Burnin {
                    start: done,
                    tuning_interval,
                },
            )?;
            done += block;
            if done % self.swap_interval == 0 {
                self.swap();
            }
            debug!(done, generations, "burn-in block complete");
        }
        Ok(self.swaps.since(&before))
    }

    /// Attempts one exchange of heat and active flag between two distinct
    /// chains. A no-op with fewer than two chains.
    pub fn swap(&mut self) -> bool {
        let Some((j, k)) = tempering::pick_pair(self.chains.len(), &mut self.swap_rng) else {
            return false;
        };
        let (heat_j, ln_j) = (self.chains[j].heat(), self.chains[j].ln_posterior());
        let (heat_k, ln_k) = (self.chains[k].heat(), self.chains[k].ln_posterior());
        let statistic = tempering::swap_statistic(heat_j, ln_j, heat_k, ln_k);
        let accepted = tempering::decide_swap(statistic, self.swap_rule, &mut self.swap_rng);
        self.swaps.attempted += 1;
        if accepted {
            self.swaps.accepted += 1;
            let active_j = self.chains[j].is_active();
            let active_k = self.chains[k].is_active();
            self.chains[j].set_heat(heat_k);
            self.chains[k].set_heat(heat_j);
            self.chains[j].set_active(active_k);
            self.chains[k].set_active(active_j);
        }
        debug!(j, k, statistic, accepted, "swap");
        accepted
    }

    /// Retunes the heat spacing from a swap acceptance rate and reassigns
    /// heats by rank, so the chain that was coldest stays cold.
    pub fn tune_ladder(&mut self, swap_rate: f64) -> f64 {
        if self.delta <= 0.0 || self.chains.len() < 2 {
            return self.delta;
        }
        let previous = self.delta;
        self.delta = tuning::tune_step(self.delta, swap_rate, SCALE_TARGET);
        let mut order: Vec<usize> = (0..self.chains.len()).collect();
        order.sort_by(|&a, &b| self.chains[b].heat().total_cmp(&self.chains[a].heat()));
        for (rank, index) in order.into_iter().enumerate() {
            self.chains[index].set_heat(tempering::heat(self.delta, rank));
        }
        info!(previous, delta = self.delta, swap_rate, "ladder tuned");
        self.delta
    }

    /// Proposal counters of every move of every chain.
    pub fn operator_rows(&self) -> Vec<OperatorRow> {
        self.chains
            .iter()
            .enumerate()
            .flat_map(|(index, chain)| chain.operator_rows(index))
            .collect()
    }

    /// Writes the operator table of the current [`RunSummary`].
    pub fn print_operator_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.summary().print_operator_summary(out)
    }

    /// Snapshot of the scheduler for reporting.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            generations: self.generation,
            delta: self.delta,
            heats: self.chains.iter().map(|chain| chain.heat()).collect(),
            active_chain: self.active_chain(),
            swaps: self.swaps,
            cold_ln_posterior: self.cold_ln_posterior(),
            operators: self.operator_rows(),
        }
    }

    fn block_length(&self, position: usize, remaining: usize) -> usize {
        (self.swap_interval - position % self.swap_interval).min(remaining)
    }

    fn advance_block(&mut self, length: usize, mode: BlockMode) -> Result<(), ChmError> {
        let pool = &self.pool;
        let chains = &mut self.chains;
        pool.install(|| {
            chains
                .par_iter_mut()
                .try_for_each(|chain| advance_chain(chain, length, mode))
        })
    }
}

fn advance_chain<M: Model>(
    chain: &mut Chain<M>,
    length: usize,
    mode: BlockMode,
) -> Result<(), ChmError> {
    for step in 1..=length {
        chain.next_cycle()?;
        match mode {
            BlockMode::Sample { start } => {
                if chain.is_active() {
                    chain.notify_monitors(start + step)?;
                }
            }
            BlockMode::Burnin {
                start,
                tuning_interval,
            } => {
                if tuning_interval > 0 && (start + step) % tuning_interval == 0 {
                    chain.tune_moves();
                }
            }
        }
    }
    Ok(())
}
