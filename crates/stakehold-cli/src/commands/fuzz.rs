//! Randomized invariant fuzzing over generated ledger traces.

use std::sync::Arc;

use anyhow::{Context, Result};
use stakehold_core::{
    first_invariant_counterexample, minimize_counterexample, AccountId, Action, ActionOutcome,
    Bps, DispenseAmount, ManualClock, ProverId, RuntimeBounds, StakingConfig, StakingEngine,
    StaticGovernance, Timestamp, TraceStep,
};

const START: Timestamp = 1_700_000_000;

#[derive(Clone, Copy)]
struct XorShift64(u64);

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // Avoid the all-zero state.
        Self(if seed == 0 {
            0x9E37_79B9_7F4A_7C15
        } else {
            seed
        })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn gen_range(&mut self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.next_u64() % upper
    }

    fn gen_u128(&mut self, upper: u128) -> u128 {
        if upper == 0 {
            return 0;
        }
        let wide = ((self.next_u64() as u128) << 64) | self.next_u64() as u128;
        wide % upper
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.gen_range(items.len() as u64) as usize]
    }
}

/// Config tuned so that every path (maturity, owner finalize, public deadline) is reachable
/// within a few hundred steps.
fn fuzz_config(base: &StakingConfig) -> Result<StakingConfig> {
    let mut config = base.clone();
    config.delays.unstake_delay_secs = 120;
    config.delays.slash_delay_secs = 30;
    config.delays.cancel_delay_secs = 60;
    config.limits.min_stake_amount = 1;
    config.limits.max_unstake_requests = 8;
    config.dispense.rate_per_second = 1_000;
    config.validate().context("Invalid fuzz configuration")?;
    Ok(config)
}

fn fuzz_governance() -> StaticGovernance {
    StaticGovernance {
        voting_delay: 10,
        voting_period: 20,
    }
}

fn staker(i: u32) -> AccountId {
    AccountId::from_label(&format!("fuzz-staker-{i}"))
}

/// Apply `action` on the shadow engine and record it; rejected actions stay in the trace.
fn push(
    eng: &mut StakingEngine,
    trace: &mut Vec<TraceStep>,
    action: Action,
) -> Option<ActionOutcome> {
    let out = eng.apply(&action);
    trace.push(TraceStep::Apply(action));
    out.ok()
}

fn generate_trace(
    config: &StakingConfig,
    seed: u64,
    steps: u32,
    provers: u32,
    stakers: u32,
) -> Result<Vec<TraceStep>> {
    let clock = ManualClock::new(START);
    let mut eng = StakingEngine::new(
        config.clone(),
        Arc::new(clock.clone()),
        Arc::new(fuzz_governance()),
    )?;
    let mut rng = XorShift64::new(seed);
    let roles = config.roles.clone();

    let mut trace: Vec<TraceStep> = Vec::new();
    let mut prover_ids: Vec<ProverId> = Vec::new();
    let stakers: Vec<AccountId> = (0..stakers.max(1)).map(staker).collect();

    // Bootstrap: create and fund so deeper actions are reachable.
    for i in 0..provers.max(1) {
        let fee = Bps::new(u16::try_from(rng.gen_range(2_001)).unwrap_or(0))?;
        let owner = AccountId::from_label(&format!("fuzz-owner-{i}"));
        if let Some(ActionOutcome::ProverCreated(id)) = push(
            &mut eng,
            &mut trace,
            Action::CreateProver {
                owner,
                owner_fee_bps: fee,
            },
        ) {
            prover_ids.push(id);
        }
    }
    for account in stakers
        .iter()
        .copied()
        .chain([roles.settlement, roles.dispenser])
    {
        push(
            &mut eng,
            &mut trace,
            Action::CreditCollateral {
                account,
                amount: 1_000_000_000,
            },
        );
    }

    for _ in 0..steps {
        if prover_ids.is_empty() {
            break;
        }
        let s = rng.pick(&stakers);
        let p = rng.pick(&prover_ids);

        let action = match rng.gen_range(12) {
            0 | 1 => {
                let bal = eng.collateral_balance(&s);
                if bal == 0 {
                    continue;
                }
                let prover = eng.staked_to(&s).unwrap_or(p);
                Action::Stake {
                    staker: s,
                    prover,
                    amount: rng.gen_u128(bal / 4) + 1,
                }
            }
            2 | 3 => {
                let bal = eng.balance_of(&s);
                if bal == 0 {
                    continue;
                }
                Action::RequestUnstake {
                    staker: s,
                    amount: rng.gen_u128(bal) + 1,
                }
            }
            4 => Action::FinishUnstake {
                caller: rng.pick(&stakers),
                staker: s,
            },
            5 => Action::Reward {
                caller: roles.settlement,
                prover: p,
                amount: rng.gen_u128(100_000) + 1,
            },
            6 => {
                let exposure = eng.prover(p).and_then(|x| x.exposure()).unwrap_or(0);
                Action::RequestSlash {
                    caller: roles.settlement,
                    prover: p,
                    amount: rng.gen_u128(exposure / 2 + 1) + 1,
                }
            }
            7 | 8 => {
                let pending = eng
                    .slash_requests(p)
                    .ok()
                    .and_then(|c| c.iter().rposition(|c| c.is_pending()));
                let Some(index) = pending else { continue };
                let caller = rng.pick(&[roles.governance, roles.owner, s]);
                if rng.gen_range(4) == 0 {
                    Action::CancelSlash {
                        caller,
                        prover: p,
                        index,
                    }
                } else {
                    Action::FinishSlash {
                        caller,
                        prover: p,
                        index,
                    }
                }
            }
            9 => Action::Dispense {
                caller: roles.dispenser,
                amount: if rng.gen_range(2) == 0 {
                    DispenseAmount::All
                } else {
                    DispenseAmount::Exact(rng.gen_u128(50_000) + 1)
                },
            },
            10 => Action::SetDispenseRate {
                caller: roles.owner,
                rate_per_second: rng.gen_u128(2_000),
            },
            _ => {
                let secs = rng.gen_range(90) + 1;
                clock.advance(secs)?;
                trace.push(TraceStep::Advance { secs });
                continue;
            }
        };
        push(&mut eng, &mut trace, action);
    }

    Ok(trace)
}

pub fn run(
    seed: u64,
    steps: u32,
    iters: u32,
    provers: u32,
    stakers: u32,
    base: StakingConfig,
) -> Result<()> {
    let config = fuzz_config(&base)?;
    let bounds = RuntimeBounds::default();
    let governance = fuzz_governance();

    for i in 0..iters {
        let run_seed = seed ^ (0x9E37_79B9_7F4A_7C15u64.wrapping_mul(i as u64 + 1));
        let trace = generate_trace(&config, run_seed, steps, provers, stakers)?;
        tracing::debug!(iter = i, run_seed, steps = trace.len(), "generated trace");

        let Some(ce) = first_invariant_counterexample(&config, bounds, governance, START, &trace)
            .context("Failed to run invariant check")?
        else {
            continue;
        };

        let min = minimize_counterexample(&config, bounds, governance, START, &ce)
            .context("Failed to minimize invariant counterexample")?;

        println!("{}", min.short());
        println!("  {}", min.violation.details);
        println!();
        println!("Minimal trace ({} steps):", min.steps.len());
        for (idx, step) in min.steps.iter().enumerate() {
            println!("  {:03}: {}", idx, serde_json::to_string(step)?);
        }
        anyhow::bail!("invariant violated (seed={run_seed})");
    }

    println!(
        "No invariant violations found (iters={iters}, steps={steps}, provers={provers}, stakers={stakers})."
    );
    Ok(())
}
