#![no_main]

use libfuzzer_sys::fuzz_target;
use stakehold_core::{
    first_invariant_counterexample, AccountId, Action, Bps, DispenseAmount, ProverId,
    RuntimeBounds, StakingConfig, StaticGovernance, TraceStep,
};

const START: u64 = 1_700_000_000;
const PROVERS: u64 = 2;
const STAKERS: u8 = 4;

fn config() -> StakingConfig {
    let mut config = StakingConfig::default();
    config.delays.unstake_delay_secs = 64;
    config.delays.slash_delay_secs = 16;
    config.delays.cancel_delay_secs = 32;
    config.limits.min_stake_amount = 1;
    config.limits.max_unstake_requests = 4;
    config.dispense.rate_per_second = 256;
    config
}

fn staker(b: u8) -> AccountId {
    AccountId::from_label(&format!("fuzz-staker-{}", b % STAKERS))
}

fn prover(b: u8) -> ProverId {
    ProverId::derive(AccountId::from_label("fuzz-owner"), u64::from(b) % PROVERS)
}

fn amount(hi: u8, lo: u8) -> u128 {
    // Skewed toward small values, with occasional huge ones to hit overflow paths.
    match hi >> 6 {
        3 => u128::MAX >> (lo % 128),
        _ => (u128::from(hi) << 8 | u128::from(lo)) * 1_000,
    }
}

fn parse_steps(config: &StakingConfig, input: &[u8]) -> Vec<TraceStep> {
    let roles = &config.roles;
    let owner = AccountId::from_label("fuzz-owner");

    let mut steps: Vec<TraceStep> = Vec::new();
    for _ in 0..PROVERS {
        steps.push(TraceStep::Apply(Action::CreateProver {
            owner,
            owner_fee_bps: Bps::saturating(500),
        }));
    }
    for account in (0..STAKERS).map(staker).chain([roles.settlement]) {
        steps.push(TraceStep::Apply(Action::CreditCollateral {
            account,
            amount: 1 << 40,
        }));
    }

    // Bounded length to keep fuzz runs cheap.
    for chunk in input.chunks_exact(4).take(256) {
        let [op, a, b, c] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let step = match op % 11 {
            0 => Action::Stake {
                staker: staker(a),
                prover: prover(a >> 4),
                amount: amount(b, c),
            },
            1 => Action::RequestUnstake {
                staker: staker(a),
                amount: amount(b, c),
            },
            2 => Action::FinishUnstake {
                caller: staker(b),
                staker: staker(a),
            },
            3 => Action::Reward {
                caller: roles.settlement,
                prover: prover(a),
                amount: amount(b, c),
            },
            4 => Action::RequestSlash {
                caller: roles.settlement,
                prover: prover(a),
                amount: amount(b, c),
            },
            5 => Action::FinishSlash {
                caller: [roles.governance, roles.owner, staker(b)][usize::from(b % 3)],
                prover: prover(a),
                index: usize::from(c % 8),
            },
            6 => Action::CancelSlash {
                caller: [roles.governance, roles.owner, staker(b)][usize::from(b % 3)],
                prover: prover(a),
                index: usize::from(c % 8),
            },
            7 => Action::Dispense {
                caller: roles.dispenser,
                amount: if a & 1 == 0 {
                    DispenseAmount::All
                } else {
                    DispenseAmount::Exact(amount(b, c))
                },
            },
            8 => Action::SetDispenseRate {
                caller: roles.owner,
                rate_per_second: u128::from(b) << 4,
            },
            9 => Action::CreditCollateral {
                account: roles.dispenser,
                amount: amount(b, c),
            },
            _ => {
                steps.push(TraceStep::Advance {
                    secs: u64::from(a) | u64::from(b) << 8,
                });
                continue;
            }
        };
        steps.push(TraceStep::Apply(step));
    }
    steps
}

fuzz_target!(|data: &[u8]| {
    let config = config();
    let steps = parse_steps(&config, data);
    let governance = StaticGovernance {
        voting_delay: 8,
        voting_period: 24,
    };

    match first_invariant_counterexample(
        &config,
        RuntimeBounds::default(),
        governance,
        START,
        &steps,
    ) {
        Ok(None) => {}
        Ok(Some(ce)) => panic!("{}: {}", ce.short(), ce.violation.details),
        Err(e) => panic!("trace replay failed: {e}"),
    }
});
