//! Scenario runner.
//!
//! A scenario is a JSON document with an optional config override, governance timing, a start
//! timestamp and a list of steps. Accounts are named by label (`"alice"`); labels starting with
//! `@` name role accounts (`@owner`, `@governance`, `@settlement`, `@dispenser`, `@treasury`).
//! Provers are referenced by creation order (`0` is the first prover created).

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use stakehold_core::{
    AccountId, Action, ActionOutcome, Bps, DispenseAmount, ManualClock, ProverId, StakingConfig,
    StakingEngine, StaticGovernance, Timestamp,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Replaces the CLI configuration when present.
    #[serde(default)]
    pub config: Option<StakingConfig>,
    #[serde(default)]
    pub governance: Option<StaticGovernance>,
    #[serde(default)]
    pub start: Timestamp,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ScenarioStep {
    Advance {
        secs: u64,
    },
    CreateProver {
        owner: String,
        #[serde(default)]
        owner_fee_bps: u16,
    },
    Credit {
        account: String,
        amount: u128,
    },
    Stake {
        staker: String,
        prover: usize,
        amount: u128,
    },
    RequestUnstake {
        staker: String,
        amount: u128,
    },
    FinishUnstake {
        staker: String,
        #[serde(default)]
        caller: Option<String>,
    },
    Reward {
        prover: usize,
        amount: u128,
    },
    Dispense {
        /// Omit to dispense everything available.
        #[serde(default)]
        amount: Option<u128>,
    },
    SetDispenseRate {
        rate_per_second: u128,
    },
    RequestSlash {
        prover: usize,
        amount: u128,
    },
    FinishSlash {
        caller: String,
        prover: usize,
        index: usize,
    },
    CancelSlash {
        caller: String,
        prover: usize,
        index: usize,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum StepResult {
    Advanced { now: Timestamp },
    Ok(ActionOutcome),
    Err(String),
}

#[derive(Debug, Serialize)]
struct StepReport {
    index: usize,
    step: ScenarioStep,
    result: StepResult,
}

#[derive(Debug, Serialize)]
struct AccountSummary {
    collateral: u128,
    receipt_shares: u128,
    staked: u128,
    unstake_pending: u128,
}

#[derive(Debug, Serialize)]
struct ProverSummary {
    index: usize,
    id: ProverId,
    live_normalized: u128,
    escrowed_normalized: u128,
    slash_factor: u128,
    staked_value: u128,
}

#[derive(Debug, Serialize)]
struct Summary {
    now: Timestamp,
    state_hash: String,
    issued_total: u128,
    burned_total: u128,
    dispensed_total: u128,
    global_assets: u128,
    global_shares: u128,
    accounts: BTreeMap<String, AccountSummary>,
    provers: Vec<ProverSummary>,
    invariants: String,
}

#[derive(Debug, Serialize)]
struct Report {
    steps: Vec<StepReport>,
    summary: Summary,
}

struct Runner {
    engine: StakingEngine,
    clock: ManualClock,
    provers: Vec<ProverId>,
    labels: BTreeMap<String, AccountId>,
}

impl Runner {
    fn new(config: StakingConfig, governance: StaticGovernance, start: Timestamp) -> Result<Self> {
        let clock = ManualClock::new(start);
        let engine = StakingEngine::new(config, Arc::new(clock.clone()), Arc::new(governance))
            .context("Failed to create staking engine")?;
        Ok(Self {
            engine,
            clock,
            provers: Vec::new(),
            labels: BTreeMap::new(),
        })
    }

    fn account(&mut self, label: &str) -> Result<AccountId> {
        let roles = &self.engine.config().roles;
        let id = match label {
            "@owner" => roles.owner,
            "@governance" => roles.governance,
            "@settlement" => roles.settlement,
            "@dispenser" => roles.dispenser,
            "@treasury" => roles.treasury,
            l if l.starts_with('@') => bail!("unknown role label: {l}"),
            l => AccountId::from_label(l),
        };
        self.labels.insert(label.to_string(), id);
        Ok(id)
    }

    fn prover(&self, index: usize) -> Result<ProverId> {
        self.provers
            .get(index)
            .copied()
            .with_context(|| format!("prover #{index} has not been created"))
    }

    fn to_action(&mut self, step: &ScenarioStep) -> Result<Action> {
        let roles = self.engine.config().roles.clone();
        Ok(match step {
            ScenarioStep::Advance { .. } => bail!("advance is not a ledger action"),
            ScenarioStep::CreateProver {
                owner,
                owner_fee_bps,
            } => Action::CreateProver {
                owner: self.account(owner)?,
                owner_fee_bps: Bps::new(*owner_fee_bps)?,
            },
            ScenarioStep::Credit { account, amount } => Action::CreditCollateral {
                account: self.account(account)?,
                amount: *amount,
            },
            ScenarioStep::Stake {
                staker,
                prover,
                amount,
            } => Action::Stake {
                staker: self.account(staker)?,
                prover: self.prover(*prover)?,
                amount: *amount,
            },
            ScenarioStep::RequestUnstake { staker, amount } => Action::RequestUnstake {
                staker: self.account(staker)?,
                amount: *amount,
            },
            ScenarioStep::FinishUnstake { staker, caller } => {
                let staker = self.account(staker)?;
                let caller = match caller {
                    Some(c) => self.account(c)?,
                    None => staker,
                };
                Action::FinishUnstake { caller, staker }
            }
            ScenarioStep::Reward { prover, amount } => Action::Reward {
                caller: roles.settlement,
                prover: self.prover(*prover)?,
                amount: *amount,
            },
            ScenarioStep::Dispense { amount } => Action::Dispense {
                caller: roles.dispenser,
                amount: amount.map_or(DispenseAmount::All, DispenseAmount::Exact),
            },
            ScenarioStep::SetDispenseRate { rate_per_second } => Action::SetDispenseRate {
                caller: roles.owner,
                rate_per_second: *rate_per_second,
            },
            ScenarioStep::RequestSlash { prover, amount } => Action::RequestSlash {
                caller: roles.settlement,
                prover: self.prover(*prover)?,
                amount: *amount,
            },
            ScenarioStep::FinishSlash {
                caller,
                prover,
                index,
            } => Action::FinishSlash {
                caller: self.account(caller)?,
                prover: self.prover(*prover)?,
                index: *index,
            },
            ScenarioStep::CancelSlash {
                caller,
                prover,
                index,
            } => Action::CancelSlash {
                caller: self.account(caller)?,
                prover: self.prover(*prover)?,
                index: *index,
            },
        })
    }

    fn step(&mut self, step: &ScenarioStep) -> Result<StepResult> {
        if let ScenarioStep::Advance { secs } = step {
            let now = self.clock.advance(*secs)?;
            return Ok(StepResult::Advanced { now });
        }
        let action = self.to_action(step)?;
        Ok(match self.engine.apply(&action) {
            Ok(outcome) => {
                if let ActionOutcome::ProverCreated(id) = outcome {
                    self.provers.push(id);
                }
                StepResult::Ok(outcome)
            }
            Err(e) => StepResult::Err(e.to_string()),
        })
    }

    fn summary(&self) -> Result<Summary> {
        let e = &self.engine;
        let mut accounts = BTreeMap::new();
        for (label, id) in &self.labels {
            accounts.insert(
                label.clone(),
                AccountSummary {
                    collateral: e.collateral_balance(id),
                    receipt_shares: e.balance_of(id),
                    staked: e.staked(id)?,
                    unstake_pending: e.unstake_pending(id)?,
                },
            );
        }
        let mut provers = Vec::with_capacity(self.provers.len());
        for (index, id) in self.provers.iter().enumerate() {
            let p = e.prover(*id)?;
            provers.push(ProverSummary {
                index,
                id: *id,
                live_normalized: p.vault.total_assets(),
                escrowed_normalized: p.escrow.escrowed_shares(),
                slash_factor: p.escrow.slash_factor(),
                staked_value: e.prover_staked(*id)?,
            });
        }
        let invariants = match e.check_invariants() {
            Ok(()) => "ok".to_string(),
            Err(v) => v.to_string(),
        };
        Ok(Summary {
            now: e.state().now,
            state_hash: e.state_hash()?.to_hex(),
            issued_total: e.issued_total(),
            burned_total: e.burned_total(),
            dispensed_total: e.dispensed_total(),
            global_assets: e.global_vault().total_assets(),
            global_shares: e.global_vault().total_shares(),
            accounts,
            provers,
            invariants,
        })
    }
}

fn execute(scenario: Scenario, config: StakingConfig) -> Result<Report> {
    let config = scenario.config.unwrap_or(config);
    let governance = scenario.governance.unwrap_or_default();
    let mut runner = Runner::new(config, governance, scenario.start)?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.into_iter().enumerate() {
        let result = runner
            .step(&step)
            .with_context(|| format!("Scenario step {index} is malformed"))?;
        steps.push(StepReport {
            index,
            step,
            result,
        });
    }
    let summary = runner.summary()?;
    Ok(Report { steps, summary })
}

pub fn run(scenario: PathBuf, format: String, config: StakingConfig) -> Result<()> {
    let raw = fs::read_to_string(&scenario)
        .with_context(|| format!("Failed to read scenario: {}", scenario.display()))?;
    let parsed: Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse scenario: {}", scenario.display()))?;
    let report = execute(parsed, config)?;

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "human" => print_human(&report),
        _ => bail!("unknown format: {format} (expected 'human' or 'json')"),
    }

    if report.summary.invariants != "ok" {
        bail!("ledger invariant violated: {}", report.summary.invariants);
    }
    Ok(())
}

fn print_human(report: &Report) {
    println!("Scenario steps");
    println!();
    for s in &report.steps {
        let result = match &s.result {
            StepResult::Advanced { now } => format!("now = {now}"),
            StepResult::Ok(outcome) => format!("ok    {outcome:?}"),
            StepResult::Err(e) => format!("error {e}"),
        };
        println!("  {:03}: {:<60} {result}", s.index, format!("{:?}", s.step));
    }

    let sum = &report.summary;
    println!();
    println!("Summary (t = {})", sum.now);
    println!();
    println!("  state_hash      = {}", sum.state_hash);
    println!("  issued_total    = {}", sum.issued_total);
    println!("  burned_total    = {}", sum.burned_total);
    println!("  dispensed_total = {}", sum.dispensed_total);
    println!(
        "  global vault    = {} assets / {} shares",
        sum.global_assets, sum.global_shares
    );
    println!("  invariants      = {}", sum.invariants);
    println!();
    println!("  Accounts:");
    for (label, a) in &sum.accounts {
        println!(
            "    {label:<14} collateral={} receipts={} staked={} pending={}",
            a.collateral, a.receipt_shares, a.staked, a.unstake_pending
        );
    }
    println!();
    println!("  Provers:");
    for p in &sum.provers {
        println!(
            "    #{} {} live={} escrowed={} slash_factor={} staked={}",
            p.index, p.id, p.live_normalized, p.escrowed_normalized, p.slash_factor, p.staked_value
        );
    }
}
