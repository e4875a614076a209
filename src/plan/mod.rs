//! Turn a [`Delta`] and a caller's decision into an ordered list of merges.

use std::{fmt, str::FromStr};

use tracing::{info, instrument, warn};

use crate::detect::Delta;
use crate::error::PlanError;
use crate::merge::{self, MergeSummary};
use crate::pivot::{MonthData, MonthLabel, PivotTable, RankMap};

/// What the caller wants to apply from a delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    MonthsOnly,
    CategoriesOnly,
    Both,
    None,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::MonthsOnly => "months",
            Decision::CategoriesOnly => "categories",
            Decision::Both => "both",
            Decision::None => "none",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    /// Accepts the names and the numbered menu choices `1`-`4`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "months" | "months-only" => Ok(Decision::MonthsOnly),
            "2" | "categories" | "categories-only" => Ok(Decision::CategoriesOnly),
            "3" | "both" => Ok(Decision::Both),
            "4" | "none" | "skip" => Ok(Decision::None),
            other => Err(format!(
                "unknown decision `{}` (expected months, categories, both or none)",
                other
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanState {
    AwaitingDecision,
    Planned(Decision),
    Committed,
}

impl PlanState {
    fn name(&self) -> &'static str {
        match self {
            PlanState::AwaitingDecision => "AWAITING_DECISION",
            PlanState::Planned(Decision::MonthsOnly) => "PLAN_MONTHS_ONLY",
            PlanState::Planned(Decision::CategoriesOnly) => "PLAN_CATEGORIES_ONLY",
            PlanState::Planned(Decision::Both) => "PLAN_BOTH",
            PlanState::Planned(Decision::None) => "PLAN_NONE",
            PlanState::Committed => "COMMITTED",
        }
    }
}

/// A single merge call in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    AddCategory {
        category: String,
        months: Vec<MonthLabel>,
    },
    AddMonths {
        category: String,
        months: Vec<MonthLabel>,
    },
}

impl Operation {
    pub fn category(&self) -> &str {
        match self {
            Operation::AddCategory { category, .. } | Operation::AddMonths { category, .. } => {
                category
            }
        }
    }

    pub fn months(&self) -> &[MonthLabel] {
        match self {
            Operation::AddCategory { months, .. } | Operation::AddMonths { months, .. } => months,
        }
    }
}

/// Where rank maps come from when a plan runs.
pub trait RankSource {
    fn load(&self, category: &str, month: &MonthLabel) -> anyhow::Result<RankMap>;
}

/// Result of running a plan. `table` is the last table that committed.
#[derive(Debug)]
pub struct PlanOutcome {
    pub table: PivotTable,
    /// Operations that committed, in order, with what each changed.
    pub applied: Vec<(Operation, MergeSummary)>,
    /// The failure that stopped the plan, if any.
    pub failure: Option<PlanError>,
}

impl PlanOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct UpdatePlanner {
    delta: Delta,
    state: PlanState,
    operations: Vec<Operation>,
}

impl UpdatePlanner {
    pub fn new(delta: Delta) -> Self {
        Self {
            delta,
            state: PlanState::AwaitingDecision,
            operations: Vec::new(),
        }
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Fix the plan. Category additions always precede month additions.
    pub fn decide(&mut self, decision: Decision) -> Result<&[Operation], PlanError> {
        if self.state != PlanState::AwaitingDecision {
            return Err(PlanError::InvalidTransition {
                state: self.state.name(),
                action: "decide",
            });
        }

        let mut ops = Vec::new();
        if matches!(decision, Decision::CategoriesOnly | Decision::Both) {
            ops.extend(self.category_operations());
        }
        if matches!(decision, Decision::MonthsOnly | Decision::Both) {
            ops.extend(self.month_operations());
        }

        self.operations = ops;
        self.state = PlanState::Planned(decision);
        info!(
            "decision `{}`: {} operations planned",
            decision,
            self.operations.len()
        );
        Ok(&self.operations)
    }

    /// Run the plan against `table`, stopping at the first failure.
    ///
    /// Operations that committed before a failure stay committed.
    #[instrument(level = "info", skip_all, fields(ops = self.operations.len()))]
    pub fn execute(
        &mut self,
        table: PivotTable,
        source: &impl RankSource,
    ) -> Result<PlanOutcome, PlanError> {
        let decision = match self.state {
            PlanState::Planned(d) => d,
            other => {
                return Err(PlanError::InvalidTransition {
                    state: other.name(),
                    action: "execute",
                })
            }
        };
        self.state = PlanState::Committed;

        let mut current = table;
        let mut applied = Vec::new();
        if decision == Decision::None {
            return Ok(PlanOutcome {
                table: current,
                applied,
                failure: None,
            });
        }

        for op in &self.operations {
            match run_operation(&current, op, source) {
                Ok(outcome) => {
                    current = outcome.table;
                    applied.push((op.clone(), outcome.summary));
                }
                Err(e) => {
                    warn!("operation on `{}` failed, stopping plan: {}", op.category(), e);
                    return Ok(PlanOutcome {
                        table: current,
                        applied,
                        failure: Some(e),
                    });
                }
            }
        }

        Ok(PlanOutcome {
            table: current,
            applied,
            failure: None,
        })
    }

    fn category_operations(&self) -> Vec<Operation> {
        self.delta
            .new_categories
            .iter()
            .map(|category| Operation::AddCategory {
                category: category.clone(),
                months: self
                    .delta
                    .category_months
                    .get(category)
                    .map(|months| months.iter().copied().collect())
                    .unwrap_or_default(),
            })
            .collect()
    }

    fn month_operations(&self) -> Vec<Operation> {
        self.delta
            .pending_months
            .iter()
            .map(|(category, months)| Operation::AddMonths {
                category: category.clone(),
                months: months.iter().copied().collect(),
            })
            .collect()
    }
}

fn run_operation(
    table: &PivotTable,
    op: &Operation,
    source: &impl RankSource,
) -> Result<merge::MergeOutcome, PlanError> {
    let category = op.category();
    let mut data = MonthData::new();
    for month in op.months() {
        let map = source
            .load(category, month)
            .map_err(|source| PlanError::Source {
                category: category.to_string(),
                month: *month,
                source,
            })?;
        data.insert(*month, map);
    }

    let outcome = match op {
        Operation::AddCategory { .. } => merge::add_category(table, category, &data)?,
        Operation::AddMonths { .. } => merge::add_months(table, category, &data)?,
    };
    Ok(outcome)
}
