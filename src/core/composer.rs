//! Cost composer: keeps the five cost sections and the grand total in step
//! with the line items of a [`ProjectDraft`].
//!
//! Every mutating operation ends in [`ProjectDraft::recompute`], which runs
//! the stages of [`RecomputeStage::ORDER`] one after the other. Finder reward
//! and management fee are priced off consultant payments plus direct cost,
//! SST off the four sections before it, and the total off all five, so the
//! order is fixed.

use crate::domain::model::{
    Consultant, ConsultantAllocation, CostTotals, DirectCostField, DirectCostItem,
    FinderRewardItem, ManagementFeeItem, ManagementOrg, ProjectDraft, ProjectRole,
};
use crate::utils::error::{CostingError, Result};
use crate::utils::money::sanitize_amount;

pub const FINDER_REWARD_RATE: f64 = 0.05;
pub const MANAGEMENT_FEE_RATE: f64 = 0.15;
pub const SST_RATE: f64 = 0.06;
pub const SST_PERCENTAGE: f64 = 6.0;
pub const MAX_MANAGEMENT_FEE_ENTRIES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeStage {
    ConsultantPayments,
    DirectCost,
    FinderReward,
    ManagementFee,
    Sst,
    Total,
}

impl RecomputeStage {
    pub const ORDER: [RecomputeStage; 6] = [
        RecomputeStage::ConsultantPayments,
        RecomputeStage::DirectCost,
        RecomputeStage::FinderReward,
        RecomputeStage::ManagementFee,
        RecomputeStage::Sst,
        RecomputeStage::Total,
    ];

    /// Fills in this stage's total. Reads only totals written by earlier stages.
    fn apply(&self, draft: &ProjectDraft, totals: &mut CostTotals) {
        match self {
            RecomputeStage::ConsultantPayments => {
                totals.consultant_payments_total = draft
                    .consultants
                    .iter()
                    .map(|c| sanitize_amount(c.payment_amount))
                    .sum();
            }
            RecomputeStage::DirectCost => {
                totals.direct_cost_total = draft
                    .direct_cost
                    .iter()
                    .map(|item| sanitize_amount(item.payment_amount))
                    .sum();
            }
            RecomputeStage::FinderReward => {
                totals.finder_reward_total = if draft.finder_reward.is_empty() {
                    0.0
                } else {
                    FINDER_REWARD_RATE * totals.fee_base()
                };
            }
            RecomputeStage::ManagementFee => {
                totals.management_fee_total = if draft.management_fee.is_empty() {
                    0.0
                } else {
                    MANAGEMENT_FEE_RATE * totals.fee_base()
                };
            }
            RecomputeStage::Sst => {
                totals.sst_amount = if draft.sst_enabled {
                    SST_RATE * totals.subtotal_before_sst()
                } else {
                    0.0
                };
            }
            RecomputeStage::Total => {
                totals.total_cost = totals.subtotal_before_sst() + totals.sst_amount;
            }
        }
    }
}

/// Pure derivation of every section total from the current line items.
pub fn derive_totals(draft: &ProjectDraft) -> CostTotals {
    let mut totals = CostTotals::default();
    for stage in RecomputeStage::ORDER {
        stage.apply(draft, &mut totals);
    }
    totals
}

impl ProjectDraft {
    /// Section totals and grand total. Does not touch the draft.
    pub fn totals(&self) -> CostTotals {
        derive_totals(self)
    }

    /// Re-derives every total and re-prices the auto-priced line items.
    pub fn recompute(&mut self) -> CostTotals {
        let totals = derive_totals(self);

        let finders = self.finder_reward.len();
        for item in &mut self.finder_reward {
            item.payment_amount = totals.finder_reward_total / finders as f64;
            item.percent = FINDER_REWARD_RATE * 100.0 / finders as f64;
        }

        let orgs = self.management_fee.len();
        for item in &mut self.management_fee {
            item.payment_amount = totals.management_fee_total / orgs as f64;
            item.percent = 100.0 / orgs as f64;
        }

        self.sst_percentage = if self.sst_enabled { SST_PERCENTAGE } else { 0.0 };
        self.sst_allocation.amount_due = totals.sst_amount;
        self.totals = totals;

        tracing::debug!(
            consultants = totals.consultant_payments_total,
            direct_cost = totals.direct_cost_total,
            finder_reward = totals.finder_reward_total,
            management_fee = totals.management_fee_total,
            sst = totals.sst_amount,
            total = totals.total_cost,
            "Recomputed cost breakdown"
        );
        totals
    }

    /// Adds a consultant from the reference list. The first consultant on an
    /// empty roster leads the project.
    pub fn add_consultant(&mut self, consultant: &Consultant) -> Result<()> {
        if self
            .consultants
            .iter()
            .any(|c| c.consultant_id == consultant.id)
        {
            return Err(CostingError::DuplicateConsultant {
                consultant_id: consultant.id,
            });
        }

        let mut row = ConsultantAllocation::from(consultant);
        if self.consultants.is_empty() {
            row.project_role = ProjectRole::Leader;
        }
        self.consultants.push(row);
        self.recompute();
        Ok(())
    }

    pub fn remove_consultant(&mut self, consultant_id: i64) -> Result<ConsultantAllocation> {
        let index = self
            .consultants
            .iter()
            .position(|c| c.consultant_id == consultant_id)
            .ok_or(CostingError::ConsultantNotFound { consultant_id })?;

        let removed = self.consultants.remove(index);
        if removed.project_role == ProjectRole::Leader {
            if let Some(first) = self.consultants.first_mut() {
                first.project_role = ProjectRole::Leader;
            }
        }
        self.recompute();
        Ok(removed)
    }

    /// Makes `consultant_id` the only leader.
    pub fn set_leader(&mut self, consultant_id: i64) -> Result<()> {
        if !self
            .consultants
            .iter()
            .any(|c| c.consultant_id == consultant_id)
        {
            return Err(CostingError::ConsultantNotFound { consultant_id });
        }

        for consultant in &mut self.consultants {
            consultant.project_role = if consultant.consultant_id == consultant_id {
                ProjectRole::Leader
            } else {
                ProjectRole::Member
            };
        }
        Ok(())
    }

    /// Unknown staff ids are ignored; returns whether a consultant matched.
    pub fn set_consultant_payment(&mut self, staff_id: &str, amount: f64) -> bool {
        let amount = sanitize_amount(amount);
        let found = match self.consultants.iter_mut().find(|c| c.staff_id == staff_id) {
            Some(consultant) => {
                consultant.payment_amount = amount;
                true
            }
            None => {
                tracing::warn!("No consultant with staff id {} on this draft", staff_id);
                false
            }
        };
        self.recompute();
        found
    }

    pub fn add_direct_cost(&mut self, mut item: DirectCostItem) -> usize {
        item.payment_amount = sanitize_amount(item.payment_amount);
        self.direct_cost.push(item);
        self.recompute();
        self.direct_cost.len() - 1
    }

    pub fn remove_direct_cost(&mut self, index: usize) -> Result<DirectCostItem> {
        if index >= self.direct_cost.len() {
            return Err(not_found("directCost", index));
        }
        let removed = self.direct_cost.remove(index);
        self.recompute();
        Ok(removed)
    }

    pub fn edit_direct_cost(&mut self, index: usize, field: DirectCostField) -> Result<()> {
        let item = self
            .direct_cost
            .get_mut(index)
            .ok_or_else(|| not_found("directCost", index))?;

        match field {
            DirectCostField::Item(name) => item.item = name,
            DirectCostField::PaymentAmount(amount) => item.payment_amount = sanitize_amount(amount),
        }
        self.recompute();
        Ok(())
    }

    /// Adds a finder. Amount and percent are never typed in, the section
    /// total is split evenly between all finders.
    pub fn add_finder_reward(&mut self) -> usize {
        self.finder_reward.push(FinderRewardItem::default());
        self.recompute();
        self.finder_reward.len() - 1
    }

    pub fn rename_finder_reward(&mut self, index: usize, finder_name: &str) -> Result<()> {
        let item = self
            .finder_reward
            .get_mut(index)
            .ok_or_else(|| not_found("finderReward", index))?;
        item.finder_name = finder_name.to_string();
        Ok(())
    }

    pub fn remove_finder_reward(&mut self, index: usize) -> Result<FinderRewardItem> {
        if index >= self.finder_reward.len() {
            return Err(not_found("finderReward", index));
        }
        let removed = self.finder_reward.remove(index);
        self.recompute();
        Ok(removed)
    }

    /// Adds a management fee entry, optionally with its organization already
    /// chosen. Rejected once two entries exist or when `org` is taken.
    pub fn add_management_fee(&mut self, org: Option<ManagementOrg>) -> Result<usize> {
        if self.management_fee.len() >= MAX_MANAGEMENT_FEE_ENTRIES {
            return Err(CostingError::ManagementFeeLimit {
                max: MAX_MANAGEMENT_FEE_ENTRIES,
            });
        }
        if let Some(org) = org {
            self.ensure_org_available(org, None)?;
        }

        self.management_fee.push(ManagementFeeItem {
            managed_by: org,
            ..Default::default()
        });
        self.recompute();
        Ok(self.management_fee.len() - 1)
    }

    pub fn select_management_org(&mut self, index: usize, org: ManagementOrg) -> Result<()> {
        if index >= self.management_fee.len() {
            return Err(not_found("managementFee", index));
        }
        self.ensure_org_available(org, Some(index))?;
        self.management_fee[index].managed_by = Some(org);
        Ok(())
    }

    pub fn remove_management_fee(&mut self, index: usize) -> Result<ManagementFeeItem> {
        if index >= self.management_fee.len() {
            return Err(not_found("managementFee", index));
        }
        let removed = self.management_fee.remove(index);
        self.recompute();
        Ok(removed)
    }

    pub fn toggle_sst(&mut self, enabled: bool) -> CostTotals {
        self.sst_enabled = enabled;
        self.recompute()
    }

    fn ensure_org_available(&self, org: ManagementOrg, except: Option<usize>) -> Result<()> {
        let taken = self
            .management_fee
            .iter()
            .enumerate()
            .any(|(i, item)| Some(i) != except && item.managed_by == Some(org));
        if taken {
            return Err(CostingError::DuplicateManagementOrg {
                org: org.to_string(),
            });
        }
        Ok(())
    }
}

fn not_found(section: &str, index: usize) -> CostingError {
    CostingError::ItemNotFound {
        section: section.to_string(),
        index,
    }
}
