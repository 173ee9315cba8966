//! Payment allocator: reconciles the payment received against every cost
//! line item and tracks field-level validation messages.

use crate::domain::model::{field_key, Allocatable, BankField, ProjectDraft, SectionKey, BANKS};
use crate::utils::error::{CostingError, Result};
use crate::utils::money::{amounts_equal, exceeds, format_rm, is_zero, round2, sanitize_amount};
use crate::utils::validation::is_filled;
use serde::Serialize;
use std::collections::BTreeMap;

pub const TOTAL_PAYMENT_KEY: &str = "totalPayment";
pub const ALLOCATED_AMOUNT_FIELD: &str = "allocatedAmount";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AllocationStatus {
    /// No payment received entered yet.
    Unset,
    /// Payment received is larger than the project cost, usually after a
    /// cost was lowered on an earlier step.
    OverReceipt,
    /// At least one item holds more than `min(payment, received)`.
    OverCap,
    PartiallyAllocated,
    OverAllocated,
    /// Balanced, but an allocated recipient is missing bank details.
    AwaitingBankDetails,
    FullyAllocated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummary {
    pub section: String,
    pub title: &'static str,
    pub allocated: f64,
    pub max: f64,
}

/// Share of `section_total` owed to an item costing `item_amount`.
pub fn proportional_share(section_total: f64, item_amount: f64) -> f64 {
    if section_total > 0.0 {
        section_total * (item_amount / section_total)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentAllocator {
    errors: BTreeMap<String, String>,
}

impl PaymentAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field key to message, e.g. `directCost-0-allocatedAmount`.
    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn error_for(&self, key: &str) -> Option<&str> {
        self.errors.get(key).map(String::as_str)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn reject(&mut self, key: &str, err: CostingError) -> CostingError {
        tracing::debug!("Rejected {}: {}", key, err);
        self.errors.insert(key.to_string(), err.to_string());
        err
    }

    pub fn set_total_payment_received(&mut self, draft: &mut ProjectDraft, amount: f64) -> Result<()> {
        let amount = sanitize_amount(amount);
        let total_cost = draft.totals.total_cost;

        if exceeds(amount, total_cost) {
            return Err(self.reject(
                TOTAL_PAYMENT_KEY,
                CostingError::OverReceipt { amount, total_cost },
            ));
        }

        draft.total_payment_received = amount;
        self.errors.remove(TOTAL_PAYMENT_KEY);

        // 已分配的金額保留，由使用者自行調整
        let allocated = Self::allocated_total(draft);
        if exceeds(allocated, amount) {
            let message = format!(
                "Allocated {} exceeds payment received {}",
                format_rm(allocated),
                format_rm(amount)
            );
            tracing::warn!("{}", message);
            self.errors.insert(TOTAL_PAYMENT_KEY.to_string(), message);
        }
        Ok(())
    }

    /// Sets one item's allocation. Rejected amounts leave the draft untouched
    /// and are recorded under the item's field key.
    pub fn allocate(
        &mut self,
        draft: &mut ProjectDraft,
        section: SectionKey,
        index: usize,
        amount: f64,
    ) -> Result<()> {
        let key = field_key(section, index, ALLOCATED_AMOUNT_FIELD);
        let received = draft.total_payment_received;

        let (label, payment_amount, current) = match draft.allocatable(section, index) {
            Some(item) => (item.label(), item.payment_amount(), item.allocated_amount()),
            None => {
                return Err(CostingError::ItemNotFound {
                    section: section.to_string(),
                    index,
                })
            }
        };

        let cap = payment_amount.min(received);
        if !amount.is_finite() || amount < 0.0 || exceeds(round2(amount), cap) {
            return Err(self.reject(
                &key,
                CostingError::OutOfRangeAllocation {
                    field: key.clone(),
                    amount,
                    max: cap,
                },
            ));
        }

        // 以「分」為最小單位
        let amount = round2(amount);
        let new_total = Self::allocated_total(draft) - current + amount;
        if exceeds(new_total, received) {
            return Err(self.reject(
                &key,
                CostingError::OverAllocation {
                    field: key.clone(),
                    excess: new_total - received,
                },
            ));
        }

        if let Some(item) = draft.allocatable_mut(section, index) {
            item.set_allocated_amount(amount);
        }
        self.errors.remove(&key);
        tracing::debug!("Allocated {} to {} ({})", format_rm(amount), label, key);
        Ok(())
    }

    pub fn set_bank_detail(
        &mut self,
        draft: &mut ProjectDraft,
        section: SectionKey,
        index: usize,
        field: BankField,
        value: &str,
    ) -> Result<()> {
        let item = draft
            .allocatable_mut(section, index)
            .ok_or_else(|| CostingError::ItemNotFound {
                section: section.to_string(),
                index,
            })?;
        let bank = item
            .bank_details_mut()
            .ok_or(CostingError::ReadOnlyBankDetails)?;
        if field == BankField::BankName && is_filled(value) && !BANKS.contains(&value.trim()) {
            tracing::warn!("Bank '{}' is not in the portal's bank list", value.trim());
        }
        bank.set(field, value);
        Ok(())
    }

    /// Settles every item in full. Only available when the payment received
    /// covers the whole project cost.
    pub fn auto_allocate(&mut self, draft: &mut ProjectDraft) -> Result<()> {
        let received = draft.total_payment_received;
        let total_cost = draft.totals.total_cost;
        if is_zero(received) || !amounts_equal(received, total_cost) {
            return Err(CostingError::AutoAllocateUnavailable {
                received,
                total_cost,
            });
        }

        for consultant in &mut draft.consultants {
            consultant.allocated_amount = consultant.payment_amount;
        }

        let direct_total: f64 = draft.direct_cost.iter().map(|i| i.payment_amount).sum();
        for item in &mut draft.direct_cost {
            item.allocated_amount = proportional_share(direct_total, item.payment_amount);
        }

        let finder_total: f64 = draft.finder_reward.iter().map(|i| i.payment_amount).sum();
        for item in &mut draft.finder_reward {
            item.allocated_amount = proportional_share(finder_total, item.payment_amount);
        }

        for item in &mut draft.management_fee {
            item.allocated_amount = item.payment_amount;
        }

        draft.sst_allocation.allocated_amount = draft.sst_allocation.amount_due;

        self.errors
            .retain(|key, _| !key.ends_with(ALLOCATED_AMOUNT_FIELD) && key != TOTAL_PAYMENT_KEY);
        tracing::info!(
            "Auto-allocated {} across {} items",
            format_rm(received),
            draft.allocatables().len()
        );
        Ok(())
    }

    pub fn allocated_total(draft: &ProjectDraft) -> f64 {
        draft
            .allocatables()
            .iter()
            .map(|(_, _, item)| item.allocated_amount())
            .sum()
    }

    pub fn remaining_to_allocate(draft: &ProjectDraft) -> f64 {
        draft.total_payment_received - Self::allocated_total(draft)
    }

    /// Keys (`section-index`) of allocated items whose bank details are incomplete.
    pub fn incomplete_bank_details(draft: &ProjectDraft) -> Vec<String> {
        draft
            .allocatables()
            .into_iter()
            .filter(|(_, _, item)| item.needs_bank_details())
            .map(|(section, index, _)| format!("{}-{}", section, index))
            .collect()
    }

    pub fn is_complete(draft: &ProjectDraft) -> bool {
        is_zero(Self::remaining_to_allocate(draft))
            && Self::incomplete_bank_details(draft).is_empty()
    }

    /// Items whose allocation no longer fits `min(payment, received)`, as
    /// `(field key, allocated, cap)`. Cost edits after allocating can leave
    /// these behind.
    pub fn over_cap_items(draft: &ProjectDraft) -> Vec<(String, f64, f64)> {
        let received = draft.total_payment_received;
        draft
            .allocatables()
            .into_iter()
            .filter_map(|(section, index, item)| {
                let cap = item.payment_amount().min(received);
                let allocated = item.allocated_amount();
                exceeds(allocated, cap)
                    .then(|| (field_key(section, index, ALLOCATED_AMOUNT_FIELD), allocated, cap))
            })
            .collect()
    }

    /// Re-derives the allocation state from the draft alone, so drafts edited
    /// after allocating (or loaded from disk) are judged the same way.
    pub fn status(draft: &ProjectDraft) -> AllocationStatus {
        let received = draft.total_payment_received;
        let allocated = Self::allocated_total(draft);
        if is_zero(received) && is_zero(allocated) {
            return AllocationStatus::Unset;
        }

        if exceeds(received, draft.totals.total_cost) {
            AllocationStatus::OverReceipt
        } else if !Self::over_cap_items(draft).is_empty() {
            AllocationStatus::OverCap
        } else if exceeds(allocated, received) {
            AllocationStatus::OverAllocated
        } else if !amounts_equal(allocated, received) {
            AllocationStatus::PartiallyAllocated
        } else if !Self::incomplete_bank_details(draft).is_empty() {
            AllocationStatus::AwaitingBankDetails
        } else {
            AllocationStatus::FullyAllocated
        }
    }

    /// Errors describing why the allocation step cannot be left yet.
    pub fn ensure_complete(draft: &ProjectDraft) -> Result<()> {
        match Self::status(draft) {
            AllocationStatus::FullyAllocated => Ok(()),
            AllocationStatus::Unset => Err(CostingError::StepIncomplete {
                step: "InitialPayment".to_string(),
                reason: "total payment received has not been entered".to_string(),
            }),
            AllocationStatus::OverReceipt => Err(CostingError::OverReceipt {
                amount: draft.total_payment_received,
                total_cost: draft.totals.total_cost,
            }),
            AllocationStatus::OverCap => {
                let (field, amount, max) = Self::over_cap_items(draft)
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                Err(CostingError::OutOfRangeAllocation { field, amount, max })
            }
            AllocationStatus::PartiallyAllocated => Err(CostingError::StepIncomplete {
                step: "InitialPayment".to_string(),
                reason: format!(
                    "{} remains to be allocated",
                    format_rm(Self::remaining_to_allocate(draft))
                ),
            }),
            AllocationStatus::OverAllocated => Err(CostingError::OverAllocation {
                field: TOTAL_PAYMENT_KEY.to_string(),
                excess: -Self::remaining_to_allocate(draft),
            }),
            AllocationStatus::AwaitingBankDetails => Err(CostingError::IncompleteBankDetails {
                fields: Self::incomplete_bank_details(draft),
            }),
        }
    }

    /// Allocated share of the payment received, 0 to 100.
    pub fn progress_percent(draft: &ProjectDraft) -> u8 {
        let received = draft.total_payment_received;
        if received <= 0.0 {
            return 0;
        }
        let pct = (Self::allocated_total(draft) / received * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    pub fn section_summaries(draft: &ProjectDraft) -> Vec<SectionSummary> {
        SectionKey::ALL
            .into_iter()
            .map(|section| {
                let (allocated, max) = (0..draft.section_len(section))
                    .filter_map(|i| draft.allocatable(section, i))
                    .fold((0.0, 0.0), |(a, m), item| {
                        (a + item.allocated_amount(), m + item.payment_amount())
                    });
                SectionSummary {
                    section: section.to_string(),
                    title: section.title(),
                    allocated,
                    max,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        BankDetails, Consultant, ConsultantBank, DirectCostItem, ManagementOrg,
    };

    fn full_draft() -> ProjectDraft {
        let mut draft = ProjectDraft::new();
        for (id, staff) in [(1, "A"), (2, "B")] {
            draft
                .add_consultant(&Consultant {
                    id,
                    staff_id: staff.to_string(),
                    name: format!("Consultant {}", staff),
                    bank: Some(ConsultantBank {
                        id,
                        name: "Maybank".to_string(),
                        acc_name: format!("Consultant {}", staff),
                        acc_no: format!("55{}", id),
                    }),
                    ..Default::default()
                })
                .unwrap();
        }
        draft.set_consultant_payment("A", 10000.0);
        draft.set_consultant_payment("B", 5000.0);
        draft.add_direct_cost(DirectCostItem::new("Travel", 2000.0));
        draft.add_management_fee(Some(ManagementOrg::Utem)).unwrap();
        draft.toggle_sst(true);
        draft
    }

    #[test]
    fn test_over_receipt_leaves_value_unchanged() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        allocator.set_total_payment_received(&mut draft, 5000.0).unwrap();

        let err = allocator
            .set_total_payment_received(&mut draft, 25000.0)
            .unwrap_err();
        assert!(matches!(err, CostingError::OverReceipt { .. }));
        assert_eq!(draft.total_payment_received, 5000.0);
        assert!(allocator.error_for(TOTAL_PAYMENT_KEY).is_some());

        allocator.set_total_payment_received(&mut draft, 6000.0).unwrap();
        assert!(allocator.error_for(TOTAL_PAYMENT_KEY).is_none());
    }

    #[test]
    fn test_allocate_rejects_over_item_cap() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        allocator.set_total_payment_received(&mut draft, 10000.0).unwrap();

        let err = allocator
            .allocate(&mut draft, SectionKey::DirectCost, 0, 2500.0)
            .unwrap_err();
        assert!(matches!(err, CostingError::OutOfRangeAllocation { max, .. } if max == 2000.0));
        assert_eq!(draft.direct_cost[0].allocated_amount, 0.0);
        assert!(allocator
            .error_for("directCost-0-allocatedAmount")
            .unwrap()
            .contains("2000.00"));

        allocator
            .allocate(&mut draft, SectionKey::DirectCost, 0, 2000.0)
            .unwrap();
        assert!(allocator.error_for("directCost-0-allocatedAmount").is_none());
    }

    #[test]
    fn test_allocate_rejects_over_receipt_cap_and_negative() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        allocator.set_total_payment_received(&mut draft, 3000.0).unwrap();

        assert!(allocator
            .allocate(&mut draft, SectionKey::Consultants, 0, 4000.0)
            .is_err());
        assert!(allocator
            .allocate(&mut draft, SectionKey::Consultants, 0, -1.0)
            .is_err());
        assert!(allocator
            .allocate(&mut draft, SectionKey::Consultants, 9, 1.0)
            .is_err());
        assert_eq!(PaymentAllocator::allocated_total(&draft), 0.0);
    }

    #[test]
    fn test_allocate_rejects_aggregate_overflow() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        allocator.set_total_payment_received(&mut draft, 3000.0).unwrap();

        allocator
            .allocate(&mut draft, SectionKey::Consultants, 0, 2500.0)
            .unwrap();
        let err = allocator
            .allocate(&mut draft, SectionKey::DirectCost, 0, 1000.0)
            .unwrap_err();
        assert!(matches!(err, CostingError::OverAllocation { ref field, .. } if field == "directCost-0-allocatedAmount"));
        assert_eq!(PaymentAllocator::allocated_total(&draft), 2500.0);

        // 修改同一筆不應重複計算
        allocator
            .allocate(&mut draft, SectionKey::Consultants, 0, 3000.0)
            .unwrap();
        assert_eq!(PaymentAllocator::remaining_to_allocate(&draft), 0.0);
    }

    #[test]
    fn test_status_transitions() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        assert_eq!(PaymentAllocator::status(&draft), AllocationStatus::Unset);

        allocator.set_total_payment_received(&mut draft, 2000.0).unwrap();
        assert_eq!(
            PaymentAllocator::status(&draft),
            AllocationStatus::PartiallyAllocated
        );

        allocator
            .allocate(&mut draft, SectionKey::DirectCost, 0, 2000.0)
            .unwrap();
        assert_eq!(
            PaymentAllocator::status(&draft),
            AllocationStatus::AwaitingBankDetails
        );

        draft.direct_cost[0].bank = BankDetails::new("CIMB Bank", "Travel Sdn Bhd", "8001");
        assert_eq!(
            PaymentAllocator::status(&draft),
            AllocationStatus::FullyAllocated
        );
        assert!(PaymentAllocator::is_complete(&draft));

        allocator
            .allocate(&mut draft, SectionKey::DirectCost, 0, 1000.0)
            .unwrap();
        allocator
            .allocate(&mut draft, SectionKey::Consultants, 0, 1000.0)
            .unwrap();
        assert_eq!(
            PaymentAllocator::status(&draft),
            AllocationStatus::FullyAllocated
        );

        // 降低收款金額後，超額分配要被標示
        allocator.set_total_payment_received(&mut draft, 1500.0).unwrap();
        assert_eq!(
            PaymentAllocator::status(&draft),
            AllocationStatus::OverAllocated
        );
        assert!(allocator.error_for(TOTAL_PAYMENT_KEY).is_some());
        assert!(matches!(
            PaymentAllocator::ensure_complete(&draft),
            Err(CostingError::OverAllocation { .. })
        ));
    }

    #[test]
    fn test_consultant_bank_is_read_only() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        let err = allocator
            .set_bank_detail(&mut draft, SectionKey::Consultants, 0, BankField::BankName, "X")
            .unwrap_err();
        assert!(matches!(err, CostingError::ReadOnlyBankDetails));

        allocator
            .set_bank_detail(&mut draft, SectionKey::Sst, 0, BankField::BankName, "LHDN")
            .unwrap();
        assert_eq!(draft.sst_allocation.bank.bank_name, "LHDN");
    }

    #[test]
    fn test_auto_allocate_requires_full_receipt() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        allocator.set_total_payment_received(&mut draft, 100.0).unwrap();
        assert!(matches!(
            allocator.auto_allocate(&mut draft),
            Err(CostingError::AutoAllocateUnavailable { .. })
        ));
        assert_eq!(PaymentAllocator::allocated_total(&draft), 0.0);
    }

    #[test]
    fn test_progress_and_summaries() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        assert_eq!(PaymentAllocator::progress_percent(&draft), 0);

        allocator.set_total_payment_received(&mut draft, 4000.0).unwrap();
        allocator
            .allocate(&mut draft, SectionKey::DirectCost, 0, 1000.0)
            .unwrap();
        assert_eq!(PaymentAllocator::progress_percent(&draft), 25);

        let summaries = PaymentAllocator::section_summaries(&draft);
        assert_eq!(summaries.len(), 5);
        assert_eq!(summaries[1].section, "directCost");
        assert_eq!(summaries[1].allocated, 1000.0);
        assert_eq!(summaries[1].max, 2000.0);
    }

    #[test]
    fn test_sub_sen_amounts_compare_at_sen_precision() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        allocator.set_total_payment_received(&mut draft, 3000.0).unwrap();

        let err = allocator
            .allocate(&mut draft, SectionKey::DirectCost, 0, 2000.006)
            .unwrap_err();
        assert!(matches!(err, CostingError::OutOfRangeAllocation { .. }));
        assert_eq!(draft.direct_cost[0].allocated_amount, 0.0);

        // 不足半分的零頭四捨五入，不會超出上限
        allocator
            .allocate(&mut draft, SectionKey::DirectCost, 0, 2000.004)
            .unwrap();
        assert_eq!(draft.direct_cost[0].allocated_amount, 2000.0);

        let err = allocator
            .allocate(&mut draft, SectionKey::Consultants, 0, 1000.006)
            .unwrap_err();
        assert!(matches!(err, CostingError::OverAllocation { .. }));
        allocator
            .allocate(&mut draft, SectionKey::Consultants, 0, 1000.004)
            .unwrap();
        assert_eq!(PaymentAllocator::allocated_total(&draft), 3000.0);
    }

    #[test]
    fn test_lowering_a_cost_after_allocating_reports_over_cap() {
        let mut draft = full_draft();
        let mut allocator = PaymentAllocator::new();
        allocator.set_total_payment_received(&mut draft, 2000.0).unwrap();
        allocator
            .allocate(&mut draft, SectionKey::DirectCost, 0, 2000.0)
            .unwrap();
        draft.direct_cost[0].bank = BankDetails::new("CIMB Bank", "Travel Sdn Bhd", "8001");
        assert_eq!(PaymentAllocator::status(&draft), AllocationStatus::FullyAllocated);

        draft
            .edit_direct_cost(0, crate::domain::model::DirectCostField::PaymentAmount(500.0))
            .unwrap();

        assert_eq!(PaymentAllocator::status(&draft), AllocationStatus::OverCap);
        let over = PaymentAllocator::over_cap_items(&draft);
        assert_eq!(over, vec![("directCost-0-allocatedAmount".to_string(), 2000.0, 500.0)]);
        match PaymentAllocator::ensure_complete(&draft) {
            Err(CostingError::OutOfRangeAllocation { field, amount, max }) => {
                assert_eq!(field, "directCost-0-allocatedAmount");
                assert_eq!(amount, 2000.0);
                assert_eq!(max, 500.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_allocation_without_receipt_is_not_unset() {
        let mut draft = full_draft();
        draft.direct_cost[0].allocated_amount = 100.0;
        assert_eq!(PaymentAllocator::status(&draft), AllocationStatus::OverCap);
        assert!(PaymentAllocator::ensure_complete(&draft).is_err());
    }

    #[test]
    fn test_simple_share_settles_section_and_squared_share_does_not() {
        let amounts = [1500.0, 500.0];
        let total: f64 = amounts.iter().sum();

        let simple: f64 = amounts.iter().map(|a| proportional_share(total, *a)).sum();
        let squared: f64 = amounts.iter().map(|a| a * (a / total)).sum();

        assert!(amounts_equal(simple, total));
        assert!(!amounts_equal(squared, total));
    }
}
