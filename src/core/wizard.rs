//! Project creation wizard: the single owner of a draft while it is being
//! built. Step gating, and the one asynchronous call (final submit), live here.

use crate::core::allocator::PaymentAllocator;
use crate::core::submission::{assemble, ProjectPayload};
use crate::domain::model::{BankField, Client, Consultant, ProjectDraft, ProjectRole, SdgGoal, SectionKey};
use crate::domain::ports::{CreateProjectResponse, ProjectApi};
use crate::utils::error::{CostingError, Result};
use crate::utils::validation::{validate_date_order, validate_non_empty_string};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum WizardStep {
    ProjectDetails,
    ConsultantDetails,
    CostBreakdown,
    InitialPayment,
    Review,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        WizardStep::ProjectDetails,
        WizardStep::ConsultantDetails,
        WizardStep::CostBreakdown,
        WizardStep::InitialPayment,
        WizardStep::Review,
    ];

    pub fn number(&self) -> usize {
        *self as usize + 1
    }

    fn next(self) -> Self {
        Self::ALL.get(self as usize + 1).copied().unwrap_or(self)
    }

    fn previous(self) -> Self {
        match self as usize {
            0 => self,
            i => Self::ALL[i - 1],
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::ProjectDetails => "Project Details",
            WizardStep::ConsultantDetails => "Consultant Details",
            WizardStep::CostBreakdown => "Cost Breakdowns",
            WizardStep::InitialPayment => "Initial Payment Received",
            WizardStep::Review => "Review & Submit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub consultants: Vec<Consultant>,
    pub clients: Vec<Client>,
    pub sdg_goals: Vec<SdgGoal>,
}

fn incomplete(step: WizardStep, reason: impl Into<String>) -> CostingError {
    CostingError::StepIncomplete {
        step: step.to_string(),
        reason: reason.into(),
    }
}

/// Checks that `step` has everything it needs before the wizard moves past it.
pub fn check_step(draft: &ProjectDraft, step: WizardStep) -> Result<()> {
    match step {
        WizardStep::ProjectDetails => {
            let details = &draft.details;
            validate_non_empty_string("projectTitle", &details.project_title)
                .map_err(|_| incomplete(step, "project title is required"))?;
            validate_non_empty_string("projectCode", &details.project_code)
                .map_err(|_| incomplete(step, "project code is required"))?;
            validate_date_order("endDate", details.start_date, details.end_date)
                .map_err(|_| incomplete(step, "end date is before start date"))
        }
        WizardStep::ConsultantDetails => {
            if draft.consultants.is_empty() {
                return Err(incomplete(step, "add at least one consultant"));
            }
            let leaders = draft
                .consultants
                .iter()
                .filter(|c| c.project_role == ProjectRole::Leader)
                .count();
            if leaders != 1 {
                return Err(incomplete(
                    step,
                    format!("exactly one project leader is required, found {}", leaders),
                ));
            }
            Ok(())
        }
        WizardStep::CostBreakdown => {
            if let Some(index) = draft
                .management_fee
                .iter()
                .position(|m| m.managed_by.is_none())
            {
                return Err(incomplete(
                    step,
                    format!("management fee entry {} has no organization", index + 1),
                ));
            }
            Ok(())
        }
        WizardStep::InitialPayment => PaymentAllocator::ensure_complete(draft),
        WizardStep::Review => Ok(()),
    }
}

pub struct ProjectWizard<A: ProjectApi> {
    api: A,
    draft: ProjectDraft,
    allocator: PaymentAllocator,
    step: WizardStep,
    submitting: bool,
}

impl<A: ProjectApi> ProjectWizard<A> {
    /// Opens the wizard on an empty draft.
    pub fn new(api: A) -> Self {
        Self {
            api,
            draft: ProjectDraft::new(),
            allocator: PaymentAllocator::new(),
            step: WizardStep::ProjectDetails,
            submitting: false,
        }
    }

    /// Resumes a saved draft at the first step that still needs work.
    pub fn resume(api: A, mut draft: ProjectDraft) -> Self {
        draft.recompute();
        let step = WizardStep::ALL
            .into_iter()
            .find(|step| check_step(&draft, *step).is_err())
            .unwrap_or(WizardStep::Review);
        tracing::info!("Resuming draft at step {} ({})", step.number(), step);

        Self {
            api,
            draft,
            allocator: PaymentAllocator::new(),
            step,
            submitting: false,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &ProjectDraft {
        &self.draft
    }

    /// Cost composer operations recompute on their own; details edits need
    /// nothing derived.
    pub fn draft_mut(&mut self) -> &mut ProjectDraft {
        &mut self.draft
    }

    pub fn allocator(&self) -> &PaymentAllocator {
        &self.allocator
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub async fn load_reference_data(&self) -> Result<ReferenceData> {
        let (consultants, clients, sdg_goals) = tokio::try_join!(
            self.api.consultant_list(),
            self.api.client_list(),
            self.api.sdg_list()
        )?;
        tracing::debug!(
            "Loaded {} consultants, {} clients, {} SDG goals",
            consultants.len(),
            clients.len(),
            sdg_goals.len()
        );
        Ok(ReferenceData {
            consultants,
            clients,
            sdg_goals,
        })
    }

    pub fn set_total_payment_received(&mut self, amount: f64) -> Result<()> {
        self.allocator
            .set_total_payment_received(&mut self.draft, amount)
    }

    pub fn allocate(&mut self, section: SectionKey, index: usize, amount: f64) -> Result<()> {
        self.allocator
            .allocate(&mut self.draft, section, index, amount)
    }

    pub fn set_bank_detail(
        &mut self,
        section: SectionKey,
        index: usize,
        field: BankField,
        value: &str,
    ) -> Result<()> {
        self.allocator
            .set_bank_detail(&mut self.draft, section, index, field, value)
    }

    pub fn auto_allocate(&mut self) -> Result<()> {
        self.allocator.auto_allocate(&mut self.draft)
    }

    /// Moves forward if the current step is complete.
    pub fn next(&mut self) -> Result<WizardStep> {
        check_step(&self.draft, self.step)?;
        if self.step == WizardStep::CostBreakdown {
            self.draft.recompute();
        }
        self.step = self.step.next();
        Ok(self.step)
    }

    pub fn back(&mut self) -> WizardStep {
        self.step = self.step.previous();
        self.step
    }

    /// Validates every step and produces the payload, marking the wizard as
    /// submitting until [`finish_submission`](Self::finish_submission).
    pub fn begin_submission(&mut self) -> Result<ProjectPayload> {
        if self.submitting {
            return Err(CostingError::SubmissionInProgress);
        }
        if self.step != WizardStep::Review {
            return Err(incomplete(self.step, "submit is only available on review"));
        }
        for step in WizardStep::ALL {
            check_step(&self.draft, step)?;
        }

        self.submitting = true;
        Ok(assemble(&self.draft))
    }

    /// On success the draft is discarded and the wizard starts over; on
    /// failure every edit is kept so the user can retry.
    pub fn finish_submission(
        &mut self,
        outcome: Result<CreateProjectResponse>,
    ) -> Result<CreateProjectResponse> {
        self.submitting = false;

        let outcome = outcome.and_then(|response| {
            if response.success {
                Ok(response)
            } else {
                Err(CostingError::RequestFailed {
                    status: 200,
                    message: response
                        .message
                        .unwrap_or_else(|| "project was not created".to_string()),
                })
            }
        });

        match outcome {
            Ok(response) => {
                tracing::info!("✅ Project created with id {:?}", response.id);
                self.draft = ProjectDraft::new();
                self.allocator = PaymentAllocator::new();
                self.step = WizardStep::ProjectDetails;
                Ok(response)
            }
            Err(e) => {
                tracing::warn!("❌ Project creation failed, draft kept for retry: {}", e);
                Err(e)
            }
        }
    }

    pub async fn submit(&mut self) -> Result<CreateProjectResponse> {
        let payload = self.begin_submission()?;
        tracing::info!("Submitting project {}", payload.project_code);
        let outcome = self.api.create_project(&payload).await;
        self.finish_submission(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memo::{MemoRecord, PaymentMemo, ProjectCostDetail};
    use crate::domain::model::{BankDetails, ConsultantBank, DirectCostItem, ManagementOrg};
    use crate::domain::ports::CreateMemoResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct MockApi {
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProjectApi for MockApi {
        async fn create_project(&self, _payload: &ProjectPayload) -> Result<CreateProjectResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CostingError::ServerError {
                    status: 500,
                    message: "database unavailable".to_string(),
                })
            } else {
                Ok(CreateProjectResponse {
                    success: true,
                    id: Some(101),
                    message: None,
                })
            }
        }

        async fn consultant_list(&self) -> Result<Vec<Consultant>> {
            Ok(vec![Consultant {
                id: 1,
                staff_id: "S001".to_string(),
                name: "Aminah".to_string(),
                ..Default::default()
            }])
        }

        async fn client_list(&self) -> Result<Vec<Client>> {
            Ok(vec![])
        }

        async fn sdg_list(&self) -> Result<Vec<SdgGoal>> {
            Ok(vec![SdgGoal {
                id: 4,
                name: "Quality Education".to_string(),
                color: None,
            }])
        }

        async fn cost_detail(&self, _project_id: i64) -> Result<ProjectCostDetail> {
            Ok(ProjectCostDetail::default())
        }

        async fn create_memo(&self, _memo: &PaymentMemo) -> Result<CreateMemoResponse> {
            Err(CostingError::NotFound {
                message: "memo endpoints are not used by the wizard".to_string(),
            })
        }

        async fn memos_by_project(&self, _project_id: i64) -> Result<Vec<MemoRecord>> {
            Ok(vec![])
        }

        async fn memo(&self, memo_id: i64) -> Result<MemoRecord> {
            Err(CostingError::NotFound {
                message: format!("memo {}", memo_id),
            })
        }

        async fn mark_memo_paid(&self, _memo_id: i64) -> Result<()> {
            Ok(())
        }
    }

    fn ready_wizard(api: MockApi) -> ProjectWizard<MockApi> {
        let mut wizard = ProjectWizard::new(api);
        let draft = wizard.draft_mut();
        draft.details.project_title = "Water audit".to_string();
        draft.details.project_code = "P-001".to_string();
        draft
            .add_consultant(&Consultant {
                id: 1,
                staff_id: "S001".to_string(),
                name: "Aminah".to_string(),
                bank: Some(ConsultantBank {
                    id: 9,
                    name: "Maybank".to_string(),
                    acc_name: "Aminah".to_string(),
                    acc_no: "1140".to_string(),
                }),
                ..Default::default()
            })
            .unwrap();
        draft.set_consultant_payment("S001", 8000.0);
        draft.add_direct_cost(DirectCostItem::new("Lab test", 2000.0));
        draft.add_management_fee(Some(ManagementOrg::Utem)).unwrap();

        assert_eq!(wizard.next().unwrap(), WizardStep::ConsultantDetails);
        assert_eq!(wizard.next().unwrap(), WizardStep::CostBreakdown);
        assert_eq!(wizard.next().unwrap(), WizardStep::InitialPayment);

        let total = wizard.draft().totals.total_cost;
        wizard.set_total_payment_received(total).unwrap();
        wizard.auto_allocate().unwrap();
        assert!(wizard.next().is_err());

        wizard.draft_mut().direct_cost[0].bank = BankDetails::new("RHB Bank", "Lab Sdn Bhd", "21");
        wizard.draft_mut().management_fee[0].bank = BankDetails::new("Bank Islam", "UTeM", "77");
        assert_eq!(wizard.next().unwrap(), WizardStep::Review);
        wizard
    }

    #[test]
    fn test_step_gating() {
        let mut wizard = ProjectWizard::new(MockApi::default());
        assert!(matches!(
            wizard.next(),
            Err(CostingError::StepIncomplete { .. })
        ));
        assert_eq!(wizard.back(), WizardStep::ProjectDetails);
        assert_eq!(WizardStep::Review.next(), WizardStep::Review);
        assert_eq!(WizardStep::Review.number(), 5);
    }

    #[test]
    fn test_submit_success_discards_draft() {
        let api = MockApi::default();
        let calls = api.calls.clone();
        let mut wizard = ready_wizard(api);

        let response = tokio_test::block_on(wizard.submit()).unwrap();
        assert_eq!(response.id, Some(101));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(wizard.step(), WizardStep::ProjectDetails);
        assert!(wizard.draft().consultants.is_empty());
        assert!(!wizard.is_submitting());
    }

    #[test]
    fn test_submit_failure_keeps_draft() {
        let mut wizard = ready_wizard(MockApi {
            fail: true,
            ..Default::default()
        });
        let before = wizard.draft().clone();

        let err = tokio_test::block_on(wizard.submit()).unwrap_err();
        assert!(matches!(err, CostingError::ServerError { status: 500, .. }));
        assert_eq!(wizard.draft(), &before);
        assert_eq!(wizard.step(), WizardStep::Review);
        assert!(!wizard.is_submitting());
    }

    #[test]
    fn test_cost_edit_after_allocating_blocks_submit() {
        let api = MockApi::default();
        let mut wizard = ready_wizard(api.clone());

        wizard.draft_mut().toggle_sst(false);
        wizard
            .draft_mut()
            .edit_direct_cost(0, crate::domain::model::DirectCostField::PaymentAmount(500.0))
            .unwrap();

        let err = tokio_test::block_on(wizard.submit()).unwrap_err();
        assert!(matches!(err, CostingError::OverReceipt { .. }));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert!(!wizard.is_submitting());
        assert_eq!(wizard.draft().direct_cost[0].payment_amount, 500.0);
    }

    #[test]
    fn test_second_submission_is_rejected_while_pending() {
        let mut wizard = ready_wizard(MockApi::default());
        wizard.begin_submission().unwrap();
        assert!(matches!(
            wizard.begin_submission(),
            Err(CostingError::SubmissionInProgress)
        ));
        assert!(wizard.is_submitting());
    }

    #[test]
    fn test_resume_finds_first_incomplete_step() {
        let wizard = ready_wizard(MockApi::default());
        let mut draft = wizard.draft().clone();
        let resumed = ProjectWizard::resume(MockApi::default(), draft.clone());
        assert_eq!(resumed.step(), WizardStep::Review);

        draft.consultants[0].project_role = ProjectRole::Member;
        let resumed = ProjectWizard::resume(MockApi::default(), draft);
        assert_eq!(resumed.step(), WizardStep::ConsultantDetails);
    }

    #[test]
    fn test_load_reference_data() {
        let wizard = ProjectWizard::new(MockApi::default());
        let data = tokio_test::block_on(wizard.load_reference_data()).unwrap();
        assert_eq!(data.consultants.len(), 1);
        assert_eq!(data.sdg_goals[0].name, "Quality Education");
    }
}
