//! Payment memo builder. Every item is held against one line of the
//! project's server-side cost detail and may never take more than that
//! line's unpaid balance, counting the memo's own earlier items.

use crate::domain::memo::{MemoCategory, MemoItem, MemoRecord, MemoStatus, PaymentMemo, ProjectCostDetail};
use crate::domain::ports::{CreateMemoResponse, ProjectApi};
use crate::utils::error::{CostingError, Result};
use crate::utils::money::{exceeds, format_rm, is_zero, round2};
use crate::utils::validation::is_filled;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;

pub const MEMO_AMOUNT_FIELD: &str = "amount";

/// `MEMO/<project code>/<yyyymmdd>-<hhmmss>`
pub fn generate_reference_no(project_code: &str, at: NaiveDateTime) -> String {
    format!("MEMO/{}/{}", project_code.trim(), at.format("%Y%m%d-%H%M%S"))
}

fn memo_field_key(index: usize) -> String {
    format!("items-{}-{}", index, MEMO_AMOUNT_FIELD)
}

/// Memo item as read from an items file: the cost line it pays against
/// plus the payee.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoItemRequest {
    pub category: MemoCategory,
    pub line: usize,
    pub amount: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bank: String,
    #[serde(default)]
    pub acc: String,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Clone)]
struct MemoLine {
    category: MemoCategory,
    line: usize,
    item: MemoItem,
}

pub struct MemoBuilder<'a> {
    detail: &'a ProjectCostDetail,
    reference_no: String,
    project_code: String,
    from: String,
    to: String,
    date: NaiveDate,
    subject: String,
    description: String,
    lines: Vec<MemoLine>,
}

impl<'a> MemoBuilder<'a> {
    /// Starts a memo dated today with a fresh reference number.
    pub fn new(project_code: &str, detail: &'a ProjectCostDetail) -> Self {
        let now = Local::now().naive_local();
        Self {
            detail,
            reference_no: generate_reference_no(project_code, now),
            project_code: project_code.trim().to_string(),
            from: String::new(),
            to: String::new(),
            date: now.date(),
            subject: String::new(),
            description: String::new(),
            lines: Vec::new(),
        }
    }

    pub fn reference_no(&self) -> &str {
        &self.reference_no
    }

    pub fn with_reference_no(mut self, reference_no: &str) -> Self {
        self.reference_no = reference_no.to_string();
        self
    }

    pub fn from(mut self, from: &str) -> Self {
        self.from = from.to_string();
        self
    }

    pub fn to(mut self, to: &str) -> Self {
        self.to = to.to_string();
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn items(&self) -> impl Iterator<Item = &MemoItem> {
        self.lines.iter().map(|l| &l.item)
    }

    pub fn total(&self) -> f64 {
        self.items().map(|i| i.amount).sum()
    }

    /// Unpaid balance of a cost line less what this memo already puts on it.
    /// `skip` leaves one memo item out of the count, for edits.
    pub fn remaining_balance(
        &self,
        category: MemoCategory,
        line: usize,
        skip: Option<usize>,
    ) -> Option<f64> {
        let balance = self.detail.line(category, line)?.balance_unpaid();
        let held: f64 = self
            .lines
            .iter()
            .enumerate()
            .filter(|(i, l)| Some(*i) != skip && l.category == category && l.line == line)
            .map(|(_, l)| l.item.amount)
            .sum();
        Some((balance - held).max(0.0))
    }

    fn check_amount(
        &self,
        index: usize,
        category: MemoCategory,
        line: usize,
        amount: f64,
        skip: Option<usize>,
    ) -> Result<f64> {
        let balance = self
            .remaining_balance(category, line, skip)
            .ok_or_else(|| CostingError::ItemNotFound {
                section: category.to_string(),
                index: line,
            })?;

        if !amount.is_finite() || amount < 0.0 || exceeds(round2(amount), balance) {
            return Err(CostingError::MemoBalanceExceeded {
                field: memo_field_key(index),
                amount,
                balance,
            });
        }
        Ok(round2(amount))
    }

    /// Adds a payee against `line` of `category`. An empty item name takes
    /// the cost line's name, and so does the payee of a consultant line.
    pub fn add_item(&mut self, category: MemoCategory, line: usize, mut item: MemoItem) -> Result<usize> {
        let index = self.lines.len();
        item.amount = self.check_amount(index, category, line, item.amount, None)?;
        item.category = category;

        if let Some(cost_line) = self.detail.line(category, line) {
            if !is_filled(&item.item) {
                item.item = cost_line.name.clone();
            }
            if category.has_profile_payee() && !is_filled(&item.name) {
                item.name = cost_line.name;
            }
        }

        tracing::debug!(
            "Memo item {} holds {} against {}-{}",
            index,
            format_rm(item.amount),
            category,
            line
        );
        self.lines.push(MemoLine { category, line, item });
        Ok(index)
    }

    pub fn add_request(&mut self, request: MemoItemRequest) -> Result<usize> {
        let item = MemoItem::new(&request.name, &request.bank, &request.acc, request.amount)
            .with_justification(&request.justification);
        self.add_item(request.category, request.line, item)
    }

    pub fn set_amount(&mut self, index: usize, amount: f64) -> Result<()> {
        let (category, line) = match self.lines.get(index) {
            Some(l) => (l.category, l.line),
            None => return Err(memo_item_not_found(index)),
        };
        let amount = self.check_amount(index, category, line, amount, Some(index))?;
        self.lines[index].item.amount = amount;
        Ok(())
    }

    pub fn remove_item(&mut self, index: usize) -> Result<MemoItem> {
        if index >= self.lines.len() {
            return Err(memo_item_not_found(index));
        }
        Ok(self.lines.remove(index).item)
    }

    /// Finishes the memo. Header fields, at least one item, and a payee
    /// with a non-zero amount on every item are required.
    pub fn build(self) -> Result<PaymentMemo> {
        for (field, value) in [
            ("reference number", &self.reference_no),
            ("from", &self.from),
            ("to", &self.to),
            ("subject", &self.subject),
        ] {
            if !is_filled(value) {
                return Err(incomplete_memo(format!("{} is required", field)));
            }
        }
        if self.lines.is_empty() {
            return Err(incomplete_memo("at least one item is required".to_string()));
        }
        for (index, line) in self.lines.iter().enumerate() {
            let item = &line.item;
            if !is_filled(&item.name) || !is_filled(&item.bank) || !is_filled(&item.acc) {
                return Err(incomplete_memo(format!(
                    "item {} needs a payee name, bank and account number",
                    index + 1
                )));
            }
            if is_zero(item.amount) {
                return Err(incomplete_memo(format!("item {} has no amount", index + 1)));
            }
        }

        let memo = PaymentMemo {
            reference_no: self.reference_no,
            from: self.from,
            to: self.to,
            project_code: self.project_code,
            date: self.date,
            subject: self.subject,
            description: self.description,
            items: self.lines.into_iter().map(|l| l.item).collect(),
        };
        tracing::info!(
            "Memo {} ready: {} items, {}",
            memo.reference_no,
            memo.items.len(),
            format_rm(memo.total())
        );
        Ok(memo)
    }
}

/// Sends a finished memo. A body with `success: false` is a failure.
pub async fn submit_memo<A: ProjectApi>(api: &A, memo: &PaymentMemo) -> Result<CreateMemoResponse> {
    let response = api.create_memo(memo).await?;
    if !response.success {
        let message = response
            .message
            .unwrap_or_else(|| "memo was not created".to_string());
        tracing::warn!("❌ Memo {} rejected: {}", memo.reference_no, message);
        return Err(CostingError::RequestFailed {
            status: 200,
            message,
        });
    }
    tracing::info!("✅ Memo {} created with id {:?}", memo.reference_no, response.id);
    Ok(response)
}

/// Marks a memo paid unless the server already has it as paid.
pub async fn mark_paid<A: ProjectApi>(api: &A, memo_id: i64) -> Result<MemoRecord> {
    let mut record = api.memo(memo_id).await?;
    if record.status == MemoStatus::Paid {
        tracing::warn!("Memo {} is already paid", record.reference_no);
        return Ok(record);
    }

    api.mark_memo_paid(memo_id).await?;
    record.status = MemoStatus::Paid;
    tracing::info!("💰 Memo {} marked paid ({})", record.reference_no, format_rm(record.total()));
    Ok(record)
}

fn memo_item_not_found(index: usize) -> CostingError {
    CostingError::ItemNotFound {
        section: "memo".to_string(),
        index,
    }
}

fn incomplete_memo(reason: String) -> CostingError {
    CostingError::IncompleteMemo { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memo::CostDetailLine;
    use crate::domain::model::{BankDetails, Client, Consultant, SdgGoal};
    use crate::domain::ports::CreateProjectResponse;
    use crate::core::submission::ProjectPayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct MemoApi {
        reject: bool,
        status: MemoStatus,
        paid_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProjectApi for MemoApi {
        async fn create_project(&self, _payload: &ProjectPayload) -> Result<CreateProjectResponse> {
            unreachable!("memo tests never create projects")
        }

        async fn consultant_list(&self) -> Result<Vec<Consultant>> {
            Ok(vec![])
        }

        async fn client_list(&self) -> Result<Vec<Client>> {
            Ok(vec![])
        }

        async fn sdg_list(&self) -> Result<Vec<SdgGoal>> {
            Ok(vec![])
        }

        async fn cost_detail(&self, _project_id: i64) -> Result<ProjectCostDetail> {
            Ok(detail())
        }

        async fn create_memo(&self, _memo: &PaymentMemo) -> Result<CreateMemoResponse> {
            Ok(CreateMemoResponse {
                success: !self.reject,
                id: (!self.reject).then_some(12),
                message: self.reject.then(|| "Reference number in use".to_string()),
            })
        }

        async fn memos_by_project(&self, _project_id: i64) -> Result<Vec<MemoRecord>> {
            Ok(vec![])
        }

        async fn memo(&self, memo_id: i64) -> Result<MemoRecord> {
            Ok(MemoRecord {
                id: memo_id,
                reference_no: "MEMO/UHSB-2024-017/20250301-101500".to_string(),
                status: self.status,
                items: vec![MemoItem::new("LHDN", "CIMB Bank", "8000123", 1173.0)],
                ..Default::default()
            })
        }

        async fn mark_memo_paid(&self, _memo_id: i64) -> Result<()> {
            self.paid_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn detail() -> ProjectCostDetail {
        ProjectCostDetail {
            total_cost: 20723.0,
            section_a: vec![CostDetailLine {
                name: "Nur Aisyah".to_string(),
                amount: 10000.0,
                paid: 4000.0,
                pending: 1000.0,
            }],
            section_b: vec![CostDetailLine {
                name: "Travel".to_string(),
                amount: 2000.0,
                paid: 0.0,
                pending: 500.0,
            }],
            sst_enabled: true,
            sst_amount: 1173.0,
            ..Default::default()
        }
    }

    fn header(builder: MemoBuilder<'_>) -> MemoBuilder<'_> {
        builder
            .from("Ahmad (Project Manager)")
            .to("Maisarah (Finance Department)")
            .subject("Second payment")
    }

    #[test]
    fn test_reference_no_format() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap();
        assert_eq!(
            generate_reference_no(" UHSB-2024-017 ", at),
            "MEMO/UHSB-2024-017/20250301-101500"
        );
    }

    #[test]
    fn test_item_capped_at_unpaid_balance() {
        let detail = detail();
        let mut builder = MemoBuilder::new("UHSB-2024-017", &detail);

        let err = builder
            .add_item(
                MemoCategory::DirectCost,
                0,
                MemoItem::new("Travel Sdn Bhd", "Maybank", "5140", 1500.01),
            )
            .unwrap_err();
        match err {
            CostingError::MemoBalanceExceeded { field, balance, .. } => {
                assert_eq!(field, "items-0-amount");
                assert_eq!(balance, 1500.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(builder.items().count(), 0);

        builder
            .add_item(
                MemoCategory::DirectCost,
                0,
                MemoItem::new("Travel Sdn Bhd", "Maybank", "5140", 1000.0),
            )
            .unwrap();
        // 同一筆成本的第二張付款項目只能用剩下的餘額
        assert_eq!(
            builder.remaining_balance(MemoCategory::DirectCost, 0, None),
            Some(500.0)
        );
        assert!(builder
            .add_item(
                MemoCategory::DirectCost,
                0,
                MemoItem::new("Hotel Sdn Bhd", "CIMB Bank", "8001", 600.0),
            )
            .is_err());
        builder.set_amount(0, 1500.0).unwrap();
        assert!(builder.set_amount(0, 1600.0).is_err());
        assert_eq!(builder.total(), 1500.0);
    }

    #[test]
    fn test_unknown_line_and_item_index() {
        let detail = detail();
        let mut builder = MemoBuilder::new("UHSB-2024-017", &detail);
        assert!(matches!(
            builder.add_item(MemoCategory::FinderReward, 0, MemoItem::default()),
            Err(CostingError::ItemNotFound { index: 0, .. })
        ));
        assert!(builder.set_amount(3, 1.0).is_err());
        assert!(builder.remove_item(0).is_err());
    }

    #[test]
    fn test_build_fills_consultant_payee_and_item_names() {
        let detail = detail();
        let mut builder = header(MemoBuilder::new("UHSB-2024-017", &detail));
        let mut consultant = MemoItem::new("", "Bank Islam", "1201", 5000.0);
        consultant.justification = "Phase 2 report".to_string();
        builder
            .add_item(MemoCategory::Consultant, 0, consultant)
            .unwrap();
        builder
            .add_item(
                MemoCategory::Sst,
                0,
                MemoItem::from_bank_details(&BankDetails::new("CIMB Bank", "LHDN", "8000123"), 1173.0),
            )
            .unwrap();

        let memo = builder.build().unwrap();
        assert!(memo.reference_no.starts_with("MEMO/UHSB-2024-017/"));
        assert_eq!(memo.items[0].name, "Nur Aisyah");
        assert_eq!(memo.items[0].item, "Nur Aisyah");
        assert_eq!(memo.items[0].category, MemoCategory::Consultant);
        assert_eq!(memo.items[1].item, "SST");
        assert_eq!(memo.items[1].name, "LHDN");
        assert_eq!(memo.total(), 6173.0);

        let body = serde_json::to_value(&memo).unwrap();
        assert_eq!(body["items"][1]["category"], "sst");
        assert_eq!(body["items"][0]["acc"], "1201");
        assert!(body["referenceNo"].is_string());
    }

    #[test]
    fn test_build_requires_header_and_payees() {
        let detail = detail();
        let empty = header(MemoBuilder::new("UHSB-2024-017", &detail));
        assert!(matches!(empty.build(), Err(CostingError::IncompleteMemo { .. })));

        let mut no_header = MemoBuilder::new("UHSB-2024-017", &detail);
        no_header
            .add_item(MemoCategory::DirectCost, 0, MemoItem::new("Travel Sdn Bhd", "Maybank", "5140", 10.0))
            .unwrap();
        assert!(matches!(no_header.build(), Err(CostingError::IncompleteMemo { .. })));

        let mut no_bank = header(MemoBuilder::new("UHSB-2024-017", &detail));
        no_bank
            .add_item(MemoCategory::DirectCost, 0, MemoItem::new("Travel Sdn Bhd", "", "5140", 10.0))
            .unwrap();
        let err = no_bank.build().unwrap_err();
        assert!(err.to_string().contains("item 1"));
    }

    #[test]
    fn test_add_request_from_items_file() {
        let detail = detail();
        let requests: Vec<MemoItemRequest> = serde_json::from_str(
            r#"[{"category": "directCost", "line": 0, "amount": 250.5, "name": "Travel Sdn Bhd", "bank": "Maybank", "acc": "5140", "justification": "Site visit"}]"#,
        )
        .unwrap();
        let mut builder = header(MemoBuilder::new("UHSB-2024-017", &detail));
        for request in requests {
            builder.add_request(request).unwrap();
        }
        let memo = builder.build().unwrap();
        assert_eq!(memo.items[0].justification, "Site visit");
        assert_eq!(memo.items[0].item, "Travel");
    }

    #[test]
    fn test_submit_memo_rejects_unsuccessful_body() {
        let detail = detail();
        let mut builder = header(MemoBuilder::new("UHSB-2024-017", &detail));
        builder
            .add_item(MemoCategory::DirectCost, 0, MemoItem::new("Travel Sdn Bhd", "Maybank", "5140", 10.0))
            .unwrap();
        let memo = builder.build().unwrap();

        let created = tokio_test::block_on(submit_memo(&MemoApi::default(), &memo)).unwrap();
        assert_eq!(created.id, Some(12));

        let rejecting = MemoApi {
            reject: true,
            ..Default::default()
        };
        match tokio_test::block_on(submit_memo(&rejecting, &memo)) {
            Err(CostingError::RequestFailed { message, .. }) => {
                assert_eq!(message, "Reference number in use")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mark_paid_skips_memos_already_paid() {
        let pending = MemoApi::default();
        let record = tokio_test::block_on(mark_paid(&pending, 5)).unwrap();
        assert_eq!(record.status, MemoStatus::Paid);
        assert_eq!(pending.paid_calls.load(Ordering::SeqCst), 1);

        let paid = MemoApi {
            status: MemoStatus::Paid,
            ..Default::default()
        };
        tokio_test::block_on(mark_paid(&paid, 5)).unwrap();
        assert_eq!(paid.paid_calls.load(Ordering::SeqCst), 0);
    }
}
