//! Payment memos: instructions to finance to pay part of an existing
//! project's costs, line by line.

use crate::domain::model::{string_or_number, BankDetails, SectionKey};
use crate::utils::money::sanitize_amount;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoCategory {
    #[default]
    Consultant,
    DirectCost,
    FinderReward,
    ManagementFee,
    Sst,
}

impl MemoCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoCategory::Consultant => "consultant",
            MemoCategory::DirectCost => "directCost",
            MemoCategory::FinderReward => "finderReward",
            MemoCategory::ManagementFee => "managementFee",
            MemoCategory::Sst => "sst",
        }
    }

    pub fn section(&self) -> SectionKey {
        match self {
            MemoCategory::Consultant => SectionKey::Consultants,
            MemoCategory::DirectCost => SectionKey::DirectCost,
            MemoCategory::FinderReward => SectionKey::FinderReward,
            MemoCategory::ManagementFee => SectionKey::ManagementFee,
            MemoCategory::Sst => SectionKey::Sst,
        }
    }

    /// Consultant payees come from the staff profile and are not typed in.
    pub fn has_profile_payee(&self) -> bool {
        *self == MemoCategory::Consultant
    }
}

impl From<SectionKey> for MemoCategory {
    fn from(section: SectionKey) -> Self {
        match section {
            SectionKey::Consultants => MemoCategory::Consultant,
            SectionKey::DirectCost => MemoCategory::DirectCost,
            SectionKey::FinderReward => MemoCategory::FinderReward,
            SectionKey::ManagementFee => MemoCategory::ManagementFee,
            SectionKey::Sst => MemoCategory::Sst,
        }
    }
}

impl fmt::Display for MemoCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "consultant" => Ok(MemoCategory::Consultant),
            other => SectionKey::from_str(other).map(MemoCategory::from),
        }
    }
}

// 後端可能回傳 null
fn null_as_zero<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// One costed line of a created project, with what has already gone out
/// against it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostDetailLine {
    #[serde(alias = "item")]
    pub name: String,
    #[serde(alias = "payment", deserialize_with = "null_as_zero")]
    pub amount: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub paid: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub pending: f64,
}

impl CostDetailLine {
    /// `amount - paid - pending`, never negative.
    pub fn balance_unpaid(&self) -> f64 {
        sanitize_amount(self.amount - self.paid - self.pending)
    }
}

/// Server-side cost breakdown of a created project, sections A to E.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectCostDetail {
    #[serde(deserialize_with = "null_as_zero")]
    pub total_cost: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub paid: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub pending: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub unpaid: f64,
    pub section_a: Vec<CostDetailLine>,
    pub section_b: Vec<CostDetailLine>,
    pub section_c: Vec<CostDetailLine>,
    pub section_d: Vec<CostDetailLine>,
    pub sst_enabled: bool,
    #[serde(deserialize_with = "null_as_zero")]
    pub sst_amount: f64,
}

impl ProjectCostDetail {
    /// SST is a single line with nothing recorded as paid.
    pub fn line(&self, category: MemoCategory, index: usize) -> Option<CostDetailLine> {
        match category {
            MemoCategory::Consultant => self.section_a.get(index).cloned(),
            MemoCategory::DirectCost => self.section_b.get(index).cloned(),
            MemoCategory::FinderReward => self.section_c.get(index).cloned(),
            MemoCategory::ManagementFee => self.section_d.get(index).cloned(),
            MemoCategory::Sst => (index == 0 && self.sst_enabled).then(|| CostDetailLine {
                name: "SST".to_string(),
                amount: self.sst_amount,
                ..Default::default()
            }),
        }
    }
}

/// A payee line on a memo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoItem {
    pub category: MemoCategory,
    pub item: String,
    pub name: String,
    pub bank: String,
    #[serde(deserialize_with = "string_or_number")]
    pub acc: String,
    pub amount: f64,
    pub justification: String,
}

impl MemoItem {
    pub fn new(name: &str, bank: &str, acc: &str, amount: f64) -> Self {
        Self {
            name: name.to_string(),
            bank: bank.to_string(),
            acc: acc.to_string(),
            amount,
            ..Default::default()
        }
    }

    /// Payee taken from bank details captured while allocating.
    pub fn from_bank_details(bank: &BankDetails, amount: f64) -> Self {
        Self::new(&bank.account_holder_name, &bank.bank_name, &bank.account_number, amount)
    }

    pub fn with_justification(mut self, justification: &str) -> Self {
        self.justification = justification.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMemo {
    pub reference_no: String,
    pub from: String,
    pub to: String,
    pub project_code: String,
    pub date: NaiveDate,
    pub subject: String,
    pub description: String,
    pub items: Vec<MemoItem>,
}

impl PaymentMemo {
    pub fn total(&self) -> f64 {
        self.items.iter().map(|i| i.amount).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoStatus {
    #[default]
    Pending,
    Paid,
    #[serde(other)]
    Other,
}

/// A memo as listed by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoRecord {
    pub id: i64,
    pub reference_no: String,
    pub project_code: String,
    pub date: String,
    pub subject: String,
    pub status: MemoStatus,
    #[serde(alias = "payments")]
    pub items: Vec<MemoItem>,
}

impl MemoRecord {
    pub fn total(&self) -> f64 {
        self.items.iter().map(|i| i.amount).sum()
    }
}
