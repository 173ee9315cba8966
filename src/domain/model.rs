use crate::utils::validation::is_filled;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectRole {
    Leader,
    #[default]
    Member,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Leader => "Leader",
            ProjectRole::Member => "Member",
        }
    }
}

/// Profile bank record of a consultant, as served by the consultant list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsultantBank {
    pub id: i64,
    pub name: String,
    pub acc_name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub acc_no: String,
}

impl ConsultantBank {
    pub fn is_complete(&self) -> bool {
        is_filled(&self.name) && is_filled(&self.acc_name) && is_filled(&self.acc_no)
    }
}

// 帳號在舊資料中可能是數字
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Consultant {
    pub id: i64,
    pub staff_id: String,
    pub name: String,
    pub email: String,
    pub faculty: Option<String>,
    pub bank: Option<ConsultantBank>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Client {
    pub id: i64,
    pub company_name: String,
    pub representative_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SdgGoal {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
}

/// Ad-hoc recipient bank details captured during allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_holder_name: String,
    pub account_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankField {
    BankName,
    AccountHolderName,
    AccountNumber,
}

impl FromStr for BankField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bankName" | "bank" => Ok(BankField::BankName),
            "accountHolderName" | "holder" => Ok(BankField::AccountHolderName),
            "accountNumber" | "account" => Ok(BankField::AccountNumber),
            other => Err(format!("unknown bank field '{}'", other)),
        }
    }
}

impl BankDetails {
    pub fn new(bank_name: &str, account_holder_name: &str, account_number: &str) -> Self {
        Self {
            bank_name: bank_name.to_string(),
            account_holder_name: account_holder_name.to_string(),
            account_number: account_number.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        is_filled(&self.bank_name)
            && is_filled(&self.account_holder_name)
            && is_filled(&self.account_number)
    }

    pub fn set(&mut self, field: BankField, value: &str) {
        let slot = match field {
            BankField::BankName => &mut self.bank_name,
            BankField::AccountHolderName => &mut self.account_holder_name,
            BankField::AccountNumber => &mut self.account_number,
        };
        *slot = value.to_string();
    }
}

/// Banks offered in the recipient dropdown.
pub const BANKS: [&str; 12] = [
    "Maybank",
    "CIMB Bank",
    "Public Bank",
    "RHB Bank",
    "Hong Leong Bank",
    "AmBank",
    "Bank Islam",
    "Bank Rakyat",
    "OCBC Bank",
    "HSBC Bank",
    "Standard Chartered",
    "Other",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsultantAllocation {
    pub consultant_id: i64,
    pub staff_id: String,
    pub name: String,
    pub project_role: ProjectRole,
    pub bank: ConsultantBank,
    pub payment_amount: f64,
    pub allocated_amount: f64,
}

impl From<&Consultant> for ConsultantAllocation {
    fn from(consultant: &Consultant) -> Self {
        Self {
            consultant_id: consultant.id,
            staff_id: consultant.staff_id.clone(),
            name: consultant.name.clone(),
            project_role: ProjectRole::Member,
            bank: consultant.bank.clone().unwrap_or_default(),
            payment_amount: 0.0,
            allocated_amount: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectCostItem {
    pub item: String,
    pub payment_amount: f64,
    pub allocated_amount: f64,
    #[serde(flatten)]
    pub bank: BankDetails,
}

impl DirectCostItem {
    pub fn new(item: &str, payment_amount: f64) -> Self {
        Self {
            item: item.to_string(),
            payment_amount,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectCostField {
    Item(String),
    PaymentAmount(f64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinderRewardItem {
    pub finder_name: String,
    pub percent: f64,
    pub payment_amount: f64,
    pub allocated_amount: f64,
    #[serde(flatten)]
    pub bank: BankDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagementOrg {
    #[serde(rename = "UTeM")]
    Utem,
    #[serde(rename = "UHSB")]
    Uhsb,
}

impl ManagementOrg {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagementOrg::Utem => "UTeM",
            ManagementOrg::Uhsb => "UHSB",
        }
    }
}

impl fmt::Display for ManagementOrg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagementOrg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UTEM" => Ok(ManagementOrg::Utem),
            "UHSB" => Ok(ManagementOrg::Uhsb),
            other => Err(format!("unknown management organization '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagementFeeItem {
    pub managed_by: Option<ManagementOrg>,
    pub percent: f64,
    pub payment_amount: f64,
    pub allocated_amount: f64,
    #[serde(flatten)]
    pub bank: BankDetails,
}

/// Allocation of the SST amount. `amount_due` tracks the current SST total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SstAllocation {
    pub amount_due: f64,
    pub allocated_amount: f64,
    #[serde(flatten)]
    pub bank: BankDetails,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostTotals {
    pub consultant_payments_total: f64,
    pub direct_cost_total: f64,
    pub finder_reward_total: f64,
    pub management_fee_total: f64,
    pub sst_amount: f64,
    pub total_cost: f64,
}

impl CostTotals {
    /// Base for the finder reward and management fee percentages.
    pub fn fee_base(&self) -> f64 {
        self.consultant_payments_total + self.direct_cost_total
    }

    pub fn subtotal_before_sst(&self) -> f64 {
        self.consultant_payments_total
            + self.direct_cost_total
            + self.finder_reward_total
            + self.management_fee_total
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectDetails {
    pub project_code: String,
    pub quotation_no: String,
    pub project_title: String,
    pub status: String,
    pub project_under: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub project_description: String,
    pub project_deliverables: String,
    pub sdg_goals: Vec<i64>,
    pub clients: Vec<i64>,
}

impl ProjectDetails {
    /// Whole calendar months between start and end, never negative.
    pub fn duration_months(&self) -> Option<u32> {
        let (start, end) = (self.start_date?, self.end_date?);
        let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
        Some(months.max(0) as u32)
    }

    pub fn toggle_sdg(&mut self, goal_id: i64) {
        if let Some(pos) = self.sdg_goals.iter().position(|id| *id == goal_id) {
            self.sdg_goals.remove(pos);
        } else {
            self.sdg_goals.push(goal_id);
        }
    }

    pub fn add_client(&mut self, client_id: i64) {
        if !self.clients.contains(&client_id) {
            self.clients.push(client_id);
        }
    }

    pub fn remove_client(&mut self, client_id: i64) {
        self.clients.retain(|id| *id != client_id);
    }
}

/// The in-progress project record built up across the wizard steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectDraft {
    pub details: ProjectDetails,
    pub consultants: Vec<ConsultantAllocation>,
    pub direct_cost: Vec<DirectCostItem>,
    pub finder_reward: Vec<FinderRewardItem>,
    pub management_fee: Vec<ManagementFeeItem>,
    pub sst_enabled: bool,
    pub sst_percentage: f64,
    pub sst_allocation: SstAllocation,
    pub totals: CostTotals,
    pub total_payment_received: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionKey {
    Consultants,
    DirectCost,
    FinderReward,
    ManagementFee,
    Sst,
}

impl SectionKey {
    pub const ALL: [SectionKey; 5] = [
        SectionKey::Consultants,
        SectionKey::DirectCost,
        SectionKey::FinderReward,
        SectionKey::ManagementFee,
        SectionKey::Sst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::Consultants => "projectConsultant",
            SectionKey::DirectCost => "directCost",
            SectionKey::FinderReward => "finderReward",
            SectionKey::ManagementFee => "managementFee",
            SectionKey::Sst => "sstAllocation",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SectionKey::Consultants => "Section A: Payment to Consultants",
            SectionKey::DirectCost => "Section B: Direct Cost",
            SectionKey::FinderReward => "Section C: Finders Reward",
            SectionKey::ManagementFee => "Section D: Management Fee",
            SectionKey::Sst => "Section E: SST",
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "projectConsultant" | "consultants" | "A" => Ok(SectionKey::Consultants),
            "directCost" | "B" => Ok(SectionKey::DirectCost),
            "finderReward" | "C" => Ok(SectionKey::FinderReward),
            "managementFee" | "D" => Ok(SectionKey::ManagementFee),
            "sstAllocation" | "sst" | "E" => Ok(SectionKey::Sst),
            other => Err(format!("unknown section '{}'", other)),
        }
    }
}

/// Key under which a field-level validation message is recorded,
/// e.g. `directCost-0-allocatedAmount`.
pub fn field_key(section: SectionKey, index: usize, field: &str) -> String {
    format!("{}-{}-{}", section, index, field)
}

/// Anything a slice of the received payment can be allocated to.
pub trait Allocatable {
    fn label(&self) -> String;
    fn payment_amount(&self) -> f64;
    fn allocated_amount(&self) -> f64;
    fn set_allocated_amount(&mut self, amount: f64);
    fn has_complete_bank_details(&self) -> bool;
    /// `None` when the bank record is not editable during allocation.
    fn bank_details_mut(&mut self) -> Option<&mut BankDetails>;

    fn needs_bank_details(&self) -> bool {
        self.allocated_amount() > 0.0 && !self.has_complete_bank_details()
    }
}

impl Allocatable for ConsultantAllocation {
    fn label(&self) -> String {
        self.name.clone()
    }

    fn payment_amount(&self) -> f64 {
        self.payment_amount
    }

    fn allocated_amount(&self) -> f64 {
        self.allocated_amount
    }

    fn set_allocated_amount(&mut self, amount: f64) {
        self.allocated_amount = amount;
    }

    fn has_complete_bank_details(&self) -> bool {
        self.bank.is_complete()
    }

    fn bank_details_mut(&mut self) -> Option<&mut BankDetails> {
        None
    }
}

macro_rules! impl_allocatable_with_bank {
    ($ty:ty, |$item:ident| $label:expr, $payment:ident) => {
        impl Allocatable for $ty {
            fn label(&self) -> String {
                let $item = self;
                $label
            }

            fn payment_amount(&self) -> f64 {
                self.$payment
            }

            fn allocated_amount(&self) -> f64 {
                self.allocated_amount
            }

            fn set_allocated_amount(&mut self, amount: f64) {
                self.allocated_amount = amount;
            }

            fn has_complete_bank_details(&self) -> bool {
                self.bank.is_complete()
            }

            fn bank_details_mut(&mut self) -> Option<&mut BankDetails> {
                Some(&mut self.bank)
            }
        }
    };
}

impl_allocatable_with_bank!(DirectCostItem, |item| item.item.clone(), payment_amount);
impl_allocatable_with_bank!(
    FinderRewardItem,
    |item| format!("Finder: {}", item.finder_name),
    payment_amount
);
impl_allocatable_with_bank!(
    ManagementFeeItem,
    |item| format!(
        "Management: {}",
        item.managed_by.map(|org| org.as_str()).unwrap_or("-")
    ),
    payment_amount
);
impl_allocatable_with_bank!(SstAllocation, |_item| "SST".to_string(), amount_due);

impl ProjectDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section_len(&self, section: SectionKey) -> usize {
        match section {
            SectionKey::Consultants => self.consultants.len(),
            SectionKey::DirectCost => self.direct_cost.len(),
            SectionKey::FinderReward => self.finder_reward.len(),
            SectionKey::ManagementFee => self.management_fee.len(),
            SectionKey::Sst => 1,
        }
    }

    pub fn allocatable(&self, section: SectionKey, index: usize) -> Option<&dyn Allocatable> {
        match section {
            SectionKey::Consultants => self.consultants.get(index).map(|i| i as &dyn Allocatable),
            SectionKey::DirectCost => self.direct_cost.get(index).map(|i| i as &dyn Allocatable),
            SectionKey::FinderReward => {
                self.finder_reward.get(index).map(|i| i as &dyn Allocatable)
            }
            SectionKey::ManagementFee => {
                self.management_fee.get(index).map(|i| i as &dyn Allocatable)
            }
            SectionKey::Sst => (index == 0).then_some(&self.sst_allocation as &dyn Allocatable),
        }
    }

    pub fn allocatable_mut(
        &mut self,
        section: SectionKey,
        index: usize,
    ) -> Option<&mut dyn Allocatable> {
        match section {
            SectionKey::Consultants => self
                .consultants
                .get_mut(index)
                .map(|i| i as &mut dyn Allocatable),
            SectionKey::DirectCost => self
                .direct_cost
                .get_mut(index)
                .map(|i| i as &mut dyn Allocatable),
            SectionKey::FinderReward => self
                .finder_reward
                .get_mut(index)
                .map(|i| i as &mut dyn Allocatable),
            SectionKey::ManagementFee => self
                .management_fee
                .get_mut(index)
                .map(|i| i as &mut dyn Allocatable),
            SectionKey::Sst => {
                (index == 0).then_some(&mut self.sst_allocation as &mut dyn Allocatable)
            }
        }
    }

    /// Every allocatable line item, in section order.
    pub fn allocatables(&self) -> Vec<(SectionKey, usize, &dyn Allocatable)> {
        SectionKey::ALL
            .into_iter()
            .flat_map(|section| {
                (0..self.section_len(section)).filter_map(move |index| {
                    self.allocatable(section, index)
                        .map(|item| (section, index, item))
                })
            })
            .collect()
    }

    pub fn leader(&self) -> Option<&ConsultantAllocation> {
        self.consultants
            .iter()
            .find(|c| c.project_role == ProjectRole::Leader)
    }
}
