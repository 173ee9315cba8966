use crate::config::{PortalConfig, PortalSettings};
use crate::domain::model::{
    BankField, Consultant, DirectCostField, DirectCostItem, ManagementOrg, ProjectDraft, SectionKey,
};
use crate::utils::error::{CostingError, Result};
use crate::utils::money::parse_amount;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "project-costing")]
#[command(about = "Cost breakdown, payment allocation and submission for consultancy projects")]
pub struct CliConfig {
    #[arg(short, long, help = "TOML configuration file")]
    pub config: Option<String>,

    #[arg(long, help = "Portal API base URL [default: http://localhost:8080]")]
    pub api_base_url: Option<String>,

    #[arg(long, env = "PORTAL_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long)]
    pub timeout_seconds: Option<u64>,

    #[arg(long, help = "Directory drafts are read from and written to")]
    pub draft_dir: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the cost breakdown and allocation status of a draft
    Summary { draft: String },

    /// Change the cost breakdown of a draft, then save it
    Edit {
        draft: String,

        /// Start from an empty draft instead of loading one
        #[arg(long)]
        new: bool,

        #[command(flatten)]
        changes: DraftEdits,

        /// Write the result here instead of overwriting the draft
        #[arg(long)]
        out: Option<String>,
    },

    /// Record the payment received and distribute it, then save the draft
    Allocate {
        draft: String,

        /// Total payment received, e.g. "RM 5,000.00"
        #[arg(long)]
        received: Option<String>,

        /// Allocation as section:index=amount, e.g. directCost:0=350
        #[arg(long = "set", value_parser = parse_allocation_arg)]
        allocations: Vec<AllocationArg>,

        /// Bank detail as section:index:field=value, e.g. directCost:0:bankName=Maybank
        #[arg(long = "bank", value_parser = parse_bank_arg)]
        bank_details: Vec<BankArg>,

        /// Distribute the received payment proportionally
        #[arg(long)]
        auto: bool,

        /// Write the result here instead of overwriting the draft
        #[arg(long)]
        out: Option<String>,
    },

    /// Validate a draft and create the project on the portal
    Submit {
        draft: String,

        /// Print the request payload without sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// List consultants, clients and SDG goals known to the portal
    Reference,

    /// Payment memos for a project that already exists on the portal
    Memo {
        #[command(subcommand)]
        action: MemoAction,
    },
}

/// Cost Composer operations, applied in the order the fields are listed.
#[derive(Debug, Clone, Default, Args)]
pub struct DraftEdits {
    #[arg(long)]
    pub code: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub status: Option<String>,

    #[arg(long = "remove-consultant")]
    pub remove_consultants: Vec<i64>,

    /// Consultant id from the portal's consultant list
    #[arg(long = "add-consultant")]
    pub add_consultants: Vec<i64>,

    /// Consultant id to make project leader
    #[arg(long)]
    pub leader: Option<i64>,

    /// Consultant fee as staffId=amount, e.g. S007=6000
    #[arg(long = "pay", value_parser = parse_payment_arg)]
    pub payments: Vec<PaymentArg>,

    /// Indices refer to the draft before any removal
    #[arg(long = "remove-direct-cost")]
    pub remove_direct_costs: Vec<usize>,

    /// New direct cost as item=amount, e.g. "Travel=2000"
    #[arg(long = "add-direct-cost", value_parser = parse_direct_cost_arg)]
    pub add_direct_costs: Vec<DirectCostItem>,

    /// Direct cost amount as index=amount
    #[arg(long = "direct-cost", value_parser = parse_amount_edit_arg)]
    pub direct_cost_amounts: Vec<AmountEditArg>,

    #[arg(long = "remove-finder")]
    pub remove_finders: Vec<usize>,

    /// Adds a finder under this name
    #[arg(long = "add-finder")]
    pub add_finders: Vec<String>,

    #[arg(long = "remove-management-fee")]
    pub remove_management_fees: Vec<usize>,

    /// Management fee organization, UTeM or UHSB
    #[arg(long = "add-management-fee")]
    pub add_management_fees: Vec<ManagementOrg>,

    /// Charge SST: on or off
    #[arg(long, value_parser = parse_switch)]
    pub sst: Option<bool>,
}

/// Indices largest first, so each removal leaves the rest in place.
fn descending(indices: &[usize]) -> Vec<usize> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    sorted
}

impl DraftEdits {
    /// `consultants` is the portal's consultant list, only consulted for
    /// `add_consultants`.
    pub fn apply(&self, draft: &mut ProjectDraft, consultants: &[Consultant]) -> Result<()> {
        if let Some(code) = &self.code {
            draft.details.project_code = code.clone();
        }
        if let Some(title) = &self.title {
            draft.details.project_title = title.clone();
        }
        if let Some(status) = &self.status {
            draft.details.status = status.clone();
        }

        for id in &self.remove_consultants {
            draft.remove_consultant(*id)?;
        }
        for id in &self.add_consultants {
            let consultant = consultants
                .iter()
                .find(|c| c.id == *id)
                .ok_or(CostingError::ConsultantNotFound { consultant_id: *id })?;
            draft.add_consultant(consultant)?;
        }
        if let Some(id) = self.leader {
            draft.set_leader(id)?;
        }
        for arg in &self.payments {
            if !draft.set_consultant_payment(&arg.staff_id, arg.amount) {
                return Err(CostingError::InvalidConfigValueError {
                    field: "pay".to_string(),
                    value: arg.staff_id.clone(),
                    reason: "no consultant on the draft has this staff id".to_string(),
                });
            }
        }

        for index in descending(&self.remove_direct_costs) {
            draft.remove_direct_cost(index)?;
        }
        for item in &self.add_direct_costs {
            draft.add_direct_cost(item.clone());
        }
        for arg in &self.direct_cost_amounts {
            draft.edit_direct_cost(arg.index, DirectCostField::PaymentAmount(arg.amount))?;
        }

        for index in descending(&self.remove_finders) {
            draft.remove_finder_reward(index)?;
        }
        for name in &self.add_finders {
            let index = draft.add_finder_reward();
            draft.rename_finder_reward(index, name)?;
        }

        for index in descending(&self.remove_management_fees) {
            draft.remove_management_fee(index)?;
        }
        for org in &self.add_management_fees {
            draft.add_management_fee(Some(*org))?;
        }

        if let Some(enabled) = self.sst {
            draft.toggle_sst(enabled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum MemoAction {
    /// Build a memo against the project's unpaid balances and send it
    Create {
        #[arg(long)]
        project_id: i64,

        #[arg(long)]
        project_code: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long)]
        subject: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Memo date, YYYY-MM-DD [default: today]
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Override the generated reference number
        #[arg(long)]
        reference_no: Option<String>,

        /// JSON file with an array of {category, line, amount, name, bank, acc, justification}
        #[arg(long)]
        items: String,

        /// Print the memo without sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// List a project's memos
    List {
        #[arg(long)]
        project_id: i64,
    },

    /// Mark a memo as paid
    Pay { memo_id: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationArg {
    pub section: SectionKey,
    pub index: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankArg {
    pub section: SectionKey,
    pub index: usize,
    pub field: BankField,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentArg {
    pub staff_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmountEditArg {
    pub index: usize,
    pub amount: f64,
}

fn parse_index(raw: &str) -> std::result::Result<usize, String> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid index '{}'", raw))
}

pub fn parse_allocation_arg(raw: &str) -> std::result::Result<AllocationArg, String> {
    let (target, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected section:index=amount, got '{}'", raw))?;
    let (section, index) = target
        .split_once(':')
        .ok_or_else(|| format!("expected section:index, got '{}'", target))?;

    Ok(AllocationArg {
        section: section.trim().parse()?,
        index: parse_index(index)?,
        amount: parse_amount(amount),
    })
}

pub fn parse_bank_arg(raw: &str) -> std::result::Result<BankArg, String> {
    let (target, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected section:index:field=value, got '{}'", raw))?;
    let mut parts = target.splitn(3, ':');
    let (Some(section), Some(index), Some(field)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected section:index:field, got '{}'", target));
    };

    Ok(BankArg {
        section: section.trim().parse()?,
        index: parse_index(index)?,
        field: field.trim().parse()?,
        value: value.to_string(),
    })
}

pub fn parse_payment_arg(raw: &str) -> std::result::Result<PaymentArg, String> {
    let (staff_id, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected staffId=amount, got '{}'", raw))?;
    if staff_id.trim().is_empty() {
        return Err(format!("missing staff id in '{}'", raw));
    }
    Ok(PaymentArg {
        staff_id: staff_id.trim().to_string(),
        amount: parse_amount(amount),
    })
}

/// The last `=` splits name from amount, so item names may contain `=`.
pub fn parse_direct_cost_arg(raw: &str) -> std::result::Result<DirectCostItem, String> {
    let (item, amount) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected item=amount, got '{}'", raw))?;
    Ok(DirectCostItem::new(item.trim(), parse_amount(amount)))
}

pub fn parse_amount_edit_arg(raw: &str) -> std::result::Result<AmountEditArg, String> {
    let (index, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected index=amount, got '{}'", raw))?;
    Ok(AmountEditArg {
        index: parse_index(index)?,
        amount: parse_amount(amount),
    })
}

pub fn parse_switch(raw: &str) -> std::result::Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}

impl CliConfig {
    /// Flags win over the TOML file, which wins over built-in defaults.
    pub fn resolve(&self) -> Result<PortalSettings> {
        let mut settings = match &self.config {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path);
                PortalSettings::from_portal_config(&PortalConfig::from_file(path)?)
            }
            None => PortalSettings::default(),
        };

        if let Some(url) = &self.api_base_url {
            settings.api_base_url = url.clone();
        }
        if let Some(token) = &self.access_token {
            settings.access_token = Some(token.clone());
        }
        if let Some(timeout) = self.timeout_seconds {
            settings.timeout_seconds = timeout;
        }
        if let Some(dir) = &self.draft_dir {
            settings.draft_dir = dir.clone();
        }
        if self.verbose {
            settings.log_level = Some("debug".to_string());
        }
        settings.json_logs |= self.json_logs;

        Ok(settings)
    }
}
