//! Flattens a finished draft into the body of `POST /admin/project/create`.
//! Field names follow the backend schema exactly.

use crate::domain::model::{BankDetails, ConsultantBank, ProjectDraft};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPayload {
    pub project_code: String,
    pub quotation_no: String,
    pub project_title: String,
    pub status: String,
    pub project_under: String,
    pub start_date: String,
    pub end_date: String,
    pub project_description: String,
    pub project_deliverables: String,
    pub sdg_goals: Vec<i64>,
    pub clients: Vec<i64>,
    pub sst_percentage: f64,
    pub sst_enabled: bool,
    pub project_consultant: Vec<ConsultantLine>,
    pub direct_cost: Vec<DirectCostLine>,
    pub finder_reward: Vec<FinderRewardLine>,
    pub management_fee: Vec<ManagementFeeLine>,
    pub initial_payment: InitialPayment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultantLine {
    pub consultant_id: i64,
    pub payment_amount: f64,
    pub project_role: String,
    pub bank_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectCostLine {
    pub item: String,
    pub payment_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinderRewardLine {
    pub finder_name: String,
    pub percent_charged: f64,
    pub payment_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementFeeLine {
    pub managed_by: String,
    pub percent_charged: f64,
    pub payment_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialPayment {
    pub total_received: f64,
    pub allocations: Allocations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocations {
    pub consultants: Vec<ConsultantAllocationLine>,
    pub direct_cost: Vec<ItemAllocationLine>,
    pub finder_reward: Vec<ItemAllocationLine>,
    pub management_fee: Vec<ItemAllocationLine>,
    pub sst_allocation: SstAllocationLine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultantAllocationLine {
    pub consultant_id: i64,
    pub allocated_amount: f64,
    pub bank_details: ConsultantBank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAllocationLine {
    pub item: String,
    pub allocated_amount: f64,
    pub bank_details: BankDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SstAllocationLine {
    pub allocated_amount: f64,
    #[serde(flatten)]
    pub bank: BankDetails,
}

fn date_string(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Builds the creation payload. Pure: the draft is only read.
pub fn assemble(draft: &ProjectDraft) -> ProjectPayload {
    let details = &draft.details;

    let project_consultant = draft
        .consultants
        .iter()
        .filter(|c| !c.staff_id.trim().is_empty() && !c.name.trim().is_empty())
        .map(|c| ConsultantLine {
            consultant_id: c.consultant_id,
            payment_amount: c.payment_amount,
            project_role: c.project_role.as_str().to_string(),
            bank_id: c.bank.id,
        })
        .collect();

    let allocations = Allocations {
        consultants: draft
            .consultants
            .iter()
            .map(|c| ConsultantAllocationLine {
                consultant_id: c.consultant_id,
                allocated_amount: c.allocated_amount,
                bank_details: c.bank.clone(),
            })
            .collect(),
        direct_cost: draft
            .direct_cost
            .iter()
            .map(|i| ItemAllocationLine {
                item: i.item.clone(),
                allocated_amount: i.allocated_amount,
                bank_details: i.bank.clone(),
            })
            .collect(),
        finder_reward: draft
            .finder_reward
            .iter()
            .map(|i| ItemAllocationLine {
                item: i.finder_name.clone(),
                allocated_amount: i.allocated_amount,
                bank_details: i.bank.clone(),
            })
            .collect(),
        management_fee: draft
            .management_fee
            .iter()
            .map(|i| ItemAllocationLine {
                item: i.managed_by.map(|o| o.to_string()).unwrap_or_default(),
                allocated_amount: i.allocated_amount,
                bank_details: i.bank.clone(),
            })
            .collect(),
        sst_allocation: SstAllocationLine {
            allocated_amount: draft.sst_allocation.allocated_amount,
            bank: draft.sst_allocation.bank.clone(),
        },
    };

    ProjectPayload {
        project_code: details.project_code.clone(),
        quotation_no: details.quotation_no.clone(),
        project_title: details.project_title.clone(),
        status: details.status.to_lowercase(),
        project_under: details.project_under.clone(),
        start_date: date_string(details.start_date),
        end_date: date_string(details.end_date),
        project_description: details.project_description.clone(),
        project_deliverables: details.project_deliverables.clone(),
        sdg_goals: details.sdg_goals.clone(),
        clients: details.clients.clone(),
        sst_percentage: draft.sst_percentage,
        sst_enabled: draft.sst_enabled,
        project_consultant,
        direct_cost: draft
            .direct_cost
            .iter()
            .map(|i| DirectCostLine {
                item: i.item.clone(),
                payment_amount: i.payment_amount,
            })
            .collect(),
        finder_reward: draft
            .finder_reward
            .iter()
            .map(|i| FinderRewardLine {
                finder_name: i.finder_name.clone(),
                percent_charged: i.percent,
                payment_amount: i.payment_amount,
            })
            .collect(),
        management_fee: draft
            .management_fee
            .iter()
            .map(|i| ManagementFeeLine {
                managed_by: i.managed_by.map(|o| o.to_string()).unwrap_or_default(),
                percent_charged: i.percent,
                payment_amount: i.payment_amount,
            })
            .collect(),
        initial_payment: InitialPayment {
            total_received: draft.total_payment_received,
            allocations,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        ConsultantAllocation, DirectCostItem, ManagementOrg, ProjectDetails, ProjectRole,
    };
    use chrono::NaiveDate;

    fn draft() -> ProjectDraft {
        let mut draft = ProjectDraft::new();
        draft.details = ProjectDetails {
            project_code: "UHSB-2025-014".to_string(),
            project_title: "Flood sensor survey".to_string(),
            status: "Ongoing".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1),
            sdg_goals: vec![6, 11],
            clients: vec![42],
            ..Default::default()
        };
        draft.consultants.push(ConsultantAllocation {
            consultant_id: 7,
            staff_id: "S007".to_string(),
            name: "Aminah".to_string(),
            project_role: ProjectRole::Leader,
            payment_amount: 10000.0,
            allocated_amount: 4000.0,
            ..Default::default()
        });
        draft.consultants.push(ConsultantAllocation {
            consultant_id: 8,
            ..Default::default()
        });
        draft.add_direct_cost(DirectCostItem::new("Travel", 2000.0));
        draft.add_finder_reward();
        draft.rename_finder_reward(0, "Rahman").unwrap();
        draft.add_management_fee(Some(ManagementOrg::Uhsb)).unwrap();
        draft.total_payment_received = 4000.0;
        draft
    }

    #[test]
    fn test_payload_field_names() {
        let payload = assemble(&draft());
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["projectCode"], "UHSB-2025-014");
        assert_eq!(json["status"], "ongoing");
        assert_eq!(json["startDate"], "2025-02-01");
        assert_eq!(json["endDate"], "");
        assert_eq!(json["sdgGoals"], serde_json::json!([6, 11]));
        assert_eq!(json["projectConsultant"][0]["projectRole"], "Leader");
        assert_eq!(json["projectConsultant"][0]["bankId"], 0);
        assert_eq!(json["directCost"][0]["item"], "Travel");
        assert_eq!(json["finderReward"][0]["finderName"], "Rahman");
        assert_eq!(json["finderReward"][0]["percentCharged"], 5.0);
        assert_eq!(json["managementFee"][0]["managedBy"], "UHSB");
        assert_eq!(json["initialPayment"]["totalReceived"], 4000.0);

        let allocations = &json["initialPayment"]["allocations"];
        assert_eq!(allocations["consultants"][0]["allocatedAmount"], 4000.0);
        assert!(allocations["consultants"][0]["bankDetails"]
            .get("accNo")
            .is_some());
        assert_eq!(allocations["finderReward"][0]["item"], "Rahman");
        assert_eq!(allocations["managementFee"][0]["item"], "UHSB");
        assert!(allocations["directCost"][0]["bankDetails"]
            .get("accountHolderName")
            .is_some());
        assert!(allocations["sstAllocation"].get("bankName").is_some());
    }

    #[test]
    fn test_blank_consultant_rows_are_skipped() {
        let payload = assemble(&draft());
        assert_eq!(payload.project_consultant.len(), 1);
        // allocations keep every row so indices line up with the draft
        assert_eq!(payload.initial_payment.allocations.consultants.len(), 2);
    }
}
