use anyhow::{Context, Result};
use tracing::info;

use crate::cli::PricingArgs;
use crate::error::EngineResult;
use crate::model::{
    MilestoneRecord, ModelUnitSummary, PaymentMilestone, PricingSummary, ProjectRecord,
    ServiceModel, UnitWithModel,
};
use crate::store::ClauseStore;
use crate::util::write_json_pretty;

// Default split applied when a project has no explicit milestone records.
pub const DEFAULT_MILESTONES: &[(&str, f64)] = &[
    ("Deposit", 20.0),
    ("Design Approval", 20.0),
    ("Production Start", 20.0),
    ("Delivery", 20.0),
    ("Installation", 15.0),
    ("Retainage", 5.0),
];

pub fn run(args: PricingArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("clauseforge.sqlite"));

    let store = ClauseStore::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let summary = compute_pricing(&store, args.project_id)
        .with_context(|| format!("failed to price project {}", args.project_id))?;

    info!(
        project_id = summary.project_id,
        unit_count = summary.unit_count,
        project_budget = summary.project_budget,
        contract_value = summary.contract_value,
        "pricing computed"
    );

    match &args.output {
        Some(path) => write_json_pretty(path, &summary)?,
        None => println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("failed to serialize summary")?
        ),
    }

    Ok(())
}

// Always recomputed from current records; nothing here is cached.
pub fn compute_pricing(store: &ClauseStore, project_id: i64) -> EngineResult<PricingSummary> {
    let project = store.project(project_id)?;
    let units = store.units_with_models(project_id)?;
    let milestones = store.milestones(project_id)?;
    Ok(summarize(&project, &units, &milestones))
}

pub fn summarize(
    project: &ProjectRecord,
    units: &[UnitWithModel],
    milestones: &[MilestoneRecord],
) -> PricingSummary {
    let design_fee_total: i64 = units.iter().map(|unit| unit.design_fee).sum();
    let customization_total: i64 = units.iter().map(|unit| unit.customization_total).sum();
    let offsite_total: i64 =
        units.iter().map(|unit| unit.offsite_base).sum::<i64>() + customization_total;
    // Project-level site costs only apply once there is something on site.
    let onsite_total: i64 = if units.is_empty() {
        0
    } else {
        units.iter().map(|unit| unit.onsite_estimate).sum::<i64>() + project.site_costs
    };

    let project_budget = design_fee_total + offsite_total + onsite_total;

    // CRC projects keep their own on-site contractor, so on-site costs
    // fall outside the contract value. CMOS contracts cover everything.
    let contract_value = match project.service_model {
        ServiceModel::Crc => project_budget - onsite_total,
        ServiceModel::Cmos => project_budget,
    };

    PricingSummary {
        project_id: project.id,
        project_name: project.name.clone(),
        service_model: project.service_model,
        unit_count: units.len() as i64,
        design_fee_total,
        offsite_total,
        onsite_total,
        customization_total,
        site_costs: if units.is_empty() { 0 } else { project.site_costs },
        project_budget,
        contract_value,
        payment_schedule: build_payment_schedule(contract_value, milestones),
        model_summaries: summarize_models(units),
    }
}

// Each amount rounds to the nearest currency unit; the rounding
// remainder lands on the milestone named "Retainage" when one exists,
// positionally last otherwise, so the schedule always reconciles to the
// contract value exactly.
pub fn build_payment_schedule(
    contract_value: i64,
    milestones: &[MilestoneRecord],
) -> Vec<PaymentMilestone> {
    let plan: Vec<MilestoneRecord> = if milestones.is_empty() {
        DEFAULT_MILESTONES
            .iter()
            .map(|(name, percentage)| MilestoneRecord {
                name: (*name).to_string(),
                percentage: *percentage,
            })
            .collect()
    } else {
        milestones.to_vec()
    };

    let mut schedule: Vec<PaymentMilestone> = plan
        .iter()
        .map(|milestone| PaymentMilestone {
            name: milestone.name.clone(),
            percentage: milestone.percentage,
            amount: (contract_value as f64 * milestone.percentage / 100.0).round() as i64,
        })
        .collect();

    if schedule.is_empty() {
        return schedule;
    }

    let allocated: i64 = schedule.iter().map(|milestone| milestone.amount).sum();
    let remainder = contract_value - allocated;
    if remainder != 0 {
        let target = schedule
            .iter()
            .position(|milestone| milestone.name.eq_ignore_ascii_case("retainage"))
            .unwrap_or(schedule.len() - 1);
        schedule[target].amount += remainder;
    }

    schedule
}

fn summarize_models(units: &[UnitWithModel]) -> Vec<ModelUnitSummary> {
    let mut summaries = Vec::<ModelUnitSummary>::new();

    for unit in units {
        match summaries
            .iter_mut()
            .find(|summary| summary.model_name == unit.model_name)
        {
            Some(summary) => {
                summary.unit_count += 1;
                summary.design_fee_subtotal += unit.design_fee;
                summary.offsite_subtotal += unit.offsite_base + unit.customization_total;
                summary.onsite_subtotal += unit.onsite_estimate;
            }
            None => summaries.push(ModelUnitSummary {
                model_name: unit.model_name.clone(),
                unit_count: 1,
                design_fee_subtotal: unit.design_fee,
                offsite_subtotal: unit.offsite_base + unit.customization_total,
                onsite_subtotal: unit.onsite_estimate,
            }),
        }
    }

    summaries
}
