use crate::model::{ExhibitRecord, PricingSummary, ProjectRecord, UnitWithModel};

// Pure renderers producing markdown fragments for the closed set of
// table placeholders. Assembly splices these into clause content.

pub fn render_pricing_breakdown(summary: &PricingSummary) -> String {
    let mut out = String::new();
    out.push_str("| Category | Amount |\n");
    out.push_str("| --- | ---: |\n");
    out.push_str(&format!(
        "| Design Fee | {} |\n",
        format_currency(summary.design_fee_total)
    ));
    out.push_str(&format!(
        "| Offsite Construction | {} |\n",
        format_currency(summary.offsite_total)
    ));
    out.push_str(&format!(
        "| Onsite Construction | {} |\n",
        format_currency(summary.onsite_total)
    ));
    out.push_str(&format!(
        "| Customizations | {} |\n",
        format_currency(summary.customization_total)
    ));
    out.push_str(&format!(
        "| Project Budget | {} |\n",
        format_currency(summary.project_budget)
    ));
    out.push_str(&format!(
        "| Contract Value ({}) | {} |\n",
        summary.service_model.as_str(),
        format_currency(summary.contract_value)
    ));
    out
}

pub fn render_payment_schedule(summary: &PricingSummary) -> String {
    let mut out = String::new();
    out.push_str("| Milestone | Percentage | Amount |\n");
    out.push_str("| --- | ---: | ---: |\n");
    for milestone in &summary.payment_schedule {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            milestone.name,
            format_percentage(milestone.percentage),
            format_currency(milestone.amount)
        ));
    }
    out.push_str(&format!(
        "| Total | 100% | {} |\n",
        format_currency(summary.contract_value)
    ));
    out
}

pub fn render_unit_details(units: &[UnitWithModel]) -> String {
    let mut out = String::new();
    out.push_str("| Unit | Home Model | Design Fee | Offsite | Onsite | Customizations |\n");
    out.push_str("| --- | --- | ---: | ---: | ---: | ---: |\n");
    for unit in units {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            unit.unit_label,
            unit.model_name,
            format_currency(unit.design_fee),
            format_currency(unit.offsite_base),
            format_currency(unit.onsite_estimate),
            format_currency(unit.customization_total)
        ));
    }
    out
}

pub fn render_signature_block(project: &ProjectRecord) -> String {
    format!(
        "**IN WITNESS WHEREOF**, the parties have executed this Agreement for \
         the {} project.\n\n\
         | Company | Client |\n\
         | --- | --- |\n\
         | By: ______________________ | By: ______________________ |\n\
         | Name: | Name: |\n\
         | Title: | Title: |\n\
         | Date: | Date: |\n",
        project.name
    )
}

pub fn render_exhibit_list(exhibits: &[ExhibitRecord]) -> String {
    if exhibits.is_empty() {
        return "(no exhibits attached)".to_string();
    }

    let mut out = String::new();
    for exhibit in exhibits {
        if exhibit.title.is_empty() {
            out.push_str(&format!("- Exhibit {}\n", exhibit.letter));
        } else {
            out.push_str(&format!("- Exhibit {} — {}\n", exhibit.letter, exhibit.title));
        }
    }
    out
}

pub fn format_currency(amount: i64) -> String {
    let negative = amount < 0;
    let digits = amount.unsigned_abs().to_string();

    let mut grouped = String::new();
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    if negative {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

pub fn format_percentage(percentage: f64) -> String {
    if (percentage - percentage.round()).abs() < f64::EPSILON {
        format!("{}%", percentage.round() as i64)
    } else {
        format!("{percentage}%")
    }
}
