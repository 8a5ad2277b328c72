use crate::domain::{Category, IncidentForm};
use crate::error::AppError;

/// Message surfaced to callers when `details` is missing or blank.
pub const DETAILS_REQUIRED: &str = "Details are required";

/// Incident input that passed validation: every string is trimmed, blank optionals are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidIncident {
    pub details: String,
    pub location: Option<String>,
    pub sub_location: Option<String>,
    pub category: Option<Category>,
}

fn trimmed(value: Option<&str>) -> Option<String> {
    let v = value?.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

/// Check required fields and normalize optional ones.
///
/// Only `details` is required. An unrecognized category is rejected rather than stored.
pub fn validate_form(form: &IncidentForm) -> Result<ValidIncident, AppError> {
    let details = trimmed(form.details.as_deref())
        .ok_or_else(|| AppError::validation("DETAILS_REQUIRED", DETAILS_REQUIRED))?;

    let category = match trimmed(form.category.as_deref()) {
        None => None,
        Some(raw) => Some(Category::parse(&raw).ok_or_else(|| {
            AppError::validation("CATEGORY_UNKNOWN", format!("Unknown category: {raw}"))
                .with_details(format!(
                    "allowed={}",
                    Category::ALL.map(|c| c.as_str()).join(",")
                ))
        })?),
    };

    Ok(ValidIncident {
        details,
        location: trimmed(form.location.as_deref()),
        sub_location: trimmed(form.sub_location.as_deref()),
        category,
    })
}
