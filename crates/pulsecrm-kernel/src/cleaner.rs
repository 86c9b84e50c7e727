//! Contact data normalisation.

use crate::error::KernelResult;
use crate::CrmKernel;
use chrono::Utc;
use pulsecrm_types::customer::Customer;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

const EMAIL_TYPOS: &[(&str, &str)] = &[
    ("@gmial.com", "@gmail.com"),
    ("@gmai.com", "@gmail.com"),
    ("@gmail.con", "@gmail.com"),
    ("@hotmial.com", "@hotmail.com"),
    ("@hotmai.com", "@hotmail.com"),
    ("@yahooo.com", "@yahoo.com"),
    ("@outlok.com", "@outlook.com"),
];

const NAME_PARTICLES: &[&str] = &["de", "del", "la", "los", "van", "von", "da", "di"];

const MIN_E164_DIGITS: usize = 8;
const MAX_E164_DIGITS: usize = 15;
/// Shortest national number accepted after a bare calling code.
const MIN_NATIONAL_DIGITS: usize = 7;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("email pattern is valid")
    })
}

/// Trim, lowercase, fix common domain typos and validate.
pub fn clean_email(raw: &str) -> Option<String> {
    let mut email = raw.trim().to_lowercase();
    for (typo, fix) in EMAIL_TYPOS {
        if email.ends_with(typo) {
            email = format!("{}{fix}", &email[..email.len() - typo.len()]);
            debug!(email = %email, "Email typo corrected");
        }
    }
    if email_regex().is_match(&email) {
        Some(email)
    } else {
        warn!(email = %email, "Invalid email format");
        None
    }
}

/// Normalise to E.164 (`+` and 8-15 digits). Numbers without an
/// international prefix get `calling_code` prepended.
pub fn clean_phone(raw: &str, calling_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    let calling_code = calling_code.trim().trim_start_matches('+');

    let full = if trimmed.starts_with('+') {
        digits
    } else if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else if !calling_code.is_empty()
        && digits.starts_with(calling_code)
        && digits.len() >= calling_code.len() + MIN_NATIONAL_DIGITS
    {
        digits
    } else {
        format!("{calling_code}{}", digits.trim_start_matches('0'))
    };

    if (MIN_E164_DIGITS..=MAX_E164_DIGITS).contains(&full.len()) && !full.starts_with('0') {
        Some(format!("+{full}"))
    } else {
        warn!(phone = %trimmed, "Invalid phone number");
        None
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.split('-').map(capitalize).collect::<Vec<_>>().join("-"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title case with name particles kept lowercase after the first word,
/// e.g. "MARÍA DE LOS ÁNGELES" -> "María de los Ángeles".
pub fn clean_name(raw: &str) -> String {
    title_case(raw)
        .split(' ')
        .enumerate()
        .map(|(i, w)| {
            let lower = w.to_lowercase();
            if i > 0 && NAME_PARTICLES.contains(&lower.as_str()) {
                lower
            } else {
                w.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn clean_company(raw: &str) -> String {
    title_case(raw)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedCustomer {
    pub customer: Customer,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanSummary {
    pub examined: usize,
    pub changed: usize,
    pub results: Vec<CleanedCustomer>,
}

fn apply(
    changes: &mut Vec<FieldChange>,
    field: &str,
    slot: &mut Option<String>,
    clean: impl FnOnce(&str) -> Option<String>,
) {
    let Some(before) = slot.clone() else {
        return;
    };
    let after = clean(&before);
    if after.as_deref() != Some(before.as_str()) {
        changes.push(FieldChange {
            field: field.to_string(),
            before: Some(before),
            after: after.clone(),
        });
        *slot = after;
    }
}

/// Clean a customer in place, returning what changed.
pub fn clean_fields(customer: &mut Customer, calling_code: &str) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    apply(&mut changes, "email", &mut customer.email, clean_email);
    apply(&mut changes, "phone", &mut customer.phone, |p| clean_phone(p, calling_code));
    apply(&mut changes, "name", &mut customer.name, |n| {
        Some(clean_name(n)).filter(|n| !n.is_empty())
    });
    apply(&mut changes, "company", &mut customer.company, |c| {
        Some(clean_company(c)).filter(|c| !c.is_empty())
    });
    changes
}

impl CrmKernel {
    pub fn clean_customer(&self, customer_id: &str) -> KernelResult<CleanedCustomer> {
        let customer = self.customer(customer_id)?;
        self.clean_and_store(customer)
    }

    fn clean_and_store(&self, mut customer: Customer) -> KernelResult<CleanedCustomer> {
        let changes = clean_fields(&mut customer, &self.config.cleaning.default_calling_code);
        if !changes.is_empty() {
            customer.updated_at = Utc::now();
            self.store.update_customer(&customer)?;
            info!(customer_id = %customer.id, changes = changes.len(), "Customer data cleaned");
        }
        Ok(CleanedCustomer { customer, changes })
    }

    /// Clean every customer that has not been merged away.
    pub fn clean_all_customers(&self) -> KernelResult<CleanSummary> {
        let mut summary = CleanSummary::default();
        for customer in self.store.unmerged_customers()? {
            summary.examined += 1;
            let cleaned = self.clean_and_store(customer)?;
            if !cleaned.changes.is_empty() {
                summary.changed += 1;
                summary.results.push(cleaned);
            }
        }
        info!(examined = summary.examined, changed = summary.changed, "Data cleaning finished");
        Ok(summary)
    }
}
