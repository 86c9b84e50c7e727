//! Customer deduplication.
//!
//! Candidates come from cheap rules (same email, same phone, near-identical
//! name); the LLM, when configured, confirms each candidate pair.

use crate::error::{KernelError, KernelResult};
use crate::scheduler::JobReport;
use crate::text::fold;
use crate::CrmKernel;
use chrono::Utc;
use pulsecrm_types::customer::{Customer, CustomerStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// Names must be more than this similar (0-100) to be candidates.
const NAME_SIMILARITY_THRESHOLD: f64 = 85.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub primary: Customer,
    pub duplicates: Vec<Customer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupSummary {
    pub groups: Vec<DuplicateGroup>,
    /// Duplicate records merged into their primary.
    pub merged: usize,
}

/// Similarity of two names on a 0-100 scale, ignoring case and accents.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&fold(a.trim()), &fold(b.trim())) * 100.0
}

fn same_value(a: &Option<String>, b: &Option<String>) -> bool {
    match (a.as_deref().map(str::trim), b.as_deref().map(str::trim)) {
        (Some(x), Some(y)) => !x.is_empty() && x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

/// Rule-based candidate check.
pub fn is_candidate(a: &Customer, b: &Customer) -> bool {
    if same_value(&a.email, &b.email) || same_value(&a.phone, &b.phone) {
        return true;
    }
    match (&a.name, &b.name) {
        (Some(x), Some(y)) => name_similarity(x, y) > NAME_SIMILARITY_THRESHOLD,
        _ => false,
    }
}

/// The verdict is the first word of the answer.
fn is_duplicate_verdict(answer: &str) -> bool {
    let answer = fold(answer);
    let verdict = answer
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric());
    matches!(verdict, "duplicate" | "duplicado")
}

fn describe(c: &Customer) -> String {
    format!(
        "name: {}, email: {}, phone: {}",
        c.name.as_deref().unwrap_or("N/A"),
        c.email.as_deref().unwrap_or("N/A"),
        c.phone.as_deref().unwrap_or("N/A"),
    )
}

impl CrmKernel {
    /// Group unmerged customers with their confirmed duplicates. The oldest
    /// record of each group is the primary.
    pub async fn find_duplicates(&self) -> KernelResult<Vec<DuplicateGroup>> {
        let customers = self.store.unmerged_customers()?;
        let mut processed: HashSet<String> = HashSet::new();
        let mut groups = Vec::new();

        // Oldest first; each pair is only ever judged from its older side.
        for (i, contact) in customers.iter().enumerate() {
            if processed.contains(&contact.id) {
                continue;
            }
            let candidates: Vec<&Customer> = customers[i + 1..]
                .iter()
                .filter(|o| !processed.contains(&o.id))
                .filter(|o| is_candidate(contact, o))
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let mut confirmed = Vec::new();
            for candidate in candidates {
                if self.confirm_duplicate(contact, candidate).await {
                    confirmed.push(candidate.clone());
                }
            }
            if confirmed.is_empty() {
                continue;
            }
            processed.insert(contact.id.clone());
            processed.extend(confirmed.iter().map(|c| c.id.clone()));
            groups.push(DuplicateGroup {
                primary: contact.clone(),
                duplicates: confirmed,
            });
        }
        info!(groups = groups.len(), scanned = customers.len(), "Duplicate scan finished");
        Ok(groups)
    }

    async fn confirm_duplicate(&self, a: &Customer, b: &Customer) -> bool {
        let Some(ai) = &self.ai else {
            return true;
        };
        let prompt = format!(
            "Record 1: {}\nRecord 2: {}\n\nIdentical email or phone almost certainly means the same \
             person; a very similar name probably does. Answer with one word: \"duplicate\" or \"different\".",
            describe(a),
            describe(b)
        );
        match ai
            .complete_text("You review CRM records for duplicates.", &prompt, 0.0, 10)
            .await
        {
            Ok(answer) => is_duplicate_verdict(&answer),
            Err(e) => {
                warn!(primary = %a.id, candidate = %b.id, error = %e, "Duplicate confirmation failed");
                false
            }
        }
    }

    /// Fold `duplicate_ids` into `primary_id`: copy missing contact data,
    /// move related rows and mark the duplicates merged.
    pub fn merge_duplicates(&self, primary_id: &str, duplicate_ids: &[String]) -> KernelResult<Customer> {
        let mut primary = self.customer(primary_id)?;
        if primary.status == CustomerStatus::Merged {
            return Err(KernelError::Invalid(format!(
                "customer {primary_id} has itself been merged"
            )));
        }
        let now = Utc::now();
        for dupe_id in duplicate_ids {
            if dupe_id == primary_id {
                continue;
            }
            let mut dupe = self.customer(dupe_id)?;
            if dupe.status == CustomerStatus::Merged {
                continue;
            }
            for (slot, value) in [
                (&mut primary.name, &dupe.name),
                (&mut primary.email, &dupe.email),
                (&mut primary.phone, &dupe.phone),
                (&mut primary.company, &dupe.company),
                (&mut primary.lead_id, &dupe.lead_id),
            ] {
                if slot.is_none() {
                    slot.clone_from(value);
                }
            }
            for interest in &dupe.interests {
                if !primary.interests.contains(interest) {
                    primary.interests.push(interest.clone());
                }
            }
            let moved = self.store.reassign_customer(&dupe.id, &primary.id)?;

            dupe.status = CustomerStatus::Merged;
            dupe.merged_into = Some(primary.id.clone());
            dupe.updated_at = now;
            self.store.update_customer(&dupe)?;
            info!(primary_id, duplicate_id = %dupe.id, moved, "Customer merged");
        }
        primary.updated_at = now;
        self.store.update_customer(&primary)?;
        Ok(primary)
    }

    /// Find duplicate groups and, when `merge` is set, merge them.
    pub async fn deduplicate(&self, merge: bool) -> KernelResult<DedupSummary> {
        let groups = self.find_duplicates().await?;
        let mut merged = 0;
        if merge {
            for group in &groups {
                let ids: Vec<String> = group.duplicates.iter().map(|d| d.id.clone()).collect();
                self.merge_duplicates(&group.primary.id, &ids)?;
                merged += ids.len();
            }
        }
        Ok(DedupSummary { groups, merged })
    }

    /// Scheduled variant: scan and merge.
    pub async fn run_dedup_job(&self) -> KernelResult<JobReport> {
        let mut report = JobReport::new("dedup");
        let summary = self.deduplicate(true).await?;
        report.examined = summary.groups.len();
        report.actions = summary.merged;
        Ok(report)
    }
}
