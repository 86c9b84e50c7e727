//! Customer enrichment: purchase statistics, predicted lifetime
//! value, purchasing power, interests and segment, plus an optional
//! Clearbit person/company lookup.

use crate::error::KernelResult;
use crate::CrmKernel;
use chrono::Utc;
use pulsecrm_types::config::resolve_env;
use pulsecrm_types::customer::{Customer, CustomerSegment, PurchasingPower};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const CLV_GROWTH_FACTOR: f64 = 1.5;
const VIP_CLV: f64 = 10_000.0;
const AT_RISK_CHURN: f64 = 0.7;
const CLEARBIT_TIMEOUT: Duration = Duration::from_secs(10);

/// The subset of a Clearbit combined lookup we keep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClearbitProfile {
    pub company_name: Option<String>,
    pub company_domain: Option<String>,
    pub company_size: Option<u64>,
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub linkedin: Option<String>,
    pub twitter: Option<String>,
}

impl ClearbitProfile {
    pub fn from_response(body: &Value) -> Self {
        let text = |v: &Value| v.as_str().filter(|s| !s.is_empty()).map(str::to_string);
        let person = &body["person"];
        let company = &body["company"];
        Self {
            company_name: text(&company["name"]),
            company_domain: text(&company["domain"]),
            company_size: company["metrics"]["employees"].as_u64(),
            job_title: text(&person["employment"]["title"]),
            location: text(&person["location"]),
            linkedin: text(&person["linkedin"]["handle"]),
            twitter: text(&person["twitter"]["handle"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedCustomer {
    pub customer: Customer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ClearbitProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichSummary {
    pub examined: usize,
    pub enriched: usize,
    pub errors: usize,
}

pub fn predicted_clv(avg_order_value: f64, purchases: u32) -> f64 {
    avg_order_value * purchases as f64 * CLV_GROWTH_FACTOR
}

pub fn segment_for(clv: f64, churn_risk: f64) -> CustomerSegment {
    if clv > VIP_CLV {
        CustomerSegment::Vip
    } else if churn_risk > AT_RISK_CHURN {
        CustomerSegment::AtRisk
    } else {
        CustomerSegment::Regular
    }
}

/// Product names mentioned in intent entities (`product` as a string or list).
fn products_in(entities: &serde_json::Map<String, Value>) -> Vec<String> {
    match entities.get("product") {
        Some(Value::String(p)) => vec![p.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

impl CrmKernel {
    pub async fn enrich_customer(&self, customer_id: &str) -> KernelResult<EnrichedCustomer> {
        let customer = self.customer(customer_id)?;
        self.enrich(customer).await
    }

    async fn enrich(&self, mut customer: Customer) -> KernelResult<EnrichedCustomer> {
        let profile = match customer.email.as_deref() {
            Some(email) => self.clearbit_lookup(email).await,
            None => None,
        };
        if let Some(p) = &profile {
            if customer.company.is_none() {
                customer.company.clone_from(&p.company_name);
            }
            if customer.job_title.is_none() {
                customer.job_title.clone_from(&p.job_title);
            }
            if customer.location.is_none() {
                customer.location.clone_from(&p.location);
            }
        }

        let (count, total) = self.store.purchase_stats(&customer.id)?;
        customer.total_purchases = count;
        customer.total_spent = total;
        customer.avg_order_value = if count > 0 { total / count as f64 } else { 0.0 };
        customer.predicted_clv = predicted_clv(customer.avg_order_value, count);
        customer.purchasing_power = Some(PurchasingPower::from_clv(customer.predicted_clv));

        if let Some(lead_id) = &customer.lead_id {
            for intent in self.store.intents_for_lead(lead_id)? {
                for product in products_in(&intent.entities) {
                    if !customer.interests.iter().any(|i| i.eq_ignore_ascii_case(&product)) {
                        customer.interests.push(product);
                    }
                }
            }
        }

        customer.segment = segment_for(customer.predicted_clv, customer.churn_risk_score);
        let now = Utc::now();
        customer.enriched_at = Some(now);
        customer.updated_at = now;
        self.store.update_customer(&customer)?;
        info!(
            customer_id = %customer.id,
            clv = customer.predicted_clv,
            segment = %customer.segment,
            "Customer enriched"
        );
        Ok(EnrichedCustomer { customer, profile })
    }

    /// Look `email` up on Clearbit. Any failure yields `None`.
    async fn clearbit_lookup(&self, email: &str) -> Option<ClearbitProfile> {
        let key = resolve_env(&self.config.enrichment.clearbit_api_key_env)?;
        let url = match url::Url::parse_with_params(
            &self.config.enrichment.clearbit_base_url,
            &[("email", email)],
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Invalid Clearbit base URL");
                return None;
            }
        };
        let result = async {
            let client = reqwest::Client::builder().timeout(CLEARBIT_TIMEOUT).build()?;
            let resp = client.get(url).bearer_auth(key).send().await?;
            let resp = resp.error_for_status()?;
            resp.json::<Value>().await
        }
        .await;
        match result {
            Ok(body) => Some(ClearbitProfile::from_response(&body)),
            Err(e) => {
                debug!(error = %e, "Clearbit lookup failed");
                None
            }
        }
    }

    pub async fn enrich_all_customers(&self) -> KernelResult<EnrichSummary> {
        let mut summary = EnrichSummary::default();
        for customer in self.store.unmerged_customers()? {
            summary.examined += 1;
            let id = customer.id.clone();
            match self.enrich(customer).await {
                Ok(_) => summary.enriched += 1,
                Err(e) => {
                    warn!(customer_id = %id, error = %e, "Enrichment failed");
                    summary.errors += 1;
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, test_kernel_with};
    use pulsecrm_types::commerce::Purchase;
    use pulsecrm_types::intent::{IntentType, LeadIntent};
    use pulsecrm_types::new_id;
    use serde_json::json;

    fn kernel() -> CrmKernel {
        let mut config = test_config();
        config.enrichment.clearbit_api_key_env = String::new();
        test_kernel_with(config, None).0
    }

    #[test]
    fn clv_and_segments() {
        assert_eq!(predicted_clv(100.0, 4), 600.0);
        assert_eq!(predicted_clv(0.0, 0), 0.0);
        assert_eq!(segment_for(10_001.0, 0.9), CustomerSegment::Vip);
        assert_eq!(segment_for(500.0, 0.71), CustomerSegment::AtRisk);
        assert_eq!(segment_for(500.0, 0.7), CustomerSegment::Regular);
    }

    #[test]
    fn clearbit_profile_extraction() {
        let body = json!({
            "person": {
                "employment": {"title": "CTO"},
                "location": "Panamá",
                "linkedin": {"handle": "in/ana"},
                "twitter": {"handle": null}
            },
            "company": {"name": "Acme", "domain": "acme.com", "metrics": {"employees": 40}}
        });
        let p = ClearbitProfile::from_response(&body);
        assert_eq!(p.company_name.as_deref(), Some("Acme"));
        assert_eq!(p.company_size, Some(40));
        assert_eq!(p.job_title.as_deref(), Some("CTO"));
        assert_eq!(p.twitter, None);
        assert_eq!(ClearbitProfile::from_response(&json!({})), ClearbitProfile::default());
    }

    #[tokio::test]
    async fn enrichment_from_purchases_and_intents() {
        let kernel = kernel();
        let mut c = Customer::new(Utc::now());
        c.lead_id = Some("lead-1".into());
        c.churn_risk_score = 0.2;
        kernel.store.insert_customer(&c).unwrap();
        for amount in [4000.0, 3000.0] {
            kernel
                .store
                .insert_purchase(&Purchase {
                    id: new_id(),
                    customer_id: c.id.clone(),
                    amount,
                    description: None,
                    purchased_at: Utc::now(),
                })
                .unwrap();
        }
        let mut entities = serde_json::Map::new();
        entities.insert("product".into(), json!(["sofá", "lámpara"]));
        kernel
            .store
            .insert_intent(&LeadIntent {
                id: new_id(),
                lead_id: "lead-1".into(),
                message_id: None,
                primary_intent: IntentType::PurchaseInquiry,
                secondary_intents: vec![],
                confidence: 0.9,
                entities,
                created_at: Utc::now(),
            })
            .unwrap();

        let out = kernel.enrich_customer(&c.id).await.unwrap();
        let e = out.customer;
        assert!(out.profile.is_none());
        assert_eq!(e.total_purchases, 2);
        assert_eq!(e.avg_order_value, 3500.0);
        assert_eq!(e.predicted_clv, 10_500.0);
        assert_eq!(e.purchasing_power, Some(PurchasingPower::High));
        assert_eq!(e.segment, CustomerSegment::Vip);
        assert_eq!(e.interests, vec!["sofá", "lámpara"]);
        assert!(kernel.store.get_customer(&c.id).unwrap().unwrap().enriched_at.is_some());
    }

    #[tokio::test]
    async fn customers_without_history_are_low_regular() {
        let kernel = kernel();
        let c = Customer::new(Utc::now());
        kernel.store.insert_customer(&c).unwrap();
        let summary = kernel.enrich_all_customers().await.unwrap();
        assert_eq!((summary.examined, summary.enriched), (1, 1));
        let stored = kernel.store.get_customer(&c.id).unwrap().unwrap();
        assert_eq!(stored.purchasing_power, Some(PurchasingPower::Low));
        assert_eq!(stored.segment, CustomerSegment::Regular);
    }
}
