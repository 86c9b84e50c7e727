//! Customer records.

use crate::codec::{get_enum, get_json, get_opt_enum, get_opt_ts, get_ts, opt_ts, to_json, ts};
use crate::{CrmStore, MemoryError, OptionalRow, Result};
use chrono::Utc;
use pulsecrm_types::customer::{Customer, CustomerStatus};
use rusqlite::{params, Row};

const CUSTOMER_COLUMNS: &str = "id, lead_id, name, email, phone, company, job_title, location, predicted_clv, purchasing_power, interests, segment, total_purchases, total_spent, avg_order_value, status, churn_risk_score, merged_into, enriched_at, created_at, updated_at";

fn customer_from_row(r: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: r.get(0)?,
        lead_id: r.get(1)?,
        name: r.get(2)?,
        email: r.get(3)?,
        phone: r.get(4)?,
        company: r.get(5)?,
        job_title: r.get(6)?,
        location: r.get(7)?,
        predicted_clv: r.get(8)?,
        purchasing_power: get_opt_enum(r, 9)?,
        interests: get_json(r, 10)?,
        segment: get_enum(r, 11)?,
        total_purchases: r.get(12)?,
        total_spent: r.get(13)?,
        avg_order_value: r.get(14)?,
        status: get_enum(r, 15)?,
        churn_risk_score: r.get(16)?,
        merged_into: r.get(17)?,
        enriched_at: get_opt_ts(r, 18)?,
        created_at: get_ts(r, 19)?,
        updated_at: get_ts(r, 20)?,
    })
}

impl CrmStore {
    pub fn insert_customer(&self, c: &Customer) -> Result<()> {
        let interests = to_json(&c.interests)?;
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO customers ({CUSTOMER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                c.id,
                c.lead_id,
                c.name,
                c.email,
                c.phone,
                c.company,
                c.job_title,
                c.location,
                c.predicted_clv,
                c.purchasing_power.map(|p| p.as_str()),
                interests,
                c.segment.as_str(),
                c.total_purchases,
                c.total_spent,
                c.avg_order_value,
                c.status.as_str(),
                c.churn_risk_score,
                c.merged_into,
                opt_ts(&c.enriched_at),
                ts(&c.created_at),
                ts(&c.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_customer(&self, c: &Customer) -> Result<()> {
        let interests = to_json(&c.interests)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE customers SET lead_id = ?, name = ?, email = ?, phone = ?, company = ?, job_title = ?, location = ?,
                predicted_clv = ?, purchasing_power = ?, interests = ?, segment = ?, total_purchases = ?, total_spent = ?,
                avg_order_value = ?, status = ?, churn_risk_score = ?, merged_into = ?, enriched_at = ?, updated_at = ?
             WHERE id = ?",
            params![
                c.lead_id,
                c.name,
                c.email,
                c.phone,
                c.company,
                c.job_title,
                c.location,
                c.predicted_clv,
                c.purchasing_power.map(|p| p.as_str()),
                interests,
                c.segment.as_str(),
                c.total_purchases,
                c.total_spent,
                c.avg_order_value,
                c.status.as_str(),
                c.churn_risk_score,
                c.merged_into,
                opt_ts(&c.enriched_at),
                ts(&Utc::now()),
                c.id,
            ],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                entity: "customer",
                id: c.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
        let conn = self.conn()?;
        let customer = conn
            .query_row(
                &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?"),
                params![id],
                customer_from_row,
            )
            .optional()?;
        Ok(customer)
    }

    pub fn get_customer_by_lead(&self, lead_id: &str) -> Result<Option<Customer>> {
        let conn = self.conn()?;
        let customer = conn
            .query_row(
                &format!(
                    "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE lead_id = ? AND status != 'merged' LIMIT 1"
                ),
                params![lead_id],
                customer_from_row,
            )
            .optional()?;
        Ok(customer)
    }

    pub fn list_customers(&self, limit: usize) -> Result<Vec<Customer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY created_at DESC LIMIT ?"
        ))?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(customer_from_row(r)?);
        }
        Ok(out)
    }

    /// Customers that have not been merged into another record, oldest first.
    pub fn unmerged_customers(&self) -> Result<Vec<Customer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE status != ? ORDER BY created_at ASC"
        ))?;
        let customers = stmt
            .query_map(params![CustomerStatus::Merged.as_str()], customer_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(customers)
    }

    /// Point every conversation, cart, purchase, invoice and case owned by
    /// `from` at `to`. Returns the number of rows moved.
    pub fn reassign_customer(&self, from: &str, to: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut moved = 0;
        for table in ["conversations", "carts", "purchases", "invoices", "cases"] {
            moved += tx.execute(
                &format!("UPDATE {table} SET customer_id = ?1 WHERE customer_id = ?2"),
                params![to, from],
            )?;
        }
        tx.commit()?;
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsecrm_types::commerce::{Cart, Invoice};
    use pulsecrm_types::customer::{CustomerSegment, PurchasingPower};

    #[test]
    fn customer_round_trip_with_enrichment() {
        let store = CrmStore::open_in_memory().unwrap();
        let mut c = Customer::new(Utc::now());
        c.name = Some("Ana Pérez".into());
        store.insert_customer(&c).unwrap();

        c.interests = vec!["sofas".into(), "lamps".into()];
        c.purchasing_power = Some(PurchasingPower::Medium);
        c.segment = CustomerSegment::Vip;
        c.enriched_at = Some(Utc::now());
        store.update_customer(&c).unwrap();

        let got = store.get_customer(&c.id).unwrap().unwrap();
        assert_eq!(got.interests, vec!["sofas", "lamps"]);
        assert_eq!(got.purchasing_power, Some(PurchasingPower::Medium));
        assert_eq!(got.segment, CustomerSegment::Vip);
        assert!(got.enriched_at.is_some());
    }

    #[test]
    fn reassign_moves_related_rows() {
        let store = CrmStore::open_in_memory().unwrap();
        let a = Customer::new(Utc::now());
        let b = Customer::new(Utc::now());
        store.insert_customer(&a).unwrap();
        store.insert_customer(&b).unwrap();
        store
            .insert_cart(&Cart::new(&b.id, vec![], Utc::now()))
            .unwrap();
        store
            .insert_invoice(&Invoice::new(&b.id, "INV-1", 10.0, Utc::now()))
            .unwrap();

        let moved = store.reassign_customer(&b.id, &a.id).unwrap();
        assert_eq!(moved, 2);
        assert!(store.carts_for_customer(&b.id).unwrap().is_empty());
        assert_eq!(store.carts_for_customer(&a.id).unwrap().len(), 1);
    }

    #[test]
    fn merged_customers_are_excluded() {
        let store = CrmStore::open_in_memory().unwrap();
        let a = Customer::new(Utc::now());
        let mut b = Customer::new(Utc::now());
        b.status = CustomerStatus::Merged;
        b.merged_into = Some(a.id.clone());
        store.insert_customer(&a).unwrap();
        store.insert_customer(&b).unwrap();
        let live = store.unmerged_customers().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, a.id);
    }
}
