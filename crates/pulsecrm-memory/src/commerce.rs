//! Carts, purchases and invoices.

use crate::codec::{get_enum, get_json, get_opt_enum, get_opt_ts, get_ts, opt_ts, to_json, ts};
use crate::{CrmStore, MemoryError, OptionalRow, Result};
use chrono::{DateTime, Utc};
use pulsecrm_types::commerce::{Cart, Invoice, Purchase};
use rusqlite::{params, Row};

const CART_COLUMNS: &str = "id, customer_id, items, total, status, last_activity_at, recovery_attempt_count, discount_codes_used, final_attempt, recovered_at, recovery_channel, created_at";

fn cart_from_row(r: &Row<'_>) -> rusqlite::Result<Cart> {
    Ok(Cart {
        id: r.get(0)?,
        customer_id: r.get(1)?,
        items: get_json(r, 2)?,
        total: r.get(3)?,
        status: get_enum(r, 4)?,
        last_activity_at: get_ts(r, 5)?,
        recovery_attempt_count: r.get(6)?,
        discount_codes_used: get_json(r, 7)?,
        final_attempt: r.get(8)?,
        recovered_at: get_opt_ts(r, 9)?,
        recovery_channel: get_opt_enum(r, 10)?,
        created_at: get_ts(r, 11)?,
    })
}

const INVOICE_COLUMNS: &str = "id, customer_id, number, amount, status, due_date, late_fee, reminder_count, last_reminder_at, paid_at, created_at";

fn invoice_from_row(r: &Row<'_>) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: r.get(0)?,
        customer_id: r.get(1)?,
        number: r.get(2)?,
        amount: r.get(3)?,
        status: get_enum(r, 4)?,
        due_date: get_ts(r, 5)?,
        late_fee: r.get(6)?,
        reminder_count: r.get(7)?,
        last_reminder_at: get_opt_ts(r, 8)?,
        paid_at: get_opt_ts(r, 9)?,
        created_at: get_ts(r, 10)?,
    })
}

impl CrmStore {
    pub fn insert_cart(&self, c: &Cart) -> Result<()> {
        let items = to_json(&c.items)?;
        let codes = to_json(&c.discount_codes_used)?;
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO carts ({CART_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                c.id,
                c.customer_id,
                items,
                c.total,
                c.status.as_str(),
                ts(&c.last_activity_at),
                c.recovery_attempt_count,
                codes,
                c.final_attempt,
                opt_ts(&c.recovered_at),
                c.recovery_channel.map(|ch| ch.as_str()),
                ts(&c.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_cart(&self, c: &Cart) -> Result<()> {
        let items = to_json(&c.items)?;
        let codes = to_json(&c.discount_codes_used)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE carts SET customer_id = ?, items = ?, total = ?, status = ?, last_activity_at = ?, recovery_attempt_count = ?,
                discount_codes_used = ?, final_attempt = ?, recovered_at = ?, recovery_channel = ?
             WHERE id = ?",
            params![
                c.customer_id,
                items,
                c.total,
                c.status.as_str(),
                ts(&c.last_activity_at),
                c.recovery_attempt_count,
                codes,
                c.final_attempt,
                opt_ts(&c.recovered_at),
                c.recovery_channel.map(|ch| ch.as_str()),
                c.id,
            ],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                entity: "cart",
                id: c.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_cart(&self, id: &str) -> Result<Option<Cart>> {
        let conn = self.conn()?;
        let cart = conn
            .query_row(
                &format!("SELECT {CART_COLUMNS} FROM carts WHERE id = ?"),
                params![id],
                cart_from_row,
            )
            .optional()?;
        Ok(cart)
    }

    pub fn carts_for_customer(&self, customer_id: &str) -> Result<Vec<Cart>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE customer_id = ? ORDER BY created_at DESC"
        ))?;
        let carts = stmt
            .query_map(params![customer_id], cart_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(carts)
    }

    /// Pending carts untouched since before `cutoff`, oldest activity first.
    pub fn pending_carts_idle_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Cart>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE status = 'pending' AND last_activity_at < ?
             ORDER BY last_activity_at ASC"
        ))?;
        let carts = stmt
            .query_map(params![ts(&cutoff)], cart_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(carts)
    }

    pub fn insert_purchase(&self, p: &Purchase) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO purchases (id, customer_id, amount, description, purchased_at) VALUES (?, ?, ?, ?, ?)",
            params![p.id, p.customer_id, p.amount, p.description, ts(&p.purchased_at)],
        )?;
        Ok(())
    }

    /// Sum of purchase amounts in `[from, to)`.
    pub fn purchase_total_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<f64> {
        let conn = self.conn()?;
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0.0) FROM purchases WHERE purchased_at >= ? AND purchased_at < ?",
            params![ts(&from), ts(&to)],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    /// `(count, total)` of a customer's purchases.
    pub fn purchase_stats(&self, customer_id: &str) -> Result<(u32, f64)> {
        let conn = self.conn()?;
        let (count, total): (i64, f64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0.0) FROM purchases WHERE customer_id = ?",
            params![customer_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok((count.max(0) as u32, total))
    }

    pub fn insert_invoice(&self, i: &Invoice) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO invoices ({INVOICE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                i.id,
                i.customer_id,
                i.number,
                i.amount,
                i.status.as_str(),
                ts(&i.due_date),
                i.late_fee,
                i.reminder_count,
                opt_ts(&i.last_reminder_at),
                opt_ts(&i.paid_at),
                ts(&i.created_at),
            ],
        )
        .map_err(|e| {
            if crate::is_constraint_violation(&e) {
                MemoryError::Duplicate(format!("invoice number {}", i.number))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    pub fn update_invoice(&self, i: &Invoice) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE invoices SET status = ?, late_fee = ?, reminder_count = ?, last_reminder_at = ?, paid_at = ? WHERE id = ?",
            params![
                i.status.as_str(),
                i.late_fee,
                i.reminder_count,
                opt_ts(&i.last_reminder_at),
                opt_ts(&i.paid_at),
                i.id,
            ],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                entity: "invoice",
                id: i.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_invoice(&self, id: &str) -> Result<Option<Invoice>> {
        let conn = self.conn()?;
        let invoice = conn
            .query_row(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?"),
                params![id],
                invoice_from_row,
            )
            .optional()?;
        Ok(invoice)
    }

    /// Pending and overdue invoices, earliest due date first.
    pub fn open_invoices(&self) -> Result<Vec<Invoice>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE status IN ('pending', 'overdue') ORDER BY due_date ASC"
        ))?;
        let invoices = stmt
            .query_map([], invoice_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(invoices)
    }
}
