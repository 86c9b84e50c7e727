//! Carts, purchases and invoices.

use crate::conversation::Channel;
use crate::string_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Pending,
    Recovered,
    Abandoned,
    Completed,
}

string_enum!(CartStatus {
    Pending => "pending",
    Recovered => "recovered",
    Abandoned => "abandoned",
    Completed => "completed",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: u32,
    pub price: f64,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub customer_id: String,
    pub items: Vec<CartItem>,
    pub total: f64,
    pub status: CartStatus,
    pub last_activity_at: DateTime<Utc>,
    pub recovery_attempt_count: u32,
    pub discount_codes_used: Vec<String>,
    pub final_attempt: bool,
    pub recovered_at: Option<DateTime<Utc>>,
    pub recovery_channel: Option<Channel>,
    pub created_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(customer_id: &str, items: Vec<CartItem>, now: DateTime<Utc>) -> Self {
        let total = items.iter().map(|i| i.price * i.quantity as f64).sum();
        Self {
            id: crate::new_id(),
            customer_id: customer_id.to_string(),
            items,
            total,
            status: CartStatus::Pending,
            last_activity_at: now,
            recovery_attempt_count: 0,
            discount_codes_used: Vec::new(),
            final_attempt: false,
            recovered_at: None,
            recovery_channel: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    pub customer_id: String,
    pub amount: f64,
    pub description: Option<String>,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

string_enum!(InvoiceStatus {
    Pending => "pending",
    Paid => "paid",
    Overdue => "overdue",
    Cancelled => "cancelled",
});

impl InvoiceStatus {
    /// Invoices still owed by the customer.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Overdue)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub customer_id: String,
    pub number: String,
    pub amount: f64,
    pub status: InvoiceStatus,
    pub due_date: DateTime<Utc>,
    pub late_fee: f64,
    /// Reminder stages already delivered.
    pub reminder_count: u32,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(customer_id: &str, number: &str, amount: f64, due_date: DateTime<Utc>) -> Self {
        Self {
            id: crate::new_id(),
            customer_id: customer_id.to_string(),
            number: number.to_string(),
            amount,
            status: InvoiceStatus::Pending,
            due_date,
            late_fee: 0.0,
            reminder_count: 0,
            last_reminder_at: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_total_accounts_for_quantity() {
        let cart = Cart::new(
            "c1",
            vec![
                CartItem {
                    name: "Lamp".into(),
                    quantity: 2,
                    price: 25.0,
                },
                CartItem {
                    name: "Rug".into(),
                    quantity: 1,
                    price: 80.0,
                },
            ],
            Utc::now(),
        );
        assert!((cart.total - 130.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cart_item_quantity_defaults_to_one() {
        let item: CartItem = serde_json::from_str(r#"{"name":"Mug","price":9.5}"#).unwrap();
        assert_eq!(item.quantity, 1);
    }
}
