//! Sample data for trying the daemon out locally.

use anyhow::Result;
use chrono::{Duration, Utc};
use pulsecrm_kernel::CrmKernel;
use pulsecrm_types::commerce::{Cart, CartItem, Invoice};
use pulsecrm_types::conversation::{Channel, Conversation, ConversationMessage};
use pulsecrm_types::customer::Customer;
use pulsecrm_types::lead::{Lead, LeadCategory, LeadStatus};
use serde_json::{json, Value};

/// Insert a handful of leads, a customer with a conversation, an abandoned
/// cart and an invoice coming due. Returns the ids created.
pub fn seed(kernel: &CrmKernel) -> Result<Value> {
    let store = &kernel.store;
    let now = Utc::now();

    let samples = [
        ("María González", "50761110001", 88, LeadCategory::Hot, LeadStatus::Qualified),
        ("Carlos Pérez", "50761110002", 55, LeadCategory::Warm, LeadStatus::New),
        ("Lucía Herrera", "50761110003", 20, LeadCategory::Cold, LeadStatus::Nurturing),
    ];
    let mut lead_ids = Vec::new();
    for (name, phone, score, category, status) in samples {
        let mut lead = Lead::new(Channel::Whatsapp, now - Duration::days(3));
        lead.name = Some(name.to_string());
        lead.phone = Some(phone.to_string());
        lead.sender_id = Some(phone.to_string());
        lead.score = score;
        lead.category = category;
        lead.status = status;
        if status == LeadStatus::Nurturing {
            lead.nurturing_started_at = Some(now - Duration::days(3));
        }
        store.insert_lead(&lead)?;
        lead_ids.push(lead.id);
    }

    let mut customer = Customer::new(now);
    customer.lead_id = lead_ids.first().cloned();
    customer.name = Some("María González".to_string());
    customer.email = Some("maria@example.com".to_string());
    customer.phone = Some("+50761110001".to_string());
    store.insert_customer(&customer)?;

    let mut conversation = Conversation::new(Channel::Whatsapp, now - Duration::hours(2));
    conversation.lead_id = customer.lead_id.clone();
    conversation.customer_id = Some(customer.id.clone());
    conversation.message_count = 1;
    store.insert_conversation(&conversation)?;
    store.insert_message(&ConversationMessage::inbound(
        &conversation.id,
        "Hola, ¿el sofá modular viene en gris?",
        now - Duration::hours(2),
    ))?;

    let cart = Cart::new(
        &customer.id,
        vec![CartItem {
            name: "Sofá modular".to_string(),
            quantity: 1,
            price: 899.0,
        }],
        now - Duration::hours(2),
    );
    store.insert_cart(&cart)?;

    let invoice = Invoice::new(&customer.id, "INV-0001", 450.0, now + Duration::days(3));
    store.insert_invoice(&invoice)?;

    Ok(json!({
        "leads": lead_ids,
        "customer": customer.id,
        "conversation": conversation.id,
        "cart": cart.id,
        "invoice": invoice.id,
    }))
}
