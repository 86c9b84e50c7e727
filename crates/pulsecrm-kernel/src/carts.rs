//! Abandoned cart recovery.

use crate::error::{KernelError, KernelResult};
use crate::kernel::customer_route;
use crate::scheduler::JobReport;
use crate::CrmKernel;
use chrono::{DateTime, Duration, Utc};
use pulsecrm_types::commerce::{Cart, CartStatus};
use pulsecrm_types::conversation::Channel;
use tracing::{info, warn};

/// Final-attempt carts idle this long are given up on.
const ABANDON_AFTER_HOURS: i64 = 96;

#[derive(Debug, Clone, Copy)]
struct RecoveryStage {
    name: &'static str,
    idle_hours: i64,
    discount_pct: Option<u8>,
    brief: &'static str,
}

const STAGES: [RecoveryStage; 4] = [
    RecoveryStage {
        name: "gentle",
        idle_hours: 1,
        discount_pct: None,
        brief: "Friendly reminder of the items left in the cart. Helpful, no pressure.",
    },
    RecoveryStage {
        name: "incentive",
        idle_hours: 24,
        discount_pct: Some(10),
        brief: "Friendly reminder with a discount code valid for 24 hours.",
    },
    RecoveryStage {
        name: "urgency",
        idle_hours: 48,
        discount_pct: None,
        brief: "Respectful urgency: stock of these items is limited.",
    },
    RecoveryStage {
        name: "final",
        idle_hours: 72,
        discount_pct: Some(15),
        brief: "Last attempt: acknowledge the purchase was not completed and offer the best \
                discount, expiring in 24 hours.",
    },
];

/// A fresh single-use code, e.g. `RECOVER10-8F3A01C2`.
pub fn discount_code(pct: u8) -> String {
    format!("RECOVER{pct}-{:08X}", rand::random::<u32>())
}

fn item_list(cart: &Cart) -> String {
    if cart.items.is_empty() {
        return "productos".to_string();
    }
    cart.items
        .iter()
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn template(stage: usize, cart: &Cart, code: Option<&str>) -> String {
    let items = item_list(cart);
    let code = code.unwrap_or_default();
    match stage {
        0 => format!(
            "¡Hola! Notamos que dejaste productos en tu carrito: {items}. Los guardamos para ti cuando quieras completar tu compra."
        ),
        1 => format!(
            "Tu carrito ({items}) te espera. Usa el código {code} para obtener un 10% de descuento. Válido por 24 horas."
        ),
        2 => format!(
            "¡Quedan pocas unidades! Los productos de tu carrito (${:.2}) podrían agotarse pronto.",
            cart.total
        ),
        _ => format!(
            "Última oportunidad: completa tu compra con 15% de descuento usando el código {code}. Expira en 24 horas."
        ),
    }
}

impl CrmKernel {
    pub async fn recover_carts(&self) -> KernelResult<JobReport> {
        self.recover_carts_at(Utc::now()).await
    }

    /// Advance every idle pending cart through the recovery sequence.
    pub async fn recover_carts_at(&self, now: DateTime<Utc>) -> KernelResult<JobReport> {
        let mut report = JobReport::new("cart_recovery");
        let cutoff = now - Duration::hours(STAGES[0].idle_hours);
        for cart in self.store.pending_carts_idle_since(cutoff)? {
            report.examined += 1;
            match self.advance_cart(cart, now).await {
                Ok(true) => report.actions += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "Cart recovery step failed");
                    report.errors += 1;
                }
            }
        }
        info!(
            examined = report.examined,
            actions = report.actions,
            "Cart recovery run finished"
        );
        Ok(report)
    }

    async fn advance_cart(&self, mut cart: Cart, now: DateTime<Utc>) -> KernelResult<bool> {
        let idle = now - cart.last_activity_at;
        if cart.final_attempt {
            if idle >= Duration::hours(ABANDON_AFTER_HOURS) {
                cart.status = CartStatus::Abandoned;
                self.store.update_cart(&cart)?;
                info!(cart_id = %cart.id, "Cart marked abandoned");
                return Ok(true);
            }
            return Ok(false);
        }

        let attempt = cart.recovery_attempt_count as usize;
        let Some(stage) = STAGES.get(attempt) else {
            return Ok(false);
        };
        if idle < Duration::hours(stage.idle_hours) {
            return Ok(false);
        }

        let customer = self.customer(&cart.customer_id)?;
        let Some((channel, recipient)) = customer_route(&customer) else {
            warn!(cart_id = %cart.id, customer_id = %customer.id, "Customer has no contact, skipping cart");
            return Ok(false);
        };

        let code = stage.discount_pct.map(discount_code);
        let text = self.cart_text(attempt, stage, &cart, code.as_deref()).await;
        self.send_text(channel, &recipient, &text).await?;

        cart.recovery_attempt_count += 1;
        if let Some(code) = code {
            cart.discount_codes_used.push(code);
        }
        if attempt + 1 == STAGES.len() {
            cart.final_attempt = true;
        }
        self.store.update_cart(&cart)?;
        info!(cart_id = %cart.id, stage = stage.name, channel = %channel, "Cart recovery message sent");
        Ok(true)
    }

    async fn cart_text(
        &self,
        attempt: usize,
        stage: &RecoveryStage,
        cart: &Cart,
        code: Option<&str>,
    ) -> String {
        let Some(ai) = &self.ai else {
            return template(attempt, cart, code);
        };
        let mut prompt = format!(
            "Items: {}\nCart total: ${:.2}\nGoal: {}",
            item_list(cart),
            cart.total,
            stage.brief
        );
        if let (Some(code), Some(pct)) = (code, stage.discount_pct) {
            prompt.push_str(&format!("\nInclude the {pct}% discount code {code} verbatim."));
        }
        match ai
            .complete_text(
                "You write short cart-recovery messages in Spanish for an online store. \
                 Reply with the message text only.",
                &prompt,
                0.7,
                300,
            )
            .await
        {
            // Generated text must carry the code verbatim.
            Ok(text) if !text.is_empty() && code.map_or(true, |c| text.contains(c)) => text,
            Ok(_) => template(attempt, cart, code),
            Err(e) => {
                warn!(cart_id = %cart.id, error = %e, "Cart message generation failed, using template");
                template(attempt, cart, code)
            }
        }
    }

    /// Record that a cart was bought after all.
    pub fn mark_cart_recovered(&self, cart_id: &str, channel: Option<Channel>) -> KernelResult<Cart> {
        let mut cart = self
            .store
            .get_cart(cart_id)?
            .ok_or_else(|| KernelError::not_found("cart", cart_id))?;
        if cart.status != CartStatus::Pending && cart.status != CartStatus::Abandoned {
            return Err(KernelError::Invalid(format!(
                "cart {cart_id} is already {}",
                cart.status
            )));
        }
        cart.status = CartStatus::Recovered;
        cart.recovered_at = Some(Utc::now());
        cart.recovery_channel = channel;
        self.store.update_cart(&cart)?;
        info!(cart_id, channel = ?channel, "Cart recovered");
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_kernel;
    use pulsecrm_types::commerce::CartItem;
    use pulsecrm_types::customer::Customer;

    fn seed(kernel: &CrmKernel, idle_hours: i64, attempts: u32) -> Cart {
        let now = Utc::now();
        let mut customer = Customer::new(now);
        customer.phone = Some("+50761234567".into());
        kernel.store.insert_customer(&customer).unwrap();
        let mut cart = Cart::new(
            &customer.id,
            vec![CartItem {
                name: "Lámpara".into(),
                quantity: 1,
                price: 40.0,
            }],
            now - Duration::hours(idle_hours),
        );
        cart.recovery_attempt_count = attempts;
        kernel.store.insert_cart(&cart).unwrap();
        cart
    }

    #[test]
    fn codes_have_expected_shape() {
        let code = discount_code(10);
        assert!(code.starts_with("RECOVER10-"));
        let hex = &code["RECOVER10-".len()..];
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn stage_waits_for_its_threshold() {
        let (kernel, sink) = test_kernel(None);
        // Second stage needs 24h idle.
        let early = seed(&kernel, 5, 1);
        let due = seed(&kernel, 25, 1);

        let report = kernel.recover_carts().await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.actions, 1);

        let early = kernel.store.get_cart(&early.id).unwrap().unwrap();
        assert_eq!(early.recovery_attempt_count, 1);
        let due = kernel.store.get_cart(&due.id).unwrap().unwrap();
        assert_eq!(due.recovery_attempt_count, 2);
        assert_eq!(due.discount_codes_used.len(), 1);
        assert!(due.discount_codes_used[0].starts_with("RECOVER10-"));
        assert!(sink.sent()[0].text.contains(&due.discount_codes_used[0]));
    }

    #[tokio::test]
    async fn final_stage_then_abandon() {
        let (kernel, _) = test_kernel(None);
        let cart = seed(&kernel, 80, 3);

        kernel.recover_carts().await.unwrap();
        let stored = kernel.store.get_cart(&cart.id).unwrap().unwrap();
        assert!(stored.final_attempt);
        assert_eq!(stored.recovery_attempt_count, 4);
        assert!(stored.discount_codes_used[0].starts_with("RECOVER15-"));
        assert_eq!(stored.status, CartStatus::Pending);

        let later = Utc::now() + Duration::hours(20);
        kernel.recover_carts_at(later).await.unwrap();
        let stored = kernel.store.get_cart(&cart.id).unwrap().unwrap();
        assert_eq!(stored.status, CartStatus::Abandoned);
    }

    #[tokio::test]
    async fn one_stage_per_run_even_when_far_behind() {
        let (kernel, sink) = test_kernel(None);
        let cart = seed(&kernel, 200, 0);
        kernel.recover_carts().await.unwrap();
        let stored = kernel.store.get_cart(&cart.id).unwrap().unwrap();
        assert_eq!(stored.recovery_attempt_count, 1);
        assert!(stored.discount_codes_used.is_empty());
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn recovered_carts_leave_the_sequence() {
        let (kernel, sink) = test_kernel(None);
        let cart = seed(&kernel, 30, 1);
        let recovered = kernel
            .mark_cart_recovered(&cart.id, Some(Channel::Whatsapp))
            .unwrap();
        assert_eq!(recovered.status, CartStatus::Recovered);
        assert_eq!(recovered.recovery_channel, Some(Channel::Whatsapp));

        let report = kernel.recover_carts().await.unwrap();
        assert_eq!(report.examined, 0);
        assert!(sink.sent().is_empty());

        let err = kernel.mark_cart_recovered(&cart.id, None).unwrap_err();
        assert!(err.is_client_error());
    }
}
