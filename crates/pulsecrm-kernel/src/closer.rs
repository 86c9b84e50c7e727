//! AI sales closer.

use crate::error::KernelResult;
use crate::text::contains_any;
use crate::CrmKernel;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const OBJECTIONS: &[(&str, &[&str])] = &[
    ("price", &["muy caro", "precio", "costoso", "barato"]),
    ("timing", &["no es el momento", "después", "más tarde", "no ahora"]),
    ("authority", &["tengo que consultarlo", "mi jefe", "necesito aprobación"]),
    ("need", &["no estoy seguro", "no lo necesito", "no sé si"]),
    ("trust", &["no los conozco", "confianza", "garantía"]),
];

const BUYING_SIGNALS: &[(&str, &[&str])] = &[
    ("purchase_process", &["cómo compro", "proceso de compra", "cómo pago"]),
    ("pricing_details", &["cotización", "factura", "cuánto cuesta exactamente"]),
    ("delivery", &["cuándo me llega", "tiempo de entrega", "envío"]),
    ("comparison", &["diferencia entre", "cuál es mejor", "recomiendas"]),
    ("guarantees", &["garantía", "devolución", "qué pasa si"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloserStrategy {
    HandleObjection,
    FacilitatePurchase,
    Nudge,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesContext {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloserRequest {
    pub message: String,
    #[serde(flatten)]
    pub context: SalesContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloserReply {
    pub response: String,
    pub strategy: CloserStrategy,
    pub objections: Vec<String>,
    pub buying_signals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn categories(message: &str, table: &[(&str, &[&str])]) -> Vec<String> {
    table
        .iter()
        .filter(|(_, patterns)| contains_any(message, patterns))
        .map(|(name, _)| name.to_string())
        .collect()
}

pub fn detect_objections(message: &str) -> Vec<String> {
    categories(message, OBJECTIONS)
}

pub fn detect_buying_signals(message: &str) -> Vec<String> {
    categories(message, BUYING_SIGNALS)
}

fn fallback_response(strategy: CloserStrategy, ctx: &SalesContext) -> String {
    match strategy {
        CloserStrategy::HandleObjection => {
            "Entiendo tu preocupación. ¿Podemos hablar más sobre esto?".to_string()
        }
        CloserStrategy::FacilitatePurchase => format!(
            "Excelente! ¿Quieres proceder con {}?",
            ctx.product_name.as_deref().unwrap_or("el producto")
        ),
        CloserStrategy::Nudge => "¿Hay algo más en lo que pueda ayudarte?".to_string(),
    }
}

impl CrmKernel {
    /// Answer a sales conversation: handle objections first, help a ready
    /// buyer complete the purchase, otherwise nudge gently.
    pub async fn respond_to_sales_opportunity(&self, req: &CloserRequest) -> CloserReply {
        let objections = detect_objections(&req.message);
        let buying_signals = detect_buying_signals(&req.message);
        let strategy = if !objections.is_empty() {
            CloserStrategy::HandleObjection
        } else if !buying_signals.is_empty() {
            CloserStrategy::FacilitatePurchase
        } else {
            CloserStrategy::Nudge
        };

        let (response, error) = if self.ai.is_none() {
            (fallback_response(strategy, &req.context), None)
        } else {
            match self.closer_text(req, strategy, &objections).await {
                Ok(text) if !text.is_empty() => (text, None),
                Ok(_) => (fallback_response(strategy, &req.context), None),
                Err(e) => {
                    warn!(error = %e, "Closer generation failed");
                    (fallback_response(strategy, &req.context), Some(e.to_string()))
                }
            }
        };
        info!(strategy = ?strategy, objections = ?objections, signals = ?buying_signals, "Sales reply prepared");
        CloserReply {
            response,
            strategy,
            objections,
            buying_signals,
            error,
        }
    }

    async fn closer_text(
        &self,
        req: &CloserRequest,
        strategy: CloserStrategy,
        objections: &[String],
    ) -> KernelResult<String> {
        let ai = self.require_ai()?;
        let ctx = &req.context;
        let product = ctx.product_name.as_deref().unwrap_or("N/A");
        let price = ctx
            .product_price
            .map(|p| format!("${p:.2}"))
            .unwrap_or_else(|| "N/A".to_string());
        let customer = ctx.customer_name.as_deref().unwrap_or("N/A");
        let instructions = match strategy {
            CloserStrategy::HandleObjection => format!(
                "The customer raised a '{}' objection. Empathise, answer it with concrete \
                 facts and end with a question that moves things forward. Never pushy. \
                 3-4 sentences.",
                objections.first().map(String::as_str).unwrap_or("general")
            ),
            CloserStrategy::FacilitatePurchase => "The customer is ready to buy. Make buying \
                 effortless: what they get, the final price, simple payment options, delivery \
                 time and guarantees. Use bullet points."
                .to_string(),
            CloserStrategy::Nudge => {
                "Gently nudge the customer towards a decision without pressure.".to_string()
            }
        };
        let prompt = format!(
            "Customer message: \"{}\"\nProduct: {product} ({price})\nCustomer: {customer}\n\n{instructions}",
            req.message
        );
        Ok(ai
            .complete_text(
                "You are a consultative sales assistant. Reply in the customer's language.",
                &prompt,
                0.7,
                400,
            )
            .await?)
    }
}
