//! Inbound message ingestion.
//!
//! Platform webhooks are stored as [`RawMessage`] rows and processed in a
//! background task. Processing runs the whole inbound pipeline for one
//! message: lead and conversation bookkeeping, classification, intent,
//! sentiment, escalation, routing and the bot reply.

use crate::chatbot::{ChatRequest, ESCALATE_ACTION};
use crate::classifier::{ClassifyRequest, SenderMetadata};
use crate::error::{KernelError, KernelResult};
use crate::intent::IntentRequest;
use crate::router::RouteRequest;
use crate::sentiment::SentimentRequest;
use crate::CrmKernel;
use chrono::Utc;
use pulsecrm_channels::webhook::{verify_subscription, InboundEnvelope};
use pulsecrm_types::case::EscalationReason;
use pulsecrm_types::conversation::{
    Channel, Conversation, ConversationMessage, RawMessage, SenderType,
};
use pulsecrm_types::intent::IntentType;
use pulsecrm_types::lead::{Lead, LeadCategory};
use pulsecrm_types::new_id;
use pulsecrm_types::routing::{Destination, RoutingDecision};
use pulsecrm_types::sentiment::SentimentLabel;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// A message already reduced to sender and text by an upstream normaliser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub channel: Channel,
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub payload: Value,
}

/// Everything the pipeline decided about one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub raw_message_id: String,
    pub lead_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub lead_score: u8,
    pub lead_category: LeadCategory,
    pub intent: IntentType,
    pub sentiment: SentimentLabel,
    pub sentiment_score: f64,
    pub route: RoutingDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl CrmKernel {
    /// Accept a platform webhook. Always yields a status body; failures are
    /// logged and reported as `{"status": "error"}`.
    pub async fn ingest_webhook(self: &Arc<Self>, payload: Value) -> Value {
        match self.try_ingest_webhook(payload).await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Webhook ingestion failed");
                json!({"status": "error"})
            }
        }
    }

    async fn try_ingest_webhook(self: &Arc<Self>, payload: Value) -> KernelResult<Value> {
        let envelope = InboundEnvelope::from_value(&payload);
        let channel = envelope.channel();
        if channel == Channel::Unknown {
            debug!(object = ?envelope.object, "Ignoring webhook from unknown platform");
            return Ok(json!({"status": "received"}));
        }

        let extracted = envelope.extract_message();
        let raw = RawMessage::new(channel, extracted.sender, extracted.content, payload);
        self.store.insert_raw_message(&raw)?;

        let processing_id = new_id();
        let kernel = Arc::clone(self);
        let raw_id = raw.id.clone();
        let span = tracing::info_span!("process_raw", raw_id = %raw_id, processing_id = %processing_id);
        tokio::spawn(
            async move {
                if let Err(e) = kernel.process_raw_message(&raw_id).await {
                    error!(error = %e, "Background processing failed");
                }
            }
            .instrument(span),
        );

        self.n8n.notify_message_received(&raw.id).await;
        info!(channel = %channel, raw_id = %raw.id, "Webhook received");
        Ok(json!({
            "status": "received",
            "message_id": raw.id,
            "processing_id": processing_id,
        }))
    }

    /// Store an already-normalised message and run the pipeline on it now.
    pub async fn ingest_normalized(&self, msg: NormalizedMessage) -> KernelResult<ProcessingOutcome> {
        if msg.sender.trim().is_empty() {
            return Err(KernelError::Invalid("sender is empty".to_string()));
        }
        if msg.content.trim().is_empty() {
            return Err(KernelError::Invalid("content is empty".to_string()));
        }
        let raw = RawMessage::new(msg.channel, msg.sender.trim(), msg.content, msg.payload);
        self.store.insert_raw_message(&raw)?;
        self.n8n.notify_message_received(&raw.id).await;
        self.process_raw_message(&raw.id)
            .await?
            .ok_or_else(|| KernelError::Invalid("message was not processed".to_string()))
    }

    /// Meta subscription handshake. Returns the challenge to echo.
    pub fn verify_webhook(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> Option<String> {
        let expected = self.config.webhook_verify_token();
        let answer = verify_subscription(mode, token, challenge, expected.as_deref());
        if answer.is_none() {
            warn!(mode = ?mode, "Webhook verification rejected");
        }
        answer
    }

    /// Run the inbound pipeline for a stored raw message.
    ///
    /// The row is marked processed whatever happens; a pipeline failure is
    /// recorded in `processing_error` and returned. Messages without content
    /// yield `Ok(None)`.
    pub async fn process_raw_message(&self, id: &str) -> KernelResult<Option<ProcessingOutcome>> {
        let Some(raw) = self.store.get_raw_message(id)? else {
            warn!(raw_id = id, "Raw message not found");
            return Ok(None);
        };
        if raw.content.trim().is_empty() {
            debug!(raw_id = id, channel = %raw.channel, "Raw message has no text content");
            self.store.mark_raw_processed(id, None)?;
            return Ok(None);
        }

        match self.run_pipeline(&raw).await {
            Ok(outcome) => {
                self.store.mark_raw_processed(id, None)?;
                Ok(Some(outcome))
            }
            Err(e) => {
                warn!(raw_id = id, error = %e, "Pipeline failed");
                self.store.mark_raw_processed(id, Some(&e.to_string()))?;
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, raw: &RawMessage) -> KernelResult<ProcessingOutcome> {
        let now = Utc::now();
        let lead = self.lead_for_sender(raw)?;
        let mut conversation = match self.store.find_open_conversation(&lead.id, raw.channel)? {
            Some(c) => c,
            None => {
                let mut c = Conversation::new(raw.channel, now);
                c.lead_id = Some(lead.id.clone());
                c.customer_id = self.store.get_customer_by_lead(&lead.id)?.map(|c| c.id);
                self.store.insert_conversation(&c)?;
                c
            }
        };

        let mut message = ConversationMessage::inbound(&conversation.id, &raw.content, now);
        self.store.insert_message(&message)?;

        let score = self
            .classify_lead(&ClassifyRequest {
                lead_id: Some(lead.id.clone()),
                message: raw.content.clone(),
                channel: Some(raw.channel),
                sender_metadata: SenderMetadata {
                    name: lead.name.clone(),
                    email: lead.email.clone(),
                    phone: lead.phone.clone(),
                    company: lead.company.clone(),
                    source: Some(raw.channel.to_string()),
                    previous_interactions: conversation.message_count,
                },
            })
            .await;
        let intent = self
            .detect_intent(&IntentRequest {
                message: raw.content.clone(),
                lead_id: Some(lead.id.clone()),
                message_id: Some(message.id.clone()),
                context: None,
            })
            .await;
        let sentiment = self
            .analyze_sentiment(&SentimentRequest {
                message: raw.content.clone(),
                lead_id: Some(lead.id.clone()),
                customer_id: conversation.customer_id.clone(),
                message_id: Some(message.id.clone()),
            })
            .await;

        message.intent = Some(intent.primary_intent);
        message.sentiment = Some(sentiment.sentiment);
        message.sentiment_score = Some(sentiment.score);
        self.store.update_message_analysis(&message)?;

        conversation.message_count += 1;
        conversation.record_sentiment(sentiment.score);
        conversation.last_message_at = now;
        self.store.update_conversation(&conversation)?;

        // Classification may have rewritten the lead row.
        let mut lead = self.lead(&lead.id)?;
        lead.follow_up_count = 0;
        lead.last_activity_at = now;
        lead.updated_at = now;
        self.store.update_lead(&lead)?;

        let mut escalated_case_id = None;
        if !conversation.escalated {
            if let Some(reason) = self.should_escalate(&conversation, &raw.content)? {
                escalated_case_id = Some(self.escalate(&conversation.id, reason)?.id);
            }
        }

        let route = self.route(&RouteRequest {
            intent: intent.primary_intent,
            lead_score: score.score,
            sentiment_score: sentiment.score,
            churn_risk: sentiment.churn_risk,
            sentiment: Some(sentiment.sentiment),
            lead_id: Some(lead.id.clone()),
        });

        let mut reply = None;
        if route.destination == Destination::Chatbot && escalated_case_id.is_none() && !conversation.escalated {
            let answer = self
                .chatbot_reply(&ChatRequest {
                    message: raw.content.clone(),
                    conversation_id: Some(conversation.id.clone()),
                    customer_name: lead.name.clone(),
                })
                .await;
            if answer.action.as_deref() == Some(ESCALATE_ACTION) {
                escalated_case_id =
                    Some(self.escalate(&conversation.id, EscalationReason::CustomerRequest)?.id);
            }
            self.deliver_bot_reply(raw, &conversation.id, &answer.reply).await?;
            reply = Some(answer.reply);
        }

        info!(
            raw_id = %raw.id,
            lead_id = %lead.id,
            conversation_id = %conversation.id,
            intent = %intent.primary_intent,
            destination = %route.destination,
            escalated = escalated_case_id.is_some(),
            "Inbound message processed"
        );
        Ok(ProcessingOutcome {
            raw_message_id: raw.id.clone(),
            lead_id: lead.id,
            conversation_id: conversation.id,
            message_id: message.id,
            lead_score: score.score,
            lead_category: score.category,
            intent: intent.primary_intent,
            sentiment: sentiment.sentiment,
            sentiment_score: sentiment.score,
            route,
            escalated_case_id,
            reply,
        })
    }

    fn lead_for_sender(&self, raw: &RawMessage) -> KernelResult<Lead> {
        if let Some(lead) = self.store.find_lead_by_sender(&raw.sender_id)? {
            return Ok(lead);
        }
        let mut lead = Lead::new(raw.channel, Utc::now());
        lead.sender_id = Some(raw.sender_id.clone());
        match raw.channel {
            Channel::Whatsapp => lead.phone = Some(raw.sender_id.clone()),
            Channel::Email => lead.email = Some(raw.sender_id.clone()),
            _ => {}
        }
        self.store.insert_lead(&lead)?;
        info!(lead_id = %lead.id, channel = %raw.channel, "New lead from inbound message");
        Ok(lead)
    }

    /// Send the bot's answer to the sender and record it. Delivery failures
    /// are logged; the message is stored either way.
    async fn deliver_bot_reply(
        &self,
        raw: &RawMessage,
        conversation_id: &str,
        text: &str,
    ) -> KernelResult<()> {
        if let Err(e) = self.send_text(raw.channel, &raw.sender_id, text).await {
            warn!(conversation_id, error = %e, "Bot reply delivery failed");
        }
        let now = Utc::now();
        self.store
            .insert_message(&ConversationMessage::outbound(conversation_id, text, SenderType::Bot, now))?;
        let mut conversation = self.conversation(conversation_id)?;
        conversation.last_message_at = now;
        self.store.update_conversation(&conversation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, test_kernel, test_kernel_with, ScriptedDriver};
    use pulsecrm_types::case::CaseStatus;
    use pulsecrm_types::conversation::ConversationStatus;

    const CLASSIFY: &str =
        r#"{"score": 72, "category": "warm", "reasoning": "asks about stock", "recommended_action": "reply"}"#;
    const INTENT: &str = r#"{"primary_intent": "product_info", "confidence": 0.9, "entities": {"product": "sofá"}}"#;
    const SENTIMENT: &str = r#"{"sentiment": "positive", "score": 0.6, "confidence": 0.8, "emotions": ["interest"], "urgency": "low", "churn_risk": 5}"#;

    fn normalized(sender: &str, content: &str) -> NormalizedMessage {
        NormalizedMessage {
            channel: Channel::Whatsapp,
            sender: sender.into(),
            content: content.into(),
            payload: Value::Null,
        }
    }

    #[tokio::test]
    async fn full_pipeline_replies_through_bot() {
        let driver = ScriptedDriver::new(&[CLASSIFY, INTENT, SENTIMENT, "Sí, tenemos el sofá en gris."]);
        let (kernel, sink) = test_kernel(Some(driver.clone()));

        let out = kernel
            .ingest_normalized(normalized("50760001111", "¿Tienen el sofá en gris?"))
            .await
            .unwrap();
        assert_eq!(driver.calls(), 4);
        assert_eq!(out.lead_score, 72);
        assert_eq!(out.intent, IntentType::ProductInfo);
        assert_eq!(out.route.destination, Destination::Chatbot);
        assert_eq!(out.reply.as_deref(), Some("Sí, tenemos el sofá en gris."));
        assert!(out.escalated_case_id.is_none());

        let sent = sink.sent_to("50760001111");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "Sí, tenemos el sofá en gris.");

        let lead = kernel.store.get_lead(&out.lead_id).unwrap().unwrap();
        assert_eq!(lead.score, 72);
        assert_eq!(lead.phone.as_deref(), Some("50760001111"));

        let conv = kernel.store.get_conversation(&out.conversation_id).unwrap().unwrap();
        assert_eq!(conv.message_count, 1);
        assert!((conv.avg_sentiment_score.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(kernel.store.recent_messages(&conv.id, 10).unwrap().len(), 2);

        let raw = kernel.store.get_raw_message(&out.raw_message_id).unwrap().unwrap();
        assert!(raw.processed);
        assert!(raw.processing_error.is_none());
    }

    #[tokio::test]
    async fn same_sender_reuses_lead_and_conversation() {
        let (kernel, _) = test_kernel(None);
        let first = kernel.ingest_normalized(normalized("s-1", "Hola")).await.unwrap();
        let mut lead = kernel.store.get_lead(&first.lead_id).unwrap().unwrap();
        lead.follow_up_count = 2;
        kernel.store.update_lead(&lead).unwrap();

        let second = kernel.ingest_normalized(normalized("s-1", "¿Siguen ahí?")).await.unwrap();
        assert_eq!(first.lead_id, second.lead_id);
        assert_eq!(first.conversation_id, second.conversation_id);
        let lead = kernel.store.get_lead(&first.lead_id).unwrap().unwrap();
        assert_eq!(lead.follow_up_count, 0);
        let conv = kernel.store.get_conversation(&first.conversation_id).unwrap().unwrap();
        assert_eq!(conv.message_count, 2);
    }

    #[tokio::test]
    async fn human_request_escalates_without_bot_reply() {
        let (kernel, sink) = test_kernel(None);
        let out = kernel
            .ingest_normalized(normalized("s-2", "Quiero hablar con un supervisor"))
            .await
            .unwrap();
        let case_id = out.escalated_case_id.expect("case opened");
        let case = kernel.store.get_case(&case_id).unwrap().unwrap();
        assert_eq!(case.status, CaseStatus::Open);
        assert_eq!(case.escalation_reason, Some(EscalationReason::CustomerRequest));
        assert!(out.reply.is_none());
        assert!(sink.sent().is_empty());

        let conv = kernel.store.get_conversation(&out.conversation_id).unwrap().unwrap();
        assert!(conv.escalated);
        assert_eq!(conv.status, ConversationStatus::WaitingAgent);
    }

    #[tokio::test]
    async fn without_ai_the_bot_apologises() {
        let (kernel, sink) = test_kernel(None);
        let out = kernel.ingest_normalized(normalized("s-3", "Hola, info")).await.unwrap();
        assert_eq!(out.lead_score, 50);
        assert_eq!(out.intent, IntentType::GeneralInquiry);
        assert_eq!(out.route.destination, Destination::Chatbot);
        assert_eq!(sink.sent_to("s-3").len(), 1);
    }

    #[tokio::test]
    async fn empty_or_missing_raw_messages() {
        let (kernel, _) = test_kernel(None);
        assert!(kernel.process_raw_message("nope").await.unwrap().is_none());

        let raw = RawMessage::new(Channel::Instagram, "unknown", "", json!({"object": "instagram"}));
        kernel.store.insert_raw_message(&raw).unwrap();
        assert!(kernel.process_raw_message(&raw.id).await.unwrap().is_none());
        assert!(kernel.store.get_raw_message(&raw.id).unwrap().unwrap().processed);

        let err = kernel.ingest_normalized(normalized("s-4", "  ")).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn webhook_status_bodies() {
        let (kernel, _) = test_kernel(None);
        let kernel = Arc::new(kernel);

        let body = kernel.ingest_webhook(json!({"object": "something_else"})).await;
        assert_eq!(body, json!({"status": "received"}));

        let body = kernel
            .ingest_webhook(json!({"object": "whatsapp_business_account", "entry": []}))
            .await;
        assert_eq!(body["status"], "received");
        let id = body["message_id"].as_str().unwrap().to_string();
        assert!(body["processing_id"].is_string());

        let stored = kernel.store.get_raw_message(&id).unwrap().unwrap();
        assert_eq!(stored.channel, Channel::Whatsapp);
        assert_eq!(stored.sender_id, "unknown");
    }

    #[test]
    fn subscription_handshake() {
        let mut config = test_config();
        config.meta.verify_token_env = "PULSECRM_TEST_VERIFY_TOKEN_INGEST".into();
        std::env::set_var("PULSECRM_TEST_VERIFY_TOKEN_INGEST", "secret-token");
        let (kernel, _) = test_kernel_with(config, None);

        assert_eq!(
            kernel.verify_webhook(Some("subscribe"), Some("secret-token"), Some("42")),
            Some("42".to_string())
        );
        assert_eq!(kernel.verify_webhook(Some("subscribe"), Some("wrong"), Some("42")), None);
        assert_eq!(kernel.verify_webhook(Some("unsubscribe"), Some("secret-token"), Some("42")), None);
    }
}
