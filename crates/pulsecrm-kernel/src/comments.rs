//! Automatic replies to social media comments.

use crate::error::KernelResult;
use crate::text::contains_any;
use crate::CrmKernel;
use pulsecrm_types::alert::{AlertSeverity, AlertType};
use pulsecrm_types::content::Platform;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    Spam,
    Question,
    Complaint,
    Praise,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentAction {
    Hidden,
    Replied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRequest {
    pub comment_id: String,
    pub text: String,
    pub platform: Platform,
    #[serde(default)]
    pub post_caption: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentOutcome {
    pub comment_id: String,
    pub kind: CommentKind,
    pub action: CommentAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    /// Set when the Graph API call failed; the decision still stands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const SPAM: &[&str] = &["spam", "scam", "fake", "gana dinero", "click aqui"];
const QUESTION: &[&str] = &["?", "cuanto", "como", "donde", "precio"];
const COMPLAINT: &[&str] = &["malo", "defectuoso", "queja", "reclamo", "estafa", "pesimo"];
const PRAISE: &[&str] = &["excelente", "genial", "gracias", "amor", "me encanta"];

const QUESTION_FALLBACK: &str = "Gracias por tu pregunta. Te responderemos pronto!";
const COMPLAINT_FALLBACK: &str = "Lamentamos tu experiencia. Te contactaremos por DM para ayudarte.";
const PRAISE_REPLY: &str = "¡Gracias por tu comentario! Nos alegra saber que estás contento 😊";
const NEUTRAL_FALLBACK: &str = "Gracias por tu comentario!";

/// Keyword classification, checked in priority order.
pub fn classify_comment(text: &str) -> CommentKind {
    if contains_any(text, SPAM) {
        CommentKind::Spam
    } else if contains_any(text, QUESTION) {
        CommentKind::Question
    } else if contains_any(text, COMPLAINT) {
        CommentKind::Complaint
    } else if contains_any(text, PRAISE) {
        CommentKind::Praise
    } else {
        CommentKind::Neutral
    }
}

impl CrmKernel {
    /// Classify a comment, then hide it or reply under it.
    pub async fn respond_to_comment(&self, req: &CommentRequest) -> KernelResult<CommentOutcome> {
        let kind = classify_comment(&req.text);

        if kind == CommentKind::Spam {
            let error = self
                .publisher
                .hide_comment(&req.comment_id)
                .await
                .err()
                .map(|e| e.to_string());
            if let Some(e) = &error {
                warn!(comment_id = %req.comment_id, error = %e, "Could not hide spam comment");
            }
            info!(comment_id = %req.comment_id, "Spam comment hidden");
            return Ok(CommentOutcome {
                comment_id: req.comment_id.clone(),
                kind,
                action: CommentAction::Hidden,
                reply: None,
                error,
            });
        }

        if kind == CommentKind::Complaint {
            self.raise_alert(
                AlertType::AngryCustomer,
                AlertSeverity::Medium,
                format!("Complaint on {} comment: {}", req.platform, req.text),
                Some(format!("comment:{}", req.comment_id)),
                json!({
                    "comment_id": req.comment_id,
                    "platform": req.platform,
                    "author": req.author,
                }),
            )?;
        }

        let reply = match kind {
            CommentKind::Praise => PRAISE_REPLY.to_string(),
            _ => self.comment_reply_text(kind, req).await,
        };

        let error = self
            .publisher
            .reply_to_comment(req.platform, &req.comment_id, &reply)
            .await
            .err()
            .map(|e| e.to_string());
        if let Some(e) = &error {
            warn!(comment_id = %req.comment_id, error = %e, "Comment reply not posted");
        }
        info!(comment_id = %req.comment_id, kind = ?kind, "Comment answered");
        Ok(CommentOutcome {
            comment_id: req.comment_id.clone(),
            kind,
            action: CommentAction::Replied,
            reply: Some(reply),
            error,
        })
    }

    async fn comment_reply_text(&self, kind: CommentKind, req: &CommentRequest) -> String {
        let fallback = match kind {
            CommentKind::Question => QUESTION_FALLBACK,
            CommentKind::Complaint => COMPLAINT_FALLBACK,
            _ => NEUTRAL_FALLBACK,
        };
        let Some(ai) = &self.ai else {
            return fallback.to_string();
        };
        let goal = match kind {
            CommentKind::Question => {
                "Answer briefly (1-2 sentences), friendly and professional. If private \
                 details are needed ask them to send a DM. Thank them for their interest."
            }
            CommentKind::Complaint => {
                "Show empathy, apologise if appropriate and offer to resolve it by DM. \
                 Professional, never defensive. 2-3 sentences."
            }
            _ => "Write a short, warm reply that fits the post.",
        };
        let prompt = format!(
            "Post: {}\nComment: \"{}\"\nGoal: {goal}",
            req.post_caption.as_deref().unwrap_or("N/A"),
            req.text
        );
        match ai
            .complete_text(
                "You reply to social media comments for a brand, in the commenter's language. \
                 Reply with the comment text only.",
                &prompt,
                0.7,
                200,
            )
            .await
        {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => fallback.to_string(),
            Err(e) => {
                warn!(comment_id = %req.comment_id, error = %e, "Comment reply generation failed");
                fallback.to_string()
            }
        }
    }
}
