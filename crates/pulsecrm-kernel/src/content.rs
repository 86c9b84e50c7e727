//! Social content: generation, publishing and posting-time scheduling.

use crate::error::{KernelError, KernelResult};
use crate::CrmKernel;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use pulsecrm_channels::publisher::PostContent;
use pulsecrm_types::content::{ContentStatus, GeneratedContent, Platform};
use pulsecrm_types::new_id;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

const MAX_HASHTAGS: usize = 10;
const DEFAULT_POST_HOUR: u32 = 18;

fn default_content_type() -> String {
    "post".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub topic: String,
    pub platform: Platform,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub asset_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub content_id: String,
    /// Defaults to the platform the content was written for.
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub schedule_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: Platform,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub content_id: String,
    pub status: ContentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub results: Vec<PlatformResult>,
}

/// Parse a comma separated hashtag list into at most ten `#tags`.
pub fn parse_hashtags(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(|t| t.trim().trim_start_matches('#').trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("#{}", t.replace(' ', "")))
        .take(MAX_HASHTAGS)
        .collect()
}

/// Weekday-only platforms never get a Saturday or Sunday slot.
fn weekdays_only(platform: Option<Platform>) -> bool {
    platform != Some(Platform::Tiktok)
}

/// Next good posting slot for `platform` after `now`.
pub fn best_post_time(platform: Option<Platform>, now: DateTime<Utc>) -> DateTime<Utc> {
    let hour = platform.map(|p| p.best_hour()).unwrap_or(DEFAULT_POST_HOUR);
    let mut date = now.date_naive();
    if now.hour() >= hour {
        date = date + Duration::days(1);
    }
    if weekdays_only(platform) {
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date = date + Duration::days(1);
        }
    }
    date.and_hms_opt(hour, 0, 0)
        .map(|slot| Utc.from_utc_datetime(&slot))
        .unwrap_or(now)
}

impl CrmKernel {
    /// Write copy and hashtags for a post and store it as a draft.
    pub async fn generate_content(
        &self,
        req: &GenerateContentRequest,
    ) -> KernelResult<GeneratedContent> {
        if req.topic.trim().is_empty() {
            return Err(KernelError::Invalid("topic is required".into()));
        }
        let ai = self.require_ai()?;
        let (length, tone) = req.platform.guidelines();
        let purpose = req.purpose.as_deref().unwrap_or("promote the product");

        let copy = ai
            .complete_text(
                "You are a social media copywriter. Write in Spanish. Reply with the post copy only.",
                &format!(
                    "Platform: {}\nTopic: {}\nPurpose: {purpose}\nLength: about {length} characters\n\
                     Tone: {tone}\nStructure: hook, key benefit, short description, call to action. \
                     A few emojis are fine.",
                    req.platform, req.topic
                ),
                0.8,
                400,
            )
            .await?;

        let hashtags = match ai
            .complete_text(
                "Reply with 5 to 10 hashtags separated by commas and nothing else.",
                &format!("Platform: {}\nTopic: {}", req.platform, req.topic),
                0.5,
                100,
            )
            .await
        {
            Ok(raw) => parse_hashtags(&raw),
            Err(e) => {
                warn!(error = %e, "Hashtag generation failed");
                Vec::new()
            }
        };

        let content = GeneratedContent {
            id: new_id(),
            content_type: req.content_type.clone(),
            platform: req.platform,
            topic: req.topic.clone(),
            asset_url: req.asset_url.clone(),
            copy,
            hashtags,
            status: ContentStatus::Draft,
            scheduled_for: None,
            published_at: None,
            external_id: None,
            metrics: json!({}),
            created_at: Utc::now(),
        };
        self.store.insert_content(&content)?;
        info!(content_id = %content.id, platform = %content.platform, "Content draft generated");
        Ok(content)
    }

    fn content(&self, id: &str) -> KernelResult<GeneratedContent> {
        self.store
            .get_content(id)?
            .ok_or_else(|| KernelError::not_found("content", id))
    }

    /// Publish now, or park the content until `schedule_time`.
    pub async fn publish_content(&self, req: &PublishRequest) -> KernelResult<PublishOutcome> {
        let mut content = self.content(&req.content_id)?;
        if content.status == ContentStatus::Published {
            return Err(KernelError::Invalid(format!(
                "content {} is already published",
                content.id
            )));
        }

        let now = Utc::now();
        if let Some(at) = req.schedule_time.filter(|at| *at > now) {
            content.status = ContentStatus::Scheduled;
            content.scheduled_for = Some(at);
            self.store.update_content(&content)?;
            info!(content_id = %content.id, scheduled_for = %at, "Content scheduled");
            return Ok(PublishOutcome {
                content_id: content.id,
                status: ContentStatus::Scheduled,
                scheduled_for: Some(at),
                results: Vec::new(),
            });
        }

        let platforms = if req.platforms.is_empty() {
            vec![content.platform]
        } else {
            req.platforms.clone()
        };
        let results = self.publish_now(&mut content, &platforms, now).await?;
        Ok(PublishOutcome {
            content_id: content.id,
            status: content.status,
            scheduled_for: None,
            results,
        })
    }

    pub(crate) async fn publish_now(
        &self,
        content: &mut GeneratedContent,
        platforms: &[Platform],
        now: DateTime<Utc>,
    ) -> KernelResult<Vec<PlatformResult>> {
        let post = PostContent {
            copy: content.copy.clone(),
            hashtags: content.hashtags.clone(),
            asset_url: content.asset_url.clone(),
        };
        let mut results = Vec::with_capacity(platforms.len());
        for &platform in platforms {
            match self.publisher.publish(platform, &post).await {
                Ok(receipt) => {
                    content.metrics[platform.as_str()] = receipt.response.clone();
                    if content.external_id.is_none() {
                        content.external_id = Some(receipt.external_id.clone());
                    }
                    results.push(PlatformResult {
                        platform,
                        success: true,
                        external_id: Some(receipt.external_id),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(content_id = %content.id, platform = %platform, error = %e, "Publish failed");
                    results.push(PlatformResult {
                        platform,
                        success: false,
                        external_id: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if results.iter().any(|r| r.success) {
            content.status = ContentStatus::Published;
            content.published_at = Some(now);
        } else {
            content.status = ContentStatus::Failed;
        }
        self.store.update_content(content)?;
        info!(content_id = %content.id, status = %content.status, "Publish attempt finished");
        Ok(results)
    }

    /// Schedule a draft at `at`, or at the platform's next best slot.
    pub fn schedule_content(
        &self,
        content_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> KernelResult<GeneratedContent> {
        let mut content = self.content(content_id)?;
        if content.status == ContentStatus::Published {
            return Err(KernelError::Invalid(format!(
                "content {content_id} is already published"
            )));
        }
        let slot = at.unwrap_or_else(|| best_post_time(Some(content.platform), Utc::now()));
        content.status = ContentStatus::Scheduled;
        content.scheduled_for = Some(slot);
        self.store.update_content(&content)?;
        info!(content_id, scheduled_for = %slot, "Content scheduled");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_kernel, ScriptedDriver};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn hashtags_are_prefixed_and_capped() {
        let tags = parse_hashtags("moda, #verano ,estilo de vida,, a,b,c,d,e,f,g,h");
        assert_eq!(tags.len(), 10);
        assert_eq!(&tags[..3], ["#moda", "#verano", "#estilodevida"]);
        assert!(parse_hashtags("  ").is_empty());
    }

    #[test]
    fn best_time_rules() {
        // 2026-10-14 is a Wednesday.
        let wed_morning = at(2026, 10, 14, 9, 30);
        assert_eq!(best_post_time(Some(Platform::Instagram), wed_morning), at(2026, 10, 14, 18, 0));
        assert_eq!(best_post_time(Some(Platform::Facebook), wed_morning), at(2026, 10, 14, 15, 0));
        assert_eq!(best_post_time(None, wed_morning), at(2026, 10, 14, 18, 0));

        let wed_evening = at(2026, 10, 14, 18, 0);
        assert_eq!(best_post_time(Some(Platform::Instagram), wed_evening), at(2026, 10, 15, 18, 0));

        // Friday evening: weekday platforms move to Monday, tiktok does not.
        let fri_night = at(2026, 10, 16, 20, 0);
        assert_eq!(best_post_time(Some(Platform::Facebook), fri_night), at(2026, 10, 19, 15, 0));
        assert_eq!(best_post_time(Some(Platform::Tiktok), fri_night), at(2026, 10, 17, 19, 0));
    }

    #[tokio::test]
    async fn generates_draft_with_hashtags() {
        let driver = ScriptedDriver::new(&["¡Nuevo sofá! 🛋️ Descúbrelo hoy.", "sofa, hogar, #deco"]);
        let (kernel, _) = test_kernel(Some(driver));
        let draft = kernel
            .generate_content(&GenerateContentRequest {
                topic: "Sofá Nórdico".into(),
                platform: Platform::Instagram,
                purpose: None,
                content_type: default_content_type(),
                asset_url: Some("https://cdn.example.com/sofa.jpg".into()),
            })
            .await
            .unwrap();
        assert_eq!(draft.status, ContentStatus::Draft);
        assert_eq!(draft.hashtags, vec!["#sofa", "#hogar", "#deco"]);
        let stored = kernel.store.get_content(&draft.id).unwrap().unwrap();
        assert_eq!(stored.copy, "¡Nuevo sofá! 🛋️ Descúbrelo hoy.");
    }

    #[tokio::test]
    async fn generation_needs_a_model() {
        let (kernel, _) = test_kernel(None);
        let err = kernel
            .generate_content(&GenerateContentRequest {
                topic: "x".into(),
                platform: Platform::Tiktok,
                purpose: None,
                content_type: default_content_type(),
                asset_url: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::AiUnavailable));
    }

    fn draft(kernel: &CrmKernel, platform: Platform) -> GeneratedContent {
        let content = GeneratedContent {
            id: new_id(),
            content_type: "post".into(),
            platform,
            topic: "Lámparas".into(),
            asset_url: None,
            copy: "Ilumina tu casa".into(),
            hashtags: vec![],
            status: ContentStatus::Draft,
            scheduled_for: None,
            published_at: None,
            external_id: None,
            metrics: json!({}),
            created_at: Utc::now(),
        };
        kernel.store.insert_content(&content).unwrap();
        content
    }

    #[tokio::test]
    async fn future_publish_is_scheduled() {
        let (kernel, _) = test_kernel(None);
        let content = draft(&kernel, Platform::Instagram);
        let when = Utc::now() + Duration::hours(5);
        let outcome = kernel
            .publish_content(&PublishRequest {
                content_id: content.id.clone(),
                platforms: vec![],
                schedule_time: Some(when),
            })
            .await
            .unwrap();
        assert_eq!(outcome.status, ContentStatus::Scheduled);
        assert!(outcome.results.is_empty());
        let stored = kernel.store.get_content(&content.id).unwrap().unwrap();
        assert_eq!(stored.status, ContentStatus::Scheduled);
    }

    #[tokio::test]
    async fn unsupported_and_unconfigured_platforms_report_per_platform_errors() {
        let (kernel, _) = test_kernel(None);
        let content = draft(&kernel, Platform::Tiktok);
        let outcome = kernel
            .publish_content(&PublishRequest {
                content_id: content.id.clone(),
                platforms: vec![Platform::Tiktok, Platform::Facebook],
                schedule_time: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.status, ContentStatus::Failed);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| !r.success && r.error.is_some()));
        assert!(outcome.results[0].error.as_deref().unwrap().contains("not supported"));
    }

    #[tokio::test]
    async fn schedule_defaults_to_best_slot() {
        let (kernel, _) = test_kernel(None);
        let content = draft(&kernel, Platform::Tiktok);
        let scheduled = kernel.schedule_content(&content.id, None).unwrap();
        let slot = scheduled.scheduled_for.unwrap();
        assert!(slot > Utc::now());
        assert_eq!(slot.format("%H:%M").to_string(), "19:00");

        let missing = kernel.schedule_content("nope", None).unwrap_err();
        assert!(missing.is_not_found());
    }
}
