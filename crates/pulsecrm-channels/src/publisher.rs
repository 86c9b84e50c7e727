//! Meta Graph API publishing and comment moderation.
//!
//! Instagram posts go through the two-step container flow
//! (`/{ig_id}/media` then `/{ig_id}/media_publish`); Facebook posts use
//! `/{page_id}/photos`.

use crate::types::{check_response, ChannelError};
use pulsecrm_types::config::{resolve_env, MetaConfig};
use pulsecrm_types::content::Platform;
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroizing;

/// The parts of a generated post that get published.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostContent {
    pub copy: String,
    pub hashtags: Vec<String>,
    pub asset_url: Option<String>,
}

impl PostContent {
    /// Copy followed by a blank line and the space-joined hashtags.
    pub fn caption(&self) -> String {
        if self.hashtags.is_empty() {
            return self.copy.clone();
        }
        format!("{}\n\n{}", self.copy, self.hashtags.join(" "))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub external_id: String,
    pub response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

pub struct MetaPublisher {
    client: reqwest::Client,
    access_token: Option<Zeroizing<String>>,
    instagram_account_id: String,
    facebook_page_id: String,
    base_url: String,
}

impl MetaPublisher {
    pub fn new(
        access_token: Option<String>,
        instagram_account_id: String,
        facebook_page_id: String,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.map(Zeroizing::new),
            instagram_account_id,
            facebook_page_id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(meta: &MetaConfig) -> Self {
        Self::new(
            resolve_env(&meta.access_token_env),
            meta.instagram_business_account_id.clone(),
            meta.facebook_page_id.clone(),
            meta.graph_base_url.clone(),
        )
    }

    fn token(&self) -> Result<&str, ChannelError> {
        self.access_token
            .as_ref()
            .map(|t| t.as_str())
            .ok_or_else(|| ChannelError::NotConfigured("Meta access token".to_string()))
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<serde_json::Value, ChannelError> {
        let token = self.token()?;
        let mut fields: Vec<(&str, &str)> = form.to_vec();
        fields.push(("access_token", token));
        let resp = self.client.post(url).form(&fields).send().await?;
        let resp = check_response("meta", resp).await?;
        Ok(resp.json().await?)
    }

    /// Publish immediately on `platform`.
    pub async fn publish(
        &self,
        platform: Platform,
        post: &PostContent,
    ) -> Result<PublishReceipt, ChannelError> {
        match platform {
            Platform::Instagram => self.publish_instagram(post).await,
            Platform::Facebook => self.publish_facebook(post).await,
            Platform::Tiktok => Err(ChannelError::Unsupported(format!(
                "Platform {platform} not supported"
            ))),
        }
    }

    async fn publish_instagram(&self, post: &PostContent) -> Result<PublishReceipt, ChannelError> {
        if self.instagram_account_id.is_empty() {
            return Err(ChannelError::NotConfigured(
                "Instagram business account id".to_string(),
            ));
        }
        let caption = post.caption();
        let container_url = format!("{}/{}/media", self.base_url, self.instagram_account_id);
        let container = self
            .post_form(
                &container_url,
                &[
                    ("image_url", post.asset_url.as_deref().unwrap_or_default()),
                    ("caption", caption.as_str()),
                ],
            )
            .await?;
        let container_id = serde_json::from_value::<IdResponse>(container)
            .map_err(|e| ChannelError::Unexpected(format!("container response: {e}")))?
            .id;

        let publish_url = format!(
            "{}/{}/media_publish",
            self.base_url, self.instagram_account_id
        );
        let response = self
            .post_form(&publish_url, &[("creation_id", container_id.as_str())])
            .await?;
        let external_id = response["id"].as_str().unwrap_or(&container_id).to_string();
        info!(external_id = %external_id, "Published Instagram post");
        Ok(PublishReceipt {
            external_id,
            response,
        })
    }

    async fn publish_facebook(&self, post: &PostContent) -> Result<PublishReceipt, ChannelError> {
        if self.facebook_page_id.is_empty() {
            return Err(ChannelError::NotConfigured("Facebook page id".to_string()));
        }
        let caption = post.caption();
        let url = format!("{}/{}/photos", self.base_url, self.facebook_page_id);
        let response = self
            .post_form(
                &url,
                &[
                    ("url", post.asset_url.as_deref().unwrap_or_default()),
                    ("message", caption.as_str()),
                ],
            )
            .await?;
        let external_id = response["post_id"]
            .as_str()
            .or_else(|| response["id"].as_str())
            .unwrap_or_default()
            .to_string();
        info!(external_id = %external_id, "Published Facebook post");
        Ok(PublishReceipt {
            external_id,
            response,
        })
    }

    /// Reply publicly under a comment.
    pub async fn reply_to_comment(
        &self,
        platform: Platform,
        comment_id: &str,
        message: &str,
    ) -> Result<(), ChannelError> {
        let edge = match platform {
            Platform::Instagram => "replies",
            Platform::Facebook => "comments",
            Platform::Tiktok => {
                return Err(ChannelError::Unsupported(
                    "comment replies on tiktok".to_string(),
                ))
            }
        };
        let url = format!("{}/{}/{}", self.base_url, comment_id, edge);
        self.post_form(&url, &[("message", message)]).await?;
        info!(comment_id, "Replied to comment");
        Ok(())
    }

    /// Hide a comment from public view.
    pub async fn hide_comment(&self, comment_id: &str) -> Result<(), ChannelError> {
        let url = format!("{}/{}", self.base_url, comment_id);
        self.post_form(&url, &[("hide", "true")]).await?;
        info!(comment_id, "Comment hidden");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_appends_hashtags() {
        let post = PostContent {
            copy: "Nueva colección".into(),
            hashtags: vec!["#moda".into(), "#verano".into()],
            asset_url: None,
        };
        assert_eq!(post.caption(), "Nueva colección\n\n#moda #verano");
        let bare = PostContent {
            copy: "Solo texto".into(),
            ..Default::default()
        };
        assert_eq!(bare.caption(), "Solo texto");
    }

    #[tokio::test]
    async fn tiktok_is_unsupported() {
        let publisher = MetaPublisher::new(Some("t".into()), "ig".into(), "fb".into(), "http://x");
        assert!(matches!(
            publisher.publish(Platform::Tiktok, &PostContent::default()).await,
            Err(ChannelError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn missing_token_is_reported() {
        let publisher = MetaPublisher::new(None, "ig".into(), "fb".into(), "http://127.0.0.1:9");
        assert!(matches!(
            publisher.publish(Platform::Instagram, &PostContent::default()).await,
            Err(ChannelError::NotConfigured(_))
        ));
        assert!(matches!(
            publisher.hide_comment("c1").await,
            Err(ChannelError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn missing_page_id_is_reported() {
        let publisher = MetaPublisher::new(Some("t".into()), String::new(), String::new(), "http://x");
        assert!(matches!(
            publisher.publish(Platform::Facebook, &PostContent::default()).await,
            Err(ChannelError::NotConfigured(_))
        ));
    }
}
