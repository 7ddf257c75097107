use crate::message::RuleNotification;
use crate::notifier::{Notifier, NotifyResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// core 接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub uri: String,
    pub timeout_secs: u64,
    /// 关闭后接受自签名证书
    pub ssl_verify: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            uri: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 10,
            ssl_verify: true,
        }
    }
}

/// 通过 `PUT {core}/rules` 上报规则状态
pub struct CoreNotifier {
    config: CoreConfig,
    client: reqwest::Client,
}

impl CoreNotifier {
    pub fn new(config: CoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.ssl_verify)
            .build()
            .context("Failed to build core HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn rules_url(&self) -> String {
        format!("{}/rules", self.config.uri.trim_end_matches('/'))
    }
}

#[async_trait]
impl Notifier for CoreNotifier {
    async fn send(&self, notification: &RuleNotification) -> Result<NotifyResult> {
        let url = self.rules_url();
        debug!(
            url = %url,
            machine = %notification.machine_uuid,
            rule_id = %notification.rule_id,
            "Sending rule notification to core"
        );

        let response = self
            .client
            .put(&url)
            .query(&notification.query_params())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if status.is_success() {
            Ok(NotifyResult::success())
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(NotifyResult::rejected(status.as_u16(), body))
        }
    }

    fn name(&self) -> &str {
        "core"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_url() {
        let notifier = CoreNotifier::new(CoreConfig {
            uri: "https://core.example.com/".to_string(),
            timeout_secs: 5,
            ssl_verify: false,
        })
        .unwrap();

        assert_eq!(notifier.rules_url(), "https://core.example.com/rules");
        assert_eq!(notifier.name(), "core");
    }
}
