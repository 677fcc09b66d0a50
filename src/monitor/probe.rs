//! HTTP探测执行器
//!
//! 对单个目标发起一次请求，记录状态码、响应头、响应体、耗时和内容指纹。
//! 传输层失败返回 `ProbeError`，由检测任务记录日志，不触发告警。

use crate::error::ProbeError;
use crate::monitor::fingerprint::Fingerprint;
use crate::monitor::target::TargetSpec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};

/// 单次探测结果
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub status_code: u16,
    /// 形如 `Name:Value` 的响应头
    pub headers: Vec<String>,
    pub body: String,
    /// 从发起请求到读完响应体的耗时
    #[serde(serialize_with = "crate::config::duration::serialize")]
    pub elapsed: Duration,
    pub fingerprint: Fingerprint,
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    /// 由响应的原始字节构造结果，响应体按 UTF-8 有损解码
    pub fn from_parts(
        status_code: u16,
        headers: Vec<String>,
        raw_body: &[u8],
        elapsed: Duration,
    ) -> Self {
        Self {
            status_code,
            headers,
            body: String::from_utf8_lossy(raw_body).into_owned(),
            elapsed,
            fingerprint: Fingerprint::of(raw_body),
            checked_at: Utc::now(),
        }
    }
}

/// 探测器trait
#[async_trait]
pub trait Prober: Send + Sync {
    /// 对目标执行一次探测
    ///
    /// # 参数
    /// * `target` - 监控目标
    ///
    /// # 返回
    /// * `Result<ProbeResult, ProbeError>` - 探测结果，传输失败时返回错误
    async fn probe(&self, target: &TargetSpec) -> Result<ProbeResult, ProbeError>;
}

/// 基于 reqwest 的HTTP探测器
///
/// 持有两个客户端：默认客户端校验证书，另一个只用于显式开启
/// `accept_invalid_certs` 的目标。
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    insecure_client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, ProbeError> {
        let user_agent = format!("{}/{}", crate::APP_NAME, crate::VERSION);

        let client = Client::builder()
            .user_agent(user_agent.clone())
            .build()
            .map_err(|e| ProbeError::ClientBuild(e.to_string()))?;

        let insecure_client = Client::builder()
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ProbeError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            insecure_client,
        })
    }

    fn client_for(&self, target: &TargetSpec) -> &Client {
        if target.accept_invalid_certs {
            &self.insecure_client
        } else {
            &self.client
        }
    }

    fn build_request(&self, target: &TargetSpec) -> reqwest::RequestBuilder {
        let mut request = self
            .client_for(target)
            .request(target.method.clone(), target.url.clone());

        // 目标配置的 User-Agent 会覆盖客户端默认值
        for (name, value) in &target.headers {
            request = request.header(name.clone(), value.clone());
        }

        if target.sends_body() {
            if let Some(body) = &target.body {
                request = request.body(body.to_bytes());
            }
        }

        request
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &TargetSpec) -> Result<ProbeResult, ProbeError> {
        let start = Instant::now();

        let response = self.build_request(target).send().await?;
        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                format!("{}:{}", name.as_str(), String::from_utf8_lossy(value.as_bytes()))
            })
            .collect();

        let raw_body = response.bytes().await?;
        let elapsed = start.elapsed();

        tracing::trace!(
            url = %target.path,
            status = status_code,
            bytes = raw_body.len(),
            "探测完成"
        );

        Ok(ProbeResult::from_parts(
            status_code,
            headers,
            &raw_body,
            elapsed,
        ))
    }
}
