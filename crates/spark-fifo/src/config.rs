//! # 启动配置
//!
//! ## 角色定位（Why）
//! - 策略、释放时机与背压行为都在启动时确定，进程生命周期内不再改变；
//! - 配置可以来自单个策略字符串（与模块参数 `mode=default|single|multi` 对应），
//!   也可以来自 TOML 文本，由 `serde` 映射为强类型结构。
//!
//! ## 设计要求（What）
//! - 无法识别的策略名返回 [`FifoError::InvalidPolicy`]，拒绝启动而不是悄悄回退到默认值；
//! - 所有 TOML 字段均有默认值，缺省文本得到与历史行为一致的配置。

use std::{fmt, str::FromStr, time::Duration};

use serde::Deserialize;

use crate::error::{FifoError, Result};

/// 并发访问策略。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// 单一共享队列，允许多方并发访问。
    #[default]
    Default,
    /// 单一共享队列，同一时刻只允许一个句柄打开。
    Single,
    /// 每个身份一个队列，允许多方并发访问。
    Multi,
}

impl Policy {
    pub fn as_str(self) -> &'static str {
        match self {
            Policy::Default => "default",
            Policy::Single => "single",
            Policy::Multi => "multi",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = FifoError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Policy::Default),
            "single" => Ok(Policy::Single),
            "multi" => Ok(Policy::Multi),
            _ => Err(FifoError::InvalidPolicy {
                value: raw.to_owned(),
            }),
        }
    }
}

/// 队列何时从目录中释放。
///
/// # 教案式说明
/// - **意图 (Why)**：历史实现中“关闭后队列是否保留”前后不一致，因此显式配置而不是写死；
/// - **契约 (What)**：
///   - `OnClose`：某个队列上最后一个句柄关闭时释放该队列并丢弃剩余字节；
///   - `OnShutdown`：关闭句柄不释放队列，只有关停清扫才会移除条目。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    OnClose,
    #[default]
    OnShutdown,
}

/// 满队列上的写入行为。
///
/// - `Block`：挂起写者直到腾出空间（或被打断）；
/// - `Reject`：立即返回 0 字节的短写。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    #[default]
    Block,
    Reject,
}

/// 多路复用器的完整启动配置。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MuxConfig {
    pub policy: Policy,
    pub release: ReleasePolicy,
    pub backpressure: Backpressure,
    /// 单次条件等待的最长毫秒数；阻塞调用在每个切片结束时复查取消令牌。
    pub wait_slice_ms: u64,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            policy: Policy::Default,
            release: ReleasePolicy::OnShutdown,
            backpressure: Backpressure::Block,
            wait_slice_ms: 50,
        }
    }
}

impl MuxConfig {
    /// 以指定策略、其余字段取默认值构造配置。
    pub fn with_policy(policy: Policy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn release(mut self, release: ReleasePolicy) -> Self {
        self.release = release;
        self
    }

    pub fn backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn wait_slice(mut self, slice: Duration) -> Self {
        self.wait_slice_ms = u64::try_from(slice.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 从 TOML 文本解析配置并校验。
    ///
    /// # 教案式注释
    /// - **执行 (How)**：使用 `toml::from_str` 映射到强类型结构，解析失败时携带底层诊断；
    /// - **契约 (What)**：未出现的字段取默认值；未知字段或非法取值返回 [`FifoError::InvalidConfig`]。
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: MuxConfig = toml::from_str(raw).map_err(|err| FifoError::InvalidConfig {
            detail: err.to_string(),
        })?;
        config.validate()
    }

    /// 校验字段取值，返回自身以便链式调用。
    pub fn validate(self) -> Result<Self> {
        if self.wait_slice_ms == 0 {
            return Err(FifoError::InvalidConfig {
                detail: "wait_slice_ms must be greater than zero".to_owned(),
            });
        }
        Ok(self)
    }

    pub fn wait_slice_duration(&self) -> Duration {
        Duration::from_millis(self.wait_slice_ms)
    }
}
