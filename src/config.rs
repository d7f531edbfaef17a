//! 配置
//!
//! 默认值对应 MobileNet v1 0.25 (224x224 输入)。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Invalid environment variable {name}: {value}")]
    EnvVar { name: &'static str, value: String },
}

/// 示教机器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeachableConfig {
    /// 类别槽数量
    pub num_classes: usize,
    /// k 近邻的 k
    pub top_k: usize,
    /// 模型输入边长 (正方形)
    pub image_size: u32,
    /// 每个类别最多采集的样本数
    pub max_examples: usize,
    /// 归一化前的压缩分母
    pub squash_denominator: f32,
    /// 帧循环间隔 (毫秒)
    pub frame_interval_ms: u64,
}

impl Default for TeachableConfig {
    fn default() -> Self {
        Self {
            num_classes: 3,
            top_k: 10,
            image_size: 224,
            max_examples: 50,
            squash_denominator: 300.0,
            frame_interval_ms: 16, // ~60fps
        }
    }
}

impl TeachableConfig {
    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 用环境变量覆盖 (TM_NUM_CLASSES, TM_TOP_K, TM_MAX_EXAMPLES)
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = read_env_usize("TM_NUM_CLASSES")? {
            self.num_classes = v;
        }
        if let Some(v) = read_env_usize("TM_TOP_K")? {
            self.top_k = v;
        }
        if let Some(v) = read_env_usize("TM_MAX_EXAMPLES")? {
            self.max_examples = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// 从页面地址里 `=` 之后的数字读取类别数，例如 `index.html?classes=4`
    pub fn num_classes_from_url(url: &str) -> Option<usize> {
        let index = url.find('=')?;
        let digits: String = url[index + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_classes == 0 {
            return Err(ConfigError::Validation("num_classes must be >= 1".into()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Validation("top_k must be >= 1".into()));
        }
        if self.image_size == 0 {
            return Err(ConfigError::Validation("image_size must be >= 1".into()));
        }
        if !(self.squash_denominator > 0.0) {
            return Err(ConfigError::Validation(
                "squash_denominator must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn read_env_usize(name: &'static str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => {
            let parsed = value.trim().parse();
            match parsed {
                Ok(v) => Ok(Some(v)),
                Err(_) => Err(ConfigError::EnvVar { name, value }),
            }
        }
        Err(_) => Ok(None),
    }
}
