//! 模型持久化
//!
//! 单个类别保存为平铺的 JSON 数字数组，加载时按 embedding 维度还原成矩阵。
//! 整个会话可以保存为 `SessionSnapshot`。

use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TeachableError};

/// 类别样本矩阵 → JSON 数组
pub fn encode_rows(rows: Option<&Array2<f32>>) -> Result<String> {
    let values: Vec<f32> = rows.map(|m| m.iter().copied().collect()).unwrap_or_default();
    Ok(serde_json::to_string(&values)?)
}

/// JSON 数组 → `[len / dim, dim]` 矩阵
pub fn decode_rows(json: &str, dim: usize) -> Result<Array2<f32>> {
    let values: Vec<f32> = serde_json::from_str(json)?;
    rows_from_vec(values, dim)
}

pub fn rows_from_vec(values: Vec<f32>, dim: usize) -> Result<Array2<f32>> {
    let len = values.len();
    if dim == 0 || len % dim != 0 {
        return Err(TeachableError::ShapeMismatch { len, dim });
    }
    Array2::from_shape_vec((len / dim, dim), values)
        .map_err(|_| TeachableError::ShapeMismatch { len, dim })
}

/// 单个类别
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSnapshot {
    pub label: String,
    pub dim: usize,
    pub values: Vec<f32>,
}

impl ClassSnapshot {
    pub fn rows(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.values.len() / self.dim
        }
    }
}

/// 整个会话 (按类别序)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub classes: Vec<ClassSnapshot>,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
