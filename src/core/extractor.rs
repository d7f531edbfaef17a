//! Embedding 提取器
//!
//! 真正的特征网络 (MobileNet 一类) 属于外部运行时，这里只定义接口。
//! `GridPoolExtractor` 是一个确定性的网格平均池化实现，用于演示和测试。

use ndarray::{s, Array1, Array3};
use tracing::info;

use crate::error::{Result, TeachableError};

/// 把归一化后的图像 `[h, w, 3]` 映射为定长特征向量
pub trait EmbeddingExtractor: Send {
    /// 模型是否已加载
    fn is_ready(&self) -> bool;

    /// 输出维度
    fn dim(&self) -> usize;

    /// 加载并预热模型
    fn load(&mut self, _image_size: u32) -> Result<()> {
        Ok(())
    }

    /// 提取 embedding
    fn embed(&self, image: &Array3<f32>) -> Result<Array1<f32>>;
}

/// 网格平均池化提取器
///
/// 把图像切成 `grid x grid` 个格子，每格每通道取均值，输出 `grid * grid * 3` 维。
pub struct GridPoolExtractor {
    grid: usize,
    loaded: bool,
}

impl GridPoolExtractor {
    pub fn new(grid: usize) -> Self {
        Self {
            grid: grid.max(1),
            loaded: false,
        }
    }

    /// 已加载的提取器
    pub fn loaded(grid: usize) -> Self {
        Self {
            loaded: true,
            ..Self::new(grid)
        }
    }
}

impl EmbeddingExtractor for GridPoolExtractor {
    fn is_ready(&self) -> bool {
        self.loaded
    }

    fn dim(&self) -> usize {
        self.grid * self.grid * 3
    }

    fn load(&mut self, image_size: u32) -> Result<()> {
        // 用全零图像跑一次，确认输出维度
        let size = image_size as usize;
        let warm_up = self.pool(&Array3::zeros((size, size, 3)))?;
        self.loaded = true;
        info!("GridPoolExtractor 就绪: {} 维", warm_up.len());
        Ok(())
    }

    fn embed(&self, image: &Array3<f32>) -> Result<Array1<f32>> {
        if !self.loaded {
            return Err(TeachableError::NotReady("extractor not loaded"));
        }
        self.pool(image)
    }
}

impl GridPoolExtractor {
    fn pool(&self, image: &Array3<f32>) -> Result<Array1<f32>> {
        let (h, w, channels) = image.dim();
        if channels != 3 || h < self.grid || w < self.grid {
            return Err(TeachableError::DimensionMismatch {
                expected: self.grid * self.grid * 3,
                actual: h * w * channels,
            });
        }

        let mut features = Vec::with_capacity(self.dim());
        for gy in 0..self.grid {
            let (y0, y1) = (gy * h / self.grid, (gy + 1) * h / self.grid);
            for gx in 0..self.grid {
                let (x0, x1) = (gx * w / self.grid, (gx + 1) * w / self.grid);
                for c in 0..3 {
                    let cell = image.slice(s![y0..y1, x0..x1, c]);
                    features.push(cell.mean().unwrap_or(0.0));
                }
            }
        }
        Ok(Array1::from_vec(features))
    }
}
