//! 视频帧
//!
//! 摄像头帧 (RGB, 零拷贝) 以及送入模型前的预处理

use bytes::Bytes;
use ndarray::Array3;

use crate::error::{Result, TeachableError};

/// 像素归一化偏移: (x - 127.5) / 127.5 映射到 [-1, 1]
const PIXEL_OFFSET: f32 = 127.5;

/// 视频帧
#[derive(Clone, Debug)]
pub struct Frame {
    /// 帧数据 (RGB, 行优先, 零拷贝)
    pub data: Bytes,
    /// 时间戳 (秒)
    pub timestamp: f64,
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
}

impl Frame {
    pub fn new(data: Bytes, timestamp: f64, width: u32, height: u32) -> Self {
        Self { data, timestamp, width, height }
    }

    /// 从 Vec<u8> 创建
    pub fn from_vec(data: Vec<u8>, timestamp: f64, width: u32, height: u32) -> Self {
        Self {
            data: Bytes::from(data),
            timestamp,
            width,
            height,
        }
    }

    /// 纯色帧
    pub fn solid(rgb: [u8; 3], timestamp: f64, width: u32, height: u32) -> Self {
        let pixels = width as usize * height as usize;
        let data: Vec<u8> = rgb.iter().copied().cycle().take(pixels * 3).collect();
        Self::from_vec(data, timestamp, width, height)
    }

    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// 转为模型输入: 双线性缩放到 `size x size`，再归一化到 [-1, 1]
    ///
    /// 返回形状 `[size, size, 3]`
    pub fn to_tensor(&self, size: u32) -> Result<Array3<f32>> {
        let expected = self.expected_len();
        if self.data.len() != expected || expected == 0 {
            return Err(TeachableError::InvalidFrame {
                expected,
                actual: self.data.len(),
            });
        }

        let (in_h, in_w) = (self.height as usize, self.width as usize);
        let out = size as usize;
        let scale_y = in_h as f32 / out as f32;
        let scale_x = in_w as f32 / out as f32;
        let pixel = |y: usize, x: usize, c: usize| self.data[(y * in_w + x) * 3 + c] as f32;

        let tensor = Array3::from_shape_fn((out, out, 3), |(y, x, c)| {
            let src_y = y as f32 * scale_y;
            let src_x = x as f32 * scale_x;
            let y0 = (src_y.floor() as usize).min(in_h - 1);
            let x0 = (src_x.floor() as usize).min(in_w - 1);
            let y1 = (y0 + 1).min(in_h - 1);
            let x1 = (x0 + 1).min(in_w - 1);
            let dy = src_y - y0 as f32;
            let dx = src_x - x0 as f32;

            let top = pixel(y0, x0, c) + (pixel(y0, x1, c) - pixel(y0, x0, c)) * dx;
            let bottom = pixel(y1, x0, c) + (pixel(y1, x1, c) - pixel(y1, x0, c)) * dx;
            let value = top + (bottom - top) * dy;

            (value - PIXEL_OFFSET) / PIXEL_OFFSET
        });

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_frame_normalized() {
        let frame = Frame::solid([255, 0, 128], 0.0, 10, 6);
        let tensor = frame.to_tensor(4).unwrap();

        assert_eq!(tensor.shape(), &[4, 4, 3]);
        for y in 0..4 {
            for x in 0..4 {
                assert!((tensor[[y, x, 0]] - 1.0).abs() < 1e-6);
                assert!((tensor[[y, x, 1]] + 1.0).abs() < 1e-6);
                assert!((tensor[[y, x, 2]] - 0.5 / 127.5).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_bilinear_upscale() {
        // 1x2 灰度渐变: 0 -> 255
        let frame = Frame::from_vec(vec![0, 0, 0, 255, 255, 255], 0.0, 2, 1);
        let tensor = frame.to_tensor(4).unwrap();

        // x=1 对应源坐标 0.5，取中间值
        let mid = tensor[[0, 1, 0]] * PIXEL_OFFSET + PIXEL_OFFSET;
        assert!((mid - 127.5).abs() < 1e-3);
        // 右边界钳制到最后一个像素
        assert!((tensor[[0, 3, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 0]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_frame() {
        let frame = Frame::from_vec(vec![0u8; 100], 0.0, 10, 10);
        assert!(matches!(
            frame.to_tensor(8),
            Err(TeachableError::InvalidFrame { expected: 300, actual: 100 })
        ));
    }
}
