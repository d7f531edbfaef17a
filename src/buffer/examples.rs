//! 样本存储
//!
//! 按类别保存训练样本 embedding (插入顺序即样本顺序)，
//! 并惰性缓存所有类别拼接后的训练矩阵。

use ndarray::{Array1, Array2};

use crate::error::{Result, TeachableError};

/// 单个类别的样本行 (行优先平铺, 可增长)
#[derive(Debug, Clone, Default)]
struct ClassRows {
    data: Vec<f32>,
}

/// 样本存储
#[derive(Debug, Clone)]
pub struct ExampleStore {
    /// 每个类别的样本
    classes: Vec<ClassRows>,
    /// 每个类别的样本数
    counts: Vec<usize>,
    /// 行宽，首个样本确定，全部清空后释放
    dim: Option<usize>,
    /// 拼接后的训练矩阵，None 表示已失效
    aggregate: Option<Array2<f32>>,
}

impl ExampleStore {
    pub fn new(num_classes: usize) -> Self {
        Self {
            classes: vec![ClassRows::default(); num_classes],
            counts: vec![0; num_classes],
            dim: None,
            aggregate: None,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// 当前行宽
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    fn check_class(&self, index: usize) -> Result<()> {
        if index >= self.classes.len() {
            return Err(TeachableError::InvalidClass {
                index,
                num_classes: self.classes.len(),
            });
        }
        Ok(())
    }

    fn check_dim(&self, actual: usize) -> Result<()> {
        match self.dim {
            Some(expected) if expected != actual => {
                Err(TeachableError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// 追加一行到类别末尾
    pub fn push(&mut self, class_index: usize, row: &Array1<f32>) -> Result<()> {
        self.check_class(class_index)?;
        self.check_dim(row.len())?;

        self.dim = Some(row.len());
        self.classes[class_index].data.extend(row.iter().copied());
        self.counts[class_index] += 1;
        self.invalidate();
        Ok(())
    }

    /// 清空类别
    pub fn clear(&mut self, class_index: usize) -> Result<()> {
        self.check_class(class_index)?;

        self.classes[class_index].data = Vec::new();
        self.counts[class_index] = 0;
        self.invalidate();
        self.release_dim_if_empty();
        Ok(())
    }

    /// 整体替换类别的样本矩阵
    pub fn replace(&mut self, class_index: usize, rows: Array2<f32>) -> Result<()> {
        self.check_class(class_index)?;

        let (count, width) = rows.dim();
        if count > 0 {
            // 只和其它类别比较行宽
            let others_populated = self
                .counts
                .iter()
                .enumerate()
                .any(|(i, &c)| i != class_index && c > 0);
            if others_populated {
                self.check_dim(width)?;
            }
            self.dim = Some(width);
        }

        self.classes[class_index].data = rows.iter().copied().collect();
        self.counts[class_index] = count;
        self.invalidate();
        self.release_dim_if_empty();
        Ok(())
    }

    /// 类别的样本矩阵 `[count, dim]`，空类别返回 None
    pub fn class_matrix(&self, class_index: usize) -> Result<Option<Array2<f32>>> {
        self.check_class(class_index)?;

        let count = self.counts[class_index];
        match self.dim {
            Some(dim) if count > 0 => {
                let data = self.classes[class_index].data.clone();
                let matrix = Array2::from_shape_vec((count, dim), data)
                    .map_err(|_| TeachableError::ShapeMismatch { len: count * dim, dim })?;
                Ok(Some(matrix))
            }
            _ => Ok(None),
        }
    }

    /// 所有类别按类别序拼接后的训练矩阵 (空类别跳过)
    pub fn aggregate(&mut self) -> Option<&Array2<f32>> {
        if self.aggregate.is_none() {
            self.aggregate = self.build_aggregate();
        }
        self.aggregate.as_ref()
    }

    fn build_aggregate(&self) -> Option<Array2<f32>> {
        let dim = self.dim?;
        let total = self.total();
        if total == 0 {
            return None;
        }

        let mut data = Vec::with_capacity(total * dim);
        for class in &self.classes {
            data.extend_from_slice(&class.data);
        }
        Array2::from_shape_vec((total, dim), data).ok()
    }

    /// 训练矩阵是否已缓存
    pub fn is_aggregate_cached(&self) -> bool {
        self.aggregate.is_some()
    }

    /// 各类别样本数
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// 样本总数
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// 各类别在训练矩阵中的结束偏移 (样本数前缀和)
    pub fn class_offsets(&self) -> Vec<usize> {
        self.counts
            .iter()
            .scan(0, |acc, &count| {
                *acc += count;
                Some(*acc)
            })
            .collect()
    }

    /// 训练矩阵中的行属于哪个类别
    pub fn class_for_row(offsets: &[usize], row: usize) -> Option<usize> {
        offsets.iter().position(|&end| row < end)
    }

    /// 释放所有样本
    pub fn reset(&mut self) {
        for class in &mut self.classes {
            class.data = Vec::new();
        }
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.dim = None;
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.aggregate = None;
    }

    fn release_dim_if_empty(&mut self) {
        if self.total() == 0 {
            self.dim = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_push_and_aggregate() {
        let mut store = ExampleStore::new(3);
        store.push(2, &array![0.0, 1.0]).unwrap();
        store.push(0, &array![1.0, 0.0]).unwrap();
        store.push(0, &array![0.5, 0.5]).unwrap();

        assert_eq!(store.counts(), &[2, 0, 1]);
        assert_eq!(store.class_offsets(), vec![2, 2, 3]);

        // 类别序拼接，类别 1 为空被跳过
        let aggregate = store.aggregate().unwrap().clone();
        assert_eq!(aggregate, array![[1.0, 0.0], [0.5, 0.5], [0.0, 1.0]]);
        assert!(store.is_aggregate_cached());

        store.push(1, &array![0.2, 0.8]).unwrap();
        assert!(!store.is_aggregate_cached());
        assert_eq!(store.aggregate().unwrap().nrows(), 4);
    }

    #[test]
    fn test_class_for_row() {
        let offsets = vec![2, 2, 5];
        assert_eq!(ExampleStore::class_for_row(&offsets, 0), Some(0));
        assert_eq!(ExampleStore::class_for_row(&offsets, 1), Some(0));
        assert_eq!(ExampleStore::class_for_row(&offsets, 2), Some(2));
        assert_eq!(ExampleStore::class_for_row(&offsets, 4), Some(2));
        assert_eq!(ExampleStore::class_for_row(&offsets, 5), None);
    }

    #[test]
    fn test_clear_removes_rows() {
        let mut store = ExampleStore::new(2);
        store.push(0, &array![1.0, 0.0]).unwrap();
        store.push(1, &array![0.0, 1.0]).unwrap();
        store.clear(0).unwrap();

        assert_eq!(store.counts(), &[0, 1]);
        assert_eq!(store.aggregate().unwrap(), &array![[0.0, 1.0]]);
        assert!(store.class_matrix(0).unwrap().is_none());
    }

    #[test]
    fn test_dimension_lock() {
        let mut store = ExampleStore::new(2);
        store.push(0, &array![1.0, 0.0]).unwrap();
        assert!(matches!(
            store.push(1, &array![1.0, 0.0, 0.0]),
            Err(TeachableError::DimensionMismatch { expected: 2, actual: 3 })
        ));

        // 全部清空后可以换维度
        store.clear(0).unwrap();
        store.push(1, &array![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(store.dim(), Some(3));
    }

    #[test]
    fn test_replace() {
        let mut store = ExampleStore::new(2);
        store.push(0, &array![1.0, 0.0]).unwrap();
        store.replace(0, array![[0.0, 1.0], [1.0, 0.0], [0.6, 0.8]]).unwrap();
        assert_eq!(store.counts(), &[3, 0]);
        assert_eq!(store.class_matrix(0).unwrap().unwrap().row(2), array![0.6, 0.8]);

        store.replace(0, Array2::zeros((0, 2))).unwrap();
        assert_eq!(store.total(), 0);
        assert!(store.aggregate().is_none());
    }

    #[test]
    fn test_invalid_class() {
        let mut store = ExampleStore::new(2);
        assert!(matches!(
            store.push(2, &array![1.0]),
            Err(TeachableError::InvalidClass { index: 2, num_classes: 2 })
        ));
        assert!(store.clear(5).is_err());
    }
}
