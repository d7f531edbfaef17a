//! k 近邻图像分类器
//!
//! 训练样本和查询都先除以固定分母再做 L2 归一化，
//! 因此训练矩阵与查询的点积就是余弦相似度。
//! 取相似度最高的 k 个样本，按所属类别投票。

use ndarray::{Array1, Array2};
use tracing::{debug, info};

use crate::buffer::examples::ExampleStore;
use crate::error::{Result, TeachableError};

/// 默认压缩分母
pub const SQUASH_DENOMINATOR: f32 = 300.0;

/// 分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// 得票最多的类别 (平票取序号最小的)
    pub class_index: usize,
    /// 每个类别的置信度: 票数 / k
    pub confidences: Vec<f32>,
}

/// k 近邻分类器
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    k: usize,
    squash_denominator: f32,
    store: ExampleStore,
}

impl KnnClassifier {
    /// `k` 至少为 1
    pub fn new(num_classes: usize, k: usize) -> Self {
        info!("KnnClassifier: {} 个类别, k={}", num_classes, k);
        Self {
            k: k.max(1),
            squash_denominator: SQUASH_DENOMINATOR,
            store: ExampleStore::new(num_classes),
        }
    }

    pub fn with_squash_denominator(mut self, denominator: f32) -> Self {
        self.squash_denominator = denominator;
        self
    }

    pub fn num_classes(&self) -> usize {
        self.store.num_classes()
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// 压缩后 L2 归一化。零向量原样返回
    pub fn normalize(&self, embedding: &Array1<f32>) -> Array1<f32> {
        let squashed = embedding / self.squash_denominator;
        let norm = squashed.dot(&squashed).sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return squashed;
        }
        squashed / norm
    }

    /// 添加一个训练样本
    pub fn add_example(&mut self, embedding: &Array1<f32>, class_index: usize) -> Result<()> {
        let normalized = self.normalize(embedding);
        self.store.push(class_index, &normalized)?;
        debug!(
            "类别 {} 新增样本, 共 {} 个",
            class_index,
            self.store.counts()[class_index]
        );
        Ok(())
    }

    /// 清空类别
    pub fn clear_class(&mut self, class_index: usize) -> Result<()> {
        self.store.clear(class_index)?;
        debug!("类别 {} 已清空", class_index);
        Ok(())
    }

    /// 整体替换类别样本 (例如恢复保存的模型)，不再归一化
    pub fn load_examples(&mut self, matrix: Array2<f32>, class_index: usize) -> Result<()> {
        let rows = matrix.nrows();
        self.store.replace(class_index, matrix)?;
        debug!("类别 {} 载入 {} 个样本", class_index, rows);
        Ok(())
    }

    /// 导出类别样本矩阵，空类别返回 None
    pub fn export_examples(&self, class_index: usize) -> Result<Option<Array2<f32>>> {
        self.store.class_matrix(class_index)
    }

    /// 各类别样本数
    pub fn class_example_counts(&self) -> &[usize] {
        self.store.counts()
    }

    pub fn total_examples(&self) -> usize {
        self.store.total()
    }

    /// 查询与每个训练样本的相似度 (训练矩阵行序)
    pub fn similarities(&mut self, embedding: &Array1<f32>) -> Result<Array1<f32>> {
        let query = self.normalize(embedding);
        let aggregate = self
            .store
            .aggregate()
            .ok_or(TeachableError::NotReady("no training examples"))?;

        if aggregate.ncols() != query.len() {
            return Err(TeachableError::DimensionMismatch {
                expected: aggregate.ncols(),
                actual: query.len(),
            });
        }
        Ok(aggregate.dot(&query))
    }

    /// 分类
    ///
    /// 没有任何样本时返回 `NotReady`
    pub fn classify(&mut self, embedding: &Array1<f32>) -> Result<Prediction> {
        let scores = self.similarities(embedding)?;
        let k = self.k.min(scores.len());
        let top = top_k_indices(&scores.to_vec(), k);

        let offsets = self.store.class_offsets();
        let mut votes = vec![0usize; self.num_classes()];
        for row in top {
            if let Some(class) = ExampleStore::class_for_row(&offsets, row) {
                votes[class] += 1;
            }
        }

        let mut class_index = 0;
        let mut best = 0.0f32;
        let confidences: Vec<f32> = votes
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let confidence = v as f32 / k as f32;
                if confidence > best {
                    best = confidence;
                    class_index = i;
                }
                confidence
            })
            .collect();

        Ok(Prediction { class_index, confidences })
    }

    /// 释放所有样本
    pub fn reset(&mut self) {
        self.store.reset();
    }
}

/// 相似度最高的 k 个下标；稳定排序，平分时保留原始顺序
///
/// NaN 排在最后，`-0.0` 与 `0.0` 视为相等。
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let keys: Vec<f32> = scores.iter().map(|&s| sort_key(s)).collect();
    let mut indices: Vec<usize> = (0..keys.len()).collect();
    indices.sort_by(|&a, &b| keys[b].total_cmp(&keys[a]));
    indices.truncate(k);
    indices
}

fn sort_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else if score == 0.0 {
        0.0
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalize() {
        let knn = KnnClassifier::new(2, 1);
        let v = knn.normalize(&array![300.0, 400.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let zero = knn.normalize(&array![0.0, 0.0]);
        assert_eq!(zero, array![0.0, 0.0]);
    }

    #[test]
    fn test_two_class_scenario() {
        let mut knn = KnnClassifier::new(2, 1);
        knn.add_example(&array![1.0, 0.0], 0).unwrap();
        knn.add_example(&array![0.0, 1.0], 1).unwrap();

        let prediction = knn.classify(&array![0.9, 0.1]).unwrap();
        assert_eq!(prediction.class_index, 0);
        assert_eq!(prediction.confidences, vec![1.0, 0.0]);
    }

    #[test]
    fn test_add_increments_count() {
        let mut knn = KnnClassifier::new(3, 10);
        for class in 0..3 {
            let before = knn.class_example_counts()[class];
            knn.add_example(&array![1.0, 2.0, 3.0], class).unwrap();
            assert_eq!(knn.class_example_counts()[class], before + 1);
        }
        assert_eq!(knn.total_examples(), 3);
    }

    #[test]
    fn test_invalid_class() {
        let mut knn = KnnClassifier::new(2, 1);
        assert!(matches!(
            knn.add_example(&array![1.0], 2),
            Err(TeachableError::InvalidClass { .. })
        ));
        assert!(knn.clear_class(7).is_err());
        assert!(knn.load_examples(array![[1.0]], 2).is_err());
    }

    #[test]
    fn test_not_ready_without_examples() {
        let mut knn = KnnClassifier::new(2, 3);
        assert!(matches!(
            knn.classify(&array![1.0, 0.0]),
            Err(TeachableError::NotReady(_))
        ));

        knn.add_example(&array![1.0, 0.0], 0).unwrap();
        knn.clear_class(0).unwrap();
        assert!(knn.classify(&array![1.0, 0.0]).is_err());
    }

    #[test]
    fn test_identical_query_full_confidence() {
        let mut knn = KnnClassifier::new(3, 1);
        let example = array![0.3, -0.2, 0.9, 0.1];
        knn.add_example(&example, 1).unwrap();

        let prediction = knn.classify(&example).unwrap();
        assert_eq!(prediction.class_index, 1);
        assert!((prediction.confidences[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_confidences_sum_to_one() {
        let mut knn = KnnClassifier::new(2, 4);
        knn.add_example(&array![1.0, 0.0], 0).unwrap();
        knn.add_example(&array![0.9, 0.1], 0).unwrap();
        knn.add_example(&array![0.0, 1.0], 1).unwrap();
        knn.add_example(&array![0.1, 0.9], 1).unwrap();

        let prediction = knn.classify(&array![0.7, 0.3]).unwrap();
        let sum: f32 = prediction.confidences.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_effective_k_capped_by_examples() {
        let mut knn = KnnClassifier::new(2, 10);
        knn.add_example(&array![1.0, 0.0], 0).unwrap();
        knn.add_example(&array![0.0, 1.0], 1).unwrap();

        let prediction = knn.classify(&array![1.0, 0.0]).unwrap();
        assert_eq!(prediction.confidences, vec![0.5, 0.5]);
    }

    #[test]
    fn test_tie_goes_to_lower_class() {
        let mut knn = KnnClassifier::new(3, 2);
        knn.add_example(&array![0.0, 1.0], 2).unwrap();
        knn.add_example(&array![1.0, 0.0], 1).unwrap();

        // 一票对一票
        let prediction = knn.classify(&array![0.0, 1.0]).unwrap();
        assert_eq!(prediction.class_index, 1);
        assert_eq!(prediction.confidences, vec![0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        // 相同样本分数相同，k=1 时选训练矩阵中靠前的那行
        let mut knn = KnnClassifier::new(2, 1);
        knn.add_example(&array![1.0, 0.0], 1).unwrap();
        knn.add_example(&array![1.0, 0.0], 0).unwrap();

        let prediction = knn.classify(&array![1.0, 0.0]).unwrap();
        assert_eq!(prediction.class_index, 0);

        assert_eq!(top_k_indices(&[0.5, 0.9, 0.5, 0.9], 3), vec![1, 3, 0]);
    }

    #[test]
    fn test_nan_scores_rank_last() {
        assert_eq!(top_k_indices(&[f32::NAN, 0.2, f32::NAN, 0.7], 3), vec![3, 1, 0]);
        assert_eq!(top_k_indices(&[-0.0, 0.0, 0.0], 3), vec![0, 1, 2]);
    }

    #[test]
    fn test_nan_examples_do_not_break_classify() {
        let mut knn = KnnClassifier::new(2, 3);
        for i in 0..64 {
            if i % 3 == 0 {
                knn.add_example(&array![f32::NAN, 1.0], 1).unwrap();
            } else {
                knn.add_example(&array![1.0, 0.5], 0).unwrap();
            }
        }
        knn.add_example(&array![f32::INFINITY, 0.0], 1).unwrap();

        let prediction = knn.classify(&array![1.0, 0.5]).unwrap();
        assert_eq!(prediction.confidences.len(), 2);

        knn.clear_class(1).unwrap();
        let prediction = knn.classify(&array![1.0, 0.5]).unwrap();
        assert_eq!(prediction.class_index, 0);
        assert_eq!(prediction.confidences, vec![1.0, 0.0]);
    }

    #[test]
    fn test_cleared_class_excluded() {
        let mut knn = KnnClassifier::new(2, 1);
        knn.add_example(&array![1.0, 0.0], 0).unwrap();
        knn.add_example(&array![0.0, 1.0], 1).unwrap();
        knn.clear_class(0).unwrap();

        let prediction = knn.classify(&array![1.0, 0.0]).unwrap();
        assert_eq!(prediction.class_index, 1);
        assert_eq!(prediction.confidences, vec![0.0, 1.0]);
    }

    #[test]
    fn test_export_load_round_trip() {
        let mut knn = KnnClassifier::new(2, 3);
        for v in [[1.0, 0.2], [0.8, 0.1], [0.9, 0.3]] {
            knn.add_example(&Array1::from_vec(v.to_vec()), 0).unwrap();
        }
        for v in [[0.1, 1.0], [0.2, 0.7]] {
            knn.add_example(&Array1::from_vec(v.to_vec()), 1).unwrap();
        }
        let query = array![0.6, 0.4];
        let expected = knn.classify(&query).unwrap();

        let class0 = knn.export_examples(0).unwrap().unwrap();
        let class1 = knn.export_examples(1).unwrap().unwrap();

        let mut restored = KnnClassifier::new(2, 3);
        restored.load_examples(class0, 0).unwrap();
        restored.load_examples(class1, 1).unwrap();

        assert_eq!(restored.class_example_counts(), knn.class_example_counts());
        assert_eq!(restored.classify(&query).unwrap(), expected);
    }

    #[test]
    fn test_dimension_mismatch_on_query() {
        let mut knn = KnnClassifier::new(1, 1);
        knn.add_example(&array![1.0, 0.0], 0).unwrap();
        assert!(matches!(
            knn.classify(&array![1.0, 0.0, 0.0]),
            Err(TeachableError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }
}
