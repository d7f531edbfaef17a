//! 示教会话
//!
//! 会话持有分类器、提取器和标签映射，是 UI 层唯一需要的对象：
//! 1. 按住训练按钮 → `start_training(label)`，每帧采集一个样本
//! 2. 每帧 → `observe` 提取 embedding (训练 + 分类)，`apply` 更新置信度并推送事件
//! 3. 保存 / 加载 → 单个标签的样本矩阵序列化为 JSON 数组

use std::collections::HashMap;

use ndarray::Array2;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::buffer::frame::Frame;
use crate::config::TeachableConfig;
use crate::core::classifier::{KnnClassifier, Prediction};
use crate::core::event::{EventSink, SessionEvent};
use crate::core::extractor::EmbeddingExtractor;
use crate::core::labels::LabelMap;
use crate::core::snapshot::{self, ClassSnapshot, SessionSnapshot};
use crate::error::{Result, TeachableError};

/// 一帧的处理结果，由 `apply` 提交
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    /// 帧时间戳
    pub timestamp: f64,
    /// 本帧训练的类别
    pub trained: Option<usize>,
    /// 分类结果 (还没有样本时为 None)
    pub prediction: Option<Prediction>,
}

/// 会话统计
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub labels: usize,
    pub available_slots: usize,
    pub total_examples: usize,
    pub training: Option<String>,
    pub classification: Option<String>,
}

/// 示教会话
pub struct TeachableSession {
    config: TeachableConfig,
    classifier: KnnClassifier,
    extractor: Box<dyn EmbeddingExtractor>,
    labels: LabelMap,
    /// 正在训练的类别
    training: Option<usize>,
    /// 最近一次分类的置信度 (按类别)
    confidences: HashMap<usize, f32>,
    /// 最近一次分类结果
    top_choice: Option<usize>,
    events: EventSink,
}

impl TeachableSession {
    pub fn new(config: TeachableConfig, extractor: Box<dyn EmbeddingExtractor>) -> Self {
        let classifier = KnnClassifier::new(config.num_classes, config.top_k)
            .with_squash_denominator(config.squash_denominator);
        let labels = LabelMap::new(config.num_classes);

        Self {
            config,
            classifier,
            extractor,
            labels,
            training: None,
            confidences: HashMap::new(),
            top_choice: None,
            events: EventSink::default(),
        }
    }

    /// 设置事件通道
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn config(&self) -> &TeachableConfig {
        &self.config
    }

    pub fn classifier(&self) -> &KnnClassifier {
        &self.classifier
    }

    /// 加载提取器
    pub fn load(&mut self) -> Result<()> {
        self.extractor.load(self.config.image_size)?;
        info!("TeachableSession 就绪: {} 个类别", self.config.num_classes);
        self.events.emit(SessionEvent::Ready);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.extractor.is_ready()
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.extractor.is_ready() {
            return Err(TeachableError::NotReady("extractor not loaded"));
        }
        Ok(())
    }

    // ============================================================
    // 帧处理
    // ============================================================

    /// 提取 embedding，按需训练，有样本时分类
    ///
    /// 只修改样本，不提交置信度；结果由 `apply` 提交。
    pub fn observe(&mut self, frame: &Frame) -> Result<FrameOutcome> {
        self.ensure_ready()?;

        let image = frame.to_tensor(self.config.image_size)?;
        let embedding = self.extractor.embed(&image)?;

        let mut trained = None;
        if let Some(class) = self.training {
            if self.classifier.class_example_counts()[class] < self.config.max_examples {
                self.classifier.add_example(&embedding, class)?;
                trained = Some(class);
                self.emit_sample_counts();
            }
        }

        let prediction = if self.classifier.total_examples() > 0 {
            Some(self.classifier.classify(&embedding)?)
        } else {
            None
        };

        Ok(FrameOutcome {
            timestamp: frame.timestamp,
            trained,
            prediction,
        })
    }

    /// 提交分类结果并推送置信度和分类事件
    pub fn apply(&mut self, outcome: FrameOutcome) {
        let Some(prediction) = outcome.prediction else {
            return;
        };

        // 有标签的类别都记录，样本为空的类别记为 0
        for (class, _) in self.labels.entries() {
            let confidence = prediction.confidences.get(class).copied().unwrap_or(0.0);
            self.confidences.insert(class, confidence);
        }
        self.top_choice = Some(prediction.class_index);

        debug!(
            "t={:.3} 分类: {:?} {:?}",
            outcome.timestamp,
            self.classification(),
            prediction.confidences
        );

        self.emit_confidences();
        self.emit_classification();
    }

    /// `observe` + `apply`
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Option<Prediction>> {
        let outcome = self.observe(frame)?;
        let prediction = outcome.prediction.clone();
        self.apply(outcome);
        Ok(prediction)
    }

    // ============================================================
    // 训练控制
    // ============================================================

    /// 开始训练标签，新标签占用最小的空闲类别槽
    pub fn start_training(&mut self, label: &str) -> Result<usize> {
        let class = self.assign(label)?;
        self.training = Some(class);
        debug!("开始训练 {} (类别 {})", label, class);
        Ok(class)
    }

    pub fn stop_training(&mut self) {
        self.training = None;
    }

    /// 正在训练的标签
    pub fn training_label(&self) -> Option<&str> {
        self.training.and_then(|c| self.labels.label_of(c))
    }

    /// 清除标签及其样本，释放类别槽
    pub fn clear(&mut self, label: &str) -> Result<()> {
        let class = self.lookup(label)?;

        if self.training == Some(class) {
            self.stop_training();
        }
        self.classifier.clear_class(class)?;
        self.labels.remove(label)?;
        self.confidences.remove(&class);
        if self.top_choice == Some(class) {
            self.top_choice = None;
        }
        info!("已清除标签 {} (类别 {})", label, class);

        self.emit_sample_counts();
        self.emit_confidences();
        self.emit_classification();
        Ok(())
    }

    // ============================================================
    // 查询
    // ============================================================

    pub fn sample_count(&self, label: &str) -> Result<usize> {
        let class = self.labels.class_of(label)?;
        Ok(self.classifier.class_example_counts()[class])
    }

    /// 最近一次分类中该标签的置信度，还没分类过时为 None
    pub fn confidence(&self, label: &str) -> Result<Option<f32>> {
        let class = self.labels.class_of(label)?;
        Ok(self.confidences.get(&class).copied())
    }

    /// 最近一次分类的标签
    pub fn classification(&self) -> Option<&str> {
        self.top_choice.and_then(|c| self.labels.label_of(c))
    }

    /// (标签, 样本数)，按类别序
    pub fn list_sample_counts(&self) -> (Vec<String>, Vec<usize>) {
        let counts = self.classifier.class_example_counts();
        self.labels
            .entries()
            .into_iter()
            .map(|(class, label)| (label.to_string(), counts[class]))
            .unzip()
    }

    /// (标签, 置信度)，按类别序；还没分类过的标签不列出
    pub fn list_confidences(&self) -> (Vec<String>, Vec<f32>) {
        self.labels
            .entries()
            .into_iter()
            .filter_map(|(class, label)| {
                self.confidences
                    .get(&class)
                    .map(|&confidence| (label.to_string(), confidence))
            })
            .unzip()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            labels: self.labels.len(),
            available_slots: self.labels.available_slots(),
            total_examples: self.classifier.total_examples(),
            training: self.training_label().map(str::to_string),
            classification: self.classification().map(str::to_string),
        }
    }

    // ============================================================
    // 保存 / 加载
    // ============================================================

    /// 导出标签的样本为 JSON 数组
    pub fn save_model(&mut self, label: &str) -> Result<String> {
        let class = self.lookup(label)?;
        let rows = self.classifier.export_examples(class)?;
        let model = snapshot::encode_rows(rows.as_ref())?;

        self.events.emit(SessionEvent::SavedModel {
            label: label.to_string(),
            model: model.clone(),
        });
        Ok(model)
    }

    /// 从 JSON 数组恢复标签的样本，行宽为提取器输出维度
    pub fn load_model(&mut self, label: &str, model: &str) -> Result<()> {
        self.ensure_ready()?;
        let rows = snapshot::decode_rows(model, self.extractor.dim())?;
        let count = rows.nrows();

        let is_new = self.labels.class_of(label).is_err();
        let class = self.assign(label)?;
        if let Err(e) = self.classifier.load_examples(rows, class) {
            if is_new {
                self.labels.remove(label)?;
            }
            return Err(e);
        }
        info!("标签 {} 载入 {} 个样本", label, count);

        self.emit_sample_counts();
        self.events.emit(SessionEvent::DoneLoadingModel {
            label: label.to_string(),
        });
        Ok(())
    }

    /// 所有标签的样本
    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        if self.labels.is_empty() {
            return Ok(SessionSnapshot::default());
        }
        let mut classes = Vec::with_capacity(self.labels.len());
        for (class, label) in self.labels.entries() {
            let rows = self.classifier.export_examples(class)?;
            let dim = rows
                .as_ref()
                .map(|m| m.ncols())
                .unwrap_or_else(|| self.extractor.dim());
            classes.push(ClassSnapshot {
                label: label.to_string(),
                dim,
                values: rows.map(|m| m.iter().copied().collect()).unwrap_or_default(),
            });
        }
        Ok(SessionSnapshot { classes })
    }

    /// 从快照恢复，已有的同名标签会被覆盖
    ///
    /// 先检查行宽和类别槽，全部通过才写入；失败时会话不变。
    pub fn restore(&mut self, saved: SessionSnapshot) -> Result<()> {
        self.ensure_ready()?;
        let dim = self.extractor.dim();

        let mut pending: Vec<(String, Array2<f32>)> = Vec::with_capacity(saved.classes.len());
        let mut new_labels = 0;
        for class_snapshot in saved.classes {
            if class_snapshot.dim != dim {
                return Err(TeachableError::DimensionMismatch {
                    expected: dim,
                    actual: class_snapshot.dim,
                });
            }
            let is_new = self.labels.class_of(&class_snapshot.label).is_err()
                && !pending.iter().any(|(label, _)| *label == class_snapshot.label);
            if is_new {
                new_labels += 1;
                if new_labels > self.labels.available_slots() {
                    return Err(self.report(TeachableError::NoAvailableSlots(
                        class_snapshot.label,
                    )));
                }
            }
            debug!("快照标签 {}: {} 个样本", class_snapshot.label, class_snapshot.rows());
            let rows = snapshot::rows_from_vec(class_snapshot.values, dim)?;
            pending.push((class_snapshot.label, rows));
        }

        for (label, rows) in pending {
            let class = self.assign(&label)?;
            self.classifier.load_examples(rows, class)?;
        }
        info!("已从快照恢复 {} 个标签", self.labels.len());
        self.emit_sample_counts();
        Ok(())
    }

    /// 清空所有样本和标签
    pub fn reset(&mut self) {
        self.classifier.reset();
        self.labels.clear();
        self.training = None;
        self.confidences.clear();
        self.top_choice = None;
        info!("会话已重置");
    }

    // ============================================================
    // 内部
    // ============================================================

    fn assign(&mut self, label: &str) -> Result<usize> {
        self.labels.get_or_assign(label).map_err(|e| self.report(e))
    }

    fn lookup(&self, label: &str) -> Result<usize> {
        self.labels.class_of(label).map_err(|e| self.report(e))
    }

    /// 标签错误推送给 UI，再原样返回
    fn report(&self, err: TeachableError) -> TeachableError {
        let label = match &err {
            TeachableError::LabelNotFound(label) | TeachableError::NoAvailableSlots(label) => {
                label.clone()
            }
            _ => return err,
        };
        if let Some(code) = err.error_code() {
            warn!("{}", err);
            self.events.emit(SessionEvent::error(code, label));
        }
        err
    }

    fn emit_sample_counts(&self) {
        let (labels, counts) = self.list_sample_counts();
        self.events.emit(SessionEvent::SampleCounts { labels, counts });
    }

    fn emit_confidences(&self) {
        let (labels, confidences) = self.list_confidences();
        self.events.emit(SessionEvent::Confidences { labels, confidences });
    }

    fn emit_classification(&self) {
        let label = self.classification().unwrap_or_default().to_string();
        self.events.emit(SessionEvent::Classification { label });
    }
}
