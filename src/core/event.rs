//! 会话事件
//!
//! 会话通过事件通道把样本数、置信度、分类结果等推给 UI 层

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ErrorCode;

/// 会话事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 提取器已就绪
    Ready,
    /// 各标签样本数 (按类别序)
    SampleCounts { labels: Vec<String>, counts: Vec<usize> },
    /// 各标签置信度 (按类别序)
    Confidences { labels: Vec<String>, confidences: Vec<f32> },
    /// 当前分类结果，没有时为空串
    Classification { label: String },
    /// 保存的模型 (JSON 数组)
    SavedModel { label: String, model: String },
    /// 模型加载完成
    DoneLoadingModel { label: String },
    /// 错误
    Error { code: i32, label: String },
}

impl SessionEvent {
    pub fn error(code: ErrorCode, label: impl Into<String>) -> Self {
        Self::Error {
            code: code.code(),
            label: label.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// 事件发送端，未设置通道时丢弃事件
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json() {
        let event = SessionEvent::Classification { label: "cat".into() };
        assert_eq!(event.to_json().unwrap(), r#"{"type":"classification","label":"cat"}"#);

        let event = SessionEvent::error(ErrorCode::NoMoreAvailableClasses, "dog");
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"type":"error","code":-2,"label":"dog"}"#
        );
    }

    #[test]
    fn test_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        sink.emit(SessionEvent::Ready);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Ready);

        // 没有通道时不报错
        EventSink::default().emit(SessionEvent::Ready);
    }
}
