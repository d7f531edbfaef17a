//! 标签与类别槽的双向映射

use std::collections::{BTreeSet, HashMap};

use crate::error::{Result, TeachableError};

/// 标签 ↔ 类别槽
///
/// 空闲槽按序号从小到大分配，释放后回到池中。
#[derive(Debug, Clone)]
pub struct LabelMap {
    label_to_class: HashMap<String, usize>,
    class_to_label: HashMap<usize, String>,
    available: BTreeSet<usize>,
}

impl LabelMap {
    pub fn new(num_classes: usize) -> Self {
        Self {
            label_to_class: HashMap::new(),
            class_to_label: HashMap::new(),
            available: (0..num_classes).collect(),
        }
    }

    /// 查找标签，不存在则分配最小的空闲槽
    pub fn get_or_assign(&mut self, label: &str) -> Result<usize> {
        if let Some(&class) = self.label_to_class.get(label) {
            return Ok(class);
        }

        let class = self
            .available
            .pop_first()
            .ok_or_else(|| TeachableError::NoAvailableSlots(label.to_string()))?;
        self.label_to_class.insert(label.to_string(), class);
        self.class_to_label.insert(class, label.to_string());
        Ok(class)
    }

    pub fn class_of(&self, label: &str) -> Result<usize> {
        self.label_to_class
            .get(label)
            .copied()
            .ok_or_else(|| TeachableError::LabelNotFound(label.to_string()))
    }

    pub fn label_of(&self, class: usize) -> Option<&str> {
        self.class_to_label.get(&class).map(String::as_str)
    }

    /// 删除标签并释放其类别槽
    pub fn remove(&mut self, label: &str) -> Result<usize> {
        let class = self
            .label_to_class
            .remove(label)
            .ok_or_else(|| TeachableError::LabelNotFound(label.to_string()))?;
        self.class_to_label.remove(&class);
        self.available.insert(class);
        Ok(class)
    }

    /// 按类别序列出 (类别, 标签)
    pub fn entries(&self) -> Vec<(usize, &str)> {
        let mut entries: Vec<_> = self
            .class_to_label
            .iter()
            .map(|(&class, label)| (class, label.as_str()))
            .collect();
        entries.sort_by_key(|(class, _)| *class);
        entries
    }

    pub fn len(&self) -> usize {
        self.label_to_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label_to_class.is_empty()
    }

    pub fn available_slots(&self) -> usize {
        self.available.len()
    }

    pub fn clear(&mut self) {
        let num_classes = self.label_to_class.len() + self.available.len();
        *self = Self::new(num_classes);
    }
}
