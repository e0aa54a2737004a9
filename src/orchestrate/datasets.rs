//! 数据集累积器：会话内按步骤顺序收集智能体回复中的结构化 JSON
//!
//! 构件生成（仪表盘/报告/组件）消费这里的数据；顺序即追加顺序，保证
//! Verifier 与构件管线看到确定性的视图。

use serde_json::Value;

/// 会话级数据集累积器
#[derive(Debug, Clone, Default)]
pub struct DatasetAccumulator {
    datasets: Vec<Value>,
}

impl DatasetAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个非空 JSON 对象；空对象丢弃（智能体没产出结构化数据）
    pub fn push(&mut self, value: Value) {
        match &value {
            Value::Object(map) if map.is_empty() => {}
            Value::Null => {}
            _ => self.datasets.push(value),
        }
    }

    pub fn datasets(&self) -> &[Value] {
        &self.datasets
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn clear(&mut self) {
        self.datasets.clear();
    }

    /// 全部数据集序列化为一段 JSON 文本，嵌入构件管线的 prompt
    pub fn as_prompt_block(&self) -> String {
        serde_json::to_string_pretty(&self.datasets).unwrap_or_else(|_| "[]".to_string())
    }
}
