//! 构件生成管线：分析 → 加工 → HTML 产出
//!
//! 仪表盘走三段推理：可视化建议（分析）、数据加工（设计）、HTML 生成；
//! 组件复用同一管线但限定单图。报告是一段业务分析 prompt 直接产出完整 HTML。
//! 产物统一经 ArtifactStore 落盘，文件事件推给客户端。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::core::SleuthError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::orchestrate::{DatasetAccumulator, EventSink, StreamEvent};

use super::store::{ArtifactKind, ArtifactStore};

/// 可视化类型清单，嵌入分析 prompt
const VISUALIZATION_TYPES: &[&str] = &[
    "pie_chart",
    "bar_chart",
    "line_chart",
    "table",
    "metric_card",
];

/// 构件生成接口：执行器与会话循环通过此 trait 派发（测试可替换）
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    /// 用累积数据集生成仪表盘（或单个组件），事件流里推送进度与文件名
    async fn build_dashboard(
        &self,
        user_query: &str,
        datasets: &DatasetAccumulator,
        is_single_widget: bool,
        events: &EventSink,
    ) -> Result<(), SleuthError>;

    /// 基于合并后的智能体回复生成业务分析 HTML 报告
    async fn build_report(
        &self,
        user_query: &str,
        combined_response: &str,
        events: &EventSink,
    ) -> Result<(), SleuthError>;
}

/// 生产实现：推理服务 + 文件存储
pub struct LlmArtifactBuilder {
    llm: Arc<dyn LlmClient>,
    store: Arc<ArtifactStore>,
}

impl LlmArtifactBuilder {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<ArtifactStore>) -> Self {
        Self { llm, store }
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, SleuthError> {
        let messages = vec![Message::system(system), Message::user(user)];
        self.llm
            .complete(&messages)
            .await
            .map_err(SleuthError::Llm)
    }
}

/// 去掉 LLM 偶尔包在 HTML 外的 ``` 代码栅栏
fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("html").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn analyzer_system_prompt() -> String {
    format!(
        r#"You are an expert data analyst and visualization specialist. Your role is to:
1. **Analyze Collected Data**: Examine data that has been collected from database sources
2. **Identify Patterns**: Find meaningful patterns, trends, and insights in the data
3. **Suggest Visualizations**: Recommend appropriate chart types based on data characteristics.
4. **Consider User Intent**: Match visualizations to the user's query and goals
**Available Visualization Types:**
{}
**Output Format:**
Return a JSON object with the following structure:
{{
    "suggested_visualizations": [
        {{
            "dataset_index": 0,
            "visualization_type": "chart_type_from_list_above",
            "rationale": "Why this chart type is appropriate for this data",
            "insights": "What insights this visualization could reveal"
        }}
    ],
    "data_summary": "Brief summary of what the data shows"
}}
Return only valid JSON - no additional text or explanations."#,
        serde_json::to_string_pretty(VISUALIZATION_TYPES).unwrap_or_default()
    )
}

const DESIGNER_SYSTEM_PROMPT: &str = r#"You are a senior data analyst and dashboard designer. Your role is to:
1. **Process Collected Data**: Transform raw data into appropriate formats for visualization
2. **Validate Data Quality**: Ensure data is clean, complete, and suitable for visualization. Fix bad or incorrect json in the data
3. **Prepare Visualization Data**: Structure data according to chart requirements
4. **Handle Edge Cases**: Manage empty data, outliers, and data type mismatches
**Output Format:**
Return a JSON object with the following structure:
{
    "processed_datasets": [
        {
            "dataset_index": 0,
            "visualization_type": "chart_type",
            "data": [
                { "label": "value", "value": "value" }
            ],
            "summary": "Brief summary of the processed data"
        }
    ],
    "dashboard_title": "Dashboard Title",
    "dashboard_description": "Brief description of the dashboard"
}
Return only valid JSON - no additional text."#;

const HTML_GENERATOR_SYSTEM_PROMPT: &str = r#"You are a frontend engineer creating dashboards. Your role is to:
1. **Generate Simple HTML Dashboard**: Create a basic, functional HTML dashboard
2. **Basic Styling**: Use Tailwind CSS for clean, simple design
**Requirements:**
- Use Chart.js (via CDN) for charts
- Use HTML tables for detailed data
- Use Tailwind CSS (via CDN) for basic styling
- Simple card layout - one chart/table per card
- Minimal, clean design
- Include a meaningful <title> tag describing the dashboard content
**Important:**
- Return only a complete, valid HTML document - no explanations"#;

const WIDGET_GENERATOR_SYSTEM_PROMPT: &str = r#"You are a frontend engineer creating widgets. Your role is to:
1. **Generate Simple HTML Widget**: Create a basic, functional HTML Widget
2. **Basic Styling**: Use Tailwind CSS for clean, simple design
**Requirements:**
- Use Chart.js (via CDN) as a charting library
- Use Tailwind CSS (via CDN) for basic styling
- Include a meaningful <title> tag describing the widget content
**Important:**
- MANDATORY: Return only a complete, valid HTML document - no explanations
- MANDATORY: You will only create a single widget at a time.
- MANDATORY: Focus on functionality over fancy features"#;

const REPORT_SYSTEM_PROMPT: &str = r#"You are a business analyst whose role is to provide actionable insights and recommendations based on data analysis.
**OUTPUT REQUIREMENTS**:
1. **Executive Summary**: Provide a concise overview of key findings.
2. **Key Insights**: Extract the most important data points and what they mean for the business
3. **Actionable Recommendations**: Specific steps the business can take based on the data
4. **Risk Assessment**: Identify any concerning trends or issues that need attention
**OUTPUT FORMAT**: Complete HTML5 document, responsive, inline CSS only, professional typography,
card-based layout, 2-3 Chart.js visualizations via CDN, meaningful <title> tag.
**STRICT GUIDELINES**:
- DO NOT ask follow-up questions - work with the data provided
- DO NOT request additional context - analyze what you have
- Quantify impact where possible using the available data
- Generate complete, valid HTML that can be saved and opened in any browser
Provide ONLY the complete HTML code - no explanatory text before or after."#;

#[async_trait]
impl ArtifactBuilder for LlmArtifactBuilder {
    async fn build_dashboard(
        &self,
        user_query: &str,
        datasets: &DatasetAccumulator,
        is_single_widget: bool,
        events: &EventSink,
    ) -> Result<(), SleuthError> {
        let label = if is_single_widget {
            "Widget"
        } else {
            "Dashboard"
        };
        events.emit(StreamEvent::thinking(format!(
            "Collected data from {} datasets",
            datasets.len()
        )));
        if datasets.is_empty() {
            return Err(SleuthError::Artifact(
                "No data found in the databases. Please check your data sources or try a different query."
                    .to_string(),
            ));
        }
        let data_block = datasets.as_prompt_block();

        events.emit(StreamEvent::thinking(
            "Analyzing data and suggesting visualizations...",
        ));
        let suggestions = self
            .complete(
                &analyzer_system_prompt(),
                format!(
                    "Analyze this collected data and suggest appropriate visualizations:\n{}",
                    data_block
                ),
            )
            .await?;

        events.emit(StreamEvent::thinking("Adapting visualizations to your data..."));
        let processed = self
            .complete(
                DESIGNER_SYSTEM_PROMPT,
                format!(
                    "Process this data for visualization:\n{}\n\nWith these visualization suggestions:\n{}",
                    data_block, suggestions
                ),
            )
            .await?;

        events.emit(StreamEvent::thinking(format!(
            "Generating interactive {}...",
            label.to_lowercase()
        )));
        let system = if is_single_widget {
            WIDGET_GENERATOR_SYSTEM_PROMPT
        } else {
            HTML_GENERATOR_SYSTEM_PROMPT
        };
        let raw = self
            .complete(
                system,
                format!(
                    "Create a {} for this user query: {}\nUsing this processed data:\n{}",
                    label.to_lowercase(),
                    user_query,
                    processed
                ),
            )
            .await?;
        let html = strip_code_fence(&raw);

        let kind = if is_single_widget {
            ArtifactKind::Widget
        } else {
            ArtifactKind::Dashboard
        };
        let file_name = self.store.save(kind, html)?;

        events.emit(StreamEvent::content_final(format!(
            "{} generated successfully!",
            label
        )));
        events.emit(StreamEvent::dashboard_file(
            &file_name,
            json!({
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "user_query": user_query,
                "dataset_count": datasets.len(),
            }),
        ));
        Ok(())
    }

    async fn build_report(
        &self,
        user_query: &str,
        combined_response: &str,
        events: &EventSink,
    ) -> Result<(), SleuthError> {
        let raw = self
            .complete(
                REPORT_SYSTEM_PROMPT,
                format!(
                    "Analyze the following data and provide a clear, actionable summary: {}",
                    combined_response
                ),
            )
            .await?;
        let html = strip_code_fence(&raw);

        // 落盘失败只记日志，HTML 照常推给客户端
        if let Err(e) = self.store.save(ArtifactKind::Report, html) {
            tracing::error!(error = %e, "saving generated report failed");
        }

        events.emit(StreamEvent::html_content(
            html,
            "Data Analysis Report",
            json!({
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "query": user_query,
            }),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use tokio::sync::mpsc;

    fn builder_with(replies: Vec<&str>) -> (LlmArtifactBuilder, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path()).unwrap());
        let llm = Arc::new(ScriptedLlm::new(replies));
        (LlmArtifactBuilder::new(llm, store), dir)
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(
            strip_code_fence("```html\n<html></html>\n```"),
            "<html></html>"
        );
        assert_eq!(strip_code_fence("<html></html>"), "<html></html>");
    }

    #[tokio::test]
    async fn test_dashboard_requires_datasets() {
        let (builder, _dir) = builder_with(vec!["unused"]);
        let datasets = DatasetAccumulator::new();
        let result = builder
            .build_dashboard("q", &datasets, false, &EventSink::null())
            .await;
        assert!(matches!(result, Err(SleuthError::Artifact(_))));
    }

    #[tokio::test]
    async fn test_dashboard_pipeline_saves_and_emits_file_event() {
        let (builder, dir) = builder_with(vec![
            r#"{"suggested_visualizations": []}"#,
            r#"{"processed_datasets": [], "dashboard_title": "Fleet"}"#,
            "<html><head><title>Fleet</title></head><body></body></html>",
        ]);
        let mut datasets = DatasetAccumulator::new();
        datasets.push(serde_json::json!({ "data": [{ "label": "x", "value": 1 }] }));

        let (tx, mut rx) = mpsc::unbounded_channel();
        builder
            .build_dashboard("show fleet", &datasets, false, &EventSink::new(tx))
            .await
            .unwrap();

        let mut saw_file_event = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev.kind, crate::orchestrate::EventKind::DashboardFile) {
                saw_file_event = true;
                assert!(ev.content.unwrap().starts_with("Fleet_"));
            }
        }
        assert!(saw_file_event);
        let saved = std::fs::read_dir(dir.path().join("generated_dashboards"))
            .unwrap()
            .count();
        assert_eq!(saved, 1);
    }

    #[tokio::test]
    async fn test_report_streams_html_content() {
        let (builder, dir) = builder_with(vec![
            "<html><head><title>Analysis</title></head><body>report</body></html>",
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        builder
            .build_report("q", "**Mysql Response:**\n12", &EventSink::new(tx))
            .await
            .unwrap();

        let mut saw_html = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev.kind, crate::orchestrate::EventKind::HtmlContent) {
                saw_html = true;
                assert_eq!(ev.title.as_deref(), Some("Data Analysis Report"));
            }
        }
        assert!(saw_html);
        let saved = std::fs::read_dir(dir.path().join("generated_reports"))
            .unwrap()
            .count();
        assert_eq!(saved, 1);
    }
}
