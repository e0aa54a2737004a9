//! JSON-RPC 协议连接：open / list_tools / invoke

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::core::SleuthError;

/// 工具元数据（tools/list 的单项）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

/// 工具服务端的连接参数：HTTP 端点或子进程命令
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Http {
        url: String,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

enum Transport {
    Http {
        client: reqwest::Client,
        url: String,
    },
    Stdio {
        _child: Child,
        stdin: ChildStdin,
        stdout: BufReader<ChildStdout>,
    },
}

/// 一次性协议连接：每个执行步骤打开一个，步骤结束即丢弃
pub struct ToolConnection {
    transport: Transport,
    next_id: u64,
}

impl ToolConnection {
    pub async fn open(endpoint: &Endpoint) -> Result<Self, SleuthError> {
        let transport = match endpoint {
            Endpoint::Http { url } => Transport::Http {
                client: reqwest::Client::new(),
                url: url.clone(),
            },
            Endpoint::Stdio { command, args } => {
                let mut child = Command::new(command)
                    .args(args)
                    .stdin(std::process::Stdio::piped())
                    .stdout(std::process::Stdio::piped())
                    .stderr(std::process::Stdio::null())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| {
                        SleuthError::Protocol(format!("spawn {} failed: {}", command, e))
                    })?;
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| SleuthError::Protocol("child stdin unavailable".into()))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| SleuthError::Protocol("child stdout unavailable".into()))?;
                Transport::Stdio {
                    _child: child,
                    stdin,
                    stdout: BufReader::new(stdout),
                }
            }
        };
        Ok(Self {
            transport,
            next_id: 0,
        })
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, SleuthError> {
        self.next_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.next_id,
            "method": method,
            "params": params,
        });

        let reply: Value = match &mut self.transport {
            Transport::Http { client, url } => client
                .post(url.as_str())
                .json(&request)
                .send()
                .await
                .map_err(|e| SleuthError::Protocol(e.to_string()))?
                .json()
                .await
                .map_err(|e| SleuthError::Protocol(e.to_string()))?,
            Transport::Stdio { stdin, stdout, .. } => {
                let line = serde_json::to_string(&request)
                    .map_err(|e| SleuthError::Protocol(e.to_string()))?;
                stdin
                    .write_all(line.as_bytes())
                    .await
                    .map_err(|e| SleuthError::Protocol(e.to_string()))?;
                stdin
                    .write_all(b"\n")
                    .await
                    .map_err(|e| SleuthError::Protocol(e.to_string()))?;
                stdin
                    .flush()
                    .await
                    .map_err(|e| SleuthError::Protocol(e.to_string()))?;

                let mut buf = String::new();
                let n = stdout
                    .read_line(&mut buf)
                    .await
                    .map_err(|e| SleuthError::Protocol(e.to_string()))?;
                if n == 0 {
                    return Err(SleuthError::Protocol("tool server closed stdout".into()));
                }
                serde_json::from_str(&buf).map_err(|e| SleuthError::Protocol(e.to_string()))?
            }
        };

        if let Some(err) = reply.get("error") {
            return Err(SleuthError::Protocol(format!("{} error: {}", method, err)));
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }

    /// 枚举工具列表（每次连接打开后调用一次）
    pub async fn list_tools(&mut self) -> Result<Vec<ToolSpec>, SleuthError> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result.get("tools").cloned().unwrap_or(result);
        serde_json::from_value(tools).map_err(|e| SleuthError::Protocol(e.to_string()))
    }

    /// 调用指定工具，返回文本化结果
    pub async fn invoke(&mut self, tool: &str, args: Value) -> Result<String, SleuthError> {
        let result = self
            .request("tools/call", json!({ "name": tool, "arguments": args }))
            .await?;
        Ok(extract_text(&result))
    }
}

/// 从 tools/call 的 result 中取出文本：content 数组的 text 字段拼接，或退化为整体序列化
pub fn extract_text(result: &Value) -> String {
    if let Some(content) = result.get("content").and_then(|c| c.as_array()) {
        let parts: Vec<&str> = content
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect();
        if !parts.is_empty() {
            return parts.join("\n");
        }
    }
    if let Some(s) = result.as_str() {
        return s.to_string();
    }
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_from_content_array() {
        let result = json!({
            "content": [
                { "type": "text", "text": "row1" },
                { "type": "text", "text": "row2" }
            ]
        });
        assert_eq!(extract_text(&result), "row1\nrow2");
    }

    #[test]
    fn test_extract_text_plain_string() {
        assert_eq!(extract_text(&json!("hello")), "hello");
    }

    #[test]
    fn test_extract_text_fallback_serializes() {
        let result = json!({ "rows": 3 });
        assert_eq!(extract_text(&result), r#"{"rows":3}"#);
    }

    #[test]
    fn test_endpoint_deserializes_both_shapes() {
        let http: Endpoint = serde_json::from_value(json!({ "url": "http://x/rpc" })).unwrap();
        assert!(matches!(http, Endpoint::Http { .. }));
        let stdio: Endpoint =
            serde_json::from_value(json!({ "command": "srv", "args": ["--db", "main"] })).unwrap();
        assert!(matches!(stdio, Endpoint::Stdio { .. }));
    }
}
