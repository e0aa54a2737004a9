//! 工具调用协议客户端
//!
//! 每个外部数据源经由统一协议暴露 tools/list 与 tools/call 两个 JSON-RPC 方法；
//! 传输层支持 HTTP（请求/响应）与 stdio（常驻子进程、按行分帧）。
//! 连接按调用打开、用完即弃——不做连接池，用建连开销换取对有状态/崩溃过的
//! 工具服务端的鲁棒性。

pub mod client;

pub use client::{extract_text, Endpoint, ToolConnection, ToolSpec};
