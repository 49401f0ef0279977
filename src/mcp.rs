//! Maintenance commands served as MCP tools over stdio.

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use serde_json::Value;

use eoka_watch::{Maintenance, MaintenanceReport};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ItemRequest {
    #[schemars(description = "Item id; omit to target the item currently shown")]
    #[serde(default)]
    pub item_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn err(e: impl std::fmt::Display) -> ErrorData {
    ErrorData::internal_error(e.to_string(), None::<Value>)
}

fn report_ok(report: MaintenanceReport) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(report.message)]))
}

#[derive(Clone)]
pub struct MaintenanceServer {
    maintenance: Maintenance,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MaintenanceServer {
    pub fn new(maintenance: Maintenance) -> Self {
        Self {
            maintenance,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Clear the processed flag of one item so it can be acted on again.")]
    async fn clear_processed(
        &self,
        req: Parameters<ItemRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let report = self
            .maintenance
            .clear_processed(req.0.item_id.as_deref())
            .map_err(err)?;
        report_ok(report)
    }

    #[tool(description = "Clear every processed flag in this session.")]
    async fn clear_all_processed(&self) -> Result<CallToolResult, ErrorData> {
        report_ok(self.maintenance.clear_all_processed())
    }

    #[tool(description = "Clear the cooldown of one item.")]
    async fn clear_rate_limit(
        &self,
        req: Parameters<ItemRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let report = self
            .maintenance
            .clear_rate_limit(req.0.item_id.as_deref())
            .map_err(err)?;
        report_ok(report)
    }

    #[tool(description = "Clear every cooldown in this session.")]
    async fn clear_all_rate_limits(&self) -> Result<CallToolResult, ErrorData> {
        report_ok(self.maintenance.clear_all_rate_limits())
    }

    #[tool(description = "Show ledger counts and the item currently shown.")]
    async fn status(&self) -> Result<CallToolResult, ErrorData> {
        report_ok(self.maintenance.status())
    }
}

#[tool_handler]
impl ServerHandler for MaintenanceServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "eoka-watch".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Maintenance for a running watch session. 'status' shows ledger counts, \
                 'clear_processed' / 'clear_rate_limit' reset one item (the current one when \
                 item_id is omitted), and the clear_all_* tools reset the whole session."
                    .into(),
            ),
        }
    }
}

pub async fn run_server(maintenance: Maintenance) -> anyhow::Result<()> {
    use rmcp::ServiceExt;

    let server = MaintenanceServer::new(maintenance);
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
