//! Relay for productivity-tool actions through the MCP automation gateway.

use crate::error::{Result, SwitchboardError};
use crate::logging;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum McpTool {
    #[serde(rename = "google-drive")]
    GoogleDrive,
    #[serde(rename = "google-sheets")]
    GoogleSheets,
    #[serde(rename = "gmail")]
    Gmail,
}

impl McpTool {
    pub const ALL: [McpTool; 3] = [McpTool::GoogleDrive, McpTool::GoogleSheets, McpTool::Gmail];

    pub fn id(&self) -> &'static str {
        match self {
            McpTool::GoogleDrive => "google-drive",
            McpTool::GoogleSheets => "google-sheets",
            McpTool::Gmail => "gmail",
        }
    }

    pub fn from_id(id: &str) -> Option<McpTool> {
        McpTool::ALL.into_iter().find(|tool| tool.id() == id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            McpTool::GoogleDrive => "Google Drive",
            McpTool::GoogleSheets => "Google Sheets",
            McpTool::Gmail => "Gmail",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            McpTool::GoogleDrive => "Read and modify files in Google Drive",
            McpTool::GoogleSheets => "Add rows and modify spreadsheets",
            McpTool::Gmail => "Send and read emails",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            McpTool::GoogleDrive => "📁",
            McpTool::GoogleSheets => "📊",
            McpTool::Gmail => "📧",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveAction {
    ListFiles,
    GetFile,
    CreateFile,
    UpdateFile,
    DeleteFile,
    SearchFiles,
}

impl DriveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveAction::ListFiles => "list_files",
            DriveAction::GetFile => "get_file",
            DriveAction::CreateFile => "create_file",
            DriveAction::UpdateFile => "update_file",
            DriveAction::DeleteFile => "delete_file",
            DriveAction::SearchFiles => "search_files",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetsAction {
    AddRow,
    GetSheet,
    UpdateCell,
    CreateSheet,
}

impl SheetsAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetsAction::AddRow => "add_row",
            SheetsAction::GetSheet => "get_sheet",
            SheetsAction::UpdateCell => "update_cell",
            SheetsAction::CreateSheet => "create_sheet",
        }
    }
}

/// One relayed call. `tool` is a tool id such as `google-drive`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpAction {
    pub tool: String,
    pub action: String,
    pub parameters: Value,
}

impl McpAction {
    pub fn new(tool: McpTool, action: &str, parameters: Value) -> Self {
        Self {
            tool: tool.id().to_string(),
            action: action.to_string(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleDriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub modified_time: String,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub thumbnail_link: Option<String>,
}

/// `query` is left out entirely when absent.
pub fn list_files_parameters(query: Option<&str>) -> Value {
    match query {
        Some(query) => json!({ "query": query }),
        None => json!({}),
    }
}

/// `files` array of a Drive reply; missing or malformed means none.
fn files_from(result: &Value) -> Vec<GoogleDriveFile> {
    result
        .get("files")
        .cloned()
        .and_then(|files| serde_json::from_value(files).ok())
        .unwrap_or_default()
}

pub struct McpRelay {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    enabled: HashSet<McpTool>,
}

impl McpRelay {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            enabled: HashSet::new(),
        })
    }

    /// Flip a tool on or off. Returns the new state.
    pub fn toggle(&mut self, tool: McpTool) -> bool {
        if self.enabled.remove(&tool) {
            false
        } else {
            self.enabled.insert(tool);
            true
        }
    }

    pub fn is_enabled(&self, tool: McpTool) -> bool {
        self.enabled.contains(&tool)
    }

    pub fn endpoint(&self, tool: McpTool, action: &str) -> String {
        format!("{}/{}/{}", self.base_url, tool.id(), action)
    }

    /// Forward `action.parameters` to the gateway and return its JSON reply unchanged.
    pub async fn execute(&self, action: &McpAction) -> Result<Value> {
        let tool = McpTool::from_id(&action.tool)
            .ok_or_else(|| SwitchboardError::UnknownTool(action.tool.clone()))?;

        if !self.is_enabled(tool) {
            return Err(SwitchboardError::ToolDisabled(tool.id().to_string()));
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SwitchboardError::Config("ZAPIER_MCP_KEY is not configured".to_string()))?;

        logging::log_mcp(None, &format!("MCP action: tool={}, action={}", tool.id(), action.action));

        let response = self.client
            .post(self.endpoint(tool, &action.action))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&action.parameters)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            logging::log_error(None, &format!("{} failed with status {}", tool.name(), status));
            return Err(SwitchboardError::Api {
                status: status.as_u16(),
                message: format!("{} API error: {}", tool.name(), error_text),
            });
        }

        Ok(response.json().await?)
    }

    // ============ Google Drive ============

    pub async fn list_drive_files(&self, query: Option<&str>) -> Result<Vec<GoogleDriveFile>> {
        let action = McpAction::new(McpTool::GoogleDrive, DriveAction::ListFiles.as_str(), list_files_parameters(query));
        let result = self.execute(&action).await?;
        Ok(files_from(&result))
    }

    pub async fn get_drive_file(&self, file_id: &str) -> Result<GoogleDriveFile> {
        let action = McpAction::new(McpTool::GoogleDrive, DriveAction::GetFile.as_str(), json!({ "fileId": file_id }));
        let result = self.execute(&action).await?;
        let file = result
            .get("file")
            .cloned()
            .ok_or_else(|| SwitchboardError::NotFound(format!("Drive file {}", file_id)))?;
        Ok(serde_json::from_value(file)?)
    }

    pub async fn search_drive_files(&self, search_term: &str) -> Result<Vec<GoogleDriveFile>> {
        let action = McpAction::new(
            McpTool::GoogleDrive,
            DriveAction::SearchFiles.as_str(),
            json!({ "searchTerm": search_term }),
        );
        let result = self.execute(&action).await?;
        Ok(files_from(&result))
    }

    // ============ Google Sheets ============

    pub async fn add_sheet_row(&self, spreadsheet_id: &str, values: Vec<Value>) -> Result<()> {
        let action = McpAction::new(
            McpTool::GoogleSheets,
            SheetsAction::AddRow.as_str(),
            json!({ "spreadsheetId": spreadsheet_id, "values": values }),
        );
        self.execute(&action).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MCP_BASE_URL;

    fn relay(key: Option<&str>) -> McpRelay {
        McpRelay::new(DEFAULT_MCP_BASE_URL, key.map(str::to_string)).unwrap()
    }

    #[test]
    fn test_tool_ids() {
        for tool in McpTool::ALL {
            assert_eq!(McpTool::from_id(tool.id()), Some(tool));
        }
        assert_eq!(McpTool::from_id("dropbox"), None);
        assert_eq!(serde_json::to_value(McpTool::GoogleSheets).unwrap(), "google-sheets");
    }

    #[test]
    fn test_toggle() {
        let mut relay = relay(None);
        assert!(!relay.is_enabled(McpTool::Gmail));
        assert!(relay.toggle(McpTool::Gmail));
        assert!(relay.is_enabled(McpTool::Gmail));
        assert!(!relay.toggle(McpTool::Gmail));
        assert!(!relay.is_enabled(McpTool::Gmail));
    }

    #[test]
    fn test_list_files_parameters_omit_missing_query() {
        assert_eq!(list_files_parameters(None), json!({}));
        assert!(list_files_parameters(None).get("query").is_none());
        assert_eq!(list_files_parameters(Some("report")), json!({ "query": "report" }));
    }

    #[test]
    fn test_endpoint() {
        let relay = McpRelay::new("https://mcp.example.com/api/v1/", None).unwrap();
        assert_eq!(
            relay.endpoint(McpTool::GoogleDrive, DriveAction::SearchFiles.as_str()),
            "https://mcp.example.com/api/v1/google-drive/search_files"
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_rejected() {
        let relay = relay(Some("key"));
        let action = McpAction { tool: "dropbox".to_string(), action: "list".to_string(), parameters: json!({}) };
        assert!(matches!(relay.execute(&action).await, Err(SwitchboardError::UnknownTool(t)) if t == "dropbox"));
    }

    #[tokio::test]
    async fn test_disabled_tool_fails_before_network() {
        // Unroutable base: reaching the network would surface as Http, not ToolDisabled
        let relay = McpRelay::new("http://127.0.0.1:9", Some("key".to_string())).unwrap();
        let result = relay.list_drive_files(None).await;
        assert!(matches!(result, Err(SwitchboardError::ToolDisabled(t)) if t == "google-drive"));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let mut relay = relay(Some(""));
        relay.toggle(McpTool::GoogleSheets);
        let result = relay.add_sheet_row("sheet-1", vec![json!("a"), json!(1)]).await;
        assert!(matches!(result, Err(SwitchboardError::Config(_))));
    }

    #[test]
    fn test_files_from_reply() {
        let reply = json!({
            "success": true,
            "files": [{
                "id": "1",
                "name": "Budget",
                "mimeType": "application/vnd.google-apps.spreadsheet",
                "modifiedTime": "2025-01-01T00:00:00Z",
                "webViewLink": "https://drive.example/1"
            }]
        });
        let files = files_from(&reply);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].mime_type, "application/vnd.google-apps.spreadsheet");
        assert!(files[0].thumbnail_link.is_none());

        assert!(files_from(&json!({"success": true})).is_empty());
    }
}
