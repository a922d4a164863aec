use crate::session::TakeoutSession;
use rmcp::{
    ServerHandler,
    handler::server::router::tool::ToolRouter,
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool_handler,
};
use std::sync::Arc;

/// MCP server over one notebook session.
///
/// Clones share the session; page-driving tools serialize on the session's
/// page lock, so a cancel can arrive while an export runs.
#[derive(Clone)]
pub struct TakeoutServer {
    session: Arc<TakeoutSession>,
    pub(crate) tool_router: ToolRouter<Self>,
}

impl TakeoutServer {
    pub fn new(session: TakeoutSession) -> Self {
        Self::with_shared(Arc::new(session))
    }

    /// Server over a session shared with other owners
    pub fn with_shared(session: Arc<TakeoutSession>) -> Self {
        Self {
            session,
            tool_router: Self::tool_router(),
        }
    }

    pub fn session(&self) -> &TakeoutSession {
        &self.session
    }
}

#[tool_handler]
impl ServerHandler for TakeoutServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation::from_build_env(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Exports NotebookLM artifacts from the open notebook tab. Scan first \
                 (scan_artifacts, scan_notes, scan_sources), then extract single items or \
                 run download_all / export_notes / export_sources. Long exports can be \
                 stopped with cancel_export and observed with batch_status."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TakeoutConfig;
    use crate::dom::{ManualClock, MemoryPage};
    use crate::download::StaticFetcher;

    #[test]
    fn test_every_registry_tool_is_routed() {
        let dir = tempfile::tempdir().unwrap();
        let session = TakeoutSession::offline(
            Arc::new(MemoryPage::new("<body></body>")),
            TakeoutConfig::default().with_download_dir(dir.path()),
            Arc::new(StaticFetcher::new()),
            Arc::new(ManualClock::new()),
        );
        let server = TakeoutServer::new(session);

        let routed: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        for name in server.session().tool_registry().names() {
            assert!(routed.iter().any(|r| r == name), "{} is not routed", name);
        }
        assert!(server.get_info().capabilities.tools.is_some());
    }
}
