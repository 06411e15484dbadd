//! MCP server implementation using rmcp.
//!
//! Five tools (`contract_check`, `exception_path`, `equivalence`,
//! `branch_analysis`, `health`) bridge to the synchronous analysis core via
//! `spawn_blocking`. Analysis outcomes — including failures — are encoded in
//! the returned JSON (`status` / `error_type`), not in the protocol error
//! channel, so clients always get a structured result.
//!
//! Three read-only resources expose the active policy and limits:
//! `config://security`, `config://server`, and `info://capabilities`. They
//! serve table contents and bounds only; no environment values or
//! credentials.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    AnnotateAble, CallToolResult, Content, Implementation, ListResourcesResult,
    PaginatedRequestParams, ProtocolVersion, RawResource, ReadResourceRequestParam,
    ReadResourceResult, Resource, ResourceContents, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{tool, tool_handler, tool_router, ErrorData, RoleServer, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use symexec::{Config, Orchestrator, PolicySnapshot, ProbeEngine, PER_PATH_TIMEOUT_RATIO};

// ── Parameter structs ────────────────────────────────────────────────────────
// Doc comments on fields become the JSON schema descriptions clients see.

#[derive(Deserialize, JsonSchema)]
pub struct ContractCheckParams {
    /// Python source defining the function to analyze
    pub source: String,
    /// Name of the function whose contracts should be checked
    pub function_name: String,
    /// Time budget in seconds (default: 30)
    pub timeout_seconds: Option<u64>,
}

#[derive(Deserialize, JsonSchema)]
pub struct ExceptionPathParams {
    /// Python source defining the function to analyze
    pub source: String,
    /// Name of the function to search
    pub function_name: String,
    /// Exception class name to search for (e.g. ZeroDivisionError)
    pub exception_type: String,
    /// Time budget in seconds (default: 30)
    pub timeout_seconds: Option<u64>,
}

#[derive(Deserialize, JsonSchema)]
pub struct EquivalenceParams {
    /// Python source defining both functions
    pub source: String,
    /// First function name
    pub function_a: String,
    /// Second function name
    pub function_b: String,
    /// Time budget in seconds (default: 60)
    pub timeout_seconds: Option<u64>,
}

#[derive(Deserialize, JsonSchema)]
pub struct BranchAnalysisParams {
    /// Python source defining the function to analyze
    pub source: String,
    /// Name of the function whose branches should be mapped
    pub function_name: String,
    /// Time budget in seconds (default: 30)
    pub timeout_seconds: Option<u64>,
    /// Ask the engine to classify branch reachability (default: false)
    pub symbolic_mode: Option<bool>,
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    registered_units: usize,
}

// ── Tool plumbing ────────────────────────────────────────────────────────────

/// Runs a blocking analysis closure and returns its JSON as tool text.
/// Analysis failures are already structured inside the result; only a
/// panicked/cancelled worker reaches the protocol error channel.
async fn run_analysis<T, F>(f: F) -> Result<CallToolResult, ErrorData>
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(output) => {
            let json = serde_json::to_string(&output)
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
            Ok(CallToolResult::success(vec![Content::text(json)]))
        }
        Err(e) => Err(ErrorData::internal_error(e.to_string(), None)),
    }
}

// ── Server ───────────────────────────────────────────────────────────────────

/// MCP server for sandboxed symbolic analysis.
#[derive(Clone)]
pub struct SymbolicServer {
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator<ProbeEngine>>,
    tool_router: ToolRouter<SymbolicServer>,
}

impl SymbolicServer {
    pub fn new(config: Arc<Config>, engine: ProbeEngine) -> Self {
        Self {
            orchestrator: Arc::new(Orchestrator::new(Arc::clone(&config), engine)),
            config,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl SymbolicServer {
    #[tool(
        description = "Verify that a Python function satisfies its contracts (inline asserts, \
        docstring pre:/post: declarations, type annotations) by exploring execution paths. \
        Returns status verified, counterexample (with concrete inputs), timeout, or error."
    )]
    async fn contract_check(
        &self,
        Parameters(p): Parameters<ContractCheckParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let orchestrator = Arc::clone(&self.orchestrator);
        run_analysis(move || {
            orchestrator.contract_check(&p.source, &p.function_name, p.timeout_seconds)
        })
        .await
    }

    #[tool(
        description = "Search for concrete inputs that make a Python function raise a given \
        exception type. Returns status found (with triggering_inputs) or unreachable."
    )]
    async fn exception_path(
        &self,
        Parameters(p): Parameters<ExceptionPathParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let orchestrator = Arc::clone(&self.orchestrator);
        run_analysis(move || {
            orchestrator.exception_path(
                &p.source,
                &p.function_name,
                &p.exception_type,
                p.timeout_seconds,
            )
        })
        .await
    }

    #[tool(
        description = "Decide whether two Python functions with the same signature are \
        semantically equivalent. Returns status equivalent or different (with a \
        distinguishing_input); timeouts are reported as errors, never as a verdict."
    )]
    async fn equivalence(
        &self,
        Parameters(p): Parameters<EquivalenceParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let orchestrator = Arc::clone(&self.orchestrator);
        run_analysis(move || {
            orchestrator.equivalence(&p.source, &p.function_a, &p.function_b, p.timeout_seconds)
        })
        .await
    }

    #[tool(
        description = "Map the decision points of a Python function and compute cyclomatic \
        complexity. In symbolic mode each branch is classified reachable/unreachable/unknown \
        and unreachable lines are collected as dead_code_lines."
    )]
    async fn branch_analysis(
        &self,
        Parameters(p): Parameters<BranchAnalysisParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let orchestrator = Arc::clone(&self.orchestrator);
        run_analysis(move || {
            orchestrator.branch_analysis(
                &p.source,
                &p.function_name,
                p.timeout_seconds,
                p.symbolic_mode.unwrap_or(false),
            )
        })
        .await
    }

    #[tool(description = "Service liveness and version information.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        let status = HealthStatus {
            status: "ok",
            service: "symexec-mcp",
            version: env!("CARGO_PKG_VERSION"),
            registered_units: symexec::isolation::registered_unit_count(),
        };
        let json = serde_json::to_string(&status)
            .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

// ── Resources ────────────────────────────────────────────────────────────────

const SECURITY_URI: &str = "config://security";
const SERVER_URI: &str = "config://server";
const CAPABILITIES_URI: &str = "info://capabilities";

impl SymbolicServer {
    fn security_resource_json(&self) -> serde_json::Value {
        let policy = PolicySnapshot::current();
        serde_json::json!({
            "allowed_modules": policy.allowed_modules,
            "blocked_modules": policy.blocked_modules,
            "dangerous_builtins": policy.dangerous_builtins,
            "blocked_globals": policy.blocked_globals,
            "code_size_limit": self.config.code_size_limit,
            "memory_limit_mb": self.config.memory_limit_mb,
        })
    }

    fn server_resource_json(&self) -> serde_json::Value {
        serde_json::json!({
            "memory_limit_mb": self.config.memory_limit_mb,
            "code_size_limit": self.config.code_size_limit,
            "coverage_exhaustive_threshold": self.config.coverage_exhaustive_threshold,
            "default_timeout_seconds": self.config.default_timeout_seconds,
            "equivalence_timeout_seconds": self.config.equivalence_timeout_seconds,
            "per_path_timeout_ratio": PER_PATH_TIMEOUT_RATIO,
        })
    }

    fn capabilities_resource_json(&self) -> serde_json::Value {
        serde_json::json!({
            "methods": [
                {
                    "name": "contract_check",
                    "description": "Verify a function's contracts; produce counterexamples",
                    "arguments": ["source", "function_name", "timeout_seconds?"],
                },
                {
                    "name": "exception_path",
                    "description": "Find inputs triggering a given exception type",
                    "arguments": ["source", "function_name", "exception_type", "timeout_seconds?"],
                },
                {
                    "name": "equivalence",
                    "description": "Prove two functions equivalent or find a distinguishing input",
                    "arguments": ["source", "function_a", "function_b", "timeout_seconds?"],
                },
                {
                    "name": "branch_analysis",
                    "description": "Map decision points, complexity, and reachability",
                    "arguments": ["source", "function_name", "timeout_seconds?", "symbolic_mode?"],
                },
                {
                    "name": "health",
                    "description": "Service liveness and version information",
                    "arguments": [],
                },
            ],
            "contract_styles": ["inline asserts", "docstring pre/post", "decorators", "type annotations"],
        })
    }
}

fn resource(uri: &str, name: &str, description: &str) -> Resource {
    let mut raw = RawResource::new(uri, name.to_string());
    raw.description = Some(description.to_string());
    raw.mime_type = Some("application/json".to_string());
    raw.no_annotation()
}

#[tool_handler]
impl ServerHandler for SymbolicServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = "symexec: sandboxed symbolic analysis of untrusted Python functions.\n\n\
             Submit source plus a function name; the service statically validates the code \
             against a strict import/builtin policy, loads it into a throwaway namespace, and \
             explores execution paths under a time budget.\n\n\
             TOOLS:\n\
             - contract_check: verify asserts / docstring pre-post / annotations, or get counterexamples\n\
             - exception_path: find inputs raising a given exception type\n\
             - equivalence: prove two functions equal or get a distinguishing input\n\
             - branch_analysis: decision points, cyclomatic complexity, dead code\n\n\
             Only pure-computation stdlib modules are importable; OS, network, filesystem, and \
             code-loading modules are rejected before anything runs."
            .to_string();

        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            server_info: Implementation {
                name: "symexec-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            instructions: Some(instructions),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult {
            resources: vec![
                resource(
                    SECURITY_URI,
                    "Security policy",
                    "Module allowlist/blocklist, dangerous builtins, and size limits",
                ),
                resource(
                    SERVER_URI,
                    "Server limits",
                    "Active resource limits and timeout defaults",
                ),
                resource(
                    CAPABILITIES_URI,
                    "Capabilities",
                    "Supported methods and their argument shapes",
                ),
            ],
            ..Default::default()
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let body = match request.uri.as_str() {
            SECURITY_URI => self.security_resource_json(),
            SERVER_URI => self.server_resource_json(),
            CAPABILITIES_URI => self.capabilities_resource_json(),
            other => {
                return Err(ErrorData::resource_not_found(
                    format!("unknown resource: {other}"),
                    None,
                ))
            }
        };
        let text = serde_json::to_string_pretty(&body)
            .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> SymbolicServer {
        SymbolicServer::new(Arc::new(Config::default()), ProbeEngine::default())
    }

    #[test]
    fn test_all_five_tools_are_registered() {
        let server = server();
        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["branch_analysis", "contract_check", "equivalence", "exception_path", "health"]
        );
    }

    #[test]
    fn test_security_resource_contains_policy_tables() {
        let json = server().security_resource_json();
        let allowed = json["allowed_modules"].as_array().expect("array");
        assert_eq!(allowed.len(), 21);
        assert!(json["dangerous_builtins"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "eval"));
        assert_eq!(json["code_size_limit"], 65_536);
    }

    #[test]
    fn test_server_resource_contains_limits_only() {
        let json = server().server_resource_json();
        assert_eq!(json["memory_limit_mb"], 2048);
        assert_eq!(json["per_path_timeout_ratio"], 0.1);
        let rendered = json.to_string();
        assert!(!rendered.contains("SYMBOLIC_"), "no raw environment values: {rendered}");
    }

    #[test]
    fn test_capabilities_resource_lists_all_methods() {
        let json = server().capabilities_resource_json();
        let methods = json["methods"].as_array().expect("array");
        assert_eq!(methods.len(), 5);
        assert!(methods.iter().any(|m| m["name"] == "equivalence"));
    }

    #[test]
    fn test_params_deserialize_with_optional_fields_absent() {
        let p: ContractCheckParams =
            serde_json::from_str(r#"{"source": "def f(): pass", "function_name": "f"}"#)
                .expect("deserializes");
        assert_eq!(p.timeout_seconds, None);

        let b: BranchAnalysisParams = serde_json::from_str(
            r#"{"source": "def f(): pass", "function_name": "f", "symbolic_mode": true}"#,
        )
        .expect("deserializes");
        assert_eq!(b.symbolic_mode, Some(true));
    }
}
