//! Module runtime — loads core wasm modules and runs one invocation each.
//!
//! Modules are compiled once (expensive) and instantiated per call (cheap).
//! Every invocation gets a fresh `Store`, so nothing leaks between runs.
//! The four `env` capabilities are linked here; any other import is refused
//! at load time.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn};
use wasmtime::{Caller, Engine, ExternType, Linker, Module, Store};

use super::error::HostError;
use super::manifest::ModuleManifest;
use super::memory::{push_to_caller, read_bytes, read_from_caller, stage_bytes};
use super::sandbox::{Grants, Sandbox};
use super::transport::{header_map, parse_headers, HttpRequest, HttpTransport, TransportError};
use crate::abi::{
    Capability, HostStatus, ALLOC_EXPORT, HTTP_REQUEST_IMPORT, IMPORT_MODULE, LOG_IMPORT,
    MEMORY_EXPORT, READ_FILE_IMPORT, WRITE_FILE_IMPORT,
};

/// One capability call as seen by the host, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityCall {
    pub capability: Capability,
    pub status: HostStatus,
}

/// What one invocation produced.
#[derive(Debug, Clone)]
pub struct InvocationReport {
    /// Process-level status returned by the entry point.
    pub status: u32,
    /// The persisted output document, if the module wrote one.
    pub output: Option<Vec<u8>>,
    pub calls: Vec<CapabilityCall>,
}

impl InvocationReport {
    pub fn succeeded(&self) -> bool {
        self.status == 0
    }

    pub fn output_json(&self) -> Option<serde_json::Value> {
        self.output
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// A compiled, checked module.
pub struct LoadedModule {
    module: Module,
    capabilities: Vec<Capability>,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl LoadedModule {
    /// Capabilities the module imports, in import order.
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Check that `name` is exported as a `(ptr, len) -> status` function.
    pub fn verify_entry(&self, name: &str) -> Result<(), HostError> {
        match self.module.get_export(name) {
            Some(ExternType::Func(ty)) if ty.params().len() == 2 && ty.results().len() == 1 => {
                Ok(())
            }
            Some(_) => Err(HostError::MissingExport(format!(
                "{name} is not a (ptr, len) -> status function"
            ))),
            None => Err(HostError::MissingExport(name.to_string())),
        }
    }

    /// Names of every export, for diagnostics.
    pub fn export_names(&self) -> Vec<String> {
        self.module.exports().map(|e| e.name().to_string()).collect()
    }
}

/// Store data for one invocation.
struct HostState {
    module: String,
    grants: Grants,
    sandbox: Sandbox,
    reply_path: String,
    transport: Arc<dyn HttpTransport>,
    calls: Vec<CapabilityCall>,
}

impl HostState {
    fn record(&mut self, capability: Capability, status: HostStatus) -> u32 {
        self.calls.push(CapabilityCall { capability, status });
        status.code()
    }
}

/// The wasm engine, shared across modules and invocations.
pub struct ModuleRuntime {
    engine: Engine,
}

impl ModuleRuntime {
    pub fn new() -> Result<Self, HostError> {
        let config = wasmtime::Config::new();
        let engine =
            Engine::new(&config).map_err(|e| HostError::EngineCreation(e.to_string()))?;
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile and check a module from raw bytes (binary or text format).
    pub fn load_module(&self, bytes: &[u8]) -> Result<LoadedModule, HostError> {
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| HostError::Compilation(e.to_string()))?;
        check_module(module)
    }

    pub fn load_module_from_path(&self, path: &Path) -> Result<LoadedModule, HostError> {
        let module = Module::from_file(&self.engine, path)
            .map_err(|e| HostError::Compilation(format!("{}: {e}", path.display())))?;
        check_module(module)
    }

    /// Run the manifest's entry point once over `input`.
    ///
    /// Blocks for the whole invocation, including any HTTP exchange; call it
    /// from a blocking thread when running under an async runtime.
    pub fn invoke(
        &self,
        module: &LoadedModule,
        manifest: &ModuleManifest,
        sandbox: &Sandbox,
        transport: Arc<dyn HttpTransport>,
        input: &[u8],
    ) -> Result<InvocationReport, HostError> {
        let entry_name = manifest.module.entry_point.as_str();
        module.verify_entry(entry_name)?;

        let invocation_id = uuid::Uuid::new_v4();
        let span = info_span!("invoke", module = %manifest.module.name, id = %invocation_id);
        let _guard = span.enter();

        // A stale document from an earlier run must not pass for this one.
        sandbox.remove(&manifest.io.output_path)?;
        sandbox.remove(&manifest.io.reply_path)?;

        let state = HostState {
            module: manifest.module.name.clone(),
            grants: manifest.grants.clone(),
            sandbox: sandbox.clone(),
            reply_path: manifest.io.reply_path.clone(),
            transport,
            calls: Vec::new(),
        };
        let mut store = Store::new(&self.engine, state);
        let linker = build_linker(&self.engine)?;

        let instance = linker
            .instantiate(&mut store, &module.module)
            .map_err(|e| HostError::Instantiation(e.to_string()))?;
        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .ok_or_else(|| HostError::MissingExport(MEMORY_EXPORT.into()))?;
        let alloc = instance
            .get_typed_func::<u32, u32>(&mut store, ALLOC_EXPORT)
            .map_err(|e| HostError::MissingExport(format!("{ALLOC_EXPORT}: {e}")))?;
        let entry = instance
            .get_typed_func::<(u32, u32), u32>(&mut store, entry_name)
            .map_err(|e| HostError::MissingExport(format!("{entry_name}: {e}")))?;

        let (ptr, len) = stage_bytes(&mut store, &alloc, &memory, input)?;
        debug!(ptr, len, "staged input");

        let status = entry
            .call(&mut store, (ptr, len))
            .map_err(|e| HostError::Trap(format!("{entry_name}: {e}")))?;

        let output = match sandbox.read(&manifest.io.output_path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(path = %manifest.io.output_path, "no output document: {e}");
                None
            }
        };
        let calls = std::mem::take(&mut store.data_mut().calls);

        info!(
            status,
            output_bytes = output.as_ref().map_or(0, Vec::len),
            capability_calls = calls.len(),
            "module finished"
        );

        Ok(InvocationReport {
            status,
            output,
            calls,
        })
    }
}

/// Refuse unknown imports and missing bridge exports.
fn check_module(module: Module) -> Result<LoadedModule, HostError> {
    let mut capabilities = Vec::new();
    for import in module.imports() {
        let capability = (import.module() == IMPORT_MODULE)
            .then(|| Capability::from_import_name(import.name()))
            .flatten()
            .ok_or_else(|| {
                HostError::UnknownImport(format!("{}::{}", import.module(), import.name()))
            })?;
        if !capabilities.contains(&capability) {
            capabilities.push(capability);
        }
    }

    if !matches!(module.get_export(MEMORY_EXPORT), Some(ExternType::Memory(_))) {
        return Err(HostError::MissingExport(MEMORY_EXPORT.into()));
    }
    if !matches!(module.get_export(ALLOC_EXPORT), Some(ExternType::Func(_))) {
        return Err(HostError::MissingExport(ALLOC_EXPORT.into()));
    }

    Ok(LoadedModule {
        module,
        capabilities,
    })
}

fn build_linker(engine: &Engine) -> Result<Linker<HostState>, HostError> {
    let mut linker = Linker::new(engine);

    linker
        .func_wrap(
            IMPORT_MODULE,
            LOG_IMPORT,
            |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| {
                let status = match read_from_caller(&mut caller, ptr, len) {
                    Ok(bytes) => {
                        let message = String::from_utf8_lossy(&bytes);
                        info!(
                            target: "floatkit::module",
                            module = %caller.data().module,
                            "{message}"
                        );
                        HostStatus::Ok
                    }
                    Err(e) => {
                        warn!("dropped module log line: {e}");
                        HostStatus::Memory
                    }
                };
                caller.data_mut().record(Capability::Log, status);
            },
        )
        .map_err(|e| HostError::Link(format!("{LOG_IMPORT}: {e}")))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            HTTP_REQUEST_IMPORT,
            |mut caller: Caller<'_, HostState>,
             url_ptr: u32,
             url_len: u32,
             method_ptr: u32,
             method_len: u32,
             headers_ptr: u32,
             headers_len: u32,
             body_ptr: u32,
             body_len: u32|
             -> u32 {
                let status = issue_request(
                    &mut caller,
                    [
                        (url_ptr, url_len),
                        (method_ptr, method_len),
                        (headers_ptr, headers_len),
                        (body_ptr, body_len),
                    ],
                )
                .err()
                .unwrap_or(HostStatus::Ok);
                caller.data_mut().record(Capability::IssueRequest, status)
            },
        )
        .map_err(|e| HostError::Link(format!("{HTTP_REQUEST_IMPORT}: {e}")))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            READ_FILE_IMPORT,
            |mut caller: Caller<'_, HostState>, path_ptr: u32, path_len: u32| -> u32 {
                let status = read_resource(&mut caller, (path_ptr, path_len))
                    .err()
                    .unwrap_or(HostStatus::Ok);
                caller.data_mut().record(Capability::ReadResource, status)
            },
        )
        .map_err(|e| HostError::Link(format!("{READ_FILE_IMPORT}: {e}")))?;

    linker
        .func_wrap(
            IMPORT_MODULE,
            WRITE_FILE_IMPORT,
            |mut caller: Caller<'_, HostState>,
             path_ptr: u32,
             path_len: u32,
             data_ptr: u32,
             data_len: u32|
             -> u32 {
                let status =
                    write_resource(&mut caller, (path_ptr, path_len), (data_ptr, data_len))
                        .err()
                        .unwrap_or(HostStatus::Ok);
                caller.data_mut().record(Capability::WriteResource, status)
            },
        )
        .map_err(|e| HostError::Link(format!("{WRITE_FILE_IMPORT}: {e}")))?;

    Ok(linker)
}

/// Map a host-side failure to the status the module sees.
fn status_for(err: &HostError) -> HostStatus {
    match err {
        HostError::Sandbox(_) => HostStatus::BadArgument,
        HostError::Io(_) => HostStatus::Io,
        _ => HostStatus::Memory,
    }
}

fn read_text(
    caller: &mut Caller<'_, HostState>,
    (ptr, len): (u32, u32),
) -> Result<String, HostStatus> {
    let bytes = read_from_caller(caller, ptr, len).map_err(|e| {
        warn!("capability argument unreadable: {e}");
        HostStatus::Memory
    })?;
    String::from_utf8(bytes).map_err(|_| {
        warn!("capability argument is not UTF-8");
        HostStatus::BadArgument
    })
}

fn issue_request(
    caller: &mut Caller<'_, HostState>,
    [url, method, headers, body]: [(u32, u32); 4],
) -> Result<(), HostStatus> {
    if !caller.data().grants.network {
        warn!("issue_request without network grant");
        return Err(HostStatus::Denied);
    }

    let url = read_text(caller, url)?;
    let method = read_text(caller, method)?;
    let headers = read_text(caller, headers)?;
    let body = read_from_caller(caller, body.0, body.1).map_err(|e| {
        warn!("request body unreadable: {e}");
        HostStatus::Memory
    })?;

    let parsed = reqwest::Url::parse(&url).map_err(|e| {
        warn!(%url, "unparseable request URL: {e}");
        HostStatus::BadArgument
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        warn!(%url, "unsupported URL scheme");
        return Err(HostStatus::BadArgument);
    }
    let host = parsed.host_str().unwrap_or_default();
    if !caller.data().grants.allows_host(host) {
        warn!(%host, "destination not in allowed_hosts");
        return Err(HostStatus::Denied);
    }

    let headers = parse_headers(&headers)
        .and_then(|headers| header_map(&headers).map(|_| headers))
        .map_err(|e| {
            warn!("{e}");
            HostStatus::BadArgument
        })?;

    let state = caller.data();
    state
        .sandbox
        .remove(&state.reply_path)
        .map_err(|e| status_for(&e))?;

    let request = HttpRequest {
        url,
        method,
        headers,
        body,
    };
    info!(
        method = %request.method,
        url = %request.url,
        body_bytes = request.body.len(),
        "issuing request"
    );

    let reply = state.transport.send(&request).map_err(|e| {
        warn!(url = %request.url, "request failed: {e}");
        match e {
            TransportError::InvalidMethod(_) | TransportError::InvalidHeader(_) => {
                HostStatus::BadArgument
            }
            TransportError::Http(_) => HostStatus::Transport,
        }
    })?;

    if !reply.is_success() {
        warn!(url = %request.url, status = reply.status, "non-success reply");
        return Err(HostStatus::HttpStatus);
    }

    state
        .sandbox
        .write(&state.reply_path, &reply.body)
        .map_err(|e| {
            warn!("failed to persist reply: {e}");
            status_for(&e)
        })?;
    debug!(reply_bytes = reply.body.len(), path = %state.reply_path, "reply persisted");
    Ok(())
}

fn read_resource(
    caller: &mut Caller<'_, HostState>,
    path: (u32, u32),
) -> Result<(), HostStatus> {
    let path = read_text(caller, path)?;
    let bytes = caller.data().sandbox.read(&path).map_err(|e| {
        warn!(%path, "read_resource failed: {e}");
        status_for(&e)
    })?;
    push_to_caller(caller, &bytes).map_err(|e| {
        warn!(%path, "failed to stage {} bytes: {e}", bytes.len());
        HostStatus::Memory
    })?;
    debug!(%path, bytes = bytes.len(), "resource read");
    Ok(())
}

fn write_resource(
    caller: &mut Caller<'_, HostState>,
    path: (u32, u32),
    data: (u32, u32),
) -> Result<(), HostStatus> {
    if !caller.data().grants.file_write {
        warn!("write_resource without file_write grant");
        return Err(HostStatus::Denied);
    }
    let path = read_text(caller, path)?;
    let memory = super::memory::caller_memory(caller).map_err(|_| HostStatus::Memory)?;
    let data = read_bytes(&*caller, &memory, data.0, data.1).map_err(|e| {
        warn!(%path, "write_resource data unreadable: {e}");
        HostStatus::Memory
    })?;
    caller.data().sandbox.write(&path, &data).map_err(|e| {
        warn!(%path, "write_resource failed: {e}");
        status_for(&e)
    })?;
    debug!(%path, bytes = data.len(), "resource written");
    Ok(())
}
