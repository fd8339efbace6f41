//! Script pool: compile cache, capability registry, and execution.
//!
//! Compiled programs are cached per script name and never evicted (script
//! count is bounded by operators, not requests). Every run gets a fresh
//! single-threaded engine so no state leaks between calls; the compiled AST
//! itself is immutable and shared across threads.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::script::cache::ScriptCache;
use crate::script::future::ScriptFuture;
use crate::script::host::{self, HostFunc, ScriptArg, ScriptArgs};
use crate::script::store::ScriptStore;

/// Compile-cache record: source, compiled program, last update time.
/// Replaced wholesale on recompilation so readers never observe a `code`
/// that does not match `ast`.
struct ProgramEntry {
    code: String,
    ast: AST,
    updated_at: DateTime<Utc>,
}

/// Outcome of one script run. Exactly one of `value` / `error` is
/// meaningful (`success` ⇔ no error).
#[derive(Debug, Clone)]
pub struct RunResult {
    pub success: bool,
    pub value: serde_json::Value,
    pub error: Option<CoreError>,
    pub duration: Duration,
}

impl RunResult {
    pub(crate) fn failure(error: CoreError) -> Self {
        Self {
            success: false,
            value: serde_json::Value::Null,
            error: Some(error),
            duration: Duration::ZERO,
        }
    }
}

struct PoolInner {
    scripts: RwLock<HashMap<String, Arc<ProgramEntry>>>,
    injects: RwLock<HashMap<String, HostFunc>>,
    store: Arc<dyn ScriptStore>,
    cache: Arc<ScriptCache>,
}

/// Compile cache plus host-capability registry over a script store.
///
/// Cheap to clone; clones share the same caches and registry.
#[derive(Clone)]
pub struct ScriptPool {
    inner: Arc<PoolInner>,
}

impl ScriptPool {
    /// Create a pool over `store`. Call [`ScriptCache::initialize`] on the
    /// pool's cache before serving lookups.
    pub fn new(store: Arc<dyn ScriptStore>) -> Self {
        let cache = Arc::new(ScriptCache::new(store.clone()));
        Self {
            inner: Arc::new(PoolInner {
                scripts: RwLock::new(HashMap::new()),
                injects: RwLock::new(HashMap::new()),
                store,
                cache,
            }),
        }
    }

    /// The script cache layered over this pool's store.
    pub fn cache(&self) -> &Arc<ScriptCache> {
        &self.inner.cache
    }

    /// The backing script store.
    pub fn store(&self) -> &Arc<dyn ScriptStore> {
        &self.inner.store
    }

    /// Register a host function under `name` (dotted names nest). A later
    /// call for the same name overwrites the binding.
    pub fn inject(&self, name: &str, func: HostFunc) -> CoreResult<()> {
        if name.is_empty() {
            return Err(CoreError::InvalidArgument(
                "inject: name must be non-empty".to_string(),
            ));
        }
        self.inner
            .injects
            .write()
            .expect("inject registry poisoned")
            .insert(name.to_string(), func);
        Ok(())
    }

    /// Compile `code` and replace the program entry for `name`.
    ///
    /// A compile failure returns the parser message and leaves any previous
    /// entry untouched, so the last working program stays runnable.
    pub fn set_script(&self, name: &str, code: &str) -> CoreResult<()> {
        if name.is_empty() {
            return Err(CoreError::InvalidArgument(
                "set_script: empty script name".to_string(),
            ));
        }

        // Compile against the current capability set so namespace-qualified
        // calls resolve the same way they will at execution time.
        let mut engine = Engine::new();
        host::bind_host_functions(&mut engine, self.capability_snapshot());
        let mut ast = engine.compile(code).map_err(|err| CoreError::Compile {
            name: name.to_string(),
            message: err.to_string(),
        })?;
        ast.set_source(name);

        let entry = Arc::new(ProgramEntry {
            code: code.to_string(),
            ast,
            updated_at: Utc::now(),
        });
        self.inner
            .scripts
            .write()
            .expect("compile cache poisoned")
            .insert(name.to_string(), entry);
        Ok(())
    }

    /// Compile-if-new: recompile only when the cached entry's source differs
    /// from `code`. The execute path uses this to avoid recompiling on every
    /// request.
    pub fn ensure_script(&self, name: &str, code: &str) -> CoreResult<()> {
        {
            let scripts = self.inner.scripts.read().expect("compile cache poisoned");
            if let Some(entry) = scripts.get(name) {
                if entry.code == code {
                    return Ok(());
                }
            }
        }
        self.set_script(name, code)
    }

    fn capability_snapshot(&self) -> Vec<(String, HostFunc)> {
        self.inner
            .injects
            .read()
            .expect("inject registry poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// When the entry for `name` was last (re)compiled.
    pub fn script_updated_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.inner
            .scripts
            .read()
            .expect("compile cache poisoned")
            .get(name)
            .map(|entry| entry.updated_at)
    }

    /// Run a compiled script to completion on the current thread.
    ///
    /// Missing entry ⇒ `NotFound`. Script failures (exceptions, host errors,
    /// cancellation, host panics) are reported inside the returned
    /// [`RunResult`], not as an `Err`.
    pub fn execute(
        &self,
        name: &str,
        args: &ScriptArgs,
        token: &CancellationToken,
    ) -> CoreResult<RunResult> {
        let entry = self
            .inner
            .scripts
            .read()
            .expect("compile cache poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("script '{name}' is not compiled")))?;

        let start = Instant::now();
        let mut engine = Engine::new();

        // Snapshot the registry, then fold in caller-supplied functions;
        // caller bindings shadow capabilities of the same name.
        let mut bindings = self.capability_snapshot();
        let mut values: Vec<(String, serde_json::Value)> = Vec::new();
        for (key, arg) in args {
            match arg {
                ScriptArg::Func(func) => bindings.push((key.clone(), func.clone())),
                ScriptArg::Value(value) => values.push((key.clone(), value.clone())),
            }
        }
        host::bind_host_functions(&mut engine, bindings);

        let mut scope = Scope::new();
        host::push_value_args(&mut scope, values);

        // Cancellation: interrupt at the next safe execution point. A host
        // call already in flight finishes on its own timeout first.
        let cancel = token.clone();
        engine.on_progress(move |_| {
            if cancel.is_cancelled() {
                Some(Dynamic::from("cancelled"))
            } else {
                None
            }
        });

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            engine.eval_ast_with_scope::<Dynamic>(&mut scope, &entry.ast)
        }));
        let duration = start.elapsed();

        let result = match outcome {
            Ok(Ok(value)) => RunResult {
                success: true,
                value: rhai::serde::from_dynamic::<serde_json::Value>(&value)
                    .unwrap_or(serde_json::Value::Null),
                error: None,
                duration,
            },
            Ok(Err(err)) => RunResult {
                success: false,
                value: serde_json::Value::Null,
                error: Some(classify_eval_error(&err)),
                duration,
            },
            Err(panic) => RunResult {
                success: false,
                value: serde_json::Value::Null,
                error: Some(CoreError::Runtime(format!(
                    "host panic: {}",
                    panic_message(panic.as_ref())
                ))),
                duration,
            },
        };
        Ok(result)
    }

    /// Run on a blocking worker and await the outcome.
    pub async fn run(&self, name: &str, args: ScriptArgs) -> CoreResult<RunResult> {
        self.run_cancellable(name, args, CancellationToken::new())
            .await
    }

    /// Run on a blocking worker, honoring `token` for cancellation.
    pub async fn run_cancellable(
        &self,
        name: &str,
        args: ScriptArgs,
        token: CancellationToken,
    ) -> CoreResult<RunResult> {
        let pool = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || pool.execute(&name, &args, &token))
            .await
            .map_err(|err| CoreError::Runtime(format!("execution task failed: {err}")))?
    }

    /// Start a run in the background and return a re-readable handle.
    /// Internal errors (e.g. unknown script) surface as a failed result on
    /// the handle.
    pub fn run_async(&self, name: &str, args: ScriptArgs, token: CancellationToken) -> ScriptFuture {
        let pool = self.clone();
        let name = name.to_string();
        let run_token = token.clone();
        let handle = tokio::task::spawn_blocking(move || pool.execute(&name, &args, &run_token));
        ScriptFuture::new(handle, token)
    }
}

/// Map an engine error to the shared taxonomy. Termination via the progress
/// hook is a cancellation; everything else is a runtime failure with the
/// exception preserved in the message.
fn classify_eval_error(err: &EvalAltResult) -> CoreError {
    match err {
        EvalAltResult::ErrorTerminated(_, _) => {
            CoreError::Cancelled("script execution cancelled".to_string())
        }
        other => CoreError::Runtime(other.to_string()),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
