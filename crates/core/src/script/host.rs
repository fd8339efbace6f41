//! Host capability plumbing for the script engine.
//!
//! Capabilities are host functions exposed to scripts under dotted names
//! (`console.log`, `mysql.query`). At execution time each dotted key is
//! materialized as a nested module graph on the engine, so a script calls
//! `console::log(...)`; interior modules are shared across siblings with the
//! same prefix and registration order is irrelevant. A host error return is
//! re-thrown inside the engine as a runtime exception, which scripts may
//! `try`/`catch`; uncaught it surfaces on the run result.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rhai::{
    Dynamic, Engine, EvalAltResult, FnAccess, FnNamespace, Module, NativeCallContext, Position,
    Scope,
};

use crate::error::CoreError;

/// Highest argument count a host function can be called with from a script.
const MAX_HOST_ARITY: usize = 8;

/// Host function signature: `(call context, arguments) -> value or error`.
///
/// Implementations may read shared clients captured at injection time, must
/// not retain the context or arguments beyond the call, and surface failures
/// as returned errors; the pool re-throws them as script exceptions.
pub type HostFunc = Arc<
    dyn Fn(&NativeCallContext<'_>, &mut [&mut Dynamic]) -> Result<Dynamic, CoreError>
        + Send
        + Sync,
>;

/// A caller-supplied execution argument: either a plain value or a host
/// function, both injected under the same dotted-path rules as capabilities.
#[derive(Clone)]
pub enum ScriptArg {
    Value(serde_json::Value),
    Func(HostFunc),
}

impl From<serde_json::Value> for ScriptArg {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for ScriptArg {
    fn from(value: &str) -> Self {
        Self::Value(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for ScriptArg {
    fn from(value: String) -> Self {
        Self::Value(serde_json::Value::String(value))
    }
}

/// Named execution arguments for one script run.
pub type ScriptArgs = HashMap<String, ScriptArg>;

/// Convert a host error into the engine exception thrown at the call site.
pub fn host_error_to_exception(err: CoreError) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(Dynamic::from(err.to_string()), Position::NONE).into()
}

/// Render an argument as a string: string values verbatim, everything else
/// through its display form.
pub fn arg_to_string(arg: &Dynamic) -> String {
    if arg.is_string() {
        arg.clone().into_string().unwrap_or_default()
    } else {
        arg.to_string()
    }
}

/// Fetch argument `idx` as a string, if present.
pub fn arg_string(args: &[&mut Dynamic], idx: usize) -> Option<String> {
    args.get(idx).map(|d| arg_to_string(d))
}

/// Fetch argument `idx` as an object map, if present and map-shaped.
pub fn arg_map(args: &[&mut Dynamic], idx: usize) -> Option<rhai::Map> {
    args.get(idx).and_then(|d| (**d).clone().try_cast::<rhai::Map>())
}

/// Fetch argument `idx` converted to a JSON value, if present.
pub fn arg_json(args: &[&mut Dynamic], idx: usize) -> Option<serde_json::Value> {
    args.get(idx)
        .and_then(|d| rhai::serde::from_dynamic::<serde_json::Value>(d).ok())
}

/// Install host functions on the engine under their dotted names.
///
/// Keys without a dot register as global functions; dotted keys build the
/// nested module graph in a single pass over all entries.
pub(crate) fn bind_host_functions(engine: &mut Engine, entries: Vec<(String, HostFunc)>) {
    #[derive(Default)]
    struct Node {
        fns: Vec<(String, HostFunc)>,
        children: BTreeMap<String, Node>,
    }

    let mut roots: BTreeMap<String, Node> = BTreeMap::new();
    let mut globals: Vec<(String, HostFunc)> = Vec::new();

    for (key, func) in entries {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() == 1 {
            globals.push((key, func));
            continue;
        }
        let mut node = roots.entry(parts[0].to_string()).or_default();
        for part in &parts[1..parts.len() - 1] {
            node = node.children.entry((*part).to_string()).or_default();
        }
        node.fns
            .push((parts[parts.len() - 1].to_string(), func));
    }

    fn into_module(node: Node) -> Module {
        let mut module = Module::new();
        for (name, func) in node.fns {
            set_module_fn(&mut module, &name, func);
        }
        for (name, child) in node.children {
            module.set_sub_module(name, into_module(child));
        }
        module
    }

    for (name, node) in roots {
        engine.register_static_module(name, into_module(node).into());
    }
    for (name, func) in globals {
        register_global_fn(engine, &name, func);
    }
}

/// Register `func` on `module` for every supported arity, with host errors
/// re-thrown as exceptions.
fn set_module_fn(module: &mut Module, name: &str, func: HostFunc) {
    for arity in 0..=MAX_HOST_ARITY {
        let func = func.clone();
        let arg_types = vec![TypeId::of::<Dynamic>(); arity];
        module.set_raw_fn(
            name,
            FnNamespace::Internal,
            FnAccess::Public,
            arg_types,
            move |ctx: NativeCallContext, args: &mut [&mut Dynamic]| {
                func.as_ref()(&ctx, args).map_err(host_error_to_exception)
            },
        );
    }
}

/// Register `func` directly in the engine's global namespace.
fn register_global_fn(engine: &mut Engine, name: &str, func: HostFunc) {
    for arity in 0..=MAX_HOST_ARITY {
        let func = func.clone();
        let arg_types = vec![TypeId::of::<Dynamic>(); arity];
        engine.register_raw_fn(
            name,
            arg_types,
            move |ctx: NativeCallContext, args: &mut [&mut Dynamic]| {
                func.as_ref()(&ctx, args).map_err(host_error_to_exception)
            },
        );
    }
}

/// Push caller-supplied value arguments into the scope.
///
/// A dotted key like `data.user.name` becomes nested object maps rooted at
/// `data`; siblings sharing a prefix share the interior maps.
pub(crate) fn push_value_args(scope: &mut Scope<'_>, values: Vec<(String, serde_json::Value)>) {
    #[derive(Default)]
    struct Node {
        value: Option<Dynamic>,
        children: BTreeMap<String, Node>,
    }

    fn collapse(node: Node) -> Dynamic {
        if node.children.is_empty() {
            return node.value.unwrap_or(Dynamic::UNIT);
        }
        let mut map = rhai::Map::new();
        for (name, child) in node.children {
            map.insert(name.into(), collapse(child));
        }
        Dynamic::from_map(map)
    }

    let mut roots: BTreeMap<String, Node> = BTreeMap::new();
    for (key, value) in values {
        let dynamic = rhai::serde::to_dynamic(&value).unwrap_or(Dynamic::UNIT);
        let mut parts = key.split('.');
        let root = parts.next().unwrap_or_default().to_string();
        let mut node = roots.entry(root).or_default();
        for part in parts {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.value = Some(dynamic);
    }

    for (name, node) in roots {
        scope.push_dynamic(name, collapse(node));
    }
}
