//! `sys.command`: run a process and capture its output.

use std::process::Command;
use std::sync::Arc;

use rhai::Dynamic;
use taskforge_core::script::host::{arg_map, arg_to_string, HostFunc};
use taskforge_core::CoreError;

struct CommandOptions {
    args: Vec<String>,
    work_dir: String,
}

fn parse_options(options: Option<rhai::Map>) -> CommandOptions {
    let mut parsed = CommandOptions {
        args: Vec::new(),
        work_dir: String::new(),
    };
    let Some(options) = options else {
        return parsed;
    };

    if let Some(args) = options
        .get("args")
        .and_then(|value| value.clone().try_cast::<rhai::Array>())
    {
        parsed.args = args.iter().map(arg_to_string).collect();
    }
    if let Some(dir) = options.get("workDir") {
        if !dir.is_unit() {
            parsed.work_dir = arg_to_string(dir);
        }
    }
    parsed
}

fn command_result(
    success: bool,
    output: String,
    error: Option<String>,
    exit_code: i64,
) -> Dynamic {
    let mut map = rhai::Map::new();
    map.insert("success".into(), Dynamic::from(success));
    map.insert("output".into(), Dynamic::from(output));
    map.insert(
        "error".into(),
        error.map(Dynamic::from).unwrap_or(Dynamic::UNIT),
    );
    map.insert("exitCode".into(), Dynamic::from(exit_code));
    Dynamic::from_map(map)
}

/// `sys.command(cmd, {args, workDir})`.
///
/// `workDir` is resolved to an absolute path and must exist, otherwise the
/// command is not run and `error` is set. The returned object carries
/// `{success, output, error, exitCode}` with `output` the trimmed combined
/// stdout and stderr.
pub fn command() -> HostFunc {
    Arc::new(move |_ctx, args| {
        let command = args.first().map(|arg| arg_to_string(arg)).unwrap_or_default();
        if command.is_empty() {
            return Err(CoreError::InvalidArgument(
                "sys.command requires a command argument".to_string(),
            ));
        }
        let options = parse_options(arg_map(args, 1));

        let mut process = Command::new(&command);
        process.args(&options.args);

        if !options.work_dir.is_empty() {
            let absolute = match std::path::absolute(&options.work_dir) {
                Ok(path) => path,
                Err(err) => {
                    return Ok(command_result(
                        false,
                        String::new(),
                        Some(format!("Failed to resolve working directory: {err}")),
                        -1,
                    ));
                }
            };
            if !absolute.exists() {
                return Ok(command_result(
                    false,
                    String::new(),
                    Some(format!(
                        "Working directory does not exist: {}",
                        absolute.display()
                    )),
                    -1,
                ));
            }
            process.current_dir(absolute);
        }

        match process.output() {
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                let combined = combined.trim().to_string();
                let exit_code = output.status.code().unwrap_or(-1) as i64;

                if output.status.success() {
                    Ok(command_result(true, combined, None, exit_code))
                } else {
                    Ok(command_result(
                        false,
                        combined,
                        Some(format!("Command failed with exit code {exit_code}")),
                        exit_code,
                    ))
                }
            }
            Err(err) => Ok(command_result(
                false,
                String::new(),
                Some(format!("Failed to execute command: {err}")),
                -1,
            )),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_core::script::{ScriptArg, ScriptArgs, ScriptPool};
    use taskforge_core::script::store::MemoryScriptStore;
    use tokio_util::sync::CancellationToken;

    fn run_snippet(script: &str) -> serde_json::Value {
        let pool = ScriptPool::new(Arc::new(MemoryScriptStore::new()));
        pool.inject("sys.command", command()).unwrap();
        pool.set_script("t", script).unwrap();
        let result = pool
            .execute("t", &ScriptArgs::new(), &CancellationToken::new())
            .unwrap();
        assert!(result.success, "{:?}", result.error);
        result.value
    }

    #[test]
    fn echo_captures_trimmed_output() {
        let value = run_snippet(r#"sys::command("echo", #{args: ["hello"]})"#);
        assert_eq!(value["success"], serde_json::json!(true));
        assert_eq!(value["output"], serde_json::json!("hello"));
        assert_eq!(value["exitCode"], serde_json::json!(0));
        assert_eq!(value["error"], serde_json::Value::Null);
    }

    #[test]
    fn missing_work_dir_reports_error_without_running() {
        let value =
            run_snippet(r#"sys::command("echo", #{args: ["x"], workDir: "/definitely/not/here"})"#);
        assert_eq!(value["success"], serde_json::json!(false));
        assert_eq!(value["exitCode"], serde_json::json!(-1));
        let error = value["error"].as_str().unwrap();
        assert!(error.contains("does not exist"), "{error}");
    }

    #[test]
    fn unknown_binary_reports_spawn_failure() {
        let value = run_snippet(r#"sys::command("taskforge-no-such-binary")"#);
        assert_eq!(value["success"], serde_json::json!(false));
        assert!(value["error"].as_str().unwrap().contains("Failed to execute"));
    }

    #[test]
    fn empty_command_raises() {
        let pool = ScriptPool::new(Arc::new(MemoryScriptStore::new()));
        pool.inject("sys.command", command()).unwrap();
        pool.set_script("t", r#"sys::command("")"#).unwrap();
        let result = pool
            .execute("t", &ScriptArgs::new(), &CancellationToken::new())
            .unwrap();
        assert!(!result.success);
    }

    #[test]
    fn callable_as_function_argument_binding() {
        // The same host function can also be supplied per run.
        let pool = ScriptPool::new(Arc::new(MemoryScriptStore::new()));
        pool.set_script("t", r#"run("echo", #{args: ["hi"]}).output"#)
            .unwrap();
        let mut args = ScriptArgs::new();
        args.insert("run".to_string(), ScriptArg::Func(command()));
        let result = pool.execute("t", &args, &CancellationToken::new()).unwrap();
        assert_eq!(result.value, serde_json::json!("hi"));
    }
}
