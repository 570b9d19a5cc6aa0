//! Rhai-backed script sandbox.
//!
//! ```text
//! execute(invocation)
//!     │
//!     ├── spawn_blocking ──► fresh Engine + Scope ──► run body
//!     │                              │
//!     │                              └── resolve / reject ──► HostState.signal
//!     │
//!     └── select! { body finished, watchdog tick ──► stall warning }
//! ```
//!
//! A body that ends without calling `resolve` or `reject` fails with
//! [`ScriptError::Unresolved`]. The watchdog only logs.

use super::{
    BatchEntry, Invocation, Outcome, RenderCapability, Response, ScriptError, ScriptKind,
    source::context,
};
use crate::{
    content::page::parse_front_matter,
    data::{CacheGroup, GlobalAccess},
    log,
    utils::path::contained_in,
};
use globset::GlobBuilder;
use parking_lot::Mutex;
use rhai::{
    Array, Dynamic, Engine, EvalAltResult, Map as RhaiMap, NativeCallContext, Scope,
    serde::{from_dynamic, to_dynamic},
};
use serde_json::{Value, json};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use walkdir::WalkDir;

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// Serializes script bodies: at most one executes at a time.
///
/// Callers hold the guard across the cache snapshot, the run and the cache
/// write-back, so no script observes another script's half-applied cache.
#[derive(Debug, Default)]
pub struct ScriptLane(tokio::sync::Mutex<()>);

impl ScriptLane {
    pub async fn acquire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

#[derive(Debug)]
enum Signal {
    Resolved(Value),
    Rejected {
        message: String,
        line: Option<usize>,
    },
}

#[derive(Debug, Default)]
struct HostState {
    signal: Option<Signal>,
    batch: Option<Vec<BatchEntry>>,
    read_files: Vec<PathBuf>,
}

impl HostState {
    fn settle(&mut self, owner: &str, signal: Signal) {
        if self.signal.is_some() {
            log!("warn"; "`{owner}` signalled completion more than once, ignoring");
            return;
        }
        self.signal = Some(signal);
    }
}

type SharedState = Arc<Mutex<HostState>>;

/// Run a script to completion on the blocking pool, logging a stall warning
/// every `watchdog` while it has not settled.
pub async fn execute(invocation: Invocation, watchdog: Duration) -> Result<Outcome, ScriptError> {
    let owner = invocation.owner.clone();
    let started = Instant::now();
    let mut handle = tokio::task::spawn_blocking(move || run(invocation));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + watchdog, watchdog);

    loop {
        tokio::select! {
            joined = &mut handle => {
                return joined.map_err(|e| ScriptError::Aborted {
                    owner: owner.clone(),
                    message: e.to_string(),
                })?;
            }
            _ = ticker.tick() => {
                log!("warn"; "`{owner}` has not resolved after {}ms", started.elapsed().as_millis());
            }
        }
    }
}

fn run(invocation: Invocation) -> Result<Outcome, ScriptError> {
    let Invocation {
        kind,
        owner,
        source,
        front_matter,
        trigger,
        global,
        cache,
        data_dir,
        renderer,
        ledger,
        max_operations,
    } = invocation;

    let setup_failed = |e: Box<EvalAltResult>| ScriptError::Runtime {
        owner: owner.clone(),
        message: e.to_string(),
        context: String::new(),
    };

    let state = SharedState::default();
    let engine = build_engine(&owner, kind, &state, &data_dir, renderer, max_operations);

    let mut scope = Scope::new();
    scope.push("cache", to_dynamic(&cache).map_err(setup_failed)?);
    scope.push_constant("data_dir", data_dir.display().to_string());

    if kind == ScriptKind::Generate {
        let mut inputs = RhaiMap::new();
        inputs.insert(
            "front_matter".into(),
            to_dynamic(&front_matter).map_err(setup_failed)?,
        );
        inputs.insert(
            "triggered_by".into(),
            trigger
                .as_ref()
                .map_or(Ok(Dynamic::UNIT), to_dynamic)
                .map_err(setup_failed)?,
        );
        if let Some(global) = &global {
            inputs.insert("global".into(), Dynamic::from(global.clone()));
        }
        scope.push("inputs", inputs);
    }
    if let Some(global) = global {
        scope.push("global", global);
    }
    if kind == ScriptKind::PostGenerate
        && let Some(ledger) = &ledger
    {
        scope.push("ledger", to_dynamic(ledger).map_err(setup_failed)?);
    }

    let result = engine.run_with_scope(&mut scope, &source);
    let host = std::mem::take(&mut *state.lock());

    if let Err(err) = result {
        return Err(ScriptError::Runtime {
            owner,
            message: err.to_string(),
            context: context(&source, err.position().line()),
        });
    }

    let cache = match scope
        .get_value::<Dynamic>("cache")
        .map(|value| from_dynamic::<CacheGroup>(&value))
    {
        Some(Ok(group)) => group,
        _ => {
            log!("warn"; "`{owner}` replaced `cache` with a non-map value, keeping the previous contents");
            cache
        }
    };

    match host.signal {
        None => Err(ScriptError::Unresolved { owner }),
        Some(Signal::Rejected { message, line }) => Err(ScriptError::Rejected {
            owner,
            message,
            context: context(&source, line),
        }),
        Some(Signal::Resolved(value)) => {
            let response =
                Response::from_value(value).map_err(|e| ScriptError::InvalidResponse {
                    owner: owner.clone(),
                    message: e.to_string(),
                })?;
            Ok(Outcome {
                cache: response.cache.clone().unwrap_or(cache),
                response,
                batch: host.batch,
                read_files: host.read_files,
            })
        }
    }
}

// ============================================================================
// Host bindings
// ============================================================================

fn build_engine(
    owner: &str,
    kind: ScriptKind,
    state: &SharedState,
    data_dir: &Path,
    renderer: Option<Arc<dyn RenderCapability>>,
    max_operations: u64,
) -> Engine {
    let mut engine = Engine::new();
    if max_operations > 0 {
        engine.set_max_operations(max_operations);
    }

    let label = owner.to_string();
    engine.on_print(move |text| log!(&label; "{text}"));

    register_completion(&mut engine, owner, state);
    register_logging(&mut engine, owner);
    register_data(&mut engine, owner, state, data_dir);

    engine
        .register_type_with_name::<GlobalAccess>("Global")
        .register_fn("get", |global: &mut GlobalAccess, key: &str| -> RhaiResult<Dynamic> {
            let value = global.get(key).map_err(|e| e.to_string())?;
            to_dynamic(&value)
        })
        .register_fn("has", |global: &mut GlobalAccess, key: &str| global.has(key));

    if kind == ScriptKind::Generate {
        register_generate(&mut engine, state);
        if let Some(renderer) = renderer {
            register_render(&mut engine, renderer);
        }
    }

    engine
}

fn register_completion(engine: &mut Engine, owner: &str, state: &SharedState) {
    let (s, o) = (Arc::clone(state), owner.to_string());
    engine.register_fn("resolve", move || {
        s.lock().settle(&o, Signal::Resolved(Value::Null));
    });

    let (s, o) = (Arc::clone(state), owner.to_string());
    engine.register_fn("resolve", move |response: Dynamic| -> RhaiResult<()> {
        let value = from_dynamic::<Value>(&response)?;
        s.lock().settle(&o, Signal::Resolved(value));
        Ok(())
    });

    let (s, o) = (Arc::clone(state), owner.to_string());
    engine.register_fn("reject", move |ctx: NativeCallContext, reason: Dynamic| {
        let signal = Signal::Rejected {
            message: reason.to_string(),
            line: ctx.call_position().line(),
        };
        s.lock().settle(&o, signal);
    });

    let (s, o) = (Arc::clone(state), owner.to_string());
    engine.register_fn("reject", move |ctx: NativeCallContext| {
        let signal = Signal::Rejected {
            message: "rejected".to_string(),
            line: ctx.call_position().line(),
        };
        s.lock().settle(&o, signal);
    });
}

fn register_logging(engine: &mut Engine, owner: &str) {
    let label = owner.to_string();
    engine.register_fn("log", move |a: Dynamic| log!(&label; "{a}"));

    let label = owner.to_string();
    engine.register_fn("log", move |a: Dynamic, b: Dynamic| log!(&label; "{a} {b}"));

    let label = owner.to_string();
    engine.register_fn("log", move |a: Dynamic, b: Dynamic, c: Dynamic| {
        log!(&label; "{a} {b} {c}");
    });
}

fn register_data(engine: &mut Engine, owner: &str, state: &SharedState, data_dir: &Path) {
    let (dir, o) = (data_dir.to_path_buf(), owner.to_string());
    engine.register_fn("data_files", move || list_data_files(&dir, None, &o));

    let (dir, o) = (data_dir.to_path_buf(), owner.to_string());
    engine.register_fn("data_files", move |pattern: &str| {
        list_data_files(&dir, Some(pattern), &o)
    });

    let (dir, s) = (data_dir.to_path_buf(), Arc::clone(state));
    engine.register_fn("read_data_file", move |name: &str| -> RhaiResult<String> {
        let path = resolve_data_file(&dir, name)?;
        let text = fs::read_to_string(&path)
            .map_err(|e| format!("cannot read data file `{name}`: {e}"))?;
        s.lock().read_files.push(path);
        Ok(text)
    });

    let o = owner.to_string();
    engine.register_fn("parse_front_matter", move |text: &str| -> RhaiResult<Dynamic> {
        let (front_matter, body) = parse_front_matter(&o, text).map_err(|e| e.to_string())?;
        to_dynamic(json!({ "front_matter": front_matter, "body": body }))
    });
}

fn register_generate(engine: &mut Engine, state: &SharedState) {
    let s = Arc::clone(state);
    engine.register_fn("generate_pages", move |request: Dynamic| -> RhaiResult<()> {
        let entries: Vec<BatchEntry> = if request.is_array() {
            from_dynamic(&request)?
        } else {
            vec![from_dynamic(&request)?]
        };
        s.lock().batch.get_or_insert_with(Vec::new).extend(entries);
        Ok(())
    });
}

fn register_render(engine: &mut Engine, renderer: Arc<dyn RenderCapability>) {
    let r = Arc::clone(&renderer);
    engine.register_fn("render_template", move |page: &str| -> RhaiResult<String> {
        Ok(r.render(page, &Value::Null).map_err(|e| e.to_string())?)
    });

    engine.register_fn(
        "render_template",
        move |page: &str, data: Dynamic| -> RhaiResult<String> {
            let data = from_dynamic::<Value>(&data)?;
            Ok(renderer.render(page, &data).map_err(|e| e.to_string())?)
        },
    );
}

/// Data file names relative to `dir`, `/`-separated and sorted, optionally
/// filtered by a glob.
fn list_data_files(dir: &Path, pattern: Option<&str>, owner: &str) -> RhaiResult<Array> {
    let matcher = pattern
        .map(|p| {
            GlobBuilder::new(p)
                .literal_separator(true)
                .build()
                .map(|g| g.compile_matcher())
                .map_err(|e| format!("invalid glob `{p}`: {e}"))
        })
        .transpose()?;

    let names: Array = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(dir).ok()?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            matcher
                .as_ref()
                .is_none_or(|m| m.is_match(&name))
                .then(|| Dynamic::from(name))
        })
        .collect();

    if names.is_empty() {
        log!("warn"; "{owner}: no data files match `{}`", pattern.unwrap_or("*"));
    }
    Ok(names)
}

fn resolve_data_file(dir: &Path, name: &str) -> RhaiResult<PathBuf> {
    let root = dir
        .canonicalize()
        .map_err(|e| format!("data directory unavailable: {e}"))?;
    contained_in(&root, Path::new(name))
        .ok_or_else(|| format!("data file `{name}` is outside the data directory").into())
}
