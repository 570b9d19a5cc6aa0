//! One generation run.
//!
//! # Lifecycle of a request
//!
//! ```text
//! Queued ──► Running ──┬──► script resolved ──► N renders ──► Done
//!                      │                            └──────► Failed (counted)
//!                      ├──► no script ──► 1 render ──► Done / Failed
//!                      └──► script failed ──► Failed (counted)
//! ```
//!
//! Every queued request is spawned before any of them settles. The run's
//! [`Barrier`] starts at the number of requests, grows when a script fans out
//! into a batch and reaches zero once every request and render has settled.
//! Only an invalid cache expiry aborts the run; every other failure is logged
//! and counted against its own request.

use super::{
    GenerateError,
    barrier::Barrier,
    batch::{PlannedRender, plan},
    deps::DepKey,
    entry::compose,
    error_chain,
    queue::Request,
    render::{RenderError, Renderer},
};
use crate::{
    content::{Page, page::wildcard_count},
    data::{CacheError, GlobalAccess, cache::now_ms},
    log,
    output::{ArtifactKind, entry_file, page_file},
    script::{
        ChangeReason, Invocation, Outcome, POST_HOOK, PRE_HOOK, RenderCapability, ScriptKind,
        Trigger, execute, site_file_contents,
    },
    site::Site,
    utils::path::{normalize_path, trim_slashes},
};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::{
    io,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Aggregate result of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Requests drained from the queue.
    pub requested: usize,
    /// Page files written.
    pub rendered: usize,
    /// Failed requests, renders, site files and hooks.
    pub errors: usize,
}

struct RunState {
    barrier: Barrier,
    rendered: AtomicUsize,
    errors: AtomicUsize,
    fatal: Mutex<Option<CacheError>>,
}

impl RunState {
    fn new() -> Self {
        Self {
            barrier: Barrier::new(0),
            rendered: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            fatal: Mutex::new(None),
        }
    }

    fn fail(&self, err: GenerateError) {
        if let GenerateError::Cache(err) = err {
            self.fatal.lock().get_or_insert(err);
            return;
        }
        log!("error"; "{}", error_chain(&err));
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn add_errors(&self, n: usize) {
        self.errors.fetch_add(n, Ordering::SeqCst);
    }

    fn check_fatal(&self) -> Result<(), GenerateError> {
        let fatal = self.fatal.lock().take();
        fatal.map_or(Ok(()), |err| Err(err.into()))
    }

    fn report(&self, requested: usize) -> RunReport {
        RunReport {
            requested,
            rendered: self.rendered.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }
}

/// Run the pre hook, every queued request and the post hook.
pub async fn run(site: &Arc<Site>) -> Result<RunReport, GenerateError> {
    let state = Arc::new(RunState::new());

    match run_hook(site, ScriptKind::PreGenerate).await {
        Ok(Some(outcome)) => {
            state.add_errors(apply_response(site, PRE_HOOK, &outcome).await);
            if let Some(global) = outcome.response.global
                && site.global.replace(global)
            {
                queue_global_dependents(site);
            }
        }
        Ok(None) => {}
        Err(err) => state.fail(err),
    }
    state.check_fatal()?;

    let requests = site.queue.lock().drain();
    let requested = requests.len();
    state.barrier.add(requested);

    for request in requests {
        let site = Arc::clone(site);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = process(&site, &state, &request).await {
                state.fail(err);
            }
            state.barrier.settle();
        });
    }
    state.barrier.wait().await;
    state.check_fatal()?;

    match run_hook(site, ScriptKind::PostGenerate).await {
        Ok(Some(outcome)) => state.add_errors(apply_response(site, POST_HOOK, &outcome).await),
        Ok(None) => {}
        Err(err) => state.fail(err),
    }
    state.check_fatal()?;

    Ok(state.report(requested))
}

/// Queue every page that read global data, blaming the pre hook.
fn queue_global_dependents(site: &Site) {
    let dependents: Vec<String> = site
        .tracker
        .read()
        .global_dependents()
        .iter()
        .cloned()
        .collect();
    let trigger = Trigger {
        path: site.config.scripts.pre_generate.clone(),
        reason: ChangeReason::Modified,
    };
    for page in dependents {
        site.queue_page(&page, Some(trigger.clone()));
    }
}

async fn process(
    site: &Arc<Site>,
    state: &Arc<RunState>,
    request: &Request,
) -> Result<(), GenerateError> {
    let page = site.pages.read().get(&request.page);
    let Some(page) = page else {
        // Removed after it was queued.
        return Ok(());
    };

    if let Some(reference) = &page.scripts.generate_use {
        let _ = site
            .tracker
            .write()
            .record(DepKey::Template(reference.clone()), &page.name);
    }
    let script = site.pages.read().generate_script(&page);
    let batch = match script {
        None => {
            if wildcard_count(&request.target) > 0 {
                log!("warn"; "{}: target `{}` has a wildcard but no generate script, nothing rendered",
                    page.source.display(), request.target);
            }
            None
        }
        Some(Err(reference)) => {
            return Err(GenerateError::MissingReference {
                page: page.name.clone(),
                reference,
            });
        }
        Some(Ok((_, body))) => {
            let outcome = run_page_script(site, &page, request, &body).await?;
            state.add_errors(apply_response(site, &page.name, &outcome).await);
            outcome.batch
        }
    };

    let planned = plan(&request.target, batch).map_err(|message| GenerateError::Validation {
        page: page.name.clone(),
        message,
    })?;

    state.barrier.add(planned.len());
    for render in planned {
        let site = Arc::clone(site);
        let state = Arc::clone(state);
        let page = Arc::clone(&page);
        tokio::spawn(async move {
            match render_one(&site, &page, render).await {
                Ok(()) => {
                    state.rendered.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => state.fail(err),
            }
            state.barrier.settle();
        });
    }
    Ok(())
}

async fn run_page_script(
    site: &Arc<Site>,
    page: &Page,
    request: &Request,
    body: &str,
) -> Result<Outcome, GenerateError> {
    let mut invocation = Invocation::new(
        ScriptKind::Generate,
        &page.name,
        body,
        site.config.build.data.clone(),
    );
    invocation.front_matter = page.front_matter.clone();
    invocation.trigger = request.trigger.clone();
    invocation.global = Some(GlobalAccess::new(
        site.global.snapshot(),
        &page.name,
        Arc::clone(&site.tracker),
    ));
    invocation.renderer = Some(Arc::new(SiteRenderer {
        site: Arc::clone(site),
        page: page.name.clone(),
    }));
    run_with_cache(site, invocation).await
}

/// Run a script inside the script lane with its purged cache group, writing
/// the group back once the script settles successfully.
async fn run_with_cache(site: &Site, mut invocation: Invocation) -> Result<Outcome, GenerateError> {
    let _lane = site.lane.acquire().await;

    let group = {
        let mut cache = site.cache.lock();
        let group = cache.group_name(&invocation.owner);
        cache.purge_expired(&group, now_ms())?;
        invocation.cache = cache.group(&group);
        group
    };
    invocation.max_operations = site.config.scripts.max_operations;

    let outcome = execute(invocation, site.config.scripts.watchdog()).await?;
    site.cache.lock().replace_group(&group, outcome.cache.clone());
    Ok(outcome)
}

/// Run a hook script, or `None` if its file does not exist.
async fn run_hook(site: &Site, kind: ScriptKind) -> Result<Option<Outcome>, GenerateError> {
    let scripts = &site.config.scripts;
    let (path, owner) = match kind {
        ScriptKind::PostGenerate => (&scripts.post_generate, POST_HOOK),
        _ => (&scripts.pre_generate, PRE_HOOK),
    };

    let source = match tokio::fs::read_to_string(path).await {
        Ok(source) => source,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(GenerateError::HookIo(path.clone(), err)),
    };

    let mut invocation = Invocation::new(kind, owner, &source, site.config.build.data.clone());
    if kind == ScriptKind::PostGenerate {
        invocation.ledger = Some(site.writer.ledger().to_value());
    }
    run_with_cache(site, invocation).await.map(Some)
}

/// Apply everything in a response except the batch and the cache.
///
/// Returns the number of failed site files and watch globs; each failure is
/// logged and does not stop the rest of the response.
async fn apply_response(site: &Site, owner: &str, outcome: &Outcome) -> usize {
    let response = &outcome.response;
    let mut failures = 0;

    if let Some(data) = &response.out_data {
        site.writer.ledger().set_out_data(owner, data.clone());
    }

    for (target, value) in &response.site_files {
        let result = match site_file_contents(value) {
            Ok(contents) => site
                .writer
                .write(ArtifactKind::SiteFile, owner, Path::new(trim_slashes(target)), contents)
                .await
                .map(drop)
                .map_err(GenerateError::from),
            Err(err) => Err(GenerateError::Validation {
                page: owner.to_string(),
                message: format!("site file `{target}` is not serializable: {err}"),
            }),
        };
        if let Err(err) = result {
            log!("error"; "{}", error_chain(&err));
            failures += 1;
        }
    }

    let data_dir = &site.config.build.data;
    let mut tracker = site.tracker.write();
    for path in response.watch_files.iter().chain(&outcome.read_files) {
        let _ = tracker.record(DepKey::File(normalize_path(&data_dir.join(path))), owner);
    }
    for glob in &response.watch_globs {
        let pattern = if Path::new(glob).is_absolute() {
            glob.clone()
        } else {
            format!("{}/{glob}", data_dir.display())
        };
        if let Err(err) = tracker.record(DepKey::Glob(pattern), owner) {
            log!("error"; "`{owner}`: invalid watch glob `{glob}`: {err}");
            failures += 1;
        }
    }

    if response.global.is_some() && owner != PRE_HOOK {
        log!("warn"; "`{owner}` returned `global`, which only the pre-generation hook may set");
    }
    failures
}

/// Render one planned path of `page` and write its HTML and entry script.
async fn render_one(site: &Site, page: &Page, render: PlannedRender) -> Result<(), GenerateError> {
    let PlannedRender { path, data } = render;

    let mut call_data = Map::new();
    call_data.insert("page".into(), Value::Object(page.front_matter.clone()));
    call_data.insert("path".into(), Value::String(path.clone()));
    call_data.extend(data);
    let call_data = Value::Object(call_data);

    let (html, entry) = {
        let pages = site.pages.read();
        let renderer = Renderer::new(&pages, &site.tracker);
        let failed = |source| GenerateError::Render {
            page: page.name.clone(),
            source,
        };
        let chain = renderer.wrapper_chain(&page.name).map_err(failed)?;
        let entry = compose(&chain);
        (renderer.render_chain(chain, &call_data).map_err(failed)?, entry)
    };

    site.writer
        .write(ArtifactKind::Page, &page.name, &page_file(&path), html)
        .await?;
    if let Some(entry) = entry {
        let target = entry_file(&path, &site.config.build.entry_file);
        site.writer
            .write(ArtifactKind::Entry, &page.name, &target, entry)
            .await?;
    }
    Ok(())
}

/// `render_template` for a page's generate script.
///
/// The rendering page depends on every template it renders this way.
struct SiteRenderer {
    site: Arc<Site>,
    page: String,
}

impl RenderCapability for SiteRenderer {
    fn render(&self, page: &str, data: &Value) -> Result<String, RenderError> {
        let _ = self
            .site
            .tracker
            .write()
            .record(DepKey::Template(page.to_string()), &self.page);
        let pages = self.site.pages.read();
        Renderer::new(&pages, &self.site.tracker).render_page(page, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use serde_json::json;

    #[tokio::test]
    async fn test_wildcard_batch_renders_each_entry() {
        let fx = Fixture::new();
        fx.write_page(
            "blog/post.html",
            r#"---
generate: blog/*
---
<h1>{{ title }}</h1>
<script generate>
generate_pages([#{ path: "a", data: #{ title: "A" } }, #{ path: "b", data: #{ title: "B" } }]);
resolve();
</script>"#,
        );

        let report = fx.build().await;
        assert_eq!(report.requested, 1);
        assert_eq!(report.rendered, 2);
        assert_eq!(report.errors, 0);
        assert!(fx.read_output("blog/a/index.html").unwrap().contains("<h1>A</h1>"));
        assert!(fx.read_output("blog/b/index.html").unwrap().contains("<h1>B</h1>"));
    }

    #[tokio::test]
    async fn test_direct_render_without_script() {
        let fx = Fixture::new();
        fx.write_page(
            "about.html",
            "---\ngenerate: /about/\ntitle: About\n---\n<p>{{ title }} at {{ path }}</p>",
        );

        let report = fx.build().await;
        assert_eq!(report.rendered, 1);
        assert_eq!(fx.read_output("about/index.html").unwrap(), "<p>About at about</p>");
    }

    #[tokio::test]
    async fn test_script_without_batch_renders_literal_target_once() {
        let fx = Fixture::new();
        fx.write_page(
            "about.html",
            "---\ngenerate: about\n---\nok<script generate>resolve(#{ out_data: 7 });</script>",
        );

        let report = fx.build().await;
        assert_eq!(report.rendered, 1);
        assert!(fx.read_output("about/index.html").is_some());
        assert_eq!(fx.site.writer.ledger().out_data("about"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_wildcard_violation_isolated() {
        let fx = Fixture::new();
        fx.write_page(
            "x.html",
            "---\ngenerate: \"*/x/*\"\n---\nx<script generate>generate_pages(#{ path: \"a\" }); resolve();</script>",
        );
        fx.write_page("about.html", "---\ngenerate: about\n---\nabout");

        let report = fx.build().await;
        assert_eq!(report.requested, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.rendered, 1);
        assert!(fx.read_output("about/index.html").is_some());
    }

    #[tokio::test]
    async fn test_wildcard_target_without_script_renders_nothing() {
        let fx = Fixture::new();
        fx.write_page("tags.html", "---\ngenerate: tags/*\n---\nx");
        fx.write_page(
            "topics.html",
            "---\ngenerate: topics/*\n---\nx<script generate-use:\"../bad\"></script>",
        );

        let report = fx.build().await;
        assert_eq!(report.requested, 2);
        assert_eq!((report.rendered, report.errors), (0, 0));
    }

    #[tokio::test]
    async fn test_script_failure_counted() {
        let fx = Fixture::new();
        fx.write_page(
            "bad.html",
            "---\ngenerate: bad\n---\nx<script generate>reject(\"no data\");</script>",
        );
        fx.write_page(
            "lazy.html",
            "---\ngenerate: lazy\n---\nx<script generate>let x = 1;</script>",
        );

        let report = fx.build().await;
        assert_eq!((report.rendered, report.errors), (0, 2));
    }

    #[tokio::test]
    async fn test_generate_use_runs_referenced_script() {
        let fx = Fixture::new();
        fx.write_page(
            "list.html",
            "---\ngenerate: list/*\nslug: main\n---\nlist<script generate>generate_pages(#{ path: inputs.front_matter.slug }); resolve();</script>",
        );
        fx.write_page(
            "tags.html",
            "---\ngenerate: tags/*\nslug: t\n---\ntags<script generate-use:\"list\"></script>",
        );
        fx.write_page(
            "orphan.html",
            "---\ngenerate: orphan\n---\nx<script generate-use:\"nope\"></script>",
        );

        let report = fx.build().await;
        assert_eq!(report.errors, 1);
        assert_eq!(fx.read_output("list/main/index.html").unwrap(), "list");
        assert_eq!(fx.read_output("tags/t/index.html").unwrap(), "tags");
    }

    #[tokio::test]
    async fn test_expired_cache_entries_purged_before_script() {
        let fx = Fixture::new();
        fx.site.cache.lock().replace_group(
            "default",
            json!({
                "old": { "expires": 1, "data": 1 },
                "keep": { "data": 2 }
            })
            .as_object()
            .unwrap()
            .clone(),
        );
        fx.write_page(
            "p.html",
            r#"---
generate: p
---
x<script generate>
if cache.contains("old") { reject("stale entry visible"); }
cache.fresh = #{ data: 3 };
resolve();
</script>"#,
        );

        let report = fx.build().await;
        assert_eq!(report.errors, 0);

        let group = fx.site.cache.lock().group("default");
        assert!(!group.contains_key("old"));
        assert!(group.contains_key("keep"));
        assert_eq!(group["fresh"], json!({ "data": 3 }));
    }

    #[tokio::test]
    async fn test_invalid_expiry_is_fatal() {
        let fx = Fixture::new();
        fx.site.cache.lock().replace_group(
            "default",
            json!({ "bad": { "expires": "soon", "data": 1 } })
                .as_object()
                .unwrap()
                .clone(),
        );
        fx.write_page(
            "p.html",
            "---\ngenerate: p\n---\nx<script generate>resolve();</script>",
        );

        assert_eq!(fx.site.scan_all().await, 0);
        let err = run(&fx.site).await.unwrap_err();
        assert!(matches!(err, GenerateError::Cache(CacheError::InvalidExpiry { .. })));
    }

    #[tokio::test]
    async fn test_site_file_escape_fails_without_writing() {
        let fx = Fixture::new();
        fx.write_page(
            "feed.html",
            r#"---
generate: feed
---
x<script generate>
resolve(#{ site_files: #{ "../escape.txt": "x", "feed.json": [1] } });
</script>"#,
        );

        let report = fx.build().await;
        assert_eq!(report.errors, 1);
        assert_eq!(report.rendered, 1);
        assert!(fx.read_output("feed.json").is_some());
        assert!(!fx.dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_site_file_leading_slash_is_root_relative() {
        let fx = Fixture::new();
        fx.write_page(
            "feed.html",
            "---\ngenerate: feed\n---\nx<script generate>resolve(#{ site_files: #{ \"/feed.json\": [1] } });</script>",
        );

        let report = fx.build().await;
        assert_eq!(report.errors, 0);
        assert_eq!(fx.read_output("feed.json").unwrap(), "[\n  1\n]");
    }

    #[tokio::test]
    async fn test_batch_entry_escaping_output_fails_alone() {
        let fx = Fixture::new();
        fx.write_page(
            "blog/post.html",
            r#"---
generate: blog/*
---
post<script generate>
generate_pages([#{ path: "../../../evil" }, #{ path: "ok" }]);
resolve();
</script>"#,
        );

        let report = fx.build().await;
        assert_eq!((report.rendered, report.errors), (1, 1));
        assert_eq!(fx.read_output("blog/ok/index.html").unwrap(), "post");
        assert!(!fx.dir.path().join("evil").exists());
        assert!(!fx.dir.path().parent().unwrap().join("evil").exists());
    }

    #[tokio::test]
    async fn test_entry_scripts_composed_along_wrappers() {
        let fx = Fixture::new();
        fx.write_page("base.html", "<script entry>base();</script><main>{{@body}}</main>");
        fx.write_page(
            "post.html",
            "---\ngenerate: post\nwrapper: base\n---\n<script entry>post();</script><p>hi</p>",
        );

        let report = fx.build().await;
        assert_eq!(report.rendered, 1);
        assert_eq!(fx.read_output("post/index.html").unwrap(), "<main><p>hi</p></main>");
        assert_eq!(fx.read_output("post/entry.js").unwrap(), "post();\nbase();");
        assert!(
            fx.site
                .tracker
                .read()
                .template_dependents("base")
                .contains("post")
        );
    }

    #[tokio::test]
    async fn test_global_change_requeues_readers_only() {
        let fx = Fixture::new();
        fx.write_hook(ScriptKind::PreGenerate, "resolve(#{ global: #{ title: \"One\" } });");
        fx.write_page(
            "home.html",
            "---\ngenerate: home\n---\n{{ title }}<script generate>let t = global.get(\"title\"); resolve();</script>",
        );
        fx.write_page("about.html", "---\ngenerate: about\n---\nabout");

        let first = fx.build().await;
        assert_eq!(first.requested, 2);
        assert!(fx.site.tracker.read().global_dependents().contains("home"));

        let second = run(&fx.site).await.unwrap();
        assert_eq!(second.requested, 0);

        fx.write_hook(ScriptKind::PreGenerate, "resolve(#{ global: #{ title: \"Two\" } });");
        let third = run(&fx.site).await.unwrap();
        assert_eq!(third.requested, 1);
        assert_eq!(third.rendered, 1);
    }

    #[tokio::test]
    async fn test_undefined_global_fails_page() {
        let fx = Fixture::new();
        fx.write_page(
            "home.html",
            "---\ngenerate: home\n---\nx<script generate>let t = global.get(\"missing\"); resolve();</script>",
        );

        let report = fx.build().await;
        assert_eq!(report.errors, 1);
        assert!(fx.site.tracker.read().global_dependents().is_empty());
    }

    #[tokio::test]
    async fn test_post_hook_sees_ledger() {
        let fx = Fixture::new();
        fx.write_hook(
            ScriptKind::PostGenerate,
            r#"
            if ledger.pages.len() == 0 { reject("empty ledger"); }
            resolve(#{ site_files: #{ "summary.txt": "done" } });
            "#,
        );
        fx.write_page("about.html", "---\ngenerate: about\n---\nabout");

        let report = fx.build().await;
        assert_eq!(report.errors, 0);
        assert_eq!(fx.read_output("summary.txt").unwrap(), "done");
    }

    #[tokio::test]
    async fn test_render_template_records_dependency() {
        let fx = Fixture::new();
        fx.write_page("card.html", "<b>{{ name }}</b>");
        fx.write_page(
            "home.html",
            r#"---
generate: home
---
x<script generate>
let card = render_template("card", #{ name: "x" });
resolve(#{ site_files: #{ "card.html": card } });
</script>"#,
        );

        let report = fx.build().await;
        assert_eq!(report.errors, 0);
        assert_eq!(fx.read_output("card.html").unwrap(), "<b>x</b>");
        assert!(
            fx.site
                .tracker
                .read()
                .template_dependents("card")
                .contains("home")
        );
    }

    #[tokio::test]
    async fn test_watch_files_resolved_against_data_dir() {
        let fx = Fixture::new();
        let posts = fx.write_data("posts.json", "[]");
        fx.write_page(
            "blog.html",
            r#"---
generate: blog
---
x<script generate>
resolve(#{ watch_files: ["posts.json"], watch_globs: ["drafts/*.md"] });
</script>"#,
        );

        fx.build().await;
        let tracker = fx.site.tracker.read();
        assert!(tracker.dependents_of_path(&posts).unwrap().contains("blog"));
        let draft = fx.site.config.build.data.join("drafts/x.md");
        assert!(tracker.dependents_of_path(&draft).unwrap().contains("blog"));
    }
}
