use sha2::{Digest, Sha256};
use std::sync::Arc;

use fir_compiler::{
    compile_route, compile_template, extract_blocks, ActionRegistry, CompileOptions,
    CompiledRoute, ErrorKind, EventTemplates, MemorySource,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sha256(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

fn route_digest(route: &CompiledRoute) -> String {
    sha256(&serde_json::to_string(route).unwrap())
}

/// A route with enough files to keep several workers busy.
fn many_files(count: usize) -> MemorySource {
    let source = MemorySource::new();
    for i in 0..count {
        source.insert(
            &format!("pages/page{i:03}.html"),
            format!(
                r#"<section x-fir-refresh="update:ok,page{i}:ok"><h2>{{{{ .Title }}}}</h2><p>{{{{ .Body{i} }}}}</p></section>
<ul x-fir-append:row="add{}"><li x-fir-remove="delete:ok">{{{{ .Row }}}}</li></ul>"#,
                i % 3
            ),
        );
    }
    source
}

async fn compile(source: Arc<MemorySource>, concurrency: usize) -> CompiledRoute {
    compile_route(
        source,
        "pages",
        &["pages".to_string()],
        Arc::new(ActionRegistry::default()),
        &CompileOptions {
            concurrency,
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

// ============================================================================
// Stable output
// ============================================================================

#[test]
fn same_template_same_bytes() {
    let html = r#"<div x-fir-live="create:ok->todo=>append;delete:error" class="box"><b>{{ .N }}</b></div>"#;
    let registry = ActionRegistry::default();
    let first = compile_template("a.html", html, &registry).unwrap();
    for _ in 0..20 {
        let next = compile_template("a.html", html, &registry).unwrap();
        assert_eq!(sha256(&next.content), sha256(&first.content));
        assert_eq!(next.blocks, first.blocks);
        assert_eq!(next.event_templates, first.event_templates);
    }
}

#[test]
fn block_names_only_depend_on_content() {
    let a = extract_blocks(r#"<p @fir:x:ok="a">{{ .Same }}</p>"#).unwrap();
    let b = extract_blocks(r#"<div id="z" @fir:y:error="b">{{ .Same }}</div>"#).unwrap();
    assert_eq!(
        a.blocks.keys().collect::<Vec<_>>(),
        b.blocks.keys().collect::<Vec<_>>()
    );

    let c = extract_blocks(r#"<p @fir:x:ok="a">{{ .Other }}</p>"#).unwrap();
    assert_ne!(
        a.blocks.keys().collect::<Vec<_>>(),
        c.blocks.keys().collect::<Vec<_>>()
    );
}

#[test]
fn compiled_output_is_a_fixed_point() {
    let html = r#"<div x-fir-refresh="a:ok"><span x-fir-live="b:error">{{ .B }}</span>{{ .A }}</div>"#;
    let registry = ActionRegistry::default();
    let once = compile_template("a.html", html, &registry).unwrap();
    let twice = compile_template("a.html", &once.content, &registry).unwrap();
    assert_eq!(twice.content, once.content);
    assert_eq!(twice.blocks, once.blocks);
    assert_eq!(twice.event_templates, once.event_templates);
}

#[test]
fn template_names_survive_recompilation() {
    let registry = ActionRegistry::default();

    let err = compile_template(
        "a.html",
        r#"<p x-fir-live="save:ok->my block">static</p>"#,
        &registry,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);

    let html = r#"<p x-fir-live="save:ok -> my_block-1">static</p>"#;
    let once = compile_template("a.html", html, &registry).unwrap();
    let twice = compile_template("a.html", &once.content, &registry).unwrap();
    assert_eq!(twice.content, once.content);
    assert_eq!(twice.event_templates, once.event_templates);
    assert!(once.event_templates.get("save:ok").unwrap().contains("my_block-1"));
}

// ============================================================================
// Concurrency does not change the result
// ============================================================================

#[tokio::test]
async fn route_digest_independent_of_pool_size() {
    let source = Arc::new(many_files(24));
    let serial = compile(source.clone(), 1).await;
    let expected = route_digest(&serial);

    for concurrency in [2, 4, 16] {
        let route = compile(source.clone(), concurrency).await;
        assert_eq!(route_digest(&route), expected, "concurrency {concurrency}");
    }

    assert_eq!(serial.templates.len(), 24);
    assert_eq!(serial.lookup("update:ok").unwrap().len(), 24);
    assert_eq!(serial.lookup("add1:ok").unwrap().len(), 1);
}

#[test]
fn merge_order_does_not_matter() {
    let parts: Vec<EventTemplates> = (0..5)
        .map(|i| {
            [
                (format!("e{}:ok", i % 2), format!("t{i}")),
                ("shared:ok".to_string(), "-".to_string()),
            ]
            .into_iter()
            .collect()
        })
        .collect();

    let forward = parts
        .iter()
        .cloned()
        .fold(EventTemplates::new(), EventTemplates::merged);
    let backward = parts
        .iter()
        .rev()
        .cloned()
        .fold(EventTemplates::new(), EventTemplates::merged);

    assert_eq!(forward, backward);
    assert_eq!(
        sha256(&serde_json::to_string(&forward).unwrap()),
        sha256(&serde_json::to_string(&backward).unwrap())
    );
    assert_eq!(forward.get("e0:ok").unwrap().len(), 3);
}
