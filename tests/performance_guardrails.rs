use std::sync::Arc;
use std::time::Instant;

use fir_compiler::{compile_route, compile_template, ActionRegistry, CompileOptions, MemorySource};

fn bound_rows(count: usize) -> String {
    let mut content = String::from("<ul>");
    for i in 0..count {
        content.push_str(&format!(
            r#"<li x-fir-live="update{i}:ok,reload{i}:error">{{{{ .Row{i} }}}}</li>"#
        ));
    }
    content.push_str("</ul>");
    content
}

// ---------------------------------------------------------------------------
// Linear output growth
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn output_growth_linear() {
    let registry = ActionRegistry::default();
    let mut sizes = Vec::new();

    for count in [1, 10, 100, 1000] {
        let result = compile_template("rows.html", &bound_rows(count), &registry).unwrap();
        sizes.push(result.content.len());
    }

    println!("Sizes: {:?}", sizes);

    let ratio = sizes[3] as f64 / sizes[2] as f64;
    println!("Growth Ratio (100 -> 1000): {}", ratio);
    assert!(
        ratio < 15.0,
        "Output growth must be roughly linear (expected ~10x, got {})",
        ratio
    );
}

// ---------------------------------------------------------------------------
// One block per distinct fragment
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn distinct_fragments_distinct_blocks() {
    let count = 1000;
    let result =
        compile_template("rows.html", &bound_rows(count), &ActionRegistry::default()).unwrap();

    assert_eq!(result.blocks.len(), count, "Must extract exactly {} blocks", count);
    assert_eq!(result.event_templates.len(), count * 2);
}

// ---------------------------------------------------------------------------
// Large route
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore]
async fn large_route_stability() {
    let source = MemorySource::new();
    for file in 0..200 {
        let mut content = String::from("<div>");
        for _ in 0..10 {
            content.push_str("<span>static node</span>");
        }
        // nesting depth
        for depth in 0..200 {
            content.push_str(&format!(r#"<div x-fir-live="e{file}x{depth}:ok">"#));
        }
        content.push_str("{{ .Leaf }}");
        for _ in 0..200 {
            content.push_str("</div>");
        }
        content.push_str("</div>");
        source.insert(&format!("f{file}.html"), content);
    }

    let files: Vec<String> = (0..200).map(|i| format!("f{i}.html")).collect();
    let start = Instant::now();
    let route = compile_route(
        Arc::new(source),
        "large",
        &files,
        Arc::new(ActionRegistry::default()),
        &CompileOptions::default(),
    )
    .await;
    let duration = start.elapsed();

    let route = route.unwrap();
    assert_eq!(route.templates.len(), 200);
    assert_eq!(route.event_templates.len(), 200 * 200);
    println!("Large Route Build Time: {:?}", duration);
}
