use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rich_doc::{Node, basic};
use serde_json::json;

/// A document of `blocks` paragraphs, every other one inside a blockquote.
fn create_doc(blocks: usize) -> Node {
    let content: Vec<_> = (0..blocks)
        .map(|i| {
            let para = json!({"type": "paragraph", "content": [
                {"type": "text", "text": "lorem ipsum "},
                {"type": "text", "text": "dolor", "marks": [{"type": "em"}]}
            ]});
            if i % 2 == 0 {
                para
            } else {
                json!({"type": "blockquote", "content": [para]})
            }
        })
        .collect();
    basic::schema()
        .node_from_json(&json!({"type": "doc", "content": content}))
        .expect("bench doc is valid")
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [10usize, 100, 1_000] {
        let doc = create_doc(size);
        let end = doc.content().size();
        group.bench_with_input(BenchmarkId::new("cached", size), &size, |b, _| {
            let mut pos = 0;
            b.iter(|| {
                pos = (pos + 7919) % end;
                black_box(doc.resolve(pos).expect("in range"));
            });
        });
        group.bench_with_input(BenchmarkId::new("uncached", size), &size, |b, _| {
            let mut pos = 0;
            b.iter(|| {
                pos = (pos + 7919) % end;
                black_box(doc.resolve_no_cache(pos).expect("in range"));
            });
        });
    }

    group.finish();
}

fn bench_nodes_between(c: &mut Criterion) {
    let mut group = c.benchmark_group("nodes_between");

    for size in [10usize, 100, 1_000] {
        let doc = create_doc(size);
        let end = doc.content().size();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut count = 0usize;
                doc.nodes_between(end / 4, end / 2, |_, _, _, _| {
                    count += 1;
                    true
                });
                black_box(count);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_nodes_between);
criterion_main!(benches);
