//! Compilation performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use matrixc::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn bench_simple_markup(c: &mut Criterion) {
    let markup = r#"<view class="card" x:if="{{visible}}"><text>{{title}}</text></view>"#;
    let file = Path::new("/bench/src/card/index.wxml");

    c.bench_function("simple_markup", |b| {
        b.iter(|| compile_markup(black_box(markup), "Card", file).unwrap())
    });
}

fn bench_large_markup(c: &mut Criterion) {
    let mut markup = String::from("<view class=\"list\">\n");
    for i in 0..500 {
        markup.push_str(&format!(
            "<view x:for=\"{{{{rows{i}}}}}\" x:key=\"id\" bindtap=\"onTap\"><text x:if=\"{{{{item.on}}}}\">{{{{item.label}}}}</text><text x:else>off {i}</text></view>\n"
        ));
    }
    markup.push_str("</view>");
    let file = Path::new("/bench/src/list/index.wxml");

    c.bench_function("large_markup", |b| {
        b.iter(|| compile_markup(black_box(&markup), "List", file).unwrap())
    });
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn bench_project_run(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    for i in 0..20 {
        let dir = format!("src/item{}", i);
        write(root, &format!("{}/index.wxml", dir), r#"<view class="row" style="height: 48rpx">{{label}}<card/></view>"#);
        write(root, &format!("{}/index.json", dir), r#"{ "usingComponents": { "card": "../card/index" } }"#);
        write(root, &format!("{}/index.js", dir), "import { fmt } from './fmt';\nComponent({ data: { label: fmt('x') } })");
        write(root, &format!("{}/fmt.js", dir), "export const fmt = (s) => s;");
        write(root, &format!("{}/index.wxss", dir), ".row { padding: 12rpx; }");
    }
    write(root, "src/card/index.wxml", "<text>card</text>");
    write(root, "src/card/index.json", "{}");
    write(root, "src/card/index.js", "Component({})");

    let options = CompilerOptions {
        write_assets: false,
        ..CompilerOptions::new(root)
    };

    c.bench_function("project_run", |b| {
        b.iter(|| compile_project(black_box(options.clone())).unwrap())
    });
}

criterion_group!(benches, bench_simple_markup, bench_large_markup, bench_project_run);
criterion_main!(benches);
