use std::fs;
use std::path::{Path, PathBuf};

const ALLOWED_DIRECT_EXCHANGE_CALLERS: &[&str] = &["src/execution/gateway.rs"];

const DIRECT_CALL_PATTERNS: &[&str] = &[
    ".client.submit(",
    ".client.order_by_client_id(",
    ".client.cancel(",
    ".client.status(",
    ".client.price(",
    ".client.balance(",
];

fn collect_rust_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

/// Every exchange call has to pass through `OrderGateway` so it gets
/// timeouts, retries and request-id deduplication.
#[test]
fn exchange_client_calls_are_limited_to_the_gateway() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let src_root = repo_root.join("src");
    let mut files = Vec::new();
    collect_rust_files(&src_root, &mut files);

    let mut offenders = Vec::new();
    for file in files {
        let rel = file
            .strip_prefix(repo_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        if ALLOWED_DIRECT_EXCHANGE_CALLERS.iter().any(|allowed| *allowed == rel) {
            continue;
        }

        let content = fs::read_to_string(&file).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            let looks_like_direct_call = DIRECT_CALL_PATTERNS
                .iter()
                .any(|pattern| trimmed.contains(pattern));
            if looks_like_direct_call {
                offenders.push(format!("{rel}:{}: {}", idx + 1, trimmed));
            }
        }
    }

    // The gateway itself must still be the one making every kind of call
    let gateway = fs::read_to_string(src_root.join("execution/gateway.rs")).unwrap_or_default();
    for pattern in DIRECT_CALL_PATTERNS {
        assert!(gateway.contains(pattern), "gateway no longer calls {pattern}");
    }

    assert!(
        offenders.is_empty(),
        "direct exchange calls detected outside the order gateway:\n{}",
        offenders.join("\n")
    );
}
