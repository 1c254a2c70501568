//! Round trips between bundle directories and bundle archives.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{no_dependencies, remote, FakeFetcher, FakeRegistry};
use sourcepack::sourcebundle::{BuildContext, Builder, Bundle};

fn build_sample_bundle(target: &std::path::Path) -> Bundle {
    let ctx = BuildContext::new();
    let fetcher = Arc::new(FakeFetcher::new(
        [
            (
                "https://example.com/alpha.tgz".to_string(),
                vec![("main.tf", "# alpha\n"), ("sub/extra.tf", "# extra\n")],
            ),
            (
                "https://example.com/beta.tgz".to_string(),
                vec![("beta.txt", "beta content\n")],
            ),
        ]
        .into_iter()
        .collect(),
    ));
    let client = Arc::new(FakeRegistry::new(HashMap::new()));

    let mut builder = Builder::new(target, fetcher, client).unwrap();
    let diags = builder.add_remote_source(&ctx, remote("https://example.com/alpha.tgz"), no_dependencies());
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    let diags = builder.add_remote_source(&ctx, remote("https://example.com/beta.tgz"), no_dependencies());
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    builder.close().unwrap()
}

#[test]
fn test_archive_round_trip() {
    let source_dir = tempfile::tempdir().unwrap();
    let bundle = build_sample_bundle(source_dir.path());

    let mut archive = Vec::new();
    bundle.write_archive(&mut archive).unwrap();

    let extracted_dir = tempfile::tempdir().unwrap();
    let reopened = Bundle::extract_archive(&archive[..], extracted_dir.path()).unwrap();

    // The manifest travels byte-for-byte, so the checksums agree.
    assert_eq!(reopened.checksum_v1(), bundle.checksum_v1());
    assert_eq!(reopened.remote_packages(), bundle.remote_packages());

    let path = reopened
        .local_path_for_remote_source(&remote("https://example.com/alpha.tgz//sub/extra.tf"))
        .unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "# extra\n");
}

#[test]
fn test_extract_archive_rejects_non_bundle_input() {
    // A valid slug that contains no manifest is not a bundle.
    let tree = tempfile::tempdir().unwrap();
    std::fs::write(tree.path().join("file.txt"), b"not a bundle").unwrap();
    let mut slug = Vec::new();
    sourcepack::slug::pack(tree.path(), &mut slug, false).unwrap();

    let target = tempfile::tempdir().unwrap();
    let err = Bundle::extract_archive(&slug[..], target.path()).unwrap_err();
    assert!(
        err.to_string().contains("cannot read manifest"),
        "unexpected error: {err}"
    );
}
