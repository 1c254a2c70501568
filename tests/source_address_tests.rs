//! Address algebra invariants exercised through the public API.

use sourcepack::sourceaddr::{
    self, parse_final_source, parse_source, resolve_relative, FinalSource, Source,
};

#[test]
fn test_canonical_addresses_round_trip() {
    let corpus = [
        "./a/b",
        "../c",
        "hashicorp/subnets/cidr",
        "hashicorp/subnets/cidr//sub/path",
        "host.example/ns/name/target",
        "awesomecorp/happycloud",
        "git::https://github.com/org/repo.git",
        "git::https://github.com/org/repo.git?ref=main",
        "git::https://github.com/org/repo.git//sub?ref=main",
        "git::ssh://git.example.com/repo.git",
        "https://example.com/pkg.tar.gz",
        "https://example.com/pkg.tar.gz//sub/path",
        "https://example.com/pkg//sub?archive=tgz",
    ];
    for addr in corpus {
        let parsed = parse_source(addr).unwrap_or_else(|e| panic!("{addr}: {e}"));
        assert_eq!(parsed.to_string(), addr);
    }
}

#[test]
fn test_final_addresses_round_trip() {
    let corpus = [
        "./a/b",
        "hashicorp/subnets/cidr@1.2.3",
        "host.example/ns/name/target@1.2.3//sub",
        "awesomecorp/happycloud@2.0.1",
        "git::https://github.com/org/repo.git//sub",
    ];
    for addr in corpus {
        let parsed = parse_final_source(addr).unwrap_or_else(|e| panic!("{addr}: {e}"));
        assert_eq!(parsed.to_string(), addr);
    }
}

#[test]
fn test_outer_whitespace_always_errors() {
    for addr in ["", " ./a", "./a ", "\t./a", "./a\n"] {
        assert!(parse_source(addr).is_err(), "{addr:?} should not parse");
        assert!(parse_final_source(addr).is_err(), "{addr:?} should not parse");
    }
}

#[test]
fn test_resolve_relative_returns_absolute_verbatim() {
    let bases = [
        "./base",
        "hashicorp/subnets/cidr",
        "git::https://github.com/org/repo.git//sub",
    ];
    let absolutes = [
        "hashicorp/subnets/cidr//other",
        "git::https://github.com/other/repo.git",
    ];
    for base in bases {
        let base = parse_source(base).unwrap();
        for abs in absolutes {
            let abs = parse_source(abs).unwrap();
            assert_eq!(resolve_relative(&base, &abs).unwrap(), abs);
        }
    }
}

#[test]
fn test_resolve_relative_preserves_base_kind() {
    let rel = parse_source("./modules/net").unwrap();
    let cases = [
        ("./base/dir", "Local"),
        ("hashicorp/subnets/cidr//lib", "Registry"),
        ("awesomecorp/happycloud//lib", "Component"),
        ("git::https://github.com/org/repo.git//lib", "Remote"),
    ];
    for (base, want_kind) in cases {
        let base = parse_source(base).unwrap();
        let got = resolve_relative(&base, &rel).unwrap();
        let got_kind = match got {
            Source::Local(_) => "Local",
            Source::Registry(_) => "Registry",
            Source::Component(_) => "Component",
            Source::Remote(_) => "Remote",
        };
        assert_eq!(got_kind, want_kind, "resolving against {base}");
    }
}

#[test]
fn test_version_constraint_support_by_kind() {
    assert!(!parse_source("./a").unwrap().supports_version_constraints());
    assert!(!parse_source("git::https://github.com/org/repo.git")
        .unwrap()
        .supports_version_constraints());
    assert!(parse_source("hashicorp/subnets/cidr")
        .unwrap()
        .supports_version_constraints());
    assert!(parse_source("awesomecorp/happycloud")
        .unwrap()
        .supports_version_constraints());
}

#[test]
fn test_final_registry_source_components() {
    let addr = parse_final_source("host.example/ns/name/target@1.2.3//sub").unwrap();
    let FinalSource::Registry(reg) = addr else {
        panic!("expected a final registry source");
    };
    assert_eq!(reg.package().host(), "host.example");
    assert_eq!(reg.sub_path(), "sub");
    assert_eq!(reg.selected_version().to_string(), "1.2.3");
    assert_eq!(reg.unversioned().to_string(), "host.example/ns/name/target//sub");
}

#[test]
fn test_error_messages_name_the_problem() {
    let cases = [
        ("./boop/../beep", "canonical form \"./beep\""),
        (".", "canonical form \"./\""),
        ("..", "canonical form \"../\""),
        (
            "hashicorp/subnets/cidr//a/../b",
            "must be slash-separated relative path",
        ),
        ("git::git://example.com/x.git", "redundant \"git\" source type"),
        ("git://example.com/x.git", "https or ssh scheme"),
        ("https://example.com/foo.zip", ".tar.gz or .tgz"),
        ("http://example.com/foo.tar.gz", "unencrypted HTTP"),
        ("https://u:p@example.com/foo.tgz", "username or password"),
        ("ftp://example.com/foo.tgz", "unsupported URL scheme"),
    ];
    for (addr, want) in cases {
        let err = parse_source(addr).unwrap_err();
        assert!(
            err.to_string().contains(want),
            "{addr}: expected {want:?} in {err:?}"
        );
    }
}

#[test]
fn test_registry_host_recognition() {
    // A dotted first component is a host; a plain one is a namespace.
    let src = parse_source("registry.example.com:8443/ns/name/target");
    assert!(matches!(src, Ok(Source::Registry(_))), "{src:?}");

    let Ok(Source::Registry(reg)) = parse_source("TERRAFORM.EXAMPLE.COM/ns/name/target") else {
        panic!("expected registry source");
    };
    // Hosts normalize to lowercase.
    assert_eq!(reg.package().host(), "terraform.example.com");
}

#[test]
fn test_source_filename() {
    let addr = parse_source("hashicorp/subnets/cidr//test/simple.tf").unwrap();
    assert_eq!(sourceaddr::source_filename(&addr), "simple.tf");
    let addr = parse_source("./modules/main.tf").unwrap();
    assert_eq!(sourceaddr::source_filename(&addr), "main.tf");
}
