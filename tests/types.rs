// ABOUTME: Integration tests for type-safe identifiers and validated types.
// ABOUTME: Tests parsing, validation, and identity rules of images, digests and commits.

use convoy::types::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn parse_simple_name() {
        let img = ImageRef::parse("nginx").unwrap();
        assert_eq!(img.name(), "nginx");
        assert_eq!(img.tag(), Some("latest"));
        assert!(img.registry().is_none());
        assert!(img.digest().is_none());
    }

    #[test]
    fn parse_name_with_tag() {
        let img = ImageRef::parse("nginx:1.25").unwrap();
        assert_eq!(img.name(), "nginx");
        assert_eq!(img.tag(), Some("1.25"));
    }

    #[test]
    fn parse_with_registry() {
        let img = ImageRef::parse("registry.example.com/myapp:v1.2.3").unwrap();
        assert_eq!(img.registry(), Some("registry.example.com"));
        assert_eq!(img.name(), "myapp");
        assert_eq!(img.tag(), Some("v1.2.3"));
    }

    #[test]
    fn parse_with_org() {
        let img = ImageRef::parse("ghcr.io/org/repo:latest").unwrap();
        assert_eq!(img.registry(), Some("ghcr.io"));
        assert_eq!(img.name(), "org/repo");
        assert_eq!(img.tag(), Some("latest"));
    }

    #[test]
    fn parse_with_digest() {
        let digest = "sha256:abc123def456";
        let img = ImageRef::parse(&format!("nginx@{}", digest)).unwrap();
        assert_eq!(img.name(), "nginx");
        assert_eq!(img.digest().map(Digest::to_string).as_deref(), Some(digest));
        assert!(img.tag().is_none());
    }

    #[test]
    fn parse_full_reference() {
        let img = ImageRef::parse("ghcr.io/org/repo:v1@sha256:abc123").unwrap();
        assert_eq!(img.registry(), Some("ghcr.io"));
        assert_eq!(img.name(), "org/repo");
        assert_eq!(img.tag(), Some("v1"));
        assert_eq!(img.digest().map(Digest::hex), Some("abc123"));
    }

    #[test]
    fn parse_empty_returns_error() {
        assert!(ImageRef::parse("").is_err());
    }

    #[test]
    fn parse_invalid_chars_returns_error() {
        assert!(ImageRef::parse("invalid image!").is_err());
    }

    #[test]
    fn display_formats_correctly() {
        let img = ImageRef::parse("ghcr.io/org/repo:v1").unwrap();
        assert_eq!(img.to_string(), "ghcr.io/org/repo:v1");
    }
}

mod service_name_tests {
    use super::*;

    #[test]
    fn valid_dns_name() {
        let name = ServiceName::new("my-service").unwrap();
        assert_eq!(name.as_str(), "my-service");
    }

    #[test]
    fn empty_returns_error() {
        assert!(ServiceName::new("").is_err());
    }

    #[test]
    fn too_long_returns_error() {
        let long_name = "a".repeat(64);
        assert!(ServiceName::new(&long_name).is_err());
    }

    #[test]
    fn starts_with_hyphen_returns_error() {
        assert!(ServiceName::new("-service").is_err());
    }

    #[test]
    fn ends_with_hyphen_returns_error() {
        assert!(ServiceName::new("service-").is_err());
    }

    #[test]
    fn uppercase_returns_error() {
        assert!(ServiceName::new("MyService").is_err());
    }

    #[test]
    fn valid_63_chars() {
        let name = "a".repeat(63);
        assert!(ServiceName::new(&name).is_ok());
    }
}

mod image_pinning_tests {
    use super::*;

    #[test]
    fn repository_drops_tag_and_digest() {
        let img = ImageRef::parse("ghcr.io/org/repo:v1@sha256:abc123").unwrap();
        assert_eq!(img.repository(), "ghcr.io/org/repo");
    }

    #[test]
    fn with_tag_unpins() {
        let img = ImageRef::parse("ghcr.io/org/repo@sha256:abc123").unwrap();
        assert!(img.is_pinned());

        let retagged = img.with_tag("1a2b3c4");
        assert_eq!(retagged.tag(), Some("1a2b3c4"));
        assert!(!retagged.is_pinned());
    }

    #[test]
    fn with_digest_pins_and_keeps_tag() {
        let digest = Digest::parse("sha256:abc123").unwrap();
        let img = ImageRef::parse("ghcr.io/org/repo:v1").unwrap().with_digest(&digest);
        assert!(img.is_pinned());
        assert_eq!(img.tag(), Some("v1"));
        assert_eq!(img.digest(), Some(&digest));
    }
}

mod digest_tests {
    use super::*;

    #[test]
    fn parses_algorithm_and_hex() {
        let digest = Digest::parse("sha256:9f86d081884c7d65").unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.hex(), "9f86d081884c7d65");
        assert_eq!(digest.to_string(), "sha256:9f86d081884c7d65");
    }

    #[test]
    fn short_form_truncates_hex() {
        let digest = Digest::parse("sha256:9f86d081884c7d659a2feaa0c55ad015").unwrap();
        assert_eq!(digest.short(), "sha256:9f86d081884c");
    }

    #[test]
    fn rejects_missing_separator() {
        assert_eq!(Digest::parse("abc123"), Err(DigestError::MissingSeparator));
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!(matches!(
            Digest::parse("md5:abc123"),
            Err(DigestError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn rejects_uppercase_and_non_hex() {
        assert_eq!(Digest::parse("sha256:ABC"), Err(DigestError::InvalidChar('A')));
        assert_eq!(Digest::parse("sha256:xyz"), Err(DigestError::InvalidChar('x')));
    }

    #[test]
    fn serializes_as_string() {
        let digest = Digest::parse("sha256:abc123").unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, "\"sha256:abc123\"");
        assert!(serde_json::from_str::<Digest>("\"nope\"").is_err());
    }
}

mod commit_tests {
    use super::*;

    #[test]
    fn normalizes_to_lowercase() {
        let sha = CommitSha::new("ABCDEF1234").unwrap();
        assert_eq!(sha.as_str(), "abcdef1234");
        assert_eq!(sha.short(), "abcdef1");
    }

    #[test]
    fn rejects_short_or_long_values() {
        assert!(CommitSha::new("abc12").is_err());
        assert!(CommitSha::new(&"a".repeat(41)).is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!(CommitSha::new("main-branch").is_err());
    }
}

mod environment_tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("dev".parse::<EnvironmentName>().unwrap(), EnvironmentName::Dev);
        assert_eq!("Production".parse::<EnvironmentName>().unwrap(), EnvironmentName::Prod);
        assert_eq!("stage".parse::<EnvironmentName>().unwrap(), EnvironmentName::Staging);
        assert!("qa".parse::<EnvironmentName>().is_err());
    }

    #[test]
    fn only_prod_is_production() {
        assert!(EnvironmentName::Prod.is_production());
        assert!(!EnvironmentName::Staging.is_production());
        assert!(!EnvironmentName::Dev.is_production());
    }
}

mod artifact_tests {
    use super::*;

    fn artifact(tag: Option<&str>, digest: &str) -> ArtifactRef {
        ArtifactRef::new(
            "registry.example.com/shop",
            tag.map(str::to_string),
            Digest::parse(digest).unwrap(),
            CommitSha::new("1a2b3c4").unwrap(),
        )
    }

    #[test]
    fn identity_is_the_digest() {
        let a = artifact(Some("v1"), "sha256:abc");
        let b = artifact(Some("latest"), "sha256:abc");
        let c = artifact(Some("v1"), "sha256:def");
        assert!(a.same_artifact(&b));
        assert!(!a.same_artifact(&c));
    }

    #[test]
    fn pinned_reference_uses_digest() {
        let a = artifact(Some("v1"), "sha256:abc");
        assert_eq!(a.pinned(), "registry.example.com/shop@sha256:abc");
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(DeploymentId::generate(), DeploymentId::generate());
    }

    #[test]
    fn build_request_id_stores_value() {
        let id = BuildRequestId::new("build-42");
        assert_eq!(id.as_str(), "build-42");
        assert_eq!(id.to_string(), "build-42");
    }
}
