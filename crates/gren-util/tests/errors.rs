use gren_util::errors::GrenError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = GrenError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_manifest_error_display() {
    let err = GrenError::Manifest {
        message: "bad syntax".to_string(),
    };
    assert_eq!(err.to_string(), "Manifest error: bad syntax");
}

#[test]
fn test_resolution_error_display() {
    let err = GrenError::Resolution {
        message: "conflict".to_string(),
    };
    assert_eq!(err.to_string(), "Dependency resolution failed: conflict");
}

#[test]
fn test_cache_error_display() {
    let err = GrenError::Cache {
        message: "not a package".to_string(),
    };
    assert_eq!(err.to_string(), "Package cache error: not a package");
}

#[test]
fn test_lock_error_display() {
    let err = GrenError::Lock {
        message: "/tmp/cache is locked".to_string(),
    };
    assert_eq!(err.to_string(), "Cache lock error: /tmp/cache is locked");
}

#[test]
fn test_config_error_display() {
    let err = GrenError::Config {
        message: "bad toml".to_string(),
    };
    assert_eq!(err.to_string(), "Configuration error: bad toml");
}

#[test]
fn test_generic_error_display() {
    let err = GrenError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}

#[test]
fn test_io_error_from_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let gren_err: GrenError = io_err.into();
    assert!(matches!(gren_err, GrenError::Io(_)));
}
