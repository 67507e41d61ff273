use repo_harvester::error::{ ErrorClass, HarvestError, Result };
use std::error::Error;

#[test]
fn test_error_display() {
    let error = HarvestError::RateLimitExceeded("Rate limit hit".to_string());
    assert_eq!(format!("{}", error), "Rate limit exceeded: Rate limit hit");

    let error = HarvestError::MalformedResponse("missing data".to_string());
    assert_eq!(format!("{}", error), "Malformed response: missing data");

    let error = HarvestError::ApiError("API failed".to_string());
    assert_eq!(format!("{}", error), "GitHub API error: API failed");

    let error = HarvestError::Upstream { status: 503, message: "Service Unavailable".to_string() };
    assert_eq!(format!("{}", error), "Upstream returned 503: Service Unavailable");

    let error = HarvestError::InvalidShard("cannot parse shard 'stars'".to_string());
    assert_eq!(format!("{}", error), "Invalid shard: cannot parse shard 'stars'");

    assert_eq!(format!("{}", HarvestError::Cancelled), "Cancelled");
}

#[test]
fn test_error_source() {
    let error = HarvestError::RateLimitExceeded("Rate limit hit".to_string());
    assert!(error.source().is_none());

    let error = HarvestError::RetriesExhausted {
        attempts: 5,
        source: Box::new(HarvestError::RateLimitExceeded("Rate limit hit".to_string())),
    };
    assert_eq!(format!("{}", error), "Gave up after 5 attempts: Rate limit exceeded: Rate limit hit");
    let source = error.source().expect("exhausted retries keep the last error");
    assert_eq!(source.to_string(), "Rate limit exceeded: Rate limit hit");
}

#[test]
fn test_error_classes() {
    let transient = vec![
        HarvestError::RateLimitExceeded("secondary rate limit".to_string()),
        HarvestError::Upstream { status: 502, message: "Bad Gateway".to_string() },
        HarvestError::SearchTimeout("This may be the result of a timeout".to_string())
    ];
    for error in &transient {
        assert_eq!(error.class(), ErrorClass::Transient, "{}", error);
        assert!(error.is_transient());
        assert!(!error.is_run_fatal());
    }

    let page_fatal = vec![
        HarvestError::ApiError("Something went wrong".to_string()),
        HarvestError::MalformedResponse("missing data".to_string()),
        HarvestError::StoreError("connection reset".to_string()),
        HarvestError::RetriesExhausted {
            attempts: 5,
            source: Box::new(HarvestError::Upstream { status: 500, message: String::new() }),
        },
        HarvestError::Cancelled
    ];
    for error in &page_fatal {
        assert_eq!(error.class(), ErrorClass::FatalPage, "{}", error);
    }

    let run_fatal = vec![
        HarvestError::AuthError("Bad credentials".to_string()),
        HarvestError::ConfigError("GITHUB_TOKEN is not set".to_string())
    ];
    for error in &run_fatal {
        assert_eq!(error.class(), ErrorClass::FatalRun, "{}", error);
        assert!(error.is_run_fatal());
    }
}

#[test]
fn test_error_conversion() {
    // Test that we can convert from other error types
    let reqwest_error = reqwest::Client::new().get("not a url").build().unwrap_err();
    let error: HarvestError = reqwest_error.into();
    assert!(matches!(error, HarvestError::NetworkError(_)));
    assert!(error.source().is_some());
}

#[test]
fn test_result_type() {
    fn returns_result() -> Result<String> {
        Ok("success".to_string())
    }

    let result = returns_result();
    assert!(result.is_ok());
    assert_eq!(result.unwrap(), "success");

    fn returns_error() -> Result<String> {
        Err(HarvestError::InvalidShard("stars:10..10".to_string()))
    }

    let result = returns_error();
    assert!(result.is_err());
}
