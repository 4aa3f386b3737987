//! Source job run through the lifecycle against a mock source

mod common;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gigscout::jobs::ProbeJob;
use gigscout::models::RunStatus;
use gigscout::scheduler::JobDescriptor;
use gigscout::storage::{HealthLedger, RunLedger};

async fn source_with_robots(robots: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(robots))
        .mount(&server)
        .await;
    server
}

fn source_job(name: &str, url: String, attempts: u32) -> JobDescriptor {
    JobDescriptor::from_async(name, ProbeJob::new(name, url, common::test_crawler(attempts)))
}

/// A disallowed entry URL is never fetched and leaves health untouched
#[tokio::test]
async fn test_disallowed_source_is_skipped() {
    let server = source_with_robots("User-agent: *\nDisallow: /private\n").await;
    Mock::given(method("GET"))
        .and(path("/private/jobs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let repo = common::memory_repo();
    let lifecycle = common::test_lifecycle(&repo);
    let job = source_job("jiji", format!("{}/private/jobs", server.uri()), 2);

    assert_eq!(lifecycle.run(&job).await, RunStatus::SkippedRobots);

    let runs = repo.runs_for("jiji", 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::SkippedRobots);
    assert!(repo.health_for("jiji").unwrap().is_none());
}

/// An allowed source is fetched once with the rotated user agent
#[tokio::test]
async fn test_allowed_source_fetched_with_identity() {
    let server = source_with_robots("User-agent: *\nDisallow: /private\n").await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(header("user-agent", "GigscoutTest/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gigs</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let repo = common::memory_repo();
    let lifecycle = common::test_lifecycle(&repo);
    let job = source_job("jiji", format!("{}/jobs", server.uri()), 2);

    assert_eq!(lifecycle.run(&job).await, RunStatus::Success);

    let runs = repo.runs_for("jiji", 10).unwrap();
    assert_eq!(runs[0].status, RunStatus::Success);
    assert!(runs[0].error_message.is_none());
    assert!(repo.health_for("jiji").unwrap().is_some());
}

/// A permanent HTTP error fails the run without retries
#[tokio::test]
async fn test_missing_page_fails_run() {
    let server = source_with_robots("User-agent: *\nAllow: /\n").await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let repo = common::memory_repo();
    let lifecycle = common::test_lifecycle(&repo);
    let url = format!("{}/gone", server.uri());
    let job = source_job("gumtree", url.clone(), 3);

    assert_eq!(lifecycle.run(&job).await, RunStatus::Failed);

    let runs = repo.runs_for("gumtree", 10).unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error_message.as_deref().unwrap().contains(&url));
    assert!(repo.health_for("gumtree").unwrap().is_none());
}
