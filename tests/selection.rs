//! Selection Integration Tests
//!
//! Ranking and filtering as observed through a full run.

mod common;

use common::{date, story, FakeFetcher, FakeValidator, Harness};
use joyful_bytes::core::PipelineSettings;
use joyful_bytes::domain::{word_count, ErrorKind, Stage};
use tokio_test::{assert_err, assert_ok};

/// Two qualifying stories, `top` ranked above `next`
fn ranked_pair() -> Harness {
    Harness::new(vec![
        story("https://news.example/top", 8, 0),
        story("https://news.example/next", 9, 0),
    ])
    .with_validator(
        FakeValidator::default()
            .verdict("https://news.example/top", 0.9, true)
            .verdict("https://news.example/next", 0.8, true),
    )
}

#[tokio::test]
async fn test_tie_goes_to_earliest_discovery() {
    let harness = Harness::new(vec![
        story("https://news.example/c1", 10, 0),
        story("https://news.example/c2", 9, 0),
        story("https://news.example/c3", 8, 30),
    ])
    .with_validator(
        FakeValidator::default()
            .verdict("https://news.example/c1", 0.9, true)
            .verdict("https://news.example/c2", 0.95, true)
            .verdict("https://news.example/c3", 0.95, true),
    );

    let artifact = assert_ok!(harness.orchestrator().run_for_date(date(1)).await);

    assert_eq!(
        artifact.candidate.unwrap().source_url,
        "https://news.example/c3"
    );
}

#[tokio::test]
async fn test_inappropriate_never_selected() {
    let harness = Harness::new(vec![
        story("https://news.example/top", 8, 0),
        story("https://news.example/ok", 9, 0),
    ])
    .with_validator(
        FakeValidator::default()
            .verdict("https://news.example/top", 1.0, false)
            .verdict("https://news.example/ok", 0.4, true),
    );

    let artifact = assert_ok!(harness.orchestrator().run_for_date(date(2)).await);

    assert_eq!(
        artifact.candidate.unwrap().source_url,
        "https://news.example/ok"
    );
}

#[tokio::test]
async fn test_selection_is_repeatable_across_dates() {
    let stories = || {
        vec![
            story("https://news.example/x", 7, 0),
            story("https://news.example/y", 7, 0),
        ]
    };

    let mut picks = Vec::new();
    for day in 3..6 {
        let harness = Harness::new(stories());
        let artifact = assert_ok!(harness.orchestrator().run_for_date(date(day)).await);
        picks.push(artifact.candidate.unwrap().source_url);
    }

    assert!(picks.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_queries_run_in_order_and_merge() {
    let mut harness = Harness::new(vec![
        story("https://news.example/a", 8, 0),
        story("https://news.example/a", 8, 0),
        story("https://news.example/b", 9, 0),
    ]);
    harness.settings = PipelineSettings {
        queries: vec!["good news".into(), "kindness".into()],
        ..harness.settings.clone()
    };

    assert_ok!(harness.orchestrator().run_for_date(date(6)).await);

    assert_eq!(harness.source.queries(), vec!["good news", "kindness"]);
    // Duplicates within and across queries are validated once
    assert_eq!(harness.validator.script.calls(), 2);
}

#[tokio::test]
async fn test_unfetchable_top_story_falls_through_to_next() {
    let harness = ranked_pair().with_fetcher(
        FakeFetcher::default()
            .broken("https://news.example/top")
            .page("https://news.example/next", 400),
    );

    let artifact = assert_ok!(harness.orchestrator().run_for_date(date(7)).await);

    let candidate = artifact.candidate.unwrap();
    assert_eq!(candidate.source_url, "https://news.example/next");
    let article = candidate.article_text.unwrap();
    assert_eq!(word_count(&article), 400);
    // The synthesizer worked from the article, not the snippet
    assert_eq!(artifact.prompt.unwrap().story_summary, Some(article));

    let fetcher = harness.fetcher.as_ref().unwrap();
    assert_eq!(
        fetcher.fetched(),
        vec!["https://news.example/top", "https://news.example/next"]
    );
}

#[tokio::test]
async fn test_short_article_is_passed_over() {
    let harness = ranked_pair().with_fetcher(
        FakeFetcher::default()
            .page("https://news.example/top", 300)
            .page("https://news.example/next", 301),
    );

    let artifact = assert_ok!(harness.orchestrator().run_for_date(date(8)).await);

    assert_eq!(
        artifact.candidate.unwrap().source_url,
        "https://news.example/next"
    );
}

#[tokio::test]
async fn test_first_readable_story_stops_the_walk() {
    let harness = ranked_pair().with_fetcher(
        FakeFetcher::default()
            .page("https://news.example/top", 500)
            .page("https://news.example/next", 500),
    );

    assert_ok!(harness.orchestrator().run_for_date(date(9)).await);

    let fetcher = harness.fetcher.as_ref().unwrap();
    assert_eq!(fetcher.fetched(), vec!["https://news.example/top"]);
}

#[tokio::test]
async fn test_no_readable_article_is_no_suitable_content() {
    let harness = ranked_pair().with_fetcher(FakeFetcher::default().broken("https://news.example/top"));

    let err = assert_err!(harness.orchestrator().run_for_date(date(10)).await);

    assert_eq!(err.kind, ErrorKind::NoSuitableContent);
    assert_eq!(err.stage, Some(Stage::Fetch));
    assert_eq!(harness.synthesizer.script.calls(), 0);
    // Failed fetches are not retried
    assert_eq!(harness.fetcher.as_ref().unwrap().script.calls(), 2);
}
