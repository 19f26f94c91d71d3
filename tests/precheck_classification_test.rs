use domain_recon::model::PrecheckReason;
use domain_recon::precheck::Precheck;

#[tokio::test]
async fn classifies_non_html_response() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let precheck = Precheck::new(15).unwrap();
    let outcome = precheck.run_from_url("example.test", server.url()).await;
    match outcome.reason {
        Some(PrecheckReason::NonHtml(ct)) => assert_eq!(ct, "application/json"),
        other => panic!("expected NonHtml, got {other:?}"),
    }
    assert!(outcome.skip_browser);
}

#[tokio::test]
async fn classifies_forbidden_and_still_allows_browser_escalation() {
    let mut server = mockito::Server::new_async().await;
    let _m = server.mock("GET", "/").with_status(403).create_async().await;

    let precheck = Precheck::new(15).unwrap();
    let outcome = precheck.run_from_url("example.test", server.url()).await;
    assert_eq!(outcome.reason, Some(PrecheckReason::Forbidden));
    assert!(!outcome.skip_browser);
    assert!(outcome.try_browser);
}

#[tokio::test]
async fn classifies_redirect_to_a_downloadable_asset() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/")
        .with_status(302)
        .with_header("location", "/files/report.pdf")
        .create_async()
        .await;

    let precheck = Precheck::new(15).unwrap();
    let outcome = precheck.run_from_url("example.test", server.url()).await;
    match &outcome.reason {
        Some(PrecheckReason::RedirectToFile(target)) => {
            assert!(target.ends_with("/files/report.pdf"));
            assert_eq!(&outcome.start_url, target);
        }
        other => panic!("expected RedirectToFile, got {other:?}"),
    }
    assert!(outcome.skip_browser);
}

#[tokio::test]
async fn redirect_hop_count_beyond_budget_is_a_loop() {
    let mut server = mockito::Server::new_async().await;
    // Each hop redirects to the next, never repeating a URL, so only the hop-count
    // cap (not the visited-set check) can terminate the walk.
    let mocks: Vec<_> = (0..20)
        .map(|i| {
            server
                .mock("GET", format!("/hop{i}").as_str())
                .with_status(302)
                .with_header("location", format!("/hop{}", i + 1).as_str())
                .create()
        })
        .collect();
    let _keep = mocks;

    let precheck = Precheck::new(5).unwrap();
    let start = format!("{}/hop0", server.url());
    let outcome = precheck.run_from_url("example.test", start).await;
    match outcome.reason {
        Some(PrecheckReason::TooManyRedirects(n)) => assert!(n > 5),
        other => panic!("expected TooManyRedirects, got {other:?}"),
    }
}
