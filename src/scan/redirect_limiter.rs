use crate::model::RedirectStep;
use anyhow::Result;
use reqwest::Client;
use url::Url;

/// A resolved document response, ready to be handed back to the browser via
/// `Fetch.fulfillRequest`.
pub struct LimiterResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub hops: Vec<RedirectStep>,
}

pub enum LimiterOutcome {
    Resolved(LimiterResponse),
    LoopDetected(usize),
}

/// Follows a document-navigation redirect chain out-of-band, bounded by
/// `max_redirects` (spec.md §4.5 Redirect Limiter).
///
/// This is the same manual-redirect walk `crate::precheck::Precheck` runs before ever
/// starting a browser — generalised here to run *inside* a browsing context's fetch
/// interception handler instead of as a pre-flight classifier. The two call sites keep
/// their own `reqwest::Client` (spec.md §9: "Keep both code paths; their contracts
/// differ") since the pre-checker walk terminates on classification while this one
/// terminates on a final response body to hand back to the browser.
pub async fn follow_document_redirects(
    client: &Client,
    start_url: &str,
    max_redirects: usize,
) -> Result<LimiterOutcome> {
    let mut current = start_url.to_string();
    let mut hops = Vec::new();

    for _ in 0..=max_redirects {
        let resp = client.get(&current).send().await?;
        let status = resp.status();

        if status.is_redirection() {
            let Some(location) = resp
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
            else {
                return resolve_final(resp, hops).await;
            };
            let next = resolve(&current, &location).unwrap_or_else(|| location.clone());
            hops.push(RedirectStep { from: current.clone(), to: next.clone(), status: status.as_u16() });
            current = next;
            continue;
        }

        return resolve_final(resp, hops).await;
    }

    Ok(LimiterOutcome::LoopDetected(hops.len()))
}

async fn resolve_final(resp: reqwest::Response, hops: Vec<RedirectStep>) -> Result<LimiterOutcome> {
    let status = resp.status().as_u16();
    let headers = resp
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = resp.bytes().await?.to_vec();
    Ok(LimiterOutcome::Resolved(LimiterResponse { status, headers, body, hops }))
}

fn resolve(base: &str, location: &str) -> Option<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Some(location.to_string());
    }
    Url::parse(base).ok()?.join(location).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_direct_html_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;

        let client = Client::builder().redirect(reqwest::redirect::Policy::none()).build().unwrap();
        match follow_document_redirects(&client, &server.url(), 20).await.unwrap() {
            LimiterOutcome::Resolved(resp) => {
                assert_eq!(resp.status, 200);
                assert!(resp.hops.is_empty());
            }
            LimiterOutcome::LoopDetected(_) => panic!("expected Resolved"),
        }
    }

    #[tokio::test]
    async fn records_hops_and_resolves_final_response() {
        let mut server = mockito::Server::new_async().await;
        let _landing = server
            .mock("GET", "/b")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("ok")
            .create_async()
            .await;
        let _redirect = server
            .mock("GET", "/a")
            .with_status(302)
            .with_header("location", "/b")
            .create_async()
            .await;

        let client = Client::builder().redirect(reqwest::redirect::Policy::none()).build().unwrap();
        let start = format!("{}/a", server.url());
        match follow_document_redirects(&client, &start, 20).await.unwrap() {
            LimiterOutcome::Resolved(resp) => {
                assert_eq!(resp.status, 200);
                assert_eq!(resp.hops.len(), 1);
                assert_eq!(resp.hops[0].status, 302);
                assert!(resp.hops[0].to.ends_with("/b"));
            }
            LimiterOutcome::LoopDetected(_) => panic!("expected Resolved"),
        }
    }

    #[tokio::test]
    async fn detects_loop_beyond_budget() {
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("GET", "/a")
            .with_status(302)
            .with_header("location", "/b")
            .expect_at_least(1)
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/b")
            .with_status(302)
            .with_header("location", "/a")
            .expect_at_least(1)
            .create_async()
            .await;

        let client = Client::builder().redirect(reqwest::redirect::Policy::none()).build().unwrap();
        let start = format!("{}/a", server.url());
        match follow_document_redirects(&client, &start, 3).await.unwrap() {
            LimiterOutcome::LoopDetected(n) => assert!(n >= 3),
            LimiterOutcome::Resolved(_) => panic!("expected LoopDetected"),
        }
    }
}
