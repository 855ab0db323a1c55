//! Pull request pagination and comment tallies against a scripted forge.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use release_stats::cli::CommentersOutputFormat;
use release_stats::forge::{
    ForgeClient, ForgeRequest, ForgeSettings, RecordingSleeper, RetryPolicy, Transport,
    TransportResponse,
};
use release_stats::reporting::render_tally;
use release_stats::{PageFetchOptions, Result, fetch_all_closed_prs, tally};
use serde_json::{Value, json};

/// A forge with a fixed set of pull request pages and comment lists.
#[derive(Default)]
struct FakeForge {
    pages: HashMap<u32, Vec<Value>>,
    issue_comments: HashMap<u64, Value>,
    review_comments: HashMap<u64, Value>,
    broken_pages: Vec<u32>,
    requests: Mutex<Vec<String>>,
}

impl FakeForge {
    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for FakeForge {
    fn get(&self, request: &ForgeRequest) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(request.url.clone());
        let ok = |body: String| {
            Ok(TransportResponse {
                status: 200,
                body,
            })
        };
        if request.url.ends_with("/pulls") {
            let page: u32 = request.query_param("page").unwrap().parse().unwrap();
            if self.broken_pages.contains(&page) {
                return Ok(TransportResponse {
                    status: 503,
                    body: String::new(),
                });
            }
            let records = self.pages.get(&page).cloned().unwrap_or_default();
            return ok(Value::Array(records).to_string());
        }
        let number = |marker: &str| -> Option<u64> {
            let rest = request.url.split(marker).nth(1)?;
            rest.trim_end_matches("/comments").parse().ok()
        };
        if let Some(n) = number("/issues/") {
            return ok(self.issue_comments.get(&n).cloned().unwrap_or(json!([])).to_string());
        }
        if let Some(n) = number("/pulls/") {
            return match self.review_comments.get(&n) {
                Some(body) => ok(body.to_string()),
                None => Ok(TransportResponse {
                    status: 404,
                    body: "{}".to_string(),
                }),
            };
        }
        Ok(TransportResponse {
            status: 404,
            body: String::new(),
        })
    }
}

fn pr(number: u64, base: &str, merged: bool) -> Value {
    json!({
        "number": number,
        "user": {"login": "author"},
        "state": "closed",
        "created_at": "2017-03-01T10:00:00Z",
        "closed_at": "2017-03-02T10:00:00Z",
        "merged_at": if merged { json!("2017-03-02T10:00:00Z") } else { Value::Null },
        "base": {"ref": base},
    })
}

fn client(forge: Arc<FakeForge>) -> (ForgeClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut settings = ForgeSettings::new("bitcoin", "bitcoin");
    settings.retry = RetryPolicy::default();
    let client = ForgeClient::new(settings, forge).with_sleeper(sleeper.clone());
    (client, sleeper)
}

#[test]
fn test_pagination_skips_broken_page_and_stops_at_empty_page() {
    let mut forge = FakeForge::default();
    forge.pages.insert(1, vec![pr(1, "master", true), pr(2, "master", false)]);
    forge.broken_pages.push(2);
    forge.pages.insert(3, vec![pr(3, "0.14", true)]);
    let forge = Arc::new(forge);
    let (client, sleeper) = client(forge.clone());

    let rows = fetch_all_closed_prs(
        &client,
        &PageFetchOptions {
            max_pages: 50,
            concurrency: 1,
        },
    )
    .unwrap();

    let numbers: Vec<u64> = rows.iter().map(|row| row.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(sleeper.recorded().len(), 4, "page 2 is retried five times");
    let pulls_requests = forge
        .requests()
        .iter()
        .filter(|url| url.ends_with("/pulls"))
        .count();
    assert_eq!(pulls_requests, 1 + 5 + 1 + 1, "page 4 is empty and nothing after it is asked for");
    assert!(rows[0].is_merged_into("master"));
    assert!(!rows[1].is_merged_into("master"));
    assert!(!rows[2].is_merged_into("master"));
}

#[test]
fn test_tally_csv_excludes_null_authors_and_failed_fetches() {
    let mut forge = FakeForge::default();
    forge.issue_comments.insert(
        10,
        json!([
            {"id": 1, "user": {"login": "alice"}},
            {"id": 2, "user": {"login": "bob"}},
            {"id": 3, "user": null}
        ]),
    );
    forge
        .review_comments
        .insert(10, json!([{"id": 4, "user": {"login": "alice"}}]));
    forge
        .issue_comments
        .insert(11, json!([{"id": 5, "user": {"login": "alice"}}]));
    forge.review_comments.insert(11, json!([]));
    // 12 has no review comment list; the fetch answers 404.
    forge
        .issue_comments
        .insert(12, json!([{"id": 6, "user": {"login": "carol"}}]));
    let (client, _) = client(Arc::new(forge));

    let result = tally(&[10, 11, 12], &client, 3).unwrap();
    let csv = render_tally(&result, CommentersOutputFormat::Csv).unwrap();

    insta::assert_snapshot!(csv, @r"
    commenter,comments
    alice,3
    bob,1
    carol,1
    ");
}

#[test]
fn test_tally_is_independent_of_pull_list_order() {
    let mut forge = FakeForge::default();
    for n in 1..=20u64 {
        let logins: Vec<Value> = (0..n % 4)
            .map(|i| json!({"id": n * 10 + i, "user": {"login": format!("user{}", i)}}))
            .collect();
        forge.issue_comments.insert(n, Value::Array(logins));
        forge.review_comments.insert(n, json!([{"id": n, "user": {"login": "reviewer"}}]));
    }
    let (client, _) = client(Arc::new(forge));

    let forward: Vec<u64> = (1..=20).collect();
    let backward: Vec<u64> = forward.iter().rev().copied().collect();
    let serial = tally(&forward, &client, 1).unwrap();
    let parallel = tally(&backward, &client, 8).unwrap();

    assert_eq!(serial, parallel);
    assert_eq!(serial.get("reviewer"), 20);
}
