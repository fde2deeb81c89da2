use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::record::{NO_EXTERNAL_DATA_INFO, StatSnapshot, StudentRecord};
use crate::roster::RosterEntry;

/// Anything that can answer "how many problems has this user solved".
pub trait StatsSource {
    fn fetch_stats(&self, username: &str) -> Result<StatSnapshot>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Fetched,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub record: StudentRecord,
    pub status: FetchStatus,
}

/// Return the profile username when `url` is a profile link under `prefix`.
pub fn extract_username(url: &str, prefix: &str) -> Option<String> {
    let rest = url.strip_prefix(prefix)?;
    let username = rest.strip_suffix('/').unwrap_or(rest);
    if username.is_empty() {
        return None;
    }
    Some(username.to_string())
}

/// Read the four accepted-submission counts for `username` from an API payload.
///
/// The payload is keyed by username; counts live at
/// `submitStatsGlobal.acSubmissionNum[0..4].count` in total/easy/medium/hard
/// order. A missing username key is an error, a missing count is zero.
pub fn parse_stats_payload(username: &str, payload: &Value) -> Result<StatSnapshot> {
    let Some(profile) = payload.get(username).filter(|value| !value.is_null()) else {
        bail!("no data found for {username}");
    };
    let counts = profile
        .get("submitStatsGlobal")
        .and_then(|value| value.get("acSubmissionNum"))
        .and_then(Value::as_array);
    let count_at = |index: usize| {
        counts
            .and_then(|counts| counts.get(index))
            .and_then(|entry| entry.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };

    Ok(StatSnapshot {
        total_solved: count_at(0),
        easy_solved: count_at(1),
        medium_solved: count_at(2),
        hard_solved: count_at(3),
    })
}

/// Build the snapshot row for one roster entry, calling `source` at most once.
pub fn fetch_record(
    entry: RosterEntry,
    pinned: bool,
    source: &dyn StatsSource,
    profile_prefix: &str,
) -> FetchOutcome {
    let username = extract_username(&entry.url, profile_prefix);
    let mut record = StudentRecord::from_entry(entry, pinned);

    let Some(username) = username else {
        debug!(roll = %record.roll, url = %record.url, "not a profile url, skipping fetch");
        record.info = Some(NO_EXTERNAL_DATA_INFO.to_string());
        return FetchOutcome {
            record,
            status: FetchStatus::Skipped,
        };
    };

    debug!(roll = %record.roll, %username, "fetching stats");
    let status = match source.fetch_stats(&username) {
        Ok(stats) => {
            record.username = Some(username);
            record.stats = Some(stats);
            FetchStatus::Fetched
        }
        Err(error) => {
            warn!(roll = %record.roll, %username, error = %format!("{error:#}"), "stats fetch failed");
            FetchStatus::Failed
        }
    };
    FetchOutcome { record, status }
}

/// HTTP client for the public LeetCode stats API.
pub struct LeetcodeClient {
    client: Client,
    api_base_url: String,
    user_agent: String,
}

impl LeetcodeClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build stats HTTP client")?;
        Ok(Self {
            client,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            user_agent: settings.user_agent.clone(),
        })
    }

    pub fn profile_url(&self, username: &str) -> String {
        format!("{}/{username}", self.api_base_url)
    }
}

impl StatsSource for LeetcodeClient {
    fn fetch_stats(&self, username: &str) -> Result<StatSnapshot> {
        let url = self.profile_url(username);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", self.user_agent.clone())
            .header("Accept", "application/json")
            .send()
            .with_context(|| format!("failed to fetch {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} while fetching {}", status.as_u16(), url);
        }
        let payload: Value = response
            .json()
            .context("failed to decode stats API JSON response")?;
        parse_stats_payload(username, &payload)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::DEFAULT_PROFILE_PREFIX;

    struct RecordingSource {
        calls: RefCell<Vec<String>>,
        fail: bool,
    }

    impl StatsSource for RecordingSource {
        fn fetch_stats(&self, username: &str) -> Result<StatSnapshot> {
            self.calls.borrow_mut().push(username.to_string());
            if self.fail {
                bail!("HTTP 500 while fetching {username}");
            }
            Ok(StatSnapshot {
                total_solved: 4,
                easy_solved: 2,
                medium_solved: 1,
                hard_solved: 1,
            })
        }
    }

    fn entry(url: &str) -> RosterEntry {
        RosterEntry {
            roll: "7".to_string(),
            name: "Gale".to_string(),
            url: url.to_string(),
            section: "S3".to_string(),
        }
    }

    fn payload(username: &str, counts: &[u64]) -> Value {
        let counts = counts
            .iter()
            .zip(["All", "Easy", "Medium", "Hard"])
            .map(|(count, difficulty)| json!({"difficulty": difficulty, "count": count}))
            .collect::<Vec<_>>();
        json!({ username: { "submitStatsGlobal": { "acSubmissionNum": counts } } })
    }

    #[test]
    fn extract_username_strips_a_single_trailing_slash() {
        assert_eq!(
            extract_username("https://leetcode.com/u/alice/", DEFAULT_PROFILE_PREFIX),
            Some("alice".to_string())
        );
        assert_eq!(
            extract_username("https://leetcode.com/u/bob", DEFAULT_PROFILE_PREFIX),
            Some("bob".to_string())
        );
        assert_eq!(
            extract_username("https://leetcode.com/u/carol//", DEFAULT_PROFILE_PREFIX),
            Some("carol/".to_string())
        );
    }

    #[test]
    fn extract_username_rejects_other_urls() {
        for url in [
            "https://github.com/alice",
            "http://leetcode.com/u/alice/",
            "https://leetcode.com/alice/",
            "https://leetcode.com/u/",
            "",
        ] {
            assert_eq!(extract_username(url, DEFAULT_PROFILE_PREFIX), None, "{url}");
        }
    }

    #[test]
    fn parse_stats_payload_reads_counts_in_difficulty_order() {
        let stats = parse_stats_payload("alice", &payload("alice", &[10, 7, 2, 1])).expect("parse");
        assert_eq!(
            stats,
            StatSnapshot {
                total_solved: 10,
                easy_solved: 7,
                medium_solved: 2,
                hard_solved: 1,
            }
        );
    }

    #[test]
    fn parse_stats_payload_defaults_missing_counts_to_zero() {
        let stats = parse_stats_payload("alice", &payload("alice", &[5, 5])).expect("parse");
        assert_eq!(stats.total_solved, 5);
        assert_eq!(stats.medium_solved, 0);
        assert_eq!(stats.hard_solved, 0);

        let stats = parse_stats_payload("alice", &json!({"alice": {}})).expect("parse");
        assert_eq!(stats, StatSnapshot::default());
    }

    #[test]
    fn parse_stats_payload_requires_the_username_key() {
        let err = parse_stats_payload("alice", &payload("bob", &[1, 1, 0, 0])).expect_err("fail");
        assert!(err.to_string().contains("no data found for alice"));
        let err = parse_stats_payload("alice", &json!({"alice": null})).expect_err("fail");
        assert!(err.to_string().contains("alice"));
    }

    #[test]
    fn fetch_record_skips_non_profile_urls_without_calling_the_source() {
        let source = RecordingSource {
            calls: RefCell::new(Vec::new()),
            fail: false,
        };
        let outcome = fetch_record(
            entry("https://example.com/gale"),
            true,
            &source,
            DEFAULT_PROFILE_PREFIX,
        );
        assert_eq!(outcome.status, FetchStatus::Skipped);
        assert!(source.calls.borrow().is_empty());
        assert_eq!(outcome.record.info.as_deref(), Some(NO_EXTERNAL_DATA_INFO));
        assert!(outcome.record.stats.is_none());
        assert!(outcome.record.pinned);
    }

    #[test]
    fn fetch_record_attaches_stats_and_username() {
        let source = RecordingSource {
            calls: RefCell::new(Vec::new()),
            fail: false,
        };
        let outcome = fetch_record(
            entry("https://leetcode.com/u/gale/"),
            false,
            &source,
            DEFAULT_PROFILE_PREFIX,
        );
        assert_eq!(outcome.status, FetchStatus::Fetched);
        assert_eq!(*source.calls.borrow(), vec!["gale".to_string()]);
        assert_eq!(outcome.record.username.as_deref(), Some("gale"));
        assert_eq!(outcome.record.total_solved(), 4);
        assert!(outcome.record.info.is_none());
    }

    #[test]
    fn fetch_record_isolates_source_failures() {
        let source = RecordingSource {
            calls: RefCell::new(Vec::new()),
            fail: true,
        };
        let outcome = fetch_record(
            entry("https://leetcode.com/u/gale"),
            false,
            &source,
            DEFAULT_PROFILE_PREFIX,
        );
        assert_eq!(outcome.status, FetchStatus::Failed);
        assert_eq!(source.calls.borrow().len(), 1);
        assert!(outcome.record.stats.is_none());
        assert!(outcome.record.username.is_none());
        assert!(outcome.record.info.is_none());
    }

    #[test]
    fn client_builds_profile_urls_from_base() {
        let settings = Settings {
            profile_prefix: DEFAULT_PROFILE_PREFIX.to_string(),
            api_base_url: "https://stats.example.org/".to_string(),
            user_agent: "test".to_string(),
            timeout: Duration::from_millis(10),
            interval: Duration::from_secs(1),
            bind: "127.0.0.1:0".to_string(),
        };
        let client = LeetcodeClient::new(&settings).expect("client");
        assert_eq!(
            client.profile_url("alice"),
            "https://stats.example.org/alice"
        );
    }

    /// Local stand-in for the stats API. `/alice` answers 10/7/2/1, `/broken`
    /// answers 500, `/garbled` answers 200 with a non-JSON body, anything else
    /// 404. Serves `requests` connections, then stops.
    pub(crate) fn spawn_stats_api(requests: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        thread::spawn(move || {
            for stream in listener.incoming().take(requests) {
                let mut stream = stream.expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                let mut request_line = String::new();
                reader.read_line(&mut request_line).expect("request line");
                loop {
                    let mut header = String::new();
                    let read = reader.read_line(&mut header).expect("header");
                    if read == 0 || header == "\r\n" {
                        break;
                    }
                }

                let path = request_line.split_whitespace().nth(1).unwrap_or("/");
                let (status, body) = match path {
                    "/alice" => ("200 OK", payload("alice", &[10, 7, 2, 1]).to_string()),
                    "/broken" => ("500 Internal Server Error", "{}".to_string()),
                    "/garbled" => ("200 OK", "<html>not json</html>".to_string()),
                    _ => ("404 Not Found", "{}".to_string()),
                };
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).expect("respond");
            }
        });
        format!("http://{addr}")
    }

    pub(crate) fn client_for(api_base_url: &str) -> LeetcodeClient {
        LeetcodeClient::new(&Settings {
            profile_prefix: DEFAULT_PROFILE_PREFIX.to_string(),
            api_base_url: api_base_url.to_string(),
            user_agent: "leetboard-tests".to_string(),
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(1),
            bind: "127.0.0.1:0".to_string(),
        })
        .expect("client")
    }

    #[test]
    fn client_reads_counts_from_a_live_response() {
        let client = client_for(&spawn_stats_api(1));
        let stats = client.fetch_stats("alice").expect("fetch");
        assert_eq!(
            stats,
            StatSnapshot {
                total_solved: 10,
                easy_solved: 7,
                medium_solved: 2,
                hard_solved: 1,
            }
        );
    }

    #[test]
    fn client_reports_non_success_status() {
        let client = client_for(&spawn_stats_api(1));
        let err = client.fetch_stats("broken").expect_err("must fail");
        assert!(err.to_string().contains("HTTP 500"), "{err:#}");
        assert!(err.to_string().contains("/broken"));
    }

    #[test]
    fn client_reports_undecodable_bodies() {
        let client = client_for(&spawn_stats_api(1));
        let err = client.fetch_stats("garbled").expect_err("must fail");
        assert!(err.to_string().contains("failed to decode"), "{err:#}");
    }
}
