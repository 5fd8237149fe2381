//! Runs the generated interception script under `node` against stubbed
//! `fetch` / `XMLHttpRequest` primitives.
//!
//! Skipped when `node` is not on the PATH.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::process::Command;

use fitprobe::prelude::*;
use serde_json::{json, Value};

/// Stub page globals, the script under test, then a fixed request sequence
const HARNESS: &str = r#"
globalThis.window = globalThis;
const calls = [];
globalThis.Response = class {
  constructor(body, init) { this.body = body; this.status = init.status; this.headers = init.headers; }
  json() { return Promise.resolve(JSON.parse(this.body)); }
};
globalThis.Request = class {};
globalThis.Event = class { constructor(type) { this.type = type; } };
globalThis.fetch = function (input, init) {
  calls.push({ via: 'fetch', method: (init && init.method) || 'GET', url: String(input) });
  return Promise.resolve({ passthrough: true });
};
globalThis.XMLHttpRequest = class {
  constructor() { this.readyState = 0; this.status = 0; }
  open(method, url) { this.opened = { method, url }; }
  send() { calls.push({ via: 'xhr', method: this.opened.method, url: this.opened.url }); }
  dispatchEvent(event) {
    const handler = this['on' + event.type];
    if (handler) handler.call(this, event);
  }
};

__SCRIPT__

(async () => {
  const out = {};
  const created = await fetch('https://api.test/api/v1/recipes', { method: 'post', body: '{}' });
  out.fetchStatus = created.status;
  out.fetchBody = await created.json();
  out.fetchGet = await fetch('https://api.test/api/v1/recipes');
  out.fetchOther = await fetch('https://api.test/api/v1/comments', { method: 'POST' });

  const xhr = new XMLHttpRequest();
  const events = [];
  xhr.onreadystatechange = () => events.push('readystatechange');
  xhr.onload = () => events.push('load');
  xhr.open('POST', 'https://api.test/recipes');
  xhr.send('{}');
  out.xhr = {
    readyState: xhr.readyState,
    status: xhr.status,
    body: JSON.parse(xhr.responseText),
    contentType: xhr.getResponseHeader('Content-Type'),
    events,
  };

  const get = new XMLHttpRequest();
  get.open('GET', 'https://api.test/recipes');
  get.send();
  out.xhrGetStatus = get.status;

  out.calls = calls;
  out.hits = window.__fitprobeIntercept.hits;
  process.stdout.write(JSON.stringify(out));
})();
"#;

/// Stub transports answering login with 401 (fetch) and 200 (XHR)
const WATCH_HARNESS: &str = r#"
globalThis.window = globalThis;
globalThis.Request = class {};
globalThis.fetch = function (input) {
  const status = String(input).includes('login') ? 401 : 200;
  const text = '{"message":"Invalid credentials"}' + 'x'.repeat(300);
  return Promise.resolve({ status, clone() { return { text: () => Promise.resolve(text) }; } });
};
globalThis.XMLHttpRequest = class {
  constructor() { this.listeners = {}; this.status = 0; }
  addEventListener(type, f) { (this.listeners[type] = this.listeners[type] || []).push(f); }
  open(method, url) { this.url = url; }
  send() {
    this.status = 200;
    this.responseText = '{"token":"t"}';
    (this.listeners.loadend || []).forEach((f) => f());
  }
};

__SCRIPT__

(async () => {
  const login = await fetch('https://api.test/api/v1/auth/login', { method: 'POST' });
  await fetch('https://api.test/api/v1/recipes');
  const xhr = new XMLHttpRequest();
  xhr.open('POST', 'https://api.test/AUTH/LOGIN');
  xhr.send();
  const other = new XMLHttpRequest();
  other.open('GET', 'https://api.test/recipes');
  other.send();
  await new Promise((resolve) => setTimeout(resolve, 10));
  process.stdout.write(JSON.stringify({ status: login.status, seen: window.__fitprobeResponses }));
})();
"#;

fn node_available() -> bool {
    Command::new("node")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

/// Run the harness with `script` in place; `None` when node is missing
fn run_in_node(script: &str) -> Option<Value> {
    run_harness(HARNESS, script)
}

fn run_harness(harness: &str, script: &str) -> Option<Value> {
    if !node_available() {
        eprintln!("node not found; skipping script execution");
        return None;
    }
    let program = harness.replace("__SCRIPT__", script);
    let output = Command::new("node").arg("-e").arg(program).output().unwrap();
    assert!(
        output.status.success(),
        "node failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Some(serde_json::from_slice(&output.stdout).unwrap())
}

fn recipe_script() -> String {
    NetworkInterception::recipe_submission().init_script().unwrap()
}

#[test]
fn test_fetch_post_is_answered_in_page() {
    let Some(out) = run_in_node(&recipe_script()) else {
        return;
    };
    assert_eq!(out["fetchStatus"], 201);
    assert_eq!(out["fetchBody"], json!({"ok": true, "id": MOCKED_RECIPE_ID}));
}

#[test]
fn test_non_matching_requests_pass_through() {
    let Some(out) = run_in_node(&recipe_script()) else {
        return;
    };
    assert_eq!(out["fetchGet"], json!({"passthrough": true}));
    assert_eq!(out["fetchOther"], json!({"passthrough": true}));
    assert_eq!(
        out["calls"],
        json!([
            {"via": "fetch", "method": "GET", "url": "https://api.test/api/v1/recipes"},
            {"via": "fetch", "method": "POST", "url": "https://api.test/api/v1/comments"},
            {"via": "xhr", "method": "GET", "url": "https://api.test/recipes"},
        ])
    );
    assert_eq!(out["xhrGetStatus"], 0);
}

#[test]
fn test_xhr_completes_synchronously_inside_send() {
    let Some(out) = run_in_node(&recipe_script()) else {
        return;
    };
    let xhr = &out["xhr"];
    assert_eq!(xhr["readyState"], 4);
    assert_eq!(xhr["status"], 201);
    assert_eq!(xhr["body"]["id"], MOCKED_RECIPE_ID);
    assert_eq!(xhr["contentType"], "application/json");
    assert_eq!(xhr["events"], json!(["readystatechange", "load"]));
}

#[test]
fn test_hits_recorded_for_matches_only() {
    let Some(out) = run_in_node(&recipe_script()) else {
        return;
    };
    let hits: Vec<InterceptHit> = serde_json::from_value(out["hits"].clone()).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.rule == 0 && h.method == "POST"));
    assert!(NetworkInterception::recipe_submission()
        .unmatched_rules(&hits)
        .is_empty());
}

#[test]
fn test_second_evaluation_is_a_no_op() {
    let script = recipe_script();
    let Some(out) = run_in_node(&format!("{script}\n{script}")) else {
        return;
    };
    assert_eq!(out["hits"].as_array().unwrap().len(), 2);
    assert_eq!(out["calls"].as_array().unwrap().len(), 3);
}

#[test]
fn test_login_watch_records_without_altering() {
    let script = ResponseWatch::login().init_script().unwrap();
    let Some(out) = run_harness(WATCH_HARNESS, &script) else {
        return;
    };
    assert_eq!(out["status"], 401);
    let seen: Vec<WatchedResponse> = serde_json::from_value(out["seen"].clone()).unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].status, 401);
    assert!(seen[0].body.starts_with(r#"{"message":"Invalid credentials"}"#));
    assert_eq!(seen[0].body.chars().count(), WATCHED_BODY_LIMIT);
    assert_eq!(seen[1].url, "https://api.test/AUTH/LOGIN");
    assert!(seen[1].is_ok());
}
