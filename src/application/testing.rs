//! Scripted collaborators for application-layer tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde_json::{json, Value};

use crate::domain::{AppError, CancellationToken, Result};
use crate::infrastructure::{ApiMethod, Params, Transport};

use super::pacing::Pacer;

/// Replays queued responses per API method and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: RefCell<HashMap<ApiMethod, VecDeque<Result<Value>>>>,
    calls: RefCell<Vec<(ApiMethod, Vec<(String, String)>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: ApiMethod, body: Value) {
        self.push(method, Ok(body));
    }

    pub fn fail(&self, method: ApiMethod, err: AppError) {
        self.push(method, Err(err));
    }

    fn push(&self, method: ApiMethod, response: Result<Value>) {
        self.responses
            .borrow_mut()
            .entry(method)
            .or_default()
            .push_back(response);
    }

    pub fn call_count(&self, method: ApiMethod) -> usize {
        self.calls.borrow().iter().filter(|(m, _)| *m == method).count()
    }

    /// Parameters of each call to `method`, in order.
    pub fn params_of(&self, method: ApiMethod) -> Vec<Vec<(String, String)>> {
        self.calls
            .borrow()
            .iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn methods(&self) -> Vec<ApiMethod> {
        self.calls.borrow().iter().map(|(m, _)| *m).collect()
    }
}

impl Transport for ScriptedTransport {
    fn call(&self, method: ApiMethod, params: &Params) -> Result<Value> {
        self.calls.borrow_mut().push((method, params.to_vec()));
        self.responses
            .borrow_mut()
            .get_mut(&method)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("no scripted response left for {method}"))
    }
}

/// Records requested pauses instead of sleeping.
///
/// Optionally requests a stop once a given number of pauses have happened.
#[derive(Default)]
pub struct RecordingPacer {
    pauses: RefCell<Vec<Duration>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingPacer {
    pub fn cancelling_after(pauses: usize, cancel: CancellationToken) -> Self {
        Self {
            pauses: RefCell::default(),
            cancel_after: Some((pauses, cancel)),
        }
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.borrow().clone()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, duration: Duration) {
        let mut pauses = self.pauses.borrow_mut();
        pauses.push(duration);
        if let Some((limit, cancel)) = &self.cancel_after {
            if pauses.len() >= *limit {
                cancel.cancel();
            }
        }
    }
}

/// A retryable transport failure.
pub fn transport_error(message: &str) -> AppError {
    AppError::Http {
        method: "scripted".to_string(),
        message: message.to_string(),
        source: None,
    }
}

/// A successful page holding `items` under `key`, with an optional cursor.
pub fn page(key: &str, items: Value, next_cursor: Option<&str>) -> Value {
    json!({
        "ok": true,
        key: items,
        "response_metadata": { "next_cursor": next_cursor.unwrap_or("") },
    })
}

pub fn api_error(code: &str) -> Value {
    json!({ "ok": false, "error": code })
}
