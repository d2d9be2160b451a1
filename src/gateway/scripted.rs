//! In-memory [`Gateway`] that replays scripted answers per method and URL.
//!
//! Each (method, URL) pair owns a queue of replies; the last reply repeats
//! once the queue is drained, so "never terminal" sequences are one entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use super::{ApiResponse, Gateway};
use crate::error::TransportError;

pub const BASE: &str = "http://gw:8080";

#[derive(Debug, Clone)]
enum Reply {
    Ok(ApiResponse),
    Status(u16, Value),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub url: String,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<HashMap<(&'static str, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: &'static str, url: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn on_get(&self, url: &str, body: Value) -> &Self {
        self.push("GET", url, Reply::Ok(ApiResponse::new(200, body)));
        self
    }

    pub fn on_get_seq(&self, url: &str, bodies: impl IntoIterator<Item = Value>) -> &Self {
        for body in bodies {
            self.on_get(url, body);
        }
        self
    }

    pub fn on_get_status(&self, url: &str, status: u16, body: Value) -> &Self {
        self.push("GET", url, Reply::Status(status, body));
        self
    }

    pub fn on_post(&self, url: &str, location: Option<&str>, body: Value) -> &Self {
        let mut resp = ApiResponse::new(202, body);
        resp.location = location.map(str::to_string);
        self.push("POST", url, Reply::Ok(resp));
        self
    }

    pub fn on_post_status(&self, url: &str, status: u16, body: Value) -> &Self {
        self.push("POST", url, Reply::Status(status, body));
        self
    }

    pub fn on_patch(&self, url: &str) -> &Self {
        self.push("PATCH", url, Reply::Ok(ApiResponse::new(200, Value::Null)));
        self
    }

    pub fn on_delete(&self, url: &str) -> &Self {
        self.push("DELETE", url, Reply::Ok(ApiResponse::new(204, Value::Null)));
        self
    }

    pub fn on_upload(&self, url: &str) -> &Self {
        self.push("UPLOAD", url, Reply::Ok(ApiResponse::new(200, Value::Null)));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.url == url)
            .count()
    }

    pub fn bodies(&self, method: &str, url: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.url == url)
            .filter_map(|c| c.body.clone())
            .collect()
    }

    fn answer(
        &self,
        method: &'static str,
        url: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, TransportError> {
        self.calls.lock().unwrap().push(Call {
            method,
            url: url.to_string(),
            body,
        });

        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .get_mut(&(method, url.to_string()))
            .unwrap_or_else(|| panic!("no scripted reply for {} {}", method, url));
        let reply = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        };

        match reply {
            Reply::Ok(resp) => Ok(resp),
            Reply::Status(status, body) => Err(TransportError::Status {
                method: method.to_string(),
                url: url.to_string(),
                status,
                body,
            }),
        }
    }
}

#[async_trait::async_trait]
impl Gateway for ScriptedGateway {
    fn base_url(&self) -> &str {
        BASE
    }

    async fn get(&self, url: &str) -> Result<ApiResponse, TransportError> {
        self.answer("GET", url, None)
    }

    async fn post(&self, url: &str, body: Value) -> Result<ApiResponse, TransportError> {
        self.answer("POST", url, Some(body))
    }

    async fn patch(&self, url: &str, body: Value) -> Result<ApiResponse, TransportError> {
        self.answer("PATCH", url, Some(body))
    }

    async fn delete(&self, url: &str) -> Result<ApiResponse, TransportError> {
        self.answer("DELETE", url, None)
    }

    async fn upload(
        &self,
        url: &str,
        query: &[(&str, String)],
        bytes: Vec<u8>,
    ) -> Result<ApiResponse, TransportError> {
        let mut params = serde_json::Map::new();
        for (k, v) in query {
            params.insert(k.to_string(), Value::String(v.clone()));
        }
        params.insert("size".to_string(), Value::from(bytes.len()));
        self.answer("UPLOAD", url, Some(Value::Object(params)))
    }
}
