//! Shared fixtures for API integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;
use tabula_api::{AuthConfig, Dispatcher, Envelope, ReadRequest, WriteRequest};
use tabula_test_utils::fixtures::{self, TestCatalog};

pub const ADMIN_KEY: &str = "test-admin-key";
pub const EDITOR_KEY: &str = "test-editor-key";
pub const WRITER_KEY: &str = "test-writer-key";
pub const READER_KEY: &str = "test-reader-key";

/// One key per built-in role.
pub fn test_auth() -> AuthConfig {
    let mut auth = AuthConfig::new();
    auth.add_api_key(ADMIN_KEY, "admin");
    auth.add_api_key(EDITOR_KEY, "editor");
    auth.add_api_key(WRITER_KEY, "writer");
    auth.add_api_key(READER_KEY, "reader");
    auth
}

pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub env: TestCatalog,
}

impl Harness {
    pub fn new() -> Self {
        Self::from_catalog(fixtures::memory_catalog())
    }

    pub fn with_widgets() -> Self {
        Self::from_catalog(fixtures::widgets_catalog())
    }

    fn from_catalog(env: TestCatalog) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&env.catalog), test_auth()));
        Self { dispatcher, env }
    }

    pub fn write(&self, body: Value) -> Envelope {
        let req: WriteRequest =
            serde_json::from_value(body).unwrap_or_else(|e| panic!("bad test body: {}", e));
        self.dispatcher.handle_write(&req)
    }

    pub fn read(&self, req: ReadRequest) -> Envelope {
        self.dispatcher.handle_read(&req)
    }
}

/// Read request for `table` with `key`; callers fill in the rest.
pub fn read_req(key: &str, table: &str) -> ReadRequest {
    ReadRequest {
        api_key: Some(key.to_string()),
        table: Some(table.to_string()),
        ..Default::default()
    }
}
