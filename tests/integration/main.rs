//! Integration tests against a mock analysis provider.

mod mock_server;
mod pipeline_flow;
mod provider_http;
