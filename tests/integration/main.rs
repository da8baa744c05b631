//! Integration tests with mock HTTP server

mod mock_server;
mod providers;
mod workflows;
mod worksheet;
