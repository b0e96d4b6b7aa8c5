//! Integration tests: an in-process server driven over real WebSockets.

mod helpers;

mod call_flow_test;
mod presence_test;
