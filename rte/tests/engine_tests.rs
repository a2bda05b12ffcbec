//! Built-in engine driven through the socket exchange by two peers.

mod common;

use std::thread;

use common::{Capture, client_config, connected_pair};
use rte::{ConfigError, Error, ExchangeEngine, PerfEngine, Rte, RunConfig, TestType};

fn run_both(config: RunConfig) -> (rte::PerfResult, rte::PerfResult, String, String) {
    let (server, received, client) = connected_pair(&config);
    let server_out = Capture::default();
    let client_out = Capture::default();
    let mut server = server.with_writer(server_out.clone());
    let mut client = client.with_writer(client_out.clone());

    let peer = thread::spawn(move || {
        let mut engine = ExchangeEngine::new();
        engine.run(&config, &mut client).unwrap()
    });
    let mut engine = ExchangeEngine::new();
    let server_result = engine.run(&received, &mut server).unwrap();
    let client_result = peer.join().unwrap();

    (server_result, client_result, server_out.text(), client_out.text())
}

/// Test a full ping-pong run between both peers
#[test]
fn test_ping_pong_run() {
    let config = RunConfig {
        warmup_iter: 10,
        max_iter: 3000,
        report_interval: 0.0,
        ..client_config()
    };
    let (server, client, server_out, client_out) = run_both(config);

    assert_eq!(server.iters, 3000);
    assert_eq!(client.iters, 3000);
    assert!(server.latency.total_average > 0.0);
    assert!(server.msgrate.total_average > 0.0);
    assert!(server.bandwidth.total_average > 0.0);

    // One report per batch plus the final one; only the client prints them.
    assert!(server_out.is_empty());
    assert_eq!(client_out.lines().count(), 4);
}

/// Test a unidirectional stream run
#[test]
fn test_stream_run() {
    let config = RunConfig {
        test_type: Some(TestType::StreamUni),
        warmup_iter: 0,
        max_iter: 5000,
        message_size: 1024,
        report_interval: 3600.0,
        ..client_config()
    };
    let (server, client, server_out, client_out) = run_both(config);

    assert_eq!(server.iters, 5000);
    assert_eq!(client.iters, 5000);
    assert!(client.latency.total_average > 0.0);
    // Interval never elapses, so only the final report is printed.
    assert!(server_out.is_empty());
    let lines: Vec<_> = client_out.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].trim_start().starts_with("5000"));
}

/// Test a run with no iterations
#[test]
fn test_zero_iterations() {
    let config = RunConfig {
        warmup_iter: 0,
        max_iter: 0,
        ..client_config()
    };
    let (server, client, _, _) = run_both(config);
    assert_eq!(server, rte::PerfResult::default());
    assert_eq!(client, rte::PerfResult::default());
}

/// Test a run with empty messages
#[test]
fn test_zero_size_messages() {
    let config = RunConfig {
        warmup_iter: 5,
        max_iter: 100,
        message_size: 0,
        ..client_config()
    };
    let (server, client, _, _) = run_both(config);
    assert_eq!(server.iters, 100);
    assert_eq!(client.iters, 100);
    assert_eq!(server.bandwidth.total_average, 0.0);
}

/// Test that an unallocatable message size is an error, not an abort
#[test]
fn test_huge_message_size_fails() {
    let (mut server, _, _client) = connected_pair(&client_config());
    let config = RunConfig {
        message_size: u64::MAX,
        ..client_config()
    };
    let mut engine = ExchangeEngine::new();
    assert!(matches!(
        engine.run(&config, &mut server),
        Err(Error::Test(_))
    ));
}

/// Test that the engine refuses a config without a test type
#[test]
fn test_missing_test_type() {
    let (mut server, _, _client) = connected_pair(&client_config());
    let config = RunConfig {
        test_type: None,
        ..client_config()
    };
    let mut engine = ExchangeEngine::new();
    assert!(matches!(
        engine.run(&config, &mut server),
        Err(Error::Config(ConfigError::MissingTestType))
    ));
}

/// Test driving the group through a trait object
#[test]
fn test_engine_sees_only_the_trait() {
    let (mut server, _, _client) = connected_pair(&client_config());
    let rte: &mut dyn Rte = &mut server;
    assert_eq!(rte.group_size(), 2);
    assert_eq!(rte.group_index(), 0);
}

/// Test the resource list of the built-in engine
#[test]
fn test_resources() {
    let engine = ExchangeEngine::new();
    let resources = engine.resources();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].device, "self");
    assert_eq!(resources[0].transport, "rte");
}
