//! Benchmark for socket exchange primitives over loopback TCP.
//!
//! - barrier: sentinel round trip between two threads
//! - self_send_recv: self-mailbox append and consume

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::net::{TcpListener, TcpStream};
use std::thread;

use rte::{Name, Rte, RunConfig, SocketExchange, TestCommand, TestType};

fn config() -> RunConfig {
    RunConfig {
        command: Some(TestCommand::AmShort),
        test_type: Some(TestType::PingPong),
        device: Name::new("lo").unwrap(),
        transport: Name::new("tcp").unwrap(),
        ..RunConfig::default()
    }
}

fn connected_pair() -> (SocketExchange, SocketExchange) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = thread::spawn(move || {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_nodelay(true).unwrap();
        SocketExchange::initiate(stream, &config()).unwrap()
    });
    let (server, _) = SocketExchange::accept(&listener).unwrap();
    (server, client.join().unwrap())
}

fn bench_barrier(c: &mut Criterion) {
    let mut group = c.benchmark_group("socket_exchange");
    group.throughput(Throughput::Elements(1));

    group.bench_function("barrier", |b| {
        let (mut server, mut client) = connected_pair();

        // The peer mirrors every barrier until the server hangs up.
        let peer = thread::spawn(move || while client.barrier().is_ok() {});

        b.iter(|| server.barrier().unwrap());

        drop(server);
        peer.join().unwrap();
    });

    group.finish();
}

fn bench_self_mailbox(c: &mut Criterion) {
    let mut group = c.benchmark_group("self_mailbox");

    for size in [8usize, 4096] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("send_recv_{}", size), |b| {
            let (mut server, _client) = connected_pair();
            let payload = vec![0xa5u8; size];
            let mut buf = vec![0u8; size];
            b.iter(|| {
                server.send(0, black_box(&payload)).unwrap();
                server.recv(0, black_box(&mut buf)).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_barrier, bench_self_mailbox);
criterion_main!(benches);
