//! End-to-end controller benchmarks against an in-process control plane.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use torctl_client::{ClientConfig, TorController, WireMode};
use torctl_protocol::{Decoder, Encoder, Response};

/// Accepts connections and answers every request with `"ok"`.
async fn serve(listener: TcpListener, mode: WireMode) {
    while let Ok((mut stream, _)) = listener.accept().await {
        tokio::spawn(async move {
            let mut decoder = Decoder::new(mode);
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                decoder.extend(&buf[..n]);

                let mut out = Vec::new();
                while let Ok(Some(request)) = decoder.decode_request() {
                    let response = Response::ok(request.id, json!("ok"));
                    if let Ok(bytes) = Encoder::encode_response(&response, mode) {
                        out.extend_from_slice(&bytes);
                    }
                }
                if stream.write_all(&out).await.is_err() {
                    return;
                }
            }
        });
    }
}

fn setup(rt: &Runtime, mode: WireMode) -> TorController {
    rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, mode));

        let config = ClientConfig::new(addr.ip().to_string(), addr.port()).with_wire_mode(mode);
        TorController::connect(config).await.unwrap()
    })
}

fn bench_sequential_calls(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("sequential_call");

    for mode in [WireMode::Framed, WireMode::Jsonl] {
        let ctl = setup(&rt, mode);

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::from_parameter(mode), |b| {
            b.to_async(&rt)
                .iter(|| async { black_box(ctl.create_instances(1).await.unwrap()) });
        });
    }

    group.finish();
}

fn bench_concurrent_calls(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let ctl = setup(&rt, WireMode::Framed);
    let mut group = c.benchmark_group("concurrent_calls");

    for concurrency in [10u64, 100] {
        group.throughput(Throughput::Elements(concurrency));
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| {
                    let ctl = ctl.clone();
                    async move {
                        let handles: Vec<_> = (0..concurrency)
                            .map(|_| {
                                let ctl = ctl.clone();
                                tokio::spawn(async move { ctl.create_tor_pool().await })
                            })
                            .collect();
                        for handle in handles {
                            black_box(handle.await.unwrap().unwrap());
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_sequential_calls, bench_concurrent_calls);
criterion_main!(benches);
