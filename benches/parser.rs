use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use surge::parser::response::ResponseParser;

const SHORT: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";

const MEDIUM: &[u8] = b"\
HTTP/1.1 200 OK\r\n\
Server: nginx\r\n\
Date: Mon, 01 Jan 2024 00:00:00 GMT\r\n\
Content-Type: application/json\r\n\
Content-Length: 27\r\n\
Connection: keep-alive\r\n\
Cache-Control: no-cache\r\n\
\r\n\
{\"status\":\"ok\",\"id\":12345}";

const CHUNKED: &[u8] = b"\
HTTP/1.1 200 OK\r\n\
Transfer-Encoding: chunked\r\n\
\r\n\
4\r\nWiki\r\n5\r\npedia\r\n4\r\nlib.\r\n0\r\n\r\n";

const TARGETS: [(&str, &[u8]); 3] = [("short", SHORT), ("medium", MEDIUM), ("chunked", CHUNKED)];

fn benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_parse");
    for (name, target) in TARGETS {
        group.throughput(Throughput::Bytes(target.len() as u64));
        group.bench_with_input(BenchmarkId::new("execute", name), black_box(&target), |b, i| {
            b.iter(|| {
                let mut parser = ResponseParser::new(false);
                let _ = parser.execute(i, |_| {});
            })
        });
    }
    group.finish();
}

fn pipelined(c: &mut Criterion) {
    let two = [SHORT, SHORT].concat();
    c.bench_function("response_parse/pipelined_2", |b| {
        b.iter(|| {
            let mut parser = ResponseParser::new(false);
            let _ = parser.execute(black_box(&two), |_| {});
        })
    });
}

criterion_group!(benches, benchmark, pipelined);
criterion_main!(benches);
